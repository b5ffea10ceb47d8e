//! Subcommand handlers
//!
//! Each handler prints its own output and returns the exit code. Errors
//! returned from here are internal failures (exit 3).

use crate::cli::{CacheCommands, Commands, ConfigCommands, LearningCommands, Personality};
use crate::errors::{exit_code_for, EXIT_SUCCESS, EXIT_VALIDATION};
use crate::logging::LogEntry;
use crate::output::{self, Palette};
use anyhow::{Context, Result};
use luminous_common::{
    AskOptions, ExecutionMode, InputKind, InputValidator, KnowledgeBase, LuminousConfig,
    Pipeline, PreferenceLearner, PreferenceStore, ResponseCache,
};
use std::path::Path;
use tracing::debug;

/// Explain unless --execute was given and --dry-run was not
pub fn execution_mode(execute: bool, dry_run: bool) -> ExecutionMode {
    if execute && !dry_run {
        ExecutionMode::Execute
    } else {
        ExecutionMode::Explain
    }
}

pub fn command_name(command: &Commands) -> &'static str {
    match command {
        Commands::Ask { .. } => "ask",
        Commands::Methods { .. } => "methods",
        Commands::Learning { .. } => "learning",
        Commands::Cache { .. } => "cache",
        Commands::Config { .. } => "config",
    }
}

pub async fn dispatch(
    command: Commands,
    config: LuminousConfig,
    config_path: Option<&Path>,
    log: &mut LogEntry,
) -> Result<i32> {
    match command {
        Commands::Ask {
            query,
            execute,
            dry_run,
            json,
            personality,
        } => {
            let query = query.join(" ");
            log.query = Some(query.clone());
            ask(config, &query, execution_mode(execute, dry_run), json, personality, log).await
        }
        Commands::Methods { package, json } => methods(&package, json),
        Commands::Learning { action } => learning(config, action),
        Commands::Cache { action } => cache(config, action),
        Commands::Config { action } => show_config(&config, config_path, action),
    }
}

async fn ask(
    config: LuminousConfig,
    query: &str,
    mode: ExecutionMode,
    json: bool,
    personality: Personality,
    log: &mut LogEntry,
) -> Result<i32> {
    let mut pipeline = Pipeline::open(config).context("opening the assistant's stores")?;
    let response = pipeline.ask(query, AskOptions { mode }).await?;
    debug!("Answered with status {}", response.status.as_str());

    log.intent = response.intent.as_ref().map(|i| i.kind.to_string());
    if json {
        println!("{}", serde_json::to_string_pretty(&response)?);
    } else {
        print!("{}", output::render_response(&response, personality, &Palette::detect()));
    }
    Ok(exit_code_for(response.status))
}

fn methods(package: &str, json: bool) -> Result<i32> {
    let check = InputValidator::new().validate(package, InputKind::Package);
    if !check.valid {
        eprintln!(
            "[REJECTED] {}",
            check.reason.unwrap_or_else(|| "invalid package name".into())
        );
        return Ok(EXIT_VALIDATION);
    }
    let knowledge = KnowledgeBase::open_default()?;
    let methods = knowledge.get_install_methods(&check.sanitized);
    if json {
        println!("{}", serde_json::to_string_pretty(&methods)?);
    } else {
        print!("{}", output::render_methods(&methods, true, &Palette::detect()));
    }
    Ok(EXIT_SUCCESS)
}

fn learning(config: LuminousConfig, action: LearningCommands) -> Result<i32> {
    let mut learner = PreferenceLearner::load(config.learning, PreferenceStore::open_default())?;
    match action {
        LearningCommands::Show { json } => {
            let summary = learner.summary();
            if json {
                println!("{}", serde_json::to_string_pretty(&summary)?);
            } else {
                print!("{}", output::render_learning(&summary, &Palette::detect()));
            }
        }
        LearningCommands::Reset => {
            learner.reset()?;
            println!("[OK] Everything learned for {} was forgotten", learner.preferences().user_id);
        }
    }
    Ok(EXIT_SUCCESS)
}

fn cache(config: LuminousConfig, action: CacheCommands) -> Result<i32> {
    let cache = ResponseCache::open_default(config.cache);
    match action {
        CacheCommands::Clear => println!("[OK] Removed {} cached responses", cache.clear()),
        CacheCommands::Prune => {
            println!("[OK] Removed {} expired responses", cache.cleanup_expired())
        }
        CacheCommands::Stats { json } => {
            let stats = cache.stats();
            if json {
                println!("{}", serde_json::to_string_pretty(&stats)?);
            } else {
                print!("{}", output::render_cache_stats(&stats));
            }
        }
    }
    Ok(EXIT_SUCCESS)
}

fn show_config(
    config: &LuminousConfig,
    config_path: Option<&Path>,
    action: ConfigCommands,
) -> Result<i32> {
    match action {
        ConfigCommands::Show => print!("{}", config.to_toml()?),
        ConfigCommands::Path => {
            println!("{}", LuminousConfig::resolve_path(config_path).display())
        }
    }
    Ok(EXIT_SUCCESS)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dry_run_wins() {
        assert_eq!(execution_mode(false, false), ExecutionMode::Explain);
        assert_eq!(execution_mode(true, false), ExecutionMode::Execute);
        assert_eq!(execution_mode(true, true), ExecutionMode::Explain);
        assert_eq!(execution_mode(false, true), ExecutionMode::Explain);
    }
}
