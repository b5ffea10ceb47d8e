//! ask-nix - natural-language assistant for NixOS

use clap::Parser;
use luminous_common::LuminousConfig;
use luminousctl::cli::Cli;
use luminousctl::commands;
use luminousctl::errors::{error_code_for_error, exit_code_for_error};
use luminousctl::logging::{init_tracing, LogEntry};
use std::time::Instant;
use tracing::debug;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    let start = Instant::now();
    let mut log = LogEntry::new(commands::command_name(&cli.command));

    let result = match LuminousConfig::load(cli.config.as_deref()) {
        Ok(config) => {
            init_tracing(&config.log.level, cli.debug);
            commands::dispatch(cli.command, config, cli.config.as_deref(), &mut log).await
        }
        Err(e) => {
            init_tracing("warn", cli.debug);
            Err(e.into())
        }
    };

    let code = match result {
        Ok(code) => code,
        Err(e) => {
            debug!("{:#}", e);
            if cli.debug {
                eprintln!("[ERROR] {:?}", e);
            } else {
                eprintln!(
                    "[ERROR] Sorry, something went wrong inside ask-nix. Run again with --debug for details."
                );
            }
            log.error = Some(format!("{:#}", e));
            log.error_code = Some(error_code_for_error(&e).to_string());
            exit_code_for_error(&e)
        }
    };

    log.exit_code = code;
    log.ok = code == 0;
    log.duration_ms = start.elapsed().as_millis() as u64;
    log.write();

    std::process::exit(code);
}
