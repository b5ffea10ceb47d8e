//! CLI - Command-line argument parsing
//!
//! Keeps argument parsing separate from execution logic.

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// ask-nix: talk to NixOS in plain language
#[derive(Parser, Debug)]
#[command(name = "ask-nix")]
#[command(about = "Natural-language assistant for NixOS", long_about = None)]
#[command(version = env!("LUMINOUS_VERSION"))]
#[command(disable_help_subcommand = true)]
pub struct Cli {
    /// Config file (overrides $LUMINOUS_CONFIG and the default location)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Verbose diagnostics on stderr, full error chains
    #[arg(long, global = true)]
    pub debug: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Ask a question or give an instruction
    Ask {
        /// What you want, e.g. "install firefox"
        #[arg(required = true, num_args = 1..)]
        query: Vec<String>,

        /// Run the command instead of explaining it
        #[arg(long)]
        execute: bool,

        /// Only explain, even if --execute is given
        #[arg(long)]
        dry_run: bool,

        /// Output the response as JSON
        #[arg(long)]
        json: bool,

        /// Response style
        #[arg(long, value_enum, default_value_t = Personality::Friendly)]
        personality: Personality,
    },

    /// Show the ways a package can be installed
    Methods {
        package: String,

        #[arg(long)]
        json: bool,
    },

    /// Inspect or reset what has been learned
    Learning {
        #[command(subcommand)]
        action: LearningCommands,
    },

    /// Manage the response cache
    Cache {
        #[command(subcommand)]
        action: CacheCommands,
    },

    /// Show configuration
    Config {
        #[command(subcommand)]
        action: ConfigCommands,
    },
}

#[derive(Subcommand, Debug)]
pub enum LearningCommands {
    /// Show learned aliases, sequences and preferences
    Show {
        #[arg(long)]
        json: bool,
    },
    /// Forget everything learned for this user
    Reset,
}

#[derive(Subcommand, Debug)]
pub enum CacheCommands {
    /// Remove every cached response
    Clear,
    /// Remove expired responses only
    Prune,
    /// Show cache statistics
    Stats {
        #[arg(long)]
        json: bool,
    },
}

#[derive(Subcommand, Debug)]
pub enum ConfigCommands {
    /// Print the effective configuration as TOML
    Show,
    /// Print the config file location
    Path,
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Personality {
    Minimal,
    #[default]
    Friendly,
    Technical,
    Encouraging,
}
