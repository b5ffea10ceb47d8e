//! ask-nix CLI library
//!
//! Argument parsing, exit codes, logging and rendering. The engine itself
//! lives in luminous_common.

pub mod cli;
pub mod commands;
pub mod errors;
pub mod logging;
pub mod output;
