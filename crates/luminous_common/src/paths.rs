//! Path helpers for Luminous Nix
//!
//! Every on-disk location is derived here so tests can redirect all of them
//! with a single `$LUMINOUS_HOME`.
//! Citation: [XDG Base Directory Specification]

use std::path::PathBuf;

const APP_DIR: &str = "luminous-nix";

/// Root override used by tests and portable installs
fn home_override() -> Option<PathBuf> {
    std::env::var_os("LUMINOUS_HOME").map(PathBuf::from)
}

fn fallback_home() -> PathBuf {
    dirs::home_dir().unwrap_or_else(|| PathBuf::from("."))
}

/// Configuration directory
///
/// Priority:
/// 1. $LUMINOUS_HOME/config
/// 2. $XDG_CONFIG_HOME/luminous-nix (via `dirs`)
/// 3. ~/.config/luminous-nix
pub fn config_dir() -> PathBuf {
    if let Some(root) = home_override() {
        return root.join("config");
    }
    dirs::config_dir()
        .unwrap_or_else(|| fallback_home().join(".config"))
        .join(APP_DIR)
}

/// Persistent data directory (knowledge base, learned preferences)
pub fn data_dir() -> PathBuf {
    if let Some(root) = home_override() {
        return root.join("data");
    }
    dirs::data_local_dir()
        .unwrap_or_else(|| fallback_home().join(".local/share"))
        .join(APP_DIR)
}

/// Disposable cache directory
pub fn cache_dir() -> PathBuf {
    if let Some(root) = home_override() {
        return root.join("cache");
    }
    dirs::cache_dir()
        .unwrap_or_else(|| fallback_home().join(".cache"))
        .join(APP_DIR)
}

/// State directory for the invocation log
pub fn state_dir() -> PathBuf {
    if let Some(root) = home_override() {
        return root.join("state");
    }
    if let Some(xdg_state) = std::env::var_os("XDG_STATE_HOME") {
        return PathBuf::from(xdg_state).join(APP_DIR);
    }
    fallback_home().join(".local/state").join(APP_DIR)
}

pub fn default_config_file() -> PathBuf {
    config_dir().join("config.toml")
}

pub fn knowledge_db_path() -> PathBuf {
    data_dir().join("knowledge.db")
}

pub fn preferences_dir() -> PathBuf {
    data_dir().join("preferences")
}

pub fn response_cache_dir() -> PathBuf {
    cache_dir().join("responses")
}

/// JSONL record of every ask-nix run
pub fn invocation_log_path() -> PathBuf {
    state_dir().join("ask-nix.jsonl")
}

/// Is the current process running as root?
pub fn is_root() -> bool {
    unsafe { libc::geteuid() == 0 }
}
