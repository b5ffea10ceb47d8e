//! Luminous Nix Configuration
//!
//! Configuration lives in ~/.config/luminous-nix/config.toml.
//! Every field has a default, so a missing or partial file is valid.

use crate::error::{LuminousError, Result};
use crate::paths;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Executor settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutorConfig {
    /// Hard limit for a spawned command (seconds, valid: 1-3600)
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Directories searched for binaries. Never inherited from $PATH.
    #[serde(default = "default_safe_path")]
    pub safe_path: Vec<PathBuf>,

    /// Programs the executor may launch
    #[serde(default = "default_allowed_programs")]
    pub allowed_programs: Vec<String>,

    /// Prefix privileged commands with sudo when not running as root
    #[serde(default = "default_use_sudo")]
    pub use_sudo: bool,
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_safe_path() -> Vec<PathBuf> {
    [
        "/run/wrappers/bin",
        "/run/current-system/sw/bin",
        "/nix/var/nix/profiles/default/bin",
        "/usr/bin",
        "/bin",
    ]
    .iter()
    .map(PathBuf::from)
    .collect()
}

pub fn default_allowed_programs() -> Vec<String> {
    [
        "nix",
        "nix-env",
        "nix-shell",
        "nix-store",
        "nix-channel",
        "nix-collect-garbage",
        "nixos-rebuild",
        "nixos-version",
        "home-manager",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

fn default_use_sudo() -> bool {
    true
}

impl ExecutorConfig {
    /// Timeout clamped to the valid range (1-3600 seconds)
    pub fn effective_timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs.clamp(1, 3600))
    }

    /// Safe PATH as a single colon-separated string for child processes
    pub fn path_env(&self) -> String {
        self.safe_path
            .iter()
            .map(|p| p.display().to_string())
            .collect::<Vec<_>>()
            .join(":")
    }
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_timeout_secs(),
            safe_path: default_safe_path(),
            allowed_programs: default_allowed_programs(),
            use_sudo: default_use_sudo(),
        }
    }
}

/// Response cache settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Entries kept in the in-process tier
    #[serde(default = "default_memory_capacity")]
    pub memory_capacity: usize,

    /// TTL for cacheable kinds without a specific rule
    #[serde(default = "default_ttl_secs")]
    pub default_ttl_secs: u64,

    /// Package search results change with every channel update
    #[serde(default = "default_search_ttl")]
    pub search_ttl_secs: u64,

    /// Generated configuration and explanations depend only on their inputs
    #[serde(default = "default_config_ttl")]
    pub config_ttl_secs: u64,

    /// Generation and profile listings
    #[serde(default = "default_listing_ttl")]
    pub listing_ttl_secs: u64,
}

fn default_true() -> bool {
    true
}

fn default_memory_capacity() -> usize {
    256
}

fn default_ttl_secs() -> u64 {
    3600 // 1 hour
}

fn default_search_ttl() -> u64 {
    2 * 3600 // 2 hours
}

fn default_config_ttl() -> u64 {
    24 * 3600 // 24 hours
}

fn default_listing_ttl() -> u64 {
    300 // 5 minutes
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            memory_capacity: default_memory_capacity(),
            default_ttl_secs: default_ttl_secs(),
            search_ttl_secs: default_search_ttl(),
            config_ttl_secs: default_config_ttl(),
            listing_ttl_secs: default_listing_ttl(),
        }
    }
}

/// Preference learning settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LearningConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Whose preferences are loaded; defaults to $USER
    #[serde(default = "default_user_id")]
    pub user_id: String,

    /// Corrections needed before an alias is surfaced
    #[serde(default = "default_threshold")]
    pub alias_threshold: u32,

    /// Repetitions needed before a follow-up command is suggested
    #[serde(default = "default_threshold")]
    pub sequence_threshold: u32,

    /// Observations after which explanations drop from detailed to normal
    #[serde(default = "default_normal_after")]
    pub verbosity_normal_after: u64,

    /// Observations after which explanations become concise
    #[serde(default = "default_concise_after")]
    pub verbosity_concise_after: u64,
}

fn default_user_id() -> String {
    std::env::var("USER")
        .ok()
        .filter(|u| !u.trim().is_empty())
        .unwrap_or_else(|| "default".to_string())
}

fn default_threshold() -> u32 {
    2
}

fn default_normal_after() -> u64 {
    10
}

fn default_concise_after() -> u64 {
    50
}

impl LearningConfig {
    /// Thresholds below one would learn from a single coincidence
    pub fn effective_alias_threshold(&self) -> u32 {
        self.alias_threshold.max(1)
    }

    pub fn effective_sequence_threshold(&self) -> u32 {
        self.sequence_threshold.max(1)
    }
}

impl Default for LearningConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            user_id: default_user_id(),
            alias_threshold: default_threshold(),
            sequence_threshold: default_threshold(),
            verbosity_normal_after: default_normal_after(),
            verbosity_concise_after: default_concise_after(),
        }
    }
}

/// Intent recognition settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecognizerConfig {
    /// Intents below this confidence are treated as not understood
    #[serde(default = "default_min_confidence")]
    pub min_confidence: f32,
}

fn default_min_confidence() -> f32 {
    0.3
}

impl Default for RecognizerConfig {
    fn default() -> Self {
        Self {
            min_confidence: default_min_confidence(),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,
}

fn default_log_level() -> String {
    "warn".to_string()
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

/// Complete configuration file
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LuminousConfig {
    #[serde(default)]
    pub executor: ExecutorConfig,

    #[serde(default)]
    pub cache: CacheConfig,

    #[serde(default)]
    pub learning: LearningConfig,

    #[serde(default)]
    pub recognizer: RecognizerConfig,

    #[serde(default)]
    pub log: LogConfig,
}

impl LuminousConfig {
    /// Resolve the config file location
    ///
    /// Priority:
    /// 1. explicit path (the `--config` flag)
    /// 2. $LUMINOUS_CONFIG
    /// 3. ~/.config/luminous-nix/config.toml
    pub fn resolve_path(explicit: Option<&Path>) -> PathBuf {
        if let Some(path) = explicit {
            return path.to_path_buf();
        }
        if let Some(path) = std::env::var_os("LUMINOUS_CONFIG") {
            return PathBuf::from(path);
        }
        paths::default_config_file()
    }

    /// Load configuration; a missing file yields defaults
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        let path = Self::resolve_path(explicit);
        if !path.exists() {
            // An explicitly named file that does not exist is a user mistake
            if explicit.is_some() {
                return Err(LuminousError::Config(format!(
                    "config file not found: {}",
                    path.display()
                )));
            }
            return Ok(Self::default());
        }
        Self::load_from(&path)
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        Self::parse(&content)
            .map_err(|e| LuminousError::Config(format!("{}: {}", path.display(), e)))
    }

    pub fn parse(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    /// Serialize back to TOML (`ask-nix config show`)
    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).map_err(|e| LuminousError::Config(e.to_string()))
    }
}
