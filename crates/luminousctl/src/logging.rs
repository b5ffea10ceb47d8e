//! Logging for ask-nix
//!
//! Two sinks: a tracing subscriber on stderr for diagnostics, and an
//! append-only JSONL invocation log with one record per run.

use luminous_common::paths;
use serde::{Deserialize, Serialize};
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

/// Install the stderr subscriber
///
/// Level priority: `--debug` > $RUST_LOG > config `[log] level`
pub fn init_tracing(config_level: &str, debug: bool) {
    let filter = if debug {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env()
            .or_else(|_| EnvFilter::try_new(config_level))
            .unwrap_or_else(|_| EnvFilter::new("warn"))
    };

    // A second init (tests) is harmless
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}

/// Log entry for each ask-nix invocation
#[derive(Debug, Serialize, Deserialize)]
pub struct LogEntry {
    /// RFC 3339 timestamp
    pub ts: String,

    /// Request ID (UUID)
    pub req_id: String,

    /// Subcommand name
    pub command: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub query: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub intent: Option<String>,

    pub exit_code: i32,

    pub duration_ms: u64,

    pub ok: bool,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    /// Failure class for internal errors ("config", "storage", ...)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_code: Option<String>,
}

impl LogEntry {
    pub fn new(command: &str) -> Self {
        Self {
            ts: Self::now(),
            req_id: Self::generate_req_id(),
            command: command.to_string(),
            query: None,
            intent: None,
            exit_code: 0,
            duration_ms: 0,
            ok: true,
            error: None,
            error_code: None,
        }
    }

    /// Log file path
    ///
    /// Priority:
    /// 1. $LUMINOUS_LOG_FILE
    /// 2. the state dir: $LUMINOUS_HOME/state, $XDG_STATE_HOME/luminous-nix
    ///    or ~/.local/state/luminous-nix
    pub fn discover_log_path() -> PathBuf {
        match std::env::var_os("LUMINOUS_LOG_FILE") {
            Some(path) => PathBuf::from(path),
            None => paths::invocation_log_path(),
        }
    }

    /// Append to the invocation log; failures are ignored
    pub fn write(&self) {
        let path = Self::discover_log_path();
        if let Err(e) = self.write_to_file(&path) {
            tracing::debug!("Could not write invocation log {}: {}", path.display(), e);
        }
    }

    pub fn write_to_file(&self, path: &Path) -> std::io::Result<()> {
        let json = serde_json::to_string(self)?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let mut file = OpenOptions::new().create(true).append(true).open(path)?;
        writeln!(file, "{}", json)?;
        Ok(())
    }

    pub fn generate_req_id() -> String {
        uuid::Uuid::new_v4().to_string()
    }

    pub fn now() -> String {
        chrono::Utc::now().to_rfc3339()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entries_append_as_json_lines() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("log.jsonl");

        let mut entry = LogEntry::new("ask");
        entry.query = Some("install firefox".into());
        entry.write_to_file(&path).unwrap();
        LogEntry::new("cache").write_to_file(&path).unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<_> = content.lines().collect();
        assert_eq!(lines.len(), 2);
        let first: LogEntry = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(first.command, "ask");
        assert_eq!(first.query.as_deref(), Some("install firefox"));
        assert!(!lines[1].contains("query"));
    }

    #[test]
    fn test_request_ids_differ() {
        assert_ne!(LogEntry::generate_req_id(), LogEntry::generate_req_id());
    }
}
