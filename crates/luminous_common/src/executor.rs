//! Safe Executor
//!
//! The only component that launches processes. Every command goes through
//! BUILD -> VALIDATE -> {EXECUTE | EXPLAIN | REJECT}:
//!
//! 1. `safe == false` is rejected
//! 2. dangerous argument patterns are rejected
//! 3. programs outside the allow-list are rejected
//! 4. the binary must resolve on the configured safe PATH
//!
//! Explain mode never spawns anything. Step 4 is informational there so a
//! dry-run works on machines without Nix installed.
//!
//! Process spawning sits behind `ProcessRunner` so tests run without
//! touching the system.

use crate::command::Command;
use crate::config::ExecutorConfig;
use crate::input_validator::InputValidator;
use crate::paths;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Maximum output length to capture (prevent memory issues)
const MAX_OUTPUT_BYTES: usize = 64 * 1024; // 64KB

/// Environment variables passed through to children; everything else is cleared
const PASSTHROUGH_ENV: &[&str] = &["HOME", "USER", "LOGNAME", "NIX_PATH", "LANG", "TERM"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionMode {
    /// Describe the command, never run it
    Explain,
    /// Run the command
    Execute,
}

/// Execution status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionStatus {
    /// Command ran and exited 0
    Success,
    /// Explain mode: nothing ran
    Explained,
    /// Validation refused the command; nothing ran
    Rejected,
    /// Command ran but returned a non-zero exit code
    NonZeroExit,
    /// Command exceeded the timeout and was killed
    Timeout,
    /// The process could not be started
    SpawnFailed,
}

impl ExecutionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Explained => "explained",
            Self::Rejected => "rejected",
            Self::NonZeroExit => "non-zero exit",
            Self::Timeout => "timeout",
            Self::SpawnFailed => "spawn failed",
        }
    }
}

/// Result of running (or explaining) a command
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionResult {
    pub success: bool,
    pub output: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub duration_ms: f64,
    /// True only when a process was (or was about to be) launched
    pub would_execute: bool,
    pub status: ExecutionStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exit_code: Option<i32>,
    /// Human-readable rendering of the argv
    pub command: String,
    #[serde(default)]
    pub output_truncated: bool,
}

impl ExecutionResult {
    fn rejected(cmd: &Command, reason: String) -> Self {
        Self {
            success: false,
            output: String::new(),
            error: Some(reason),
            duration_ms: 0.0,
            would_execute: false,
            status: ExecutionStatus::Rejected,
            exit_code: None,
            command: cmd.to_string(),
            output_truncated: false,
        }
    }
}

/// Outcome of `validate_command`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandValidation {
    pub valid: bool,
    pub reason: Option<String>,
    /// Absolute path of the program on the safe PATH
    pub resolved: Option<PathBuf>,
}

/// What happened to a spawned process
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    Completed {
        exit_code: Option<i32>,
        stdout: Vec<u8>,
        stderr: Vec<u8>,
    },
    TimedOut,
    SpawnFailed(String),
}

// ============================================================================
// Process Runner Trait
// ============================================================================

/// Launches a program with an explicit environment and a hard timeout
#[async_trait]
pub trait ProcessRunner: Send + Sync {
    async fn run(
        &self,
        program: &Path,
        args: &[String],
        env: &[(String, String)],
        timeout: Duration,
    ) -> RunOutcome;
}

/// Real runner on tokio::process
#[derive(Debug, Default, Clone, Copy)]
pub struct TokioProcessRunner;

#[async_trait]
impl ProcessRunner for TokioProcessRunner {
    async fn run(
        &self,
        program: &Path,
        args: &[String],
        env: &[(String, String)],
        timeout: Duration,
    ) -> RunOutcome {
        let mut cmd = tokio::process::Command::new(program);
        cmd.args(args)
            .env_clear()
            .envs(env.iter().map(|(k, v)| (k.as_str(), v.as_str())))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let child = match cmd.spawn() {
            Ok(child) => child,
            Err(e) => return RunOutcome::SpawnFailed(e.to_string()),
        };

        // Dropping the future on timeout drops the child, which kills it
        match tokio::time::timeout(timeout, child.wait_with_output()).await {
            Ok(Ok(output)) => RunOutcome::Completed {
                exit_code: output.status.code(),
                stdout: output.stdout,
                stderr: output.stderr,
            },
            Ok(Err(e)) => RunOutcome::SpawnFailed(e.to_string()),
            Err(_) => RunOutcome::TimedOut,
        }
    }
}

// ============================================================================
// Fake Process Runner (Testing)
// ============================================================================

/// One recorded invocation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedRun {
    pub program: PathBuf,
    pub args: Vec<String>,
    pub env: Vec<(String, String)>,
}

/// Runner that never spawns; records calls and replays a fixed outcome
#[derive(Debug, Clone)]
pub struct FakeProcessRunner {
    outcome: RunOutcome,
    calls: Arc<Mutex<Vec<RecordedRun>>>,
}

impl FakeProcessRunner {
    /// Every run exits 0 with the given stdout
    pub fn succeeding(stdout: &str) -> Self {
        Self::with_outcome(RunOutcome::Completed {
            exit_code: Some(0),
            stdout: stdout.as_bytes().to_vec(),
            stderr: Vec::new(),
        })
    }

    /// Every run exits with `code` and the given stderr
    pub fn failing(code: i32, stderr: &str) -> Self {
        Self::with_outcome(RunOutcome::Completed {
            exit_code: Some(code),
            stdout: Vec::new(),
            stderr: stderr.as_bytes().to_vec(),
        })
    }

    pub fn with_outcome(outcome: RunOutcome) -> Self {
        Self {
            outcome,
            calls: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn calls(&self) -> Vec<RecordedRun> {
        self.calls
            .lock()
            .map(|c| c.clone())
            .unwrap_or_default()
    }
}

impl Default for FakeProcessRunner {
    fn default() -> Self {
        Self::succeeding("")
    }
}

#[async_trait]
impl ProcessRunner for FakeProcessRunner {
    async fn run(
        &self,
        program: &Path,
        args: &[String],
        env: &[(String, String)],
        _timeout: Duration,
    ) -> RunOutcome {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(RecordedRun {
                program: program.to_path_buf(),
                args: args.to_vec(),
                env: env.to_vec(),
            });
        }
        self.outcome.clone()
    }
}

// ============================================================================
// Safe Executor
// ============================================================================

pub struct SafeExecutor {
    config: ExecutorConfig,
    validator: InputValidator,
    runner: Box<dyn ProcessRunner>,
    is_root: bool,
}

impl SafeExecutor {
    pub fn new(config: ExecutorConfig) -> Self {
        Self::with_runner(config, Box::new(TokioProcessRunner))
    }

    pub fn with_runner(config: ExecutorConfig, runner: Box<dyn ProcessRunner>) -> Self {
        let validator = InputValidator::with_allowed_programs(config.allowed_programs.clone());
        Self {
            config,
            validator,
            runner,
            is_root: paths::is_root(),
        }
    }

    pub fn config(&self) -> &ExecutorConfig {
        &self.config
    }

    /// Look a program up on the safe PATH only
    pub fn resolve_binary(&self, program: &str) -> Option<PathBuf> {
        if program.contains('/') {
            return None;
        }
        self.config
            .safe_path
            .iter()
            .map(|dir| dir.join(program))
            .find(|candidate| is_executable(candidate))
    }

    /// Steps 1-3: everything that does not depend on the machine
    fn check_policy(&self, cmd: &Command) -> Result<(), String> {
        if !cmd.safe {
            return Err(cmd
                .unsafe_reason
                .clone()
                .unwrap_or_else(|| "Command is marked unsafe".to_string()));
        }

        let outcome = self.validator.validate_argv(&cmd.argv());
        match outcome.reason {
            Some(reason) if !outcome.valid => Err(reason),
            _ => Ok(()),
        }
    }

    /// All four validation steps
    pub fn validate_command(&self, cmd: &Command) -> CommandValidation {
        if let Err(reason) = self.check_policy(cmd) {
            return CommandValidation {
                valid: false,
                reason: Some(reason),
                resolved: None,
            };
        }

        match self.resolve_binary(&cmd.program) {
            Some(path) => CommandValidation {
                valid: true,
                reason: None,
                resolved: Some(path),
            },
            None => CommandValidation {
                valid: false,
                reason: Some(format!(
                    "'{}' was not found on the safe PATH ({})",
                    cmd.program,
                    self.config.path_env()
                )),
                resolved: None,
            },
        }
    }

    fn needs_sudo(&self, cmd: &Command) -> bool {
        cmd.requires_privilege && self.config.use_sudo && !self.is_root
    }

    pub async fn execute(&self, cmd: &Command, mode: ExecutionMode) -> ExecutionResult {
        match mode {
            ExecutionMode::Explain => self.explain(cmd),
            ExecutionMode::Execute => self.run(cmd).await,
        }
    }

    /// Deterministic description of what `run` would do. Spawns nothing.
    pub fn explain(&self, cmd: &Command) -> ExecutionResult {
        if let Err(reason) = self.check_policy(cmd) {
            debug!("Explain refused '{}': {}", cmd, reason);
            return ExecutionResult::rejected(cmd, reason);
        }

        let mut lines = vec![
            format!("[DRY RUN] Would execute: {}", cmd),
            cmd.description.clone(),
        ];
        if cmd.requires_privilege {
            if self.needs_sudo(cmd) {
                lines.push("Needs administrator rights; it will run through sudo".to_string());
            } else {
                lines.push("Needs administrator rights".to_string());
            }
        }
        if self.resolve_binary(&cmd.program).is_none() {
            lines.push(format!(
                "Note: '{}' is not installed on this system's safe PATH",
                cmd.program
            ));
        }

        ExecutionResult {
            success: true,
            output: lines.join("\n"),
            error: None,
            duration_ms: 0.0,
            would_execute: false,
            status: ExecutionStatus::Explained,
            exit_code: None,
            command: cmd.to_string(),
            output_truncated: false,
        }
    }

    async fn run(&self, cmd: &Command) -> ExecutionResult {
        let validation = self.validate_command(cmd);
        let Some(resolved) = validation.resolved.filter(|_| validation.valid) else {
            let reason = validation
                .reason
                .unwrap_or_else(|| "Command failed validation".to_string());
            warn!("Refusing to run '{}': {}", cmd, reason);
            return ExecutionResult::rejected(cmd, reason);
        };

        let (program, args) = if self.needs_sudo(cmd) {
            let Some(sudo) = self.resolve_binary("sudo") else {
                return ExecutionResult::rejected(
                    cmd,
                    "Administrator rights are needed but sudo is not on the safe PATH".to_string(),
                );
            };
            let mut args = vec![resolved.display().to_string()];
            args.extend(cmd.args.iter().cloned());
            (sudo, args)
        } else {
            (resolved, cmd.args.clone())
        };

        let timeout = self.config.effective_timeout();
        info!("Executing: {} (timeout {}s)", cmd, timeout.as_secs());

        let start = Instant::now();
        let outcome = self
            .runner
            .run(&program, &args, &self.child_env(), timeout)
            .await;
        let duration_ms = start.elapsed().as_secs_f64() * 1000.0;

        let mut result = ExecutionResult {
            success: false,
            output: String::new(),
            error: None,
            duration_ms,
            would_execute: true,
            status: ExecutionStatus::SpawnFailed,
            exit_code: None,
            command: cmd.to_string(),
            output_truncated: false,
        };

        match outcome {
            RunOutcome::Completed {
                exit_code,
                stdout,
                stderr,
            } => {
                let (stdout, stdout_truncated) = truncate_output(&stdout);
                let (stderr, stderr_truncated) = truncate_output(&stderr);
                result.output = stdout;
                result.output_truncated = stdout_truncated || stderr_truncated;
                result.exit_code = exit_code;

                if exit_code == Some(0) {
                    result.success = true;
                    result.status = ExecutionStatus::Success;
                } else {
                    result.status = ExecutionStatus::NonZeroExit;
                    result.error = Some(if stderr.trim().is_empty() {
                        match exit_code {
                            Some(code) => format!("Command exited with code {}", code),
                            None => "Command was terminated by a signal".to_string(),
                        }
                    } else {
                        stderr
                    });
                }
            }
            RunOutcome::TimedOut => {
                warn!("'{}' timed out after {}s", cmd, timeout.as_secs());
                result.status = ExecutionStatus::Timeout;
                result.error = Some(format!(
                    "Command timed out after {} seconds and was stopped",
                    timeout.as_secs()
                ));
            }
            RunOutcome::SpawnFailed(e) => {
                warn!("Could not start '{}': {}", cmd, e);
                result.error = Some(format!("Could not start {}: {}", cmd.program, e));
            }
        }

        result
    }

    /// Restricted child environment: safe PATH plus a few identity variables
    fn child_env(&self) -> Vec<(String, String)> {
        let mut env = vec![("PATH".to_string(), self.config.path_env())];
        for key in PASSTHROUGH_ENV {
            if let Ok(value) = std::env::var(key) {
                env.push((key.to_string(), value));
            }
        }
        env
    }
}

fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;
    std::fs::metadata(path)
        .map(|m| m.is_file() && m.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

/// Truncate output to MAX_OUTPUT_BYTES on a char boundary
fn truncate_output(bytes: &[u8]) -> (String, bool) {
    let text = String::from_utf8_lossy(bytes);
    if text.len() <= MAX_OUTPUT_BYTES {
        return (text.into_owned(), false);
    }
    let mut end = MAX_OUTPUT_BYTES;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    (format!("{}\n... (output truncated)", &text[..end]), true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::build_command;
    use crate::intent::IntentKind;

    fn executor_with(runner: FakeProcessRunner) -> SafeExecutor {
        SafeExecutor::with_runner(ExecutorConfig::default(), Box::new(runner))
    }

    #[tokio::test]
    async fn test_explain_never_runs() {
        let runner = FakeProcessRunner::default();
        let executor = executor_with(runner.clone());
        let cmd = build_command(IntentKind::Install, Some("firefox")).unwrap();

        let result = executor.execute(&cmd, ExecutionMode::Explain).await;
        assert!(result.success);
        assert!(!result.would_execute);
        assert_eq!(result.status, ExecutionStatus::Explained);
        assert!(result.output.contains("nixpkgs#firefox"));
        assert!(runner.calls().is_empty());
    }

    #[tokio::test]
    async fn test_unsafe_command_is_rejected_in_both_modes() {
        let runner = FakeProcessRunner::default();
        let executor = executor_with(runner.clone());
        let cmd = build_command(IntentKind::Install, Some("fire`fox`")).unwrap();
        assert!(!cmd.safe);

        for mode in [ExecutionMode::Explain, ExecutionMode::Execute] {
            let result = executor.execute(&cmd, mode).await;
            assert_eq!(result.status, ExecutionStatus::Rejected);
            assert!(!result.success);
        }
        assert!(runner.calls().is_empty());
    }

    #[test]
    fn test_validate_rejects_hand_built_dangerous_command() {
        let executor = executor_with(FakeProcessRunner::default());
        let cmd = Command {
            program: "nix-shell".into(),
            args: vec!["-p".into(), "hello".into(), "--run".into(), "rm -rf /".into()],
            safe: true,
            requires_privilege: false,
            description: "test".into(),
            intent: IntentKind::Unknown,
            unsafe_reason: None,
        };
        let validation = executor.validate_command(&cmd);
        assert!(!validation.valid);

        let not_allowed = Command {
            program: "bash".into(),
            args: vec![],
            ..cmd
        };
        assert!(!executor.validate_command(&not_allowed).valid);
    }

    #[tokio::test]
    async fn test_missing_binary_rejected_when_executing() {
        let runner = FakeProcessRunner::default();
        let config = ExecutorConfig {
            safe_path: vec![PathBuf::from("/nonexistent/bin")],
            ..ExecutorConfig::default()
        };
        let executor = SafeExecutor::with_runner(config, Box::new(runner.clone()));
        let cmd = build_command(IntentKind::ListInstalled, None).unwrap();

        let explained = executor.execute(&cmd, ExecutionMode::Explain).await;
        assert!(explained.success);
        assert!(explained.output.contains("not installed"));

        let result = executor.execute(&cmd, ExecutionMode::Execute).await;
        assert_eq!(result.status, ExecutionStatus::Rejected);
        assert!(runner.calls().is_empty());
    }

    #[test]
    fn test_truncate_output() {
        let big = vec![b'a'; MAX_OUTPUT_BYTES + 10];
        let (text, truncated) = truncate_output(&big);
        assert!(truncated);
        assert!(text.ends_with("(output truncated)"));

        let (text, truncated) = truncate_output(b"short");
        assert_eq!(text, "short");
        assert!(!truncated);
    }
}
