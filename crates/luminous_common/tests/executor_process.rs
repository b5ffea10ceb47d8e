//! Executor tests against real processes

use luminous_common::config::ExecutorConfig;
use luminous_common::{Command, ExecutionMode, ExecutionStatus, IntentKind, SafeExecutor};
use std::path::PathBuf;
use std::time::{Duration, Instant};

fn system_bin_dirs() -> Vec<PathBuf> {
    vec![PathBuf::from("/bin"), PathBuf::from("/usr/bin")]
}

fn executor(program: &str, timeout_secs: u64) -> Option<SafeExecutor> {
    let config = ExecutorConfig {
        timeout_secs,
        safe_path: system_bin_dirs(),
        allowed_programs: vec![program.to_string()],
        use_sudo: false,
    };
    let executor = SafeExecutor::new(config);
    if executor.resolve_binary(program).is_none() {
        eprintln!("Skipping: {} not found", program);
        return None;
    }
    Some(executor)
}

fn command(program: &str, args: &[&str]) -> Command {
    Command {
        program: program.to_string(),
        args: args.iter().map(|a| a.to_string()).collect(),
        safe: true,
        requires_privilege: false,
        description: format!("Run {}", program),
        intent: IntentKind::Help,
        unsafe_reason: None,
    }
}

#[tokio::test]
async fn test_runaway_command_is_stopped() {
    let Some(executor) = executor("sleep", 1) else {
        return;
    };
    let start = Instant::now();
    let result = executor
        .execute(&command("sleep", &["5"]), ExecutionMode::Execute)
        .await;

    assert_eq!(result.status, ExecutionStatus::Timeout);
    assert!(!result.success);
    assert!(start.elapsed() < Duration::from_secs(4));
}

#[tokio::test]
async fn test_output_and_exit_code_captured() {
    let Some(executor) = executor("echo", 10) else {
        return;
    };
    let result = executor
        .execute(&command("echo", &["hello", "nix"]), ExecutionMode::Execute)
        .await;
    assert_eq!(result.status, ExecutionStatus::Success);
    assert_eq!(result.exit_code, Some(0));
    assert_eq!(result.output.trim(), "hello nix");
}

#[tokio::test]
async fn test_child_does_not_inherit_environment() {
    let Some(executor) = executor("env", 10) else {
        return;
    };
    std::env::set_var("LUMINOUS_TEST_SECRET", "leaked");
    let result = executor
        .execute(&command("env", &[]), ExecutionMode::Execute)
        .await;
    assert_eq!(result.status, ExecutionStatus::Success);
    assert!(!result.output.contains("LUMINOUS_TEST_SECRET"));
    assert!(result.output.contains("PATH=/bin:/usr/bin"));
}

#[tokio::test]
async fn test_disallowed_program_never_runs() {
    let Some(executor) = executor("true", 10) else {
        return;
    };
    let result = executor
        .execute(&command("rm", &["-rf", "/tmp/x"]), ExecutionMode::Execute)
        .await;
    assert_eq!(result.status, ExecutionStatus::Rejected);
    assert!(!result.would_execute);
}
