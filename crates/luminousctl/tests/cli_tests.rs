//! CLI integration tests for ask-nix
//!
//! Every run gets its own LUMINOUS_HOME so stores never leak between tests
//! or into the real home directory. Nothing here uses --execute.

use std::path::Path;
use std::process::{Command, Output};
use tempfile::TempDir;

fn ask_nix(home: &Path, args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_ask-nix"))
        .args(args)
        .env("LUMINOUS_HOME", home)
        .env("LUMINOUS_LOG_FILE", home.join("ask-nix.jsonl"))
        .env("USER", "cli-tester")
        .env_remove("LUMINOUS_CONFIG")
        .env_remove("RUST_LOG")
        .output()
        .expect("Failed to run ask-nix")
}

fn stdout(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).to_string()
}

fn stderr(output: &Output) -> String {
    String::from_utf8_lossy(&output.stderr).to_string()
}

fn home() -> TempDir {
    tempfile::tempdir().unwrap()
}

#[test]
fn test_install_is_explained_by_default() {
    let home = home();
    let output = ask_nix(home.path(), &["ask", "install", "firefox"]);
    assert_eq!(output.status.code(), Some(0), "stderr: {}", stderr(&output));
    let text = stdout(&output);
    assert!(text.contains("nixpkgs#firefox"));
    assert!(text.contains("DRY RUN"));
}

#[test]
fn test_json_response() {
    let home = home();
    let output = ask_nix(home.path(), &["ask", "--json", "install firefox"]);
    assert_eq!(output.status.code(), Some(0));

    let value: serde_json::Value = serde_json::from_str(&stdout(&output)).unwrap();
    assert_eq!(value["status"], "ok");
    assert_eq!(value["intent"]["kind"], "install");
    assert_eq!(value["execution"]["would_execute"], false);
    assert_eq!(value["command"]["safe"], true);
}

#[test]
fn test_dry_run_overrides_execute() {
    let home = home();
    let output = ask_nix(
        home.path(),
        &["ask", "--execute", "--dry-run", "--json", "remove vim"],
    );
    assert_eq!(output.status.code(), Some(0));
    let value: serde_json::Value = serde_json::from_str(&stdout(&output)).unwrap();
    assert_eq!(value["execution"]["status"], "explained");
}

#[test]
fn test_dangerous_input_exits_one() {
    let home = home();
    let output = ask_nix(home.path(), &["ask", "install firefox; rm -rf /"]);
    assert_eq!(output.status.code(), Some(1));
    assert!(stdout(&output).contains("REJECTED"));
}

#[test]
fn test_unknown_request_exits_one() {
    let home = home();
    let output = ask_nix(home.path(), &["ask", "grab", "chrome"]);
    assert_eq!(output.status.code(), Some(1));
}

#[test]
fn test_malformed_config_is_internal_error() {
    let home = home();
    let config = home.path().join("broken.toml");
    std::fs::write(&config, "[executor\ntimeout_secs = ").unwrap();
    let config = config.to_str().unwrap();

    let output = ask_nix(home.path(), &["--config", config, "ask", "help"]);
    assert_eq!(output.status.code(), Some(3));
    assert!(stderr(&output).contains("Sorry"));

    let debug = ask_nix(home.path(), &["--config", config, "--debug", "ask", "help"]);
    assert_eq!(debug.status.code(), Some(3));
    assert!(stderr(&debug).contains("broken.toml"));

    let log = std::fs::read_to_string(home.path().join("ask-nix.jsonl")).unwrap();
    let last: serde_json::Value = serde_json::from_str(log.lines().last().unwrap()).unwrap();
    assert_eq!(last["exit_code"], 3);
    assert_eq!(last["error_code"], "config");
}

#[test]
fn test_invocation_log_defaults_under_luminous_home() {
    let home = home();
    let output = Command::new(env!("CARGO_BIN_EXE_ask-nix"))
        .args(["ask", "help"])
        .env("LUMINOUS_HOME", home.path())
        .env_remove("LUMINOUS_LOG_FILE")
        .env_remove("LUMINOUS_CONFIG")
        .output()
        .expect("Failed to run ask-nix");
    assert_eq!(output.status.code(), Some(0));

    let log = home.path().join("state").join("ask-nix.jsonl");
    assert!(log.exists(), "no log at {}", log.display());
}

#[test]
fn test_piped_output_has_no_color() {
    let home = home();
    let output = ask_nix(home.path(), &["ask", "--personality", "technical", "install firefox"]);
    assert_eq!(output.status.code(), Some(0));
    assert!(!stdout(&output).contains("\x1b["));

    let methods = ask_nix(home.path(), &["methods", "firefox"]);
    assert!(!stdout(&methods).contains("\x1b["));
}

#[test]
fn test_methods_lists_all_strategies() {
    let home = home();
    let output = ask_nix(home.path(), &["methods", "firefox", "--json"]);
    assert_eq!(output.status.code(), Some(0));
    let methods: Vec<serde_json::Value> = serde_json::from_str(&stdout(&output)).unwrap();
    assert_eq!(methods.len(), 4);
    assert!(methods
        .iter()
        .all(|m| m["example"].as_str().unwrap().contains("firefox")));

    let rejected = ask_nix(home.path(), &["methods", "../etc"]);
    assert_eq!(rejected.status.code(), Some(1));
}

#[test]
fn test_learning_show_and_reset() {
    let home = home();
    ask_nix(home.path(), &["ask", "install firefox"]);

    let shown = ask_nix(home.path(), &["learning", "show", "--json"]);
    assert_eq!(shown.status.code(), Some(0));
    let summary: serde_json::Value = serde_json::from_str(&stdout(&shown)).unwrap();
    assert_eq!(summary["user_id"], "cli-tester");
    assert_eq!(summary["total_observations"], 1);

    let reset = ask_nix(home.path(), &["learning", "reset"]);
    assert_eq!(reset.status.code(), Some(0));

    let shown = ask_nix(home.path(), &["learning", "show", "--json"]);
    let summary: serde_json::Value = serde_json::from_str(&stdout(&shown)).unwrap();
    assert_eq!(summary["total_observations"], 0);
}

#[test]
fn test_cache_commands() {
    let home = home();
    ask_nix(home.path(), &["ask", "search editor"]);

    let stats = ask_nix(home.path(), &["cache", "stats", "--json"]);
    let value: serde_json::Value = serde_json::from_str(&stdout(&stats)).unwrap();
    assert_eq!(value["disk_entries"], 1);
    assert_eq!(value["writes"], 1);

    // The second ask is a hit recorded by a different process
    ask_nix(home.path(), &["ask", "search editor"]);
    let stats = ask_nix(home.path(), &["cache", "stats", "--json"]);
    let value: serde_json::Value = serde_json::from_str(&stdout(&stats)).unwrap();
    assert_eq!(value["hits"], 1);

    let cleared = ask_nix(home.path(), &["cache", "clear"]);
    assert_eq!(cleared.status.code(), Some(0));
    assert!(stdout(&cleared).contains("Removed 1"));

    let pruned = ask_nix(home.path(), &["cache", "prune"]);
    assert_eq!(pruned.status.code(), Some(0));
}

#[test]
fn test_config_show_prints_defaults() {
    let home = home();
    let output = ask_nix(home.path(), &["config", "show"]);
    assert_eq!(output.status.code(), Some(0));
    let text = stdout(&output);
    assert!(text.contains("[executor]"));
    assert!(text.contains("timeout_secs = 30"));
}

#[test]
fn test_invocation_log_written() {
    let home = home();
    ask_nix(home.path(), &["ask", "install firefox"]);
    ask_nix(home.path(), &["ask", "grab chrome"]);

    let log = std::fs::read_to_string(home.path().join("ask-nix.jsonl")).unwrap();
    let entries: Vec<serde_json::Value> = log
        .lines()
        .map(|l| serde_json::from_str(l).unwrap())
        .collect();
    assert_eq!(entries.len(), 2);
    assert_eq!(entries[0]["command"], "ask");
    assert_eq!(entries[0]["intent"], "install");
    assert_eq!(entries[0]["exit_code"], 0);
    assert_eq!(entries[1]["exit_code"], 1);
    assert_ne!(entries[0]["req_id"], entries[1]["req_id"]);
}

#[test]
fn test_version_is_stamped() {
    let home = home();
    let output = ask_nix(home.path(), &["--version"]);
    assert_eq!(output.status.code(), Some(0));
    let text = stdout(&output);
    assert!(text.starts_with("ask-nix "), "{}", text);
    assert!(!text.trim_end().ends_with("ask-nix"));
}
