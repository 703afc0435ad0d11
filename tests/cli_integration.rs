//! CLI Integration Tests
//!
//! Tests the command-line interface end-to-end, using the binary's own
//! `serve` command as the provider.

use assert_cmd::Command;
use assert_fs::prelude::*;
use assert_fs::TempDir;
use predicates::prelude::*;

/// Get the binary to test.
fn mcpilot() -> Command {
    Command::cargo_bin("mcpilot").unwrap()
}

/// Temp dir with one guideline, one template and a config pointing at `mcpilot serve`.
fn workspace() -> TempDir {
    let temp = TempDir::new().unwrap();
    temp.child("guidelines/style.md").write_str("# Style\nPrefer small functions.").unwrap();
    temp.child("templates/bug.md").write_str("## Bug Fix\nRoot cause:").unwrap();

    let binary = assert_cmd::cargo::cargo_bin("mcpilot");
    let config = format!(
        "[[providers]]\nname = \"resources\"\ncommand = {:?}\nargs = [\"serve\", \"--guidelines\", {:?}, \"--templates\", {:?}]\n",
        binary.display().to_string(),
        temp.child("guidelines").path().display().to_string(),
        temp.child("templates").path().display().to_string(),
    );
    temp.child("test-config.toml").write_str(&config).unwrap();
    temp
}

// ============================================================================
// Help & Version Tests
// ============================================================================

#[test]
fn test_help_flag() {
    mcpilot()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("Drive an LLM against MCP capability providers"));
}

#[test]
fn test_version_flag() {
    mcpilot()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains(env!("CARGO_PKG_VERSION")));
}

#[test]
fn test_serve_help() {
    mcpilot()
        .args(["serve", "--help"])
        .assert()
        .success()
        .stdout(predicate::str::contains("--guidelines"));
}

#[test]
fn test_completions() {
    mcpilot().args(["completions", "bash"]).assert().success().stdout(predicate::str::contains("mcpilot"));
}

// ============================================================================
// Serve Tests
// ============================================================================

#[test]
fn test_serve_answers_on_stdio() {
    let temp = workspace();
    let input = concat!(
        "{\"jsonrpc\":\"2.0\",\"id\":1,\"method\":\"initialize\",\"params\":{}}\n",
        "{\"jsonrpc\":\"2.0\",\"method\":\"notifications/initialized\"}\n",
        "{\"jsonrpc\":\"2.0\",\"id\":2,\"method\":\"resources/read\",\"params\":{\"uri\":\"guidelines://style\"}}\n",
        "{\"jsonrpc\":\"2.0\",\"id\":3,\"method\":\"bogus\"}\n",
    );

    mcpilot()
        .current_dir(temp.path())
        .args(["serve", "--guidelines", "guidelines", "--templates", "templates"])
        .write_stdin(input)
        .assert()
        .success()
        .stdout(predicate::str::contains("\"protocolVersion\":\"2024-11-05\""))
        .stdout(predicate::str::contains("Prefer small functions."))
        .stdout(predicate::str::contains("-32601"));
}

// ============================================================================
// Client Commands Against a Real Provider Process
// ============================================================================

#[test]
fn test_tools_lists_provider_tools() {
    let temp = workspace();
    mcpilot()
        .current_dir(temp.path())
        .args(["--config", "test-config.toml", "tools"])
        .assert()
        .success()
        .stdout(predicate::str::contains("[resources]"))
        .stdout(predicate::str::contains("search_guidelines"))
        .stdout(predicate::str::contains("Required: changes_summary, change_type"));
}

#[test]
fn test_resources_and_read() {
    let temp = workspace();
    mcpilot()
        .current_dir(temp.path())
        .args(["--config", "test-config.toml", "resources"])
        .assert()
        .success()
        .stdout(predicate::str::contains("guidelines://style"))
        .stdout(predicate::str::contains("templates://bug"));

    mcpilot()
        .current_dir(temp.path())
        .args(["--config", "test-config.toml", "read", "templates://bug"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Root cause:"));
}

#[test]
fn test_call_tool() {
    let temp = workspace();
    mcpilot()
        .current_dir(temp.path())
        .args(["--config", "test-config.toml", "call", "search_guidelines", "--args", r#"{"keyword":"small"}"#])
        .assert()
        .success()
        .stdout(predicate::str::contains("[style:2] Prefer small functions."));
}

#[test]
fn test_call_tool_error_exits_nonzero() {
    let temp = workspace();
    mcpilot()
        .current_dir(temp.path())
        .args(["--config", "test-config.toml", "call", "search_guidelines"])
        .assert()
        .failure()
        .stdout(predicate::str::contains("Invalid arguments for search_guidelines"));
}

#[test]
fn test_call_rejects_non_object_args() {
    let temp = workspace();
    mcpilot()
        .current_dir(temp.path())
        .args(["--config", "test-config.toml", "call", "search_guidelines", "--args", "[1, 2]"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("--args must be a JSON object"));
}

#[test]
fn test_tools_without_providers() {
    let temp = TempDir::new().unwrap();
    temp.child("empty.toml").write_str("").unwrap();
    mcpilot()
        .current_dir(temp.path())
        .args(["--config", "empty.toml", "tools"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("No providers configured"));
}

#[test]
fn test_unknown_provider_filter() {
    let temp = workspace();
    mcpilot()
        .current_dir(temp.path())
        .args(["--config", "test-config.toml", "tools", "--provider", "nope"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Provider 'nope' not found"));
}

// ============================================================================
// Config Tests
// ============================================================================

#[test]
fn test_config_shows_loaded_file() {
    let temp = workspace();
    mcpilot()
        .current_dir(temp.path())
        .args(["--config", "test-config.toml", "config"])
        .assert()
        .success()
        .stdout(predicate::str::contains("name = \"resources\""))
        .stdout(predicate::str::contains("max_cycles = 8"));
}

#[test]
fn test_config_path_flag() {
    mcpilot()
        .args(["--config", "/tmp/somewhere.toml", "config", "--path"])
        .assert()
        .success()
        .stdout(predicate::str::contains("/tmp/somewhere.toml"));
}

#[test]
fn test_invalid_config_reports_path() {
    let temp = TempDir::new().unwrap();
    temp.child("bad.toml").write_str("[agent\nmax_cycles = ").unwrap();
    mcpilot()
        .current_dir(temp.path())
        .args(["--config", "bad.toml", "config"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Invalid config bad.toml"));
}
