//! CLI binary tests: index, tool, cache and exit codes

use serde_json::Value;

use crate::common::TestRepo;

#[test]
fn test_index_persists_and_reuses() {
    let repo = TestRepo::new();
    repo.with_python_service();

    let first = repo.run_cli_success(&["--repos", ".", "index"]);
    assert!(first.contains(": 3 files (3 parsed, 0 reused"), "unexpected output: {}", first);

    let second = repo.run_cli_success(&["--repos", ".", "index"]);
    assert!(second.contains(": 3 files (0 parsed, 3 reused"), "unexpected output: {}", second);
}

#[test]
fn test_index_json_summary() {
    let repo = TestRepo::new();
    repo.with_rust_crate();

    let stdout = repo.run_cli_success(&["index", "--format", "json"]);
    let summary: Value = serde_json::from_str(&stdout).unwrap();
    assert_eq!(summary[0]["ok"], true);
    assert_eq!(summary[0]["files"], 2);
    assert!(summary[0].get("error").is_none());
}

#[test]
fn test_tool_command_json() {
    let repo = TestRepo::new();
    repo.with_python_service();

    let stdout = repo.run_cli_success(&["tool", "find_symbols", "--args", r#"{"kind":"class"}"#, "--format", "json"]);
    let symbols: Value = serde_json::from_str(&stdout).unwrap();
    assert_eq!(symbols.as_array().map(Vec::len), Some(1));
    assert_eq!(symbols[0]["name"], "UserService");
    assert_eq!(symbols[0]["file"], "app/service.py");
}

#[test]
fn test_tool_command_text() {
    let repo = TestRepo::new();
    repo.with_python_service();

    let stdout = repo.run_cli_success(&["--call-graph", "tool", "get_callers", "--args", r#"{"symbol":"find_user"}"#]);
    assert!(stdout.contains("get_user"));

    let stdout = repo.run_cli_success(&["tool", "grep_code", "--args", r#"{"pattern":"fetchone"}"#]);
    assert!(stdout.contains("app/service.py"));
}

#[test]
fn test_tool_command_errors() {
    let repo = TestRepo::new();
    repo.with_python_service();

    let (code, stderr) = repo.run_cli_failure(&["tool", "find_symbols", "--args", "{nope"]);
    assert_eq!(code, 4);
    assert!(stderr.contains("not valid JSON"));

    let (code, stderr) = repo.run_cli_failure(&["tool", "summon_dragons"]);
    assert_eq!(code, 4);
    assert!(stderr.contains("unknown tool"));

    let (code, stderr) = repo.run_cli_failure(&["tool", "get_callers", "--args", r#"{"symbol":"connect"}"#]);
    assert_eq!(code, 7);
    assert!(stderr.contains("--call-graph"));
}

#[test]
fn test_missing_repository_exit_code() {
    let repo = TestRepo::new();
    let missing = repo.path().join("does-not-exist");
    let (code, stderr) = repo.run_cli_failure(&["--repos", &missing.to_string_lossy(), "index"]);
    assert_eq!(code, 1);
    assert!(stderr.contains("does-not-exist"));
}

#[test]
fn test_cache_list_and_clear() {
    let repo = TestRepo::new();
    repo.with_python_service();

    let empty = repo.run_cli_success(&["cache", "list"]);
    assert!(empty.contains("No cached repositories found."));

    repo.run_cli_success(&["index"]);
    let listed = repo.run_cli_success(&["cache", "list"]);
    assert!(listed.contains("1 cached repositories"), "unexpected output: {}", listed);
    assert!(listed.contains("3 files"));

    let cleared = repo.run_cli_success(&["--repos", ".", "cache", "clear"]);
    assert!(cleared.contains("Removed 1 cached index(es)"));

    let after = repo.run_cli_success(&["cache", "list"]);
    assert!(after.contains("No cached repositories found."));
}

#[test]
fn test_help_lists_commands() {
    let repo = TestRepo::new();
    let stdout = repo.run_cli_success(&["--help"]);
    for command in ["index", "tool", "cache", "config"] {
        assert!(stdout.contains(command), "--help is missing {}", command);
    }
}
