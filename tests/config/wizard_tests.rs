use std::fs;
use std::path::Path;

use narsil_mcp::config::editor::EditorType;
use narsil_mcp::config::wizard::{ApiProvider, NeuralWizard};
use serde_json::{json, Value};
use tempfile::tempdir;

fn read_json(path: &Path) -> Value {
    serde_json::from_str(&fs::read_to_string(path).unwrap()).unwrap()
}

#[test]
fn test_api_provider_parse() {
    assert_eq!(ApiProvider::parse("voyage"), Some(ApiProvider::Voyage));
    assert_eq!(ApiProvider::parse("OpenAI"), Some(ApiProvider::OpenAI));
    assert_eq!(ApiProvider::parse("custom"), Some(ApiProvider::Custom));
    assert_eq!(ApiProvider::parse("3"), Some(ApiProvider::Custom));
    assert_eq!(ApiProvider::parse("invalid"), None);
}

#[test]
fn test_api_provider_env_var_name() {
    assert_eq!(ApiProvider::Voyage.env_var_name(), "VOYAGE_API_KEY");
    assert_eq!(ApiProvider::OpenAI.env_var_name(), "OPENAI_API_KEY");
    assert_eq!(ApiProvider::Custom.env_var_name(), "EMBEDDING_API_KEY");
    assert_eq!(ApiProvider::Voyage.display_name(), "Voyage AI");
}

#[test]
fn test_validate_key_format() {
    assert!(NeuralWizard::validate_key_format("pa-abc123xyz", ApiProvider::Voyage));
    assert!(!NeuralWizard::validate_key_format("invalid", ApiProvider::Voyage));
    assert!(!NeuralWizard::validate_key_format("pa-short", ApiProvider::Voyage));
    assert!(NeuralWizard::validate_key_format("sk-abc123xyz", ApiProvider::OpenAI));
    assert!(!NeuralWizard::validate_key_format("pa-abc123xyz", ApiProvider::OpenAI));
    assert!(NeuralWizard::validate_key_format("anything", ApiProvider::Custom));
    assert!(!NeuralWizard::validate_key_format("", ApiProvider::Custom));
}

#[test]
fn test_sanitize_api_key() {
    assert_eq!(NeuralWizard::sanitize_api_key("  pa-abc123  "), "pa-abc123");
    assert_eq!(NeuralWizard::sanitize_api_key("\"pa-abc123\""), "pa-abc123");
    assert_eq!(NeuralWizard::sanitize_api_key("'pa-abc123'"), "pa-abc123");
}

#[test]
fn test_config_key_for_editor() {
    assert_eq!(NeuralWizard::get_config_key_for_editor(EditorType::ClaudeDesktop), "mcpServers");
    assert_eq!(NeuralWizard::get_config_key_for_editor(EditorType::ClaudeCode), "mcpServers");
    assert_eq!(NeuralWizard::get_config_key_for_editor(EditorType::Zed), "context_servers");
    assert_eq!(NeuralWizard::get_config_key_for_editor(EditorType::VSCode), "servers");
    assert_eq!(NeuralWizard::get_config_key_for_editor(EditorType::JetBrains), "servers");
}

#[tokio::test]
async fn test_new_claude_desktop_config() {
    let temp = tempdir().unwrap();
    let path = temp.path().join("claude_desktop_config.json");
    NeuralWizard::new()
        .add_to_editor_config(&path, "VOYAGE_API_KEY", "pa-test123")
        .await
        .unwrap();

    let parsed = read_json(&path);
    let server = &parsed["mcpServers"]["narsil-mcp"];
    assert_eq!(server["env"]["VOYAGE_API_KEY"], "pa-test123");
    assert_eq!(server["command"], "narsil-mcp");
}

#[tokio::test]
async fn test_existing_server_entry_is_preserved() {
    let temp = tempdir().unwrap();
    let path = temp.path().join("claude_desktop_config.json");
    let existing = json!({
        "mcpServers": {
            "other": { "command": "other-server" },
            "narsil-mcp": { "command": "narsil-mcp", "args": ["--repos", "~/code"] }
        }
    });
    fs::write(&path, serde_json::to_string_pretty(&existing).unwrap()).unwrap();

    NeuralWizard::new()
        .add_to_editor_config(&path, "VOYAGE_API_KEY", "pa-test123")
        .await
        .unwrap();

    let parsed = read_json(&path);
    assert_eq!(parsed["mcpServers"]["other"]["command"], "other-server");
    assert_eq!(parsed["mcpServers"]["narsil-mcp"]["args"][1], "~/code");
    assert_eq!(parsed["mcpServers"]["narsil-mcp"]["env"]["VOYAGE_API_KEY"], "pa-test123");
}

#[tokio::test]
async fn test_existing_env_is_merged() {
    let temp = tempdir().unwrap();
    let path = temp.path().join("claude_desktop_config.json");
    let existing = json!({
        "mcpServers": {
            "narsil-mcp": { "command": "narsil-mcp", "env": { "OPENAI_API_KEY": "sk-old123" } }
        }
    });
    fs::write(&path, existing.to_string()).unwrap();

    NeuralWizard::new()
        .add_to_editor_config(&path, "VOYAGE_API_KEY", "pa-new123")
        .await
        .unwrap();

    let env = &read_json(&path)["mcpServers"]["narsil-mcp"]["env"];
    assert_eq!(env["OPENAI_API_KEY"], "sk-old123");
    assert_eq!(env["VOYAGE_API_KEY"], "pa-new123");
}

#[tokio::test]
async fn test_zed_and_vscode_keys() {
    let temp = tempdir().unwrap();
    let zed = temp.path().join("settings.json");
    let vscode = temp.path().join("mcp.json");
    let wizard = NeuralWizard::new();
    wizard.add_to_editor_config(&zed, "VOYAGE_API_KEY", "pa-test123").await.unwrap();
    wizard.add_to_editor_config(&vscode, "VOYAGE_API_KEY", "pa-test123").await.unwrap();

    assert_eq!(read_json(&zed)["context_servers"]["narsil-mcp"]["env"]["VOYAGE_API_KEY"], "pa-test123");
    assert_eq!(read_json(&vscode)["servers"]["narsil-mcp"]["env"]["VOYAGE_API_KEY"], "pa-test123");
}

#[tokio::test]
async fn test_invalid_json_is_an_error() {
    let temp = tempdir().unwrap();
    let path = temp.path().join("claude_desktop_config.json");
    fs::write(&path, "{ invalid json }").unwrap();

    let result = NeuralWizard::new()
        .add_to_editor_config(&path, "VOYAGE_API_KEY", "pa-test123")
        .await;
    assert!(result.is_err());
    assert_eq!(fs::read_to_string(&path).unwrap(), "{ invalid json }");
}

#[tokio::test]
async fn test_unknown_config_file_is_an_error() {
    let temp = tempdir().unwrap();
    let path = temp.path().join("random.json");
    let result = NeuralWizard::new()
        .add_to_editor_config(&path, "VOYAGE_API_KEY", "pa-test123")
        .await;
    assert!(result.is_err());
}

#[tokio::test]
async fn test_creates_parent_directories() {
    let temp = tempdir().unwrap();
    let nested = temp.path().join("a").join("b").join("c").join("claude_desktop_config.json");
    NeuralWizard::new()
        .add_to_editor_config(&nested, "VOYAGE_API_KEY", "pa-test123")
        .await
        .unwrap();
    assert!(nested.exists());
}
