use std::path::PathBuf;

use narsil_mcp::config::editor::{detect_available_editors, get_editor_config_path, EditorConfig, EditorType};

#[test]
fn test_claude_code_path() {
    let path = get_editor_config_path(EditorType::ClaudeCode);
    let shown = path.to_string_lossy();
    assert!(shown.contains(".claude"));
    assert!(shown.ends_with("claude_code_config.json"));
}

#[cfg(target_os = "macos")]
#[test]
fn test_macos_paths() {
    let desktop = get_editor_config_path(EditorType::ClaudeDesktop);
    assert!(desktop.to_string_lossy().contains("Library/Application Support/Claude"));
    assert!(desktop.to_string_lossy().ends_with("claude_desktop_config.json"));

    let zed = get_editor_config_path(EditorType::Zed);
    assert!(zed.to_string_lossy().contains(".config/zed"));
}

#[cfg(target_os = "windows")]
#[test]
fn test_windows_paths() {
    let desktop = get_editor_config_path(EditorType::ClaudeDesktop);
    assert!(desktop.to_string_lossy().contains("Claude"));
    let zed = get_editor_config_path(EditorType::Zed);
    assert!(zed.to_string_lossy().contains("Zed"));
}

#[test]
fn test_zed_settings_file_name() {
    let path = get_editor_config_path(EditorType::Zed);
    assert!(path.to_string_lossy().ends_with("settings.json"));
}

#[test]
fn test_workspace_paths() {
    let cwd = std::env::current_dir().unwrap();
    assert_eq!(get_editor_config_path(EditorType::VSCode), cwd.join(".vscode").join("mcp.json"));
    assert_eq!(get_editor_config_path(EditorType::JetBrains), cwd.join(".idea").join("mcp.json"));
}

#[test]
fn test_editor_type_display() {
    let names: Vec<String> = EditorType::ALL.iter().map(|e| e.to_string()).collect();
    assert_eq!(names, vec!["Claude Desktop", "Claude Code", "Zed", "VS Code", "JetBrains IDEs"]);
}

#[test]
fn test_detect_only_returns_existing_configs() {
    let editors = detect_available_editors();
    assert!(editors.len() <= 5);
    assert!(editors.iter().all(|e| e.exists && e.config_path.exists()));
}

#[test]
fn test_editor_config_fields() {
    let config = EditorConfig {
        editor_type: EditorType::ClaudeDesktop,
        config_path: PathBuf::from("/test/path/config.json"),
        exists: false,
    };
    assert_eq!(config.editor_type, EditorType::ClaudeDesktop);
    assert_eq!(config.config_path, PathBuf::from("/test/path/config.json"));
    assert!(!config.exists);
}
