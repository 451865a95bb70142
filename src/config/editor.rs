//! MCP client (editor) configuration locations

use std::fmt;
use std::path::PathBuf;

/// Editors that can launch narsil-mcp as an MCP server
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EditorType {
    ClaudeDesktop,
    ClaudeCode,
    Zed,
    VSCode,
    JetBrains,
}

impl EditorType {
    pub const ALL: [EditorType; 5] = [
        EditorType::ClaudeDesktop,
        EditorType::ClaudeCode,
        EditorType::Zed,
        EditorType::VSCode,
        EditorType::JetBrains,
    ];

    pub fn display_name(&self) -> &'static str {
        match self {
            Self::ClaudeDesktop => "Claude Desktop",
            Self::ClaudeCode => "Claude Code",
            Self::Zed => "Zed",
            Self::VSCode => "VS Code",
            Self::JetBrains => "JetBrains IDEs",
        }
    }

    /// Top-level JSON key holding server definitions
    pub fn servers_key(&self) -> &'static str {
        match self {
            Self::ClaudeDesktop | Self::ClaudeCode => "mcpServers",
            Self::Zed => "context_servers",
            Self::VSCode | Self::JetBrains => "servers",
        }
    }

    /// Whether the config file is per project (relative to the working directory)
    pub fn is_project_local(&self) -> bool {
        matches!(self, Self::VSCode | Self::JetBrains)
    }
}

impl fmt::Display for EditorType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.display_name())
    }
}

/// A detected editor configuration file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EditorConfig {
    pub editor_type: EditorType,
    pub config_path: PathBuf,
    pub exists: bool,
}

impl EditorConfig {
    pub fn for_editor(editor_type: EditorType) -> Self {
        let config_path = get_editor_config_path(editor_type);
        let exists = config_path.exists();
        Self {
            editor_type,
            config_path,
            exists,
        }
    }
}

fn home() -> PathBuf {
    dirs::home_dir().unwrap_or_else(|| PathBuf::from("."))
}

fn cwd() -> PathBuf {
    std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."))
}

/// Where `editor` keeps its MCP server configuration on this platform
pub fn get_editor_config_path(editor: EditorType) -> PathBuf {
    match editor {
        EditorType::ClaudeDesktop => claude_desktop_config_path(),
        EditorType::ClaudeCode => home().join(".claude").join("claude_code_config.json"),
        EditorType::Zed => zed_settings_path(),
        EditorType::VSCode => cwd().join(".vscode").join("mcp.json"),
        EditorType::JetBrains => cwd().join(".idea").join("mcp.json"),
    }
}

#[cfg(target_os = "macos")]
fn claude_desktop_config_path() -> PathBuf {
    home()
        .join("Library/Application Support/Claude")
        .join("claude_desktop_config.json")
}

#[cfg(target_os = "windows")]
fn claude_desktop_config_path() -> PathBuf {
    let appdata = std::env::var("APPDATA")
        .map(PathBuf::from)
        .unwrap_or_else(|_| home().join("AppData").join("Roaming"));
    appdata.join("Claude").join("claude_desktop_config.json")
}

#[cfg(not(any(target_os = "macos", target_os = "windows")))]
fn claude_desktop_config_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| home().join(".config"))
        .join("Claude")
        .join("claude_desktop_config.json")
}

#[cfg(target_os = "windows")]
fn zed_settings_path() -> PathBuf {
    let appdata = std::env::var("APPDATA")
        .map(PathBuf::from)
        .unwrap_or_else(|_| home().join("AppData").join("Roaming"));
    appdata.join("Zed").join("settings.json")
}

// Zed uses ~/.config on macOS too
#[cfg(not(target_os = "windows"))]
fn zed_settings_path() -> PathBuf {
    home().join(".config").join("zed").join("settings.json")
}

/// Editors whose configuration file already exists
pub fn detect_available_editors() -> Vec<EditorConfig> {
    EditorType::ALL
        .into_iter()
        .map(EditorConfig::for_editor)
        .filter(|config| config.exists)
        .collect()
}
