//! Interactive setup for neural search API keys
//!
//! Asks for an embeddings provider and key, optionally checks the key
//! against the provider, and writes it into the `env` block of the
//! narsil-mcp entry of an editor's MCP configuration.

use std::path::Path;

use anyhow::{bail, Context, Result};
use console::{style, Term};
use dialoguer::{theme::ColorfulTheme, Confirm, Password, Select};
use serde_json::{json, Value};

use super::editor::{detect_available_editors, EditorConfig, EditorType};
use crate::neural::{self, BackendKind, EmbeddingBackend, InputKind, NeuralConfig};

/// Embeddings API provider
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApiProvider {
    Voyage,
    OpenAI,
    Custom,
}

impl ApiProvider {
    const ALL: [ApiProvider; 3] = [ApiProvider::Voyage, ApiProvider::OpenAI, ApiProvider::Custom];

    /// Accepts the provider name or its menu number, case-insensitively
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "voyage" | "1" => Some(Self::Voyage),
            "openai" | "2" => Some(Self::OpenAI),
            "custom" | "3" => Some(Self::Custom),
            _ => None,
        }
    }

    pub fn env_var_name(&self) -> &'static str {
        match self {
            Self::Voyage => "VOYAGE_API_KEY",
            Self::OpenAI => "OPENAI_API_KEY",
            Self::Custom => "EMBEDDING_API_KEY",
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            Self::Voyage => "Voyage AI",
            Self::OpenAI => "OpenAI",
            Self::Custom => "Custom Endpoint",
        }
    }
}

const SERVER_NAME: &str = "narsil-mcp";

#[derive(Default)]
pub struct NeuralWizard {
    theme: ColorfulTheme,
}

impl NeuralWizard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run the interactive wizard
    pub async fn run(&self) -> Result<()> {
        let term = Term::stderr();
        term.write_line("")?;
        term.write_line(&format!("  {}", style("narsil-mcp neural search setup").bold().cyan()))?;
        term.write_line("  Embeddings power the neural_search tool (semantic code search).")?;
        term.write_line("")?;

        let editors = detect_available_editors();
        if editors.is_empty() {
            term.write_line(&format!(
                "  {} No editor MCP configuration found.",
                style("!").yellow()
            ))?;
            term.write_line(
                "    Looked for Claude Desktop, Claude Code, Zed, VS Code and JetBrains configs.",
            )?;
            term.write_line(
                "    Run this from your project directory for VS Code or JetBrains, or export the key yourself.",
            )?;
            return Ok(());
        }

        let editor = self.prompt_for_editor(&editors)?;
        let provider = self.prompt_for_provider()?;
        let key = self.prompt_for_api_key(provider)?;

        let check = Confirm::with_theme(&self.theme)
            .with_prompt("Check the key against the provider now?")
            .default(true)
            .interact()
            .context("confirmation cancelled")?;
        if check {
            match self.validate_api_key(&key, provider).await {
                Ok(()) => term.write_line(&format!("  {} Key accepted", style("✓").green()))?,
                Err(e) => {
                    term.write_line(&format!("  {} Key check failed: {:#}", style("✗").red(), e))?;
                    let keep = Confirm::with_theme(&self.theme)
                        .with_prompt("Save it anyway?")
                        .default(false)
                        .interact()
                        .context("confirmation cancelled")?;
                    if !keep {
                        return Ok(());
                    }
                }
            }
        }

        self.add_to_editor_config(&editor.config_path, provider.env_var_name(), &key)
            .await?;

        term.write_line("")?;
        term.write_line(&format!(
            "  {} Added {} to {} ({})",
            style("✓").green(),
            provider.env_var_name(),
            editor.editor_type,
            style(editor.config_path.display()).dim()
        ))?;
        term.write_line(&format!(
            "  Restart {} and start narsil-mcp with --neural.",
            editor.editor_type
        ))?;
        if provider == ApiProvider::Custom {
            term.write_line("  Also set EMBEDDING_API_URL to your endpoint's embeddings URL.")?;
        }
        Ok(())
    }

    fn prompt_for_editor<'a>(&self, editors: &'a [EditorConfig]) -> Result<&'a EditorConfig> {
        let items: Vec<String> = editors
            .iter()
            .map(|e| format!("{} ({})", e.editor_type, e.config_path.display()))
            .collect();
        let selection = Select::with_theme(&self.theme)
            .with_prompt("Which editor should get the key?")
            .items(&items)
            .default(0)
            .interact()
            .context("selection cancelled")?;
        editors.get(selection).context("no editor selected")
    }

    fn prompt_for_provider(&self) -> Result<ApiProvider> {
        let items: Vec<&str> = ApiProvider::ALL.iter().map(|p| p.display_name()).collect();
        let selection = Select::with_theme(&self.theme)
            .with_prompt("Embeddings provider")
            .items(&items)
            .default(0)
            .interact()
            .context("selection cancelled")?;
        Ok(ApiProvider::ALL[selection.min(ApiProvider::ALL.len() - 1)])
    }

    fn prompt_for_api_key(&self, provider: ApiProvider) -> Result<String> {
        loop {
            let raw = Password::with_theme(&self.theme)
                .with_prompt(format!("{} API key", provider.display_name()))
                .interact()
                .context("input cancelled")?;
            let key = Self::sanitize_api_key(&raw);
            if Self::validate_key_format(&key, provider) {
                return Ok(key);
            }
            let retry = Confirm::with_theme(&self.theme)
                .with_prompt(format!(
                    "That doesn't look like a {} key. Enter it again?",
                    provider.display_name()
                ))
                .default(true)
                .interact()
                .context("confirmation cancelled")?;
            if !retry {
                return Ok(key);
            }
        }
    }

    /// Strip whitespace and surrounding quotes left over from copy-paste
    pub fn sanitize_api_key(key: &str) -> String {
        key.trim().trim_matches('"').trim_matches('\'').to_string()
    }

    pub fn validate_key_format(key: &str, provider: ApiProvider) -> bool {
        match provider {
            ApiProvider::Voyage => key.starts_with("pa-") && key.len() > 10,
            ApiProvider::OpenAI => key.starts_with("sk-") && key.len() > 10,
            ApiProvider::Custom => !key.is_empty(),
        }
    }

    /// Embed one short text with the key
    async fn validate_api_key(&self, key: &str, provider: ApiProvider) -> Result<()> {
        let mut config = NeuralConfig::resolve(BackendKind::Api, None, None, |var| {
            std::env::var(var).ok()
        });
        config.provider = provider;
        config.model = neural::default_model(provider).to_string();
        config.api_key = Some(key.to_string());

        tokio::task::spawn_blocking(move || -> Result<()> {
            let backend = neural::create_backend(&config)?;
            let vectors = backend.embed(&["fn main() {}".to_string()], InputKind::Query)?;
            if vectors.first().map(|v| v.is_empty()).unwrap_or(true) {
                bail!("provider returned an empty embedding");
            }
            Ok(())
        })
        .await
        .context("key check task failed")?
    }

    /// Set `env.<env_var> = key` on the narsil-mcp server entry of an editor
    /// config, creating the file, its parent directories and the entry as
    /// needed. Existing keys are kept.
    pub async fn add_to_editor_config(&self, config_path: &Path, env_var: &str, key: &str) -> Result<()> {
        if let Some(parent) = config_path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .with_context(|| format!("cannot create {}", parent.display()))?;
        }

        let mut config: Value = if config_path.exists() {
            let content = tokio::fs::read_to_string(config_path)
                .await
                .with_context(|| format!("cannot read {}", config_path.display()))?;
            if content.trim().is_empty() {
                json!({})
            } else {
                serde_json::from_str(&content)
                    .with_context(|| format!("{} is not valid JSON", config_path.display()))?
            }
        } else {
            json!({})
        };

        let editor = Self::detect_editor_type(config_path)?;
        let servers_key = Self::get_config_key_for_editor(editor);

        let root = config
            .as_object_mut()
            .context("editor config must be a JSON object")?;
        let servers = root
            .entry(servers_key)
            .or_insert_with(|| json!({}))
            .as_object_mut()
            .with_context(|| format!("'{}' must be a JSON object", servers_key))?;
        let server = servers
            .entry(SERVER_NAME)
            .or_insert_with(|| {
                json!({
                    "command": SERVER_NAME,
                    "args": ["--repos", ".", "--neural"],
                })
            })
            .as_object_mut()
            .with_context(|| format!("'{}.{}' must be a JSON object", servers_key, SERVER_NAME))?;
        let env = server
            .entry("env")
            .or_insert_with(|| json!({}))
            .as_object_mut()
            .context("'env' must be a JSON object")?;
        env.insert(env_var.to_string(), Value::String(key.to_string()));

        let rendered = serde_json::to_string_pretty(&config)?;
        tokio::fs::write(config_path, rendered)
            .await
            .with_context(|| format!("cannot write {}", config_path.display()))?;
        Ok(())
    }

    fn detect_editor_type(config_path: &Path) -> Result<EditorType> {
        let file_name = config_path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let path = config_path.to_string_lossy();
        let in_idea_dir = path.contains(".idea") && !path.contains(".vscode");

        match file_name.as_str() {
            "claude_desktop_config.json" => Ok(EditorType::ClaudeDesktop),
            "claude_code_config.json" => Ok(EditorType::ClaudeCode),
            "settings.json" => Ok(EditorType::Zed),
            "mcp.json" if in_idea_dir => Ok(EditorType::JetBrains),
            "mcp.json" => Ok(EditorType::VSCode),
            // Renamed or copied configs still sit under the editor's directory
            _ if path.contains("zed") => Ok(EditorType::Zed),
            _ if path.contains(".vscode") => Ok(EditorType::VSCode),
            _ if path.contains(".idea") => Ok(EditorType::JetBrains),
            _ => bail!("cannot tell which editor {} belongs to", config_path.display()),
        }
    }

    pub fn get_config_key_for_editor(editor_type: EditorType) -> &'static str {
        editor_type.servers_key()
    }
}
