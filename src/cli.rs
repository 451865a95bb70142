//! CLI argument definitions using clap
//!
//! With no subcommand narsil-mcp serves MCP over stdio. The subcommands run
//! the same engine directly from a shell.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

use crate::config::Settings;
use crate::engine::EngineOptions;
use crate::error::{NarsilError, Result};
use crate::neural::{BackendKind, NeuralConfig};

/// Multi-language code intelligence served over MCP
#[derive(Parser, Debug)]
#[command(name = "narsil-mcp")]
#[command(about = "Index source repositories and answer code queries over MCP (stdio)")]
#[command(version)]
#[command(propagate_version = true)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Repository to index (repeatable; default: current directory)
    #[arg(long = "repos", value_name = "PATH", global = true, value_delimiter = ',')]
    pub repos: Vec<PathBuf>,

    /// Ignore any cached index and rebuild from scratch
    #[arg(long, global = true)]
    pub reindex: bool,

    /// Load and save the index under the cache directory
    #[arg(long, global = true)]
    pub persist: bool,

    /// Enable git history tools
    #[arg(long, global = true)]
    pub git: bool,

    /// Resolve calls into a call graph (callers, callees, dead code)
    #[arg(long = "call-graph", global = true)]
    pub call_graph: bool,

    /// Watch repositories and re-index changed files
    #[arg(long, global = true)]
    pub watch: bool,

    /// Debug logging on stderr
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Enable embedding-based neural search
    #[arg(long, global = true)]
    pub neural: bool,

    /// Embedding backend: api or onnx
    #[arg(long = "neural-backend", value_name = "BACKEND", default_value = "api", global = true)]
    pub neural_backend: String,

    /// Embedding model (default depends on the provider)
    #[arg(long = "neural-model", value_name = "MODEL", global = true)]
    pub neural_model: Option<String>,

    /// Settings file (default: ~/.config/narsil-mcp/config.toml)
    #[arg(long, value_name = "FILE", global = true)]
    pub config: Option<PathBuf>,

    /// Output format for subcommands
    #[arg(long, default_value = "text", value_enum, global = true)]
    pub format: OutputFormat,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Index the repositories once and print a summary
    Index,

    /// Run a single tool call without an MCP client
    Tool(ToolArgs),

    /// Manage cached indexes
    Cache(CacheArgs),

    /// Manage narsil-mcp configuration
    Config(ConfigArgs),
}

#[derive(Args, Debug)]
pub struct ToolArgs {
    /// Tool name, e.g. search_code or find_symbols
    #[arg(value_name = "NAME")]
    pub name: String,

    /// Tool arguments as a JSON object
    #[arg(long, value_name = "JSON", default_value = "{}")]
    pub args: String,
}

#[derive(Args, Debug)]
pub struct CacheArgs {
    #[command(subcommand)]
    pub operation: CacheOperation,
}

#[derive(Subcommand, Debug)]
pub enum CacheOperation {
    /// List cached repositories
    List,

    /// Remove cached indexes (the --repos ones, or all of them)
    Clear,
}

#[derive(Args, Debug)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub operation: ConfigOperation,
}

#[derive(Subcommand, Debug)]
pub enum ConfigOperation {
    /// Interactive setup of a neural search API key
    Neural,

    /// Show the effective settings
    Show,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum OutputFormat {
    /// Markdown text
    #[default]
    Text,
    /// JSON for scripts
    Json,
}

impl Cli {
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// Settings from `--config` or the default location
    pub fn settings(&self) -> Result<Settings> {
        match &self.config {
            Some(path) if !path.exists() => Err(NarsilError::ConfigError {
                message: format!("config file not found: {}", path.display()),
            }),
            Some(path) => Settings::load_from(path),
            None => Settings::load(),
        }
    }

    /// Log filter directive. `--verbose` beats `RUST_LOG`, which beats the
    /// settings file.
    pub fn log_directive(&self, settings: &Settings) -> String {
        if self.verbose {
            return "narsil_mcp=debug".to_string();
        }
        match std::env::var("RUST_LOG") {
            Ok(filter) if !filter.trim().is_empty() => filter,
            _ => format!("narsil_mcp={}", settings.logging.level.to_ascii_lowercase()),
        }
    }

    pub fn repo_paths(&self) -> Vec<PathBuf> {
        if self.repos.is_empty() {
            vec![PathBuf::from(".")]
        } else {
            self.repos.clone()
        }
    }

    /// Engine options from flags layered over the settings file
    pub fn engine_options(&self, settings: &Settings) -> Result<EngineOptions> {
        let neural = if self.neural {
            let backend: BackendKind = self.neural_backend.parse()?;
            Some(NeuralConfig::from_env(backend, self.neural_model.clone(), None))
        } else {
            None
        };
        Ok(EngineOptions {
            repos: self.repo_paths(),
            reindex: self.reindex,
            persist: self.persist,
            git: self.git,
            call_graph: self.call_graph,
            watch: self.watch,
            neural,
            walk: settings.walk_options(),
            cache_dir: settings.cache.dir.clone(),
        })
    }
}
