//! Command handlers for the narsil-mcp CLI
//!
//! - `serve` - MCP server on stdio (no subcommand)
//! - `index` - index once and print a summary
//! - `tool` - run one tool call directly
//! - `cache` - list or clear cached indexes
//! - `config` - neural search setup and effective settings
//!
//! Handlers return the text to print on stdout; logs go to stderr.

pub mod cache;
pub mod config;
pub mod index;
pub mod serve;
pub mod tool;

pub use cache::run_cache;
pub use config::run_config;
pub use index::run_index;
pub use serve::run_serve;
pub use tool::run_tool;

use serde::Serialize;

use crate::cli::OutputFormat;
use crate::error::{NarsilError, Result};

/// Pretty JSON with a trailing newline
pub(crate) fn to_json<T: Serialize + ?Sized>(value: &T) -> Result<String> {
    serde_json::to_string_pretty(value)
        .map(|s| s + "\n")
        .map_err(|e| NarsilError::query(format!("JSON serialization failed: {}", e)))
}

/// Render either the text or the JSON form
pub(crate) fn render<T: Serialize + ?Sized>(format: OutputFormat, text: String, value: &T) -> Result<String> {
    match format {
        OutputFormat::Text => Ok(text),
        OutputFormat::Json => to_json(value),
    }
}
