//! Tool command handler - one tool call without an MCP client

use serde_json::Value;

use crate::cli::{Cli, OutputFormat, ToolArgs};
use crate::commands::to_json;
use crate::config::Settings;
use crate::engine::Engine;
use crate::error::{NarsilError, Result};
use crate::mcp_server::dispatch;

/// Tools that read the working tree directly or rebuild the index themselves
const NO_INDEX_TOOLS: &[&str] = &["check_dependencies", "grep_code", "reindex"];

pub fn run_tool(cli: &Cli, settings: &Settings, args: &ToolArgs) -> Result<String> {
    let raw: Value = serde_json::from_str(&args.args)
        .map_err(|e| NarsilError::query(format!("--args is not valid JSON: {}", e)))?;
    if !(raw.is_object() || raw.is_null()) {
        return Err(NarsilError::query("--args must be a JSON object"));
    }

    let mut options = cli.engine_options(settings)?;
    options.watch = false;
    let engine = Engine::new(options)?;

    if !NO_INDEX_TOOLS.contains(&args.name.as_str()) {
        for (name, result) in engine.index_all_blocking() {
            if let Err(e) = result {
                tracing::warn!("indexing {} failed: {}", name, e);
            }
        }
    }

    let output = dispatch(&engine, &args.name, raw)?;
    match cli.format {
        OutputFormat::Text => Ok(output.text),
        OutputFormat::Json => to_json(&output.data),
    }
}
