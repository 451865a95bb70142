//! MCP server command handler
//!
//! Registers the repositories, starts background indexing and serves the
//! tools over stdio. The engine is built outside the tokio runtime and
//! outlives it, so the blocking embeddings client is never created or
//! dropped on an async worker.

use std::sync::Arc;

use rmcp::transport::stdio;
use rmcp::ServiceExt;

use crate::cli::Cli;
use crate::config::Settings;
use crate::engine::Engine;
use crate::error::{NarsilError, Result};
use crate::mcp_server::NarsilServer;

pub fn run_serve(cli: &Cli, settings: &Settings) -> Result<String> {
    let engine = Engine::new(cli.engine_options(settings)?)?;
    for name in engine.repo_names() {
        tracing::info!("Serving repository {}", name);
    }
    engine.start_indexing();

    let runtime = tokio::runtime::Runtime::new().map_err(|e| NarsilError::ConfigError {
        message: format!("Failed to create tokio runtime: {}", e),
    })?;
    runtime.block_on(serve(Arc::clone(&engine)))?;
    drop(runtime);

    // Server exits cleanly - no output needed
    Ok(String::new())
}

async fn serve(engine: Arc<Engine>) -> Result<()> {
    tracing::info!("Starting narsil-mcp MCP server v{}", env!("CARGO_PKG_VERSION"));

    let service = NarsilServer::new(engine)
        .serve(stdio())
        .await
        .map_err(|e| NarsilError::ConfigError {
            message: format!("Failed to start MCP server: {}", e),
        })?;

    tracing::info!("MCP server initialized, waiting for requests...");

    service.waiting().await.map_err(|e| NarsilError::ConfigError {
        message: format!("MCP server error: {}", e),
    })?;

    tracing::info!("MCP server shutting down");
    Ok(())
}
