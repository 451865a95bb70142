//! MCP server for narsil-mcp
//!
//! Exposes the query engine as MCP tools over stdio. Tool calls run on the
//! blocking pool; engine errors come back as tool errors (`is_error`) so the
//! client sees the message instead of a protocol failure.

pub mod format;
pub mod handlers;
pub mod types;

use std::sync::Arc;

use rmcp::{
    handler::server::{router::tool::ToolRouter, wrapper::Parameters},
    model::*,
    tool, tool_handler, tool_router, ErrorData as McpError, ServerHandler,
};

pub use handlers::{dispatch, ToolOutput, TOOL_NAMES};
pub use types::*;

use crate::engine::Engine;
use crate::error::Result as NarsilResult;

/// MCP server over a shared [`Engine`]
#[derive(Clone)]
pub struct NarsilServer {
    engine: Arc<Engine>,
    tool_router: ToolRouter<NarsilServer>,
}

#[tool_router]
impl NarsilServer {
    pub fn new(engine: Arc<Engine>) -> Self {
        Self {
            engine,
            tool_router: Self::tool_router(),
        }
    }

    async fn run<F>(&self, tool: &'static str, f: F) -> std::result::Result<CallToolResult, McpError>
    where
        F: FnOnce(&Engine) -> NarsilResult<ToolOutput> + Send + 'static,
    {
        let engine = Arc::clone(&self.engine);
        match tokio::task::spawn_blocking(move || f(&engine)).await {
            Ok(Ok(output)) => Ok(CallToolResult::success(vec![Content::text(output.text)])),
            Ok(Err(e)) => {
                tracing::debug!(tool, error = %e, "tool call failed");
                Ok(CallToolResult::error(vec![Content::text(e.to_string())]))
            }
            Err(e) => Err(McpError::internal_error(
                format!("{} task failed: {}", tool, e),
                None,
            )),
        }
    }

    #[tool(description = "List configured repositories with their indexing status, file and symbol counts.")]
    async fn list_repos(&self) -> std::result::Result<CallToolResult, McpError> {
        self.run("list_repos", handlers::list_repos).await
    }

    #[tool(description = "Indexing status of one or all repositories: phase and progress while indexing; files, symbols, graph edges, failed files and languages once ready.")]
    async fn get_index_status(
        &self,
        Parameters(req): Parameters<RepoRequest>,
    ) -> std::result::Result<CallToolResult, McpError> {
        self.run("get_index_status", move |e| handlers::get_index_status(e, req)).await
    }

    #[tool(description = "Ranked BM25 search over symbol names, signatures, docs and paths. While the repository is still indexing, falls back to a plain text search and says so.")]
    async fn search_code(
        &self,
        Parameters(req): Parameters<SearchRequest>,
    ) -> std::result::Result<CallToolResult, McpError> {
        self.run("search_code", move |e| handlers::search_code(e, req)).await
    }

    #[tool(description = "Search fusing BM25 and TF-IDF rankings with reciprocal rank fusion. Better than search_code for natural-language queries.")]
    async fn hybrid_search(
        &self,
        Parameters(req): Parameters<SearchRequest>,
    ) -> std::result::Result<CallToolResult, McpError> {
        self.run("hybrid_search", move |e| handlers::hybrid_search(e, req)).await
    }

    #[tool(description = "List symbols filtered by kind, name pattern and file.")]
    async fn find_symbols(
        &self,
        Parameters(req): Parameters<FindSymbolsRequest>,
    ) -> std::result::Result<CallToolResult, McpError> {
        self.run("find_symbols", move |e| handlers::find_symbols(e, req)).await
    }

    #[tool(description = "Source code and location of a symbol's definition(s).")]
    async fn get_symbol_definition(
        &self,
        Parameters(req): Parameters<SymbolRequest>,
    ) -> std::result::Result<CallToolResult, McpError> {
        self.run("get_symbol_definition", move |e| handlers::get_symbol_definition(e, req)).await
    }

    #[tool(description = "Usages of a symbol: resolved calls, unresolved calls with a matching name, and imports.")]
    async fn find_references(
        &self,
        Parameters(req): Parameters<SymbolRequest>,
    ) -> std::result::Result<CallToolResult, McpError> {
        self.run("find_references", move |e| handlers::find_references(e, req)).await
    }

    #[tool(description = "Functions that call the given function, up to `depth` hops. Requires --call-graph.")]
    async fn get_callers(
        &self,
        Parameters(req): Parameters<CallGraphRequest>,
    ) -> std::result::Result<CallToolResult, McpError> {
        self.run("get_callers", move |e| handlers::get_callers(e, req)).await
    }

    #[tool(description = "Functions called by the given function, up to `depth` hops. Requires --call-graph.")]
    async fn get_callees(
        &self,
        Parameters(req): Parameters<CallGraphRequest>,
    ) -> std::result::Result<CallToolResult, McpError> {
        self.run("get_callees", move |e| handlers::get_callees(e, req)).await
    }

    #[tool(description = "Functions and methods with no incoming calls. Entry points and tests are skipped; exported symbols only with include_exported. Requires --call-graph.")]
    async fn find_dead_code(
        &self,
        Parameters(req): Parameters<DeadCodeRequest>,
    ) -> std::result::Result<CallToolResult, McpError> {
        self.run("find_dead_code", move |e| handlers::find_dead_code(e, req)).await
    }

    #[tool(description = "Cycles in the file import graph.")]
    async fn find_circular_imports(
        &self,
        Parameters(req): Parameters<RepoRequest>,
    ) -> std::result::Result<CallToolResult, McpError> {
        self.run("find_circular_imports", move |e| handlers::find_circular_imports(e, req)).await
    }

    #[tool(description = "Scan indexed files with the built-in security rules (injection, secrets, weak crypto, insecure TLS, path traversal, XSS, unsafe code).")]
    async fn scan_security(
        &self,
        Parameters(req): Parameters<ScanSecurityRequest>,
    ) -> std::result::Result<CallToolResult, McpError> {
        self.run("scan_security", move |e| handlers::scan_security(e, req)).await
    }

    #[tool(description = "Parse Cargo.toml, package.json, requirements.txt and go.mod and report dependencies matching known advisories.")]
    async fn check_dependencies(
        &self,
        Parameters(req): Parameters<RepoRequest>,
    ) -> std::result::Result<CallToolResult, McpError> {
        self.run("check_dependencies", move |e| handlers::check_dependencies(e, req)).await
    }

    #[tool(description = "Directory tree of indexed files with language breakdown and manifests.")]
    async fn get_project_structure(
        &self,
        Parameters(req): Parameters<StructureRequest>,
    ) -> std::result::Result<CallToolResult, McpError> {
        self.run("get_project_structure", move |e| handlers::get_project_structure(e, req)).await
    }

    #[tool(description = "Rebuild the index of one repository (or all when repo is omitted), ignoring the cache.")]
    async fn reindex(
        &self,
        Parameters(req): Parameters<RepoRequest>,
    ) -> std::result::Result<CallToolResult, McpError> {
        self.run("reindex", move |e| handlers::reindex(e, req)).await
    }

    #[tool(description = "Regex search over the repository's files, honoring ignore rules. Works while indexing.")]
    async fn grep_code(
        &self,
        Parameters(req): Parameters<GrepRequest>,
    ) -> std::result::Result<CallToolResult, McpError> {
        self.run("grep_code", move |e| handlers::grep_code(e, req)).await
    }

    #[tool(description = "Semantic search using embeddings of functions and types. Requires --neural and an embeddings API key.")]
    async fn neural_search(
        &self,
        Parameters(req): Parameters<SearchRequest>,
    ) -> std::result::Result<CallToolResult, McpError> {
        self.run("neural_search", move |e| handlers::neural_search(e, req)).await
    }

    #[tool(description = "Most recent commits with the files they changed. Requires --git.")]
    async fn get_recent_changes(
        &self,
        Parameters(req): Parameters<RecentChangesRequest>,
    ) -> std::result::Result<CallToolResult, McpError> {
        self.run("get_recent_changes", move |e| handlers::get_recent_changes(e, req)).await
    }
}

#[tool_handler]
impl ServerHandler for NarsilServer {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            protocol_version: ProtocolVersion::V_2024_11_05,
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            server_info: Implementation {
                name: "narsil-mcp".to_string(),
                version: env!("CARGO_PKG_VERSION").to_string(),
                title: Some("narsil code intelligence".to_string()),
                website_url: None,
                icons: None,
            },
            instructions: Some(MCP_INSTRUCTIONS.to_string()),
        }
    }
}

const MCP_INSTRUCTIONS: &str = r#"narsil-mcp indexes source repositories (symbols, call and import graphs, text indexes) and answers code questions.

Start with list_repos or get_index_status. The `repo` argument takes a repository name or path and may be omitted when only one repository is configured.

Finding code:
- search_code / hybrid_search: ranked symbol search. hybrid_search handles natural-language queries better.
- find_symbols: filter by kind, name pattern and file.
- grep_code: regex over file contents; usable before indexing completes.
- neural_search: embedding search (only when the server runs with --neural).

Understanding code:
- get_symbol_definition, find_references
- get_callers, get_callees, find_dead_code (need --call-graph)
- find_circular_imports, get_project_structure
- get_recent_changes (needs --git)

Review:
- scan_security: rule-based findings with CWE ids and fixes.
- check_dependencies: manifests and known advisories.

Queries made while a repository is still indexing return an error with progress; search_code falls back to text matches instead."#;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::EngineOptions;
    use tempfile::TempDir;

    fn server() -> (TempDir, NarsilServer) {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("main.go"), "package main\n\nfunc main() {}\n").unwrap();
        let engine = Engine::new(EngineOptions {
            repos: vec![dir.path().to_path_buf()],
            cache_dir: Some(dir.path().join(".cache")),
            ..Default::default()
        })
        .unwrap();
        (dir, NarsilServer::new(engine))
    }

    #[test]
    fn test_server_info() {
        let (_dir, server) = server();
        let info = server.get_info();
        assert_eq!(info.server_info.name, "narsil-mcp");
        assert!(info.capabilities.tools.is_some());
    }

    #[test]
    fn test_every_tool_is_routed() {
        let (_dir, server) = server();
        let mut routed: Vec<String> = server
            .tool_router
            .list_all()
            .into_iter()
            .map(|t| t.name.to_string())
            .collect();
        routed.sort();
        let mut expected: Vec<String> = TOOL_NAMES.iter().map(|s| s.to_string()).collect();
        expected.sort();
        assert_eq!(routed, expected);
    }

    #[tokio::test]
    async fn test_engine_error_is_tool_error() {
        let (_dir, server) = server();
        let result = server
            .run("hybrid_search", |e| {
                handlers::hybrid_search(
                    e,
                    SearchRequest {
                        query: "main".into(),
                        ..Default::default()
                    },
                )
            })
            .await
            .unwrap();
        assert_eq!(result.is_error, Some(true));
    }
}
