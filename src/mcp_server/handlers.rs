//! Tool implementations shared by the MCP server and `narsil-mcp tool`
//!
//! Each handler runs one engine query and renders it twice: markdown for
//! the MCP client and a JSON value for `--format json`.

use serde::Serialize;
use serde_json::Value;

use super::format;
use super::types::*;
use crate::engine::Engine;
use crate::error::{NarsilError, Result};

/// Rendered result of one tool call
#[derive(Debug, Clone)]
pub struct ToolOutput {
    pub text: String,
    pub data: Value,
}

impl ToolOutput {
    fn new<T: Serialize + ?Sized>(text: String, data: &T) -> Result<Self> {
        let data = serde_json::to_value(data)
            .map_err(|e| NarsilError::query(format!("cannot serialize result: {}", e)))?;
        Ok(Self { text, data })
    }
}

/// Every tool name, in the order they are listed to clients
pub const TOOL_NAMES: [&str; 18] = [
    "list_repos",
    "get_index_status",
    "search_code",
    "hybrid_search",
    "find_symbols",
    "get_symbol_definition",
    "find_references",
    "get_callers",
    "get_callees",
    "find_dead_code",
    "find_circular_imports",
    "scan_security",
    "check_dependencies",
    "get_project_structure",
    "reindex",
    "grep_code",
    "neural_search",
    "get_recent_changes",
];

pub fn list_repos(engine: &Engine) -> Result<ToolOutput> {
    let repos = engine.list_repos();
    ToolOutput::new(format::repos(&repos), &repos)
}

pub fn get_index_status(engine: &Engine, req: RepoRequest) -> Result<ToolOutput> {
    let reports = engine.index_status(req.repo.as_deref())?;
    ToolOutput::new(format::index_status(&reports), &reports)
}

pub fn search_code(engine: &Engine, req: SearchRequest) -> Result<ToolOutput> {
    let results = engine.search_code(req.repo.as_deref(), &req.query, req.limit)?;
    ToolOutput::new(format::search(&req.query, &results), &results)
}

pub fn hybrid_search(engine: &Engine, req: SearchRequest) -> Result<ToolOutput> {
    let hits = engine.hybrid_search(req.repo.as_deref(), &req.query, req.limit)?;
    ToolOutput::new(format::hits("Hybrid search", &req.query, &hits), &hits)
}

pub fn find_symbols(engine: &Engine, req: FindSymbolsRequest) -> Result<ToolOutput> {
    let symbols = engine.find_symbols(
        req.repo.as_deref(),
        req.kind.as_deref(),
        req.pattern.as_deref(),
        req.file.as_deref(),
        req.limit,
    )?;
    ToolOutput::new(format::symbols(&symbols), &symbols)
}

pub fn get_symbol_definition(engine: &Engine, req: SymbolRequest) -> Result<ToolOutput> {
    let defs = engine.symbol_definition(req.repo.as_deref(), &req.symbol)?;
    ToolOutput::new(format::definitions(&defs), &defs)
}

pub fn find_references(engine: &Engine, req: SymbolRequest) -> Result<ToolOutput> {
    let refs = engine.find_references(req.repo.as_deref(), &req.symbol)?;
    ToolOutput::new(format::references(&req.symbol, &refs), &refs)
}

pub fn get_callers(engine: &Engine, req: CallGraphRequest) -> Result<ToolOutput> {
    let trees = engine.callers(req.repo.as_deref(), &req.symbol, req.depth)?;
    ToolOutput::new(format::call_trees("Callers", &trees), &trees)
}

pub fn get_callees(engine: &Engine, req: CallGraphRequest) -> Result<ToolOutput> {
    let trees = engine.callees(req.repo.as_deref(), &req.symbol, req.depth)?;
    ToolOutput::new(format::call_trees("Callees", &trees), &trees)
}

pub fn find_dead_code(engine: &Engine, req: DeadCodeRequest) -> Result<ToolOutput> {
    let symbols = engine.dead_code(
        req.repo.as_deref(),
        req.include_exported.unwrap_or(false),
        req.limit,
    )?;
    ToolOutput::new(format::dead_code(&symbols), &symbols)
}

pub fn find_circular_imports(engine: &Engine, req: RepoRequest) -> Result<ToolOutput> {
    let cycles = engine.circular_imports(req.repo.as_deref())?;
    ToolOutput::new(format::cycles(&cycles), &cycles)
}

pub fn scan_security(engine: &Engine, req: ScanSecurityRequest) -> Result<ToolOutput> {
    let report = engine.scan_security(
        req.repo.as_deref(),
        req.severity.as_deref(),
        req.rules.unwrap_or_default(),
        req.path.as_deref(),
    )?;
    ToolOutput::new(format::security(&report), &report)
}

pub fn check_dependencies(engine: &Engine, req: RepoRequest) -> Result<ToolOutput> {
    let report = engine.check_dependencies(req.repo.as_deref())?;
    ToolOutput::new(format::dependencies(&report), &report)
}

pub fn get_project_structure(engine: &Engine, req: StructureRequest) -> Result<ToolOutput> {
    let structure = engine.project_structure(req.repo.as_deref(), req.max_depth)?;
    ToolOutput::new(format::structure(&structure), &structure)
}

pub fn reindex(engine: &Engine, req: RepoRequest) -> Result<ToolOutput> {
    let reports = engine.reindex(req.repo.as_deref())?;
    ToolOutput::new(format::reindex(&reports), &reports)
}

pub fn grep_code(engine: &Engine, req: GrepRequest) -> Result<ToolOutput> {
    let matches = engine.grep(
        req.repo.as_deref(),
        &req.pattern,
        req.case_insensitive.unwrap_or(false),
        req.limit,
    )?;
    ToolOutput::new(format::grep(&req.pattern, &matches), &matches)
}

pub fn neural_search(engine: &Engine, req: SearchRequest) -> Result<ToolOutput> {
    let hits = engine.neural_search(req.repo.as_deref(), &req.query, req.limit)?;
    ToolOutput::new(format::hits("Neural search", &req.query, &hits), &hits)
}

pub fn get_recent_changes(engine: &Engine, req: RecentChangesRequest) -> Result<ToolOutput> {
    let commits = engine.recent_changes(req.repo.as_deref(), req.limit)?;
    ToolOutput::new(format::commits(&commits), &commits)
}

fn args<T: serde::de::DeserializeOwned>(tool: &str, args: Value) -> Result<T> {
    let args = if args.is_null() { Value::Object(Default::default()) } else { args };
    serde_json::from_value(args)
        .map_err(|e| NarsilError::query(format!("invalid arguments for {}: {}", tool, e)))
}

/// Run a tool by name with a JSON argument object
pub fn dispatch(engine: &Engine, name: &str, raw: Value) -> Result<ToolOutput> {
    match name {
        "list_repos" => list_repos(engine),
        "get_index_status" => get_index_status(engine, args(name, raw)?),
        "search_code" => search_code(engine, args(name, raw)?),
        "hybrid_search" => hybrid_search(engine, args(name, raw)?),
        "find_symbols" => find_symbols(engine, args(name, raw)?),
        "get_symbol_definition" => get_symbol_definition(engine, args(name, raw)?),
        "find_references" => find_references(engine, args(name, raw)?),
        "get_callers" => get_callers(engine, args(name, raw)?),
        "get_callees" => get_callees(engine, args(name, raw)?),
        "find_dead_code" => find_dead_code(engine, args(name, raw)?),
        "find_circular_imports" => find_circular_imports(engine, args(name, raw)?),
        "scan_security" => scan_security(engine, args(name, raw)?),
        "check_dependencies" => check_dependencies(engine, args(name, raw)?),
        "get_project_structure" => get_project_structure(engine, args(name, raw)?),
        "reindex" => reindex(engine, args(name, raw)?),
        "grep_code" => grep_code(engine, args(name, raw)?),
        "neural_search" => neural_search(engine, args(name, raw)?),
        "get_recent_changes" => get_recent_changes(engine, args(name, raw)?),
        other => Err(NarsilError::query(format!(
            "unknown tool '{}' (available: {})",
            other,
            TOOL_NAMES.join(", ")
        ))),
    }
}
