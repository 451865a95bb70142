//! Tool argument types
//!
//! Every tool takes an optional `repo` (name or path); it may be omitted when
//! exactly one repository is indexed.

use rmcp::schemars;
use serde::{Deserialize, Serialize};

#[derive(Debug, Default, Clone, Deserialize, Serialize, schemars::JsonSchema)]
pub struct RepoRequest {
    #[schemars(description = "Repository name or path (optional when one repository is indexed)")]
    pub repo: Option<String>,
}

#[derive(Debug, Default, Clone, Deserialize, Serialize, schemars::JsonSchema)]
pub struct SearchRequest {
    #[schemars(description = "Repository name or path (optional when one repository is indexed)")]
    pub repo: Option<String>,

    #[schemars(description = "Free-text query, e.g. 'parse config file' or 'UserRepository'")]
    pub query: String,

    #[schemars(description = "Maximum number of results (default: 20)")]
    pub limit: Option<usize>,
}

#[derive(Debug, Default, Clone, Deserialize, Serialize, schemars::JsonSchema)]
pub struct FindSymbolsRequest {
    #[schemars(description = "Repository name or path (optional when one repository is indexed)")]
    pub repo: Option<String>,

    #[schemars(description = "Symbol kind: function, method, class, struct, enum, interface, trait, module, constant, type, impl, heading")]
    pub kind: Option<String>,

    #[schemars(description = "Name substring (case-insensitive) or regex")]
    pub pattern: Option<String>,

    #[schemars(description = "Only symbols whose file path starts with or contains this")]
    pub file: Option<String>,

    #[schemars(description = "Maximum number of results (default: 50)")]
    pub limit: Option<usize>,
}

#[derive(Debug, Default, Clone, Deserialize, Serialize, schemars::JsonSchema)]
pub struct SymbolRequest {
    #[schemars(description = "Repository name or path (optional when one repository is indexed)")]
    pub repo: Option<String>,

    #[schemars(description = "Symbol name, qualified name (Type::method or Type.method) or symbol id")]
    pub symbol: String,
}

#[derive(Debug, Default, Clone, Deserialize, Serialize, schemars::JsonSchema)]
pub struct CallGraphRequest {
    #[schemars(description = "Repository name or path (optional when one repository is indexed)")]
    pub repo: Option<String>,

    #[schemars(description = "Function or method name, qualified name or symbol id")]
    pub symbol: String,

    #[schemars(description = "How many call hops to follow (default: 1, max: 10)")]
    pub depth: Option<usize>,
}

#[derive(Debug, Default, Clone, Deserialize, Serialize, schemars::JsonSchema)]
pub struct DeadCodeRequest {
    #[schemars(description = "Repository name or path (optional when one repository is indexed)")]
    pub repo: Option<String>,

    #[schemars(description = "Also report exported/public symbols (default: false)")]
    pub include_exported: Option<bool>,

    #[schemars(description = "Maximum number of results (default: 50)")]
    pub limit: Option<usize>,
}

#[derive(Debug, Default, Clone, Deserialize, Serialize, schemars::JsonSchema)]
pub struct ScanSecurityRequest {
    #[schemars(description = "Repository name or path (optional when one repository is indexed)")]
    pub repo: Option<String>,

    #[schemars(description = "Minimum severity: low, medium, high or critical (default: low)")]
    pub severity: Option<String>,

    #[schemars(description = "Only run these rule ids, e.g. ['SQL-001', 'SECRET-001']")]
    pub rules: Option<Vec<String>>,

    #[schemars(description = "Only scan files under this repository-relative path")]
    pub path: Option<String>,
}

#[derive(Debug, Default, Clone, Deserialize, Serialize, schemars::JsonSchema)]
pub struct StructureRequest {
    #[schemars(description = "Repository name or path (optional when one repository is indexed)")]
    pub repo: Option<String>,

    #[schemars(description = "Directory depth to show (default: 3)")]
    pub max_depth: Option<usize>,
}

#[derive(Debug, Default, Clone, Deserialize, Serialize, schemars::JsonSchema)]
pub struct GrepRequest {
    #[schemars(description = "Repository name or path (optional when one repository is indexed)")]
    pub repo: Option<String>,

    #[schemars(description = "Regular expression (Rust regex syntax)")]
    pub pattern: String,

    #[schemars(description = "Ignore case (default: false)")]
    pub case_insensitive: Option<bool>,

    #[schemars(description = "Maximum number of matching lines (default: 20)")]
    pub limit: Option<usize>,
}

#[derive(Debug, Default, Clone, Deserialize, Serialize, schemars::JsonSchema)]
pub struct RecentChangesRequest {
    #[schemars(description = "Repository name or path (optional when one repository is indexed)")]
    pub repo: Option<String>,

    #[schemars(description = "Number of commits (default: 10, max: 100)")]
    pub limit: Option<usize>,
}
