//! Core data model: symbols, call sites, imports, file records and graph edges

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::lang::Lang;

/// Current snapshot schema version. Bump whenever a persisted type changes shape.
pub const SCHEMA_VERSION: u32 = 3;

// FNV-1a constants for 64-bit hash
const FNV_OFFSET: u64 = 0xcbf29ce484222325;
const FNV_PRIME: u64 = 0x100000001b3;

/// Compute a stable FNV-1a hash (deterministic across runs and platforms)
///
/// Used for symbol ids, content hashes and repo cache keys.
pub fn fnv1a_hash(data: &[u8]) -> u64 {
    let mut hash = FNV_OFFSET;
    for byte in data {
        hash ^= *byte as u64;
        hash = hash.wrapping_mul(FNV_PRIME);
    }
    hash
}

/// Stable symbol identifier, unique per (file, span)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SymbolId(pub u64);

impl SymbolId {
    pub fn new(file: &str, span: &Span, name: &str) -> Self {
        let key = format!("{}#{}-{}-{}", file, span.start_byte, span.end_byte, name);
        Self(fnv1a_hash(key.as_bytes()))
    }
}

impl fmt::Display for SymbolId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:016x}", self.0)
    }
}

impl FromStr for SymbolId {
    type Err = std::num::ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        u64::from_str_radix(s, 16).map(SymbolId)
    }
}

/// Kind of symbol
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SymbolKind {
    /// Free function
    #[default]
    Function,
    /// Function defined inside a class, impl, trait or interface
    Method,
    Class,
    /// Rust/Go/C struct
    Struct,
    Enum,
    /// TypeScript/Java/Go interface
    Interface,
    /// Rust trait
    Trait,
    /// Rust impl block, named after the implementing type
    Impl,
    /// Module/namespace
    Module,
    Constant,
    Variable,
    TypeAlias,
    Macro,
    /// Terraform resource or data block
    Resource,
    /// Markdown heading
    Section,
}

impl SymbolKind {
    /// Get the string representation
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Function => "function",
            Self::Method => "method",
            Self::Class => "class",
            Self::Struct => "struct",
            Self::Enum => "enum",
            Self::Interface => "interface",
            Self::Trait => "trait",
            Self::Impl => "impl",
            Self::Module => "module",
            Self::Constant => "constant",
            Self::Variable => "variable",
            Self::TypeAlias => "type_alias",
            Self::Macro => "macro",
            Self::Resource => "resource",
            Self::Section => "section",
        }
    }

    /// Parse from a user-supplied string, accepting common aliases
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "function" | "fn" | "func" => Some(Self::Function),
            "method" => Some(Self::Method),
            "class" => Some(Self::Class),
            "struct" => Some(Self::Struct),
            "enum" => Some(Self::Enum),
            "interface" => Some(Self::Interface),
            "trait" => Some(Self::Trait),
            "impl" => Some(Self::Impl),
            "module" | "mod" | "namespace" | "package" => Some(Self::Module),
            "constant" | "const" => Some(Self::Constant),
            "variable" | "var" | "let" => Some(Self::Variable),
            "type_alias" | "type" | "typedef" => Some(Self::TypeAlias),
            "macro" => Some(Self::Macro),
            "resource" => Some(Self::Resource),
            "section" | "heading" => Some(Self::Section),
            _ => None,
        }
    }

    /// Kinds that can be the target of a call
    pub fn is_callable(&self) -> bool {
        matches!(self, Self::Function | Self::Method | Self::Macro)
    }

    /// Kinds whose nested functions are methods
    pub fn is_type_container(&self) -> bool {
        matches!(
            self,
            Self::Class | Self::Struct | Self::Enum | Self::Interface | Self::Trait | Self::Impl
        )
    }
}

impl fmt::Display for SymbolKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Source location of a symbol. Lines are 1-indexed and inclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Span {
    pub start_line: usize,
    pub end_line: usize,
    pub start_byte: usize,
    pub end_byte: usize,
}

/// A definition extracted from a source file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Symbol {
    pub id: SymbolId,
    pub name: String,
    pub kind: SymbolKind,
    /// Repository-relative path with `/` separators
    pub file: String,
    pub lang: Lang,
    pub span: Span,
    /// Enclosing symbol. Resolved through the symbol table, never owned.
    pub scope: Option<SymbolId>,
    /// Name of the enclosing type or module, for qualified display
    pub container: Option<String>,
    /// First line of the definition
    pub signature: String,
    pub doc: Option<String>,
    pub exported: bool,
}

impl Symbol {
    /// `Container::name` for Rust and C++, `Container.name` elsewhere
    pub fn qualified_name(&self) -> String {
        match &self.container {
            Some(c) => {
                let sep = match self.lang {
                    Lang::Rust | Lang::Cpp => "::",
                    _ => ".",
                };
                format!("{}{}{}", c, sep, self.name)
            }
            None => self.name.clone(),
        }
    }

    /// `path:start-end` location string
    pub fn location(&self) -> String {
        format!("{}:{}-{}", self.file, self.span.start_line, self.span.end_line)
    }
}

/// A call expression inside a file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallSite {
    /// Innermost enclosing function or method; `None` for top-level code
    pub caller: Option<SymbolId>,
    pub callee: String,
    /// Receiver or path qualifier (`self`, `os.path`, `Vec`)
    pub receiver: Option<String>,
    pub line: usize,
}

/// An import, include, use or module declaration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImportRef {
    /// Module path as written (`./utils`, `crate::graph`, `os.path`, `stdio.h`)
    pub module: String,
    /// Names pulled from the module, empty for whole-module imports
    pub names: Vec<String>,
    pub line: usize,
}

/// Everything extracted from one file
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileUnit {
    pub symbols: Vec<Symbol>,
    pub calls: Vec<CallSite>,
    pub imports: Vec<ImportRef>,
    /// Number of ERROR/MISSING nodes in the parse tree
    pub error_nodes: usize,
}

/// Outcome of parsing a file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParseStatus {
    Parsed,
    /// Parsed with recoverable syntax errors
    Partial { error_nodes: usize },
    /// Could not be read or parsed at all
    Failed { message: String },
}

impl ParseStatus {
    pub fn is_failed(&self) -> bool {
        matches!(self, Self::Failed { .. })
    }
}

/// Per-file bookkeeping used for incremental reconciliation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileRecord {
    pub path: String,
    pub lang: Lang,
    pub size: u64,
    /// Modification time in milliseconds since the Unix epoch
    pub mtime_ms: u64,
    /// FNV-1a hash of the file contents
    pub hash: u64,
    pub status: ParseStatus,
}

/// Kind of graph edge
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EdgeKind {
    Call,
    Import,
}

/// Endpoint of a graph edge
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeRef {
    Symbol(SymbolId),
    File(String),
    /// Call or import target that matched nothing in the repository
    Unresolved(String),
}

/// Directed call or import edge. Cycles are allowed.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Edge {
    pub kind: EdgeKind,
    pub source: NodeRef,
    pub target: NodeRef,
    /// Line of the call or import statement in the source file
    pub line: usize,
}
