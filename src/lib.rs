//! narsil-mcp: multi-language code intelligence over MCP
//!
//! Walks one or more repositories, parses source files with tree-sitter,
//! and builds a symbol table, BM25/TF-IDF text indexes and call/import
//! graphs. The [`engine::Engine`] answers search, navigation, dead code,
//! cycle, security and dependency queries; [`mcp_server::NarsilServer`]
//! serves them as MCP tools over stdio.
//!
//! # Supported Languages
//!
//! - TypeScript, TSX, JavaScript, JSX
//! - Rust, Go, C, C++, C#
//! - Python, Java, Kotlin, Groovy
//! - Bash, HCL/Terraform, Markdown
//!
//! # Example
//!
//! ```ignore
//! use narsil_mcp::engine::{Engine, EngineOptions};
//!
//! let engine = Engine::new(EngineOptions {
//!     repos: vec![".".into()],
//!     call_graph: true,
//!     ..Default::default()
//! })?;
//! engine.index_all_blocking();
//! for hit in engine.hybrid_search(None, "parse config", Some(5))? {
//!     println!("{} {}", hit.symbol.qualified_name, hit.symbol.file);
//! }
//! ```

pub mod cache;
pub mod cli;
pub mod commands;
pub mod config;
pub mod deps;
pub mod engine;
pub mod error;
pub mod extract;
pub mod fs_utils;
pub mod git;
pub mod graph;
pub mod grep;
pub mod index;
pub mod indexer;
pub mod lang;
pub mod mcp_server;
pub mod neural;
pub mod schema;
pub mod security;
pub mod snapshot;
pub mod walker;
pub mod watcher;

pub use engine::{Engine, EngineOptions};
pub use error::{NarsilError, Result};
pub use lang::Lang;
pub use schema::{Symbol, SymbolId, SymbolKind};
