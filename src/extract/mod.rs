//! Symbol, call and import extraction from parsed source files
//!
//! One table-driven walker serves all 16 languages. Each language family
//! declares which nodes are definitions (`defs`), which are call sites
//! (`calls`) and which are imports (`imports`); the walker keeps a scope
//! stack so nested functions know their enclosing symbol.
//!
//! # Example
//!
//! ```ignore
//! use narsil_mcp::extract::extract_file;
//! use narsil_mcp::Lang;
//!
//! let unit = extract_file("src/lib.rs", "pub fn hello() {}", Lang::Rust)?;
//! assert_eq!(unit.symbols[0].name, "hello");
//! ```

mod calls;
mod defs;
mod imports;

use std::cell::RefCell;
use std::collections::hash_map::Entry;
use std::collections::{HashMap, HashSet};

use tree_sitter::{Node, Parser, Tree};

use crate::error::{NarsilError, Result};
use crate::lang::Lang;
use crate::schema::{CallSite, FileUnit, Span, Symbol, SymbolId, SymbolKind};

const MAX_SIGNATURE_LEN: usize = 160;
const MAX_DOC_LEN: usize = 600;

thread_local! {
    /// One parser per language per thread; rayon workers reuse them across files
    static PARSERS: RefCell<HashMap<Lang, Parser>> = RefCell::new(HashMap::new());
}

/// Parse source code into a tree-sitter tree
pub fn parse_source(source: &str, lang: Lang) -> Result<Tree> {
    PARSERS.with(|cell| {
        let mut parsers = cell.borrow_mut();
        let parser = match parsers.entry(lang) {
            Entry::Occupied(e) => e.into_mut(),
            Entry::Vacant(e) => {
                let mut parser = Parser::new();
                parser
                    .set_language(&lang.tree_sitter_language())
                    .map_err(|err| NarsilError::ParseFailure {
                        message: format!("failed to load {} grammar: {}", lang, err),
                    })?;
                e.insert(parser)
            }
        };
        parser
            .parse(source, None)
            .ok_or_else(|| NarsilError::ParseFailure {
                message: format!("tree-sitter returned no tree for {} source", lang),
            })
    })
}

/// Parse and extract symbols, calls and imports from one file
///
/// `path` is the repository-relative path recorded on every symbol.
pub fn extract_file(path: &str, source: &str, lang: Lang) -> Result<FileUnit> {
    let tree = parse_source(source, lang)?;
    Ok(extract_tree(path, source, &tree, lang))
}

/// Extract from an already parsed tree
pub fn extract_tree(path: &str, source: &str, tree: &Tree, lang: Lang) -> FileUnit {
    let mut collector = Collector {
        file: path,
        source,
        lang,
        unit: FileUnit::default(),
        scopes: Vec::new(),
        seen: HashSet::new(),
    };
    collector.walk(tree.root_node());
    collector.unit
}

/// A definition recognised by a language family
pub(crate) struct Definition<'t> {
    pub name: String,
    pub kind: SymbolKind,
    /// Explicit container (Rust impl type, Go receiver, C++ `Class::`)
    pub container: Option<String>,
    /// Node whose range becomes the symbol span
    pub node: Node<'t>,
}

struct Frame {
    id: SymbolId,
    kind: SymbolKind,
    name: String,
}

struct Collector<'a> {
    file: &'a str,
    source: &'a str,
    lang: Lang,
    unit: FileUnit,
    scopes: Vec<Frame>,
    seen: HashSet<SymbolId>,
}

impl<'a> Collector<'a> {
    /// Pre-order walk on a `TreeCursor`, so nesting depth costs heap rather
    /// than stack
    fn walk(&mut self, root: Node) {
        let mut cursor = root.walk();
        // One entry per node on the cursor's path: whether it opened a scope
        let mut opened: Vec<bool> = Vec::new();
        loop {
            opened.push(self.enter(cursor.node()));
            if cursor.goto_first_child() {
                continue;
            }
            loop {
                if opened.pop() == Some(true) {
                    self.scopes.pop();
                }
                if cursor.goto_next_sibling() {
                    break;
                }
                if !cursor.goto_parent() {
                    return;
                }
            }
        }
    }

    /// Record what `node` itself contributes. Returns whether it opened a scope.
    fn enter(&mut self, node: Node) -> bool {
        if node.is_error() || node.is_missing() {
            self.unit.error_nodes += 1;
        }

        self.unit
            .imports
            .extend(imports::imports_from_node(node, self.source, self.lang));

        if let Some((callee, receiver)) = calls::call_from_node(node, self.source, self.lang) {
            self.unit.calls.push(CallSite {
                caller: self.current_callable(),
                callee,
                receiver,
                line: node.start_position().row + 1,
            });
        }

        match defs::definition(node, self.source, self.lang) {
            Some(def) => self.add_symbol(def),
            None => false,
        }
    }

    /// Record a definition and open its scope. Returns whether a frame was pushed.
    fn add_symbol(&mut self, def: Definition) -> bool {
        let node = def.node;
        let span = Span {
            start_line: node.start_position().row + 1,
            end_line: node.end_position().row + 1,
            start_byte: node.start_byte(),
            end_byte: node.end_byte(),
        };
        let id = SymbolId::new(self.file, &span, &def.name);
        if !self.seen.insert(id) {
            return false;
        }

        let enclosing = self.scopes.last();
        let mut kind = def.kind;
        if kind == SymbolKind::Function && enclosing.map(|f| f.kind.is_type_container()).unwrap_or(false) {
            kind = SymbolKind::Method;
        }

        let container = def.container.clone().or_else(|| {
            self.scopes
                .iter()
                .rev()
                .find(|f| f.kind.is_type_container() || f.kind == SymbolKind::Module)
                .map(|f| f.name.clone())
        });

        let symbol = Symbol {
            id,
            name: def.name.clone(),
            kind,
            file: self.file.to_string(),
            lang: self.lang,
            span,
            scope: enclosing.map(|f| f.id),
            container,
            signature: signature(node, self.source),
            doc: doc_comment(node, self.source, self.lang),
            exported: defs::is_exported(node, &def.name, self.source, self.lang),
        };
        self.unit.symbols.push(symbol);

        self.scopes.push(Frame {
            id,
            kind,
            name: def.name,
        });
        true
    }

    fn current_callable(&self) -> Option<SymbolId> {
        self.scopes
            .iter()
            .rev()
            .find(|f| f.kind.is_callable())
            .map(|f| f.id)
    }
}

/// Text of a node, empty when the range is not valid UTF-8
pub(crate) fn node_text<'s>(node: Node, source: &'s str) -> &'s str {
    node.utf8_text(source.as_bytes()).unwrap_or("")
}

/// Safely truncate a string at a UTF-8 char boundary
pub(crate) fn truncate_to_char_boundary(s: &str, max_bytes: usize) -> &str {
    if s.len() <= max_bytes {
        return s;
    }
    let mut end = max_bytes;
    while end > 0 && !s.is_char_boundary(end) {
        end -= 1;
    }
    &s[..end]
}

fn signature(node: Node, source: &str) -> String {
    let text = node_text(node, source);
    let first = text.lines().next().unwrap_or("").trim();
    let first = first.trim_end_matches('{').trim_end();
    truncate_to_char_boundary(first, MAX_SIGNATURE_LEN).to_string()
}

/// Node kinds that wrap a definition without being one
const WRAPPER_KINDS: &[&str] = &[
    "export_statement",
    "decorated_definition",
    "lexical_declaration",
    "variable_declaration",
    "template_declaration",
];

/// Node kinds that may sit between a doc comment and its definition
const ATTRIBUTE_KINDS: &[&str] = &["attribute_item", "attribute", "decorator", "annotation", "attribute_list"];

fn doc_comment(node: Node, source: &str, lang: Lang) -> Option<String> {
    if lang == Lang::Python {
        if let Some(doc) = python_docstring(node, source) {
            return Some(doc);
        }
    }

    let mut anchor = node;
    while let Some(parent) = anchor.parent() {
        if WRAPPER_KINDS.contains(&parent.kind()) {
            anchor = parent;
        } else {
            break;
        }
    }

    let mut lines: Vec<String> = Vec::new();
    let mut expected_row = anchor.start_position().row;
    let mut current = anchor.prev_named_sibling();
    while let Some(sibling) = current {
        let kind = sibling.kind();
        if ATTRIBUTE_KINDS.contains(&kind) {
            expected_row = sibling.start_position().row;
            current = sibling.prev_named_sibling();
            continue;
        }
        if !kind.contains("comment") || sibling.end_position().row + 1 < expected_row {
            break;
        }
        let text = node_text(sibling, source);
        let cleaned: Vec<String> = text.lines().rev().map(strip_comment_markers).collect();
        lines.extend(cleaned);
        expected_row = sibling.start_position().row;
        current = sibling.prev_named_sibling();
    }

    lines.reverse();
    let doc = lines
        .into_iter()
        .filter(|l| !l.is_empty())
        .collect::<Vec<_>>()
        .join("\n");
    if doc.is_empty() {
        None
    } else {
        Some(truncate_to_char_boundary(&doc, MAX_DOC_LEN).to_string())
    }
}

fn strip_comment_markers(line: &str) -> String {
    let mut l = line.trim();
    for prefix in ["///", "//!", "//", "/**", "/*", "#"] {
        if let Some(rest) = l.strip_prefix(prefix) {
            l = rest;
            break;
        }
    }
    let l = l.trim_end_matches("*/").trim();
    l.strip_prefix('*').unwrap_or(l).trim().to_string()
}

fn python_docstring(node: Node, source: &str) -> Option<String> {
    let body = node.child_by_field_name("body")?;
    let mut cursor = body.walk();
    let first = body.named_children(&mut cursor).next()?;
    if first.kind() != "expression_statement" {
        return None;
    }
    let mut inner = first.walk();
    let string = first.named_children(&mut inner).next()?;
    if string.kind() != "string" {
        return None;
    }
    let text = node_text(string, source)
        .trim_start_matches(|c| c == 'r' || c == 'u' || c == 'b')
        .trim_matches(|c| c == '"' || c == '\'')
        .trim();
    if text.is_empty() {
        None
    } else {
        Some(truncate_to_char_boundary(text, MAX_DOC_LEN).to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(unit: &FileUnit) -> Vec<(String, SymbolKind)> {
        unit.symbols
            .iter()
            .map(|s| (s.name.clone(), s.kind))
            .collect()
    }

    fn find<'u>(unit: &'u FileUnit, name: &str) -> &'u Symbol {
        unit.symbols
            .iter()
            .find(|s| s.name == name)
            .unwrap_or_else(|| panic!("symbol {} not found in {:?}", name, names(unit)))
    }

    #[test]
    fn test_extract_rust_items() {
        let source = r#"
use crate::graph::{CodeGraph, Edge};
mod walker;

/// Holds engine state.
#[derive(Debug)]
pub struct Engine {
    repos: Vec<String>,
}

impl Engine {
    pub fn new() -> Self {
        Self::helper();
        Engine { repos: Vec::new() }
    }

    fn helper() {}
}

impl std::fmt::Display for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "engine")
    }
}

pub const LIMIT: usize = 10;
"#;
        let unit = extract_file("src/engine.rs", source, Lang::Rust).unwrap();

        let engine = unit
            .symbols
            .iter()
            .find(|s| s.name == "Engine" && s.kind == SymbolKind::Struct)
            .unwrap();
        assert!(engine.exported);
        assert_eq!(engine.doc.as_deref(), Some("Holds engine state."));

        let new = find(&unit, "new");
        assert_eq!(new.kind, SymbolKind::Method);
        assert_eq!(new.container.as_deref(), Some("Engine"));
        assert_eq!(new.qualified_name(), "Engine::new");
        assert!(new.scope.is_some());

        let helper = find(&unit, "helper");
        assert!(!helper.exported);

        // trait impl methods are reachable through the trait
        assert!(find(&unit, "fmt").exported);
        assert_eq!(find(&unit, "LIMIT").kind, SymbolKind::Constant);

        let call = unit.calls.iter().find(|c| c.callee == "helper").unwrap();
        assert_eq!(call.caller, Some(new.id));
        assert_eq!(call.receiver.as_deref(), Some("Self"));

        let modules: Vec<&str> = unit.imports.iter().map(|i| i.module.as_str()).collect();
        assert!(modules.contains(&"crate::graph"));
        assert!(modules.contains(&"self::walker"));
        let graph_import = unit.imports.iter().find(|i| i.module == "crate::graph").unwrap();
        assert_eq!(graph_import.names, vec!["CodeGraph", "Edge"]);
    }

    #[test]
    fn test_extract_python_class_and_docstring() {
        let source = r#"
from .models import User, Account
import os.path

MAX_USERS = 100

class UserService:
    """Manage users."""

    def __init__(self):
        self.users = []

    def add(self, name):
        validate(name)
        self.users.append(User(name))

def _private():
    pass

def validate(name):
    return bool(name)
"#;
        let unit = extract_file("app/service.py", source, Lang::Python).unwrap();

        let class = find(&unit, "UserService");
        assert_eq!(class.kind, SymbolKind::Class);
        assert_eq!(class.doc.as_deref(), Some("Manage users."));

        let add = find(&unit, "add");
        assert_eq!(add.kind, SymbolKind::Method);
        assert_eq!(add.container.as_deref(), Some("UserService"));

        assert!(!find(&unit, "_private").exported);
        assert!(find(&unit, "validate").exported);
        assert_eq!(find(&unit, "MAX_USERS").kind, SymbolKind::Constant);

        let callees: Vec<&str> = unit.calls.iter().map(|c| c.callee.as_str()).collect();
        assert!(callees.contains(&"validate"));
        assert!(callees.contains(&"User"));
        assert!(callees.contains(&"append"));

        let from = unit.imports.iter().find(|i| i.module == ".models").unwrap();
        assert_eq!(from.names, vec!["User", "Account"]);
        assert!(unit.imports.iter().any(|i| i.module == "os.path"));
    }

    #[test]
    fn test_extract_typescript_exports_and_arrows() {
        let source = r#"
import { greet } from './utils';
import React from "react";

export interface User { id: number }

export class UserStore {
    load(id: number): User {
        return fetchUser(id);
    }
}

export const formatName = (u: User) => greet(u.name);

function internal() {}
"#;
        let unit = extract_file("src/store.ts", source, Lang::TypeScript).unwrap();

        assert_eq!(find(&unit, "User").kind, SymbolKind::Interface);
        assert!(find(&unit, "UserStore").exported);
        let load = find(&unit, "load");
        assert_eq!(load.kind, SymbolKind::Method);
        assert_eq!(load.container.as_deref(), Some("UserStore"));

        let arrow = find(&unit, "formatName");
        assert_eq!(arrow.kind, SymbolKind::Function);
        assert!(arrow.exported);
        assert!(!find(&unit, "internal").exported);

        let utils = unit.imports.iter().find(|i| i.module == "./utils").unwrap();
        assert_eq!(utils.names, vec!["greet"]);
        assert!(unit.imports.iter().any(|i| i.module == "react"));

        let greet_call = unit.calls.iter().find(|c| c.callee == "greet").unwrap();
        assert_eq!(greet_call.caller, Some(arrow.id));
    }

    #[test]
    fn test_extract_go_methods_and_types() {
        let source = r#"
package store

import (
    "fmt"
    "example.com/app/internal/db"
)

type Store struct {
    conn db.Conn
}

type Reader interface {
    Read() error
}

func (s *Store) Save(key string) error {
    fmt.Println(key)
    return s.conn.Exec(key)
}

func helper() {}
"#;
        let unit = extract_file("store/store.go", source, Lang::Go).unwrap();

        assert_eq!(find(&unit, "Store").kind, SymbolKind::Struct);
        assert_eq!(find(&unit, "Reader").kind, SymbolKind::Interface);
        let save = find(&unit, "Save");
        assert_eq!(save.kind, SymbolKind::Method);
        assert_eq!(save.container.as_deref(), Some("Store"));
        assert!(save.exported);
        assert!(!find(&unit, "helper").exported);

        let modules: Vec<&str> = unit.imports.iter().map(|i| i.module.as_str()).collect();
        assert_eq!(modules, vec!["fmt", "example.com/app/internal/db"]);
        assert!(unit.calls.iter().any(|c| c.callee == "Exec"));
    }

    #[test]
    fn test_extract_java_class() {
        let source = r#"
package com.example;

import com.example.util.Strings;

public class Greeter {
    public String greet(String name) {
        return Strings.capitalize(name);
    }

    private void unused() {}
}
"#;
        let unit = extract_file("src/main/java/com/example/Greeter.java", source, Lang::Java).unwrap();
        assert!(find(&unit, "Greeter").exported);
        let greet = find(&unit, "greet");
        assert_eq!(greet.kind, SymbolKind::Method);
        assert!(greet.exported);
        assert!(!find(&unit, "unused").exported);
        assert!(unit.imports.iter().any(|i| i.module == "com.example.util.Strings"));
        assert!(unit.calls.iter().any(|c| c.callee == "capitalize"));
    }

    #[test]
    fn test_extract_c_functions_and_includes() {
        let source = r#"
#include "util.h"
#include <stdio.h>

struct point { int x; int y; };

static int helper(int a) { return a * 2; }

int main(void) {
    printf("%d\n", helper(2));
    return 0;
}
"#;
        let unit = extract_file("src/main.c", source, Lang::C).unwrap();
        assert_eq!(find(&unit, "point").kind, SymbolKind::Struct);
        assert!(!find(&unit, "helper").exported);
        assert!(find(&unit, "main").exported);
        let modules: Vec<&str> = unit.imports.iter().map(|i| i.module.as_str()).collect();
        assert_eq!(modules, vec!["util.h", "stdio.h"]);
        assert!(unit.calls.iter().any(|c| c.callee == "helper"));
    }

    #[test]
    fn test_extract_bash_functions_and_source() {
        let source = "#!/bin/bash\nsource ./lib.sh\n\ndeploy() {\n  build_image\n}\n\nbuild_image() {\n  docker build .\n}\n";
        let unit = extract_file("scripts/deploy.sh", source, Lang::Bash).unwrap();
        assert_eq!(find(&unit, "deploy").kind, SymbolKind::Function);
        assert!(unit.imports.iter().any(|i| i.module == "./lib.sh"));
        assert!(unit.calls.iter().any(|c| c.callee == "build_image"));
    }

    #[test]
    fn test_extract_markdown_headings() {
        let source = "# Guide\n\nIntro.\n\n## Install\n\nRun it.\n";
        let unit = extract_file("docs/guide.md", source, Lang::Markdown).unwrap();
        let headings: Vec<&str> = unit.symbols.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(headings, vec!["Guide", "Install"]);
        assert!(unit.symbols.iter().all(|s| s.kind == SymbolKind::Section));
    }

    #[test]
    fn test_syntax_errors_are_counted_not_fatal() {
        let unit = extract_file("src/broken.rs", "fn ok() {}\nfn broken( {\n", Lang::Rust).unwrap();
        assert!(unit.error_nodes > 0);
        assert!(unit.symbols.iter().any(|s| s.name == "ok"));
    }

    #[test]
    fn test_truncate_to_char_boundary() {
        assert_eq!(truncate_to_char_boundary("héllo", 2), "h");
        assert_eq!(truncate_to_char_boundary("abc", 10), "abc");
    }

    #[test]
    fn test_deeply_nested_source_runs_on_small_stack() {
        let depth = 5_000;
        let source = format!(
            "function outer() {{\n  return {}{};\n}}\n\nfunction after() {{\n  outer();\n}}\n",
            "[".repeat(depth),
            "]".repeat(depth)
        );
        let unit = std::thread::Builder::new()
            .stack_size(1024 * 1024)
            .spawn(move || extract_file("dist/bundle.js", &source, Lang::JavaScript).unwrap())
            .unwrap()
            .join()
            .unwrap();
        assert_eq!(unit.error_nodes, 0);
        assert_eq!(find(&unit, "outer").kind, SymbolKind::Function);
        let call = unit.calls.iter().find(|c| c.callee == "outer").unwrap();
        assert_eq!(call.caller, Some(find(&unit, "after").id));
    }
}
