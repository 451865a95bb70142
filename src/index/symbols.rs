//! Symbol table keyed by id, name, kind and file

use std::collections::BTreeMap;

use ahash::AHashMap;
use regex::RegexBuilder;

use crate::error::{NarsilError, Result};
use crate::schema::{Symbol, SymbolId, SymbolKind};

/// Filter for [`SymbolTable::find`]
#[derive(Debug, Clone, Default)]
pub struct SymbolFilter {
    pub kind: Option<SymbolKind>,
    /// Path prefix or substring of the defining file
    pub file: Option<String>,
    /// Case-insensitive name substring, or a regex when it contains regex syntax
    pub pattern: Option<String>,
    pub exported_only: bool,
    pub limit: Option<usize>,
}

#[derive(Debug, Clone, Default)]
pub struct SymbolTable {
    symbols: Vec<Symbol>,
    by_id: AHashMap<SymbolId, usize>,
    by_name: AHashMap<String, Vec<usize>>,
    by_lower_name: AHashMap<String, Vec<usize>>,
    by_file: BTreeMap<String, Vec<usize>>,
}

impl SymbolTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_symbols<I: IntoIterator<Item = Symbol>>(symbols: I) -> Self {
        let mut table = Self::new();
        for symbol in symbols {
            table.insert(symbol);
        }
        table
    }

    /// Insert a symbol. A symbol with an id already present is ignored.
    pub fn insert(&mut self, symbol: Symbol) {
        if self.by_id.contains_key(&symbol.id) {
            return;
        }
        let idx = self.symbols.len();
        self.by_id.insert(symbol.id, idx);
        self.by_name.entry(symbol.name.clone()).or_default().push(idx);
        self.by_lower_name
            .entry(symbol.name.to_lowercase())
            .or_default()
            .push(idx);
        self.by_file.entry(symbol.file.clone()).or_default().push(idx);
        self.symbols.push(symbol);
    }

    pub fn len(&self) -> usize {
        self.symbols.len()
    }

    pub fn is_empty(&self) -> bool {
        self.symbols.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Symbol> {
        self.symbols.iter()
    }

    pub fn get(&self, id: SymbolId) -> Option<&Symbol> {
        self.by_id.get(&id).map(|&i| &self.symbols[i])
    }

    pub fn by_name(&self, name: &str) -> Vec<&Symbol> {
        self.collect(self.by_name.get(name))
    }

    pub fn by_name_ci(&self, name: &str) -> Vec<&Symbol> {
        self.collect(self.by_lower_name.get(&name.to_lowercase()))
    }

    pub fn in_file(&self, file: &str) -> Vec<&Symbol> {
        self.collect(self.by_file.get(file))
    }

    pub fn files(&self) -> impl Iterator<Item = &str> {
        self.by_file.keys().map(String::as_str)
    }

    /// Resolve a user-supplied symbol reference.
    ///
    /// Accepts a hex id, a qualified name (`Engine::new`, `Engine.new`) or a
    /// plain name, exact match first and case-insensitive second.
    pub fn lookup(&self, query: &str) -> Vec<&Symbol> {
        let query = query.trim();
        if let Ok(id) = query.parse::<SymbolId>() {
            if let Some(symbol) = self.get(id) {
                return vec![symbol];
            }
        }

        if let Some((container, name)) = split_qualified(query) {
            let matches: Vec<&Symbol> = self
                .by_name(name)
                .into_iter()
                .filter(|s| s.container.as_deref() == Some(container))
                .collect();
            if !matches.is_empty() {
                return matches;
            }
        }

        let exact = self.by_name(query);
        if !exact.is_empty() {
            return exact;
        }
        self.by_name_ci(query)
    }

    pub fn find(&self, filter: &SymbolFilter) -> Result<Vec<&Symbol>> {
        let matcher = filter.pattern.as_deref().map(NameMatcher::new).transpose()?;
        let limit = filter.limit.unwrap_or(usize::MAX);

        let mut results: Vec<&Symbol> = self
            .symbols
            .iter()
            .filter(|s| filter.kind.map(|k| s.kind == k).unwrap_or(true))
            .filter(|s| {
                filter
                    .file
                    .as_deref()
                    .map(|f| s.file.starts_with(f) || s.file.contains(f))
                    .unwrap_or(true)
            })
            .filter(|s| !filter.exported_only || s.exported)
            .filter(|s| matcher.as_ref().map(|m| m.is_match(&s.name)).unwrap_or(true))
            .collect();
        results.sort_by(|a, b| {
            a.file
                .cmp(&b.file)
                .then(a.span.start_line.cmp(&b.span.start_line))
                .then_with(|| a.name.cmp(&b.name))
        });
        results.truncate(limit);
        Ok(results)
    }

    fn collect(&self, indices: Option<&Vec<usize>>) -> Vec<&Symbol> {
        indices
            .map(|v| v.iter().map(|&i| &self.symbols[i]).collect())
            .unwrap_or_default()
    }
}

fn split_qualified(query: &str) -> Option<(&str, &str)> {
    if let Some((container, name)) = query.rsplit_once("::") {
        return Some((container.rsplit("::").next().unwrap_or(container), name));
    }
    let (container, name) = query.rsplit_once('.')?;
    Some((container.rsplit('.').next().unwrap_or(container), name))
}

enum NameMatcher {
    Substring(String),
    Regex(regex::Regex),
}

impl NameMatcher {
    fn new(pattern: &str) -> Result<Self> {
        const REGEX_CHARS: &[char] = &['^', '$', '*', '+', '?', '(', ')', '[', ']', '{', '}', '|', '\\', '.'];
        if pattern.contains(REGEX_CHARS) {
            let regex = RegexBuilder::new(pattern)
                .case_insensitive(true)
                .build()
                .map_err(|e| NarsilError::query(format!("invalid pattern '{}': {}", pattern, e)))?;
            Ok(Self::Regex(regex))
        } else {
            Ok(Self::Substring(pattern.to_lowercase()))
        }
    }

    fn is_match(&self, name: &str) -> bool {
        match self {
            Self::Substring(s) => name.to_lowercase().contains(s),
            Self::Regex(r) => r.is_match(name),
        }
    }
}
