//! Index snapshot: the persisted, self-consistent bundle of files, symbols and edges

use std::collections::{BTreeMap, HashSet};

use serde::{Deserialize, Serialize};

use crate::error::{NarsilError, Result};
use crate::schema::{Edge, FileRecord, FileUnit, NodeRef, Symbol, SymbolId, SCHEMA_VERSION};
use crate::walker::SourceFile;

/// One file's record and extraction result
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileEntry {
    pub record: FileRecord,
    pub unit: FileUnit,
}

/// Everything known about a repository at one point in time
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexSnapshot {
    pub schema_version: u32,
    pub repo_root: String,
    /// RFC 3339 timestamp of the last (re)index
    pub indexed_at: String,
    /// Whether call edges were built
    pub call_graph: bool,
    /// Keyed by repository-relative path
    pub files: BTreeMap<String, FileEntry>,
    pub edges: Vec<Edge>,
}

impl IndexSnapshot {
    pub fn new(repo_root: impl Into<String>, call_graph: bool) -> Self {
        Self {
            schema_version: SCHEMA_VERSION,
            repo_root: repo_root.into(),
            indexed_at: chrono::Utc::now().to_rfc3339(),
            call_graph,
            files: BTreeMap::new(),
            edges: Vec::new(),
        }
    }

    pub fn symbols(&self) -> impl Iterator<Item = &Symbol> {
        self.files.values().flat_map(|f| f.unit.symbols.iter())
    }

    pub fn symbol_count(&self) -> usize {
        self.files.values().map(|f| f.unit.symbols.len()).sum()
    }

    pub fn failed_files(&self) -> usize {
        self.files
            .values()
            .filter(|f| f.record.status.is_failed())
            .count()
    }

    /// Check the self-consistency invariant.
    ///
    /// Every symbol or file an edge names exists in this snapshot, every symbol
    /// is filed under its own path, and every scope or caller points at a
    /// symbol of the same file.
    pub fn validate(&self) -> Result<()> {
        if self.schema_version != SCHEMA_VERSION {
            return Err(NarsilError::SnapshotInconsistent {
                message: format!(
                    "schema version {} does not match {}",
                    self.schema_version, SCHEMA_VERSION
                ),
            });
        }

        let mut all_ids: HashSet<SymbolId> = HashSet::new();
        for (path, entry) in &self.files {
            if entry.record.path != *path {
                return Err(inconsistent(format!("record for {} is filed under {}", entry.record.path, path)));
            }
            let file_ids: HashSet<SymbolId> = entry.unit.symbols.iter().map(|s| s.id).collect();
            for symbol in &entry.unit.symbols {
                if symbol.file != *path {
                    return Err(inconsistent(format!("symbol {} claims file {} but is filed under {}", symbol.name, symbol.file, path)));
                }
                if let Some(scope) = symbol.scope {
                    if !file_ids.contains(&scope) {
                        return Err(inconsistent(format!("symbol {} has a scope outside {}", symbol.name, path)));
                    }
                }
            }
            for call in &entry.unit.calls {
                if let Some(caller) = call.caller {
                    if !file_ids.contains(&caller) {
                        return Err(inconsistent(format!("call to {} in {} has an unknown caller", call.callee, path)));
                    }
                }
            }
            all_ids.extend(file_ids);
        }

        for edge in &self.edges {
            for node in [&edge.source, &edge.target] {
                match node {
                    NodeRef::Symbol(id) if !all_ids.contains(id) => {
                        return Err(inconsistent(format!("edge references missing symbol {}", id)));
                    }
                    NodeRef::File(path) if !self.files.contains_key(path) => {
                        return Err(inconsistent(format!("edge references missing file {}", path)));
                    }
                    _ => {}
                }
            }
        }
        Ok(())
    }

    /// Compare the snapshot with a fresh walk of the repository
    pub fn reconcile(&self, walked: &[SourceFile]) -> ReconcilePlan {
        let mut plan = ReconcilePlan::default();
        let mut seen: HashSet<&str> = HashSet::new();

        for file in walked {
            seen.insert(file.rel_path.as_str());
            match self.files.get(&file.rel_path) {
                None => plan.added.push(file.clone()),
                Some(entry)
                    if entry.record.size == file.size
                        && entry.record.mtime_ms == file.mtime_ms
                        && entry.record.lang == file.lang =>
                {
                    plan.unchanged.push(file.rel_path.clone())
                }
                Some(_) => plan.stale.push(file.clone()),
            }
        }

        plan.removed = self
            .files
            .keys()
            .filter(|path| !seen.contains(path.as_str()))
            .cloned()
            .collect();
        plan
    }
}

fn inconsistent(message: String) -> NarsilError {
    NarsilError::SnapshotInconsistent { message }
}

/// How a snapshot differs from the working tree
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconcilePlan {
    /// Same size and mtime: reuse as is
    pub unchanged: Vec<String>,
    /// Size or mtime differ: compare content hash, reparse when it changed
    pub stale: Vec<SourceFile>,
    /// Not in the snapshot yet
    pub added: Vec<SourceFile>,
    /// In the snapshot but gone from disk
    pub removed: Vec<String>,
}

impl ReconcilePlan {
    pub fn is_noop(&self) -> bool {
        self.stale.is_empty() && self.added.is_empty() && self.removed.is_empty()
    }
}
