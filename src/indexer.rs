//! Repository indexing: walk, reconcile, parse in parallel, link
//!
//! [`index_repository`] turns a working tree (plus an optional previous
//! snapshot) into a fresh, validated [`IndexSnapshot`]. [`RepoIndex`] wraps a
//! snapshot with the derived query structures.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU8, AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use rayon::prelude::*;
use tracing::{debug, info, warn};

use crate::error::Result;
use crate::extract::extract_file;
use crate::graph::{build_edges, CodeGraph};
use crate::index::{symbol_terms, Bm25Index, SymbolTable, TfIdfIndex};
use crate::lang::Lang;
use crate::schema::{fnv1a_hash, FileRecord, FileUnit, ParseStatus};
use crate::snapshot::{FileEntry, IndexSnapshot};
use crate::walker::{self, SourceFile, WalkOptions};

/// Options for one indexing run
#[derive(Debug, Clone, Default)]
pub struct IndexOptions {
    pub walk: WalkOptions,
    /// Resolve call sites into call edges
    pub call_graph: bool,
}

/// Indexing phase, reported through [`IndexProgress`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexPhase {
    Walking,
    Parsing,
    Linking,
    Done,
}

impl IndexPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Walking => "walking",
            Self::Parsing => "parsing",
            Self::Linking => "linking",
            Self::Done => "done",
        }
    }

    fn from_u8(value: u8) -> Self {
        match value {
            0 => Self::Walking,
            1 => Self::Parsing,
            2 => Self::Linking,
            _ => Self::Done,
        }
    }
}

/// Lock-free progress counters shared with status queries
#[derive(Debug, Default)]
pub struct IndexProgress {
    phase: AtomicU8,
    done: AtomicUsize,
    total: AtomicUsize,
}

impl IndexProgress {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn phase(&self) -> IndexPhase {
        IndexPhase::from_u8(self.phase.load(Ordering::Relaxed))
    }

    /// (done, total) files
    pub fn counts(&self) -> (usize, usize) {
        (
            self.done.load(Ordering::Relaxed),
            self.total.load(Ordering::Relaxed),
        )
    }

    pub fn reset(&self) {
        self.set_phase(IndexPhase::Walking);
        self.done.store(0, Ordering::Relaxed);
        self.total.store(0, Ordering::Relaxed);
    }

    fn set_phase(&self, phase: IndexPhase) {
        self.phase.store(phase as u8, Ordering::Relaxed);
    }
}

/// What one indexing run did
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IndexStats {
    pub files: usize,
    /// Files parsed in this run
    pub parsed: usize,
    /// Files carried over from the previous snapshot
    pub reused: usize,
    pub removed: usize,
    pub failed: usize,
    pub symbols: usize,
    pub edges: usize,
    pub elapsed: Duration,
}

/// Index a repository, reusing unchanged files from `previous`
pub fn index_repository(
    root: &Path,
    options: &IndexOptions,
    previous: Option<IndexSnapshot>,
    progress: &IndexProgress,
) -> Result<(IndexSnapshot, IndexStats)> {
    let started = Instant::now();
    progress.reset();

    let walked = walker::walk_repository(root, &options.walk)?;
    debug!("walked {} source files under {}", walked.len(), root.display());

    let repo_root = root.display().to_string();
    let mut previous = previous.filter(|p| {
        let same_root = p.repo_root == repo_root;
        if !same_root {
            warn!("cached index was built for {}, rebuilding", p.repo_root);
        }
        same_root
    });

    let mut stats = IndexStats::default();
    let mut files: BTreeMap<String, FileEntry> = BTreeMap::new();
    let mut jobs: Vec<(SourceFile, Option<FileEntry>)> = Vec::new();

    match previous.as_mut() {
        Some(prev) => {
            let plan = prev.reconcile(&walked);
            stats.removed = plan.removed.len();
            for path in plan.unchanged {
                if let Some(entry) = prev.files.remove(&path) {
                    files.insert(path, entry);
                }
            }
            for file in plan.stale {
                let old = prev.files.remove(&file.rel_path);
                jobs.push((file, old));
            }
            jobs.extend(plan.added.into_iter().map(|f| (f, None)));
        }
        None => jobs.extend(walked.into_iter().map(|f| (f, None))),
    }
    stats.reused = files.len();

    progress.set_phase(IndexPhase::Parsing);
    progress.total.store(files.len() + jobs.len(), Ordering::Relaxed);
    progress.done.store(files.len(), Ordering::Relaxed);

    let processed: Vec<(FileEntry, bool)> = jobs
        .into_par_iter()
        .filter_map(|(file, old)| {
            let result = process_file(&file, old);
            progress.done.fetch_add(1, Ordering::Relaxed);
            result
        })
        .collect();

    for (entry, parsed) in processed {
        if parsed {
            stats.parsed += 1;
        } else {
            stats.reused += 1;
        }
        files.insert(entry.record.path.clone(), entry);
    }

    progress.set_phase(IndexPhase::Linking);
    let mut snapshot = IndexSnapshot::new(repo_root, options.call_graph);
    snapshot.edges = build_edges(&files, options.call_graph);
    snapshot.files = files;
    snapshot.validate()?;

    stats.files = snapshot.files.len();
    stats.failed = snapshot.failed_files();
    stats.symbols = snapshot.symbol_count();
    stats.edges = snapshot.edges.len();
    stats.elapsed = started.elapsed();
    progress.set_phase(IndexPhase::Done);

    info!(
        "indexed {}: {} files ({} parsed, {} reused, {} removed, {} failed), {} symbols, {} edges in {:.2?}",
        root.display(),
        stats.files,
        stats.parsed,
        stats.reused,
        stats.removed,
        stats.failed,
        stats.symbols,
        stats.edges,
        stats.elapsed
    );
    Ok((snapshot, stats))
}

/// Re-index a subset of files. Paths that no longer exist, stopped being
/// indexable or are ignored the way a full walk ignores them are dropped
/// from the snapshot.
pub fn update_files(
    snapshot: &IndexSnapshot,
    root: &Path,
    changed: &[PathBuf],
    options: &IndexOptions,
) -> Result<IndexSnapshot> {
    let rules = walker::IgnoreRules::new(root, &options.walk);
    let mut files = snapshot.files.clone();
    for path in changed {
        let abs = if path.is_absolute() {
            path.clone()
        } else {
            root.join(path)
        };
        let rel = walker::relative_path(root, &abs);
        match rules.source_file(&abs) {
            Some(file) => {
                let old = files.remove(&rel);
                if let Some((entry, _)) = process_file(&file, old) {
                    files.insert(rel, entry);
                }
            }
            None => {
                if files.remove(&rel).is_some() {
                    debug!("dropped {} from index", rel);
                }
            }
        }
    }

    let mut updated = IndexSnapshot::new(snapshot.repo_root.clone(), options.call_graph);
    updated.edges = build_edges(&files, options.call_graph);
    updated.files = files;
    updated.validate()?;
    Ok(updated)
}

/// Read, hash and (when the content changed) parse one file.
/// Returns the entry and whether it was parsed; `None` when the file vanished.
fn process_file(file: &SourceFile, old: Option<FileEntry>) -> Option<(FileEntry, bool)> {
    let bytes = match fs::read(&file.abs_path) {
        Ok(b) => b,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return None,
        Err(e) => {
            warn!("cannot read {}: {}", file.rel_path, e);
            return Some((
                failed_entry(file, 0, format!("unreadable: {}", e)),
                true,
            ));
        }
    };
    let hash = fnv1a_hash(&bytes);

    if let Some(mut entry) = old {
        if entry.record.hash == hash && entry.record.lang == file.lang {
            entry.record.size = file.size;
            entry.record.mtime_ms = file.mtime_ms;
            return Some((entry, false));
        }
    }

    Some((parse_file(file, &bytes, hash), true))
}

fn parse_file(file: &SourceFile, bytes: &[u8], hash: u64) -> FileEntry {
    let source = match std::str::from_utf8(bytes) {
        Ok(s) => s,
        Err(_) => return failed_entry(file, hash, "not valid UTF-8".to_string()),
    };
    match extract_file(&file.rel_path, source, file.lang) {
        Ok(unit) => {
            let status = if unit.error_nodes > 0 {
                ParseStatus::Partial {
                    error_nodes: unit.error_nodes,
                }
            } else {
                ParseStatus::Parsed
            };
            FileEntry {
                record: record(file, hash, status),
                unit,
            }
        }
        Err(e) => {
            warn!("failed to parse {}: {}", file.rel_path, e);
            failed_entry(file, hash, e.to_string())
        }
    }
}

fn failed_entry(file: &SourceFile, hash: u64, message: String) -> FileEntry {
    FileEntry {
        record: record(file, hash, ParseStatus::Failed { message }),
        unit: FileUnit::default(),
    }
}

fn record(file: &SourceFile, hash: u64, status: ParseStatus) -> FileRecord {
    FileRecord {
        path: file.rel_path.clone(),
        lang: file.lang,
        size: file.size,
        mtime_ms: file.mtime_ms,
        hash,
        status,
    }
}

/// A repository snapshot plus the structures queries run against
#[derive(Debug)]
pub struct RepoIndex {
    pub name: String,
    pub root: PathBuf,
    pub snapshot: IndexSnapshot,
    pub symbols: SymbolTable,
    pub bm25: Bm25Index,
    pub tfidf: TfIdfIndex,
    pub graph: CodeGraph,
}

impl RepoIndex {
    /// Build the symbol table, text indexes and graph for a snapshot
    pub fn from_snapshot(name: impl Into<String>, root: impl Into<PathBuf>, snapshot: IndexSnapshot) -> Self {
        let symbols = SymbolTable::from_symbols(snapshot.symbols().cloned());

        let mut bm25 = Bm25Index::new();
        let mut tfidf = TfIdfIndex::new();
        for symbol in symbols.iter() {
            let terms = symbol_terms(symbol);
            bm25.add_document(symbol.id, &terms);
            tfidf.add_document(symbol.id, &terms);
        }
        bm25.finalize();
        tfidf.finalize();

        let graph = CodeGraph::from_edges(snapshot.edges.clone(), snapshot.call_graph);

        Self {
            name: name.into(),
            root: root.into(),
            snapshot,
            symbols,
            bm25,
            tfidf,
            graph,
        }
    }

    pub fn file(&self, path: &str) -> Option<&FileEntry> {
        self.snapshot.files.get(path)
    }

    /// File counts per language
    pub fn language_counts(&self) -> BTreeMap<Lang, usize> {
        let mut counts = BTreeMap::new();
        for entry in self.snapshot.files.values() {
            *counts.entry(entry.record.lang).or_insert(0) += 1;
        }
        counts
    }

    pub fn partial_files(&self) -> usize {
        self.snapshot
            .files
            .values()
            .filter(|f| matches!(f.record.status, ParseStatus::Partial { .. }))
            .count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{EdgeKind, NodeRef};
    use tempfile::TempDir;

    fn write(root: &Path, rel: &str, content: &str) {
        let path = root.join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, content).unwrap();
    }

    fn sample_repo() -> TempDir {
        let dir = TempDir::new().unwrap();
        write(
            dir.path(),
            "app/main.py",
            "from app.util import helper\n\ndef main():\n    helper()\n",
        );
        write(dir.path(), "app/util.py", "def helper():\n    return 1\n");
        write(dir.path(), "app/__init__.py", "");
        dir
    }

    fn options() -> IndexOptions {
        IndexOptions {
            call_graph: true,
            ..Default::default()
        }
    }

    #[test]
    fn test_index_repository_builds_edges() {
        let dir = sample_repo();
        let progress = IndexProgress::new();
        let (snapshot, stats) = index_repository(dir.path(), &options(), None, &progress).unwrap();

        assert_eq!(stats.files, 3);
        assert_eq!(stats.parsed, 3);
        assert_eq!(progress.phase(), IndexPhase::Done);
        assert_eq!(progress.counts(), (3, 3));

        let index = RepoIndex::from_snapshot("sample", dir.path(), snapshot);
        let helper = index.symbols.by_name("helper")[0];
        let incoming = index.graph.incoming_calls(helper.id);
        assert_eq!(incoming.len(), 1);
        assert!(index
            .snapshot
            .edges
            .iter()
            .any(|e| e.kind == EdgeKind::Import && e.target == NodeRef::File("app/util.py".into())));
        assert!(!index.bm25.search("helper", 5).is_empty());
    }

    #[test]
    fn test_incremental_reuses_unchanged_files() {
        let dir = sample_repo();
        let progress = IndexProgress::new();
        let (first, _) = index_repository(dir.path(), &options(), None, &progress).unwrap();

        write(dir.path(), "app/extra.py", "def extra():\n    pass\n");
        fs::remove_file(dir.path().join("app/__init__.py")).unwrap();
        let (second, stats) = index_repository(dir.path(), &options(), Some(first), &progress).unwrap();

        assert_eq!(stats.parsed, 1);
        assert_eq!(stats.reused, 2);
        assert_eq!(stats.removed, 1);
        assert!(second.files.contains_key("app/extra.py"));
        assert!(!second.files.contains_key("app/__init__.py"));
    }

    #[test]
    fn test_touched_but_identical_file_is_not_reparsed() {
        let dir = sample_repo();
        let progress = IndexProgress::new();
        let (mut first, _) = index_repository(dir.path(), &options(), None, &progress).unwrap();
        // Pretend the file changed on disk since the snapshot was taken
        first.files.get_mut("app/util.py").unwrap().record.mtime_ms += 1;

        let (_, stats) = index_repository(dir.path(), &options(), Some(first), &progress).unwrap();
        assert_eq!(stats.parsed, 0);
        assert_eq!(stats.reused, 3);
    }

    #[test]
    fn test_non_utf8_file_is_failed_not_fatal() {
        let dir = sample_repo();
        fs::write(dir.path().join("app/bad.py"), [0xff, 0xfe, 0x00, 0x41]).unwrap();
        let progress = IndexProgress::new();
        let (snapshot, stats) = index_repository(dir.path(), &options(), None, &progress).unwrap();
        assert_eq!(stats.failed, 1);
        assert!(snapshot.files["app/bad.py"].record.status.is_failed());
    }

    #[test]
    fn test_update_files_adds_and_removes() {
        let dir = sample_repo();
        let progress = IndexProgress::new();
        let (snapshot, _) = index_repository(dir.path(), &options(), None, &progress).unwrap();

        write(dir.path(), "app/util.py", "def helper():\n    return 2\n\ndef other():\n    helper()\n");
        fs::remove_file(dir.path().join("app/main.py")).unwrap();
        let updated = update_files(
            &snapshot,
            dir.path(),
            &[dir.path().join("app/util.py"), PathBuf::from("app/main.py")],
            &options(),
        )
        .unwrap();

        assert!(!updated.files.contains_key("app/main.py"));
        let names: Vec<&str> = updated.files["app/util.py"]
            .unit
            .symbols
            .iter()
            .map(|s| s.name.as_str())
            .collect();
        assert_eq!(names, vec!["helper", "other"]);
    }

    #[test]
    fn test_update_files_skips_gitignored_paths() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), ".gitignore", "generated/\n");
        write(dir.path(), "lib.py", "def lib():\n    pass\n");
        let progress = IndexProgress::new();
        let (snapshot, _) = index_repository(dir.path(), &options(), None, &progress).unwrap();
        assert_eq!(snapshot.files.keys().collect::<Vec<_>>(), vec!["lib.py"]);

        write(dir.path(), "generated/out.py", "def out():\n    pass\n");
        write(dir.path(), ".tools/hook.py", "def hook():\n    pass\n");
        let updated = update_files(
            &snapshot,
            dir.path(),
            &[dir.path().join("generated/out.py"), dir.path().join(".tools/hook.py")],
            &options(),
        )
        .unwrap();
        assert_eq!(updated.files.keys().collect::<Vec<_>>(), vec!["lib.py"]);
    }

    #[test]
    fn test_update_files_honors_extra_excludes() {
        let dir = sample_repo();
        let opts = IndexOptions {
            walk: WalkOptions {
                extra_excludes: vec!["*_pb2.py".to_string()],
                ..Default::default()
            },
            call_graph: true,
        };
        let progress = IndexProgress::new();
        let (snapshot, _) = index_repository(dir.path(), &opts, None, &progress).unwrap();

        write(dir.path(), "app/model_pb2.py", "class Model:\n    pass\n");
        let updated = update_files(&snapshot, dir.path(), &[dir.path().join("app/model_pb2.py")], &opts).unwrap();
        assert!(!updated.files.contains_key("app/model_pb2.py"));
        assert_eq!(updated.files.len(), 3);
    }

    #[test]
    fn test_update_files_matches_full_index() {
        let dir = sample_repo();
        write(dir.path(), ".gitignore", "scratch/\n");
        let progress = IndexProgress::new();
        let (snapshot, _) = index_repository(dir.path(), &options(), None, &progress).unwrap();

        write(dir.path(), "app/util.py", "def helper():\n    return other()\n\ndef other():\n    return 3\n");
        write(dir.path(), "app/extra.py", "from app.util import other\n\ndef extra():\n    other()\n");
        write(dir.path(), "scratch/try.py", "def attempt():\n    pass\n");
        fs::remove_file(dir.path().join("app/__init__.py")).unwrap();
        let changed: Vec<PathBuf> = ["app/util.py", "app/extra.py", "scratch/try.py", "app/__init__.py"]
            .iter()
            .map(|rel| dir.path().join(rel))
            .collect();
        let updated = update_files(&snapshot, dir.path(), &changed, &options()).unwrap();

        let (full, _) = index_repository(dir.path(), &options(), None, &progress).unwrap();
        assert_eq!(updated.files, full.files);
        assert_eq!(updated.edges, full.edges);
    }
}
