//! Query engine
//!
//! Holds every configured repository, indexes them on background threads and
//! answers queries against the most recent complete index. A repository's
//! index is an `Arc<RepoIndex>` that is replaced wholesale, so a query never
//! sees a half-built index.

use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Weak};

use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use tracing::{debug, error, info, warn};

use crate::cache::{get_cache_base_dir, CacheDir};
use crate::deps::{self, DependencyReport};
use crate::error::{NarsilError, Result};
use crate::fs_utils::canonical_root;
use crate::git::{self, CommitInfo};
use crate::grep::{self, GrepMatch, GrepOptions};
use crate::index::bm25::ScoredDoc;
use crate::index::hybrid_search;
use crate::index::symbols::SymbolFilter;
use crate::indexer::{self, IndexOptions, IndexProgress, IndexStats, RepoIndex};
use crate::neural::{self, EmbeddingBackend, InputKind, NeuralConfig, VectorIndex};
use crate::schema::{EdgeKind, NodeRef, Symbol, SymbolKind};
use crate::security::{self, ScanOptions, ScanReport, ScanTarget, Severity};
use crate::walker::WalkOptions;
use crate::watcher::{FileWatcher, WatcherConfig, WatcherHandle};

pub const DEFAULT_LIMIT: usize = 20;
pub const MAX_LIMIT: usize = 500;
pub const MAX_CALL_DEPTH: usize = 10;

/// Engine configuration, resolved from flags, environment and settings
#[derive(Debug, Clone, Default)]
pub struct EngineOptions {
    pub repos: Vec<PathBuf>,
    /// Ignore cached snapshots
    pub reindex: bool,
    /// Load and save snapshots in the cache directory
    pub persist: bool,
    pub git: bool,
    pub call_graph: bool,
    pub watch: bool,
    pub neural: Option<NeuralConfig>,
    pub walk: WalkOptions,
    /// Overrides the default cache base directory
    pub cache_dir: Option<PathBuf>,
}

/// Indexing state of one repository
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum RepoStatus {
    Indexing {
        phase: String,
        done: usize,
        total: usize,
    },
    Ready,
    Failed {
        message: String,
    },
}

impl RepoStatus {
    pub fn is_ready(&self) -> bool {
        matches!(self, Self::Ready)
    }
}

struct RepoState {
    root: PathBuf,
    progress: Arc<IndexProgress>,
    index: Option<Arc<RepoIndex>>,
    vectors: Option<Arc<VectorIndex>>,
    running: bool,
    failure: Option<String>,
    indexed_at: Option<DateTime<Utc>>,
    last_stats: Option<IndexStats>,
}

impl RepoState {
    fn status(&self) -> RepoStatus {
        if let Some(message) = &self.failure {
            return RepoStatus::Failed {
                message: message.clone(),
            };
        }
        if self.running || self.index.is_none() {
            let (done, total) = self.progress.counts();
            return RepoStatus::Indexing {
                phase: self.progress.phase().as_str().to_string(),
                done,
                total,
            };
        }
        RepoStatus::Ready
    }
}

/// Symbol as reported by queries
#[derive(Debug, Clone, Serialize)]
pub struct SymbolSummary {
    pub id: String,
    pub name: String,
    pub qualified_name: String,
    pub kind: SymbolKind,
    pub file: String,
    pub start_line: usize,
    pub end_line: usize,
    pub signature: String,
    pub exported: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub doc: Option<String>,
}

impl From<&Symbol> for SymbolSummary {
    fn from(symbol: &Symbol) -> Self {
        Self {
            id: symbol.id.to_string(),
            name: symbol.name.clone(),
            qualified_name: symbol.qualified_name(),
            kind: symbol.kind,
            file: symbol.file.clone(),
            start_line: symbol.span.start_line,
            end_line: symbol.span.end_line,
            signature: symbol.signature.clone(),
            exported: symbol.exported,
            doc: symbol.doc.clone(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct RepoSummary {
    pub name: String,
    pub root: String,
    pub status: RepoStatus,
    pub files: usize,
    pub symbols: usize,
    pub indexed_at: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct IndexStatusReport {
    pub name: String,
    pub root: String,
    pub status: RepoStatus,
    pub files: usize,
    pub symbols: usize,
    pub call_edges: usize,
    pub import_edges: usize,
    pub failed_files: usize,
    pub partial_files: usize,
    pub languages: BTreeMap<String, usize>,
    pub call_graph: bool,
    pub indexed_at: Option<String>,
    /// Duration of the last indexing run
    pub last_run_ms: Option<u64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SearchHit {
    pub symbol: SymbolSummary,
    pub score: f64,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub matched_terms: Vec<String>,
}

/// Outcome of `search_code`
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum SearchResults {
    Ranked {
        hits: Vec<SearchHit>,
        related_terms: Vec<String>,
    },
    /// The repository is still indexing; plain text matches instead
    Grep {
        matches: Vec<GrepMatch>,
        done: usize,
        total: usize,
    },
}

#[derive(Debug, Clone, Serialize)]
pub struct Definition {
    pub symbol: SymbolSummary,
    pub source: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ReferenceKind {
    Call,
    /// A call by name that could not be tied to one definition
    PossibleCall,
    Import,
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub struct Reference {
    pub file: String,
    pub line: usize,
    pub kind: ReferenceKind,
    /// Enclosing function or method
    pub context: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct References {
    pub definitions: Vec<SymbolSummary>,
    pub references: Vec<Reference>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CallEntry {
    pub depth: usize,
    pub name: String,
    pub file: Option<String>,
    pub line: usize,
    pub resolved: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct CallTree {
    pub symbol: SymbolSummary,
    pub entries: Vec<CallEntry>,
}

#[derive(Debug, Clone, Serialize)]
pub struct StructureEntry {
    pub depth: usize,
    pub name: String,
    pub is_dir: bool,
    /// Files at or below this entry
    pub files: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct ProjectStructure {
    pub name: String,
    pub root: String,
    pub files: usize,
    pub symbols: usize,
    pub languages: BTreeMap<String, usize>,
    pub entries: Vec<StructureEntry>,
    pub manifests: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ReindexReport {
    pub name: String,
    pub files: usize,
    pub parsed: usize,
    pub removed: usize,
    pub failed: usize,
    pub symbols: usize,
    pub edges: usize,
    pub elapsed_ms: u64,
}

impl ReindexReport {
    fn new(name: &str, stats: &IndexStats) -> Self {
        Self {
            name: name.to_string(),
            files: stats.files,
            parsed: stats.parsed,
            removed: stats.removed,
            failed: stats.failed,
            symbols: stats.symbols,
            edges: stats.edges,
            elapsed_ms: stats.elapsed.as_millis() as u64,
        }
    }
}

/// Multi-repository code intelligence engine
pub struct Engine {
    options: EngineOptions,
    cache_base: PathBuf,
    repos: RwLock<BTreeMap<String, RepoState>>,
    embedder: Option<Box<dyn EmbeddingBackend>>,
    watchers: Mutex<Vec<WatcherHandle>>,
}

impl Engine {
    /// Register the configured repositories. Nothing is indexed yet; call
    /// [`Engine::start_indexing`] or [`Engine::index_blocking`].
    pub fn new(options: EngineOptions) -> Result<Arc<Self>> {
        let mut repos = BTreeMap::new();
        for path in &options.repos {
            if !path.is_dir() {
                return Err(NarsilError::FileNotFound {
                    path: path.display().to_string(),
                });
            }
            let root = canonical_root(path);
            if repos.values().any(|s: &RepoState| s.root == root) {
                debug!("{} listed twice, skipping", root.display());
                continue;
            }
            let name = unique_name(&repos, &root);
            repos.insert(
                name,
                RepoState {
                    root,
                    progress: Arc::new(IndexProgress::new()),
                    index: None,
                    vectors: None,
                    running: false,
                    failure: None,
                    indexed_at: None,
                    last_stats: None,
                },
            );
        }

        let embedder = match &options.neural {
            Some(config) => Some(neural::create_backend(config)?),
            None => None,
        };
        let cache_base = options.cache_dir.clone().unwrap_or_else(get_cache_base_dir);

        Ok(Arc::new(Self {
            options,
            cache_base,
            repos: RwLock::new(repos),
            embedder,
            watchers: Mutex::new(Vec::new()),
        }))
    }

    pub fn options(&self) -> &EngineOptions {
        &self.options
    }

    pub fn repo_names(&self) -> Vec<String> {
        self.repos.read().keys().cloned().collect()
    }

    /// Index every repository on its own thread; starts the watchers when
    /// `--watch` is set
    pub fn start_indexing(self: &Arc<Self>) {
        for name in self.repo_names() {
            let engine = Arc::downgrade(self);
            let spawned = std::thread::Builder::new()
                .name(format!("narsil-index-{}", name))
                .spawn(move || {
                    let Some(engine) = engine.upgrade() else {
                        return;
                    };
                    if engine.index_blocking(&name, false).is_ok() && engine.options.watch {
                        if let Err(e) = engine.watch(&name) {
                            warn!("cannot watch {}: {}", name, e);
                        }
                    }
                });
            if let Err(e) = spawned {
                error!("cannot spawn indexing thread: {}", e);
            }
        }
    }

    /// Index every repository on the calling thread
    pub fn index_all_blocking(&self) -> Vec<(String, Result<IndexStats>)> {
        self.repo_names()
            .into_iter()
            .map(|name| {
                let result = self.index_blocking(&name, false);
                (name, result)
            })
            .collect()
    }

    /// Index one repository. Unless `force` or `--reindex` is set, a cached
    /// snapshot (with `--persist`) seeds the run so only changed files are
    /// parsed.
    pub fn index_blocking(&self, name: &str, force: bool) -> Result<IndexStats> {
        let (root, progress) = {
            let mut repos = self.repos.write();
            let state = repos.get_mut(name).ok_or_else(|| NarsilError::RepoNotFound {
                name: name.to_string(),
            })?;
            if state.running {
                return Err(NarsilError::query(format!("'{}' is already being indexed", name)));
            }
            state.running = true;
            state.failure = None;
            (state.root.clone(), Arc::clone(&state.progress))
        };

        let cache = CacheDir::in_base(&self.cache_base, &root);
        let previous = if force || self.options.reindex || !self.options.persist {
            None
        } else {
            match cache.load_snapshot() {
                Ok(snapshot) => snapshot,
                Err(e) => {
                    warn!("discarding cached index for {}: {}", name, e);
                    if let Err(e) = cache.clear() {
                        warn!("cannot clear {}: {}", cache.root.display(), e);
                    }
                    None
                }
            }
        };
        if previous.is_some() {
            info!("loaded cached index for {}", name);
        }

        let options = IndexOptions {
            walk: self.options.walk.clone(),
            call_graph: self.options.call_graph,
        };
        let result = indexer::index_repository(&root, &options, previous, &progress).map(|(snapshot, stats)| {
            if self.options.persist {
                if let Err(e) = cache.save_snapshot(&snapshot) {
                    warn!("cannot save index for {}: {}", name, e);
                }
            }
            (RepoIndex::from_snapshot(name, root.clone(), snapshot), stats)
        });

        let mut repos = self.repos.write();
        let Some(state) = repos.get_mut(name) else {
            return Err(NarsilError::RepoNotFound {
                name: name.to_string(),
            });
        };
        state.running = false;
        match result {
            Ok((index, stats)) => {
                state.index = Some(Arc::new(index));
                state.vectors = None;
                state.indexed_at = Some(Utc::now());
                state.last_stats = Some(stats.clone());
                Ok(stats)
            }
            Err(e) => {
                error!("indexing {} failed: {}", name, e);
                state.failure = Some(e.to_string());
                Err(e)
            }
        }
    }

    fn watch(self: &Arc<Self>, name: &str) -> Result<()> {
        let root = self.root_of(name)?;
        let engine: Weak<Self> = Arc::downgrade(self);
        let repo = name.to_string();
        let config = WatcherConfig {
            walk: self.options.walk.clone(),
            ..Default::default()
        };
        let handle = FileWatcher::with_config(root, config).start(move |paths| {
            let Some(engine) = engine.upgrade() else {
                return;
            };
            if let Err(e) = engine.update_files(&repo, &paths) {
                warn!("incremental update of {} failed: {}", repo, e);
            }
        })?;
        self.watchers.lock().push(handle);
        Ok(())
    }

    /// Re-index `paths` of a ready repository (watch mode)
    pub fn update_files(&self, name: &str, paths: &[PathBuf]) -> Result<()> {
        let (root, current) = {
            let repos = self.repos.read();
            let state = repos.get(name).ok_or_else(|| NarsilError::RepoNotFound {
                name: name.to_string(),
            })?;
            match &state.index {
                Some(index) if !state.running => (state.root.clone(), Arc::clone(index)),
                _ => {
                    debug!("{} is indexing, ignoring {} changed files", name, paths.len());
                    return Ok(());
                }
            }
        };

        let options = IndexOptions {
            walk: self.options.walk.clone(),
            call_graph: self.options.call_graph,
        };
        let snapshot = indexer::update_files(&current.snapshot, &root, paths, &options)?;
        let updated = RepoIndex::from_snapshot(name, root, snapshot);
        if self.install_update(name, &current, updated) {
            info!("updated {} files in {}", paths.len(), name);
        } else {
            debug!("{} was re-indexed meanwhile, dropping update of {} files", name, paths.len());
        }
        Ok(())
    }

    /// Swap in an index derived from `based_on`. Leaves the state (and the
    /// on-disk cache) alone when an index run is in progress or has replaced
    /// `based_on` since.
    fn install_update(&self, name: &str, based_on: &Arc<RepoIndex>, updated: RepoIndex) -> bool {
        let mut repos = self.repos.write();
        let Some(state) = repos.get_mut(name) else {
            return false;
        };
        let current = !state.running && state.index.as_ref().is_some_and(|index| Arc::ptr_eq(index, based_on));
        if !current {
            return false;
        }
        if self.options.persist {
            if let Err(e) = CacheDir::in_base(&self.cache_base, &state.root).save_snapshot(&updated.snapshot) {
                warn!("cannot save index for {}: {}", name, e);
            }
        }
        state.index = Some(Arc::new(updated));
        state.vectors = None;
        state.indexed_at = Some(Utc::now());
        true
    }

    /// Resolve a repository argument: its name, its path, or nothing when
    /// exactly one repository is configured
    pub fn resolve_repo(&self, repo: Option<&str>) -> Result<String> {
        let repos = self.repos.read();
        let Some(arg) = repo.map(str::trim).filter(|r| !r.is_empty()) else {
            return match repos.len() {
                1 => Ok(repos.keys().next().cloned().unwrap_or_default()),
                0 => Err(NarsilError::query("no repositories are configured")),
                _ => Err(NarsilError::query(format!(
                    "several repositories are indexed; pass repo (one of: {})",
                    repos.keys().cloned().collect::<Vec<_>>().join(", ")
                ))),
            };
        };
        if repos.contains_key(arg) {
            return Ok(arg.to_string());
        }
        let path = Path::new(arg);
        let wanted = canonical_root(path);
        repos
            .iter()
            .find(|(_, s)| s.root == wanted || s.root == path)
            .map(|(name, _)| name.clone())
            .ok_or_else(|| NarsilError::RepoNotFound { name: arg.to_string() })
    }

    fn root_of(&self, name: &str) -> Result<PathBuf> {
        self.repos
            .read()
            .get(name)
            .map(|s| s.root.clone())
            .ok_or_else(|| NarsilError::RepoNotFound { name: name.to_string() })
    }

    /// The current index, or why there is none
    fn ready(&self, repo: Option<&str>) -> Result<Arc<RepoIndex>> {
        let name = self.resolve_repo(repo)?;
        let repos = self.repos.read();
        let state = repos
            .get(&name)
            .ok_or_else(|| NarsilError::RepoNotFound { name: name.clone() })?;
        if let Some(index) = &state.index {
            return Ok(Arc::clone(index));
        }
        if let Some(message) = &state.failure {
            return Err(NarsilError::query(format!("indexing {} failed: {}", name, message)));
        }
        let (done, total) = state.progress.counts();
        Err(NarsilError::IndexNotReady { name, done, total })
    }

    pub fn list_repos(&self) -> Vec<RepoSummary> {
        self.repos
            .read()
            .iter()
            .map(|(name, state)| RepoSummary {
                name: name.clone(),
                root: state.root.display().to_string(),
                status: state.status(),
                files: state.index.as_ref().map(|i| i.snapshot.files.len()).unwrap_or(0),
                symbols: state.index.as_ref().map(|i| i.symbols.len()).unwrap_or(0),
                indexed_at: state.indexed_at.map(|t| t.to_rfc3339()),
            })
            .collect()
    }

    /// Status of one repository, or all of them when `repo` is omitted and
    /// several are configured
    pub fn index_status(&self, repo: Option<&str>) -> Result<Vec<IndexStatusReport>> {
        let names = match repo {
            Some(_) => vec![self.resolve_repo(repo)?],
            None => self.repo_names(),
        };
        let repos = self.repos.read();
        Ok(names
            .iter()
            .filter_map(|name| repos.get(name).map(|state| status_report(name, state)))
            .collect())
    }

    /// BM25 search over symbols. While the repository is still being indexed
    /// for the first time this falls back to a grep over source files.
    pub fn search_code(&self, repo: Option<&str>, query: &str, limit: Option<usize>) -> Result<SearchResults> {
        let query = non_empty(query, "query")?;
        let limit = clamp_limit(limit);
        match self.ready(repo) {
            Ok(index) => {
                let hits = index.bm25.search(query, limit);
                let related_terms = index.bm25.suggest_related_terms(query, 5);
                Ok(SearchResults::Ranked {
                    hits: to_hits(&index, hits),
                    related_terms,
                })
            }
            Err(NarsilError::IndexNotReady { name, done, total }) => {
                debug!("{} not ready, grep fallback for '{}'", name, query);
                let root = self.root_of(&name)?;
                let options = GrepOptions::new(grep::words_pattern(query))
                    .case_insensitive(true)
                    .with_limit(limit)
                    .source_only();
                let matches = grep::grep_repository(&root, &options)?;
                Ok(SearchResults::Grep { matches, done, total })
            }
            Err(e) => Err(e),
        }
    }

    /// BM25 and TF-IDF rankings fused with reciprocal rank fusion
    pub fn hybrid_search(&self, repo: Option<&str>, query: &str, limit: Option<usize>) -> Result<Vec<SearchHit>> {
        let query = non_empty(query, "query")?;
        let index = self.ready(repo)?;
        let hits = hybrid_search(&index.bm25, &index.tfidf, query, clamp_limit(limit));
        Ok(to_hits(&index, hits))
    }

    pub fn find_symbols(
        &self,
        repo: Option<&str>,
        kind: Option<&str>,
        pattern: Option<&str>,
        file: Option<&str>,
        limit: Option<usize>,
    ) -> Result<Vec<SymbolSummary>> {
        let index = self.ready(repo)?;
        let kind = match kind.map(str::trim).filter(|k| !k.is_empty()) {
            Some(k) => Some(SymbolKind::parse(k).ok_or_else(|| {
                NarsilError::query(format!(
                    "unknown symbol kind '{}' (try function, method, class, struct, enum, interface, trait, module, constant, type)",
                    k
                ))
            })?),
            None => None,
        };
        let filter = SymbolFilter {
            kind,
            file: file.map(str::to_string).filter(|f| !f.is_empty()),
            pattern: pattern.map(str::to_string).filter(|p| !p.is_empty()),
            exported_only: false,
            limit: Some(limit.unwrap_or(50).clamp(1, MAX_LIMIT)),
        };
        Ok(index.symbols.find(&filter)?.into_iter().map(SymbolSummary::from).collect())
    }

    /// Definitions matching `symbol` with their source text
    pub fn symbol_definition(&self, repo: Option<&str>, symbol: &str) -> Result<Vec<Definition>> {
        let index = self.ready(repo)?;
        let matches = lookup(&index, symbol)?;
        Ok(matches
            .into_iter()
            .take(10)
            .map(|s| Definition {
                symbol: SymbolSummary::from(s),
                source: read_span(&index.root, s).unwrap_or_else(|| s.signature.clone()),
            })
            .collect())
    }

    /// Resolved calls to `symbol`, unresolved calls by the same name and
    /// imports naming it
    pub fn find_references(&self, repo: Option<&str>, symbol: &str) -> Result<References> {
        let index = self.ready(repo)?;
        let targets = lookup(&index, symbol)?;
        let names: BTreeSet<&str> = targets.iter().map(|s| s.name.as_str()).collect();

        let mut references = BTreeSet::new();
        for target in &targets {
            for edge in index.graph.incoming_calls(target.id) {
                if let Some(reference) = reference_from(&index, &edge.source, edge.line, ReferenceKind::Call) {
                    references.insert(reference);
                }
            }
        }
        for edge in index.graph.edges() {
            if edge.kind != EdgeKind::Call {
                continue;
            }
            if let NodeRef::Unresolved(callee) = &edge.target {
                let bare = callee.rsplit(['.', ':']).next().unwrap_or(callee);
                if names.contains(bare) {
                    if let Some(reference) =
                        reference_from(&index, &edge.source, edge.line, ReferenceKind::PossibleCall)
                    {
                        references.insert(reference);
                    }
                }
            }
        }
        for (path, entry) in &index.snapshot.files {
            for import in &entry.unit.imports {
                if import.names.iter().any(|n| names.contains(n.as_str())) {
                    references.insert(Reference {
                        file: path.clone(),
                        line: import.line,
                        kind: ReferenceKind::Import,
                        context: None,
                    });
                }
            }
        }

        Ok(References {
            definitions: targets.into_iter().map(SymbolSummary::from).collect(),
            references: references.into_iter().collect(),
        })
    }

    pub fn callers(&self, repo: Option<&str>, symbol: &str, depth: Option<usize>) -> Result<Vec<CallTree>> {
        self.call_trees(repo, symbol, depth, true)
    }

    pub fn callees(&self, repo: Option<&str>, symbol: &str, depth: Option<usize>) -> Result<Vec<CallTree>> {
        self.call_trees(repo, symbol, depth, false)
    }

    fn call_trees(&self, repo: Option<&str>, symbol: &str, depth: Option<usize>, up: bool) -> Result<Vec<CallTree>> {
        let index = self.ready(repo)?;
        require_call_graph(&index)?;
        let depth = depth.unwrap_or(1).clamp(1, MAX_CALL_DEPTH);
        let targets = lookup(&index, symbol)?;

        Ok(targets
            .into_iter()
            .filter(|s| s.kind.is_callable())
            .map(|s| {
                let reach = if up {
                    index.graph.callers(s.id, depth)
                } else {
                    index.graph.callees(s.id, depth)
                };
                let entries = reach
                    .into_iter()
                    .map(|r| match &r.node {
                        NodeRef::Symbol(id) => match index.symbols.get(*id) {
                            Some(sym) => CallEntry {
                                depth: r.depth,
                                name: sym.qualified_name(),
                                file: Some(sym.file.clone()),
                                line: if up { r.line } else { sym.span.start_line },
                                resolved: true,
                            },
                            None => CallEntry {
                                depth: r.depth,
                                name: id.to_string(),
                                file: None,
                                line: r.line,
                                resolved: false,
                            },
                        },
                        NodeRef::File(path) => CallEntry {
                            depth: r.depth,
                            name: "<top level>".to_string(),
                            file: Some(path.clone()),
                            line: r.line,
                            resolved: true,
                        },
                        NodeRef::Unresolved(name) => CallEntry {
                            depth: r.depth,
                            name: name.clone(),
                            file: None,
                            line: r.line,
                            resolved: false,
                        },
                    })
                    .collect();
                CallTree {
                    symbol: SymbolSummary::from(s),
                    entries,
                }
            })
            .collect())
    }

    pub fn dead_code(&self, repo: Option<&str>, include_exported: bool, limit: Option<usize>) -> Result<Vec<SymbolSummary>> {
        let index = self.ready(repo)?;
        require_call_graph(&index)?;
        let limit = limit.unwrap_or(50).clamp(1, MAX_LIMIT);
        Ok(index
            .graph
            .dead_symbols(index.symbols.iter(), include_exported)
            .into_iter()
            .take(limit)
            .map(SymbolSummary::from)
            .collect())
    }

    pub fn circular_imports(&self, repo: Option<&str>) -> Result<Vec<Vec<String>>> {
        Ok(self.ready(repo)?.graph.import_cycles())
    }

    /// Run the security rules over indexed files, re-read from disk
    pub fn scan_security(
        &self,
        repo: Option<&str>,
        severity: Option<&str>,
        rules: Vec<String>,
        path: Option<&str>,
    ) -> Result<ScanReport> {
        let index = self.ready(repo)?;
        let min_severity = match severity.map(str::trim).filter(|s| !s.is_empty()) {
            Some(s) => Severity::parse(s).ok_or_else(|| {
                NarsilError::query(format!("unknown severity '{}' (low, medium, high, critical)", s))
            })?,
            None => Severity::Low,
        };
        let path_prefix = path
            .map(|p| p.trim().trim_start_matches("./").to_string())
            .filter(|p| !p.is_empty());
        let options = ScanOptions {
            min_severity,
            rule_ids: rules,
            path_prefix: path_prefix.clone(),
        };

        let root = index.root.clone();
        let targets = index
            .snapshot
            .files
            .values()
            .filter(|f| !f.record.status.is_failed())
            .filter(|f| {
                path_prefix
                    .as_deref()
                    .map(|p| f.record.path.starts_with(p))
                    .unwrap_or(true)
            })
            .filter_map(|f| {
                let content = fs::read_to_string(root.join(&f.record.path)).ok()?;
                Some(ScanTarget {
                    path: f.record.path.clone(),
                    lang: f.record.lang,
                    content,
                })
            });
        security::scan(targets, &options)
    }

    /// Manifest and advisory check. Reads the working tree, so it does not
    /// wait for indexing.
    pub fn check_dependencies(&self, repo: Option<&str>) -> Result<DependencyReport> {
        let name = self.resolve_repo(repo)?;
        deps::check_repository(&self.root_of(&name)?)
    }

    pub fn project_structure(&self, repo: Option<&str>, max_depth: Option<usize>) -> Result<ProjectStructure> {
        let index = self.ready(repo)?;
        let max_depth = max_depth.unwrap_or(3).clamp(1, 10);
        let manifests = deps::check_repository(&index.root)
            .map(|r| r.manifests.into_iter().map(|m| m.path).collect())
            .unwrap_or_default();

        Ok(ProjectStructure {
            name: index.name.clone(),
            root: index.root.display().to_string(),
            files: index.snapshot.files.len(),
            symbols: index.symbols.len(),
            languages: index
                .language_counts()
                .into_iter()
                .map(|(lang, n)| (lang.name().to_string(), n))
                .collect(),
            entries: structure_entries(index.snapshot.files.keys().map(String::as_str), max_depth),
            manifests,
        })
    }

    /// Full rebuild ignoring the cache; all repositories when `repo` is
    /// omitted
    pub fn reindex(&self, repo: Option<&str>) -> Result<Vec<ReindexReport>> {
        let names = match repo {
            Some(_) => vec![self.resolve_repo(repo)?],
            None => self.repo_names(),
        };
        names
            .iter()
            .map(|name| {
                self.index_blocking(name, true)
                    .map(|stats| ReindexReport::new(name, &stats))
            })
            .collect()
    }

    /// Regex search of the working tree; does not need the index
    pub fn grep(
        &self,
        repo: Option<&str>,
        pattern: &str,
        case_insensitive: bool,
        limit: Option<usize>,
    ) -> Result<Vec<GrepMatch>> {
        let pattern = non_empty(pattern, "pattern")?;
        let root = self.root_of(&self.resolve_repo(repo)?)?;
        let options = GrepOptions::new(pattern)
            .case_insensitive(case_insensitive)
            .with_limit(clamp_limit(limit));
        grep::grep_repository(&root, &options)
    }

    /// Embedding similarity search. Symbols are embedded on first use.
    pub fn neural_search(&self, repo: Option<&str>, query: &str, limit: Option<usize>) -> Result<Vec<SearchHit>> {
        let query = non_empty(query, "query")?;
        let embedder = self.embedder.as_deref().ok_or_else(|| NarsilError::ConfigError {
            message: "neural search is disabled; start the server with --neural".into(),
        })?;
        let index = self.ready(repo)?;
        let vectors = self.vectors_for(&index, embedder)?;

        let query_vector = embedder
            .embed(&[query.to_string()], InputKind::Query)?
            .into_iter()
            .next()
            .ok_or_else(|| NarsilError::NeuralError {
                message: "embeddings API returned no vector for the query".into(),
            })?;
        Ok(vectors
            .search(&query_vector, clamp_limit(limit))
            .into_iter()
            .filter_map(|(id, score)| {
                index.symbols.get(id).map(|s| SearchHit {
                    symbol: SymbolSummary::from(s),
                    score: f64::from(score),
                    matched_terms: Vec::new(),
                })
            })
            .collect())
    }

    fn vectors_for(&self, index: &Arc<RepoIndex>, embedder: &dyn EmbeddingBackend) -> Result<Arc<VectorIndex>> {
        if let Some(state) = self.repos.read().get(&index.name) {
            if let Some(vectors) = &state.vectors {
                return Ok(Arc::clone(vectors));
            }
        }
        info!("embedding {} symbols of {}", index.symbols.len(), index.name);
        let vectors = Arc::new(VectorIndex::build(
            embedder,
            index.symbols.iter().filter(|s| s.kind.is_callable() || s.kind.is_type_container()),
        )?);
        if let Some(state) = self.repos.write().get_mut(&index.name) {
            let current = state.index.as_ref().map(|i| Arc::ptr_eq(i, index)).unwrap_or(false);
            if current {
                state.vectors = Some(Arc::clone(&vectors));
            }
        }
        Ok(vectors)
    }

    /// Latest commits with the files they touched (`--git`)
    pub fn recent_changes(&self, repo: Option<&str>, limit: Option<usize>) -> Result<Vec<CommitInfo>> {
        if !self.options.git {
            return Err(NarsilError::ConfigError {
                message: "git integration is disabled; start the server with --git".into(),
            });
        }
        if !git::git_available() {
            return Err(NarsilError::GitError {
                message: "git executable not found on PATH".into(),
            });
        }
        let root = self.root_of(&self.resolve_repo(repo)?)?;
        if !git::is_git_repo(&root) {
            return Err(NarsilError::GitError {
                message: format!("{} is not a git repository", root.display()),
            });
        }
        if let Ok(branch) = git::current_branch(&root) {
            debug!("recent changes of {} on {}", root.display(), branch);
        }
        git::recent_commits(&root, limit.unwrap_or(10).clamp(1, 100))
    }
}

fn unique_name(repos: &BTreeMap<String, RepoState>, root: &Path) -> String {
    let base = root
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "repo".to_string());
    if !repos.contains_key(&base) {
        return base;
    }
    (2..)
        .map(|n| format!("{}-{}", base, n))
        .find(|candidate| !repos.contains_key(candidate))
        .unwrap_or(base)
}

fn status_report(name: &str, state: &RepoState) -> IndexStatusReport {
    let index = state.index.as_deref();
    IndexStatusReport {
        name: name.to_string(),
        root: state.root.display().to_string(),
        status: state.status(),
        files: index.map(|i| i.snapshot.files.len()).unwrap_or(0),
        symbols: index.map(|i| i.symbols.len()).unwrap_or(0),
        call_edges: index.map(|i| i.graph.call_edge_count()).unwrap_or(0),
        import_edges: index.map(|i| i.graph.import_edge_count()).unwrap_or(0),
        failed_files: index.map(|i| i.snapshot.failed_files()).unwrap_or(0),
        partial_files: index.map(|i| i.partial_files()).unwrap_or(0),
        languages: index
            .map(|i| {
                i.language_counts()
                    .into_iter()
                    .map(|(lang, n)| (lang.name().to_string(), n))
                    .collect()
            })
            .unwrap_or_default(),
        call_graph: index.map(|i| i.graph.has_call_graph()).unwrap_or(false),
        indexed_at: state.indexed_at.map(|t| t.to_rfc3339()),
        last_run_ms: state.last_stats.as_ref().map(|s| s.elapsed.as_millis() as u64),
    }
}

fn non_empty<'a>(value: &'a str, what: &str) -> Result<&'a str> {
    let value = value.trim();
    if value.is_empty() {
        return Err(NarsilError::query(format!("{} must not be empty", what)));
    }
    Ok(value)
}

fn clamp_limit(limit: Option<usize>) -> usize {
    limit.unwrap_or(DEFAULT_LIMIT).clamp(1, MAX_LIMIT)
}

fn lookup<'a>(index: &'a RepoIndex, symbol: &str) -> Result<Vec<&'a Symbol>> {
    let symbol = non_empty(symbol, "symbol")?;
    let matches = index.symbols.lookup(symbol);
    if matches.is_empty() {
        return Err(NarsilError::query(format!("no symbol named '{}' in {}", symbol, index.name)));
    }
    Ok(matches)
}

fn require_call_graph(index: &RepoIndex) -> Result<()> {
    if index.graph.has_call_graph() {
        Ok(())
    } else {
        Err(NarsilError::ConfigError {
            message: "the call graph is disabled; start the server with --call-graph".into(),
        })
    }
}

fn to_hits(index: &RepoIndex, docs: Vec<ScoredDoc>) -> Vec<SearchHit> {
    docs.into_iter()
        .filter_map(|doc| {
            index.symbols.get(doc.id).map(|s| SearchHit {
                symbol: SymbolSummary::from(s),
                score: doc.score,
                matched_terms: doc.matched_terms,
            })
        })
        .collect()
}

fn reference_from(index: &RepoIndex, source: &NodeRef, line: usize, kind: ReferenceKind) -> Option<Reference> {
    match source {
        NodeRef::Symbol(id) => index.symbols.get(*id).map(|caller| Reference {
            file: caller.file.clone(),
            line,
            kind,
            context: Some(caller.qualified_name()),
        }),
        NodeRef::File(path) => Some(Reference {
            file: path.clone(),
            line,
            kind,
            context: None,
        }),
        NodeRef::Unresolved(_) => None,
    }
}

/// Source lines of a symbol's span, read from disk
fn read_span(root: &Path, symbol: &Symbol) -> Option<String> {
    let content = fs::read_to_string(root.join(&symbol.file)).ok()?;
    let start = symbol.span.start_line.max(1) - 1;
    let count = symbol.span.end_line.saturating_sub(start).max(1);
    let lines: Vec<&str> = content.lines().skip(start).take(count).collect();
    if lines.is_empty() {
        None
    } else {
        Some(lines.join("\n"))
    }
}

/// Directory tree of indexed files down to `max_depth`, directories first
fn structure_entries<'a>(paths: impl Iterator<Item = &'a str>, max_depth: usize) -> Vec<StructureEntry> {
    #[derive(Default)]
    struct Dir {
        dirs: BTreeMap<String, Dir>,
        files: Vec<String>,
        total: usize,
    }

    let mut root = Dir::default();
    for path in paths {
        let mut parts: Vec<&str> = path.split('/').collect();
        let Some(file) = parts.pop() else { continue };
        let mut dir = &mut root;
        dir.total += 1;
        for part in parts {
            dir = dir.dirs.entry(part.to_string()).or_default();
            dir.total += 1;
        }
        dir.files.push(file.to_string());
    }

    fn walk(dir: &Dir, depth: usize, max_depth: usize, out: &mut Vec<StructureEntry>) {
        for (name, child) in &dir.dirs {
            out.push(StructureEntry {
                depth,
                name: name.clone(),
                is_dir: true,
                files: child.total,
            });
            if depth + 1 < max_depth {
                walk(child, depth + 1, max_depth, out);
            }
        }
        for file in &dir.files {
            out.push(StructureEntry {
                depth,
                name: file.clone(),
                is_dir: false,
                files: 1,
            });
        }
    }

    let mut out = Vec::new();
    walk(&root, 0, max_depth, &mut out);
    out
}
