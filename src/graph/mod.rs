//! Call and import graph over one snapshot
//!
//! Edges are built by [`resolve::build_edges`] and persisted with the
//! snapshot; [`CodeGraph`] indexes them for traversal queries.

pub mod resolve;

use std::collections::{BTreeMap, BTreeSet, HashSet, VecDeque};

use ahash::{AHashMap, AHashSet};

pub use resolve::{build_edges, resolve_import, FileLookup};

use crate::lang::LangFamily;
use crate::schema::{Edge, EdgeKind, NodeRef, Symbol, SymbolId, SymbolKind};
use crate::snapshot::FileEntry;

/// One node reached by a traversal
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reach {
    pub node: NodeRef,
    /// Hops from the start symbol, starting at 1
    pub depth: usize,
    /// Line of the call site that led here
    pub line: usize,
}

/// Indexed view over a snapshot's edges
#[derive(Debug, Clone, Default)]
pub struct CodeGraph {
    edges: Vec<Edge>,
    call_graph: bool,
    calls_out: AHashMap<NodeRef, Vec<usize>>,
    calls_in: AHashMap<SymbolId, Vec<usize>>,
    unresolved_callees: AHashSet<String>,
    imports_out: BTreeMap<String, BTreeSet<String>>,
    imports_in: BTreeMap<String, BTreeSet<String>>,
}

impl CodeGraph {
    /// Resolve imports and calls of `files`, returning the graph and its edges
    pub fn build(files: &BTreeMap<String, FileEntry>, call_graph: bool) -> (Self, Vec<Edge>) {
        let edges = build_edges(files, call_graph);
        (Self::from_edges(edges.clone(), call_graph), edges)
    }

    pub fn from_edges(edges: Vec<Edge>, call_graph: bool) -> Self {
        let mut graph = Self {
            call_graph,
            ..Default::default()
        };
        for (idx, edge) in edges.iter().enumerate() {
            match edge.kind {
                EdgeKind::Call => {
                    graph.calls_out.entry(edge.source.clone()).or_default().push(idx);
                    match &edge.target {
                        NodeRef::Symbol(id) => graph.calls_in.entry(*id).or_default().push(idx),
                        NodeRef::Unresolved(name) => {
                            graph.unresolved_callees.insert(name.clone());
                        }
                        NodeRef::File(_) => {}
                    }
                }
                EdgeKind::Import => {
                    if let (NodeRef::File(from), NodeRef::File(to)) = (&edge.source, &edge.target) {
                        graph.imports_out.entry(from.clone()).or_default().insert(to.clone());
                        graph.imports_in.entry(to.clone()).or_default().insert(from.clone());
                    }
                }
            }
        }
        graph.edges = edges;
        graph
    }

    pub fn edges(&self) -> &[Edge] {
        &self.edges
    }

    pub fn has_call_graph(&self) -> bool {
        self.call_graph
    }

    pub fn call_edge_count(&self) -> usize {
        self.edges.iter().filter(|e| e.kind == EdgeKind::Call).count()
    }

    pub fn import_edge_count(&self) -> usize {
        self.edges.iter().filter(|e| e.kind == EdgeKind::Import).count()
    }

    /// Files `file` imports
    pub fn imports_of(&self, file: &str) -> Vec<&str> {
        self.imports_out
            .get(file)
            .map(|s| s.iter().map(String::as_str).collect())
            .unwrap_or_default()
    }

    /// Files importing `file`
    pub fn importers_of(&self, file: &str) -> Vec<&str> {
        self.imports_in
            .get(file)
            .map(|s| s.iter().map(String::as_str).collect())
            .unwrap_or_default()
    }

    /// Call edges that resolve to `id`
    pub fn incoming_calls(&self, id: SymbolId) -> Vec<&Edge> {
        self.calls_in
            .get(&id)
            .map(|v| v.iter().map(|&i| &self.edges[i]).collect())
            .unwrap_or_default()
    }

    /// Call edges made from `node`
    pub fn outgoing_calls(&self, node: &NodeRef) -> Vec<&Edge> {
        self.calls_out
            .get(node)
            .map(|v| v.iter().map(|&i| &self.edges[i]).collect())
            .unwrap_or_default()
    }

    /// Transitive callers of `id` up to `depth` hops, breadth first
    pub fn callers(&self, id: SymbolId, depth: usize) -> Vec<Reach> {
        let mut seen: HashSet<NodeRef> = HashSet::from([NodeRef::Symbol(id)]);
        let mut queue = VecDeque::from([(id, 0usize)]);
        let mut out = Vec::new();

        while let Some((current, d)) = queue.pop_front() {
            if d >= depth {
                continue;
            }
            for edge in self.incoming_calls(current) {
                if !seen.insert(edge.source.clone()) {
                    continue;
                }
                out.push(Reach {
                    node: edge.source.clone(),
                    depth: d + 1,
                    line: edge.line,
                });
                if let NodeRef::Symbol(caller) = edge.source {
                    queue.push_back((caller, d + 1));
                }
            }
        }
        out
    }

    /// Transitive callees of `id` up to `depth` hops, breadth first.
    /// Unresolved callees are reported but not expanded.
    pub fn callees(&self, id: SymbolId, depth: usize) -> Vec<Reach> {
        let start = NodeRef::Symbol(id);
        let mut seen: HashSet<NodeRef> = HashSet::from([start.clone()]);
        let mut queue = VecDeque::from([(start, 0usize)]);
        let mut out = Vec::new();

        while let Some((current, d)) = queue.pop_front() {
            if d >= depth {
                continue;
            }
            for edge in self.outgoing_calls(&current) {
                if !seen.insert(edge.target.clone()) {
                    continue;
                }
                out.push(Reach {
                    node: edge.target.clone(),
                    depth: d + 1,
                    line: edge.line,
                });
                if matches!(edge.target, NodeRef::Symbol(_)) {
                    queue.push_back((edge.target.clone(), d + 1));
                }
            }
        }
        out
    }

    /// Import cycles: strongly connected components of the file import graph
    /// with more than one file, plus files importing themselves. Each cycle is
    /// sorted, and cycles are ordered by their first file.
    pub fn import_cycles(&self) -> Vec<Vec<String>> {
        let nodes: Vec<&str> = self
            .imports_out
            .keys()
            .chain(self.imports_in.keys())
            .map(String::as_str)
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();
        let index_of: AHashMap<&str, usize> = nodes.iter().enumerate().map(|(i, n)| (*n, i)).collect();
        let adjacency: Vec<Vec<usize>> = nodes
            .iter()
            .map(|n| {
                self.imports_of(n)
                    .into_iter()
                    .filter_map(|t| index_of.get(t).copied())
                    .collect()
            })
            .collect();

        let mut cycles: Vec<Vec<String>> = tarjan_scc(&adjacency)
            .into_iter()
            .filter(|scc| scc.len() > 1 || adjacency[scc[0]].contains(&scc[0]))
            .map(|scc| {
                let mut files: Vec<String> = scc.into_iter().map(|i| nodes[i].to_string()).collect();
                files.sort();
                files
            })
            .collect();
        cycles.sort();
        cycles
    }

    /// Functions and methods nothing calls.
    ///
    /// A symbol is live when a resolved call reaches it or an unresolved call
    /// uses its name. Entry points, tests, constructors and (unless
    /// `include_exported`) exported symbols are never reported.
    pub fn dead_symbols<'a>(
        &self,
        symbols: impl IntoIterator<Item = &'a Symbol>,
        include_exported: bool,
    ) -> Vec<&'a Symbol> {
        let mut dead: Vec<&Symbol> = symbols
            .into_iter()
            .filter(|s| matches!(s.kind, SymbolKind::Function | SymbolKind::Method))
            .filter(|s| include_exported || !s.exported)
            .filter(|s| !is_entry_point(s))
            .filter(|s| !self.calls_in.contains_key(&s.id))
            .filter(|s| !self.unresolved_callees.contains(&s.name))
            .collect();
        dead.sort_by(|a, b| a.file.cmp(&b.file).then(a.span.start_line.cmp(&b.span.start_line)));
        dead
    }
}

const CONSTRUCTORS: &[&str] = &["__init__", "__new__", "new", "constructor"];

fn is_entry_point(symbol: &Symbol) -> bool {
    let name = symbol.name.as_str();
    let family = symbol.lang.family();
    name == "main"
        || (name == "init" && family == LangFamily::Go)
        || CONSTRUCTORS.contains(&name)
        || symbol.container.as_deref() == Some(name)
        || name.starts_with("test_")
        || ((name.starts_with("Test") || name.starts_with("Benchmark")) && family == LangFamily::Go)
        || (name.starts_with("test") && family == LangFamily::Jvm)
        || symbol.container.as_deref() == Some("tests")
        || is_test_file(&symbol.file)
        || (name.starts_with("__") && name.ends_with("__"))
}

/// Conventional test file and directory names across languages
pub fn is_test_file(path: &str) -> bool {
    let lower = path.to_lowercase();
    let name = path.rsplit('/').next().unwrap_or(path);
    let stem = name.split('.').next().unwrap_or(name);
    let lower_stem = stem.to_lowercase();
    lower.starts_with("tests/")
        || lower.starts_with("test/")
        || lower.contains("/tests/")
        || lower.contains("/test/")
        || lower.contains("/__tests__/")
        || lower_stem.starts_with("test_")
        || lower_stem.ends_with("_test")
        || lower_stem.ends_with("_tests")
        || name.contains(".test.")
        || name.contains(".spec.")
        || stem.ends_with("Test")
        || stem.ends_with("Tests")
}

/// Iterative Tarjan strongly-connected components
fn tarjan_scc(adjacency: &[Vec<usize>]) -> Vec<Vec<usize>> {
    const UNVISITED: usize = usize::MAX;
    let n = adjacency.len();
    let mut index = vec![UNVISITED; n];
    let mut lowlink = vec![0; n];
    let mut on_stack = vec![false; n];
    let mut stack = Vec::new();
    let mut components = Vec::new();
    let mut next_index = 0;

    for root in 0..n {
        if index[root] != UNVISITED {
            continue;
        }
        // (node, next neighbour position)
        let mut work = vec![(root, 0usize)];
        while let Some(&(v, pos)) = work.last() {
            if pos == 0 && index[v] == UNVISITED {
                index[v] = next_index;
                lowlink[v] = next_index;
                next_index += 1;
                stack.push(v);
                on_stack[v] = true;
            }
            if let Some(&w) = adjacency[v].get(pos) {
                if let Some(top) = work.last_mut() {
                    top.1 += 1;
                }
                if index[w] == UNVISITED {
                    work.push((w, 0));
                } else if on_stack[w] {
                    lowlink[v] = lowlink[v].min(index[w]);
                }
                continue;
            }

            work.pop();
            if let Some(&(parent, _)) = work.last() {
                lowlink[parent] = lowlink[parent].min(lowlink[v]);
            }
            if lowlink[v] == index[v] {
                let mut component = Vec::new();
                while let Some(w) = stack.pop() {
                    on_stack[w] = false;
                    component.push(w);
                    if w == v {
                        break;
                    }
                }
                components.push(component);
            }
        }
    }
    components
}
