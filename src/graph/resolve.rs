//! Import and call resolution
//!
//! Import records are mapped to repository files with per-language module
//! path rules. Calls are resolved by name with a fixed tie-break:
//! same file, then files imported by the caller's file, then a unique
//! global candidate. Anything else becomes an `Unresolved` placeholder.

use std::collections::{BTreeMap, BTreeSet};

use ahash::AHashMap;

use crate::lang::{Lang, LangFamily};
use crate::schema::{CallSite, Edge, EdgeKind, ImportRef, NodeRef, Symbol, SymbolKind};
use crate::snapshot::FileEntry;

/// Path lookups over the files of one snapshot
#[derive(Debug, Default)]
pub struct FileLookup {
    files: AHashMap<String, Lang>,
    /// Path without its final extension -> paths
    stems: AHashMap<String, Vec<String>>,
    /// File stem (last segment, no extension) -> paths
    basenames: AHashMap<String, Vec<String>>,
    /// Directory -> files directly inside it
    dirs: AHashMap<String, Vec<String>>,
}

impl FileLookup {
    pub fn new<'a>(files: impl IntoIterator<Item = (&'a str, Lang)>) -> Self {
        let mut lookup = Self::default();
        for (path, lang) in files {
            lookup.files.insert(path.to_string(), lang);
            let stem = strip_extension(path);
            lookup.stems.entry(stem.to_string()).or_default().push(path.to_string());
            lookup
                .basenames
                .entry(file_name(stem).to_string())
                .or_default()
                .push(path.to_string());
            lookup.dirs.entry(parent_dir(path).to_string()).or_default().push(path.to_string());
        }
        for list in lookup
            .stems
            .values_mut()
            .chain(lookup.basenames.values_mut())
            .chain(lookup.dirs.values_mut())
        {
            list.sort();
        }
        lookup
    }

    fn contains(&self, path: &str) -> bool {
        self.files.contains_key(path)
    }

    fn family_of(&self, path: &str) -> Option<LangFamily> {
        self.files.get(path).map(|l| l.family())
    }

    /// Files with exactly this extension-less path in the given family
    fn by_stem(&self, stem: &str, family: LangFamily) -> Vec<String> {
        self.stems
            .get(stem)
            .map(|paths| {
                paths
                    .iter()
                    .filter(|p| self.family_of(p) == Some(family))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Files whose extension-less path ends with `suffix` on a segment boundary
    fn by_stem_suffix(&self, suffix: &str, family: LangFamily) -> Vec<String> {
        let base = file_name(suffix);
        self.basenames
            .get(base)
            .map(|paths| {
                paths
                    .iter()
                    .filter(|p| self.family_of(p) == Some(family))
                    .filter(|p| ends_with_segments(strip_extension(p), suffix))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default()
    }

    fn in_dir(&self, dir: &str, family: LangFamily) -> Vec<String> {
        self.dirs
            .get(dir)
            .map(|paths| {
                paths
                    .iter()
                    .filter(|p| self.family_of(p) == Some(family))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Directories holding files of `family` that share a segment suffix with
    /// `path`. The longest match wins.
    fn dir_by_suffix(&self, path: &str, family: LangFamily) -> Option<&str> {
        self.dirs
            .iter()
            .filter(|(dir, files)| {
                !dir.is_empty()
                    && (ends_with_segments(path, dir) || ends_with_segments(dir, path))
                    && files.iter().any(|f| self.family_of(f) == Some(family))
            })
            .map(|(dir, _)| dir.as_str())
            .max_by_key(|dir| (dir.len(), std::cmp::Reverse(*dir)))
    }
}

/// Resolve one import of `importer` to repository files. Empty when unresolved.
pub fn resolve_import(importer: &str, lang: Lang, import: &ImportRef, lookup: &FileLookup) -> Vec<String> {
    let module = import.module.trim();
    if module.is_empty() {
        return Vec::new();
    }
    let family = lang.family();
    let mut targets = match family {
        LangFamily::JavaScript => resolve_js(importer, module, lookup),
        LangFamily::Python => resolve_python(importer, import, lookup),
        LangFamily::Rust => resolve_rust(importer, module, lookup),
        LangFamily::Go => lookup
            .dir_by_suffix(module, LangFamily::Go)
            .map(|dir| lookup.in_dir(dir, LangFamily::Go))
            .unwrap_or_default(),
        LangFamily::Jvm | LangFamily::DotNet => resolve_dotted(module, family, lookup),
        LangFamily::CFamily => {
            let relative = join_path(parent_dir(importer), module);
            if lookup.contains(&relative) {
                vec![relative]
            } else if lookup.contains(module) {
                vec![module.to_string()]
            } else {
                lookup
                    .by_stem_suffix(strip_extension(module), LangFamily::CFamily)
                    .into_iter()
                    .filter(|p| p.ends_with(module))
                    .collect()
            }
        }
        LangFamily::Shell => {
            if module.contains('$') {
                return Vec::new();
            }
            let path = join_path(parent_dir(importer), module);
            if lookup.contains(&path) {
                vec![path]
            } else if lookup.contains(module) {
                vec![module.to_string()]
            } else {
                Vec::new()
            }
        }
        LangFamily::Hcl => {
            if !module.starts_with('.') {
                return Vec::new();
            }
            lookup.in_dir(&join_path(parent_dir(importer), module), LangFamily::Hcl)
        }
        LangFamily::Markup => Vec::new(),
    };
    targets.retain(|t| t != importer);
    targets.dedup();
    targets
}

fn resolve_js(importer: &str, module: &str, lookup: &FileLookup) -> Vec<String> {
    if !module.starts_with('.') {
        return Vec::new();
    }
    let joined = join_path(parent_dir(importer), module);
    if lookup.contains(&joined) {
        return vec![joined];
    }
    // `./util.js` may name `util.ts` in TypeScript projects
    let stem = strip_extension(&joined);
    for candidate in [joined.as_str(), stem] {
        let found = lookup.by_stem(candidate, LangFamily::JavaScript);
        if !found.is_empty() {
            return first(found);
        }
    }
    first(lookup.by_stem(&format!("{}/index", joined), LangFamily::JavaScript))
}

fn resolve_python(importer: &str, import: &ImportRef, lookup: &FileLookup) -> Vec<String> {
    let module = import.module.trim();
    let dots = module.chars().take_while(|&c| c == '.').count();
    let rest = &module[dots..];
    let rest_path = rest.replace('.', "/");

    let module_file = |base: &str| -> Vec<String> {
        let found = lookup.by_stem(base, LangFamily::Python);
        if !found.is_empty() {
            return first(found);
        }
        lookup.by_stem(&format!("{}/__init__", base), LangFamily::Python)
    };

    if dots > 0 {
        let mut base = parent_dir(importer).to_string();
        for _ in 1..dots {
            base = parent_dir(&base).to_string();
        }
        if rest.is_empty() {
            // `from . import a, b` imports sibling modules
            return import
                .names
                .iter()
                .flat_map(|name| module_file(&join_path(&base, name)))
                .collect();
        }
        let target = join_path(&base, &rest_path);
        let found = module_file(&target);
        if !found.is_empty() {
            return found;
        }
        return import
            .names
            .iter()
            .flat_map(|name| module_file(&format!("{}/{}", target, name)))
            .collect();
    }

    let absolute = |path: &str| -> Vec<String> {
        let found = module_file(path);
        if !found.is_empty() {
            return found;
        }
        let suffix = lookup.by_stem_suffix(path, LangFamily::Python);
        if !suffix.is_empty() {
            return first(suffix);
        }
        first(lookup.by_stem_suffix(&format!("{}/__init__", path), LangFamily::Python))
    };
    let found = absolute(&rest_path);
    if !found.is_empty() {
        return found;
    }
    import
        .names
        .iter()
        .flat_map(|name| absolute(&format!("{}/{}", rest_path, name)))
        .collect()
}

fn resolve_rust(importer: &str, module: &str, lookup: &FileLookup) -> Vec<String> {
    let segments: Vec<&str> = module.split("::").map(str::trim).collect();
    let Some((&head, tail)) = segments.split_first() else {
        return Vec::new();
    };

    let base = match head {
        "crate" => crate_root_dir(importer),
        "self" => rust_module_dir(importer),
        "super" => {
            let mut dir = parent_dir(&rust_module_dir(importer)).to_string();
            let mut tail = tail;
            while let Some((&"super", rest)) = tail.split_first() {
                dir = parent_dir(&dir).to_string();
                tail = rest;
            }
            return rust_longest_module(&dir, tail, lookup);
        }
        _ => return Vec::new(),
    };
    rust_longest_module(&base, tail, lookup)
}

/// The deepest module file named by a prefix of `segments` under `base`
fn rust_longest_module(base: &str, segments: &[&str], lookup: &FileLookup) -> Vec<String> {
    for len in (1..=segments.len()).rev() {
        let path = join_path(base, &segments[..len].join("/"));
        for candidate in [format!("{}.rs", path), format!("{}/mod.rs", path)] {
            if lookup.contains(&candidate) {
                return vec![candidate];
            }
        }
    }
    // `use super::Item` refers to the parent module file itself
    for root in ["mod.rs", "lib.rs", "main.rs"] {
        let candidate = join_path(base, root);
        if lookup.contains(&candidate) {
            return vec![candidate];
        }
    }
    let parent_file = format!("{}.rs", base);
    if lookup.contains(&parent_file) {
        return vec![parent_file];
    }
    Vec::new()
}

/// Directory holding the crate root: the nearest `src` ancestor
fn crate_root_dir(importer: &str) -> String {
    let mut dir = parent_dir(importer);
    loop {
        if file_name(dir) == "src" {
            return dir.to_string();
        }
        if dir.is_empty() {
            return parent_dir(importer).to_string();
        }
        dir = parent_dir(dir);
    }
}

/// Directory in which `mod x;` of this file looks for `x.rs`
fn rust_module_dir(importer: &str) -> String {
    let name = file_name(importer);
    if matches!(name, "mod.rs" | "lib.rs" | "main.rs") {
        parent_dir(importer).to_string()
    } else {
        strip_extension(importer).to_string()
    }
}

fn resolve_dotted(module: &str, family: LangFamily, lookup: &FileLookup) -> Vec<String> {
    let mut path = module.replace('.', "/");
    loop {
        let found = lookup.by_stem_suffix(&path, family);
        if !found.is_empty() {
            return first(found);
        }
        if family == LangFamily::DotNet {
            // `using A.B;` names a namespace, usually a directory
            if let Some(dir) = lookup.dir_by_suffix(&path, family) {
                return lookup.in_dir(dir, family);
            }
        }
        match path.rsplit_once('/') {
            Some((parent, _)) => path = parent.to_string(),
            None => return Vec::new(),
        }
    }
}

fn first(mut found: Vec<String>) -> Vec<String> {
    found.truncate(1);
    found
}

/// Build import and (optionally) call edges for a snapshot's files
pub fn build_edges(files: &BTreeMap<String, FileEntry>, call_graph: bool) -> Vec<Edge> {
    let lookup = FileLookup::new(files.iter().map(|(p, e)| (p.as_str(), e.record.lang)));
    let mut edges = Vec::new();
    let mut imported: AHashMap<&str, BTreeSet<String>> = AHashMap::new();

    for (path, entry) in files {
        for import in &entry.unit.imports {
            let targets = resolve_import(path, entry.record.lang, import, &lookup);
            if targets.is_empty() {
                edges.push(Edge {
                    kind: EdgeKind::Import,
                    source: NodeRef::File(path.clone()),
                    target: NodeRef::Unresolved(import.module.clone()),
                    line: import.line,
                });
                continue;
            }
            for target in targets {
                imported.entry(path.as_str()).or_default().insert(target.clone());
                edges.push(Edge {
                    kind: EdgeKind::Import,
                    source: NodeRef::File(path.clone()),
                    target: NodeRef::File(target),
                    line: import.line,
                });
            }
        }
    }

    if call_graph {
        let resolver = CallResolver::new(files);
        let empty = BTreeSet::new();
        for (path, entry) in files {
            let imports = imported.get(path.as_str()).unwrap_or(&empty);
            for call in &entry.unit.calls {
                edges.push(resolver.resolve(path, call, imports, &entry.unit.symbols));
            }
        }
    }
    edges
}

/// Name-based call resolution over all symbols of a snapshot
pub struct CallResolver<'a> {
    by_name: AHashMap<&'a str, Vec<&'a Symbol>>,
}

impl<'a> CallResolver<'a> {
    pub fn new(files: &'a BTreeMap<String, FileEntry>) -> Self {
        let mut by_name: AHashMap<&str, Vec<&Symbol>> = AHashMap::new();
        for symbol in files.values().flat_map(|e| e.unit.symbols.iter()) {
            if is_call_target(symbol.kind) {
                by_name.entry(symbol.name.as_str()).or_default().push(symbol);
            }
        }
        Self { by_name }
    }

    /// Edge for one call site of `file`
    pub fn resolve(&self, file: &str, call: &CallSite, imports: &BTreeSet<String>, file_symbols: &[Symbol]) -> Edge {
        let source = match call.caller {
            Some(id) => NodeRef::Symbol(id),
            None => NodeRef::File(file.to_string()),
        };
        let caller_container = call
            .caller
            .and_then(|id| file_symbols.iter().find(|s| s.id == id))
            .and_then(|s| s.container.as_deref());
        let target = self
            .pick(file, call, imports, caller_container)
            .map(|s| NodeRef::Symbol(s.id))
            .unwrap_or_else(|| NodeRef::Unresolved(call.callee.clone()));
        Edge {
            kind: EdgeKind::Call,
            source,
            target,
            line: call.line,
        }
    }

    fn pick(
        &self,
        file: &str,
        call: &CallSite,
        imports: &BTreeSet<String>,
        caller_container: Option<&str>,
    ) -> Option<&'a Symbol> {
        let candidates = self.by_name.get(call.callee.as_str())?;
        let hint = receiver_hint(call.receiver.as_deref(), caller_container);

        let same_file: Vec<&Symbol> = candidates.iter().copied().filter(|s| s.file == file).collect();
        if let Some(symbol) = prefer(&same_file, hint) {
            return Some(symbol);
        }

        let imported: Vec<&Symbol> = candidates
            .iter()
            .copied()
            .filter(|s| imports.contains(&s.file))
            .collect();
        if let Some(symbol) = prefer(&imported, hint) {
            return Some(symbol);
        }

        if candidates.len() == 1 {
            return Some(candidates[0]);
        }
        let hinted: Vec<&Symbol> = candidates
            .iter()
            .copied()
            .filter(|s| hint.is_some() && s.container.as_deref() == hint)
            .collect();
        if hinted.len() == 1 {
            return Some(hinted[0]);
        }
        None
    }
}

/// Within one tier: the candidate whose container matches the receiver,
/// otherwise the first by position
fn prefer<'a>(candidates: &[&'a Symbol], hint: Option<&str>) -> Option<&'a Symbol> {
    if candidates.is_empty() {
        return None;
    }
    if let Some(hint) = hint {
        if let Some(symbol) = candidates.iter().find(|s| s.container.as_deref() == Some(hint)) {
            return Some(*symbol);
        }
    }
    candidates.iter().copied().min_by(|a, b| {
        a.file
            .cmp(&b.file)
            .then(a.span.start_byte.cmp(&b.span.start_byte))
    })
}

/// Container a receiver names: `self`/`this`/`Self` mean the caller's own type
fn receiver_hint<'r>(receiver: Option<&'r str>, caller_container: Option<&'r str>) -> Option<&'r str> {
    let receiver = receiver?.trim();
    match receiver {
        "self" | "this" | "Self" | "cls" | "base" | "super" => caller_container,
        _ => {
            let last = receiver
                .rsplit(|c: char| c == ':' || c == '.')
                .next()
                .unwrap_or(receiver);
            let last = last.split('<').next().unwrap_or(last);
            if last.chars().next().map(|c| c.is_uppercase()).unwrap_or(false) {
                Some(last)
            } else {
                None
            }
        }
    }
}

fn is_call_target(kind: SymbolKind) -> bool {
    kind.is_callable() || matches!(kind, SymbolKind::Class | SymbolKind::Struct)
}

fn strip_extension(path: &str) -> &str {
    let name_start = path.rfind('/').map(|i| i + 1).unwrap_or(0);
    match path[name_start..].rfind('.') {
        Some(dot) if dot > 0 => &path[..name_start + dot],
        _ => path,
    }
}

fn file_name(path: &str) -> &str {
    path.rsplit('/').next().unwrap_or(path)
}

fn parent_dir(path: &str) -> &str {
    path.rfind('/').map(|i| &path[..i]).unwrap_or("")
}

fn ends_with_segments(path: &str, suffix: &str) -> bool {
    path == suffix || path.ends_with(&format!("/{}", suffix))
}

/// Join `rel` onto `base`, folding `.` and `..` segments
fn join_path(base: &str, rel: &str) -> String {
    let mut parts: Vec<&str> = base.split('/').filter(|s| !s.is_empty()).collect();
    for segment in rel.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                parts.pop();
            }
            s => parts.push(s),
        }
    }
    parts.join("/")
}
