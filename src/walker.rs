//! Repository walker: enumerate source files, apply ignore rules, classify by language

use std::path::{Component, Path, PathBuf};

use ignore::gitignore::{Gitignore, GitignoreBuilder};
use ignore::{Match, WalkBuilder};
use tracing::{debug, warn};

use crate::error::{NarsilError, Result};
use crate::lang::Lang;

/// Default maximum size of an indexed file
pub const DEFAULT_MAX_FILE_SIZE: u64 = 1024 * 1024;

/// Directories that are never indexed, even without a .gitignore
pub const DEFAULT_EXCLUDED_DIRS: &[&str] = &[
    ".git",
    "node_modules",
    "target",
    "dist",
    "build",
    "vendor",
    "__pycache__",
    ".venv",
    "venv",
    ".tox",
    ".mypy_cache",
    ".next",
    "coverage",
];

/// Options controlling which files are walked
#[derive(Debug, Clone)]
pub struct WalkOptions {
    /// Honor .gitignore, .ignore and global git excludes
    pub respect_gitignore: bool,
    /// Walk hidden files and directories
    pub include_hidden: bool,
    /// Skip files larger than this many bytes
    pub max_file_size: u64,
    /// Extra gitignore-style patterns to exclude
    pub extra_excludes: Vec<String>,
}

impl Default for WalkOptions {
    fn default() -> Self {
        Self {
            respect_gitignore: true,
            include_hidden: false,
            max_file_size: DEFAULT_MAX_FILE_SIZE,
            extra_excludes: Vec::new(),
        }
    }
}

/// A source file discovered by the walker
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceFile {
    pub abs_path: PathBuf,
    /// Repository-relative path with `/` separators
    pub rel_path: String,
    pub lang: Lang,
    pub size: u64,
    /// Modification time in milliseconds since the Unix epoch
    pub mtime_ms: u64,
}

/// Walk a repository and return its supported source files, sorted by relative path
pub fn walk_repository(root: &Path, options: &WalkOptions) -> Result<Vec<SourceFile>> {
    if !root.is_dir() {
        return Err(NarsilError::FileNotFound {
            path: root.display().to_string(),
        });
    }

    let rules = IgnoreRules::new(root, options);

    let mut builder = WalkBuilder::new(root);
    builder
        .git_ignore(options.respect_gitignore)
        .git_global(options.respect_gitignore)
        .git_exclude(options.respect_gitignore)
        .ignore(options.respect_gitignore)
        .require_git(false)
        .hidden(!options.include_hidden)
        .follow_links(false)
        .filter_entry(|entry| {
            let is_dir = entry.file_type().map(|t| t.is_dir()).unwrap_or(false);
            !(is_dir && is_excluded_dir_name(&entry.file_name().to_string_lossy()))
        });

    let mut files = Vec::new();
    for result in builder.build() {
        let entry = match result {
            Ok(e) => e,
            Err(e) => {
                warn!("walk error under {}: {}", root.display(), e);
                continue;
            }
        };
        if !entry.file_type().map(|t| t.is_file()).unwrap_or(false) {
            continue;
        }

        let path = entry.path();
        let Ok(lang) = Lang::from_path(path) else {
            continue;
        };
        if rules.excluded_by_pattern(path) {
            continue;
        }

        let metadata = match entry.metadata() {
            Ok(m) => m,
            Err(e) => {
                warn!("cannot stat {}: {}", path.display(), e);
                continue;
            }
        };
        if metadata.len() > options.max_file_size {
            debug!("skipping {} ({} bytes)", path.display(), metadata.len());
            continue;
        }

        files.push(SourceFile {
            abs_path: path.to_path_buf(),
            rel_path: relative_path(root, path),
            lang,
            size: metadata.len(),
            mtime_ms: mtime_ms(&metadata),
        });
    }

    files.sort_by(|a, b| a.rel_path.cmp(&b.rel_path));
    Ok(files)
}

/// Ignore rules for checking one path at a time, as the watcher and
/// incremental updates do. Skips exactly what [`walk_repository`] skips:
/// built-in directories, hidden entries, `.gitignore`/`.ignore` files from the
/// root down to the path, global git excludes and the extra patterns.
#[derive(Debug)]
pub struct IgnoreRules {
    root: PathBuf,
    options: WalkOptions,
    global: Gitignore,
    extra: Gitignore,
}

impl IgnoreRules {
    pub fn new(root: &Path, options: &WalkOptions) -> Self {
        let global = if options.respect_gitignore {
            let (global, err) = Gitignore::global();
            if let Some(e) = err {
                debug!("global git excludes: {}", e);
            }
            global
        } else {
            Gitignore::empty()
        };
        Self {
            root: root.to_path_buf(),
            options: options.clone(),
            global,
            extra: build_extra_excludes(root, &options.extra_excludes),
        }
    }

    /// Whether `path` (absolute, or relative to the root) is excluded. Only
    /// ignore files are read, so deleted paths can be checked too.
    pub fn is_ignored(&self, path: &Path) -> bool {
        let rel = if path.is_absolute() {
            match path.strip_prefix(&self.root) {
                Ok(rel) => rel,
                Err(_) => return true,
            }
        } else {
            path
        };
        let names: Vec<String> = rel
            .components()
            .filter_map(|c| match c {
                Component::Normal(name) => Some(name.to_string_lossy().into_owned()),
                _ => None,
            })
            .collect();
        let Some((_file, dirs)) = names.split_last() else {
            return true;
        };

        if dirs.iter().any(|d| is_excluded_dir_name(d)) {
            return true;
        }
        if !self.options.include_hidden && names.iter().any(|n| n.starts_with('.')) {
            return true;
        }
        let rel: PathBuf = names.iter().collect();
        if self.excluded_by_pattern(&rel) {
            return true;
        }
        self.options.respect_gitignore && self.gitignored(&names)
    }

    /// Whether one of the extra exclude patterns matches
    fn excluded_by_pattern(&self, path: &Path) -> bool {
        self.extra.matched_path_or_any_parents(path, false).is_ignore()
    }

    /// Apply ignore files outermost first so deeper files and `!` patterns win
    fn gitignored(&self, names: &[String]) -> bool {
        let rel: PathBuf = names.iter().collect();
        let mut ignored = apply(false, self.global.matched_path_or_any_parents(&rel, false));

        let exclude = self.root.join(".git").join("info").join("exclude");
        if exclude.is_file() {
            ignored = apply(ignored, load_ignore_file(&exclude).matched_path_or_any_parents(&rel, false));
        }

        let mut dir = self.root.clone();
        for depth in 0..names.len() {
            if depth > 0 {
                dir.push(&names[depth - 1]);
            }
            let below: PathBuf = names[depth..].iter().collect();
            for file_name in [".gitignore", ".ignore"] {
                let file = dir.join(file_name);
                if file.is_file() {
                    ignored = apply(ignored, load_ignore_file(&file).matched_path_or_any_parents(&below, false));
                }
            }
        }
        ignored
    }

    /// Stat a single file the same way the walker does. `None` when it is
    /// not indexable.
    pub fn source_file(&self, path: &Path) -> Option<SourceFile> {
        let lang = Lang::from_path(path).ok()?;
        if self.is_ignored(path) {
            return None;
        }
        let metadata = std::fs::metadata(path).ok()?;
        if !metadata.is_file() || metadata.len() > self.options.max_file_size {
            return None;
        }
        Some(SourceFile {
            abs_path: path.to_path_buf(),
            rel_path: relative_path(&self.root, path),
            lang,
            size: metadata.len(),
            mtime_ms: mtime_ms(&metadata),
        })
    }
}

fn apply(ignored: bool, matched: Match<&ignore::gitignore::Glob>) -> bool {
    match matched {
        Match::Ignore(_) => true,
        Match::Whitelist(_) => false,
        Match::None => ignored,
    }
}

fn load_ignore_file(path: &Path) -> Gitignore {
    let (gitignore, err) = Gitignore::new(path);
    if let Some(e) = err {
        warn!("problem reading {}: {}", path.display(), e);
    }
    gitignore
}

pub fn is_excluded_dir_name(name: &str) -> bool {
    DEFAULT_EXCLUDED_DIRS.contains(&name)
}

/// Path relative to `root` with `/` separators
pub fn relative_path(root: &Path, path: &Path) -> String {
    let rel = path.strip_prefix(root).unwrap_or(path);
    rel.components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

pub fn mtime_ms(metadata: &std::fs::Metadata) -> u64 {
    metadata
        .modified()
        .ok()
        .and_then(|t| t.duration_since(std::time::UNIX_EPOCH).ok())
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

fn build_extra_excludes(root: &Path, patterns: &[String]) -> Gitignore {
    let mut builder = GitignoreBuilder::new(root);
    for pattern in patterns {
        if let Err(e) = builder.add_line(None, pattern) {
            warn!("invalid exclude pattern '{}': {}", pattern, e);
        }
    }
    builder.build().unwrap_or_else(|_| Gitignore::empty())
}
