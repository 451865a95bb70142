//! Cache storage for persisted index snapshots
//!
//! Each repository gets its own directory under the XDG cache base
//! (`$XDG_CACHE_HOME/narsil-mcp` or `~/.cache/narsil-mcp`), named
//! `<repo-name>-<hash>` so the listing stays readable.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{NarsilError, Result};
use crate::fs_utils::{atomic_write, canonical_root};
use crate::schema::{fnv1a_hash, SCHEMA_VERSION};
use crate::snapshot::IndexSnapshot;

const SNAPSHOT_FILE: &str = "snapshot.bin";
const META_FILE: &str = "meta.json";

/// Human-readable summary written next to the snapshot
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheMeta {
    /// Schema version for compatibility
    pub schema_version: u32,

    /// When this cache was generated
    pub generated_at: String,

    pub repo_root: String,
    pub files: usize,
    pub symbols: usize,
    pub edges: usize,
}

impl CacheMeta {
    pub fn from_snapshot(snapshot: &IndexSnapshot) -> Self {
        Self {
            schema_version: snapshot.schema_version,
            generated_at: chrono::Utc::now().to_rfc3339(),
            repo_root: snapshot.repo_root.clone(),
            files: snapshot.files.len(),
            symbols: snapshot.symbol_count(),
            edges: snapshot.edges.len(),
        }
    }

    /// Check if schema version is compatible
    pub fn is_compatible(&self) -> bool {
        self.schema_version == SCHEMA_VERSION
    }
}

/// Cache directory for one repository
#[derive(Debug, Clone)]
pub struct CacheDir {
    /// Root of the cache for this repo
    pub root: PathBuf,

    /// Path to the repository being indexed
    pub repo_root: PathBuf,

    /// Repo hash (for identification)
    pub repo_hash: String,
}

impl CacheDir {
    /// Cache directory for a repository under the default base
    pub fn for_repo(repo_path: &Path) -> Self {
        Self::in_base(&get_cache_base_dir(), repo_path)
    }

    /// Cache directory for a repository under an explicit base
    pub fn in_base(base: &Path, repo_path: &Path) -> Self {
        let repo_root = canonical_root(repo_path);
        let repo_hash = compute_repo_hash(&repo_root);
        let name = repo_root
            .file_name()
            .map(|n| sanitize_filename(&n.to_string_lossy()))
            .unwrap_or_else(|| "repo".to_string());
        let root = base.join(format!("{}-{}", name, repo_hash));

        Self {
            root,
            repo_root,
            repo_hash,
        }
    }

    /// Check if a snapshot has been written
    pub fn exists(&self) -> bool {
        self.snapshot_path().exists()
    }

    pub fn snapshot_path(&self) -> PathBuf {
        self.root.join(SNAPSHOT_FILE)
    }

    pub fn meta_path(&self) -> PathBuf {
        self.root.join(META_FILE)
    }

    /// Write the snapshot and its metadata. Each file is replaced atomically.
    pub fn save_snapshot(&self, snapshot: &IndexSnapshot) -> Result<()> {
        let bytes = bincode::serialize(snapshot).map_err(|e| NarsilError::CacheError {
            message: format!("failed to encode snapshot: {}", e),
        })?;
        atomic_write(&self.snapshot_path(), &bytes)?;

        let meta = CacheMeta::from_snapshot(snapshot);
        let json = serde_json::to_vec_pretty(&meta).map_err(|e| NarsilError::CacheError {
            message: format!("failed to encode cache metadata: {}", e),
        })?;
        atomic_write(&self.meta_path(), &json)?;

        debug!(
            "saved snapshot for {} ({} bytes) to {}",
            snapshot.repo_root,
            bytes.len(),
            self.root.display()
        );
        Ok(())
    }

    /// Load the cached snapshot.
    ///
    /// `Ok(None)` when nothing is cached. A snapshot that cannot be decoded,
    /// has another schema version or fails validation is an error; the caller
    /// discards it and rebuilds.
    pub fn load_snapshot(&self) -> Result<Option<IndexSnapshot>> {
        if let Some(meta) = self.load_meta() {
            if !meta.is_compatible() {
                return Err(NarsilError::SnapshotInconsistent {
                    message: format!(
                        "cached schema version {} does not match {}",
                        meta.schema_version, SCHEMA_VERSION
                    ),
                });
            }
        }

        let bytes = match fs::read(self.snapshot_path()) {
            Ok(b) => b,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let snapshot: IndexSnapshot =
            bincode::deserialize(&bytes).map_err(|e| NarsilError::CacheError {
                message: format!("failed to decode {}: {}", self.snapshot_path().display(), e),
            })?;
        snapshot.validate()?;
        Ok(Some(snapshot))
    }

    pub fn load_meta(&self) -> Option<CacheMeta> {
        let text = fs::read_to_string(self.meta_path()).ok()?;
        serde_json::from_str(&text).ok()
    }

    /// Get cache size in bytes
    pub fn size(&self) -> u64 {
        dir_size(&self.root)
    }

    /// Clear the cache
    pub fn clear(&self) -> Result<()> {
        if self.root.exists() {
            fs::remove_dir_all(&self.root)?;
        }
        Ok(())
    }
}

/// Get the base cache directory (XDG-compliant)
pub fn get_cache_base_dir() -> PathBuf {
    if let Ok(xdg_cache) = std::env::var("XDG_CACHE_HOME") {
        if !xdg_cache.is_empty() {
            return PathBuf::from(xdg_cache).join("narsil-mcp");
        }
    }

    if let Some(home) = dirs::home_dir() {
        return home.join(".cache").join("narsil-mcp");
    }

    // Last resort: temp directory
    std::env::temp_dir().join("narsil-mcp")
}

/// Stable 16-hex-digit hash of the canonical repository path
pub fn compute_repo_hash(repo_path: &Path) -> String {
    let canonical = canonical_root(repo_path);
    format!("{:016x}", fnv1a_hash(canonical.to_string_lossy().as_bytes()))
}

/// Sanitize a string for use as a filename
fn sanitize_filename(name: &str) -> String {
    name.chars()
        .map(|c| {
            if c.is_alphanumeric() || c == '-' || c == '_' || c == '.' {
                c
            } else {
                '_'
            }
        })
        .collect()
}

/// Calculate total size of a directory
fn dir_size(path: &Path) -> u64 {
    fs::read_dir(path)
        .into_iter()
        .flatten()
        .filter_map(|entry| entry.ok())
        .map(|entry| {
            let path = entry.path();
            if path.is_dir() {
                dir_size(&path)
            } else {
                fs::metadata(&path).map(|m| m.len()).unwrap_or(0)
            }
        })
        .sum()
}

/// One cached repository as found on disk
#[derive(Debug, Clone)]
pub struct CachedRepo {
    pub dir_name: String,
    pub path: PathBuf,
    pub size: u64,
    pub meta: Option<CacheMeta>,
}

/// List all cached repositories under `base`
pub fn list_cached_repos(base: &Path) -> Vec<CachedRepo> {
    let mut repos: Vec<CachedRepo> = fs::read_dir(base)
        .into_iter()
        .flatten()
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.path().is_dir())
        .map(|entry| {
            let path = entry.path();
            let meta = fs::read_to_string(path.join(META_FILE))
                .ok()
                .and_then(|text| serde_json::from_str(&text).ok());
            CachedRepo {
                dir_name: entry.file_name().to_string_lossy().to_string(),
                size: dir_size(&path),
                path,
                meta,
            }
        })
        .collect();
    repos.sort_by(|a, b| a.dir_name.cmp(&b.dir_name));
    repos
}

/// Remove every cached repository under `base`. Returns how many were removed.
pub fn clear_all(base: &Path) -> Result<usize> {
    let repos = list_cached_repos(base);
    for repo in &repos {
        fs::remove_dir_all(&repo.path)?;
    }
    Ok(repos.len())
}
