//! Cross-platform filesystem helpers

use std::io;
use std::path::{Path, PathBuf};

/// Strip Windows extended-length prefixes that `canonicalize` adds.
///
/// `\\?\C:\repo` becomes `C:\repo` and `\\?\UNC\server\share` becomes
/// `\\server\share`. On Unix the path is returned unchanged.
pub fn normalize_path(path: &Path) -> PathBuf {
    #[cfg(windows)]
    {
        let s = path.to_string_lossy();
        if let Some(stripped) = s.strip_prefix(r"\\?\UNC\") {
            return PathBuf::from(format!(r"\\{}", stripped));
        }
        if let Some(stripped) = s.strip_prefix(r"\\?\") {
            return PathBuf::from(stripped);
        }
    }
    path.to_path_buf()
}

/// Canonicalize a repository root, falling back to the path as given
pub fn canonical_root(path: &Path) -> PathBuf {
    path.canonicalize()
        .map(|p| normalize_path(&p))
        .unwrap_or_else(|_| path.to_path_buf())
}

/// Cross-platform atomic rename.
///
/// Windows `fs::rename` refuses to replace an existing target, so the target
/// is removed first there.
pub fn atomic_rename(src: &Path, dst: &Path) -> io::Result<()> {
    #[cfg(windows)]
    {
        if dst.exists() {
            std::fs::remove_file(dst)?;
        }
    }
    std::fs::rename(src, dst)
}

/// Write `bytes` to a sibling temp file and rename it over `dst`
pub fn atomic_write(dst: &Path, bytes: &[u8]) -> io::Result<()> {
    if let Some(parent) = dst.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let mut tmp = dst.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp = PathBuf::from(tmp);
    std::fs::write(&tmp, bytes)?;
    atomic_rename(&tmp, dst)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_atomic_write_replaces_existing() {
        let dir = TempDir::new().unwrap();
        let target = dir.path().join("nested").join("data.bin");
        atomic_write(&target, b"first").unwrap();
        atomic_write(&target, b"second").unwrap();
        assert_eq!(std::fs::read(&target).unwrap(), b"second");
        assert!(!dir.path().join("nested").join("data.bin.tmp").exists());
    }

    #[test]
    fn test_canonical_root_falls_back() {
        let missing = Path::new("/definitely/not/here");
        assert_eq!(canonical_root(missing), missing.to_path_buf());
    }

    #[cfg(not(windows))]
    #[test]
    fn test_normalize_path_unix_noop() {
        let p = Path::new("/home/user/project");
        assert_eq!(normalize_path(p), p.to_path_buf());
    }
}
