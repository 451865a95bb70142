//! `--name-status` parsing

use serde::Serialize;

use crate::error::{NarsilError, Result};

/// How a commit touched a file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeType {
    Added,
    Modified,
    Deleted,
    Renamed,
    Copied,
    /// e.g. file to symlink
    TypeChanged,
}

impl ChangeType {
    fn from_status(status: &str) -> Option<Self> {
        Some(match status.chars().next()? {
            'A' => Self::Added,
            'M' => Self::Modified,
            'D' => Self::Deleted,
            'R' => Self::Renamed,
            'C' => Self::Copied,
            'T' => Self::TypeChanged,
            _ => return None,
        })
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Added => "added",
            Self::Modified => "modified",
            Self::Deleted => "deleted",
            Self::Renamed => "renamed",
            Self::Copied => "copied",
            Self::TypeChanged => "type_changed",
        }
    }

    /// One-letter marker used in listings
    pub fn marker(&self) -> char {
        match self {
            Self::Added => 'A',
            Self::Modified => 'M',
            Self::Deleted => 'D',
            Self::Renamed => 'R',
            Self::Copied => 'C',
            Self::TypeChanged => 'T',
        }
    }
}

/// A file touched by a commit
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChangedFile {
    /// Repository-relative path after the change
    pub path: String,
    /// Source path of a rename or copy
    pub old_path: Option<String>,
    pub change_type: ChangeType,
}

/// Parse `git log --name-status` / `git diff --name-status` lines
pub(crate) fn parse_name_status(output: &str) -> Result<Vec<ChangedFile>> {
    output
        .lines()
        .filter(|line| !line.trim().is_empty())
        .map(parse_line)
        .collect()
}

fn parse_line(line: &str) -> Result<ChangedFile> {
    let invalid = || NarsilError::GitError {
        message: format!("unexpected name-status line: {}", line),
    };
    let mut fields = line.split('\t');
    let change_type = fields.next().and_then(ChangeType::from_status).ok_or_else(invalid)?;
    let first = fields.next().ok_or_else(invalid)?;

    let (path, old_path) = match (change_type, fields.next()) {
        (ChangeType::Renamed | ChangeType::Copied, Some(new_path)) => {
            (new_path.to_string(), Some(first.to_string()))
        }
        _ => (first.to_string(), None),
    };
    Ok(ChangedFile {
        path,
        old_path,
        change_type,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_plain_changes() {
        let files = parse_name_status("M\tsrc/lib.rs\nA\tsrc/new.rs\n\nD\tsrc/old.rs").unwrap();
        let kinds: Vec<ChangeType> = files.iter().map(|f| f.change_type).collect();
        assert_eq!(kinds, vec![ChangeType::Modified, ChangeType::Added, ChangeType::Deleted]);
        assert_eq!(files[1].path, "src/new.rs");
        assert!(files.iter().all(|f| f.old_path.is_none()));
    }

    #[test]
    fn test_parse_rename_keeps_both_paths() {
        let files = parse_name_status("R087\tsrc/a.rs\tsrc/b.rs").unwrap();
        assert_eq!(files[0].path, "src/b.rs");
        assert_eq!(files[0].old_path.as_deref(), Some("src/a.rs"));
        assert_eq!(files[0].change_type.marker(), 'R');
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!(parse_name_status("Z\tsomething").is_err());
        assert!(parse_name_status("M").is_err());
    }
}
