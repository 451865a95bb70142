//! Commit history

use std::path::Path;

use serde::Serialize;

use super::diff::{parse_name_status, ChangedFile};
use super::git_command;
use crate::error::Result;

/// One commit with the files it touched
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CommitInfo {
    pub sha: String,
    pub short_sha: String,
    pub author: String,
    /// Author date, ISO 8601
    pub date: String,
    /// First line of the message
    pub subject: String,
    pub files: Vec<ChangedFile>,
}

// Records start with RS; header fields are split by US. The subject goes last
// so it may contain anything.
const LOG_FORMAT: &str = "--format=%x1e%H%x1f%h%x1f%an%x1f%aI%x1f%s";
const RECORD_SEP: char = '\u{1e}';
const FIELD_SEP: char = '\u{1f}';

/// The newest `limit` commits on HEAD, newest first
pub fn recent_commits(repo: &Path, limit: usize) -> Result<Vec<CommitInfo>> {
    let count = format!("-n{}", limit.max(1));
    let output = git_command(&["log", &count, "--name-status", "-M", LOG_FORMAT], Some(repo))?;
    parse_log(&output)
}

/// Commits touching `path` (following renames), newest first
pub fn file_history(repo: &Path, path: &str, limit: usize) -> Result<Vec<CommitInfo>> {
    let count = format!("-n{}", limit.max(1));
    let output = git_command(
        &["log", &count, "--follow", "--name-status", "-M", LOG_FORMAT, "--", path],
        Some(repo),
    )?;
    parse_log(&output)
}

fn parse_log(output: &str) -> Result<Vec<CommitInfo>> {
    let mut commits = Vec::new();
    for record in output.split(RECORD_SEP).filter(|r| !r.trim().is_empty()) {
        let (header, body) = record.split_once('\n').unwrap_or((record, ""));
        let fields: Vec<&str> = header.splitn(5, FIELD_SEP).collect();
        if fields.len() < 5 {
            continue;
        }
        commits.push(CommitInfo {
            sha: fields[0].to_string(),
            short_sha: fields[1].to_string(),
            author: fields[2].to_string(),
            date: fields[3].to_string(),
            subject: fields[4].trim_end().to_string(),
            files: parse_name_status(body)?,
        });
    }
    Ok(commits)
}
