//! Git history queries
//!
//! Everything shells out to the `git` binary, so any repository layout git
//! itself understands (worktrees, submodules) works without extra handling.

mod commit;
mod diff;

pub use commit::{file_history, recent_commits, CommitInfo};
pub use diff::{ChangeType, ChangedFile};

use std::path::Path;
use std::process::Command;

use crate::error::{NarsilError, Result};

/// Whether a `git` executable is on PATH
pub fn git_available() -> bool {
    which::which("git").is_ok()
}

/// Run a git command and return stdout as string
pub fn git_command(args: &[&str], cwd: Option<&Path>) -> Result<String> {
    let mut cmd = Command::new("git");
    cmd.args(args);

    if let Some(dir) = cwd {
        cmd.current_dir(dir);
    }

    let output = cmd.output().map_err(|e| NarsilError::GitError {
        message: format!("Failed to execute git: {}", e),
    })?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(NarsilError::GitError {
            message: format!("git {} failed: {}", args.join(" "), stderr.trim()),
        });
    }

    Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
}

/// Run a git command, returning None if it fails (for optional queries)
pub fn git_command_optional(args: &[&str], cwd: Option<&Path>) -> Option<String> {
    git_command(args, cwd).ok()
}

/// Check if `dir` is inside a git work tree
pub fn is_git_repo(dir: &Path) -> bool {
    git_command_optional(&["rev-parse", "--is-inside-work-tree"], Some(dir))
        .map(|s| s == "true")
        .unwrap_or(false)
}

/// Current branch name, or `HEAD` when detached
pub fn current_branch(dir: &Path) -> Result<String> {
    git_command(&["rev-parse", "--abbrev-ref", "HEAD"], Some(dir))
}
