//! Regex search over the working tree
//!
//! Backs the `grep_code` tool and the fallback for `search_code` while a
//! repository is still indexing. Walks with the `ignore` crate (so
//! `.gitignore` is honored) and searches with ripgrep's searcher.

use std::path::Path;

use grep_matcher::Matcher;
use grep_regex::{RegexMatcher, RegexMatcherBuilder};
use grep_searcher::sinks::UTF8;
use grep_searcher::{BinaryDetection, SearcherBuilder};
use ignore::WalkBuilder;
use serde::{Deserialize, Serialize};
use tracing::trace;

use crate::error::{NarsilError, Result};
use crate::walker;

/// A matching line
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GrepMatch {
    /// Repository-relative path
    pub file: String,
    /// 1-indexed
    pub line: u64,
    /// 1-indexed byte column of the first match
    pub column: u64,
    pub content: String,
}

#[derive(Debug, Clone)]
pub struct GrepOptions {
    /// Regex pattern
    pub pattern: String,
    pub case_insensitive: bool,
    pub limit: usize,
    pub respect_gitignore: bool,
    /// Only search files with a supported source extension
    pub source_only: bool,
}

impl GrepOptions {
    pub fn new(pattern: impl Into<String>) -> Self {
        Self {
            pattern: pattern.into(),
            case_insensitive: false,
            limit: 100,
            respect_gitignore: true,
            source_only: false,
        }
    }

    pub fn case_insensitive(mut self, yes: bool) -> Self {
        self.case_insensitive = yes;
        self
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = limit;
        self
    }

    pub fn source_only(mut self) -> Self {
        self.source_only = true;
        self
    }
}

/// Pattern matching any of the words of a free-text query, literally
pub fn words_pattern(query: &str) -> String {
    let words: Vec<String> = query.split_whitespace().map(regex::escape).collect();
    if words.is_empty() {
        regex::escape(query)
    } else {
        words.join("|")
    }
}

/// Search every file under `root`, stopping after `options.limit` matches.
/// Binary and unreadable files are skipped.
pub fn grep_repository(root: &Path, options: &GrepOptions) -> Result<Vec<GrepMatch>> {
    if options.pattern.is_empty() {
        return Err(NarsilError::query("empty search pattern"));
    }
    let matcher = RegexMatcherBuilder::new()
        .case_insensitive(options.case_insensitive)
        .build(&options.pattern)
        .map_err(|e| NarsilError::query(format!("invalid regex pattern: {}", e)))?;

    let walk = WalkBuilder::new(root)
        .git_ignore(options.respect_gitignore)
        .git_global(options.respect_gitignore)
        .git_exclude(options.respect_gitignore)
        .hidden(true)
        .follow_links(false)
        .filter_entry(|entry| {
            let is_dir = entry.file_type().map(|t| t.is_dir()).unwrap_or(false);
            !(is_dir && entry.depth() > 0 && walker::is_excluded_dir_name(&entry.file_name().to_string_lossy()))
        })
        .build();

    let mut paths: Vec<_> = walk
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().map(|t| t.is_file()).unwrap_or(false))
        .map(|e| e.into_path())
        .filter(|p| {
            !options.source_only
                || p.extension()
                    .and_then(|e| e.to_str())
                    .map(crate::lang::Lang::is_supported_extension)
                    .unwrap_or(false)
        })
        .collect();
    paths.sort();

    let mut matches = Vec::new();
    for path in paths {
        if matches.len() >= options.limit {
            break;
        }
        let rel = walker::relative_path(root, &path);
        if let Err(e) = search_file(&path, &rel, &matcher, options.limit, &mut matches) {
            trace!("skipping {}: {}", rel, e);
        }
    }
    Ok(matches)
}

fn search_file(
    path: &Path,
    rel: &str,
    matcher: &RegexMatcher,
    limit: usize,
    out: &mut Vec<GrepMatch>,
) -> std::io::Result<()> {
    let mut searcher = SearcherBuilder::new()
        .binary_detection(BinaryDetection::quit(b'\x00'))
        .line_number(true)
        .build();

    searcher.search_path(
        matcher,
        path,
        UTF8(|line_num, line| {
            let column = matcher
                .find(line.as_bytes())
                .ok()
                .flatten()
                .map(|m| m.start() as u64 + 1)
                .unwrap_or(1);
            out.push(GrepMatch {
                file: rel.to_string(),
                line: line_num,
                column,
                content: line.trim_end().to_string(),
            });
            Ok(out.len() < limit)
        }),
    )
}
