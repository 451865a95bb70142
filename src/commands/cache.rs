//! Cache command handler - list or clear cached indexes

use std::path::PathBuf;

use serde::Serialize;

use crate::cache::{clear_all, get_cache_base_dir, list_cached_repos, CacheDir};
use crate::cli::{CacheArgs, CacheOperation, Cli};
use crate::commands::render;
use crate::config::Settings;
use crate::error::Result;

#[derive(Debug, Serialize)]
struct CacheEntry {
    dir: String,
    repo_root: Option<String>,
    size_bytes: u64,
    files: Option<usize>,
    symbols: Option<usize>,
    generated_at: Option<String>,
}

/// `cache.dir` from the settings file, else the XDG cache location
fn cache_base(settings: &Settings) -> PathBuf {
    settings.cache.dir.clone().unwrap_or_else(get_cache_base_dir)
}

pub fn run_cache(cli: &Cli, settings: &Settings, args: &CacheArgs) -> Result<String> {
    let base = cache_base(settings);
    match args.operation {
        CacheOperation::List => run_cache_list(cli, &base),
        CacheOperation::Clear => run_cache_clear(cli, &base),
    }
}

fn run_cache_list(cli: &Cli, base: &std::path::Path) -> Result<String> {
    let entries: Vec<CacheEntry> = list_cached_repos(base)
        .into_iter()
        .map(|repo| CacheEntry {
            dir: repo.dir_name,
            repo_root: repo.meta.as_ref().map(|m| m.repo_root.clone()),
            size_bytes: repo.size,
            files: repo.meta.as_ref().map(|m| m.files),
            symbols: repo.meta.as_ref().map(|m| m.symbols),
            generated_at: repo.meta.map(|m| m.generated_at),
        })
        .collect();

    let mut text = format!("cache_base: {}\n", base.display());
    if entries.is_empty() {
        text.push_str("No cached repositories found.\n");
    } else {
        let total: u64 = entries.iter().map(|e| e.size_bytes).sum();
        text.push_str(&format!(
            "{} cached repositories, {:.2} MB\n\n",
            entries.len(),
            total as f64 / (1024.0 * 1024.0)
        ));
        for e in &entries {
            text.push_str(&format!("- {}\n", e.dir));
            if let Some(root) = &e.repo_root {
                text.push_str(&format!("    repo: {}\n", root));
            }
            if let (Some(files), Some(symbols)) = (e.files, e.symbols) {
                text.push_str(&format!("    {} files, {} symbols\n", files, symbols));
            }
            if let Some(at) = &e.generated_at {
                text.push_str(&format!("    indexed: {}\n", at));
            }
            text.push_str(&format!("    size: {:.2} MB\n", e.size_bytes as f64 / (1024.0 * 1024.0)));
        }
    }
    render(cli.format, text, &entries)
}

fn run_cache_clear(cli: &Cli, base: &std::path::Path) -> Result<String> {
    let removed = if cli.repos.is_empty() {
        clear_all(base)?
    } else {
        let mut removed = 0;
        for repo in &cli.repos {
            let cache = CacheDir::in_base(base, repo);
            if cache.root.exists() {
                cache.clear()?;
                tracing::info!("Removed cache {}", cache.root.display());
                removed += 1;
            }
        }
        removed
    };
    let text = format!("Removed {} cached index(es) from {}\n", removed, base.display());
    render(cli.format, text, &serde_json::json!({ "removed": removed }))
}
