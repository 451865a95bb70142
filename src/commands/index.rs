//! Index command handler
//!
//! Indexes every repository in the foreground and saves the snapshots, so a
//! later `narsil-mcp --persist` server starts from the cache. This is the
//! path for repositories too large to index inside a client's startup
//! timeout.

use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::Duration;

use indicatif::{ProgressBar, ProgressStyle};
use serde::Serialize;

use crate::cli::Cli;
use crate::commands::render;
use crate::config::Settings;
use crate::engine::{Engine, RepoStatus};
use crate::error::Result;
use crate::indexer::IndexStats;

#[derive(Debug, Serialize)]
struct IndexSummary {
    name: String,
    ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
    files: usize,
    parsed: usize,
    reused: usize,
    removed: usize,
    failed: usize,
    symbols: usize,
    edges: usize,
    elapsed_ms: u64,
}

impl IndexSummary {
    fn new(name: String, result: &Result<IndexStats>) -> Self {
        let stats = result.as_ref().ok().cloned().unwrap_or_default();
        Self {
            name,
            ok: result.is_ok(),
            error: result.as_ref().err().map(|e| e.to_string()),
            files: stats.files,
            parsed: stats.parsed,
            reused: stats.reused,
            removed: stats.removed,
            failed: stats.failed,
            symbols: stats.symbols,
            edges: stats.edges,
            elapsed_ms: stats.elapsed.as_millis() as u64,
        }
    }
}

pub fn run_index(cli: &Cli, settings: &Settings) -> Result<String> {
    let mut options = cli.engine_options(settings)?;
    options.persist = true;
    options.watch = false;
    let engine = Engine::new(options)?;

    let mut first_error = None;
    let mut summaries = Vec::new();
    for (name, result) in index_with_progress(&engine) {
        summaries.push(IndexSummary::new(name, &result));
        if let Err(e) = result {
            first_error.get_or_insert(e);
        }
    }

    let mut text = String::new();
    for s in &summaries {
        match &s.error {
            Some(err) => text.push_str(&format!("{}: failed: {}\n", s.name, err)),
            None => text.push_str(&format!(
                "{}: {} files ({} parsed, {} reused, {} removed, {} failed), {} symbols, {} edges in {} ms\n",
                s.name, s.files, s.parsed, s.reused, s.removed, s.failed, s.symbols, s.edges, s.elapsed_ms
            )),
        }
    }

    match first_error {
        Some(e) => {
            eprint!("{}", text);
            Err(e)
        }
        None => render(cli.format, text, &summaries),
    }
}

/// Index on this thread while a spinner on stderr polls the progress
/// counters. indicatif hides the spinner when stderr is not a terminal.
fn index_with_progress(engine: &Engine) -> Vec<(String, Result<IndexStats>)> {
    let pb = ProgressBar::new_spinner();
    if let Ok(style) = ProgressStyle::default_spinner().template("{spinner:.cyan} {msg}") {
        pb.set_style(style);
    }
    pb.enable_steady_tick(Duration::from_millis(80));

    let finished = AtomicBool::new(false);
    let results = thread::scope(|scope| {
        scope.spawn(|| {
            while !finished.load(Ordering::Relaxed) {
                if let Ok(reports) = engine.index_status(None) {
                    let current = reports.iter().find_map(|r| match &r.status {
                        RepoStatus::Indexing { phase, done, total } => {
                            Some(format!("{}: {} {}/{} files", r.name, phase, done, total))
                        }
                        _ => None,
                    });
                    if let Some(message) = current {
                        pb.set_message(message);
                    }
                }
                thread::sleep(Duration::from_millis(100));
            }
        });
        let results = engine.index_all_blocking();
        finished.store(true, Ordering::Relaxed);
        results
    });

    pb.finish_and_clear();
    results
}
