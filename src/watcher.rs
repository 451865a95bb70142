//! File system watcher for incremental re-indexing
//!
//! Uses `notify-debouncer-mini` to batch rapid changes, filters them down to
//! supported source files the repository walk would not ignore and hands
//! each batch to a callback (the engine's `update_files`).
//!
//! ```text
//! ┌─────────────┐     ┌─────────────┐     ┌──────────────────┐
//! │   notify    │────>│  debouncer  │────>│ on_change(paths)  │
//! │   watcher   │     │  (200ms)    │     │ engine re-index   │
//! └─────────────┘     └─────────────┘     └──────────────────┘
//! ```

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::RecvTimeoutError;
use std::sync::Arc;
use std::time::Duration;

use notify::RecursiveMode;
use notify_debouncer_mini::{new_debouncer, DebouncedEventKind};
use tracing::{debug, error, info};

use crate::error::{NarsilError, Result};
use crate::lang::Lang;
use crate::walker::{IgnoreRules, WalkOptions};

/// Configuration for the file watcher
#[derive(Debug, Clone)]
pub struct WatcherConfig {
    /// Debounce window
    pub debounce_duration: Duration,
    /// Ignore rules shared with the repository walk
    pub walk: WalkOptions,
}

impl Default for WatcherConfig {
    fn default() -> Self {
        Self {
            debounce_duration: Duration::from_millis(200),
            walk: WalkOptions::default(),
        }
    }
}

/// Watches one repository root
pub struct FileWatcher {
    repo_root: PathBuf,
    config: WatcherConfig,
}

impl FileWatcher {
    pub fn new(repo_root: PathBuf) -> Self {
        Self::with_config(repo_root, WatcherConfig::default())
    }

    pub fn with_config(repo_root: PathBuf, config: WatcherConfig) -> Self {
        Self { repo_root, config }
    }

    /// Start watching on a background thread. `on_change` receives absolute
    /// paths of changed, created or deleted source files, deduplicated per
    /// debounce window.
    pub fn start<F>(&self, on_change: F) -> Result<WatcherHandle>
    where
        F: Fn(Vec<PathBuf>) + Send + 'static,
    {
        let repo_root = self.repo_root.clone();
        let rules = IgnoreRules::new(&repo_root, &self.config.walk);
        let running = Arc::new(AtomicBool::new(true));

        let (tx, rx) = std::sync::mpsc::channel();
        let mut debouncer = new_debouncer(self.config.debounce_duration, tx).map_err(watch_error)?;
        debouncer
            .watcher()
            .watch(&repo_root, RecursiveMode::Recursive)
            .map_err(watch_error)?;
        info!("watching {} for changes", repo_root.display());

        let thread_running = Arc::clone(&running);
        std::thread::Builder::new()
            .name("narsil-watcher".into())
            .spawn(move || {
                while thread_running.load(Ordering::SeqCst) {
                    match rx.recv_timeout(Duration::from_millis(100)) {
                        Ok(Ok(events)) => {
                            let changed: BTreeSet<PathBuf> = events
                                .into_iter()
                                .filter(|e| matches!(e.kind, DebouncedEventKind::Any))
                                .map(|e| e.path)
                                .filter(|p| should_watch_path(p, &rules))
                                .collect();
                            if !changed.is_empty() {
                                debug!("{} changed files under {}", changed.len(), repo_root.display());
                                on_change(changed.into_iter().collect());
                            }
                        }
                        Ok(Err(e)) => error!("watcher error: {:?}", e),
                        Err(RecvTimeoutError::Timeout) => {}
                        Err(RecvTimeoutError::Disconnected) => break,
                    }
                }
                // Keep the debouncer alive until the loop exits
                drop(debouncer);
                debug!("watcher for {} stopped", repo_root.display());
            })?;

        Ok(WatcherHandle { running })
    }
}

fn watch_error(e: notify::Error) -> NarsilError {
    NarsilError::Io(std::io::Error::new(std::io::ErrorKind::Other, e.to_string()))
}

/// Whether a changed path can affect the index
pub fn should_watch_path(path: &Path, rules: &IgnoreRules) -> bool {
    Lang::from_path(path).is_ok() && !rules.is_ignored(path)
}

/// Running watcher; stops when dropped
pub struct WatcherHandle {
    running: Arc<AtomicBool>,
}

impl WatcherHandle {
    pub fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }
}

impl Drop for WatcherHandle {
    fn drop(&mut self) {
        self.stop();
    }
}
