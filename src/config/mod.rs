//! narsil-mcp configuration
//!
//! Settings live in a TOML file at `~/.config/narsil-mcp/config.toml`. A
//! missing file means defaults; command-line flags and environment variables
//! override whatever the file says.
//!
//! ```toml
//! [cache]
//! dir = "/var/cache/narsil"
//!
//! [index]
//! max_file_size = 2097152
//! extra_excludes = ["fixtures", "third_party"]
//!
//! [logging]
//! level = "debug"
//! ```

pub mod editor;
pub mod wizard;

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{NarsilError, Result};
use crate::fs_utils;
use crate::walker::{WalkOptions, DEFAULT_MAX_FILE_SIZE};

/// Settings file contents
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct Settings {
    #[serde(default)]
    pub cache: CacheSettings,

    #[serde(default)]
    pub index: IndexSettings,

    #[serde(default)]
    pub logging: LoggingSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct CacheSettings {
    /// Base directory for snapshots, replacing `~/.cache/narsil-mcp`
    #[serde(default)]
    pub dir: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct IndexSettings {
    /// Files larger than this many bytes are skipped
    #[serde(default = "default_max_file_size")]
    pub max_file_size: u64,

    /// Extra gitignore-style exclude patterns
    #[serde(default)]
    pub extra_excludes: Vec<String>,

    #[serde(default)]
    pub include_hidden: bool,

    #[serde(default = "default_true")]
    pub respect_gitignore: bool,
}

fn default_max_file_size() -> u64 {
    DEFAULT_MAX_FILE_SIZE
}

fn default_true() -> bool {
    true
}

impl Default for IndexSettings {
    fn default() -> Self {
        Self {
            max_file_size: default_max_file_size(),
            extra_excludes: Vec::new(),
            include_hidden: false,
            respect_gitignore: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LoggingSettings {
    /// error, warn, info, debug or trace
    #[serde(default = "default_log_level")]
    pub level: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

const LOG_LEVELS: &[&str] = &["error", "warn", "info", "debug", "trace"];

impl Settings {
    /// `~/.config/narsil-mcp/config.toml`
    pub fn default_path() -> Option<PathBuf> {
        dirs::home_dir()
            .map(|home| home.join(".config"))
            .or_else(dirs::config_dir)
            .map(|dir| dir.join("narsil-mcp").join("config.toml"))
    }

    /// Load from the default path
    pub fn load() -> Result<Self> {
        match Self::default_path() {
            Some(path) => Self::load_from(&path),
            None => Ok(Self::default()),
        }
    }

    /// Load from `path`; a missing file yields defaults
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = fs::read_to_string(path)?;
        let settings: Self = toml::from_str(&content).map_err(|e| NarsilError::ConfigError {
            message: format!("failed to parse {}: {}", path.display(), e),
        })?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self).map_err(|e| NarsilError::ConfigError {
            message: format!("failed to serialize settings: {}", e),
        })?;
        fs_utils::atomic_write(path, content.as_bytes())?;
        Ok(())
    }

    fn validate(&self) -> Result<()> {
        if !LOG_LEVELS.contains(&self.logging.level.to_ascii_lowercase().as_str()) {
            return Err(NarsilError::ConfigError {
                message: format!(
                    "invalid log level '{}', expected one of: {}",
                    self.logging.level,
                    LOG_LEVELS.join(", ")
                ),
            });
        }
        if self.index.max_file_size == 0 {
            return Err(NarsilError::ConfigError {
                message: "index.max_file_size must be greater than zero".into(),
            });
        }
        Ok(())
    }

    /// Walk options described by the `[index]` section
    pub fn walk_options(&self) -> WalkOptions {
        WalkOptions {
            respect_gitignore: self.index.respect_gitignore,
            include_hidden: self.index.include_hidden,
            max_file_size: self.index.max_file_size,
            extra_excludes: self.index.extra_excludes.clone(),
        }
    }
}
