//! Error types and exit codes for narsil-mcp

use std::process::ExitCode;
use thiserror::Error;

/// Main error type for narsil-mcp operations
#[derive(Error, Debug)]
pub enum NarsilError {
    #[error("File not found: {path}")]
    FileNotFound { path: String },

    #[error("Unsupported language for extension: {extension}")]
    UnsupportedLanguage { extension: String },

    #[error("Failed to parse file: {message}")]
    ParseFailure { message: String },

    #[error("Repository not indexed: {name}")]
    RepoNotFound { name: String },

    #[error("Repository '{name}' is still indexing ({done}/{total} files)")]
    IndexNotReady {
        name: String,
        done: usize,
        total: usize,
    },

    #[error("Query error: {message}")]
    QueryError { message: String },

    #[error("Cache error: {message}")]
    CacheError { message: String },

    #[error("Snapshot is inconsistent: {message}")]
    SnapshotInconsistent { message: String },

    #[error("Configuration error: {message}")]
    ConfigError { message: String },

    #[error("Git error: {message}")]
    GitError { message: String },

    #[error("Neural search error: {message}")]
    NeuralError { message: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl NarsilError {
    /// Convert error to a process exit code:
    /// - 0: Success
    /// - 1: File not found / IO error
    /// - 2: Unsupported language
    /// - 3: Parse failure
    /// - 4: Query failure (unknown repo, index not ready, bad arguments)
    /// - 5: Git error
    /// - 6: Cache or snapshot failure
    /// - 7: Configuration or neural backend error
    pub fn exit_code(&self) -> ExitCode {
        match self {
            Self::FileNotFound { .. } => ExitCode::from(1),
            Self::UnsupportedLanguage { .. } => ExitCode::from(2),
            Self::ParseFailure { .. } => ExitCode::from(3),
            Self::RepoNotFound { .. } => ExitCode::from(4),
            Self::IndexNotReady { .. } => ExitCode::from(4),
            Self::QueryError { .. } => ExitCode::from(4),
            Self::GitError { .. } => ExitCode::from(5),
            Self::CacheError { .. } => ExitCode::from(6),
            Self::SnapshotInconsistent { .. } => ExitCode::from(6),
            Self::ConfigError { .. } => ExitCode::from(7),
            Self::NeuralError { .. } => ExitCode::from(7),
            Self::Io(_) => ExitCode::from(1),
        }
    }

    pub fn query(message: impl Into<String>) -> Self {
        Self::QueryError {
            message: message.into(),
        }
    }
}

/// Result type alias for narsil-mcp operations
pub type Result<T> = std::result::Result<T, NarsilError>;
