//! Error types for filekv
//!
//! Provides a unified error type for all store operations.

use std::path::{Path, PathBuf};

use thiserror::Error;

/// Result type alias using FileKvError
pub type Result<T> = std::result::Result<T, FileKvError>;

/// Unified error type for filekv operations
#[derive(Debug, Error)]
pub enum FileKvError {
    // -------------------------------------------------------------------------
    // I/O Errors
    // -------------------------------------------------------------------------
    #[error("IO error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("IO error: {0}")]
    BareIo(#[from] std::io::Error),

    // -------------------------------------------------------------------------
    // Concurrency Errors
    // -------------------------------------------------------------------------
    /// The incoming value's token does not match the stored one.
    #[error("ETag conflict on key '{key}': expected '{expected}', stored '{actual}'")]
    Conflict {
        key: String,
        expected: String,
        actual: String,
    },

    #[error("Operation cancelled before it started")]
    Cancelled,

    #[error("Worker pool is shut down")]
    WorkerUnavailable,

    // -------------------------------------------------------------------------
    // Record Errors
    // -------------------------------------------------------------------------
    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Corrupted record at {path}: {message}")]
    Corruption { path: PathBuf, message: String },

    // -------------------------------------------------------------------------
    // Configuration Errors
    // -------------------------------------------------------------------------
    #[error("Configuration error: {0}")]
    Config(String),
}

impl FileKvError {
    /// Create an I/O error with path context.
    pub fn io(path: impl AsRef<Path>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.as_ref().to_path_buf(),
            source,
        }
    }

    /// Create a conflict error for `key`.
    pub fn conflict(
        key: impl Into<String>,
        expected: impl Into<String>,
        actual: impl Into<String>,
    ) -> Self {
        Self::Conflict {
            key: key.into(),
            expected: expected.into(),
            actual: actual.into(),
        }
    }

    pub fn serialization(message: impl ToString) -> Self {
        Self::Serialization(message.to_string())
    }

    pub fn corruption(path: impl AsRef<Path>, message: impl Into<String>) -> Self {
        Self::Corruption {
            path: path.as_ref().to_path_buf(),
            message: message.into(),
        }
    }

    /// True for optimistic-concurrency conflicts (re-read and retry).
    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::Conflict { .. })
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }

    /// The OS error kind, for either I/O variant.
    pub fn io_kind(&self) -> Option<std::io::ErrorKind> {
        match self {
            Self::Io { source, .. } => Some(source.kind()),
            Self::BareIo(source) => Some(source.kind()),
            _ => None,
        }
    }
}
