//! Error taxonomy of the indexing pipeline.
//!
//! Module seams return these typed errors; the CLI layer wraps them in
//! `anyhow`. Duplicate content and empty documents are outcomes, not errors,
//! and live in [`FileOutcome`](crate::ingest::FileOutcome).

use std::path::PathBuf;
use thiserror::Error;

/// A file vanished or could not be read while hashing or loading.
#[derive(Error, Debug)]
#[error("cannot read {path}: {source}")]
pub struct FileAccessError {
    pub path: PathBuf,
    #[source]
    pub source: std::io::Error,
}

impl FileAccessError {
    pub fn new(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self {
            path: path.into(),
            source,
        }
    }
}

#[derive(Error, Debug)]
pub enum LoadError {
    #[error(transparent)]
    FileAccess(#[from] FileAccessError),

    #[error("unsupported file type '{extension}': {path}")]
    UnsupportedFormat { path: PathBuf, extension: String },

    #[error("failed to extract text from {path}: {reason}")]
    Extract { path: PathBuf, reason: String },
}

#[derive(Error, Debug)]
pub enum IndexError {
    /// The vector store or the embedding service failed.
    #[error("vector store unavailable during {operation}: {reason}")]
    StoreUnavailable {
        operation: &'static str,
        reason: String,
    },

    #[error("k must be a positive integer")]
    InvalidK,
}

impl IndexError {
    pub fn store(operation: &'static str, err: impl std::fmt::Display) -> Self {
        IndexError::StoreUnavailable {
            operation,
            reason: err.to_string(),
        }
    }

    pub fn is_store_unavailable(&self) -> bool {
        matches!(self, IndexError::StoreUnavailable { .. })
    }
}
