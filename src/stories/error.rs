//! Error types for story discovery and indexing.

use std::path::PathBuf;
use thiserror::Error;

/// Errors from normalizing specifiers and building the story index.
#[derive(Error, Debug)]
pub enum IndexError {
    #[error("Story directory {directory} does not exist (specifier '{specifier}')")]
    MissingDirectory {
        specifier: String,
        directory: PathBuf,
    },

    #[error("Invalid files pattern '{pattern}': {reason}")]
    InvalidPattern { pattern: String, reason: String },

    #[error("Failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Cannot index {path}: {reason}")]
    Extraction { path: PathBuf, reason: String },

    #[error("Duplicate story id '{id}' in {import_path}, already defined by {existing}")]
    DuplicateId {
        id: String,
        import_path: String,
        existing: String,
    },

    #[error("Index build task failed: {0}")]
    Task(String),
}

pub type IndexResult<T> = Result<T, IndexError>;
