//! Centralized error types for mailindex.

use std::path::PathBuf;
use thiserror::Error;

/// All errors produced by the mailindex library.
#[derive(Error, Debug)]
pub enum IndexError {
    /// I/O error with the associated file path.
    #[error("I/O error reading '{path}': {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// The file has no From, To, or Subject header, so it is not mail.
    #[error("Not an email message: {0}")]
    NotAnEmail(PathBuf),

    /// A write was attempted on an index opened read-only.
    #[error("Index is opened read-only")]
    ReadOnly,

    /// The index file is corrupt or was written by an incompatible version.
    #[error("Corrupt or incompatible index at '{path}': {reason}")]
    Corrupt { path: PathBuf, reason: String },

    /// The index backend failed during a mutation or commit.
    ///
    /// Once reported, the index refuses further writes until reopened.
    #[error("Index backend error: {0}")]
    Backend(String),
}

/// Convenience alias for `Result<T, IndexError>`.
pub type Result<T> = std::result::Result<T, IndexError>;

impl IndexError {
    /// Create an `Io` variant from a path and an `io::Error`.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}
