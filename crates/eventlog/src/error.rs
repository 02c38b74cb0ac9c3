//! Event log error types.

use std::path::PathBuf;
use thiserror::Error;

/// Event log errors.
///
/// This enum is marked `#[non_exhaustive]` to allow adding new variants
/// in future versions without breaking downstream code.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// Appending a record (or creating its directory) failed.
    ///
    /// A lost record is a data-loss failure, so this is always surfaced,
    /// but it says nothing about whether the logged operation succeeded.
    #[error("failed to write log entry to {}: {source}", path.display())]
    LogWrite {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A log file exists but could not be opened or read.
    #[error("failed to read log {}: {source}", path.display())]
    LogRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A line is not valid JSON or does not match the event schema.
    #[error("invalid log entry at {}:{line}: {message}", path.display())]
    LogDecode {
        path: PathBuf,
        /// 1-based line number of the offending line.
        line: usize,
        message: String,
    },

    /// An event could not be encoded as JSON.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// An argument or filter is structurally invalid.
    #[error("invalid input: {0}")]
    Validation(String),
}

pub type Result<T> = std::result::Result<T, Error>;
