//! CLI error types.

use crate::config::ConfigError;
use std::path::PathBuf;
use thiserror::Error;

/// CLI errors.
///
/// This enum is marked `#[non_exhaustive]` to allow adding new variants
/// in future versions without breaking downstream code.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// An argument was rejected before any log I/O.
    #[error("{0}")]
    Validation(String),

    /// The repository root does not exist or is not a directory.
    #[error("repository root {} is not a directory", path.display())]
    RepoRoot { path: PathBuf },

    /// A tree-sitter parse output file could not be read.
    #[error("failed to read parse output {}: {source}", path.display())]
    ParseOutputRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A tree-sitter parse output file is not JSON.
    #[error("parse output {} is not valid JSON: {source}", path.display())]
    ParseOutputJson {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    /// Configuration is invalid or unreadable.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// An error occurred in the event log layer.
    #[error(transparent)]
    Log(#[from] eventlog::Error),

    /// Output could not be encoded.
    #[error("failed to encode output: {0}")]
    Output(#[from] serde_json::Error),
}

impl Error {
    /// Process exit code for this error.
    pub fn exit_code(&self) -> i32 {
        match self {
            Error::Validation(_)
            | Error::RepoRoot { .. }
            | Error::ParseOutputJson { .. }
            | Error::Log(eventlog::Error::Validation(_)) => 2,
            Error::Log(eventlog::Error::LogDecode { .. }) => 3,
            Error::Log(eventlog::Error::LogWrite { .. }) => 4,
            Error::Config(_) => 5,
            Error::ParseOutputRead { .. } | Error::Log(_) | Error::Output(_) => 1,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
