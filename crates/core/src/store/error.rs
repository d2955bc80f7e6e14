//! Error types for the store module.

use std::path::PathBuf;
use thiserror::Error;

/// Raw bytes that could not be turned into a database.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum FormatError {
    /// The bytes match none of the known schemas.
    #[error("unrecognized database format ({size} bytes)")]
    Unrecognized { size: usize },

    /// A non-trivial document parsed, but to zero entries under every schema.
    #[error("document of {size} bytes parsed to zero entries under every schema")]
    EmptyDocument { size: usize },

    /// An id or the sequence counter is above [`MAX_SEQUENCE`](super::MAX_SEQUENCE).
    #[error("sequence number {value} is out of range")]
    SequenceOutOfRange { value: u64 },
}

/// Errors that can occur during store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Read or write failure on a path.
    #[error("I/O error on {path}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The file exists but its contents are not a recognizable database.
    #[error("Invalid database file {path}")]
    Format {
        path: PathBuf,
        #[source]
        source: FormatError,
    },

    /// Serializing the database failed.
    #[error("Failed to serialize database: {0}")]
    Serialize(#[from] serde_json::Error),

    /// The local copy cannot be read and no remote copy can stand in for it.
    #[error("Local database {path} is unreadable and no remote copy is available: {reason}")]
    LocalUnreadable { path: PathBuf, reason: String },
}

impl StoreError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    pub fn format(path: impl Into<PathBuf>, source: FormatError) -> Self {
        Self::Format {
            path: path.into(),
            source,
        }
    }
}
