//! Error types for directory-store operations.

use std::fmt;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("gRPC transport error: {0}")]
    Transport(#[from] tonic::transport::Error),

    #[error("gRPC status error: {0}")]
    Status(tonic::Status),

    #[error("key not found: {key}")]
    NotFound { key: String },

    #[error("{conflict}: {key}")]
    TypeConflict { key: String, conflict: Conflict },

    #[error("key already exists: {key}")]
    NodeExists { key: String },

    #[error("directory not empty: {key}")]
    DirNotEmpty { key: String },

    #[error("root directory is read only")]
    RootReadOnly,

    /// `compacted` is the highest revision dropped from the store's
    /// history; watching after it still delivers every retained change.
    #[error("revision {requested} is no longer available (history starts after {compacted}, current revision is {current})")]
    HistoryExpired {
        requested: u64,
        compacted: u64,
        current: u64,
    },

    #[error("malformed response: {0}")]
    MalformedResponse(&'static str),

    #[error("runtime error: {0}")]
    Runtime(#[from] std::io::Error),

    #[error("watch stream closed")]
    WatchClosed,
}

impl Error {
    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::NotFound { .. })
    }

    pub fn is_history_expired(&self) -> bool {
        matches!(self, Error::HistoryExpired { .. })
    }

    pub(crate) fn not_found(key: impl Into<String>) -> Self {
        Error::NotFound { key: key.into() }
    }

    pub(crate) fn conflict(key: impl Into<String>, conflict: Conflict) -> Self {
        Error::TypeConflict {
            key: key.into(),
            conflict,
        }
    }
}

/// The ways a leaf and a directory can collide.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Conflict {
    /// A leaf operation was aimed at a directory.
    NotAFile,
    /// A directory operation was aimed at a leaf, or a leaf sits on the path.
    NotADirectory,
    /// `mkdir` found a leaf where the directory should go.
    LeafInTheWay,
}

impl fmt::Display for Conflict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Conflict::NotAFile => write!(f, "not a file"),
            Conflict::NotADirectory => write!(f, "not a directory"),
            Conflict::LeafInTheWay => {
                write!(f, "refusing to overwrite key/value with a directory")
            }
        }
    }
}
