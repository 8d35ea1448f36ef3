//! Error types for dirx-transfer.
//!
//! `CodecError` covers a single collection stream. `TransferError` is what the
//! pipelines return; it names the file, entry, or stream an error came from
//! and classifies it with [`TransferError::kind`].

use std::io;
use std::path::PathBuf;

use dirx_core::{Category, TransportError};
use thiserror::Error;

/// Errors from reading or writing one collection.
#[derive(Debug, Error)]
pub enum CodecError {
    /// The stream is not a single-key object holding an array of records.
    #[error("Malformed collection: {0}")]
    Format(String),

    /// The collection key is not the one the caller expected.
    #[error("Collection key '{found}' does not match expected '{expected}'")]
    CategoryMismatch { expected: Category, found: String },

    /// A record carries a field this schema version does not know.
    #[error("Unknown field '{field}' in {category} record")]
    SchemaDrift { category: Category, field: String },

    /// A record is valid JSON but not a valid record.
    #[error("Invalid {category} record: {source}")]
    Decode {
        category: Category,
        #[source]
        source: serde_json::Error,
    },

    /// A record could not be marshalled.
    #[error("Failed to encode record: {0}")]
    Encode(#[source] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

impl CodecError {
    /// Whether the caller may drop the current record and keep reading.
    #[must_use]
    pub const fn is_skippable(&self) -> bool {
        matches!(self, Self::SchemaDrift { .. })
    }
}

/// Coarse classification of a transfer failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Malformed JSON or archive structure.
    Format,
    /// Unknown field during record decode.
    SchemaDrift,
    /// RPC or network failure.
    Transport,
    /// Missing or unreadable file or directory.
    Filesystem,
    Cancelled,
    Internal,
}

/// Errors returned by the export, import, backup, and restore pipelines.
#[derive(Debug, Error)]
pub enum TransferError {
    /// A collection stream failed to encode or decode.
    #[error("{source_name}: {error}")]
    Codec {
        source_name: String,
        #[source]
        error: CodecError,
    },

    #[error("Filesystem error at '{}': {source}", path.display())]
    Filesystem {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// The archive could not be read or written.
    #[error("Archive error at '{}': {source}", path.display())]
    Archive {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    /// A source or target was described incorrectly by the caller.
    #[error("Invalid source: {0}")]
    InvalidSource(String),

    #[error("Transfer cancelled")]
    Cancelled,

    #[error("Background task failed: {0}")]
    Join(#[from] tokio::task::JoinError),

    /// Catch-all for unexpected errors.
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl TransferError {
    pub fn codec(source_name: impl Into<String>, error: CodecError) -> Self {
        Self::Codec {
            source_name: source_name.into(),
            error,
        }
    }

    pub fn filesystem(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::Filesystem {
            path: path.into(),
            source,
        }
    }

    pub fn archive(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::Archive {
            path: path.into(),
            source,
        }
    }

    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::Codec { error, .. } => match error {
                CodecError::SchemaDrift { .. } => ErrorKind::SchemaDrift,
                CodecError::Io(_) => ErrorKind::Filesystem,
                CodecError::Format(_)
                | CodecError::CategoryMismatch { .. }
                | CodecError::Decode { .. }
                | CodecError::Encode(_) => ErrorKind::Format,
            },
            Self::Filesystem { .. } => ErrorKind::Filesystem,
            Self::Archive { .. } | Self::InvalidSource(_) => ErrorKind::Format,
            Self::Transport(_) => ErrorKind::Transport,
            Self::Cancelled => ErrorKind::Cancelled,
            Self::Join(_) | Self::Other(_) => ErrorKind::Internal,
        }
    }
}
