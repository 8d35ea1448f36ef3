//! Transport error type.
//!
//! Every failure reported by a `DirectoryClient` implementation or one of its
//! stream halves is a `TransportError`. Transfer-level errors (format,
//! filesystem, codec) live in `dirx-transfer`.

use thiserror::Error;

/// Errors raised by the directory transport.
#[derive(Debug, Error)]
pub enum TransportError {
    /// The remote side answered with a non-OK status.
    #[error("Remote status {code}: {message}")]
    Status { code: u32, message: String },

    /// The stream was closed by the peer before the exchange completed.
    #[error("Stream closed: {0}")]
    Closed(String),

    /// Catch-all for unexpected transport errors.
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl TransportError {
    /// Build a `Status` error.
    pub fn status(code: u32, message: impl Into<String>) -> Self {
        Self::Status {
            code,
            message: message.into(),
        }
    }
}
