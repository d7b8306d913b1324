// SPDX-License-Identifier: MIT OR Apache-2.0

//! Error types for ingestion and query.
//!
//! Every variant here is fatal for the enclosing operation. Rows that fail
//! the inclusion rules are not errors; they come back as
//! [`BuildOutcome::Skipped`](crate::rubric::BuildOutcome::Skipped).

use thiserror::Error;

/// Result alias used across the library.
pub type Result<T> = std::result::Result<T, RagError>;

#[derive(Error, Debug)]
pub enum RagError {
    /// The rubric source tables could not be read.
    #[error("rubric source unavailable: {message}")]
    SourceUnavailable {
        message: String,
        #[source]
        source: Option<rusqlite::Error>,
    },

    /// The embedding provider failed or returned malformed output.
    #[error("embedding failed: {0}")]
    EmbeddingFailure(String),

    /// The vector index could not be opened, read or written.
    #[error("vector index unavailable: {message}")]
    IndexUnavailable {
        message: String,
        #[source]
        source: Option<rusqlite::Error>,
    },

    /// A vector's dimensionality disagrees with the collection.
    #[error("embedding dimension mismatch: collection has {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("invalid argument: {0}")]
    InvalidArgument(String),
}

impl RagError {
    pub(crate) fn source_unavailable(message: impl Into<String>, err: rusqlite::Error) -> Self {
        Self::SourceUnavailable {
            message: message.into(),
            source: Some(err),
        }
    }

    pub(crate) fn index(message: impl Into<String>, err: rusqlite::Error) -> Self {
        Self::IndexUnavailable {
            message: message.into(),
            source: Some(err),
        }
    }

    pub(crate) fn index_msg(message: impl Into<String>) -> Self {
        Self::IndexUnavailable {
            message: message.into(),
            source: None,
        }
    }

    /// Wraps a provider error, keeping its context chain in the message.
    pub(crate) fn embedding(err: anyhow::Error) -> Self {
        Self::EmbeddingFailure(format!("{:#}", err))
    }
}
