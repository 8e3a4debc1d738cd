//! Errors raised by the conversion pipeline.

use heap_graph::GraphIntegrityError;
use thiserror::Error;

/// Errors that can occur while converting a device heap snapshot.
///
/// Every variant is fatal for the conversion that raised it; none of them
/// describe transient conditions, so nothing is retried.
#[derive(Error, Debug)]
pub enum ConvertError {
    #[error("unsupported snapshot format '{0}'")]
    UnsupportedFormat(String),

    #[error("malformed snapshot at byte {offset}: {reason}")]
    MalformedSnapshot { offset: usize, reason: String },

    #[error("heap graph integrity error: {0}")]
    GraphIntegrity(#[from] GraphIntegrityError),

    #[error("unknown output format '{0}' (expected 'v8', 'heapsnapshot' or 'gexf')")]
    UnknownOutputFormat(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("no snapshot parsed")]
    NoGraph,
}

impl ConvertError {
    pub(crate) fn malformed(offset: usize, reason: impl Into<String>) -> Self {
        ConvertError::MalformedSnapshot {
            offset,
            reason: reason.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, ConvertError>;
