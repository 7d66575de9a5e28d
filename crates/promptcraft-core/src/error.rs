//! Error types shared by every pipeline stage.

use std::path::PathBuf;

use thiserror::Error;

use crate::extract::ParseError;
use crate::model::TransportError;

/// Errors surfaced by dataset generation, grading and evaluation.
#[derive(Debug, Error)]
pub enum EvalError {
    /// The model service could not be reached or rejected the call.
    #[error("model call failed: {0}")]
    Transport(#[from] TransportError),

    /// The model answered, but not with the structure that was asked for.
    #[error("could not parse model output: {0}")]
    Parse(#[from] ParseError),

    /// A generated test case does not carry exactly the declared input keys.
    #[error("test case inputs do not match the input spec (unexpected: {unexpected:?}, missing: {missing:?})")]
    SchemaViolation {
        unexpected: Vec<String>,
        missing: Vec<String>,
    },

    /// The caller-supplied subject function failed.
    #[error("subject function failed: {0:#}")]
    Subject(anyhow::Error),

    #[error("I/O error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// A blocking subject worker panicked or was cancelled.
    #[error("worker task failed: {0}")]
    Worker(#[from] tokio::task::JoinError),

    #[error("configuration error: {0}")]
    Config(String),
}

impl EvalError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        EvalError::Io {
            path: path.into(),
            source,
        }
    }
}

/// Result type alias for pipeline operations.
pub type EvalResult<T> = Result<T, EvalError>;
