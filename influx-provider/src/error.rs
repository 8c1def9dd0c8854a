//! Reconciler error types.

use thiserror::Error;

use crate::clients::ApiError;

/// Malformed nested collection input, detected before any remote call.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum NormalizationError {
    #[error("retention rule is missing every_seconds")]
    MissingEverySeconds,

    #[error("retention rule every_seconds must be positive, got {0}")]
    NonPositiveEverySeconds(i64),

    #[error("label id must not be empty")]
    EmptyLabelId,
}

/// Errors surfaced by a lifecycle operation.
#[derive(Debug, Error)]
pub enum ReconcileError {
    /// Required field missing or empty.
    #[error("{0}")]
    Validation(String),

    #[error(transparent)]
    Normalization(#[from] NormalizationError),

    /// Read failed at the facade.
    #[error("error getting bucket: {0}")]
    RemoteFetch(ApiError),

    /// Create, update or delete failed at the facade.
    #[error(transparent)]
    RemoteWrite(ApiError),
}

impl ReconcileError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    /// The underlying facade error, if the failure happened remotely.
    pub fn api_error(&self) -> Option<&ApiError> {
        match self {
            Self::RemoteFetch(e) | Self::RemoteWrite(e) => Some(e),
            _ => None,
        }
    }
}

/// Result type for lifecycle operations.
pub type Result<T> = std::result::Result<T, ReconcileError>;
