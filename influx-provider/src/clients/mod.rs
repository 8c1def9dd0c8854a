//! Clients for the remote InfluxDB server.
//!
//! The reconciler only talks to the [`BucketApi`] facade:
//! - `InfluxClient`: InfluxDB v2 HTTP API (production)
//! - test doubles implementing the same trait

pub mod influx;
pub mod types;

use async_trait::async_trait;
use thiserror::Error;

pub use influx::{InfluxClient, RetryPolicy};
pub use types::{
    Bucket, CreateBucketRequest, Label, RetentionRule, RetentionRuleType, UpdateBucketRequest,
};

/// Errors returned by the remote facade.
#[derive(Debug, Error)]
pub enum ApiError {
    /// Resource not found on the server.
    #[error("not found: {0}")]
    NotFound(String),

    /// Server answered with a non-success status.
    #[error("HTTP {status}: {message}")]
    Status { status: u16, message: String },

    /// Connection, TLS or timeout failure.
    #[error("{0}")]
    Transport(String),

    /// Response body could not be decoded.
    #[error("invalid response: {0}")]
    Decode(String),

    /// Server URL cannot carry API paths.
    #[error("invalid server URL: {0}")]
    InvalidUrl(String),
}

impl ApiError {
    /// Whether repeating an idempotent request may succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Transport(_) => true,
            Self::Status { status, .. } => *status >= 500,
            Self::NotFound(_) | Self::Decode(_) | Self::InvalidUrl(_) => false,
        }
    }
}

/// Operations the reconciler needs from the remote server.
#[async_trait]
pub trait BucketApi: Send + Sync {
    /// Create a bucket and return the server's representation.
    async fn create_bucket(&self, req: &CreateBucketRequest) -> Result<Bucket, ApiError>;

    /// Fetch a bucket by its server-assigned ID.
    async fn get_bucket_by_id(&self, id: &str) -> Result<Bucket, ApiError>;

    /// Update a bucket in place. The ID never changes.
    async fn update_bucket(&self, id: &str, req: &UpdateBucketRequest)
        -> Result<Bucket, ApiError>;

    /// Delete a bucket.
    async fn delete_bucket(&self, id: &str) -> Result<(), ApiError>;

    /// Make the bucket's label set exactly `labels`.
    async fn set_bucket_labels(&self, id: &str, labels: &[String]) -> Result<(), ApiError>;
}
