//! Host binding: dispatches lifecycle calls into a reconciler and persists
//! the tracked state between invocations.

use std::fmt;
use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::{debug, info, warn};

use crate::clients::BucketApi;
use crate::descriptor::{BucketDescriptor, TrackedBucket};
use crate::error::{ReconcileError, Result};
use crate::reconciler::{BucketReconciler, Reconciler};

/// Lifecycle operations the host can request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lifecycle {
    Create,
    Read,
    Update,
    Delete,
}

impl fmt::Display for Lifecycle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Create => "create",
            Self::Read => "read",
            Self::Update => "update",
            Self::Delete => "delete",
        };
        f.write_str(name)
    }
}

/// Run one lifecycle operation.
pub async fn dispatch<R>(
    op: Lifecycle,
    reconciler: &R,
    api: &R::Api,
    state: &mut R::State,
) -> Result<()>
where
    R: Reconciler + ?Sized,
{
    debug!("Dispatching {}", op);
    match op {
        Lifecycle::Create => reconciler.create(api, state).await,
        Lifecycle::Read => reconciler.read(api, state).await,
        Lifecycle::Update => reconciler.update(api, state).await,
        Lifecycle::Delete => reconciler.delete(api, state).await,
    }
}

/// Errors from one host invocation.
#[derive(Debug, Error)]
pub enum HostError {
    #[error(transparent)]
    Reconcile(#[from] ReconcileError),

    #[error("failed to access state file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("invalid state file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// Load the tracked bucket, run `op` against it and persist the outcome.
///
/// `desired` replaces the tracked attributes for Create and Update. On
/// failure the state file is only rewritten when the operation committed a
/// new bucket id, so rejected attributes never reach the file.
pub async fn run_lifecycle<A>(
    op: Lifecycle,
    api: &A,
    file: &StateFile,
    desired: Option<BucketDescriptor>,
) -> std::result::Result<TrackedBucket, HostError>
where
    A: BucketApi + 'static,
{
    let prior = file.load().await?;
    let mut state = prior.clone();
    if let Some(desired) = desired {
        state.set_descriptor(desired);
    }

    let reconciler = BucketReconciler::new();
    match dispatch::<BucketReconciler>(op, &reconciler, api, &mut state).await {
        Ok(()) => {
            file.save(&state).await?;
            Ok(state)
        }
        Err(e) => {
            if state.id != prior.id {
                warn!("{} failed after committing bucket {}", op, state.id);
                file.save(&state).await?;
            }
            Err(e.into())
        }
    }
}

/// Tracked state persisted as JSON between invocations.
#[derive(Debug, Clone)]
pub struct StateFile {
    path: PathBuf,
}

impl StateFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the tracked state. A missing file means the bucket is absent.
    pub async fn load(&self) -> std::result::Result<TrackedBucket, HostError> {
        let contents = match tokio::fs::read_to_string(&self.path).await {
            Ok(contents) => contents,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                debug!("No state file at {}, starting absent", self.path.display());
                return Ok(TrackedBucket::default());
            }
            Err(source) => {
                return Err(HostError::Io {
                    path: self.path.clone(),
                    source,
                })
            }
        };

        serde_json::from_str(&contents).map_err(|source| HostError::Parse {
            path: self.path.clone(),
            source,
        })
    }

    pub async fn save(&self, state: &TrackedBucket) -> std::result::Result<(), HostError> {
        let json = serde_json::to_string_pretty(state).map_err(|source| HostError::Parse {
            path: self.path.clone(),
            source,
        })?;
        tokio::fs::write(&self.path, json)
            .await
            .map_err(|source| HostError::Io {
                path: self.path.clone(),
                source,
            })?;
        info!("Saved state to {}", self.path.display());
        Ok(())
    }
}
