//! Reconcilers for declared resources.
//!
//! Each reconciler translates a lifecycle intent (create, read, update,
//! delete) into calls against a remote facade and folds the server's
//! response back into the tracked state.

pub mod bucket;

use async_trait::async_trait;

use crate::error::Result;

pub use bucket::BucketReconciler;

/// Trait for resource reconcilers.
///
/// The facade is passed to every operation; reconcilers hold no client
/// and no state between calls.
#[async_trait]
pub trait Reconciler: Send + Sync {
    /// The remote facade the reconciler drives.
    type Api: ?Sized + Send + Sync;
    /// The locally tracked state of one resource.
    type State: Send;

    /// Create the resource remotely, then hydrate computed fields.
    async fn create(&self, api: &Self::Api, state: &mut Self::State) -> Result<()>;

    /// Refresh computed fields from the server.
    async fn read(&self, api: &Self::Api, state: &mut Self::State) -> Result<()>;

    /// Push the desired attributes to the server.
    async fn update(&self, api: &Self::Api, state: &mut Self::State) -> Result<()>;

    /// Delete the resource; clears the tracked ID on success.
    async fn delete(&self, api: &Self::Api, state: &mut Self::State) -> Result<()>;
}
