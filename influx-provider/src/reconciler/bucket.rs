//! Bucket reconciler - drives bucket lifecycle against a [`BucketApi`].

use async_trait::async_trait;
use tracing::{info, warn};

use super::Reconciler;
use crate::clients::BucketApi;
use crate::descriptor::TrackedBucket;
use crate::error::{ReconcileError, Result};

/// Reconciler for `influxdb_bucket` resources.
#[derive(Debug, Clone, Copy, Default)]
pub struct BucketReconciler;

impl BucketReconciler {
    pub fn new() -> Self {
        Self
    }
}

fn require_id(state: &TrackedBucket, action: &str) -> Result<()> {
    if state.id.is_empty() {
        return Err(ReconcileError::validation(format!(
            "an id is required to {} a bucket",
            action
        )));
    }
    Ok(())
}

#[async_trait]
impl Reconciler for BucketReconciler {
    type Api = dyn BucketApi;
    type State = TrackedBucket;

    async fn create(&self, api: &Self::Api, state: &mut Self::State) -> Result<()> {
        if !state.id.is_empty() {
            return Err(ReconcileError::validation(format!(
                "bucket already exists with id {}",
                state.id
            )));
        }
        let desired = &state.descriptor;
        desired.validate()?;
        let request = desired.create_request()?;
        let labels = desired.normalized_labels()?;
        info!("Creating bucket {}", desired.name);

        let created = api.create_bucket(&request).await.map_err(|e| {
            warn!("Failed to create bucket {}: {}", request.name, e);
            ReconcileError::RemoteWrite(e)
        })?;

        // Commit the server's ID before the follow-up read so a failed read
        // still leaves the new bucket tracked.
        info!("Bucket {} created ({})", request.name, created.id);
        state.set_id(created.id);

        if !labels.is_empty() {
            api.set_bucket_labels(&state.id, &labels)
                .await
                .map_err(|e| {
                    warn!("Failed to label bucket {}: {}", state.id, e);
                    ReconcileError::RemoteWrite(e)
                })?;
        }
        self.read(api, state).await
    }

    async fn read(&self, api: &Self::Api, state: &mut Self::State) -> Result<()> {
        require_id(state, "read")?;
        info!("Reading bucket {}", state.id);

        let bucket = api.get_bucket_by_id(&state.id).await.map_err(|e| {
            warn!("Failed to get bucket {}: {}", state.id, e);
            ReconcileError::RemoteFetch(e)
        })?;

        state.apply_remote(&bucket);
        Ok(())
    }

    async fn update(&self, api: &Self::Api, state: &mut Self::State) -> Result<()> {
        state.descriptor.validate()?;
        require_id(state, "update")?;
        let request = state.descriptor.update_request()?;
        info!("Updating bucket {} ({})", request.name, state.id);

        api.update_bucket(&state.id, &request).await.map_err(|e| {
            warn!("Failed to update bucket {}: {}", state.id, e);
            ReconcileError::RemoteWrite(e)
        })?;

        state.mark_stale();
        self.read(api, state).await
    }

    async fn delete(&self, api: &Self::Api, state: &mut Self::State) -> Result<()> {
        require_id(state, "delete")?;
        info!("Deleting bucket {}", state.id);

        api.delete_bucket(&state.id).await.map_err(|e| {
            warn!("Failed to delete bucket {}: {}", state.id, e);
            ReconcileError::RemoteWrite(e)
        })?;

        state.mark_absent();
        Ok(())
    }
}
