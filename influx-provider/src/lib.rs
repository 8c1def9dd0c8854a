//! influx-provider: declarative management of InfluxDB v2 buckets.
//!
//! The host hands a desired bucket description to the
//! [`BucketReconciler`], which drives the remote server through the
//! [`BucketApi`] facade and folds the server's answer back into the
//! [`TrackedBucket`] state.

pub mod clients;
pub mod config;
pub mod descriptor;
pub mod error;
pub mod host;
pub mod reconciler;
pub mod schema;

pub use clients::{ApiError, BucketApi, InfluxClient, RetryPolicy};
pub use config::ProviderConfig;
pub use descriptor::{BucketDescriptor, Phase, RetentionRuleSpec, RetentionRules, TrackedBucket};
pub use error::{NormalizationError, ReconcileError};
pub use host::{dispatch, run_lifecycle, HostError, Lifecycle, StateFile};
pub use reconciler::{BucketReconciler, Reconciler};
pub use schema::{bucket_schema, decode_descriptor, SchemaError};
