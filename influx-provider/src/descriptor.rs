//! Typed bucket descriptor and the locally tracked state.
//!
//! The descriptor is decoded once at the host boundary (see
//! [`crate::schema::decode_descriptor`]); everything after that works on
//! these types.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::clients::{
    Bucket, CreateBucketRequest, RetentionRule, RetentionRuleType, UpdateBucketRequest,
};
use crate::error::{NormalizationError, ReconcileError};

/// One declared retention rule.
///
/// Equality and ordering are defined on `(every_seconds, rule_type)`.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct RetentionRuleSpec {
    #[serde(default)]
    pub every_seconds: Option<i64>,
    #[serde(rename = "type", default)]
    pub rule_type: RetentionRuleType,
}

impl RetentionRuleSpec {
    pub fn expire(every_seconds: i64) -> Self {
        Self {
            every_seconds: Some(every_seconds),
            rule_type: RetentionRuleType::Expire,
        }
    }

    fn normalize(&self) -> Result<RetentionRule, NormalizationError> {
        match self.every_seconds {
            None => Err(NormalizationError::MissingEverySeconds),
            Some(secs) if secs <= 0 => Err(NormalizationError::NonPositiveEverySeconds(secs)),
            Some(secs) => Ok(RetentionRule {
                rule_type: self.rule_type,
                every_seconds: secs,
            }),
        }
    }
}

/// Unordered set of retention rules.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RetentionRules(BTreeSet<RetentionRuleSpec>);

impl RetentionRules {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns false if an identical rule was already present.
    pub fn insert(&mut self, rule: RetentionRuleSpec) -> bool {
        self.0.insert(rule)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &RetentionRuleSpec> {
        self.0.iter()
    }

    /// Convert into the wire shape, ordered by `(every_seconds, type)`.
    pub fn normalize(&self) -> Result<Vec<RetentionRule>, NormalizationError> {
        self.0.iter().map(RetentionRuleSpec::normalize).collect()
    }
}

impl FromIterator<RetentionRuleSpec> for RetentionRules {
    fn from_iter<I: IntoIterator<Item = RetentionRuleSpec>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// Desired state of one bucket.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BucketDescriptor {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub org_id: Option<String>,
    #[serde(default, skip_serializing_if = "RetentionRules::is_empty")]
    pub retention_rules: RetentionRules,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rp: Option<String>,
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub labels: BTreeSet<String>,
}

impl BucketDescriptor {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    /// Checks required fields before any remote call.
    pub fn validate(&self) -> Result<(), ReconcileError> {
        if self.name.is_empty() {
            return Err(ReconcileError::validation("a name is required"));
        }
        Ok(())
    }

    /// Label IDs in a stable order; empty IDs are rejected.
    pub fn normalized_labels(&self) -> Result<Vec<String>, NormalizationError> {
        self.labels
            .iter()
            .map(|id| {
                let id = id.trim();
                if id.is_empty() {
                    Err(NormalizationError::EmptyLabelId)
                } else {
                    Ok(id.to_string())
                }
            })
            .collect()
    }

    pub fn create_request(&self) -> Result<CreateBucketRequest, NormalizationError> {
        let retention_rules = self.retention_rules.normalize()?;
        debug!(
            "Normalized {} retention rules for bucket {}",
            retention_rules.len(),
            self.name
        );
        Ok(CreateBucketRequest {
            description: non_empty(&self.description),
            name: self.name.clone(),
            org_id: non_empty(&self.org_id),
            retention_rules,
            rp: non_empty(&self.rp),
        })
    }

    pub fn update_request(&self) -> Result<UpdateBucketRequest, NormalizationError> {
        let retention_rules = self.retention_rules.normalize()?;
        let labels = self.normalized_labels()?;
        debug!(
            "Normalized {} retention rules and {} labels for bucket {}",
            retention_rules.len(),
            labels.len(),
            self.name
        );
        Ok(UpdateBucketRequest {
            description: non_empty(&self.description),
            labels,
            name: self.name.clone(),
            org_id: non_empty(&self.org_id),
            retention_rules,
            rp: non_empty(&self.rp),
        })
    }
}

/// Unset strings arrive as `""` from the host.
fn non_empty(value: &Option<String>) -> Option<String> {
    value.as_ref().filter(|v| !v.is_empty()).cloned()
}

/// Where a tracked bucket stands relative to the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Never created or fetched, or deleted.
    Absent,
    /// Has an ID, computed fields may be stale.
    Present,
    /// Has an ID and computed fields were just read from the server.
    Synced,
}

/// Local mirror of one remote bucket.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackedBucket {
    /// Server-assigned, empty while absent.
    #[serde(default)]
    pub id: String,
    #[serde(flatten)]
    pub descriptor: BucketDescriptor,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub bucket_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<String>,
    #[serde(skip)]
    synced: bool,
}

impl TrackedBucket {
    pub fn new(descriptor: BucketDescriptor) -> Self {
        Self {
            descriptor,
            ..Default::default()
        }
    }

    pub fn phase(&self) -> Phase {
        if self.id.is_empty() {
            Phase::Absent
        } else if self.synced {
            Phase::Synced
        } else {
            Phase::Present
        }
    }

    /// Replace the desired attributes, keeping identity and computed fields.
    pub fn set_descriptor(&mut self, descriptor: BucketDescriptor) {
        self.descriptor = descriptor;
        self.synced = false;
    }

    pub(crate) fn set_id(&mut self, id: impl Into<String>) {
        self.id = id.into();
        self.synced = false;
    }

    pub(crate) fn mark_stale(&mut self) {
        self.synced = false;
    }

    /// Fold the server's view into local state. The server's ID is canonical.
    pub(crate) fn apply_remote(&mut self, bucket: &Bucket) {
        self.bucket_type = bucket.bucket_type.clone();
        self.created_at = bucket.created_at.clone();
        self.updated_at = bucket.updated_at.clone();
        self.id = bucket.id.clone();
        self.synced = !self.id.is_empty();
    }

    pub(crate) fn mark_absent(&mut self) {
        self.id.clear();
        self.bucket_type = None;
        self.created_at = None;
        self.updated_at = None;
        self.synced = false;
    }
}
