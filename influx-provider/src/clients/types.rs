//! Wire types of the InfluxDB v2 bucket API.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Kind of a retention rule. InfluxDB v2 only knows `expire`.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum RetentionRuleType {
    #[default]
    Expire,
}

impl RetentionRuleType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Expire => "expire",
        }
    }
}

impl fmt::Display for RetentionRuleType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RetentionRuleType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "expire" => Ok(Self::Expire),
            other => Err(format!("unknown retention rule type \"{}\"", other)),
        }
    }
}

/// Retention rule as sent to and returned by the server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RetentionRule {
    #[serde(rename = "type", default)]
    pub rule_type: RetentionRuleType,
    pub every_seconds: i64,
}

/// Label attached to a bucket.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Label {
    pub id: String,
    #[serde(default)]
    pub name: String,
}

/// Bucket as returned by the server.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Bucket {
    pub id: String,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub bucket_type: Option<String>,
    #[serde(default)]
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(rename = "orgID", default, skip_serializing_if = "Option::is_none")]
    pub org_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rp: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<String>,
    #[serde(default)]
    pub retention_rules: Vec<RetentionRule>,
    #[serde(default)]
    pub labels: Vec<Label>,
}

/// Body of `POST /api/v2/buckets`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateBucketRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub name: String,
    #[serde(rename = "orgID", skip_serializing_if = "Option::is_none")]
    pub org_id: Option<String>,
    pub retention_rules: Vec<RetentionRule>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rp: Option<String>,
}

/// Desired attributes for an update.
///
/// Labels are not part of the PATCH body; the HTTP client syncs them
/// through the bucket's label endpoints.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateBucketRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip)]
    pub labels: Vec<String>,
    pub name: String,
    #[serde(rename = "orgID", skip_serializing_if = "Option::is_none")]
    pub org_id: Option<String>,
    pub retention_rules: Vec<RetentionRule>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rp: Option<String>,
}
