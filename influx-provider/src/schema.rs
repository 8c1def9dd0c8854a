//! Declared shape of the `influxdb_bucket` resource and typed decoding of
//! raw host configuration into a [`BucketDescriptor`].

use std::collections::BTreeSet;

use serde::Serialize;
use serde_json::{Map, Value};
use thiserror::Error;

use crate::clients::RetentionRuleType;
use crate::descriptor::{BucketDescriptor, RetentionRuleSpec, RetentionRules};

/// Resource type name as registered with the host.
pub const BUCKET_RESOURCE: &str = "influxdb_bucket";

/// Value type of an attribute.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "kind", content = "elem")]
pub enum ValueKind {
    String,
    Int,
    StringSet,
    NestedSet(Vec<Attribute>),
}

/// Who authors an attribute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Mode {
    Required,
    Optional,
    /// Set by the server only.
    Computed,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Attribute {
    pub name: &'static str,
    #[serde(flatten)]
    pub kind: ValueKind,
    pub mode: Mode,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default: Option<&'static str>,
}

impl Attribute {
    fn new(name: &'static str, kind: ValueKind, mode: Mode) -> Self {
        Self {
            name,
            kind,
            mode,
            default: None,
        }
    }

    pub fn required_string(name: &'static str) -> Self {
        Self::new(name, ValueKind::String, Mode::Required)
    }

    pub fn optional_string(name: &'static str) -> Self {
        Self::new(name, ValueKind::String, Mode::Optional)
    }

    pub fn computed_string(name: &'static str) -> Self {
        Self::new(name, ValueKind::String, Mode::Computed)
    }

    pub fn required_int(name: &'static str) -> Self {
        Self::new(name, ValueKind::Int, Mode::Required)
    }

    pub fn optional_string_set(name: &'static str) -> Self {
        Self::new(name, ValueKind::StringSet, Mode::Optional)
    }

    pub fn optional_nested_set(name: &'static str, elem: Vec<Attribute>) -> Self {
        Self::new(name, ValueKind::NestedSet(elem), Mode::Optional)
    }

    pub fn with_default(mut self, default: &'static str) -> Self {
        self.default = Some(default);
        self
    }
}

/// Schema of one resource type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResourceSchema {
    pub type_name: &'static str,
    pub attributes: Vec<Attribute>,
}

impl ResourceSchema {
    pub fn attribute(&self, name: &str) -> Option<&Attribute> {
        find(&self.attributes, name)
    }
}

fn find<'a>(attributes: &'a [Attribute], name: &str) -> Option<&'a Attribute> {
    attributes.iter().find(|a| a.name == name)
}

pub fn bucket_schema() -> ResourceSchema {
    ResourceSchema {
        type_name: BUCKET_RESOURCE,
        attributes: vec![
            Attribute::optional_string("description"),
            Attribute::required_string("name"),
            Attribute::optional_string("org_id"),
            Attribute::optional_nested_set(
                "retention_rules",
                vec![
                    Attribute::required_int("every_seconds"),
                    Attribute::optional_string("type").with_default("expire"),
                ],
            ),
            Attribute::optional_string("rp"),
            Attribute::optional_string_set("labels"),
            Attribute::computed_string("type"),
            Attribute::computed_string("created_at"),
            Attribute::computed_string("updated_at"),
        ],
    }
}

/// Errors decoding host configuration.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SchemaError {
    #[error("configuration must be an object")]
    NotAnObject,

    #[error("unsupported attribute \"{0}\"")]
    UnknownAttribute(String),

    #[error("attribute \"{0}\" is computed and cannot be set")]
    ComputedAttribute(String),

    #[error("attribute \"{0}\" is required")]
    MissingAttribute(String),

    #[error("invalid value for \"{attribute}\": {reason}")]
    InvalidValue { attribute: String, reason: String },
}

fn invalid(attribute: &str, reason: impl Into<String>) -> SchemaError {
    SchemaError::InvalidValue {
        attribute: attribute.to_string(),
        reason: reason.into(),
    }
}

/// Reject keys the schema does not know or the user may not author.
fn check_keys(attributes: &[Attribute], obj: &Map<String, Value>) -> Result<(), SchemaError> {
    for key in obj.keys() {
        match find(attributes, key) {
            None => return Err(SchemaError::UnknownAttribute(key.clone())),
            Some(attr) if attr.mode == Mode::Computed => {
                return Err(SchemaError::ComputedAttribute(key.clone()))
            }
            Some(_) => {}
        }
    }
    for attr in attributes.iter().filter(|a| a.mode == Mode::Required) {
        if obj.get(attr.name).map_or(true, Value::is_null) {
            return Err(SchemaError::MissingAttribute(attr.name.to_string()));
        }
    }
    Ok(())
}

fn decode_string(obj: &Map<String, Value>, name: &str) -> Result<Option<String>, SchemaError> {
    match obj.get(name) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => Ok(Some(s.clone())),
        Some(_) => Err(invalid(name, "expected a string")),
    }
}

fn decode_labels(obj: &Map<String, Value>) -> Result<BTreeSet<String>, SchemaError> {
    match obj.get("labels") {
        None | Some(Value::Null) => Ok(BTreeSet::new()),
        Some(Value::Array(items)) => items
            .iter()
            .map(|v| match v {
                Value::String(s) => Ok(s.clone()),
                _ => Err(invalid("labels", "expected a set of strings")),
            })
            .collect(),
        Some(_) => Err(invalid("labels", "expected a set of strings")),
    }
}

fn decode_rule(elem: &[Attribute], value: &Value) -> Result<RetentionRuleSpec, SchemaError> {
    let obj = value
        .as_object()
        .ok_or_else(|| invalid("retention_rules", "expected a set of objects"))?;
    // A missing every_seconds is left for normalization to report.
    for key in obj.keys() {
        if find(elem, key).is_none() {
            return Err(SchemaError::UnknownAttribute(format!(
                "retention_rules.{}",
                key
            )));
        }
    }

    let every_seconds = match obj.get("every_seconds") {
        None | Some(Value::Null) => None,
        Some(v) => Some(
            v.as_i64()
                .ok_or_else(|| invalid("retention_rules.every_seconds", "expected an integer"))?,
        ),
    };

    let rule_type = match obj.get("type") {
        None | Some(Value::Null) => find(elem, "type")
            .and_then(|a| a.default)
            .unwrap_or("expire"),
        Some(Value::String(s)) => s.as_str(),
        Some(_) => return Err(invalid("retention_rules.type", "expected a string")),
    };
    let rule_type: RetentionRuleType = rule_type
        .parse()
        .map_err(|reason: String| invalid("retention_rules.type", reason))?;

    Ok(RetentionRuleSpec {
        every_seconds,
        rule_type,
    })
}

fn decode_rules(
    schema: &ResourceSchema,
    obj: &Map<String, Value>,
) -> Result<RetentionRules, SchemaError> {
    let elem = match schema.attribute("retention_rules").map(|a| &a.kind) {
        Some(ValueKind::NestedSet(elem)) => elem.as_slice(),
        _ => &[],
    };
    match obj.get("retention_rules") {
        None | Some(Value::Null) => Ok(RetentionRules::new()),
        Some(Value::Array(items)) => items.iter().map(|v| decode_rule(elem, v)).collect(),
        Some(_) => Err(invalid("retention_rules", "expected a set of objects")),
    }
}

/// Decode raw host configuration into a typed descriptor.
pub fn decode_descriptor(config: &Value) -> Result<BucketDescriptor, SchemaError> {
    let schema = bucket_schema();
    let obj = config.as_object().ok_or(SchemaError::NotAnObject)?;
    check_keys(&schema.attributes, obj)?;

    Ok(BucketDescriptor {
        name: decode_string(obj, "name")?.unwrap_or_default(),
        description: decode_string(obj, "description")?,
        org_id: decode_string(obj, "org_id")?,
        retention_rules: decode_rules(&schema, obj)?,
        rp: decode_string(obj, "rp")?,
        labels: decode_labels(obj)?,
    })
}
