//! Schema - Type schemas for the request document
//!
//! The request document is checked against these schemas before any
//! guardrail runs. Unknown keys are reported rather than ignored, since a
//! misspelled key would otherwise be silently dropped by the provisioning
//! layer.

use std::fmt;

use serde_yaml::{Mapping, Value};

/// Attribute type
#[derive(Debug, Clone)]
pub enum AttributeType {
    /// String
    String,
    /// Integer
    Int,
    /// Boolean
    Bool,
    /// Any mapping; its contents are checked by a nested schema
    Object,
    /// Anything; checked item by item by the caller
    Any,
    /// Custom type (with validation function)
    Custom {
        name: String,
        validate: fn(&Value) -> Result<(), String>,
    },
    /// List
    List(Box<AttributeType>),
    /// Map with string keys
    Map(Box<AttributeType>),
}

impl AttributeType {
    /// Check if a value conforms to this type
    pub fn validate(&self, value: &Value) -> Result<(), TypeError> {
        match (self, value) {
            (AttributeType::String, Value::String(_)) => Ok(()),
            (AttributeType::Int, Value::Number(n)) if n.as_i64().is_some() => Ok(()),
            (AttributeType::Bool, Value::Bool(_)) => Ok(()),
            (AttributeType::Object, Value::Mapping(_)) => Ok(()),
            (AttributeType::Any, _) => Ok(()),

            (AttributeType::Custom { validate, .. }, v) => {
                validate(v).map_err(|msg| TypeError::ValidationFailed { message: msg })
            }

            (AttributeType::List(inner), Value::Sequence(items)) => {
                for (i, item) in items.iter().enumerate() {
                    inner.validate(item).map_err(|e| TypeError::ListItemError {
                        index: i,
                        inner: Box::new(e),
                    })?;
                }
                Ok(())
            }

            (AttributeType::Map(inner), Value::Mapping(map)) => {
                for (k, v) in map {
                    let key = key_name(k);
                    if !k.is_string() {
                        return Err(TypeError::MapValueError {
                            key,
                            inner: Box::new(TypeError::TypeMismatch {
                                expected: "String key".to_string(),
                                got: value_type_name(k),
                            }),
                        });
                    }
                    inner.validate(v).map_err(|e| TypeError::MapValueError {
                        key,
                        inner: Box::new(e),
                    })?;
                }
                Ok(())
            }

            _ => Err(TypeError::TypeMismatch {
                expected: self.type_name(),
                got: value_type_name(value),
            }),
        }
    }

    fn type_name(&self) -> String {
        match self {
            AttributeType::String => "String".to_string(),
            AttributeType::Int => "Int".to_string(),
            AttributeType::Bool => "Bool".to_string(),
            AttributeType::Object => "Map".to_string(),
            AttributeType::Any => "Any".to_string(),
            AttributeType::Custom { name, .. } => name.clone(),
            AttributeType::List(inner) => format!("List<{}>", inner.type_name()),
            AttributeType::Map(inner) => format!("Map<{}>", inner.type_name()),
        }
    }
}

impl fmt::Display for AttributeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.type_name())
    }
}

/// Type error
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum TypeError {
    #[error("Type mismatch: expected {expected}, got {got}")]
    TypeMismatch { expected: String, got: String },

    #[error("Validation failed: {message}")]
    ValidationFailed { message: String },

    #[error("Unknown attribute '{name}'")]
    UnknownAttribute {
        name: String,
        suggestion: Option<String>,
    },

    #[error("List item at index {index}: {inner}")]
    ListItemError { index: usize, inner: Box<TypeError> },

    #[error("Map value for key '{key}': {inner}")]
    MapValueError { key: String, inner: Box<TypeError> },
}

impl TypeError {
    /// Path below the attribute the innermost error points at,
    /// e.g. `[2]` for the third list item
    pub fn path_suffix(&self) -> String {
        match self {
            TypeError::ListItemError { index, inner } => {
                format!("[{}]{}", index, inner.path_suffix())
            }
            TypeError::MapValueError { key, inner } => format!(".{}{}", key, inner.path_suffix()),
            _ => String::new(),
        }
    }

    /// The innermost error, without list/map wrapping
    pub fn root_cause(&self) -> &TypeError {
        match self {
            TypeError::ListItemError { inner, .. } | TypeError::MapValueError { inner, .. } => {
                inner.root_cause()
            }
            other => other,
        }
    }
}

/// Name of a YAML value's type, as shown in messages
pub fn value_type_name(value: &Value) -> String {
    match value {
        Value::Null => "Null".to_string(),
        Value::Bool(_) => "Bool".to_string(),
        Value::Number(n) if n.is_f64() => "Float".to_string(),
        Value::Number(_) => "Int".to_string(),
        Value::String(_) => "String".to_string(),
        Value::Sequence(_) => "List".to_string(),
        Value::Mapping(_) => "Map".to_string(),
        Value::Tagged(tagged) => format!("Tagged({})", tagged.tag),
    }
}

/// Render a mapping key for paths and messages
pub fn key_name(key: &Value) -> String {
    match key {
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        other => value_type_name(other),
    }
}

/// Attribute schema
#[derive(Debug, Clone)]
pub struct AttributeSchema {
    pub name: String,
    pub attr_type: AttributeType,
    pub description: Option<String>,
}

impl AttributeSchema {
    pub fn new(name: impl Into<String>, attr_type: AttributeType) -> Self {
        Self {
            name: name.into(),
            attr_type,
            description: None,
        }
    }

    pub fn with_description(mut self, desc: impl Into<String>) -> Self {
        self.description = Some(desc.into());
        self
    }
}

/// A type error attached to the key it was found under
#[derive(Debug, Clone, PartialEq)]
pub struct AttributeError {
    pub key: String,
    pub error: TypeError,
}

/// Schema for one mapping level of the document
#[derive(Debug, Clone)]
pub struct ObjectSchema {
    pub name: String,
    /// Ordered as documented, so messages list keys predictably
    pub attributes: Vec<AttributeSchema>,
}

impl ObjectSchema {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            attributes: Vec::new(),
        }
    }

    pub fn attribute(mut self, schema: AttributeSchema) -> Self {
        self.attributes.push(schema);
        self
    }

    pub fn get(&self, name: &str) -> Option<&AttributeSchema> {
        self.attributes.iter().find(|a| a.name == name)
    }

    /// Known keys in sorted order
    pub fn known_keys(&self) -> Vec<&str> {
        let mut keys: Vec<&str> = self.attributes.iter().map(|a| a.name.as_str()).collect();
        keys.sort_unstable();
        keys
    }

    /// Validate one mapping, in document key order
    ///
    /// Null values are treated as absent and are not type checked.
    pub fn validate(&self, mapping: &Mapping) -> Vec<AttributeError> {
        let mut errors = Vec::new();

        for (key, value) in mapping {
            let name = key_name(key);
            let Some(schema) = key.as_str().and_then(|k| self.get(k)) else {
                errors.push(AttributeError {
                    key: name.clone(),
                    error: TypeError::UnknownAttribute {
                        suggestion: self.suggest(&name),
                        name,
                    },
                });
                continue;
            };

            if value.is_null() {
                continue;
            }
            if let Err(error) = schema.attr_type.validate(value) {
                errors.push(AttributeError { key: name, error });
            }
        }

        errors
    }

    /// Closest known key within edit distance 2
    fn suggest(&self, name: &str) -> Option<String> {
        self.attributes
            .iter()
            .map(|a| (edit_distance(name, &a.name), &a.name))
            .filter(|(d, _)| *d > 0 && *d <= 2)
            .min_by_key(|(d, _)| *d)
            .map(|(_, n)| n.clone())
    }
}

/// Levenshtein distance over chars
pub(crate) fn edit_distance(a: &str, b: &str) -> usize {
    let b: Vec<char> = b.chars().collect();
    let mut prev: Vec<usize> = (0..=b.len()).collect();
    for (i, ca) in a.chars().enumerate() {
        let mut cur = vec![i + 1; b.len() + 1];
        for (j, cb) in b.iter().enumerate() {
            let cost = usize::from(ca != *cb);
            cur[j + 1] = (prev[j] + cost).min(prev[j + 1] + 1).min(cur[j] + 1);
        }
        prev = cur;
    }
    prev[b.len()]
}

/// Helper functions for document-specific types
pub mod types {
    use super::*;

    fn scalar(value: &Value) -> bool {
        matches!(value, Value::String(_) | Value::Number(_) | Value::Bool(_))
    }

    /// Account ID: a string, or an unquoted number
    pub fn account_id() -> AttributeType {
        AttributeType::Custom {
            name: "AccountId".to_string(),
            validate: |value| match value {
                Value::String(_) | Value::Number(_) => Ok(()),
                other => Err(format!(
                    "account_id must be a 12-digit string, got {}",
                    value_type_name(other)
                )),
            },
        }
    }

    /// Protocol: a name (`tcp`) or a protocol number (`6`, `-1`)
    pub fn protocol() -> AttributeType {
        AttributeType::Custom {
            name: "Protocol".to_string(),
            validate: |value| match value {
                Value::String(_) | Value::Number(_) => Ok(()),
                other => Err(format!(
                    "protocol must be a name or number, got {}",
                    value_type_name(other)
                )),
            },
        }
    }

    /// Tag map: string keys, scalar values
    pub fn tags() -> AttributeType {
        AttributeType::Map(Box::new(AttributeType::Custom {
            name: "TagValue".to_string(),
            validate: |value| {
                if scalar(value) {
                    Ok(())
                } else {
                    Err(format!(
                        "tag values must be strings, got {}",
                        value_type_name(value)
                    ))
                }
            },
        }))
    }

    pub fn string_list() -> AttributeType {
        AttributeType::List(Box::new(AttributeType::String))
    }
}

/// Top-level keys of a security group request
pub fn request_schema() -> ObjectSchema {
    ObjectSchema::new("request")
        .attribute(
            AttributeSchema::new("account_id", types::account_id())
                .with_description("12-digit AWS account ID"),
        )
        .attribute(
            AttributeSchema::new("environment", AttributeType::String)
                .with_description("Deployment environment"),
        )
        .attribute(
            AttributeSchema::new("tags", types::tags())
                .with_description("Tags merged into every security group"),
        )
        .attribute(
            AttributeSchema::new("baseline_profiles", types::string_list())
                .with_description("Pre-built security group bundles to deploy"),
        )
        .attribute(
            AttributeSchema::new("compliance_mode", AttributeType::String)
                .with_description("Compliance rule set to apply (sox, pci, hipaa, none)"),
        )
        .attribute(
            AttributeSchema::new("security_groups", AttributeType::Object)
                .with_description("Security groups keyed by name"),
        )
}

/// Keys of one security group definition
pub fn security_group_schema() -> ObjectSchema {
    ObjectSchema::new("security group")
        .attribute(AttributeSchema::new("description", AttributeType::String))
        .attribute(AttributeSchema::new("tags", types::tags()))
        .attribute(AttributeSchema::new(
            "ingress",
            AttributeType::List(Box::new(AttributeType::Any)),
        ))
        .attribute(AttributeSchema::new(
            "egress",
            AttributeType::List(Box::new(AttributeType::Any)),
        ))
        .attribute(
            AttributeSchema::new("type", AttributeType::String)
                .with_description("Workload type selecting guardrail overrides"),
        )
}

/// Keys of one ingress or egress rule
pub fn rule_schema() -> ObjectSchema {
    ObjectSchema::new("rule")
        .attribute(AttributeSchema::new("protocol", types::protocol()))
        .attribute(AttributeSchema::new("from_port", AttributeType::Int))
        .attribute(AttributeSchema::new("to_port", AttributeType::Int))
        .attribute(AttributeSchema::new("cidr_blocks", types::string_list()))
        .attribute(AttributeSchema::new("ipv6_cidr_blocks", types::string_list()))
        .attribute(AttributeSchema::new("security_groups", types::string_list()))
        .attribute(AttributeSchema::new("prefix_list_ids", types::string_list()))
        .attribute(AttributeSchema::new("self", AttributeType::Bool))
        .attribute(AttributeSchema::new("description", AttributeType::String))
}
