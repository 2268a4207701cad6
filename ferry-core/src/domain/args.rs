//! Invocation argument types
//!
//! A job's arguments are a mapping of flag names to scalar or list values.
//! They are validated once at submission and rendered into discrete argv
//! tokens by the engine; no shell ever sees them.

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::collections::BTreeMap;
use std::fmt;
use thiserror::Error;

/// A single scalar argument value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Scalar {
    Bool(bool),
    Integer(i64),
    Float(f64),
    Text(String),
}

/// An argument value: one scalar or a flat list of scalars
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ArgValue {
    Scalar(Scalar),
    List(Vec<Scalar>),
}

/// Validated argument mapping for a job
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobArgs(BTreeMap<String, ArgValue>);

/// Reasons an argument mapping is rejected
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ArgsError {
    #[error("args must be a mapping of names to values, got {0}")]
    NotAnObject(&'static str),

    #[error("argument names must not be empty")]
    EmptyKey,

    #[error("invalid argument name '{0}': names must not start with '-' or contain whitespace, '=' or NUL")]
    InvalidKey(String),

    #[error("argument '{key}' has unsupported value type {kind}")]
    UnsupportedValue { key: String, kind: &'static str },

    #[error("argument '{key}' contains a nested {kind}; list items must be scalars")]
    NestedValue { key: String, kind: &'static str },

    #[error("argument '{0}' contains a NUL byte")]
    NulByte(String),
}

impl fmt::Display for Scalar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scalar::Bool(b) => write!(f, "{}", b),
            Scalar::Integer(i) => write!(f, "{}", i),
            Scalar::Float(x) => write!(f, "{}", x),
            Scalar::Text(s) => f.write_str(s),
        }
    }
}

impl ArgValue {
    /// Renders the value as a single argv token, joining lists with `separator`
    pub fn render(&self, separator: &str) -> String {
        match self {
            ArgValue::Scalar(scalar) => scalar.to_string(),
            ArgValue::List(items) => items
                .iter()
                .map(Scalar::to_string)
                .collect::<Vec<_>>()
                .join(separator),
        }
    }
}

impl JobArgs {
    /// Validates a JSON value into an argument mapping
    ///
    /// `null` means "no arguments". Entries whose value is `null` are
    /// dropped, as if the caller had not passed them.
    pub fn from_json(value: &JsonValue) -> Result<Self, ArgsError> {
        let map = match value {
            JsonValue::Null => return Ok(Self::default()),
            JsonValue::Object(map) => map,
            other => return Err(ArgsError::NotAnObject(json_kind(other))),
        };

        let mut args = BTreeMap::new();
        for (key, value) in map {
            validate_key(key)?;

            let parsed = match value {
                JsonValue::Null => continue,
                JsonValue::Array(items) => ArgValue::List(
                    items
                        .iter()
                        .map(|item| match item {
                            JsonValue::Array(_) | JsonValue::Object(_) | JsonValue::Null => {
                                Err(ArgsError::NestedValue {
                                    key: key.clone(),
                                    kind: json_kind(item),
                                })
                            }
                            scalar => to_scalar(key, scalar),
                        })
                        .collect::<Result<Vec<_>, _>>()?,
                ),
                JsonValue::Object(_) => {
                    return Err(ArgsError::UnsupportedValue {
                        key: key.clone(),
                        kind: "object",
                    });
                }
                scalar => ArgValue::Scalar(to_scalar(key, scalar)?),
            };

            args.insert(key.clone(), parsed);
        }

        Ok(Self(args))
    }

    pub fn get(&self, key: &str) -> Option<&ArgValue> {
        self.0.get(key)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &ArgValue)> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

fn validate_key(key: &str) -> Result<(), ArgsError> {
    if key.is_empty() {
        return Err(ArgsError::EmptyKey);
    }
    if key.starts_with('-') || key.chars().any(|c| c.is_whitespace() || c == '=' || c == '\0') {
        return Err(ArgsError::InvalidKey(key.to_string()));
    }
    Ok(())
}

fn to_scalar(key: &str, value: &JsonValue) -> Result<Scalar, ArgsError> {
    match value {
        JsonValue::Bool(b) => Ok(Scalar::Bool(*b)),
        JsonValue::Number(n) => Ok(match n.as_i64() {
            Some(i) => Scalar::Integer(i),
            None => Scalar::Float(n.as_f64().unwrap_or(f64::NAN)),
        }),
        JsonValue::String(s) if s.contains('\0') => Err(ArgsError::NulByte(key.to_string())),
        JsonValue::String(s) => Ok(Scalar::Text(s.clone())),
        other => Err(ArgsError::UnsupportedValue {
            key: key.to_string(),
            kind: json_kind(other),
        }),
    }
}

fn json_kind(value: &JsonValue) -> &'static str {
    match value {
        JsonValue::Null => "null",
        JsonValue::Bool(_) => "boolean",
        JsonValue::Number(_) => "number",
        JsonValue::String(_) => "string",
        JsonValue::Array(_) => "list",
        JsonValue::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_from_json_accepts_scalars_and_lists() {
        let args = JobArgs::from_json(&json!({
            "input": "data/test.fsa",
            "chunk_size": 1000,
            "rank_threshold": 2.5,
            "sort": true,
            "alleles": ["HLA-A02:01", "HLA-B07:02"],
        }))
        .unwrap();

        assert_eq!(args.len(), 5);
        assert_eq!(
            args.get("chunk_size"),
            Some(&ArgValue::Scalar(Scalar::Integer(1000)))
        );
        assert_eq!(
            args.get("alleles").unwrap().render(","),
            "HLA-A02:01,HLA-B07:02"
        );
        assert_eq!(args.get("rank_threshold").unwrap().render(","), "2.5");
    }

    #[test]
    fn test_from_json_null_means_empty_and_drops_null_entries() {
        assert!(JobArgs::from_json(&JsonValue::Null).unwrap().is_empty());

        let args = JobArgs::from_json(&json!({"allele": null, "input": "x"})).unwrap();
        assert!(!args.contains_key("allele"));
        assert!(args.contains_key("input"));
    }

    #[test]
    fn test_from_json_rejects_malformed_shapes() {
        assert_eq!(
            JobArgs::from_json(&json!(["a", "b"])),
            Err(ArgsError::NotAnObject("list"))
        );
        assert_eq!(
            JobArgs::from_json(&json!("--input x")),
            Err(ArgsError::NotAnObject("string"))
        );
        assert!(matches!(
            JobArgs::from_json(&json!({"nested": {"a": 1}})),
            Err(ArgsError::UnsupportedValue { kind: "object", .. })
        ));
        assert!(matches!(
            JobArgs::from_json(&json!({"files": [["a"], "b"]})),
            Err(ArgsError::NestedValue { kind: "list", .. })
        ));
        assert!(matches!(
            JobArgs::from_json(&json!({"files": ["a", null]})),
            Err(ArgsError::NestedValue { kind: "null", .. })
        ));
        assert!(matches!(
            JobArgs::from_json(&json!({"input": "a\u{0}b"})),
            Err(ArgsError::NulByte(_))
        ));
    }

    #[test]
    fn test_from_json_rejects_flag_smuggling_keys() {
        for key in ["", "-x", "--output", "a b", "a=b"] {
            let mut map = serde_json::Map::new();
            map.insert(key.to_string(), json!("v"));
            assert!(
                JobArgs::from_json(&JsonValue::Object(map)).is_err(),
                "key {:?} should be rejected",
                key
            );
        }
    }

    #[test]
    fn test_serde_shape_is_plain_mapping() {
        let args = JobArgs::from_json(&json!({"n": 3, "names": ["a", "b"]})).unwrap();
        let value = serde_json::to_value(&args).unwrap();
        assert_eq!(value, json!({"n": 3, "names": ["a", "b"]}));

        let back: JobArgs = serde_json::from_value(value).unwrap();
        assert_eq!(back, args);
    }
}
