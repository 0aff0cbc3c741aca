//! Params and tags - keyed facts with latest-value-wins semantics

use serde::{Deserialize, Serialize};

/// A string-serializable scalar parameter value.
///
/// Params capture configuration, so the value space is deliberately small:
/// integers, floats, booleans, and text. Anything richer belongs in an
/// artifact.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParamValue {
    /// Integer scalar
    Int(i64),
    /// Floating-point scalar
    Float(f64),
    /// Boolean flag
    Bool(bool),
    /// Freeform text
    Text(String),
}

impl std::fmt::Display for ParamValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Int(v) => v.fmt(f),
            Self::Float(v) => v.fmt(f),
            Self::Bool(v) => v.fmt(f),
            Self::Text(v) => v.fmt(f),
        }
    }
}

impl From<i64> for ParamValue {
    fn from(v: i64) -> Self {
        Self::Int(v)
    }
}

impl From<u32> for ParamValue {
    fn from(v: u32) -> Self {
        Self::Int(i64::from(v))
    }
}

impl From<f64> for ParamValue {
    fn from(v: f64) -> Self {
        Self::Float(v)
    }
}

impl From<bool> for ParamValue {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

impl From<&str> for ParamValue {
    fn from(v: &str) -> Self {
        Self::Text(v.to_string())
    }
}

impl From<String> for ParamValue {
    fn from(v: String) -> Self {
        Self::Text(v)
    }
}

/// A single configuration value for a run. Keys are unique per run;
/// setting a key twice keeps the latest value (with a warning, not an error).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Param {
    key: String,
    value: ParamValue,
}

impl Param {
    /// Create a param.
    #[must_use]
    pub fn new(key: impl Into<String>, value: impl Into<ParamValue>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }

    /// Get the param key.
    #[must_use]
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Get the param value.
    #[must_use]
    pub const fn value(&self) -> &ParamValue {
        &self.value
    }
}

/// Freeform key/value metadata on a run. Overwrite is allowed at any time
/// while the run is open; writes against a closed run are rejected upstream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TagRecord {
    key: String,
    value: String,
}

impl TagRecord {
    /// Create a tag.
    #[must_use]
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }

    /// Get the tag key.
    #[must_use]
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Get the tag value.
    #[must_use]
    pub fn value(&self) -> &str {
        &self.value
    }
}
