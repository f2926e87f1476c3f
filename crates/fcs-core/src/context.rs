//! Context store - values threaded between sequential test cases
//!
//! A run owns exactly one [`Context`]; every test case also carries a local
//! one (base url, declared permissions, script parameters). Values are a
//! closed set of shapes and readers state the shape they expect.

use std::collections::HashMap;
use std::fmt;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// A context value: string, integer, or list of strings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(untagged)]
pub enum ContextValue {
    String(String),
    Integer(i64),
    List(Vec<String>),
}

impl ContextValue {
    /// Shape name used in mismatch diagnostics
    #[must_use]
    pub const fn shape(&self) -> Shape {
        match self {
            Self::String(_) => Shape::String,
            Self::Integer(_) => Shape::Integer,
            Self::List(_) => Shape::List,
        }
    }

    /// Render a scalar for substitution into text. Lists have no scalar form.
    #[must_use]
    pub fn as_scalar(&self) -> Option<String> {
        match self {
            Self::String(s) => Some(s.clone()),
            Self::Integer(i) => Some(i.to_string()),
            Self::List(_) => None,
        }
    }
}

impl From<&str> for ContextValue {
    fn from(s: &str) -> Self {
        Self::String(s.to_string())
    }
}

impl From<String> for ContextValue {
    fn from(s: String) -> Self {
        Self::String(s)
    }
}

impl From<i64> for ContextValue {
    fn from(i: i64) -> Self {
        Self::Integer(i)
    }
}

impl From<Vec<String>> for ContextValue {
    fn from(v: Vec<String>) -> Self {
        Self::List(v)
    }
}

/// Expected shape of a context value
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Shape {
    String,
    Integer,
    List,
}

impl fmt::Display for Shape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::String => "string",
            Self::Integer => "integer",
            Self::List => "list",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ContextError {
    #[error("context key '{key}' holds a {actual}, expected a {expected}")]
    ShapeMismatch {
        key: String,
        expected: Shape,
        actual: Shape,
    },
}

/// Key/value store. Later writes to a key overwrite earlier ones.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(transparent)]
pub struct Context {
    values: HashMap<String, ContextValue>,
}

impl Context {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn get(&self, key: &str) -> Option<&ContextValue> {
        self.values.get(key)
    }

    pub fn put(&mut self, key: impl Into<String>, value: impl Into<ContextValue>) {
        self.values.insert(key.into(), value.into());
    }

    #[must_use]
    pub fn contains(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Read a string value.
    ///
    /// # Errors
    ///
    /// Returns [`ContextError::ShapeMismatch`] if the key holds another shape.
    pub fn get_str(&self, key: &str) -> Result<Option<&str>, ContextError> {
        match self.values.get(key) {
            None => Ok(None),
            Some(ContextValue::String(s)) => Ok(Some(s.as_str())),
            Some(other) => Err(mismatch(key, Shape::String, other)),
        }
    }

    /// Read a string or integer value rendered as text.
    ///
    /// # Errors
    ///
    /// Returns [`ContextError::ShapeMismatch`] if the key holds a list.
    pub fn get_scalar(&self, key: &str) -> Result<Option<String>, ContextError> {
        match self.values.get(key) {
            None => Ok(None),
            Some(value) => value
                .as_scalar()
                .map(Some)
                .ok_or_else(|| mismatch(key, Shape::String, value)),
        }
    }

    /// Read a list value.
    ///
    /// # Errors
    ///
    /// Returns [`ContextError::ShapeMismatch`] if the key holds a scalar.
    pub fn get_list(&self, key: &str) -> Result<Option<&[String]>, ContextError> {
        match self.values.get(key) {
            None => Ok(None),
            Some(ContextValue::List(items)) => Ok(Some(items.as_slice())),
            Some(other) => Err(mismatch(key, Shape::List, other)),
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &ContextValue)> {
        self.values.iter()
    }
}

impl<K: Into<String>, V: Into<ContextValue>> FromIterator<(K, V)> for Context {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            values: iter
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }
}

fn mismatch(key: &str, expected: Shape, actual: &ContextValue) -> ContextError {
    ContextError::ShapeMismatch {
        key: key.to_string(),
        expected,
        actual: actual.shape(),
    }
}
