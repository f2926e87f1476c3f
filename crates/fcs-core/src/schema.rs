//! Response schema validation boundary
//!
//! Test cases with `schema-validation` set hand their response to a
//! [`ResponseValidator`]. Implementations live outside this crate (the runner
//! ships an OpenAPI one); [`NullValidator`] accepts everything.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::http::ResponseHeaders;

/// Everything a validator needs to judge one response
#[derive(Debug, Clone, Copy)]
pub struct SchemaInput<'a> {
    pub method: &'a str,
    /// Endpoint path as sent, without the base url
    pub path: &'a str,
    pub status: u16,
    pub headers: &'a ResponseHeaders,
    pub body: &'a str,
}

/// One schema conformance problem
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct SchemaFailure {
    pub message: String,
}

impl SchemaFailure {
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// The validator could not judge the response at all
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SchemaError {
    #[error("no operation in schema for {method} {path}")]
    NoRoute { method: String, path: String },
    #[error("schema unusable: {0}")]
    Schema(String),
}

pub trait ResponseValidator {
    /// Validate a response. An empty list means the response conforms.
    ///
    /// # Errors
    ///
    /// Returns [`SchemaError`] when the response cannot be validated at all.
    fn validate(&self, input: &SchemaInput<'_>) -> Result<Vec<SchemaFailure>, SchemaError>;
}

/// Validator that accepts every response
#[derive(Debug, Clone, Copy, Default)]
pub struct NullValidator;

impl ResponseValidator for NullValidator {
    fn validate(&self, _input: &SchemaInput<'_>) -> Result<Vec<SchemaFailure>, SchemaError> {
        Ok(Vec::new())
    }
}
