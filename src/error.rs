//! Typed errors for the validation and serialization pipelines
//!
//! The taxonomy separates request-scoped conditions, which are converted
//! into JSON error responses and never escape the validation layer, from
//! programmer errors, which propagate as `Result` failures to the caller:
//!
//! - [`FieldError`]: a single field that failed a schema rule
//! - [`SchemaViolation`]: the outcome of instantiating a schema from a payload
//! - [`ValidationRejection`]: the HTTP error response the validator produces
//! - [`SerializeError`]: fatal serializer failures (bad schema, incompatible object)
//! - [`MissingValidation`]: an extractor used without its validation layer

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use indexmap::IndexMap;
use serde::Serialize;
use serde_json::{Map, Value, json};
use std::fmt;
use thiserror::Error;

// =============================================================================
// Field Errors
// =============================================================================

/// One element of a field error location path.
///
/// Paths mix mapping keys and sequence indices, e.g. `["items", 2, "name"]`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum LocItem {
    Key(String),
    Index(usize),
}

impl LocItem {
    pub(crate) fn to_value(&self) -> Value {
        match self {
            LocItem::Key(key) => Value::String(key.clone()),
            LocItem::Index(index) => Value::from(*index),
        }
    }
}

impl From<&str> for LocItem {
    fn from(key: &str) -> Self {
        LocItem::Key(key.to_string())
    }
}

impl From<String> for LocItem {
    fn from(key: String) -> Self {
        LocItem::Key(key)
    }
}

impl From<usize> for LocItem {
    fn from(index: usize) -> Self {
        LocItem::Index(index)
    }
}

impl fmt::Display for LocItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LocItem::Key(key) => write!(f, "{key}"),
            LocItem::Index(index) => write!(f, "{index}"),
        }
    }
}

/// A structured record describing why a single field failed validation.
///
/// Serializes to the `{"loc": [...], "msg": "...", "type": "..."}` wire shape.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FieldError {
    /// Path to the failing field, from the payload root.
    pub loc: Vec<LocItem>,

    /// Human-readable explanation.
    #[serde(rename = "msg")]
    pub message: String,

    /// Machine-readable error kind, e.g. `value_error.missing`.
    #[serde(rename = "type")]
    pub kind: String,
}

impl FieldError {
    pub fn new(
        loc: Vec<LocItem>,
        message: impl Into<String>,
        kind: impl Into<String>,
    ) -> Self {
        Self {
            loc,
            message: message.into(),
            kind: kind.into(),
        }
    }

    pub(crate) fn to_value(&self) -> Value {
        json!({
            "loc": self.loc.iter().map(LocItem::to_value).collect::<Vec<_>>(),
            "msg": self.message,
            "type": self.kind,
        })
    }
}

impl fmt::Display for FieldError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let path: Vec<String> = self.loc.iter().map(|item| item.to_string()).collect();
        write!(f, "{}: {} ({})", path.join("."), self.message, self.kind)
    }
}

// =============================================================================
// Schema Violations
// =============================================================================

/// Outcome of feeding a payload through a schema.
///
/// `Fields` is recoverable: the payload was mapping-shaped but one or more
/// field rules failed. `Structural` means the payload shape itself did not
/// match what the schema expects and no per-field report is possible.
#[derive(Debug, Error)]
pub enum SchemaViolation {
    #[error("validation failed for {} field(s)", .0.len())]
    Fields(Vec<FieldError>),

    #[error("{message}")]
    Structural { message: String },
}

impl From<Vec<FieldError>> for SchemaViolation {
    fn from(errors: Vec<FieldError>) -> Self {
        SchemaViolation::Fields(errors)
    }
}

// =============================================================================
// Validation Rejections (HTTP)
// =============================================================================

/// The JSON error response produced by the request validator.
///
/// The body is always `{"validation_error": ...}` where the value is either a
/// single descriptive message (structural failure) or a mapping from section
/// key to field error list.
#[derive(Debug, Clone)]
pub struct ValidationRejection {
    pub status: StatusCode,
    pub body: Value,
}

impl ValidationRejection {
    /// Build a rejection from aggregated per-section field errors.
    pub fn sections(
        status: StatusCode,
        sections: &IndexMap<&'static str, Vec<FieldError>>,
    ) -> Self {
        Self {
            status,
            body: json!({ "validation_error": section_map(sections) }),
        }
    }

    /// Build a rejection for a structural failure.
    ///
    /// Field errors accumulated before the fatal section are carried along
    /// under their section keys, next to a `message` entry.
    pub fn fatal(
        status: StatusCode,
        message: &str,
        sections: &IndexMap<&'static str, Vec<FieldError>>,
    ) -> Self {
        let body = if sections.is_empty() {
            json!({ "validation_error": message })
        } else {
            let mut map = Map::new();
            map.insert("message".to_string(), Value::String(message.to_string()));
            for (key, value) in section_map(sections) {
                map.insert(key, value);
            }
            json!({ "validation_error": map })
        };
        Self { status, body }
    }
}

fn section_map(sections: &IndexMap<&'static str, Vec<FieldError>>) -> Map<String, Value> {
    let mut map = Map::new();
    for (key, errors) in sections {
        map.insert(
            (*key).to_string(),
            Value::Array(errors.iter().map(FieldError::to_value).collect()),
        );
    }
    map
}

impl fmt::Display for ValidationRejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "request validation failed with status {}", self.status)
    }
}

impl std::error::Error for ValidationRejection {}

impl IntoResponse for ValidationRejection {
    fn into_response(self) -> Response {
        (self.status, Json(self.body)).into_response()
    }
}

// =============================================================================
// Serializer Errors
// =============================================================================

/// Fatal serializer failures.
///
/// These signal a contract breach in the calling code, not bad request data,
/// so they propagate as errors instead of becoming HTTP responses.
#[derive(Debug, Error)]
pub enum SerializeError {
    /// The schema descriptor itself is malformed (duplicate or empty field
    /// names). Equivalent to passing a non-schema type to the serializer.
    #[error("invalid schema '{schema}': {reason}")]
    InvalidSchema { schema: String, reason: String },

    /// The object fed to the serializer does not satisfy the schema.
    #[error("object is not compatible with schema '{schema}' ({} field error(s))", .errors.len())]
    Incompatible {
        schema: String,
        errors: Vec<FieldError>,
    },

    /// JSON encoding failed while walking the object graph.
    #[error("failed to encode JSON: {0}")]
    Json(#[from] serde_json::Error),
}

// =============================================================================
// Extractor Rejections
// =============================================================================

/// Rejection returned when a `Validated*` extractor finds no annotated model
/// on the request. This means the route is missing its `ValidationLayer`
/// configuration for that section, which is a deployment bug rather than a
/// client error, hence the 500.
#[derive(Debug, Error)]
#[error("{extractor} was not attached to the request; is a ValidationLayer configured for this section?")]
pub struct MissingValidation {
    pub extractor: &'static str,
}

impl IntoResponse for MissingValidation {
    fn into_response(self) -> Response {
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({ "error": self.to_string() })),
        )
            .into_response()
    }
}
