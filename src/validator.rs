//! Request validation middleware
//!
//! [`ValidationLayer`] wraps a handler with pre-invocation validation of up
//! to three request sections, in the fixed order query → path params → JSON
//! body. Field-level failures are aggregated across every configured section
//! so a client sees all of them in one response; a structural failure (a
//! payload that is not mapping-shaped, or an unreadable body) short-circuits
//! the remaining sections immediately.
//!
//! On success the validated models are attached to the request extensions
//! for the [`extract`](crate::extract) extractors, and the inner handler
//! runs with its request otherwise untouched. On failure the handler is
//! never invoked and the client receives
//! `{"validation_error": ...}` at the configured status code (default 422).
//!
//! # Usage
//!
//! ```rust,ignore
//! let app = Router::new().route(
//!     "/users/{id}",
//!     put(update_user).layer(
//!         ValidationLayer::new()
//!             .query::<Pagination>()
//!             .path_params::<UserPath>()
//!             .body::<UserModel>(),
//!     ),
//! );
//! ```

use axum::body::Body;
use axum::extract::{FromRequestParts, Query, RawPathParams, Request};
use axum::http::request::Parts;
use axum::http::{Extensions, HeaderMap, StatusCode, header};
use axum::response::{IntoResponse, Response};
use indexmap::IndexMap;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};
use tower::{Layer, Service};

use crate::error::{FieldError, SchemaViolation, ValidationRejection};
use crate::extract::{ValidatedBody, ValidatedPath, ValidatedQuery};
use crate::schema::{self, Schema};

const MEDIA_TYPE_JSON: &str = "application/json";

/// Default cap on buffered body bytes, matching axum's request body limit.
const DEFAULT_BODY_LIMIT: usize = 2 * 1024 * 1024;

// =============================================================================
// Sections
// =============================================================================

/// One of the three request-data sources.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Section {
    Query,
    PathParams,
    Body,
}

impl Section {
    /// Bucket key under which this section's field errors are reported.
    fn error_key(self) -> &'static str {
        match self {
            Section::Query => "query_params",
            Section::PathParams => "path_params",
            Section::Body => "body_params",
        }
    }

    /// Human-readable name used in structural failure messages.
    fn describe(self) -> &'static str {
        match self {
            Section::Query => "the query params",
            Section::PathParams => "the path params",
            Section::Body => "the request json body",
        }
    }
}

impl fmt::Display for Section {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.error_key())
    }
}

// =============================================================================
// Layer configuration
// =============================================================================

/// Monomorphized entry point for one configured section; erasing the schema
/// type here keeps the layer itself type-parameter free.
type SectionRun = fn(&Value, &mut Extensions) -> Result<(), SchemaViolation>;

#[derive(Debug, Clone, Copy)]
struct SectionValidator {
    run: SectionRun,
    schema_name: &'static str,
}

fn run_query<S: Schema + Clone>(
    payload: &Value,
    extensions: &mut Extensions,
) -> Result<(), SchemaViolation> {
    let model = schema::instantiate::<S>(payload)?;
    extensions.insert(ValidatedQuery(model));
    Ok(())
}

fn run_path_params<S: Schema + Clone>(
    payload: &Value,
    extensions: &mut Extensions,
) -> Result<(), SchemaViolation> {
    let model = schema::instantiate::<S>(payload)?;
    extensions.insert(ValidatedPath(model));
    Ok(())
}

fn run_body<S: Schema + Clone>(
    payload: &Value,
    extensions: &mut Extensions,
) -> Result<(), SchemaViolation> {
    let model = schema::instantiate::<S>(payload)?;
    extensions.insert(ValidatedBody(model));
    Ok(())
}

/// Tower layer configuring request validation for a route.
///
/// Every section is optional; unconfigured sections are skipped entirely
/// (their payloads are not read).
#[derive(Debug, Clone)]
pub struct ValidationLayer {
    query: Option<SectionValidator>,
    path_params: Option<SectionValidator>,
    body: Option<SectionValidator>,
    body_limit: usize,
    error_status: StatusCode,
}

impl Default for ValidationLayer {
    fn default() -> Self {
        Self::new()
    }
}

impl ValidationLayer {
    pub fn new() -> Self {
        Self {
            query: None,
            path_params: None,
            body: None,
            body_limit: DEFAULT_BODY_LIMIT,
            error_status: StatusCode::UNPROCESSABLE_ENTITY,
        }
    }

    /// Validate the query string against `S`.
    pub fn query<S: Schema + Clone>(mut self) -> Self {
        self.query = Some(SectionValidator {
            run: run_query::<S>,
            schema_name: std::any::type_name::<S>(),
        });
        self
    }

    /// Validate the matched path parameters against `S`.
    pub fn path_params<S: Schema + Clone>(mut self) -> Self {
        self.path_params = Some(SectionValidator {
            run: run_path_params::<S>,
            schema_name: std::any::type_name::<S>(),
        });
        self
    }

    /// Validate the JSON body against `S`.
    pub fn body<S: Schema + Clone>(mut self) -> Self {
        self.body = Some(SectionValidator {
            run: run_body::<S>,
            schema_name: std::any::type_name::<S>(),
        });
        self
    }

    /// Maximum number of body bytes buffered for validation. A body over
    /// the limit is a structural failure. Defaults to 2 MiB.
    pub fn body_limit(mut self, limit: usize) -> Self {
        self.body_limit = limit;
        self
    }

    /// Status code for validation error responses. Defaults to 422.
    pub fn error_status(mut self, status: StatusCode) -> Self {
        self.error_status = status;
        self
    }
}

impl<S> Layer<S> for ValidationLayer {
    type Service = ValidationService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        ValidationService {
            inner,
            config: self.clone(),
        }
    }
}

// =============================================================================
// Service
// =============================================================================

/// The wrapped handler produced by [`ValidationLayer`]. Same call signature
/// as the inner service; validation happens before delegation.
#[derive(Debug, Clone)]
pub struct ValidationService<S> {
    inner: S,
    config: ValidationLayer,
}

impl<S> Service<Request> for ValidationService<S>
where
    S: Service<Request, Response = Response> + Clone + Send + 'static,
    S::Future: Send + 'static,
{
    type Response = Response;
    type Error = S::Error;
    type Future = Pin<Box<dyn Future<Output = Result<Response, S::Error>> + Send>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, req: Request) -> Self::Future {
        // Take the ready service and leave the clone behind, so the future
        // does not hold on to a possibly-not-ready one.
        let clone = self.inner.clone();
        let mut inner = std::mem::replace(&mut self.inner, clone);
        let config = self.config.clone();

        Box::pin(async move {
            match validate_request(&config, req).await {
                Ok(req) => inner.call(req).await,
                Err(rejection) => Ok(rejection.into_response()),
            }
        })
    }
}

// =============================================================================
// Per-request validation
// =============================================================================

async fn validate_request(
    config: &ValidationLayer,
    req: Request,
) -> Result<Request, ValidationRejection> {
    let (mut parts, body) = req.into_parts();

    // Fresh per request; nothing here outlives the call.
    let mut errors: IndexMap<&'static str, Vec<FieldError>> = IndexMap::new();
    let mut fatal: Option<String> = None;

    if let Some(validator) = config.query {
        match query_payload(&parts) {
            Ok(payload) => attempt(
                validator,
                Section::Query,
                &payload,
                &parts.headers,
                &mut parts.extensions,
                &mut errors,
                &mut fatal,
            ),
            Err(cause) => {
                fatal = Some(structural_message(Section::Query, &cause, &parts.headers));
            }
        }
    }

    if fatal.is_none() {
        if let Some(validator) = config.path_params {
            match path_payload(&mut parts).await {
                Ok(payload) => attempt(
                    validator,
                    Section::PathParams,
                    &payload,
                    &parts.headers,
                    &mut parts.extensions,
                    &mut errors,
                    &mut fatal,
                ),
                Err(cause) => {
                    fatal = Some(structural_message(
                        Section::PathParams,
                        &cause,
                        &parts.headers,
                    ));
                }
            }
        }
    }

    // The body is only buffered when a body schema is configured and no
    // structural failure aborted the run; on success the buffered bytes are
    // replayed to the inner handler. A declared non-JSON content type is
    // rejected before the bytes are read, whatever they contain.
    let body = match (config.body, fatal.is_none()) {
        (Some(_), true) if !json_content_type(&parts.headers) => {
            fatal = Some(structural_message(
                Section::Body,
                "unsupported media type",
                &parts.headers,
            ));
            body
        }
        (Some(validator), true) => match axum::body::to_bytes(body, config.body_limit).await {
            Ok(bytes) => {
                match serde_json::from_slice::<Value>(&bytes) {
                    Ok(payload) => attempt(
                        validator,
                        Section::Body,
                        &payload,
                        &parts.headers,
                        &mut parts.extensions,
                        &mut errors,
                        &mut fatal,
                    ),
                    Err(err) => {
                        fatal = Some(structural_message(
                            Section::Body,
                            &err.to_string(),
                            &parts.headers,
                        ));
                    }
                }
                Body::from(bytes)
            }
            Err(err) => {
                fatal = Some(structural_message(
                    Section::Body,
                    &err.to_string(),
                    &parts.headers,
                ));
                Body::empty()
            }
        },
        _ => body,
    };

    if let Some(message) = fatal {
        return Err(ValidationRejection::fatal(
            config.error_status,
            &message,
            &errors,
        ));
    }
    if !errors.is_empty() {
        return Err(ValidationRejection::sections(config.error_status, &errors));
    }
    Ok(Request::from_parts(parts, body))
}

fn attempt(
    validator: SectionValidator,
    section: Section,
    payload: &Value,
    headers: &HeaderMap,
    extensions: &mut Extensions,
    errors: &mut IndexMap<&'static str, Vec<FieldError>>,
    fatal: &mut Option<String>,
) {
    match (validator.run)(payload, extensions) {
        Ok(()) => {}
        Err(SchemaViolation::Fields(field_errors)) => {
            tracing::debug!(
                section = %section,
                schema = validator.schema_name,
                count = field_errors.len(),
                "field validation failed"
            );
            errors.insert(section.error_key(), field_errors);
        }
        Err(SchemaViolation::Structural { message }) => {
            tracing::debug!(
                section = %section,
                schema = validator.schema_name,
                %message,
                "structural validation failure"
            );
            *fatal = Some(structural_message(section, &message, headers));
        }
    }
}

/// Parsed query-string mapping. Values are strings; field kinds coerce them.
fn query_payload(parts: &Parts) -> Result<Value, String> {
    match Query::<HashMap<String, String>>::try_from_uri(&parts.uri) {
        Ok(Query(params)) => Ok(Value::Object(
            params
                .into_iter()
                .map(|(key, value)| (key, Value::String(value)))
                .collect(),
        )),
        Err(err) => Err(err.to_string()),
    }
}

/// The router's matched path-variable mapping.
async fn path_payload(parts: &mut Parts) -> Result<Value, String> {
    match RawPathParams::from_request_parts(parts, &()).await {
        Ok(params) => Ok(Value::Object(
            params
                .iter()
                .map(|(key, value)| (key.to_owned(), Value::String(value.to_owned())))
                .collect::<Map<String, Value>>(),
        )),
        Err(err) => Err(err.to_string()),
    }
}

/// The declared content type, lowercased, empty when absent or unreadable.
fn declared_content_type(headers: &HeaderMap) -> String {
    headers
        .get(header::CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .unwrap_or("")
        .to_ascii_lowercase()
}

/// Whether the declared media type (parameters stripped) is JSON.
fn json_content_type(headers: &HeaderMap) -> bool {
    let content_type = declared_content_type(headers);
    content_type.split(';').next().unwrap_or("").trim() == MEDIA_TYPE_JSON
}

/// Human-readable message for a structural failure.
///
/// For the body section a non-JSON declared content type turns the message
/// into an unsupported-media-type notice; everything else names the section
/// and the underlying cause.
fn structural_message(section: Section, cause: &str, headers: &HeaderMap) -> String {
    if section == Section::Body && !json_content_type(headers) {
        let content_type = declared_content_type(headers);
        return format!(
            "Unsupported media type '{content_type}' in request. '{MEDIA_TYPE_JSON}' is required."
        );
    }
    format!(
        "Exception occurred while parsing {}. Error: {cause}",
        section.describe()
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    crate::impl_schema!(FooModel {
        foo: String,
        bar: Option<String>,
    });

    fn json_headers() -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(header::CONTENT_TYPE, "application/json".parse().expect("valid"));
        headers
    }

    #[test]
    fn test_section_error_keys() {
        assert_eq!(Section::Query.error_key(), "query_params");
        assert_eq!(Section::PathParams.error_key(), "path_params");
        assert_eq!(Section::Body.error_key(), "body_params");
    }

    #[test]
    fn test_json_content_type_detection() {
        assert!(json_content_type(&json_headers()));

        let mut headers = HeaderMap::new();
        headers.insert(
            header::CONTENT_TYPE,
            "application/json; charset=utf-8".parse().expect("valid"),
        );
        assert!(json_content_type(&headers));

        headers.insert(header::CONTENT_TYPE, "text/plain".parse().expect("valid"));
        assert!(!json_content_type(&headers));
        assert!(!json_content_type(&HeaderMap::new()));
    }

    #[test]
    fn test_structural_message_names_the_section() {
        let message = structural_message(Section::Query, "expected a mapping, got array", &HeaderMap::new());
        assert_eq!(
            message,
            "Exception occurred while parsing the query params. Error: expected a mapping, got array"
        );
    }

    #[test]
    fn test_structural_message_unsupported_media_type() {
        let mut headers = HeaderMap::new();
        headers.insert(header::CONTENT_TYPE, "text/csv; charset=utf-8".parse().expect("valid"));
        let message = structural_message(Section::Body, "whatever", &headers);
        assert_eq!(
            message,
            "Unsupported media type 'text/csv; charset=utf-8' in request. 'application/json' is required."
        );
    }

    #[test]
    fn test_structural_message_json_body_keeps_parse_cause() {
        let message = structural_message(Section::Body, "expected a mapping, got array", &json_headers());
        assert_eq!(
            message,
            "Exception occurred while parsing the request json body. Error: expected a mapping, got array"
        );
    }

    #[test]
    fn test_attempt_aggregates_field_errors_and_continues() {
        let mut errors = IndexMap::new();
        let mut fatal = None;
        let mut extensions = Extensions::new();
        let validator = SectionValidator {
            run: run_query::<FooModel>,
            schema_name: "FooModel",
        };

        attempt(
            validator,
            Section::Query,
            &json!({}),
            &HeaderMap::new(),
            &mut extensions,
            &mut errors,
            &mut fatal,
        );

        assert!(fatal.is_none());
        assert_eq!(errors["query_params"][0].message, "field required");
        assert!(extensions.get::<ValidatedQuery<FooModel>>().is_none());
    }

    #[test]
    fn test_attempt_structural_failure_sets_fatal() {
        let mut errors = IndexMap::new();
        let mut fatal = None;
        let mut extensions = Extensions::new();
        let validator = SectionValidator {
            run: run_query::<FooModel>,
            schema_name: "FooModel",
        };

        attempt(
            validator,
            Section::Query,
            &json!(["foo", "bar"]),
            &HeaderMap::new(),
            &mut extensions,
            &mut errors,
            &mut fatal,
        );

        assert!(errors.is_empty());
        assert_eq!(
            fatal.as_deref(),
            Some("Exception occurred while parsing the query params. Error: expected a mapping, got array")
        );
    }

    #[test]
    fn test_attempt_success_annotates_extensions() {
        let mut errors = IndexMap::new();
        let mut fatal = None;
        let mut extensions = Extensions::new();
        let validator = SectionValidator {
            run: run_body::<FooModel>,
            schema_name: "FooModel",
        };

        attempt(
            validator,
            Section::Body,
            &json!({"foo": "bar"}),
            &json_headers(),
            &mut extensions,
            &mut errors,
            &mut fatal,
        );

        assert!(errors.is_empty());
        assert!(fatal.is_none());
        let model = extensions
            .get::<ValidatedBody<FooModel>>()
            .expect("annotated");
        assert_eq!(model.0.foo, "bar");
        assert_eq!(model.0.bar, None);
    }

    #[test]
    fn test_query_payload_parses_the_query_string() {
        let request = Request::builder()
            .uri("/users?foo=bar&bar=foo")
            .body(Body::empty())
            .expect("valid request");
        let (parts, _) = request.into_parts();

        let payload = query_payload(&parts).expect("parseable query");
        let mapping = payload.as_object().expect("mapping");
        assert_eq!(mapping["foo"], json!("bar"));
        assert_eq!(mapping["bar"], json!("foo"));
    }

    #[test]
    fn test_query_payload_empty_query_string() {
        let request = Request::builder()
            .uri("/users")
            .body(Body::empty())
            .expect("valid request");
        let (parts, _) = request.into_parts();

        let payload = query_payload(&parts).expect("empty query");
        assert_eq!(payload, json!({}));
    }
}
