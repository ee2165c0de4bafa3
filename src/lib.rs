//! # axum-dantic
//!
//! Schema-driven request validation and response serialization for axum.
//!
//! ## Features
//!
//! - **Declarative Schemas**: one `impl_schema!` invocation declares the
//!   struct, its field kinds, and requiredness
//! - **Request Validation Layer**: validate query string, path params, and
//!   JSON body before the handler runs, with per-section error aggregation
//! - **Typed Handler Extractors**: handlers read validated models, never raw
//!   payloads
//! - **Response Serialization**: project ORM-style objects into whitelisted
//!   JSON shapes with include/exclude and null omission
//! - **Lenient Coercion**: query and path values arrive as strings and are
//!   coerced to the declared field kinds
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use axum::{Json, Router, routing::post};
//! use axum_dantic::prelude::*;
//!
//! impl_schema!(UserModel {
//!     username: String,
//!     age: Option<i64>,
//!     phone: Option<String>,
//! });
//!
//! async fn create_user(ValidatedBody(user): ValidatedBody<UserModel>) -> Json<UserModel> {
//!     Json(user)
//! }
//!
//! let app: Router = Router::new().route(
//!     "/users",
//!     post(create_user).layer(ValidationLayer::new().body::<UserModel>()),
//! );
//! ```
//!
//! Invalid input yields `{"validation_error": ...}` at 422 (configurable)
//! and the handler is never invoked; valid input is invisible to it.

pub mod error;
pub mod extract;
pub mod schema;
pub mod serializer;
pub mod validator;

mod macros;

/// Re-exports of commonly used types and traits
pub mod prelude {
    // === Schemas ===
    pub use crate::schema::{Field, FieldKind, FieldType, Schema, SchemaDescriptor, instantiate};

    // === Validation ===
    pub use crate::extract::{ValidatedBody, ValidatedPath, ValidatedQuery};
    pub use crate::validator::ValidationLayer;

    // === Serialization ===
    pub use crate::serializer::Serializer;

    // === Errors ===
    pub use crate::error::{
        FieldError, LocItem, SchemaViolation, SerializeError, ValidationRejection,
    };

    // === Macros ===
    pub use crate::impl_schema;

    // === External dependencies ===
    pub use axum::http::StatusCode;
    pub use serde::{Deserialize, Serialize};
    pub use serde_json::{Value, json};
}
