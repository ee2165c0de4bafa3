//! Extractors for reading validated models inside handlers
//!
//! The [`ValidationLayer`](crate::validator::ValidationLayer) annotates the
//! request with the validated models; these extractors are how handlers read
//! them back. A handler behind the layer never sees raw unvalidated data.
//!
//! # Usage
//!
//! ```rust,ignore
//! async fn create_user(
//!     ValidatedBody(user): ValidatedBody<UserModel>,
//! ) -> Json<UserModel> {
//!     // user passed schema validation before the handler ran
//!     Json(user)
//! }
//! ```
//!
//! Use `Option<ValidatedQuery<T>>` (etc.) when a section may be
//! unconfigured: absence means the layer never validated that section.

use axum::extract::{FromRequestParts, OptionalFromRequestParts};
use axum::http::request::Parts;
use std::convert::Infallible;
use std::ops::Deref;

use crate::error::MissingValidation;

macro_rules! validated_extractor {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone)]
        pub struct $name<T>(pub T);

        impl<T> $name<T> {
            pub fn into_inner(self) -> T {
                self.0
            }
        }

        impl<T> Deref for $name<T> {
            type Target = T;

            fn deref(&self) -> &T {
                &self.0
            }
        }

        impl<T, S> FromRequestParts<S> for $name<T>
        where
            T: Clone + Send + Sync + 'static,
            S: Send + Sync,
        {
            type Rejection = MissingValidation;

            async fn from_request_parts(
                parts: &mut Parts,
                _state: &S,
            ) -> Result<Self, Self::Rejection> {
                parts
                    .extensions
                    .get::<$name<T>>()
                    .cloned()
                    .ok_or(MissingValidation {
                        extractor: stringify!($name),
                    })
            }
        }

        impl<T, S> OptionalFromRequestParts<S> for $name<T>
        where
            T: Clone + Send + Sync + 'static,
            S: Send + Sync,
        {
            type Rejection = Infallible;

            async fn from_request_parts(
                parts: &mut Parts,
                _state: &S,
            ) -> Result<Option<Self>, Self::Rejection> {
                Ok(parts.extensions.get::<$name<T>>().cloned())
            }
        }
    };
}

validated_extractor!(
    /// The validated query-string model.
    ValidatedQuery
);

validated_extractor!(
    /// The validated path-parameter model.
    ValidatedPath
);

validated_extractor!(
    /// The validated JSON-body model.
    ValidatedBody
);
