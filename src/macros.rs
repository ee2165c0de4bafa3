//! Macro for declaring schema models without boilerplate
//!
//! `impl_schema!` generates the struct, its serde derives, the
//! [`Schema`](crate::schema::Schema) impl with a declaration-ordered
//! descriptor, and a [`FieldType`](crate::schema::FieldType) impl so the
//! model can be nested inside other schemas.

/// Declare a schema model.
///
/// Field requiredness follows the Rust type: `Option<T>` fields are
/// optional and default to `None`, everything else is required. `Vec<T>`
/// declares a homogeneous list. Prefix the declaration with `strict` to
/// reject payload keys that are not declared (instead of ignoring them).
///
/// # Example
/// ```rust,ignore
/// use axum_dantic::impl_schema;
///
/// impl_schema!(UserModel {
///     username: String,
///     age: Option<i64>,
///     phone: Option<String>,
/// });
///
/// impl_schema!(strict CreateUser {
///     username: String,
///     email: String,
/// });
/// ```
#[macro_export]
macro_rules! impl_schema {
    (
        strict
        $(#[$meta:meta])*
        $name:ident { $($body:tt)* }
    ) => {
        $crate::impl_schema!(@define [.deny_unknown_fields()] $(#[$meta])* $name { $($body)* });
    };

    (
        $(#[$meta:meta])*
        $name:ident { $($body:tt)* }
    ) => {
        $crate::impl_schema!(@define [] $(#[$meta])* $name { $($body)* });
    };

    (
        @define [$($strict:tt)*]
        $(#[$meta:meta])*
        $name:ident {
            $(
                $(#[$fmeta:meta])*
                $field:ident : $ty:ty
            ),* $(,)?
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, ::serde::Serialize, ::serde::Deserialize)]
        pub struct $name {
            $(
                $(#[$fmeta])*
                pub $field: $ty,
            )*
        }

        impl $crate::schema::Schema for $name {
            fn descriptor() -> $crate::schema::SchemaDescriptor {
                $crate::schema::SchemaDescriptor::new(stringify!($name))
                    $($strict)*
                    $(.field($crate::schema::Field::of::<$ty>(stringify!($field))))*
            }
        }

        impl $crate::schema::FieldType for $name {
            fn kind() -> $crate::schema::FieldKind {
                $crate::schema::FieldKind::Nested(
                    <$name as $crate::schema::Schema>::descriptor,
                )
            }
        }
    };
}
