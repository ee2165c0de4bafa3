//! Schema-driven response serialization
//!
//! [`Serializer`] projects an arbitrary `Serialize` object, typically an ORM
//! record, into a JSON structure holding exactly the schema's declared
//! fields. Undeclared attributes are dropped, declared-but-absent optional
//! fields come out as `null`, and declaration order is preserved.
//!
//! Failures here are programmer errors, not request-data errors: a malformed
//! descriptor or an object that cannot satisfy the schema propagates as
//! [`SerializeError`] and is never turned into an HTTP response.

use serde::Serialize;
use serde_json::{Map, Value};
use std::marker::PhantomData;

use crate::error::{FieldError, LocItem, SerializeError};
use crate::schema::{self, Schema, SchemaDescriptor};

/// Location prefix for incompatibility errors, so callers can tell
/// serializer-side reports from request-side ones.
const RESPONSE_LOC: &str = "response";

/// Projects objects into JSON structures according to a schema.
///
/// # Example
/// ```rust,ignore
/// use axum_dantic::{impl_schema, serializer::Serializer};
///
/// impl_schema!(UserModel {
///     username: String,
///     age: Option<i64>,
///     phone: Option<String>,
/// });
///
/// let body = Serializer::<UserModel>::new()
///     .omit_null()
///     .serialize(&user)?;
/// ```
#[derive(Debug, Clone)]
pub struct Serializer<S: Schema> {
    include: Option<Vec<String>>,
    exclude: Option<Vec<String>>,
    omit_null: bool,
    _schema: PhantomData<fn() -> S>,
}

impl<S: Schema> Default for Serializer<S> {
    fn default() -> Self {
        Self::new()
    }
}

impl<S: Schema> Serializer<S> {
    pub fn new() -> Self {
        Self {
            include: None,
            exclude: None,
            omit_null: false,
            _schema: PhantomData,
        }
    }

    /// Whitelist of top-level field names to keep. Usable together with
    /// [`exclude`](Self::exclude).
    pub fn include<I>(mut self, fields: I) -> Self
    where
        I: IntoIterator,
        I::Item: Into<String>,
    {
        self.include = Some(fields.into_iter().map(Into::into).collect());
        self
    }

    /// Blacklist of top-level field names to drop.
    pub fn exclude<I>(mut self, fields: I) -> Self
    where
        I: IntoIterator,
        I::Item: Into<String>,
    {
        self.exclude = Some(fields.into_iter().map(Into::into).collect());
        self
    }

    /// Drop keys whose value is `null` after projection, recursively.
    /// Falsy-but-non-null values (`0`, `""`, `false`) are kept.
    pub fn omit_null(mut self) -> Self {
        self.omit_null = true;
        self
    }

    /// Project a single object.
    pub fn serialize<T: Serialize>(&self, data: &T) -> Result<Value, SerializeError> {
        let descriptor = S::descriptor();
        descriptor.ensure_valid()?;
        self.project(&descriptor, data)
    }

    /// Project a homogeneous collection into a JSON array.
    pub fn serialize_many<'a, T, I>(&self, items: I) -> Result<Value, SerializeError>
    where
        T: Serialize + 'a,
        I: IntoIterator<Item = &'a T>,
    {
        let descriptor = S::descriptor();
        descriptor.ensure_valid()?;
        let projected: Result<Vec<Value>, SerializeError> = items
            .into_iter()
            .map(|item| self.project(&descriptor, item))
            .collect();
        Ok(Value::Array(projected?))
    }

    /// Project a single object and dump the result as JSON text.
    pub fn serialize_to_string<T: Serialize>(&self, data: &T) -> Result<String, SerializeError> {
        Ok(serde_json::to_string(&self.serialize(data)?)?)
    }

    /// Project a collection and dump the result as JSON text.
    pub fn serialize_many_to_string<'a, T, I>(&self, items: I) -> Result<String, SerializeError>
    where
        T: Serialize + 'a,
        I: IntoIterator<Item = &'a T>,
    {
        Ok(serde_json::to_string(&self.serialize_many(items)?)?)
    }

    fn project<T: Serialize>(
        &self,
        descriptor: &SchemaDescriptor,
        data: &T,
    ) -> Result<Value, SerializeError> {
        // serde is the object graph walker: it pulls the attributes off the
        // object so the schema engine can conform them.
        let raw = serde_json::to_value(data)?;
        let mapping = raw.as_object().ok_or_else(|| SerializeError::Incompatible {
            schema: descriptor.name().to_string(),
            errors: vec![FieldError::new(
                vec![RESPONSE_LOC.into()],
                format!(
                    "value is not a valid dict (got {})",
                    schema::json_type_name(&raw)
                ),
                "type_error.dict",
            )],
        })?;

        let conformed = schema::conform(descriptor, mapping, &[LocItem::Key(RESPONSE_LOC.into())])
            .map_err(|errors| SerializeError::Incompatible {
                schema: descriptor.name().to_string(),
                errors,
            })?;

        Ok(Value::Object(self.apply_options(conformed)))
    }

    fn apply_options(&self, mapping: Map<String, Value>) -> Map<String, Value> {
        let mut out = Map::new();
        for (key, value) in mapping {
            if let Some(include) = &self.include
                && !include.contains(&key)
            {
                continue;
            }
            if let Some(exclude) = &self.exclude
                && exclude.contains(&key)
            {
                continue;
            }
            if self.omit_null {
                if value.is_null() {
                    continue;
                }
                out.insert(key, drop_nulls(value));
            } else {
                out.insert(key, value);
            }
        }
        out
    }
}

/// Recursively drop null-valued keys from nested objects.
fn drop_nulls(value: Value) -> Value {
    match value {
        Value::Object(mapping) => Value::Object(
            mapping
                .into_iter()
                .filter(|(_, v)| !v.is_null())
                .map(|(k, v)| (k, drop_nulls(v)))
                .collect(),
        ),
        Value::Array(items) => Value::Array(items.into_iter().map(drop_nulls).collect()),
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    crate::impl_schema!(UserModel {
        username: String,
        age: Option<i64>,
        phone: Option<String>,
    });

    // Stand-in for an ORM record: more attributes than the schema declares.
    #[derive(Serialize)]
    struct DbUser {
        id: i64,
        username: String,
        age: Option<i64>,
        phone: Option<String>,
        password_hash: String,
    }

    fn user(username: &str) -> DbUser {
        DbUser {
            id: 1,
            username: username.to_string(),
            age: Some(42),
            phone: None,
            password_hash: "$argon2$...".to_string(),
        }
    }

    #[test]
    fn test_serialize_projects_declared_fields_only() {
        let value = Serializer::<UserModel>::new()
            .serialize(&user("user1"))
            .expect("compatible object");
        assert_eq!(
            value,
            json!({"username": "user1", "age": 42, "phone": null})
        );
    }

    #[test]
    fn test_serialize_preserves_declaration_order() {
        let value = Serializer::<UserModel>::new()
            .serialize(&user("user1"))
            .expect("compatible object");
        let keys: Vec<&String> = value.as_object().expect("object").keys().collect();
        assert_eq!(keys, ["username", "age", "phone"]);
    }

    #[test]
    fn test_omit_null_drops_only_null_fields() {
        #[derive(Serialize)]
        struct ZeroAge {
            username: String,
            age: i64,
            phone: Option<String>,
        }
        let value = Serializer::<UserModel>::new()
            .omit_null()
            .serialize(&ZeroAge {
                username: "u".to_string(),
                age: 0,
                phone: None,
            })
            .expect("compatible object");
        // age is falsy but non-null and must survive.
        assert_eq!(value, json!({"username": "u", "age": 0}));
    }

    #[test]
    fn test_include_keeps_exactly_the_listed_fields() {
        let value = Serializer::<UserModel>::new()
            .include(["username"])
            .serialize(&user("user1"))
            .expect("compatible object");
        assert_eq!(value, json!({"username": "user1"}));
    }

    #[test]
    fn test_exclude_drops_the_listed_fields() {
        let value = Serializer::<UserModel>::new()
            .exclude(["phone"])
            .serialize(&user("user1"))
            .expect("compatible object");
        assert_eq!(value, json!({"username": "user1", "age": 42}));
    }

    #[test]
    fn test_serialize_many() {
        let users = vec![user("user1"), user("user2")];
        let value = Serializer::<UserModel>::new()
            .serialize_many(&users)
            .expect("compatible objects");
        assert_eq!(
            value,
            json!([
                {"username": "user1", "age": 42, "phone": null},
                {"username": "user2", "age": 42, "phone": null},
            ])
        );
    }

    #[test]
    fn test_round_trip_dump_matches_structure() {
        let serializer = Serializer::<UserModel>::new();
        let structure = serializer.serialize(&user("user1")).expect("structure");
        let text = serializer.serialize_to_string(&user("user1")).expect("text");
        assert_eq!(text, serde_json::to_string(&structure).expect("encodable"));
    }

    #[test]
    fn test_serialize_is_idempotent() {
        let serializer = Serializer::<UserModel>::new().omit_null();
        let first = serializer.serialize(&user("user1")).expect("first pass");
        let second = serializer.serialize(&user("user1")).expect("second pass");
        assert_eq!(first, second);
    }

    #[test]
    fn test_incompatible_object_is_fatal() {
        #[derive(Serialize)]
        struct Anonymous {
            age: i64,
        }
        let err = Serializer::<UserModel>::new()
            .serialize(&Anonymous { age: 3 })
            .expect_err("username missing");
        match err {
            SerializeError::Incompatible { schema, errors } => {
                assert_eq!(schema, "UserModel");
                assert_eq!(
                    errors[0].loc,
                    vec![LocItem::Key("response".into()), LocItem::Key("username".into())]
                );
            }
            other => panic!("expected incompatibility, got {other:?}"),
        }
    }

    #[test]
    fn test_non_mapping_object_is_fatal() {
        let err = Serializer::<UserModel>::new()
            .serialize(&vec![1, 2, 3])
            .expect_err("a list is not a valid schema input");
        assert!(matches!(err, SerializeError::Incompatible { .. }));
    }

    #[test]
    fn test_invalid_descriptor_is_fatal() {
        struct Broken;

        impl Serialize for Broken {
            fn serialize<S: serde::Serializer>(&self, s: S) -> Result<S::Ok, S::Error> {
                serde::Serialize::serialize(&serde_json::Map::new(), s)
            }
        }
        impl<'de> serde::Deserialize<'de> for Broken {
            fn deserialize<D: serde::Deserializer<'de>>(_: D) -> Result<Self, D::Error> {
                Ok(Broken)
            }
        }
        impl Schema for Broken {
            fn descriptor() -> SchemaDescriptor {
                SchemaDescriptor::new("Broken")
                    .field(crate::schema::Field::new("a", crate::schema::FieldKind::String))
                    .field(crate::schema::Field::new("a", crate::schema::FieldKind::String))
            }
        }

        let err = Serializer::<Broken>::new()
            .serialize(&Broken)
            .expect_err("duplicate fields");
        assert!(matches!(err, SerializeError::InvalidSchema { .. }));
    }
}
