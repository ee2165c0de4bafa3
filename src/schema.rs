//! Schema capability: declared field sets and payload instantiation
//!
//! A [`Schema`] is a named, typed field declaration used both for validating
//! inbound mappings (request validator) and for projecting outbound objects
//! (serializer). The capability is deliberately small so the pipelines stay
//! agnostic to the engine behind it: a schema exposes its [`SchemaDescriptor`]
//! and [`instantiate`] turns a JSON payload into a validated instance or a
//! [`SchemaViolation`].
//!
//! The built-in engine is lenient the way request data demands: query and
//! path values always arrive as strings, so `"42"` conforms to an `Integer`
//! field and `"true"` to a `Boolean` field. Field errors use the
//! `loc`/`msg`/`type` wire shape with kinds like `value_error.missing`.

use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::{Map, Number, Value};
use std::collections::HashSet;

use crate::error::{FieldError, LocItem, SchemaViolation, SerializeError};

/// A named, typed field declaration.
///
/// Implemented for concrete model structs, usually through the
/// [`impl_schema!`](crate::impl_schema) macro. The serde bounds are what let
/// the engine build instances (`DeserializeOwned`) and the serializer walk
/// arbitrary objects (`Serialize`).
pub trait Schema: DeserializeOwned + Serialize + Send + Sync + 'static {
    /// The declared field set, in declaration order.
    fn descriptor() -> SchemaDescriptor;
}

// =============================================================================
// Descriptors
// =============================================================================

/// The declared type of a single schema field.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldKind {
    String,
    Integer,
    Float,
    Boolean,
    Uuid,
    DateTime,
    /// Accept any JSON value unchanged.
    Any,
    /// Homogeneous sequence of the inner kind.
    List(Box<FieldKind>),
    /// Nested schema, referenced lazily so descriptors stay `'static`-free.
    Nested(fn() -> SchemaDescriptor),
}

impl FieldKind {
    fn type_error(&self) -> (&'static str, &'static str) {
        match self {
            FieldKind::String => ("str type expected", "type_error.str"),
            FieldKind::Integer => ("value is not a valid integer", "type_error.integer"),
            FieldKind::Float => ("value is not a valid float", "type_error.float"),
            FieldKind::Boolean => (
                "value could not be parsed to a boolean",
                "type_error.bool",
            ),
            FieldKind::Uuid => ("value is not a valid uuid", "type_error.uuid"),
            FieldKind::DateTime => ("invalid datetime format", "type_error.datetime"),
            FieldKind::Any => ("", ""),
            FieldKind::List(_) => ("value is not a valid list", "type_error.list"),
            FieldKind::Nested(_) => ("value is not a valid dict", "type_error.dict"),
        }
    }
}

/// One declared field of a schema.
#[derive(Debug, Clone)]
pub struct Field {
    pub name: String,
    pub kind: FieldKind,
    pub required: bool,
    pub default: Option<Value>,
}

impl Field {
    /// A required field of the given kind.
    pub fn new(name: impl Into<String>, kind: FieldKind) -> Self {
        Self {
            name: name.into(),
            kind,
            required: true,
            default: None,
        }
    }

    /// Derive name, kind and requiredness from a Rust field type.
    pub fn of<T: FieldType>(name: &str) -> Self {
        Self {
            name: name.to_string(),
            kind: T::kind(),
            required: T::REQUIRED,
            default: None,
        }
    }

    /// Mark the field optional.
    pub fn optional(mut self) -> Self {
        self.required = false;
        self
    }

    /// Give the field a default used when the payload omits it.
    /// A defaulted field is never required.
    pub fn with_default(mut self, default: Value) -> Self {
        self.required = false;
        self.default = Some(default);
        self
    }
}

/// A named, ordered field set with a strictness flag.
#[derive(Debug, Clone)]
pub struct SchemaDescriptor {
    name: String,
    fields: Vec<Field>,
    deny_unknown: bool,
}

impl SchemaDescriptor {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            fields: Vec::new(),
            deny_unknown: false,
        }
    }

    pub fn field(mut self, field: Field) -> Self {
        self.fields.push(field);
        self
    }

    /// Reject payload keys that are not declared, instead of ignoring them.
    pub fn deny_unknown_fields(mut self) -> Self {
        self.deny_unknown = true;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn fields(&self) -> &[Field] {
        &self.fields
    }

    /// Check the descriptor itself is well-formed.
    ///
    /// A malformed descriptor (duplicate or empty field names) is a bug in
    /// the schema declaration, reported as [`SerializeError::InvalidSchema`]
    /// and never converted into an HTTP response.
    pub fn ensure_valid(&self) -> Result<(), SerializeError> {
        let mut seen: HashSet<&str> = HashSet::new();
        for field in &self.fields {
            if field.name.is_empty() {
                return Err(SerializeError::InvalidSchema {
                    schema: self.name.clone(),
                    reason: "field with empty name".to_string(),
                });
            }
            if !seen.insert(field.name.as_str()) {
                return Err(SerializeError::InvalidSchema {
                    schema: self.name.clone(),
                    reason: format!("duplicate field '{}'", field.name),
                });
            }
            ensure_kind_valid(&field.kind)?;
        }
        Ok(())
    }
}

fn ensure_kind_valid(kind: &FieldKind) -> Result<(), SerializeError> {
    match kind {
        FieldKind::List(inner) => ensure_kind_valid(inner),
        FieldKind::Nested(descriptor) => descriptor().ensure_valid(),
        _ => Ok(()),
    }
}

// =============================================================================
// Field type mapping
// =============================================================================

/// Maps Rust field types to [`FieldKind`] declarations.
///
/// `Option<T>` marks a field optional; `Vec<T>` declares a list. Schema
/// structs receive an impl from `impl_schema!` so they can nest.
pub trait FieldType {
    const REQUIRED: bool = true;

    fn kind() -> FieldKind;
}

macro_rules! impl_field_type {
    ($kind:ident => $($ty:ty),+ $(,)?) => {
        $(
            impl FieldType for $ty {
                fn kind() -> FieldKind {
                    FieldKind::$kind
                }
            }
        )+
    };
}

impl_field_type!(String => String);
impl_field_type!(Integer => i8, i16, i32, i64, isize, u8, u16, u32, u64, usize);
impl_field_type!(Float => f32, f64);
impl_field_type!(Boolean => bool);
impl_field_type!(Uuid => uuid::Uuid);
impl_field_type!(DateTime => chrono::DateTime<chrono::Utc>);
impl_field_type!(Any => Value);

impl<T: FieldType> FieldType for Option<T> {
    const REQUIRED: bool = false;

    fn kind() -> FieldKind {
        T::kind()
    }
}

impl<T: FieldType> FieldType for Vec<T> {
    fn kind() -> FieldKind {
        FieldKind::List(Box::new(T::kind()))
    }
}

// =============================================================================
// Instantiation engine
// =============================================================================

/// Instantiate a schema from a JSON payload.
///
/// Field rule failures (missing required fields, type mismatches) come back
/// as [`SchemaViolation::Fields`] with one record per failing field; a
/// payload that is not mapping-shaped is a [`SchemaViolation::Structural`]
/// failure.
pub fn instantiate<S: Schema>(payload: &Value) -> Result<S, SchemaViolation> {
    let descriptor = S::descriptor();
    let mapping = payload.as_object().ok_or_else(|| SchemaViolation::Structural {
        message: format!("expected a mapping, got {}", json_type_name(payload)),
    })?;
    let conformed = conform(&descriptor, mapping, &[])?;
    serde_json::from_value(Value::Object(conformed)).map_err(|err| {
        SchemaViolation::Structural {
            message: format!("failed to build {}: {}", descriptor.name(), err),
        }
    })
}

pub(crate) fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Conform a mapping to a descriptor, producing a mapping holding exactly the
/// declared fields in declaration order, values coerced to declared kinds.
pub(crate) fn conform(
    descriptor: &SchemaDescriptor,
    payload: &Map<String, Value>,
    prefix: &[LocItem],
) -> Result<Map<String, Value>, Vec<FieldError>> {
    let mut out = Map::new();
    let mut errors = Vec::new();

    for field in descriptor.fields() {
        let loc = push_loc(prefix, LocItem::Key(field.name.clone()));
        match payload.get(&field.name) {
            None => {
                if field.required {
                    errors.push(FieldError::new(
                        loc,
                        "field required",
                        "value_error.missing",
                    ));
                } else {
                    let value = field.default.clone().unwrap_or(Value::Null);
                    out.insert(field.name.clone(), value);
                }
            }
            Some(Value::Null) => {
                if field.required {
                    errors.push(FieldError::new(
                        loc,
                        "none is not an allowed value",
                        "type_error.none.not_allowed",
                    ));
                } else {
                    out.insert(field.name.clone(), Value::Null);
                }
            }
            Some(value) => match coerce(&field.kind, value, &loc) {
                Ok(coerced) => {
                    out.insert(field.name.clone(), coerced);
                }
                Err(mut field_errors) => errors.append(&mut field_errors),
            },
        }
    }

    if descriptor.deny_unknown {
        for key in payload.keys() {
            if !descriptor.fields().iter().any(|field| &field.name == key) {
                errors.push(FieldError::new(
                    push_loc(prefix, LocItem::Key(key.clone())),
                    "extra fields not permitted",
                    "value_error.extra",
                ));
            }
        }
    }

    if errors.is_empty() { Ok(out) } else { Err(errors) }
}

fn push_loc(prefix: &[LocItem], item: LocItem) -> Vec<LocItem> {
    let mut loc = prefix.to_vec();
    loc.push(item);
    loc
}

fn coerce(kind: &FieldKind, value: &Value, loc: &[LocItem]) -> Result<Value, Vec<FieldError>> {
    let mismatch = || {
        let (message, error_kind) = kind.type_error();
        vec![FieldError::new(loc.to_vec(), message, error_kind)]
    };

    match kind {
        FieldKind::Any => Ok(value.clone()),

        FieldKind::String => match value {
            Value::String(s) => Ok(Value::String(s.clone())),
            Value::Number(n) => Ok(Value::String(n.to_string())),
            _ => Err(mismatch()),
        },

        FieldKind::Integer => match value {
            Value::Number(n) if n.is_i64() || n.is_u64() => Ok(value.clone()),
            Value::Number(n) => match n.as_f64() {
                // Whole floats conform only within i64 range; the cast would
                // silently saturate otherwise.
                Some(f) if f.fract() == 0.0 && f >= i64::MIN as f64 && f < i64::MAX as f64 => {
                    Ok(Value::from(f as i64))
                }
                _ => Err(mismatch()),
            },
            Value::String(s) => match s.trim().parse::<i64>() {
                Ok(i) => Ok(Value::from(i)),
                Err(_) => Err(mismatch()),
            },
            _ => Err(mismatch()),
        },

        FieldKind::Float => {
            let parsed = match value {
                Value::Number(n) => n.as_f64(),
                Value::String(s) => s.trim().parse::<f64>().ok(),
                _ => None,
            };
            match parsed.and_then(Number::from_f64) {
                Some(n) => Ok(Value::Number(n)),
                None => Err(mismatch()),
            }
        }

        FieldKind::Boolean => match value {
            Value::Bool(_) => Ok(value.clone()),
            Value::Number(n) => match n.as_i64() {
                Some(0) => Ok(Value::Bool(false)),
                Some(1) => Ok(Value::Bool(true)),
                _ => Err(mismatch()),
            },
            Value::String(s) => match s.trim().to_ascii_lowercase().as_str() {
                "true" | "yes" | "on" | "1" => Ok(Value::Bool(true)),
                "false" | "no" | "off" | "0" => Ok(Value::Bool(false)),
                _ => Err(mismatch()),
            },
            _ => Err(mismatch()),
        },

        FieldKind::Uuid => match value.as_str().and_then(|s| uuid::Uuid::parse_str(s).ok()) {
            Some(parsed) => Ok(Value::String(parsed.to_string())),
            None => Err(mismatch()),
        },

        FieldKind::DateTime => match value
            .as_str()
            .filter(|s| chrono::DateTime::parse_from_rfc3339(s).is_ok())
        {
            Some(s) => Ok(Value::String(s.to_string())),
            None => Err(mismatch()),
        },

        FieldKind::List(inner) => match value {
            Value::Array(items) => {
                let mut out = Vec::with_capacity(items.len());
                let mut errors = Vec::new();
                for (index, item) in items.iter().enumerate() {
                    let item_loc = push_loc(loc, LocItem::Index(index));
                    match coerce(inner, item, &item_loc) {
                        Ok(coerced) => out.push(coerced),
                        Err(mut item_errors) => errors.append(&mut item_errors),
                    }
                }
                if errors.is_empty() {
                    Ok(Value::Array(out))
                } else {
                    Err(errors)
                }
            }
            _ => Err(mismatch()),
        },

        FieldKind::Nested(descriptor) => match value {
            Value::Object(mapping) => conform(&descriptor(), mapping, loc).map(Value::Object),
            _ => Err(mismatch()),
        },
    }
}
