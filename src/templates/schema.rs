//! # Input schemas.
//!
//! Every template declares an [`InputSchema`]. The facade validates input against
//! it before a task is submitted, so invalid input never occupies a unit.
//!
//! Two kinds of schema are provided:
//! - [`ObjectSchema`]: a JSON object with typed required/optional fields (nestable)
//! - any closure `Fn(&Value) -> Result<(), String>`
//!
//! ```rust
//! use rendervisor::{FieldKind, InputSchema, ObjectSchema};
//! use serde_json::json;
//!
//! let schema = ObjectSchema::new()
//!     .required("width", FieldKind::Integer)
//!     .required("height", FieldKind::Integer)
//!     .optional("color", FieldKind::String);
//!
//! assert!(schema.validate(&json!({"width": 2, "height": 2})).is_ok());
//! assert!(schema.validate(&json!({"width": "2", "height": 2})).is_err());
//! ```

use serde_json::{Map, Value};

use crate::error::SchemaError;

/// Validates template input.
pub trait InputSchema: Send + Sync + 'static {
    fn validate(&self, input: &Value) -> Result<(), SchemaError>;
}

impl<F> InputSchema for F
where
    F: Fn(&Value) -> Result<(), String> + Send + Sync + 'static,
{
    fn validate(&self, input: &Value) -> Result<(), SchemaError> {
        (self)(input).map_err(SchemaError::root)
    }
}

/// Expected JSON type of a field.
#[derive(Debug, Clone)]
pub enum FieldKind {
    String,
    /// Any JSON number.
    Number,
    /// A number with no fractional part.
    Integer,
    Bool,
    Array,
    Object(ObjectSchema),
    Any,
}

impl FieldKind {
    fn expected(&self) -> &'static str {
        match self {
            FieldKind::String => "string",
            FieldKind::Number => "number",
            FieldKind::Integer => "integer",
            FieldKind::Bool => "boolean",
            FieldKind::Array => "array",
            FieldKind::Object(_) => "object",
            FieldKind::Any => "any value",
        }
    }

    fn check(&self, path: &str, value: &Value) -> Result<(), SchemaError> {
        let ok = match (self, value) {
            (FieldKind::Any, _) => true,
            (FieldKind::String, Value::String(_)) => true,
            (FieldKind::Number, Value::Number(_)) => true,
            (FieldKind::Integer, Value::Number(n)) => n.is_i64() || n.is_u64(),
            (FieldKind::Bool, Value::Bool(_)) => true,
            (FieldKind::Array, Value::Array(_)) => true,
            (FieldKind::Object(schema), Value::Object(map)) => {
                return schema.check_map(Some(path), map);
            }
            _ => false,
        };
        if ok {
            Ok(())
        } else {
            Err(SchemaError::field(
                path,
                format!("expected {}, got {}", self.expected(), type_name(value)),
            ))
        }
    }
}

#[derive(Debug, Clone)]
struct Field {
    name: String,
    kind: FieldKind,
    required: bool,
}

/// Schema for a JSON object input.
///
/// Unknown fields are accepted unless [`ObjectSchema::deny_unknown`] is set.
#[derive(Debug, Clone, Default)]
pub struct ObjectSchema {
    fields: Vec<Field>,
    deny_unknown: bool,
}

impl ObjectSchema {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a field that must be present.
    pub fn required(mut self, name: impl Into<String>, kind: FieldKind) -> Self {
        self.fields.push(Field {
            name: name.into(),
            kind,
            required: true,
        });
        self
    }

    /// Adds a field that may be absent or `null`.
    pub fn optional(mut self, name: impl Into<String>, kind: FieldKind) -> Self {
        self.fields.push(Field {
            name: name.into(),
            kind,
            required: false,
        });
        self
    }

    /// Rejects fields that were not declared.
    pub fn deny_unknown(mut self) -> Self {
        self.deny_unknown = true;
        self
    }

    fn check_map(&self, prefix: Option<&str>, map: &Map<String, Value>) -> Result<(), SchemaError> {
        let join = |name: &str| match prefix {
            Some(p) => format!("{p}.{name}"),
            None => name.to_string(),
        };

        for field in &self.fields {
            match map.get(&field.name) {
                None | Some(Value::Null) if field.required => {
                    return Err(SchemaError::field(join(&field.name), "required field missing"));
                }
                None | Some(Value::Null) => {}
                Some(value) => field.kind.check(&join(&field.name), value)?,
            }
        }

        if self.deny_unknown {
            if let Some(extra) = map
                .keys()
                .find(|k| !self.fields.iter().any(|f| &f.name == *k))
            {
                return Err(SchemaError::field(join(extra), "unknown field"));
            }
        }
        Ok(())
    }
}

impl InputSchema for ObjectSchema {
    fn validate(&self, input: &Value) -> Result<(), SchemaError> {
        match input {
            Value::Object(map) => self.check_map(None, map),
            other => Err(SchemaError::root(format!(
                "expected object, got {}",
                type_name(other)
            ))),
        }
    }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn card() -> ObjectSchema {
        ObjectSchema::new()
            .required("title", FieldKind::String)
            .optional("scale", FieldKind::Number)
            .required(
                "size",
                FieldKind::Object(
                    ObjectSchema::new()
                        .required("width", FieldKind::Integer)
                        .required("height", FieldKind::Integer),
                ),
            )
    }

    #[test]
    fn accepts_valid_input() {
        let input = json!({"title": "hi", "size": {"width": 10, "height": 5}, "extra": true});
        assert!(card().validate(&input).is_ok());
    }

    #[test]
    fn reports_nested_path() {
        let input = json!({"title": "hi", "size": {"width": 1.5, "height": 5}});
        let err = card().validate(&input).unwrap_err();
        assert_eq!(err.path.as_deref(), Some("size.width"));
        assert_eq!(err.message, "expected integer, got number");
    }

    #[test]
    fn missing_and_null_required_fields_fail() {
        let err = card().validate(&json!({"size": {"width": 1, "height": 1}})).unwrap_err();
        assert_eq!(err.path.as_deref(), Some("title"));

        let err = card()
            .validate(&json!({"title": null, "size": {"width": 1, "height": 1}}))
            .unwrap_err();
        assert_eq!(err.path.as_deref(), Some("title"));
    }

    #[test]
    fn optional_null_is_accepted() {
        let input = json!({"title": "x", "scale": null, "size": {"width": 1, "height": 1}});
        assert!(card().validate(&input).is_ok());
    }

    #[test]
    fn deny_unknown_rejects_extras() {
        let schema = ObjectSchema::new()
            .required("a", FieldKind::Any)
            .deny_unknown();
        let err = schema.validate(&json!({"a": 1, "b": 2})).unwrap_err();
        assert_eq!(err.path.as_deref(), Some("b"));
    }

    #[test]
    fn non_object_root_fails() {
        let err = ObjectSchema::new().validate(&json!([1, 2])).unwrap_err();
        assert_eq!(err.path, None);
        assert_eq!(err.message, "expected object, got array");
    }

    #[test]
    fn closures_are_schemas() {
        let schema = |v: &Value| {
            if v.is_object() {
                Ok(())
            } else {
                Err("not an object".to_string())
            }
        };
        assert!(schema.validate(&json!({})).is_ok());
        assert_eq!(
            schema.validate(&json!(1)).unwrap_err(),
            SchemaError::root("not an object")
        );
    }
}
