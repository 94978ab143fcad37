//! Declared input schemas and validated arguments

use super::HandlerFailure;
use crate::domain::shared::DispatchError;
use serde_json::{json, Map, Value};
use tracing::debug;

/// Expected JSON type of an argument
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    String,
    Integer,
    Number,
    Boolean,
    Object,
    Array,
}

impl FieldKind {
    /// JSON Schema type name
    pub fn json_type(&self) -> &'static str {
        match self {
            FieldKind::String => "string",
            FieldKind::Integer => "integer",
            FieldKind::Number => "number",
            FieldKind::Boolean => "boolean",
            FieldKind::Object => "object",
            FieldKind::Array => "array",
        }
    }

    pub fn matches(&self, value: &Value) -> bool {
        match self {
            FieldKind::String => value.is_string(),
            FieldKind::Integer => value.is_i64() || value.is_u64(),
            FieldKind::Number => value.is_number(),
            FieldKind::Boolean => value.is_boolean(),
            FieldKind::Object => value.is_object(),
            FieldKind::Array => value.is_array(),
        }
    }
}

fn describe_value(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(n) if n.is_f64() => "number",
        Value::Number(_) => "integer",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// One declared argument
#[derive(Debug, Clone)]
pub struct FieldSpec {
    pub name: String,
    pub kind: FieldKind,
    pub required: bool,
    pub description: Option<String>,
}

impl FieldSpec {
    pub fn required(name: impl Into<String>, kind: FieldKind) -> Self {
        Self {
            name: name.into(),
            kind,
            required: true,
            description: None,
        }
    }

    pub fn optional(name: impl Into<String>, kind: FieldKind) -> Self {
        Self {
            name: name.into(),
            kind,
            required: false,
            description: None,
        }
    }

    pub fn describe(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }
}

/// Field name -> expected type and required-ness
#[derive(Debug, Clone, Default)]
pub struct InputSchema {
    fields: Vec<FieldSpec>,
}

impl InputSchema {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn field(mut self, spec: FieldSpec) -> Self {
        self.fields.retain(|f| f.name != spec.name);
        self.fields.push(spec);
        self
    }

    pub fn fields(&self) -> &[FieldSpec] {
        &self.fields
    }

    /// Check `arguments` against the schema.
    ///
    /// Fields are checked in declaration order, so the reported field is
    /// deterministic. Undeclared fields are dropped and `null` counts as absent.
    pub fn validate(&self, arguments: &Value) -> Result<Arguments, DispatchError> {
        let empty = Map::new();
        let provided = match arguments {
            Value::Object(map) => map,
            Value::Null => &empty,
            other => {
                return Err(DispatchError::validation(
                    "arguments",
                    format!("expected an object, got {}", describe_value(other)),
                ))
            }
        };

        let mut validated = Map::new();
        for spec in &self.fields {
            match provided.get(&spec.name) {
                None | Some(Value::Null) => {
                    if spec.required {
                        return Err(DispatchError::validation(
                            &spec.name,
                            "missing required field",
                        ));
                    }
                }
                Some(value) if !spec.kind.matches(value) => {
                    return Err(DispatchError::validation(
                        &spec.name,
                        format!(
                            "expected {}, got {}",
                            spec.kind.json_type(),
                            describe_value(value)
                        ),
                    ));
                }
                Some(value) => {
                    validated.insert(spec.name.clone(), value.clone());
                }
            }
        }

        for key in provided.keys() {
            if !self.fields.iter().any(|f| &f.name == key) {
                debug!("Ignoring undeclared argument: {}", key);
            }
        }

        Ok(Arguments(validated))
    }

    /// JSON Schema object describing the parameters
    pub fn to_json_schema(&self) -> Value {
        let mut properties = Map::new();
        let mut required = Vec::new();
        for spec in &self.fields {
            let mut property = json!({ "type": spec.kind.json_type() });
            if let Some(description) = &spec.description {
                property["description"] = Value::String(description.clone());
            }
            properties.insert(spec.name.clone(), property);
            if spec.required {
                required.push(Value::String(spec.name.clone()));
            }
        }
        json!({
            "type": "object",
            "properties": properties,
            "required": required,
        })
    }
}

/// Arguments that passed schema validation
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Arguments(Map<String, Value>);

impl Arguments {
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.0.get(name)
    }

    pub fn str(&self, name: &str) -> Option<&str> {
        self.0.get(name).and_then(Value::as_str)
    }

    pub fn i64(&self, name: &str) -> Option<i64> {
        self.0.get(name).and_then(Value::as_i64)
    }

    pub fn bool(&self, name: &str) -> Option<bool> {
        self.0.get(name).and_then(Value::as_bool)
    }

    /// A string argument the schema declares as required
    pub fn require_str(&self, name: &str) -> Result<&str, HandlerFailure> {
        self.str(name).ok_or_else(|| {
            HandlerFailure::new("invalid_arguments", format!("missing argument '{}'", name))
        })
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn booking_schema() -> InputSchema {
        InputSchema::new()
            .field(FieldSpec::required("date", FieldKind::String).describe("Requested day"))
            .field(FieldSpec::required("service", FieldKind::String))
            .field(FieldSpec::optional("party_size", FieldKind::Integer))
    }

    #[test]
    fn test_valid_arguments() {
        let args = booking_schema()
            .validate(&json!({"date": "2024-05-01", "service": "tourist visa", "party_size": 2}))
            .unwrap();
        assert_eq!(args.str("date"), Some("2024-05-01"));
        assert_eq!(args.i64("party_size"), Some(2));
    }

    #[test]
    fn test_missing_required_field_is_named() {
        let err = booking_schema()
            .validate(&json!({"date": "2024-05-01"}))
            .unwrap_err();
        match err {
            DispatchError::ValidationFailed { field, reason } => {
                assert_eq!(field, "service");
                assert_eq!(reason, "missing required field");
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn test_null_counts_as_missing() {
        let err = booking_schema()
            .validate(&json!({"date": null, "service": "work"}))
            .unwrap_err();
        assert!(matches!(err, DispatchError::ValidationFailed { ref field, .. } if field == "date"));
    }

    #[test]
    fn test_type_mismatch_is_named() {
        let err = booking_schema()
            .validate(&json!({"date": "2024-05-01", "service": "work", "party_size": "two"}))
            .unwrap_err();
        match err {
            DispatchError::ValidationFailed { field, reason } => {
                assert_eq!(field, "party_size");
                assert_eq!(reason, "expected integer, got string");
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn test_undeclared_fields_are_dropped() {
        let args = booking_schema()
            .validate(&json!({"date": "today", "service": "work", "mood": "happy"}))
            .unwrap();
        assert_eq!(args.len(), 2);
        assert!(args.get("mood").is_none());
    }

    #[test]
    fn test_non_object_arguments_rejected() {
        let err = booking_schema().validate(&json!(["today"])).unwrap_err();
        assert!(matches!(err, DispatchError::ValidationFailed { ref field, .. } if field == "arguments"));
    }

    #[test]
    fn test_null_arguments_for_empty_schema() {
        assert!(InputSchema::new().validate(&Value::Null).unwrap().is_empty());
    }

    #[test]
    fn test_json_schema_output() {
        let schema = booking_schema().to_json_schema();
        assert_eq!(schema["type"], "object");
        assert_eq!(schema["properties"]["date"]["type"], "string");
        assert_eq!(schema["properties"]["date"]["description"], "Requested day");
        assert_eq!(schema["required"], json!(["date", "service"]));
    }
}
