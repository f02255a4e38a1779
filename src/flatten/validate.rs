//! Record validation and coercion
//!
//! The walker only gathers raw JSON values. Turning them into typed columns,
//! and rejecting rows that break a model's declared types or nullability, is
//! the job of a [`RecordValidator`]. [`SchemaValidator`] is the default.

use crate::flatten::error::ValidationError;
use crate::flatten::plan::{FieldSpec, ModelSpec};
use crate::flatten::types::{FieldType, FieldValue, RawRecord, Record, RecordField};
use chrono::DateTime;
use serde_json::Value;

/// Turns the raw values of one emission event into a finalized record.
pub trait RecordValidator: Send + Sync {
    fn validate(&self, model: &ModelSpec, raw: &RawRecord) -> Result<Record, ValidationError>;
}

/// Validates each field against its declared [`FieldType`] and nullability.
///
/// Strings are strict apart from lists, which become their JSON text;
/// numbers, booleans and timestamps accept their usual textual spellings.
#[derive(Debug, Clone, Copy, Default)]
pub struct SchemaValidator;

impl RecordValidator for SchemaValidator {
    fn validate(&self, model: &ModelSpec, raw: &RawRecord) -> Result<Record, ValidationError> {
        let mut fields = Vec::with_capacity(model.fields().len());

        for field in model.fields() {
            let value = coerce_field(field, raw.get(field.alias_str())).map_err(|reason| {
                ValidationError {
                    model: model.name().to_string(),
                    path: raw.path().to_string(),
                    field: field.name().to_string(),
                    reason,
                }
            })?;

            fields.push(RecordField {
                name: field.name().to_string(),
                alias: field.alias_str().to_string(),
                value,
            });
        }

        Ok(Record::new(model.name(), fields))
    }
}

fn coerce_field(field: &FieldSpec, value: Option<&Value>) -> Result<FieldValue, String> {
    let value = match value {
        None | Some(Value::Null) if field.is_nullable() => return Ok(FieldValue::Null),
        None | Some(Value::Null) => return Err("field required".to_string()),
        Some(v) => v,
    };

    match field.field_type() {
        FieldType::String => match value {
            Value::String(s) => Ok(FieldValue::Text(s.clone())),
            // Lists land in text columns as their JSON text.
            Value::Array(_) => Ok(FieldValue::Text(value.to_string())),
            _ => Err(mismatch("string", value)),
        },
        FieldType::Integer => coerce_integer(value),
        FieldType::Float => coerce_float(value),
        FieldType::Boolean => match value {
            Value::Bool(b) => Ok(FieldValue::Boolean(*b)),
            Value::String(s) if s == "true" => Ok(FieldValue::Boolean(true)),
            Value::String(s) if s == "false" => Ok(FieldValue::Boolean(false)),
            _ => Err(mismatch("boolean", value)),
        },
        FieldType::DateTime => {
            let text = value.as_str().ok_or_else(|| mismatch("datetime string", value))?;
            DateTime::parse_from_rfc3339(text)
                .map(FieldValue::DateTime)
                .map_err(|e| format!("invalid datetime '{text}': {e}"))
        }
        FieldType::Json => Ok(FieldValue::Json(value.clone())),
    }
}

fn coerce_integer(value: &Value) -> Result<FieldValue, String> {
    match value {
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                Ok(FieldValue::Integer(i))
            } else if n.is_u64() {
                Err(format!("integer {n} is out of range"))
            } else {
                let f = n.as_f64().unwrap_or(f64::NAN);
                // i64::MAX as f64 rounds up to 2^63, hence the strict bound
                if f.fract() == 0.0 && f >= i64::MIN as f64 && f < i64::MAX as f64 {
                    Ok(FieldValue::Integer(f as i64))
                } else {
                    Err(format!("expected integer, got fractional number {n}"))
                }
            }
        }
        Value::String(s) => s
            .parse::<i64>()
            .map(FieldValue::Integer)
            .map_err(|_| format!("expected integer, got string '{s}'")),
        _ => Err(mismatch("integer", value)),
    }
}

fn coerce_float(value: &Value) -> Result<FieldValue, String> {
    match value {
        Value::Number(n) => n
            .as_f64()
            .map(FieldValue::Float)
            .ok_or_else(|| mismatch("number", value)),
        Value::String(s) => match s.parse::<f64>() {
            Ok(f) if f.is_finite() => Ok(FieldValue::Float(f)),
            _ => Err(format!("expected number, got string '{s}'")),
        },
        _ => Err(mismatch("number", value)),
    }
}

fn mismatch(expected: &str, found: &Value) -> String {
    format!("expected {expected}, got {} {found}", json_kind(found))
}

/// Name of a JSON value's kind, for error messages
pub(crate) fn json_kind(value: &Value) -> &'static str {
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
    use super::*;
    use crate::flatten::types::{FieldDescriptor, FlattenConfig, ModelDescriptor};
    use serde_json::json;

    fn model() -> ModelSpec {
        let descriptor = ModelDescriptor::new(
            "Item",
            vec![
                FieldDescriptor::new("sku", "root.items[*].sku", FieldType::String),
                FieldDescriptor::new(
                    "description",
                    "root.items[*].description",
                    FieldType::String,
                )
                .nullable(),
                FieldDescriptor::new("quantity", "root.items[*].quantity", FieldType::Integer),
                FieldDescriptor::new("unit_price", "root.items[*].unit_price", FieldType::Float),
            ],
        );
        ModelSpec::from_descriptor(&descriptor, &FlattenConfig::default()).unwrap()
    }

    fn raw(values: &[(&str, Option<Value>)]) -> RawRecord {
        let mut raw = RawRecord::new("root.items[0]");
        for (alias, value) in values {
            raw.insert(*alias, value.clone());
        }
        raw
    }

    #[test]
    fn test_valid_record() {
        let record = SchemaValidator
            .validate(
                &model(),
                &raw(&[
                    ("root.items[*].sku", Some(json!("LAPTOP-001"))),
                    ("root.items[*].description", None),
                    ("root.items[*].quantity", Some(json!(2))),
                    ("root.items[*].unit_price", Some(json!(999.99))),
                ]),
            )
            .unwrap();

        assert_eq!(record.model, "Item");
        assert_eq!(record.get("sku").and_then(FieldValue::as_str), Some("LAPTOP-001"));
        assert_eq!(record.get("description"), Some(&FieldValue::Null));
        assert_eq!(record.get("quantity"), Some(&FieldValue::Integer(2)));
        assert_eq!(record.get("unit_price"), Some(&FieldValue::Float(999.99)));
        assert_eq!(record.hash, None);
    }

    #[test]
    fn test_required_field_missing() {
        let err = SchemaValidator
            .validate(
                &model(),
                &raw(&[
                    ("root.items[*].sku", Some(json!("LAPTOP-001"))),
                    ("root.items[*].quantity", Some(json!(2))),
                ]),
            )
            .unwrap_err();

        assert_eq!(err.model, "Item");
        assert_eq!(err.path, "root.items[0]");
        assert_eq!(err.field, "unit_price");
        assert_eq!(err.reason, "field required");
    }

    #[test]
    fn test_integer_coercion() {
        let spec = model();
        let quantity = spec.field("quantity").unwrap();

        assert_eq!(coerce_field(quantity, Some(&json!(5))), Ok(FieldValue::Integer(5)));
        assert_eq!(coerce_field(quantity, Some(&json!(5.0))), Ok(FieldValue::Integer(5)));
        assert_eq!(coerce_field(quantity, Some(&json!("12"))), Ok(FieldValue::Integer(12)));
        assert!(coerce_field(quantity, Some(&json!(5.5))).is_err());
        assert!(coerce_field(quantity, Some(&json!(u64::MAX))).is_err());
        assert!(coerce_field(quantity, Some(&json!("twelve"))).is_err());
        assert!(coerce_field(quantity, Some(&json!(true))).is_err());
    }

    #[test]
    fn test_string_is_strict() {
        let spec = model();
        let sku = spec.field("sku").unwrap();

        let err = coerce_field(sku, Some(&json!(42))).unwrap_err();
        assert!(err.contains("expected string"), "{err}");
        assert!(coerce_field(sku, Some(&json!({"a": 1}))).is_err());
        assert_eq!(
            coerce_field(sku, Some(&json!(["a", 1]))),
            Ok(FieldValue::Text(r#"["a",1]"#.to_string()))
        );
        assert_eq!(coerce_field(sku, Some(&json!([]))), Ok(FieldValue::Text("[]".to_string())));
    }

    #[test]
    fn test_float_and_boolean_and_datetime() {
        let descriptor = ModelDescriptor::new(
            "Tx",
            vec![
                FieldDescriptor::new("amount", "root.amount", FieldType::Float),
                FieldDescriptor::new("settled", "root.settled", FieldType::Boolean),
                FieldDescriptor::new("timestamp", "root.timestamp", FieldType::DateTime),
                FieldDescriptor::new("extra", "root.extra", FieldType::Json),
            ],
        );
        let spec = ModelSpec::from_descriptor(&descriptor, &FlattenConfig::default()).unwrap();
        let record = SchemaValidator
            .validate(
                &spec,
                &raw(&[
                    ("root.amount", Some(json!("-50.25"))),
                    ("root.settled", Some(json!("true"))),
                    ("root.timestamp", Some(json!("2025-12-01T10:30:00Z"))),
                    ("root.extra", Some(json!({"k": [1, 2]}))),
                ]),
            )
            .unwrap();

        assert_eq!(record.get("amount"), Some(&FieldValue::Float(-50.25)));
        assert_eq!(record.get("settled"), Some(&FieldValue::Boolean(true)));
        match record.get("timestamp") {
            Some(FieldValue::DateTime(dt)) => {
                assert_eq!(dt.to_rfc3339(), "2025-12-01T10:30:00+00:00")
            }
            other => panic!("expected datetime, got {other:?}"),
        }
        assert_eq!(record.get("extra"), Some(&FieldValue::Json(json!({"k": [1, 2]}))));

        let timestamp = spec.field("timestamp").unwrap();
        assert!(coerce_field(timestamp, Some(&json!("yesterday"))).is_err());
        let amount = spec.field("amount").unwrap();
        assert!(coerce_field(amount, Some(&json!("NaN"))).is_err());
    }
}
