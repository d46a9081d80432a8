//! Loose field coercion for payload values.
//!
//! Producers are inconsistent about JSON types: numbers arrive as strings,
//! booleans as `"true"`/`1`, empty strings stand in for null. These helpers
//! take the raw `Option<&Value>` from a payload map and return typed values.

use crate::error::ValidationError;
use chrono::{DateTime, NaiveDate, Utc};
use serde_json::{Map, Value};

/// Render a scalar as text; `None` for null, arrays and objects.
pub fn scalar_text(value: Option<&Value>) -> Option<String> {
    match value? {
        Value::String(s) => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Null | Value::Array(_) | Value::Object(_) => None,
    }
}

/// Non-empty trimmed string, else `None`.
pub fn nullable_string(value: Option<&Value>) -> Option<String> {
    scalar_text(value).filter(|s| !s.is_empty())
}

/// Boolean with a `false` default for missing or unparseable values.
pub fn optional_bool(value: Option<&Value>) -> bool {
    match value {
        Some(Value::Bool(b)) => *b,
        Some(Value::Number(n)) => n.as_f64().map(|f| f != 0.0).unwrap_or(false),
        Some(Value::String(s)) => matches!(
            s.trim().to_ascii_lowercase().as_str(),
            "true" | "t" | "1"
        ),
        _ => false,
    }
}

/// Optional float: JSON number or numeric string.
pub fn nullable_float(value: Option<&Value>) -> Option<f64> {
    match value? {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }
}

/// Optional integer: JSON integer or integer string. Fractional values are rejected.
pub fn nullable_int(value: Option<&Value>) -> Option<i64> {
    match value? {
        Value::Number(n) => n
            .as_i64()
            .or_else(|| n.as_f64().filter(|f| f.fract() == 0.0).map(|f| f as i64)),
        Value::String(s) => s.trim().parse::<i64>().ok(),
        _ => None,
    }
}

/// Required integer; missing, empty or malformed values are a validation error.
pub fn required_int(value: Option<&Value>, field: &str) -> Result<i64, ValidationError> {
    match value {
        None | Some(Value::Null) => Err(ValidationError::RequiredFieldMissing {
            field: field.to_string(),
        }),
        Some(Value::String(s)) if s.trim().is_empty() => {
            Err(ValidationError::RequiredFieldMissing {
                field: field.to_string(),
            })
        }
        Some(other) => nullable_int(Some(other)).ok_or_else(|| ValidationError::InvalidValue {
            field: field.to_string(),
            reason: format!("not an integer: {}", other),
        }),
    }
}

/// Epoch value used for conflict resolution. Truncates floats; missing is 0.
pub fn epoch(value: Option<&Value>) -> i64 {
    nullable_float(value).map(|f| f as i64).unwrap_or(0)
}

/// Date or datetime: `YYYY-MM-DD` or RFC 3339.
pub fn optional_date(value: Option<&Value>) -> Option<DateTime<Utc>> {
    let raw = nullable_string(value)?;
    if let Ok(dt) = DateTime::parse_from_rfc3339(&raw) {
        return Some(dt.with_timezone(&Utc));
    }
    NaiveDate::parse_from_str(&raw, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}

/// RFC 3339 timestamp only.
pub fn optional_timestamp(value: Option<&Value>) -> Option<DateTime<Utc>> {
    let raw = nullable_string(value)?;
    DateTime::parse_from_rfc3339(&raw)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

/// JSON blob with `{}` standing in for missing, null or empty-string values.
pub fn json_or_empty(value: Option<&Value>) -> Value {
    match value {
        None | Some(Value::Null) => Value::Object(Map::new()),
        Some(Value::String(s)) if s.trim().is_empty() => Value::Object(Map::new()),
        Some(other) => other.clone(),
    }
}

/// Nullable JSON blob; empty strings and null become `None`.
pub fn nullable_json(value: Option<&Value>) -> Option<Value> {
    match value {
        None | Some(Value::Null) => None,
        Some(Value::String(s)) if s.trim().is_empty() => None,
        Some(other) => Some(other.clone()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_optional_bool_coercion() {
        assert!(optional_bool(Some(&json!(true))));
        assert!(optional_bool(Some(&json!("true"))));
        assert!(optional_bool(Some(&json!("1"))));
        assert!(optional_bool(Some(&json!(1))));
        assert!(!optional_bool(Some(&json!("nope"))));
        assert!(!optional_bool(Some(&Value::Null)));
        assert!(!optional_bool(None));
    }

    #[test]
    fn test_nullable_string_drops_empty() {
        assert_eq!(nullable_string(Some(&json!(""))), None);
        assert_eq!(nullable_string(Some(&json!("  "))), None);
        assert_eq!(nullable_string(Some(&json!("Sparky"))), Some("Sparky".to_string()));
        assert_eq!(nullable_string(Some(&json!(42))), Some("42".to_string()));
        assert_eq!(nullable_string(Some(&json!({"a": 1}))), None);
    }

    #[test]
    fn test_nullable_int() {
        assert_eq!(nullable_int(Some(&json!(1500))), Some(1500));
        assert_eq!(nullable_int(Some(&json!("15"))), Some(15));
        assert_eq!(nullable_int(Some(&json!(3.0))), Some(3));
        assert_eq!(nullable_int(Some(&json!(3.5))), None);
        assert_eq!(nullable_int(Some(&json!(""))), None);
    }

    #[test]
    fn test_required_int() {
        assert_eq!(required_int(Some(&json!(25)), "pokemon_id"), Ok(25));
        assert!(matches!(
            required_int(None, "pokemon_id"),
            Err(ValidationError::RequiredFieldMissing { .. })
        ));
        assert!(matches!(
            required_int(Some(&json!("")), "pokemon_id"),
            Err(ValidationError::RequiredFieldMissing { .. })
        ));
        assert!(matches!(
            required_int(Some(&json!("pikachu")), "pokemon_id"),
            Err(ValidationError::InvalidValue { .. })
        ));
    }

    #[test]
    fn test_epoch() {
        assert_eq!(epoch(Some(&json!(1_700_000_000_123i64))), 1_700_000_000_123);
        assert_eq!(epoch(Some(&json!(17.9))), 17);
        assert_eq!(epoch(Some(&json!("42"))), 42);
        assert_eq!(epoch(None), 0);
    }

    #[test]
    fn test_dates() {
        let d = optional_date(Some(&json!("2024-03-01"))).unwrap();
        assert_eq!(d.to_rfc3339(), "2024-03-01T00:00:00+00:00");
        assert!(optional_date(Some(&json!("2024-03-01T10:00:00Z"))).is_some());
        assert!(optional_date(Some(&json!("03/01/2024"))).is_none());
        assert!(optional_timestamp(Some(&json!("2024-03-01"))).is_none());
        assert!(optional_timestamp(Some(&json!("2024-03-01T10:00:00+02:00"))).is_some());
    }

    #[test]
    fn test_json_or_empty() {
        assert_eq!(json_or_empty(None), json!({}));
        assert_eq!(json_or_empty(Some(&json!(""))), json!({}));
        assert_eq!(json_or_empty(Some(&json!({"a": true}))), json!({"a": true}));
        assert_eq!(nullable_json(Some(&json!(""))), None);
    }
}
