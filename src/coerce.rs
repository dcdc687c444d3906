//! Defensive scalar coercion for raw feed values.
//!
//! Feeds mix numbers, numeric strings, empty strings and `"nan"` markers for
//! the same field. Everything here returns `None` instead of failing so one
//! malformed field never takes down a whole source unit.

use serde_json::Value;

pub fn as_i64_any(v: &Value) -> Option<i64> {
    if let Some(n) = v.as_i64() {
        return Some(n);
    }
    if let Some(f) = v.as_f64() {
        return float_to_i64(f);
    }
    let raw = v.as_str()?.trim();
    if let Ok(n) = raw.parse::<i64>() {
        return Some(n);
    }
    raw.parse::<f64>().ok().and_then(float_to_i64)
}

pub fn as_f64_any(v: &Value) -> Option<f64> {
    if let Some(n) = v.as_f64() {
        return Some(n);
    }
    let parsed = v.as_str()?.trim().parse::<f64>().ok()?;
    parsed.is_finite().then_some(parsed)
}

pub fn as_string_any(v: &Value) -> Option<String> {
    match v {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

pub fn as_bool_any(v: &Value) -> Option<bool> {
    match v {
        Value::Bool(b) => Some(*b),
        Value::Number(n) => n.as_i64().map(|n| n != 0),
        Value::String(s) => match s.trim().to_ascii_lowercase().as_str() {
            "true" | "1" | "yes" => Some(true),
            "false" | "0" | "no" => Some(false),
            _ => None,
        },
        _ => None,
    }
}

/// Looks up `key` and coerces, treating absent and null alike.
pub fn field_i64(obj: &Value, key: &str) -> Option<i64> {
    obj.get(key).and_then(as_i64_any)
}

pub fn field_f64(obj: &Value, key: &str) -> Option<f64> {
    obj.get(key).and_then(as_f64_any)
}

pub fn field_string(obj: &Value, key: &str) -> Option<String> {
    obj.get(key).and_then(as_string_any)
}

pub fn field_bool(obj: &Value, key: &str) -> Option<bool> {
    obj.get(key).and_then(as_bool_any)
}

/// Nullable JSON number for a payload column.
pub fn num_or_null(v: Option<f64>) -> Value {
    v.and_then(serde_json::Number::from_f64)
        .map(Value::Number)
        .unwrap_or(Value::Null)
}

pub fn int_or_null(v: Option<i64>) -> Value {
    v.map(Value::from).unwrap_or(Value::Null)
}

pub fn str_or_null(v: Option<String>) -> Value {
    v.map(Value::String).unwrap_or(Value::Null)
}

/// Passes scalars through untouched; arrays, objects and absent become null.
pub fn scalar_or_null(v: Option<&Value>) -> Value {
    match v {
        Some(v @ (Value::Bool(_) | Value::Number(_) | Value::String(_))) => v.clone(),
        _ => Value::Null,
    }
}

fn float_to_i64(f: f64) -> Option<i64> {
    if !f.is_finite() || f.fract() != 0.0 {
        return None;
    }
    if f < i64::MIN as f64 || f > i64::MAX as f64 {
        return None;
    }
    Some(f as i64)
}
