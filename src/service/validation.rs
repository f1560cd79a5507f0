//! Apply a validation schema to a request body: type checks, coercion and constraints.

use crate::error::AppError;
use crate::model::{FieldKind, FieldRule, ValidationSchema};
use crate::store::Properties;
use chrono::{DateTime, NaiveDate, NaiveDateTime};
use regex::Regex;
use serde_json::{Number, Value};

pub struct RequestValidator;

impl RequestValidator {
    /// Validate a whole payload. Every required field must be present; unknown keys are dropped.
    /// All field problems are collected into one [`AppError::ValidationFailed`].
    pub fn validate(body: Option<&Value>, schema: &ValidationSchema) -> Result<Properties, AppError> {
        Self::apply(body, schema, true)
    }

    /// Validate only the fields present in the body (PATCH). Required-ness is not enforced.
    pub fn validate_partial(body: Option<&Value>, schema: &ValidationSchema) -> Result<Properties, AppError> {
        Self::apply(body, schema, false)
    }

    fn apply(body: Option<&Value>, schema: &ValidationSchema, enforce_required: bool) -> Result<Properties, AppError> {
        let empty = Properties::new();
        let input = match body {
            None | Some(Value::Null) => &empty,
            Some(Value::Object(map)) => map,
            Some(_) => {
                return Err(AppError::ValidationFailed(vec![
                    "_schema: Invalid input type, expected an object.".into(),
                ]))
            }
        };

        let mut out = Properties::new();
        let mut errors = Vec::new();
        for (name, rule) in schema.iter() {
            match input.get(name) {
                None | Some(Value::Null) => {
                    if enforce_required && rule.required {
                        errors.push(format!("{}: Missing data for required field.", name));
                    }
                }
                Some(v) => match validate_field(name, v, rule) {
                    Ok(coerced) => {
                        out.insert(name.clone(), coerced);
                    }
                    Err(msg) => errors.push(msg),
                },
            }
        }
        if errors.is_empty() {
            Ok(out)
        } else {
            Err(AppError::ValidationFailed(errors))
        }
    }
}

fn validate_field(col: &str, v: &Value, rule: &FieldRule) -> Result<Value, String> {
    let v = coerce(&rule.kind, v).map_err(|msg| format!("{}: {}", col, msg))?;
    let c = &rule.constraints;
    if let Some(format) = &c.format {
        validate_format(col, &v, format)?;
    }
    let length = match &v {
        Value::String(s) => Some(s.chars().count()),
        Value::Array(a) => Some(a.len()),
        _ => None,
    };
    if let (Some(max), Some(len)) = (c.max_length, length) {
        if len > max as usize {
            return Err(format!("{} must be at most {} characters", col, max));
        }
    }
    if let (Some(min), Some(len)) = (c.min_length, length) {
        if len < min as usize {
            return Err(format!("{} must be at least {} characters", col, min));
        }
    }
    if let Some(pattern) = &c.pattern {
        let re = Regex::new(pattern).map_err(|_| format!("invalid pattern for {}", col))?;
        if let Some(s) = v.as_str() {
            if !re.is_match(s) {
                return Err(format!("{} does not match required pattern", col));
            }
        }
    }
    if let Some(allowed) = &c.allowed {
        if !allowed.iter().any(|a| value_eq(&v, a)) {
            return Err(format!(
                "{} must be one of: {:?}",
                col,
                allowed.iter().take(5).collect::<Vec<_>>()
            ));
        }
    }
    if let (Some(min), Some(n)) = (c.minimum, v.as_f64()) {
        if n < min {
            return Err(format!("{} must be at least {}", col, min));
        }
    }
    if let (Some(max), Some(n)) = (c.maximum, v.as_f64()) {
        if n > max {
            return Err(format!("{} must be at most {}", col, max));
        }
    }
    Ok(v)
}

/// Check `v` against `kind`, converting lenient inputs (numeric strings, "true") to the typed value.
fn coerce(kind: &FieldKind, v: &Value) -> Result<Value, String> {
    match kind {
        FieldKind::Raw => Ok(v.clone()),
        FieldKind::String => match v {
            Value::String(_) => Ok(v.clone()),
            _ => Err("Not a valid string.".into()),
        },
        FieldKind::Integer => match v {
            Value::Number(n) if n.is_i64() || n.is_u64() => Ok(v.clone()),
            Value::Number(n) => match n.as_f64() {
                Some(f) if f.fract() == 0.0 && f.abs() < i64::MAX as f64 => Ok(Value::from(f as i64)),
                _ => Err("Not a valid integer.".into()),
            },
            Value::String(s) => s
                .trim()
                .parse::<i64>()
                .map(Value::from)
                .map_err(|_| "Not a valid integer.".into()),
            _ => Err("Not a valid integer.".into()),
        },
        FieldKind::Float => {
            let f = match v {
                Value::Number(n) => n.as_f64(),
                Value::String(s) => s.trim().parse::<f64>().ok(),
                _ => None,
            };
            f.and_then(Number::from_f64)
                .map(Value::Number)
                .ok_or_else(|| "Not a valid number.".into())
        }
        FieldKind::Boolean => match v {
            Value::Bool(_) => Ok(v.clone()),
            Value::Number(n) if n.as_i64() == Some(1) => Ok(Value::Bool(true)),
            Value::Number(n) if n.as_i64() == Some(0) => Ok(Value::Bool(false)),
            Value::String(s) => match s.trim().to_ascii_lowercase().as_str() {
                "true" | "t" | "yes" | "y" | "on" | "1" => Ok(Value::Bool(true)),
                "false" | "f" | "no" | "n" | "off" | "0" => Ok(Value::Bool(false)),
                _ => Err("Not a valid boolean.".into()),
            },
            _ => Err("Not a valid boolean.".into()),
        },
        FieldKind::Date => v
            .as_str()
            .and_then(|s| NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d").ok())
            .map(|d| Value::String(d.format("%Y-%m-%d").to_string()))
            .ok_or_else(|| "Not a valid date.".into()),
        FieldKind::DateTime => v
            .as_str()
            .and_then(|s| parse_datetime(s.trim()))
            .map(Value::String)
            .ok_or_else(|| "Not a valid datetime.".into()),
        FieldKind::Email => match v.as_str() {
            Some(s) if is_email(s) => Ok(Value::String(s.trim().to_string())),
            _ => Err("Not a valid email address.".into()),
        },
        FieldKind::Uuid => match v.as_str() {
            Some(s) if uuid::Uuid::parse_str(s.trim()).is_ok() => Ok(Value::String(s.trim().to_string())),
            _ => Err("Not a valid UUID.".into()),
        },
        FieldKind::Dict => match v {
            Value::Object(_) => Ok(v.clone()),
            _ => Err("Not a valid mapping type.".into()),
        },
        FieldKind::List(inner) => match v {
            Value::Array(items) => items
                .iter()
                .enumerate()
                .map(|(i, item)| coerce(inner, item).map_err(|msg| format!("[{}] {}", i, msg)))
                .collect::<Result<Vec<_>, _>>()
                .map(Value::Array),
            _ => Err("Not a valid list.".into()),
        },
    }
}

fn parse_datetime(s: &str) -> Option<String> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.to_rfc3339());
    }
    ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(s, fmt).ok())
        .map(|dt| dt.format("%Y-%m-%dT%H:%M:%S%.f").to_string())
}

fn is_email(s: &str) -> bool {
    let s = s.trim();
    match s.split_once('@') {
        Some((local, domain)) => {
            !local.is_empty()
                && !domain.contains('@')
                && domain.contains('.')
                && !domain.starts_with('.')
                && !domain.ends_with('.')
                && !s.contains(char::is_whitespace)
        }
        None => false,
    }
}

fn value_eq(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::String(s), Value::String(t)) => s == t,
        (Value::Number(n), Value::Number(m)) => n.as_f64() == m.as_f64(),
        _ => a == b,
    }
}

fn validate_format(col: &str, v: &Value, format: &str) -> Result<(), String> {
    match format.to_lowercase().as_str() {
        "email" => {
            if let Some(s) = v.as_str() {
                if !is_email(s) {
                    return Err(format!("{} must be a valid email", col));
                }
            }
        }
        "uuid" => {
            if let Some(s) = v.as_str() {
                if uuid::Uuid::parse_str(s).is_err() {
                    return Err(format!("{} must be a valid UUID", col));
                }
            }
        }
        _ => {}
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn schema() -> ValidationSchema {
        ValidationSchema::new()
            .with("name", FieldRule::new(FieldKind::String).required().max_length(8))
            .with("age", FieldRule::new(FieldKind::Integer).range(Some(0.0), Some(150.0)))
            .with("born", FieldRule::new(FieldKind::Date))
            .with("email", FieldRule::new(FieldKind::Email))
            .with("tags", FieldRule::new(FieldKind::List(Box::new(FieldKind::String))))
    }

    #[test]
    fn coerces_and_drops_unknown_keys() {
        let body = json!({"name": "rex", "age": "7", "born": "2020-01-02", "color": "brown"});
        let out = RequestValidator::validate(Some(&body), &schema()).unwrap();
        assert_eq!(out.get("age"), Some(&json!(7)));
        assert_eq!(out.get("born"), Some(&json!("2020-01-02")));
        assert!(!out.contains_key("color"));
    }

    #[test]
    fn collects_every_field_error() {
        let body = json!({"age": "old", "email": "nope", "tags": ["a", 1]});
        let err = RequestValidator::validate(Some(&body), &schema()).unwrap_err();
        match err {
            AppError::ValidationFailed(msgs) => {
                assert_eq!(msgs.len(), 4, "{:?}", msgs);
                assert!(msgs.iter().any(|m| m.starts_with("name:")));
                assert!(msgs.iter().any(|m| m.starts_with("age:")));
                assert!(msgs.iter().any(|m| m.starts_with("email:")));
                assert!(msgs.iter().any(|m| m.starts_with("tags:")));
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn constraints_apply_after_coercion() {
        let err = RequestValidator::validate(Some(&json!({"name": "abcdefghij"})), &schema()).unwrap_err();
        assert!(matches!(err, AppError::ValidationFailed(ref m) if m[0].contains("at most 8")));
        let err = RequestValidator::validate(Some(&json!({"name": "a", "age": 200})), &schema()).unwrap_err();
        assert!(matches!(err, AppError::ValidationFailed(ref m) if m[0].contains("age must be at most")));
    }

    #[test]
    fn partial_skips_required() {
        let out = RequestValidator::validate_partial(Some(&json!({"age": 3})), &schema()).unwrap();
        assert_eq!(out.len(), 1);
        assert!(RequestValidator::validate(Some(&json!({"age": 3})), &schema()).is_err());
    }

    #[test]
    fn rejects_non_object_body() {
        let err = RequestValidator::validate(Some(&json!([1, 2])), &schema()).unwrap_err();
        assert!(matches!(err, AppError::ValidationFailed(_)));
    }

    #[test]
    fn booleans_and_datetimes() {
        let s = ValidationSchema::new()
            .with("ok", FieldRule::new(FieldKind::Boolean))
            .with("at", FieldRule::new(FieldKind::DateTime));
        let out = RequestValidator::validate(Some(&json!({"ok": "true", "at": "2024-05-01T10:00:00Z"})), &s).unwrap();
        assert_eq!(out.get("ok"), Some(&json!(true)));
        assert_eq!(out.get("at"), Some(&json!("2024-05-01T10:00:00+00:00")));
    }
}
