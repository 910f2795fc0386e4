//! Decoding parsed values into declared shapes.
//!
//! [`decode`] is a deterministic, recursive coercion from a generic
//! [`Value`] (usually the output of [`crate::dialect::parse_dialect`]) into
//! the shape a [`DeclaredType`] describes.  Coercion is permissive only where
//! no information is lost: numeric strings become numbers and yes/no tokens
//! become booleans, but `"2.5"` never becomes the integer `2`.

use serde_json::{Map, Number, Value};

use crate::dialect::{parse_dialect, parse_number};
use crate::error::{Result, SchemaError};
use crate::render::render_type;
use crate::types::{DeclaredType, Primitive, Record};

/// Decode `value` against `ty`, returning the coerced value.
pub fn decode(value: &Value, ty: &DeclaredType) -> Result<Value> {
    decode_at(value, ty, "$")
}

/// Parse `text` in the permissive dialect and decode it against `ty`.
pub fn decode_text(text: &str, ty: &DeclaredType) -> Result<Value> {
    let value = parse_dialect(text)?;
    decode(&value, ty)
}

/// Interpret a permissive boolean token.
pub fn parse_bool_token(token: &str) -> Option<bool> {
    match token.trim().to_ascii_lowercase().as_str() {
        "true" | "t" | "yes" | "y" | "on" | "enable" | "1" => Some(true),
        "false" | "f" | "no" | "n" | "off" | "disable" | "0" => Some(false),
        _ => None,
    }
}

// ---------------------------------------------------------------------------
// Recursive decoder
// ---------------------------------------------------------------------------

fn decode_at(value: &Value, ty: &DeclaredType, path: &str) -> Result<Value> {
    match ty {
        DeclaredType::Any => Ok(value.clone()),
        DeclaredType::Primitive(primitive) => decode_primitive(value, *primitive, ty, path),
        DeclaredType::Optional(inner) => {
            if value.is_null() {
                Ok(Value::Null)
            } else {
                decode_at(value, inner, path)
            }
        }
        DeclaredType::Union(branches) => {
            let mut reasons = Vec::with_capacity(branches.len());
            for branch in branches {
                match decode_at(value, branch, path) {
                    Ok(decoded) => return Ok(decoded),
                    Err(SchemaError::TypeMismatch { expected, reason, .. }) => {
                        reasons.push(format!("not {expected} ({reason})"));
                    }
                    Err(other) => return Err(other),
                }
            }
            Err(mismatch(path, ty, reasons.join("; ")))
        }
        DeclaredType::Literal(expected) => {
            if literal_matches(value, expected) {
                Ok(expected.clone())
            } else {
                Err(mismatch(path, ty, format!("got {}", describe(value))))
            }
        }
        DeclaredType::List(element) | DeclaredType::VariadicTuple(element) => {
            let items = expect_sequence(value, ty, path)?;
            decode_elements(items, element, path).map(Value::Array)
        }
        DeclaredType::Set(element) => {
            let items = expect_sequence(value, ty, path)?;
            let mut unique: Vec<Value> = Vec::with_capacity(items.len());
            for item in decode_elements(items, element, path)? {
                if !unique.contains(&item) {
                    unique.push(item);
                }
            }
            Ok(Value::Array(unique))
        }
        DeclaredType::Tuple(elements) => {
            let items = expect_sequence(value, ty, path)?;
            if items.len() != elements.len() {
                return Err(mismatch(
                    path,
                    ty,
                    format!("expected {} elements, got {}", elements.len(), items.len()),
                ));
            }
            items
                .iter()
                .zip(elements)
                .enumerate()
                .map(|(i, (item, element))| decode_at(item, element, &format!("{path}[{i}]")))
                .collect::<Result<Vec<_>>>()
                .map(Value::Array)
        }
        DeclaredType::Record(record) => decode_record(value, record, ty, path),
    }
}

fn decode_primitive(
    value: &Value,
    primitive: Primitive,
    ty: &DeclaredType,
    path: &str,
) -> Result<Value> {
    let fail = |reason: String| mismatch(path, ty, reason);

    match primitive {
        Primitive::String => match value {
            Value::String(_) => Ok(value.clone()),
            other => Err(fail(format!("got {}", describe(other)))),
        },
        Primitive::Null => match value {
            Value::Null => Ok(Value::Null),
            other => Err(fail(format!("got {}", describe(other)))),
        },
        Primitive::Integer => {
            let number = numeric(value).ok_or_else(|| fail(format!("got {}", describe(value))))?;
            integral(&number).ok_or_else(|| fail(format!("{number} is not a whole number")))
        }
        Primitive::Float => {
            if value.is_number() {
                return Ok(value.clone());
            }
            let number = numeric(value).ok_or_else(|| fail(format!("got {}", describe(value))))?;
            let float = number
                .as_f64()
                .and_then(Number::from_f64)
                .ok_or_else(|| fail(format!("{number} is not a finite number")))?;
            Ok(Value::Number(float))
        }
        Primitive::Boolean => match value {
            Value::Bool(_) => Ok(value.clone()),
            Value::Number(n) if n.as_f64() == Some(1.0) => Ok(Value::Bool(true)),
            Value::Number(n) if n.as_f64() == Some(0.0) => Ok(Value::Bool(false)),
            Value::String(s) => parse_bool_token(s)
                .map(Value::Bool)
                .ok_or_else(|| fail(format!("`{s}` is not a boolean token"))),
            other => Err(fail(format!("got {}", describe(other)))),
        },
    }
}

fn decode_record(value: &Value, record: &Record, ty: &DeclaredType, path: &str) -> Result<Value> {
    let Value::Object(map) = value else {
        return Err(mismatch(path, ty, format!("got {}", describe(value))));
    };

    if !record.extra
        && let Some(unknown) = map.keys().find(|k| record.get(k).is_none())
    {
        return Err(mismatch(path, ty, format!("unexpected field `{unknown}`")));
    }

    let mut out = Map::new();
    for field in &record.fields {
        match map.get(&field.name) {
            // An explicit null on an optional field reads as absent unless
            // the field type itself admits null.
            Some(Value::Null)
                if field.optional
                    && decode_at(&Value::Null, &field.ty, path).is_err() => {}
            Some(present) => {
                let decoded = decode_at(present, &field.ty, &field_path(path, &field.name))?;
                out.insert(field.name.clone(), decoded);
            }
            None if field.optional => {}
            None => {
                return Err(mismatch(
                    path,
                    ty,
                    format!("missing field `{}`", field.name),
                ));
            }
        }
    }
    if record.extra {
        for (key, extra) in map.iter().filter(|(k, _)| record.get(k).is_none()) {
            out.insert(key.clone(), extra.clone());
        }
    }
    Ok(Value::Object(out))
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn mismatch(path: &str, ty: &DeclaredType, reason: String) -> SchemaError {
    SchemaError::TypeMismatch {
        path: path.to_owned(),
        expected: render_type(ty),
        reason,
    }
}

fn expect_sequence<'a>(value: &'a Value, ty: &DeclaredType, path: &str) -> Result<&'a [Value]> {
    match value {
        Value::Array(items) => Ok(items),
        other => Err(mismatch(path, ty, format!("got {}", describe(other)))),
    }
}

fn decode_elements(items: &[Value], element: &DeclaredType, path: &str) -> Result<Vec<Value>> {
    items
        .iter()
        .enumerate()
        .map(|(i, item)| decode_at(item, element, &format!("{path}[{i}]")))
        .collect()
}

fn field_path(path: &str, name: &str) -> String {
    let plain = name
        .chars()
        .all(|c| c.is_alphanumeric() || c == '_');
    if plain && !name.is_empty() {
        format!("{path}.{name}")
    } else {
        format!("{path}[{}]", Value::from(name))
    }
}

/// A number, or a string that reads as one.
fn numeric(value: &Value) -> Option<Number> {
    match value {
        Value::Number(n) => Some(n.clone()),
        Value::String(s) => match parse_number(s.trim()) {
            Some(Value::Number(n)) => Some(n),
            _ => None,
        },
        _ => None,
    }
}

/// The number as an exact integer, if it has no fractional part.
fn integral(number: &Number) -> Option<Value> {
    if number.is_i64() || number.is_u64() {
        return Some(Value::Number(number.clone()));
    }
    let float = number.as_f64()?;
    let in_range = float.is_finite() && float.fract() == 0.0 && float.abs() < 9.007_199_254_740_992e15;
    in_range.then(|| Value::from(float as i64))
}

fn literal_matches(value: &Value, expected: &Value) -> bool {
    match (value, expected) {
        (Value::Number(a), Value::Number(b)) => a == b || a.as_f64() == b.as_f64(),
        _ => value == expected,
    }
}

/// Short human-readable description of a value for error messages.
fn describe(value: &Value) -> String {
    let kind = match value {
        Value::Null => return "null".to_owned(),
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "list",
        Value::Object(_) => "mapping",
    };
    let mut preview = value.to_string();
    if preview.chars().count() > 40 {
        preview = preview.chars().take(37).collect::<String>() + "...";
    }
    format!("{kind} {preview}")
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
