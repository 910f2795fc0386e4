//! Rendering declared types and operation signatures into prompt notation.
//!
//! | Type | Notation |
//! |------|----------|
//! | primitive | `string`, `int`, `float`, `bool`, `null` |
//! | optional | `T?` (`(A|B)?` for unions) |
//! | union | `A|B` |
//! | literal | `"text"`, `3`, `true` |
//! | list / tuple / set | `[T]` / `(A, B)` / `{T}` |
//! | variadic tuple | `(T, ...)` |
//! | record | `Name{field: T, opt?: T, ...}` |
//! | any | `any` |
//!
//! Rendering is a pure function of its input.

use serde_json::Value;

use crate::operation::{Operation, Task};
use crate::types::{DeclaredType, Record};

/// Render a declared type in compact notation.
pub fn render_type(ty: &DeclaredType) -> String {
    let mut out = String::new();
    write_type(&mut out, ty);
    out
}

/// Render `name(param: Type, ...) -> Result`.
///
/// Parameters typed `any` render as a bare name, and an `any` result omits
/// the arrow, mirroring an unannotated signature.
pub fn render_signature(operation: &Operation) -> String {
    let params: Vec<String> = operation
        .params()
        .iter()
        .map(|p| {
            if p.ty.is_any() {
                p.name.clone()
            } else {
                format!("{}: {}", p.name, render_type(&p.ty))
            }
        })
        .collect();

    let mut signature = format!("{}({})", operation.name(), params.join(", "));
    if !operation.result_type().is_any() {
        signature.push_str(" -> ");
        signature.push_str(&render_type(operation.result_type()));
    }
    signature
}

/// Render the task description shown to the model.
///
/// Typed tasks list the signature, instruction and bound arguments:
///
/// ```text
/// def: list_people(text: string) -> [string]
/// doc: List the people mentioned.
/// args: {
///     text: "John and Mary went to the store."
/// }
/// ```
///
/// Untyped tasks list the instruction followed by the raw arguments.
pub fn render_task(task: &Task) -> String {
    let operation = task.operation();
    let instruction = task.instruction();

    if !operation.is_typed() {
        let raw = task.raw_arguments();
        let named = Value::Object(raw.named.clone());
        return format!(
            "task: {instruction}\nargs: {}\nkwargs: {named}",
            Value::Array(raw.positional.clone()),
        );
    }

    let mut lines = vec![
        format!("def: {}", render_signature(operation)),
        format!("doc: {instruction}"),
    ];
    if !task.arguments().is_empty() {
        lines.push("args: {".to_owned());
        lines.extend(
            task.arguments()
                .iter()
                .map(|(name, value)| format!("\t{name}: {value}")),
        );
        lines.push("}".to_owned());
    }
    lines.join("\n")
}

fn write_type(out: &mut String, ty: &DeclaredType) {
    match ty {
        DeclaredType::Primitive(p) => out.push_str(p.name()),
        DeclaredType::Any => out.push_str("any"),
        DeclaredType::Optional(inner) => {
            if matches!(inner.as_ref(), DeclaredType::Union(branches) if branches.len() > 1) {
                out.push('(');
                write_type(out, inner);
                out.push(')');
            } else {
                write_type(out, inner);
            }
            out.push('?');
        }
        DeclaredType::Union(branches) => {
            for (i, branch) in branches.iter().enumerate() {
                if i > 0 {
                    out.push('|');
                }
                write_type(out, branch);
            }
        }
        DeclaredType::Literal(value) => out.push_str(&value.to_string()),
        DeclaredType::List(inner) => {
            out.push('[');
            write_type(out, inner);
            out.push(']');
        }
        DeclaredType::Set(inner) => {
            out.push('{');
            write_type(out, inner);
            out.push('}');
        }
        DeclaredType::Tuple(elements) => {
            out.push('(');
            for (i, element) in elements.iter().enumerate() {
                if i > 0 {
                    out.push_str(", ");
                }
                write_type(out, element);
            }
            // A lone element needs a trailing comma to stay a tuple.
            if elements.len() == 1 {
                out.push(',');
            }
            out.push(')');
        }
        DeclaredType::VariadicTuple(inner) => {
            out.push('(');
            write_type(out, inner);
            out.push_str(", ...)");
        }
        DeclaredType::Record(record) => write_record(out, record),
    }
}

fn write_record(out: &mut String, record: &Record) {
    if let Some(name) = &record.name {
        out.push_str(name);
    }
    out.push('{');
    let mut first = true;
    for field in &record.fields {
        if !first {
            out.push_str(", ");
        }
        first = false;
        write_key(out, &field.name);
        if field.optional {
            out.push('?');
        }
        out.push_str(": ");
        write_type(out, &field.ty);
    }
    if record.extra {
        if !first {
            out.push_str(", ");
        }
        out.push_str("...");
    }
    out.push('}');
}

/// Field names that are not plain identifiers are quoted.
fn write_key(out: &mut String, key: &str) {
    let plain = !key.is_empty()
        && key
            .chars()
            .all(|c| c.is_alphanumeric() || c == '_' || c == '-')
        && !key.starts_with(|c: char| c.is_ascii_digit());
    if plain {
        out.push_str(key);
    } else {
        out.push_str(&serde_json::Value::String(key.to_owned()).to_string());
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
