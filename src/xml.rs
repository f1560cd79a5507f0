//! Minimal JSON-to-XML encoder producing dicttoxml-shaped documents:
//! `<root>` wrapping one typed element per key, list entries as `<item>`.

use serde_json::Value;

const DECLARATION: &str = r#"<?xml version="1.0" encoding="UTF-8" ?>"#;

pub fn to_xml(value: &Value) -> String {
    let mut out = String::from(DECLARATION);
    out.push_str("<root>");
    match value {
        Value::Object(map) => {
            for (k, v) in map {
                element(&mut out, k, v);
            }
        }
        Value::Array(items) => {
            for v in items {
                element(&mut out, "item", v);
            }
        }
        other => out.push_str(&escape(&scalar_text(other))),
    }
    out.push_str("</root>");
    out
}

fn element(out: &mut String, key: &str, value: &Value) {
    let (tag, name_attr) = if is_xml_name(key) {
        (key, String::new())
    } else {
        ("key", format!(r#" name="{}""#, escape(key)))
    };
    out.push_str(&format!(r#"<{}{} type="{}">"#, tag, name_attr, type_name(value)));
    match value {
        Value::Object(map) => {
            for (k, v) in map {
                element(out, k, v);
            }
        }
        Value::Array(items) => {
            for v in items {
                element(out, "item", v);
            }
        }
        other => out.push_str(&escape(&scalar_text(other))),
    }
    out.push_str(&format!("</{}>", tag));
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(n) if n.is_i64() || n.is_u64() => "int",
        Value::Number(_) => "float",
        Value::String(_) => "str",
        Value::Array(_) => "list",
        Value::Object(_) => "dict",
    }
}

fn scalar_text(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn is_xml_name(key: &str) -> bool {
    let mut chars = key.chars();
    match chars.next() {
        Some(c) if c.is_alphabetic() || c == '_' => {}
        _ => return false,
    }
    !key.to_ascii_lowercase().starts_with("xml")
        && chars.all(|c| c.is_alphanumeric() || matches!(c, '_' | '-' | '.'))
}

fn escape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            _ => out.push(c),
        }
    }
    out
}
