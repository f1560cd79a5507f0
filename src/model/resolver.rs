//! Resolve path segments into what a request addresses. Pure: never touches storage.

use crate::error::AppError;
use crate::model::descriptor::ResourceDescriptor;
use crate::model::types::{AttributeKind, EntityType};
use serde_json::Value;
use std::sync::Arc;

#[derive(Clone, Debug)]
pub struct PrimaryAddress {
    pub entity: Arc<EntityType>,
    pub model_name: String,
    pub selection_field: String,
    pub id: Option<String>,
}

impl PrimaryAddress {
    /// Path id typed after the selection attribute, if an id was given.
    pub fn id_value(&self) -> Option<Value> {
        self.id
            .as_deref()
            .map(|id| selection_value(&self.entity, &self.selection_field, id))
    }
}

#[derive(Clone, Debug)]
pub struct SecondaryAddress {
    /// Relation name as it appears in the path (e.g. `pets`).
    pub name: String,
    pub entity: Arc<EntityType>,
    pub selection_field: String,
    pub id: Option<String>,
}

impl SecondaryAddress {
    pub fn id_value(&self) -> Option<Value> {
        self.id
            .as_deref()
            .map(|id| selection_value(&self.entity, &self.selection_field, id))
    }
}

#[derive(Clone, Debug)]
pub struct AddressingContext {
    pub primary: PrimaryAddress,
    pub secondary: Option<SecondaryAddress>,
}

/// Build the addressing context for one request.
///
/// An unknown relation name fails with [`AppError::RelationNotFound`] before anything else
/// happens. A secondary id without a relation name is ignored.
pub fn resolve(
    descriptor: &ResourceDescriptor,
    primary_id: Option<&str>,
    secondary_name: Option<&str>,
    secondary_id: Option<&str>,
) -> Result<AddressingContext, AppError> {
    let entity = descriptor.primary().clone();
    let primary = PrimaryAddress {
        model_name: entity.model_name(),
        entity,
        selection_field: descriptor.selection_field().to_string(),
        id: primary_id.map(decode_segment),
    };

    let secondary = match secondary_name {
        None => None,
        Some(raw) => {
            let name = decode_segment(raw);
            let binding = descriptor.secondary(&name).ok_or(AppError::RelationNotFound)?;
            Some(SecondaryAddress {
                entity: binding.entity.clone(),
                selection_field: binding.selection_field.clone(),
                id: secondary_id.map(decode_segment),
                name,
            })
        }
    };

    Ok(AddressingContext { primary, secondary })
}

/// Percent-decode whatever escapes survived routing and trim surrounding whitespace.
pub fn decode_segment(raw: &str) -> String {
    let bytes = raw.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' && i + 2 < bytes.len() {
            if let (Some(hi), Some(lo)) = (hex_value(bytes[i + 1]), hex_value(bytes[i + 2])) {
                out.push(hi << 4 | lo);
                i += 3;
                continue;
            }
        }
        out.push(bytes[i]);
        i += 1;
    }
    let decoded = match String::from_utf8(out) {
        Ok(s) => s,
        Err(e) => String::from_utf8_lossy(e.as_bytes()).into_owned(),
    };
    decoded.trim().to_string()
}

fn hex_value(b: u8) -> Option<u8> {
    match b {
        b'0'..=b'9' => Some(b - b'0'),
        b'a'..=b'f' => Some(b - b'a' + 10),
        b'A'..=b'F' => Some(b - b'A' + 10),
        _ => None,
    }
}

/// Type a path id after the attribute it selects on, falling back to the raw string.
pub fn selection_value(entity: &EntityType, field: &str, raw: &str) -> Value {
    let kind = entity.attribute(field).map(|a| &a.kind);
    match kind {
        Some(AttributeKind::Integer) => raw
            .parse::<i64>()
            .map(|n| Value::Number(n.into()))
            .unwrap_or_else(|_| Value::String(raw.to_string())),
        Some(AttributeKind::Float) => raw
            .parse::<f64>()
            .ok()
            .and_then(serde_json::Number::from_f64)
            .map(Value::Number)
            .unwrap_or_else(|| Value::String(raw.to_string())),
        Some(AttributeKind::Boolean) if raw.eq_ignore_ascii_case("true") => Value::Bool(true),
        Some(AttributeKind::Boolean) if raw.eq_ignore_ascii_case("false") => Value::Bool(false),
        _ => Value::String(raw.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::types::{Attribute, RelationDef};

    fn descriptor() -> ResourceDescriptor {
        let pet = EntityType::builder("Pet")
            .attribute(Attribute::new("pet_id", AttributeKind::UniqueId))
            .build();
        let user = EntityType::builder("User")
            .attribute(Attribute::new("uid", AttributeKind::UniqueId))
            .attribute(Attribute::new("age", AttributeKind::Integer))
            .relation(RelationDef::outgoing("pets", "HAS_PET", "Pet"))
            .build();
        ResourceDescriptor::builder("users", user, "uid")
            .secondary("pets", pet, "pet_id")
            .build()
            .unwrap()
    }

    #[test]
    fn primary_only() {
        let ctx = resolve(&descriptor(), Some("abc"), None, None).unwrap();
        assert_eq!(ctx.primary.model_name, "user");
        assert_eq!(ctx.primary.selection_field, "uid");
        assert_eq!(ctx.primary.id.as_deref(), Some("abc"));
        assert!(ctx.secondary.is_none());
    }

    #[test]
    fn resolves_secondary_binding() {
        let ctx = resolve(&descriptor(), Some("abc"), Some("pets"), Some("p%201")).unwrap();
        let sec = ctx.secondary.unwrap();
        assert_eq!(sec.name, "pets");
        assert_eq!(sec.selection_field, "pet_id");
        assert_eq!(sec.entity.name(), "Pet");
        assert_eq!(sec.id.as_deref(), Some("p 1"));
    }

    #[test]
    fn unknown_relation_fails() {
        let err = resolve(&descriptor(), Some("abc"), Some("cars"), Some("1")).unwrap_err();
        assert!(matches!(err, AppError::RelationNotFound));
    }

    #[test]
    fn decode_leaves_invalid_escapes() {
        assert_eq!(decode_segment("a%2Fb"), "a/b");
        assert_eq!(decode_segment("100%"), "100%");
        assert_eq!(decode_segment("%zz"), "%zz");
        assert_eq!(decode_segment("  x "), "x");
    }

    #[test]
    fn selection_value_follows_attribute_kind() {
        let d = descriptor();
        assert_eq!(selection_value(d.primary(), "age", "42"), Value::from(42));
        assert_eq!(selection_value(d.primary(), "age", "x"), Value::from("x"));
        assert_eq!(selection_value(d.primary(), "uid", "42"), Value::from("42"));
    }
}
