//! Derive a validation schema from declared attributes when the type has no explicit rules.

use crate::model::{Attribute, AttributeKind, EntityType, FieldKind, FieldRule, ValidationSchema};

/// Effective rules for `entity`.
///
/// Explicit rules win unchanged. Otherwise the inferred schema is computed on first use and
/// cached on the type; concurrent first calls may both compute it, yielding the same value.
pub fn rules_for(entity: &EntityType) -> &ValidationSchema {
    let declared = entity.declared_rules();
    if !declared.is_empty() {
        return declared;
    }
    entity
        .inference_cache()
        .get_or_init(|| infer_missing(entity.attributes(), declared))
}

/// `declared` plus one inferred rule per attribute it does not already cover.
pub(crate) fn infer_missing(attributes: &[Attribute], declared: &ValidationSchema) -> ValidationSchema {
    let mut schema = declared.clone();
    for attr in attributes {
        if schema.contains(&attr.name) {
            continue;
        }
        schema.insert(
            attr.name.clone(),
            FieldRule::new(field_kind(&attr.kind)).with_required(attr.required),
        );
    }
    schema
}

fn field_kind(kind: &AttributeKind) -> FieldKind {
    match kind {
        AttributeKind::String => FieldKind::String,
        AttributeKind::Integer => FieldKind::Integer,
        AttributeKind::Float => FieldKind::Float,
        AttributeKind::Boolean => FieldKind::Boolean,
        AttributeKind::Date => FieldKind::Date,
        AttributeKind::DateTime => FieldKind::DateTime,
        AttributeKind::Email => FieldKind::Email,
        AttributeKind::UniqueId => FieldKind::Uuid,
        AttributeKind::Json => FieldKind::Dict,
        AttributeKind::Array(inner) => FieldKind::List(Box::new(
            inner.as_deref().map(field_kind).unwrap_or(FieldKind::Raw),
        )),
    }
}
