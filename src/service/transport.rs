//! Convert stored nodes into transport-safe maps.

use crate::model::EntityType;
use crate::store::{Properties, Related};
use serde_json::Value;

/// Internal bookkeeping keys never sent to clients.
const RESERVED: &[&str] = &["validation_rules"];

/// Declared attributes of `entity` that carry a value, minus relations, filtered and reserved names.
pub fn to_transport_map(entity: &EntityType, properties: &Properties) -> Properties {
    entity
        .declared_names()
        .filter(|name| !entity.is_relation(name))
        .filter(|name| !entity.is_filtered(name))
        .filter(|name| !RESERVED.contains(name))
        .filter_map(|name| match properties.get(name) {
            None | Some(Value::Null) => None,
            Some(v) => Some((name.to_string(), v.clone())),
        })
        .collect()
}

/// Serialize a node reached over a relation. When the relation has an edge type and the
/// edge carries data, it is added under `relationship`.
pub fn related_to_transport_map(entity: &EntityType, edge_type: Option<&EntityType>, related: &Related) -> Properties {
    let mut out = to_transport_map(entity, &related.node.properties);
    if let Some(edge_type) = edge_type {
        let edge = to_transport_map(edge_type, &related.edge.properties);
        if !edge.is_empty() {
            out.insert("relationship".into(), Value::Object(edge));
        }
    }
    out
}
