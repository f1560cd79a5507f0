//! Entity types: attributes, relations and author-declared rules, fixed at startup.

use crate::inflect::to_snake_case;
use crate::model::schema::ValidationSchema;
use serde_json::Value;
use std::collections::HashSet;
use std::sync::{Arc, OnceLock};

/// Declared primitive kind of an attribute.
#[derive(Clone, Debug, PartialEq)]
pub enum AttributeKind {
    String,
    Integer,
    Float,
    Boolean,
    Date,
    DateTime,
    Email,
    /// Generated (UUID v4, simple form) when absent on create.
    UniqueId,
    Json,
    /// Element kind; `None` for untyped arrays.
    Array(Option<Box<AttributeKind>>),
}

#[derive(Clone, Debug)]
pub struct Attribute {
    pub name: String,
    pub kind: AttributeKind,
    pub required: bool,
    /// Enforced by the store across all nodes of the type.
    pub unique: bool,
    pub default: Option<Value>,
}

impl Attribute {
    pub fn new(name: impl Into<String>, kind: AttributeKind) -> Self {
        Attribute {
            name: name.into(),
            kind,
            required: false,
            unique: false,
            default: None,
        }
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub fn unique(mut self) -> Self {
        self.unique = true;
        self
    }

    pub fn default_value(mut self, value: Value) -> Self {
        self.default = Some(value);
        self
    }
}

/// Edge direction as seen from the node that declares the relation.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Direction {
    Outgoing,
    Incoming,
}

#[derive(Clone, Debug)]
pub struct RelationDef {
    /// Attribute name on the declaring type (e.g. `pets`).
    pub name: String,
    /// Edge label in the graph (e.g. `HAS_PET`).
    pub label: String,
    pub direction: Direction,
    /// Entity type name at the other end.
    pub target: String,
    /// Data carried by the edge itself, when the relation has a model.
    pub edge: Option<Arc<EntityType>>,
}

impl RelationDef {
    pub fn outgoing(name: impl Into<String>, label: impl Into<String>, target: impl Into<String>) -> Self {
        RelationDef {
            name: name.into(),
            label: label.into(),
            direction: Direction::Outgoing,
            target: target.into(),
            edge: None,
        }
    }

    pub fn incoming(name: impl Into<String>, label: impl Into<String>, target: impl Into<String>) -> Self {
        RelationDef {
            direction: Direction::Incoming,
            ..Self::outgoing(name, label, target)
        }
    }

    pub fn with_edge(mut self, edge: Arc<EntityType>) -> Self {
        self.edge = Some(edge);
        self
    }
}

#[derive(Debug)]
pub struct EntityType {
    name: String,
    attributes: Vec<Attribute>,
    relations: Vec<RelationDef>,
    rules: ValidationSchema,
    filtered_fields: HashSet<String>,
    inferred: OnceLock<ValidationSchema>,
}

impl EntityType {
    pub fn builder(name: impl Into<String>) -> EntityTypeBuilder {
        EntityTypeBuilder {
            name: name.into(),
            attributes: Vec::new(),
            relations: Vec::new(),
            rules: ValidationSchema::new(),
            filtered_fields: HashSet::new(),
        }
    }

    /// Type name; also the node label in the graph.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Lowercase name used as the response key (`User` -> `user`).
    pub fn model_name(&self) -> String {
        to_snake_case(&self.name)
    }

    pub fn attributes(&self) -> &[Attribute] {
        &self.attributes
    }

    pub fn attribute(&self, name: &str) -> Option<&Attribute> {
        self.attributes.iter().find(|a| a.name == name)
    }

    pub fn has_attribute(&self, name: &str) -> bool {
        self.attribute(name).is_some()
    }

    pub fn relations(&self) -> &[RelationDef] {
        &self.relations
    }

    pub fn relation(&self, name: &str) -> Option<&RelationDef> {
        self.relations.iter().find(|r| r.name == name)
    }

    pub fn is_relation(&self, name: &str) -> bool {
        self.relation(name).is_some()
    }

    /// Attribute names followed by relation names.
    pub fn declared_names(&self) -> impl Iterator<Item = &str> {
        self.attributes
            .iter()
            .map(|a| a.name.as_str())
            .chain(self.relations.iter().map(|r| r.name.as_str()))
    }

    pub fn unique_attributes(&self) -> impl Iterator<Item = &Attribute> {
        self.attributes.iter().filter(|a| a.unique)
    }

    /// Author-declared rules; empty when the type relies on inference.
    pub fn declared_rules(&self) -> &ValidationSchema {
        &self.rules
    }

    pub fn is_filtered(&self, name: &str) -> bool {
        self.filtered_fields.contains(name)
    }

    /// Effective validation rules (declared, or inferred once and cached).
    pub fn validation_rules(&self) -> &ValidationSchema {
        crate::service::rules_for(self)
    }

    pub(crate) fn inference_cache(&self) -> &OnceLock<ValidationSchema> {
        &self.inferred
    }
}

pub struct EntityTypeBuilder {
    name: String,
    attributes: Vec<Attribute>,
    relations: Vec<RelationDef>,
    rules: ValidationSchema,
    filtered_fields: HashSet<String>,
}

impl EntityTypeBuilder {
    pub fn attribute(mut self, attribute: Attribute) -> Self {
        self.attributes.push(attribute);
        self
    }

    pub fn relation(mut self, relation: RelationDef) -> Self {
        self.relations.push(relation);
        self
    }

    pub fn rules(mut self, rules: ValidationSchema) -> Self {
        self.rules = rules;
        self
    }

    /// Never serialized (secrets, hashes).
    pub fn filtered(mut self, name: impl Into<String>) -> Self {
        self.filtered_fields.insert(name.into());
        self
    }

    pub fn build(self) -> Arc<EntityType> {
        Arc::new(EntityType {
            name: self.name,
            attributes: self.attributes,
            relations: self.relations,
            rules: self.rules,
            filtered_fields: self.filtered_fields,
            inferred: OnceLock::new(),
        })
    }
}
