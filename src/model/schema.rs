//! Validation schema: per-field kind, required flag and constraints.

use std::collections::BTreeMap;

/// Validator kind applied to one inbound field.
#[derive(Clone, Debug, PartialEq)]
pub enum FieldKind {
    String,
    Integer,
    Float,
    Boolean,
    Date,
    DateTime,
    Email,
    Uuid,
    Dict,
    List(Box<FieldKind>),
    /// Accepts any JSON value unchanged.
    Raw,
}

/// Optional constraints on top of the kind check.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Constraints {
    pub format: Option<String>,
    pub max_length: Option<u32>,
    pub min_length: Option<u32>,
    pub pattern: Option<String>,
    pub allowed: Option<Vec<serde_json::Value>>,
    pub minimum: Option<f64>,
    pub maximum: Option<f64>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct FieldRule {
    pub kind: FieldKind,
    pub required: bool,
    pub constraints: Constraints,
}

impl FieldRule {
    pub fn new(kind: FieldKind) -> Self {
        FieldRule {
            kind,
            required: false,
            constraints: Constraints::default(),
        }
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub fn with_required(mut self, required: bool) -> Self {
        self.required = required;
        self
    }

    pub fn max_length(mut self, n: u32) -> Self {
        self.constraints.max_length = Some(n);
        self
    }

    pub fn min_length(mut self, n: u32) -> Self {
        self.constraints.min_length = Some(n);
        self
    }

    pub fn pattern(mut self, re: impl Into<String>) -> Self {
        self.constraints.pattern = Some(re.into());
        self
    }

    pub fn allowed(mut self, values: Vec<serde_json::Value>) -> Self {
        self.constraints.allowed = Some(values);
        self
    }

    pub fn range(mut self, minimum: Option<f64>, maximum: Option<f64>) -> Self {
        self.constraints.minimum = minimum;
        self.constraints.maximum = maximum;
        self
    }
}

/// Attribute name -> rule. Ordered so two schemas built from the same input compare equal.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ValidationSchema {
    fields: BTreeMap<String, FieldRule>,
}

impl ValidationSchema {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, name: impl Into<String>, rule: FieldRule) -> Self {
        self.fields.insert(name.into(), rule);
        self
    }

    pub fn insert(&mut self, name: impl Into<String>, rule: FieldRule) {
        self.fields.insert(name.into(), rule);
    }

    pub fn contains(&self, name: &str) -> bool {
        self.fields.contains_key(name)
    }

    pub fn get(&self, name: &str) -> Option<&FieldRule> {
        self.fields.get(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &FieldRule)> {
        self.fields.iter()
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}
