//! Resource descriptors: primary type, named secondary types and their selection fields.

use crate::error::ConfigError;
use crate::model::types::EntityType;
use std::collections::BTreeMap;
use std::sync::Arc;

/// A secondary (related) type reachable from the primary under a relation name.
#[derive(Clone, Debug)]
pub struct SecondaryBinding {
    pub entity: Arc<EntityType>,
    pub selection_field: String,
}

#[derive(Clone, Debug)]
pub struct ResourceDescriptor {
    path: String,
    primary: Arc<EntityType>,
    selection_field: String,
    secondary: BTreeMap<String, SecondaryBinding>,
}

impl ResourceDescriptor {
    /// Start a descriptor mounted at `/<path>`.
    pub fn builder(
        path: impl Into<String>,
        primary: Arc<EntityType>,
        selection_field: impl Into<String>,
    ) -> ResourceDescriptorBuilder {
        ResourceDescriptorBuilder {
            path: path.into(),
            primary,
            selection_field: selection_field.into(),
            secondary: BTreeMap::new(),
        }
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn primary(&self) -> &Arc<EntityType> {
        &self.primary
    }

    pub fn selection_field(&self) -> &str {
        &self.selection_field
    }

    pub fn secondary(&self, relation: &str) -> Option<&SecondaryBinding> {
        self.secondary.get(relation)
    }
}

pub struct ResourceDescriptorBuilder {
    path: String,
    primary: Arc<EntityType>,
    selection_field: String,
    secondary: BTreeMap<String, SecondaryBinding>,
}

impl ResourceDescriptorBuilder {
    pub fn secondary(
        mut self,
        relation: impl Into<String>,
        entity: Arc<EntityType>,
        selection_field: impl Into<String>,
    ) -> Self {
        self.secondary.insert(
            relation.into(),
            SecondaryBinding {
                entity,
                selection_field: selection_field.into(),
            },
        );
        self
    }

    pub fn build(self) -> Result<ResourceDescriptor, ConfigError> {
        let path = self.path.trim_matches('/').to_string();
        if path.is_empty() || path.contains('/') || path.starts_with(':') {
            return Err(ConfigError::InvalidPath(self.path));
        }
        check_selection_field(&self.primary, &self.selection_field)?;
        for (name, binding) in &self.secondary {
            check_selection_field(&binding.entity, &binding.selection_field)?;
            check_relation_target(&self.primary, name, &binding.entity)?;
        }
        Ok(ResourceDescriptor {
            path,
            primary: self.primary,
            selection_field: self.selection_field,
            secondary: self.secondary,
        })
    }
}

/// A bound relation the primary declares must point at the bound type.
fn check_relation_target(primary: &EntityType, name: &str, bound: &EntityType) -> Result<(), ConfigError> {
    match primary.relation(name) {
        Some(relation) if relation.target != bound.name() => Err(ConfigError::SecondaryMismatch {
            entity: primary.name().to_string(),
            relation: name.to_string(),
            expected: relation.target.clone(),
            found: bound.name().to_string(),
        }),
        _ => Ok(()),
    }
}

fn check_selection_field(entity: &EntityType, field: &str) -> Result<(), ConfigError> {
    if entity.has_attribute(field) {
        Ok(())
    } else {
        Err(ConfigError::UnknownSelectionField {
            entity: entity.name().to_string(),
            field: field.to_string(),
        })
    }
}
