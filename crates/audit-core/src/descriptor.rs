use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Cardinality {
    Single,
    Many,
}

/// Navigation from one entity type to another
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RelationDescriptor {
    pub name: String,
    pub cardinality: Cardinality,

    /// Type name of the related entity
    pub target: String,
}

/// Statically declared shape of an entity type.
///
/// Every type taking part in an audit registers one descriptor with its
/// fields, key composition and navigations. Snapshots are validated against it
/// and the diffing code never looks at anything else.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct EntityDescriptor {
    #[serde(rename = "type")]
    pub type_name: String,

    /// Whether entities of this type opt into auditing
    #[serde(default = "default_auditable")]
    pub auditable: bool,

    /// Declared fields, in declaration order
    pub fields: Vec<String>,

    /// Primary key fields, in key composition order
    #[serde(default)]
    pub primary_key: Vec<String>,

    /// Foreign key fields, in declaration order
    #[serde(default)]
    pub foreign_keys: Vec<String>,

    #[serde(default)]
    pub relations: Vec<RelationDescriptor>,
}

fn default_auditable() -> bool {
    true
}

/// Characters that structure nested change keys (`Parent.Relation[key].field`)
const RESERVED_CHARS: [char; 3] = ['.', '[', ']'];

fn check_name(type_name: &str, kind: &str, name: &str) -> Result<()> {
    if name.contains(&RESERVED_CHARS[..]) {
        return Err(Error::Descriptor(format!(
            "'{}' {} '{}' must not contain '.', '[' or ']'",
            type_name, kind, name
        )));
    }
    Ok(())
}

impl EntityDescriptor {
    pub fn new(type_name: impl Into<String>) -> Self {
        Self {
            type_name: type_name.into(),
            auditable: true,
            fields: Vec::new(),
            primary_key: Vec::new(),
            foreign_keys: Vec::new(),
            relations: Vec::new(),
        }
    }

    pub fn field(mut self, name: impl Into<String>) -> Self {
        self.fields.push(name.into());
        self
    }

    /// Declare a primary key field. Calling it repeatedly builds a composite key.
    pub fn key(mut self, name: impl Into<String>) -> Self {
        let name = name.into();
        self.fields.push(name.clone());
        self.primary_key.push(name);
        self
    }

    pub fn foreign_key(mut self, name: impl Into<String>) -> Self {
        let name = name.into();
        self.fields.push(name.clone());
        self.foreign_keys.push(name);
        self
    }

    pub fn relation(
        mut self,
        name: impl Into<String>,
        cardinality: Cardinality,
        target: impl Into<String>,
    ) -> Self {
        self.relations.push(RelationDescriptor {
            name: name.into(),
            cardinality,
            target: target.into(),
        });
        self
    }

    pub fn not_auditable(mut self) -> Self {
        self.auditable = false;
        self
    }

    pub fn has_field(&self, name: &str) -> bool {
        self.fields.iter().any(|f| f == name)
    }

    pub fn find_relation(&self, name: &str) -> Option<&RelationDescriptor> {
        self.relations.iter().find(|r| r.name == name)
    }

    pub fn validate(&self) -> Result<()> {
        if self.type_name.trim().is_empty() {
            return Err(Error::Descriptor("type name must not be empty".to_string()));
        }
        check_name(&self.type_name, "type name", &self.type_name)?;

        let mut seen = HashSet::new();
        for field in &self.fields {
            check_name(&self.type_name, "field", field)?;
            if !seen.insert(field.as_str()) {
                return Err(Error::Descriptor(format!(
                    "'{}' declares field '{}' twice",
                    self.type_name, field
                )));
            }
        }

        for key in self.primary_key.iter().chain(self.foreign_keys.iter()) {
            if !seen.contains(key.as_str()) {
                return Err(Error::Descriptor(format!(
                    "'{}' uses undeclared key field '{}'",
                    self.type_name, key
                )));
            }
        }

        let mut fk_seen = HashSet::new();
        for fk in &self.foreign_keys {
            if !fk_seen.insert(fk.as_str()) {
                return Err(Error::Descriptor(format!(
                    "'{}' declares foreign key '{}' twice",
                    self.type_name, fk
                )));
            }
        }

        let mut relation_seen = HashSet::new();
        for relation in &self.relations {
            let name = relation.name.as_str();
            check_name(&self.type_name, "relation", name)?;
            if seen.contains(name) || !relation_seen.insert(name) {
                return Err(Error::Descriptor(format!(
                    "'{}' relation '{}' clashes with another member",
                    self.type_name, relation.name
                )));
            }
        }

        Ok(())
    }
}

/// Registry of entity descriptors keyed by type name
#[derive(Debug, Clone, Default)]
pub struct DescriptorRegistry {
    descriptors: HashMap<String, Arc<EntityDescriptor>>,
}

impl DescriptorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a descriptor. Each type may only be registered once.
    pub fn register(&mut self, descriptor: EntityDescriptor) -> Result<Arc<EntityDescriptor>> {
        descriptor.validate()?;

        if self.descriptors.contains_key(&descriptor.type_name) {
            return Err(Error::Descriptor(format!(
                "Entity type '{}' already registered",
                descriptor.type_name
            )));
        }

        let descriptor = Arc::new(descriptor);
        self.descriptors
            .insert(descriptor.type_name.clone(), descriptor.clone());
        Ok(descriptor)
    }

    /// Get a descriptor by type name
    pub fn get(&self, type_name: &str) -> Result<Arc<EntityDescriptor>> {
        self.descriptors
            .get(type_name)
            .cloned()
            .ok_or_else(|| Error::Descriptor(format!("Entity type '{}' not registered", type_name)))
    }

    pub fn contains(&self, type_name: &str) -> bool {
        self.descriptors.contains_key(type_name)
    }

    pub fn len(&self) -> usize {
        self.descriptors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.descriptors.is_empty()
    }

    /// List all registered type names, sorted
    pub fn type_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.descriptors.keys().cloned().collect();
        names.sort();
        names
    }
}
