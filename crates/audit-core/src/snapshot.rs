use crate::{Cardinality, DescriptorRegistry, EntityDescriptor, Error, KeyEntry, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// Lifecycle state of a tracked entity
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum EntityState {
    Added,
    Modified,
    Deleted,
    Unchanged,
}

impl EntityState {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityState::Added => "Added",
            EntityState::Modified => "Modified",
            EntityState::Deleted => "Deleted",
            EntityState::Unchanged => "Unchanged",
        }
    }

    /// Added, Modified or Deleted
    pub fn has_changes(&self) -> bool {
        !matches!(self, EntityState::Unchanged)
    }
}

impl fmt::Display for EntityState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Original and current value of one field
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct FieldValue {
    #[serde(default)]
    pub original: Option<String>,
    #[serde(default)]
    pub current: Option<String>,
}

static ABSENT_FIELD: FieldValue = FieldValue {
    original: None,
    current: None,
};

impl FieldValue {
    pub fn new(original: Option<&str>, current: Option<&str>) -> Self {
        Self {
            original: original.map(str::to_string),
            current: current.map(str::to_string),
        }
    }

    pub fn current(value: &str) -> Self {
        Self::new(None, Some(value))
    }

    pub fn changed(original: &str, current: &str) -> Self {
        Self::new(Some(original), Some(current))
    }

    pub fn unchanged(value: &str) -> Self {
        Self::new(Some(value), Some(value))
    }
}

/// Handle of a snapshot inside a [`ChangeSet`]
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(transparent)]
pub struct EntityRef(usize);

impl EntityRef {
    pub fn index(&self) -> usize {
        self.0
    }
}

impl fmt::Display for EntityRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelationValue {
    pub name: String,
    pub cardinality: Cardinality,
    pub targets: Vec<EntityRef>,

    /// Unloaded navigations are not walked
    pub loaded: bool,
}

/// Immutable point-in-time view of one tracked entity
#[derive(Debug, Clone)]
pub struct EntitySnapshot {
    descriptor: Arc<EntityDescriptor>,
    state: EntityState,
    values: HashMap<String, FieldValue>,
    relations: Vec<RelationValue>,
}

impl EntitySnapshot {
    pub fn new(descriptor: Arc<EntityDescriptor>, state: EntityState) -> Self {
        let relations = descriptor
            .relations
            .iter()
            .map(|r| RelationValue {
                name: r.name.clone(),
                cardinality: r.cardinality,
                targets: Vec::new(),
                loaded: true,
            })
            .collect();

        Self {
            descriptor,
            state,
            values: HashMap::new(),
            relations,
        }
    }

    pub fn with_value(mut self, field: impl Into<String>, value: FieldValue) -> Self {
        self.values.insert(field.into(), value);
        self
    }

    /// Mark a navigation as not loaded
    pub fn with_unloaded(mut self, relation: &str) -> Self {
        if let Some(r) = self.relations.iter_mut().find(|r| r.name == relation) {
            r.loaded = false;
        }
        self
    }

    pub fn descriptor(&self) -> &EntityDescriptor {
        &self.descriptor
    }

    pub fn type_name(&self) -> &str {
        &self.descriptor.type_name
    }

    pub fn state(&self) -> EntityState {
        self.state
    }

    pub fn relations(&self) -> &[RelationValue] {
        &self.relations
    }

    pub fn value(&self, field: &str) -> &FieldValue {
        self.values.get(field).unwrap_or(&ABSENT_FIELD)
    }

    pub fn current(&self, field: &str) -> Option<&str> {
        self.value(field).current.as_deref()
    }

    /// All declared fields with their values, in declaration order
    pub fn fields(&self) -> impl Iterator<Item = (&str, &FieldValue)> {
        self.descriptor
            .fields
            .iter()
            .map(move |f| (f.as_str(), self.value(f)))
    }

    /// Current primary key value.
    ///
    /// `None` when the type declares no key. Composite keys join their
    /// components with `-`, absent components contributing an empty string.
    pub fn primary_key(&self) -> Option<String> {
        match self.descriptor.primary_key.as_slice() {
            [] => None,
            [single] => self.current(single).map(str::to_string),
            fields => Some(
                fields
                    .iter()
                    .map(|f| self.current(f).unwrap_or_default())
                    .collect::<Vec<_>>()
                    .join("-"),
            ),
        }
    }

    pub fn primary_key_name(&self) -> Option<&str> {
        self.descriptor.primary_key.first().map(String::as_str)
    }

    /// Current foreign key values, in declaration order
    pub fn foreign_keys(&self) -> Vec<KeyEntry> {
        self.descriptor
            .foreign_keys
            .iter()
            .map(|fk| KeyEntry::new(fk, self.current(fk)))
            .collect()
    }

    fn relation_mut(&mut self, name: &str) -> Option<&mut RelationValue> {
        self.relations.iter_mut().find(|r| r.name == name)
    }
}

/// Arena of snapshots materialized from one unit of work
#[derive(Debug, Clone, Default)]
pub struct ChangeSet {
    entities: Vec<EntitySnapshot>,
}

impl ChangeSet {
    pub fn get(&self, entity: EntityRef) -> Result<&EntitySnapshot> {
        self.entities.get(entity.0).ok_or_else(|| {
            Error::MalformedGraph(format!(
                "entity {} does not exist (change set holds {})",
                entity,
                self.entities.len()
            ))
        })
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (EntityRef, &EntitySnapshot)> {
        self.entities
            .iter()
            .enumerate()
            .map(|(idx, snapshot)| (EntityRef(idx), snapshot))
    }

    /// Entities whose type opts into auditing, in insertion order
    pub fn auditable_entries(&self) -> Vec<EntityRef> {
        self.iter()
            .filter(|(_, snapshot)| snapshot.descriptor().auditable)
            .map(|(entity, _)| entity)
            .collect()
    }

    pub fn from_document(doc: &ChangeSetDocument, registry: &DescriptorRegistry) -> Result<Self> {
        let mut builder = ChangeSetBuilder::new();

        for entity in &doc.entities {
            let descriptor = registry.get(&entity.type_name)?;
            let mut snapshot = EntitySnapshot::new(descriptor, entity.state);
            for (field, value) in &entity.fields {
                snapshot = snapshot.with_value(field.clone(), value.clone());
            }
            for relation in entity.relations.iter().filter(|r| !r.loaded) {
                snapshot = snapshot.with_unloaded(&relation.name);
            }
            builder.push(snapshot)?;
        }

        for (idx, entity) in doc.entities.iter().enumerate() {
            for relation in &entity.relations {
                for &target in &relation.targets {
                    builder.link(EntityRef(idx), &relation.name, EntityRef(target))?;
                }
            }
        }

        Ok(builder.build())
    }
}

/// Assembles a [`ChangeSet`], checking every snapshot and link against the
/// descriptors.
#[derive(Debug, Default)]
pub struct ChangeSetBuilder {
    entities: Vec<EntitySnapshot>,
}

impl ChangeSetBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, snapshot: EntitySnapshot) -> Result<EntityRef> {
        if let Some(field) = snapshot
            .values
            .keys()
            .find(|f| !snapshot.descriptor.has_field(f))
        {
            return Err(Error::MalformedGraph(format!(
                "'{}' has no field '{}'",
                snapshot.type_name(),
                field
            )));
        }

        self.entities.push(snapshot);
        Ok(EntityRef(self.entities.len() - 1))
    }

    /// Point `relation` of `from` at `to`
    pub fn link(&mut self, from: EntityRef, relation: &str, to: EntityRef) -> Result<()> {
        let target_type = self
            .entities
            .get(to.0)
            .map(|s| s.type_name().to_string())
            .ok_or_else(|| Error::MalformedGraph(format!("link target {} does not exist", to)))?;

        let source = self
            .entities
            .get_mut(from.0)
            .ok_or_else(|| Error::MalformedGraph(format!("link source {} does not exist", from)))?;
        let source_type = source.type_name().to_string();

        let expected = source
            .descriptor
            .find_relation(relation)
            .map(|r| r.target.clone())
            .ok_or_else(|| {
                Error::MalformedGraph(format!("'{}' has no relation '{}'", source_type, relation))
            })?;

        if expected != target_type {
            return Err(Error::MalformedGraph(format!(
                "'{}.{}' expects '{}' but {} is '{}'",
                source_type, relation, expected, to, target_type
            )));
        }

        let value = source.relation_mut(relation).ok_or_else(|| {
            Error::MalformedGraph(format!("'{}' has no relation '{}'", source_type, relation))
        })?;

        if value.cardinality == Cardinality::Single && !value.targets.is_empty() {
            return Err(Error::MalformedGraph(format!(
                "'{}.{}' is single-valued and already linked",
                source_type, relation
            )));
        }

        value.targets.push(to);
        Ok(())
    }

    pub fn build(self) -> ChangeSet {
        ChangeSet {
            entities: self.entities,
        }
    }
}

/// Serialized form of a change set together with the descriptors it uses
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ChangeSetDocument {
    #[serde(default)]
    pub types: Vec<EntityDescriptor>,
    pub entities: Vec<SnapshotDocument>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SnapshotDocument {
    #[serde(rename = "type")]
    pub type_name: String,
    pub state: EntityState,
    #[serde(default)]
    pub fields: HashMap<String, FieldValue>,
    #[serde(default)]
    pub relations: Vec<RelationDocument>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelationDocument {
    pub name: String,

    /// Indices into the document's entity list
    #[serde(default)]
    pub targets: Vec<usize>,

    #[serde(default = "default_loaded")]
    pub loaded: bool,
}

fn default_loaded() -> bool {
    true
}

impl ChangeSetDocument {
    pub fn from_json(content: &str) -> Result<Self> {
        Ok(serde_json::from_str(content)?)
    }

    /// Register the document's types. Every relation must point at a type
    /// declared in the same document.
    pub fn descriptor_registry(&self) -> Result<DescriptorRegistry> {
        let mut registry = DescriptorRegistry::new();
        for descriptor in &self.types {
            registry.register(descriptor.clone())?;
        }

        for descriptor in &self.types {
            if let Some(relation) = descriptor
                .relations
                .iter()
                .find(|r| !registry.contains(&r.target))
            {
                return Err(Error::Descriptor(format!(
                    "'{}.{}' targets undeclared type '{}'",
                    descriptor.type_name, relation.name, relation.target
                )));
            }
        }

        Ok(registry)
    }

    pub fn into_change_set(self) -> Result<ChangeSet> {
        let registry = self.descriptor_registry()?;
        ChangeSet::from_document(&self, &registry)
    }
}
