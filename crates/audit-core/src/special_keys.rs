use crate::EntitySnapshot;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Named key/value pair carried by an audit record
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct KeyEntry {
    pub name: String,
    pub value: Option<String>,
}

impl KeyEntry {
    pub fn new(name: &str, value: Option<&str>) -> Self {
        Self {
            name: name.to_string(),
            value: value.map(str::to_string),
        }
    }
}

/// Field names the caller always wants surfaced as special keys
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(transparent)]
pub struct InterestSet(HashSet<String>);

impl InterestSet {
    pub fn new<I, S>(keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self(keys.into_iter().map(Into::into).collect())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.0.contains(name)
    }

    pub fn insert(&mut self, name: impl Into<String>) -> bool {
        self.0.insert(name.into())
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }
}

impl<S: Into<String>> FromIterator<S> for InterestSet {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        Self::new(iter)
    }
}

/// Pick the values of interesting fields out of an entity.
///
/// Primary key first, then foreign keys, then every declared field. A name
/// matching in more than one group is reported once per group.
pub fn extract_special_keys(
    snapshot: &EntitySnapshot,
    primary_key: Option<&str>,
    foreign_keys: &[KeyEntry],
    interest: &InterestSet,
) -> Vec<KeyEntry> {
    if interest.is_empty() {
        return Vec::new();
    }

    let mut keys = Vec::new();

    if let Some(name) = snapshot.primary_key_name() {
        if interest.contains(name) {
            keys.push(KeyEntry::new(name, primary_key));
        }
    }

    keys.extend(
        foreign_keys
            .iter()
            .filter(|fk| interest.contains(&fk.name))
            .cloned(),
    );

    keys.extend(
        snapshot
            .fields()
            .filter(|(name, _)| interest.contains(name))
            .map(|(name, value)| KeyEntry::new(name, value.current.as_deref())),
    );

    keys
}
