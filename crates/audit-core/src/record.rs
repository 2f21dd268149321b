use crate::{
    extract_special_keys, ChangeDiffer, ChangeMap, ChangeSet, CollectionKeying, EntityRef,
    InterestSet, KeyEntry, ModifiedLabel, NestedChangeCollector, Result,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Identity of the user performing the unit of work. Passed through as-is.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Actor {
    pub user_id: i64,
    pub user_name: String,
}

impl Actor {
    pub fn new(user_id: i64, user_name: impl Into<String>) -> Self {
        Self {
            user_id,
            user_name: user_name.into(),
        }
    }
}

/// Knobs for how changes are labelled and keyed
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct AuditOptions {
    #[serde(default)]
    pub modified_label: ModifiedLabel,
    #[serde(default)]
    pub collection_keying: CollectionKeying,
}

/// One audit event for one changed entity
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AuditLogEntity {
    id: String,
    entity_name: String,
    operation: String,
    timestamp: DateTime<Utc>,
    changes: ChangeMap,
    special_keys: Vec<KeyEntry>,
    foreign_keys: Vec<KeyEntry>,
    user_id: i64,
    user_name: String,
    primary_key: Option<String>,
}

impl AuditLogEntity {
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn entity_name(&self) -> &str {
        &self.entity_name
    }

    pub fn operation(&self) -> &str {
        &self.operation
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    pub fn changes(&self) -> &ChangeMap {
        &self.changes
    }

    pub fn special_keys(&self) -> &[KeyEntry] {
        &self.special_keys
    }

    pub fn foreign_keys(&self) -> &[KeyEntry] {
        &self.foreign_keys
    }

    pub fn user_id(&self) -> i64 {
        self.user_id
    }

    pub fn user_name(&self) -> &str {
        &self.user_name
    }

    pub fn primary_key(&self) -> Option<&str> {
        self.primary_key.as_deref()
    }
}

/// `<entity>-<user>-<yyyyMMddHHmmssfff>-<uuid v4>`
fn record_id(entity_name: &str, user_id: i64, timestamp: DateTime<Utc>) -> String {
    format!(
        "{}-{}-{}-{}",
        entity_name,
        user_id,
        timestamp.format("%Y%m%d%H%M%S%3f"),
        Uuid::new_v4()
    )
}

/// Builds audit records for entities of a change set
pub struct AuditRecordBuilder<'a> {
    change_set: &'a ChangeSet,
    options: AuditOptions,
}

impl<'a> AuditRecordBuilder<'a> {
    pub fn new(change_set: &'a ChangeSet, options: AuditOptions) -> Self {
        Self {
            change_set,
            options,
        }
    }

    /// Build the record for `entity`, stamped with the current time.
    ///
    /// Returns `Ok(None)` when neither the entity nor anything below it
    /// changed.
    pub fn build(
        &self,
        entity: EntityRef,
        actor: &Actor,
        interest: &InterestSet,
    ) -> Result<Option<AuditLogEntity>> {
        self.build_at(entity, actor, interest, Utc::now())
    }

    pub fn build_at(
        &self,
        entity: EntityRef,
        actor: &Actor,
        interest: &InterestSet,
        timestamp: DateTime<Utc>,
    ) -> Result<Option<AuditLogEntity>> {
        let snapshot = self.change_set.get(entity)?;
        let primary_key = snapshot.primary_key();
        let foreign_keys = snapshot.foreign_keys();

        let differ = ChangeDiffer::new(self.options.modified_label);
        let mut changes = differ.diff(snapshot);
        let collector =
            NestedChangeCollector::new(self.change_set, differ, self.options.collection_keying);
        changes.extend(collector.collect(entity)?);

        if changes.is_empty() {
            return Ok(None);
        }

        let special_keys =
            extract_special_keys(snapshot, primary_key.as_deref(), &foreign_keys, interest);
        let entity_name = snapshot.type_name().to_lowercase();

        Ok(Some(AuditLogEntity {
            id: record_id(&entity_name, actor.user_id, timestamp),
            entity_name,
            operation: snapshot.state().to_string(),
            timestamp,
            changes,
            special_keys,
            foreign_keys,
            user_id: actor.user_id,
            user_name: actor.user_name.clone(),
            primary_key,
        }))
    }
}
