use crate::{EntitySnapshot, EntityState};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Field path to change, ordered by path
pub type ChangeMap = BTreeMap<String, ChangeValues>;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum ChangeStatus {
    Added,
    Modified,
    Deleted,
}

/// Delta of a single field
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ChangeValues {
    pub status: ChangeStatus,
    pub original: Option<String>,
    pub current: Option<String>,
}

impl ChangeValues {
    pub fn added(current: &str) -> Self {
        Self {
            status: ChangeStatus::Added,
            original: None,
            current: Some(current.to_string()),
        }
    }

    pub fn modified(original: Option<&str>, current: Option<&str>) -> Self {
        Self {
            status: ChangeStatus::Modified,
            original: original.map(str::to_string),
            current: current.map(str::to_string),
        }
    }

    pub fn deleted(original: Option<&str>) -> Self {
        Self {
            status: ChangeStatus::Deleted,
            original: original.map(str::to_string),
            current: None,
        }
    }
}

/// Status written for fields of Modified entities.
///
/// Older consumers expect `Added` here; `Modified` is the default.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ModifiedLabel {
    #[default]
    Modified,
    Added,
}

/// Computes changed fields of a single snapshot according to its state
#[derive(Debug, Clone, Copy, Default)]
pub struct ChangeDiffer {
    modified_label: ModifiedLabel,
}

impl ChangeDiffer {
    pub fn new(modified_label: ModifiedLabel) -> Self {
        Self { modified_label }
    }

    pub fn diff(&self, snapshot: &EntitySnapshot) -> ChangeMap {
        let mut changes = ChangeMap::new();

        match snapshot.state() {
            EntityState::Added => {
                for (field, value) in snapshot.fields() {
                    match value.current.as_deref() {
                        None | Some("") => continue,
                        Some(current) => {
                            changes.insert(field.to_string(), ChangeValues::added(current));
                        }
                    }
                }
            }
            EntityState::Modified => {
                for (field, value) in snapshot.fields() {
                    if value.original == value.current {
                        continue;
                    }
                    let mut change =
                        ChangeValues::modified(value.original.as_deref(), value.current.as_deref());
                    if self.modified_label == ModifiedLabel::Added {
                        change.status = ChangeStatus::Added;
                    }
                    changes.insert(field.to_string(), change);
                }
            }
            EntityState::Deleted => {
                for (field, value) in snapshot.fields() {
                    changes.insert(
                        field.to_string(),
                        ChangeValues::deleted(value.original.as_deref()),
                    );
                }
            }
            EntityState::Unchanged => {}
        }

        changes
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::Fixture;
    use crate::FieldValue;

    #[test]
    fn test_added_skips_absent_and_empty_values() {
        let fx = Fixture::new();
        let order = EntitySnapshot::new(fx.order.clone(), EntityState::Added)
            .with_value("status", FieldValue::current("new"))
            .with_value("amount", FieldValue::current(""));

        let changes = ChangeDiffer::default().diff(&order);

        assert_eq!(changes.len(), 1);
        assert_eq!(changes["status"], ChangeValues::added("new"));
    }

    #[test]
    fn test_modified_emits_only_differing_fields() {
        let fx = Fixture::new();
        let order = EntitySnapshot::new(fx.order.clone(), EntityState::Modified)
            .with_value("id", FieldValue::unchanged("1"))
            .with_value("status", FieldValue::unchanged("open"))
            .with_value("amount", FieldValue::changed("10", "20"));

        let changes = ChangeDiffer::default().diff(&order);

        assert_eq!(changes.len(), 1);
        assert_eq!(
            changes["amount"],
            ChangeValues::modified(Some("10"), Some("20"))
        );
    }

    #[test]
    fn test_modified_treats_absent_as_distinct_from_empty() {
        let fx = Fixture::new();
        let order = EntitySnapshot::new(fx.order.clone(), EntityState::Modified)
            .with_value("status", FieldValue::new(None, Some("")));

        let changes = ChangeDiffer::default().diff(&order);

        assert_eq!(changes["status"], ChangeValues::modified(None, Some("")));
    }

    #[test]
    fn test_legacy_label_marks_modified_fields_as_added() {
        let fx = Fixture::new();
        let order = EntitySnapshot::new(fx.order.clone(), EntityState::Modified)
            .with_value("amount", FieldValue::changed("10", "20"));

        let changes = ChangeDiffer::new(ModifiedLabel::Added).diff(&order);

        assert_eq!(changes["amount"].status, ChangeStatus::Added);
        assert_eq!(changes["amount"].original.as_deref(), Some("10"));
        assert_eq!(changes["amount"].current.as_deref(), Some("20"));
    }

    #[test]
    fn test_deleted_emits_every_declared_field() {
        let fx = Fixture::new();
        let order = EntitySnapshot::new(fx.order.clone(), EntityState::Deleted)
            .with_value("amount", FieldValue::unchanged("20"));

        let changes = ChangeDiffer::default().diff(&order);

        assert_eq!(changes.len(), fx.order.fields.len());
        assert_eq!(changes["amount"], ChangeValues::deleted(Some("20")));
        assert_eq!(changes["status"], ChangeValues::deleted(None));
        assert!(changes.values().all(|c| c.current.is_none()));
    }

    #[test]
    fn test_unchanged_yields_nothing() {
        let fx = Fixture::new();
        let order = EntitySnapshot::new(fx.order.clone(), EntityState::Unchanged)
            .with_value("amount", FieldValue::changed("10", "20"));

        assert!(ChangeDiffer::default().diff(&order).is_empty());
    }

    #[test]
    fn test_change_values_serialize_with_wire_names() {
        let json = serde_json::to_value(ChangeValues::added("new")).unwrap();

        assert_eq!(
            json,
            serde_json::json!({"status": "Added", "original": null, "current": "new"})
        );
    }
}
