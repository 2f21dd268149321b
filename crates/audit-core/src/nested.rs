use crate::{
    Cardinality, ChangeDiffer, ChangeMap, ChangeSet, EntityRef, EntitySnapshot, RelationValue,
    Result,
};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use tracing::debug;

/// How items of a many-valued relation are namespaced.
///
/// With `LastWriteWins` every item writes to `Parent.Relation.field`, so a
/// later item overwrites an earlier one changing the same field. `ItemKey`
/// inserts the item's primary key (or its position when it has none):
/// `Parent.Relation[key].field`.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum CollectionKeying {
    #[default]
    LastWriteWins,
    ItemKey,
}

/// Walks the relation graph below an entity and collects changes of related
/// entities, keyed by `ParentType.Relation.field`.
pub struct NestedChangeCollector<'a> {
    change_set: &'a ChangeSet,
    differ: ChangeDiffer,
    keying: CollectionKeying,
}

impl<'a> NestedChangeCollector<'a> {
    pub fn new(change_set: &'a ChangeSet, differ: ChangeDiffer, keying: CollectionKeying) -> Self {
        Self {
            change_set,
            differ,
            keying,
        }
    }

    pub fn collect(&self, root: EntityRef) -> Result<ChangeMap> {
        let mut changes = ChangeMap::new();
        let mut path = HashSet::from([root]);
        self.walk(root, &mut path, &mut changes)?;
        Ok(changes)
    }

    /// `path` holds the ancestors of `parent_ref`, so a shared entity is
    /// reported under every parent reaching it and only cycles are cut.
    fn walk(
        &self,
        parent_ref: EntityRef,
        path: &mut HashSet<EntityRef>,
        changes: &mut ChangeMap,
    ) -> Result<()> {
        let parent = self.change_set.get(parent_ref)?;

        for relation in parent.relations() {
            if !relation.loaded {
                debug!(
                    "Skipping unloaded relation {}.{}",
                    parent.type_name(),
                    relation.name
                );
                continue;
            }

            for (position, &child_ref) in relation.targets.iter().enumerate() {
                if path.contains(&child_ref) {
                    debug!(
                        "Cycle back to entity {} via {}.{}, not descending",
                        child_ref,
                        parent.type_name(),
                        relation.name
                    );
                    continue;
                }

                let child = self.change_set.get(child_ref)?;
                if child.state().has_changes() {
                    let prefix = self.prefix(parent, relation, child, position);
                    for (field, change) in self.differ.diff(child) {
                        changes.insert(format!("{}.{}", prefix, field), change);
                    }
                }

                path.insert(child_ref);
                let walked = self.walk(child_ref, path, changes);
                path.remove(&child_ref);
                walked?;
            }
        }

        Ok(())
    }

    fn prefix(
        &self,
        parent: &EntitySnapshot,
        relation: &RelationValue,
        child: &EntitySnapshot,
        position: usize,
    ) -> String {
        match (relation.cardinality, self.keying) {
            (Cardinality::Many, CollectionKeying::ItemKey) => {
                let item = child
                    .primary_key()
                    .unwrap_or_else(|| position.to_string());
                format!("{}.{}[{}]", parent.type_name(), relation.name, item)
            }
            _ => format!("{}.{}", parent.type_name(), relation.name),
        }
    }
}
