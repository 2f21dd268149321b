mod descriptor;
mod diff;
mod dispatcher;
mod error;
mod factory;
mod memory;
mod nested;
mod publisher;
mod record;
mod registry;
mod snapshot;
mod special_keys;
mod stdout;

#[cfg(test)]
mod fixtures;

pub use descriptor::{Cardinality, DescriptorRegistry, EntityDescriptor, RelationDescriptor};
pub use diff::{ChangeDiffer, ChangeMap, ChangeStatus, ChangeValues, ModifiedLabel};
pub use dispatcher::{AuditDispatcher, DispatchReport, EntityFailure};
pub use error::{Error, Result};
pub use factory::PublisherFactory;
pub use memory::{MemoryPublisher, MemoryPublisherFactory};
pub use nested::{CollectionKeying, NestedChangeCollector};
pub use publisher::{AuditPublisher, PublisherCounters, PublisherStatus};
pub use record::{Actor, AuditLogEntity, AuditOptions, AuditRecordBuilder};
pub use registry::Registry;
pub use snapshot::{
    ChangeSet, ChangeSetBuilder, ChangeSetDocument, EntityRef, EntitySnapshot, EntityState,
    FieldValue, RelationDocument, RelationValue, SnapshotDocument,
};
pub use special_keys::{extract_special_keys, InterestSet, KeyEntry};
pub use stdout::{StdoutConfig, StdoutPublisher, StdoutPublisherFactory};
