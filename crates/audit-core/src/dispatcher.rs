use crate::{
    Actor, AuditOptions, AuditPublisher, AuditRecordBuilder, ChangeSet, EntityRef, Error,
    InterestSet, Result,
};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

/// An entity whose audit failed
#[derive(Debug, Clone)]
pub struct EntityFailure {
    pub entity: EntityRef,
    pub entity_name: String,
    pub error: String,
}

/// Outcome of one dispatch call
#[derive(Debug, Clone, Default)]
pub struct DispatchReport {
    /// Ids of published records
    pub published: Vec<String>,

    /// Entities with nothing to audit
    pub unchanged: usize,

    pub failures: Vec<EntityFailure>,
}

impl DispatchReport {
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }

    pub fn total(&self) -> usize {
        self.published.len() + self.unchanged + self.failures.len()
    }
}

enum Outcome {
    Published(String),
    NoChanges,
}

/// Fans audit record construction out over a batch of entities and publishes
/// every record produced.
pub struct AuditDispatcher {
    publisher: Arc<dyn AuditPublisher>,
    options: AuditOptions,
}

impl AuditDispatcher {
    pub fn new(publisher: Arc<dyn AuditPublisher>) -> Self {
        Self {
            publisher,
            options: AuditOptions::default(),
        }
    }

    pub fn with_options(mut self, options: AuditOptions) -> Self {
        self.options = options;
        self
    }

    pub fn publisher(&self) -> &Arc<dyn AuditPublisher> {
        &self.publisher
    }

    /// Audit every auditable entity of the change set
    pub async fn dispatch_auditable(
        &self,
        change_set: Arc<ChangeSet>,
        actor: Actor,
        interest: Arc<InterestSet>,
    ) -> DispatchReport {
        let entities = change_set.auditable_entries();
        if entities.is_empty() {
            debug!("No auditable entities in change set");
            return DispatchReport::default();
        }
        self.dispatch(change_set, entities, actor, interest).await
    }

    /// Audit `entities` concurrently.
    ///
    /// Completes once every unit has settled. Failures are logged and
    /// collected in the report; they never abort sibling units.
    pub async fn dispatch(
        &self,
        change_set: Arc<ChangeSet>,
        entities: Vec<EntityRef>,
        actor: Actor,
        interest: Arc<InterestSet>,
    ) -> DispatchReport {
        self.dispatch_with_cancellation(
            change_set,
            entities,
            actor,
            interest,
            CancellationToken::new(),
        )
        .await
    }

    /// Like [`dispatch`](Self::dispatch), but units still running when
    /// `cancel` fires are reported as cancelled.
    pub async fn dispatch_with_cancellation(
        &self,
        change_set: Arc<ChangeSet>,
        entities: Vec<EntityRef>,
        actor: Actor,
        interest: Arc<InterestSet>,
        cancel: CancellationToken,
    ) -> DispatchReport {
        info!(
            "Auditing {} entities for user {} ({})",
            entities.len(),
            actor.user_name,
            actor.user_id
        );

        let actor = Arc::new(actor);
        let mut tasks = JoinSet::new();
        let mut task_entities = HashMap::new();

        for entity in entities {
            let change_set = change_set.clone();
            let actor = actor.clone();
            let interest = interest.clone();
            let publisher = self.publisher.clone();
            let options = self.options;
            let cancel = cancel.clone();

            let handle = tasks.spawn(async move {
                let outcome = tokio::select! {
                    biased;
                    _ = cancel.cancelled() => Err(Error::Cancelled),
                    outcome = audit_entity(
                        &change_set,
                        entity,
                        &actor,
                        &interest,
                        options,
                        publisher.as_ref(),
                    ) => outcome,
                };
                (entity, outcome)
            });
            task_entities.insert(handle.id(), entity);
        }

        let mut report = DispatchReport::default();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((_, Ok(Outcome::Published(id)))) => report.published.push(id),
                Ok((_, Ok(Outcome::NoChanges))) => report.unchanged += 1,
                Ok((entity, Err(e))) => {
                    report.failures.push(failure(&change_set, entity, e.to_string()));
                }
                Err(e) => match task_entities.get(&e.id()) {
                    Some(&entity) => {
                        report.failures.push(failure(&change_set, entity, e.to_string()));
                    }
                    None => error!("Audit task failed: {}", e),
                },
            }
        }

        info!(
            "Audit batch finished: {} published, {} unchanged, {} failed",
            report.published.len(),
            report.unchanged,
            report.failures.len()
        );
        report
    }
}

async fn audit_entity(
    change_set: &ChangeSet,
    entity: EntityRef,
    actor: &Actor,
    interest: &InterestSet,
    options: AuditOptions,
    publisher: &dyn AuditPublisher,
) -> Result<Outcome> {
    let builder = AuditRecordBuilder::new(change_set, options);
    let Some(record) = builder.build(entity, actor, interest)? else {
        return Ok(Outcome::NoChanges);
    };

    publisher.publish(&record).await?;
    debug!(
        "Published audit record {} ({} changes)",
        record.id(),
        record.changes().len()
    );
    Ok(Outcome::Published(record.id().to_string()))
}

fn failure(change_set: &ChangeSet, entity: EntityRef, error: String) -> EntityFailure {
    let entity_name = change_set
        .get(entity)
        .map(|s| s.type_name().to_lowercase())
        .unwrap_or_else(|_| "<unknown>".to_string());

    error!(
        "An error occurred while auditing {} {}: {}",
        entity_name, entity, error
    );

    EntityFailure {
        entity,
        entity_name,
        error,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::Fixture;
    use crate::{
        AuditLogEntity, ChangeSetBuilder, ChangeStatus, EntitySnapshot, EntityState, FieldValue,
        MemoryPublisher, PublisherCounters, PublisherStatus,
    };
    use async_trait::async_trait;
    use std::collections::HashSet;
    use std::time::Duration;

    /// Rejects records of one entity type, panics on another
    struct FlakyPublisher {
        inner: MemoryPublisher,
        reject: &'static str,
        panic_on: &'static str,
        counters: PublisherCounters,
    }

    #[async_trait]
    impl AuditPublisher for FlakyPublisher {
        fn name(&self) -> &str {
            "flaky"
        }

        async fn publish(&self, record: &AuditLogEntity) -> Result<()> {
            if record.entity_name() == self.reject {
                self.counters.record_failure("rejected");
                return Err(Error::Publish("rejected".to_string()));
            }
            if record.entity_name() == self.panic_on {
                panic!("sink crashed");
            }
            self.inner.publish(record).await
        }

        fn is_connected(&self) -> bool {
            true
        }

        fn status(&self) -> PublisherStatus {
            self.counters.status(true)
        }
    }

    /// Never completes a publish
    struct StuckPublisher;

    #[async_trait]
    impl AuditPublisher for StuckPublisher {
        fn name(&self) -> &str {
            "stuck"
        }

        async fn publish(&self, _record: &AuditLogEntity) -> Result<()> {
            std::future::pending::<()>().await;
            Ok(())
        }

        fn is_connected(&self) -> bool {
            true
        }

        fn status(&self) -> PublisherStatus {
            PublisherStatus::default()
        }
    }

    /// Added order, Modified customer, Deleted product, untouched line item
    fn batch(fx: &Fixture) -> (Arc<ChangeSet>, Vec<EntityRef>) {
        let mut builder = ChangeSetBuilder::new();
        let order = builder
            .push(
                EntitySnapshot::new(fx.order.clone(), EntityState::Added)
                    .with_value("id", FieldValue::current("1"))
                    .with_value("status", FieldValue::current("new")),
            )
            .unwrap();
        let customer = builder
            .push(
                EntitySnapshot::new(fx.customer.clone(), EntityState::Modified)
                    .with_value("name", FieldValue::changed("Ada", "Grace")),
            )
            .unwrap();
        let product = builder
            .push(
                EntitySnapshot::new(fx.product.clone(), EntityState::Deleted)
                    .with_value("price", FieldValue::unchanged("5")),
            )
            .unwrap();
        let item = builder
            .push(
                EntitySnapshot::new(fx.line_item.clone(), EntityState::Unchanged)
                    .with_value("qty", FieldValue::unchanged("1")),
            )
            .unwrap();
        (
            Arc::new(builder.build()),
            vec![order, customer, product, item],
        )
    }

    #[tokio::test]
    async fn test_publishes_one_record_per_changed_entity() {
        let fx = Fixture::new();
        let (set, entities) = batch(&fx);
        let publisher = Arc::new(MemoryPublisher::new());

        let report = AuditDispatcher::new(publisher.clone())
            .dispatch(set, entities, Actor::new(7, "bob"), Arc::default())
            .await;

        assert!(report.is_clean());
        assert_eq!(report.published.len(), 3);
        assert_eq!(report.unchanged, 1);

        let records = publisher.records();
        let names: HashSet<&str> = records.iter().map(|r| r.entity_name()).collect();
        assert_eq!(names, HashSet::from(["order", "customer", "product"]));
        assert!(records.iter().all(|r| r.user_name() == "bob" && r.user_id() == 7));
        assert_eq!(publisher.status().records_published, 3);
    }

    #[tokio::test]
    async fn test_failures_are_isolated() {
        let fx = Fixture::new();
        let (set, entities) = batch(&fx);
        let publisher = Arc::new(FlakyPublisher {
            inner: MemoryPublisher::new(),
            reject: "customer",
            panic_on: "product",
            counters: PublisherCounters::default(),
        });

        let report = AuditDispatcher::new(publisher.clone())
            .dispatch(set, entities, Actor::new(7, "bob"), Arc::default())
            .await;

        assert_eq!(report.published.len(), 1);
        assert_eq!(report.unchanged, 1);
        assert_eq!(report.failures.len(), 2);
        assert_eq!(report.total(), 4);

        let failed: HashSet<&str> = report
            .failures
            .iter()
            .map(|f| f.entity_name.as_str())
            .collect();
        assert_eq!(failed, HashSet::from(["customer", "product"]));
        assert_eq!(publisher.inner.records()[0].entity_name(), "order");
    }

    #[tokio::test]
    async fn test_dangling_entity_is_reported_not_raised() {
        let fx = Fixture::new();
        let (set, mut entities) = batch(&fx);
        let dangling: EntityRef = serde_json::from_str("99").unwrap();
        entities.push(dangling);

        let report = AuditDispatcher::new(Arc::new(MemoryPublisher::new()))
            .dispatch(set, entities, Actor::new(7, "bob"), Arc::default())
            .await;

        assert_eq!(report.published.len(), 3);
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].entity, dangling);
        assert_eq!(report.failures[0].entity_name, "<unknown>");
    }

    #[tokio::test]
    async fn test_cancellation_settles_every_unit() {
        let fx = Fixture::new();
        let (set, entities) = batch(&fx);
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();

        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            trigger.cancel();
        });

        let report = AuditDispatcher::new(Arc::new(StuckPublisher))
            .dispatch_with_cancellation(set, entities, Actor::new(1, "ci"), Arc::default(), cancel)
            .await;

        assert!(report.published.is_empty());
        assert_eq!(report.unchanged, 1);
        assert_eq!(report.failures.len(), 3);
        assert!(report.failures.iter().all(|f| f.error == "Audit cancelled"));
    }

    #[tokio::test]
    async fn test_dispatch_auditable_filters_and_applies_options() {
        let fx = Fixture::new();
        let mut builder = ChangeSetBuilder::new();
        builder
            .push(
                EntitySnapshot::new(fx.note.clone(), EntityState::Added)
                    .with_value("text", FieldValue::current("hello")),
            )
            .unwrap();
        builder
            .push(
                EntitySnapshot::new(fx.customer.clone(), EntityState::Modified)
                    .with_value("name", FieldValue::changed("Ada", "Grace")),
            )
            .unwrap();
        let publisher = Arc::new(MemoryPublisher::new());

        let report = AuditDispatcher::new(publisher.clone())
            .with_options(AuditOptions {
                modified_label: crate::ModifiedLabel::Added,
                ..Default::default()
            })
            .dispatch_auditable(
                Arc::new(builder.build()),
                Actor::new(3, "eve"),
                Arc::new(InterestSet::new(["name"])),
            )
            .await;

        assert_eq!(report.total(), 1);
        let records = publisher.records();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].entity_name(), "customer");
        assert_eq!(records[0].changes()["name"].status, ChangeStatus::Added);
        assert_eq!(records[0].special_keys()[0].value.as_deref(), Some("Grace"));
    }

    #[tokio::test]
    async fn test_empty_change_set_publishes_nothing() {
        let publisher = Arc::new(MemoryPublisher::new());

        let report = AuditDispatcher::new(publisher.clone())
            .dispatch_auditable(Arc::default(), Actor::new(1, "ci"), Arc::default())
            .await;

        assert_eq!(report.total(), 0);
        assert!(publisher.records().is_empty());
    }

    #[tokio::test]
    async fn test_concurrent_batches_never_share_ids() {
        let fx = Fixture::new();
        let publisher = Arc::new(MemoryPublisher::new());
        let dispatcher = Arc::new(AuditDispatcher::new(publisher.clone()));

        let mut runs = JoinSet::new();
        for _ in 0..8 {
            let (set, entities) = batch(&fx);
            let dispatcher = dispatcher.clone();
            runs.spawn(async move {
                dispatcher
                    .dispatch(set, entities, Actor::new(7, "bob"), Arc::default())
                    .await
            });
        }
        while runs.join_next().await.is_some() {}

        let ids: HashSet<String> = publisher
            .records()
            .iter()
            .map(|r| r.id().to_string())
            .collect();
        assert_eq!(ids.len(), 24);
    }
}
