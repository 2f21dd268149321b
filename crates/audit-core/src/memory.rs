use crate::{
    AuditLogEntity, AuditPublisher, PublisherCounters, PublisherFactory, PublisherStatus, Result,
};
use async_trait::async_trait;
use serde_json::Value;
use std::sync::Mutex;

/// Keeps published records in memory
#[derive(Debug, Default)]
pub struct MemoryPublisher {
    records: Mutex<Vec<AuditLogEntity>>,
    counters: PublisherCounters,
}

impl MemoryPublisher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records published so far, in arrival order
    pub fn records(&self) -> Vec<AuditLogEntity> {
        self.records
            .lock()
            .map(|records| records.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl AuditPublisher for MemoryPublisher {
    fn name(&self) -> &str {
        "memory"
    }

    async fn publish(&self, record: &AuditLogEntity) -> Result<()> {
        match self.records.lock() {
            Ok(mut records) => {
                records.push(record.clone());
                self.counters.record_success();
                Ok(())
            }
            Err(_) => {
                self.counters.record_failure("record buffer poisoned");
                Err(crate::Error::Publish("record buffer poisoned".to_string()))
            }
        }
    }

    fn is_connected(&self) -> bool {
        true
    }

    fn status(&self) -> PublisherStatus {
        self.counters.status(true)
    }
}

pub struct MemoryPublisherFactory;

impl PublisherFactory for MemoryPublisherFactory {
    fn name(&self) -> &str {
        "memory"
    }

    fn create(&self, _config: Value) -> Result<Box<dyn AuditPublisher>> {
        Ok(Box::new(MemoryPublisher::new()))
    }
}
