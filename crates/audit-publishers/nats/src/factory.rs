use crate::{NatsPublisher, NatsPublisherConfig};
use audit_core::{AuditPublisher, PublisherFactory, Result};
use serde_json::Value;

pub struct NatsPublisherFactory;

impl PublisherFactory for NatsPublisherFactory {
    fn name(&self) -> &str {
        "nats"
    }

    fn create(&self, config: Value) -> Result<Box<dyn AuditPublisher>> {
        let config: NatsPublisherConfig = serde_json::from_value(config)?;
        Ok(Box::new(NatsPublisher::new(config)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_factory_creates_disconnected_publisher() {
        let publisher = NatsPublisherFactory
            .create(json!({"servers": ["nats://nats:4222"], "subject": "audit"}))
            .expect("Failed to create publisher");

        assert_eq!(publisher.name(), "nats");
        assert!(!publisher.is_connected());
    }

    #[test]
    fn test_factory_rejects_malformed_config() {
        assert!(NatsPublisherFactory.create(json!({"servers": "nats://nats:4222"})).is_err());
    }
}
