use crate::{AuditPublisher, Result};
use serde_json::Value;

/// Factory trait for creating publishers
pub trait PublisherFactory: Send + Sync {
    /// Get the name/type identifier for this publisher
    fn name(&self) -> &str;

    /// Create a new publisher instance from configuration
    fn create(&self, config: Value) -> Result<Box<dyn AuditPublisher>>;
}
