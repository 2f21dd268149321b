use crate::{AuditLogEntity, Result};
use async_trait::async_trait;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

/// Trait for audit record sinks
#[async_trait]
pub trait AuditPublisher: Send + Sync {
    /// Get the name/type identifier for this publisher
    fn name(&self) -> &str;

    /// Connect to the sink. Called once before the publisher is shared.
    async fn connect(&mut self) -> Result<()> {
        Ok(())
    }

    /// Hand a finished record to the sink.
    /// Called concurrently from every audit unit of a batch.
    async fn publish(&self, record: &AuditLogEntity) -> Result<()>;

    /// Flush anything buffered
    async fn flush(&self) -> Result<()> {
        Ok(())
    }

    /// Check if the publisher is connected
    fn is_connected(&self) -> bool;

    /// Get publisher status information
    fn status(&self) -> PublisherStatus;
}

#[derive(Debug, Clone, Default)]
pub struct PublisherStatus {
    pub connected: bool,
    pub records_published: u64,
    pub errors: u64,
    pub last_error: Option<String>,
}

/// Counters shared by concurrent `publish` calls
#[derive(Debug, Default)]
pub struct PublisherCounters {
    published: AtomicU64,
    errors: AtomicU64,
    last_error: Mutex<Option<String>>,
}

impl PublisherCounters {
    pub fn record_success(&self) {
        self.published.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_failure(&self, error: impl ToString) {
        self.errors.fetch_add(1, Ordering::Relaxed);
        if let Ok(mut last) = self.last_error.lock() {
            *last = Some(error.to_string());
        }
    }

    pub fn status(&self, connected: bool) -> PublisherStatus {
        PublisherStatus {
            connected,
            records_published: self.published.load(Ordering::Relaxed),
            errors: self.errors.load(Ordering::Relaxed),
            last_error: self.last_error.lock().ok().and_then(|last| last.clone()),
        }
    }
}
