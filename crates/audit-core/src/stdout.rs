use crate::{
    AuditLogEntity, AuditPublisher, PublisherCounters, PublisherFactory, PublisherStatus, Result,
};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::io::{AsyncWriteExt, Stdout};
use tokio::sync::Mutex;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StdoutConfig {
    /// Pretty-print each record instead of one JSON document per line
    #[serde(default)]
    pub pretty: bool,
}

/// Writes records to standard output as JSON
pub struct StdoutPublisher {
    config: StdoutConfig,
    out: Mutex<Stdout>,
    counters: PublisherCounters,
}

impl StdoutPublisher {
    pub fn new(config: StdoutConfig) -> Self {
        Self {
            config,
            out: Mutex::new(tokio::io::stdout()),
            counters: PublisherCounters::default(),
        }
    }

    fn render(&self, record: &AuditLogEntity) -> Result<String> {
        let mut line = if self.config.pretty {
            serde_json::to_string_pretty(record)?
        } else {
            serde_json::to_string(record)?
        };
        line.push('\n');
        Ok(line)
    }
}

#[async_trait]
impl AuditPublisher for StdoutPublisher {
    fn name(&self) -> &str {
        "stdout"
    }

    async fn publish(&self, record: &AuditLogEntity) -> Result<()> {
        let line = self.render(record)?;

        // one record per lock so concurrent writers never interleave
        let mut out = self.out.lock().await;
        match out.write_all(line.as_bytes()).await {
            Ok(()) => {
                self.counters.record_success();
                Ok(())
            }
            Err(e) => {
                self.counters.record_failure(&e);
                Err(e.into())
            }
        }
    }

    async fn flush(&self) -> Result<()> {
        self.out.lock().await.flush().await?;
        Ok(())
    }

    fn is_connected(&self) -> bool {
        true
    }

    fn status(&self) -> PublisherStatus {
        self.counters.status(true)
    }
}

pub struct StdoutPublisherFactory;

impl PublisherFactory for StdoutPublisherFactory {
    fn name(&self) -> &str {
        "stdout"
    }

    fn create(&self, config: Value) -> Result<Box<dyn AuditPublisher>> {
        let config: StdoutConfig = if config.is_null() {
            StdoutConfig::default()
        } else {
            serde_json::from_value(config)?
        };
        Ok(Box::new(StdoutPublisher::new(config)))
    }
}
