use async_nats::{jetstream, Client};
use async_trait::async_trait;
use audit_core::{
    AuditLogEntity, AuditPublisher, Error, PublisherCounters, PublisherStatus, Result,
};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NatsPublisherConfig {
    /// NATS server URL(s)
    #[serde(default = "default_servers")]
    pub servers: Vec<String>,

    /// Subject audit records are published to
    #[serde(default = "default_subject")]
    pub subject: String,

    /// Publish to `<subject>.<entity name>` instead of a single subject
    #[serde(default)]
    pub subject_per_entity: bool,

    /// Use JetStream and wait for the publish acknowledgement
    #[serde(default)]
    pub use_jetstream: bool,

    /// Optional username for authentication
    #[serde(default)]
    pub username: Option<String>,

    /// Optional password for authentication
    #[serde(default)]
    pub password: Option<String>,

    /// Optional token for authentication
    #[serde(default)]
    pub token: Option<String>,
}

fn default_servers() -> Vec<String> {
    vec!["nats://localhost:4222".to_string()]
}

fn default_subject() -> String {
    "audit.logs".to_string()
}

impl Default for NatsPublisherConfig {
    fn default() -> Self {
        Self {
            servers: default_servers(),
            subject: default_subject(),
            subject_per_entity: false,
            use_jetstream: false,
            username: None,
            password: None,
            token: None,
        }
    }
}

pub struct NatsPublisher {
    config: NatsPublisherConfig,
    client: Option<Client>,
    jetstream: Option<jetstream::Context>,
    counters: PublisherCounters,
}

impl NatsPublisher {
    pub fn new(config: NatsPublisherConfig) -> Self {
        Self {
            config,
            client: None,
            jetstream: None,
            counters: PublisherCounters::default(),
        }
    }

    /// Subject a record of `entity_name` is published to
    pub fn subject_for(&self, entity_name: &str) -> String {
        if self.config.subject_per_entity {
            format!("{}.{}", self.config.subject, entity_name)
        } else {
            self.config.subject.clone()
        }
    }

    /// Connection options with authentication if configured. Username and
    /// password must be given together.
    fn connect_options(&self) -> Result<async_nats::ConnectOptions> {
        let opts = async_nats::ConnectOptions::new();

        match (&self.config.username, &self.config.password) {
            (Some(username), Some(password)) => {
                info!("Using username/password authentication");
                Ok(opts.user_and_password(username.clone(), password.clone()))
            }
            (Some(_), None) | (None, Some(_)) => Err(Error::Configuration(
                "NATS username and password must be set together".to_string(),
            )),
            (None, None) => match &self.config.token {
                Some(token) => {
                    info!("Using token authentication");
                    Ok(opts.token(token.clone()))
                }
                None => Ok(opts),
            },
        }
    }

    async fn send(&self, client: &Client, subject: String, payload: Vec<u8>) -> Result<()> {
        match &self.jetstream {
            Some(js) => {
                let ack = js
                    .publish(subject, payload.into())
                    .await
                    .map_err(|e| Error::Publish(format!("JetStream publish failed: {}", e)))?;
                ack.await
                    .map_err(|e| Error::Publish(format!("JetStream did not acknowledge: {}", e)))?;
                Ok(())
            }
            None => client
                .publish(subject, payload.into())
                .await
                .map_err(|e| Error::Publish(format!("Failed to publish: {}", e))),
        }
    }
}

#[async_trait]
impl AuditPublisher for NatsPublisher {
    fn name(&self) -> &str {
        "nats"
    }

    async fn connect(&mut self) -> Result<()> {
        if self.config.servers.is_empty() {
            return Err(Error::Configuration(
                "At least one NATS server is required".to_string(),
            ));
        }

        let opts = self.connect_options()?;
        info!("Connecting to NATS servers: {:?}", self.config.servers);

        let client = opts
            .connect(self.config.servers.join(",").as_str())
            .await
            .map_err(|e| Error::Connection(format!("Failed to connect to NATS: {}", e)))?;

        info!("Connected to NATS successfully");

        if self.config.use_jetstream {
            info!("Publishing through JetStream on '{}'", self.config.subject);
            self.jetstream = Some(jetstream::new(client.clone()));
        }

        self.client = Some(client);
        Ok(())
    }

    async fn publish(&self, record: &AuditLogEntity) -> Result<()> {
        let client = self
            .client
            .as_ref()
            .ok_or_else(|| Error::Connection("Not connected".to_string()))?;

        let subject = self.subject_for(record.entity_name());
        let payload = serde_json::to_vec(record)?;
        debug!(
            "Publishing audit record {} to '{}': {} bytes",
            record.id(),
            subject,
            payload.len()
        );

        match self.send(client, subject, payload).await {
            Ok(()) => {
                self.counters.record_success();
                Ok(())
            }
            Err(e) => {
                self.counters.record_failure(&e);
                Err(e)
            }
        }
    }

    async fn flush(&self) -> Result<()> {
        if let Some(client) = &self.client {
            client
                .flush()
                .await
                .map_err(|e| Error::Connection(format!("Failed to flush: {}", e)))?;
        }
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.client.is_some()
    }

    fn status(&self) -> PublisherStatus {
        self.counters.status(self.is_connected())
    }
}
