use audit_core::{AuditOptions, CollectionKeying, InterestSet, ModifiedLabel};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::Path;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub publisher: PublisherConfig,
    #[serde(default)]
    pub audit: AuditSettings,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PublisherConfig {
    /// Type/name of the publisher (e.g., "nats", "stdout")
    #[serde(rename = "type")]
    pub publisher_type: String,

    /// Publisher-specific configuration
    #[serde(default)]
    pub config: Value,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AuditSettings {
    /// Field names always surfaced as special keys
    #[serde(default)]
    pub special_keys: Vec<String>,

    /// Status written for fields of modified entities
    #[serde(default)]
    pub modified_label: ModifiedLabel,

    /// Namespacing of many-valued relation items
    #[serde(default)]
    pub collection_keying: CollectionKeying,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,

    /// JSON formatted logs
    #[serde(default)]
    pub json: bool,
}

impl Default for PublisherConfig {
    fn default() -> Self {
        Self {
            publisher_type: "stdout".to_string(),
            config: serde_json::json!({ "pretty": false }),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

impl AuditSettings {
    pub fn options(&self) -> AuditOptions {
        AuditOptions {
            modified_label: self.modified_label,
            collection_keying: self.collection_keying,
        }
    }

    pub fn interest_set(&self) -> InterestSet {
        InterestSet::new(self.special_keys.iter().cloned())
    }
}

impl AppConfig {
    pub fn load(config_dir: impl AsRef<Path>) -> anyhow::Result<Self> {
        let config_dir = config_dir.as_ref();
        let s = config::Config::builder()
            // Start with defaults
            .add_source(config::Config::try_from(&Self::default())?)
            // Add default.yaml
            .add_source(
                config::File::with_name(&config_dir.join("default.yaml").to_string_lossy())
                    .required(false),
            )
            // Add local.yaml (per-host overrides, not committed)
            .add_source(
                config::File::with_name(&config_dir.join("local.yaml").to_string_lossy())
                    .required(false),
            )
            // Add environment variables (AUDIT__LOGGING__LEVEL=debug)
            .add_source(
                config::Environment::with_prefix("AUDIT")
                    .separator("__")
                    .list_separator(",")
                    .with_list_parse_key("audit.special_keys")
                    .try_parsing(true),
            )
            .build()?;

        let config = s.try_deserialize()?;
        Ok(config)
    }

    pub fn from_file(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config = serde_yaml::from_str(&content)?;
        Ok(config)
    }

    pub fn to_file(&self, path: impl AsRef<Path>) -> anyhow::Result<()> {
        let content = serde_yaml::to_string(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }
}
