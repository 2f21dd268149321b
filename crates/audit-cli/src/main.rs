use audit_config::AppConfig;
use audit_core::{
    Actor, AuditDispatcher, ChangeSet, ChangeSetDocument, InterestSet, MemoryPublisher, Registry,
};
use audit_nats_publisher::NatsPublisherFactory;
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "audit-cli")]
#[command(about = "Audit trail builder for tracked entity changes", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Audit a change set and publish the records
    Dispatch {
        /// Path to configuration directory
        #[arg(short, long, default_value = "config")]
        config_dir: String,

        /// Change set document (JSON)
        #[arg(short, long)]
        input: PathBuf,

        /// Name of the acting user
        #[arg(long)]
        user_name: String,

        /// Id of the acting user
        #[arg(long)]
        user_id: i64,

        /// Extra special key, added to the configured ones
        #[arg(long = "special-key")]
        special_keys: Vec<String>,
    },

    /// Print the records a change set would produce without publishing
    Preview {
        /// Path to configuration directory
        #[arg(short, long, default_value = "config")]
        config_dir: String,

        /// Change set document (JSON)
        #[arg(short, long)]
        input: PathBuf,

        #[arg(long, default_value = "preview")]
        user_name: String,

        #[arg(long, default_value_t = 0)]
        user_id: i64,

        #[arg(long = "special-key")]
        special_keys: Vec<String>,
    },

    /// Validate configuration and, optionally, a change set document
    Validate {
        /// Path to configuration directory
        #[arg(short, long, default_value = "config")]
        config_dir: String,

        /// Change set document (JSON)
        #[arg(short, long)]
        input: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file if present
    dotenvy::dotenv().ok();

    let cli = Cli::parse();

    match cli.command {
        Commands::Dispatch {
            config_dir,
            input,
            user_name,
            user_id,
            special_keys,
        } => {
            let app_config = AppConfig::load(&config_dir)?;
            init_tracing(&app_config);

            info!("Starting audit with config directory: {}", config_dir);

            let registry = registry();
            info!("Available publishers: {:?}", registry.list_publishers());

            let factory = registry.get_publisher_factory(&app_config.publisher.publisher_type)?;
            let mut publisher = factory.create(app_config.publisher.config.clone())?;
            publisher.connect().await?;
            info!("Publisher '{}' connected", publisher.name());

            let change_set = load_change_set(&input)?;
            let interest = interest_set(&app_config, special_keys);
            let dispatcher = AuditDispatcher::new(Arc::from(publisher))
                .with_options(app_config.audit.options());

            let report = dispatcher
                .dispatch_auditable(
                    change_set,
                    Actor::new(user_id, user_name),
                    Arc::new(interest),
                )
                .await;
            dispatcher.publisher().flush().await?;

            info!(
                "Published {} record(s), {} entities without changes",
                report.published.len(),
                report.unchanged
            );
            for failure in &report.failures {
                warn!(
                    "Not audited: {} {} ({})",
                    failure.entity_name, failure.entity, failure.error
                );
            }
        }

        Commands::Preview {
            config_dir,
            input,
            user_name,
            user_id,
            special_keys,
        } => {
            let app_config = AppConfig::load(&config_dir)?;
            init_tracing(&app_config);

            let change_set = load_change_set(&input)?;
            let interest = interest_set(&app_config, special_keys);
            let publisher = Arc::new(MemoryPublisher::new());

            let report = AuditDispatcher::new(publisher.clone())
                .with_options(app_config.audit.options())
                .dispatch_auditable(
                    change_set,
                    Actor::new(user_id, user_name),
                    Arc::new(interest),
                )
                .await;

            let mut records = publisher.records();
            records.sort_by(|a, b| a.id().cmp(b.id()));
            println!("{}", serde_json::to_string_pretty(&records)?);

            for failure in &report.failures {
                warn!(
                    "Not audited: {} {} ({})",
                    failure.entity_name, failure.entity, failure.error
                );
            }
        }

        Commands::Validate { config_dir, input } => {
            let app_config = AppConfig::load(&config_dir)?;
            init_tracing(&app_config);

            info!("Validating configuration in: {}", config_dir);

            registry()
                .get_publisher_factory(&app_config.publisher.publisher_type)?
                .create(app_config.publisher.config.clone())?;
            println!(
                "✓ Publisher '{}' configuration is valid",
                app_config.publisher.publisher_type
            );
            println!(
                "✓ {} special key(s) configured",
                app_config.audit.special_keys.len()
            );

            if let Some(input) = input {
                let document = ChangeSetDocument::from_json(&std::fs::read_to_string(&input)?)?;
                let types = document.descriptor_registry()?.type_names();
                let change_set = document.into_change_set()?;
                println!("✓ {} entity type(s): {}", types.len(), types.join(", "));
                println!(
                    "✓ Change set is valid: {} entities, {} auditable",
                    change_set.len(),
                    change_set.auditable_entries().len()
                );
            }
        }
    }

    Ok(())
}

fn registry() -> Registry {
    let mut registry = Registry::with_builtins();
    registry.register_publisher(Arc::new(NatsPublisherFactory));
    registry
}

fn init_tracing(app_config: &AppConfig) {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&app_config.logging.level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    // stdout belongs to the stdout publisher and preview output
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);

    let result = if app_config.logging.json {
        builder.json().try_init()
    } else {
        builder.try_init()
    };

    if let Err(e) = result {
        eprintln!("Failed to initialize logging: {}", e);
    }
}

fn load_change_set(path: &Path) -> anyhow::Result<Arc<ChangeSet>> {
    let content = std::fs::read_to_string(path)?;
    let change_set = ChangeSetDocument::from_json(&content)?.into_change_set()?;
    info!(
        "Loaded {} entities from {}",
        change_set.len(),
        path.display()
    );
    Ok(Arc::new(change_set))
}

fn interest_set(app_config: &AppConfig, extra: Vec<String>) -> InterestSet {
    let mut interest = app_config.audit.interest_set();
    for key in extra {
        interest.insert(key);
    }
    interest
}
