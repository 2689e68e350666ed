//! Flashline — scheduled flash ingestion and fan-out pipeline.
//!
//! Polls the upstream flash API, persists new flashes to Postgres, mirrors
//! flash images into the object store, republishes newly-seen flashes onto
//! Redpanda, and retries failed downstream work from a disk ledger.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::signal;
use tracing::{error, info};

use flash_core::{PolicyConfig, ProcessPolicy};
use postgres_store::{PgFlashStore, PgStore, PostgresConfig};
use redpanda::{FlashPublisher, Producer, RedpandaConfig};
use telemetry::{health, init_tracing_from_env};
use worker::{
    ChangeDetector, Coordinator, DetectorConfig, FailureLedger, ImageSync, InvadersApi, Scheduler,
    SchedulerConfig, SourceConfig, SystemRandom, UploadConfig,
};

/// Application configuration.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
struct Config {
    /// Seconds between pipeline runs
    #[serde(default = "default_sync_interval_secs")]
    sync_interval_secs: u64,

    /// Directory for failed-batch envelopes
    #[serde(default = "default_ledger_dir")]
    ledger_dir: String,

    /// Parallel publishes per run
    #[serde(default = "default_publish_concurrency")]
    publish_concurrency: usize,

    #[serde(default)]
    postgres: PostgresConfig,

    #[serde(default)]
    redpanda: RedpandaConfig,

    #[serde(default)]
    source: SourceConfig,

    #[serde(default)]
    uploader: UploadConfig,

    #[serde(default)]
    detector: DetectorConfig,

    #[serde(default)]
    policy: PolicyConfig,
}

fn default_sync_interval_secs() -> u64 {
    300
}

fn default_ledger_dir() -> String {
    "failed-flashes".to_string()
}

fn default_publish_concurrency() -> usize {
    8
}

impl Default for Config {
    fn default() -> Self {
        Self {
            sync_interval_secs: default_sync_interval_secs(),
            ledger_dir: default_ledger_dir(),
            publish_concurrency: default_publish_concurrency(),
            postgres: PostgresConfig::default(),
            redpanda: RedpandaConfig::default(),
            source: SourceConfig::default(),
            uploader: UploadConfig::default(),
            detector: DetectorConfig::default(),
            policy: PolicyConfig::default(),
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Install rustls crypto provider BEFORE any TLS operations
    // rustls 0.23+ requires explicit crypto provider selection
    rustls::crypto::ring::default_provider()
        .install_default()
        .expect("Failed to install rustls crypto provider");

    // Load .env file if present
    dotenvy::dotenv().ok();

    // Initialize tracing
    init_tracing_from_env();

    info!("Starting flashline v{}", env!("CARGO_PKG_VERSION"));

    let config = load_config()?;
    let run_once = std::env::args().any(|arg| arg == "--once");

    // Connect Postgres and make sure the schema exists
    let store_client = PgStore::connect(config.postgres.clone())
        .await
        .context("Failed to connect to Postgres")?;
    postgres_store::schema::init_schema(store_client.pool())
        .await
        .context("Failed to initialize Postgres schema")?;

    // Queue producer; connections are lazy, health is checked below
    let producer = Arc::new(Producer::new(config.redpanda.clone()));

    check_health(&config, &store_client).await;

    // Assemble the pipeline
    let store = Arc::new(PgFlashStore::new(store_client.clone()));
    let source = Arc::new(
        InvadersApi::new(config.source.clone())
            .map_err(|e| anyhow::anyhow!("Failed to build source client: {}", e))?,
    );
    let policy: Arc<dyn ProcessPolicy> = Arc::from(config.policy.clone().build());
    info!(policy = policy.name(), "Loaded process policy");

    let ledger = Arc::new(FailureLedger::new(&config.ledger_dir));
    let detector = Arc::new(ChangeDetector::new(
        config.detector.clone(),
        Box::new(SystemRandom::new()),
    ));

    let mut coordinator = Coordinator::new(
        store,
        producer.clone() as Arc<dyn FlashPublisher>,
        source,
        policy,
        ledger,
    )
    .with_detector(detector)
    .with_publish_concurrency(config.publish_concurrency);

    if config.uploader.enabled {
        let uploader = Arc::new(
            ImageSync::new(config.uploader.clone())
                .map_err(|e| anyhow::anyhow!("Failed to build uploader: {}", e))?,
        );
        coordinator = coordinator.with_uploader(uploader);
    }

    let coordinator = Arc::new(coordinator);

    if run_once {
        // One-shot script mode: a fatal run is visible as the exit code.
        let summary = coordinator.run().await;
        if summary.is_fatal() {
            anyhow::bail!("run {} failed: {:?}", summary.run_id, summary.outcome);
        }
        return Ok(());
    }

    // Scheduled mode: runs are serialized inside the scheduler and a
    // failed run never kills the process.
    let scheduler = Arc::new(Scheduler::new(
        SchedulerConfig {
            sync_interval: Duration::from_secs(config.sync_interval_secs),
        },
        coordinator,
    ));
    let _scheduler_handle = scheduler.start();

    shutdown_signal().await;

    info!("Shutdown complete");
    Ok(())
}

/// Load configuration from files and environment.
fn load_config() -> Result<Config> {
    let config = config::Config::builder()
        // Start with defaults
        .add_source(config::Config::try_from(&Config::default())?)
        // Load from config file if exists
        .add_source(
            config::File::with_name("config/default")
                .required(false)
                .format(config::FileFormat::Toml),
        )
        // Override with environment variables
        .add_source(
            config::Environment::default()
                .separator("__")
                .prefix("FLASHLINE")
                .try_parsing(true),
        )
        .build()
        .context("Failed to build configuration")?;

    let mut config: Config = config
        .try_deserialize()
        .context("Failed to deserialize configuration")?;

    // Manual overrides for nested config from environment
    // The config crate's nested parsing doesn't work reliably with underscored field names
    if let Ok(url) = std::env::var("FLASHLINE_POSTGRES_URL") {
        config.postgres.url = url;
    }
    if let Ok(brokers) = std::env::var("FLASHLINE_REDPANDA_BROKERS") {
        config.redpanda.brokers = brokers.split(',').map(|s| s.trim().to_string()).collect();
    }
    if let Ok(topic) = std::env::var("FLASHLINE_REDPANDA_TOPIC") {
        config.redpanda.topic = topic;
    }
    if let Ok(base_url) = std::env::var("FLASHLINE_SOURCE_BASE_URL") {
        config.source.base_url = base_url;
    }
    if let Ok(url) = std::env::var("FLASHLINE_UPLOAD_URL") {
        config.uploader.upload_url = url;
        config.uploader.enabled = true;
    }
    if let Ok(key) = std::env::var("FLASHLINE_UPLOAD_API_KEY") {
        config.uploader.api_key = key;
    }
    if let Ok(dir) = std::env::var("FLASHLINE_LEDGER_DIR") {
        config.ledger_dir = dir;
    }

    Ok(config)
}

/// Check collaborator health on startup.
async fn check_health(config: &Config, store: &PgStore) {
    let queue_healthy = redpanda::health::check_connection(&config.redpanda).await;
    if queue_healthy {
        health().queue.set_healthy();
        info!("Redpanda connection: healthy");
    } else {
        health().queue.set_unhealthy("Connection failed");
        error!("Redpanda connection: unhealthy");
    }

    let store_healthy = postgres_store::health::check_connection(store).await;
    if store_healthy {
        health().store.set_healthy();
        info!("Postgres connection: healthy");
    } else {
        health().store.set_unhealthy("Connection failed");
        error!("Postgres connection: unhealthy");
    }
}

/// Graceful shutdown signal handler.
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C signal");
        }
        _ = terminate => {
            info!("Received terminate signal");
        }
    }
}
