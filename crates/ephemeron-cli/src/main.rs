//! ephemeron - expiring registry images.

mod logging;
mod serve;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use ephemeron_core::app::{Reaper, Reconciler};
use ephemeron_core::config::Config;
use ephemeron_core::impls::{RedisTrackingStore, RegistryClient};
use ephemeron_core::metrics;
use ephemeron_core::ports::{Clock, SystemClock, TrackingStore};
use figment::Figment;
use figment::providers::{Env, Format, Toml};

/// Environment variables read into `Config` (lowercased to field names).
const ENV_KEYS: [&str; 11] = [
    "PORT",
    "INTERNAL_PORT",
    "REDIS_URL",
    "REDISCLOUD_URL",
    "HOOK_TOKEN",
    "REGISTRY_URL",
    "DEFAULT_TTL",
    "MAX_TTL",
    "REAP_INTERVAL",
    "REAP_LOCK_LEASE",
    "LOG_FORMAT",
];

/// Ephemeron - deletes registry images once the lifetime in their tag runs out
#[derive(Parser, Debug)]
#[command(name = "ephemeron")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Optional TOML configuration file (environment variables take precedence)
    #[arg(short, long, global = true, env = "EPHEMERON_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Start the webhook server and the reaper loop
    Serve,
    /// Run a single reap cycle (for a CronJob or debugging)
    Reap,
    /// Rebuild tracking state from the registry catalog
    Recover,
    /// Print the version
    Version,
}

fn load_config(path: Option<&Path>) -> Result<Config> {
    let mut figment = Figment::new();
    if let Some(path) = path {
        anyhow::ensure!(
            path.exists(),
            "config file not found: {}",
            path.display()
        );
        figment = figment.merge(Toml::file(path));
    }

    figment
        .merge(Env::raw().only(&ENV_KEYS))
        .extract()
        .context("failed to load configuration")
}

/// Production wiring shared by the commands.
pub(crate) struct Services {
    pub store: Arc<dyn TrackingStore>,
    pub registry: Arc<RegistryClient>,
    pub clock: Arc<dyn Clock>,
}

impl Services {
    /// Connect and ping Redis; an unreachable store is fatal.
    pub async fn connect(config: &Config) -> Result<Self> {
        let store = RedisTrackingStore::connect(config.redis_url())
            .await
            .context("connecting to redis")?;
        store.ping().await.context("redis ping failed")?;
        tracing::info!("connected to redis");

        let registry = RegistryClient::new(&config.registry_url)
            .with_context(|| format!("invalid registry url: {}", config.registry_url))?;

        Ok(Self {
            store: Arc::new(store),
            registry: Arc::new(registry),
            clock: Arc::new(SystemClock),
        })
    }

    pub fn reaper(&self, config: &Config) -> Reaper {
        Reaper::new(
            self.store.clone(),
            self.registry.clone(),
            self.clock.clone(),
            config.reap_lock_lease,
        )
    }

    pub fn reconciler(&self, config: &Config) -> Reconciler {
        Reconciler::new(
            self.store.clone(),
            self.registry.clone(),
            self.clock.clone(),
            config.ttl_policy(),
        )
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    if let Commands::Version = cli.command {
        println!("ephemeron {}", env!("CARGO_PKG_VERSION"));
        return Ok(());
    }

    let config = load_config(cli.config.as_deref())?;
    logging::init(config.log_format);
    config.validate().context("invalid configuration")?;

    match cli.command {
        Commands::Serve => serve::run(config).await,
        Commands::Reap => reap(config).await,
        Commands::Recover => recover(config).await,
        Commands::Version => Ok(()),
    }
}

async fn reap(config: Config) -> Result<()> {
    metrics::register_metrics();
    let services = Services::connect(&config).await?;
    let report = services.reaper(&config).reap_once().await?;
    tracing::info!(
        skipped = report.skipped,
        evaluated = report.evaluated,
        expired = report.expired,
        deleted = report.deleted,
        failed = report.failed,
        bytes_reclaimed = report.bytes_reclaimed,
        "reap complete"
    );
    Ok(())
}

async fn recover(config: Config) -> Result<()> {
    let services = Services::connect(&config).await?;
    let report = services
        .reconciler(&config)
        .run_and_mark_initialized()
        .await?;
    tracing::info!(
        repositories = report.repositories,
        tracked = report.tracked,
        failed = report.failed,
        "recovery complete, tracking store marked initialized"
    );
    Ok(())
}
