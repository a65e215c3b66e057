//! Git LFS proxy server binary.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use figment::Figment;
use figment::providers::{Env, Format, Toml};
use lfs_core::RepositoryName;
use lfs_core::config::AppConfig;
use lfs_cache::KvCache;
use lfs_metadata::{MetadataError, MetadataStore, RepositoryAllowlist};
use lfs_server::{AppState, create_router};
use lfs_storage::ObjectStore;
use std::net::SocketAddr;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// lfsd - A Git LFS Batch API proxy
#[derive(Parser, Debug)]
#[command(name = "lfsd")]
#[command(version, about, long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, env = "LFS_CONFIG", default_value = "config/server.toml")]
    config: String,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug, PartialEq, Eq)]
enum Command {
    /// Run the HTTP server (default)
    Serve,
    /// Manage the repositories this server serves
    Allowlist {
        #[command(subcommand)]
        action: AllowlistAction,
    },
}

#[derive(Subcommand, Debug, PartialEq, Eq)]
enum AllowlistAction {
    /// Allow an `owner/name` repository
    Add { repository: String },
    /// Stop serving a repository
    Remove { repository: String },
    /// List allowed repositories
    List,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = load_config(&args.config)?;

    match args.command.unwrap_or(Command::Serve) {
        Command::Serve => serve(config).await,
        Command::Allowlist { action } => allowlist(config, action).await,
    }
}

/// Load configuration: optional TOML file, then `LFS_` environment
/// variables (`__` separates nesting, e.g. `LFS_SERVER__BIND`).
fn load_config(path: &str) -> Result<AppConfig> {
    let config_path = std::path::Path::new(path);
    let mut figment = Figment::new();

    if config_path.exists() {
        tracing::info!(config_path = %path, "Loading configuration from file");
        figment = figment.merge(Toml::file(path));
    } else {
        tracing::debug!("No config file found at {}", path);
    }

    let config: AppConfig = figment
        .merge(Env::prefixed("LFS_").split("__"))
        .extract()
        .context("failed to load configuration")?;
    config
        .validate()
        .map_err(|e| anyhow::anyhow!("invalid configuration: {e}"))?;
    Ok(config)
}

async fn serve(config: AppConfig) -> Result<()> {
    tracing::info!("lfsd v{}", env!("CARGO_PKG_VERSION"));

    lfs_server::metrics::register_metrics();
    tracing::info!("Prometheus metrics registered");

    let storage =
        lfs_storage::from_config(&config.storage).context("failed to initialize storage")?;
    // Fail fast instead of reporting healthy with unreachable storage.
    storage
        .health_check()
        .await
        .context("storage health check failed")?;
    tracing::info!(backend = storage.backend_name(), "Storage backend connectivity verified");

    let metadata = lfs_metadata::from_config(&config.metadata)
        .await
        .context("failed to initialize metadata store")?;
    metadata.migrate().await.context("failed to run migrations")?;
    tracing::info!("Metadata store initialized");

    let cache = lfs_cache::from_config(&config.cache)
        .await
        .context("failed to initialize cache")?;
    tracing::info!(backend = cache.backend_name(), "Cache initialized");

    let addr: SocketAddr = config.server.bind.parse().context("invalid bind address")?;
    let state = AppState::new(config, metadata, cache, storage)?;
    let app = create_router(state);

    tracing::info!("Listening on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind to {}", addr))?;
    axum::serve(listener, app).await?;

    Ok(())
}

async fn allowlist(config: AppConfig, action: AllowlistAction) -> Result<()> {
    let metadata = lfs_metadata::from_config(&config.metadata)
        .await
        .context("failed to initialize metadata store")?;
    metadata.migrate().await.context("failed to run migrations")?;
    let cache = lfs_cache::from_config(&config.cache)
        .await
        .context("failed to initialize cache")?;
    let allowlist = RepositoryAllowlist::new(metadata, cache, config.ttl.allowlist());

    match action {
        AllowlistAction::Add { repository } => {
            let repo = RepositoryName::parse(&repository)?;
            if allowlist.add(&repo).await? {
                println!("added {repo}");
            } else {
                println!("{repo} is already allowed");
            }
        }
        AllowlistAction::Remove { repository } => {
            let repo = RepositoryName::parse(&repository)?;
            match allowlist.remove(&repo).await {
                Ok(()) => println!("removed {repo}"),
                Err(MetadataError::NotFound(_)) => {
                    anyhow::bail!("{repo} is not in the allowlist")
                }
                Err(e) => return Err(e.into()),
            }
        }
        AllowlistAction::List => {
            for row in allowlist.list().await? {
                println!("{}\t{}", row.repository, row.created_at);
            }
        }
    }
    Ok(())
}
