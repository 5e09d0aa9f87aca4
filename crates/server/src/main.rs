//! Module indexer daemon binary.

use anyhow::{Context, Result};
use clap::Parser;
use figment::Figment;
use figment::providers::{Env, Format, Toml};
use modindex_core::config::AppConfig;
use modindex_forge::ForgeClient;
use modindex_server::{AppState, create_router, run_indexers};
use std::net::SocketAddr;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// modindexd - crawls a forge for module tags and serves them as a feed
#[derive(Parser, Debug)]
#[command(name = "modindexd")]
#[command(version, about, long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(
        short,
        long,
        env = "MODINDEX_CONFIG",
        default_value = "config/modindex.toml"
    )]
    config: String,
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

    tracing::info!("modindex v{}", env!("CARGO_PKG_VERSION"));

    let config = load_config(&args.config)?;
    config
        .validate()
        .context("invalid configuration")?;

    modindex_server::metrics::register_metrics();
    tracing::info!("Prometheus metrics registered");

    let metadata = modindex_metadata::from_config(&config.metadata)
        .await
        .context("failed to initialize metadata store")?;
    metadata
        .health_check()
        .await
        .context("metadata store health check failed")?;
    tracing::info!("Metadata store initialized");

    let forge = ForgeClient::from_config(&config.forge).context("failed to create forge client")?;
    tracing::info!(host = %config.forge.host_name, "Forge client initialized");

    let token = CancellationToken::new();
    spawn_signal_handler(token.clone());

    let indexers = tokio::spawn({
        let metadata = metadata.clone();
        let indexing = config.indexing.clone();
        let token = token.clone();
        async move { run_indexers(metadata, forge, &indexing, token).await }
    });

    let addr: SocketAddr = config.server.bind.parse().context("invalid bind address")?;
    let app = create_router(AppState::new(config, metadata));

    tracing::info!("Listening on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind to {}", addr))?;
    let served = axum::serve(listener, app)
        .with_graceful_shutdown(token.clone().cancelled_owned())
        .await;

    // The HTTP server only returns early on error; stop the indexers too.
    token.cancel();
    let indexed = indexers.await.context("indexer supervisor panicked")?;

    served.context("HTTP server failed")?;
    indexed.context("indexer failed")?;

    tracing::info!("Shutdown complete");
    Ok(())
}

/// Load configuration from the optional file, overlaid with `MODINDEX_` env vars.
fn load_config(path: &str) -> Result<AppConfig> {
    let config_path = std::path::Path::new(path);
    let mut figment = Figment::new();
    let has_config_file = config_path.exists();

    if has_config_file {
        tracing::info!(config_path = %path, "Loading configuration from file");
        figment = figment.merge(Toml::file(path));
    } else {
        tracing::debug!("No config file found at {}", path);
    }

    let has_env_config = std::env::vars()
        .any(|(key, _)| key.starts_with("MODINDEX_") && key != "MODINDEX_CONFIG");

    if !has_config_file && !has_env_config {
        anyhow::bail!(
            "No configuration provided.\n\n\
             Provide configuration via one of:\n  \
             1. Config file: modindexd --config /path/to/config.toml\n  \
             2. Environment variables: MODINDEX_FORGE__HOST_NAME=forge.example \
             MODINDEX_FORGE__AUTH_TOKEN=... modindexd\n\n\
             See config/modindex.example.toml for example configuration.\n\
             Set MODINDEX_CONFIG env var to specify a default config file path."
        );
    }

    if !has_config_file {
        tracing::info!("Using environment variables for configuration");
    }

    figment
        .merge(Env::prefixed("MODINDEX_").split("__"))
        .extract()
        .context("failed to load configuration")
}

/// Cancel `token` on SIGINT or SIGTERM.
fn spawn_signal_handler(token: CancellationToken) {
    tokio::spawn(async move {
        let ctrl_c = async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!(error = %e, "Failed to listen for Ctrl-C");
                std::future::pending::<()>().await;
            }
        };

        #[cfg(unix)]
        let terminate = async {
            match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
                Ok(mut signal) => {
                    signal.recv().await;
                }
                Err(e) => {
                    tracing::error!(error = %e, "Failed to listen for SIGTERM");
                    std::future::pending::<()>().await;
                }
            }
        };

        #[cfg(not(unix))]
        let terminate = std::future::pending::<()>();

        tokio::select! {
            _ = ctrl_c => {},
            _ = terminate => {},
            _ = token.cancelled() => return,
        }

        tracing::info!("Shutdown signal received");
        token.cancel();
    });
}
