//! Keel server binary.

use anyhow::{Context, Result};
use clap::Parser;
use figment::Figment;
use figment::providers::{Env, Format, Toml};
use keel_core::config::AppConfig;
use keel_server::bootstrap::ensure_admin_token;
use keel_server::{AppState, create_router};
use std::net::SocketAddr;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Keel - CDN control plane API server
#[derive(Parser, Debug)]
#[command(name = "keeld")]
#[command(version, about, long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, env = "KEEL_CONFIG", default_value = "config/server.toml")]
    config: String,
}

/// Load configuration from an optional TOML file overlaid with `KEEL_`
/// environment variables (`KEEL_SERVER__BIND`, `KEEL_ADMIN__TOKEN_HASH`, ...).
fn load_config(config_path: &str) -> Result<AppConfig> {
    let path = std::path::Path::new(config_path);
    let mut figment = Figment::new();
    let has_config_file = path.exists();

    if has_config_file {
        tracing::info!(config_path = %config_path, "Loading configuration from file");
        figment = figment.merge(Toml::file(path));
    } else {
        tracing::debug!("No config file found at {}", config_path);
    }

    // KEEL_CONFIG only carries the file path.
    let has_env_config =
        std::env::vars().any(|(key, _)| key.starts_with("KEEL_") && key != "KEEL_CONFIG");

    if !has_config_file && !has_env_config {
        anyhow::bail!(
            "No configuration provided.\n\n\
             Provide configuration via one of:\n  \
             1. Config file: keeld --config /path/to/config.toml\n  \
             2. Environment variables: KEEL_SERVER__BIND=0.0.0.0:8080 \
             KEEL_ADMIN__TOKEN_HASH=sha256:YOUR_TOKEN_HASH_HERE keeld\n\n\
             See config/server.example.toml for example configuration.\n\
             Set KEEL_CONFIG env var to specify a default config file path."
        );
    }

    if !has_config_file {
        tracing::info!("Using environment variables for configuration");
    }

    let config: AppConfig = figment
        .merge(Env::prefixed("KEEL_").split("__"))
        .extract()
        .context("failed to load configuration")?;
    config
        .metadata
        .validate()
        .map_err(|e| anyhow::anyhow!("invalid metadata configuration: {e}"))?;
    Ok(config)
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

    tracing::info!("Keel v{}", env!("CARGO_PKG_VERSION"));

    let config = load_config(&args.config)?;

    keel_server::metrics::register_metrics();
    tracing::info!("Prometheus metrics registered");

    let metadata = keel_metadata::from_config(&config.metadata)
        .await
        .context("failed to initialize metadata store")?;
    metadata
        .health_check()
        .await
        .context("metadata health check failed")?;
    tracing::info!("Metadata store initialized");

    ensure_admin_token(metadata.as_ref(), &config.admin).await?;

    let state = AppState::new(config.clone(), metadata);
    let app = create_router(state);

    let addr: SocketAddr = config.server.bind.parse().context("invalid bind address")?;

    tracing::info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind to {}", addr))?;
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;

    Ok(())
}
