//! Seismic intake service (seismo-ingest) - Main entry point
//!
//! Polls the USGS feed, assesses per-country impact for each new earthquake,
//! stores the results and serves them over HTTP with a live SSE stream.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use seismo_common::config::{load_or_default, CompiledDefaults};
use seismo_common::events::NotificationHub;
use tokio::signal;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use seismo_ingest::config::{resolve, ConfigOverrides};
use seismo_ingest::services::inference::client::{ChatCompletion, HuggingFaceTransport};
use seismo_ingest::services::{spawn_poller, ImpactInferenceClient, SeismicProcessor, UsgsClient};
use seismo_ingest::{build_router, db, AppState};

const CONFIG_FILE_NAME: &str = "seismo-ingest.toml";
const SUBSCRIBER_BUFFER: usize = 64;

/// Command-line arguments for seismo-ingest
#[derive(Parser, Debug)]
#[command(name = "seismo-ingest")]
#[command(about = "Earthquake intake and impact assessment service")]
#[command(version)]
struct Args {
    /// Config file path (overrides SEISMO_CONFIG and default locations)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// SQLite database file
    #[arg(long, env = "SEISMO_DATABASE")]
    database: Option<PathBuf>,

    /// Address to listen on
    #[arg(short, long, env = "SEISMO_BIND")]
    bind: Option<String>,

    /// USGS FDSN event service URL
    #[arg(long, env = "SEISMO_FEED_URL")]
    feed_url: Option<String>,

    /// Minimum magnitude to ingest
    #[arg(long, env = "SEISMO_MIN_MAGNITUDE")]
    min_magnitude: Option<f64>,

    /// Seconds between poll cycles
    #[arg(long, env = "SEISMO_POLL_INTERVAL")]
    poll_interval: Option<u64>,

    /// Hugging Face API token (fallback estimation only when unset)
    #[arg(long, env = "SEISMO_HF_API_TOKEN", hide_env_values = true)]
    hf_api_token: Option<String>,

    /// Chat model used for impact assessment
    #[arg(long, env = "SEISMO_HF_MODEL")]
    hf_model: Option<String>,

    /// Chat-completions endpoint
    #[arg(long, env = "SEISMO_INFERENCE_URL")]
    inference_url: Option<String>,

    /// Comma-separated browser origins allowed by CORS ("*" for any)
    #[arg(long, env = "SEISMO_CORS_ORIGINS", value_delimiter = ',')]
    cors_origins: Option<Vec<String>>,
}

impl Args {
    fn overrides(&self) -> ConfigOverrides {
        ConfigOverrides {
            database_path: self.database.clone(),
            bind_address: self.bind.clone(),
            feed_url: self.feed_url.clone(),
            min_magnitude: self.min_magnitude,
            poll_interval_seconds: self.poll_interval,
            huggingface_api_token: self.hf_api_token.clone(),
            huggingface_model: self.hf_model.clone(),
            inference_url: self.inference_url.clone(),
            cors_origins: self.cors_origins.clone(),
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Config file is read before tracing so its log level can seed the filter
    let loaded = load_or_default(args.config.as_deref(), CONFIG_FILE_NAME);
    let default_filter = format!(
        "seismo_ingest={level},seismo_common={level},tower_http={level}",
        level = loaded.config.logging.level
    );

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!(
        "Starting seismo-ingest v{} [{}] built {} ({})",
        env!("CARGO_PKG_VERSION"),
        env!("GIT_HASH"),
        env!("BUILD_TIMESTAMP"),
        env!("BUILD_PROFILE")
    );
    loaded.log_source();

    let config = resolve(args.overrides(), loaded.config, CompiledDefaults::for_current_platform())
        .context("Invalid configuration")?;

    info!("Database: {}", config.database_path.display());
    info!(
        "Feed: {} (min magnitude {}, every {}s)",
        config.feed_url,
        config.min_magnitude,
        config.poll_interval.as_secs()
    );

    let pool = db::init_database_pool(&config.database_path)
        .await
        .context("Failed to initialize database")?;

    let hub = NotificationHub::new(SUBSCRIBER_BUFFER);

    let feed = UsgsClient::new(config.feed_url.clone(), config.min_magnitude)
        .context("Failed to build feed client")?;

    let transport = match &config.huggingface_api_token {
        Some(token) => {
            let transport = HuggingFaceTransport::new(
                config.inference_url.clone(),
                token.clone(),
                config.huggingface_model.clone(),
            )
            .context("Failed to build inference client")?;
            info!("Impact inference via {} ({})", config.inference_url, config.huggingface_model);
            Some(Arc::new(transport) as Arc<dyn ChatCompletion>)
        }
        None => None,
    };

    let processor = Arc::new(SeismicProcessor::new(
        pool.clone(),
        Arc::new(feed),
        ImpactInferenceClient::new(transport),
        config.cache_ttl,
    ));

    let state = AppState::new(pool.clone(), hub.clone(), processor.clone())
        .with_cors_origins(config.cors_origins.clone());

    let shutdown = state.shutdown.clone();
    let poller = spawn_poller(
        processor,
        hub,
        config.poll_interval,
        shutdown.clone(),
        state.polling_active.clone(),
    );

    let app = build_router(state);

    let listener = tokio::net::TcpListener::bind(&config.bind_address)
        .await
        .with_context(|| format!("Failed to bind to {}", config.bind_address))?;

    info!("Listening on http://{}", config.bind_address);

    // Open live streams end on this token, so cancel it before draining
    let signal_token = shutdown.clone();
    let served = axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            shutdown_signal().await;
            signal_token.cancel();
        })
        .await;

    info!("HTTP server stopped, waiting for poller");
    shutdown.cancel();
    if let Err(e) = poller.await {
        error!("Poller task failed: {}", e);
    }

    pool.close().await;
    served.context("Server error")?;
    info!("Shutdown complete");
    Ok(())
}

/// Resolves on Ctrl+C or SIGTERM
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, shutting down");
        },
        _ = terminate => {
            info!("Received terminate signal, shutting down");
        },
    }
}
