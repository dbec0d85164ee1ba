mod api;
mod backend;
mod config;
mod error;
mod health;
mod local_model;
mod metrics;
mod orchestrator;
mod remote;
mod retry;
mod simulation;
mod storage;
mod types;

use anyhow::Result;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use crate::api::AppContext;
use crate::backend::AnalysisBackend;
use crate::health::HealthMonitor;
use crate::local_model::LocalModelRunner;
use crate::orchestrator::AnalysisOrchestrator;
use crate::remote::RemoteAnalyzer;
use crate::storage::{AnalysisStore, ResultStore};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging with filters
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    info!("Starting window analysis node...");

    // Initialize metrics
    metrics::init_metrics();
    info!("Metrics system initialized");

    // Load configuration
    let config = config::Config::load()?;

    // Result store (optional)
    let store = if config.storage_config.enabled {
        tokio::fs::create_dir_all(&config.storage_config.data_dir).await?;
        let store = AnalysisStore::open(&config.storage_config.data_dir)
            .map_err(|e| anyhow::anyhow!("failed to open analysis store: {}", e))?;
        info!(
            dir = %config.storage_config.data_dir,
            existing = store.count(),
            "Analysis store opened"
        );
        Some(Arc::new(store))
    } else {
        info!("Persistence disabled by configuration");
        None
    };

    // Remote analyzer + periodic health monitor
    let remote = Arc::new(
        RemoteAnalyzer::new(&config.remote_config)
            .map_err(|e| anyhow::anyhow!("failed to build remote analyzer: {}", e))?,
    );
    let remote_health = remote.health();
    HealthMonitor::spawn(
        Arc::clone(&remote),
        Duration::from_secs(config.remote_config.health_interval_secs),
    );
    info!(
        url = %config.remote_config.base_url,
        interval_secs = config.remote_config.health_interval_secs,
        "Remote analyzer health monitor started"
    );

    // Local model runner, initialized once in the background so a slow model
    // download never delays API startup
    let local = Arc::new(LocalModelRunner::new(config.model_config.clone()));
    {
        let local = Arc::clone(&local);
        tokio::spawn(async move {
            if let Err(e) = local.initialize().await {
                warn!("Local model unavailable: {}", e);
            }
        });
    }

    let backends: Vec<Arc<dyn AnalysisBackend>> = vec![remote, local];
    let store_for_orchestrator: Option<Arc<dyn ResultStore>> = store
        .as_ref()
        .map(|s| Arc::clone(s) as Arc<dyn ResultStore>);

    let orchestrator = AnalysisOrchestrator::new(backends, store_for_orchestrator)
        .with_fallback_enabled(config.fallback_enabled)
        .with_call_timeout(Duration::from_millis(config.remote_config.timeout_ms));

    let ctx = Arc::new(AppContext {
        orchestrator,
        store,
        remote_health,
    });

    let app = api::router(ctx);

    let addr = format!("{}:{}", config.api_host, config.api_port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("Analysis API listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|e| anyhow::anyhow!("API server error: {}", e))
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Failed to listen for shutdown signal: {}", e);
        return;
    }
    info!("Shutdown signal received");
}
