//! CCTP Correlator - burn/mint correlation for cross-chain USDC transfers
//!
//! Ingests decoded transaction feeds from every supported chain, pairs each
//! burn on a source chain with its mint on the destination chain, and
//! announces completed transfers and orphaned mints over webhooks.

use anyhow::{Context, Result};
use std::sync::Arc;
use tokio::signal;
use tokio::time::Duration;
use tracing::{error, info};

mod api;
mod chain;
mod clock;
mod config;
mod correlation;
mod error;
mod events;
mod metrics;
mod notify;
mod state;

use clock::SystemClock;
use config::{Settings, StoreBackend};
use correlation::{CorrelationContext, CorrelationEngine, StaleIndexJanitor};
use events::AbiEventDecoder;
use metrics::MetricsServer;
use notify::{EnvSecrets, WebhookNotifier};
use state::{KeySpace, KvBackend, MemoryStore, PgStore, Store};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    init_logging();

    info!("Starting CCTP Correlator v{}", env!("CARGO_PKG_VERSION"));

    // Load configuration
    let settings = Settings::load()?;
    let chains = Arc::new(settings.chain_registry()?);
    info!(
        "Loaded configuration for instance {} ({} chains)",
        settings.service.instance_id,
        chains.entries().len()
    );

    let clock = Arc::new(SystemClock);

    // Initialize the record store
    let backend: Arc<dyn KvBackend> = match settings.store.backend {
        StoreBackend::Postgres => {
            let pg = PgStore::new(&settings.store)
                .await
                .context("Failed to connect to postgres store")?;
            pg.run_migrations().await?;
            info!("Postgres store ready");
            Arc::new(pg)
        }
        StoreBackend::Memory => {
            info!("Using in-memory store; records will not survive a restart");
            Arc::new(MemoryStore::new(clock.clone()))
        }
    };
    let store = Store::new(backend, KeySpace::new(settings.store.namespace.as_deref()));
    let ctx = CorrelationContext::new(store.clone(), chains, clock);

    // Event decoder and webhook delivery
    let decoder = AbiEventDecoder::new(
        settings.contracts.token_messenger_address()?,
        settings.contracts.message_transmitter_address()?,
    )?;
    let notifier = WebhookNotifier::new(&settings.notifier, Arc::new(EnvSecrets))?;

    let engine = Arc::new(CorrelationEngine::new(
        ctx.clone(),
        Arc::new(decoder),
        Arc::new(notifier),
        settings.notifier.explorer_tx_url.clone(),
    ));
    info!("Correlation engine initialized");

    // Start API server
    let api_handle = tokio::spawn({
        let config = settings.api.clone();
        let state = api::AppState {
            engine: engine.clone(),
            store,
        };
        async move {
            if let Err(e) = api::run_server(config, state).await {
                error!("API server error: {}", e);
            }
        }
    });

    // Start metrics server
    let metrics_handle = if settings.metrics.enabled {
        let server = MetricsServer::new(settings.metrics.port);
        Some(tokio::spawn(async move {
            if let Err(e) = server.run().await {
                error!("Metrics server error: {}", e);
            }
        }))
    } else {
        None
    };

    // Start stale-index janitor
    let janitor = Arc::new(StaleIndexJanitor::new(ctx, settings.janitor.concurrency));
    let janitor_handle = if settings.janitor.enabled {
        let janitor = janitor.clone();
        let every = Duration::from_secs(settings.janitor.interval_secs);
        Some(tokio::spawn(async move { janitor.run(every).await }))
    } else {
        None
    };

    info!("CCTP Correlator is running");
    info!("API server: http://{}:{}", settings.api.host, settings.api.port);
    if settings.metrics.enabled {
        info!("Metrics: http://0.0.0.0:{}/metrics", settings.metrics.port);
    }

    // Wait for shutdown signal
    shutdown_signal().await;

    info!("Shutdown signal received, stopping...");

    // Graceful shutdown
    janitor.stop().await;

    // Abort background tasks
    api_handle.abort();
    if let Some(h) = janitor_handle {
        h.abort();
    }
    if let Some(h) = metrics_handle {
        h.abort();
    }

    info!("CCTP Correlator stopped");
    Ok(())
}

fn init_logging() {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new("info,cctp_correlator=debug,sqlx=warn,hyper=warn")
    });

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(true).with_thread_ids(true))
        .init();
}

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
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
