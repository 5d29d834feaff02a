//! Prometheus metrics for monitoring
//!
//! Exposes metrics for:
//! - Burns recorded and mints matched
//! - Orphans, reconciliations and notifications
//! - Unsupported-chain skips and janitor sweeps
//! - Handler error rates

use crate::error::{CorrelatorError, CorrelatorResult};

use axum::{http::StatusCode, routing::get, Router};
use lazy_static::lazy_static;
use prometheus::{
    register_counter_vec, register_histogram_vec, CounterVec, Encoder, HistogramVec,
    TextEncoder,
};
use std::net::SocketAddr;
use tracing::info;

lazy_static! {
    // Burn side
    pub static ref BURNS_RECORDED: CounterVec = register_counter_vec!(
        "cctp_burns_recorded_total",
        "Total burns stored as pending transfers",
        &["source_chain", "transfer_type"]
    ).unwrap();

    pub static ref RECONCILIATIONS: CounterVec = register_counter_vec!(
        "cctp_reconciliations_total",
        "Total burns that resolved an earlier orphaned mint",
        &["source_chain"]
    ).unwrap();

    // Mint side
    pub static ref MINTS_MATCHED: CounterVec = register_counter_vec!(
        "cctp_mints_matched_total",
        "Total mints matched to a pending burn",
        &["source_chain", "resolved_by"]
    ).unwrap();

    pub static ref ORPHANS: CounterVec = register_counter_vec!(
        "cctp_orphaned_mints_total",
        "Total mints recorded without a matching burn",
        &["source_chain", "reason"]
    ).unwrap();

    pub static ref TRANSFER_DURATION: HistogramVec = register_histogram_vec!(
        "cctp_transfer_duration_seconds",
        "Time between burn and mint observation",
        &["transfer_type"],
        vec![10.0, 30.0, 60.0, 300.0, 900.0, 1800.0, 3600.0, 7200.0, 21600.0]
    ).unwrap();

    // Notifications
    pub static ref NOTIFICATIONS: CounterVec = register_counter_vec!(
        "cctp_notifications_total",
        "Notification attempts by channel and result",
        &["channel", "result"]
    ).unwrap();

    // Skips and housekeeping
    pub static ref UNSUPPORTED_SKIPS: CounterVec = register_counter_vec!(
        "cctp_unsupported_chain_skips_total",
        "Events skipped because a chain is unknown or unobservable",
        &["side", "chain"]
    ).unwrap();

    pub static ref JANITOR_REMOVALS: CounterVec = register_counter_vec!(
        "cctp_janitor_removals_total",
        "Stale index entries removed by the janitor",
        &["index"]
    ).unwrap();

    pub static ref HANDLER_ERRORS: CounterVec = register_counter_vec!(
        "cctp_handler_errors_total",
        "Handler invocations that returned an error",
        &["handler", "kind"]
    ).unwrap();
}

/// Prometheus metrics server
pub struct MetricsServer {
    port: u16,
}

impl MetricsServer {
    pub fn new(port: u16) -> Self {
        Self { port }
    }

    pub async fn run(&self) -> CorrelatorResult<()> {
        let app = Router::new().route("/metrics", get(metrics_handler));

        let addr = SocketAddr::from(([0, 0, 0, 0], self.port));
        info!("Starting metrics server on {}", addr);

        let listener = tokio::net::TcpListener::bind(&addr)
            .await
            .map_err(|e| CorrelatorError::Internal(format!("metrics bind {}: {}", addr, e)))?;
        axum::serve(listener, app)
            .await
            .map_err(|e| CorrelatorError::Internal(format!("metrics server: {}", e)))?;

        Ok(())
    }
}

async fn metrics_handler() -> Result<String, StatusCode> {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    encoder
        .encode(&metric_families, &mut buffer)
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;
    String::from_utf8(buffer).map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)
}

// Helper functions to record metrics

pub fn record_burn(source_chain: &str, transfer_type: &str) {
    BURNS_RECORDED
        .with_label_values(&[source_chain, transfer_type])
        .inc();
}

pub fn record_reconciliation(source_chain: &str) {
    RECONCILIATIONS.with_label_values(&[source_chain]).inc();
}

pub fn record_match(source_chain: &str, resolved_by: &str) {
    MINTS_MATCHED
        .with_label_values(&[source_chain, resolved_by])
        .inc();
}

pub fn record_orphan(source_chain: &str, reason: &str) {
    ORPHANS.with_label_values(&[source_chain, reason]).inc();
}

pub fn record_duration(transfer_type: &str, seconds: i64) {
    TRANSFER_DURATION
        .with_label_values(&[transfer_type])
        .observe(seconds as f64);
}

pub fn record_notification(channel: &str, result: &str) {
    NOTIFICATIONS.with_label_values(&[channel, result]).inc();
}

pub fn record_unsupported(side: &str, chain: &str) {
    UNSUPPORTED_SKIPS.with_label_values(&[side, chain]).inc();
}

pub fn record_janitor_removal(index: &str) {
    JANITOR_REMOVALS.with_label_values(&[index]).inc();
}

pub fn record_handler_error(handler: &str, error: &CorrelatorError) {
    HANDLER_ERRORS
        .with_label_values(&[handler, error.kind()])
        .inc();
}
