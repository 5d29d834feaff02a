//! HTTP API for ingestion, health checks and record lookups

use crate::config::ApiConfig;
use crate::correlation::{CorrelationEngine, IngestReport};
use crate::error::{CorrelatorError, CorrelatorResult};
use crate::events::RawTransaction;
use crate::state::keys::StatSide;
use crate::state::records::{NotifiedMarker, UnsupportedChainStat};
use crate::state::Store;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{error, info, info_span, Instrument};
use uuid::Uuid;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<CorrelationEngine>,
    pub store: Store,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/ready", get(readiness_check))
        .route("/v1/transactions", post(ingest_transaction))
        .route(
            "/v1/transfers/:source_chain/:canonical_key",
            get(get_transfer),
        )
        .route("/v1/stats/unsupported", get(get_unsupported_stats))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Run the HTTP API server
pub async fn run_server(config: ApiConfig, state: AppState) -> CorrelatorResult<()> {
    let app = router(state);

    let addr = format!("{}:{}", config.host, config.port);
    info!("Starting API server on {}", addr);

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .map_err(|e| CorrelatorError::Internal(format!("Failed to bind {}: {}", addr, e)))?;
    axum::serve(listener, app)
        .await
        .map_err(|e| CorrelatorError::Internal(format!("API server failed: {}", e)))?;

    Ok(())
}

/// Error body returned by every failing endpoint
struct ApiError {
    status: StatusCode,
    kind: &'static str,
    message: String,
}

impl From<CorrelatorError> for ApiError {
    fn from(e: CorrelatorError) -> Self {
        let status = match &e {
            CorrelatorError::Decode(_) | CorrelatorError::Validation(_) => StatusCode::BAD_REQUEST,
            e if e.is_retryable() => StatusCode::SERVICE_UNAVAILABLE,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        Self {
            status,
            kind: e.kind(),
            message: e.to_string(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (
            self.status,
            Json(ErrorResponse {
                error: self.kind,
                message: self.message,
            }),
        )
            .into_response()
    }
}

/// Health check endpoint - basic liveness
async fn health_check() -> impl IntoResponse {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

/// Readiness check - the store must answer
async fn readiness_check(State(state): State<AppState>) -> impl IntoResponse {
    match state.store.backend().health_check().await {
        Ok(()) => (
            StatusCode::OK,
            Json(ReadinessResponse {
                ready: true,
                store: true,
                error: None,
            }),
        ),
        Err(e) => (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(ReadinessResponse {
                ready: false,
                store: false,
                error: Some(e.to_string()),
            }),
        ),
    }
}

async fn ingest_transaction(
    State(state): State<AppState>,
    Json(tx): Json<RawTransaction>,
) -> Result<Json<IngestResponse>, ApiError> {
    let request_id = Uuid::new_v4();
    let span = info_span!("ingest", %request_id, chain_id = tx.network, tx = %tx.hash);

    let report = state.engine.ingest(&tx).instrument(span).await.map_err(|e| {
        error!("Ingest {} failed for {}: {}", request_id, tx.hash, e);
        ApiError::from(e)
    })?;

    Ok(Json(IngestResponse { request_id, report }))
}

async fn get_transfer(
    State(state): State<AppState>,
    Path((source_chain, canonical_key)): Path<(String, String)>,
) -> Result<Json<TransferResponse>, ApiError> {
    let store = &state.store;
    let keys = store.keys();

    let pending = store
        .get_raw(&keys.pending(&source_chain, &canonical_key))
        .await
        .map_err(CorrelatorError::from)?;
    let completed = store
        .get_raw(&keys.completed(&source_chain, &canonical_key))
        .await
        .map_err(CorrelatorError::from)?;
    let orphan_index = store
        .get_raw(&keys.orphan_index(&source_chain, &canonical_key))
        .await
        .map_err(CorrelatorError::from)?;
    let notified = store
        .get_raw(&keys.notified(&source_chain, &canonical_key))
        .await
        .map_err(CorrelatorError::from)?
        .map(|marker| NotifiedMarker::is_set(&marker))
        .unwrap_or(false);

    if pending.is_none() && completed.is_none() && orphan_index.is_none() && !notified {
        return Err(ApiError {
            status: StatusCode::NOT_FOUND,
            kind: "not_found",
            message: format!("No records for {} on {}", canonical_key, source_chain),
        });
    }

    Ok(Json(TransferResponse {
        source_chain,
        canonical_key,
        pending,
        completed,
        orphan_index,
        notified,
    }))
}

async fn get_unsupported_stats(
    State(state): State<AppState>,
) -> Result<Json<UnsupportedStatsResponse>, ApiError> {
    let store = &state.store;
    let mut stats = Vec::new();

    for side in [StatSide::Source, StatSide::Destination] {
        let prefix = store.keys().unsupported_stat(side, "");
        let found = store.backend().keys(&prefix).await.map_err(CorrelatorError::from)?;

        for key in found {
            let chain = key.trim_start_matches(prefix.as_str()).to_string();
            let Some(stat) = store
                .get::<UnsupportedChainStat>(&key)
                .await
                .map_err(CorrelatorError::from)?
            else {
                continue;
            };
            stats.push(UnsupportedStat {
                side: side.label(),
                chain,
                count: stat.count,
                last_seen: stat.last_seen,
            });
        }
    }

    Ok(Json(UnsupportedStatsResponse { stats }))
}

// Response types

#[derive(Serialize)]
struct HealthResponse {
    status: String,
    version: String,
}

#[derive(Serialize)]
struct ReadinessResponse {
    ready: bool,
    store: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

#[derive(Serialize)]
struct ErrorResponse {
    error: &'static str,
    message: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct IngestResponse {
    request_id: Uuid,
    report: IngestReport,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct TransferResponse {
    source_chain: String,
    canonical_key: String,
    pending: Option<Value>,
    completed: Option<Value>,
    orphan_index: Option<Value>,
    notified: bool,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct UnsupportedStat {
    side: &'static str,
    chain: String,
    count: u64,
    last_seen: i64,
}

#[derive(Serialize)]
struct UnsupportedStatsResponse {
    stats: Vec<UnsupportedStat>,
}
