//! HTTP server for health and metrics endpoints

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    extract::State,
    http::header,
    response::{IntoResponse, Json, Response},
    routing::get,
    Router,
};
use eyre::eyre;
use prometheus::{Encoder, IntCounter, IntGauge, Registry, TextEncoder};
use serde::Serialize;
use tokio::sync::RwLock;
use tracing::info;

/// Orchestrator statistics shared between the workers and the HTTP server
#[derive(Debug, Default, Clone)]
pub struct OrchestratorStats {
    /// Confirms broadcast successfully
    pub confirms_broadcast: u64,
    /// Attestations this orchestrator had already confirmed
    pub confirms_skipped: u64,
    /// Attestations given up on after retries
    pub broadcast_failures: u64,
    /// Highest nonce handled by a worker
    pub last_processed_nonce: u64,
    /// Set once the dispatcher and workers are running
    pub started: bool,
    /// Chain account the confirms are sent from
    pub orchestrator_address: String,
    /// EVM address the attestations are signed with
    pub evm_address: String,
}

/// Prometheus metrics
pub struct Metrics {
    pub confirms_broadcast_total: IntCounter,
    pub confirms_skipped_total: IntCounter,
    pub broadcast_failures_total: IntCounter,
    pub last_processed_nonce: IntGauge,
    /// Current entries in the dedupe cache
    pub dedupe_cache_size: IntGauge,
    pub registry: Registry,
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

impl Metrics {
    pub fn new() -> Self {
        let registry = Registry::new();

        let confirms_broadcast_total = IntCounter::new(
            "orchestrator_confirms_broadcast_total",
            "Total number of confirms broadcast",
        )
        .expect("constant metric name is valid");

        let confirms_skipped_total = IntCounter::new(
            "orchestrator_confirms_skipped_total",
            "Total number of attestations skipped because they were already confirmed",
        )
        .expect("constant metric name is valid");

        let broadcast_failures_total = IntCounter::new(
            "orchestrator_broadcast_failures_total",
            "Total number of attestations that could not be confirmed after retries",
        )
        .expect("constant metric name is valid");

        let last_processed_nonce = IntGauge::new(
            "orchestrator_last_processed_nonce",
            "Highest attestation nonce handled",
        )
        .expect("constant metric name is valid");

        let dedupe_cache_size = IntGauge::new(
            "orchestrator_dedupe_cache_size",
            "Current entries in the nonce dedupe cache",
        )
        .expect("constant metric name is valid");

        registry
            .register(Box::new(confirms_broadcast_total.clone()))
            .expect("metric registration must not be called twice");
        registry
            .register(Box::new(confirms_skipped_total.clone()))
            .expect("metric registration must not be called twice");
        registry
            .register(Box::new(broadcast_failures_total.clone()))
            .expect("metric registration must not be called twice");
        registry
            .register(Box::new(last_processed_nonce.clone()))
            .expect("metric registration must not be called twice");
        registry
            .register(Box::new(dedupe_cache_size.clone()))
            .expect("metric registration must not be called twice");

        Self {
            confirms_broadcast_total,
            confirms_skipped_total,
            broadcast_failures_total,
            last_processed_nonce,
            dedupe_cache_size,
            registry,
        }
    }
}

/// Shared state for the HTTP server
pub type SharedStats = Arc<RwLock<OrchestratorStats>>;
pub type SharedMetrics = Arc<Metrics>;

/// Combined app state
#[derive(Clone)]
pub struct AppState {
    pub stats: SharedStats,
    pub metrics: SharedMetrics,
}

/// Health check response
#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub orchestrator_address: String,
    pub evm_address: String,
    pub started: bool,
    pub confirms_broadcast: u64,
    pub confirms_skipped: u64,
    pub broadcast_failures: u64,
    pub last_processed_nonce: u64,
}

async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    let stats = state.stats.read().await;
    Json(HealthResponse {
        status: "healthy".to_string(),
        orchestrator_address: stats.orchestrator_address.clone(),
        evm_address: stats.evm_address.clone(),
        started: stats.started,
        confirms_broadcast: stats.confirms_broadcast,
        confirms_skipped: stats.confirms_skipped,
        broadcast_failures: stats.broadcast_failures,
        last_processed_nonce: stats.last_processed_nonce,
    })
}

/// Liveness probe (always returns OK if server is running)
async fn liveness() -> &'static str {
    "OK"
}

/// Ready once the confirm pipeline is running
async fn readiness(State(state): State<AppState>) -> &'static str {
    let stats = state.stats.read().await;
    if stats.started {
        "OK"
    } else {
        "NOT_READY"
    }
}

async fn prometheus_metrics(State(state): State<AppState>) -> Response {
    let stats = state.stats.read().await;
    state
        .metrics
        .last_processed_nonce
        .set(stats.last_processed_nonce as i64);
    drop(stats);

    let encoder = TextEncoder::new();
    let metric_families = state.metrics.registry.gather();
    let mut buffer = Vec::new();

    if encoder.encode(&metric_families, &mut buffer).is_err() {
        return (
            axum::http::StatusCode::INTERNAL_SERVER_ERROR,
            "Failed to encode metrics",
        )
            .into_response();
    }

    match Response::builder()
        .header(header::CONTENT_TYPE, encoder.format_type())
        .body(axum::body::Body::from(buffer))
    {
        Ok(resp) => resp,
        Err(_) => (
            axum::http::StatusCode::INTERNAL_SERVER_ERROR,
            "Failed to build metrics response",
        )
            .into_response(),
    }
}

pub fn router(stats: SharedStats, metrics: SharedMetrics) -> Router {
    let state = AppState { stats, metrics };

    Router::new()
        .route("/health", get(health_check))
        .route("/healthz", get(liveness))
        .route("/readyz", get(readiness))
        .route("/metrics", get(prometheus_metrics))
        .with_state(state)
}

/// Start the HTTP server for health and metrics
pub async fn start_server(
    bind_address: &str,
    port: u16,
    stats: SharedStats,
    metrics: SharedMetrics,
) -> eyre::Result<()> {
    let app = router(stats, metrics);

    let addr: SocketAddr = format!("{}:{}", bind_address, port)
        .parse()
        .map_err(|e| eyre!("Invalid bind address {}:{}: {}", bind_address, port, e))?;
    info!("Health server listening on {}", addr);
    info!("  /health  - Full health status (JSON)");
    info!("  /metrics - Prometheus metrics");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
