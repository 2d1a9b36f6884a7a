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

/// Relayer statistics
#[derive(Debug, Default, Clone)]
pub struct RelayerStats {
    pub valsets_relayed: u64,
    pub data_commitments_relayed: u64,
    /// Attestations that did not reach two thirds before the quorum timeout
    pub quorum_timeouts: u64,
    pub relay_errors: u64,
    pub last_relayed_nonce: u64,
    /// Last event nonce read from the contract
    pub last_contract_nonce: u64,
    pub relayer_address: String,
    pub started: bool,
}

/// Prometheus metrics
pub struct Metrics {
    pub valsets_relayed_total: IntCounter,
    pub data_commitments_relayed_total: IntCounter,
    pub quorum_timeouts_total: IntCounter,
    pub relay_errors_total: IntCounter,
    pub last_relayed_nonce: IntGauge,
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

        let valsets_relayed_total = IntCounter::new(
            "relayer_valsets_relayed_total",
            "Total number of valset updates submitted to the contract",
        )
        .expect("constant metric name is valid");

        let data_commitments_relayed_total = IntCounter::new(
            "relayer_data_commitments_relayed_total",
            "Total number of data root tuple roots submitted to the contract",
        )
        .expect("constant metric name is valid");

        let quorum_timeouts_total = IntCounter::new(
            "relayer_quorum_timeouts_total",
            "Total number of attestations that timed out waiting for two thirds of confirms",
        )
        .expect("constant metric name is valid");

        let relay_errors_total = IntCounter::new(
            "relayer_relay_errors_total",
            "Total number of failed relay ticks",
        )
        .expect("constant metric name is valid");

        let last_relayed_nonce = IntGauge::new(
            "relayer_last_relayed_nonce",
            "Nonce of the last attestation submitted to the contract",
        )
        .expect("constant metric name is valid");

        registry
            .register(Box::new(valsets_relayed_total.clone()))
            .expect("metric registration must not be called twice");
        registry
            .register(Box::new(data_commitments_relayed_total.clone()))
            .expect("metric registration must not be called twice");
        registry
            .register(Box::new(quorum_timeouts_total.clone()))
            .expect("metric registration must not be called twice");
        registry
            .register(Box::new(relay_errors_total.clone()))
            .expect("metric registration must not be called twice");
        registry
            .register(Box::new(last_relayed_nonce.clone()))
            .expect("metric registration must not be called twice");

        Self {
            valsets_relayed_total,
            data_commitments_relayed_total,
            quorum_timeouts_total,
            relay_errors_total,
            last_relayed_nonce,
            registry,
        }
    }
}

pub type SharedStats = Arc<RwLock<RelayerStats>>;
pub type SharedMetrics = Arc<Metrics>;

#[derive(Clone)]
pub struct AppState {
    pub stats: SharedStats,
    pub metrics: SharedMetrics,
}

/// Health check response
#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub relayer_address: String,
    pub started: bool,
    pub valsets_relayed: u64,
    pub data_commitments_relayed: u64,
    pub quorum_timeouts: u64,
    pub relay_errors: u64,
    pub last_relayed_nonce: u64,
    pub last_contract_nonce: u64,
}

async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    let stats = state.stats.read().await;
    Json(HealthResponse {
        status: "healthy".to_string(),
        relayer_address: stats.relayer_address.clone(),
        started: stats.started,
        valsets_relayed: stats.valsets_relayed,
        data_commitments_relayed: stats.data_commitments_relayed,
        quorum_timeouts: stats.quorum_timeouts,
        relay_errors: stats.relay_errors,
        last_relayed_nonce: stats.last_relayed_nonce,
        last_contract_nonce: stats.last_contract_nonce,
    })
}

/// Liveness probe (always returns OK if server is running)
async fn liveness() -> &'static str {
    "OK"
}

/// Ready once the relay loops are running
async fn readiness(State(state): State<AppState>) -> &'static str {
    let stats = state.stats.read().await;
    if stats.started {
        "OK"
    } else {
        "NOT_READY"
    }
}

async fn prometheus_metrics(State(state): State<AppState>) -> Response {
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

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_registered() {
        let metrics = Metrics::new();
        metrics.quorum_timeouts_total.inc();
        let names: Vec<String> = metrics
            .registry
            .gather()
            .iter()
            .map(|f| f.get_name().to_string())
            .collect();
        assert_eq!(names.len(), 5);
        assert!(names.contains(&"relayer_quorum_timeouts_total".to_string()));
    }

    #[tokio::test]
    async fn test_health_reports_counters() {
        let stats: SharedStats = Arc::new(RwLock::new(RelayerStats {
            valsets_relayed: 2,
            last_relayed_nonce: 7,
            ..Default::default()
        }));
        let state = AppState {
            stats,
            metrics: Arc::new(Metrics::new()),
        };

        let Json(health) = health_check(State(state.clone())).await;
        assert_eq!(health.valsets_relayed, 2);
        assert_eq!(health.last_relayed_nonce, 7);
        assert_eq!(readiness(State(state)).await, "NOT_READY");
    }
}
