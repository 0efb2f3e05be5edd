//! Prometheus metrics for monitoring
//!
//! Exposes metrics for:
//! - Chain connection status
//! - Deployment and registration progress
//! - Transfer submissions by outcome
//! - Settlement polling and latency

use crate::error::{LinkupError, LinkupResult};

use axum::{routing::get, Router};
use lazy_static::lazy_static;
use prometheus::{
    register_counter_vec, register_gauge_vec, register_histogram_vec, CounterVec, Encoder,
    GaugeVec, HistogramVec, TextEncoder,
};
use std::net::SocketAddr;
use tracing::info;

lazy_static! {
    // Chain metrics
    pub static ref CHAIN_CONNECTED: GaugeVec = register_gauge_vec!(
        "linkup_chain_connected",
        "Chain connection status (1=connected, 0=disconnected)",
        &["chain"]
    ).unwrap();

    // Setup metrics
    pub static ref DEPLOYMENTS: CounterVec = register_counter_vec!(
        "linkup_deployments_total",
        "Chains with token and linker deployed",
        &["chain"]
    ).unwrap();

    pub static ref REGISTRATIONS: CounterVec = register_counter_vec!(
        "linkup_registrations_total",
        "Linker peer registrations completed",
        &["chain"]
    ).unwrap();

    // Transfer metrics
    pub static ref SUBMISSIONS: CounterVec = register_counter_vec!(
        "linkup_submissions_total",
        "Cross-chain send submissions by outcome",
        &["chain", "status"]
    ).unwrap();

    // Settlement metrics
    pub static ref SETTLEMENT_POLLS: CounterVec = register_counter_vec!(
        "linkup_settlement_polls_total",
        "Destination balance polls issued",
        &["chain"]
    ).unwrap();

    pub static ref SETTLEMENTS: CounterVec = register_counter_vec!(
        "linkup_settlements_total",
        "Settlements observed",
        &["chain"]
    ).unwrap();

    pub static ref SETTLEMENT_LATENCY: HistogramVec = register_histogram_vec!(
        "linkup_settlement_latency_seconds",
        "Time from watch start to observed settlement",
        &["chain"],
        vec![1.0, 2.5, 5.0, 10.0, 30.0, 60.0, 120.0, 300.0, 600.0]
    ).unwrap();

    // Phase metrics
    pub static ref PHASE_DURATION: HistogramVec = register_histogram_vec!(
        "linkup_phase_duration_seconds",
        "Orchestration phase durations",
        &["phase"],
        vec![0.1, 0.5, 1.0, 5.0, 15.0, 60.0, 300.0]
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

    pub async fn run(&self) -> LinkupResult<()> {
        let app = Router::new()
            .route("/metrics", get(metrics_handler))
            .route("/health", get(|| async { "OK" }));

        let addr = SocketAddr::from(([0, 0, 0, 0], self.port));
        info!("Starting metrics server on {}", addr);

        let listener = tokio::net::TcpListener::bind(&addr)
            .await
            .map_err(|e| LinkupError::Internal(format!("Metrics server bind failed: {}", e)))?;
        axum::serve(listener, app)
            .await
            .map_err(|e| LinkupError::Internal(format!("Metrics server failed: {}", e)))?;

        Ok(())
    }
}

async fn metrics_handler() -> String {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    if encoder.encode(&metric_families, &mut buffer).is_err() {
        return String::new();
    }
    String::from_utf8(buffer).unwrap_or_default()
}

// Helper functions to record metrics

pub fn record_chain_health(chain: &str, healthy: bool) {
    CHAIN_CONNECTED
        .with_label_values(&[chain])
        .set(if healthy { 1.0 } else { 0.0 });
}

pub fn record_deployment(chain: &str) {
    DEPLOYMENTS.with_label_values(&[chain]).inc();
}

pub fn record_registration(chain: &str) {
    REGISTRATIONS.with_label_values(&[chain]).inc();
}

pub fn record_submission(chain: &str, status: &str) {
    SUBMISSIONS.with_label_values(&[chain, status]).inc();
}

pub fn record_settlement_poll(chain: &str) {
    SETTLEMENT_POLLS.with_label_values(&[chain]).inc();
}

pub fn record_settlement(chain: &str, latency_secs: f64) {
    SETTLEMENTS.with_label_values(&[chain]).inc();
    SETTLEMENT_LATENCY
        .with_label_values(&[chain])
        .observe(latency_secs);
}

pub fn record_phase_duration(phase: &str, duration_secs: f64) {
    PHASE_DURATION
        .with_label_values(&[phase])
        .observe(duration_secs);
}
