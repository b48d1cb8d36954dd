//! Prometheus metrics for monitoring
//!
//! Exposes metrics for:
//! - Accepted and rejected packets
//! - Union packet quorum failures
//! - Transaction and asset exchange transitions
//! - Rejected calls by error kind

use crate::error::{HubError, HubResult};
use crate::events::HubEvent;
use crate::interchain::BatchReport;

use axum::{http::StatusCode, routing::get, Router};
use lazy_static::lazy_static;
use prometheus::{register_counter_vec, CounterVec, Encoder, TextEncoder};
use std::net::SocketAddr;
use tracing::{error, info};

lazy_static! {
    // Packet metrics
    pub static ref PACKETS_ACCEPTED: CounterVec = register_counter_vec!(
        "relay_hub_packets_accepted_total",
        "Total packets accepted by type",
        &["ibtp_type"]
    ).unwrap();

    pub static ref BATCH_PACKETS: CounterVec = register_counter_vec!(
        "relay_hub_batch_packets_total",
        "Packets processed inside batches by outcome",
        &["outcome"]
    ).unwrap();

    pub static ref QUORUM_FAILURES: CounterVec = register_counter_vec!(
        "relay_hub_quorum_failures_total",
        "Union packets rejected for missing signature quorum",
        &[]
    ).unwrap();

    // Call metrics
    pub static ref CALLS_REJECTED: CounterVec = register_counter_vec!(
        "relay_hub_calls_rejected_total",
        "Total rejected calls by method and error kind",
        &["method", "kind"]
    ).unwrap();

    pub static ref EVENTS_EMITTED: CounterVec = register_counter_vec!(
        "relay_hub_events_emitted_total",
        "Total committed events by name",
        &["event"]
    ).unwrap();

    // State machine metrics
    pub static ref TX_TRANSITIONS: CounterVec = register_counter_vec!(
        "relay_hub_transaction_transitions_total",
        "Transaction reports by resulting status",
        &["status"]
    ).unwrap();

    pub static ref EXCHANGE_TRANSITIONS: CounterVec = register_counter_vec!(
        "relay_hub_asset_exchange_transitions_total",
        "Asset exchange transitions by resulting status",
        &["status"]
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

    pub async fn run(&self) -> HubResult<()> {
        let app = router();

        let addr = SocketAddr::from(([0, 0, 0, 0], self.port));
        info!("Starting metrics server on {}", addr);

        let listener = tokio::net::TcpListener::bind(&addr)
            .await
            .map_err(|e| HubError::Internal(format!("Failed to bind {}: {}", addr, e)))?;
        axum::serve(listener, app)
            .await
            .map_err(|e| HubError::Internal(format!("Metrics server failed: {}", e)))?;

        Ok(())
    }
}

pub fn router() -> Router {
    Router::new().route("/metrics", get(metrics_handler))
}

async fn metrics_handler() -> Result<String, StatusCode> {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    encoder.encode(&metric_families, &mut buffer).map_err(|e| {
        error!("Failed to encode metrics: {}", e);
        StatusCode::INTERNAL_SERVER_ERROR
    })?;
    String::from_utf8(buffer).map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)
}

// Helper functions to record metrics

pub fn record_event(event: &HubEvent) {
    EVENTS_EMITTED.with_label_values(&[event.name()]).inc();

    match event {
        HubEvent::Interchain { ibtp_type, .. } => {
            PACKETS_ACCEPTED
                .with_label_values(&[ibtp_type.as_str()])
                .inc();
        }
        HubEvent::TransactionReported { status, .. } => {
            TX_TRANSITIONS
                .with_label_values(&[&status.to_string()])
                .inc();
        }
        HubEvent::AssetExchangeUpdated { status, .. } => {
            EXCHANGE_TRANSITIONS
                .with_label_values(&[&status.to_string()])
                .inc();
        }
        _ => {}
    }
}

pub fn record_rejection(method: &str, err: &HubError) {
    CALLS_REJECTED
        .with_label_values(&[method, err.kind()])
        .inc();
    if matches!(err, HubError::QuorumNotMet { .. }) {
        QUORUM_FAILURES.with_label_values(&[]).inc();
    }
}

pub fn record_batch(report: &BatchReport) {
    BATCH_PACKETS
        .with_label_values(&["accepted"])
        .inc_by(report.accepted() as f64);
    BATCH_PACKETS
        .with_label_values(&["rejected"])
        .inc_by(report.rejected() as f64);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::interchain::IbtpType;

    #[test]
    fn test_record_event_counts_packets() {
        let before = PACKETS_ACCEPTED
            .with_label_values(&["receipt_failure"])
            .get();
        record_event(&HubEvent::Interchain {
            ibtp_id: "a-b-1".to_string(),
            from: "a".to_string(),
            to: "b".to_string(),
            index: 1,
            ibtp_type: IbtpType::ReceiptFailure,
            tx_hash: "0x00".to_string(),
        });
        let after = PACKETS_ACCEPTED
            .with_label_values(&["receipt_failure"])
            .get();
        assert!(after - before >= 1.0);
    }

    #[test]
    fn test_quorum_rejections_are_counted() {
        let before = QUORUM_FAILURES.with_label_values(&[]).get();
        record_rejection(
            "handle_union_ibtp",
            &HubError::QuorumNotMet {
                counter: 1,
                required: 3,
            },
        );
        assert!(QUORUM_FAILURES.with_label_values(&[]).get() >= before + 1.0);
    }
}
