// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use std::sync::OnceLock;

static PROM_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Initialize telemetry (logs + metrics)
pub fn init_telemetry() {
    // 1. Tracing
    let _ = tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "ledgercut_node=info,ledgercut=info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .try_init();

    // 2. Prometheus
    match PrometheusBuilder::new().install_recorder() {
        Ok(handle) => {
            if PROM_HANDLE.set(handle).is_err() {
                tracing::warn!("Prometheus handle already set. Telemetry re-initialized?");
            }
        }
        Err(e) => tracing::warn!("Prometheus recorder not installed: {}", e),
    }

    metrics::describe_counter!("ledgercut_envelopes_sent_total", "Envelopes sent to peers, by command");
    metrics::describe_counter!("ledgercut_envelopes_received_total", "Envelopes received from peers, by command");
    metrics::describe_counter!("ledgercut_snapshot_runs_started_total", "Snapshot runs started here, by algorithm");
    metrics::describe_counter!("ledgercut_snapshot_runs_completed_total", "Global snapshots published here, by algorithm");
    metrics::describe_counter!("ledgercut_snapshot_runs_aborted_total", "Snapshot runs aborted by peer loss");
    metrics::describe_counter!("ledgercut_white_messages_total", "In-flight messages accounted by Mattern runs");
    metrics::describe_gauge!("ledgercut_peers", "Registered peer links");

    metrics::gauge!("ledgercut_node_up", 1.0);
}

/// Renders the Prometheus exposition text.
pub fn render_metrics() -> String {
    if let Some(handle) = PROM_HANDLE.get() {
        handle.render()
    } else {
        "# metrics not initialized".to_string()
    }
}
