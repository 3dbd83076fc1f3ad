//! Prometheus metrics for webhook ingestion and ticket sync.

use metrics::{counter, histogram};

/// Initialize metrics exporter (Prometheus).
pub fn init_metrics() {
    let builder = metrics_exporter_prometheus::PrometheusBuilder::new();
    if let Err(e) = builder.install() {
        tracing::warn!("Failed to install Prometheus exporter: {}", e);
    }
}

/// Record a webhook delivery by response outcome.
pub fn webhook_received(outcome: &str) {
    counter!("zendesk_webhooks_received_total", "outcome" => outcome.to_string()).increment(1);
}

/// Record a reconciled ticket by notification kind (`created` / `updated`).
pub fn ticket_synced(kind: &str) {
    counter!("zendesk_tickets_synced_total", "kind" => kind.to_string()).increment(1);
}

/// Record an event whose processing failed.
pub fn event_failed() {
    counter!("zendesk_events_failed_total").increment(1);
}

/// Record fetch-and-reconcile duration.
pub fn sync_duration(duration_ms: u64) {
    histogram!("zendesk_sync_duration_ms").record(duration_ms as f64);
}
