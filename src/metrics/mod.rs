//! Prometheus metrics module

use crate::error::RelayError;
use metrics::{counter, describe_counter, describe_gauge, gauge, Unit};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use std::sync::Arc;

/// Where a published message originated
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PublishSource {
    Http,
    Timer,
}

impl PublishSource {
    fn label(self) -> &'static str {
        match self {
            Self::Http => "http",
            Self::Timer => "timer",
        }
    }
}

/// Relay metrics collector
///
/// The `metrics` macros are no-ops until a recorder is installed, so a
/// detached collector is safe to use anywhere a process-wide recorder is
/// unwanted (tests, embedding).
#[derive(Clone, Default)]
pub struct RelayMetrics {
    handle: Option<Arc<PrometheusHandle>>,
}

impl RelayMetrics {
    /// Install the process-wide Prometheus recorder
    pub fn install() -> Result<Self, RelayError> {
        let handle = PrometheusBuilder::new()
            .install_recorder()
            .map_err(|e| RelayError::Metrics(e.to_string()))?;

        Self::register_metrics();

        Ok(Self {
            handle: Some(Arc::new(handle)),
        })
    }

    /// Collector without a recorder; `render` returns an empty string
    pub fn detached() -> Self {
        Self::default()
    }

    fn register_metrics() {
        describe_counter!(
            "relay_messages_published_total",
            Unit::Count,
            "Messages published to NATS"
        );
        describe_counter!(
            "relay_requests_total",
            Unit::Count,
            "Request/reply round trips by outcome"
        );
        describe_counter!(
            "relay_messages_received_total",
            Unit::Count,
            "Messages received by the subscriber"
        );
        describe_counter!(
            "relay_replies_total",
            Unit::Count,
            "Replies sent by the subscriber by outcome"
        );
        describe_counter!("relay_errors_total", Unit::Count, "Relay errors by type");
        describe_gauge!(
            "relay_nats_connected",
            Unit::Count,
            "NATS connection status (1=connected, 0=disconnected)"
        );
    }

    pub fn record_publish(&self, source: PublishSource) {
        counter!("relay_messages_published_total", "source" => source.label()).increment(1);
    }

    pub fn record_request(&self, success: bool) {
        let outcome = if success { "ok" } else { "failed" };
        counter!("relay_requests_total", "outcome" => outcome).increment(1);
    }

    /// Unlabelled: subjects come from publishers and are unbounded.
    pub fn record_received(&self) {
        counter!("relay_messages_received_total").increment(1);
    }

    pub fn record_reply(&self, success: bool) {
        let outcome = if success { "ok" } else { "failed" };
        counter!("relay_replies_total", "outcome" => outcome).increment(1);
    }

    pub fn record_error(&self, error: &RelayError) {
        counter!("relay_errors_total", "error_type" => error.error_type_label()).increment(1);
    }

    /// Set NATS connection status
    pub fn set_nats_connected(&self, connected: bool) {
        gauge!("relay_nats_connected").set(if connected { 1.0 } else { 0.0 });
    }

    /// Render metrics in Prometheus format
    pub fn render(&self) -> String {
        self.handle
            .as_ref()
            .map(|h| h.render())
            .unwrap_or_default()
    }
}
