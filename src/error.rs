//! Domain error types for the relay
//!
//! main.rs is the ONLY module allowed to use anyhow::Result (process boundary).
//! All library code returns Result<T, RelayError>.

use std::time::Duration;
use thiserror::Error;

/// Boxed source error from the broker client.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Relay domain errors
///
/// Every variant carries the subject it failed on where one exists, so a
/// log line is enough to tell which channel misbehaved.
#[derive(Error, Debug)]
pub enum RelayError {
    /// Broker unreachable at startup (fatal)
    #[error("NATS connection to '{url}' failed")]
    ConnectionFailed {
        url: String,
        #[source]
        source: BoxError,
    },

    /// Fire-and-forget publish failed
    #[error("NATS publish failed for subject '{subject}'")]
    PublishFailed {
        subject: String,
        #[source]
        source: BoxError,
    },

    /// Request failed before a reply could arrive (no responders, closed connection)
    #[error("NATS request failed for subject '{subject}'")]
    RequestFailed {
        subject: String,
        #[source]
        source: BoxError,
    },

    /// No reply within the request timeout
    #[error("NATS request to '{subject}' timed out after {timeout:?}")]
    RequestTimedOut { subject: String, timeout: Duration },

    /// Subscription could not be established
    #[error("NATS subscribe failed for subject '{subject}'")]
    SubscribeFailed {
        subject: String,
        #[source]
        source: BoxError,
    },

    /// Reply to a received message failed
    #[error("reply to '{reply}' failed")]
    ReplyFailed {
        reply: String,
        #[source]
        source: BoxError,
    },

    /// Acknowledge of a received message failed
    #[error("acknowledge of message on '{subject}' failed: {reason}")]
    AckFailed { subject: String, reason: String },

    /// Configuration error (flag or environment variable invalid)
    #[error("configuration error: {0}")]
    Config(String),

    /// HTTP listener could not be bound or served
    #[error("HTTP server error on port {port}")]
    Http {
        port: u16,
        #[source]
        source: std::io::Error,
    },

    /// Prometheus recorder installation failed
    #[error("metrics recorder error: {0}")]
    Metrics(String),
}

impl RelayError {
    /// Returns a static label string suitable for Prometheus metrics.
    ///
    /// Used as the `error_type` label on `relay_errors_total`.
    pub fn error_type_label(&self) -> &'static str {
        match self {
            Self::ConnectionFailed { .. } => "nats_connection",
            Self::PublishFailed { .. } => "nats_publish",
            Self::RequestFailed { .. } => "nats_request",
            Self::RequestTimedOut { .. } => "request_timeout",
            Self::SubscribeFailed { .. } => "nats_subscribe",
            Self::ReplyFailed { .. } => "reply",
            Self::AckFailed { .. } => "ack",
            Self::Config(_) => "config",
            Self::Http { .. } => "http",
            Self::Metrics(_) => "metrics",
        }
    }

    /// True for request-scoped timeouts, which are not broker faults.
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::RequestTimedOut { .. })
    }
}
