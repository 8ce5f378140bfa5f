//! Broker abstraction
//!
//! The gateway and the relay only ever talk to a `dyn Broker`. `NatsBroker`
//! is the production adapter; `MemoryBroker` is an in-process stand-in with
//! the same subject and request/reply semantics.

pub mod memory;
pub mod nats;

use crate::error::RelayError;
use async_trait::async_trait;
use bytes::Bytes;
use std::borrow::Cow;
use std::time::Duration;
use tokio::sync::mpsc;

pub use memory::MemoryBroker;
pub use nats::NatsBroker;

/// Payload published to a reply subject to acknowledge a message.
pub const ACK_PAYLOAD: &[u8] = b"+ACK";

/// A message as seen by the relay: routing key, opaque payload and an
/// optional reply subject for correlated responses.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub subject: String,
    pub payload: Bytes,
    pub reply: Option<String>,
}

impl Message {
    pub fn new(subject: impl Into<String>, payload: impl Into<Bytes>) -> Self {
        Self {
            subject: subject.into(),
            payload: payload.into(),
            reply: None,
        }
    }

    pub fn with_reply(mut self, reply: impl Into<String>) -> Self {
        self.reply = Some(reply.into());
        self
    }

    /// Payload rendered for logs and JSON bodies.
    pub fn payload_str(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.payload)
    }
}

/// Publish / request / subscribe capability of a message broker.
///
/// Implementations must be safe to share between the HTTP handlers, the
/// timer producer and the subscriber loop.
#[async_trait]
pub trait Broker: Send + Sync {
    /// Fire-and-forget publish. Returns once the client accepted the message.
    async fn publish(&self, subject: &str, payload: Bytes) -> Result<(), RelayError>;

    /// Publish and wait for a single reply within `timeout`.
    async fn request(
        &self,
        subject: &str,
        payload: Bytes,
        timeout: Duration,
    ) -> Result<Message, RelayError>;

    /// Subscribe to `subject`, forwarding messages through a channel bounded
    /// to `capacity`. The channel closes when the subscription ends.
    async fn subscribe(
        &self,
        subject: &str,
        capacity: usize,
    ) -> Result<mpsc::Receiver<Message>, RelayError>;

    /// Whether the broker connection is currently usable.
    fn is_connected(&self) -> bool {
        true
    }

    /// Send `payload` to the reply subject of `message`.
    async fn reply(&self, message: &Message, payload: Bytes) -> Result<(), RelayError> {
        let Some(reply) = message.reply.as_deref() else {
            return Err(RelayError::ReplyFailed {
                reply: String::new(),
                source: format!("message on '{}' has no reply subject", message.subject).into(),
            });
        };

        self.publish(reply, payload)
            .await
            .map_err(|e| RelayError::ReplyFailed {
                reply: reply.to_string(),
                source: Box::new(e),
            })
    }

    /// Acknowledge receipt of `message` on its reply subject.
    async fn acknowledge(&self, message: &Message) -> Result<(), RelayError> {
        let Some(reply) = message.reply.as_deref() else {
            return Err(RelayError::AckFailed {
                subject: message.subject.clone(),
                reason: "message has no reply subject".to_string(),
            });
        };

        self.publish(reply, Bytes::from_static(ACK_PAYLOAD))
            .await
            .map_err(|e| RelayError::AckFailed {
                subject: message.subject.clone(),
                reason: e.to_string(),
            })
    }
}

/// NATS-style subject matching: `*` matches one token, a trailing `>`
/// matches one or more tokens.
pub fn subject_matches(pattern: &str, subject: &str) -> bool {
    let mut pattern_tokens = pattern.split('.');
    let mut subject_tokens = subject.split('.');

    loop {
        match (pattern_tokens.next(), subject_tokens.next()) {
            (Some(">"), Some(_)) => return pattern_tokens.next().is_none(),
            (Some("*"), Some(_)) => {}
            (Some(p), Some(s)) if p == s => {}
            (None, None) => return true,
            _ => return false,
        }
    }
}
