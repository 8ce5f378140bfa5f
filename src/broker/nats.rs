//! NATS broker adapter

use super::{Broker, Message};
use crate::error::RelayError;
use async_nats::connection::State;
use async_nats::{Client, RequestErrorKind};
use async_trait::async_trait;
use bytes::Bytes;
use futures::StreamExt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// Well-known local NATS address.
pub const DEFAULT_URL: &str = "nats://localhost:4222";

impl From<async_nats::Message> for Message {
    fn from(msg: async_nats::Message) -> Self {
        Self {
            subject: msg.subject.to_string(),
            payload: msg.payload,
            reply: msg.reply.map(|r| r.to_string()),
        }
    }
}

/// Shared NATS connection
pub struct NatsBroker {
    client: Client,
    url: String,
    connected: AtomicBool,
    messages_published: AtomicU64,
    publish_failures: AtomicU64,
}

impl NatsBroker {
    /// Connect to NATS server
    pub async fn connect(url: &str) -> Result<Arc<Self>, RelayError> {
        info!(url, "Connecting to NATS");

        let client = async_nats::connect(url)
            .await
            .map_err(|e| RelayError::ConnectionFailed {
                url: url.to_string(),
                source: Box::new(e),
            })?;

        Ok(Arc::new(Self {
            client,
            url: url.to_string(),
            connected: AtomicBool::new(true),
            messages_published: AtomicU64::new(0),
            publish_failures: AtomicU64::new(0),
        }))
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Get total messages published
    pub fn messages_published(&self) -> u64 {
        self.messages_published.load(Ordering::Relaxed)
    }

    /// Get total publish failures
    pub fn publish_failures(&self) -> u64 {
        self.publish_failures.load(Ordering::Relaxed)
    }

    /// Flush pending writes and mark the handle closed.
    pub async fn close(&self) {
        info!("Closing NATS connection");
        self.connected.store(false, Ordering::SeqCst);
        if let Err(e) = self.client.flush().await {
            warn!(error = %e, "Failed to flush NATS connection");
        }
        // async-nats handles cleanup on drop
    }
}

#[async_trait]
impl Broker for NatsBroker {
    async fn publish(&self, subject: &str, payload: Bytes) -> Result<(), RelayError> {
        match self.client.publish(subject.to_string(), payload).await {
            Ok(()) => {
                self.messages_published.fetch_add(1, Ordering::Relaxed);
                debug!(subject, "Message published");
                Ok(())
            }
            Err(e) => {
                self.publish_failures.fetch_add(1, Ordering::Relaxed);
                Err(RelayError::PublishFailed {
                    subject: subject.to_string(),
                    source: Box::new(e),
                })
            }
        }
    }

    async fn request(
        &self,
        subject: &str,
        payload: Bytes,
        timeout: Duration,
    ) -> Result<Message, RelayError> {
        let timed_out = || RelayError::RequestTimedOut {
            subject: subject.to_string(),
            timeout,
        };

        let pending = self.client.request(subject.to_string(), payload);

        match tokio::time::timeout(timeout, pending).await {
            Err(_) => Err(timed_out()),
            Ok(Err(e)) if matches!(e.kind(), RequestErrorKind::TimedOut) => Err(timed_out()),
            Ok(Err(e)) => Err(RelayError::RequestFailed {
                subject: subject.to_string(),
                source: Box::new(e),
            }),
            Ok(Ok(reply)) => Ok(reply.into()),
        }
    }

    async fn subscribe(
        &self,
        subject: &str,
        capacity: usize,
    ) -> Result<mpsc::Receiver<Message>, RelayError> {
        let mut subscription = self
            .client
            .subscribe(subject.to_string())
            .await
            .map_err(|e| RelayError::SubscribeFailed {
                subject: subject.to_string(),
                source: Box::new(e),
            })?;

        info!(subject, capacity, "Subscribed");

        let (tx, rx) = mpsc::channel(capacity);
        let subject = subject.to_string();

        tokio::spawn(async move {
            while let Some(msg) = subscription.next().await {
                if tx.send(msg.into()).await.is_err() {
                    debug!(subject = %subject, "Receiver dropped, unsubscribing");
                    break;
                }
            }
            debug!(subject = %subject, "Subscription stream ended");
        });
        Ok(rx)
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
            && matches!(self.client.connection_state(), State::Connected)
    }
}
