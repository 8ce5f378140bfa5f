//! In-process broker
//!
//! Routes messages between subscribers of the same process using NATS
//! subject matching. Every published message is recorded so callers can
//! inspect what went over the wire.

use super::{subject_matches, Broker, Message};
use crate::error::RelayError;
use async_trait::async_trait;
use bytes::Bytes;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::debug;
use uuid::Uuid;

const INBOX_PREFIX: &str = "_INBOX";
const INBOX_CAPACITY: usize = 4;

struct Subscription {
    pattern: String,
    tx: mpsc::Sender<Message>,
}

#[derive(Default)]
struct Inner {
    subscriptions: Vec<Subscription>,
    published: Vec<Message>,
}

#[derive(Default)]
pub struct MemoryBroker {
    inner: Mutex<Inner>,
    offline: AtomicBool,
}

impl MemoryBroker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Simulate a lost connection: every operation fails while offline.
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    /// Every message published so far, in publish order.
    pub fn published(&self) -> Vec<Message> {
        self.lock().published.clone()
    }

    /// Messages published to exactly `subject`.
    pub fn published_to(&self, subject: &str) -> Vec<Message> {
        self.lock()
            .published
            .iter()
            .filter(|m| m.subject == subject)
            .cloned()
            .collect()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        // A poisoned lock only means a test panicked mid-publish; the data is still usable.
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn ensure_online(&self, subject: &str) -> Result<(), RelayError> {
        if self.offline.load(Ordering::SeqCst) {
            return Err(RelayError::PublishFailed {
                subject: subject.to_string(),
                source: "broker offline".into(),
            });
        }
        Ok(())
    }

    /// Record and route `message`, returning how many subscribers received it.
    async fn route(&self, message: Message) -> usize {
        let targets: Vec<mpsc::Sender<Message>> = {
            let mut inner = self.lock();
            inner.subscriptions.retain(|s| !s.tx.is_closed());
            inner.published.push(message.clone());
            inner
                .subscriptions
                .iter()
                .filter(|s| subject_matches(&s.pattern, &message.subject))
                .map(|s| s.tx.clone())
                .collect()
        };

        let mut delivered = 0;
        for tx in targets {
            if tx.send(message.clone()).await.is_ok() {
                delivered += 1;
            }
        }
        debug!(subject = %message.subject, delivered, "Message routed");
        delivered
    }

    fn register(&self, pattern: &str, capacity: usize) -> mpsc::Receiver<Message> {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        self.lock().subscriptions.push(Subscription {
            pattern: pattern.to_string(),
            tx,
        });
        rx
    }
}

#[async_trait]
impl Broker for MemoryBroker {
    async fn publish(&self, subject: &str, payload: Bytes) -> Result<(), RelayError> {
        self.ensure_online(subject)?;
        self.route(Message::new(subject, payload)).await;
        Ok(())
    }

    async fn request(
        &self,
        subject: &str,
        payload: Bytes,
        timeout: Duration,
    ) -> Result<Message, RelayError> {
        self.ensure_online(subject)
            .map_err(|e| RelayError::RequestFailed {
                subject: subject.to_string(),
                source: Box::new(e),
            })?;

        let inbox = format!("{INBOX_PREFIX}.{}", Uuid::new_v4().simple());
        let mut replies = self.register(&inbox, INBOX_CAPACITY);

        let delivered = self
            .route(Message::new(subject, payload).with_reply(inbox))
            .await;
        if delivered == 0 {
            return Err(RelayError::RequestFailed {
                subject: subject.to_string(),
                source: "no responders".into(),
            });
        }

        match tokio::time::timeout(timeout, replies.recv()).await {
            Ok(Some(reply)) => Ok(reply),
            Ok(None) | Err(_) => Err(RelayError::RequestTimedOut {
                subject: subject.to_string(),
                timeout,
            }),
        }
    }

    async fn subscribe(
        &self,
        subject: &str,
        capacity: usize,
    ) -> Result<mpsc::Receiver<Message>, RelayError> {
        if self.offline.load(Ordering::SeqCst) {
            return Err(RelayError::SubscribeFailed {
                subject: subject.to_string(),
                source: "broker offline".into(),
            });
        }
        Ok(self.register(subject, capacity))
    }

    fn is_connected(&self) -> bool {
        !self.offline.load(Ordering::SeqCst)
    }
}
