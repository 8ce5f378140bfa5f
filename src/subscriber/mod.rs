//! Subscriber relay
//!
//! Consumes one subject until the subscription ends. Messages are handled
//! one at a time in arrival order: logged, and when they carry a reply
//! subject, answered and acknowledged.

use crate::broker::{Broker, Message};
use crate::error::RelayError;
use crate::metrics::RelayMetrics;
use bytes::Bytes;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{info, warn};

/// Messages buffered between the subscription and the handling loop
pub const BUFFER_CAPACITY: usize = 64;

/// Counters for one relay run
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct RelayStats {
    pub received: u64,
    pub replies_sent: u64,
    pub reply_failures: u64,
    pub ack_failures: u64,
}

pub struct Relay {
    broker: Arc<dyn Broker>,
    metrics: RelayMetrics,
    stats: RelayStats,
}

impl Relay {
    pub fn new(broker: Arc<dyn Broker>, metrics: RelayMetrics) -> Self {
        Self {
            broker,
            metrics,
            stats: RelayStats::default(),
        }
    }

    /// Subscribe to `subject` and handle messages until the channel closes.
    ///
    /// Only a failed subscribe is returned as an error; per-message failures
    /// are logged and counted.
    pub async fn run(self, subject: &str) -> Result<RelayStats, RelayError> {
        let messages = self.broker.subscribe(subject, BUFFER_CAPACITY).await?;
        info!(subject, "Subscriber relay started");

        let stats = self.consume(messages).await;
        info!(
            subject,
            received = stats.received,
            replies_sent = stats.replies_sent,
            "Subscription closed"
        );
        Ok(stats)
    }

    /// Handle messages from an existing subscription until it closes.
    pub async fn consume(mut self, mut messages: mpsc::Receiver<Message>) -> RelayStats {
        while let Some(message) = messages.recv().await {
            self.handle(&message).await;
        }
        self.stats
    }

    /// Handle one message: log it, then reply and acknowledge if it asks for a reply.
    pub async fn handle(&mut self, message: &Message) {
        self.stats.received += 1;
        self.metrics.record_received();
        info!(
            subject = %message.subject,
            data = %message.payload_str(),
            "Message received"
        );

        let Some(reply) = message.reply.as_deref() else {
            return;
        };

        match self.broker.reply(message, reply_payload(message, reply)).await {
            Ok(()) => {
                self.stats.replies_sent += 1;
                self.metrics.record_reply(true);
            }
            Err(e) => {
                self.stats.reply_failures += 1;
                self.metrics.record_reply(false);
                self.metrics.record_error(&e);
                warn!(error = %e, "Unable to respond to message");
            }
        }

        if let Err(e) = self.broker.acknowledge(message).await {
            self.stats.ack_failures += 1;
            self.metrics.record_error(&e);
            warn!(error = %e, "Unable to ack message");
        }
    }

    pub fn stats(&self) -> RelayStats {
        self.stats
    }
}

/// Reply body echoing the original payload and the reply subject.
pub fn reply_payload(message: &Message, reply: &str) -> Bytes {
    Bytes::from(format!(
        "Replying to {} on {}",
        message.payload_str(),
        reply
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::Mutex;
    use std::time::Duration;

    /// Broker that records reply/ack calls and can be told to fail them.
    #[derive(Default)]
    struct RecordingBroker {
        fail_reply: bool,
        fail_ack: bool,
        replies: Mutex<Vec<(String, Bytes)>>,
        acks: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl Broker for RecordingBroker {
        async fn publish(&self, _subject: &str, _payload: Bytes) -> Result<(), RelayError> {
            Ok(())
        }

        async fn request(
            &self,
            subject: &str,
            _payload: Bytes,
            timeout: Duration,
        ) -> Result<Message, RelayError> {
            Err(RelayError::RequestTimedOut {
                subject: subject.to_string(),
                timeout,
            })
        }

        async fn subscribe(
            &self,
            _subject: &str,
            capacity: usize,
        ) -> Result<mpsc::Receiver<Message>, RelayError> {
            let (_tx, rx) = mpsc::channel(capacity);
            Ok(rx)
        }

        async fn reply(&self, message: &Message, payload: Bytes) -> Result<(), RelayError> {
            let reply = message.reply.clone().unwrap_or_default();
            self.replies.lock().unwrap().push((reply.clone(), payload));
            if self.fail_reply {
                return Err(RelayError::ReplyFailed {
                    reply,
                    source: "injected".into(),
                });
            }
            Ok(())
        }

        async fn acknowledge(&self, message: &Message) -> Result<(), RelayError> {
            self.acks.lock().unwrap().push(message.subject.clone());
            if self.fail_ack {
                return Err(RelayError::AckFailed {
                    subject: message.subject.clone(),
                    reason: "injected".to_string(),
                });
            }
            Ok(())
        }
    }

    fn relay_with(broker: Arc<RecordingBroker>) -> Relay {
        Relay::new(broker, RelayMetrics::detached())
    }

    #[tokio::test]
    async fn message_with_reply_is_answered_and_acked_once() {
        let broker = Arc::new(RecordingBroker::default());
        let mut relay = relay_with(broker.clone());

        relay
            .handle(&Message::new("foo", "hi").with_reply("_INBOX.1"))
            .await;

        let replies = broker.replies.lock().unwrap().clone();
        assert_eq!(
            replies,
            vec![(
                "_INBOX.1".to_string(),
                Bytes::from("Replying to hi on _INBOX.1")
            )]
        );
        assert_eq!(broker.acks.lock().unwrap().len(), 1);
        assert_eq!(relay.stats().replies_sent, 1);
    }

    #[tokio::test]
    async fn message_without_reply_is_only_logged() {
        let broker = Arc::new(RecordingBroker::default());
        let mut relay = relay_with(broker.clone());

        relay.handle(&Message::new("foo", "hi")).await;

        assert!(broker.replies.lock().unwrap().is_empty());
        assert!(broker.acks.lock().unwrap().is_empty());
        assert_eq!(relay.stats().received, 1);
    }

    #[tokio::test]
    async fn failed_reply_still_acknowledges() {
        let broker = Arc::new(RecordingBroker {
            fail_reply: true,
            ..Default::default()
        });
        let mut relay = relay_with(broker.clone());

        relay
            .handle(&Message::new("foo", "hi").with_reply("_INBOX.1"))
            .await;

        assert_eq!(broker.replies.lock().unwrap().len(), 1);
        assert_eq!(broker.acks.lock().unwrap().len(), 1);
        assert_eq!(relay.stats().reply_failures, 1);
    }

    #[tokio::test]
    async fn failures_do_not_stop_later_messages() {
        let broker = Arc::new(RecordingBroker {
            fail_reply: true,
            fail_ack: true,
            ..Default::default()
        });
        let mut relay = relay_with(broker.clone());

        for i in 0..3 {
            relay
                .handle(&Message::new("foo", format!("m{i}")).with_reply(format!("_INBOX.{i}")))
                .await;
        }

        assert_eq!(broker.replies.lock().unwrap().len(), 3);
        assert_eq!(broker.acks.lock().unwrap().len(), 3);
        let stats = relay.stats();
        assert_eq!(stats.received, 3);
        assert_eq!(stats.reply_failures, 3);
        assert_eq!(stats.ack_failures, 3);
    }

    #[tokio::test]
    async fn run_stops_when_channel_closes() {
        let broker = Arc::new(RecordingBroker::default());
        let stats = relay_with(broker).run("foo").await.unwrap();
        assert_eq!(stats, RelayStats::default());
    }

    #[tokio::test]
    async fn consume_handles_messages_in_arrival_order() {
        let broker = Arc::new(RecordingBroker::default());
        let (tx, rx) = mpsc::channel(BUFFER_CAPACITY);
        for i in 0..3 {
            tx.send(Message::new("foo", format!("m{i}")).with_reply(format!("_INBOX.{i}")))
                .await
                .unwrap();
        }
        drop(tx);

        let stats = relay_with(broker.clone()).consume(rx).await;

        assert_eq!(stats.received, 3);
        let replies: Vec<String> = broker
            .replies
            .lock()
            .unwrap()
            .iter()
            .map(|(reply, _)| reply.clone())
            .collect();
        assert_eq!(replies, vec!["_INBOX.0", "_INBOX.1", "_INBOX.2"]);
    }

    #[test]
    fn reply_payload_echoes_message_and_destination() {
        let msg = Message::new("foo", "ping").with_reply("bar");
        assert_eq!(reply_payload(&msg, "bar"), Bytes::from("Replying to ping on bar"));
    }
}
