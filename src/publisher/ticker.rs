//! Timer producer

use super::routes::timestamp;
use crate::broker::Broker;
use crate::metrics::{PublishSource, RelayMetrics};
use bytes::Bytes;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Publish an automatic message to `subject` every `every` until `shutdown`
/// is cancelled. The first message goes out one period after start.
pub async fn run_ticker(
    broker: Arc<dyn Broker>,
    subject: String,
    every: Duration,
    metrics: RelayMetrics,
    shutdown: CancellationToken,
) {
    info!(every = ?every, subject = %subject, "Publishing message every interval");

    let mut interval = interval_at(Instant::now() + every, every);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            biased;
            _ = shutdown.cancelled() => break,
            _ = interval.tick() => {
                let payload = format!("Automatic message published at {}", timestamp());
                match broker.publish(&subject, Bytes::from(payload)).await {
                    Ok(()) => {
                        metrics.record_publish(PublishSource::Timer);
                        debug!(subject = %subject, "Automatic message published");
                    }
                    Err(e) => {
                        metrics.record_error(&e);
                        warn!(subject = %subject, error = %e, "Failed to publish message");
                    }
                }
            }
        }
    }

    info!("Stopped publishing messages");
}
