//! Publisher gateway
//!
//! Translates HTTP calls into NATS publish and request operations and,
//! when configured, publishes an automatic message on a fixed period.

mod routes;
mod ticker;

pub use routes::{router, ErrorResponse, MessageQuery, MessageResponse, REQUEST_TIMEOUT};
pub use ticker::run_ticker;

use crate::broker::Broker;
use crate::config::PublisherConfig;
use crate::error::RelayError;
use crate::metrics::RelayMetrics;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

/// Shared state for the gateway handlers and the timer producer
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<PublisherConfig>,
    pub broker: Arc<dyn Broker>,
    pub metrics: RelayMetrics,
}

impl AppState {
    pub fn new(config: PublisherConfig, broker: Arc<dyn Broker>, metrics: RelayMetrics) -> Self {
        Self {
            config: Arc::new(config),
            broker,
            metrics,
        }
    }
}

/// How the gateway stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownOutcome {
    /// All in-flight requests finished before the deadline
    Graceful,
    /// The deadline elapsed and the server task was aborted
    DeadlineElapsed,
}

/// Bind the configured port and serve until `shutdown` is cancelled.
pub async fn run(state: AppState, shutdown: CancellationToken) -> Result<ShutdownOutcome, RelayError> {
    let port = state.config.port;
    let addr: SocketAddr = ([0, 0, 0, 0], port).into();
    let listener = TcpListener::bind(addr)
        .await
        .map_err(|source| RelayError::Http { port, source })?;

    info!(port, "Starting HTTP server");
    serve(listener, state, shutdown).await
}

/// Serve the gateway on `listener` until `shutdown` is cancelled.
///
/// Cancellation stops accepting connections and the timer producer, then
/// waits up to `every + 5s` for in-flight requests before aborting.
pub async fn serve(
    listener: TcpListener,
    state: AppState,
    shutdown: CancellationToken,
) -> Result<ShutdownOutcome, RelayError> {
    let port = listener.local_addr().map(|a| a.port()).unwrap_or(state.config.port);
    let grace = state.config.shutdown_timeout();

    let ticker = state.config.timer_enabled().then(|| {
        tokio::spawn(run_ticker(
            Arc::clone(&state.broker),
            state.config.default_subject.clone(),
            state.config.every,
            state.metrics.clone(),
            shutdown.child_token(),
        ))
    });

    let server = axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown.clone().cancelled_owned());
    let mut server_task = tokio::spawn(async move { server.await });

    tokio::select! {
        _ = shutdown.cancelled() => {
            info!("Shutdown Server ...");
        }
        result = &mut server_task => {
            // The server only returns on its own when the listener fails.
            shutdown.cancel();
            if let Some(ticker) = ticker {
                let _ = ticker.await;
            }
            return match result {
                Ok(Ok(())) => Ok(ShutdownOutcome::Graceful),
                Ok(Err(source)) => Err(RelayError::Http { port, source }),
                Err(e) => Err(RelayError::Http {
                    port,
                    source: std::io::Error::new(std::io::ErrorKind::Other, e),
                }),
            };
        }
    }

    let outcome = match tokio::time::timeout(grace, &mut server_task).await {
        Ok(Ok(Ok(()))) => ShutdownOutcome::Graceful,
        Ok(Ok(Err(e))) => {
            error!(error = %e, "HTTP server error during shutdown");
            ShutdownOutcome::Graceful
        }
        Ok(Err(e)) => {
            error!(error = %e, "HTTP server task failed");
            ShutdownOutcome::Graceful
        }
        Err(_) => {
            warn!(timeout = ?grace, "Stopped after waiting for shutdown timeout");
            server_task.abort();
            ShutdownOutcome::DeadlineElapsed
        }
    };

    if let Some(ticker) = ticker {
        if let Err(e) = ticker.await {
            error!(error = %e, "Timer producer task failed");
        }
    }

    info!(?outcome, "Server exiting");
    Ok(outcome)
}
