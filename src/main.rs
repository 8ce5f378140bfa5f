//! nats-relay - NATS publisher gateway and subscriber relay
//!
//! `nats-relay serve publisher` exposes `/publish` and `/request` over HTTP
//! and optionally publishes on a timer; `nats-relay serve subscriber`
//! consumes one subject and replies to messages that ask for it.

use anyhow::Result;
use clap::Parser;
use nats_relay::broker::{Broker, NatsBroker};
use nats_relay::config::{Cli, Command, PublisherConfig, Service, SubscriberConfig};
use nats_relay::metrics::RelayMetrics;
use nats_relay::publisher::{self, AppState};
use nats_relay::subscriber::Relay;
use std::sync::Arc;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    // Initialize tracing with configured log level
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(format!("nats_relay={}", cli.log_level).parse()?)
                .add_directive("async_nats=warn".parse()?),
        )
        .json()
        .init();

    match cli.command {
        Command::Serve(Service::Publisher(args)) => run_publisher(args.try_into()?).await,
        Command::Serve(Service::Subscriber(args)) => run_subscriber(args.try_into()?).await,
    }
}

async fn run_publisher(config: PublisherConfig) -> Result<()> {
    info!(
        version = env!("CARGO_PKG_VERSION"),
        port = config.port,
        default_subject = %config.default_subject,
        reply_subject = %config.reply_subject,
        every = ?config.every,
        "Starting publisher gateway"
    );

    let metrics = RelayMetrics::install()?;
    info!("Prometheus metrics initialized");

    // Broker unreachable at startup is fatal
    let nats = NatsBroker::connect(&config.nats_url).await.map_err(|e| {
        error!(error = %e, url = %config.nats_url, "Failed to connect to NATS server");
        e
    })?;
    info!(url = %nats.url(), "Connected to NATS");
    metrics.set_nats_connected(true);

    let shutdown = CancellationToken::new();
    let signal_token = shutdown.clone();
    tokio::spawn(async move {
        shutdown_signal().await;
        info!("Shutdown signal received");
        signal_token.cancel();
    });

    let broker: Arc<dyn Broker> = nats.clone();
    let state = AppState::new(config, broker, metrics);
    let outcome = publisher::run(state, shutdown).await;

    nats.close().await;
    info!(
        published = nats.messages_published(),
        publish_failures = nats.publish_failures(),
        "Publisher shutdown complete"
    );

    outcome?;
    Ok(())
}

async fn run_subscriber(config: SubscriberConfig) -> Result<()> {
    info!(
        version = env!("CARGO_PKG_VERSION"),
        subscription = %config.subscription,
        "Starting subscriber relay"
    );

    let nats = NatsBroker::connect(&config.nats_url).await.map_err(|e| {
        error!(error = %e, url = %config.nats_url, "Failed to connect to NATS server");
        e
    })?;
    info!(url = %nats.url(), "Connected to NATS");

    let broker: Arc<dyn Broker> = nats.clone();
    let stats = Relay::new(broker, RelayMetrics::detached())
        .run(&config.subscription)
        .await
        .map_err(|e| {
            error!(error = %e, subject = %config.subscription, "Failed to subscribe");
            e
        })?;

    nats.close().await;
    info!(received = stats.received, "Subscriber stopped");
    Ok(())
}

/// Wait for shutdown signal (SIGTERM or SIGINT)
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
