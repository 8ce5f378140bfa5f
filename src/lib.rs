//! NATS relay services
//!
//! - Publisher gateway: HTTP endpoints that publish or request over NATS,
//!   plus an optional timer producer
//! - Subscriber relay: consumes one subject and replies when asked to
//! - Health/ready endpoints and Prometheus metrics on the gateway

pub mod broker;
pub mod config;
pub mod error;
pub mod health;
pub mod metrics;
pub mod publisher;
pub mod subscriber;
