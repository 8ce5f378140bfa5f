//! Relay configuration
//!
//! Command-line flags with environment fallbacks. `.env` files are loaded
//! by `main` before parsing, so any flag can also come from there.

use crate::broker::nats::DEFAULT_URL;
use crate::error::RelayError;
use clap::{Args, Parser, Subcommand};
use std::time::Duration;

#[derive(Debug, Parser)]
#[clap(version, about = "NATS publisher gateway and subscriber relay", long_about = None)]
pub struct Cli {
    /// Log level (trace, debug, info, warn, error)
    #[clap(long, global = true, env = "LOG_LEVEL", default_value = "info")]
    pub log_level: String,

    #[clap(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Runs one of the relay services
    #[clap(subcommand)]
    Serve(Service),
}

#[derive(Debug, Subcommand)]
pub enum Service {
    /// HTTP gateway publishing messages to NATS
    Publisher(PublisherArgs),
    /// Subscriber logging and replying to messages
    Subscriber(SubscriberArgs),
}

#[derive(Debug, Args)]
pub struct PublisherArgs {
    /// Publish an automatic message every interval, e.g. `500ms`, `1.5s` or `1m30s`
    /// (units: ns, us, µs, ms, s, m, h; at most 24h). 0 disables the timer
    #[clap(long, env = "PUBLISH_EVERY", default_value = "0s", value_parser = parse_duration)]
    pub every: Duration,
    /// Port the HTTP API is exposed on
    #[clap(short, long, env = "HTTP_PORT", default_value_t = 8181)]
    pub port: u16,
    /// Default subject to publish to
    #[clap(short, long, env = "DEFAULT_SUBJECT", default_value = "foo")]
    pub subject: String,
    /// Default subject to reply to
    #[clap(short, long, env = "REPLY_SUBJECT", default_value = "bar")]
    pub reply: String,
    /// NATS server to connect to
    #[clap(short, long, env = "NATS_URL", default_value = DEFAULT_URL)]
    pub nats: String,
}

#[derive(Debug, Args)]
pub struct SubscriberArgs {
    /// Subject to subscribe to
    #[clap(short, long, env = "SUBSCRIPTION", default_value = "foo")]
    pub subscription: String,
    /// NATS server url
    #[clap(short, long, env = "NATS_URL", default_value = DEFAULT_URL)]
    pub nats: String,
}

/// Longest accepted timer period
pub const MAX_EVERY: Duration = Duration::from_secs(24 * 3600);

/// Publisher gateway configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublisherConfig {
    pub nats_url: String,
    /// Subject used when a request names none
    pub default_subject: String,
    pub port: u16,
    /// Timer period; zero disables automatic publishing
    pub every: Duration,
    pub reply_subject: String,
}

impl PublisherConfig {
    /// Grace period granted to in-flight requests on shutdown.
    pub fn shutdown_timeout(&self) -> Duration {
        self.every.saturating_add(Duration::from_secs(5))
    }

    pub fn timer_enabled(&self) -> bool {
        !self.every.is_zero()
    }
}

impl Default for PublisherConfig {
    fn default() -> Self {
        Self {
            nats_url: DEFAULT_URL.to_string(),
            default_subject: "foo".to_string(),
            port: 8181,
            every: Duration::ZERO,
            reply_subject: "bar".to_string(),
        }
    }
}

impl TryFrom<PublisherArgs> for PublisherConfig {
    type Error = RelayError;

    fn try_from(args: PublisherArgs) -> Result<Self, Self::Error> {
        if args.every > MAX_EVERY {
            return Err(RelayError::Config(format!(
                "--every must be at most {MAX_EVERY:?}, got {:?}",
                args.every
            )));
        }
        Ok(Self {
            nats_url: non_empty("nats", args.nats)?,
            default_subject: non_empty("subject", args.subject)?,
            port: args.port,
            every: args.every,
            reply_subject: non_empty("reply", args.reply)?,
        })
    }
}

/// Subscriber relay configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubscriberConfig {
    pub nats_url: String,
    pub subscription: String,
}

impl Default for SubscriberConfig {
    fn default() -> Self {
        Self {
            nats_url: DEFAULT_URL.to_string(),
            subscription: "foo".to_string(),
        }
    }
}

impl TryFrom<SubscriberArgs> for SubscriberConfig {
    type Error = RelayError;

    fn try_from(args: SubscriberArgs) -> Result<Self, Self::Error> {
        Ok(Self {
            nats_url: non_empty("nats", args.nats)?,
            subscription: non_empty("subscription", args.subscription)?,
        })
    }
}

fn non_empty(flag: &str, value: String) -> Result<String, RelayError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(RelayError::Config(format!("--{flag} must not be empty")));
    }
    Ok(trimmed.to_string())
}

/// Parse durations like `0`, `500ms`, `1.5s`, `2m`, `1h` or `1m30s`.
///
/// Accepts the units `ns`, `us`, `µs`, `ms`, `s`, `m` and `h`, with an
/// optional fraction. Totals above `i64::MAX` nanoseconds are rejected.
pub fn parse_duration(input: &str) -> Result<Duration, String> {
    let input = input.trim();
    if input == "0" {
        return Ok(Duration::ZERO);
    }
    if input.is_empty() {
        return Err("empty duration".to_string());
    }

    let overflow = || format!("invalid duration '{input}': overflows");
    let is_number = |c: char| c.is_ascii_digit() || c == '.';

    let mut total_nanos: u128 = 0;
    let mut rest = input;
    while !rest.is_empty() {
        let number_len = rest.find(|c: char| !is_number(c)).unwrap_or(rest.len());
        let (whole, fraction) = match rest[..number_len].split_once('.') {
            Some((whole, fraction)) => (whole, fraction),
            None => (&rest[..number_len], ""),
        };
        if (whole.is_empty() && fraction.is_empty()) || fraction.contains('.') {
            return Err(format!("invalid duration '{input}': expected a number"));
        }
        rest = &rest[number_len..];

        let unit_len = rest.find(is_number).unwrap_or(rest.len());
        let unit_nanos: u128 = match &rest[..unit_len] {
            "ns" => 1,
            "us" | "µs" => 1_000,
            "ms" => 1_000_000,
            "s" => 1_000_000_000,
            "m" => 60 * 1_000_000_000,
            "h" => 3_600 * 1_000_000_000,
            "" => return Err(format!("invalid duration '{input}': missing unit")),
            other => return Err(format!("invalid duration '{input}': unknown unit '{other}'")),
        };
        rest = &rest[unit_len..];

        let whole: u128 = if whole.is_empty() {
            0
        } else {
            whole.parse().map_err(|_| overflow())?
        };
        let mut nanos = whole.checked_mul(unit_nanos).ok_or_else(overflow)?;

        // Digits beyond nanosecond precision are dropped.
        let mut scale = unit_nanos;
        for digit in fraction.chars() {
            scale /= 10;
            if scale == 0 {
                break;
            }
            let digit = u128::from(digit.to_digit(10).unwrap_or(0));
            nanos = nanos.checked_add(digit * scale).ok_or_else(overflow)?;
        }

        total_nanos = total_nanos.checked_add(nanos).ok_or_else(overflow)?;
        if total_nanos > i64::MAX as u128 {
            return Err(overflow());
        }
    }

    let secs = u64::try_from(total_nanos / 1_000_000_000).map_err(|_| overflow())?;
    let subsec = (total_nanos % 1_000_000_000) as u32;
    Ok(Duration::new(secs, subsec))
}
