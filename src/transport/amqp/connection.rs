//! Pure connection policy and helpers for the AMQP connector
//!
//! Retry bookkeeping, URL validation and redaction live here so they can be
//! tested without a broker.

use crate::transport::BoxError;
use std::future::Future;
use std::time::Duration;
use thiserror::Error;
use tracing::{info, warn};
use url::Url;
use uuid::Uuid;

/// Bounded retry policy for the initial broker connection
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Total connection attempts before giving up (at least 1)
    pub max_attempts: u32,
    /// Pause between a failed attempt and the next one
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 30,
            delay: Duration::from_secs(2),
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, delay: Duration) -> Self {
        Self {
            max_attempts,
            delay,
        }
    }

    /// Delay to wait after `attempt` failed, or `None` when the budget is spent
    pub fn delay_after(&self, attempt: u32) -> Option<Duration> {
        if attempt >= self.max_attempts {
            None
        } else {
            Some(self.delay)
        }
    }

    /// Worst-case time spent sleeping before the connector gives up
    pub fn max_total_delay(&self) -> Duration {
        self.delay * self.max_attempts.saturating_sub(1)
    }
}

/// AMQP connector and client errors
#[derive(Debug, Error)]
pub enum AmqpError {
    #[error("Invalid broker URL: {0}")]
    InvalidBrokerUrl(String),
    #[error("Failed to connect to broker after {attempts} attempts")]
    ConnectionExhausted {
        attempts: u32,
        #[source]
        source: BoxError,
    },
    #[error("Failed to open a channel")]
    ChannelFailed(#[source] lapin::Error),
    #[error("Failed to declare queue '{queue}'")]
    QueueDeclareFailed {
        queue: String,
        #[source]
        source: lapin::Error,
    },
    #[error("Failed to set prefetch to {prefetch}")]
    QosFailed {
        prefetch: u16,
        #[source]
        source: lapin::Error,
    },
    #[error("Failed to register a consumer on '{queue}'")]
    ConsumeFailed {
        queue: String,
        #[source]
        source: lapin::Error,
    },
    #[error("Failed to publish to '{queue}'")]
    PublishFailed {
        queue: String,
        #[source]
        source: lapin::Error,
    },
    #[error("Failed to close broker connection")]
    CloseFailed(#[source] lapin::Error),
}

/// Run `attempt` until it succeeds or the policy's budget is exhausted
///
/// Attempts are numbered from 1. Each failure is logged with its ordinal and
/// followed by the policy delay, except the last one.
pub async fn connect_with_retry<T, E, F, Fut>(
    policy: &RetryPolicy,
    mut attempt: F,
) -> Result<T, AmqpError>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Into<BoxError>,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut current = 1;

    loop {
        match attempt(current).await {
            Ok(value) => {
                if current > 1 {
                    info!(attempt = current, max_attempts, "Broker connection established after retry");
                }
                return Ok(value);
            }
            Err(e) => {
                let source: BoxError = e.into();
                warn!(
                    attempt = current,
                    max_attempts,
                    error = %source,
                    "Retrying broker connection ({}/{})...",
                    current,
                    max_attempts
                );

                match policy.delay_after(current) {
                    Some(delay) => {
                        tokio::time::sleep(delay).await;
                        current += 1;
                    }
                    None => {
                        return Err(AmqpError::ConnectionExhausted {
                            attempts: current,
                            source,
                        })
                    }
                }
            }
        }
    }
}

/// Validate an AMQP broker URL (pure function)
pub fn validate_broker_url(broker_url: &str) -> Result<Url, AmqpError> {
    let url = Url::parse(broker_url)
        .map_err(|_| AmqpError::InvalidBrokerUrl(redact_broker_url(broker_url)))?;

    if !matches!(url.scheme(), "amqp" | "amqps") || url.host_str().is_none() {
        return Err(AmqpError::InvalidBrokerUrl(redact_broker_url(broker_url)));
    }

    Ok(url)
}

/// Replace the password in a broker URL with `***` for logging (pure function)
pub fn redact_broker_url(broker_url: &str) -> String {
    match Url::parse(broker_url) {
        Ok(mut url) => {
            if url.password().is_some() {
                // Only fails for cannot-be-a-base URLs, which carry no password
                let _ = url.set_password(Some("***"));
            }
            url.to_string()
        }
        Err(_) => "<unparseable broker url>".to_string(),
    }
}

/// Generate a unique consumer tag for this relay instance
pub fn generate_consumer_tag() -> String {
    format!("weather-relay-{}", Uuid::new_v4())
}
