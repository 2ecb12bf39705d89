//! Error types for the weather relay
//!
//! Each layer owns its error enum; [`RelayError`] gathers them for startup
//! paths that surface to `main`. Per-message failures never reach this type:
//! they are settled with the broker and logged where they occur.

use crate::config::ConfigError;
use crate::forwarder::http::ForwarderError;
use crate::forwarder::truncate_for_log;
use crate::protocol::DecodeError;
use crate::relay::SupervisorError;
use crate::transport::amqp::AmqpError;
use crate::transport::TransportError;
use thiserror::Error;

/// Top-level error for relay startup and shutdown
#[derive(Debug, Error)]
pub enum RelayError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Broker error: {0}")]
    Amqp(#[from] AmqpError),

    #[error("Forwarder setup error: {0}")]
    Forwarder(#[from] ForwarderError),

    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("Payload error: {0}")]
    Decode(#[from] DecodeError),

    #[error("Supervisor error: {0}")]
    Supervisor(#[from] SupervisorError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Health server error: {0}")]
    Health(#[from] warp::Error),
}

pub type RelayResult<T> = Result<T, RelayError>;

impl RelayError {
    /// Whether this error must terminate the process during startup
    ///
    /// Covers the broker budget exhausted, channel or queue setup failures,
    /// an unusable configuration, and a health port that cannot be bound.
    pub fn is_startup_fatal(&self) -> bool {
        match self {
            RelayError::Config(_)
            | RelayError::Forwarder(_)
            | RelayError::Io(_)
            | RelayError::Health(_) => true,
            RelayError::Amqp(e) => !matches!(
                e,
                AmqpError::PublishFailed { .. } | AmqpError::CloseFailed(_)
            ),
            RelayError::Transport(_) | RelayError::Decode(_) | RelayError::Supervisor(_) => false,
        }
    }

    /// Full diagnostic including the source chain, truncated for logs
    pub fn diagnostic(&self) -> String {
        truncate_for_log(&error_chain(self))
    }
}

/// Render an error and all of its sources as `outer: inner: root`
pub fn error_chain(error: &dyn std::error::Error) -> String {
    let mut rendered = error.to_string();
    let mut source = error.source();
    while let Some(cause) = source {
        let text = cause.to_string();
        // thiserror's `{0}` formatting often repeats the source verbatim
        if !rendered.ends_with(&text) {
            rendered.push_str(": ");
            rendered.push_str(&text);
        }
        source = cause.source();
    }
    rendered
}
