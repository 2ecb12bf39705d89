//! Downstream forwarding of decoded readings
//!
//! A forwarder makes exactly one delivery attempt per call. Retrying is the
//! consumer's job and happens through broker redelivery.

use crate::protocol::Reading;
use async_trait::async_trait;
use std::fmt;

pub mod http;

pub use http::{HttpForwarder, HttpForwarderConfig};

/// Result of a single forward attempt
#[derive(Debug, Clone, PartialEq)]
pub enum ForwardOutcome {
    /// Endpoint answered with a status below 400
    Success { status: u16, body: String },
    /// Endpoint answered with a status of 400 or above
    Rejected { status: u16, body: String },
    /// No usable response: unreachable, reset, timed out, or body unreadable
    Transient { reason: String },
}

impl ForwardOutcome {
    /// Classify a received HTTP status (pure function)
    pub fn from_status(status: u16, body: String) -> Self {
        if status >= 400 {
            ForwardOutcome::Rejected { status, body }
        } else {
            ForwardOutcome::Success { status, body }
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, ForwardOutcome::Success { .. })
    }

    /// Status code when a response was received
    pub fn status(&self) -> Option<u16> {
        match self {
            ForwardOutcome::Success { status, .. } | ForwardOutcome::Rejected { status, .. } => {
                Some(*status)
            }
            ForwardOutcome::Transient { .. } => None,
        }
    }
}

impl fmt::Display for ForwardOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ForwardOutcome::Success { status, body } => write!(f, "accepted ({status}): {body}"),
            ForwardOutcome::Rejected { status, body } => write!(f, "API error {status}: {body}"),
            ForwardOutcome::Transient { reason } => write!(f, "transport failure: {reason}"),
        }
    }
}

/// Sends a reading to the ingestion endpoint
///
/// Implemented by [`HttpForwarder`] in production and by scripted doubles in
/// `crate::testing`.
#[async_trait]
pub trait Forwarder: Send + Sync {
    /// Forward one reading and classify the outcome
    async fn forward(&self, reading: &Reading) -> ForwardOutcome;

    /// Endpoint description for logs
    fn endpoint(&self) -> &str;
}

/// Truncate text destined for logs to at most 500 bytes on a char boundary
pub fn truncate_for_log(text: &str) -> String {
    const MAX_LEN: usize = 500;
    const SUFFIX: &str = "...[truncated]";

    if text.len() <= MAX_LEN {
        return text.to_string();
    }

    let mut cut = MAX_LEN - SUFFIX.len();
    while !text.is_char_boundary(cut) {
        cut -= 1;
    }
    format!("{}{}", &text[..cut], SUFFIX)
}
