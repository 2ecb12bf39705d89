//! Broker transport layer
//!
//! This module provides the broker-agnostic delivery abstraction consumed by
//! the relay loop, and the AMQP implementation that produces it.

use async_trait::async_trait;
use futures::stream::BoxStream;
use std::fmt;
use thiserror::Error;

pub mod amqp;

/// Boxed error from a broker client library
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Stream of deliveries handed from the connector to the relay loop
pub type DeliveryStream = BoxStream<'static, Result<InboundDelivery, TransportError>>;

/// How a delivery is resolved with the broker
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Settlement {
    /// Positive acknowledgment; the broker forgets the message
    Ack,
    /// Negative acknowledgment with requeue; the broker redelivers later
    Requeue,
    /// Negative acknowledgment without requeue; the broker drops the message
    Discard,
}

impl fmt::Display for Settlement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Settlement::Ack => "ack",
            Settlement::Requeue => "requeue",
            Settlement::Discard => "discard",
        };
        f.write_str(label)
    }
}

/// Transport errors surfaced to the relay loop
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("Failed to {settlement} delivery {delivery_tag}")]
    SettleFailed {
        settlement: Settlement,
        delivery_tag: u64,
        #[source]
        source: BoxError,
    },
    #[error("Delivery stream failed")]
    StreamFailed(#[source] BoxError),
}

/// Broker-side handle that resolves one delivery
///
/// Implemented over `lapin::acker::Acker` for AMQP and by recording doubles in
/// `crate::testing`.
#[async_trait]
pub trait Acknowledger: Send + Sync {
    async fn settle(&self, settlement: Settlement) -> Result<(), BoxError>;
}

/// One message received from the broker plus its acknowledgment handle
///
/// The settle methods take `self`, so a delivery can be resolved at most once.
pub struct InboundDelivery {
    pub delivery_tag: u64,
    pub redelivered: bool,
    pub payload: Vec<u8>,
    acker: Box<dyn Acknowledger>,
}

impl InboundDelivery {
    pub fn new(
        delivery_tag: u64,
        redelivered: bool,
        payload: Vec<u8>,
        acker: Box<dyn Acknowledger>,
    ) -> Self {
        Self {
            delivery_tag,
            redelivered,
            payload,
            acker,
        }
    }

    /// Resolve this delivery with the broker
    pub async fn settle(self, settlement: Settlement) -> Result<(), TransportError> {
        let delivery_tag = self.delivery_tag;
        self.acker
            .settle(settlement)
            .await
            .map_err(|source| TransportError::SettleFailed {
                settlement,
                delivery_tag,
                source,
            })
    }
}

impl fmt::Debug for InboundDelivery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InboundDelivery")
            .field("delivery_tag", &self.delivery_tag)
            .field("redelivered", &self.redelivered)
            .field("payload_len", &self.payload.len())
            .finish()
    }
}
