//! Mock implementations for testing
//!
//! Provides an in-memory broker that hands out deliveries and records how
//! each one was settled, and a scripted forwarder, so the relay loop can be
//! exercised without RabbitMQ or an ingestion service.

use crate::forwarder::{ForwardOutcome, Forwarder};
use crate::protocol::{encode, Reading};
use crate::transport::{
    Acknowledger, BoxError, DeliveryStream, InboundDelivery, Settlement, TransportError,
};
use async_trait::async_trait;
use futures::channel::mpsc;
use futures::StreamExt;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::Mutex;

pub type SettlementRecord = (u64, Settlement);

/// In-memory broker producing deliveries with recording acknowledgers
#[derive(Debug, Default)]
pub struct MockBroker {
    next_tag: AtomicU64,
    settlements: Arc<Mutex<Vec<SettlementRecord>>>,
    fail_settle: bool,
}

impl MockBroker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Broker whose ack/nack calls all fail, as on a closed channel
    pub fn with_settle_failure() -> Self {
        Self {
            fail_settle: true,
            ..Default::default()
        }
    }

    /// Build a first-time delivery carrying `payload`
    pub fn delivery(&self, payload: impl Into<Vec<u8>>) -> InboundDelivery {
        self.make_delivery(payload.into(), false)
    }

    /// Build a delivery flagged as redelivered
    pub fn redelivery(&self, payload: impl Into<Vec<u8>>) -> InboundDelivery {
        self.make_delivery(payload.into(), true)
    }

    /// Build a delivery carrying an encoded reading
    pub fn reading_delivery(&self, reading: &Reading) -> InboundDelivery {
        self.delivery(encode(reading))
    }

    fn make_delivery(&self, payload: Vec<u8>, redelivered: bool) -> InboundDelivery {
        let delivery_tag = self.next_tag.fetch_add(1, Ordering::SeqCst) + 1;
        InboundDelivery::new(
            delivery_tag,
            redelivered,
            payload,
            Box::new(RecordingAcknowledger {
                delivery_tag,
                settlements: self.settlements.clone(),
                should_fail: self.fail_settle,
            }),
        )
    }

    /// Finite stream that ends after the given deliveries, like a closed consumer
    pub fn stream(&self, deliveries: Vec<InboundDelivery>) -> DeliveryStream {
        futures::stream::iter(deliveries.into_iter().map(Ok)).boxed()
    }

    /// Open-ended stream fed through the returned sender
    pub fn channel(&self) -> (DeliverySender, DeliveryStream) {
        let (tx, rx) = mpsc::unbounded();
        (DeliverySender { tx }, rx.boxed())
    }

    pub async fn get_settlements(&self) -> Vec<SettlementRecord> {
        self.settlements.lock().await.clone()
    }

    /// Settlements recorded for one delivery tag
    pub async fn settlements_for(&self, delivery_tag: u64) -> Vec<Settlement> {
        self.settlements
            .lock()
            .await
            .iter()
            .filter(|(tag, _)| *tag == delivery_tag)
            .map(|(_, settlement)| *settlement)
            .collect()
    }

    pub async fn clear_history(&self) {
        self.settlements.lock().await.clear();
    }
}

/// Feeding side of [`MockBroker::channel`]
#[derive(Clone)]
pub struct DeliverySender {
    tx: mpsc::UnboundedSender<Result<InboundDelivery, TransportError>>,
}

impl DeliverySender {
    pub fn send(&self, delivery: InboundDelivery) -> bool {
        self.tx.unbounded_send(Ok(delivery)).is_ok()
    }

    /// Push a stream-level failure, as when the connection drops
    pub fn fail(&self, reason: &str) -> bool {
        let source: BoxError = reason.to_string().into();
        self.tx
            .unbounded_send(Err(TransportError::StreamFailed(source)))
            .is_ok()
    }

    /// End the stream
    pub fn close(&self) {
        self.tx.close_channel();
    }
}

/// Acknowledger that records each settlement against its delivery tag
struct RecordingAcknowledger {
    delivery_tag: u64,
    settlements: Arc<Mutex<Vec<SettlementRecord>>>,
    should_fail: bool,
}

#[async_trait]
impl Acknowledger for RecordingAcknowledger {
    async fn settle(&self, settlement: Settlement) -> Result<(), BoxError> {
        if self.should_fail {
            return Err("Mock settle failure: channel closed".into());
        }
        self.settlements
            .lock()
            .await
            .push((self.delivery_tag, settlement));
        Ok(())
    }
}

/// Forwarder that replays scripted outcomes and records what it was given
#[derive(Debug)]
pub struct MockForwarder {
    pub forwarded: Arc<Mutex<Vec<Reading>>>,
    script: Arc<Mutex<VecDeque<ForwardOutcome>>>,
    fallback: ForwardOutcome,
}

impl MockForwarder {
    /// Every forward returns `outcome`
    pub fn always(outcome: ForwardOutcome) -> Self {
        Self {
            forwarded: Arc::new(Mutex::new(Vec::new())),
            script: Arc::new(Mutex::new(VecDeque::new())),
            fallback: outcome,
        }
    }

    /// Every forward succeeds with 201
    pub fn accepting() -> Self {
        Self::always(ForwardOutcome::Success {
            status: 201,
            body: r#"{"id":42}"#.to_string(),
        })
    }

    /// Every forward fails as if the endpoint were unreachable
    pub fn unreachable() -> Self {
        Self::always(ForwardOutcome::Transient {
            reason: "Mock connection refused".to_string(),
        })
    }

    /// Outcomes are returned in order, then the last one repeats
    pub fn scripted(outcomes: Vec<ForwardOutcome>) -> Self {
        let fallback = outcomes
            .last()
            .cloned()
            .unwrap_or(ForwardOutcome::Transient {
                reason: "Mock script empty".to_string(),
            });
        Self {
            forwarded: Arc::new(Mutex::new(Vec::new())),
            script: Arc::new(Mutex::new(outcomes.into())),
            fallback,
        }
    }

    pub async fn get_forwarded(&self) -> Vec<Reading> {
        self.forwarded.lock().await.clone()
    }
}

#[async_trait]
impl Forwarder for MockForwarder {
    async fn forward(&self, reading: &Reading) -> ForwardOutcome {
        self.forwarded.lock().await.push(reading.clone());
        self.script
            .lock()
            .await
            .pop_front()
            .unwrap_or_else(|| self.fallback.clone())
    }

    fn endpoint(&self) -> &str {
        "mock://ingest"
    }
}

/// The reading used across tests: Berlin, cloudy, no coordinates
pub fn sample_reading() -> Reading {
    Reading {
        temperature: 21.5,
        humidity: 60.0,
        wind_speed: 3.2,
        condition: "cloudy".to_string(),
        location: "Berlin".to_string(),
        latitude: None,
        longitude: None,
        timestamp: "2024-01-01T00:00:00Z".to_string(),
    }
}

/// Raw bytes of [`sample_reading`] as a collector would publish them
pub const SAMPLE_PAYLOAD: &[u8] = br#"{"temperature":21.5,"humidity":60,"windSpeed":3.2,"condition":"cloudy","location":"Berlin","timestamp":"2024-01-01T00:00:00Z"}"#;
