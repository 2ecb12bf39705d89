//! Consumption loop
//!
//! Pulls deliveries one at a time, decodes each into a [`Reading`], forwards
//! it, and resolves the delivery with exactly one ack or reject:
//!
//! | Outcome                      | Settlement         |
//! |------------------------------|--------------------|
//! | payload does not decode      | reject, no requeue |
//! | forward succeeded (< 400)    | ack                |
//! | forward rejected (>= 400)    | reject, requeue    |
//! | endpoint unreachable/timeout | reject, requeue    |

use crate::delivery_span;
use crate::forwarder::{truncate_for_log, ForwardOutcome, Forwarder};
use crate::observability::RelayMetrics;
use crate::protocol::{decode, Reading};
use crate::transport::{InboundDelivery, Settlement, TransportError};
use futures::{Stream, StreamExt};
use std::fmt;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::watch;
use tracing::{debug, error, info, warn, Instrument};

/// Terminal state of one delivery after processing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    Acked,
    Requeued,
    Discarded,
}

impl Disposition {
    fn settlement(self) -> Settlement {
        match self {
            Disposition::Acked => Settlement::Ack,
            Disposition::Requeued => Settlement::Requeue,
            Disposition::Discarded => Settlement::Discard,
        }
    }

    /// Disposition for a forward attempt's outcome
    pub fn for_outcome(outcome: &ForwardOutcome) -> Self {
        if outcome.is_success() {
            Disposition::Acked
        } else {
            Disposition::Requeued
        }
    }
}

impl fmt::Display for Disposition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Disposition::Acked => "acked",
            Disposition::Requeued => "requeued",
            Disposition::Discarded => "discarded",
        };
        f.write_str(label)
    }
}

/// Why the consumption loop stopped
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoopExit {
    /// The broker ended the delivery stream
    StreamClosed,
    /// Shutdown was requested
    Shutdown,
    /// The delivery stream yielded an error
    StreamFailed(String),
}

impl fmt::Display for LoopExit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LoopExit::StreamClosed => f.write_str("delivery stream closed"),
            LoopExit::Shutdown => f.write_str("shutdown requested"),
            LoopExit::StreamFailed(reason) => write!(f, "delivery stream failed: {reason}"),
        }
    }
}

/// Sequential relay from broker deliveries to the ingestion endpoint
pub struct Relay<F: Forwarder> {
    forwarder: F,
    metrics: Arc<RelayMetrics>,
}

impl<F: Forwarder> Relay<F> {
    pub fn new(forwarder: F, metrics: Arc<RelayMetrics>) -> Self {
        Self { forwarder, metrics }
    }

    pub fn forwarder(&self) -> &F {
        &self.forwarder
    }

    pub fn metrics(&self) -> &Arc<RelayMetrics> {
        &self.metrics
    }

    /// Process one delivery to completion
    ///
    /// Returns the disposition that was applied. An error means the ack or
    /// reject call itself failed; the delivery is then left to the broker,
    /// which redelivers unresolved messages once the channel closes.
    pub async fn process_delivery(
        &self,
        delivery: InboundDelivery,
    ) -> Result<Disposition, TransportError> {
        let span = delivery_span!(
            delivery_tag = delivery.delivery_tag,
            redelivered = delivery.redelivered
        );
        self.process_in_span(delivery).instrument(span).await
    }

    async fn process_in_span(
        &self,
        delivery: InboundDelivery,
    ) -> Result<Disposition, TransportError> {
        self.metrics.delivery_received(delivery.redelivered);
        if delivery.redelivered {
            debug!("Delivery was redelivered by the broker");
        }

        let disposition = match decode(&delivery.payload) {
            Ok(reading) => {
                self.metrics.delivery_decoded();
                self.forward_reading(&reading).await
            }
            Err(e) => {
                error!(
                    error = %e,
                    payload = %truncate_for_log(&String::from_utf8_lossy(&delivery.payload)),
                    "Error parsing reading, discarding message"
                );
                self.metrics.decode_failed();
                Disposition::Discarded
            }
        };

        let delivery_tag = delivery.delivery_tag;
        if let Err(e) = delivery.settle(disposition.settlement()).await {
            error!(error = %e, source = ?std::error::Error::source(&e), "Failed to settle delivery");
            self.metrics.settle_failed();
            return Err(e);
        }

        match disposition {
            Disposition::Acked => self.metrics.delivery_acked(),
            Disposition::Requeued => self.metrics.delivery_requeued(),
            Disposition::Discarded => self.metrics.delivery_discarded(),
        }
        debug!(delivery_tag, disposition = %disposition, "Delivery settled");
        Ok(disposition)
    }

    async fn forward_reading(&self, reading: &Reading) -> Disposition {
        info!(location = %reading.location, "Received: {}", reading);

        let started = Instant::now();
        let outcome = self.forwarder.forward(reading).await;
        let elapsed = started.elapsed();

        match &outcome {
            ForwardOutcome::Success { status, body } => {
                self.metrics.forward_succeeded(elapsed);
                info!(
                    location = %reading.location,
                    status = *status,
                    response = %body,
                    duration_ms = elapsed.as_millis() as u64,
                    "Sent reading from {} to backend", reading.location
                );
            }
            ForwardOutcome::Rejected { status, body } => {
                self.metrics.forward_rejected(elapsed);
                error!(
                    location = %reading.location,
                    status = *status,
                    response = %body,
                    endpoint = %self.forwarder.endpoint(),
                    "Backend rejected reading, requeueing"
                );
            }
            ForwardOutcome::Transient { reason } => {
                self.metrics.forward_transient(elapsed);
                error!(
                    location = %reading.location,
                    error = %reason,
                    endpoint = %self.forwarder.endpoint(),
                    "Error sending reading to backend, requeueing"
                );
            }
        }

        Disposition::for_outcome(&outcome)
    }

    /// Consume deliveries until the stream ends, fails, or shutdown is signalled
    ///
    /// Shutdown is checked only while waiting for the next delivery, so a
    /// delivery that has been received is always settled first.
    pub async fn run<S>(&self, mut deliveries: S, mut shutdown: watch::Receiver<bool>) -> LoopExit
    where
        S: Stream<Item = Result<InboundDelivery, TransportError>> + Unpin,
    {
        info!(endpoint = %self.forwarder.endpoint(), "Waiting for messages");
        self.metrics.set_relay_state("consuming");

        let exit = loop {
            if *shutdown.borrow() {
                break LoopExit::Shutdown;
            }

            let next = tokio::select! {
                biased;
                changed = shutdown.changed() => {
                    match changed {
                        Ok(()) => continue,
                        // Sender dropped: nobody can signal shutdown anymore
                        Err(_) => break LoopExit::Shutdown,
                    }
                }
                next = deliveries.next() => next,
            };

            match next {
                Some(Ok(delivery)) => {
                    // Settle failures are already logged and counted
                    let _ = self.process_delivery(delivery).await;
                }
                Some(Err(e)) => {
                    let reason = match std::error::Error::source(&e) {
                        Some(source) => format!("{e}: {source}"),
                        None => e.to_string(),
                    };
                    break LoopExit::StreamFailed(reason);
                }
                None => break LoopExit::StreamClosed,
            }
        };

        match &exit {
            LoopExit::Shutdown => info!("Consumption loop stopped: {}", exit),
            _ => warn!("Consumption loop stopped: {}", exit),
        }
        self.metrics.set_relay_state("stopped");
        exit
    }
}
