//! Impure I/O operations for the AMQP connector
//!
//! This module handles the network side of the broker: connecting with retry,
//! opening the channel, declaring the queue, consuming and publishing, all
//! through the lapin client.

use super::connection::{
    connect_with_retry, generate_consumer_tag, redact_broker_url, validate_broker_url, AmqpError,
};
use crate::broker_span;
use crate::config::BrokerSection;
use crate::observability::metrics::RelayMetrics;
use crate::protocol::{encode, Reading, CONTENT_TYPE_JSON};
use crate::transport::{
    Acknowledger, BoxError, DeliveryStream, InboundDelivery, Settlement, TransportError,
};
use async_trait::async_trait;
use futures::StreamExt;
use lapin::acker::Acker;
use lapin::message::Delivery;
use lapin::options::{
    BasicAckOptions, BasicConsumeOptions, BasicNackOptions, BasicPublishOptions, BasicQosOptions,
    QueueDeclareOptions,
};
use lapin::types::FieldTable;
use lapin::{BasicProperties, Channel, Connection, ConnectionProperties};
use std::sync::Arc;
use tracing::{debug, info, Instrument};

/// Persistent delivery mode for published messages
const DELIVERY_MODE_PERSISTENT: u8 = 2;

/// Reply code sent when closing the channel and connection
const REPLY_SUCCESS: u16 = 200;

/// Connected AMQP client with one channel and one declared queue
pub struct AmqpClient {
    connection: Connection,
    channel: Channel,
    config: BrokerSection,
}

impl AmqpClient {
    /// Connect with the configured retry budget, open a channel and declare
    /// the durable queue
    ///
    /// Every error returned here is fatal at startup.
    pub async fn connect(
        config: BrokerSection,
        metrics: Arc<RelayMetrics>,
    ) -> Result<Self, AmqpError> {
        validate_broker_url(&config.url)?;
        let policy = config.retry_policy();

        info!(
            broker = %redact_broker_url(&config.url),
            max_attempts = policy.max_attempts,
            delay_ms = policy.delay.as_millis() as u64,
            "Connecting to broker"
        );

        let connection = connect_with_retry(&policy, |attempt| {
            let url = config.url.clone();
            let metrics = metrics.clone();
            async move {
                metrics.connection_attempted();
                debug!(attempt, "Opening broker connection");
                let result = Connection::connect(&url, ConnectionProperties::default()).await;
                if result.is_err() {
                    metrics.connection_failed();
                }
                result
            }
        })
        .instrument(broker_span!(operation = "connect", queue = %config.queue))
        .await?;

        let channel = connection
            .create_channel()
            .await
            .map_err(AmqpError::ChannelFailed)?;

        Self::declare_queue(&channel, &config.queue)
            .instrument(broker_span!(operation = "queue_declare", queue = %config.queue))
            .await?;
        metrics.set_broker_connected(true);

        info!(queue = %config.queue, "Broker connected and queue declared");

        Ok(Self {
            connection,
            channel,
            config,
        })
    }

    /// Declare the durable queue; a mismatch with an existing queue fails here
    async fn declare_queue(channel: &Channel, queue: &str) -> Result<(), AmqpError> {
        let options = QueueDeclareOptions {
            durable: true,
            ..QueueDeclareOptions::default()
        };

        channel
            .queue_declare(queue, options, FieldTable::default())
            .await
            .map_err(|source| AmqpError::QueueDeclareFailed {
                queue: queue.to_string(),
                source,
            })?;
        Ok(())
    }

    /// Register a manual-ack consumer and hand back its delivery stream
    pub async fn consume(&self) -> Result<DeliveryStream, AmqpError> {
        let prefetch = self.config.prefetch;
        self.channel
            .basic_qos(prefetch, BasicQosOptions::default())
            .await
            .map_err(|source| AmqpError::QosFailed { prefetch, source })?;

        let consumer_tag = self
            .config
            .consumer_tag
            .clone()
            .unwrap_or_else(generate_consumer_tag);

        let consumer = self
            .channel
            .basic_consume(
                &self.config.queue,
                &consumer_tag,
                BasicConsumeOptions::default(),
                FieldTable::default(),
            )
            .await
            .map_err(|source| AmqpError::ConsumeFailed {
                queue: self.config.queue.clone(),
                source,
            })?;

        info!(
            queue = %self.config.queue,
            consumer_tag = %consumer_tag,
            prefetch,
            "Consumer registered"
        );

        Ok(consumer
            .map(|item| {
                item.map(into_inbound)
                    .map_err(|e| TransportError::StreamFailed(Box::new(e)))
            })
            .boxed())
    }

    /// Publish one reading as a persistent JSON message on the queue
    pub async fn publish_reading(&self, reading: &Reading) -> Result<(), AmqpError> {
        self.publish_raw(&encode(reading)).await?;
        debug!(queue = %self.config.queue, location = %reading.location, "Published reading");
        Ok(())
    }

    /// Publish arbitrary bytes with the same properties as a reading
    ///
    /// Waits for the broker's publisher confirm when confirms are enabled.
    pub async fn publish_raw(&self, payload: &[u8]) -> Result<(), AmqpError> {
        let properties = BasicProperties::default()
            .with_delivery_mode(DELIVERY_MODE_PERSISTENT)
            .with_content_type(CONTENT_TYPE_JSON.into());

        let publish_failed = |source: lapin::Error| AmqpError::PublishFailed {
            queue: self.config.queue.clone(),
            source,
        };

        self.channel
            .basic_publish(
                "",
                &self.config.queue,
                BasicPublishOptions::default(),
                payload,
                properties,
            )
            .await
            .map_err(publish_failed)?
            .await
            .map_err(publish_failed)?;
        Ok(())
    }

    /// Whether the underlying connection is still open
    pub fn is_connected(&self) -> bool {
        self.connection.status().connected()
    }

    pub fn queue(&self) -> &str {
        &self.config.queue
    }

    /// Close the channel, then the connection
    pub async fn close(self) -> Result<(), AmqpError> {
        self.channel
            .close(REPLY_SUCCESS, "relay shutting down")
            .await
            .map_err(AmqpError::CloseFailed)?;
        self.connection
            .close(REPLY_SUCCESS, "relay shutting down")
            .await
            .map_err(AmqpError::CloseFailed)?;
        info!("Broker connection closed");
        Ok(())
    }
}

/// Wrap a lapin delivery in the broker-agnostic delivery type
fn into_inbound(delivery: Delivery) -> InboundDelivery {
    InboundDelivery::new(
        delivery.delivery_tag,
        delivery.redelivered,
        delivery.data,
        Box::new(LapinAcknowledger {
            acker: delivery.acker,
        }),
    )
}

/// Acknowledger over a lapin delivery's acker
struct LapinAcknowledger {
    acker: Acker,
}

#[async_trait]
impl Acknowledger for LapinAcknowledger {
    async fn settle(&self, settlement: Settlement) -> Result<(), BoxError> {
        match settlement {
            Settlement::Ack => {
                self.acker.ack(BasicAckOptions::default()).await?;
            }
            Settlement::Requeue => {
                self.acker
                    .nack(BasicNackOptions {
                        multiple: false,
                        requeue: true,
                    })
                    .await?;
            }
            Settlement::Discard => {
                self.acker
                    .nack(BasicNackOptions {
                        multiple: false,
                        requeue: false,
                    })
                    .await?;
            }
        }
        Ok(())
    }
}
