//! AMQP 0-9-1 connector for the weather queue
//!
//! This module is split into two focused sub-modules:
//!
//! - [`connection`] - Pure retry policy, URL validation and redaction
//! - [`client`] - Impure I/O over lapin: connect, declare, consume, publish
//!
//! # Usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use weather_relay::config::BrokerSection;
//! use weather_relay::observability::RelayMetrics;
//! use weather_relay::transport::amqp::AmqpClient;
//!
//! # tokio_test::block_on(async {
//! let client = AmqpClient::connect(BrokerSection::default(), Arc::new(RelayMetrics::new())).await?;
//! let deliveries = client.consume().await?;
//! # drop(deliveries);
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! # });
//! ```

pub mod client;
pub mod connection;

pub use client::AmqpClient;
pub use connection::{
    connect_with_retry, redact_broker_url, validate_broker_url, AmqpError, RetryPolicy,
};
