//! Weather Relay - Rust Implementation
//!
//! Relays weather sensor readings from a durable AMQP queue to an HTTP
//! ingestion endpoint.
//!
//! # Overview
//!
//! Each delivery is decoded into a [`Reading`], posted to the backend once,
//! and then settled with the broker:
//! - Backend accepted it (status below 400): ack
//! - Backend rejected it or could not be reached: reject with requeue
//! - Payload is not a reading: reject without requeue
//!
//! Retrying is left to broker redelivery. The crate also carries:
//! - AMQP connection with a bounded retry budget
//! - TOML configuration with environment overrides
//! - Structured logging, relay counters and health endpoints
//!
//! # Quick Start
//!
//! ```rust
//! use weather_relay::protocol::{decode, encode, Reading};
//!
//! let payload = br#"{"temperature":21.5,"humidity":60,"windSpeed":3.2,"condition":"cloudy","location":"Berlin","timestamp":"2024-01-01T00:00:00Z"}"#;
//! let reading = decode(payload).unwrap();
//! assert_eq!(reading.location, "Berlin");
//! assert!(reading.latitude.is_none());
//!
//! // Re-encoded for the ingestion endpoint
//! let body = encode(&reading);
//! assert_eq!(decode(&body).unwrap(), reading);
//! ```

pub mod config;
pub mod error;
pub mod forwarder;
pub mod observability;
pub mod protocol;
pub mod relay;
pub mod testing;
pub mod transport;

pub use config::{ConfigError, RelayConfig};
pub use error::{RelayError, RelayResult};
pub use forwarder::{ForwardOutcome, Forwarder, HttpForwarder};
pub use protocol::{decode, encode, DecodeError, Reading};
pub use relay::{Disposition, LoopExit, Relay, Supervisor};
pub use transport::amqp::AmqpClient;
pub use transport::{InboundDelivery, Settlement};
