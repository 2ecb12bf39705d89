//! Testing utilities and mock implementations
//!
//! Doubles for the broker side and the ingestion endpoint, so the relay can
//! be tested without RabbitMQ or a live backend.

pub mod mocks;

pub use mocks::*;
