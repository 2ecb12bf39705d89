//! Observability for the relay
//!
//! Structured logging, delivery counters and health check endpoints.

pub mod health;
pub mod logging;
pub mod metrics;

// Re-export for convenience
pub use health::HealthServer;
pub use logging::{init_default_logging, init_logging, LogFormat, LogSettings};
pub use metrics::{MetricsSnapshot, RelayMetrics};

// Span macros for structured logging
pub use logging::{broker_span, delivery_span};
