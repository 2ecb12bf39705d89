//! Thread-safe relay counters
//!
//! Provides atomic counters and mutex-protected collections for tracking
//! broker connectivity, delivery dispositions and forward latency. The
//! collector is created once at startup and shared as `Arc<RelayMetrics>`.

use serde::Serialize;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Number of forward latencies kept for percentile calculation
const LATENCY_WINDOW: usize = 1000;

/// Thread-safe metrics collector using atomics and mutexes
pub struct RelayMetrics {
    // Broker connectivity
    broker_connected: AtomicBool,
    connection_attempts: AtomicU64,
    connection_failures: AtomicU64,

    // Delivery dispositions
    deliveries_received: AtomicU64,
    deliveries_redelivered: AtomicU64,
    deliveries_decoded: AtomicU64,
    decode_failures: AtomicU64,
    deliveries_acked: AtomicU64,
    deliveries_requeued: AtomicU64,
    deliveries_discarded: AtomicU64,
    settle_failures: AtomicU64,

    // Forward outcomes
    forwards_succeeded: AtomicU64,
    forwards_rejected: AtomicU64,
    forwards_transient: AtomicU64,
    forward_times: Mutex<Vec<u64>>, // in milliseconds

    // Lifecycle
    relay_state: Mutex<String>,
    started_at: AtomicU64,
    last_delivery_processed: AtomicU64,
}

impl Default for RelayMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl RelayMetrics {
    pub fn new() -> Self {
        Self {
            broker_connected: AtomicBool::new(false),
            connection_attempts: AtomicU64::new(0),
            connection_failures: AtomicU64::new(0),
            deliveries_received: AtomicU64::new(0),
            deliveries_redelivered: AtomicU64::new(0),
            deliveries_decoded: AtomicU64::new(0),
            decode_failures: AtomicU64::new(0),
            deliveries_acked: AtomicU64::new(0),
            deliveries_requeued: AtomicU64::new(0),
            deliveries_discarded: AtomicU64::new(0),
            settle_failures: AtomicU64::new(0),
            forwards_succeeded: AtomicU64::new(0),
            forwards_rejected: AtomicU64::new(0),
            forwards_transient: AtomicU64::new(0),
            forward_times: Mutex::new(Vec::new()),
            relay_state: Mutex::new("starting".to_string()),
            started_at: AtomicU64::new(current_timestamp()),
            last_delivery_processed: AtomicU64::new(0),
        }
    }

    // Broker metrics
    pub fn connection_attempted(&self) {
        self.connection_attempts.fetch_add(1, Ordering::Relaxed);
    }

    pub fn connection_failed(&self) {
        self.connection_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn set_broker_connected(&self, connected: bool) {
        self.broker_connected.store(connected, Ordering::Relaxed);
    }

    pub fn is_broker_connected(&self) -> bool {
        self.broker_connected.load(Ordering::Relaxed)
    }

    // Delivery metrics
    pub fn delivery_received(&self, redelivered: bool) {
        self.deliveries_received.fetch_add(1, Ordering::Relaxed);
        if redelivered {
            self.deliveries_redelivered.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn delivery_decoded(&self) {
        self.deliveries_decoded.fetch_add(1, Ordering::Relaxed);
    }

    pub fn decode_failed(&self) {
        self.decode_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn delivery_acked(&self) {
        self.deliveries_acked.fetch_add(1, Ordering::Relaxed);
        self.mark_processed();
    }

    pub fn delivery_requeued(&self) {
        self.deliveries_requeued.fetch_add(1, Ordering::Relaxed);
        self.mark_processed();
    }

    pub fn delivery_discarded(&self) {
        self.deliveries_discarded.fetch_add(1, Ordering::Relaxed);
        self.mark_processed();
    }

    pub fn settle_failed(&self) {
        self.settle_failures.fetch_add(1, Ordering::Relaxed);
    }

    fn mark_processed(&self) {
        self.last_delivery_processed
            .store(current_timestamp(), Ordering::Relaxed);
    }

    // Forward metrics
    pub fn forward_succeeded(&self, duration: Duration) {
        self.forwards_succeeded.fetch_add(1, Ordering::Relaxed);
        self.record_forward_time(duration);
    }

    pub fn forward_rejected(&self, duration: Duration) {
        self.forwards_rejected.fetch_add(1, Ordering::Relaxed);
        self.record_forward_time(duration);
    }

    pub fn forward_transient(&self, duration: Duration) {
        self.forwards_transient.fetch_add(1, Ordering::Relaxed);
        self.record_forward_time(duration);
    }

    fn record_forward_time(&self, duration: Duration) {
        if let Ok(mut times) = self.forward_times.lock() {
            times.push(duration.as_millis() as u64);

            if times.len() > LATENCY_WINDOW {
                times.remove(0);
            }
        }
    }

    // Lifecycle metrics
    pub fn set_relay_state(&self, state: &str) {
        if let Ok(mut current) = self.relay_state.lock() {
            *current = state.to_string();
        }
    }

    /// Unix seconds of the last resolved delivery, 0 when none yet
    pub fn last_delivery_processed(&self) -> u64 {
        self.last_delivery_processed.load(Ordering::Relaxed)
    }

    /// Calculate forward latency statistics (pure function)
    fn forward_time_statistics(&self) -> ForwardLatency {
        let Ok(times) = self.forward_times.lock() else {
            return ForwardLatency::default();
        };
        if times.is_empty() {
            return ForwardLatency::default();
        }

        let mut sorted = times.clone();
        sorted.sort_unstable();

        ForwardLatency {
            avg_ms: sorted.iter().sum::<u64>() as f64 / sorted.len() as f64,
            p50_ms: percentile(&sorted, 50.0),
            p95_ms: percentile(&sorted, 95.0),
            p99_ms: percentile(&sorted, 99.0),
        }
    }

    /// Point-in-time copy of every counter
    pub fn snapshot(&self) -> MetricsSnapshot {
        let now = current_timestamp();
        let relay_state = self
            .relay_state
            .lock()
            .map(|state| state.clone())
            .unwrap_or_else(|_| "unknown".to_string());

        MetricsSnapshot {
            timestamp: now,
            uptime_seconds: now.saturating_sub(self.started_at.load(Ordering::Relaxed)),
            relay_state,
            broker: BrokerMetrics {
                connected: self.broker_connected.load(Ordering::Relaxed),
                connection_attempts: self.connection_attempts.load(Ordering::Relaxed),
                connection_failures: self.connection_failures.load(Ordering::Relaxed),
            },
            deliveries: DeliveryMetrics {
                received: self.deliveries_received.load(Ordering::Relaxed),
                redelivered: self.deliveries_redelivered.load(Ordering::Relaxed),
                decoded: self.deliveries_decoded.load(Ordering::Relaxed),
                decode_failures: self.decode_failures.load(Ordering::Relaxed),
                acked: self.deliveries_acked.load(Ordering::Relaxed),
                requeued: self.deliveries_requeued.load(Ordering::Relaxed),
                discarded: self.deliveries_discarded.load(Ordering::Relaxed),
                settle_failures: self.settle_failures.load(Ordering::Relaxed),
                last_processed: self.last_delivery_processed.load(Ordering::Relaxed),
            },
            forwards: ForwardMetrics {
                succeeded: self.forwards_succeeded.load(Ordering::Relaxed),
                rejected: self.forwards_rejected.load(Ordering::Relaxed),
                transient: self.forwards_transient.load(Ordering::Relaxed),
                latency: self.forward_time_statistics(),
            },
        }
    }
}

/// Serializable view of [`RelayMetrics`]
#[derive(Debug, Clone, Serialize)]
pub struct MetricsSnapshot {
    pub timestamp: u64,
    pub uptime_seconds: u64,
    pub relay_state: String,
    pub broker: BrokerMetrics,
    pub deliveries: DeliveryMetrics,
    pub forwards: ForwardMetrics,
}

#[derive(Debug, Clone, Serialize)]
pub struct BrokerMetrics {
    pub connected: bool,
    pub connection_attempts: u64,
    pub connection_failures: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct DeliveryMetrics {
    pub received: u64,
    pub redelivered: u64,
    pub decoded: u64,
    pub decode_failures: u64,
    pub acked: u64,
    pub requeued: u64,
    pub discarded: u64,
    pub settle_failures: u64,
    pub last_processed: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct ForwardMetrics {
    pub succeeded: u64,
    pub rejected: u64,
    pub transient: u64,
    pub latency: ForwardLatency,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct ForwardLatency {
    pub avg_ms: f64,
    pub p50_ms: f64,
    pub p95_ms: f64,
    pub p99_ms: f64,
}

fn current_timestamp() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

fn percentile(sorted_data: &[u64], percentile: f64) -> f64 {
    if sorted_data.is_empty() {
        return 0.0;
    }

    let index = (percentile / 100.0 * (sorted_data.len() - 1) as f64).round() as usize;
    sorted_data[index.min(sorted_data.len() - 1)] as f64
}
