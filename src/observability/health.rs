//! Health check HTTP server for container orchestration
//!
//! Provides HTTP endpoints reporting broker connectivity, consumer status and
//! the relay counters.

use crate::observability::metrics::RelayMetrics;
use serde::Serialize;
use std::collections::HashMap;
use std::convert::Infallible;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};
use warp::http::StatusCode;
use warp::{Filter, Rejection, Reply};

/// HTTP health check server
pub struct HealthServer {
    service: String,
    port: u16,
    metrics: Arc<RelayMetrics>,
    consuming: AtomicBool,
}

impl HealthServer {
    pub fn new(service: impl Into<String>, port: u16, metrics: Arc<RelayMetrics>) -> Self {
        Self {
            service: service.into(),
            port,
            metrics,
            consuming: AtomicBool::new(false),
        }
    }

    /// Record whether the consumption loop is running
    pub fn set_consuming(&self, consuming: bool) {
        self.consuming.store(consuming, Ordering::Relaxed);
    }

    pub fn is_consuming(&self) -> bool {
        self.consuming.load(Ordering::Relaxed)
    }

    /// Build the route table
    pub fn routes(
        self: Arc<Self>,
    ) -> impl Filter<Extract = (impl Reply,), Error = Rejection> + Clone {
        let with_server = {
            let server = self.clone();
            warp::any().map(move || server.clone())
        };

        // GET /health - broker and consumer status
        let health_route = warp::path("health")
            .and(warp::path::end())
            .and(warp::get())
            .and(with_server.clone())
            .and_then(|server: Arc<HealthServer>| async move {
                let status = server.health_status();
                let code = if status.status == "healthy" {
                    StatusCode::OK
                } else {
                    StatusCode::SERVICE_UNAVAILABLE
                };
                Ok::<_, Infallible>(warp::reply::with_status(warp::reply::json(&status), code))
            });

        // GET /ready - ready once deliveries are being consumed
        let ready_route = warp::path("ready")
            .and(warp::path::end())
            .and(warp::get())
            .and(with_server.clone())
            .and_then(|server: Arc<HealthServer>| async move {
                let ready = server.is_consuming() && server.metrics.is_broker_connected();
                let response = ReadinessResponse {
                    ready,
                    timestamp: current_timestamp(),
                };
                let code = if ready {
                    StatusCode::OK
                } else {
                    StatusCode::SERVICE_UNAVAILABLE
                };
                Ok::<_, Infallible>(warp::reply::with_status(warp::reply::json(&response), code))
            });

        // GET /live - process liveness
        let live_route = warp::path("live")
            .and(warp::path::end())
            .and(warp::get())
            .map(|| {
                warp::reply::json(&LivenessResponse {
                    alive: true,
                    timestamp: current_timestamp(),
                })
            });

        // GET /metrics - counter snapshot
        let metrics_route = warp::path("metrics")
            .and(warp::path::end())
            .and(warp::get())
            .and(with_server)
            .map(|server: Arc<HealthServer>| warp::reply::json(&server.metrics.snapshot()));

        // GET / - endpoint listing
        let root_route = warp::path::end().and(warp::get()).map(|| {
            let endpoints: HashMap<&str, &str> = [
                ("/health", "Broker and consumer health"),
                ("/ready", "Readiness probe"),
                ("/live", "Liveness probe"),
                ("/metrics", "Relay counters and forward latency"),
            ]
            .into_iter()
            .collect();
            warp::reply::json(&endpoints)
        });

        health_route
            .or(ready_route)
            .or(live_route)
            .or(metrics_route)
            .or(root_route)
    }

    /// Bind the listener and hand back the serving future
    ///
    /// Fails when the port is already in use.
    pub fn bind(
        self: Arc<Self>,
    ) -> Result<(SocketAddr, impl Future<Output = ()> + Send + 'static), warp::Error> {
        let port = self.port;
        let (addr, server) =
            warp::serve(self.routes()).try_bind_ephemeral(([0, 0, 0, 0], port))?;
        tracing::info!(%addr, "Health server listening");
        Ok((addr, server))
    }

    fn health_status(&self) -> HealthStatus {
        let now = current_timestamp();
        let mut checks = HashMap::new();
        checks.insert("broker".to_string(), self.check_broker(now));
        checks.insert("consumer".to_string(), self.check_consumer(now));

        let healthy = checks.values().all(|check| check.status == "healthy");
        HealthStatus {
            status: if healthy { "healthy" } else { "degraded" }.to_string(),
            timestamp: now,
            service: self.service.clone(),
            uptime_seconds: self.metrics.snapshot().uptime_seconds,
            checks,
        }
    }

    fn check_broker(&self, now: u64) -> HealthCheck {
        if self.metrics.is_broker_connected() {
            HealthCheck::healthy("Broker connection established", now)
        } else {
            HealthCheck::unhealthy("Broker connection not established or lost", now)
        }
    }

    fn check_consumer(&self, now: u64) -> HealthCheck {
        if self.is_consuming() {
            let last = self.metrics.last_delivery_processed();
            let message = if last == 0 {
                "Consuming, no deliveries processed yet".to_string()
            } else {
                format!("Consuming, last delivery resolved at {last}")
            };
            HealthCheck::healthy(message, now)
        } else {
            HealthCheck::unhealthy("Consumption loop is not running", now)
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct HealthCheck {
    pub status: String,
    pub message: Option<String>,
    pub last_check: u64,
}

impl HealthCheck {
    fn healthy(message: impl Into<String>, now: u64) -> Self {
        Self {
            status: "healthy".to_string(),
            message: Some(message.into()),
            last_check: now,
        }
    }

    fn unhealthy(message: impl Into<String>, now: u64) -> Self {
        Self {
            status: "unhealthy".to_string(),
            message: Some(message.into()),
            last_check: now,
        }
    }
}

#[derive(Debug, Serialize)]
struct HealthStatus {
    status: String,
    timestamp: u64,
    service: String,
    uptime_seconds: u64,
    checks: HashMap<String, HealthCheck>,
}

#[derive(Debug, Serialize)]
struct ReadinessResponse {
    ready: bool,
    timestamp: u64,
}

#[derive(Debug, Serialize)]
struct LivenessResponse {
    alive: bool,
    timestamp: u64,
}

fn current_timestamp() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}
