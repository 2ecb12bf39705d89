//! HTTP forwarder backed by reqwest

use super::{truncate_for_log, ForwardOutcome, Forwarder};
use crate::protocol::{encode, Reading, CONTENT_TYPE_JSON};
use async_trait::async_trait;
use reqwest::header::CONTENT_TYPE;
use reqwest::Client;
use std::time::Duration;
use thiserror::Error;
use tracing::debug;
use url::Url;

/// HTTP forwarder configuration
#[derive(Debug, Clone)]
pub struct HttpForwarderConfig {
    pub endpoint_url: String,
    pub timeout: Duration,
}

impl Default for HttpForwarderConfig {
    fn default() -> Self {
        Self {
            endpoint_url: "http://backend:3001/weather/logs".to_string(),
            timeout: Duration::from_secs(10),
        }
    }
}

/// Errors building the forwarder
#[derive(Debug, Error)]
pub enum ForwarderError {
    #[error("Invalid endpoint URL '{url}': {reason}")]
    InvalidEndpoint { url: String, reason: String },
    #[error("Failed to build HTTP client: {0}")]
    ClientBuild(#[from] reqwest::Error),
}

/// Posts readings as JSON to the ingestion endpoint
pub struct HttpForwarder {
    config: HttpForwarderConfig,
    client: Client,
}

impl HttpForwarder {
    pub fn new(config: HttpForwarderConfig) -> Result<Self, ForwarderError> {
        let url = Url::parse(&config.endpoint_url).map_err(|e| ForwarderError::InvalidEndpoint {
            url: config.endpoint_url.clone(),
            reason: e.to_string(),
        })?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(ForwarderError::InvalidEndpoint {
                url: config.endpoint_url.clone(),
                reason: format!("unsupported scheme '{}'", url.scheme()),
            });
        }

        let client = Client::builder().timeout(config.timeout).build()?;

        Ok(Self { config, client })
    }

    /// Describe a reqwest failure with its kind flags (pure function)
    fn describe_transport_error(error: &reqwest::Error) -> String {
        format!(
            "failed to POST to API: {} (is_connect: {}, is_timeout: {})",
            error,
            error.is_connect(),
            error.is_timeout()
        )
    }
}

#[async_trait]
impl Forwarder for HttpForwarder {
    async fn forward(&self, reading: &Reading) -> ForwardOutcome {
        let body = encode(reading);
        debug!(
            endpoint = %self.config.endpoint_url,
            bytes = body.len(),
            "Forwarding reading"
        );

        let response = match self
            .client
            .post(&self.config.endpoint_url)
            .header(CONTENT_TYPE, CONTENT_TYPE_JSON)
            .body(body)
            .send()
            .await
        {
            Ok(response) => response,
            Err(e) => {
                return ForwardOutcome::Transient {
                    reason: Self::describe_transport_error(&e),
                }
            }
        };

        let status = response.status().as_u16();
        match response.text().await {
            Ok(text) => ForwardOutcome::from_status(status, truncate_for_log(&text)),
            Err(e) => ForwardOutcome::Transient {
                reason: format!("failed to read response (status {status}): {e}"),
            },
        }
    }

    fn endpoint(&self) -> &str {
        &self.config.endpoint_url
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_targets_backend_logs() {
        let config = HttpForwarderConfig::default();
        assert_eq!(config.endpoint_url, "http://backend:3001/weather/logs");
        assert_eq!(config.timeout, Duration::from_secs(10));
    }

    #[test]
    fn test_rejects_unparseable_endpoint() {
        let config = HttpForwarderConfig {
            endpoint_url: "not a url".to_string(),
            ..Default::default()
        };
        assert!(matches!(
            HttpForwarder::new(config),
            Err(ForwarderError::InvalidEndpoint { .. })
        ));
    }

    #[test]
    fn test_rejects_non_http_scheme() {
        let config = HttpForwarderConfig {
            endpoint_url: "amqp://backend:5672/".to_string(),
            ..Default::default()
        };
        let error = HttpForwarder::new(config).err().unwrap();
        assert!(error.to_string().contains("unsupported scheme 'amqp'"));
    }

    #[test]
    fn test_endpoint_is_reported() {
        let forwarder = HttpForwarder::new(HttpForwarderConfig::default()).unwrap();
        assert_eq!(forwarder.endpoint(), "http://backend:3001/weather/logs");
    }
}
