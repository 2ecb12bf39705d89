//! Integration tests for the HTTP forwarder
//!
//! Tests behavioral contracts against a mock ingestion endpoint:
//! - Request shape (method, path, content type, body)
//! - Status classification at the 400 boundary
//! - Transport failures (unreachable, timeout)

use std::time::Duration;
use weather_relay::forwarder::{ForwardOutcome, Forwarder, HttpForwarder, HttpForwarderConfig};
use weather_relay::protocol::Reading;
use weather_relay::testing::sample_reading;
use wiremock::matchers::{body_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn forwarder_for(base_url: &str) -> HttpForwarder {
    HttpForwarder::new(HttpForwarderConfig {
        endpoint_url: format!("{base_url}/weather/logs"),
        timeout: Duration::from_secs(2),
    })
    .unwrap()
}

#[tokio::test]
async fn test_forward_posts_json_reading_and_reports_success() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/weather/logs"))
        .and(header("content-type", "application/json"))
        .and(body_json(serde_json::json!({
            "temperature": 21.5,
            "humidity": 60.0,
            "windSpeed": 3.2,
            "condition": "cloudy",
            "location": "Berlin",
            "timestamp": "2024-01-01T00:00:00Z"
        })))
        .respond_with(ResponseTemplate::new(201).set_body_string(r#"{"id":42}"#))
        .expect(1)
        .mount(&mock_server)
        .await;

    let outcome = forwarder_for(&mock_server.uri())
        .forward(&sample_reading())
        .await;

    assert_eq!(
        outcome,
        ForwardOutcome::Success {
            status: 201,
            body: r#"{"id":42}"#.to_string()
        }
    );
}

#[tokio::test]
async fn test_forward_includes_coordinates_when_present() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/weather/logs"))
        .and(body_json(serde_json::json!({
            "temperature": -3.0,
            "humidity": 80.0,
            "windSpeed": 7.5,
            "condition": "snow",
            "location": "Oslo",
            "latitude": 59.91,
            "longitude": 10.75,
            "timestamp": "2024-01-02T06:00:00Z"
        })))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&mock_server)
        .await;

    let reading = Reading {
        temperature: -3.0,
        humidity: 80.0,
        wind_speed: 7.5,
        condition: "snow".to_string(),
        location: "Oslo".to_string(),
        latitude: Some(59.91),
        longitude: Some(10.75),
        timestamp: "2024-01-02T06:00:00Z".to_string(),
    };

    let outcome = forwarder_for(&mock_server.uri()).forward(&reading).await;
    assert!(outcome.is_success());
}

#[tokio::test]
async fn test_forward_server_error_is_rejected_with_body() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(500).set_body_string("database unavailable"))
        .mount(&mock_server)
        .await;

    let outcome = forwarder_for(&mock_server.uri())
        .forward(&sample_reading())
        .await;

    assert_eq!(
        outcome,
        ForwardOutcome::Rejected {
            status: 500,
            body: "database unavailable".to_string()
        }
    );
    assert_eq!(outcome.to_string(), "API error 500: database unavailable");
}

#[tokio::test]
async fn test_forward_client_errors_are_rejected_like_server_errors() {
    for status in [400u16, 404, 422] {
        let mock_server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(status))
            .mount(&mock_server)
            .await;

        let outcome = forwarder_for(&mock_server.uri())
            .forward(&sample_reading())
            .await;

        assert_eq!(outcome.status(), Some(status));
        assert!(matches!(outcome, ForwardOutcome::Rejected { .. }));
    }
}

#[tokio::test]
async fn test_forward_redirect_range_below_400_is_success() {
    let mock_server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(204))
        .mount(&mock_server)
        .await;

    let outcome = forwarder_for(&mock_server.uri())
        .forward(&sample_reading())
        .await;

    assert_eq!(outcome.status(), Some(204));
    assert!(outcome.is_success());
}

#[tokio::test]
async fn test_forward_long_body_is_truncated() {
    let mock_server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(502).set_body_string("x".repeat(5_000)))
        .mount(&mock_server)
        .await;

    let outcome = forwarder_for(&mock_server.uri())
        .forward(&sample_reading())
        .await;

    match outcome {
        ForwardOutcome::Rejected { status, body } => {
            assert_eq!(status, 502);
            assert!(body.len() < 600);
            assert!(body.ends_with("...[truncated]"));
        }
        other => panic!("expected rejection, got {other:?}"),
    }
}

#[tokio::test]
async fn test_forward_unreachable_endpoint_is_transient() {
    // Bind then drop a listener so the port is known to be closed
    let port = {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        listener.local_addr().unwrap().port()
    };

    let outcome = forwarder_for(&format!("http://127.0.0.1:{port}"))
        .forward(&sample_reading())
        .await;

    match outcome {
        ForwardOutcome::Transient { reason } => assert!(reason.contains("is_connect: true")),
        other => panic!("expected transient failure, got {other:?}"),
    }
}

#[tokio::test]
async fn test_forward_slow_endpoint_times_out_as_transient() {
    let mock_server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(201).set_delay(Duration::from_millis(500)))
        .mount(&mock_server)
        .await;

    let forwarder = HttpForwarder::new(HttpForwarderConfig {
        endpoint_url: format!("{}/weather/logs", mock_server.uri()),
        timeout: Duration::from_millis(100),
    })
    .unwrap();

    let outcome = forwarder.forward(&sample_reading()).await;

    match outcome {
        ForwardOutcome::Transient { reason } => assert!(reason.contains("is_timeout: true")),
        other => panic!("expected timeout, got {other:?}"),
    }
}

#[test]
fn test_forwarder_rejects_non_http_endpoint() {
    let result = HttpForwarder::new(HttpForwarderConfig {
        endpoint_url: "amqp://backend:3001/weather/logs".to_string(),
        timeout: Duration::from_secs(1),
    });
    assert!(result.is_err());
}
