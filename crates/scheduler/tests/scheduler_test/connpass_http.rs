use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio_util::sync::CancellationToken;
use wiremock::matchers::{header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use radar_core::config::ConnpassConfig;
use radar_core::RadarError;
use radar_scheduler::{ConnpassClient, EventSource, RateGate};

fn connpass_config(server: &MockServer, request_interval: Duration) -> ConnpassConfig {
    ConnpassConfig {
        base_url: format!("{}/api/v2/events/", server.uri()),
        api_key: Some("test-key".to_string()),
        request_interval,
        page_size: 20,
        timeout: Duration::from_secs(5),
    }
}

fn client(server: &MockServer, request_interval: Duration) -> ConnpassClient {
    let config = connpass_config(server, request_interval);
    let gate = Arc::new(RateGate::new(config.request_interval));
    ConnpassClient::new(&config, gate).unwrap()
}

fn events_body() -> serde_json::Value {
    serde_json::json!({
        "results_returned": 1,
        "results_available": 1,
        "results_start": 1,
        "events": [{
            "id": 364,
            "title": "Rust.Tokyo",
            "url": "https://rust.connpass.com/event/364/",
            "started_at": "2026-03-14T10:00:00+09:00",
            "ended_at": "2026-03-14T18:00:00+09:00",
            "limit": 100,
            "accepted": 80,
            "waiting": 2,
            "updated_at": "2026-02-01T12:00:00+09:00",
            "owner_nickname": "ferris",
            "group": { "title": "Rust.Tokyo" }
        }]
    })
}

#[tokio::test]
async fn fetch_sends_query_and_api_key() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/v2/events/"))
        .and(query_param("keyword", "rust"))
        .and(query_param("count", "20"))
        .and(query_param("address", "Tokyo"))
        .and(header("X-API-Key", "test-key"))
        .respond_with(ResponseTemplate::new(200).set_body_json(events_body()))
        .expect(1)
        .mount(&server)
        .await;

    let events = client(&server, Duration::ZERO)
        .fetch("rust", "Tokyo", &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(events.len(), 1);
    assert_eq!(events[0].event_id, 364);
    assert_eq!(events[0].accepted, 80);
    assert_eq!(events[0].occupancy_percent(), Some(80));
    assert_eq!(events[0].hash_digest.len(), 64);
}

#[tokio::test]
async fn empty_location_sends_no_address() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({ "events": [] })))
        .mount(&server)
        .await;

    let events = client(&server, Duration::ZERO)
        .fetch("rust", "", &CancellationToken::new())
        .await
        .unwrap();
    assert!(events.is_empty());

    let requests = server.received_requests().await.unwrap();
    assert_eq!(requests.len(), 1);
    assert!(requests[0].url.query_pairs().all(|(k, _)| k != "address"));
}

#[tokio::test]
async fn non_success_status_is_an_upstream_error() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(503).set_body_string("maintenance"))
        .mount(&server)
        .await;

    let err = client(&server, Duration::ZERO)
        .fetch("rust", "", &CancellationToken::new())
        .await
        .unwrap_err();

    match err {
        RadarError::Upstream(message) => {
            assert!(message.contains("503"));
            assert!(message.contains("maintenance"));
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

#[tokio::test]
async fn calls_are_spaced_by_the_gate() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({ "events": [] })))
        .mount(&server)
        .await;

    let interval = Duration::from_millis(150);
    let client = client(&server, interval);
    let cancel = CancellationToken::new();

    let started = Instant::now();
    for keyword in ["rust", "go", "zig"] {
        client.fetch(keyword, "", &cancel).await.unwrap();
    }

    assert!(started.elapsed() >= interval * 2);
    assert_eq!(server.received_requests().await.unwrap().len(), 3);
}

#[tokio::test]
async fn cancelled_fetch_never_reaches_the_api() {
    let server = MockServer::start().await;
    let cancel = CancellationToken::new();
    cancel.cancel();

    let err = client(&server, Duration::ZERO)
        .fetch("rust", "", &cancel)
        .await
        .unwrap_err();

    assert!(err.is_cancelled());
    assert!(server.received_requests().await.unwrap().is_empty());
}
