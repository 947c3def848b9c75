//! HTTP Client pagination against a mock vendor server (SPEC_FULL §8).

use chrono::{DateTime, Utc};
use futures::StreamExt;
use serde::Deserialize;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use fulfillment_sync_engine::cancellation::SyncCancellation;
use fulfillment_sync_engine::http_client::{HasUpdatedAt, HttpClient};
use fulfillment_sync_engine::rate_limiter::{RateLimiter, RateLimiterConfig};

#[derive(Debug, Deserialize)]
struct Item {
    idproduct: i64,
    updated: String,
}

impl HasUpdatedAt for Item {
    fn updated_at(&self) -> Option<DateTime<Utc>> {
        DateTime::parse_from_rfc3339(&self.updated)
            .ok()
            .map(|dt| dt.with_timezone(&Utc))
    }
}

#[tokio::test]
async fn paginate_stops_once_a_short_page_arrives() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/products"))
        .and(wiremock::matchers::query_param("offset", "0"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([
            {"idproduct": 1, "updated": "2025-01-01T00:00:00Z"},
            {"idproduct": 2, "updated": "2025-01-02T00:00:00Z"},
        ])))
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/products"))
        .and(wiremock::matchers::query_param("offset", "2"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([
            {"idproduct": 3, "updated": "2025-01-03T00:00:00Z"},
        ])))
        .mount(&server)
        .await;

    let client = HttpClient::new(server.uri(), "test-api-key").unwrap();
    let limiter = RateLimiter::new(RateLimiterConfig {
        requests_per_minute: 6000,
        ..Default::default()
    });
    let cancel = SyncCancellation::new();

    let mut stream = client.paginate::<Item>(
        &limiter,
        &cancel,
        "/products",
        Vec::new(),
        None,
        None,
        0,
        2,
    );

    let mut all_ids = Vec::new();
    while let Some(page) = stream.next().await {
        let page = page.unwrap();
        all_ids.extend(page.into_iter().map(|item| item.idproduct));
    }

    assert_eq!(all_ids, vec![1, 2, 3]);
}

/// S4: days-window cutoff. Page 1 is entirely on/after the cutoff, so
/// pagination continues; page 2 straddles the cutoff, so the client drops
/// the stale items and stops — no further pages are fetched even though
/// page 2 is a full page.
#[tokio::test]
async fn cutoff_drops_stale_items_and_stops_pagination_early() {
    let server = MockServer::start().await;
    let cutoff: DateTime<Utc> = "2025-04-04T00:00:00Z".parse().unwrap();

    Mock::given(method("GET"))
        .and(path("/batches"))
        .and(wiremock::matchers::query_param("offset", "0"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([
            {"idproduct": 1, "updated": "2025-04-10T00:00:00Z"},
            {"idproduct": 2, "updated": "2025-04-09T00:00:00Z"},
        ])))
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/batches"))
        .and(wiremock::matchers::query_param("offset", "2"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([
            {"idproduct": 3, "updated": "2025-04-05T00:00:00Z"},
            {"idproduct": 4, "updated": "2025-04-01T00:00:00Z"},
        ])))
        .mount(&server)
        .await;

    // A third page exists upstream but must never be requested once the
    // cutoff has truncated page 2.
    Mock::given(method("GET"))
        .and(path("/batches"))
        .and(wiremock::matchers::query_param("offset", "4"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([
            {"idproduct": 5, "updated": "2025-03-20T00:00:00Z"},
        ])))
        .mount(&server)
        .await;

    let client = HttpClient::new(server.uri(), "test-api-key").unwrap();
    let limiter = RateLimiter::new(RateLimiterConfig {
        requests_per_minute: 6000,
        ..Default::default()
    });
    let cancel = SyncCancellation::new();

    let mut stream = client.paginate::<Item>(
        &limiter,
        &cancel,
        "/batches",
        Vec::new(),
        None,
        Some(cutoff),
        0,
        2,
    );

    let mut all_ids = Vec::new();
    while let Some(page) = stream.next().await {
        let page = page.unwrap();
        all_ids.extend(page.into_iter().map(|item| item.idproduct));
    }

    assert_eq!(all_ids, vec![1, 2, 3]);
}
