#![allow(clippy::unwrap_used)]
// Integration tests for `HttpTransport` using wiremock.

use serde_json::json;
use wiremock::matchers::{body_json, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use deckathlon_api::{ApiRequest, Error, HttpTransport, Method, Transport, TransportConfig};

// ── Helpers ─────────────────────────────────────────────────────────

async fn setup() -> (MockServer, HttpTransport) {
    let server = MockServer::start().await;
    let transport = HttpTransport::new(&TransportConfig::default()).unwrap();
    (server, transport)
}

fn api_url(server: &MockServer, suffix: &str) -> String {
    format!("{}/api/{suffix}", server.uri())
}

// ── Request encoding ────────────────────────────────────────────────

#[tokio::test]
async fn test_get_sends_payload_as_query() {
    let (server, transport) = setup().await;

    Mock::given(method("GET"))
        .and(path("/api/poll"))
        .and(query_param("dt_from", "2020-05-14 10:00:00"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"data": {}})))
        .expect(1)
        .mount(&server)
        .await;

    let req = ApiRequest::new(Method::Get, api_url(&server, "poll"))
        .with_data(json!({"dt_from": "2020-05-14 10:00:00"}));
    let resp = transport.request(req).await.unwrap();

    assert_eq!(resp.status, 200);
    assert!(resp.is_success());
}

#[tokio::test]
async fn test_post_sends_json_body() {
    let (server, transport) = setup().await;

    let item = json!({"name": "Table 1", "fk_templates": 2});

    Mock::given(method("POST"))
        .and(path("/api/tables"))
        .and(header("content-type", "application/json"))
        .and(body_json(&item))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"data": 7})))
        .expect(1)
        .mount(&server)
        .await;

    let req = ApiRequest::new(Method::Post, api_url(&server, "tables")).with_data(item);
    let resp = transport.request(req).await.unwrap();

    assert_eq!(resp.status, 200);
    assert_eq!(resp.body, r#"{"data":7}"#);
}

#[tokio::test]
async fn test_put_and_delete_hit_item_urls() {
    let (server, transport) = setup().await;

    Mock::given(method("PUT"))
        .and(path("/api/tables/7"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"data": {"id": 7}})))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("DELETE"))
        .and(path("/api/tables/7"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
        .expect(1)
        .mount(&server)
        .await;

    let put = ApiRequest::new(Method::Put, api_url(&server, "tables/7")).with_data(json!({"id": 7}));
    assert_eq!(transport.request(put).await.unwrap().status, 200);

    let delete = ApiRequest::new(Method::Delete, api_url(&server, "tables/7"));
    assert_eq!(transport.request(delete).await.unwrap().status, 200);
}

// ── Status passthrough ──────────────────────────────────────────────

#[tokio::test]
async fn test_error_status_is_a_response_not_an_error() {
    let (server, transport) = setup().await;

    Mock::given(method("POST"))
        .and(path("/api/login"))
        .respond_with(
            ResponseTemplate::new(401)
                .set_body_json(json!({"status": "error", "error": "Invalid username or password."})),
        )
        .mount(&server)
        .await;

    let req = ApiRequest::new(Method::Post, api_url(&server, "login"))
        .with_data(json!({"username": "a", "password": "b"}));
    let resp = transport.request(req).await.unwrap();

    assert!(resp.is_unauthorized());
    assert!(!resp.is_success());
    assert_eq!(resp.reason.as_deref(), Some("Unauthorized"));
    assert!(resp.body.contains("Invalid username"));
}

// ── Failures ────────────────────────────────────────────────────────

#[tokio::test]
async fn test_invalid_url() {
    let (_server, transport) = setup().await;

    let result = transport
        .request(ApiRequest::new(Method::Get, "not a url"))
        .await;

    assert!(
        matches!(result, Err(Error::InvalidUrl(_))),
        "expected InvalidUrl error, got: {result:?}"
    );
}

#[tokio::test]
async fn test_connection_refused_is_transport_error() {
    let server = MockServer::start().await;
    let url = api_url(&server, "tables");
    drop(server);

    let transport = HttpTransport::new(&TransportConfig::default()).unwrap();
    let result = transport.request(ApiRequest::new(Method::Get, url)).await;

    match result {
        Err(Error::Transport(err)) => assert!(err.is_connect()),
        other => panic!("expected Transport error, got: {other:?}"),
    }
}
