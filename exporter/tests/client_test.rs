use axum::extract::Path;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::{Duration as ChronoDuration, Utc};
use fireboard_exporter::client::FireboardClient;
use fireboard_exporter::model::ChannelKind;
use fireboard_exporter::{Call, Error, RemoteDataSource, TokenCache};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::{Duration, Instant};

const TOKEN: &str = "0123456789abcdef";
const TIMEOUT: Duration = Duration::from_secs(2);

fn authorized(headers: &HeaderMap) -> bool {
    headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v == format!("Token {TOKEN}"))
}

async fn login(Json(body): Json<Value>) -> Response {
    if body["username"] == "pit@example.com" && body["password"] == "secret" {
        Json(json!({ "key": TOKEN })).into_response()
    } else if body["username"] == "blank@example.com" {
        Json(json!({ "key": "" })).into_response()
    } else {
        (
            StatusCode::BAD_REQUEST,
            Json(json!({ "non_field_errors": ["Unable to log in"] })),
        )
            .into_response()
    }
}

async fn devices(headers: HeaderMap) -> Response {
    if !authorized(&headers) {
        return (StatusCode::UNAUTHORIZED, "invalid token").into_response();
    }
    Json(json!([{
        "id": 1,
        "UUID": "0f1e2d3c",
        "title": "Smoker",
        "active": true,
        "device_log": { "linkquality": "62/100", "ssid": "backyard" }
    }]))
    .into_response()
}

async fn device(Path(id): Path<String>, headers: HeaderMap) -> Response {
    if !authorized(&headers) {
        return StatusCode::UNAUTHORIZED.into_response();
    }
    if id == "slow.json" {
        tokio::time::sleep(Duration::from_secs(5)).await;
    }
    Json(json!({ "UUID": id.trim_end_matches(".json"), "active": true })).into_response()
}

async fn temps(Path(id): Path<String>, headers: HeaderMap) -> Response {
    if !authorized(&headers) {
        return StatusCode::UNAUTHORIZED.into_response();
    }
    Json(json!({
        "UUID": id,
        "degreetype": 2,
        "device_log": { "onboardTemp": 91.4 },
        "latest_temps": [{ "channel": 1, "temp": 225.5, "degreetype": 2 }]
    }))
    .into_response()
}

async fn sessions() -> Response {
    (StatusCode::TOO_MANY_REQUESTS, "slow down").into_response()
}

async fn chart(Path(id): Path<String>, headers: HeaderMap) -> Response {
    if !authorized(&headers) {
        return StatusCode::UNAUTHORIZED.into_response();
    }
    match id.as_str() {
        "5" => (StatusCode::INTERNAL_SERVER_ERROR, "boom").into_response(),
        "6" => "not json".into_response(),
        _ => Json(json!([
            { "channel_id": 1, "degreetype": 2, "label": 1, "device": "0f1e2d3c",
              "x": [1717260000, 1717260060], "y": [225.0, 226.5] },
            { "channel_id": "drive_0f1e2d3c", "degreetype": 2, "label": "Blower",
              "device": "0f1e2d3c", "x": [1717260000], "y": [40.0] }
        ]))
        .into_response(),
    }
}

async fn spawn_api() -> String {
    let app = Router::new()
        .route("/api/rest-auth/login", post(login))
        .route("/api/v1/devices.json", get(devices))
        .route("/api/v1/devices/:id", get(device))
        .route("/api/v1/devices/:id/temps.json", get(temps))
        .route("/api/v1/sessions.json", get(sessions))
        .route("/api/v1/sessions/:id/chart.json", get(chart));
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{addr}")
}

async fn client_with_token() -> FireboardClient {
    let tokens = Arc::new(TokenCache::new());
    tokens.store(TOKEN, Utc::now() + ChronoDuration::hours(1));
    FireboardClient::new(spawn_api().await, tokens).unwrap()
}

#[tokio::test]
async fn test_authenticate_returns_key() {
    let client = FireboardClient::new(spawn_api().await, Arc::new(TokenCache::new())).unwrap();

    let key = client
        .authenticate("pit@example.com", "secret", TIMEOUT)
        .await
        .unwrap();
    assert_eq!(key, TOKEN);
}

#[tokio::test]
async fn test_authenticate_rejected() {
    let client = FireboardClient::new(spawn_api().await, Arc::new(TokenCache::new())).unwrap();

    let err = client
        .authenticate("pit@example.com", "wrong", TIMEOUT)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Auth(ref msg) if msg.contains("400")));

    let err = client
        .authenticate("blank@example.com", "secret", TIMEOUT)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Auth(_)));
}

#[tokio::test]
async fn test_renewal_through_client() {
    let tokens = Arc::new(TokenCache::new());
    let client = FireboardClient::new(spawn_api().await, tokens.clone()).unwrap();

    tokens
        .renew(&client, "pit@example.com", "secret", TIMEOUT)
        .await
        .unwrap();

    let devices = client.list_devices(TIMEOUT).await.unwrap();
    assert_eq!(devices.len(), 1);
}

#[tokio::test]
async fn test_list_devices_sends_token() {
    let client = client_with_token().await;

    let devices = client.list_devices(TIMEOUT).await.unwrap();

    assert_eq!(devices.len(), 1);
    assert_eq!(devices[0].uuid, "0f1e2d3c");
    assert_eq!(devices[0].device_log.link_quality, "62/100");
}

#[tokio::test]
async fn test_missing_token_fails_before_request() {
    let client = FireboardClient::new("http://127.0.0.1:1", Arc::new(TokenCache::new())).unwrap();

    let err = client.list_devices(TIMEOUT).await.unwrap_err();
    assert!(matches!(err, Error::NoValidToken));
}

#[tokio::test]
async fn test_rejected_token() {
    let tokens = Arc::new(TokenCache::new());
    tokens.store("stale", Utc::now() + ChronoDuration::hours(1));
    let client = FireboardClient::new(spawn_api().await, tokens).unwrap();

    let err = client.list_devices(TIMEOUT).await.unwrap_err();
    assert!(matches!(err, Error::Unauthorized { call: Call::DevicesList }));
    assert!(err.needs_renewal());
}

#[tokio::test]
async fn test_rate_limit() {
    let client = client_with_token().await;

    let err = client.list_sessions(TIMEOUT).await.unwrap_err();
    assert!(matches!(err, Error::RateLimited { call: Call::SessionsList }));
}

#[tokio::test]
async fn test_chart_decoding() {
    let client = client_with_token().await;

    let chart = client.get_session_chart(7, TIMEOUT).await.unwrap();

    assert_eq!(chart.len(), 2);
    assert_eq!(chart[0].kind(), ChannelKind::Temperature);
    assert_eq!(chart[0].label, "1");
    assert_eq!(chart[0].y, vec![225.0, 226.5]);
    assert_eq!(chart[1].kind(), ChannelKind::Other("drive".to_string()));
}

#[tokio::test]
async fn test_server_error_keeps_context() {
    let client = client_with_token().await;

    let err = client.get_session_chart(5, TIMEOUT).await.unwrap_err();

    match err {
        Error::Remote {
            call,
            resource,
            status,
            message,
        } => {
            assert_eq!(call, Call::SessionsGetChartData);
            assert_eq!(resource.as_deref(), Some("5"));
            assert_eq!(status, Some(500));
            assert_eq!(message, "boom");
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

#[tokio::test]
async fn test_malformed_body() {
    let client = client_with_token().await;

    let err = client.get_session_chart(6, TIMEOUT).await.unwrap_err();

    assert!(matches!(err, Error::Decode { call: Call::SessionsGetChartData, .. }));
    assert_eq!(err.resource(), Some("6"));
}

#[tokio::test]
async fn test_request_timeout_is_applied() {
    let client = client_with_token().await;
    let started = Instant::now();

    let err = client
        .get_device("slow", Duration::from_millis(200))
        .await
        .unwrap_err();

    assert!(started.elapsed() < Duration::from_secs(2));
    match err {
        Error::Remote {
            call,
            resource,
            status,
            ..
        } => {
            assert_eq!(call, Call::DevicesGet);
            assert_eq!(resource.as_deref(), Some("slow"));
            assert_eq!(status, None);
        }
        other => panic!("unexpected error: {other:?}"),
    }

    let device = client.get_device("fast", TIMEOUT).await.unwrap();
    assert_eq!(device.uuid, "fast");
}

#[tokio::test]
async fn test_realtime_temperatures() {
    let client = client_with_token().await;

    let device = client
        .get_device_realtime_temperature("0f1e2d3c", TIMEOUT)
        .await
        .unwrap();

    assert_eq!(device.uuid, "0f1e2d3c");
    assert_eq!(device.degree_type, 2);
    assert_eq!(device.device_log.onboard_temperature, 91.4);
    assert_eq!(device.latest_temps.len(), 1);
    assert_eq!(device.latest_temps[0].temp, 225.5);
}
