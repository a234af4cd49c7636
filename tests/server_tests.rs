mod common;

use axum::body::{to_bytes, Body};
use axum::http::{Request, StatusCode};
use axum::Router;
use common::{ip, scanner_with, FakeProber, FakeResolver};
use lan_sweep_rs::server::router;
use lan_sweep_rs::types::{AutoScanConfig, ScanAggregate};
use serde_json::{json, Value};
use std::sync::Arc;
use tower::ServiceExt;

fn app() -> Router {
    let (scanner, _) = scanner_with(
        "10.0.0.1-10.0.0.2",
        Arc::new(FakeProber::new([ip(2)])),
        Arc::new(FakeResolver::default()),
        8,
    );
    let static_dir = std::env::temp_dir().join("lan-sweep-rs-no-static");
    router(scanner, static_dir)
}

async fn send(app: &Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let builder = Request::builder().method(method).uri(uri);
    let req = match body {
        Some(b) => builder
            .header("content-type", "application/json")
            .body(Body::from(b.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };
    let res = app.clone().oneshot(req).await.unwrap();
    let status = res.status();
    let bytes = to_bytes(res.into_body(), usize::MAX).await.unwrap();
    let value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, value)
}

#[tokio::test]
async fn health_is_ok() {
    let (status, body) = send(&app(), "GET", "/health", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({ "status": "ok" }));
}

#[tokio::test]
async fn scan_then_results() {
    let app = app();
    let (status, body) = send(&app, "POST", "/api/scan", None).await;
    assert_eq!(status, StatusCode::OK);
    let agg: ScanAggregate = serde_json::from_value(body).unwrap();
    assert_eq!((agg.total, agg.online_count, agg.offline_count), (2, 1, 1));

    let (status, body) = send(&app, "GET", "/api/results", None).await;
    assert_eq!(status, StatusCode::OK);
    let latest: ScanAggregate = serde_json::from_value(body).unwrap();
    assert_eq!(latest, agg);
}

#[tokio::test]
async fn config_round_trip_and_rejection() {
    let app = app();
    let update = json!({
        "ip_range": "10.0.0.0/29",
        "auto_scan_enabled": true,
        "auto_scan_interval_seconds": 120,
        "device_names": { "10.0.0.3": " tv " }
    });
    let (status, body) = send(&app, "POST", "/api/config", Some(update)).await;
    assert_eq!(status, StatusCode::OK);
    let cfg: AutoScanConfig = serde_json::from_value(body).unwrap();
    assert_eq!(cfg.device_names[&ip(3)], "tv");

    let (_, body) = send(&app, "GET", "/api/config", None).await;
    assert_eq!(serde_json::from_value::<AutoScanConfig>(body).unwrap(), cfg);

    let bad = json!({ "ip_range": "10.0.0.0-10.2.0.0" });
    let (status, body) = send(&app, "POST", "/api/config", Some(bad)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["detail"].as_str().unwrap().contains("too large"));

    let slow = json!({ "ip_range": "10.0.0.0/29", "auto_scan_interval_seconds": 2 });
    let (status, _) = send(&app, "POST", "/api/config", Some(slow)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn device_name_endpoint() {
    let app = app();
    send(&app, "POST", "/api/scan", None).await;

    let (status, body) = send(
        &app,
        "POST",
        "/api/device-name",
        Some(json!({ "ip": "10.0.0.2", "name": "nas" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({ "ip": "10.0.0.2", "name": "nas" }));

    let (_, body) = send(&app, "GET", "/api/results", None).await;
    assert_eq!(body["items"][1]["manual_name"], "nas");
    assert_eq!(body["items"][1]["online"], true);

    let (status, _) = send(
        &app,
        "POST",
        "/api/device-name",
        Some(json!({ "ip": "not-an-ip", "name": "x" })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}
