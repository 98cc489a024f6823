// tests/api_http.rs
//
// HTTP-level tests for the Router without opening sockets.
// Upstreams are never reached here: every request is stopped by auth,
// rate limiting or validation, or touches only local state.
//
// Covered:
// - GET / and /health (no key needed)
// - x-api-key enforcement
// - rate limiting (429)
// - GET /config
// - query validation (400 ValidationError)
// - /data/history and /data/stats on an empty store

use axum::{
    body::{self, Body},
    http::{Request, StatusCode},
    Router,
};
use serde_json::Value as Json;
use tower::ServiceExt as _; // for `oneshot`

use market_pulse::AppConfig;

const BODY_LIMIT: usize = 1024 * 1024;
const KEY: &str = "test-key";

fn test_config() -> AppConfig {
    let mut cfg = AppConfig::default();
    cfg.api_key = KEY.to_string();
    // unroutable upstreams: any accidental fetch fails fast
    cfg.upstream.coingecko_url = "http://127.0.0.1:9".into();
    cfg.upstream.coindesk_rss_url = "http://127.0.0.1:9/rss".into();
    cfg.upstream.wttr_url = "http://127.0.0.1:9".into();
    cfg.upstream.timeout_secs = 1;
    cfg.upstream.max_retries = 0;
    cfg
}

fn test_router(cfg: AppConfig) -> Router {
    market_pulse::app(cfg).expect("app() should build Router in tests")
}

async fn get(app: &Router, uri: &str, key: Option<&str>) -> (StatusCode, Json) {
    let mut req = Request::builder().method("GET").uri(uri);
    if let Some(k) = key {
        req = req.header("x-api-key", k);
    }
    let resp = app
        .clone()
        .oneshot(req.body(Body::empty()).expect("build request"))
        .await
        .expect("oneshot");
    let status = resp.status();
    let bytes = body::to_bytes(resp.into_body(), BODY_LIMIT)
        .await
        .expect("read body");
    let v: Json = serde_json::from_slice(&bytes).unwrap_or(Json::Null);
    (status, v)
}

#[tokio::test]
async fn root_and_health_are_public() {
    let app = test_router(test_config());

    let (s, v) = get(&app, "/", None).await;
    assert_eq!(s, StatusCode::OK);
    assert_eq!(v["status"], "running");

    let (s, v) = get(&app, "/health", None).await;
    assert_eq!(s, StatusCode::OK);
    assert_eq!(v["status"], "healthy");
    assert!(v["timestamp"].is_string());
}

#[tokio::test]
async fn data_endpoints_require_the_shared_secret() {
    let app = test_router(test_config());

    for uri in ["/crypto/prices", "/crypto/news", "/weather", "/data/history", "/data/stats", "/config"] {
        let (s, v) = get(&app, uri, None).await;
        assert_eq!(s, StatusCode::UNAUTHORIZED, "{uri} without key");
        assert_eq!(v["error"]["kind"], "Unauthorized");

        let (s, _) = get(&app, uri, Some("wrong")).await;
        assert_eq!(s, StatusCode::UNAUTHORIZED, "{uri} with wrong key");
    }
}

#[tokio::test]
async fn config_dump_shows_effective_settings_without_secret() {
    let app = test_router(test_config());
    let (s, v) = get(&app, "/config", Some(KEY)).await;
    assert_eq!(s, StatusCode::OK);

    let cfg = &v["config"];
    assert_eq!(cfg["cache_ttl_secs"]["crypto"], 30);
    assert_eq!(cfg["cache_ttl_secs"]["weather"], 600);
    assert_eq!(cfg["default_city"], "Bangalore");
    assert_eq!(cfg["storage"], "in-memory");
    assert_eq!(cfg["current_records"], 0);
    assert!(!v.to_string().contains(KEY), "secret must not leak");
}

#[tokio::test]
async fn malformed_queries_are_rejected_before_any_fetch() {
    let app = test_router(test_config());

    for uri in [
        "/crypto/prices?symbols=btc,e%24h",
        "/crypto/news?limit=0",
        "/crypto/news?limit=many",
        "/weather?city=..%2Fetc",
        "/data/history?source=stocks",
        "/data/history?since=yesterday",
        "/data/history?since=2025-02-01T00:00:00Z&until=2025-01-01T00:00:00Z",
        "/data/history?limit=5000",
        "/data/stats?source=stocks",
    ] {
        let (s, v) = get(&app, uri, Some(KEY)).await;
        assert_eq!(s, StatusCode::BAD_REQUEST, "{uri}");
        assert_eq!(v["error"]["kind"], "ValidationError", "{uri}");
        assert_eq!(v["error"]["retryable"], false);
    }
}

#[tokio::test]
async fn empty_history_and_stats_are_well_formed() {
    let app = test_router(test_config());

    let (s, v) = get(&app, "/data/history", Some(KEY)).await;
    assert_eq!(s, StatusCode::OK);
    assert_eq!(v["total_records"], 0);
    assert!(v["data"].as_array().unwrap().is_empty());

    let (s, v) = get(&app, "/data/stats", Some(KEY)).await;
    assert_eq!(s, StatusCode::OK);
    let st = &v["statistics"];
    assert_eq!(st["total_records"], 0);
    assert!(st["last_updated"].is_null());
    assert!(st["numeric"]["crypto"]["avg"].is_null());
    assert!(st["numeric"]["weather"]["min"].is_null());
}

#[tokio::test]
async fn rate_limit_applies_per_client() {
    let mut cfg = test_config();
    cfg.rate_limit.max_requests_per_minute = 2;
    let app = test_router(cfg);

    let req = |ip: &str| {
        Request::builder()
            .uri("/config")
            .header("x-api-key", KEY)
            .header("x-forwarded-for", ip)
            .body(Body::empty())
            .unwrap()
    };

    for _ in 0..2 {
        let r = app.clone().oneshot(req("10.0.0.1")).await.unwrap();
        assert_eq!(r.status(), StatusCode::OK);
    }
    let r = app.clone().oneshot(req("10.0.0.1")).await.unwrap();
    assert_eq!(r.status(), StatusCode::TOO_MANY_REQUESTS);

    let r = app.clone().oneshot(req("10.0.0.2")).await.unwrap();
    assert_eq!(r.status(), StatusCode::OK);
}
