// tests/api_sources.rs
//
// End-to-end through the Router with the three upstreams mocked by wiremock:
// fetch → normalize → history → cache, plus failure propagation.

use axum::{
    body::{self, Body},
    http::{Request, StatusCode},
    Router,
};
use serde_json::Value as Json;
use tower::ServiceExt as _;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use market_pulse::AppConfig;

const KEY: &str = "test-key";
const FEED: &str = include_str!("fixtures/coindesk_rss.xml");

const MARKETS: &str = r#"[
    {"symbol":"btc","name":"Bitcoin","current_price":50000.0,"market_cap":1.0e12,"total_volume":3.0e10,"price_change_percentage_24h":2.0},
    {"symbol":"eth","name":"Ethereum","current_price":3000.0,"market_cap":3.6e11,"total_volume":1.5e10,"price_change_percentage_24h":-1.0}
]"#;

fn j1(temp: &str) -> String {
    format!(
        r#"{{"current_condition":[{{"temp_C":"{temp}","weatherDesc":[{{"value":"Clear"}}],"humidity":"40","windspeedKmph":"8"}}]}}"#
    )
}

fn router_for(server: &MockServer) -> Router {
    let mut cfg = AppConfig::default();
    cfg.api_key = KEY.to_string();
    cfg.upstream.coingecko_url = server.uri();
    cfg.upstream.coindesk_rss_url = format!("{}/rss", server.uri());
    cfg.upstream.wttr_url = server.uri();
    cfg.upstream.timeout_secs = 2;
    cfg.upstream.max_retries = 0;
    market_pulse::app(cfg).expect("router")
}

async fn get(app: &Router, uri: &str) -> (StatusCode, Option<String>, Json) {
    let req = Request::builder()
        .uri(uri)
        .header("x-api-key", KEY)
        .body(Body::empty())
        .unwrap();
    let resp = app.clone().oneshot(req).await.unwrap();
    let status = resp.status();
    let cache = resp
        .headers()
        .get("x-cache")
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);
    let bytes = body::to_bytes(resp.into_body(), 1024 * 1024).await.unwrap();
    (status, cache, serde_json::from_slice(&bytes).unwrap_or(Json::Null))
}

#[tokio::test]
async fn crypto_miss_then_hit_appends_once() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/coins/markets"))
        .and(query_param("symbols", "btc,eth"))
        .respond_with(ResponseTemplate::new(200).set_body_string(MARKETS))
        .expect(1)
        .mount(&server)
        .await;
    let app = router_for(&server);

    let (s, cache, v) = get(&app, "/crypto/prices?symbols=btc,eth").await;
    assert_eq!(s, StatusCode::OK);
    assert_eq!(cache.as_deref(), Some("MISS"));
    assert_eq!(v["count"], 2);
    assert_eq!(v["data"][0]["subject"], "BTC");
    assert_eq!(v["data"][0]["payload"]["price"], 50000.0);

    // same symbol set, different order and case: one cache entry
    let (s, cache, v) = get(&app, "/crypto/prices?symbols=ETH,btc").await;
    assert_eq!(s, StatusCode::OK);
    assert_eq!(cache.as_deref(), Some("HIT"));
    assert_eq!(v["cache_hit"], true);

    let (_, _, h) = get(&app, "/data/history?source=crypto").await;
    assert_eq!(h["total_records"], 2, "a hit must not append");
    let subjects: Vec<_> = h["data"].as_array().unwrap().iter().map(|o| o["subject"].clone()).collect();
    assert_eq!(subjects, vec![Json::from("BTC"), Json::from("ETH")]);
}

#[tokio::test]
async fn unlisted_symbol_is_404_and_stores_nothing() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/coins/markets"))
        .respond_with(ResponseTemplate::new(200).set_body_string(MARKETS))
        .mount(&server)
        .await;
    let app = router_for(&server);

    let (s, _, v) = get(&app, "/crypto/prices?symbols=btc,nope").await;
    assert_eq!(s, StatusCode::NOT_FOUND);
    assert_eq!(v["error"]["kind"], "NotFound");

    let (_, _, h) = get(&app, "/data/history").await;
    assert_eq!(h["total_records"], 0);
}

#[tokio::test]
async fn upstream_outage_is_retryable_503() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/coins/markets"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;
    let app = router_for(&server);

    let (s, cache, v) = get(&app, "/crypto/prices?symbols=btc").await;
    assert_eq!(s, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(cache, None);
    assert_eq!(v["error"]["kind"], "UpstreamUnavailable");
    assert_eq!(v["error"]["retryable"], true);
}

#[tokio::test]
async fn news_from_feed_and_broken_feed_is_parse_error() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/rss"))
        .respond_with(ResponseTemplate::new(200).set_body_string(FEED))
        .mount(&server)
        .await;
    let app = router_for(&server);

    let (s, _, v) = get(&app, "/crypto/news?limit=10").await;
    assert_eq!(s, StatusCode::OK);
    assert_eq!(v["source"], "news");
    assert_eq!(v["count"], 3);
    assert!(v["data"]
        .as_array()
        .unwrap()
        .iter()
        .all(|o| o["subject"].as_str().map_or(false, |id| id.len() == 12)));

    let broken = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/rss"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html><body>down for maintenance</body></html>"))
        .mount(&broken)
        .await;
    let app = router_for(&broken);

    let (s, _, v) = get(&app, "/crypto/news").await;
    assert_eq!(s, StatusCode::BAD_GATEWAY);
    assert_eq!(v["error"]["kind"], "ParseError");
    let (_, _, h) = get(&app, "/data/history?source=news").await;
    assert_eq!(h["total_records"], 0);
}

#[tokio::test]
async fn weather_stats_over_three_cities() {
    let server = MockServer::start().await;
    for (city, temp) in [("Oslo", "20"), ("Lima", "25"), ("Pune", "30")] {
        Mock::given(method("GET"))
            .and(path(format!("/{city}")))
            .and(query_param("format", "j1"))
            .respond_with(ResponseTemplate::new(200).set_body_string(j1(temp)))
            .mount(&server)
            .await;
    }
    Mock::given(method("GET"))
        .and(path("/Atlantis"))
        .respond_with(ResponseTemplate::new(404).set_body_string("Unknown location"))
        .mount(&server)
        .await;
    let app = router_for(&server);

    for city in ["Oslo", "Lima", "Pune"] {
        let (s, cache, v) = get(&app, &format!("/weather?city={city}")).await;
        assert_eq!(s, StatusCode::OK, "{city}");
        assert_eq!(cache.as_deref(), Some("MISS"));
        assert_eq!(v["data"][0]["subject"], city);
    }
    let (s, _, v) = get(&app, "/weather?city=Atlantis").await;
    assert_eq!(s, StatusCode::NOT_FOUND);
    assert_eq!(v["error"]["kind"], "NotFound");

    let (s, _, v) = get(&app, "/data/stats?source=weather").await;
    assert_eq!(s, StatusCode::OK);
    let st = &v["statistics"];
    assert_eq!(st["total_records"], 3);
    assert_eq!(st["unique_subjects"], 3);
    assert_eq!(st["numeric"]["weather"]["count"], 3);
    assert_eq!(st["numeric"]["weather"]["min"], 20.0);
    assert_eq!(st["numeric"]["weather"]["max"], 30.0);
    assert_eq!(st["numeric"]["weather"]["avg"], 25.0);

    // history filters and tail limit
    let (_, _, h) = get(&app, "/data/history?source=weather&subject=lima").await;
    assert_eq!(h["total_records"], 1);
    assert_eq!(h["data"][0]["payload"]["temperature_c"], 25.0);

    let (_, _, h) = get(&app, "/data/history?limit=2").await;
    assert_eq!(h["total_records"], 2);
    assert_eq!(h["data"][0]["subject"], "Lima");
    assert_eq!(h["data"][1]["subject"], "Pune");
}
