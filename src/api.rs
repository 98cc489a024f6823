use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    extract::{ConnectInfo, Query, Request, State},
    http::{HeaderMap, HeaderValue, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::json;
use sha2::{Digest, Sha256};
use tower_http::cors::CorsLayer;

use crate::config::AppConfig;
use crate::error::PipelineError;
use crate::history::HistoryFilter;
use crate::observation::Source;
use crate::pipeline::{Orchestrator, PipelineOutcome};
use crate::ratelimit::RateLimiter;
use crate::stats;

pub const API_KEY_HEADER: &str = "x-api-key";
pub const CACHE_HEADER: &str = "x-cache";

const DEFAULT_HISTORY_LIMIT: usize = 50;
const MAX_HISTORY_LIMIT: usize = 1000;

#[derive(Clone)]
pub struct AppState {
    pipeline: Arc<Orchestrator>,
    config: Arc<AppConfig>,
    limiter: Arc<RateLimiter>,
    api_key_digest: [u8; 32],
}

impl AppState {
    pub fn new(config: AppConfig, pipeline: Orchestrator) -> Self {
        Self {
            limiter: Arc::new(RateLimiter::per_minute(
                config.rate_limit.max_requests_per_minute,
            )),
            api_key_digest: digest(&config.api_key),
            pipeline: Arc::new(pipeline),
            config: Arc::new(config),
        }
    }
}

fn digest(s: &str) -> [u8; 32] {
    let mut out = [0u8; 32];
    out.copy_from_slice(&Sha256::digest(s.as_bytes()));
    out
}

pub fn create_router(state: AppState) -> Router {
    let protected = Router::new()
        .route("/crypto/prices", get(crypto_prices))
        .route("/crypto/news", get(crypto_news))
        .route("/weather", get(weather))
        .route("/data/history", get(data_history))
        .route("/data/stats", get(data_stats))
        .route("/config", get(effective_config))
        .route_layer(middleware::from_fn_with_state(state.clone(), guard));

    Router::new()
        .route("/", get(root))
        .route("/health", get(health))
        .merge(protected)
        .layer(CorsLayer::very_permissive())
        .with_state(state)
}

// ---------------------------------------------------------------
// Errors
// ---------------------------------------------------------------

#[derive(Debug)]
pub enum ApiError {
    Pipeline(PipelineError),
    Unauthorized,
    RateLimited,
}

impl From<PipelineError> for ApiError {
    fn from(e: PipelineError) -> Self {
        ApiError::Pipeline(e)
    }
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match self {
            ApiError::Unauthorized => StatusCode::UNAUTHORIZED,
            ApiError::RateLimited => StatusCode::TOO_MANY_REQUESTS,
            ApiError::Pipeline(e) => match e {
                PipelineError::ValidationError(_) => StatusCode::BAD_REQUEST,
                PipelineError::NotFound(_) => StatusCode::NOT_FOUND,
                PipelineError::UpstreamUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
                PipelineError::UpstreamFormatError(_) | PipelineError::ParseError(_) => {
                    StatusCode::BAD_GATEWAY
                }
                PipelineError::PersistenceError(_) => StatusCode::INTERNAL_SERVER_ERROR,
            },
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let (kind, message, retryable) = match &self {
            ApiError::Unauthorized => ("Unauthorized", "Invalid API Key".to_string(), false),
            ApiError::RateLimited => ("RateLimited", "Rate limit exceeded".to_string(), true),
            ApiError::Pipeline(e) => (e.kind(), e.message().to_string(), e.is_retryable()),
        };
        let body = json!({
            "error": { "kind": kind, "message": message, "retryable": retryable }
        });
        (status, Json(body)).into_response()
    }
}

// ---------------------------------------------------------------
// Middleware: rate limit first, then shared-secret header
// ---------------------------------------------------------------

fn client_id(req: &Request) -> String {
    if let Some(ConnectInfo(addr)) = req.extensions().get::<ConnectInfo<SocketAddr>>() {
        return addr.ip().to_string();
    }
    req.headers()
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .unwrap_or_else(|| "unknown".to_string())
}

async fn guard(State(state): State<AppState>, req: Request, next: Next) -> Result<Response, ApiError> {
    let client = client_id(&req);
    if !state.limiter.check(&client) {
        tracing::warn!(target: "api", %client, "rate limit exceeded");
        return Err(ApiError::RateLimited);
    }

    let presented = req
        .headers()
        .get(API_KEY_HEADER)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default();
    if digest(presented) != state.api_key_digest {
        return Err(ApiError::Unauthorized);
    }
    Ok(next.run(req).await)
}

// ---------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------

async fn root() -> Json<serde_json::Value> {
    Json(json!({ "message": "Market Pulse data API", "status": "running" }))
}

async fn health() -> Json<serde_json::Value> {
    Json(json!({ "status": "healthy", "timestamp": Utc::now() }))
}

fn outcome_response(source: Source, out: PipelineOutcome) -> Response {
    let body = json!({
        "source": source,
        "count": out.observations.len(),
        "cache_hit": out.cache_hit,
        "data": out.observations.as_slice(),
    });
    let mut headers = HeaderMap::new();
    headers.insert(
        CACHE_HEADER,
        HeaderValue::from_static(if out.cache_hit { "HIT" } else { "MISS" }),
    );
    (headers, Json(body)).into_response()
}

fn parse_usize(name: &str, raw: Option<&str>) -> Result<Option<usize>, PipelineError> {
    raw.map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| {
            s.parse::<usize>()
                .map_err(|_| PipelineError::ValidationError(format!("{name} must be a non-negative integer")))
        })
        .transpose()
}

fn parse_ts(name: &str, raw: Option<&str>) -> Result<Option<DateTime<Utc>>, PipelineError> {
    raw.map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| {
            DateTime::parse_from_rfc3339(s)
                .map(|d| d.with_timezone(&Utc))
                .map_err(|_| PipelineError::ValidationError(format!("{name} must be an RFC 3339 timestamp")))
        })
        .transpose()
}

#[derive(Debug, Deserialize)]
struct PricesParams {
    symbols: Option<String>,
}

async fn crypto_prices(
    State(state): State<AppState>,
    Query(p): Query<PricesParams>,
) -> Result<Response, ApiError> {
    let q = state.pipeline.crypto_query(p.symbols.as_deref())?;
    let out = state.pipeline.crypto_prices(q).await?;
    Ok(outcome_response(Source::Crypto, out))
}

#[derive(Debug, Deserialize)]
struct NewsParams {
    category: Option<String>,
    limit: Option<String>,
}

async fn crypto_news(
    State(state): State<AppState>,
    Query(p): Query<NewsParams>,
) -> Result<Response, ApiError> {
    let limit = parse_usize("limit", p.limit.as_deref())?;
    let q = state.pipeline.news_query(p.category.as_deref(), limit)?;
    let out = state.pipeline.news(q).await?;
    Ok(outcome_response(Source::News, out))
}

#[derive(Debug, Deserialize)]
struct WeatherParams {
    city: Option<String>,
}

async fn weather(
    State(state): State<AppState>,
    Query(p): Query<WeatherParams>,
) -> Result<Response, ApiError> {
    let q = state.pipeline.weather_query(p.city.as_deref())?;
    let out = state.pipeline.weather(q).await?;
    Ok(outcome_response(Source::Weather, out))
}

#[derive(Debug, Deserialize)]
struct HistoryParams {
    source: Option<String>,
    subject: Option<String>,
    since: Option<String>,
    until: Option<String>,
    limit: Option<String>,
}

async fn data_history(
    State(state): State<AppState>,
    Query(p): Query<HistoryParams>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let source = p
        .source
        .as_deref()
        .filter(|s| !s.trim().is_empty())
        .map(str::parse::<Source>)
        .transpose()?;
    let since = parse_ts("since", p.since.as_deref())?;
    let until = parse_ts("until", p.until.as_deref())?;
    if let (Some(s), Some(u)) = (since, until) {
        if s > u {
            return Err(PipelineError::ValidationError("since must not be after until".into()).into());
        }
    }
    let limit = parse_usize("limit", p.limit.as_deref())?.unwrap_or(DEFAULT_HISTORY_LIMIT);
    if limit == 0 || limit > MAX_HISTORY_LIMIT {
        return Err(PipelineError::ValidationError(format!(
            "limit must be within 1..={MAX_HISTORY_LIMIT}"
        ))
        .into());
    }

    let filter = HistoryFilter {
        source,
        subject: p.subject.map(|s| s.trim().to_string()).filter(|s| !s.is_empty()),
        since,
        until,
    };
    let matched: Vec<_> = state.pipeline.history().query(filter).collect();
    let tail = &matched[matched.len().saturating_sub(limit)..];
    let data: Vec<_> = tail.iter().map(|o| o.as_ref()).collect();

    Ok(Json(json!({ "data": data, "total_records": data.len() })))
}

#[derive(Debug, Deserialize)]
struct StatsParams {
    source: Option<String>,
}

async fn data_stats(
    State(state): State<AppState>,
    Query(p): Query<StatsParams>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let source = p
        .source
        .as_deref()
        .filter(|s| !s.trim().is_empty())
        .map(str::parse::<Source>)
        .transpose()?;
    let snapshot = stats::compute(state.pipeline.history(), source);
    Ok(Json(json!({ "statistics": snapshot })))
}

async fn effective_config(State(state): State<AppState>) -> Json<serde_json::Value> {
    let records = state.pipeline.history().len();
    Json(json!({ "config": state.config.public_view(records) }))
}
