// src/lib.rs
// Public library surface for the binary and integration tests.

pub mod api;
pub mod cache;
pub mod config;
pub mod error;
pub mod history;
pub mod ingest;
pub mod metrics;
pub mod normalize;
pub mod observation;
pub mod pipeline;
pub mod ratelimit;
pub mod stats;

pub use crate::api::{create_router, AppState};
pub use crate::config::AppConfig;
pub use crate::error::{PipelineError, PipelineResult};
pub use crate::observation::{Observation, Payload, Source};
pub use crate::pipeline::Orchestrator;

use std::sync::Arc;

use axum::Router;
use tracing::info;

use crate::history::HistoryStore;

/// Env flag exposing `GET /metrics`.
pub const ENV_METRICS: &str = "PULSE_METRICS";

/// Build the full in-process app from a resolved config: history store
/// (JSONL or memory), live adapters, router, and optional `/metrics`.
pub fn app(cfg: AppConfig) -> anyhow::Result<Router> {
    let history = match &cfg.history.path {
        Some(p) => HistoryStore::open_jsonl(p)?,
        None => HistoryStore::in_memory(),
    };
    let history = Arc::new(history);
    info!(
        persistent = history.is_persistent(),
        records = history.len(),
        "history store ready"
    );

    let pipeline = Orchestrator::from_config(&cfg, history);
    let cache_cfg = cfg.cache.clone();
    let mut router = create_router(AppState::new(cfg, pipeline));

    if std::env::var(ENV_METRICS).is_ok_and(|v| v == "1") {
        let metrics = crate::metrics::Metrics::init(&cache_cfg)?;
        router = router.merge(metrics.router());
    }
    Ok(router)
}
