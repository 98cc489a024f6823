use axum::{routing::get, Router};
use metrics::{describe_counter, describe_gauge, describe_histogram, gauge};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use once_cell::sync::OnceCell;

use crate::config::CacheConfig;
use crate::observation::Source;

static HANDLE: OnceCell<PrometheusHandle> = OnceCell::new();

pub struct Metrics {
    pub handle: PrometheusHandle,
}

impl Metrics {
    /// Install the Prometheus recorder (once per process) and publish the
    /// configured cache TTLs as static gauges.
    pub fn init(cache: &CacheConfig) -> anyhow::Result<Self> {
        let handle = HANDLE
            .get_or_try_init(|| {
                let h = PrometheusBuilder::new().install_recorder()?;
                describe_all();
                Ok::<_, anyhow::Error>(h)
            })?
            .clone();

        for source in Source::ALL {
            gauge!("pulse_cache_ttl_secs", "source" => source.as_str())
                .set(cache.ttl_for(source).as_secs_f64());
        }

        Ok(Self { handle })
    }

    /// Returns a router exposing `/metrics` with the Prometheus exposition format.
    pub fn router(&self) -> Router {
        let handle = self.handle.clone();
        Router::new().route(
            "/metrics",
            get(move || {
                let h = handle.clone();
                async move { h.render() }
            }),
        )
    }
}

fn describe_all() {
    describe_counter!("pulse_cache_hits_total", "Requests answered from the cache.");
    describe_counter!("pulse_cache_misses_total", "Requests that had to go upstream.");
    describe_counter!(
        "pulse_upstream_errors_total",
        "Upstream fetch failures by source and error kind."
    );
    describe_counter!(
        "pulse_history_appended_total",
        "Observations appended to the history log."
    );
    describe_histogram!("pulse_fetch_ms", "Upstream fetch time in milliseconds.");
    describe_gauge!("pulse_cache_ttl_secs", "Configured cache TTL per source.");
    describe_gauge!("pulse_history_len", "Observations currently in the history log.");
}
