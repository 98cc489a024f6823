//! Market Pulse: binary entrypoint
//! Boots the Axum HTTP server: config, tracing, history store, routes.

use market_pulse::AppConfig;
use shuttle_axum::ShuttleAxum;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// `RUST_LOG` wins; otherwise info for this crate and warn elsewhere.
/// `PULSE_LOG_JSON=1` switches to JSON lines.
fn init_tracing() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("market_pulse=info,warn"));
    let json = std::env::var("PULSE_LOG_JSON").is_ok_and(|v| v == "1");

    let registry = tracing_subscriber::registry().with(filter);
    let res = if json {
        registry.with(fmt::layer().json()).try_init()
    } else {
        registry.with(fmt::layer().compact()).try_init()
    };
    // Shuttle may have installed its own subscriber already.
    if res.is_err() {
        tracing::debug!("tracing subscriber already set");
    }
}

#[shuttle_runtime::main]
async fn axum() -> ShuttleAxum {
    // Load .env in local/dev; no-op in prod environments.
    let _ = dotenvy::dotenv();
    init_tracing();

    let cfg = AppConfig::load_default().map_err(shuttle_runtime::Error::Custom)?;
    tracing::info!(
        default_city = %cfg.weather.default_city,
        crypto_ttl_secs = cfg.cache.crypto_ttl_secs,
        "config loaded"
    );

    let router = market_pulse::app(cfg).map_err(shuttle_runtime::Error::Custom)?;
    Ok(router.into())
}
