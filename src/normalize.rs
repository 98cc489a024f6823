// src/normalize.rs
//! Maps adapter output into `Observation`s: one per symbol, one per
//! headline, one per city query. Pure; no I/O.

use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};
use std::fmt::Write as _;

use crate::ingest::RawResult;
use crate::observation::{CryptoPayload, NewsPayload, Observation, Payload, WeatherPayload};

/// Stable short id for a headline, derived from its link.
pub fn headline_id(url: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(url.trim().as_bytes());
    let digest = hasher.finalize();
    let mut out = String::with_capacity(12);
    for b in digest.iter().take(6) {
        let _ = write!(&mut out, "{:02x}", b);
    }
    out
}

pub fn normalize(raw: RawResult, fetched_at: DateTime<Utc>) -> Vec<Observation> {
    match raw {
        RawResult::Crypto(quotes) => quotes
            .into_iter()
            .map(|q| {
                Observation::new(
                    q.symbol,
                    Payload::Crypto(CryptoPayload {
                        name: q.name,
                        price: q.price,
                        change_24h_pct: q.change_24h_pct,
                        volume_24h: q.volume_24h,
                        market_cap: q.market_cap,
                    }),
                    fetched_at,
                )
            })
            .collect(),
        RawResult::News(headlines) => headlines
            .into_iter()
            .map(|h| {
                Observation::new(
                    headline_id(&h.url),
                    Payload::News(NewsPayload {
                        title: h.title,
                        url: h.url,
                        published_at: h.published_at,
                        summary: h.summary,
                        outlet: h.outlet,
                    }),
                    fetched_at,
                )
            })
            .collect(),
        RawResult::Weather(w) => vec![Observation::new(
            w.city,
            Payload::Weather(WeatherPayload {
                temperature_c: w.temperature_c,
                condition: w.condition,
                humidity_pct: w.humidity_pct,
                wind_speed_kmph: w.wind_speed_kmph,
            }),
            fetched_at,
        )],
    }
}
