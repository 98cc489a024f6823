// src/observation.rs
//! Unified observation schema shared by every source.
//!
//! An `Observation` is immutable once built: fields are private and the
//! `source` tag is always derived from the payload variant, so a crypto
//! observation can never carry a weather payload.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::PipelineError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Source {
    Crypto,
    News,
    Weather,
}

impl Source {
    pub const ALL: [Source; 3] = [Source::Crypto, Source::News, Source::Weather];

    pub fn as_str(&self) -> &'static str {
        match self {
            Source::Crypto => "crypto",
            Source::News => "news",
            Source::Weather => "weather",
        }
    }
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Source {
    type Err = PipelineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "crypto" => Ok(Source::Crypto),
            "news" => Ok(Source::News),
            "weather" => Ok(Source::Weather),
            other => Err(PipelineError::ValidationError(format!(
                "unknown source '{other}' (expected crypto|news|weather)"
            ))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CryptoPayload {
    pub name: String,
    pub price: f64,
    pub change_24h_pct: Option<f64>,
    pub volume_24h: Option<f64>,
    pub market_cap: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewsPayload {
    pub title: String,
    pub url: String,
    pub published_at: Option<DateTime<Utc>>,
    pub summary: String,
    pub outlet: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeatherPayload {
    pub temperature_c: f64,
    pub condition: String,
    pub humidity_pct: Option<f64>,
    pub wind_speed_kmph: Option<f64>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    Crypto(CryptoPayload),
    News(NewsPayload),
    Weather(WeatherPayload),
}

impl Payload {
    pub fn source(&self) -> Source {
        match self {
            Payload::Crypto(_) => Source::Crypto,
            Payload::News(_) => Source::News,
            Payload::Weather(_) => Source::Weather,
        }
    }

    /// Numeric value aggregated in stats: price for crypto, temperature for
    /// weather. News has none.
    pub fn primary_value(&self) -> Option<f64> {
        match self {
            Payload::Crypto(c) => Some(c.price),
            Payload::Weather(w) => Some(w.temperature_c),
            Payload::News(_) => None,
        }
    }

    fn to_value(&self) -> serde_json::Value {
        let v = match self {
            Payload::Crypto(p) => serde_json::to_value(p),
            Payload::News(p) => serde_json::to_value(p),
            Payload::Weather(p) => serde_json::to_value(p),
        };
        v.unwrap_or(serde_json::Value::Null)
    }

    fn from_value(source: Source, v: serde_json::Value) -> Result<Self, serde_json::Error> {
        Ok(match source {
            Source::Crypto => Payload::Crypto(serde_json::from_value(v)?),
            Source::News => Payload::News(serde_json::from_value(v)?),
            Source::Weather => Payload::Weather(serde_json::from_value(v)?),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(into = "ObservationRepr", try_from = "ObservationRepr")]
pub struct Observation {
    source: Source,
    subject: String,
    payload: Payload,
    fetched_at: DateTime<Utc>,
}

impl Observation {
    pub fn new(subject: impl Into<String>, payload: Payload, fetched_at: DateTime<Utc>) -> Self {
        Self {
            source: payload.source(),
            subject: subject.into(),
            payload,
            fetched_at,
        }
    }

    pub fn source(&self) -> Source {
        self.source
    }

    pub fn subject(&self) -> &str {
        &self.subject
    }

    pub fn payload(&self) -> &Payload {
        &self.payload
    }

    pub fn fetched_at(&self) -> DateTime<Utc> {
        self.fetched_at
    }
}

/// Wire form: `{source, subject, payload, fetched_at}` with the payload
/// decoded according to `source`.
#[derive(Serialize, Deserialize)]
struct ObservationRepr {
    source: Source,
    subject: String,
    payload: serde_json::Value,
    fetched_at: DateTime<Utc>,
}

impl From<Observation> for ObservationRepr {
    fn from(o: Observation) -> Self {
        Self {
            source: o.source,
            payload: o.payload.to_value(),
            subject: o.subject,
            fetched_at: o.fetched_at,
        }
    }
}

impl TryFrom<ObservationRepr> for Observation {
    type Error = String;

    fn try_from(r: ObservationRepr) -> Result<Self, Self::Error> {
        let payload = Payload::from_value(r.source, r.payload)
            .map_err(|e| format!("payload does not match source '{}': {e}", r.source))?;
        Ok(Observation::new(r.subject, payload, r.fetched_at))
    }
}
