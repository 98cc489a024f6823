// src/stats.rs
//! Read-time summary over the history log. Nothing here is stored; every
//! call recomputes from the current log contents.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::history::{HistoryFilter, HistoryStore};
use crate::observation::{Observation, Source};

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct NumericSummary {
    pub count: usize,
    pub min: Option<f64>,
    pub max: Option<f64>,
    pub avg: Option<f64>,
}

impl NumericSummary {
    fn empty() -> Self {
        Self {
            count: 0,
            min: None,
            max: None,
            avg: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StatsSnapshot {
    pub total_records: usize,
    pub source_counts: BTreeMap<Source, usize>,
    pub unique_subjects: usize,
    pub subject_counts: BTreeMap<String, usize>,
    /// Only sources with a numeric primary value (crypto price, weather
    /// temperature) appear here.
    pub numeric: BTreeMap<Source, NumericSummary>,
    pub last_updated: Option<DateTime<Utc>>,
}

#[derive(Default)]
struct Acc {
    count: usize,
    sum: f64,
    min: f64,
    max: f64,
}

impl Acc {
    fn push(&mut self, v: f64) {
        if self.count == 0 {
            self.min = v;
            self.max = v;
        } else {
            self.min = self.min.min(v);
            self.max = self.max.max(v);
        }
        self.sum += v;
        self.count += 1;
    }

    fn finish(&self) -> NumericSummary {
        if self.count == 0 {
            return NumericSummary::empty();
        }
        NumericSummary {
            count: self.count,
            min: Some(self.min),
            max: Some(self.max),
            avg: Some(self.sum / self.count as f64),
        }
    }
}

/// Summarize an arbitrary sequence of observations.
pub fn summarize<'a, I>(observations: I, source: Option<Source>) -> StatsSnapshot
where
    I: IntoIterator<Item = &'a Observation>,
{
    let mut total = 0usize;
    let mut source_counts: BTreeMap<Source, usize> = BTreeMap::new();
    let mut subject_counts: BTreeMap<String, usize> = BTreeMap::new();
    let mut accs: BTreeMap<Source, Acc> = BTreeMap::new();
    let mut last_updated: Option<DateTime<Utc>> = None;

    for o in observations {
        total += 1;
        *source_counts.entry(o.source()).or_default() += 1;
        *subject_counts.entry(o.subject().to_string()).or_default() += 1;
        if let Some(v) = o.payload().primary_value() {
            accs.entry(o.source()).or_default().push(v);
        }
        last_updated = Some(last_updated.map_or(o.fetched_at(), |t| t.max(o.fetched_at())));
    }

    // numeric sources always show up, with null aggregates when empty
    let numeric_sources = [Source::Crypto, Source::Weather]
        .into_iter()
        .filter(|s| source.map_or(true, |x| x == *s));
    let numeric = numeric_sources
        .map(|s| (s, accs.get(&s).map_or(NumericSummary::empty(), Acc::finish)))
        .collect();

    StatsSnapshot {
        total_records: total,
        source_counts,
        unique_subjects: subject_counts.len(),
        subject_counts,
        numeric,
        last_updated,
    }
}

/// Aggregator entry point; reads the store, never writes it.
pub fn compute(history: &HistoryStore, source: Option<Source>) -> StatsSnapshot {
    let rows: Vec<_> = history
        .query(HistoryFilter {
            source,
            ..Default::default()
        })
        .collect();
    summarize(rows.iter().map(|o| o.as_ref()), source)
}
