//! history.rs: append-only log of every observation the pipeline fetched.
//!
//! Insertion order is arrival order; nothing is ever reordered or removed.
//! With a sink configured, each append is written and flushed before it
//! becomes visible in memory, so a failed write never leaves a phantom
//! entry behind.

use std::fs::{File, OpenOptions};
use std::io::{self, BufRead, BufReader, Write};
use std::path::Path;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use metrics::{counter, gauge};

use crate::error::{PipelineError, PipelineResult};
use crate::observation::{Observation, Source};

/// Durable backing for the log. One JSON document per line.
pub trait HistorySink: Send {
    fn append_lines(&mut self, lines: &[String]) -> io::Result<()>;
}

pub struct JsonlFileSink {
    file: File,
}

impl JsonlFileSink {
    /// Opens for append. A partial last line left by a crashed write is cut
    /// off first, so the next record starts on a line of its own.
    pub fn open(path: &Path) -> io::Result<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        let bytes = std::fs::read(path)?;
        let keep = bytes.iter().rposition(|b| *b == b'\n').map_or(0, |i| i + 1);
        if keep < bytes.len() {
            tracing::warn!(
                target: "history",
                path = %path.display(),
                dropped_bytes = bytes.len() - keep,
                "truncating torn history tail"
            );
            file.set_len(keep as u64)?;
        }
        Ok(Self { file })
    }
}

impl HistorySink for JsonlFileSink {
    fn append_lines(&mut self, lines: &[String]) -> io::Result<()> {
        let mut buf = String::with_capacity(lines.iter().map(|l| l.len() + 1).sum());
        for l in lines {
            buf.push_str(l);
            buf.push('\n');
        }
        self.file.write_all(buf.as_bytes())?;
        self.file.flush()?;
        self.file.sync_data()
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct HistoryFilter {
    pub source: Option<Source>,
    /// Case-insensitive exact match.
    pub subject: Option<String>,
    /// Inclusive.
    pub since: Option<DateTime<Utc>>,
    /// Inclusive.
    pub until: Option<DateTime<Utc>>,
}

impl HistoryFilter {
    pub fn matches(&self, o: &Observation) -> bool {
        self.source.map_or(true, |s| s == o.source())
            && self
                .subject
                .as_deref()
                .map_or(true, |s| s.eq_ignore_ascii_case(o.subject()))
            && self.since.map_or(true, |t| o.fetched_at() >= t)
            && self.until.map_or(true, |t| o.fetched_at() <= t)
    }
}

struct Inner {
    log: Vec<Arc<Observation>>,
    sink: Option<Box<dyn HistorySink>>,
}

pub struct HistoryStore {
    inner: Mutex<Inner>,
}

impl Default for HistoryStore {
    fn default() -> Self {
        Self::in_memory()
    }
}

impl HistoryStore {
    pub fn in_memory() -> Self {
        Self {
            inner: Mutex::new(Inner {
                log: Vec::new(),
                sink: None,
            }),
        }
    }

    pub fn with_sink(sink: Box<dyn HistorySink>, replay: Vec<Observation>) -> Self {
        Self {
            inner: Mutex::new(Inner {
                log: replay.into_iter().map(Arc::new).collect(),
                sink: Some(sink),
            }),
        }
    }

    /// Open (or create) a JSONL log and replay what it already holds.
    pub fn open_jsonl(path: &Path) -> PipelineResult<Self> {
        let replay = if path.exists() {
            read_jsonl(path).map_err(|e| {
                PipelineError::PersistenceError(format!("replaying {}: {e}", path.display()))
            })?
        } else {
            Vec::new()
        };
        let sink = JsonlFileSink::open(path).map_err(|e| {
            PipelineError::PersistenceError(format!("opening {}: {e}", path.display()))
        })?;
        tracing::info!(target: "history", path = %path.display(), replayed = replay.len(), "history log opened");
        gauge!("pulse_history_len").set(replay.len() as f64);
        Ok(Self::with_sink(Box::new(sink), replay))
    }

    /// Appends in order. Either all observations are stored or none are.
    pub fn append(&self, observations: &[Observation]) -> PipelineResult<()> {
        if observations.is_empty() {
            return Ok(());
        }
        let mut inner = self.inner.lock().expect("history mutex poisoned");

        if let Some(sink) = inner.sink.as_mut() {
            let lines = observations
                .iter()
                .map(serde_json::to_string)
                .collect::<Result<Vec<_>, _>>()
                .map_err(|e| PipelineError::PersistenceError(format!("encoding observation: {e}")))?;
            sink.append_lines(&lines).map_err(|e| {
                tracing::error!(target: "history", error = %e, "history write failed");
                PipelineError::PersistenceError(format!("writing history: {e}"))
            })?;
        }

        inner
            .log
            .extend(observations.iter().cloned().map(Arc::new));
        counter!("pulse_history_appended_total").increment(observations.len() as u64);
        gauge!("pulse_history_len").set(inner.log.len() as f64);
        Ok(())
    }

    /// Matching observations in insertion order. Works on a snapshot, so
    /// appends made while iterating are not observed.
    pub fn query(&self, filter: HistoryFilter) -> impl Iterator<Item = Arc<Observation>> {
        let snapshot = self.inner.lock().expect("history mutex poisoned").log.clone();
        snapshot.into_iter().filter(move |o| filter.matches(o))
    }

    pub fn len(&self) -> usize {
        self.inner.lock().expect("history mutex poisoned").log.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_persistent(&self) -> bool {
        self.inner.lock().expect("history mutex poisoned").sink.is_some()
    }
}

fn read_jsonl(path: &Path) -> io::Result<Vec<Observation>> {
    let reader = BufReader::new(File::open(path)?);
    let mut out = Vec::new();
    for (n, line) in reader.lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str::<Observation>(&line) {
            Ok(o) => out.push(o),
            // a torn tail from a crashed write; everything before it is intact
            Err(e) => tracing::warn!(target: "history", line = n + 1, error = %e, "skipping unreadable history line"),
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::observation::{NewsPayload, Payload, WeatherPayload};
    use chrono::{Duration, TimeZone};

    fn weather(city: &str, t: f64, at: DateTime<Utc>) -> Observation {
        Observation::new(
            city,
            Payload::Weather(WeatherPayload {
                temperature_c: t,
                condition: "Clear".into(),
                humidity_pct: None,
                wind_speed_kmph: None,
            }),
            at,
        )
    }

    fn news(id: &str, at: DateTime<Utc>) -> Observation {
        Observation::new(
            id,
            Payload::News(NewsPayload {
                title: "t".into(),
                url: "https://x.y".into(),
                published_at: None,
                summary: "s".into(),
                outlet: "CoinDesk".into(),
            }),
            at,
        )
    }

    struct FailingSink;
    impl HistorySink for FailingSink {
        fn append_lines(&mut self, _lines: &[String]) -> io::Result<()> {
            Err(io::Error::other("disk full"))
        }
    }

    #[test]
    fn query_keeps_insertion_order_and_filters() {
        let t0 = Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap();
        let store = HistoryStore::in_memory();
        store
            .append(&[
                weather("Oslo", 1.0, t0),
                news("abc", t0 + Duration::minutes(1)),
                weather("Bergen", 2.0, t0 + Duration::minutes(2)),
                weather("oslo", 3.0, t0 + Duration::minutes(3)),
            ])
            .unwrap();

        let all: Vec<_> = store.query(HistoryFilter::default()).collect();
        assert_eq!(all.len(), 4);
        assert_eq!(all[2].subject(), "Bergen");

        let oslo: Vec<_> = store
            .query(HistoryFilter {
                subject: Some("OSLO".into()),
                ..Default::default()
            })
            .map(|o| o.payload().primary_value())
            .collect();
        assert_eq!(oslo, vec![Some(1.0), Some(3.0)]);

        let window: Vec<_> = store
            .query(HistoryFilter {
                source: Some(Source::Weather),
                since: Some(t0 + Duration::minutes(1)),
                until: Some(t0 + Duration::minutes(2)),
                ..Default::default()
            })
            .collect();
        assert_eq!(window.len(), 1);
        assert_eq!(window[0].subject(), "Bergen");
    }

    #[test]
    fn failed_write_is_loud_and_leaves_log_untouched() {
        let store = HistoryStore::with_sink(Box::new(FailingSink), vec![]);
        let err = store.append(&[weather("Oslo", 1.0, Utc::now())]).unwrap_err();
        assert_eq!(err.kind(), "PersistenceError");
        assert!(store.is_empty());
    }

    #[test]
    fn jsonl_log_survives_reopen() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("nested").join("history.jsonl");
        let t0 = Utc::now();
        {
            let store = HistoryStore::open_jsonl(&path).unwrap();
            store.append(&[weather("Oslo", 5.0, t0), news("n1", t0)]).unwrap();
            assert!(store.is_persistent());
        }
        let reopened = HistoryStore::open_jsonl(&path).unwrap();
        let all: Vec<_> = reopened.query(HistoryFilter::default()).collect();
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].subject(), "Oslo");
        assert_eq!(all[1].source(), Source::News);
    }

    #[test]
    fn torn_line_is_skipped_on_replay() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("history.jsonl");
        let good = serde_json::to_string(&weather("Oslo", 5.0, Utc::now())).unwrap();
        std::fs::write(&path, format!("{good}\n{{\"source\":\"wea")).unwrap();
        let store = HistoryStore::open_jsonl(&path).unwrap();
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn append_after_torn_tail_survives_next_restart() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("history.jsonl");
        let good = serde_json::to_string(&weather("Oslo", 5.0, Utc::now())).unwrap();
        std::fs::write(&path, format!("{good}\n{{\"source\":\"wea")).unwrap();

        {
            let store = HistoryStore::open_jsonl(&path).unwrap();
            store.append(&[weather("Bergen", 7.0, Utc::now())]).unwrap();
            assert_eq!(store.len(), 2);
        }

        let reopened = HistoryStore::open_jsonl(&path).unwrap();
        let subjects: Vec<_> = reopened
            .query(HistoryFilter::default())
            .map(|o| o.subject().to_string())
            .collect();
        assert_eq!(subjects, vec!["Oslo", "Bergen"]);
        assert!(std::fs::read_to_string(&path).unwrap().ends_with('\n'));
    }
}
