// src/cache.rs
//! Short-lived in-memory cache of normalized observations.
//!
//! Keys carry every query parameter that shapes the result. Entries are
//! absolute-TTL (no sliding refresh), evicted on lookup of their key and
//! swept on every insert. Not persisted; a restart starts cold.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use metrics::counter;
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

use crate::config::CacheConfig;
use crate::ingest::{CryptoQuery, NewsQuery, WeatherQuery};
use crate::observation::{Observation, Source};

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    source: Source,
    params: String,
}

impl CacheKey {
    /// Symbols arrive already normalized (sorted, deduped), so `btc,eth`
    /// and `eth,btc` share a key.
    pub fn crypto(q: &CryptoQuery) -> Self {
        Self {
            source: Source::Crypto,
            params: format!("symbols={}", q.symbols.join(",")),
        }
    }

    pub fn news(q: &NewsQuery) -> Self {
        Self {
            source: Source::News,
            params: format!(
                "category={}&limit={}",
                q.category.as_deref().unwrap_or_default(),
                q.limit
            ),
        }
    }

    pub fn weather(q: &WeatherQuery) -> Self {
        Self {
            source: Source::Weather,
            params: format!("city={}", q.city.to_lowercase()),
        }
    }

    pub fn source(&self) -> Source {
        self.source
    }
}

#[derive(Debug, Clone)]
struct CacheEntry {
    value: Arc<Vec<Observation>>,
    expires_at: Instant,
}

pub struct ObservationCache {
    ttls: CacheConfig,
    entries: Mutex<HashMap<CacheKey, CacheEntry>>,
    inflight: Mutex<HashMap<CacheKey, Arc<AsyncMutex<()>>>>,
}

/// Held while a request runs check → fetch → store for one key.
pub struct KeyGuard<'a> {
    cache: &'a ObservationCache,
    key: CacheKey,
    _guard: OwnedMutexGuard<()>,
}

impl Drop for KeyGuard<'_> {
    fn drop(&mut self) {
        let mut map = self.cache.inflight.lock().expect("cache inflight mutex poisoned");
        // map + our own guard; nobody else is waiting on this key
        if map.get(&self.key).is_some_and(|m| Arc::strong_count(m) <= 2) {
            map.remove(&self.key);
        }
    }
}

impl ObservationCache {
    pub fn new(ttls: CacheConfig) -> Self {
        Self {
            ttls,
            entries: Mutex::new(HashMap::new()),
            inflight: Mutex::new(HashMap::new()),
        }
    }

    pub fn ttl_for(&self, source: Source) -> Duration {
        self.ttls.ttl_for(source)
    }

    pub fn get(&self, key: &CacheKey) -> Option<Arc<Vec<Observation>>> {
        self.get_at(key, Instant::now())
    }

    pub fn get_at(&self, key: &CacheKey, now: Instant) -> Option<Arc<Vec<Observation>>> {
        let mut map = self.entries.lock().expect("cache mutex poisoned");
        let hit = match map.get(key) {
            Some(e) if now < e.expires_at => Some(e.value.clone()),
            Some(_) => {
                map.remove(key);
                None
            }
            None => None,
        };
        let source = key.source.as_str();
        if hit.is_some() {
            counter!("pulse_cache_hits_total", "source" => source).increment(1);
        } else {
            counter!("pulse_cache_misses_total", "source" => source).increment(1);
        }
        hit
    }

    pub fn put(&self, key: CacheKey, value: Vec<Observation>, ttl: Duration) -> Arc<Vec<Observation>> {
        self.put_at(key, value, ttl, Instant::now())
    }

    pub fn put_at(
        &self,
        key: CacheKey,
        value: Vec<Observation>,
        ttl: Duration,
        now: Instant,
    ) -> Arc<Vec<Observation>> {
        let value = Arc::new(value);
        let entry = CacheEntry {
            value: value.clone(),
            expires_at: now + ttl,
        };
        let mut map = self.entries.lock().expect("cache mutex poisoned");
        // lookups only evict their own key; expired entries of any key go here
        map.retain(|_, e| now < e.expires_at);
        map.insert(key, entry);
        value
    }

    /// Serializes work on one key: a second request for the same key waits
    /// here and then finds the first one's result in the cache.
    pub async fn lock_key(&self, key: &CacheKey) -> KeyGuard<'_> {
        let slot = {
            let mut map = self.inflight.lock().expect("cache inflight mutex poisoned");
            map.entry(key.clone())
                .or_insert_with(|| Arc::new(AsyncMutex::new(())))
                .clone()
        };
        let guard = slot.lock_owned().await;
        KeyGuard {
            cache: self,
            key: key.clone(),
            _guard: guard,
        }
    }

    pub fn len(&self) -> usize {
        self.entries.lock().expect("cache mutex poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
