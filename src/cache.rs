use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use parking_lot::Mutex;
use tracing::debug;

use crate::geo::Coordinates;
use crate::places::SearchResult;

pub const DEFAULT_TTL_SECS: i64 = 5 * 60;
pub const DEFAULT_CAPACITY: usize = 64;

pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// A text search as sent to the provider.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchRequest {
    pub query: String,
    pub location: Coordinates,
    pub radius_meters: u32,
}

impl SearchRequest {
    pub fn new(query: impl Into<String>, location: Coordinates, radius_meters: u32) -> Self {
        Self {
            query: query.into(),
            location,
            radius_meters,
        }
    }

    /// Case-folded trimmed query, location at 4 decimals, radius verbatim.
    pub fn fingerprint(&self) -> String {
        format!(
            "{}|{:.4},{:.4}|{}",
            self.query.trim().to_lowercase(),
            self.location.lat,
            self.location.lng,
            self.radius_meters
        )
    }
}

#[derive(Debug, Clone)]
struct CacheEntry {
    results: Vec<SearchResult>,
    stored_at: DateTime<Utc>,
}

#[derive(Default)]
struct CacheState {
    entries: HashMap<String, CacheEntry>,
    order: VecDeque<String>,
}

#[derive(Clone)]
pub struct ResultCache {
    state: Arc<Mutex<CacheState>>,
    clock: Arc<dyn Clock>,
    ttl: Duration,
    capacity: usize,
}

impl ResultCache {
    pub fn new(ttl: Duration, capacity: usize) -> Self {
        Self::with_clock(ttl, capacity, Arc::new(SystemClock))
    }

    pub fn with_clock(ttl: Duration, capacity: usize, clock: Arc<dyn Clock>) -> Self {
        Self {
            state: Arc::new(Mutex::new(CacheState::default())),
            clock,
            ttl,
            capacity: capacity.max(1),
        }
    }

    pub fn get(&self, request: &SearchRequest) -> Option<Vec<SearchResult>> {
        let key = request.fingerprint();
        let now = self.clock.now();
        let mut state = self.state.lock();
        let fresh = state
            .entries
            .get(&key)
            .map(|entry| now - entry.stored_at < self.ttl)?;
        if fresh {
            debug!(target: "result_cache", query = %request.query, "cache hit");
            return state.entries.get(&key).map(|entry| entry.results.clone());
        }

        state.entries.remove(&key);
        state.order.retain(|k| k != &key);
        debug!(target: "result_cache", query = %request.query, "evicted stale entry");
        None
    }

    pub fn put(&self, request: &SearchRequest, results: Vec<SearchResult>) {
        let key = request.fingerprint();
        let entry = CacheEntry {
            results,
            stored_at: self.clock.now(),
        };
        let mut state = self.state.lock();
        if state.entries.insert(key.clone(), entry).is_none() {
            state.order.push_back(key);
        }
        while state.entries.len() > self.capacity {
            let Some(oldest) = state.order.pop_front() else {
                break;
            };
            state.entries.remove(&oldest);
        }
        debug!(target: "result_cache", query = %request.query, "stored results");
    }

    pub fn len(&self) -> usize {
        self.state.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
