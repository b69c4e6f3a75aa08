//! Bounded, TTL-expiring cache for packaged [`SearchResults`] (§5 "Shared-resource
//! policy": "per-engine; invalidated entirely for an index on any write to that
//! index"). Capped at 100 entries, evicted oldest-insertion-first.

use std::collections::{HashMap, VecDeque};
use std::time::{Duration, Instant};

use crate::types::SearchResults;

const CAPACITY: usize = 100;

struct CacheEntry {
    value: SearchResults,
    inserted_at: Instant,
}

pub struct ResultCache {
    ttl: Duration,
    entries: HashMap<String, CacheEntry>,
    order: VecDeque<String>,
}

impl ResultCache {
    pub fn new(ttl_secs: u64) -> Self {
        Self {
            ttl: Duration::from_secs(ttl_secs),
            entries: HashMap::new(),
            order: VecDeque::new(),
        }
    }

    /// Build a cache key scoping the entry to one index, so [`Self::invalidate_index`]
    /// can find every entry for that index without inspecting the query payload.
    pub fn key(index: &str, canonical_query: &str, flags: &str) -> String {
        format!("{index}\u{0}{canonical_query}\u{0}{flags}")
    }

    pub fn get(&mut self, key: &str) -> Option<SearchResults> {
        let expired = match self.entries.get(key) {
            Some(entry) => entry.inserted_at.elapsed() >= self.ttl,
            None => return None,
        };
        if expired {
            self.entries.remove(key);
            self.order.retain(|k| k != key);
            return None;
        }
        self.entries.get(key).map(|e| e.value.clone())
    }

    pub fn put(&mut self, key: String, value: SearchResults) {
        if self.entries.contains_key(&key) {
            self.order.retain(|k| k != &key);
        }
        self.order.push_back(key.clone());
        self.entries.insert(key, CacheEntry { value, inserted_at: Instant::now() });
        while self.order.len() > CAPACITY {
            if let Some(oldest) = self.order.pop_front() {
                self.entries.remove(&oldest);
            }
        }
    }

    pub fn invalidate_index(&mut self, index: &str) {
        let prefix = format!("{index}\u{0}");
        let stale: Vec<String> = self.entries.keys().filter(|k| k.starts_with(&prefix)).cloned().collect();
        for key in stale {
            self.entries.remove(&key);
            self.order.retain(|k| k != &key);
        }
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.order.clear();
    }
}
