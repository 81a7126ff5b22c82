//! Query result cache
//!
//! Keys are the normalized query (trimmed, lowercased, whitespace-collapsed
//! text, then `top_k`, filters and `min_score`), hashed with xxh3. The
//! normalized string is kept beside the payload so a hash collision reads
//! as a miss.
//!
//! Payloads are schema-versioned JSON. An entry that fails to decode is a
//! `CacheCorruption`: logged, dropped, and reported as a miss. Expired
//! entries are evicted lazily on lookup.
//!
//! All locking is `parking_lot::RwLock`, never held across an `.await`.
//!
//! Every `clear` bumps a generation counter under the write lock. A search
//! reads the generation before fanning out and stores with
//! [`QueryCache::put_if_current`], so results computed against an index
//! that has since been replaced are never cached.

use crate::enrich::EnrichedResult;
use parking_lot::RwLock;
use ragline_core::{Query, RaglineError, RaglineResult};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};
use tracing::{debug, warn};
use xxhash_rust::xxh3::xxh3_64;

/// Bumped whenever the cached payload layout changes
pub const CACHE_SCHEMA_VERSION: u32 = 1;

#[derive(Serialize, Deserialize)]
struct CachePayload {
    schema_version: u32,
    results: Vec<EnrichedResult>,
}

/// One cached query
#[derive(Debug, Clone)]
pub struct CacheEntry {
    /// Normalized query key
    pub key: String,
    /// Schema-versioned JSON payload
    pub payload: String,
    /// When the entry was stored
    pub written_at: Instant,
}

/// Cache counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    /// Lookups answered from the cache
    pub hits: u64,
    /// Lookups that fell through
    pub misses: u64,
    /// Entries dropped because they failed to decode
    pub corruptions: u64,
    /// Entries currently held
    pub entries: usize,
}

/// Normalize a query into its cache key
pub fn normalize_key(query: &Query) -> String {
    let text = query
        .text
        .split_whitespace()
        .map(|w| w.to_lowercase())
        .collect::<Vec<_>>()
        .join(" ");
    let filters = serde_json::to_string(&query.filters).unwrap_or_default();
    let min_score = query
        .min_score
        .map(|s| s.to_string())
        .unwrap_or_default();
    format!("{}\u{1f}{}\u{1f}{}\u{1f}{}", text, query.top_k, filters, min_score)
}

/// TTL-bounded query cache
#[derive(Debug)]
pub struct QueryCache {
    entries: RwLock<HashMap<u64, CacheEntry>>,
    ttl: Duration,
    enabled: bool,
    generation: AtomicU64,
    hits: AtomicU64,
    misses: AtomicU64,
    corruptions: AtomicU64,
}

impl QueryCache {
    /// Create a cache. A disabled cache stores nothing and always misses.
    pub fn new(ttl: Duration, enabled: bool) -> Self {
        QueryCache {
            entries: RwLock::new(HashMap::new()),
            ttl,
            enabled,
            generation: AtomicU64::new(0),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            corruptions: AtomicU64::new(0),
        }
    }

    /// Build from the `[cache]` section
    pub fn from_config(config: &ragline_core::CacheConfig) -> Self {
        Self::new(Duration::from_secs(config.ttl_secs), config.enabled)
    }

    /// Entry lifetime
    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Whether the cache stores anything
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    fn is_expired(&self, entry: &CacheEntry) -> bool {
        entry.written_at.elapsed() >= self.ttl
    }

    /// Look up a query. Expired and corrupt entries are removed and miss.
    pub fn get(&self, query: &Query) -> Option<Vec<EnrichedResult>> {
        if !self.enabled {
            return None;
        }
        let key = normalize_key(query);
        let hash = xxh3_64(key.as_bytes());

        let lookup = {
            let entries = self.entries.read();
            match entries.get(&hash) {
                Some(e) if e.key == key => {
                    if self.is_expired(e) {
                        Lookup::Expired
                    } else {
                        match decode(&e.payload) {
                            Ok(results) => Lookup::Hit(results),
                            Err(err) => Lookup::Corrupt(err),
                        }
                    }
                }
                _ => Lookup::Miss,
            }
        };

        match lookup {
            Lookup::Hit(results) => {
                self.hits.fetch_add(1, Ordering::Relaxed);
                debug!(target: "ragline::cache", key = %key, "Cache hit");
                return Some(results);
            }
            Lookup::Expired => {
                let mut entries = self.entries.write();
                if entries.get(&hash).is_some_and(|e| self.is_expired(e)) {
                    entries.remove(&hash);
                }
                debug!(target: "ragline::cache", key = %key, "Evicted expired entry");
            }
            Lookup::Corrupt(err) => {
                self.corruptions.fetch_add(1, Ordering::Relaxed);
                warn!(target: "ragline::cache", key = %key, error = %err, "Dropping corrupt entry");
                self.entries.write().remove(&hash);
            }
            Lookup::Miss => {
                debug!(target: "ragline::cache", key = %key, "Cache miss");
            }
        }
        self.misses.fetch_add(1, Ordering::Relaxed);
        None
    }

    /// Current generation; changes on every [`clear`](Self::clear)
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::Acquire)
    }

    /// Store results for a query
    pub fn put(&self, query: &Query, results: &[EnrichedResult]) -> RaglineResult<()> {
        self.put_if_current(query, results, self.generation())
            .map(|_| ())
    }

    /// Store results computed while the cache was at `generation`.
    ///
    /// Returns `false`, storing nothing, if the cache has been cleared
    /// since then.
    pub fn put_if_current(
        &self,
        query: &Query,
        results: &[EnrichedResult],
        generation: u64,
    ) -> RaglineResult<bool> {
        if !self.enabled {
            return Ok(false);
        }
        let payload = serde_json::to_string(&CachePayloadRef {
            schema_version: CACHE_SCHEMA_VERSION,
            results,
        })?;
        Ok(self.insert(query, payload, generation))
    }

    /// Store a raw payload. Used by tests to simulate corruption.
    #[cfg(test)]
    pub(crate) fn insert_raw(&self, query: &Query, payload: String) {
        self.insert(query, payload, self.generation());
    }

    fn insert(&self, query: &Query, payload: String, generation: u64) -> bool {
        let key = normalize_key(query);
        let hash = xxh3_64(key.as_bytes());
        let mut entries = self.entries.write();
        if self.generation.load(Ordering::Acquire) != generation {
            debug!(target: "ragline::cache", key = %key, "Skipping stale write");
            return false;
        }
        entries.insert(
            hash,
            CacheEntry {
                key,
                payload,
                written_at: Instant::now(),
            },
        );
        true
    }

    /// Drop every entry and start a new generation, in one write-locked step
    pub fn clear(&self) {
        let mut entries = self.entries.write();
        entries.clear();
        self.generation.fetch_add(1, Ordering::AcqRel);
    }

    /// Remove all expired entries; returns how many were removed
    pub fn purge_expired(&self) -> usize {
        let mut entries = self.entries.write();
        let before = entries.len();
        entries.retain(|_, e| !self.is_expired(e));
        before - entries.len()
    }

    /// Entries currently held
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    /// Whether no entries are held
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Counter snapshot
    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            corruptions: self.corruptions.load(Ordering::Relaxed),
            entries: self.len(),
        }
    }
}

enum Lookup {
    Hit(Vec<EnrichedResult>),
    Expired,
    Corrupt(RaglineError),
    Miss,
}

#[derive(Serialize)]
struct CachePayloadRef<'a> {
    schema_version: u32,
    results: &'a [EnrichedResult],
}

fn decode(payload: &str) -> Result<Vec<EnrichedResult>, RaglineError> {
    let parsed: CachePayload = serde_json::from_str(payload)
        .map_err(|e| RaglineError::CacheCorruption(e.to_string()))?;
    if parsed.schema_version != CACHE_SCHEMA_VERSION {
        return Err(RaglineError::CacheCorruption(format!(
            "schema version {} (expected {})",
            parsed.schema_version, CACHE_SCHEMA_VERSION
        )));
    }
    Ok(parsed.results)
}
