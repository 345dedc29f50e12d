//! LRU + TTL cache for ranked expansion candidates.
//!
//! Keyed by the cluster identifier string. Entries are never mutated in
//! place: they are created on first computation (or by the precomputer)
//! and leave through TTL expiry, LRU pressure, or explicit invalidation.
//! Any update to the underlying graph or clustering must invalidate the
//! whole cache, since cached splits reference stale membership.

use std::num::NonZeroUsize;
use std::time::{Duration, Instant};

use lru::LruCache;
use parking_lot::Mutex;
use serde::Serialize;
use tracing::debug;

use super::score::ScoredSplit;

/// Capacity and staleness bounds for the expansion cache.
#[derive(Debug, Clone, Copy)]
pub struct CacheConfig {
    /// Maximum entries retained before LRU eviction.
    pub capacity: usize,
    /// Entry time-to-live.
    pub ttl: Duration,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            capacity: 64,
            ttl: Duration::from_secs(3600),
        }
    }
}

impl CacheConfig {
    /// Set the entry capacity.
    pub fn with_capacity(mut self, capacity: usize) -> Self {
        self.capacity = capacity;
        self
    }

    /// Set the time-to-live.
    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }
}

/// A ranked, scored expansion result for one cluster.
#[derive(Debug, Clone)]
pub struct CachedExpansion {
    /// Candidate splits, best first.
    pub ranked: Vec<ScoredSplit>,
    /// How long the computation took.
    pub compute_time: Duration,
    created: Instant,
}

impl CachedExpansion {
    /// Wrap a freshly computed ranking.
    pub fn new(ranked: Vec<ScoredSplit>, compute_time: Duration) -> Self {
        Self {
            ranked,
            compute_time,
            created: Instant::now(),
        }
    }

    /// The best candidate, if any.
    pub fn best(&self) -> Option<&ScoredSplit> {
        self.ranked.first()
    }

    /// Age of this entry.
    pub fn age(&self) -> Duration {
        self.created.elapsed()
    }
}

/// Observability counters for the cache.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    /// Lookups served from the cache.
    pub hits: u64,
    /// Lookups that found nothing or an expired entry.
    pub misses: u64,
    /// Entries removed by LRU pressure or TTL expiry.
    pub evictions: u64,
    /// Entries currently held.
    pub len: usize,
    /// Configured capacity.
    pub capacity: usize,
}

struct Inner {
    map: LruCache<String, CachedExpansion>,
    hits: u64,
    misses: u64,
    evictions: u64,
}

/// Thread-safe LRU + TTL cache of ranked expansion results.
///
/// Injected and shared (`Arc`) rather than process-global, so cache
/// lifetime and test isolation stay explicit.
pub struct ExpansionCache {
    inner: Mutex<Inner>,
    ttl: Duration,
    capacity: usize,
}

impl ExpansionCache {
    /// Create a cache with the given bounds.
    pub fn new(config: CacheConfig) -> Self {
        let capacity = config.capacity.max(1);
        let nonzero = NonZeroUsize::new(capacity).expect("capacity is at least one");
        Self {
            inner: Mutex::new(Inner {
                map: LruCache::new(nonzero),
                hits: 0,
                misses: 0,
                evictions: 0,
            }),
            ttl: config.ttl,
            capacity,
        }
    }

    /// Look up a cluster's ranked expansion. A hit refreshes recency; an
    /// expired entry is dropped and counts as both an eviction and a miss.
    pub fn get(&self, id: &str) -> Option<CachedExpansion> {
        let mut inner = self.inner.lock();
        let expired = match inner.map.get(id) {
            None => {
                inner.misses += 1;
                debug!(cluster = id, "expansion cache miss");
                return None;
            }
            Some(entry) => entry.created.elapsed() > self.ttl,
        };
        if expired {
            inner.map.pop(id);
            inner.evictions += 1;
            inner.misses += 1;
            debug!(cluster = id, "expansion cache entry expired");
            return None;
        }
        inner.hits += 1;
        inner.map.get(id).cloned()
    }

    /// Insert a freshly computed result, evicting the least-recently-used
    /// entry at capacity.
    pub fn put(&self, id: impl Into<String>, entry: CachedExpansion) {
        let id = id.into();
        let mut inner = self.inner.lock();
        if let Some((evicted, _)) = inner.map.push(id.clone(), entry) {
            if evicted != id {
                inner.evictions += 1;
                debug!(cluster = %evicted, "expansion cache evicted by pressure");
            }
        }
    }

    /// Whether a live (unexpired) entry exists, without touching recency
    /// or the hit/miss counters.
    pub fn contains(&self, id: &str) -> bool {
        let inner = self.inner.lock();
        inner
            .map
            .peek(id)
            .is_some_and(|e| e.created.elapsed() <= self.ttl)
    }

    /// Drop one entry. Returns whether anything was removed.
    pub fn invalidate(&self, id: &str) -> bool {
        let mut inner = self.inner.lock();
        let removed = inner.map.pop(id).is_some();
        if removed {
            inner.evictions += 1;
        }
        removed
    }

    /// Drop everything; required whenever the underlying graph changes.
    pub fn invalidate_all(&self) {
        let mut inner = self.inner.lock();
        let len = inner.map.len() as u64;
        inner.map.clear();
        inner.evictions += len;
        debug!(dropped = len, "expansion cache fully invalidated");
    }

    /// Current counters and occupancy.
    pub fn stats(&self) -> CacheStats {
        let inner = self.inner.lock();
        CacheStats {
            hits: inner.hits,
            misses: inner.misses,
            evictions: inner.evictions,
            len: inner.map.len(),
            capacity: self.capacity,
        }
    }
}

impl std::fmt::Debug for ExpansionCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExpansionCache")
            .field("capacity", &self.capacity)
            .field("ttl", &self.ttl)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expand::score::{score_split, ScoreWeights};
    use crate::graph::FollowGraph;

    fn entry(groups: Vec<Vec<u64>>) -> CachedExpansion {
        let score = score_split(
            &groups,
            groups.iter().map(Vec::len).sum(),
            &FollowGraph::default(),
            None,
            &ScoreWeights::default(),
        );
        CachedExpansion::new(
            vec![ScoredSplit {
                groups,
                resolution: Some(1.0),
                score,
            }],
            Duration::from_millis(5),
        )
    }

    #[test]
    fn counts_hits_and_misses() {
        let cache = ExpansionCache::new(CacheConfig::default());
        assert!(cache.get("c1").is_none());
        cache.put("c1", entry(vec![vec![1], vec![2]]));
        assert!(cache.get("c1").is_some());
        assert!(cache.get("c1").is_some());

        let stats = cache.stats();
        assert_eq!(stats.hits, 2);
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.len, 1);
    }

    #[test]
    fn recency_decides_eviction() {
        let cache = ExpansionCache::new(CacheConfig::default().with_capacity(2));
        cache.put("a", entry(vec![vec![1]]));
        cache.put("b", entry(vec![vec![2]]));
        // Touch "a" so "b" is the least recently used.
        assert!(cache.get("a").is_some());
        cache.put("c", entry(vec![vec![3]]));

        assert!(cache.contains("a"));
        assert!(!cache.contains("b"));
        assert!(cache.contains("c"));
        assert_eq!(cache.stats().evictions, 1);
    }

    #[test]
    fn entries_expire_after_ttl() {
        let cache =
            ExpansionCache::new(CacheConfig::default().with_ttl(Duration::from_millis(10)));
        cache.put("a", entry(vec![vec![1]]));
        std::thread::sleep(Duration::from_millis(30));
        assert!(!cache.contains("a"));
        assert!(cache.get("a").is_none());

        let stats = cache.stats();
        assert_eq!(stats.evictions, 1);
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.len, 0);
    }

    #[test]
    fn invalidation_drops_entries() {
        let cache = ExpansionCache::new(CacheConfig::default());
        cache.put("a", entry(vec![vec![1]]));
        cache.put("b", entry(vec![vec![2]]));
        assert!(cache.invalidate("a"));
        assert!(!cache.invalidate("a"));
        cache.invalidate_all();
        assert_eq!(cache.stats().len, 0);
        assert!(!cache.contains("b"));
    }

    #[test]
    fn cached_entries_round_trip_identically() {
        let cache = ExpansionCache::new(CacheConfig::default());
        cache.put("a", entry(vec![vec![1, 2], vec![3]]));
        let first = cache.get("a").unwrap();
        let second = cache.get("a").unwrap();
        assert_eq!(first.ranked[0].groups, second.ranked[0].groups);
        assert_eq!(
            first.ranked[0].score.total_score,
            second.ranked[0].score.total_score
        );
    }
}
