//! Priority-ordered background precomputation of expansions.
//!
//! When a set of clusters becomes visible, the ones most likely to be
//! expanded next can be queued here so their candidate splits are already
//! cached when the user clicks. Higher priority drains first; equal
//! priorities drain in enqueue order. Enqueueing is atomic with respect to
//! the already-cached and already-queued checks, so two workers never
//! compute the same cluster twice.

use std::collections::{BinaryHeap, HashSet};
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::debug;

use super::cache::ExpansionCache;

/// A queued request to precompute one cluster's expansion.
#[derive(Debug, Clone)]
pub struct PrecomputeRequest {
    /// Cluster identifier.
    pub cluster: String,
    /// The cluster's member accounts.
    pub members: Vec<u64>,
    /// Drain priority; higher first.
    pub priority: i32,
    seq: u64,
}

impl PartialEq for PrecomputeRequest {
    fn eq(&self, other: &Self) -> bool {
        self.priority == other.priority && self.seq == other.seq
    }
}

impl Eq for PrecomputeRequest {}

impl PartialOrd for PrecomputeRequest {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for PrecomputeRequest {
    /// Max-heap order: priority descending, then FIFO among equals.
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.priority
            .cmp(&other.priority)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

struct QueueState {
    heap: BinaryHeap<PrecomputeRequest>,
    queued: HashSet<String>,
    next_seq: u64,
}

/// Opportunistic precompute queue in front of an [`ExpansionCache`].
pub struct Precomputer {
    cache: Arc<ExpansionCache>,
    state: Mutex<QueueState>,
}

impl Precomputer {
    /// Create a precomputer feeding the given cache.
    pub fn new(cache: Arc<ExpansionCache>) -> Self {
        Self {
            cache,
            state: Mutex::new(QueueState {
                heap: BinaryHeap::new(),
                queued: HashSet::new(),
                next_seq: 0,
            }),
        }
    }

    /// Queue a cluster unless it is already cached or already queued.
    ///
    /// Returns whether the request was accepted.
    pub fn enqueue(&self, cluster: impl Into<String>, members: Vec<u64>, priority: i32) -> bool {
        let cluster = cluster.into();
        let mut state = self.state.lock();
        if self.cache.contains(&cluster) || state.queued.contains(&cluster) {
            debug!(cluster = %cluster, "precompute request skipped");
            return false;
        }
        let seq = state.next_seq;
        state.next_seq += 1;
        state.queued.insert(cluster.clone());
        state.heap.push(PrecomputeRequest {
            cluster,
            members,
            priority,
            seq,
        });
        true
    }

    /// Number of requests waiting.
    pub fn pending(&self) -> usize {
        self.state.lock().heap.len()
    }

    /// Drain the queue in priority order, computing and caching each
    /// cluster through `compute`. The closure returns whether it produced
    /// (and cached) a result; failures are dropped without retry.
    ///
    /// Returns the number of clusters computed.
    pub fn drain<F>(&self, compute: F) -> usize
    where
        F: Fn(&str, &[u64]) -> bool,
    {
        let mut computed = 0;
        loop {
            let request = {
                let mut state = self.state.lock();
                match state.heap.pop() {
                    Some(r) => r,
                    None => break,
                }
            };
            // The user may have expanded it while it sat in the queue.
            if !self.cache.contains(&request.cluster)
                && compute(&request.cluster, &request.members)
            {
                computed += 1;
            }
            self.state.lock().queued.remove(&request.cluster);
        }
        debug!(computed, "precompute queue drained");
        computed
    }
}

impl std::fmt::Debug for Precomputer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Precomputer")
            .field("pending", &self.pending())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expand::cache::{CacheConfig, CachedExpansion};
    use std::time::Duration;

    fn harness() -> (Arc<ExpansionCache>, Precomputer) {
        let cache = Arc::new(ExpansionCache::new(CacheConfig::default()));
        let pre = Precomputer::new(Arc::clone(&cache));
        (cache, pre)
    }

    #[test]
    fn drains_by_priority_then_fifo() {
        let (cache, pre) = harness();
        assert!(pre.enqueue("low-a", vec![1], 1));
        assert!(pre.enqueue("high", vec![2], 9));
        assert!(pre.enqueue("low-b", vec![3], 1));

        let order = Mutex::new(Vec::new());
        pre.drain(|id, _| {
            order.lock().push(id.to_string());
            cache.put(id, CachedExpansion::new(vec![], Duration::ZERO));
            true
        });
        assert_eq!(order.into_inner(), vec!["high", "low-a", "low-b"]);
        assert_eq!(pre.pending(), 0);
    }

    #[test]
    fn skips_already_queued_clusters() {
        let (_cache, pre) = harness();
        assert!(pre.enqueue("a", vec![1], 1));
        assert!(!pre.enqueue("a", vec![1], 5));
        assert_eq!(pre.pending(), 1);
    }

    #[test]
    fn skips_already_cached_clusters() {
        let (cache, pre) = harness();
        cache.put("a", CachedExpansion::new(vec![], Duration::ZERO));
        assert!(!pre.enqueue("a", vec![1], 1));
    }

    #[test]
    fn drain_skips_clusters_cached_while_queued() {
        let (cache, pre) = harness();
        assert!(pre.enqueue("a", vec![1], 1));
        cache.put("a", CachedExpansion::new(vec![], Duration::ZERO));

        let computed = pre.drain(|_, _| panic!("should not compute a cached cluster"));
        assert_eq!(computed, 0);
    }

    #[test]
    fn requeue_is_possible_after_drain() {
        let (_cache, pre) = harness();
        assert!(pre.enqueue("a", vec![1], 1));
        pre.drain(|_, _| false);
        assert!(pre.enqueue("a", vec![1], 1));
    }
}
