//! Local expansion: community detection on a cluster's induced subgraph.
//!
//! Dense "mega-clusters" defeat the merge tree: their children split off
//! tiny slivers instead of meaningful subgroups. When the trigger heuristic
//! fires, navigation stops trusting the tree below that node and instead
//! detects communities directly on the subgraph induced by the cluster's
//! members, splicing the resulting groups in as synthetic children.
//!
//! Results are memoized by a content hash of the sorted member list plus
//! the resolution, so repeated expansion of an unchanged cluster is free.
//! This memo is local to the expander and distinct from the ranked-split
//! cache in [`super::cache`].

use std::collections::hash_map::DefaultHasher;
use std::collections::HashMap;
use std::hash::{Hash, Hasher};
use std::num::NonZeroUsize;
use std::sync::Arc;
use std::time::{Duration, Instant};

use lru::LruCache;
use parking_lot::Mutex;
use petgraph::graph::UnGraph;
use tracing::debug;

use crate::community::{CommunityDetection, Louvain};
use crate::error::{Error, Result};
use crate::graph::FollowGraph;

/// Tuning for the trigger heuristic and the detection pass.
#[derive(Debug, Clone)]
pub struct LocalExpandConfig {
    /// Minimum members required to attempt community detection.
    pub min_members: usize,
    /// Communities below this size are dissolved into their neighbors.
    pub min_community_size: usize,
    /// Seed pinning the community-detection visit order.
    pub seed: u64,
    /// Cluster fraction of the whole graph above which the merge tree is
    /// considered too coarse (the 0.5 hard trigger applies regardless).
    pub coarse_fraction: f64,
    /// Members-per-micro-cluster multiple of the graph-wide average that
    /// marks a cluster as abnormally dense.
    pub density_factor: f64,
    /// Micro-cluster span at or below which a large cluster is considered
    /// too coarsely grouped.
    pub max_micro_span: usize,
    /// Memo capacity (entries).
    pub memo_capacity: usize,
    /// Memo time-to-live.
    pub memo_ttl: Duration,
}

impl Default for LocalExpandConfig {
    fn default() -> Self {
        Self {
            min_members: 10,
            min_community_size: 2,
            seed: 42,
            coarse_fraction: 0.15,
            density_factor: 3.0,
            max_micro_span: 3,
            memo_capacity: 50,
            memo_ttl: Duration::from_secs(3600),
        }
    }
}

impl LocalExpandConfig {
    /// Set the fraction threshold for the coarse-grouping trigger.
    pub fn with_coarse_fraction(mut self, fraction: f64) -> Self {
        self.coarse_fraction = fraction;
        self
    }

    /// Set the detection seed.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }
}

/// Decide whether a cluster should bypass its merge-tree children and be
/// subdivided by community detection instead.
///
/// Always true above half the graph. Otherwise true above the configured
/// coarse fraction when the cluster either spans very few micro-clusters
/// or is far denser per micro-cluster than the graph-wide average; both
/// signal that the merge tree grouped the region too coarsely to use.
pub fn should_use_local_expansion(
    cluster_size: usize,
    total_nodes: usize,
    micro_cluster_count: usize,
    cluster_micro_count: usize,
    config: &LocalExpandConfig,
) -> bool {
    if total_nodes == 0 {
        return false;
    }
    let fraction = cluster_size as f64 / total_nodes as f64;
    if fraction > 0.5 {
        return true;
    }
    if fraction <= config.coarse_fraction {
        return false;
    }
    if cluster_micro_count <= config.max_micro_span {
        return true;
    }
    if micro_cluster_count == 0 || cluster_micro_count == 0 {
        return false;
    }
    let graph_density = total_nodes as f64 / micro_cluster_count as f64;
    let cluster_density = cluster_size as f64 / cluster_micro_count as f64;
    cluster_density > config.density_factor * graph_density
}

/// Map a target child count onto a community-detection resolution.
///
/// Monotone: more children wanted, higher resolution, smaller communities.
pub fn resolution_for_target(target_children: usize) -> f64 {
    match target_children {
        0..=5 => 0.5,
        6..=10 => 1.0,
        11..=20 => 2.0,
        21..=35 => 3.0,
        _ => 4.0,
    }
}

struct MemoEntry {
    groups: Vec<Vec<u64>>,
    created: Instant,
}

/// Community-detection splitter over induced subgraphs, with a TTL'd memo.
pub struct LocalExpander {
    graph: Arc<FollowGraph>,
    config: LocalExpandConfig,
    memo: Mutex<LruCache<u64, MemoEntry>>,
}

impl LocalExpander {
    /// Create an expander over a shared adjacency snapshot.
    pub fn new(graph: Arc<FollowGraph>, config: LocalExpandConfig) -> Self {
        let capacity = NonZeroUsize::new(config.memo_capacity.max(1))
            .expect("memo capacity is at least one");
        Self {
            graph,
            config,
            memo: Mutex::new(LruCache::new(capacity)),
        }
    }

    /// The expander's configuration.
    pub fn config(&self) -> &LocalExpandConfig {
        &self.config
    }

    /// Split `members` into communities at the given resolution.
    ///
    /// Groups come back sorted by descending size (ties toward the smallest
    /// leading member id), each group sorted ascending. Fails when the
    /// cluster is too small, has no internal edges, or detection finds no
    /// subdivision.
    pub fn expand(&self, members: &[u64], resolution: f64) -> Result<Vec<Vec<u64>>> {
        let mut sorted: Vec<u64> = members.to_vec();
        sorted.sort_unstable();
        sorted.dedup();

        if sorted.len() < self.config.min_members {
            return Err(Error::Unsplittable(format!(
                "{} members is below the minimum of {}",
                sorted.len(),
                self.config.min_members
            )));
        }

        let key = memo_key(&sorted, resolution);
        if let Some(groups) = self.memo_get(key) {
            debug!(members = sorted.len(), resolution, "local expansion memo hit");
            return Ok(groups);
        }

        let groups = self.detect(&sorted, resolution)?;
        self.memo.lock().put(
            key,
            MemoEntry {
                groups: groups.clone(),
                created: Instant::now(),
            },
        );
        Ok(groups)
    }

    /// Drop every memoized result (underlying graph changed).
    pub fn clear_memo(&self) {
        self.memo.lock().clear();
    }

    #[cfg(test)]
    pub(crate) fn memo_len(&self) -> usize {
        self.memo.lock().len()
    }

    fn memo_get(&self, key: u64) -> Option<Vec<Vec<u64>>> {
        let mut memo = self.memo.lock();
        let expired = memo
            .get(&key)
            .map(|e| e.created.elapsed() > self.config.memo_ttl);
        match expired {
            Some(false) => memo.get(&key).map(|e| e.groups.clone()),
            Some(true) => {
                memo.pop(&key);
                None
            }
            None => None,
        }
    }

    fn detect(&self, sorted: &[u64], resolution: f64) -> Result<Vec<Vec<u64>>> {
        let index_of: HashMap<u64, usize> = sorted
            .iter()
            .enumerate()
            .map(|(i, &id)| (id, i))
            .collect();

        let mut subgraph = UnGraph::<(), ()>::new_undirected();
        let nodes: Vec<_> = sorted.iter().map(|_| subgraph.add_node(())).collect();
        for (i, &member) in sorted.iter().enumerate() {
            for &nbr in self.graph.neighbors(member) {
                if nbr <= member {
                    continue;
                }
                if let Some(&j) = index_of.get(&nbr) {
                    subgraph.add_edge(nodes[i], nodes[j], ());
                }
            }
        }

        if subgraph.edge_count() == 0 {
            return Err(Error::Unsplittable(
                "no internal edges among members".to_string(),
            ));
        }

        let labels = Louvain::new()
            .with_resolution(resolution)
            .with_seed(self.config.seed)
            .detect(&subgraph)?;

        let n_communities = labels.iter().copied().max().unwrap_or(0) + 1;
        let mut by_community: Vec<Vec<u64>> = vec![Vec::new(); n_communities];
        for (i, &label) in labels.iter().enumerate() {
            by_community[label].push(sorted[i]);
        }

        let mut groups = reassign_undersized(
            by_community,
            self.config.min_community_size,
            &self.graph,
        )?;

        if groups.len() <= 1 {
            return Err(Error::Unsplittable(
                "community detection found a single community".to_string(),
            ));
        }

        for group in &mut groups {
            group.sort_unstable();
        }
        groups.sort_by_key(|g| (std::cmp::Reverse(g.len()), g.first().copied()));

        debug!(
            members = sorted.len(),
            resolution,
            groups = groups.len(),
            "local expansion detected communities"
        );
        Ok(groups)
    }
}

impl std::fmt::Debug for LocalExpander {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalExpander")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

/// Dissolve communities below `min_size` and reattach each orphaned member
/// to whichever surviving community has the most edges to it.
///
/// Contract: ties break toward the lowest surviving community index (first
/// discovered); a member with no edges into any survivor lands in the
/// lowest-indexed survivor as well, since every count ties at zero.
pub(crate) fn reassign_undersized(
    by_community: Vec<Vec<u64>>,
    min_size: usize,
    graph: &FollowGraph,
) -> Result<Vec<Vec<u64>>> {
    let survivor_indices: Vec<usize> = by_community
        .iter()
        .enumerate()
        .filter(|(_, g)| g.len() >= min_size)
        .map(|(i, _)| i)
        .collect();

    if survivor_indices.is_empty() {
        return Err(Error::Unsplittable(
            "no communities above the minimum size".to_string(),
        ));
    }

    let mut membership: HashMap<u64, usize> = HashMap::new();
    for (slot, &community) in survivor_indices.iter().enumerate() {
        for &member in &by_community[community] {
            membership.insert(member, slot);
        }
    }

    let mut groups: Vec<Vec<u64>> = survivor_indices
        .iter()
        .map(|&i| by_community[i].clone())
        .collect();

    let mut orphans: Vec<u64> = by_community
        .iter()
        .enumerate()
        .filter(|(i, _)| !survivor_indices.contains(i))
        .flat_map(|(_, g)| g.iter().copied())
        .collect();
    orphans.sort_unstable();

    for orphan in orphans {
        let mut counts = vec![0usize; groups.len()];
        for &nbr in graph.neighbors(orphan) {
            if let Some(&slot) = membership.get(&nbr) {
                counts[slot] += 1;
            }
        }
        let best = counts
            .iter()
            .enumerate()
            .max_by_key(|&(slot, &c)| (c, std::cmp::Reverse(slot)))
            .map(|(slot, _)| slot)
            .unwrap_or(0);
        groups[best].push(orphan);
        membership.insert(orphan, best);
    }

    Ok(groups)
}

fn memo_key(sorted_members: &[u64], resolution: f64) -> u64 {
    let mut hasher = DefaultHasher::new();
    sorted_members.hash(&mut hasher);
    resolution.to_bits().hash(&mut hasher);
    hasher.finish()
}
