//! The visible-set navigator.
//!
//! State machine over a frontier of merge-tree nodes (plus synthetic
//! groups spliced in by local expansion). The frontier always partitions
//! the account universe exactly once, and its size never exceeds the
//! configured budget, transiently included: every mutation is checked
//! before it is committed, so a rejected operation leaves the visible set
//! untouched.

use std::collections::HashMap;
use std::sync::Arc;

use ndarray::Array2;
use tracing::{debug, info, warn};

use crate::error::{Error, Result};
use crate::expand::{
    should_use_local_expansion, CacheConfig, CacheStats, Expansion, ExpansionCache,
    ExpansionEngine, LocalExpandConfig, Precomputer, ScoreWeights, TagMap,
};
use crate::graph::{FollowGraph, MemberDirectory, MicroClusters};
use crate::tree::{ClusterId, MergeTree, SizeMemo};
use crate::view::layout::{cluster_edges, project_positions};
use crate::view::{ClusterRecord, HierarchyView, LabelStore, MemberRecord};

use serde::Serialize;

/// Tuning for the navigator.
#[derive(Debug, Clone)]
pub struct NavigatorConfig {
    /// Maximum simultaneously visible clusters.
    pub budget: usize,
    /// Cluster count for the initial granularity cut.
    pub initial_clusters: usize,
    /// Desired child count when a cluster is locally expanded.
    pub target_children: usize,
    /// Representative members surfaced per cluster record.
    pub representatives: usize,
    /// Connectivity multiplier for edges whose clusters share a dominant
    /// external community.
    pub partition_boost: f64,
    /// The designated ego account, if any.
    pub ego: Option<u64>,
}

impl Default for NavigatorConfig {
    fn default() -> Self {
        Self {
            budget: 40,
            initial_clusters: 12,
            target_children: 8,
            representatives: 3,
            partition_boost: 1.5,
            ego: None,
        }
    }
}

impl NavigatorConfig {
    /// Set the visible-cluster budget.
    pub fn with_budget(mut self, budget: usize) -> Self {
        self.budget = budget;
        self
    }

    /// Set the initial cluster count.
    pub fn with_initial_clusters(mut self, count: usize) -> Self {
        self.initial_clusters = count;
        self
    }

    /// Set the local-expansion child target.
    pub fn with_target_children(mut self, target: usize) -> Self {
        self.target_children = target;
        self
    }

    /// Set the ego account.
    pub fn with_ego(mut self, account: u64) -> Self {
        self.ego = Some(account);
        self
    }
}

/// Outcome of a committed navigation operation.
#[derive(Debug, Clone, Serialize)]
pub struct OpReport {
    /// Whether the visible set changed.
    pub changed: bool,
    /// Splits or merges committed.
    pub steps: usize,
    /// Visible-cluster count after the operation.
    pub visible_clusters: usize,
    /// Human-readable summary.
    pub reason: String,
}

/// What a prospective expand or collapse would do, without committing.
#[derive(Debug, Clone, Serialize)]
pub struct Preview {
    /// Visible-cluster count if the operation were committed.
    pub resulting_clusters: usize,
    /// Whether the operation would go through local expansion.
    pub uses_local_expansion: bool,
}

#[derive(Debug, Clone)]
enum VisibleEntry {
    Node(usize),
    Part {
        node: usize,
        slot: usize,
        members: Vec<u64>,
    },
}

impl VisibleEntry {
    fn id(&self) -> ClusterId {
        match *self {
            VisibleEntry::Node(node) => ClusterId::Node(node),
            VisibleEntry::Part { node, slot, .. } => ClusterId::Part { node, slot },
        }
    }

    /// Merge-tree node this entry lives under.
    fn anchor(&self) -> usize {
        match *self {
            VisibleEntry::Node(node) => node,
            VisibleEntry::Part { node, .. } => node,
        }
    }
}

enum SpliceKind {
    Direct,
    Local(usize),
}

/// Budget-bounded navigator over a merge tree.
pub struct Navigator {
    tree: Arc<MergeTree>,
    micro: Arc<MicroClusters>,
    graph: Arc<FollowGraph>,
    directory: Arc<MemberDirectory>,
    labels: Arc<dyn LabelStore>,
    engine: ExpansionEngine,
    config: NavigatorConfig,
    partition: Option<HashMap<u64, usize>>,
    visible: Vec<VisibleEntry>,
    expanded: HashMap<String, Vec<String>>,
}

impl Navigator {
    /// Create a navigator with an injected expansion cache and label store.
    ///
    /// The initial visible set is a granularity cut of the merge tree at
    /// `config.initial_clusters`, clamped to the budget.
    pub fn new(
        tree: Arc<MergeTree>,
        micro: Arc<MicroClusters>,
        graph: Arc<FollowGraph>,
        directory: Arc<MemberDirectory>,
        labels: Arc<dyn LabelStore>,
        cache: Arc<ExpansionCache>,
        config: NavigatorConfig,
    ) -> Result<Self> {
        if micro.count() != tree.n_leaves() {
            return Err(Error::DimensionMismatch {
                expected: tree.n_leaves(),
                found: micro.count(),
            });
        }
        if config.budget == 0 {
            return Err(Error::InvalidParameter {
                name: "budget",
                message: "at least one cluster must be visible",
            });
        }

        let engine = ExpansionEngine::new(
            Arc::clone(&graph),
            cache,
            LocalExpandConfig::default(),
            ScoreWeights::default(),
        );

        let mut memo = SizeMemo::new();
        let count = config.initial_clusters.clamp(1, config.budget);
        let visible = tree
            .cut_to_count(count, &mut memo)
            .into_iter()
            .map(VisibleEntry::Node)
            .collect();

        Ok(Self {
            tree,
            micro,
            graph,
            directory,
            labels,
            engine,
            config,
            partition: None,
            visible,
            expanded: HashMap::new(),
        })
    }

    /// Create a navigator with a default cache.
    pub fn with_defaults(
        tree: Arc<MergeTree>,
        micro: Arc<MicroClusters>,
        graph: Arc<FollowGraph>,
        directory: Arc<MemberDirectory>,
        labels: Arc<dyn LabelStore>,
    ) -> Result<Self> {
        let cache = Arc::new(ExpansionCache::new(CacheConfig::default()));
        Self::new(
            tree,
            micro,
            graph,
            directory,
            labels,
            cache,
            NavigatorConfig::default(),
        )
    }

    /// Supply external per-account tags for coherence scoring.
    pub fn with_tags(mut self, tags: TagMap) -> Self {
        self.engine = self.engine.with_tags(tags);
        self
    }

    /// Supply an external community partition for layout-edge boosting.
    pub fn with_partition(mut self, partition: HashMap<u64, usize>) -> Self {
        self.partition = Some(partition);
        self
    }

    /// Number of currently visible clusters.
    pub fn visible_count(&self) -> usize {
        self.visible.len()
    }

    /// Identifiers of the visible clusters, in frontier order.
    pub fn visible_ids(&self) -> Vec<String> {
        self.visible.iter().map(|e| e.id().encode()).collect()
    }

    /// Remaining headroom under the budget.
    pub fn budget_remaining(&self) -> usize {
        self.config.budget.saturating_sub(self.visible.len())
    }

    /// Expansion-cache counters.
    pub fn cache_stats(&self) -> CacheStats {
        self.engine.cache().stats()
    }

    /// Drop all cached expansions; required when the underlying graph or
    /// clustering is updated.
    pub fn invalidate_expansions(&self) {
        self.engine.invalidate_all();
    }

    /// Split one visible cluster.
    ///
    /// Uses the merge tree's direct children when they are usable, and
    /// local expansion (through the cache) when the node has no children
    /// or the trigger heuristic flags it as too coarse.
    pub fn expand(&mut self, id: &str) -> Result<OpReport> {
        let idx = self.visible_index(id)?;
        let kind = self.expand_at(idx, 0)?;
        let reason = match kind {
            SpliceKind::Direct => "replaced with merge children".to_string(),
            SpliceKind::Local(k) => format!("locally expanded into {k} groups"),
        };
        debug!(cluster = id, %reason, "expand committed");
        Ok(self.report(1, reason))
    }

    /// Collapse one visible cluster into its parent.
    ///
    /// Every visible cluster under the parent is replaced by the parent in
    /// one step; this is the only replacement that keeps the partition
    /// exact when the sibling has been split further or expanded locally.
    pub fn collapse(&mut self, id: &str) -> Result<OpReport> {
        let cluster = ClusterId::parse(id)?;
        self.visible_index(id)?;

        let parent = match cluster {
            ClusterId::Node(node) => self.tree.parent(node).ok_or(Error::InvalidParameter {
                name: "id",
                message: "the root has no parent to collapse into",
            })?,
            ClusterId::Part { node, .. } => node,
        };

        let covered: Vec<usize> = self
            .visible
            .iter()
            .enumerate()
            .filter(|(_, e)| self.tree.is_descendant(e.anchor(), parent))
            .map(|(i, _)| i)
            .collect();

        let covered_accounts: usize = covered
            .iter()
            .map(|&i| self.entry_size(&self.visible[i]))
            .sum();
        let expected = self.entry_size(&VisibleEntry::Node(parent));
        if covered_accounts != expected {
            warn!(
                cluster = id,
                covered_accounts, expected, "collapse would break the partition"
            );
            return Err(Error::InvariantViolation(format!(
                "collapsing {id} would cover {covered_accounts} of {expected} accounts under its parent"
            )));
        }

        let merged = covered.len();
        for &i in covered.iter().rev() {
            let removed = self.visible.remove(i);
            self.expanded.remove(&removed.id().encode());
        }
        let insert_at = covered.first().copied().unwrap_or(self.visible.len());
        self.visible.insert(insert_at, VisibleEntry::Node(parent));
        self.expanded.remove(&ClusterId::Node(parent).encode());

        let reason = format!("collapsed {merged} clusters into the parent");
        debug!(cluster = id, parent, %reason, "collapse committed");
        Ok(self.report(1, reason))
    }

    /// Split ancestors until the micro-cluster containing `account` is
    /// visible (or, inside a locally expanded region, its synthetic group).
    ///
    /// On budget exhaustion the error reports how many splits were
    /// committed; the visible set remains a valid partition.
    pub fn reveal(&mut self, account: u64) -> Result<OpReport> {
        let Some(target_leaf) = self.micro.micro_of(account) else {
            return Err(Error::InvalidIdentifier(format!(
                "account {account} has no micro-cluster assignment"
            )));
        };

        let mut steps = 0;
        loop {
            let idx = self.visible.iter().position(|e| match e {
                VisibleEntry::Node(node) => self.tree.is_descendant(target_leaf, *node),
                VisibleEntry::Part { members, .. } => members.binary_search(&account).is_ok(),
            });
            let Some(idx) = idx else {
                warn!(account, "no visible cluster covers the account");
                return Err(Error::InvariantViolation(format!(
                    "account {account} is not covered by any visible cluster"
                )));
            };

            match &self.visible[idx] {
                VisibleEntry::Node(node) if *node == target_leaf => break,
                VisibleEntry::Part { .. } => break,
                VisibleEntry::Node(_) => {
                    self.expand_at(idx, steps)?;
                    steps += 1;
                }
            }
        }

        let reason = format!("account {account} visible after {steps} splits");
        info!(account, steps, "reveal completed");
        Ok(OpReport {
            changed: steps > 0,
            steps,
            visible_clusters: self.visible.len(),
            reason,
        })
    }

    /// How a visible cluster would split, without committing anything.
    ///
    /// Returns the merge tree's direct children when they are usable, or
    /// the winning local-expansion candidate (computed through the cache,
    /// so a committed expand right after is served from it).
    pub fn expansion_for(&self, id: &str) -> Result<Expansion> {
        let idx = self.visible_index(id)?;
        match &self.visible[idx] {
            VisibleEntry::Part { .. } => Err(Error::Unsplittable(format!(
                "{id}: locally expanded clusters cannot be split further"
            ))),
            VisibleEntry::Node(node) => self.node_expansion(*node),
        }
    }

    /// What an expand would do, without committing it.
    pub fn preview_expand(&self, id: &str) -> Result<Preview> {
        match self.expansion_for(id)? {
            Expansion::DirectChildren(..) => Ok(Preview {
                resulting_clusters: self.visible.len() + 1,
                uses_local_expansion: false,
            }),
            Expansion::LocallyExpanded { groups, .. } => Ok(Preview {
                resulting_clusters: self.visible.len() + groups.len() - 1,
                uses_local_expansion: true,
            }),
        }
    }

    /// What a collapse would do, without committing it.
    pub fn preview_collapse(&self, id: &str) -> Result<Preview> {
        let cluster = ClusterId::parse(id)?;
        self.visible_index(id)?;
        let parent = match cluster {
            ClusterId::Node(node) => self.tree.parent(node).ok_or(Error::InvalidParameter {
                name: "id",
                message: "the root has no parent to collapse into",
            })?,
            ClusterId::Part { node, .. } => node,
        };
        let covered = self
            .visible
            .iter()
            .filter(|e| self.tree.is_descendant(e.anchor(), parent))
            .count();
        Ok(Preview {
            resulting_clusters: self.visible.len() - covered + 1,
            uses_local_expansion: false,
        })
    }

    /// Paginated member listing for one visible cluster, ordered by
    /// follower count descending, then account id.
    pub fn members(&self, id: &str, limit: usize, offset: usize) -> Result<Vec<MemberRecord>> {
        let idx = self.visible_index(id)?;
        let accounts = self.entry_accounts(&self.visible[idx]);
        let mut rows: Vec<MemberRecord> = accounts
            .into_iter()
            .map(|account| match self.directory.get(&account) {
                Some(info) => MemberRecord {
                    id: account,
                    handle: info.handle.clone(),
                    followers: info.followers,
                },
                None => MemberRecord {
                    id: account,
                    handle: account.to_string(),
                    followers: 0,
                },
            })
            .collect();
        rows.sort_by_key(|r| (std::cmp::Reverse(r.followers), r.id));
        Ok(rows.into_iter().skip(offset).take(limit).collect())
    }

    /// Set a curated label, written through to the injected store.
    pub fn set_label(&self, id: &str, label: &str) -> Result<()> {
        self.visible_index(id)?;
        self.labels.set(id, label);
        Ok(())
    }

    /// Clear a curated label.
    pub fn clear_label(&self, id: &str) -> Result<()> {
        self.visible_index(id)?;
        self.labels.clear(id);
        Ok(())
    }

    /// Queue likely-next expansions (clusters the heuristic flags, and
    /// leaves with enough members) for background precomputation, larger
    /// clusters first. Returns how many requests were accepted.
    pub fn queue_precompute(&self, precomputer: &Precomputer) -> usize {
        let mut accepted = 0;
        for entry in &self.visible {
            let VisibleEntry::Node(node) = entry else {
                continue;
            };
            let node = *node;
            if self.tree.children(node).is_some() && !self.local_trigger(node) {
                continue;
            }
            let accounts = self.node_accounts(node);
            let priority = i32::try_from(accounts.len()).unwrap_or(i32::MAX);
            if precomputer.enqueue(ClusterId::Node(node).encode(), accounts, priority) {
                accepted += 1;
            }
        }
        accepted
    }

    /// Drain a precompute queue through this navigator's engine.
    pub fn precompute_drain(&self, precomputer: &Precomputer) -> usize {
        let target = self.config.target_children;
        precomputer.drain(|id, members| self.engine.ranked(id, members, target).is_ok())
    }

    /// Materialize the current visible set into a full hierarchy view.
    pub fn build(&self) -> HierarchyView {
        let entries: Vec<(String, Vec<u64>)> = self
            .visible
            .iter()
            .map(|e| (e.id().encode(), self.entry_accounts(e)))
            .collect();

        let dim = self.micro.dim();
        let centroids: Vec<Vec<f64>> = self
            .visible
            .iter()
            .map(|e| self.entry_centroid(e))
            .collect();
        let flat: Vec<f64> = centroids.iter().flatten().copied().collect();
        let matrix = Array2::from_shape_vec((entries.len(), dim), flat)
            .unwrap_or_else(|_| Array2::zeros((entries.len(), dim)));
        let positions = project_positions(&matrix);

        let ego_leaf = self.config.ego.and_then(|a| self.micro.micro_of(a));
        let mut ego_cluster = None;

        let clusters: Vec<ClusterRecord> = self
            .visible
            .iter()
            .zip(entries.iter())
            .enumerate()
            .map(|(i, (entry, (id, accounts)))| {
                let has_ego = match (entry, self.config.ego, ego_leaf) {
                    (VisibleEntry::Node(node), _, Some(leaf)) => {
                        self.tree.is_descendant(leaf, *node)
                    }
                    (VisibleEntry::Part { members, .. }, Some(account), _) => {
                        members.binary_search(&account).is_ok()
                    }
                    _ => false,
                };
                if has_ego {
                    ego_cluster = Some(id.clone());
                }

                let (node, parent, is_leaf) = match entry {
                    VisibleEntry::Node(n) => (
                        Some(*n),
                        self.tree.parent(*n).map(|p| ClusterId::Node(p).encode()),
                        self.tree.is_leaf(*n),
                    ),
                    VisibleEntry::Part { node, .. } => {
                        (None, Some(ClusterId::Node(*node).encode()), false)
                    }
                };

                let mut representatives: Vec<u64> = accounts.clone();
                representatives.sort_by_key(|a| {
                    (
                        std::cmp::Reverse(
                            self.directory.get(a).map(|m| m.followers).unwrap_or(0),
                        ),
                        *a,
                    )
                });
                representatives.truncate(self.config.representatives);

                ClusterRecord {
                    id: id.clone(),
                    node,
                    parent,
                    children: self.expanded.get(id).cloned(),
                    size: accounts.len(),
                    members: accounts.clone(),
                    centroid: centroids[i].clone(),
                    label: self.labels.get(id),
                    representatives,
                    has_ego,
                    is_leaf,
                    position: positions.get(i).copied().unwrap_or([0.0, 0.0]),
                }
            })
            .collect();

        let edges = cluster_edges(
            &entries,
            &self.graph,
            self.partition.as_ref(),
            self.config.partition_boost,
        );

        info!(
            clusters = clusters.len(),
            edges = edges.len(),
            "hierarchy view built"
        );

        HierarchyView {
            clusters,
            edges,
            ego_cluster,
            total_nodes: self.micro.total_accounts(),
            micro_clusters: self.micro.count(),
            budget_remaining: self.budget_remaining(),
        }
    }

    /// Check the partition invariant: every assigned account is covered by
    /// exactly one visible cluster.
    pub fn validate_partition(&self) -> Result<()> {
        let mut seen = std::collections::HashSet::new();
        for entry in &self.visible {
            for account in self.entry_accounts(entry) {
                if !seen.insert(account) {
                    return Err(Error::InvariantViolation(format!(
                        "account {account} is covered twice"
                    )));
                }
            }
        }
        if seen.len() != self.micro.total_accounts() {
            return Err(Error::InvariantViolation(format!(
                "{} of {} accounts covered",
                seen.len(),
                self.micro.total_accounts()
            )));
        }
        Ok(())
    }

    fn report(&self, steps: usize, reason: String) -> OpReport {
        OpReport {
            changed: true,
            steps,
            visible_clusters: self.visible.len(),
            reason,
        }
    }

    fn visible_index(&self, id: &str) -> Result<usize> {
        let cluster = ClusterId::parse(id)?;
        self.visible
            .iter()
            .position(|e| e.id() == cluster)
            .ok_or_else(|| Error::UnknownCluster(id.to_string()))
    }

    fn local_trigger(&self, node: usize) -> bool {
        let micro_span = self.tree.subtree_leaves(node).len();
        let size = self.node_account_count(node);
        should_use_local_expansion(
            size,
            self.micro.total_accounts(),
            self.micro.count(),
            micro_span,
            self.engine.config(),
        )
    }

    fn node_accounts(&self, node: usize) -> Vec<u64> {
        let mut accounts: Vec<u64> = self
            .tree
            .subtree_leaves(node)
            .into_iter()
            .flat_map(|leaf| self.micro.members(leaf).iter().copied())
            .collect();
        accounts.sort_unstable();
        accounts
    }

    fn node_account_count(&self, node: usize) -> usize {
        self.tree
            .subtree_leaves(node)
            .into_iter()
            .map(|leaf| self.micro.members(leaf).len())
            .sum()
    }

    fn entry_accounts(&self, entry: &VisibleEntry) -> Vec<u64> {
        match entry {
            VisibleEntry::Node(node) => self.node_accounts(*node),
            VisibleEntry::Part { members, .. } => members.clone(),
        }
    }

    fn entry_size(&self, entry: &VisibleEntry) -> usize {
        match entry {
            VisibleEntry::Node(node) => self.node_account_count(*node),
            VisibleEntry::Part { members, .. } => members.len(),
        }
    }

    fn entry_centroid(&self, entry: &VisibleEntry) -> Vec<f64> {
        let dim = self.micro.dim();
        let mut acc = vec![0.0; dim];
        let mut weight = 0.0;

        match entry {
            VisibleEntry::Node(node) => {
                for leaf in self.tree.subtree_leaves(*node) {
                    let w = self.micro.members(leaf).len().max(1) as f64;
                    let centroid = self.micro.centroid(leaf);
                    for (slot, &x) in acc.iter_mut().zip(centroid.iter()) {
                        *slot += w * x;
                    }
                    weight += w;
                }
            }
            VisibleEntry::Part { members, .. } => {
                let mut per_micro: HashMap<usize, usize> = HashMap::new();
                for &m in members {
                    if let Some(micro) = self.micro.micro_of(m) {
                        *per_micro.entry(micro).or_insert(0) += 1;
                    }
                }
                for (micro, count) in per_micro {
                    let w = count as f64;
                    let centroid = self.micro.centroid(micro);
                    for (slot, &x) in acc.iter_mut().zip(centroid.iter()) {
                        *slot += w * x;
                    }
                    weight += w;
                }
            }
        }

        if weight > 0.0 {
            for slot in &mut acc {
                *slot /= weight;
            }
        }
        acc
    }

    /// Decide how a merge-tree node splits: direct children when they are
    /// usable, otherwise the best local-expansion candidate, falling back
    /// to the children when local expansion fails.
    fn node_expansion(&self, node: usize) -> Result<Expansion> {
        let children = self.tree.children(node);
        if let Some((left, right)) = children {
            if !self.local_trigger(node) {
                return Ok(Expansion::DirectChildren(left, right));
            }
        }

        let accounts = self.node_accounts(node);
        let id = ClusterId::Node(node).encode();
        let ranked = self
            .engine
            .ranked(&id, &accounts, self.config.target_children);
        let candidate = match &ranked {
            Ok(entry) => entry
                .best()
                .filter(|s| s.groups.len() >= 2)
                .map(|s| (s.groups.clone(), s.score.clone())),
            Err(_) => None,
        };

        match (candidate, children) {
            (Some((groups, score)), _) => Ok(Expansion::LocallyExpanded { groups, score }),
            (None, Some((left, right))) => Ok(Expansion::DirectChildren(left, right)),
            (None, None) => Err(match ranked {
                Err(e) => contextualize(e, &id),
                Ok(_) => {
                    Error::Unsplittable(format!("{id}: no candidate split produced two groups"))
                }
            }),
        }
    }

    /// Split the entry at `idx`, committing only if the budget allows.
    ///
    /// `completed` is threaded through so multi-step callers (reveal) can
    /// report partial progress on budget exhaustion.
    fn expand_at(&mut self, idx: usize, completed: usize) -> Result<SpliceKind> {
        let entry = self.visible[idx].clone();
        let node = match entry {
            VisibleEntry::Part { .. } => {
                return Err(Error::Unsplittable(format!(
                    "{}: locally expanded clusters cannot be split further",
                    entry.id()
                )))
            }
            VisibleEntry::Node(node) => node,
        };

        match self.node_expansion(node)? {
            Expansion::DirectChildren(left, right) => {
                self.splice_direct(idx, node, left, right, completed)
            }
            Expansion::LocallyExpanded { groups, .. } => {
                let k = groups.len();
                if self.visible.len() + k - 1 > self.config.budget {
                    // A two-way direct split may still fit.
                    if let Some((left, right)) = self.tree.children(node) {
                        return self.splice_direct(idx, node, left, right, completed);
                    }
                    return Err(Error::BudgetExhausted {
                        completed,
                        budget: self.config.budget,
                    });
                }
                let parts: Vec<VisibleEntry> = groups
                    .into_iter()
                    .enumerate()
                    .map(|(slot, members)| VisibleEntry::Part {
                        node,
                        slot,
                        members,
                    })
                    .collect();
                let child_ids = parts.iter().map(|p| p.id().encode()).collect();
                self.visible.splice(idx..=idx, parts);
                self.expanded
                    .insert(ClusterId::Node(node).encode(), child_ids);
                Ok(SpliceKind::Local(k))
            }
        }
    }

    fn splice_direct(
        &mut self,
        idx: usize,
        node: usize,
        left: usize,
        right: usize,
        completed: usize,
    ) -> Result<SpliceKind> {
        if self.visible.len() + 1 > self.config.budget {
            return Err(Error::BudgetExhausted {
                completed,
                budget: self.config.budget,
            });
        }
        let child_ids = vec![
            ClusterId::Node(left).encode(),
            ClusterId::Node(right).encode(),
        ];
        self.visible.splice(
            idx..=idx,
            [VisibleEntry::Node(left), VisibleEntry::Node(right)],
        );
        self.expanded
            .insert(ClusterId::Node(node).encode(), child_ids);
        Ok(SpliceKind::Direct)
    }
}

impl std::fmt::Debug for Navigator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Navigator")
            .field("visible", &self.visible.len())
            .field("budget", &self.config.budget)
            .finish_non_exhaustive()
    }
}

fn contextualize(error: Error, id: &str) -> Error {
    match error {
        Error::Unsplittable(reason) => Error::Unsplittable(format!("{id}: {reason}")),
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::MemberInfo;
    use crate::tree::MergeStep;
    use crate::view::MemoryLabelStore;
    use ndarray::array;

    fn clique(base: u64, size: u64, edges: &mut Vec<(u64, u64)>) {
        for i in 0..size {
            for j in i + 1..size {
                edges.push((base + i, base + j));
            }
        }
    }

    /// Four micro-clusters of two accounts each over the balanced 4-leaf
    /// tree. Eight accounts total, so local expansion always falls back to
    /// the merge children (below the 10-member minimum).
    fn fixture_cfg(config: NavigatorConfig) -> (Navigator, Arc<ExpansionCache>) {
        let tree = Arc::new(
            MergeTree::new(
                4,
                vec![
                    MergeStep::new(0, 1, 1.0),
                    MergeStep::new(2, 3, 1.5),
                    MergeStep::new(4, 5, 2.0),
                ],
            )
            .unwrap(),
        );
        let members = vec![vec![0, 1], vec![10, 11], vec![20, 21], vec![30, 31]];
        let micro = Arc::new(
            MicroClusters::new(
                members.clone(),
                array![[0.0, 0.0], [0.5, 0.0], [5.0, 5.0], [5.5, 5.0]],
            )
            .unwrap(),
        );
        let edges = vec![
            (0, 1),
            (10, 11),
            (20, 21),
            (30, 31),
            (1, 10),
            (21, 30),
            (11, 20),
        ];
        let graph = Arc::new(FollowGraph::from_edges(edges));
        let directory: MemberDirectory = members
            .iter()
            .flatten()
            .map(|&id| {
                (
                    id,
                    MemberInfo {
                        handle: format!("user{id}"),
                        followers: 1000 - id,
                    },
                )
            })
            .collect();
        let cache = Arc::new(ExpansionCache::new(CacheConfig::default()));
        let nav = Navigator::new(
            tree,
            micro,
            graph,
            Arc::new(directory),
            Arc::new(MemoryLabelStore::new()),
            Arc::clone(&cache),
            config,
        )
        .unwrap();
        (nav, cache)
    }

    fn fixture(initial: usize, budget: usize) -> (Navigator, Arc<ExpansionCache>) {
        fixture_cfg(
            NavigatorConfig::default()
                .with_budget(budget)
                .with_initial_clusters(initial),
        )
    }

    /// Two micro-clusters: a 12-account mega-leaf made of two bridged
    /// cliques, and a 2-account leaf. Forces the local-expansion path.
    fn mega_fixture(budget: usize) -> (Navigator, Arc<ExpansionCache>) {
        let tree = Arc::new(MergeTree::new(2, vec![MergeStep::new(0, 1, 1.0)]).unwrap());
        let leaf0: Vec<u64> = (0..6).chain(100..106).collect();
        let micro = Arc::new(
            MicroClusters::new(
                vec![leaf0, vec![200, 201]],
                array![[0.0, 0.0], [9.0, 9.0]],
            )
            .unwrap(),
        );
        let mut edges = Vec::new();
        clique(0, 6, &mut edges);
        clique(100, 6, &mut edges);
        edges.push((5, 100));
        edges.push((200, 201));
        let graph = Arc::new(FollowGraph::from_edges(edges));
        let cache = Arc::new(ExpansionCache::new(CacheConfig::default()));
        let nav = Navigator::new(
            tree,
            micro,
            graph,
            Arc::new(MemberDirectory::new()),
            Arc::new(MemoryLabelStore::new()),
            Arc::clone(&cache),
            NavigatorConfig::default()
                .with_budget(budget)
                .with_initial_clusters(2),
        )
        .unwrap();
        (nav, cache)
    }

    #[test]
    fn initial_cut_partitions_the_leaves() {
        let (nav, _) = fixture(2, 10);
        assert_eq!(nav.visible_ids(), vec!["c4", "c5"]);
        assert_eq!(nav.budget_remaining(), 8);
        nav.validate_partition().unwrap();
    }

    #[test]
    fn expanding_the_root_yields_the_two_pair_subtrees() {
        let (mut nav, _) = fixture(1, 10);
        assert_eq!(nav.visible_ids(), vec!["c6"]);

        let report = nav.expand("c6").unwrap();
        assert!(report.changed);
        assert_eq!(nav.visible_ids(), vec!["c4", "c5"]);
        nav.validate_partition().unwrap();

        let view = nav.build();
        assert_eq!(view.clusters.len(), 2);
        assert_eq!(view.clusters[0].members, vec![0, 1, 10, 11]);
        assert_eq!(view.clusters[1].members, vec![20, 21, 30, 31]);
        assert_eq!(view.clusters[0].size, 4);
    }

    #[test]
    fn reveal_from_the_root_takes_two_steps() {
        let (mut nav, _) = fixture(1, 10);
        let report = nav.reveal(0).unwrap();
        assert_eq!(report.steps, 2);
        assert!(report.changed);
        assert_eq!(nav.visible_ids(), vec!["c0", "c1", "c5"]);
        nav.validate_partition().unwrap();

        // Revealing an already visible account is a no-op.
        let report = nav.reveal(0).unwrap();
        assert_eq!(report.steps, 0);
        assert!(!report.changed);
    }

    #[test]
    fn rejected_expand_leaves_the_set_unchanged() {
        let (mut nav, _) = fixture(2, 2);
        let err = nav.expand("c4").unwrap_err();
        assert_eq!(
            err,
            Error::BudgetExhausted {
                completed: 0,
                budget: 2
            }
        );
        assert_eq!(nav.visible_ids(), vec!["c4", "c5"]);
        nav.validate_partition().unwrap();
    }

    #[test]
    fn reveal_reports_partial_progress_on_budget_exhaustion() {
        let (mut nav, _) = fixture(1, 2);
        let err = nav.reveal(0).unwrap_err();
        assert_eq!(
            err,
            Error::BudgetExhausted {
                completed: 1,
                budget: 2
            }
        );
        // The committed first split is kept and the partition still holds.
        assert_eq!(nav.visible_ids(), vec!["c4", "c5"]);
        nav.validate_partition().unwrap();
    }

    #[test]
    fn collapse_merges_the_frontier_into_the_parent() {
        let (mut nav, _) = fixture(1, 10);
        nav.expand("c6").unwrap();
        let report = nav.collapse("c4").unwrap();
        assert!(report.changed);
        assert_eq!(nav.visible_ids(), vec!["c6"]);
        nav.validate_partition().unwrap();
    }

    #[test]
    fn collapse_with_a_hidden_sibling_rejoins_the_frontier() {
        let (mut nav, _) = fixture(1, 10);
        nav.expand("c6").unwrap();
        nav.expand("c4").unwrap();
        assert_eq!(nav.visible_ids(), vec!["c0", "c1", "c5"]);

        // c0's sibling c1 is visible but their parent's other side is not;
        // collapsing c0 pulls the whole frontier under c4 together.
        nav.collapse("c0").unwrap();
        assert_eq!(nav.visible_ids(), vec!["c4", "c5"]);
        nav.validate_partition().unwrap();
    }

    #[test]
    fn collapsing_the_root_is_rejected() {
        let (mut nav, _) = fixture(1, 10);
        let err = nav.collapse("c6").unwrap_err();
        assert!(matches!(err, Error::InvalidParameter { .. }));
    }

    #[test]
    fn identifier_errors_are_distinguished() {
        let (mut nav, _) = fixture(2, 10);
        assert!(matches!(
            nav.expand("zzz").unwrap_err(),
            Error::InvalidIdentifier(_)
        ));
        assert!(matches!(
            nav.expand("c3").unwrap_err(),
            Error::UnknownCluster(_)
        ));
        assert!(matches!(
            nav.reveal(999).unwrap_err(),
            Error::InvalidIdentifier(_)
        ));
    }

    #[test]
    fn member_listing_is_paginated_by_followers() {
        let (nav, _) = fixture(2, 10);
        let page = nav.members("c4", 2, 0).unwrap();
        assert_eq!(page.iter().map(|m| m.id).collect::<Vec<_>>(), vec![0, 1]);
        assert_eq!(page[0].handle, "user0");
        assert_eq!(page[0].followers, 1000);

        let page = nav.members("c4", 2, 2).unwrap();
        assert_eq!(page.iter().map(|m| m.id).collect::<Vec<_>>(), vec![10, 11]);

        assert!(nav.members("c4", 10, 4).unwrap().is_empty());
    }

    #[test]
    fn labels_write_through_the_injected_store() {
        let (nav, _) = fixture(2, 10);
        nav.set_label("c4", "painters").unwrap();
        let view = nav.build();
        assert_eq!(view.clusters[0].label.as_deref(), Some("painters"));

        nav.clear_label("c4").unwrap();
        assert!(nav.build().clusters[0].label.is_none());

        assert!(matches!(
            nav.set_label("c0", "hidden").unwrap_err(),
            Error::UnknownCluster(_)
        ));
    }

    #[test]
    fn ego_cluster_is_flagged() {
        let (nav, _) = fixture_cfg(
            NavigatorConfig::default()
                .with_budget(10)
                .with_initial_clusters(2)
                .with_ego(11),
        );
        let view = nav.build();
        assert_eq!(view.ego_cluster.as_deref(), Some("c4"));
        assert!(view.clusters[0].has_ego);
        assert!(!view.clusters[1].has_ego);
    }

    #[test]
    fn view_reports_totals_edges_and_positions() {
        let (nav, _) = fixture(2, 10);
        let view = nav.build();
        assert_eq!(view.total_nodes, 8);
        assert_eq!(view.micro_clusters, 4);
        assert_eq!(view.budget_remaining, 8);

        // Exactly one follow edge crosses the two pair-subtrees.
        assert_eq!(view.edges.len(), 1);
        assert_eq!(view.edges[0].count, 1);
        assert!((view.edges[0].connectivity - 0.25).abs() < 1e-9);

        let x0 = view.clusters[0].position[0];
        let x1 = view.clusters[1].position[0];
        assert!((x0 - x1).abs() > 1.0);
    }

    #[test]
    fn previews_do_not_commit() {
        let (mut nav, _) = fixture(2, 10);
        let preview = nav.preview_expand("c4").unwrap();
        assert_eq!(preview.resulting_clusters, 3);
        assert!(!preview.uses_local_expansion);
        assert_eq!(nav.visible_count(), 2);

        nav.expand("c4").unwrap();
        let preview = nav.preview_collapse("c0").unwrap();
        assert_eq!(preview.resulting_clusters, 2);
        assert_eq!(nav.visible_count(), 3);
    }

    #[test]
    fn local_expansion_splices_synthetic_children() {
        let (mut nav, _) = mega_fixture(10);
        assert_eq!(nav.visible_ids(), vec!["c0", "c1"]);

        let report = nav.expand("c0").unwrap();
        assert!(report.reason.contains("locally expanded"));
        assert_eq!(nav.visible_ids(), vec!["c0.p0", "c0.p1", "c1"]);
        nav.validate_partition().unwrap();

        let view = nav.build();
        let p0 = &view.clusters[0];
        assert_eq!(p0.node, None);
        assert_eq!(p0.parent.as_deref(), Some("c0"));
        assert!(!p0.is_leaf);
        assert_eq!(p0.members, (0..6).collect::<Vec<u64>>());
        assert_eq!(view.clusters[1].members, (100..106).collect::<Vec<u64>>());

        // Synthetic groups have no finer structure to offer.
        assert!(matches!(
            nav.expand("c0.p0").unwrap_err(),
            Error::Unsplittable(_)
        ));

        nav.collapse("c0.p1").unwrap();
        assert_eq!(nav.visible_ids(), vec!["c0", "c1"]);
        nav.validate_partition().unwrap();
    }

    #[test]
    fn reexpanding_a_collapsed_cluster_hits_the_cache() {
        let (mut nav, cache) = mega_fixture(10);
        nav.expand("c0").unwrap();
        let first = cache.get("c0").unwrap();
        nav.collapse("c0.p0").unwrap();

        let hits_before = cache.stats().hits;
        nav.expand("c0").unwrap();
        assert!(cache.stats().hits > hits_before);

        let second = cache.get("c0").unwrap();
        assert_eq!(first.ranked.len(), second.ranked.len());
        for (a, b) in first.ranked.iter().zip(&second.ranked) {
            assert_eq!(a.groups, b.groups);
        }
    }

    #[test]
    fn precompute_fills_the_cache_ahead_of_expansion() {
        let (mut nav, cache) = mega_fixture(10);
        let precomputer = Precomputer::new(Arc::clone(&cache));

        let accepted = nav.queue_precompute(&precomputer);
        assert_eq!(accepted, 2);
        let computed = nav.precompute_drain(&precomputer);
        assert_eq!(computed, 1); // c1 is too small to expand

        let hits_before = cache.stats().hits;
        nav.expand("c0").unwrap();
        assert!(cache.stats().hits > hits_before);
    }

    #[test]
    fn unsplittable_leaf_keeps_the_cluster_intact() {
        let (mut nav, _) = mega_fixture(10);
        let err = nav.expand("c1").unwrap_err();
        assert!(matches!(err, Error::Unsplittable(_)));
        assert_eq!(nav.visible_ids(), vec!["c0", "c1"]);
        nav.validate_partition().unwrap();
    }

    #[test]
    fn expansion_for_reports_both_variants() {
        let (nav, _) = fixture(2, 10);
        match nav.expansion_for("c4").unwrap() {
            Expansion::DirectChildren(left, right) => assert_eq!((left, right), (0, 1)),
            other => panic!("expected direct children, got {other:?}"),
        }

        let (nav, _) = mega_fixture(10);
        match nav.expansion_for("c0").unwrap() {
            Expansion::LocallyExpanded { groups, score } => {
                assert_eq!(groups.len(), 2);
                assert!(score.edge_separation > 0.9);
            }
            other => panic!("expected local expansion, got {other:?}"),
        }
    }

    #[test]
    fn navigates_a_kodama_built_tree() {
        use kodama::{linkage, Method};

        let points: Vec<f64> = vec![0.0, 1.0, 2.0, 3.0, 10.0, 11.0, 12.0, 13.0];
        let n = points.len();
        let mut condensed = Vec::new();
        for i in 0..n {
            for j in i + 1..n {
                condensed.push((points[i] - points[j]).abs());
            }
        }
        let dendrogram = linkage(&mut condensed, n, Method::Average);
        let steps: Vec<MergeStep> = dendrogram
            .steps()
            .iter()
            .map(|s| MergeStep::new(s.cluster1, s.cluster2, s.dissimilarity))
            .collect();
        let tree = Arc::new(MergeTree::new(n, steps).unwrap());

        let members: Vec<Vec<u64>> = (0..n as u64).map(|i| vec![i]).collect();
        let centroids = Array2::from_shape_vec((n, 1), points).unwrap();
        let micro = Arc::new(MicroClusters::new(members, centroids).unwrap());
        let graph = Arc::new(FollowGraph::from_edges(
            (0..n as u64 - 1).map(|i| (i, i + 1)),
        ));
        let nav = Navigator::new(
            tree,
            micro,
            graph,
            Arc::new(MemberDirectory::new()),
            Arc::new(MemoryLabelStore::new()),
            Arc::new(ExpansionCache::new(CacheConfig::default())),
            NavigatorConfig::default()
                .with_budget(8)
                .with_initial_clusters(2),
        )
        .unwrap();

        nav.validate_partition().unwrap();
        let view = nav.build();
        assert_eq!(view.clusters.len(), 2);
        let mut sides: Vec<Vec<u64>> = view.clusters.iter().map(|c| c.members.clone()).collect();
        sides.sort();
        assert_eq!(sides, vec![vec![0, 1, 2, 3], vec![4, 5, 6, 7]]);
    }
}
