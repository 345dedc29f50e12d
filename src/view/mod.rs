//! Hierarchy views: the visible-set navigator, 2-D layout, and the record
//! types handed to the presentation layer.

mod builder;
mod layout;

pub use builder::{Navigator, NavigatorConfig, OpReport, Preview};
pub use layout::{cluster_edges, project_positions, ClusterEdge};

use std::collections::HashMap;

use parking_lot::Mutex;
use serde::Serialize;

/// Materialized view of one visible cluster.
#[derive(Debug, Clone, Serialize)]
pub struct ClusterRecord {
    /// Round-trippable cluster identifier.
    pub id: String,
    /// Underlying merge-tree node index; `None` for synthetic groups.
    pub node: Option<usize>,
    /// Parent cluster identifier, if any.
    pub parent: Option<String>,
    /// Child identifiers if this cluster has been split, else `None`.
    pub children: Option<Vec<String>>,
    /// Member accounts, sorted ascending.
    pub members: Vec<u64>,
    /// Member count.
    pub size: usize,
    /// Centroid in the embedding space.
    pub centroid: Vec<f64>,
    /// Human or automatic label, if one is set.
    pub label: Option<String>,
    /// Top members by follower count.
    pub representatives: Vec<u64>,
    /// Whether the designated ego account lives here.
    pub has_ego: bool,
    /// Whether this is a micro-cluster leaf of the merge tree.
    pub is_leaf: bool,
    /// 2-D layout position.
    pub position: [f64; 2],
}

/// A complete view of the currently visible clusters.
#[derive(Debug, Clone, Serialize)]
pub struct HierarchyView {
    /// Visible clusters, in frontier order.
    pub clusters: Vec<ClusterRecord>,
    /// Inter-cluster connectivity edges.
    pub edges: Vec<ClusterEdge>,
    /// Identifier of the cluster containing the ego account, if any.
    pub ego_cluster: Option<String>,
    /// Total accounts in the underlying graph.
    pub total_nodes: usize,
    /// Total micro-clusters (merge-tree leaves).
    pub micro_clusters: usize,
    /// How many more clusters may become visible under the budget.
    pub budget_remaining: usize,
}

/// One row of a paginated member listing.
#[derive(Debug, Clone, Serialize)]
pub struct MemberRecord {
    /// Account id.
    pub id: u64,
    /// Display handle.
    pub handle: String,
    /// Follower-count-like scalar.
    pub followers: u64,
}

/// External store for curated cluster labels.
///
/// The navigator only reads from and writes through to this; persistence
/// is the collaborator's concern.
pub trait LabelStore: Send + Sync {
    /// Label for a cluster id, if one is set.
    fn get(&self, id: &str) -> Option<String>;
    /// Set or replace the label for a cluster id.
    fn set(&self, id: &str, label: &str);
    /// Remove the label for a cluster id.
    fn clear(&self, id: &str);
}

/// In-memory label store for tests and single-process use.
#[derive(Debug, Default)]
pub struct MemoryLabelStore {
    labels: Mutex<HashMap<String, String>>,
}

impl MemoryLabelStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }
}

impl LabelStore for MemoryLabelStore {
    fn get(&self, id: &str) -> Option<String> {
        self.labels.lock().get(id).cloned()
    }

    fn set(&self, id: &str, label: &str) {
        self.labels.lock().insert(id.to_string(), label.to_string());
    }

    fn clear(&self, id: &str) {
        self.labels.lock().remove(id);
    }
}
