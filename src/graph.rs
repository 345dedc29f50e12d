//! Read-only inputs from the offline clustering pipeline: the follow-graph
//! adjacency snapshot, the member directory, and the micro-cluster
//! assignment with its centroid matrix.
//!
//! Everything here is immutable for the lifetime of a navigation session;
//! when the underlying graph changes, callers rebuild these and invalidate
//! every expansion cache (stale candidate splits reference stale members).

use std::collections::HashMap;

use ndarray::{Array2, ArrayView1};
use serde::Serialize;

use crate::error::{Error, Result};

/// A symmetric adjacency snapshot over raw account ids.
///
/// Neighbor lists are sorted and deduplicated at construction so traversal
/// order is deterministic.
#[derive(Debug, Clone, Default)]
pub struct FollowGraph {
    adj: HashMap<u64, Vec<u64>>,
    ids: Vec<u64>,
    n_edges: usize,
}

impl FollowGraph {
    /// Build from an edge list. Direction and duplicates are discarded;
    /// self-loops are dropped.
    pub fn from_edges(edges: impl IntoIterator<Item = (u64, u64)>) -> Self {
        let mut adj: HashMap<u64, Vec<u64>> = HashMap::new();
        for (a, b) in edges {
            if a == b {
                continue;
            }
            adj.entry(a).or_default().push(b);
            adj.entry(b).or_default().push(a);
        }
        let mut n_edges = 0;
        for list in adj.values_mut() {
            list.sort_unstable();
            list.dedup();
            n_edges += list.len();
        }
        let mut ids: Vec<u64> = adj.keys().copied().collect();
        ids.sort_unstable();
        Self {
            adj,
            ids,
            n_edges: n_edges / 2,
        }
    }

    /// Neighbors of `id`, empty for unknown accounts.
    pub fn neighbors(&self, id: u64) -> &[u64] {
        self.adj.get(&id).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Degree of `id`.
    pub fn degree(&self, id: u64) -> usize {
        self.neighbors(id).len()
    }

    /// Number of accounts with at least one edge.
    pub fn node_count(&self) -> usize {
        self.ids.len()
    }

    /// Number of undirected edges.
    pub fn edge_count(&self) -> usize {
        self.n_edges
    }

    /// Visit every undirected edge exactly once, in ascending `(a, b)` order.
    pub fn for_each_edge(&self, mut f: impl FnMut(u64, u64)) {
        for &a in &self.ids {
            for &b in self.neighbors(a) {
                if b > a {
                    f(a, b);
                }
            }
        }
    }
}

/// Display metadata for one account.
#[derive(Debug, Clone, Serialize)]
pub struct MemberInfo {
    /// Display handle.
    pub handle: String,
    /// Follower-count-like scalar used for ranking representatives.
    pub followers: u64,
}

/// Lookup from account id to display metadata.
pub type MemberDirectory = HashMap<u64, MemberInfo>;

/// Micro-cluster assignment: per-leaf member lists and a centroid per leaf.
///
/// Merge-tree leaves correspond one-to-one with micro-clusters; many raw
/// accounts share one leaf.
#[derive(Debug, Clone)]
pub struct MicroClusters {
    members: Vec<Vec<u64>>,
    centroids: Array2<f64>,
    micro_of: HashMap<u64, usize>,
}

impl MicroClusters {
    /// Build from per-micro member lists and a row-per-micro centroid matrix.
    pub fn new(members: Vec<Vec<u64>>, centroids: Array2<f64>) -> Result<Self> {
        if members.is_empty() {
            return Err(Error::EmptyInput);
        }
        if centroids.nrows() != members.len() {
            return Err(Error::DimensionMismatch {
                expected: members.len(),
                found: centroids.nrows(),
            });
        }
        let mut micro_of = HashMap::new();
        let mut members = members;
        for (micro, list) in members.iter_mut().enumerate() {
            list.sort_unstable();
            list.dedup();
            for &account in list.iter() {
                micro_of.insert(account, micro);
            }
        }
        Ok(Self {
            members,
            centroids,
            micro_of,
        })
    }

    /// Number of micro-clusters.
    pub fn count(&self) -> usize {
        self.members.len()
    }

    /// Dimensionality of the centroid space.
    pub fn dim(&self) -> usize {
        self.centroids.ncols()
    }

    /// Accounts assigned to micro-cluster `micro`, sorted ascending.
    pub fn members(&self, micro: usize) -> &[u64] {
        self.members.get(micro).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Centroid row for micro-cluster `micro`.
    pub fn centroid(&self, micro: usize) -> ArrayView1<'_, f64> {
        self.centroids.row(micro)
    }

    /// Micro-cluster of `account`, if assigned.
    pub fn micro_of(&self, account: u64) -> Option<usize> {
        self.micro_of.get(&account).copied()
    }

    /// Total number of assigned accounts.
    pub fn total_accounts(&self) -> usize {
        self.micro_of.len()
    }
}
