//! Seeded, deterministic Louvain modularity optimization.
//!
//! Multi-level greedy scheme (Blondel et al. 2008): repeatedly move nodes
//! to the neighboring community with the highest modularity gain, then
//! contract communities into a meta-graph and repeat until modularity stops
//! improving.
//!
//! Unlike textbook formulations, every step here is pinned: the node visit
//! order is a seeded shuffle fixed per run, candidate communities are
//! scanned in ascending id order, and a gain tie keeps the candidate with
//! the lowest community id. Two calls on the same graph with the same seed
//! return identical labellings, which the expansion caches rely on.

use std::collections::HashMap;

use petgraph::graph::UnGraph;
use petgraph::visit::EdgeRef;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;

use super::traits::CommunityDetection;
use crate::error::{Error, Result};

/// Louvain community detection with pinned tie-breaking.
#[derive(Debug, Clone)]
pub struct Louvain {
    /// Resolution parameter (gamma). Higher values produce smaller communities.
    resolution: f64,
    /// Maximum move sweeps per level.
    max_iter: usize,
    /// Maximum levels of aggregation.
    max_levels: usize,
    /// Minimum modularity improvement to continue aggregating.
    min_gain: f64,
    /// Seed for the node visit order.
    seed: u64,
}

impl Louvain {
    /// Create a detector with default settings.
    pub fn new() -> Self {
        Self {
            resolution: 1.0,
            max_iter: 100,
            max_levels: 10,
            min_gain: 1e-7,
            seed: 42,
        }
    }

    /// Set the resolution parameter.
    pub fn with_resolution(mut self, resolution: f64) -> Self {
        self.resolution = resolution;
        self
    }

    /// Set the visit-order seed.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// Set the maximum move sweeps per level.
    pub fn with_max_iter(mut self, max_iter: usize) -> Self {
        self.max_iter = max_iter;
        self
    }

    /// Set the maximum number of aggregation levels.
    pub fn with_max_levels(mut self, levels: usize) -> Self {
        self.max_levels = levels;
        self
    }

    /// One sweep phase: greedily move nodes until no move improves
    /// modularity. Returns the partition and whether anything moved.
    fn local_moving(&self, g: &WorkGraph, rng: &mut StdRng) -> (Vec<usize>, bool) {
        let n = g.len();
        let m = g.total_weight();
        if m == 0.0 {
            return ((0..n).collect(), false);
        }

        let degrees = g.degrees();
        let mut communities: Vec<usize> = (0..n).collect();
        let mut community_degrees = degrees.clone();

        let mut order: Vec<usize> = (0..n).collect();
        order.shuffle(rng);

        let mut any_moved = false;
        for _ in 0..self.max_iter {
            let mut moved = false;
            for &node in &order {
                let current = communities[node];
                let ki = degrees[node];
                community_degrees[current] -= ki;

                let mut weights: HashMap<usize, f64> = HashMap::new();
                for &(nbr, w) in &g.adj[node] {
                    *weights.entry(communities[nbr]).or_insert(0.0) += w;
                }
                let mut candidates: Vec<(usize, f64)> = weights.into_iter().collect();
                candidates.sort_unstable_by_key(|&(c, _)| c);

                let mut best = current;
                let mut best_gain = 0.0;
                for (comm, ki_in) in candidates {
                    let gain = ki_in / m
                        - self.resolution * community_degrees[comm] * ki / (2.0 * m * m);
                    if gain > best_gain {
                        best_gain = gain;
                        best = comm;
                    }
                }

                communities[node] = best;
                community_degrees[best] += ki;
                if best != current {
                    moved = true;
                    any_moved = true;
                }
            }
            if !moved {
                break;
            }
        }

        (communities, any_moved)
    }

    /// Modularity of a partition on the working graph.
    fn modularity(&self, g: &WorkGraph, communities: &[usize]) -> f64 {
        let m = g.total_weight();
        if m == 0.0 {
            return 0.0;
        }
        let degrees = g.degrees();
        let mut q = 0.0;
        for node in 0..g.len() {
            for &(nbr, w) in &g.adj[node] {
                if nbr > node && communities[node] == communities[nbr] {
                    q += w - self.resolution * degrees[node] * degrees[nbr] / (2.0 * m);
                }
            }
            let sl = g.self_loops[node];
            if sl > 0.0 {
                q += sl - self.resolution * degrees[node] * degrees[node] / (4.0 * m);
            }
        }
        q / m
    }
}

impl Default for Louvain {
    fn default() -> Self {
        Self::new()
    }
}

impl CommunityDetection for Louvain {
    fn detect<N, E>(&self, graph: &UnGraph<N, E>) -> Result<Vec<usize>> {
        let n = graph.node_count();
        if n == 0 {
            return Err(Error::EmptyInput);
        }
        if graph.edge_count() == 0 {
            return Ok((0..n).collect());
        }

        let edges = graph.edge_references().map(|e| {
            let i = e.source().index();
            let j = e.target().index();
            (i, j, 1.0)
        });
        let mut work = WorkGraph::from_edges(n, edges);

        let mut rng = StdRng::seed_from_u64(self.seed);
        // Per-level relabellings, composed at the end to recover the
        // level-zero assignment.
        let mut relabellings: Vec<Vec<usize>> = Vec::new();
        let mut prev_modularity = f64::NEG_INFINITY;

        for _ in 0..self.max_levels {
            let (partition, moved) = self.local_moving(&work, &mut rng);
            if !moved {
                break;
            }
            let q = self.modularity(&work, &partition);
            if q - prev_modularity < self.min_gain {
                break;
            }
            prev_modularity = q;

            let (aggregated, relabel) = work.aggregate(&partition);
            if aggregated.len() == work.len() {
                break;
            }
            relabellings.push(relabel);
            work = aggregated;
        }

        // Top level: every remaining meta-node is its own community.
        let mut assignment: Vec<usize> = (0..work.len()).collect();
        for relabel in relabellings.iter().rev() {
            assignment = relabel.iter().map(|&agg| assignment[agg]).collect();
        }

        Ok(renumber(&assignment))
    }

    fn resolution(&self) -> f64 {
        self.resolution
    }
}

/// Renumber community ids to consecutive integers in order of first
/// appearance, so output labels are stable across runs.
fn renumber(assignment: &[usize]) -> Vec<usize> {
    let mut map: HashMap<usize, usize> = HashMap::new();
    assignment
        .iter()
        .map(|&c| {
            let next = map.len();
            *map.entry(c).or_insert(next)
        })
        .collect()
}

/// Weighted working graph for the aggregation levels.
///
/// Adjacency lists are kept sorted by neighbor index so iteration order,
/// and therefore floating-point summation order, is fixed.
struct WorkGraph {
    adj: Vec<Vec<(usize, f64)>>,
    self_loops: Vec<f64>,
}

impl WorkGraph {
    fn from_edges(n: usize, edges: impl IntoIterator<Item = (usize, usize, f64)>) -> Self {
        let mut adj: Vec<HashMap<usize, f64>> = vec![HashMap::new(); n];
        let mut self_loops = vec![0.0; n];
        for (i, j, w) in edges {
            if i == j {
                self_loops[i] += w;
                continue;
            }
            *adj[i].entry(j).or_insert(0.0) += w;
            *adj[j].entry(i).or_insert(0.0) += w;
        }
        let adj = adj
            .into_iter()
            .map(|map| {
                let mut list: Vec<(usize, f64)> = map.into_iter().collect();
                list.sort_unstable_by_key(|&(nbr, _)| nbr);
                list
            })
            .collect();
        Self { adj, self_loops }
    }

    fn len(&self) -> usize {
        self.adj.len()
    }

    /// Total edge weight counting each undirected edge once, plus self-loops.
    fn total_weight(&self) -> f64 {
        let paired: f64 = self
            .adj
            .iter()
            .flat_map(|list| list.iter().map(|&(_, w)| w))
            .sum();
        paired / 2.0 + self.self_loops.iter().sum::<f64>()
    }

    /// Weighted degrees; self-loops count twice.
    fn degrees(&self) -> Vec<f64> {
        self.adj
            .iter()
            .zip(&self.self_loops)
            .map(|(list, sl)| list.iter().map(|&(_, w)| w).sum::<f64>() + 2.0 * sl)
            .collect()
    }

    /// Contract communities into meta-nodes. Returns the contracted graph
    /// and the old-node to meta-node relabelling, with meta-node ids
    /// assigned in order of first appearance.
    fn aggregate(&self, partition: &[usize]) -> (WorkGraph, Vec<usize>) {
        let mut ids: HashMap<usize, usize> = HashMap::new();
        let relabel: Vec<usize> = partition
            .iter()
            .map(|&c| {
                let next = ids.len();
                *ids.entry(c).or_insert(next)
            })
            .collect();
        let n_new = ids.len();

        let mut self_loops = vec![0.0; n_new];
        for (node, &sl) in self.self_loops.iter().enumerate() {
            self_loops[relabel[node]] += sl;
        }

        let mut weights: HashMap<(usize, usize), f64> = HashMap::new();
        for node in 0..self.len() {
            for &(nbr, w) in &self.adj[node] {
                if nbr <= node {
                    continue;
                }
                let (ci, cj) = (relabel[node], relabel[nbr]);
                if ci == cj {
                    self_loops[ci] += w;
                } else {
                    let key = if ci < cj { (ci, cj) } else { (cj, ci) };
                    *weights.entry(key).or_insert(0.0) += w;
                }
            }
        }

        let edges = weights.into_iter().map(|((i, j), w)| (i, j, w));
        let mut aggregated = WorkGraph::from_edges(n_new, edges);
        aggregated.self_loops = self_loops;
        (aggregated, relabel)
    }
}
