//! 2-D projection of cluster centroids and inter-cluster connectivity.
//!
//! Positions come from the two dominant principal directions of the
//! visible clusters' centroid matrix, found by deterministic power
//! iteration (fixed start vector, fixed iteration count). Degenerate
//! inputs (no spread, zero dimensions) fall back to an evenly spaced
//! circle so the presentation layer always gets usable coordinates.

use std::collections::HashMap;

use ndarray::{Array1, Array2, Axis};
use serde::Serialize;

use crate::graph::FollowGraph;

/// Connectivity between two visible clusters.
#[derive(Debug, Clone, Serialize)]
pub struct ClusterEdge {
    /// Source cluster identifier.
    pub source: String,
    /// Target cluster identifier.
    pub target: String,
    /// Raw count of follow edges between the two member sets.
    pub count: usize,
    /// Size-normalized connectivity score.
    pub connectivity: f64,
}

/// Project one centroid row per cluster down to 2-D positions.
pub fn project_positions(centroids: &Array2<f64>) -> Vec<[f64; 2]> {
    let n = centroids.nrows();
    if n == 0 {
        return Vec::new();
    }
    if n == 1 {
        return vec![[0.0, 0.0]];
    }
    if centroids.ncols() == 0 {
        return circle_positions(n);
    }

    let mean = match centroids.mean_axis(Axis(0)) {
        Some(mean) => mean,
        None => return circle_positions(n),
    };
    let mut centered = centroids.clone();
    for mut row in centered.outer_iter_mut() {
        row -= &mean;
    }

    let Some(first) = dominant_direction(&centered, None) else {
        return circle_positions(n);
    };
    let second = dominant_direction(&centered, Some(&first));

    centered
        .outer_iter()
        .map(|row| {
            let x = row.dot(&first);
            let y = second.as_ref().map_or(0.0, |v| row.dot(v));
            [x, y]
        })
        .collect()
}

/// Power iteration on the (implicit) covariance of the centered matrix,
/// optionally deflated against an earlier direction.
fn dominant_direction(
    centered: &Array2<f64>,
    orthogonal_to: Option<&Array1<f64>>,
) -> Option<Array1<f64>> {
    let d = centered.ncols();
    let mut v = Array1::from_elem(d, 1.0 / (d as f64).sqrt());
    if let Some(prev) = orthogonal_to {
        let proj = v.dot(prev);
        v = &v - &(prev * proj);
    }

    for _ in 0..64 {
        let mut w = centered.t().dot(&centered.dot(&v));
        if let Some(prev) = orthogonal_to {
            let proj = w.dot(prev);
            w = &w - &(prev * proj);
        }
        let norm = w.dot(&w).sqrt();
        if norm < 1e-12 {
            return None;
        }
        v = w / norm;
    }
    Some(v)
}

fn circle_positions(n: usize) -> Vec<[f64; 2]> {
    (0..n)
        .map(|i| {
            let angle = 2.0 * std::f64::consts::PI * i as f64 / n as f64;
            [angle.cos(), angle.sin()]
        })
        .collect()
}

/// Count follow edges between every pair of visible clusters and turn the
/// counts into size-normalized connectivity scores.
///
/// When an external community partition is supplied, edges between two
/// clusters whose dominant communities coincide are boosted by `boost`.
pub fn cluster_edges(
    entries: &[(String, Vec<u64>)],
    graph: &FollowGraph,
    partition: Option<&HashMap<u64, usize>>,
    boost: f64,
) -> Vec<ClusterEdge> {
    let mut owner: HashMap<u64, usize> = HashMap::new();
    for (idx, (_, members)) in entries.iter().enumerate() {
        for &m in members {
            owner.insert(m, idx);
        }
    }

    let mut counts: HashMap<(usize, usize), usize> = HashMap::new();
    graph.for_each_edge(|a, b| {
        if let (Some(&ca), Some(&cb)) = (owner.get(&a), owner.get(&b)) {
            if ca != cb {
                let key = (ca.min(cb), ca.max(cb));
                *counts.entry(key).or_insert(0) += 1;
            }
        }
    });

    let dominant: Option<Vec<Option<usize>>> = partition.map(|p| {
        entries
            .iter()
            .map(|(_, members)| dominant_community(members, p))
            .collect()
    });

    let mut keys: Vec<(usize, usize)> = counts.keys().copied().collect();
    keys.sort_unstable();

    keys.into_iter()
        .map(|(a, b)| {
            let count = counts[&(a, b)];
            let size_a = entries[a].1.len().max(1) as f64;
            let size_b = entries[b].1.len().max(1) as f64;
            let mut connectivity = count as f64 / (size_a * size_b).sqrt();
            if let Some(dominant) = &dominant {
                if let (Some(da), Some(db)) = (dominant[a], dominant[b]) {
                    if da == db {
                        connectivity *= boost;
                    }
                }
            }
            ClusterEdge {
                source: entries[a].0.clone(),
                target: entries[b].0.clone(),
                count,
                connectivity,
            }
        })
        .collect()
}

/// Most frequent community among members; ties keep the lowest id.
fn dominant_community(members: &[u64], partition: &HashMap<u64, usize>) -> Option<usize> {
    let mut counts: HashMap<usize, usize> = HashMap::new();
    for m in members {
        if let Some(&c) = partition.get(m) {
            *counts.entry(c).or_insert(0) += 1;
        }
    }
    counts
        .into_iter()
        .max_by_key(|&(c, n)| (n, std::cmp::Reverse(c)))
        .map(|(c, _)| c)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn projection_spreads_separated_centroids() {
        let centroids = array![
            [0.0, 0.0, 0.0],
            [0.1, 0.0, 0.1],
            [10.0, 0.0, 10.0],
            [10.1, 0.0, 10.1],
        ];
        let positions = project_positions(&centroids);
        assert_eq!(positions.len(), 4);

        let close = (positions[0][0] - positions[1][0]).abs();
        let far = (positions[0][0] - positions[2][0]).abs();
        assert!(far > close * 10.0);
    }

    #[test]
    fn projection_is_deterministic() {
        let centroids = array![[1.0, 2.0], [3.0, 1.0], [0.0, 5.0]];
        assert_eq!(project_positions(&centroids), project_positions(&centroids));
    }

    #[test]
    fn degenerate_centroids_fall_back_to_a_circle() {
        let centroids = array![[1.0, 1.0], [1.0, 1.0], [1.0, 1.0]];
        let positions = project_positions(&centroids);
        assert_eq!(positions.len(), 3);
        for p in &positions {
            let r = (p[0] * p[0] + p[1] * p[1]).sqrt();
            assert!((r - 1.0).abs() < 1e-9);
        }
    }

    #[test]
    fn single_cluster_sits_at_the_origin() {
        let centroids = array![[3.0, 4.0]];
        assert_eq!(project_positions(&centroids), vec![[0.0, 0.0]]);
    }

    #[test]
    fn edges_count_cross_cluster_follows() {
        let graph = FollowGraph::from_edges([(1, 2), (1, 10), (2, 11), (10, 11)]);
        let entries = vec![
            ("c0".to_string(), vec![1, 2]),
            ("c1".to_string(), vec![10, 11]),
        ];
        let edges = cluster_edges(&entries, &graph, None, 1.5);
        assert_eq!(edges.len(), 1);
        assert_eq!(edges[0].count, 2);
        assert!((edges[0].connectivity - 2.0 / 2.0).abs() < 1e-9);
    }

    #[test]
    fn shared_dominant_community_boosts_connectivity() {
        let graph = FollowGraph::from_edges([(1, 10)]);
        let entries = vec![
            ("c0".to_string(), vec![1, 2]),
            ("c1".to_string(), vec![10, 11]),
        ];
        let mut partition = HashMap::new();
        for id in [1u64, 2, 10, 11] {
            partition.insert(id, 7usize);
        }
        let plain = cluster_edges(&entries, &graph, None, 2.0);
        let boosted = cluster_edges(&entries, &graph, Some(&partition), 2.0);
        assert!((boosted[0].connectivity - plain[0].connectivity * 2.0).abs() < 1e-9);
    }
}
