//! Structure scoring for candidate cluster splits.
//!
//! A candidate split is a list of member-id groups. Five signals are
//! computed and combined into a weighted total used to rank competing
//! splits of the same cluster:
//!
//! | Signal | Range | Good |
//! |--------|-------|------|
//! | size entropy | [0, 1] | 1 (uniform group sizes) |
//! | collapse ratio | [0, 1] | 0 (no dominant group) |
//! | fragmentation ratio | [0, 1] | 0 (no singleton dust) |
//! | edge separation | [0, 1] | 1 (edges stay within groups) |
//! | tag coherence | [0, 1] | 1 (groups align with tags) |
//!
//! Collapse and fragmentation are penalties and enter the total inverted.
//! Edge separation is computed through adjacency lookups restricted to the
//! candidate membership; nothing here materializes all pairs.

use std::collections::HashMap;

use serde::Serialize;

use crate::graph::FollowGraph;

/// External per-account categorical tags, used by tag coherence.
pub type TagMap = HashMap<u64, Vec<String>>;

/// Weights for combining the five structure signals.
///
/// Defaults are biased toward edge separation and collapse avoidance.
#[derive(Debug, Clone, Copy)]
pub struct ScoreWeights {
    /// Weight of size entropy.
    pub entropy: f64,
    /// Weight of (1 - collapse ratio).
    pub collapse: f64,
    /// Weight of (1 - fragmentation ratio).
    pub fragmentation: f64,
    /// Weight of edge separation.
    pub separation: f64,
    /// Weight of tag coherence.
    pub tags: f64,
}

impl Default for ScoreWeights {
    fn default() -> Self {
        Self {
            entropy: 0.15,
            collapse: 0.30,
            fragmentation: 0.10,
            separation: 0.35,
            tags: 0.10,
        }
    }
}

/// Score breakdown for one candidate split.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StructureScore {
    /// Shannon entropy of the size distribution, normalized by `ln k`.
    pub size_entropy: f64,
    /// Fraction of members in the single largest group.
    pub collapse_ratio: f64,
    /// Fraction of members in singleton groups.
    pub fragmentation_ratio: f64,
    /// Fraction of candidate-internal edges that stay within one group.
    pub edge_separation: f64,
    /// Alignment with external tags; 0.5 when no tags are supplied.
    pub tag_coherence: f64,
    /// Weighted combination of the five signals.
    pub total_score: f64,
    /// Human-readable summary of the dominant issue.
    pub reason: String,
}

/// One candidate split with its score.
#[derive(Debug, Clone, Serialize)]
pub struct ScoredSplit {
    /// Member-id groups, largest first.
    pub groups: Vec<Vec<u64>>,
    /// Community-detection resolution that produced this candidate, if any.
    pub resolution: Option<f64>,
    /// Structure-score breakdown.
    pub score: StructureScore,
}

/// Score one candidate split of a cluster with `total` members.
pub fn score_split(
    groups: &[Vec<u64>],
    total: usize,
    graph: &FollowGraph,
    tags: Option<&TagMap>,
    weights: &ScoreWeights,
) -> StructureScore {
    let k = groups.len();
    let sizes: Vec<usize> = groups.iter().map(Vec::len).collect();
    let assigned: usize = sizes.iter().sum();
    let total = total.max(assigned).max(1) as f64;

    let size_entropy = entropy_of(&sizes);
    let collapse_ratio = sizes.iter().copied().max().unwrap_or(0) as f64 / total;
    let singleton_members = sizes.iter().filter(|&&s| s == 1).count();
    let fragmentation_ratio = singleton_members as f64 / total;

    let (within, crossing) = edge_partition(groups, graph);
    let edge_separation = if within + crossing == 0 {
        0.5
    } else {
        within as f64 / (within + crossing) as f64
    };

    let tag_coherence = tags.map_or(0.5, |t| coherence_of(groups, t));

    let total_score = weights.entropy * size_entropy
        + weights.collapse * (1.0 - collapse_ratio)
        + weights.fragmentation * (1.0 - fragmentation_ratio)
        + weights.separation * edge_separation
        + weights.tags * tag_coherence;

    let reason = if k <= 1 {
        "single cluster, no separation achieved".to_string()
    } else if singleton_members > 0 && fragmentation_ratio > 0.25 {
        format!("{singleton_members} singleton fragments")
    } else if collapse_ratio > 0.8 {
        format!(
            "largest group holds {:.0}% of members",
            collapse_ratio * 100.0
        )
    } else if within + crossing > 0 && edge_separation < 0.5 {
        "more edges cross groups than stay within them".to_string()
    } else {
        "balanced split".to_string()
    };

    StructureScore {
        size_entropy,
        collapse_ratio,
        fragmentation_ratio,
        edge_separation,
        tag_coherence,
        total_score,
        reason,
    }
}

/// Sort candidate splits by descending total score.
///
/// The sort is stable: candidates with equal scores keep their input order.
pub fn rank_strategies(mut candidates: Vec<ScoredSplit>) -> Vec<ScoredSplit> {
    candidates.sort_by(|a, b| b.score.total_score.total_cmp(&a.score.total_score));
    candidates
}

fn entropy_of(sizes: &[usize]) -> f64 {
    let k = sizes.len();
    let total: usize = sizes.iter().sum();
    if k <= 1 || total == 0 {
        return 0.0;
    }
    let total = total as f64;
    let h: f64 = sizes
        .iter()
        .filter(|&&s| s > 0)
        .map(|&s| {
            let p = s as f64 / total;
            -p * p.ln()
        })
        .sum();
    h / (k as f64).ln()
}

/// Count candidate-internal edges that stay within one group vs. cross
/// between groups.
fn edge_partition(groups: &[Vec<u64>], graph: &FollowGraph) -> (usize, usize) {
    let mut owner: HashMap<u64, usize> = HashMap::new();
    for (g, members) in groups.iter().enumerate() {
        for &m in members {
            owner.insert(m, g);
        }
    }
    let mut within = 0;
    let mut crossing = 0;
    for (&member, &g) in &owner {
        for &nbr in graph.neighbors(member) {
            if nbr <= member {
                continue;
            }
            match owner.get(&nbr) {
                Some(&og) if og == g => within += 1,
                Some(_) => crossing += 1,
                None => {}
            }
        }
    }
    (within, crossing)
}

/// Mean over groups, weighted by tagged-occurrence count, of the dominant
/// tag's share within the group. Neutral 0.5 when nothing is tagged.
fn coherence_of(groups: &[Vec<u64>], tags: &TagMap) -> f64 {
    let mut weighted = 0.0;
    let mut total_occurrences = 0usize;
    for members in groups {
        let mut counts: HashMap<&str, usize> = HashMap::new();
        for member in members {
            if let Some(list) = tags.get(member) {
                for tag in list {
                    *counts.entry(tag.as_str()).or_insert(0) += 1;
                }
            }
        }
        let occurrences: usize = counts.values().sum();
        if occurrences == 0 {
            continue;
        }
        let dominant = counts.values().copied().max().unwrap_or(0);
        weighted += dominant as f64;
        total_occurrences += occurrences;
    }
    if total_occurrences == 0 {
        0.5
    } else {
        weighted / total_occurrences as f64
    }
}
