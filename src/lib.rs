//! # fovea
//!
//! Budget-bounded interactive navigation over hierarchical clusterings of
//! large follow graphs.
//!
//! An offline pipeline clusters a social graph into micro-clusters and a
//! merge tree over them. That tree has hundreds of thousands of nodes; a
//! human curator can look at a few dozen. This crate is the online layer
//! in between: it maintains a small **visible set** of clusters that
//! always partitions the graph, and mutates it under a hard budget as the
//! curator drills in and out.
//!
//! ```text
//! Component    │ Role
//! ─────────────┼────────────────────────────────────────────────
//! tree         │ merge-tree arena, traversal, cluster identity
//! community    │ deterministic Louvain for induced subgraphs
//! expand       │ local expansion, scoring, cache, precompute
//! view         │ navigator (expand/collapse/reveal), 2-D layout
//! ```
//!
//! ## The visible set
//!
//! The frontier invariant: no visible cluster is an ancestor or descendant
//! of another, and their subtrees cover every micro-cluster exactly once.
//! Every operation checks its budget before committing, so the invariant
//! and the budget both hold after success *and* failure.
//!
//! ## Local expansion
//!
//! Dense mega-clusters defeat the merge tree: their children split off
//! slivers instead of subgroups. When a heuristic flags such a cluster,
//! the navigator runs seeded community detection on the induced subgraph
//! instead, scores candidate splits (size balance, edge separation,
//! fragmentation, optional tag coherence), and splices the winner in as
//! synthetic children. Results are ranked, cached with an LRU + TTL
//! policy, and optionally precomputed in the background for the clusters
//! most likely to be expanded next.
//!
//! ## Example
//!
//! ```rust
//! use std::collections::HashMap;
//! use std::sync::Arc;
//!
//! use fovea::{
//!     CacheConfig, ExpansionCache, FollowGraph, MemoryLabelStore, MergeStep, MergeTree,
//!     MicroClusters, Navigator, NavigatorConfig,
//! };
//! use ndarray::array;
//!
//! // Two pairs of micro-clusters merged into one root.
//! let tree = Arc::new(MergeTree::new(
//!     4,
//!     vec![
//!         MergeStep::new(0, 1, 1.0),
//!         MergeStep::new(2, 3, 1.5),
//!         MergeStep::new(4, 5, 2.0),
//!     ],
//! )?);
//! let micro = Arc::new(MicroClusters::new(
//!     vec![vec![0, 1], vec![10, 11], vec![20, 21], vec![30, 31]],
//!     array![[0.0, 0.0], [0.5, 0.0], [5.0, 5.0], [5.5, 5.0]],
//! )?);
//! let graph = Arc::new(FollowGraph::from_edges([(0, 1), (1, 10), (20, 21), (21, 30)]));
//!
//! let mut nav = Navigator::new(
//!     tree,
//!     micro,
//!     graph,
//!     Arc::new(HashMap::new()),
//!     Arc::new(MemoryLabelStore::new()),
//!     Arc::new(ExpansionCache::new(CacheConfig::default())),
//!     NavigatorConfig::default().with_budget(8).with_initial_clusters(2),
//! )?;
//!
//! nav.expand("c4")?;
//! let view = nav.build();
//! assert_eq!(view.clusters.len(), 3);
//! # Ok::<(), fovea::Error>(())
//! ```

pub mod community;
pub mod error;
pub mod expand;
pub mod graph;
pub mod tree;
pub mod view;

pub use community::{CommunityDetection, Louvain};
pub use error::{Error, Result};
pub use expand::{
    rank_strategies, resolution_for_target, score_split, should_use_local_expansion, CacheConfig,
    CacheStats, CachedExpansion, Expansion, ExpansionCache, ExpansionEngine, LocalExpandConfig,
    LocalExpander, PrecomputeRequest, Precomputer, ScoreWeights, ScoredSplit, StructureScore,
    TagMap,
};
pub use graph::{FollowGraph, MemberDirectory, MemberInfo, MicroClusters};
pub use tree::{ClusterId, MergeStep, MergeTree, SizeMemo};
pub use view::{
    ClusterEdge, ClusterRecord, HierarchyView, LabelStore, MemberRecord, MemoryLabelStore,
    Navigator, NavigatorConfig, OpReport, Preview,
};
