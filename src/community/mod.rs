//! Community detection on induced subgraphs.
//!
//! Given a graph, find groupings where nodes within a group are densely
//! connected and edges between groups are sparse. Used by local expansion
//! when a cluster's merge-tree children are too coarse to be useful.
//!
//! ## The Modularity Objective
//!
//! The detector optimizes **modularity** Q, comparing the actual edge
//! weight within communities to the expected weight in a random graph with
//! the same degree sequence:
//!
//! ```text
//! Q = (1/2m) × Σ[A_ij - γ(k_i × k_j)/(2m)] × δ(c_i, c_j)
//! ```
//!
//! The resolution parameter γ controls granularity: γ > 1 favors smaller
//! communities, γ < 1 larger ones. Local expansion maps its target child
//! count onto γ through a small monotone table.
//!
//! ## Determinism
//!
//! Navigation must be reproducible: expanding the same cluster twice has to
//! produce the same groups, or cached splits would disagree with fresh
//! ones. The [`Louvain`] implementation here pins every source of
//! non-determinism: node visit order comes from a seeded shuffle, candidate
//! communities are examined in ascending id order, and gain ties keep the
//! lowest community id.
//!
//! ## References
//!
//! - Blondel et al. (2008). "Fast unfolding of communities in large networks."
//! - Traag, Waltman, van Eck (2019). "From Louvain to Leiden."

mod louvain;
mod traits;

pub use louvain::Louvain;
pub use traits::CommunityDetection;
