//! Merge-tree structure, traversal, and cluster identity.

mod ident;
mod merge;

pub use ident::ClusterId;
pub use merge::{MergeStep, MergeTree, SizeMemo};
