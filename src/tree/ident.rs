//! Stable, round-trippable cluster identifiers.
//!
//! Merge-tree nodes encode as `c{index}`. Synthetic children produced by
//! local expansion encode as `c{index}.p{slot}`, where `index` is the
//! merge-tree node that was split and `slot` the position of the group in
//! the ranked split.

use core::fmt;
use core::str::FromStr;

use crate::error::{Error, Result};

/// Identity of a cluster in a hierarchy view.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ClusterId {
    /// A merge-tree node.
    Node(usize),
    /// A synthetic child spliced in by local expansion.
    Part {
        /// Merge-tree node that was split.
        node: usize,
        /// Position of this group in the ranked split.
        slot: usize,
    },
}

impl ClusterId {
    /// Encode to the wire form (`c42` or `c42.p1`).
    pub fn encode(&self) -> String {
        self.to_string()
    }

    /// Parse the wire form back into an identifier.
    pub fn parse(s: &str) -> Result<Self> {
        let invalid = || Error::InvalidIdentifier(s.to_string());
        let body = s.strip_prefix('c').ok_or_else(invalid)?;
        match body.split_once(".p") {
            None => {
                let node = parse_index(body).ok_or_else(invalid)?;
                Ok(ClusterId::Node(node))
            }
            Some((node, slot)) => {
                let node = parse_index(node).ok_or_else(invalid)?;
                let slot = parse_index(slot).ok_or_else(invalid)?;
                Ok(ClusterId::Part { node, slot })
            }
        }
    }

    /// The underlying merge-tree node index.
    pub fn node(&self) -> usize {
        match *self {
            ClusterId::Node(node) => node,
            ClusterId::Part { node, .. } => node,
        }
    }

    /// Whether this identifies a synthetic (locally expanded) group.
    pub fn is_part(&self) -> bool {
        matches!(self, ClusterId::Part { .. })
    }
}

fn parse_index(s: &str) -> Option<usize> {
    if s.is_empty() || !s.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    s.parse().ok()
}

impl fmt::Display for ClusterId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            ClusterId::Node(node) => write!(f, "c{node}"),
            ClusterId::Part { node, slot } => write!(f, "c{node}.p{slot}"),
        }
    }
}

impl FromStr for ClusterId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}
