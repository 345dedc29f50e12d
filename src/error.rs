use core::fmt;

/// Result alias for `fovea`.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors returned by navigation, expansion, and cache primitives.
///
/// Everything here is recoverable: the visible set is guaranteed to be a
/// valid partition when an operation returns, whether it succeeded or not.
#[derive(Debug, Clone, PartialEq)]
pub enum Error {
    /// Input was empty.
    EmptyInput,

    /// An identifier failed to parse.
    InvalidIdentifier(String),

    /// A well-formed identifier that names no currently visible cluster.
    UnknownCluster(String),

    /// Invalid parameter value.
    InvalidParameter {
        /// Parameter name.
        name: &'static str,
        /// Error message.
        message: &'static str,
    },

    /// An expand or reveal would push the visible set past the budget.
    ///
    /// `completed` counts the splits committed before stopping; partial
    /// progress is kept and the visible set remains a valid partition.
    BudgetExhausted {
        /// Splits committed before the budget stopped the operation.
        completed: usize,
        /// The configured visible-cluster budget.
        budget: usize,
    },

    /// A cluster with no usable merge children whose local expansion failed.
    Unsplittable(String),

    /// The visible set no longer partitions the graph.
    ///
    /// Distinct from user-facing failures: this signals internal-state
    /// corruption and should not occur under correct usage.
    InvariantViolation(String),

    /// Centroid matrix shape disagrees with the micro-cluster count.
    DimensionMismatch {
        /// Expected dimension.
        expected: usize,
        /// Found dimension.
        found: usize,
    },

    /// A merge record references an index at or past its own node.
    MalformedTree {
        /// Internal node index.
        node: usize,
        /// Offending child reference.
        child: usize,
    },
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::EmptyInput => write!(f, "empty input provided"),
            Error::InvalidIdentifier(id) => write!(f, "invalid identifier: {id}"),
            Error::UnknownCluster(id) => write!(f, "no visible cluster named {id}"),
            Error::InvalidParameter { name, message } => {
                write!(f, "invalid parameter '{name}': {message}")
            }
            Error::BudgetExhausted { completed, budget } => {
                write!(
                    f,
                    "visible-cluster budget of {budget} exhausted after {completed} splits"
                )
            }
            Error::Unsplittable(reason) => write!(f, "cluster cannot be split: {reason}"),
            Error::InvariantViolation(msg) => write!(f, "partition invariant violated: {msg}"),
            Error::DimensionMismatch { expected, found } => {
                write!(f, "dimension mismatch: expected {expected}, found {found}")
            }
            Error::MalformedTree { node, child } => {
                write!(f, "merge record for node {node} references child {child}")
            }
        }
    }
}

impl std::error::Error for Error {}
