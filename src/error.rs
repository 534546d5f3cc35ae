//! Errors raised while building hierarchies and guidance graphs
//!
//! Every variant names the invariant that failed so a broken build can be
//! traced back to the offending node, region or vertex.

/// Crate-wide error type
#[derive(Debug, thiserror::Error)]
pub enum AtlasError {
    #[error("Inconsistent volume: {0}")]
    InconsistentVolume(String),

    #[error("Split of node {node} put all {n_children} children on one side")]
    DegenerateSplit { node: usize, n_children: usize },

    #[error("{method} split needs at least two children, node {node} has {found}")]
    TooFewChildren {
        method: &'static str,
        node: usize,
        found: usize,
    },

    #[error("Split assignment has {found} entries, node {node} has {expected} children")]
    SplitLength {
        node: usize,
        expected: usize,
        found: usize,
    },

    #[error("Node {node} must have exactly two children, found {found}")]
    NotBinary { node: usize, found: usize },

    #[error("Numerical failure: {0}")]
    Numerical(String),

    #[error("No interior hierarchy nodes with defined expression")]
    EmptyLandscape,

    #[error("Region mismatch between child {child} and parent {parent}: {detail}")]
    RegionMismatch {
        child: usize,
        parent: usize,
        detail: String,
    },

    #[error("Expected exactly one {what}, found {found}")]
    VertexLookup { what: String, found: usize },

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, AtlasError>;
