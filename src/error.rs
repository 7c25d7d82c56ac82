//! Error types for the segmentation core

use thiserror::Error;

/// Errors raised by the scaling, clustering and reporting stages
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SegmentError {
    /// Fitting or clustering was attempted on a matrix with zero rows
    #[error("Empty input: cannot fit on a matrix with zero rows")]
    EmptyInput,

    /// The requested cluster count is outside [1, rows]
    #[error("Invalid cluster count: k = {k}, must be between 1 and {rows}")]
    InvalidClusterCount { k: usize, rows: usize },

    /// Column count does not match the fitted or expected width
    #[error("Dimension mismatch: expected {expected} columns, found {found}")]
    DimensionMismatch { expected: usize, found: usize },

    /// Standardizer used before `fit`
    #[error("Standardizer has not been fitted. Call fit() first.")]
    NotFitted,

    /// A cluster id in [0, k) has no members at summarization time
    #[error("Cluster {cluster} has no members")]
    EmptyCluster { cluster: usize },

    /// Assignment vector length differs from the matrix row count
    #[error("Label count mismatch: {labels} labels for {rows} rows")]
    LabelMismatch { labels: usize, rows: usize },

    /// A cluster label outside [0, k)
    #[error("Label out of range: cluster {label} with only {k} centroids")]
    LabelOutOfRange { label: usize, k: usize },

    /// Empty or inverted k range handed to the elbow scan
    #[error("Invalid k range: {0}")]
    InvalidRange(String),
}

/// Non-fatal: the iteration budget ran out before convergence.
///
/// The fit carrying this warning is still complete and usable.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("K-Means did not converge within {iterations} iterations")]
pub struct DidNotConverge {
    pub iterations: usize,
}

pub type Result<T> = std::result::Result<T, SegmentError>;
