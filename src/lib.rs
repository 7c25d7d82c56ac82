//! custseg: customer segmentation with K-Means clustering
//!
//! This library standardizes nine behavioural features per retail customer,
//! scans a range of cluster counts for an elbow diagnostic, partitions the
//! customers with a seeded K-Means engine and summarizes every segment in
//! original units.

pub mod cli;
pub mod data;
pub mod error;
pub mod model;
pub mod pipeline;
pub mod report;
pub mod scaler;
pub mod selection;
pub mod viz;

// Re-export public items for easier access
pub use cli::Args;
pub use data::{load_customer_table, write_segments, CustomerTable, Feature, FilterReport};
pub use error::{DidNotConverge, SegmentError};
pub use model::{cluster, KMeans, KMeansFit};
pub use pipeline::{run, PipelineConfig, PipelineOutcome};
pub use report::{summarize, ClusterReport};
pub use scaler::{ScalingParams, Standardizer};
pub use selection::{scan, ElbowCurve, ElbowPoint};

/// Common result type used throughout the application
pub type Result<T> = anyhow::Result<T>;
