//! End-to-end segmentation pipeline
//!
//! `load → filter → fit_scale → select_k → cluster → report → persist`, each
//! stage a function over the previous stage's output.

use crate::data::{self, CustomerTable, FilterReport};
use crate::model::{KMeans, KMeansFit, DEFAULT_MAX_ITERS, DEFAULT_N_INIT, DEFAULT_TOLERANCE};
use crate::report::{self, ClusterReport};
use crate::scaler::{self, Standardizer};
use crate::selection::{self, ElbowCurve};
use crate::viz::{self, ChartPaths};
use ndarray::Array2;
use std::ops::RangeInclusive;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Pipeline settings
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineConfig {
    /// Customer CSV to segment
    pub input: PathBuf,
    /// Cluster count of the final run
    pub clusters: usize,
    pub seed: u64,
    pub max_iters: usize,
    pub tolerance: f64,
    pub n_init: usize,
    /// Cluster counts tried by the elbow scan
    pub k_range: RangeInclusive<usize>,
    /// Labeled table destination; timestamped next to the input when `None`
    pub output: Option<PathBuf>,
    /// Chart directory; no charts when `None`
    pub plot_dir: Option<PathBuf>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            input: PathBuf::from("Customer Data Original.csv"),
            clusters: 5,
            seed: 42,
            max_iters: DEFAULT_MAX_ITERS,
            tolerance: DEFAULT_TOLERANCE,
            n_init: DEFAULT_N_INIT,
            k_range: 1..=10,
            output: None,
            plot_dir: None,
        }
    }
}

impl PipelineConfig {
    pub fn new(input: impl AsRef<Path>) -> Self {
        Self {
            input: input.as_ref().to_path_buf(),
            ..Default::default()
        }
    }

    pub fn with_clusters(mut self, clusters: usize) -> Self {
        self.clusters = clusters;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    pub fn with_max_iters(mut self, max_iters: usize) -> Self {
        self.max_iters = max_iters;
        self
    }

    pub fn with_tolerance(mut self, tolerance: f64) -> Self {
        self.tolerance = tolerance;
        self
    }

    pub fn with_n_init(mut self, n_init: usize) -> Self {
        self.n_init = n_init.max(1);
        self
    }

    pub fn with_k_range(mut self, k_range: RangeInclusive<usize>) -> Self {
        self.k_range = k_range;
        self
    }

    pub fn with_output(mut self, output: impl AsRef<Path>) -> Self {
        self.output = Some(output.as_ref().to_path_buf());
        self
    }

    pub fn with_plot_dir(mut self, plot_dir: impl AsRef<Path>) -> Self {
        self.plot_dir = Some(plot_dir.as_ref().to_path_buf());
        self
    }

    /// Engine parameters shared by the scan and the final run
    pub fn kmeans(&self) -> KMeans {
        KMeans::new(self.clusters)
            .with_seed(self.seed)
            .with_max_iters(self.max_iters)
            .with_tolerance(self.tolerance)
            .with_n_init(self.n_init)
    }
}

/// Everything computed from a cleaned customer table, before persistence
#[derive(Debug, Clone)]
pub struct Analysis {
    pub standardizer: Standardizer,
    pub scaled: Array2<f64>,
    /// Scaled-feature variance, highest first
    pub variance: Vec<(usize, f64)>,
    pub correlation: Array2<f64>,
    pub elbow: ElbowCurve,
    pub fit: KMeansFit,
    pub report: ClusterReport,
}

/// Result of a full run
#[derive(Debug, Clone)]
pub struct PipelineOutcome {
    pub table: CustomerTable,
    pub filter: FilterReport,
    pub analysis: Analysis,
    pub output_path: PathBuf,
    pub charts: Option<ChartPaths>,
}

/// Fit the standardizer on the raw features and scale them
pub fn fit_scale(table: &CustomerTable) -> crate::error::Result<(Standardizer, Array2<f64>)> {
    let mut standardizer = Standardizer::new();
    let scaled = standardizer.fit_transform(&table.features)?;
    Ok((standardizer, scaled))
}

/// Elbow scan over the configured range, clamped to the row count
pub fn select_k(scaled: &Array2<f64>, config: &PipelineConfig) -> crate::error::Result<ElbowCurve> {
    let rows = scaled.nrows();
    let (k_min, k_max) = (*config.k_range.start(), *config.k_range.end());
    let clamped = k_min.min(rows).max(1)..=k_max.min(rows);

    if clamped != config.k_range {
        warn!(
            requested = ?config.k_range,
            used = ?clamped,
            rows,
            "elbow range clamped to the number of customers"
        );
    }

    let curve = selection::scan_with(scaled, clamped, &config.kmeans())?;
    for point in &curve.points {
        info!(k = point.k, inertia = point.inertia, "elbow");
    }
    Ok(curve)
}

/// Final clustering at the operator's k
pub fn cluster_final(scaled: &Array2<f64>, config: &PipelineConfig) -> crate::error::Result<KMeansFit> {
    let fit = config.kmeans().fit(scaled)?;

    if let Some(warning) = fit.warning() {
        warn!("{}", warning);
    }
    info!(
        k = fit.n_clusters(),
        inertia = fit.inertia,
        iterations = fit.n_iterations,
        "final clustering finished"
    );

    Ok(fit)
}

/// Scale, scan, cluster and summarize a cleaned table
pub fn analyze(table: &CustomerTable, config: &PipelineConfig) -> crate::Result<Analysis> {
    let (standardizer, scaled) = fit_scale(table)?;
    let variance = scaler::feature_variance(&scaled);
    let correlation = report::correlation_matrix(&table.features);

    let elbow = select_k(&scaled, config)?;
    let fit = cluster_final(&scaled, config)?;
    let report = report::summarize(&table.features, &fit.labels, &fit.centroids, &standardizer)?;

    Ok(Analysis {
        standardizer,
        scaled,
        variance,
        correlation,
        elbow,
        fit,
        report,
    })
}

/// Run every stage, writing the labeled table and, if configured, the charts
pub fn run(config: &PipelineConfig) -> crate::Result<PipelineOutcome> {
    info!(input = ?config.input, "loading customer table");
    let (table, filter) = data::load_customer_table(&config.input)?;

    let analysis = analyze(&table, config)?;

    let output_path = config
        .output
        .clone()
        .unwrap_or_else(|| data::timestamped_output_path(&config.input, chrono::Local::now()));
    data::write_segments(&table, &analysis.fit.labels, &output_path)?;
    info!(path = ?output_path, rows = table.len(), "segments saved");

    let charts = match &config.plot_dir {
        Some(dir) => Some(viz::generate_visualization_report(
            &table,
            &analysis.correlation,
            &analysis.elbow,
            &analysis.fit.labels,
            &analysis.report,
            dir,
        )?),
        None => None,
    };

    Ok(PipelineOutcome {
        table,
        filter,
        analysis,
        output_path,
        charts,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{clean_records, CustomerRecord, Feature};

    fn synthetic_table(per_group: usize) -> CustomerTable {
        let centers = [
            [5.0, 900.0, 20.0, 80.0, 5.0, 30000.0, 1.2, 1.1, 1.3],
            [60.0, 200.0, 5.0, 15.0, 40.0, 600.0, 0.6, 0.7, 0.5],
            [20.0, 500.0, 12.0, 40.0, 15.0, 5000.0, 1.0, 1.0, 1.0],
        ];
        let records = (0..per_group * centers.len())
            .map(|i| {
                let center = centers[i % centers.len()];
                let jitter = 1.0 + 0.01 * ((i / centers.len()) as f64);
                CustomerRecord {
                    customer_id: Some(format!("C{:04}", i)),
                    features: center.iter().map(|&v| Some(v * jitter)).collect(),
                }
            })
            .collect();
        clean_records(records).0
    }

    #[test]
    fn test_analyze_recovers_groups() {
        let table = synthetic_table(5);
        let config = PipelineConfig::default().with_clusters(3).with_k_range(1..=5);
        let analysis = analyze(&table, &config).unwrap();

        assert_eq!(analysis.report.n_clusters(), 3);
        assert_eq!(analysis.report.total_rows(), 15);
        for summary in &analysis.report.clusters {
            assert_eq!(summary.size, 5);
        }
        // rows i and i + 3 come from the same center
        let labels = &analysis.fit.labels;
        for i in 0..12 {
            assert_eq!(labels[i], labels[i + 3]);
        }
        assert_eq!(analysis.variance.len(), Feature::COUNT);
        assert_eq!(analysis.elbow.ks(), vec![1, 2, 3, 4, 5]);
    }

    #[test]
    fn test_select_k_clamps_range() {
        let table = synthetic_table(1);
        let (_, scaled) = fit_scale(&table).unwrap();
        let config = PipelineConfig::default().with_k_range(1..=10);

        let curve = select_k(&scaled, &config).unwrap();
        assert_eq!(curve.ks(), vec![1, 2, 3]);
    }

    #[test]
    fn test_final_k_larger_than_rows() {
        let table = synthetic_table(1);
        let config = PipelineConfig::default().with_clusters(4).with_k_range(1..=2);
        let err = analyze(&table, &config).unwrap_err();
        assert!(err.to_string().contains("Invalid cluster count"));
    }

    #[test]
    fn test_empty_table() {
        let (table, _) = clean_records(Vec::new());
        assert!(analyze(&table, &PipelineConfig::default()).is_err());
    }
}
