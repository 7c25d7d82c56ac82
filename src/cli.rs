//! Command-line interface definitions and argument parsing

use crate::pipeline::PipelineConfig;
use clap::Parser;
use std::path::PathBuf;

/// Customer segmentation CLI: elbow scan and K-Means on behavioural features
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Path to the input CSV file
    #[arg(short, long, default_value = "Customer Data Original.csv")]
    pub input: PathBuf,

    /// Number of clusters for the final K-Means run
    #[arg(short = 'k', long, default_value = "5")]
    pub clusters: usize,

    /// Seed for centroid initialization
    #[arg(long, default_value = "42")]
    pub seed: u64,

    /// Maximum iterations for K-Means algorithm
    #[arg(long, default_value = "300")]
    pub max_iters: usize,

    /// Tolerance for K-Means convergence
    #[arg(long, default_value = "1e-4")]
    pub tolerance: f64,

    /// Seeded restarts per K-Means run (best inertia is kept)
    #[arg(long, default_value = "10")]
    pub n_init: usize,

    /// Smallest k of the elbow scan
    #[arg(long, default_value = "1")]
    pub k_min: usize,

    /// Largest k of the elbow scan
    #[arg(long, default_value = "10")]
    pub k_max: usize,

    /// Output path for the labeled table (default: timestamped file next to the input)
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Directory for the PNG charts; charts are skipped when omitted
    #[arg(long)]
    pub plot_dir: Option<PathBuf>,

    /// Log level (error, warn, info, debug, trace)
    #[arg(long, default_value = "info")]
    pub log_level: String,

    /// Enable verbose output
    #[arg(short, long)]
    pub verbose: bool,
}

impl Args {
    /// Validate the arguments and build the pipeline configuration
    pub fn to_config(&self) -> crate::Result<PipelineConfig> {
        if self.clusters == 0 {
            anyhow::bail!("Number of clusters must be at least 1");
        }
        if self.k_min == 0 || self.k_min > self.k_max {
            anyhow::bail!(
                "Invalid elbow range {}..={}: need 1 <= k-min <= k-max",
                self.k_min,
                self.k_max
            );
        }
        if !self.tolerance.is_finite() {
            anyhow::bail!("Tolerance must be a finite number");
        }

        let mut config = PipelineConfig::new(&self.input)
            .with_clusters(self.clusters)
            .with_seed(self.seed)
            .with_max_iters(self.max_iters)
            .with_tolerance(self.tolerance)
            .with_n_init(self.n_init)
            .with_k_range(self.k_min..=self.k_max);
        if let Some(output) = &self.output {
            config = config.with_output(output);
        }
        if let Some(plot_dir) = &self.plot_dir {
            config = config.with_plot_dir(plot_dir);
        }

        Ok(config)
    }

    /// Effective log filter directive
    pub fn log_directive(&self) -> &str {
        if self.verbose {
            "debug"
        } else {
            &self.log_level
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Args {
        Args::try_parse_from(std::iter::once("custseg").chain(args.iter().copied())).unwrap()
    }

    #[test]
    fn test_defaults() {
        let args = parse(&[]);
        let config = args.to_config().unwrap();

        assert_eq!(config.clusters, 5);
        assert_eq!(config.seed, 42);
        assert_eq!(config.n_init, 10);
        assert_eq!(config.k_range, 1..=10);
        assert!(config.output.is_none());
        assert_eq!(args.log_directive(), "info");
    }

    #[test]
    fn test_overrides() {
        let args = parse(&[
            "-i", "customers.csv", "-k", "3", "--seed", "7", "--k-max", "6", "-o", "out.csv", "-v",
        ]);
        let config = args.to_config().unwrap();

        assert_eq!(config.input, PathBuf::from("customers.csv"));
        assert_eq!(config.clusters, 3);
        assert_eq!(config.seed, 7);
        assert_eq!(config.k_range, 1..=6);
        assert_eq!(config.output, Some(PathBuf::from("out.csv")));
        assert_eq!(args.log_directive(), "debug");
    }

    #[test]
    fn test_invalid_values() {
        assert!(parse(&["-k", "0"]).to_config().is_err());
        assert!(parse(&["--k-min", "4", "--k-max", "2"]).to_config().is_err());
        assert!(parse(&["--k-min", "0"]).to_config().is_err());
        assert!(Args::try_parse_from(["custseg", "-k", "abc"]).is_err());
    }
}
