//! custseg: customer segmentation CLI
//!
//! Loads the customer table, runs the segmentation pipeline and prints the
//! per-cluster statistics.

use anyhow::Result;
use clap::Parser;
use custseg::{pipeline, report, Args};
use std::time::Instant;
use tracing::info;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

fn main() -> Result<()> {
    let args = Args::parse();

    let filter = EnvFilter::try_new(args.log_directive()).unwrap_or_else(|_| EnvFilter::new("info"));
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_target(false)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let config = args.to_config()?;
    let start_time = Instant::now();

    let outcome = pipeline::run(&config)?;

    println!("Rows after removing blank CltID: {}", outcome.filter.after_id_filter);
    println!(
        "Final row count after removing rows with missing features: {}",
        outcome.filter.final_rows
    );
    println!(
        "Removed {} rows with missing feature values",
        outcome.filter.removed_missing_features()
    );

    report::print_feature_variance(&outcome.analysis.variance);

    println!("\nElbow Curve (k: inertia):");
    for point in &outcome.analysis.elbow.points {
        println!("  {:>2}: {:.2}", point.k, point.inertia);
    }

    report::print_cluster_statistics(&outcome.analysis.report);

    println!("\nResults saved to: {}", outcome.output_path.display());
    if let Some(charts) = &outcome.charts {
        println!("Charts saved to: {}", charts.elbow.parent().unwrap_or(&charts.elbow).display());
    }

    info!(elapsed = ?start_time.elapsed(), "pipeline complete");

    Ok(())
}
