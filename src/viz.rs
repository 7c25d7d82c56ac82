//! Visualization functions using Plotters for segmentation diagnostics

use crate::data::{CustomerTable, Feature};
use crate::report::ClusterReport;
use crate::selection::ElbowCurve;
use ndarray::{Array1, Array2};
use plotters::prelude::*;
use std::path::{Path, PathBuf};
use tracing::info;

/// Color palette for different clusters
const CLUSTER_COLORS: [RGBColor; 5] = [RED, BLUE, GREEN, MAGENTA, CYAN];

/// Endpoints of the correlation heatmap's diverging scale
const COOL: (f64, f64, f64) = (59.0, 76.0, 192.0);
const WARM: (f64, f64, f64) = (180.0, 4.0, 38.0);

fn cluster_color(cluster: usize) -> RGBColor {
    CLUSTER_COLORS.get(cluster).copied().unwrap_or_else(|| {
        let c = Palette99::pick(cluster).to_rgba();
        RGBColor(c.0, c.1, c.2)
    })
}

/// Blue for -1, white for 0, red for +1
pub fn diverging_color(r: f64) -> RGBColor {
    let r = if r.is_finite() { r.clamp(-1.0, 1.0) } else { 0.0 };
    let (target, t) = if r < 0.0 { (COOL, -r) } else { (WARM, r) };
    let lerp = |end: f64| (255.0 + (end - 255.0) * t).round() as u8;
    RGBColor(lerp(target.0), lerp(target.1), lerp(target.2))
}

/// Min and max of `values` widened by 5% of the span (0.5 for a flat series)
pub fn padded_range(values: &[f64]) -> (f64, f64) {
    let min = values.iter().copied().fold(f64::INFINITY, f64::min);
    let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    if !min.is_finite() || !max.is_finite() {
        return (0.0, 1.0);
    }
    let pad = if max > min { (max - min) * 0.05 } else { 0.5 };
    (min - pad, max + pad)
}

/// Annotated heatmap of a feature correlation matrix
pub fn create_correlation_heatmap(corr: &Array2<f64>, output_path: &Path) -> crate::Result<()> {
    let n = corr.nrows();
    let names = Feature::columns();

    let root = BitMapBackend::new(output_path, (1000, 800)).into_drawing_area();
    root.fill(&WHITE)?;

    let mut chart = ChartBuilder::on(&root)
        .caption("Feature Correlation Matrix", ("sans-serif", 30))
        .margin(10)
        .x_label_area_size(60)
        .y_label_area_size(220)
        .build_cartesian_2d(0f64..n as f64, 0f64..n as f64)?;

    // Row 0 is drawn at the top
    let label_for = |v: &f64| -> String {
        let flipped = n as f64 - 1.0 - v.floor();
        if flipped < 0.0 {
            return String::new();
        }
        names.get(flipped as usize).map(|s| s.to_string()).unwrap_or_default()
    };

    chart
        .configure_mesh()
        .disable_mesh()
        .x_labels(n)
        .y_labels(n)
        .x_label_formatter(&|v: &f64| format!("{}", v.floor() as usize))
        .y_label_formatter(&label_for)
        .draw()?;

    for ((i, j), &r) in corr.indexed_iter() {
        let (x, y) = (j as f64, (n - 1 - i) as f64);
        chart.draw_series(std::iter::once(Rectangle::new(
            [(x, y), (x + 1.0, y + 1.0)],
            diverging_color(r).filled(),
        )))?;
        chart.draw_series(std::iter::once(Text::new(
            format!("{:.2}", r),
            (x + 0.3, y + 0.4),
            ("sans-serif", 14),
        )))?;
    }

    root.present()?;
    info!(path = ?output_path, "correlation heatmap saved");

    Ok(())
}

/// Line chart of inertia against k
pub fn create_elbow_chart(curve: &ElbowCurve, output_path: &Path) -> crate::Result<()> {
    let ks = curve.ks();
    let inertias = curve.inertias();
    let k_min = ks.first().copied().unwrap_or(1) as f64;
    let k_max = ks.last().copied().unwrap_or(1) as f64;
    let (_, y_max) = padded_range(&inertias);

    let root = BitMapBackend::new(output_path, (1000, 600)).into_drawing_area();
    root.fill(&WHITE)?;

    let mut chart = ChartBuilder::on(&root)
        .caption("Elbow Method For Optimal k", ("sans-serif", 30))
        .margin(10)
        .x_label_area_size(50)
        .y_label_area_size(80)
        .build_cartesian_2d((k_min - 0.5)..(k_max + 0.5), 0f64..y_max.max(1.0))?;

    chart
        .configure_mesh()
        .x_desc("k")
        .y_desc("Inertia")
        .axis_desc_style(("sans-serif", 15))
        .draw()?;

    let series: Vec<(f64, f64)> = curve
        .points
        .iter()
        .map(|p| (p.k as f64, p.inertia))
        .collect();

    chart.draw_series(LineSeries::new(series.iter().copied(), &BLUE))?;
    chart.draw_series(
        series
            .iter()
            .map(|&(x, y)| Cross::new((x, y), 6, BLUE.stroke_width(2))),
    )?;

    root.present()?;
    info!(path = ?output_path, "elbow curve saved");

    Ok(())
}

/// Scatter of the first two features in original units, colored by cluster
pub fn create_cluster_visualization(
    table: &CustomerTable,
    labels: &Array1<usize>,
    centroids: &Array2<f64>,
    output_path: &Path,
    plot_title: Option<&str>,
) -> crate::Result<()> {
    let title = plot_title.unwrap_or("Customer Segments");
    let x_feature = Feature::ALL[0];
    let y_feature = Feature::ALL[1];

    let x_values: Vec<f64> = table.features.column(0).to_vec();
    let y_values: Vec<f64> = table.features.column(1).to_vec();
    let (x_min, x_max) = padded_range(&x_values);
    let (y_min, y_max) = padded_range(&y_values);

    let root = BitMapBackend::new(output_path, (1200, 800)).into_drawing_area();
    root.fill(&WHITE)?;

    let mut chart = ChartBuilder::on(&root)
        .caption(title, ("sans-serif", 30))
        .margin(10)
        .x_label_area_size(50)
        .y_label_area_size(70)
        .build_cartesian_2d(x_min..x_max, y_min..y_max)?;

    chart
        .configure_mesh()
        .x_desc(x_feature.column())
        .y_desc(y_feature.column())
        .axis_desc_style(("sans-serif", 15))
        .draw()?;

    chart.draw_series(
        x_values
            .iter()
            .zip(y_values.iter())
            .zip(labels.iter())
            .map(|((&x, &y), &cluster)| Circle::new((x, y), 4, cluster_color(cluster).filled())),
    )?;

    // Centroids as larger squares
    let half_x = (x_max - x_min) * 0.01;
    let half_y = (y_max - y_min) * 0.01;
    for (cluster_id, centroid_row) in centroids.outer_iter().enumerate() {
        let (cx, cy) = (centroid_row[0], centroid_row[1]);
        let color = cluster_color(cluster_id);

        chart
            .draw_series(std::iter::once(Rectangle::new(
                [(cx - half_x, cy - half_y), (cx + half_x, cy + half_y)],
                color.filled(),
            )))?
            .label(format!("Cluster {}", cluster_id))
            .legend(move |(x, y)| Rectangle::new([(x, y), (x + 10, y + 10)], color.filled()));
    }

    chart
        .configure_series_labels()
        .background_style(&WHITE.mix(0.8))
        .border_style(&BLACK)
        .draw()?;

    root.present()?;
    info!(path = ?output_path, "cluster scatter saved");

    Ok(())
}

/// Create a simple bar chart of cluster sizes
pub fn create_cluster_size_chart(sizes: &[usize], output_path: &Path) -> crate::Result<()> {
    let max_size = sizes.iter().copied().max().unwrap_or(1).max(1) as f64;

    let root = BitMapBackend::new(output_path, (600, 400)).into_drawing_area();
    root.fill(&WHITE)?;

    let mut chart = ChartBuilder::on(&root)
        .caption("Cluster Sizes", ("sans-serif", 30))
        .margin(10)
        .x_label_area_size(40)
        .y_label_area_size(50)
        .build_cartesian_2d(-0.5f64..(sizes.len() as f64 - 0.5), 0f64..(max_size * 1.1))?;

    chart
        .configure_mesh()
        .x_desc("Cluster ID")
        .y_desc("Number of Customers")
        .axis_desc_style(("sans-serif", 15))
        .draw()?;

    chart.draw_series(sizes.iter().enumerate().map(|(cluster_id, &size)| {
        Rectangle::new(
            [
                (cluster_id as f64 - 0.4, 0.0),
                (cluster_id as f64 + 0.4, size as f64),
            ],
            cluster_color(cluster_id).filled(),
        )
    }))?;

    root.present()?;
    info!(path = ?output_path, "cluster size chart saved");

    Ok(())
}

/// Paths of the charts written by [`generate_visualization_report`]
#[derive(Debug, Clone, PartialEq)]
pub struct ChartPaths {
    pub correlation: PathBuf,
    pub elbow: PathBuf,
    pub scatter: PathBuf,
    pub sizes: PathBuf,
}

impl ChartPaths {
    pub fn in_dir(dir: &Path) -> Self {
        Self {
            correlation: dir.join("correlation_heatmap.png"),
            elbow: dir.join("elbow_curve.png"),
            scatter: dir.join("customer_segments.png"),
            sizes: dir.join("cluster_sizes.png"),
        }
    }
}

/// Render every diagnostic chart into `plot_dir`
pub fn generate_visualization_report(
    table: &CustomerTable,
    correlation: &Array2<f64>,
    curve: &ElbowCurve,
    labels: &Array1<usize>,
    report: &ClusterReport,
    plot_dir: &Path,
) -> crate::Result<ChartPaths> {
    std::fs::create_dir_all(plot_dir)?;
    let paths = ChartPaths::in_dir(plot_dir);

    create_correlation_heatmap(correlation, &paths.correlation)?;
    create_elbow_chart(curve, &paths.elbow)?;
    create_cluster_visualization(table, labels, &report.centroids, &paths.scatter, None)?;

    let sizes: Vec<usize> = report.clusters.iter().map(|c| c.size).collect();
    create_cluster_size_chart(&sizes, &paths.sizes)?;

    Ok(paths)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rgb(color: RGBColor) -> (u8, u8, u8) {
        (color.0, color.1, color.2)
    }

    #[test]
    fn test_diverging_color_endpoints() {
        assert_eq!(rgb(diverging_color(0.0)), (255, 255, 255));
        assert_eq!(rgb(diverging_color(-1.0)), (59, 76, 192));
        assert_eq!(rgb(diverging_color(1.0)), (180, 4, 38));
        assert_eq!(rgb(diverging_color(f64::NAN)), (255, 255, 255));
        assert_eq!(rgb(diverging_color(3.0)), rgb(diverging_color(1.0)));
    }

    #[test]
    fn test_padded_range() {
        assert_eq!(padded_range(&[0.0, 10.0]), (-0.5, 10.5));
        assert_eq!(padded_range(&[2.0, 2.0]), (1.5, 2.5));
        assert_eq!(padded_range(&[]), (0.0, 1.0));
    }

    #[test]
    fn test_cluster_colors_extend_past_palette() {
        assert_eq!(rgb(cluster_color(0)), rgb(RED));
        let beyond = cluster_color(CLUSTER_COLORS.len() + 2);
        assert_eq!(rgb(beyond), rgb(cluster_color(CLUSTER_COLORS.len() + 2)));
    }

    #[test]
    fn test_chart_paths() {
        let paths = ChartPaths::in_dir(Path::new("/tmp/plots"));
        assert_eq!(paths.elbow, PathBuf::from("/tmp/plots/elbow_curve.png"));
    }
}
