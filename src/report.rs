//! Per-cluster statistics in original units

use crate::data::Feature;
use crate::error::{Result, SegmentError};
use crate::scaler::Standardizer;
use ndarray::{Array1, Array2, Axis};

/// Size and mean characteristics of one cluster
#[derive(Debug, Clone, PartialEq)]
pub struct ClusterSummary {
    pub cluster: usize,
    pub size: usize,
    /// Mean of the raw feature values of the cluster's rows
    pub means: Array1<f64>,
}

/// Everything the reporting stage derives from a final fit
#[derive(Debug, Clone, PartialEq)]
pub struct ClusterReport {
    pub clusters: Vec<ClusterSummary>,
    /// Centroids mapped back to original units (k, n_features)
    pub centroids: Array2<f64>,
    /// Max minus min of each feature across the original-unit centroids
    pub feature_spread: Array1<f64>,
}

impl ClusterReport {
    pub fn n_clusters(&self) -> usize {
        self.clusters.len()
    }

    pub fn total_rows(&self) -> usize {
        self.clusters.iter().map(|c| c.size).sum()
    }

    /// Fraction of all customers in each cluster
    pub fn shares(&self) -> Vec<f64> {
        let total = self.total_rows().max(1) as f64;
        self.clusters.iter().map(|c| c.size as f64 / total).collect()
    }

    /// Feature indices ordered by spread, most differentiating first
    pub fn features_by_spread(&self) -> Vec<usize> {
        let mut order: Vec<usize> = (0..self.feature_spread.len()).collect();
        order.sort_by(|&a, &b| self.feature_spread[b].total_cmp(&self.feature_spread[a]));
        order
    }
}

/// Summarize a clustering of `original` (raw, unscaled rows).
///
/// Cluster means are computed from the raw rows grouped by label, independent
/// of the scaler. The spread uses the inverse-transformed centroids.
pub fn summarize(
    original: &Array2<f64>,
    labels: &Array1<usize>,
    centroids_scaled: &Array2<f64>,
    standardizer: &Standardizer,
) -> Result<ClusterReport> {
    if original.nrows() == 0 {
        return Err(SegmentError::EmptyInput);
    }
    if labels.len() != original.nrows() {
        return Err(SegmentError::LabelMismatch {
            labels: labels.len(),
            rows: original.nrows(),
        });
    }

    let k = centroids_scaled.nrows();
    let n_features = original.ncols();

    let mut sizes = vec![0usize; k];
    let mut sums = Array2::<f64>::zeros((k, n_features));
    for (row, &label) in original.outer_iter().zip(labels.iter()) {
        if label >= k {
            return Err(SegmentError::LabelOutOfRange { label, k });
        }
        sizes[label] += 1;
        let mut sum = sums.row_mut(label);
        sum += &row;
    }

    if let Some(cluster) = sizes.iter().position(|&s| s == 0) {
        return Err(SegmentError::EmptyCluster { cluster });
    }

    let clusters = sums
        .outer_iter()
        .zip(sizes.iter())
        .enumerate()
        .map(|(cluster, (sum, &size))| ClusterSummary {
            cluster,
            size,
            means: sum.mapv(|v| v / size as f64),
        })
        .collect();

    let centroids = standardizer.inverse_transform(centroids_scaled)?;
    let feature_spread = centroids.map_axis(Axis(0), |column| {
        let max = column.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        let min = column.iter().copied().fold(f64::INFINITY, f64::min);
        max - min
    });

    Ok(ClusterReport {
        clusters,
        centroids,
        feature_spread,
    })
}

/// Pearson correlation between every pair of columns.
///
/// A column with zero variance correlates 0 with every other column and 1
/// with itself.
pub fn correlation_matrix(matrix: &Array2<f64>) -> Array2<f64> {
    let n_features = matrix.ncols();
    let mut corr = Array2::<f64>::eye(n_features);
    if matrix.nrows() < 2 {
        return corr;
    }

    let mean = matrix.mean_axis(Axis(0)).unwrap_or_else(|| Array1::zeros(n_features));
    let centered = matrix - &mean;
    let norms: Vec<f64> = centered
        .axis_iter(Axis(1))
        .map(|c| c.dot(&c).sqrt())
        .collect();

    for i in 0..n_features {
        for j in (i + 1)..n_features {
            let denom = norms[i] * norms[j];
            let r = if denom > 0.0 {
                centered.column(i).dot(&centered.column(j)) / denom
            } else {
                0.0
            };
            corr[[i, j]] = r;
            corr[[j, i]] = r;
        }
    }

    corr
}

/// Print cluster statistics to console
pub fn print_cluster_statistics(report: &ClusterReport) {
    println!("\nCluster Statistics Summary:");
    println!("==========================");

    for (summary, share) in report.clusters.iter().zip(report.shares()) {
        println!(
            "\nCluster {} - Size: {} customers ({:.1}%)",
            summary.cluster,
            summary.size,
            share * 100.0
        );
        println!("{}", "-".repeat(50));
        println!("Average characteristics:");
        for (feature, &mean) in Feature::ALL.iter().zip(summary.means.iter()) {
            println!("• {}: {}", feature.label(), feature.format_value(mean));
        }
    }

    println!("\nFeature Ranges Across Clusters:");
    println!("==============================");
    for (feature, &spread) in Feature::ALL.iter().zip(report.feature_spread.iter()) {
        println!("• {}: {:.2}", feature.column(), spread);
    }
}

/// Print the scaled-feature variance ranking
pub fn print_feature_variance(ranked: &[(usize, f64)]) {
    println!("\nFeature Variance (after scaling):");
    println!("=================================");
    for &(j, variance) in ranked {
        let name = Feature::ALL.get(j).map_or("?", Feature::column);
        println!("• {}: {:.3}", name, variance);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use ndarray::array;

    fn fitted(original: &Array2<f64>) -> Standardizer {
        let mut scaler = Standardizer::new();
        scaler.fit(original).unwrap();
        scaler
    }

    #[test]
    fn test_summarize_means_and_spread() {
        let original = array![[1.0, 100.0], [3.0, 300.0], [10.0, 1000.0], [12.0, 1200.0]];
        let scaler = fitted(&original);
        let labels = Array1::from(vec![0, 0, 1, 1]);
        let centroids = scaler
            .transform(&array![[2.0, 200.0], [11.0, 1100.0]])
            .unwrap();

        let report = summarize(&original, &labels, &centroids, &scaler).unwrap();

        assert_eq!(report.n_clusters(), 2);
        assert_eq!(report.total_rows(), 4);
        assert_eq!(report.clusters[0].size, 2);
        assert_relative_eq!(report.clusters[0].means[0], 2.0);
        assert_relative_eq!(report.clusters[1].means[1], 1100.0);
        assert_relative_eq!(report.feature_spread[0], 9.0, epsilon = 1e-9);
        assert_relative_eq!(report.feature_spread[1], 900.0, epsilon = 1e-9);
        assert_eq!(report.features_by_spread(), vec![1, 0]);
        assert_eq!(report.shares(), vec![0.5, 0.5]);
    }

    #[test]
    fn test_empty_cluster_detected() {
        let original = array![[1.0], [2.0], [3.0]];
        let scaler = fitted(&original);
        let labels = Array1::from(vec![0, 0, 2]);
        let centroids = array![[0.0], [1.0], [2.0]];

        let err = summarize(&original, &labels, &centroids, &scaler).unwrap_err();
        assert_eq!(err, SegmentError::EmptyCluster { cluster: 1 });
    }

    #[test]
    fn test_label_beyond_centroids() {
        let original = array![[1.0], [2.0], [3.0]];
        let scaler = fitted(&original);
        let labels = Array1::from(vec![0, 1, 2]);
        let centroids = array![[0.0], [1.0]];

        let err = summarize(&original, &labels, &centroids, &scaler).unwrap_err();
        assert_eq!(err, SegmentError::LabelOutOfRange { label: 2, k: 2 });
    }

    #[test]
    fn test_label_count_mismatch() {
        let original = array![[1.0], [2.0]];
        let scaler = fitted(&original);
        let err = summarize(&original, &Array1::from(vec![0]), &array![[0.0]], &scaler).unwrap_err();
        assert_eq!(err, SegmentError::LabelMismatch { labels: 1, rows: 2 });
    }

    #[test]
    fn test_correlation_matrix() {
        let data = array![[1.0, 2.0, 5.0, 7.0], [2.0, 4.0, 3.0, 7.0], [3.0, 6.0, 1.0, 7.0]];
        let corr = correlation_matrix(&data);

        assert_relative_eq!(corr[[0, 1]], 1.0, epsilon = 1e-12);
        assert_relative_eq!(corr[[0, 2]], -1.0, epsilon = 1e-12);
        assert_relative_eq!(corr[[2, 0]], -1.0, epsilon = 1e-12);
        assert_eq!(corr[[0, 3]], 0.0);
        assert_eq!(corr[[3, 3]], 1.0);
    }
}
