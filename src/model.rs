//! K-Means clustering engine
//!
//! Lloyd's iterative relocation over a scaled feature matrix. Centroids are
//! seeded from k distinct rows drawn D²-weighted (k-means++) from a
//! `ChaCha8Rng` seeded by the caller, so the same matrix and seed always yield
//! the same labels, centroids and inertia.

use crate::error::{DidNotConverge, Result, SegmentError};
use ndarray::{Array1, Array2, ArrayView1, Axis};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use tracing::debug;

/// Default iteration budget per run
pub const DEFAULT_MAX_ITERS: usize = 300;

/// Default bound on the summed squared centroid displacement
pub const DEFAULT_TOLERANCE: f64 = 1e-4;

/// Seeded restarts used by the pipeline and the elbow scan
pub const DEFAULT_N_INIT: usize = 10;

/// K-Means parameters
#[derive(Debug, Clone, PartialEq)]
pub struct KMeans {
    /// Number of clusters
    pub k: usize,
    /// Seed for centroid initialization
    pub seed: u64,
    /// Maximum Lloyd iterations per run
    pub max_iters: usize,
    /// Convergence threshold on centroid movement
    pub tolerance: f64,
    /// Number of seeded restarts; run `r` uses `seed + r`
    pub n_init: usize,
}

impl KMeans {
    pub fn new(k: usize) -> Self {
        Self {
            k,
            seed: 0,
            max_iters: DEFAULT_MAX_ITERS,
            tolerance: DEFAULT_TOLERANCE,
            n_init: 1,
        }
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

    /// Cluster `matrix` from seeded initial centroids.
    ///
    /// With `n_init > 1` every restart is run and the lowest-inertia fit is
    /// kept; ties go to the earliest restart.
    pub fn fit(&self, matrix: &Array2<f64>) -> Result<KMeansFit> {
        validate(matrix, self.k)?;

        let mut best: Option<KMeansFit> = None;
        for run in 0..self.n_init.max(1) {
            let run_seed = self.seed.wrapping_add(run as u64);
            let mut rng = ChaCha8Rng::seed_from_u64(run_seed);
            let initial = initialize_centroids(matrix, self.k, &mut rng);
            let fit = self.lloyd(matrix, initial);

            debug!(
                k = self.k,
                run,
                seed = run_seed,
                inertia = fit.inertia,
                iterations = fit.n_iterations,
                "k-means run finished"
            );

            if best.as_ref().map_or(true, |b| fit.inertia < b.inertia) {
                best = Some(fit);
            }
        }

        best.ok_or(SegmentError::EmptyInput)
    }

    /// Refine caller-supplied centroids instead of drawing seeded ones.
    ///
    /// `self.k` is ignored; the cluster count is the number of rows in `initial`.
    pub fn fit_from(&self, matrix: &Array2<f64>, initial: Array2<f64>) -> Result<KMeansFit> {
        validate(matrix, initial.nrows())?;
        if initial.ncols() != matrix.ncols() {
            return Err(SegmentError::DimensionMismatch {
                expected: matrix.ncols(),
                found: initial.ncols(),
            });
        }
        Ok(self.lloyd(matrix, initial))
    }

    fn lloyd(&self, matrix: &Array2<f64>, mut centroids: Array2<f64>) -> KMeansFit {
        let k = centroids.nrows();
        let n_samples = matrix.nrows();

        let mut labels = Array1::<usize>::zeros(n_samples);
        let mut distances = Array1::<f64>::zeros(n_samples);
        assign_nearest(matrix, &centroids, &mut labels, &mut distances);

        let mut converged = false;
        let mut n_iterations = 0;

        for iteration in 0..self.max_iters {
            n_iterations = iteration + 1;

            let updated = update_centroids(matrix, &mut labels, &distances, k);
            let shift = centroid_shift(&centroids, &updated);
            centroids = updated;

            // Labels from the update step have no empty cluster and the
            // centroids are their means; reassigning could collapse a reseed
            if shift <= self.tolerance {
                debug!(iteration = n_iterations, shift, "k-means centroids settled");
                converged = true;
                break;
            }

            let changed = assign_nearest(matrix, &centroids, &mut labels, &mut distances);

            debug!(iteration = n_iterations, shift, changed, "k-means iteration");

            if changed == 0 {
                converged = true;
                break;
            }
        }

        if !converged {
            // Budget exhausted: make centroids the means of the final labels
            centroids = update_centroids(matrix, &mut labels, &distances, k);
        }

        let inertia = compute_inertia(matrix, &labels, &centroids);

        KMeansFit {
            labels,
            centroids,
            inertia,
            n_iterations,
            converged,
        }
    }
}

/// Outcome of one clustering call
#[derive(Debug, Clone, PartialEq)]
pub struct KMeansFit {
    /// Cluster id in [0, k) for every row
    pub labels: Array1<usize>,
    /// Centroids in scaled feature space (k, n_features)
    pub centroids: Array2<f64>,
    /// Sum of squared distances from each row to its centroid
    pub inertia: f64,
    /// Lloyd iterations performed
    pub n_iterations: usize,
    /// Whether a convergence criterion was met within the budget
    pub converged: bool,
}

impl KMeansFit {
    pub fn n_clusters(&self) -> usize {
        self.centroids.nrows()
    }

    /// Get cluster sizes
    pub fn cluster_sizes(&self) -> Vec<usize> {
        cluster_sizes(&self.labels, self.n_clusters())
    }

    /// The non-fatal convergence warning, if the budget ran out
    pub fn warning(&self) -> Option<DidNotConverge> {
        (!self.converged).then_some(DidNotConverge {
            iterations: self.n_iterations,
        })
    }

    /// Row with the largest squared distance to its own centroid, lowest index on ties
    pub fn farthest_row(&self, matrix: &Array2<f64>) -> Option<usize> {
        matrix
            .outer_iter()
            .zip(self.labels.iter())
            .map(|(row, &label)| squared_distance(&row, &self.centroids.row(label)))
            .enumerate()
            .fold(None, |best: Option<(usize, f64)>, (i, d)| match best {
                Some((_, best_d)) if best_d >= d => best,
                _ => Some((i, d)),
            })
            .map(|(i, _)| i)
    }
}

/// Single seeded Lloyd run: the engine's basic contract
pub fn cluster(matrix: &Array2<f64>, k: usize, seed: u64, max_iterations: usize) -> Result<KMeansFit> {
    KMeans::new(k)
        .with_seed(seed)
        .with_max_iters(max_iterations)
        .fit(matrix)
}

fn validate(matrix: &Array2<f64>, k: usize) -> Result<()> {
    let rows = matrix.nrows();
    if rows == 0 {
        return Err(SegmentError::EmptyInput);
    }
    if k == 0 || k > rows {
        return Err(SegmentError::InvalidClusterCount { k, rows });
    }
    Ok(())
}

/// Draw k distinct rows as the starting centroids.
///
/// The first row is uniform; each further row is drawn with probability
/// proportional to its squared distance from the nearest row already drawn.
/// Once every remaining row coincides with a drawn one, the draw falls back to
/// uniform over the rows not yet taken.
fn initialize_centroids(matrix: &Array2<f64>, k: usize, rng: &mut ChaCha8Rng) -> Array2<f64> {
    let n_samples = matrix.nrows();
    let mut chosen = Vec::with_capacity(k);
    chosen.push(rng.gen_range(0..n_samples));

    let first = matrix.row(chosen[0]);
    let mut min_distances: Vec<f64> = matrix
        .outer_iter()
        .map(|row| squared_distance(&row, &first))
        .collect();

    while chosen.len() < k {
        let total: f64 = min_distances.iter().sum();

        let next = if total > 0.0 && total.is_finite() {
            let mut target = rng.gen::<f64>() * total;
            let mut pick = None;
            let mut last_positive = 0;
            for (i, &d) in min_distances.iter().enumerate() {
                if d <= 0.0 {
                    continue;
                }
                last_positive = i;
                if target < d {
                    pick = Some(i);
                    break;
                }
                target -= d;
            }
            pick.unwrap_or(last_positive)
        } else {
            let remaining: Vec<usize> = (0..n_samples).filter(|i| !chosen.contains(i)).collect();
            remaining[rng.gen_range(0..remaining.len())]
        };

        chosen.push(next);
        let drawn = matrix.row(next);
        for (d, row) in min_distances.iter_mut().zip(matrix.outer_iter()) {
            *d = d.min(squared_distance(&row, &drawn));
        }
    }

    matrix.select(Axis(0), &chosen)
}

/// Assign every row to its nearest centroid; returns how many labels changed
fn assign_nearest(
    matrix: &Array2<f64>,
    centroids: &Array2<f64>,
    labels: &mut Array1<usize>,
    distances: &mut Array1<f64>,
) -> usize {
    let mut changed = 0;

    for (i, row) in matrix.outer_iter().enumerate() {
        let (nearest, distance) = nearest_centroid(&row, centroids);
        if labels[i] != nearest {
            labels[i] = nearest;
            changed += 1;
        }
        distances[i] = distance;
    }

    changed
}

/// Nearest centroid by squared distance; exact ties go to the lowest index
fn nearest_centroid(point: &ArrayView1<f64>, centroids: &Array2<f64>) -> (usize, f64) {
    let mut min_distance = f64::INFINITY;
    let mut closest_cluster = 0;

    for (cluster_idx, centroid) in centroids.outer_iter().enumerate() {
        let distance = squared_distance(point, &centroid);
        if distance < min_distance {
            min_distance = distance;
            closest_cluster = cluster_idx;
        }
    }

    (closest_cluster, min_distance)
}

/// Recompute centroids as member means.
///
/// Each empty cluster, in ascending id order, takes over the row farthest from
/// its current centroid among rows whose cluster has more than one member.
/// `labels` is updated for the moved rows.
fn update_centroids(
    matrix: &Array2<f64>,
    labels: &mut Array1<usize>,
    distances: &Array1<f64>,
    k: usize,
) -> Array2<f64> {
    let mut counts = cluster_sizes(labels, k);

    for cluster in 0..k {
        if counts[cluster] > 0 {
            continue;
        }

        let donor = (0..labels.len())
            .filter(|&i| counts[labels[i]] > 1)
            .fold(None, |best: Option<usize>, i| match best {
                Some(b) if distances[b] >= distances[i] => Some(b),
                _ => Some(i),
            });

        // k <= rows, so some cluster holds two rows while another is empty
        if let Some(row) = donor {
            counts[labels[row]] -= 1;
            labels[row] = cluster;
            counts[cluster] = 1;
            debug!(cluster, row, "reseeded empty cluster from farthest row");
        }
    }

    let mut centroids = Array2::<f64>::zeros((k, matrix.ncols()));
    for (row, &label) in matrix.outer_iter().zip(labels.iter()) {
        let mut sum = centroids.row_mut(label);
        sum += &row;
    }
    for (mut centroid, &count) in centroids.outer_iter_mut().zip(counts.iter()) {
        if count > 0 {
            centroid /= count as f64;
        }
    }

    centroids
}

/// Sum of squared centroid displacement
fn centroid_shift(previous: &Array2<f64>, current: &Array2<f64>) -> f64 {
    previous
        .iter()
        .zip(current.iter())
        .map(|(a, b)| (a - b).powi(2))
        .sum()
}

fn cluster_sizes(labels: &Array1<usize>, k: usize) -> Vec<usize> {
    let mut sizes = vec![0; k];
    for &label in labels.iter() {
        if label < k {
            sizes[label] += 1;
        }
    }
    sizes
}

/// Compute within-cluster sum of squares (inertia)
pub fn compute_inertia(features: &Array2<f64>, labels: &Array1<usize>, centroids: &Array2<f64>) -> f64 {
    features
        .outer_iter()
        .zip(labels.iter())
        .filter(|&(_, &cluster)| cluster < centroids.nrows())
        .map(|(point, &cluster)| squared_distance(&point, &centroids.row(cluster)))
        .sum()
}

/// Squared Euclidean distance between two points
pub fn squared_distance(point1: &ArrayView1<f64>, point2: &ArrayView1<f64>) -> f64 {
    point1
        .iter()
        .zip(point2.iter())
        .map(|(a, b)| (a - b).powi(2))
        .sum::<f64>()
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use ndarray::array;

    fn two_blobs() -> Array2<f64> {
        array![
            [0.0, 0.0],
            [0.5, 0.2],
            [0.1, 0.6],
            [100.0, 100.0],
            [100.4, 99.7],
            [99.8, 100.3]
        ]
    }

    #[test]
    fn test_two_blobs() {
        let data = two_blobs();
        let fit = cluster(&data, 2, 42, 100).unwrap();

        assert!(fit.converged);
        assert_eq!(fit.n_clusters(), 2);
        let first = fit.labels[0];
        assert!(fit.labels.iter().take(3).all(|&l| l == first));
        assert!(fit.labels.iter().skip(3).all(|&l| l != first));

        // inter-blob squared distance is ~20000
        assert!(fit.inertia < 1.0);
        assert_eq!(fit.cluster_sizes(), vec![3, 3]);
    }

    #[test]
    fn test_k_equals_rows() {
        let data = two_blobs();
        let fit = cluster(&data, 6, 7, 100).unwrap();

        assert_eq!(fit.cluster_sizes(), vec![1; 6]);
        assert_relative_eq!(fit.inertia, 0.0);
    }

    #[test]
    fn test_deterministic() {
        let data = array![
            [1.0, 2.0],
            [1.5, 1.8],
            [5.0, 8.0],
            [8.0, 8.0],
            [1.0, 0.6],
            [9.0, 11.0],
            [8.0, 2.0],
            [10.0, 2.0],
            [9.0, 3.0]
        ];
        let a = cluster(&data, 3, 42, 300).unwrap();
        let b = cluster(&data, 3, 42, 300).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_invalid_cluster_count() {
        let data = two_blobs();
        assert_eq!(
            cluster(&data, 0, 42, 100).unwrap_err(),
            SegmentError::InvalidClusterCount { k: 0, rows: 6 }
        );
        assert_eq!(
            cluster(&data, 7, 42, 100).unwrap_err(),
            SegmentError::InvalidClusterCount { k: 7, rows: 6 }
        );
    }

    #[test]
    fn test_empty_input() {
        let data = Array2::<f64>::zeros((0, 2));
        assert_eq!(cluster(&data, 1, 42, 100).unwrap_err(), SegmentError::EmptyInput);
    }

    #[test]
    fn test_empty_cluster_is_reseeded() {
        let data = array![[0.0], [1.0], [2.0], [10.0]];
        // the second centroid attracts nothing on the first assignment
        let initial = array![[1.0], [1000.0]];
        let fit = KMeans::new(2).fit_from(&data, initial).unwrap();

        let sizes = fit.cluster_sizes();
        assert!(sizes.iter().all(|&s| s > 0));
        assert_eq!(sizes.iter().sum::<usize>(), 4);
        // 10.0 is the farthest row and ends alone
        assert_eq!(fit.labels[3], 1);
        assert_eq!(fit.cluster_sizes(), vec![3, 1]);
    }

    #[test]
    fn test_duplicate_rows_converge() {
        let data = array![[1.0, 1.0], [1.0, 1.0], [1.0, 1.0], [5.0, 5.0]];
        let fit = cluster(&data, 3, 42, 50).unwrap();

        assert!(fit.converged);
        assert_eq!(fit.warning(), None);
        assert!(fit.n_iterations < 50);
        assert!(fit.cluster_sizes().iter().all(|&s| s > 0));
        assert_eq!(fit.cluster_sizes().iter().sum::<usize>(), 4);
        assert_relative_eq!(fit.inertia, 0.0);
    }

    #[test]
    fn test_ties_go_to_lowest_centroid() {
        let centroids = array![[-1.0], [1.0]];
        let point = array![0.0];
        let (nearest, distance) = nearest_centroid(&point.view(), &centroids);
        assert_eq!(nearest, 0);
        assert_relative_eq!(distance, 1.0);
    }

    #[test]
    fn test_did_not_converge_warning() {
        let data = Array2::from_shape_vec((10, 1), (0..10).map(f64::from).collect()).unwrap();
        let fit = KMeans::new(2)
            .with_max_iters(1)
            .fit_from(&data, array![[0.0], [1.0]])
            .unwrap();

        assert!(!fit.converged);
        assert_eq!(fit.warning(), Some(DidNotConverge { iterations: 1 }));
        assert!(fit.cluster_sizes().iter().all(|&s| s > 0));
    }

    #[test]
    fn test_restarts_never_worse_than_first_run() {
        let data = array![
            [0.0, 0.0],
            [0.0, 1.0],
            [4.0, 0.0],
            [4.0, 1.0],
            [8.0, 0.0],
            [8.0, 1.0],
            [2.0, 5.0],
            [6.0, 5.0]
        ];
        let single = KMeans::new(3).with_seed(3).fit(&data).unwrap();
        let multi = KMeans::new(3).with_seed(3).with_n_init(8).fit(&data).unwrap();
        assert!(multi.inertia <= single.inertia);
    }

    #[test]
    fn test_inertia_matches_labels() {
        let data = two_blobs();
        let fit = cluster(&data, 2, 1, 100).unwrap();
        assert_relative_eq!(
            fit.inertia,
            compute_inertia(&data, &fit.labels, &fit.centroids),
            epsilon = 1e-12
        );
    }

    #[test]
    fn test_initial_rows_are_distinct() {
        let data = array![[0.0], [0.0], [0.0], [1.0], [1.0]];
        let mut rng = ChaCha8Rng::seed_from_u64(11);
        let centroids = initialize_centroids(&data, 5, &mut rng);
        let mut values: Vec<f64> = centroids.iter().copied().collect();
        values.sort_by(f64::total_cmp);
        assert_eq!(values, vec![0.0, 0.0, 0.0, 1.0, 1.0]);
    }

    #[test]
    fn test_farthest_row() {
        let data = array![[0.0], [1.0], [5.0]];
        let fit = KMeans::new(1).fit_from(&data, array![[2.0]]).unwrap();
        assert_eq!(fit.farthest_row(&data), Some(2));
    }
}
