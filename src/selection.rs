//! Elbow scan over a range of cluster counts

use crate::error::{Result, SegmentError};
use crate::model::{KMeans, KMeansFit, DEFAULT_N_INIT};
use ndarray::{concatenate, Array2, Axis};
use rayon::prelude::*;
use std::ops::RangeInclusive;
use tracing::debug;

/// One point of the elbow curve
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ElbowPoint {
    pub k: usize,
    pub inertia: f64,
}

/// Inertia per k, ordered by k
#[derive(Debug, Clone, PartialEq)]
pub struct ElbowCurve {
    pub points: Vec<ElbowPoint>,
}

impl ElbowCurve {
    pub fn ks(&self) -> Vec<usize> {
        self.points.iter().map(|p| p.k).collect()
    }

    pub fn inertias(&self) -> Vec<f64> {
        self.points.iter().map(|p| p.inertia).collect()
    }

    /// Inertia removed by each step from k to k + 1, as `(k + 1, drop)`
    pub fn drops(&self) -> Vec<(usize, f64)> {
        self.points
            .windows(2)
            .map(|w| (w[1].k, w[0].inertia - w[1].inertia))
            .collect()
    }
}

/// Run one clustering per k in `k_range`, all with the same seed and
/// [`DEFAULT_N_INIT`] restarts.
///
/// The cold runs are independent and execute on the rayon pool; results are
/// collected by k, not by completion order. A run that comes out worse than
/// the best fit at k - 1 is refined from that fit's centroids plus its
/// farthest row, which keeps the curve non-increasing.
pub fn scan(matrix: &Array2<f64>, k_range: RangeInclusive<usize>, seed: u64) -> Result<ElbowCurve> {
    scan_with(
        matrix,
        k_range,
        &KMeans::new(1).with_seed(seed).with_n_init(DEFAULT_N_INIT),
    )
}

/// [`scan`] with caller-chosen iteration budget, tolerance and restarts.
/// `params.k` is ignored.
pub fn scan_with(
    matrix: &Array2<f64>,
    k_range: RangeInclusive<usize>,
    params: &KMeans,
) -> Result<ElbowCurve> {
    let (k_min, k_max) = (*k_range.start(), *k_range.end());
    if k_min > k_max {
        return Err(SegmentError::InvalidRange(format!("{}..={}", k_min, k_max)));
    }
    if matrix.nrows() == 0 {
        return Err(SegmentError::EmptyInput);
    }
    if k_min == 0 || k_max > matrix.nrows() {
        let k = if k_min == 0 { k_min } else { k_max };
        return Err(SegmentError::InvalidClusterCount {
            k,
            rows: matrix.nrows(),
        });
    }

    let cold: Vec<KMeansFit> = (k_min..=k_max)
        .into_par_iter()
        .map(|k| {
            let mut trial = params.clone();
            trial.k = k;
            trial.fit(matrix)
        })
        .collect::<Result<_>>()?;

    let mut points = Vec::with_capacity(cold.len());
    let mut previous: Option<KMeansFit> = None;

    for (k, fit) in (k_min..=k_max).zip(cold) {
        let fit = match previous {
            Some(prev) if fit.inertia > prev.inertia => {
                let warm = refine_from(matrix, &prev, params)?;
                debug!(k, cold = fit.inertia, warm = warm.inertia, "warm-started elbow trial");
                if warm.inertia < fit.inertia {
                    warm
                } else {
                    fit
                }
            }
            _ => fit,
        };

        debug!(k, inertia = fit.inertia, "elbow point");
        points.push(ElbowPoint {
            k,
            inertia: fit.inertia,
        });
        previous = Some(fit);
    }

    Ok(ElbowCurve { points })
}

/// Lloyd refinement from `prev`'s centroids plus the row farthest from its centroid
fn refine_from(matrix: &Array2<f64>, prev: &KMeansFit, params: &KMeans) -> Result<KMeansFit> {
    let farthest = prev.farthest_row(matrix).ok_or(SegmentError::EmptyInput)?;
    let initial = concatenate(
        Axis(0),
        &[
            prev.centroids.view(),
            matrix.select(Axis(0), &[farthest]).view(),
        ],
    )
    .map_err(|_| SegmentError::DimensionMismatch {
        expected: prev.centroids.ncols(),
        found: matrix.ncols(),
    })?;

    params.fit_from(matrix, initial)
}
