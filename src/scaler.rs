//! Zero-mean, unit-variance feature scaling

use crate::error::{Result, SegmentError};
use ndarray::{Array1, Array2, Axis};

/// Relative spread below which a column counts as constant
const DEGENERATE_STD_RTOL: f64 = 1e-12;

/// Per-feature mean and population standard deviation computed by [`Standardizer::fit`]
#[derive(Debug, Clone, PartialEq)]
pub struct ScalingParams {
    pub mean: Array1<f64>,
    pub std: Array1<f64>,
}

impl ScalingParams {
    /// Number of features the parameters were fitted on
    pub fn n_features(&self) -> usize {
        self.mean.len()
    }

    /// A feature is degenerate when it has no spread to divide by.
    /// Rounding noise on a constant column (e.g. a mean of repeated 0.1) still counts.
    pub fn is_degenerate(&self, feature: usize) -> bool {
        let std = self.std[feature];
        !std.is_finite() || std <= DEGENERATE_STD_RTOL * self.mean[feature].abs().max(1.0)
    }
}

/// Standard scaler with an explicit zero-variance policy.
///
/// Constant columns transform to 0 for every row and inverse-transform back to
/// the column mean, so no NaN or Inf is ever produced.
#[derive(Debug, Clone, Default)]
pub struct Standardizer {
    params: Option<ScalingParams>,
}

impl Standardizer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Compute and store per-column mean and standard deviation
    pub fn fit(&mut self, matrix: &Array2<f64>) -> Result<&ScalingParams> {
        if matrix.nrows() == 0 {
            return Err(SegmentError::EmptyInput);
        }

        let mean = matrix.mean_axis(Axis(0)).ok_or(SegmentError::EmptyInput)?;
        let std = matrix.std_axis(Axis(0), 0.0);

        Ok(&*self.params.insert(ScalingParams { mean, std }))
    }

    /// Fit on `matrix` and return its scaled copy
    pub fn fit_transform(&mut self, matrix: &Array2<f64>) -> Result<Array2<f64>> {
        self.fit(matrix)?;
        self.transform(matrix)
    }

    /// Fitted parameters, if any
    pub fn params(&self) -> Option<&ScalingParams> {
        self.params.as_ref()
    }

    /// `(x - mean) / std` per column, 0 for degenerate columns
    pub fn transform(&self, matrix: &Array2<f64>) -> Result<Array2<f64>> {
        let params = self.checked_params(matrix)?;
        let mut scaled = matrix.clone();

        for (j, mut column) in scaled.axis_iter_mut(Axis(1)).enumerate() {
            if params.is_degenerate(j) {
                column.fill(0.0);
            } else {
                let (mean, std) = (params.mean[j], params.std[j]);
                column.mapv_inplace(|x| (x - mean) / std);
            }
        }

        Ok(scaled)
    }

    /// `x * std + mean` per column, the column mean for degenerate columns
    pub fn inverse_transform(&self, matrix: &Array2<f64>) -> Result<Array2<f64>> {
        let params = self.checked_params(matrix)?;
        let mut restored = matrix.clone();

        for (j, mut column) in restored.axis_iter_mut(Axis(1)).enumerate() {
            let mean = params.mean[j];
            if params.is_degenerate(j) {
                column.fill(mean);
            } else {
                let std = params.std[j];
                column.mapv_inplace(|x| x * std + mean);
            }
        }

        Ok(restored)
    }

    fn checked_params(&self, matrix: &Array2<f64>) -> Result<&ScalingParams> {
        let params = self.params.as_ref().ok_or(SegmentError::NotFitted)?;
        if matrix.ncols() != params.n_features() {
            return Err(SegmentError::DimensionMismatch {
                expected: params.n_features(),
                found: matrix.ncols(),
            });
        }
        Ok(params)
    }
}

/// Population variance of every column of a (typically scaled) matrix,
/// sorted from highest to lowest. Ties keep column order.
pub fn feature_variance(scaled: &Array2<f64>) -> Vec<(usize, f64)> {
    let variance = scaled.var_axis(Axis(0), 0.0);
    let mut ranked: Vec<(usize, f64)> = variance.iter().copied().enumerate().collect();
    ranked.sort_by(|a, b| b.1.total_cmp(&a.1));
    ranked
}
