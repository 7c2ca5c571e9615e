//! Velocity-threshold microsaccade detection.
//!
//! Implements the detector of Engbert & Kliegl (2003) as refined by Engbert &
//! Mergenthaler (2006): positions are differentiated with a 5-sample kernel,
//! each axis gets a median-based noise estimate, and samples outside an
//! ellipse of `lambda` noise units are candidate saccade samples. Runs of at
//! least `min_run` candidates mark one saccade, reported at its first sample.
//!
//! refs:
//! - Engbert & Kliegl 2003 <https://doi.org/10.1016/S0042-6989(03)00084-1>
//! - Engbert & Mergenthaler 2006 <https://doi.org/10.1073/pnas.0509557103>

use ndarray::{Array2, ArrayView2, ArrayViewD, Ix2};
use thiserror::Error;

/// Errors raised by saccade detectors.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DetectError {
    #[error("shape of saccade data is incorrect: expected a 2D matrix, got {ndim} dimensions")]
    InvalidRank { ndim: usize },

    #[error("saccade data should have 2 columns (x, y) but has {columns}")]
    InvalidShape { columns: usize },

    #[error("invalid sampling rate: {0}")]
    InvalidSamplingRate(f64),
}

/// Tunables of the velocity-threshold detector.
#[derive(Debug, Clone, PartialEq)]
pub struct DetectorConfig {
    /// Threshold radius in units of the median-based velocity SD
    pub lambda: f64,
    /// Minimum number of consecutive above-threshold samples
    pub min_run: usize,
    /// Maximum onset distance (samples) for left/right agreement
    pub binocular_tolerance: usize,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            lambda: 5.0,
            min_run: 2,
            binocular_tolerance: 20,
        }
    }
}

/// A detector producing one onset flag per sample.
pub trait SaccadeDetector {
    /// Detects saccade onsets in an `n x 2` matrix of (x, y) positions
    /// sampled at `sf` Hz. The result has length `n`.
    fn detect(&self, positions: ArrayView2<'_, f64>, sf: f64) -> Result<Vec<bool>, DetectError>;
}

/// Selector for the available detectors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DetectorKind {
    #[default]
    EngbertMergenthaler,
}

impl DetectorKind {
    pub fn detector(&self, config: DetectorConfig) -> Box<dyn SaccadeDetector> {
        match self {
            Self::EngbertMergenthaler => Box::new(EngbertMergenthaler::new(config)),
        }
    }
}

/// Checks that an arbitrary-rank array is a position matrix.
pub fn as_position_matrix(positions: ArrayViewD<'_, f64>) -> Result<ArrayView2<'_, f64>, DetectError> {
    let ndim = positions.ndim();
    positions
        .into_dimensionality::<Ix2>()
        .map_err(|_| DetectError::InvalidRank { ndim })
}

/// Engbert & Mergenthaler microsaccade detector.
#[derive(Debug, Clone, Default)]
pub struct EngbertMergenthaler {
    config: DetectorConfig,
}

impl EngbertMergenthaler {
    pub fn new(config: DetectorConfig) -> Self {
        Self { config }
    }

    /// Per-axis velocities.
    ///
    /// Interior samples use `sf/6 * (x[i+2] + x[i+1] - x[i-1] - x[i-2])`,
    /// the second and second-to-last samples a central difference
    /// `sf/2 * (x[i+1] - x[i-1])`. The outermost samples stay 0.
    pub fn velocities(positions: ArrayView2<'_, f64>, sf: f64) -> Array2<f64> {
        let n = positions.nrows();
        let mut velocities = Array2::zeros((n, 2));
        if n < 3 {
            return velocities;
        }

        for axis in 0..2 {
            let x = positions.column(axis);
            for i in 2..n - 2 {
                velocities[[i, axis]] = sf / 6.0 * (x[i + 2] + x[i + 1] - x[i - 1] - x[i - 2]);
            }
            velocities[[1, axis]] = sf / 2.0 * (x[2] - x[0]);
            velocities[[n - 2, axis]] = sf / 2.0 * (x[n - 1] - x[n - 3]);
        }
        velocities
    }

    /// Median-based velocity SD per axis: `sqrt(median(v^2) - median(v)^2)`.
    pub fn noise_estimates(velocities: ArrayView2<'_, f64>) -> [f64; 2] {
        let estimate = |axis: usize| {
            let v: Vec<f64> = velocities.column(axis).to_vec();
            let squared: Vec<f64> = v.iter().map(|x| x * x).collect();
            let med = median(v);
            (median(squared) - med * med).max(0.0).sqrt()
        };
        [estimate(0), estimate(1)]
    }

    /// Flags samples outside the threshold ellipse.
    ///
    /// An axis whose radius is zero or undefined contributes nothing, so
    /// noise-free input never crosses the threshold.
    fn above_threshold(velocities: ArrayView2<'_, f64>, radius: [f64; 2]) -> Vec<bool> {
        velocities
            .rows()
            .into_iter()
            .map(|v| {
                let term = |axis: usize| {
                    let r = radius[axis];
                    if r > 0.0 && r.is_finite() {
                        (v[axis] / r).powi(2)
                    } else {
                        0.0
                    }
                };
                // NaN sums compare false
                term(0) + term(1) > 1.0
            })
            .collect()
    }

    /// Marks the first sample of every run of at least `min_run` flags.
    fn run_onsets(flags: &[bool], min_run: usize) -> Vec<bool> {
        let mut onsets = vec![false; flags.len()];
        let mut i = 0;
        while i < flags.len() {
            if !flags[i] {
                i += 1;
                continue;
            }
            let start = i;
            while i < flags.len() && flags[i] {
                i += 1;
            }
            if i - start >= min_run.max(1) {
                onsets[start] = true;
            }
        }
        onsets
    }
}

impl SaccadeDetector for EngbertMergenthaler {
    fn detect(&self, positions: ArrayView2<'_, f64>, sf: f64) -> Result<Vec<bool>, DetectError> {
        if positions.ncols() != 2 {
            return Err(DetectError::InvalidShape {
                columns: positions.ncols(),
            });
        }
        if !(sf.is_finite() && sf > 0.0) {
            return Err(DetectError::InvalidSamplingRate(sf));
        }

        let velocities = Self::velocities(positions, sf);
        let [msd_x, msd_y] = Self::noise_estimates(velocities.view());
        let radius = [self.config.lambda * msd_x, self.config.lambda * msd_y];
        let flags = Self::above_threshold(velocities.view(), radius);
        Ok(Self::run_onsets(&flags, self.config.min_run))
    }
}

/// Median of the finite values, `NaN` if there are none.
fn median(mut values: Vec<f64>) -> f64 {
    values.retain(|v| v.is_finite());
    if values.is_empty() {
        return f64::NAN;
    }
    values.sort_by(f64::total_cmp);
    let mid = values.len() / 2;
    if values.len() % 2 == 0 {
        (values[mid - 1] + values[mid]) / 2.0
    } else {
        values[mid]
    }
}

/// Onset vectors of every detected eye and the combined result.
#[derive(Debug, Clone, PartialEq)]
pub struct DetectedSaccades {
    pub left: Option<Vec<bool>>,
    pub right: Option<Vec<bool>>,
    /// Binocular-merged onsets, or the single eye's onsets
    pub onsets: Vec<bool>,
}

impl DetectedSaccades {
    pub fn combine(left: Option<Vec<bool>>, right: Option<Vec<bool>>, tolerance: usize) -> Self {
        let onsets = match (&left, &right) {
            (Some(l), Some(r)) => merge_binocular(l, r, tolerance),
            (Some(only), None) | (None, Some(only)) => only.clone(),
            (None, None) => Vec::new(),
        };
        Self {
            left,
            right,
            onsets,
        }
    }

    /// Sample indices of the combined onsets.
    pub fn onset_indices(&self) -> Vec<usize> {
        onset_indices(&self.onsets)
    }
}

fn onset_indices(onsets: &[bool]) -> Vec<usize> {
    onsets
        .iter()
        .enumerate()
        .filter_map(|(i, &o)| o.then_some(i))
        .collect()
}

/// Keeps onsets seen by both eyes.
///
/// Every right-eye onset is paired with the nearest left-eye onset (the
/// earlier one on ties). Pairs at most `tolerance` samples apart yield one
/// onset at the earlier index of the pair.
pub fn merge_binocular(left: &[bool], right: &[bool], tolerance: usize) -> Vec<bool> {
    let mut merged = vec![false; left.len().max(right.len())];
    let left_idx = onset_indices(left);
    if left_idx.is_empty() {
        return merged;
    }

    for r in onset_indices(right) {
        let p = left_idx.partition_point(|&l| l < r);
        let nearest = [p.checked_sub(1), (p < left_idx.len()).then_some(p)]
            .into_iter()
            .flatten()
            .map(|k| left_idx[k])
            .min_by_key(|&l| l.abs_diff(r));
        if let Some(l) = nearest {
            if l.abs_diff(r) <= tolerance {
                merged[l.min(r)] = true;
            }
        }
    }
    merged
}
