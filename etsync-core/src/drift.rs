//! Clock drift correction per matched block pair.
//!
//! After the nominal resampling, the two clocks still disagree slightly
//! (about 1 ms per 10 s of recording). The drift factor of a block compares
//! the latency between the first matched trigger and a late, reliably matched
//! "anchor" trigger in both modalities.

/// Default maximal position difference of an anchor pair, in ET clock ticks.
pub const DEFAULT_ANCHOR_TOLERANCE: f64 = 100.0;

/// Default share of matched pairs examined while searching for an anchor.
pub const DEFAULT_ANCHOR_SEARCH_FRACTION: f64 = 0.75;

/// Pairs equal values of `a` and `b` in sequential order.
///
/// The shorter sequence is scanned left to right with a cursor into the
/// longer one; each value is matched to its first occurrence at or after the
/// cursor, and unmatched values are skipped. This is a greedy scan, not a
/// longest common subsequence: an early match can consume positions a later
/// value needed, so repeated codes may yield fewer pairs than optimal.
///
/// Returns `(index_in_a, index_in_b)` pairs, increasing in both.
pub fn common_sequential_elements(a: &[i32], b: &[i32]) -> Vec<(usize, usize)> {
    let a_is_shorter = a.len() < b.len();
    let (short, long) = if a_is_shorter { (a, b) } else { (b, a) };

    let mut pairs = Vec::new();
    let mut j = 0;
    for (i, &value) in short.iter().enumerate() {
        if j >= long.len() {
            break;
        }
        if let Some(k) = long[j..].iter().position(|&v| v == value) {
            pairs.push((i, j + k));
            j += k + 1;
        }
    }

    if a_is_shorter {
        pairs
    } else {
        pairs.into_iter().map(|(s, l)| (l, s)).collect()
    }
}

/// Outcome of drift estimation for one block pair.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum DriftEstimate {
    /// An anchor was found.
    Anchored {
        /// ET span over EEG span between the first matched pair and the anchor
        factor: f64,
        /// Index of the anchor among the matched pairs
        anchor: usize,
        /// Number of matched trigger pairs
        pairs: usize,
    },
    /// No anchor within the search budget; the nominal ratio applies.
    Failed { pairs: usize },
}

impl DriftEstimate {
    /// Drift factor to apply on top of the nominal rate ratio.
    pub fn factor(&self) -> f64 {
        match self {
            Self::Anchored { factor, .. } => *factor,
            Self::Failed { .. } => 1.0,
        }
    }

    pub fn is_fine_tuned(&self) -> bool {
        matches!(self, Self::Anchored { .. })
    }

    pub fn pairs(&self) -> usize {
        match self {
            Self::Anchored { pairs, .. } | Self::Failed { pairs } => *pairs,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DriftCorrector {
    tolerance: f64,
    search_fraction: f64,
}

impl Default for DriftCorrector {
    fn default() -> Self {
        Self::new(DEFAULT_ANCHOR_TOLERANCE, DEFAULT_ANCHOR_SEARCH_FRACTION)
    }
}

impl DriftCorrector {
    pub fn new(tolerance: f64, search_fraction: f64) -> Self {
        Self {
            tolerance,
            search_fraction: search_fraction.clamp(0.0, 1.0),
        }
    }

    /// Estimates the drift factor of a block pair.
    ///
    /// Both signals are dense code arrays starting at the block's start
    /// marker, with the EEG signal already expressed in ET clock ticks.
    /// Walking back from the last matched pair, the first pair whose
    /// positions differ by less than the tolerance is the anchor. At most
    /// `ceil(search_fraction * pairs)` pairs are examined and the first
    /// matched pair can not serve as its own anchor.
    pub fn estimate(&self, eeg_signal: &[i32], et_signal: &[i32]) -> DriftEstimate {
        let (eeg_pos, eeg_codes) = nonzero(eeg_signal);
        let (et_pos, et_codes) = nonzero(et_signal);
        let pairs = common_sequential_elements(&eeg_codes, &et_codes);
        let n = pairs.len();
        if n < 2 {
            return DriftEstimate::Failed { pairs: n };
        }

        let budget = ((n as f64) * self.search_fraction).ceil() as usize;
        let (first_eeg, first_et) = (eeg_pos[pairs[0].0], et_pos[pairs[0].1]);

        for k in (1..n).rev().take(budget) {
            let (eeg, et) = (eeg_pos[pairs[k].0], et_pos[pairs[k].1]);
            if (et - eeg).abs() >= self.tolerance {
                continue;
            }
            let factor = (et - first_et) / (eeg - first_eeg);
            if factor.is_finite() && factor > 0.0 {
                return DriftEstimate::Anchored {
                    factor,
                    anchor: k,
                    pairs: n,
                };
            }
        }
        DriftEstimate::Failed { pairs: n }
    }
}

/// Positions and values of the nonzero entries.
fn nonzero(signal: &[i32]) -> (Vec<f64>, Vec<i32>) {
    signal
        .iter()
        .enumerate()
        .filter(|&(_, &c)| c != 0)
        .map(|(i, &c)| (i as f64, c))
        .unzip()
}
