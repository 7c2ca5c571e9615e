//! Pairing recording blocks across modalities.
//!
//! The two recordings can hold different numbers of blocks when one of them
//! started late or stopped early. Every placement of the shorter block list
//! against the longer one is scored by the summed Pearson correlation of
//! smoothed block signals, and the best placement wins.

use tracing::debug;

/// Default boxcar width (in timeline positions) used before correlating.
pub const DEFAULT_SMOOTHING_WINDOW: usize = 10;

/// Result of block matching: `eeg[k]` pairs with `et[k]`.
#[derive(Debug, Clone, PartialEq)]
pub struct BlockMatch {
    pub eeg: Vec<usize>,
    pub et: Vec<usize>,
    /// Offset of the shorter list within the longer one
    pub offset: usize,
    /// Summed correlation of the winning placement
    pub score: f64,
}

impl BlockMatch {
    pub fn len(&self) -> usize {
        self.eeg.len()
    }

    pub fn is_empty(&self) -> bool {
        self.eeg.is_empty()
    }

    /// Iterates over `(eeg_block, et_block)` index pairs.
    pub fn pairs(&self) -> impl Iterator<Item = (usize, usize)> + '_ {
        self.eeg.iter().copied().zip(self.et.iter().copied())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockMatcher {
    smoothing_window: usize,
}

impl Default for BlockMatcher {
    fn default() -> Self {
        Self::new(DEFAULT_SMOOTHING_WINDOW)
    }
}

impl BlockMatcher {
    pub fn new(smoothing_window: usize) -> Self {
        Self {
            smoothing_window: smoothing_window.max(1),
        }
    }

    /// Removes the first trigger of a block signal and smooths it with a
    /// centered boxcar.
    ///
    /// Dropping the first trigger keeps blocks that hold a single further
    /// event from correlating spuriously well. The output has the input's
    /// length; `out[i]` sums the inputs in `[i - w + 1 + h, i + h]` with
    /// `h = (w - 1) / 2`.
    pub fn smooth(&self, signal: &[i32]) -> Vec<f64> {
        let mut values: Vec<f64> = signal.iter().map(|&c| c as f64).collect();
        if let Some(first) = values.iter_mut().find(|v| **v != 0.0) {
            *first = 0.0;
        }

        let w = self.smoothing_window;
        let h = (w - 1) / 2;
        let n = values.len();

        let mut prefix = Vec::with_capacity(n + 1);
        prefix.push(0.0);
        for v in &values {
            prefix.push(prefix[prefix.len() - 1] + v);
        }

        (0..n)
            .map(|i| {
                let hi = (i + h + 1).min(n);
                let lo = (i + h + 1).saturating_sub(w).min(hi);
                prefix[hi] - prefix[lo]
            })
            .collect()
    }

    /// Finds the placement of the shorter block list within the longer one
    /// with the strictly largest summed correlation (first one on ties).
    pub fn match_blocks<E, T>(&self, eeg_blocks: &[E], et_blocks: &[T]) -> BlockMatch
    where
        E: AsRef<[i32]>,
        T: AsRef<[i32]>,
    {
        let eeg: Vec<Vec<f64>> = eeg_blocks.iter().map(|b| self.smooth(b.as_ref())).collect();
        let et: Vec<Vec<f64>> = et_blocks.iter().map(|b| self.smooth(b.as_ref())).collect();

        let eeg_is_longer = eeg.len() >= et.len();
        let (longer, shorter) = if eeg_is_longer {
            (&eeg, &et)
        } else {
            (&et, &eeg)
        };

        if shorter.is_empty() {
            return BlockMatch {
                eeg: Vec::new(),
                et: Vec::new(),
                offset: 0,
                score: 0.0,
            };
        }

        let mut best_offset = 0;
        let mut best_score = f64::NEG_INFINITY;
        for offset in 0..=(longer.len() - shorter.len()) {
            let score: f64 = shorter
                .iter()
                .enumerate()
                .map(|(k, s)| pearson(&longer[offset + k], s))
                .sum();
            debug!(offset, score, "block placement scored");
            if score > best_score {
                best_score = score;
                best_offset = offset;
            }
        }

        let matched_longer: Vec<usize> = (best_offset..best_offset + shorter.len()).collect();
        let matched_shorter: Vec<usize> = (0..shorter.len()).collect();
        let (eeg, et) = if eeg_is_longer {
            (matched_longer, matched_shorter)
        } else {
            (matched_shorter, matched_longer)
        };

        BlockMatch {
            eeg,
            et,
            offset: best_offset,
            score: best_score,
        }
    }
}

/// Pearson correlation of two signals truncated to the shorter length.
///
/// Returns 0 when either truncated signal is constant or shorter than 2.
pub fn pearson(a: &[f64], b: &[f64]) -> f64 {
    let n = a.len().min(b.len());
    if n < 2 {
        return 0.0;
    }
    let (a, b) = (&a[..n], &b[..n]);
    let mean_a = a.iter().sum::<f64>() / n as f64;
    let mean_b = b.iter().sum::<f64>() / n as f64;

    let (mut cov, mut var_a, mut var_b) = (0.0, 0.0, 0.0);
    for (x, y) in a.iter().zip(b) {
        let (dx, dy) = (x - mean_a, y - mean_b);
        cov += dx * dy;
        var_a += dx * dx;
        var_b += dy * dy;
    }
    if var_a == 0.0 || var_b == 0.0 {
        return 0.0;
    }
    cov / (var_a.sqrt() * var_b.sqrt())
}
