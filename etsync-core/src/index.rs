//! Per-sample mapping from eye-tracker samples to EEG samples.

use std::ops::Range;

use tracing::warn;

/// Sentinel used for unmapped entries in flat integer exports.
pub const UNMAPPED: i64 = -1;

/// Default number of extra ticks tried when a block start timestamp has no
/// exactly matching sample.
pub const DEFAULT_START_LOOKUP_TOLERANCE: i64 = 1;

/// EEG sample index of every eye-tracker sample, `None` where unmapped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncIndex {
    entries: Vec<Option<usize>>,
}

impl SyncIndex {
    /// An index of `len` unmapped samples.
    pub fn unmapped(len: usize) -> Self {
        Self {
            entries: vec![None; len],
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    #[inline]
    pub fn entries(&self) -> &[Option<usize>] {
        &self.entries
    }

    pub fn mapped_count(&self) -> usize {
        self.entries.iter().filter(|e| e.is_some()).count()
    }

    /// Flat representation with [`UNMAPPED`] for missing entries.
    pub fn to_sentinel_vec(&self) -> Vec<i64> {
        self.entries
            .iter()
            .map(|e| e.map_or(UNMAPPED, |i| i as i64))
            .collect()
    }
}

/// Placement of one matched block pair.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BlockMapping {
    /// First EEG sample of the block
    pub eeg_start: usize,
    /// Block length in EEG samples
    pub eeg_len: usize,
    /// ET clock time of the block start
    pub et_start_time: i64,
    /// Block length in ET samples
    pub et_span: usize,
    /// ET samples per EEG sample for this block
    pub resample_factor: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IndexBuilder {
    start_lookup_tolerance: i64,
}

impl Default for IndexBuilder {
    fn default() -> Self {
        Self::new(DEFAULT_START_LOOKUP_TOLERANCE)
    }
}

impl IndexBuilder {
    pub fn new(start_lookup_tolerance: i64) -> Self {
        Self {
            start_lookup_tolerance: start_lookup_tolerance.max(0),
        }
    }

    /// Finds the sample stamped `time`, else the first of
    /// `time + 1 ..= time + tolerance` present in the sample table.
    pub fn locate_start(&self, sample_times: &[i64], time: i64) -> Option<usize> {
        (0..=self.start_lookup_tolerance).find_map(|delta| sample_times.binary_search(&(time + delta)).ok())
    }

    /// Builds an index over `sample_times` from block mappings.
    pub fn build(&self, sample_times: &[i64], mappings: &[BlockMapping]) -> SyncIndex {
        let mut index = SyncIndex::unmapped(sample_times.len());
        for mapping in mappings {
            self.apply(&mut index, sample_times, mapping);
        }
        index
    }

    /// Writes one block into the index and returns the ET sample range
    /// covered, or `None` if the block could not be placed.
    ///
    /// The block covers `min(eeg_len * factor, et_span, remaining samples)`
    /// ET samples; sample `k` of the block maps to
    /// `eeg_start + round(k / factor)`, clamped to the last EEG sample of the
    /// block. Without the clamp the final ET samples of a block with
    /// `factor > 2` would round to `eeg_start + eeg_len`.
    pub fn apply(
        &self,
        index: &mut SyncIndex,
        sample_times: &[i64],
        mapping: &BlockMapping,
    ) -> Option<Range<usize>> {
        let factor = mapping.resample_factor;
        if !(factor.is_finite() && factor > 0.0) {
            warn!(factor, "skipping block with invalid resample factor");
            return None;
        }
        let Some(et_start) = self.locate_start(sample_times, mapping.et_start_time) else {
            warn!(
                time = mapping.et_start_time,
                tolerance = self.start_lookup_tolerance,
                "block start not found in eye-tracker samples"
            );
            return None;
        };

        let remaining = index.len().saturating_sub(et_start);
        let length = ((mapping.eeg_len as f64 * factor).floor() as usize)
            .min(mapping.et_span)
            .min(remaining);

        let last = mapping.eeg_len.saturating_sub(1);
        let range = et_start..et_start + length;
        for (k, entry) in index.entries[range.clone()].iter_mut().enumerate() {
            let offset = ((k as f64 / factor).round() as usize).min(last);
            *entry = Some(mapping.eeg_start + offset);
        }
        Some(range)
    }
}
