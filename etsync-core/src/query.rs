//! Mapping eye-tracker events into EEG sample space.

use crate::index::SyncIndex;
use crate::types::Blink;

/// Index of the sample closest to `time` in a sorted time column (the
/// earlier sample on ties). `None` for an empty column.
pub fn nearest_sample(sample_times: &[i64], time: i64) -> Option<usize> {
    let p = sample_times.partition_point(|&t| t < time);
    match (p.checked_sub(1), sample_times.get(p)) {
        (None, None) => None,
        (None, Some(_)) => Some(p),
        (Some(before), None) => Some(before),
        (Some(before), Some(&after)) => {
            if time - sample_times[before] <= after - time {
                Some(before)
            } else {
                Some(p)
            }
        }
    }
}

impl SyncIndex {
    /// EEG sample of an eye-tracker sample, `None` if not synchronized.
    #[inline]
    pub fn eeg_sample(&self, et_sample: usize) -> Option<usize> {
        self.entries().get(et_sample).copied().flatten()
    }

    /// EEG sample of the eye-tracker sample nearest to a clock time.
    pub fn eeg_sample_at(&self, sample_times: &[i64], time: i64) -> Option<usize> {
        nearest_sample(sample_times, time).and_then(|i| self.eeg_sample(i))
    }

    /// Resolves every onset of a detected-saccade vector as
    /// `(et_sample, eeg_sample)`.
    pub fn onsets_to_eeg(&self, onsets: &[bool]) -> Vec<(usize, Option<usize>)> {
        onsets
            .iter()
            .enumerate()
            .filter(|&(_, &onset)| onset)
            .map(|(i, _)| (i, self.eeg_sample(i)))
            .collect()
    }

    /// Resolves clock times through their nearest samples.
    pub fn times_to_eeg<I>(&self, sample_times: &[i64], times: I) -> Vec<Option<usize>>
    where
        I: IntoIterator<Item = i64>,
    {
        times
            .into_iter()
            .map(|t| self.eeg_sample_at(sample_times, t))
            .collect()
    }

    /// Resolves blink onsets.
    pub fn blinks_to_eeg(&self, sample_times: &[i64], blinks: &[Blink]) -> Vec<Option<usize>> {
        self.times_to_eeg(sample_times, blinks.iter().map(|b| b.start_time))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::eye::Eye;
    use crate::index::{BlockMapping, IndexBuilder};

    fn index() -> (Vec<i64>, SyncIndex) {
        let sample_times: Vec<i64> = (0..20).map(|i| 100 + 2 * i).collect();
        let mapping = BlockMapping {
            eeg_start: 1000,
            eeg_len: 10,
            et_start_time: 110,
            et_span: 10,
            resample_factor: 1.0,
        };
        let index = IndexBuilder::default().build(&sample_times, &[mapping]);
        (sample_times, index)
    }

    #[test]
    fn test_nearest_sample() {
        let times = [10, 20, 30];
        assert_eq!(nearest_sample(&times, 5), Some(0));
        assert_eq!(nearest_sample(&times, 14), Some(0));
        assert_eq!(nearest_sample(&times, 15), Some(0));
        assert_eq!(nearest_sample(&times, 16), Some(1));
        assert_eq!(nearest_sample(&times, 30), Some(2));
        assert_eq!(nearest_sample(&times, 99), Some(2));
        assert_eq!(nearest_sample(&[], 1), None);
    }

    #[test]
    fn test_sample_lookup() {
        let (_, index) = index();
        assert_eq!(index.eeg_sample(4), None);
        assert_eq!(index.eeg_sample(5), Some(1000));
        assert_eq!(index.eeg_sample(14), Some(1009));
        assert_eq!(index.eeg_sample(15), None);
        assert_eq!(index.eeg_sample(500), None);
    }

    #[test]
    fn test_onsets_to_eeg() {
        let (_, index) = index();
        let mut onsets = vec![false; 20];
        onsets[2] = true;
        onsets[7] = true;
        assert_eq!(index.onsets_to_eeg(&onsets), vec![(2, None), (7, Some(1002))]);
    }

    #[test]
    fn test_blinks_to_eeg() {
        let (times, index) = index();
        let blinks = [
            Blink {
                eye: Eye::Left,
                start_time: 113,
                end_time: 150,
                duration: 38,
            },
            Blink {
                eye: Eye::Right,
                start_time: 101,
                end_time: 105,
                duration: 5,
            },
        ];
        // 113 is nearest to sample 6 (time 112)
        assert_eq!(index.blinks_to_eeg(&times, &blinks), vec![Some(1001), None]);
    }
}
