//! Trigger streams of both modalities.
//!
//! The EEG trigger channel is supplied by the caller, already indexed by EEG
//! sample. Eye-tracker triggers are sparse `INPUT` records stamped with the
//! device clock; [`TriggerTimeline::from_eye_tracker`] spreads them over a
//! dense 0-filled array indexed by clock tick so both modalities can be
//! segmented the same way.

use tracing::debug;

use crate::sync::SyncError;
use crate::types::Trigger;

/// Mask applied to raw EEG status channels (the trigger bits).
pub const DEFAULT_STATUS_MASK: i32 = 255;

/// Dense EEG trigger codes, one entry per EEG sample (0 = no trigger).
#[derive(Debug, Clone, PartialEq)]
pub struct EegTriggerChannel {
    codes: Vec<i32>,
    sampling_rate: f64,
}

impl EegTriggerChannel {
    pub fn new(codes: Vec<i32>, sampling_rate: f64) -> Self {
        Self {
            codes,
            sampling_rate,
        }
    }

    /// Builds a channel of `n_samples` from sparse `(sample, code)` events.
    /// Events past the end of the channel are dropped.
    pub fn from_events(n_samples: usize, events: &[(usize, i32)], sampling_rate: f64) -> Self {
        let mut codes = vec![0; n_samples];
        let mut dropped = 0usize;
        for &(sample, code) in events {
            match codes.get_mut(sample) {
                Some(slot) => *slot = code,
                None => dropped += 1,
            }
        }
        if dropped > 0 {
            debug!(dropped, n_samples, "EEG trigger events past end of channel dropped");
        }
        Self::new(codes, sampling_rate)
    }

    /// Extracts trigger onsets from a raw status channel.
    ///
    /// Values are masked with `mask`; a trigger is emitted wherever the
    /// masked value changes to a nonzero value.
    pub fn from_status_channel(raw: &[i32], sampling_rate: f64, mask: i32) -> Self {
        let mut codes = vec![0; raw.len()];
        let mut previous = 0;
        for (slot, &value) in codes.iter_mut().zip(raw) {
            let masked = value & mask;
            if masked != 0 && masked != previous {
                *slot = masked;
            }
            previous = masked;
        }
        Self::new(codes, sampling_rate)
    }

    #[inline]
    pub fn codes(&self) -> &[i32] {
        &self.codes
    }

    #[inline]
    pub fn sampling_rate(&self) -> f64 {
        self.sampling_rate
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.codes.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.codes.is_empty()
    }

    /// Nonzero triggers as `(sample, code)`.
    pub fn events(&self) -> Vec<(usize, i32)> {
        self.codes
            .iter()
            .enumerate()
            .filter(|&(_, &c)| c != 0)
            .map(|(i, &c)| (i, c))
            .collect()
    }
}

/// A dense trigger array plus the recording pauses inside it.
///
/// Position `p` corresponds to time `origin + p` in the stream's own unit
/// (EEG sample index, or eye-tracker clock tick).
#[derive(Debug, Clone, PartialEq)]
pub struct TriggerTimeline {
    codes: Vec<i32>,
    pauses: Vec<usize>,
    origin: i64,
}

impl TriggerTimeline {
    /// Timeline of an EEG channel. EEG recordings have no inferred pauses.
    pub fn from_eeg(channel: &EegTriggerChannel) -> Self {
        Self {
            codes: channel.codes().to_vec(),
            pauses: Vec::new(),
            origin: 0,
        }
    }

    /// Timeline of eye-tracker triggers.
    ///
    /// Zero codes and triggers after the last sample are dropped. The origin
    /// is the earliest sample or trigger time. A pause starts one tick after
    /// every sample followed by a gap longer than the nominal sample interval.
    pub fn from_eye_tracker(sample_times: &[i64], triggers: &[Trigger]) -> Result<Self, SyncError> {
        if sample_times.len() < 2 {
            return Err(SyncError::TooFewSamples(sample_times.len()));
        }
        let (first, last) = (sample_times[0], sample_times[sample_times.len() - 1]);
        let interval = sample_times[1] - first;
        if interval <= 0 {
            return Err(SyncError::InvalidSampleInterval(interval));
        }

        let valid: Vec<Trigger> = triggers
            .iter()
            .filter(|t| t.code != 0 && t.time <= last)
            .copied()
            .collect();
        let origin = valid.iter().map(|t| t.time).min().unwrap_or(first).min(first);

        let mut codes = vec![0; (last - origin + 1) as usize];
        for trigger in &valid {
            codes[(trigger.time - origin) as usize] = trigger.code;
        }

        let pauses = sample_times
            .windows(2)
            .filter(|w| w[1] - w[0] > interval)
            .map(|w| (w[0] - origin + 1) as usize)
            .collect();

        Ok(Self {
            codes,
            pauses,
            origin,
        })
    }

    /// Builds a timeline directly (used by tests and custom sources).
    pub fn from_parts(codes: Vec<i32>, pauses: Vec<usize>, origin: i64) -> Self {
        Self {
            codes,
            pauses,
            origin,
        }
    }

    #[inline]
    pub fn codes(&self) -> &[i32] {
        &self.codes
    }

    #[inline]
    pub fn pauses(&self) -> &[usize] {
        &self.pauses
    }

    #[inline]
    pub fn origin(&self) -> i64 {
        self.origin
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.codes.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.codes.is_empty()
    }

    /// Stream time of a timeline position.
    #[inline]
    pub fn time_at(&self, position: usize) -> i64 {
        self.origin + position as i64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_eeg_from_events() {
        let channel = EegTriggerChannel::from_events(10, &[(0, 254), (4, 7), (12, 9)], 512.0);
        assert_eq!(channel.len(), 10);
        assert_eq!(channel.events(), vec![(0, 254), (4, 7)]);
        assert_eq!(channel.sampling_rate(), 512.0);
    }

    #[test]
    fn test_status_channel_onsets() {
        // high bits are masked away, held values emit one trigger
        let raw = [0, 0x1FE, 0x1FE, 0x100, 5, 5, 5, 0, 5];
        let channel = EegTriggerChannel::from_status_channel(&raw, 2048.0, DEFAULT_STATUS_MASK);
        assert_eq!(channel.events(), vec![(1, 254), (4, 5), (8, 5)]);
    }

    #[test]
    fn test_eye_tracker_timeline() {
        // samples every 2 ticks with a gap after 1008
        let times = [1000, 1002, 1004, 1006, 1008, 1020, 1022, 1024];
        let triggers = [
            Trigger::new(999, 254),
            Trigger::new(1004, 0),
            Trigger::new(1006, 3),
            Trigger::new(1030, 255),
        ];
        let timeline = TriggerTimeline::from_eye_tracker(&times, &triggers).unwrap();
        assert_eq!(timeline.origin(), 999);
        assert_eq!(timeline.len(), 26);
        assert_eq!(timeline.codes()[0], 254);
        assert_eq!(timeline.codes()[7], 3);
        assert_eq!(timeline.codes().iter().filter(|&&c| c != 0).count(), 2);
        assert_eq!(timeline.pauses(), &[10]);
        assert_eq!(timeline.time_at(10), 1009);
    }

    #[test]
    fn test_eye_tracker_timeline_errors() {
        assert!(matches!(
            TriggerTimeline::from_eye_tracker(&[5], &[]),
            Err(SyncError::TooFewSamples(1))
        ));
        assert!(matches!(
            TriggerTimeline::from_eye_tracker(&[5, 5, 6], &[]),
            Err(SyncError::InvalidSampleInterval(0))
        ));
    }
}
