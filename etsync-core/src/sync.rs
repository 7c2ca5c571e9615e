//! Eye-tracker to EEG synchronization pipeline.
//!
//! Both trigger streams are segmented into recording blocks, the EEG blocks
//! are re-expressed in eye-tracker clock ticks, block lists are matched by
//! correlation, each pair gets a drift-corrected resample factor, and the
//! pairs are written into a [`SyncIndex`].
//!
//! Synchronization is best effort: blocks whose drift can not be refined fall
//! back to the nominal ratio and are reported, not raised.

use std::ops::Range;

use thiserror::Error;
use tracing::{debug, info, warn};

use crate::drift::{
    DriftCorrector, DriftEstimate, DEFAULT_ANCHOR_SEARCH_FRACTION, DEFAULT_ANCHOR_TOLERANCE,
};
use crate::index::{BlockMapping, IndexBuilder, SyncIndex, DEFAULT_START_LOOKUP_TOLERANCE};
use crate::matcher::{BlockMatch, BlockMatcher, DEFAULT_SMOOTHING_WINDOW};
use crate::segment::{Block, BlockSegmenter};
use crate::triggers::{EegTriggerChannel, TriggerTimeline};
use crate::types::{
    AscRecording, Trigger, EYELINK_CLOCK_HZ, START_RECORD_TRIGGER, STOP_RECORD_TRIGGER,
};

/// Structural problems with synchronization inputs.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SyncError {
    #[error("at least two eye-tracker samples are required, got {0}")]
    TooFewSamples(usize),

    #[error("eye-tracker sample interval must be positive, got {0}")]
    InvalidSampleInterval(i64),

    #[error("invalid EEG sampling rate: {0}")]
    InvalidEegRate(f64),

    #[error("invalid eye-tracker clock rate: {0}")]
    InvalidClockRate(f64),
}

/// Tunables of the synchronization pipeline.
#[derive(Debug, Clone, PartialEq)]
pub struct SyncConfig {
    /// Trigger code opening a recording block
    pub start_code: i32,
    /// Trigger code closing a recording block
    pub stop_code: i32,
    /// Boxcar width used before correlating blocks
    pub smoothing_window: usize,
    /// Maximal anchor position difference (ET clock ticks)
    pub anchor_tolerance: f64,
    /// Share of matched trigger pairs searched for an anchor
    pub anchor_search_fraction: f64,
    /// Extra ticks tried when locating a block start among ET samples
    pub start_lookup_tolerance: i64,
    /// Rate of the eye-tracker clock (ticks per second)
    pub et_clock_hz: f64,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            start_code: START_RECORD_TRIGGER,
            stop_code: STOP_RECORD_TRIGGER,
            smoothing_window: DEFAULT_SMOOTHING_WINDOW,
            anchor_tolerance: DEFAULT_ANCHOR_TOLERANCE,
            anchor_search_fraction: DEFAULT_ANCHOR_SEARCH_FRACTION,
            start_lookup_tolerance: DEFAULT_START_LOOKUP_TOLERANCE,
            et_clock_hz: EYELINK_CLOCK_HZ,
        }
    }
}

/// How one matched block pair was aligned.
#[derive(Debug, Clone, PartialEq)]
pub struct BlockAlignment {
    /// Position of the pair in the matched order
    pub pair: usize,
    /// Block in EEG sample space
    pub eeg_block: Block,
    /// Block in ET clock ticks relative to the timeline origin
    pub et_block: Block,
    /// ET clock time of the block start
    pub et_start_time: i64,
    pub drift: DriftEstimate,
    /// ET samples per EEG sample used for this block
    pub resample_factor: f64,
    /// ET samples written into the index, `None` if the block was not placed
    pub et_samples: Option<Range<usize>>,
}

impl BlockAlignment {
    /// True if the block fell back to the nominal ratio or was not placed.
    pub fn is_degraded(&self) -> bool {
        !self.drift.is_fine_tuned() || self.et_samples.is_none()
    }
}

/// Output of a synchronization run.
#[derive(Debug, Clone)]
pub struct SyncResult {
    pub index: SyncIndex,
    /// Number of EEG blocks found by segmentation
    pub eeg_blocks: usize,
    /// Number of ET blocks found by segmentation
    pub et_blocks: usize,
    pub block_match: BlockMatch,
    pub alignments: Vec<BlockAlignment>,
    /// Nominal ET samples per EEG sample
    pub nominal_ratio: f64,
}

impl SyncResult {
    pub fn degraded_blocks(&self) -> impl Iterator<Item = &BlockAlignment> {
        self.alignments.iter().filter(|a| a.is_degraded())
    }
}

#[derive(Debug, Clone, Default)]
pub struct Synchronizer {
    config: SyncConfig,
}

impl Synchronizer {
    pub fn new(config: SyncConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    /// Synchronizes a parsed recording to an EEG trigger channel.
    pub fn synchronize(
        &self,
        recording: &AscRecording,
        eeg: &EegTriggerChannel,
    ) -> Result<SyncResult, SyncError> {
        self.synchronize_streams(&recording.sample_times(), &recording.triggers, eeg)
    }

    /// Synchronizes raw eye-tracker sample times and triggers to an EEG
    /// trigger channel.
    pub fn synchronize_streams(
        &self,
        sample_times: &[i64],
        triggers: &[Trigger],
        eeg: &EegTriggerChannel,
    ) -> Result<SyncResult, SyncError> {
        let config = &self.config;
        let eeg_sf = eeg.sampling_rate();
        if !(eeg_sf.is_finite() && eeg_sf > 0.0) {
            return Err(SyncError::InvalidEegRate(eeg_sf));
        }
        if !(config.et_clock_hz.is_finite() && config.et_clock_hz > 0.0) {
            return Err(SyncError::InvalidClockRate(config.et_clock_hz));
        }

        let et_timeline = TriggerTimeline::from_eye_tracker(sample_times, triggers)?;
        let eeg_timeline = TriggerTimeline::from_eeg(eeg);
        let ticks_per_sample = sample_times[1] - sample_times[0];
        let et_sf = config.et_clock_hz / ticks_per_sample as f64;
        let nominal_ratio = et_sf / eeg_sf;

        let segmenter = BlockSegmenter::new(config.start_code, config.stop_code);
        let et_blocks = segmenter.segment(&et_timeline);
        let eeg_blocks = segmenter.segment(&eeg_timeline);
        info!(
            et_blocks = et_blocks.len(),
            eeg_blocks = eeg_blocks.len(),
            et_sf,
            eeg_sf,
            "segmented recordings"
        );

        let ticks_per_eeg_sample = config.et_clock_hz / eeg_sf;
        let eeg_signals: Vec<Vec<i32>> = eeg_blocks
            .iter()
            .map(|b| resample_signal(b.signal(eeg_timeline.codes()), ticks_per_eeg_sample))
            .collect();
        let et_signals: Vec<&[i32]> = et_blocks
            .iter()
            .map(|b| b.signal(et_timeline.codes()))
            .collect();

        let block_match =
            BlockMatcher::new(config.smoothing_window).match_blocks(&eeg_signals, &et_signals);
        debug!(
            offset = block_match.offset,
            score = block_match.score,
            pairs = block_match.len(),
            "matched blocks"
        );

        let corrector = DriftCorrector::new(config.anchor_tolerance, config.anchor_search_fraction);
        let builder = IndexBuilder::new(config.start_lookup_tolerance);
        let mut index = SyncIndex::unmapped(sample_times.len());
        let mut alignments = Vec::with_capacity(block_match.len());

        for (pair, (eeg_idx, et_idx)) in block_match.pairs().enumerate() {
            let (eeg_block, et_block) = (eeg_blocks[eeg_idx], et_blocks[et_idx]);

            let drift = corrector.estimate(&eeg_signals[eeg_idx], et_signals[et_idx]);
            if !drift.is_fine_tuned() {
                warn!(
                    pair,
                    eeg_block = eeg_idx,
                    et_block = et_idx,
                    matched_triggers = drift.pairs(),
                    "drift fine-tuning failed, using nominal sampling-rate ratio"
                );
            }

            let resample_factor = nominal_ratio * drift.factor();
            let et_start_time = et_timeline.time_at(et_block.start);
            let mapping = BlockMapping {
                eeg_start: eeg_block.start,
                eeg_len: eeg_block.len(),
                et_start_time,
                et_span: et_block.len() / ticks_per_sample as usize,
                resample_factor,
            };
            let et_samples = builder.apply(&mut index, sample_times, &mapping);

            alignments.push(BlockAlignment {
                pair,
                eeg_block,
                et_block,
                et_start_time,
                drift,
                resample_factor,
                et_samples,
            });
        }

        info!(
            mapped = index.mapped_count(),
            samples = index.len(),
            degraded = alignments.iter().filter(|a| a.is_degraded()).count(),
            "synchronization finished"
        );

        Ok(SyncResult {
            index,
            eeg_blocks: eeg_blocks.len(),
            et_blocks: et_blocks.len(),
            block_match,
            alignments,
            nominal_ratio,
        })
    }
}

/// Moves the triggers of a block signal to `round(p * ratio)` within a zero
/// signal of length `ceil(len * ratio)`.
pub fn resample_signal(signal: &[i32], ratio: f64) -> Vec<i32> {
    if signal.is_empty() {
        return Vec::new();
    }
    let len = ((signal.len() as f64 * ratio).ceil() as usize).max(1);
    let mut resampled = vec![0; len];
    for (p, &code) in signal.iter().enumerate().filter(|&(_, &c)| c != 0) {
        let q = ((p as f64 * ratio).round() as usize).min(len - 1);
        resampled[q] = code;
    }
    resampled
}
