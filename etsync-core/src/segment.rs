//! Splitting trigger timelines into recording blocks.
//!
//! A block opens at every start code. Its end is, in order of preference:
//! one past the last stop code before the next start, the first recording
//! pause before the next start, or the next start (end of data for the last
//! block). Blocks holding at most one trigger carry too little information to
//! be matched or drift-corrected and are dropped together with their start
//! marker. Ends are resolved against every start marker, dropped ones
//! included, but a dropped marker never appears as a block start: each kept
//! [`Block`] carries its own bounds, so block indices stay aligned with the
//! blocks that survive.

use std::ops::Range;

use tracing::debug;

use crate::triggers::TriggerTimeline;
use crate::types::{START_RECORD_TRIGGER, STOP_RECORD_TRIGGER};

/// Half-open range `[start, end)` of timeline positions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Block {
    pub start: usize,
    pub end: usize,
}

impl Block {
    #[inline]
    pub fn new(start: usize, end: usize) -> Self {
        Self { start, end }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.end - self.start
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.end <= self.start
    }

    #[inline]
    pub fn range(&self) -> Range<usize> {
        self.start..self.end
    }

    /// The block's slice of a dense code array.
    #[inline]
    pub fn signal<'a>(&self, codes: &'a [i32]) -> &'a [i32] {
        &codes[self.range()]
    }
}

/// Block segmenter parameterized by the sentinel codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockSegmenter {
    pub start_code: i32,
    pub stop_code: i32,
}

impl Default for BlockSegmenter {
    fn default() -> Self {
        Self {
            start_code: START_RECORD_TRIGGER,
            stop_code: STOP_RECORD_TRIGGER,
        }
    }
}

impl BlockSegmenter {
    pub fn new(start_code: i32, stop_code: i32) -> Self {
        Self {
            start_code,
            stop_code,
        }
    }

    pub fn segment(&self, timeline: &TriggerTimeline) -> Vec<Block> {
        self.segment_codes(timeline.codes(), timeline.pauses())
    }

    /// Segments a dense code array given sorted pause positions.
    pub fn segment_codes(&self, codes: &[i32], pauses: &[usize]) -> Vec<Block> {
        let starts: Vec<usize> = positions_of(codes, self.start_code);
        let stops: Vec<usize> = positions_of(codes, self.stop_code);

        let mut blocks = Vec::with_capacity(starts.len());
        for (i, &start) in starts.iter().enumerate() {
            let next = starts.get(i + 1).copied().unwrap_or(codes.len());

            let end = stops
                .iter()
                .filter(|&&p| p > start && p < next)
                .last()
                .map(|&p| p + 1)
                .or_else(|| pauses.iter().copied().find(|&p| p > start && p < next))
                .unwrap_or(next);

            let block = Block::new(start, end);
            let triggers = block.signal(codes).iter().filter(|&&c| c != 0).count();
            if triggers > 1 {
                blocks.push(block);
            } else {
                debug!(start, end, triggers, "dropping block with too few triggers");
            }
        }
        blocks
    }
}

fn positions_of(codes: &[i32], code: i32) -> Vec<usize> {
    codes
        .iter()
        .enumerate()
        .filter_map(|(i, &c)| (c == code).then_some(i))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stop_code_and_end_of_data() {
        let codes = [254, 0, 0, 0, 255, 0, 0, 254, 0, 0, 5, 0];
        let blocks = BlockSegmenter::default().segment_codes(&codes, &[]);
        assert_eq!(blocks, vec![Block::new(0, 5), Block::new(7, 12)]);
    }

    #[test]
    fn test_last_stop_wins() {
        let codes = [254, 3, 255, 0, 4, 255, 0, 0];
        let blocks = BlockSegmenter::default().segment_codes(&codes, &[]);
        assert_eq!(blocks, vec![Block::new(0, 6)]);
    }

    #[test]
    fn test_pause_ends_block() {
        let codes = [254, 0, 6, 0, 0, 0, 254, 7, 0, 0];
        let blocks = BlockSegmenter::default().segment_codes(&codes, &[4, 8]);
        assert_eq!(blocks, vec![Block::new(0, 4), Block::new(6, 8)]);
    }

    #[test]
    fn test_stop_preferred_over_pause() {
        let codes = [254, 0, 6, 0, 0, 255, 0];
        let blocks = BlockSegmenter::default().segment_codes(&codes, &[3]);
        assert_eq!(blocks, vec![Block::new(0, 6)]);
    }

    #[test]
    fn test_sparse_blocks_dropped() {
        // the first start marker carries no further triggers
        let codes = [254, 0, 0, 254, 9, 0, 255];
        let blocks = BlockSegmenter::default().segment_codes(&codes, &[]);
        assert_eq!(blocks, vec![Block::new(3, 7)]);
    }

    #[test]
    fn test_dropped_middle_block_keeps_neighbours_aligned() {
        let codes = [254, 1, 2, 0, 254, 0, 0, 254, 3, 4, 255];
        let blocks = BlockSegmenter::default().segment_codes(&codes, &[]);
        // the first block still ends at the dropped marker
        assert_eq!(blocks, vec![Block::new(0, 4), Block::new(7, 11)]);
        assert_eq!(blocks[1].signal(&codes), &[254, 3, 4, 255]);
    }

    #[test]
    fn test_no_start_code() {
        let codes = [0, 5, 0, 255];
        assert!(BlockSegmenter::default()
            .segment_codes(&codes, &[])
            .is_empty());
    }

    #[test]
    fn test_segment_timeline() {
        let timeline = TriggerTimeline::from_parts(vec![254, 1, 0, 255, 0], Vec::new(), 100);
        let blocks = BlockSegmenter::default().segment(&timeline);
        assert_eq!(blocks, vec![Block::new(0, 4)]);
        assert_eq!(blocks[0].signal(timeline.codes()), &[254, 1, 0, 255]);
    }
}
