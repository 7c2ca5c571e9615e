//! Record types decoded from EyeLink ASC logs.
//!
//! Every table produced by the decoder holds one of the record structs defined
//! here, in input line order. Missing fields (`.` in the log) are stored as
//! [`MISSING_VALUE`]; fields for an eye the format does not record are `NaN`.

use std::collections::BTreeMap;

use ndarray::Array2;

use crate::eye::Eye;
use crate::format::FormatKind;
use crate::saccade::{DetectError, DetectedSaccades, DetectorConfig, DetectorKind};

/// Trigger code marking the start of a recording block.
pub const START_RECORD_TRIGGER: i32 = 254;

/// Trigger code marking the end of a recording block.
pub const STOP_RECORD_TRIGGER: i32 = 255;

/// Value substituted for the missing-value token before numeric conversion.
pub const MISSING_VALUE: i64 = -1;

/// Device clock rate of EyeLink timestamps (milliseconds).
pub const EYELINK_CLOCK_HZ: f64 = 1000.0;

/// Skipped-line key for lines led by a timestamp, i.e. samples whose layout
/// does not fit the active format.
pub const SKIPPED_SAMPLE_KEY: &str = "<sample>";

/// One timestamped gaze position / pupil size reading.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Sample {
    /// Device clock time
    pub time: i64,
    pub left_x: f64,
    pub left_y: f64,
    pub left_pupil: f64,
    pub right_x: f64,
    pub right_y: f64,
    pub right_pupil: f64,
}

impl Sample {
    /// Returns the (x, y) position of one eye. `Both` yields `None`.
    #[inline]
    pub fn position(&self, eye: Eye) -> Option<(f64, f64)> {
        match eye {
            Eye::Left => Some((self.left_x, self.left_y)),
            Eye::Right => Some((self.right_x, self.right_y)),
            Eye::Both => None,
        }
    }
}

/// An `INPUT` line: a trigger code written into the eye-tracker stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Trigger {
    pub time: i64,
    pub code: i32,
}

impl Trigger {
    #[inline]
    pub fn new(time: i64, code: i32) -> Self {
        Self { time, code }
    }
}

/// A `MSG` line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub time: i64,
    pub body: String,
}

/// An `EFIX` line (end of fixation, carrying the whole fixation summary).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Fixation {
    pub eye: Eye,
    pub start_time: i64,
    pub end_time: i64,
    pub duration: i64,
    pub avg_x: f64,
    pub avg_y: f64,
    pub avg_pupil: f64,
}

/// An `ESACC` line (end of saccade, carrying the whole saccade summary).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Saccade {
    pub eye: Eye,
    pub start_time: i64,
    pub end_time: i64,
    pub duration: i64,
    pub start_x: f64,
    pub start_y: f64,
    pub end_x: f64,
    pub end_y: f64,
    pub amplitude: f64,
    pub peak_velocity: f64,
}

/// An `EBLINK` line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Blink {
    pub eye: Eye,
    pub start_time: i64,
    pub end_time: i64,
    pub duration: i64,
}

/// Start or stop of a recording segment (`START` / `END` lines).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordingKind {
    Start,
    Stop,
}

impl RecordingKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Start => "START",
            Self::Stop => "END",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecordingMarker {
    pub kind: RecordingKind,
    pub time: i64,
}

/// The seven tables decoded from one ASC file.
#[derive(Debug, Clone)]
pub struct AscRecording {
    /// File stem of the source log
    pub name: String,
    /// Format the file was decoded with
    pub format: FormatKind,
    pub samples: Vec<Sample>,
    pub messages: Vec<Message>,
    pub triggers: Vec<Trigger>,
    pub fixations: Vec<Fixation>,
    pub saccades: Vec<Saccade>,
    pub blinks: Vec<Blink>,
    pub recordings: Vec<RecordingMarker>,
    /// Lines dropped because their first token is not a known record kind,
    /// counted per token. Sample lines the format rejects share the
    /// [`SKIPPED_SAMPLE_KEY`] entry.
    pub skipped: BTreeMap<String, usize>,
}

impl AscRecording {
    pub(crate) fn empty(name: String, format: FormatKind) -> Self {
        Self {
            name,
            format,
            samples: Vec::new(),
            messages: Vec::new(),
            triggers: Vec::new(),
            fixations: Vec::new(),
            saccades: Vec::new(),
            blinks: Vec::new(),
            recordings: Vec::new(),
            skipped: BTreeMap::new(),
        }
    }

    /// Total number of skipped lines.
    pub fn skipped_lines(&self) -> usize {
        self.skipped.values().sum()
    }

    /// The sample time column.
    pub fn sample_times(&self) -> Vec<i64> {
        self.samples.iter().map(|s| s.time).collect()
    }

    /// Sampling frequency derived from the first two samples.
    ///
    /// `clock_hz` is the rate of the device clock the timestamps count in.
    pub fn sampling_rate(&self, clock_hz: f64) -> Option<f64> {
        let (first, second) = (self.samples.first()?, self.samples.get(1)?);
        let dt = second.time - first.time;
        (dt > 0).then(|| clock_hz / dt as f64)
    }

    /// Returns an `n x 2` matrix of (x, y) positions for one eye, or `None`
    /// if the format does not record that eye.
    pub fn eye_positions(&self, eye: Eye) -> Option<Array2<f64>> {
        if eye == Eye::Both || !self.format.eye().records(eye) {
            return None;
        }
        let mut positions = Array2::zeros((self.samples.len(), 2));
        for (mut row, sample) in positions.rows_mut().into_iter().zip(&self.samples) {
            let (x, y) = sample.position(eye)?;
            row[0] = x;
            row[1] = y;
        }
        Some(positions)
    }

    /// Runs the saccade detector on every eye this recording holds.
    pub fn detect_saccades(
        &self,
        kind: DetectorKind,
        config: &DetectorConfig,
    ) -> Result<DetectedSaccades, DetectError> {
        let sf = self
            .sampling_rate(EYELINK_CLOCK_HZ)
            .ok_or(DetectError::InvalidSamplingRate(f64::NAN))?;
        let detector = kind.detector(config.clone());

        let left = match self.eye_positions(Eye::Left) {
            Some(positions) => Some(detector.detect(positions.view(), sf)?),
            None => None,
        };
        let right = match self.eye_positions(Eye::Right) {
            Some(positions) => Some(detector.detect(positions.view(), sf)?),
            None => None,
        };

        Ok(DetectedSaccades::combine(
            left,
            right,
            config.binocular_tolerance,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(time: i64, lx: f64, rx: f64) -> Sample {
        Sample {
            time,
            left_x: lx,
            left_y: lx + 1.0,
            left_pupil: 900.0,
            right_x: rx,
            right_y: rx + 1.0,
            right_pupil: 910.0,
        }
    }

    #[test]
    fn test_sampling_rate() {
        let mut rec = AscRecording::empty("r".into(), FormatKind::BinocularNoVelocity);
        assert_eq!(rec.sampling_rate(EYELINK_CLOCK_HZ), None);
        rec.samples.push(sample(100, 1.0, 2.0));
        rec.samples.push(sample(102, 1.0, 2.0));
        assert_eq!(rec.sampling_rate(EYELINK_CLOCK_HZ), Some(500.0));
    }

    #[test]
    fn test_eye_positions() {
        let mut rec = AscRecording::empty("r".into(), FormatKind::BinocularNoVelocity);
        rec.samples.push(sample(1, 10.0, 20.0));
        rec.samples.push(sample(2, 11.0, 21.0));

        let right = rec.eye_positions(Eye::Right).unwrap();
        assert_eq!(right.shape(), &[2, 2]);
        assert_eq!(right[[1, 0]], 21.0);
        assert_eq!(right[[1, 1]], 22.0);
        assert!(rec.eye_positions(Eye::Both).is_none());

        rec.format = FormatKind::MonocularLeftNoVelocity;
        assert!(rec.eye_positions(Eye::Right).is_none());
        assert!(rec.eye_positions(Eye::Left).is_some());
    }
}
