//! Format strategies describing the field layout of an ASC export.
//!
//! A strategy decides which lines are samples, which eye(s) are recorded and
//! how each record kind maps onto typed fields. Strategies are stateless; the
//! decoder holds a `&'static dyn AscFormat` chosen once per input through
//! [`FormatKind`]. New layouts are added as new variants without touching the
//! decoder.

use std::fmt;
use std::str::FromStr;

use thiserror::Error;

use crate::eye::Eye;
use crate::parser::{code_field, eye_field, float_field, int_field, is_integer, FieldError};
use crate::types::{
    Blink, Fixation, Message, RecordingKind, RecordingMarker, Saccade, Sample, Trigger,
};

/// Column names used for every table in output and bindings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldNames {
    pub time: &'static str,
    pub left_x: &'static str,
    pub left_y: &'static str,
    pub left_pupil: &'static str,
    pub right_x: &'static str,
    pub right_y: &'static str,
    pub right_pupil: &'static str,
    pub trigger: &'static str,
    pub message: &'static str,
    pub eye: &'static str,
    pub start_time: &'static str,
    pub end_time: &'static str,
    pub duration: &'static str,
    pub avg_x: &'static str,
    pub avg_y: &'static str,
    pub avg_pupil: &'static str,
    pub start_x: &'static str,
    pub start_y: &'static str,
    pub end_x: &'static str,
    pub end_y: &'static str,
    pub amplitude: &'static str,
    pub peak_velocity: &'static str,
    pub kind: &'static str,
}

/// Field names of EyeLink 1000 exports.
pub const EYELINK_FIELD_NAMES: FieldNames = FieldNames {
    time: "time",
    left_x: "left x",
    left_y: "left y",
    left_pupil: "left pupil size",
    right_x: "right x",
    right_y: "right y",
    right_pupil: "right pupil size",
    trigger: "trigger",
    message: "message",
    eye: "eye",
    start_time: "start time",
    end_time: "end time",
    duration: "duration",
    avg_x: "avg x",
    avg_y: "avg y",
    avg_pupil: "avg pupil size",
    start_x: "start x",
    start_y: "start y",
    end_x: "end x",
    end_y: "end y",
    amplitude: "amplitude",
    peak_velocity: "peak velocity",
    kind: "type",
};

/// Decoding rules of one ASC layout.
///
/// Event lines share the EyeLink layout across variants, so their decoders
/// have default implementations; variants differ in sample lines and eye
/// configuration. Every decoder receives the tokens of one line after
/// missing-value coercion.
pub trait AscFormat: fmt::Debug + Send + Sync {
    /// Which eye(s) the layout records.
    fn eye(&self) -> Eye;

    /// True if the tokenized line is a gaze sample.
    fn is_sample(&self, tokens: &[&str]) -> bool;

    /// Decodes a sample line.
    fn decode_sample(&self, tokens: &[&str]) -> Result<Sample, FieldError>;

    fn fields(&self) -> &'static FieldNames {
        &EYELINK_FIELD_NAMES
    }

    /// `MSG <time> <body...>`
    fn decode_message(&self, tokens: &[&str]) -> Result<Message, FieldError> {
        Ok(Message {
            time: int_field(tokens, 1)?,
            body: tokens.get(2..).unwrap_or_default().join(" "),
        })
    }

    /// `INPUT <time> <code>`
    fn decode_input(&self, tokens: &[&str]) -> Result<Trigger, FieldError> {
        Ok(Trigger::new(int_field(tokens, 1)?, code_field(tokens, 2)?))
    }

    /// `EFIX <eye> <start> <end> <dur> <avg x> <avg y> <avg pupil>`
    fn decode_fixation(&self, tokens: &[&str]) -> Result<Fixation, FieldError> {
        Ok(Fixation {
            eye: eye_field(tokens, 1)?,
            start_time: int_field(tokens, 2)?,
            end_time: int_field(tokens, 3)?,
            duration: int_field(tokens, 4)?,
            avg_x: float_field(tokens, 5)?,
            avg_y: float_field(tokens, 6)?,
            avg_pupil: float_field(tokens, 7)?,
        })
    }

    /// `ESACC <eye> <start> <end> <dur> <sx> <sy> <ex> <ey> <ampl> <pv>`
    fn decode_saccade(&self, tokens: &[&str]) -> Result<Saccade, FieldError> {
        Ok(Saccade {
            eye: eye_field(tokens, 1)?,
            start_time: int_field(tokens, 2)?,
            end_time: int_field(tokens, 3)?,
            duration: int_field(tokens, 4)?,
            start_x: float_field(tokens, 5)?,
            start_y: float_field(tokens, 6)?,
            end_x: float_field(tokens, 7)?,
            end_y: float_field(tokens, 8)?,
            amplitude: float_field(tokens, 9)?,
            peak_velocity: float_field(tokens, 10)?,
        })
    }

    /// `EBLINK <eye> <start> <end> <dur>`
    fn decode_blink(&self, tokens: &[&str]) -> Result<Blink, FieldError> {
        Ok(Blink {
            eye: eye_field(tokens, 1)?,
            start_time: int_field(tokens, 2)?,
            end_time: int_field(tokens, 3)?,
            duration: int_field(tokens, 4)?,
        })
    }

    /// `START <time> ...` / `END <time> ...`
    fn decode_recording(&self, tokens: &[&str]) -> Result<RecordingMarker, FieldError> {
        let kind = match tokens.first() {
            Some(&"START") => RecordingKind::Start,
            _ => RecordingKind::Stop,
        };
        Ok(RecordingMarker {
            kind,
            time: int_field(tokens, 1)?,
        })
    }
}

/// Binocular recording without velocity columns:
/// `<time> <lx> <ly> <lp> <rx> <ry> <rp> .....`
#[derive(Debug, Clone, Copy, Default)]
pub struct BinocularNoVelocity;

impl BinocularNoVelocity {
    const FLAGS: &'static str = ".....";
}

impl AscFormat for BinocularNoVelocity {
    fn eye(&self) -> Eye {
        Eye::Both
    }

    fn is_sample(&self, tokens: &[&str]) -> bool {
        tokens.len() >= 8
            && tokens.last() == Some(&Self::FLAGS)
            && is_integer(tokens[0])
    }

    fn decode_sample(&self, tokens: &[&str]) -> Result<Sample, FieldError> {
        Ok(Sample {
            time: int_field(tokens, 0)?,
            left_x: float_field(tokens, 1)?,
            left_y: float_field(tokens, 2)?,
            left_pupil: float_field(tokens, 3)?,
            right_x: float_field(tokens, 4)?,
            right_y: float_field(tokens, 5)?,
            right_pupil: float_field(tokens, 6)?,
        })
    }
}

/// Monocular recording without velocity columns:
/// `<time> <x> <y> <pupil> ...`
///
/// Fields of the unrecorded eye are `NaN`.
#[derive(Debug, Clone, Copy)]
pub struct MonocularNoVelocity {
    eye: Eye,
}

impl MonocularNoVelocity {
    const FLAGS: &'static str = "...";

    pub const fn new(eye: Eye) -> Self {
        Self { eye }
    }
}

impl AscFormat for MonocularNoVelocity {
    fn eye(&self) -> Eye {
        self.eye
    }

    fn is_sample(&self, tokens: &[&str]) -> bool {
        tokens.len() >= 5
            && tokens.last() == Some(&Self::FLAGS)
            && is_integer(tokens[0])
    }

    fn decode_sample(&self, tokens: &[&str]) -> Result<Sample, FieldError> {
        let time = int_field(tokens, 0)?;
        let x = float_field(tokens, 1)?;
        let y = float_field(tokens, 2)?;
        let pupil = float_field(tokens, 3)?;
        let mut sample = Sample {
            time,
            left_x: f64::NAN,
            left_y: f64::NAN,
            left_pupil: f64::NAN,
            right_x: f64::NAN,
            right_y: f64::NAN,
            right_pupil: f64::NAN,
        };
        if self.eye == Eye::Right {
            sample.right_x = x;
            sample.right_y = y;
            sample.right_pupil = pupil;
        } else {
            sample.left_x = x;
            sample.left_y = y;
            sample.left_pupil = pupil;
        }
        Ok(sample)
    }
}

static BINOCULAR_NO_VELOCITY: BinocularNoVelocity = BinocularNoVelocity;
static MONOCULAR_LEFT_NO_VELOCITY: MonocularNoVelocity = MonocularNoVelocity::new(Eye::Left);
static MONOCULAR_RIGHT_NO_VELOCITY: MonocularNoVelocity = MonocularNoVelocity::new(Eye::Right);

/// Selector for the supported ASC layouts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FormatKind {
    #[default]
    BinocularNoVelocity,
    MonocularLeftNoVelocity,
    MonocularRightNoVelocity,
}

impl FormatKind {
    /// Returns the stateless strategy implementing this layout.
    pub fn strategy(&self) -> &'static dyn AscFormat {
        match self {
            Self::BinocularNoVelocity => &BINOCULAR_NO_VELOCITY,
            Self::MonocularLeftNoVelocity => &MONOCULAR_LEFT_NO_VELOCITY,
            Self::MonocularRightNoVelocity => &MONOCULAR_RIGHT_NO_VELOCITY,
        }
    }

    pub fn eye(&self) -> Eye {
        self.strategy().eye()
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::BinocularNoVelocity => "binocular",
            Self::MonocularLeftNoVelocity => "monocular-left",
            Self::MonocularRightNoVelocity => "monocular-right",
        }
    }
}

/// Error returned when a format name is not recognized.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("unknown format '{0}'. Use binocular, monocular-left or monocular-right")]
pub struct UnknownFormat(pub String);

impl FromStr for FormatKind {
    type Err = UnknownFormat;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "binocular" | "binocular-no-velocity" => Ok(Self::BinocularNoVelocity),
            "monocular" | "monocular-left" | "monocular-left-no-velocity" => {
                Ok(Self::MonocularLeftNoVelocity)
            }
            "monocular-right" | "monocular-right-no-velocity" => {
                Ok(Self::MonocularRightNoVelocity)
            }
            _ => Err(UnknownFormat(s.to_string())),
        }
    }
}

impl fmt::Display for FormatKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::{coerce_missing, tokenize};

    fn decode_tokens(line: &str) -> Vec<&str> {
        coerce_missing(&tokenize(line))
    }

    #[test]
    fn test_binocular_sample() {
        let format = FormatKind::BinocularNoVelocity.strategy();
        let tokens = decode_tokens("2000\t512.5\t384.0\t900.0\t.\t.\t0.0\t.....");
        assert!(format.is_sample(&tokens));
        let sample = format.decode_sample(&tokens).unwrap();
        assert_eq!(sample.time, 2000);
        assert_eq!(sample.left_x, 512.5);
        assert_eq!(sample.right_x, -1.0);
        assert_eq!(sample.right_y, -1.0);
        assert_eq!(sample.right_pupil, 0.0);
    }

    #[test]
    fn test_monocular_sample() {
        let format = FormatKind::MonocularRightNoVelocity.strategy();
        let tokens = decode_tokens("2000 100.0 200.0 800.0 ...");
        assert!(format.is_sample(&tokens));
        assert!(!FormatKind::BinocularNoVelocity.strategy().is_sample(&tokens));

        let sample = format.decode_sample(&tokens).unwrap();
        assert_eq!(sample.right_x, 100.0);
        assert_eq!(sample.right_pupil, 800.0);
        assert!(sample.left_x.is_nan());
        assert_eq!(format.eye(), Eye::Right);
    }

    #[test]
    fn test_event_decoders() {
        let format = FormatKind::BinocularNoVelocity.strategy();

        let fix = format
            .decode_fixation(&decode_tokens("EFIX L 1000 1200 201 510.1 380.2 950"))
            .unwrap();
        assert_eq!(fix.eye, Eye::Left);
        assert_eq!(fix.duration, 201);
        assert_eq!(fix.avg_y, 380.2);
        assert_eq!(fix.avg_pupil, 950.0);

        let sacc = format
            .decode_saccade(&decode_tokens(
                "ESACC R 1201 1230 30 510.0 380.0 610.0 390.0 2.45 180",
            ))
            .unwrap();
        assert_eq!(sacc.eye, Eye::Right);
        assert_eq!(sacc.end_x, 610.0);
        assert_eq!(sacc.end_y, 390.0);
        assert_eq!(sacc.peak_velocity, 180.0);

        let blink = format
            .decode_blink(&decode_tokens("EBLINK R 3000 3100 101"))
            .unwrap();
        assert_eq!(blink.start_time, 3000);

        let msg = format
            .decode_message(&decode_tokens("MSG 1500 TRIALID 3 start"))
            .unwrap();
        assert_eq!(msg.body, "TRIALID 3 start");

        let trig = format.decode_input(&decode_tokens("INPUT 1600 12")).unwrap();
        assert_eq!(trig, Trigger::new(1600, 12));

        let rec = format
            .decode_recording(&decode_tokens("END 9000 \tSAMPLES\tEVENTS\tRES"))
            .unwrap();
        assert_eq!(rec.kind, RecordingKind::Stop);
        assert_eq!(rec.time, 9000);
    }

    #[test]
    fn test_missing_blink_fields() {
        let format = FormatKind::BinocularNoVelocity.strategy();
        let fix = format
            .decode_fixation(&decode_tokens("EFIX R 1000 1200 201 . . ."))
            .unwrap();
        assert_eq!(fix.avg_x, -1.0);
        assert_eq!(fix.avg_pupil, -1.0);
    }

    #[test]
    fn test_format_kind_from_str() {
        assert_eq!(
            "binocular".parse::<FormatKind>(),
            Ok(FormatKind::BinocularNoVelocity)
        );
        assert_eq!(
            "Monocular-Right".parse::<FormatKind>(),
            Ok(FormatKind::MonocularRightNoVelocity)
        );
        assert!("stereo".parse::<FormatKind>().is_err());
        assert_eq!(FormatKind::MonocularLeftNoVelocity.eye(), Eye::Left);
    }
}
