//! EyeLink ASC event decoder.
//!
//! This module walks an ASC log line by line, dispatches each line to the
//! active format strategy and collects the decoded records into the seven
//! tables of an [`AscRecording`].

use crate::format::{AscFormat, FormatKind};
use crate::parser::{self, FieldError, LineKind, LineToken};
use crate::types::{AscRecording, SKIPPED_SAMPLE_KEY};
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info};

/// File extension expected for eye-tracker logs (case-insensitive).
pub const ASC_EXTENSION: &str = "asc";

/// Errors that can occur during ASC decoding.
#[derive(Error, Debug)]
pub enum DecodeError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("input file not found: {}", .0.display())]
    NotFound(PathBuf),

    #[error("expected an .asc file: {}", .0.display())]
    WrongExtension(PathBuf),

    #[error("line {line}: malformed {token} record: {reason}")]
    MalformedLine {
        line: usize,
        token: String,
        #[source]
        reason: FieldError,
    },

    #[error("line {line}: sample time {time} does not follow previous sample time {previous}")]
    NonMonotonicSample { line: usize, time: i64, previous: i64 },
}

/// Stateless ASC decoder bound to one format.
#[derive(Debug, Clone, Copy, Default)]
pub struct AscDecoder {
    format: FormatKind,
}

impl AscDecoder {
    /// Creates a decoder for the given layout.
    pub fn new(format: FormatKind) -> Self {
        Self { format }
    }

    pub fn format(&self) -> FormatKind {
        self.format
    }

    /// Decodes an ASC file from disk.
    ///
    /// The path is validated before anything is read: it must exist and
    /// carry the `.asc` extension.
    pub fn decode_file<P: AsRef<Path>>(&self, path: P) -> Result<AscRecording, DecodeError> {
        let path = path.as_ref();
        if !path.is_file() {
            return Err(DecodeError::NotFound(path.to_path_buf()));
        }
        let is_asc = path
            .extension()
            .and_then(|ext| ext.to_str())
            .map_or(false, |ext| ext.eq_ignore_ascii_case(ASC_EXTENSION));
        if !is_asc {
            return Err(DecodeError::WrongExtension(path.to_path_buf()));
        }

        let name = path
            .file_stem()
            .map(|stem| stem.to_string_lossy().into_owned())
            .unwrap_or_default();
        let reader = BufReader::new(File::open(path)?);
        self.decode_reader(name, reader)
    }

    /// Decodes ASC text held in memory.
    pub fn decode_str(&self, name: &str, text: &str) -> Result<AscRecording, DecodeError> {
        self.decode_reader(name.to_string(), text.as_bytes())
    }

    /// Decodes ASC lines from any buffered reader.
    ///
    /// Bytes that are not valid UTF-8 (e.g. Latin-1 message text) are
    /// replaced with U+FFFD instead of failing the whole file.
    pub fn decode_reader<R: BufRead>(
        &self,
        name: String,
        mut reader: R,
    ) -> Result<AscRecording, DecodeError> {
        let format = self.format.strategy();
        let mut recording = AscRecording::empty(name, self.format);

        let mut buf = Vec::new();
        let mut line_no = 0;
        loop {
            buf.clear();
            if reader.read_until(b'\n', &mut buf)? == 0 {
                break;
            }
            line_no += 1;
            let line = String::from_utf8_lossy(&buf);
            let line = line.trim_end_matches(|c: char| c == '\n' || c == '\r');
            self.decode_line(format, line, line_no, &mut recording)?;
        }

        for (token, count) in &recording.skipped {
            debug!(token = %token, count, "skipped lines with unknown leading token");
        }
        info!(
            name = %recording.name,
            format = %self.format,
            samples = recording.samples.len(),
            messages = recording.messages.len(),
            triggers = recording.triggers.len(),
            fixations = recording.fixations.len(),
            saccades = recording.saccades.len(),
            blinks = recording.blinks.len(),
            recordings = recording.recordings.len(),
            skipped = recording.skipped_lines(),
            "decoded ASC log"
        );
        Ok(recording)
    }

    /// Decodes one line into the matching table.
    fn decode_line(
        &self,
        format: &dyn AscFormat,
        line: &str,
        line_no: usize,
        recording: &mut AscRecording,
    ) -> Result<(), DecodeError> {
        let raw = parser::tokenize(line);
        let kind = parser::classify(&raw, format);
        let tokens = parser::coerce_missing(&raw);

        let malformed = move |token: &str| {
            let token = token.to_string();
            move |reason: FieldError| DecodeError::MalformedLine {
                line: line_no,
                token,
                reason,
            }
        };

        match kind {
            LineKind::Blank => {}
            LineKind::Unknown(token) => {
                let key = if parser::is_integer(token) {
                    SKIPPED_SAMPLE_KEY
                } else {
                    token
                };
                *recording.skipped.entry(key.to_string()).or_insert(0) += 1;
            }
            LineKind::Sample => {
                let sample = format.decode_sample(&tokens).map_err(malformed("sample"))?;
                if let Some(previous) = recording.samples.last() {
                    if sample.time <= previous.time {
                        return Err(DecodeError::NonMonotonicSample {
                            line: line_no,
                            time: sample.time,
                            previous: previous.time,
                        });
                    }
                }
                recording.samples.push(sample);
            }
            LineKind::Record(token) => {
                let err = malformed(raw[0]);
                match token {
                    LineToken::Input => recording
                        .triggers
                        .push(format.decode_input(&tokens).map_err(err)?),
                    LineToken::Message => recording
                        .messages
                        .push(format.decode_message(&tokens).map_err(err)?),
                    LineToken::EndSaccade => recording
                        .saccades
                        .push(format.decode_saccade(&tokens).map_err(err)?),
                    LineToken::EndFixation => recording
                        .fixations
                        .push(format.decode_fixation(&tokens).map_err(err)?),
                    LineToken::EndBlink => recording
                        .blinks
                        .push(format.decode_blink(&tokens).map_err(err)?),
                    LineToken::StartRecording | LineToken::EndRecording => recording
                        .recordings
                        .push(format.decode_recording(&tokens).map_err(err)?),
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::eye::Eye;
    use crate::types::{RecordingKind, Trigger};

    const LOG: &str = "\
** CONVERTED FROM D:\\data\\s01.edf
MSG\t999 DISPLAY_COORDS 0 0 1919 1079
START\t1000 \tLEFT\tRIGHT\tSAMPLES\tEVENTS
INPUT\t1000\t254
1000\t512.0\t384.0\t900.0\t520.0\t390.0\t910.0\t.....
SFIX L   1001

1001\t513.0\t385.0\t901.0\t.\t.\t0.0\t.....
INPUT\t1002\t7
1002\t514.0\t386.0\t902.0\t522.0\t392.0\t912.0\t.....
EFIX L\t1001\t1002\t2\t513.5\t385.5\t901
EBLINK R 1001 1001 1
SSACC L 1003
ESACC L\t1003\t1004\t2\t514.0\t386.0\t600.0\t390.0\t1.5\t120
END\t1005 \tSAMPLES\tEVENTS\tRES\t30.0\t30.0
";

    #[test]
    fn test_decode_tables() {
        let recording = AscDecoder::default().decode_str("s01", LOG).unwrap();

        assert_eq!(recording.name, "s01");
        assert_eq!(recording.samples.len(), 3);
        assert_eq!(recording.sample_times(), vec![1000, 1001, 1002]);
        assert_eq!(recording.samples[1].right_x, -1.0);
        assert_eq!(recording.samples[1].right_pupil, 0.0);

        assert_eq!(
            recording.triggers,
            vec![Trigger::new(1000, 254), Trigger::new(1002, 7)]
        );
        assert_eq!(recording.messages.len(), 1);
        assert_eq!(recording.messages[0].body, "DISPLAY_COORDS 0 0 1919 1079");
        assert_eq!(recording.fixations[0].avg_pupil, 901.0);
        assert_eq!(recording.blinks[0].eye, Eye::Right);
        assert_eq!(recording.saccades[0].end_x, 600.0);

        let kinds: Vec<RecordingKind> = recording.recordings.iter().map(|r| r.kind).collect();
        assert_eq!(kinds, vec![RecordingKind::Start, RecordingKind::Stop]);
    }

    #[test]
    fn test_skipped_lines_are_counted() {
        let recording = AscDecoder::default().decode_str("s01", LOG).unwrap();
        assert_eq!(recording.skipped.get("SFIX"), Some(&1));
        assert_eq!(recording.skipped.get("SSACC"), Some(&1));
        assert_eq!(recording.skipped.get("**"), Some(&1));
        assert_eq!(recording.skipped_lines(), 3);
    }

    #[test]
    fn test_malformed_line_reports_position() {
        let text = "INPUT 1000 254\nINPUT 1001 abc\n";
        let err = AscDecoder::default().decode_str("bad", text).unwrap_err();
        match err {
            DecodeError::MalformedLine { line, token, reason } => {
                assert_eq!(line, 2);
                assert_eq!(token, "INPUT");
                assert!(matches!(reason, FieldError::InvalidInt { index: 2, .. }));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_non_monotonic_samples_rejected() {
        let text = "\
1002 1 1 1 1 1 1 .....
1001 1 1 1 1 1 1 .....
";
        let err = AscDecoder::default().decode_str("bad", text).unwrap_err();
        assert!(matches!(
            err,
            DecodeError::NonMonotonicSample {
                line: 2,
                time: 1001,
                previous: 1002
            }
        ));
    }

    #[test]
    fn test_monocular_format_ignores_binocular_samples() {
        let text = "\
1000 512.0 384.0 900.0 ...
1001 512.0 384.0 900.0 520.0 390.0 910.0 .....
";
        let decoder = AscDecoder::new(FormatKind::MonocularLeftNoVelocity);
        let recording = decoder.decode_str("mono", text).unwrap();
        assert_eq!(recording.samples.len(), 1);
        assert_eq!(recording.samples[0].left_x, 512.0);
        assert_eq!(recording.skipped.get(SKIPPED_SAMPLE_KEY), Some(&1));
        assert_eq!(recording.skipped.get("1001"), None);
    }

    #[test]
    fn test_rejected_samples_share_one_key() {
        let mut text = String::new();
        for t in 0..5000 {
            text.push_str(&format!("{} 1 2 3 4 5 6 ..C..\n", 1000 + t));
        }
        text.push_str("BUTTON 7000 1 1\n");

        let recording = AscDecoder::default().decode_str("flagged", &text).unwrap();
        assert!(recording.samples.is_empty());
        assert_eq!(recording.skipped.len(), 2);
        assert_eq!(recording.skipped.get(SKIPPED_SAMPLE_KEY), Some(&5000));
        assert_eq!(recording.skipped.get("BUTTON"), Some(&1));
        assert_eq!(recording.skipped_lines(), 5001);
    }

    #[test]
    fn test_invalid_utf8_in_message_is_replaced() {
        let mut bytes = b"MSG\t999 caf".to_vec();
        bytes.push(0xE9); // Latin-1 e-acute
        bytes.extend_from_slice(b" start\r\nINPUT\t1000\t254\r\n");

        let recording = AscDecoder::default()
            .decode_reader("latin1".to_string(), &bytes[..])
            .unwrap();
        assert_eq!(recording.messages.len(), 1);
        assert_eq!(recording.messages[0].body, "caf\u{FFFD} start");
        assert_eq!(recording.triggers, vec![Trigger::new(1000, 254)]);
    }

    #[test]
    fn test_decode_file_validation() {
        let dir = tempfile::tempdir().unwrap();
        let decoder = AscDecoder::default();

        let missing = dir.path().join("missing.asc");
        assert!(matches!(
            decoder.decode_file(&missing),
            Err(DecodeError::NotFound(_))
        ));

        let wrong = dir.path().join("log.txt");
        std::fs::write(&wrong, LOG).unwrap();
        assert!(matches!(
            decoder.decode_file(&wrong),
            Err(DecodeError::WrongExtension(_))
        ));

        let upper = dir.path().join("S02.ASC");
        std::fs::write(&upper, LOG).unwrap();
        let recording = decoder.decode_file(&upper).unwrap();
        assert_eq!(recording.name, "S02");
        assert_eq!(recording.samples.len(), 3);
    }
}
