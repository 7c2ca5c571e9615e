//! Low-level tokenizing of ASC log lines.
//!
//! This module splits lines into whitespace-separated tokens, classifies the
//! leading token and converts individual fields into typed values. Decoding a
//! whole record is the job of the active [`AscFormat`](crate::format::AscFormat).

use thiserror::Error;

use crate::eye::Eye;
use crate::format::AscFormat;

/// Token used by EyeLink for a missing value.
pub const MISSING_VALUE_TOKEN: &str = ".";

/// Textual form of [`MISSING_VALUE`](crate::types::MISSING_VALUE), substituted
/// before numeric conversion.
const MISSING_VALUE_STR: &str = "-1";

/// Errors raised while converting a single field.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FieldError {
    #[error("missing field {index}")]
    Missing { index: usize },

    #[error("field {index}: invalid integer '{token}'")]
    InvalidInt { index: usize, token: String },

    #[error("field {index}: invalid number '{token}'")]
    InvalidFloat { index: usize, token: String },

    #[error("field {index}: invalid eye tag '{token}'")]
    InvalidEye { index: usize, token: String },
}

/// Leading tokens of the record lines the decoder understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineToken {
    /// `INPUT` (trigger)
    Input,
    /// `MSG`
    Message,
    /// `ESACC`
    EndSaccade,
    /// `EFIX`
    EndFixation,
    /// `EBLINK`
    EndBlink,
    /// `START`
    StartRecording,
    /// `END`
    EndRecording,
}

impl LineToken {
    /// Looks up a leading token.
    #[inline]
    pub fn from_token(token: &str) -> Option<Self> {
        match token {
            "INPUT" => Some(Self::Input),
            "MSG" => Some(Self::Message),
            "ESACC" => Some(Self::EndSaccade),
            "EFIX" => Some(Self::EndFixation),
            "EBLINK" => Some(Self::EndBlink),
            "START" => Some(Self::StartRecording),
            "END" => Some(Self::EndRecording),
            _ => None,
        }
    }
}

/// Classification of one tokenized line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineKind<'a> {
    /// Empty or whitespace-only line
    Blank,
    /// Gaze sample according to the active format
    Sample,
    /// Known record line
    Record(LineToken),
    /// Anything else, carrying the leading token
    Unknown(&'a str),
}

/// Splits a line on runs of whitespace.
#[inline]
pub fn tokenize(line: &str) -> Vec<&str> {
    line.split_whitespace().collect()
}

/// Classifies a tokenized line. The sample predicate of the format is tested
/// first, then the leading token.
pub fn classify<'a>(tokens: &[&'a str], format: &dyn AscFormat) -> LineKind<'a> {
    let Some(&first) = tokens.first() else {
        return LineKind::Blank;
    };
    if format.is_sample(tokens) {
        return LineKind::Sample;
    }
    match LineToken::from_token(first) {
        Some(token) => LineKind::Record(token),
        None => LineKind::Unknown(first),
    }
}

/// Replaces every missing-value token with the missing-value sentinel.
pub fn coerce_missing<'a>(tokens: &[&'a str]) -> Vec<&'a str> {
    tokens
        .iter()
        .map(|&t| {
            if t == MISSING_VALUE_TOKEN {
                MISSING_VALUE_STR
            } else {
                t
            }
        })
        .collect()
}

#[inline]
fn field<'a>(tokens: &[&'a str], index: usize) -> Result<&'a str, FieldError> {
    tokens
        .get(index)
        .copied()
        .ok_or(FieldError::Missing { index })
}

/// Parses an integer field.
pub fn int_field(tokens: &[&str], index: usize) -> Result<i64, FieldError> {
    let token = field(tokens, index)?;
    token.parse().map_err(|_| FieldError::InvalidInt {
        index,
        token: token.to_string(),
    })
}

/// Parses a trigger code field.
pub fn code_field(tokens: &[&str], index: usize) -> Result<i32, FieldError> {
    let token = field(tokens, index)?;
    token.parse().map_err(|_| FieldError::InvalidInt {
        index,
        token: token.to_string(),
    })
}

/// Parses a floating point field.
pub fn float_field(tokens: &[&str], index: usize) -> Result<f64, FieldError> {
    let token = field(tokens, index)?;
    token.parse().map_err(|_| FieldError::InvalidFloat {
        index,
        token: token.to_string(),
    })
}

/// Parses an eye tag field (`L` / `R`).
pub fn eye_field(tokens: &[&str], index: usize) -> Result<Eye, FieldError> {
    let token = field(tokens, index)?;
    Eye::from_tag(token).ok_or_else(|| FieldError::InvalidEye {
        index,
        token: token.to_string(),
    })
}

/// True if the token is a plain (optionally signed) integer.
#[inline]
pub fn is_integer(token: &str) -> bool {
    let digits = token.strip_prefix('-').unwrap_or(token);
    !digits.is_empty() && digits.bytes().all(|b| b.is_ascii_digit())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::format::FormatKind;

    #[test]
    fn test_tokenize_runs_of_whitespace() {
        let tokens = tokenize("MSG\t1000  TRIAL 1 \n");
        assert_eq!(tokens, vec!["MSG", "1000", "TRIAL", "1"]);
        assert!(tokenize("   \n").is_empty());
    }

    #[test]
    fn test_coerce_missing() {
        let tokens = coerce_missing(&["100", ".", "3.5", ".....", "."]);
        assert_eq!(tokens, vec!["100", "-1", "3.5", ".....", "-1"]);
    }

    #[test]
    fn test_line_token_lookup() {
        assert_eq!(LineToken::from_token("INPUT"), Some(LineToken::Input));
        assert_eq!(LineToken::from_token("EBLINK"), Some(LineToken::EndBlink));
        assert_eq!(LineToken::from_token("END"), Some(LineToken::EndRecording));
        assert_eq!(LineToken::from_token("SSACC"), None);
        assert_eq!(LineToken::from_token("input"), None);
    }

    #[test]
    fn test_classify() {
        let format = FormatKind::BinocularNoVelocity.strategy();
        let sample = tokenize("1000 512.0 384.0 900.0 510.0 380.0 910.0 .....");
        assert_eq!(classify(&sample, format), LineKind::Sample);
        assert_eq!(
            classify(&tokenize("INPUT 1000 254"), format),
            LineKind::Record(LineToken::Input)
        );
        assert_eq!(
            classify(&tokenize("SFIX R 1000"), format),
            LineKind::Unknown("SFIX")
        );
        assert_eq!(classify(&tokenize(""), format), LineKind::Blank);
    }

    #[test]
    fn test_field_parsing() {
        let tokens = ["EFIX", "R", "1000", "abc", "1.5"];
        assert_eq!(eye_field(&tokens, 1), Ok(Eye::Right));
        assert_eq!(int_field(&tokens, 2), Ok(1000));
        assert!(matches!(
            int_field(&tokens, 3),
            Err(FieldError::InvalidInt { index: 3, .. })
        ));
        assert_eq!(float_field(&tokens, 4), Ok(1.5));
        assert_eq!(float_field(&tokens, 9), Err(FieldError::Missing { index: 9 }));
        assert!(eye_field(&tokens, 0).is_err());
    }

    #[test]
    fn test_is_integer() {
        assert!(is_integer("1000"));
        assert!(is_integer("-1"));
        assert!(!is_integer("10.5"));
        assert!(!is_integer("MSG"));
        assert!(!is_integer("-"));
    }
}
