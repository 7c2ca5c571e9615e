//! Eye configuration shared by the parsing and processing layers.

use std::fmt;

/// Which eye(s) a recording, record or position channel refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Eye {
    Left,
    Right,
    Both,
}

impl Eye {
    /// Parses the single-letter eye tag used in EyeLink event lines (`L`, `R`).
    pub fn from_tag(tag: &str) -> Option<Self> {
        match tag {
            "L" | "l" | "LEFT" => Some(Self::Left),
            "R" | "r" | "RIGHT" => Some(Self::Right),
            "B" | "BOTH" => Some(Self::Both),
            _ => None,
        }
    }

    /// Returns the tag written to output tables.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Left => "L",
            Self::Right => "R",
            Self::Both => "B",
        }
    }

    /// True if data for `other` is available in a recording of this configuration.
    pub fn records(&self, other: Eye) -> bool {
        match self {
            Self::Both => true,
            eye => *eye == other,
        }
    }
}

impl fmt::Display for Eye {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_eye_tags() {
        assert_eq!(Eye::from_tag("L"), Some(Eye::Left));
        assert_eq!(Eye::from_tag("R"), Some(Eye::Right));
        assert_eq!(Eye::from_tag("X"), None);
        assert_eq!(Eye::Right.to_string(), "R");
    }

    #[test]
    fn test_eye_records() {
        assert!(Eye::Both.records(Eye::Left));
        assert!(Eye::Left.records(Eye::Left));
        assert!(!Eye::Left.records(Eye::Right));
    }
}
