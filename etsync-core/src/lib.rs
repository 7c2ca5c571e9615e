//! Eye-tracker to EEG synchronization library.
//!
//! This crate parses EyeLink ASC logs into typed tables, detects saccades in
//! gaze positions and aligns the eye-tracker recording with a simultaneously
//! recorded EEG stream using the trigger codes both devices received.
//!
//! # Example
//!
//! ```no_run
//! use etsync_core::{AscDecoder, EegTriggerChannel, FormatKind, Synchronizer};
//!
//! let recording = AscDecoder::new(FormatKind::BinocularNoVelocity)
//!     .decode_file("s01.asc")
//!     .unwrap();
//! let eeg = EegTriggerChannel::from_events(600_000, &[(1200, 254), (1500, 3)], 1000.0);
//!
//! let result = Synchronizer::default().synchronize(&recording, &eeg).unwrap();
//! println!("Mapped {} of {} samples", result.index.mapped_count(), result.index.len());
//! println!("EEG sample of ET sample 500: {:?}", result.index.eeg_sample(500));
//! ```
//!
//! # Features
//!
//! - Pluggable ASC layouts (binocular / monocular) behind one decoder
//! - Engbert & Mergenthaler velocity-threshold saccade detection
//! - Block segmentation, correlation matching and per-block drift correction
//! - Per-sample EEG index with CSV and binary output

pub mod decoder;
pub mod drift;
pub mod eye;
pub mod format;
pub mod index;
pub mod matcher;
pub mod output;
pub mod parser;
pub mod query;
pub mod saccade;
pub mod segment;
pub mod sync;
pub mod triggers;
pub mod types;

// Re-export commonly used types
pub use decoder::{AscDecoder, DecodeError};
pub use eye::Eye;
pub use format::{AscFormat, FormatKind};
pub use index::SyncIndex;
pub use output::OutputError;
pub use saccade::{DetectError, DetectedSaccades, DetectorConfig, DetectorKind};
pub use sync::{SyncConfig, SyncError, SyncResult, Synchronizer};
pub use triggers::EegTriggerChannel;
pub use types::{AscRecording, Sample, Trigger};
