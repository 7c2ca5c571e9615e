//! Output writers for decoded tables and synchronization indices.
//!
//! Tables are written as CSV with headers taken from the format's field
//! names. A [`SyncIndex`] can be written as CSV or as a compact little-endian
//! binary file.

use crate::eye::Eye;
use crate::format::{FieldNames, FormatKind};
use crate::index::SyncIndex;
use crate::types::{
    AscRecording, Blink, Fixation, Message, RecordingMarker, Saccade, Sample, Trigger,
};
use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::Path;
use thiserror::Error;

/// Magic bytes opening a binary sync index file.
pub const SYNC_MAGIC: &[u8; 8] = b"ETSYNC\0\0";

/// Version of the binary sync index layout.
pub const SYNC_FORMAT_VERSION: u32 = 1;

/// Errors that can occur during output writing.
#[derive(Error, Debug)]
pub enum OutputError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid format: {0}")]
    InvalidFormat(String),

    #[error("index holds {index} entries but {times} sample times were given")]
    LengthMismatch { index: usize, times: usize },
}

/// CSV writer for the tables of one recording.
pub struct CsvWriter<W: Write> {
    writer: BufWriter<W>,
    fields: &'static FieldNames,
    eye: Eye,
}

impl<W: Write> CsvWriter<W> {
    /// Creates a new CSV writer for tables decoded with `format`.
    pub fn new(writer: W, format: FormatKind) -> Self {
        Self {
            writer: BufWriter::new(writer),
            fields: format.strategy().fields(),
            eye: format.eye(),
        }
    }

    /// Writes the sample table. Only the recorded eye's columns are emitted.
    pub fn write_samples(&mut self, samples: &[Sample]) -> Result<(), OutputError> {
        let f = self.fields;
        let left = self.eye.records(Eye::Left);
        let right = self.eye.records(Eye::Right);

        let mut header = vec![f.time];
        if left {
            header.extend([f.left_x, f.left_y, f.left_pupil]);
        }
        if right {
            header.extend([f.right_x, f.right_y, f.right_pupil]);
        }
        writeln!(self.writer, "{}", header.join(","))?;

        for s in samples {
            write!(self.writer, "{}", s.time)?;
            if left {
                write!(self.writer, ",{},{},{}", s.left_x, s.left_y, s.left_pupil)?;
            }
            if right {
                write!(self.writer, ",{},{},{}", s.right_x, s.right_y, s.right_pupil)?;
            }
            writeln!(self.writer)?;
        }
        Ok(())
    }

    /// Writes the message table with quoted bodies.
    pub fn write_messages(&mut self, messages: &[Message]) -> Result<(), OutputError> {
        writeln!(self.writer, "{},{}", self.fields.time, self.fields.message)?;
        for m in messages {
            writeln!(self.writer, "{},\"{}\"", m.time, m.body.replace('"', "\"\""))?;
        }
        Ok(())
    }

    pub fn write_triggers(&mut self, triggers: &[Trigger]) -> Result<(), OutputError> {
        writeln!(self.writer, "{},{}", self.fields.time, self.fields.trigger)?;
        for t in triggers {
            writeln!(self.writer, "{},{}", t.time, t.code)?;
        }
        Ok(())
    }

    pub fn write_fixations(&mut self, fixations: &[Fixation]) -> Result<(), OutputError> {
        let f = self.fields;
        writeln!(
            self.writer,
            "{},{},{},{},{},{},{}",
            f.eye, f.start_time, f.end_time, f.duration, f.avg_x, f.avg_y, f.avg_pupil
        )?;
        for x in fixations {
            writeln!(
                self.writer,
                "{},{},{},{},{},{},{}",
                x.eye, x.start_time, x.end_time, x.duration, x.avg_x, x.avg_y, x.avg_pupil
            )?;
        }
        Ok(())
    }

    pub fn write_saccades(&mut self, saccades: &[Saccade]) -> Result<(), OutputError> {
        let f = self.fields;
        writeln!(
            self.writer,
            "{},{},{},{},{},{},{},{},{},{}",
            f.eye,
            f.start_time,
            f.end_time,
            f.duration,
            f.start_x,
            f.start_y,
            f.end_x,
            f.end_y,
            f.amplitude,
            f.peak_velocity
        )?;
        for s in saccades {
            writeln!(
                self.writer,
                "{},{},{},{},{},{},{},{},{},{}",
                s.eye,
                s.start_time,
                s.end_time,
                s.duration,
                s.start_x,
                s.start_y,
                s.end_x,
                s.end_y,
                s.amplitude,
                s.peak_velocity
            )?;
        }
        Ok(())
    }

    pub fn write_blinks(&mut self, blinks: &[Blink]) -> Result<(), OutputError> {
        let f = self.fields;
        writeln!(
            self.writer,
            "{},{},{},{}",
            f.eye, f.start_time, f.end_time, f.duration
        )?;
        for b in blinks {
            writeln!(
                self.writer,
                "{},{},{},{}",
                b.eye, b.start_time, b.end_time, b.duration
            )?;
        }
        Ok(())
    }

    pub fn write_recordings(&mut self, markers: &[RecordingMarker]) -> Result<(), OutputError> {
        writeln!(self.writer, "{},{}", self.fields.kind, self.fields.time)?;
        for m in markers {
            writeln!(self.writer, "{},{}", m.kind.as_str(), m.time)?;
        }
        Ok(())
    }

    /// Flushes the writer.
    pub fn flush(&mut self) -> Result<(), OutputError> {
        self.writer.flush()?;
        Ok(())
    }
}

/// Binary output format for sync indices.
///
/// Layout (little-endian):
/// - magic: `ETSYNC\0\0` (8 bytes)
/// - version: u32
/// - entry count: u64
/// - entries: i64 each, `-1` for unmapped samples
pub struct BinaryWriter<W: Write> {
    writer: BufWriter<W>,
}

impl<W: Write> BinaryWriter<W> {
    /// Creates a new binary writer.
    pub fn new(writer: W) -> Self {
        Self {
            writer: BufWriter::new(writer),
        }
    }

    pub fn write_header(&mut self, entry_count: u64) -> Result<(), OutputError> {
        self.writer.write_all(SYNC_MAGIC)?;
        self.writer.write_u32::<LittleEndian>(SYNC_FORMAT_VERSION)?;
        self.writer.write_u64::<LittleEndian>(entry_count)?;
        Ok(())
    }

    pub fn write_index(&mut self, index: &SyncIndex) -> Result<(), OutputError> {
        for entry in index.to_sentinel_vec() {
            self.writer.write_i64::<LittleEndian>(entry)?;
        }
        Ok(())
    }

    /// Flushes the writer.
    pub fn flush(&mut self) -> Result<(), OutputError> {
        self.writer.flush()?;
        Ok(())
    }
}

/// Writes the seven tables of a recording as CSV files into `dir`.
pub fn write_tables<P: AsRef<Path>>(dir: P, recording: &AscRecording) -> Result<(), OutputError> {
    let dir = dir.as_ref();
    fs::create_dir_all(dir)?;

    let create = |name: &str| -> Result<CsvWriter<File>, OutputError> {
        Ok(CsvWriter::new(File::create(dir.join(name))?, recording.format))
    };

    let mut w = create("samples.csv")?;
    w.write_samples(&recording.samples)?;
    w.flush()?;

    let mut w = create("messages.csv")?;
    w.write_messages(&recording.messages)?;
    w.flush()?;

    let mut w = create("triggers.csv")?;
    w.write_triggers(&recording.triggers)?;
    w.flush()?;

    let mut w = create("fixations.csv")?;
    w.write_fixations(&recording.fixations)?;
    w.flush()?;

    let mut w = create("saccades.csv")?;
    w.write_saccades(&recording.saccades)?;
    w.flush()?;

    let mut w = create("blinks.csv")?;
    w.write_blinks(&recording.blinks)?;
    w.flush()?;

    let mut w = create("recordings.csv")?;
    w.write_recordings(&recording.recordings)?;
    w.flush()?;
    Ok(())
}

/// Writes a sync index as `et_sample,et_time,eeg_sample` rows.
pub fn write_sync_csv<P: AsRef<Path>>(
    path: P,
    index: &SyncIndex,
    sample_times: &[i64],
) -> Result<(), OutputError> {
    if index.len() != sample_times.len() {
        return Err(OutputError::LengthMismatch {
            index: index.len(),
            times: sample_times.len(),
        });
    }
    let mut writer = BufWriter::new(File::create(path)?);
    writeln!(writer, "et_sample,et_time,eeg_sample")?;
    for (i, (time, entry)) in sample_times.iter().zip(index.to_sentinel_vec()).enumerate() {
        writeln!(writer, "{},{},{}", i, time, entry)?;
    }
    writer.flush()?;
    Ok(())
}

/// Writes per-sample saccade onsets as `sample,time,onset` rows.
pub fn write_onsets_csv<P: AsRef<Path>>(
    path: P,
    onsets: &[bool],
    sample_times: &[i64],
) -> Result<(), OutputError> {
    if onsets.len() != sample_times.len() {
        return Err(OutputError::LengthMismatch {
            index: onsets.len(),
            times: sample_times.len(),
        });
    }
    let mut writer = BufWriter::new(File::create(path)?);
    writeln!(writer, "sample,time,onset")?;
    for (i, (time, &onset)) in sample_times.iter().zip(onsets).enumerate() {
        writeln!(writer, "{},{},{}", i, time, u8::from(onset))?;
    }
    writer.flush()?;
    Ok(())
}

/// Writes a sync index to a binary file.
pub fn write_sync_binary<P: AsRef<Path>>(path: P, index: &SyncIndex) -> Result<(), OutputError> {
    let file = File::create(path)?;
    let mut writer = BinaryWriter::new(file);
    writer.write_header(index.len() as u64)?;
    writer.write_index(index)?;
    writer.flush()?;
    Ok(())
}

/// Reads the entries of a binary sync index file (`-1` for unmapped).
pub fn read_sync_binary<P: AsRef<Path>>(path: P) -> Result<Vec<i64>, OutputError> {
    let mut reader = BufReader::new(File::open(path)?);

    let mut magic = [0u8; 8];
    reader.read_exact(&mut magic)?;
    if &magic != SYNC_MAGIC {
        return Err(OutputError::InvalidFormat("missing ETSYNC magic".to_string()));
    }
    let version = reader.read_u32::<LittleEndian>()?;
    if version != SYNC_FORMAT_VERSION {
        return Err(OutputError::InvalidFormat(format!(
            "unsupported version {}",
            version
        )));
    }

    let count = reader.read_u64::<LittleEndian>()? as usize;
    let mut entries = Vec::with_capacity(count);
    for _ in 0..count {
        entries.push(reader.read_i64::<LittleEndian>()?);
    }
    Ok(entries)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::{BlockMapping, IndexBuilder};
    use crate::types::RecordingKind;

    fn sample(time: i64) -> Sample {
        Sample {
            time,
            left_x: 512.5,
            left_y: 384.0,
            left_pupil: 900.0,
            right_x: -1.0,
            right_y: -1.0,
            right_pupil: 0.0,
        }
    }

    fn render<F>(format: FormatKind, f: F) -> String
    where
        F: FnOnce(&mut CsvWriter<&mut Vec<u8>>) -> Result<(), OutputError>,
    {
        let mut output = Vec::new();
        {
            let mut writer = CsvWriter::new(&mut output, format);
            f(&mut writer).unwrap();
            writer.flush().unwrap();
        }
        String::from_utf8(output).unwrap()
    }

    #[test]
    fn test_binocular_samples() {
        let csv = render(FormatKind::BinocularNoVelocity, |w| {
            w.write_samples(&[sample(1000), sample(1001)])
        });
        let lines: Vec<&str> = csv.lines().collect();
        assert_eq!(
            lines[0],
            "time,left x,left y,left pupil size,right x,right y,right pupil size"
        );
        assert_eq!(lines[1], "1000,512.5,384,900,-1,-1,0");
        assert_eq!(lines.len(), 3);
    }

    #[test]
    fn test_monocular_samples_only_recorded_eye() {
        let csv = render(FormatKind::MonocularLeftNoVelocity, |w| {
            w.write_samples(&[sample(1000)])
        });
        assert_eq!(
            csv,
            "time,left x,left y,left pupil size\n1000,512.5,384,900\n"
        );
    }

    #[test]
    fn test_event_tables() {
        let csv = render(FormatKind::BinocularNoVelocity, |w| {
            w.write_messages(&[Message {
                time: 5,
                body: "say \"hi\", twice".to_string(),
            }])?;
            w.write_triggers(&[Trigger::new(6, 254)])?;
            w.write_blinks(&[Blink {
                eye: Eye::Right,
                start_time: 7,
                end_time: 9,
                duration: 3,
            }])?;
            w.write_recordings(&[RecordingMarker {
                kind: RecordingKind::Stop,
                time: 10,
            }])
        });
        assert!(csv.contains("time,message\n5,\"say \"\"hi\"\", twice\"\n"));
        assert!(csv.contains("time,trigger\n6,254\n"));
        assert!(csv.contains("eye,start time,end time,duration\nR,7,9,3\n"));
        assert!(csv.contains("type,time\nEND,10\n"));
    }

    #[test]
    fn test_write_tables() {
        let dir = tempfile::tempdir().unwrap();
        let mut recording = AscRecording::empty("s01".into(), FormatKind::BinocularNoVelocity);
        recording.samples.push(sample(1000));

        write_tables(dir.path().join("out"), &recording).unwrap();
        for name in [
            "samples.csv",
            "messages.csv",
            "triggers.csv",
            "fixations.csv",
            "saccades.csv",
            "blinks.csv",
            "recordings.csv",
        ] {
            assert!(dir.path().join("out").join(name).is_file(), "{}", name);
        }
    }

    #[test]
    fn test_sync_outputs() {
        let dir = tempfile::tempdir().unwrap();
        let times = vec![100, 101, 102, 103];
        let mapping = BlockMapping {
            eeg_start: 40,
            eeg_len: 2,
            et_start_time: 101,
            et_span: 2,
            resample_factor: 1.0,
        };
        let index = IndexBuilder::default().build(&times, &[mapping]);

        let csv_path = dir.path().join("sync.csv");
        write_sync_csv(&csv_path, &index, &times).unwrap();
        let csv = std::fs::read_to_string(&csv_path).unwrap();
        assert_eq!(
            csv,
            "et_sample,et_time,eeg_sample\n0,100,-1\n1,101,40\n2,102,41\n3,103,-1\n"
        );

        let bin_path = dir.path().join("sync.bin");
        write_sync_binary(&bin_path, &index).unwrap();
        let bytes = std::fs::read(&bin_path).unwrap();
        assert_eq!(&bytes[..8], SYNC_MAGIC);
        assert_eq!(bytes.len(), 8 + 4 + 8 + 4 * 8);
        assert_eq!(read_sync_binary(&bin_path).unwrap(), vec![-1, 40, 41, -1]);

        assert!(matches!(
            write_sync_csv(dir.path().join("bad.csv"), &index, &times[..2]),
            Err(OutputError::LengthMismatch { index: 4, times: 2 })
        ));
    }

    #[test]
    fn test_onsets_csv() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("onsets.csv");
        write_onsets_csv(&path, &[false, true], &[10, 11]).unwrap();
        let csv = std::fs::read_to_string(&path).unwrap();
        assert_eq!(csv, "sample,time,onset\n0,10,0\n1,11,1\n");
    }

    #[test]
    fn test_read_rejects_foreign_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("foreign.bin");
        std::fs::write(&path, b"NOTSYNC\0\x01\0\0\0").unwrap();
        assert!(matches!(
            read_sync_binary(&path),
            Err(OutputError::InvalidFormat(_))
        ));
    }
}
