//! Eye-tracker / EEG synchronization CLI application.
//!
//! Parses EyeLink ASC logs, detects saccades and aligns eye-tracker samples
//! with an EEG trigger channel.

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use etsync_core::{
    output, AscDecoder, AscRecording, DetectorConfig, DetectorKind, EegTriggerChannel,
    FormatKind, SyncConfig, Synchronizer,
};
use indicatif::{ProgressBar, ProgressStyle};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Instant;

/// Eye-tracker log parser and EEG synchronizer.
///
/// Converts EyeLink .asc logs to CSV tables, detects microsaccades and maps
/// every eye-tracker sample to its EEG sample.
#[derive(Parser, Debug)]
#[command(name = "etsync")]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Suppress progress output
    #[arg(short, long, global = true)]
    quiet: bool,

    /// Increase log verbosity (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Write the seven decoded tables of a log as CSV files
    Parse(ParseArgs),
    /// Detect saccade onsets and write them as CSV
    Detect(DetectArgs),
    /// Synchronize a log with an EEG trigger channel
    Sync(SyncArgs),
}

/// ASC layout of the input file.
#[derive(ValueEnum, Clone, Copy, Debug, Default)]
enum Format {
    /// Both eyes, no velocity columns
    #[default]
    Binocular,
    /// Left eye only, no velocity columns
    MonocularLeft,
    /// Right eye only, no velocity columns
    MonocularRight,
}

impl From<Format> for FormatKind {
    fn from(format: Format) -> Self {
        match format {
            Format::Binocular => FormatKind::BinocularNoVelocity,
            Format::MonocularLeft => FormatKind::MonocularLeftNoVelocity,
            Format::MonocularRight => FormatKind::MonocularRightNoVelocity,
        }
    }
}

#[derive(ValueEnum, Clone, Copy, Debug, Default)]
enum Detector {
    /// Engbert & Mergenthaler (2006) velocity threshold
    #[default]
    EngbertMergenthaler,
}

impl From<Detector> for DetectorKind {
    fn from(detector: Detector) -> Self {
        match detector {
            Detector::EngbertMergenthaler => DetectorKind::EngbertMergenthaler,
        }
    }
}

#[derive(Args, Debug)]
struct ParseArgs {
    /// Input EyeLink .asc file path
    #[arg(value_name = "INPUT")]
    input: PathBuf,

    /// Directory receiving samples.csv, messages.csv, triggers.csv, ...
    #[arg(value_name = "OUT_DIR")]
    output: PathBuf,

    /// ASC layout
    #[arg(short, long, value_enum, default_value_t = Format::Binocular)]
    format: Format,
}

#[derive(Args, Debug)]
struct DetectArgs {
    /// Input EyeLink .asc file path
    #[arg(value_name = "INPUT")]
    input: PathBuf,

    /// Output CSV with `sample,time,onset` rows
    #[arg(value_name = "OUTPUT")]
    output: PathBuf,

    /// ASC layout
    #[arg(short, long, value_enum, default_value_t = Format::Binocular)]
    format: Format,

    /// Detection algorithm
    #[arg(long, value_enum, default_value_t = Detector::EngbertMergenthaler)]
    detector: Detector,

    /// Threshold in units of the median-based velocity SD
    #[arg(long, default_value_t = 5.0)]
    lambda: f64,

    /// Minimum number of consecutive above-threshold samples
    #[arg(long, default_value_t = 2)]
    min_run: usize,

    /// Maximum left/right onset distance in samples
    #[arg(long, default_value_t = 20)]
    binocular_tolerance: usize,
}

#[derive(Args, Debug)]
struct SyncArgs {
    /// Input EyeLink .asc file path
    #[arg(value_name = "INPUT")]
    input: PathBuf,

    /// Output file path (.csv, .bin)
    ///
    /// The output format is determined by the file extension:
    /// - .csv: `et_sample,et_time,eeg_sample` rows (-1 = unmapped)
    /// - .bin: Binary index (magic, version, count, i64 entries)
    #[arg(value_name = "OUTPUT")]
    output: PathBuf,

    /// CSV of EEG trigger events with `sample,code` rows
    #[arg(long, value_name = "CSV")]
    eeg_triggers: PathBuf,

    /// EEG sampling rate in Hz
    #[arg(long, value_name = "HZ")]
    eeg_rate: f64,

    /// Length of the EEG recording in samples (default: last trigger + 1)
    #[arg(long, value_name = "N")]
    eeg_samples: Option<usize>,

    /// ASC layout
    #[arg(short, long, value_enum, default_value_t = Format::Binocular)]
    format: Format,

    /// Maximal anchor position difference in eye-tracker clock ticks
    #[arg(long, default_value_t = 100.0)]
    anchor_tolerance: f64,

    /// Extra ticks tried when locating a block start among samples
    #[arg(long, default_value_t = 1)]
    start_tolerance: i64,

    /// Boxcar width used before correlating blocks
    #[arg(long, default_value_t = 10)]
    smoothing_window: usize,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(&cli)?;

    let progress = if cli.quiet {
        ProgressBar::hidden()
    } else {
        let pb = ProgressBar::new_spinner();
        pb.set_style(
            ProgressStyle::default_spinner()
                .template("{spinner:.green} [{elapsed_precise}] {msg}")
                .context("Invalid progress template")?,
        );
        pb
    };

    let result = match &cli.command {
        Command::Parse(args) => run_parse(args, &progress, cli.quiet),
        Command::Detect(args) => run_detect(args, &progress, cli.quiet),
        Command::Sync(args) => run_sync(args, &progress, cli.quiet),
    };

    if let Err(ref e) = result {
        progress.abandon();
        tracing::error!(error = %e, "Command failed");
    }
    result
}

/// Installs the stderr log subscriber. `RUST_LOG` wins unless `-v` is given.
fn init_logging(cli: &Cli) -> Result<()> {
    use tracing_subscriber::EnvFilter;

    let filter = match cli.verbose {
        0 => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        1 => EnvFilter::new("debug"),
        _ => EnvFilter::new("trace"),
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init()
        .map_err(|e| anyhow::anyhow!("Failed to initialize logging: {}", e))
}

fn decode(input: &Path, format: Format, progress: &ProgressBar) -> Result<AscRecording> {
    progress.set_message(format!(
        "Decoding {:?}...",
        input.file_name().unwrap_or_default()
    ));
    AscDecoder::new(format.into())
        .decode_file(input)
        .with_context(|| format!("Failed to decode ASC file {:?}", input))
}

fn run_parse(args: &ParseArgs, progress: &ProgressBar, quiet: bool) -> Result<()> {
    let start_time = Instant::now();
    let recording = decode(&args.input, args.format, progress)?;

    progress.set_message(format!("Writing tables to {:?}...", args.output));
    output::write_tables(&args.output, &recording).context("Failed to write CSV tables")?;

    let total_duration = start_time.elapsed();
    progress.finish_with_message(format!(
        "Done! Decoded {} samples in {:.2}s",
        recording.samples.len(),
        total_duration.as_secs_f64()
    ));

    if !quiet {
        eprintln!();
        eprintln!("Summary:");
        eprintln!("  Input:        {:?}", args.input);
        eprintln!("  Output:       {:?}", args.output);
        eprintln!("  Format:       {}", recording.format);
        eprintln!("  Samples:      {}", recording.samples.len());
        eprintln!("  Triggers:     {}", recording.triggers.len());
        eprintln!("  Messages:     {}", recording.messages.len());
        eprintln!("  Fixations:    {}", recording.fixations.len());
        eprintln!("  Saccades:     {}", recording.saccades.len());
        eprintln!("  Blinks:       {}", recording.blinks.len());
        eprintln!("  Skipped:      {}", recording.skipped_lines());
        eprintln!("  Duration:     {:.3}s", total_duration.as_secs_f64());
    }
    Ok(())
}

fn run_detect(args: &DetectArgs, progress: &ProgressBar, quiet: bool) -> Result<()> {
    let start_time = Instant::now();
    let recording = decode(&args.input, args.format, progress)?;

    progress.set_message("Detecting saccades...");
    let config = DetectorConfig {
        lambda: args.lambda,
        min_run: args.min_run,
        binocular_tolerance: args.binocular_tolerance,
    };
    let detected = recording
        .detect_saccades(args.detector.into(), &config)
        .context("Saccade detection failed")?;

    output::write_onsets_csv(&args.output, &detected.onsets, &recording.sample_times())
        .context("Failed to write onset CSV")?;

    let onsets = detected.onset_indices().len();
    let total_duration = start_time.elapsed();
    progress.finish_with_message(format!(
        "Done! Found {} saccade onsets in {:.2}s",
        onsets,
        total_duration.as_secs_f64()
    ));

    if !quiet {
        let count = |flags: &Option<Vec<bool>>| {
            flags
                .as_ref()
                .map_or("-".to_string(), |f| f.iter().filter(|&&o| o).count().to_string())
        };
        eprintln!();
        eprintln!("Summary:");
        eprintln!("  Input:        {:?}", args.input);
        eprintln!("  Output:       {:?}", args.output);
        eprintln!("  Samples:      {}", recording.samples.len());
        eprintln!("  Left onsets:  {}", count(&detected.left));
        eprintln!("  Right onsets: {}", count(&detected.right));
        eprintln!("  Onsets:       {}", onsets);
        eprintln!("  Duration:     {:.3}s", total_duration.as_secs_f64());
    }
    Ok(())
}

fn run_sync(args: &SyncArgs, progress: &ProgressBar, quiet: bool) -> Result<()> {
    let start_time = Instant::now();

    // Check the output format before doing any work
    let output_ext = args
        .output
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("csv")
        .to_lowercase();
    if output_ext != "csv" && output_ext != "bin" {
        anyhow::bail!(
            "Unsupported output format: .{}. Use .csv or .bin",
            output_ext
        );
    }

    let events = read_eeg_events(&args.eeg_triggers)?;
    let n_samples = args
        .eeg_samples
        .unwrap_or_else(|| events.iter().map(|&(s, _)| s + 1).max().unwrap_or(0));
    let eeg = EegTriggerChannel::from_events(n_samples, &events, args.eeg_rate);

    let recording = decode(&args.input, args.format, progress)?;

    progress.set_message("Synchronizing...");
    let config = SyncConfig {
        anchor_tolerance: args.anchor_tolerance,
        start_lookup_tolerance: args.start_tolerance,
        smoothing_window: args.smoothing_window,
        ..SyncConfig::default()
    };
    let result = Synchronizer::new(config)
        .synchronize(&recording, &eeg)
        .context("Synchronization failed")?;

    progress.set_message(format!(
        "Writing to {:?}...",
        args.output.file_name().unwrap_or_default()
    ));
    if output_ext == "bin" {
        output::write_sync_binary(&args.output, &result.index)
            .context("Failed to write binary output")?;
    } else {
        output::write_sync_csv(&args.output, &result.index, &recording.sample_times())
            .context("Failed to write CSV output")?;
    }

    let total_duration = start_time.elapsed();
    progress.finish_with_message(format!(
        "Done! Mapped {} of {} samples in {:.2}s",
        result.index.mapped_count(),
        result.index.len(),
        total_duration.as_secs_f64()
    ));

    if !quiet {
        eprintln!();
        eprintln!("Summary:");
        eprintln!("  Input:        {:?}", args.input);
        eprintln!("  Output:       {:?}", args.output);
        eprintln!(
            "  Blocks:       {} ET / {} EEG, {} matched (offset {}, score {:.3})",
            result.et_blocks,
            result.eeg_blocks,
            result.block_match.len(),
            result.block_match.offset,
            result.block_match.score
        );
        eprintln!("  Nominal ratio: {:.6}", result.nominal_ratio);
        for a in &result.alignments {
            let placed = a
                .et_samples
                .as_ref()
                .map_or("not placed".to_string(), |r| format!("samples {}..{}", r.start, r.end));
            eprintln!(
                "    block {}: EEG {}..{}, factor {:.6}, drift {}, {}",
                a.pair,
                a.eeg_block.start,
                a.eeg_block.end,
                a.resample_factor,
                if a.drift.is_fine_tuned() {
                    format!("{:.6}", a.drift.factor())
                } else {
                    "nominal".to_string()
                },
                placed
            );
        }
        eprintln!("  Degraded:     {}", result.degraded_blocks().count());
        eprintln!(
            "  Mapped:       {} / {}",
            result.index.mapped_count(),
            result.index.len()
        );
        eprintln!("  Duration:     {:.3}s", total_duration.as_secs_f64());
    }
    Ok(())
}

/// Reads `sample,code` rows. A non-numeric first row is treated as a header.
fn read_eeg_events(path: &Path) -> Result<Vec<(usize, i32)>> {
    let text = fs::read_to_string(path)
        .with_context(|| format!("Failed to read EEG trigger file {:?}", path))?;

    let mut events = Vec::new();
    for (i, line) in text.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let mut fields = line.split(',').map(str::trim);
        let parsed = match (fields.next(), fields.next()) {
            (Some(sample), Some(code)) => sample.parse::<usize>().ok().zip(code.parse::<i32>().ok()),
            _ => None,
        };
        match parsed {
            Some(event) => events.push(event),
            None if i == 0 => continue,
            None => anyhow::bail!("{:?} line {}: expected `sample,code`, got {:?}", path, i + 1, line),
        }
    }
    Ok(events)
}
