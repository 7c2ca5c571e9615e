//! Benchmarks for ASC decoding, saccade detection and synchronization.
//!
//! Run with: cargo bench

use criterion::{black_box, criterion_group, criterion_main, Criterion, Throughput};
use etsync_core::saccade::{EngbertMergenthaler, SaccadeDetector};
use etsync_core::{AscDecoder, DetectorConfig, EegTriggerChannel, Synchronizer, Trigger};
use ndarray::Array2;
use std::fmt::Write;

const N_SAMPLES: usize = 600_000;
const BLOCK_LEN: usize = 60_000;

/// Synthetic 10 minute binocular recording with one block per minute.
fn synthetic_log() -> String {
    let mut log = String::with_capacity(N_SAMPLES * 64);
    for i in 0..N_SAMPLES {
        if i % BLOCK_LEN == 100 {
            writeln!(log, "INPUT\t{}\t254", i).unwrap();
        }
        let x = 500.0 + (i as f64 * 0.3).sin();
        writeln!(
            log,
            "{}\t{:.1}\t300.0\t900.0\t{:.1}\t310.0\t910.0\t.....",
            i,
            x,
            x + 5.0
        )
        .unwrap();
    }
    log
}

fn trigger_stream() -> (Vec<i64>, Vec<Trigger>, EegTriggerChannel) {
    let times: Vec<i64> = (0..N_SAMPLES as i64).collect();
    let mut triggers = Vec::new();
    let mut events = Vec::new();
    for block in 0..N_SAMPLES / BLOCK_LEN {
        let start = block * BLOCK_LEN + 100;
        let codes = [254]
            .into_iter()
            .chain((1..=40).map(|k| (block * 40 + k) as i32 % 250 + 1))
            .chain([255]);
        for (k, code) in codes.enumerate() {
            let offset = start + k * 1000 + (k * k) % 300;
            triggers.push(Trigger::new(offset as i64, code));
            events.push((offset + 2000, code));
        }
    }
    let eeg = EegTriggerChannel::from_events(N_SAMPLES + 4000, &events, 1000.0);
    (times, triggers, eeg)
}

fn decode_benchmark(c: &mut Criterion) {
    let log = synthetic_log();
    let decoder = AscDecoder::default();

    let mut group = c.benchmark_group("decode");
    group.throughput(Throughput::Bytes(log.len() as u64));
    group.bench_function("synthetic_600k_samples", |b| {
        b.iter(|| {
            let recording = decoder.decode_str("bench", black_box(&log)).unwrap();
            black_box(recording.samples.len())
        })
    });
    group.finish();
}

fn detect_benchmark(c: &mut Criterion) {
    let positions = Array2::from_shape_fn((N_SAMPLES, 2), |(i, axis)| {
        300.0 + axis as f64 + (i as f64 * 0.3).sin()
    });
    let detector = EngbertMergenthaler::new(DetectorConfig::default());

    let mut group = c.benchmark_group("detect");
    group.throughput(Throughput::Elements(N_SAMPLES as u64));
    group.bench_function("engbert_mergenthaler", |b| {
        b.iter(|| {
            let onsets = detector.detect(black_box(positions.view()), 1000.0).unwrap();
            black_box(onsets.len())
        })
    });
    group.finish();
}

fn sync_benchmark(c: &mut Criterion) {
    let (times, triggers, eeg) = trigger_stream();
    let synchronizer = Synchronizer::default();

    let mut group = c.benchmark_group("synchronize");
    group.throughput(Throughput::Elements(N_SAMPLES as u64));
    group.bench_function("ten_blocks", |b| {
        b.iter(|| {
            let result = synchronizer
                .synchronize_streams(black_box(&times), &triggers, &eeg)
                .unwrap();
            black_box(result.index.mapped_count())
        })
    });
    group.finish();
}

criterion_group!(benches, decode_benchmark, detect_benchmark, sync_benchmark);
criterion_main!(benches);
