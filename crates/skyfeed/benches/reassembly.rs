// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

#![allow(clippy::uninlined_format_args)] // Bench code readability over pedantic
#![allow(clippy::cast_possible_truncation)] // Bench parameters
#![allow(clippy::semicolon_if_nothing_returned)] // Benchmark code formatting

//! Video path benchmarks
//!
//! Measures:
//! - Fragment header parsing
//! - Frame reassembly throughput for in-order and reversed arrival
//! - Drop-oldest ring push/pop under overflow

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use skyfeed::video::{fragment_ring, Fragment, FragmentHeader, ReassemblerConfig};
use skyfeed::FrameReassembler;

/// Typical payload per datagram on the device's link.
const CHUNK: usize = 1400;

fn frame_datagrams(frame_id: u32, size: usize) -> Vec<Vec<u8>> {
    let mut data = vec![0xA5u8; size];
    data[..4].copy_from_slice(&[0, 0, 0, 1]);
    data.chunks(CHUNK)
        .enumerate()
        .map(|(i, piece)| {
            Fragment::build(
                FragmentHeader {
                    stream_type: 1,
                    reserved: 0,
                    payload_len: 0,
                    sequence: i as u32,
                    frame_size: size as u32,
                    offset: (i * CHUNK) as u32,
                    frame_id,
                },
                piece,
            )
        })
        .collect()
}

fn bench_parse(c: &mut Criterion) {
    let datagram = frame_datagrams(1, CHUNK).remove(0);
    c.bench_function("fragment_parse", |b| {
        b.iter(|| Fragment::parse(black_box(&datagram)).map(|f| f.header.frame_id))
    });
}

fn bench_reassembly(c: &mut Criterion) {
    let mut group = c.benchmark_group("reassembly");

    // I-frame-ish and P-frame-ish sizes at 720p / 8 Mbit/s.
    for size in [8_000usize, 40_000, 140_000] {
        let datagrams = frame_datagrams(7, size);
        let mut reversed = datagrams.clone();
        reversed.reverse();
        group.throughput(Throughput::Bytes(size as u64));

        group.bench_with_input(BenchmarkId::new("in_order", size), &datagrams, |b, frags| {
            let mut reassembler = FrameReassembler::new(ReassemblerConfig::default());
            b.iter(|| {
                let mut out = None;
                for d in frags {
                    if let Ok(Some(unit)) = reassembler.ingest(d) {
                        out = Some(unit);
                    }
                }
                black_box(out)
            })
        });

        group.bench_with_input(BenchmarkId::new("reversed", size), &reversed, |b, frags| {
            let mut reassembler = FrameReassembler::new(ReassemblerConfig::default());
            b.iter(|| {
                let mut out = None;
                for d in frags {
                    if let Ok(Some(unit)) = reassembler.ingest(d) {
                        out = Some(unit);
                    }
                }
                black_box(out)
            })
        });
    }

    group.finish();
}

fn bench_ring(c: &mut Criterion) {
    let mut group = c.benchmark_group("fragment_ring");
    let datagram = vec![0u8; CHUNK];

    for capacity in [64usize, 500] {
        group.throughput(Throughput::Elements(capacity as u64 * 2));
        group.bench_with_input(
            BenchmarkId::new("overflow_then_drain", capacity),
            &capacity,
            |b, &capacity| {
                let (tx, rx) = fragment_ring(capacity);
                b.iter(|| {
                    for _ in 0..capacity * 2 {
                        tx.push(datagram.clone());
                    }
                    while let Some(d) = rx.try_recv() {
                        black_box(d);
                    }
                })
            },
        );
    }

    group.finish();
}

criterion_group!(benches, bench_parse, bench_reassembly, bench_ring);
criterion_main!(benches);
