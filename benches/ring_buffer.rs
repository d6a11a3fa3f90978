//! Criterion benchmarks for the exchange hot paths.
//!
//! Key metrics:
//! - Frame push cost per input group (firmware side, one call per master tick)
//! - Pull latency for typical extension block sizes
//! - Concurrent producer/consumer throughput
//!
//! Run with: cargo bench --bench ring_buffer

use chantrig::data::{GroupSamples, SampleBuffer};
use chantrig::divider::RateDivider;
use chantrig::registry::{InputGroup, FRONTEND_COUNT};
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;

/// Push one frame per iteration into each group's ring.
fn sample_push(c: &mut Criterion) {
    let mut group = c.benchmark_group("sample_push");

    for input in InputGroup::ALL {
        let buffer = SampleBuffer::<f32>::new(input, RateDivider::FULL, 30_000);
        let frame = vec![0.5f32; input.channel_count()];
        let mut proctime = 0u32;

        group.throughput(Throughput::Elements(input.channel_count() as u64));
        group.bench_function(BenchmarkId::new("push", input.name()), |b| {
            b.iter(|| {
                buffer.push_frame(black_box(proctime), black_box(&frame));
                proctime = proctime.wrapping_add(1);
            });
        });
    }

    group.finish();
}

/// Pull blocks of various sizes from a full front-end ring without consuming.
fn sample_pull(c: &mut Criterion) {
    let mut group = c.benchmark_group("sample_pull");
    let buffer = SampleBuffer::<f32>::new(InputGroup::Frontend, RateDivider::FULL, 3_000);
    let frame = vec![1.0f32; FRONTEND_COUNT];
    for t in 0..3_000u32 {
        buffer.push_frame(t, &frame);
    }

    for frames in [30usize, 300, 3_000] {
        let mut dest = GroupSamples::for_group(InputGroup::Frontend, frames);
        group.throughput(Throughput::Elements((frames * FRONTEND_COUNT) as u64));
        group.bench_with_input(BenchmarkId::new("pull", frames), &frames, |b, _| {
            b.iter(|| black_box(buffer.pull_into(&mut dest)));
        });
    }

    group.finish();
}

/// Firmware thread pushing while the extension pulls and consumes.
fn concurrent_exchange(c: &mut Criterion) {
    let mut group = c.benchmark_group("concurrent_exchange");
    group.sample_size(20);

    group.bench_function("analog_input_300_frame_blocks", |b| {
        let buffer = Arc::new(SampleBuffer::<f32>::new(
            InputGroup::AnalogInput,
            RateDivider::FULL,
            30_000,
        ));
        let stop = Arc::new(AtomicBool::new(false));
        let producer = {
            let buffer = buffer.clone();
            let stop = stop.clone();
            thread::spawn(move || {
                let frame = [0.25f32; 16];
                let mut proctime = 0u32;
                while !stop.load(Ordering::Relaxed) {
                    buffer.push_frame(proctime, &frame);
                    proctime = proctime.wrapping_add(1);
                }
            })
        };

        let mut dest = GroupSamples::for_group(InputGroup::AnalogInput, 300);
        b.iter(|| {
            let pulled = buffer.pull_into(&mut dest);
            black_box(buffer.consume_run(pulled));
        });

        stop.store(true, Ordering::Relaxed);
        producer.join().unwrap();
    });

    group.finish();
}

criterion_group!(benches, sample_push, sample_pull, concurrent_exchange);
criterion_main!(benches);
