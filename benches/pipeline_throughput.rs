//! Benchmarks for queue hand-off and segment accumulation.

use criterion::{Criterion, criterion_group, criterion_main};
use std::hint::black_box;
use streamscribe::chunk::SequencedChunk;
use streamscribe::config::{QueueConfig, SegmentConfig};
use streamscribe::engine::EngineOutput;
use streamscribe::queue::{self, Dequeue};
use streamscribe::segment::SegmentAccumulator;

fn bench_queue_handoff(c: &mut Criterion) {
    // 100ms of 16kHz mono 16-bit PCM per chunk
    let payload = vec![0u8; 3200];

    c.bench_function("queue_enqueue_dequeue_unbounded", |b| {
        let (producer, mut consumer, _cancel) = queue::open(&QueueConfig::default());
        let mut sequence = 0u64;
        b.iter(|| {
            producer
                .enqueue(SequencedChunk::new(sequence, payload.clone()))
                .unwrap();
            sequence += 1;
            match consumer.dequeue() {
                Dequeue::Item(chunk) => black_box(chunk.sequence),
                other => panic!("unexpected {:?}", other),
            }
        });
    });

    c.bench_function("queue_enqueue_dequeue_bounded", |b| {
        let config = QueueConfig {
            bounded: true,
            capacity: 64,
            ..QueueConfig::default()
        };
        let (producer, mut consumer, _cancel) = queue::open(&config);
        let mut sequence = 0u64;
        b.iter(|| {
            producer
                .enqueue(SequencedChunk::new(sequence, payload.clone()))
                .unwrap();
            sequence += 1;
            match consumer.dequeue() {
                Dequeue::Item(chunk) => black_box(chunk.sequence),
                other => panic!("unexpected {:?}", other),
            }
        });
    });
}

fn bench_segment_absorb(c: &mut Criterion) {
    c.bench_function("segment_absorb_at_cadence", |b| {
        let mut accumulator = SegmentAccumulator::new(&SegmentConfig { final_cadence: 5 });
        b.iter(|| {
            let results = accumulator.absorb(EngineOutput::from_text("benchmark hypothesis"));
            black_box(results.len())
        });
    });
}

criterion_group!(benches, bench_queue_handoff, bench_segment_absorb);
criterion_main!(benches);
