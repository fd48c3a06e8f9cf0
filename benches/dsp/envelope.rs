//! Benchmarks for the flex envelope generator.

use std::hint::black_box;
use std::sync::Arc;

use criterion::{BenchmarkId, Criterion};
use saavy_sampler::dsp::envelope::{FlexEgDescription, FlexEgPoint, FlexEnvelope};

use crate::{BLOCK_SIZES, SAMPLE_RATE};

fn started(desc: FlexEgDescription, advance: usize) -> FlexEnvelope {
    let mut env = FlexEnvelope::new(SAMPLE_RATE);
    env.configure(Arc::new(desc));
    env.start(0);
    let mut skip = vec![0.0f32; advance];
    env.process(&mut skip);
    env
}

pub fn bench_envelope(c: &mut Criterion) {
    let mut group = c.benchmark_group("dsp/envelope");

    for &size in BLOCK_SIZES {
        let mut buffer = vec![0.0f32; size];

        // Attack phase (ramping up)
        let mut env = started(FlexEgDescription::adsr(10.0, 0.1, 0.7, 0.3), 0);
        group.bench_with_input(BenchmarkId::new("attack", size), &size, |b, _| {
            b.iter(|| env.process(black_box(&mut buffer)))
        });

        // Sustain phase (holding steady)
        let mut env = started(FlexEgDescription::adsr(0.001, 0.001, 0.7, 0.3), 200);
        group.bench_with_input(BenchmarkId::new("sustain", size), &size, |b, _| {
            b.iter(|| env.process(black_box(&mut buffer)))
        });

        // Release phase (ramping down)
        let mut env = started(FlexEgDescription::adsr(0.001, 0.001, 0.7, 10.0), 200);
        env.release(0);
        group.bench_with_input(BenchmarkId::new("release", size), &size, |b, _| {
            b.iter(|| env.process(black_box(&mut buffer)))
        });

        // Curved multi-point attack
        let curved = FlexEgDescription {
            points: (0..8)
                .map(|i| FlexEgPoint {
                    time: 1.0,
                    level: if i % 2 == 0 { 1.0 } else { 0.3 },
                    shape: 4.0,
                })
                .chain(std::iter::once(FlexEgPoint {
                    time: 0.5,
                    level: 0.0,
                    shape: -2.0,
                }))
                .collect(),
            sustain: 7,
        };
        let mut env = started(curved, 0);
        group.bench_with_input(BenchmarkId::new("curved", size), &size, |b, _| {
            b.iter(|| env.process(black_box(&mut buffer)))
        });
    }

    group.finish();
}
