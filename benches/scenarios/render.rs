//! Benchmarks for full engine blocks.

use std::hint::black_box;
use std::sync::mpsc;
use std::thread;

use criterion::{BenchmarkId, Criterion};
use saavy_sampler::io::RawMidiEvent;

use super::sine_engine;
use crate::BLOCK_SIZES;

const NO_EVENTS: [RawMidiEvent; 0] = [];

pub fn bench_render(c: &mut Criterion) {
    let mut group = c.benchmark_group("scenarios/render");

    for &size in BLOCK_SIZES {
        let mut left = vec![0.0f32; size];
        let mut right = vec![0.0f32; size];

        // Idle engine: gate, clear and mixdown only
        let engine = sine_engine(size, 64);
        group.bench_with_input(BenchmarkId::new("idle", size), &size, |b, _| {
            b.iter(|| engine.render(NO_EVENTS, black_box(&mut [&mut left[..], &mut right[..]])))
        });

        // Held chords of increasing density
        for voices in [8u8, 32, 64] {
            let engine = sine_engine(size, 64);
            let chord: Vec<_> = (0..voices)
                .map(|i| RawMidiEvent::note_on(0, 0, 36 + i, 100))
                .collect();
            engine.render(&chord, &mut [&mut left[..], &mut right[..]]);

            group.bench_with_input(
                BenchmarkId::new(format!("{voices}_voices"), size),
                &size,
                |b, _| {
                    b.iter(|| {
                        engine.render(NO_EVENTS, black_box(&mut [&mut left[..], &mut right[..]]))
                    })
                },
            );
        }

        // Gate held by a control thread: the silent path
        let engine = sine_engine(size, 64);
        let (held_tx, held_rx) = mpsc::channel();
        let (done_tx, done_rx) = mpsc::channel::<()>();
        let holder = {
            let engine = engine.clone();
            thread::spawn(move || {
                engine.configure(|_| {
                    let _ = held_tx.send(());
                    let _ = done_rx.recv();
                })
            })
        };
        let _ = held_rx.recv();
        group.bench_with_input(BenchmarkId::new("contended", size), &size, |b, _| {
            b.iter(|| engine.render(NO_EVENTS, black_box(&mut [&mut left[..], &mut right[..]])))
        });
        let _ = done_tx.send(());
        let _ = holder.join();
    }

    group.finish();
}
