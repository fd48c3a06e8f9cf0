//! Benchmarks for decoding and dispatching one block of events.

use std::hint::black_box;

use criterion::{BenchmarkId, Criterion};
use saavy_sampler::io::{RawMidiEvent, SequencerEvent, SequencerEventKind};

use super::sine_engine;
use crate::BLOCK_SIZES;

pub fn bench_dispatch(c: &mut Criterion) {
    let mut group = c.benchmark_group("scenarios/dispatch");

    for &size in BLOCK_SIZES {
        let mut left = vec![0.0f32; size];
        let mut right = vec![0.0f32; size];

        // One note on and off per 16 frames, plus a CC sweep
        let raw: Vec<_> = (0..size as u32)
            .step_by(16)
            .flat_map(|frame| {
                let key = 48 + (frame / 16 % 24) as u8;
                [
                    RawMidiEvent::note_on(frame, 0, key, 90),
                    RawMidiEvent::control_change(frame, 0, 74, (frame % 128) as u8),
                    RawMidiEvent::note_off(frame + 8, 0, key, 0),
                ]
            })
            .collect();

        let engine = sine_engine(size, 32);
        group.bench_with_input(BenchmarkId::new("raw_midi", size), &size, |b, _| {
            b.iter(|| engine.render(black_box(&raw), &mut [&mut left[..], &mut right[..]]))
        });

        let sequenced: Vec<_> = (0..size as u32)
            .step_by(16)
            .flat_map(|frame| {
                let note = 48 + (frame / 16 % 24) as u8;
                [
                    SequencerEvent::new(
                        frame,
                        SequencerEventKind::NoteOn {
                            channel: 0,
                            note,
                            velocity: 90,
                        },
                    ),
                    SequencerEvent::new(
                        frame,
                        SequencerEventKind::PitchBend {
                            channel: 0,
                            value: frame as i32 - 4096,
                        },
                    ),
                    SequencerEvent::new(
                        frame + 8,
                        SequencerEventKind::NoteOff {
                            channel: 0,
                            note,
                            velocity: 0,
                        },
                    ),
                ]
            })
            .collect();

        let engine = sine_engine(size, 32);
        group.bench_with_input(BenchmarkId::new("sequencer", size), &size, |b, _| {
            b.iter(|| engine.render(black_box(&sequenced), &mut [&mut left[..], &mut right[..]]))
        });
    }

    group.finish();
}
