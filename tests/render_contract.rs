use std::fs;
use std::path::PathBuf;
use std::sync::mpsc;
use std::thread;

use saavy_sampler::{
    io::{dispatch, RawMidiEvent, SequencerEvent, SequencerEventKind},
    synth::message::{drain, midi_queue},
    Engine, RenderStatus, SynthSettings,
};

const BLOCK: usize = 256;

fn engine() -> Engine {
    Engine::new(SynthSettings {
        sample_rate: 48_000.0,
        samples_per_block: BLOCK,
        num_voices: 8,
        ..SynthSettings::default()
    })
    .unwrap()
}

fn write_patch(name: &str, release_ms: f32) -> PathBuf {
    let path = std::env::temp_dir().join(format!(
        "saavy-sampler-contract-{}-{name}.json",
        std::process::id()
    ));
    fs::write(
        &path,
        format!(
            r#"{{
                "name": "{name}",
                "regions": [{{
                    "source": {{ "type": "oscillator", "waveform": "sine" }},
                    "amplitude_envelope": {{
                        "attack_ms": 1, "decay_ms": 0, "sustain_level": 1.0,
                        "release_ms": {release_ms}
                    }}
                }}]
            }}"#
        ),
    )
    .unwrap();
    path
}

fn loaded_engine(name: &str) -> Engine {
    let engine = engine();
    let path = write_patch(name, 20.0);
    engine.load_instrument(&path).unwrap();
    fs::remove_file(&path).ok();
    engine
}

fn peak(buffers: &[Vec<f32>]) -> f32 {
    buffers
        .iter()
        .flatten()
        .fold(0.0f32, |acc, s| acc.max(s.abs()))
}

fn render(engine: &Engine, events: &[RawMidiEvent]) -> Vec<Vec<f32>> {
    let mut left = vec![0.0; BLOCK];
    let mut right = vec![0.0; BLOCK];
    let code = engine.render(events, &mut [&mut left[..], &mut right[..]]);
    assert_eq!(code, 0);
    vec![left, right]
}

#[test]
fn contested_block_is_exactly_n_zeros_per_channel() {
    let engine = loaded_engine("contested");
    render(&engine, &[RawMidiEvent::note_on(0, 0, 60, 127)]);

    let (held_tx, held_rx) = mpsc::channel();
    let (done_tx, done_rx) = mpsc::channel::<()>();
    let holder = {
        let engine = engine.clone();
        thread::spawn(move || {
            engine.configure(|_| {
                held_tx.send(()).unwrap();
                done_rx.recv().unwrap();
            });
        })
    };
    held_rx.recv().unwrap();

    let mut outputs = vec![vec![1.0f32; BLOCK]; 3];
    let status = {
        let [a, b, c] = &mut outputs[..] else { unreachable!() };
        engine.render_with(
            |sink| dispatch(sink, [RawMidiEvent::note_on(0, 0, 64, 100)]),
            &mut [&mut a[..], &mut b[..], &mut c[..]],
        )
    };
    assert_eq!(status, RenderStatus::Silenced);
    assert!(outputs.iter().all(|channel| channel.len() == BLOCK));
    assert!(outputs.iter().flatten().all(|s| *s == 0.0));
    assert_eq!(engine.contention_count(), 1);

    done_tx.send(()).unwrap();
    holder.join().unwrap();

    // The held note keeps playing once the gate is free again.
    assert!(peak(&render(&engine, &[])) > 0.1);
}

#[test]
fn note_on_then_note_off_decays_to_silence() {
    let engine = loaded_engine("decay");

    let first = render(&engine, &[RawMidiEvent::note_on(0, 0, 69, 127)]);
    assert!(peak(&first) > 0.1);
    assert_eq!(engine.num_active_voices(), 1);

    render(&engine, &[RawMidiEvent::note_off(0, 0, 69, 0)]);

    // 20 ms release at 48 kHz is under four blocks.
    let mut last = Vec::new();
    for _ in 0..8 {
        last = render(&engine, &[]);
    }
    assert_eq!(peak(&last), 0.0);
    assert_eq!(engine.num_active_voices(), 0);
}

#[test]
fn velocity_zero_note_on_releases_like_note_off() {
    let a = loaded_engine("vel0-a");
    let b = loaded_engine("vel0-b");

    for engine in [&a, &b] {
        render(engine, &[RawMidiEvent::note_on(0, 0, 60, 100)]);
    }
    let off_a = render(&a, &[RawMidiEvent::note_on(17, 0, 60, 0)]);
    let off_b = render(&b, &[RawMidiEvent::note_off(17, 0, 60, 0)]);
    assert_eq!(off_a, off_b);
}

#[test]
fn trigger_delay_is_frame_accurate() {
    let engine = loaded_engine("delay");
    let block = render(&engine, &[RawMidiEvent::note_on(100, 0, 72, 127)]);
    for channel in &block {
        assert!(channel[..100].iter().all(|s| *s == 0.0));
        assert!(channel[101..].iter().any(|s| s.abs() > 0.01));
    }
}

#[test]
fn several_transports_feed_one_block() {
    let engine = loaded_engine("transports");
    let raw = [RawMidiEvent::note_on(0, 0, 60, 100)];
    let sequenced = [SequencerEvent::new(
        10,
        SequencerEventKind::NoteOn {
            channel: 0,
            note: 67,
            velocity: 100,
        },
    )];

    let mut left = vec![0.0; BLOCK];
    let status = engine.render_with(
        |sink| dispatch(&mut *sink, &raw) + dispatch(&mut *sink, &sequenced),
        &mut [&mut left[..]],
    );
    assert_eq!(status, RenderStatus::Rendered { events: 2 });
    assert_eq!(engine.num_active_voices(), 2);
}

#[test]
fn queued_events_land_on_frame_zero_and_are_dropped_when_contested() {
    let engine = loaded_engine("queue");
    let (mut tx, mut rx) = midi_queue(16);

    // Dropped: the block that drains it is contested.
    tx.send(&[0x90, 60, 100]);
    let mut left = vec![0.0; BLOCK];
    engine.configure(|_| engine.render(drain(&mut rx), &mut [&mut left[..]]));
    assert_eq!(engine.contention_count(), 1);
    assert!(rx.is_empty());

    let block = render(&engine, &[]);
    assert_eq!(peak(&block), 0.0);

    // Delivered: starts at the first frame of the next block.
    tx.send(&[0x90, 60, 100]);
    let mut left = vec![0.0; BLOCK];
    engine.render(drain(&mut rx), &mut [&mut left[..]]);
    assert!(left[1..].iter().any(|s| s.abs() > 0.01));
    assert_eq!(engine.num_active_voices(), 1);
}

#[test]
fn volume_controller_applies_from_its_own_frame() {
    let engine = loaded_engine("cc-timing");
    render(&engine, &[RawMidiEvent::note_on(0, 0, 60, 127)]);

    let block = render(&engine, &[RawMidiEvent::control_change(40, 0, 7, 0)]);
    for channel in &block {
        let before = channel[..40].iter().fold(0.0f32, |acc, s| acc.max(s.abs()));
        assert!(before > 0.1);
        assert!(channel[40..].iter().all(|s| *s == 0.0));
    }
}
