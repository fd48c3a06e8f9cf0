//! Engine-level scenarios.
//!
//! Full blocks through `Engine::render` as the audio callback drives it:
//! held voices, a busy control gate and dense event streams.

mod dispatch;
mod render;

pub use dispatch::bench_dispatch;
pub use render::bench_render;

use std::path::Path;
use std::sync::Arc;

use saavy_sampler::{
    patch::{loader::build_instrument, Patch},
    Engine, SynthSettings,
};

use crate::SAMPLE_RATE;

/// Engine with a single sine region across the keyboard.
pub fn sine_engine(block_size: usize, num_voices: usize) -> Engine {
    let settings = SynthSettings {
        sample_rate: SAMPLE_RATE,
        samples_per_block: block_size,
        num_voices,
        ..SynthSettings::default()
    };
    let engine = Engine::new(settings).expect("valid bench settings");
    let patch = serde_json::json!({
        "name": "bench sine",
        "regions": [{
            "source": { "type": "oscillator", "waveform": "sine" },
            "amplitude_envelope": {
                "attack_ms": 1, "decay_ms": 10, "sustain_level": 0.8, "release_ms": 200
            }
        }]
    });
    let patch: Patch = serde_json::from_value(patch).expect("valid bench patch");
    let (instrument, _) = build_instrument(patch, Path::new(".")).expect("buildable bench patch");
    engine.configure(|synth| synth.set_instrument(Some(Arc::new(instrument))));
    engine
}
