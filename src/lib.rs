pub mod config;
pub mod control; // Interactive command surface
pub mod dsp;
pub mod engine; // Render gate, host entry points
pub mod error;
pub mod io;
pub mod patch; // Instrument descriptions and loading
pub mod synth; // Voice management and polyphony

pub use config::{Oversampling, SynthSettings, MAX_BLOCK_SIZE, NUM_CHANNELS};
pub use engine::{Engine, RenderStatus, ShutdownToken};
pub use error::ConfigError;

pub(crate) const MIN_TIME: f32 = 1.0 / 48_000.0;
