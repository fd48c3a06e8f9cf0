//! Errors reported by control-plane entry points.
//!
//! Nothing here ever crosses the render boundary: the render path either
//! succeeds, skips a malformed event, or renders silence.

use std::path::PathBuf;

use crate::patch::loader::LoadError;

#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    #[error("invalid sample rate: {0}")]
    SampleRate(f32),
    #[error("invalid block size: {0} (expected 1..={max})", max = crate::MAX_BLOCK_SIZE)]
    BlockSize(usize),
    #[error("invalid number of voices: {0} (expected 1..={max})", max = crate::config::MAX_VOICES)]
    NumVoices(usize),
    #[error("invalid oversampling factor: {0} (expected 1, 2, 4 or 8)")]
    Oversampling(u32),
    #[error("invalid preload size: {0}")]
    PreloadSize(u32),
    #[error("invalid volume: {0} dB")]
    Volume(f32),
    #[error("could not parse value '{0}'")]
    Parse(String),
    #[error("could not load the instrument file {path}: {source}")]
    Instrument {
        path: PathBuf,
        #[source]
        source: LoadError,
    },
    #[error("could not allocate {frames} frames of render storage")]
    Allocation { frames: usize },
    #[error("could not allocate a pool of {voices} voices")]
    VoiceAllocation { voices: usize },
}
