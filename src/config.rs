//! Engine-wide constants and the configuration guarded by the control gate.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Largest block the engine will ever render in one pass.
pub const MAX_BLOCK_SIZE: usize = 8192;
/// Output channels rendered by the engine (stereo).
pub const NUM_CHANNELS: usize = 2;

pub const DEFAULT_SAMPLE_RATE: f32 = 48_000.0;
pub const DEFAULT_SAMPLES_PER_BLOCK: usize = 1024;
pub const DEFAULT_NUM_VOICES: usize = 64;
pub const MAX_VOICES: usize = 256;
pub const DEFAULT_PRELOAD_SIZE: u32 = 8192;

pub const MIN_VOLUME_DB: f32 = -144.0;
pub const MAX_VOLUME_DB: f32 = 48.0;

/// Internal oversampling factor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Oversampling {
    #[default]
    X1,
    X2,
    X4,
    X8,
}

impl Oversampling {
    pub fn factor(self) -> u32 {
        match self {
            Oversampling::X1 => 1,
            Oversampling::X2 => 2,
            Oversampling::X4 => 4,
            Oversampling::X8 => 8,
        }
    }

    pub fn from_factor(factor: u32) -> Result<Self, ConfigError> {
        match factor {
            1 => Ok(Oversampling::X1),
            2 => Ok(Oversampling::X2),
            4 => Ok(Oversampling::X4),
            8 => Ok(Oversampling::X8),
            other => Err(ConfigError::Oversampling(other)),
        }
    }
}

/// Accepts `4`, `x4` and `4x`.
impl FromStr for Oversampling {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        let digits = trimmed
            .strip_prefix(['x', 'X'])
            .or_else(|| trimmed.strip_suffix(['x', 'X']))
            .unwrap_or(trimmed);
        let factor = digits
            .parse::<u32>()
            .map_err(|_| ConfigError::Parse(s.to_string()))?;
        Self::from_factor(factor)
    }
}

impl fmt::Display for Oversampling {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "x{}", self.factor())
    }
}

/// Everything the control plane may change while the engine runs.
///
/// Lives inside the synth behind the control gate; the render path reads it,
/// only the control plane writes it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SynthSettings {
    pub sample_rate: f32,
    pub samples_per_block: usize,
    pub num_voices: usize,
    pub oversampling: Oversampling,
    pub preload_size: u32,
    pub volume_db: f32,
}

impl Default for SynthSettings {
    fn default() -> Self {
        Self {
            sample_rate: DEFAULT_SAMPLE_RATE,
            samples_per_block: DEFAULT_SAMPLES_PER_BLOCK,
            num_voices: DEFAULT_NUM_VOICES,
            oversampling: Oversampling::X1,
            preload_size: DEFAULT_PRELOAD_SIZE,
            volume_db: 0.0,
        }
    }
}

impl SynthSettings {
    pub fn validate_sample_rate(rate: f32) -> Result<f32, ConfigError> {
        if rate.is_finite() && rate >= 1.0 {
            Ok(rate)
        } else {
            Err(ConfigError::SampleRate(rate))
        }
    }

    pub fn validate_block_size(size: usize) -> Result<usize, ConfigError> {
        if (1..=MAX_BLOCK_SIZE).contains(&size) {
            Ok(size)
        } else {
            Err(ConfigError::BlockSize(size))
        }
    }

    pub fn validate_num_voices(voices: usize) -> Result<usize, ConfigError> {
        if (1..=MAX_VOICES).contains(&voices) {
            Ok(voices)
        } else {
            Err(ConfigError::NumVoices(voices))
        }
    }

    pub fn validate_preload_size(size: u32) -> Result<u32, ConfigError> {
        if size > 0 {
            Ok(size)
        } else {
            Err(ConfigError::PreloadSize(size))
        }
    }

    pub fn validate_volume(db: f32) -> Result<f32, ConfigError> {
        if db.is_finite() && (MIN_VOLUME_DB..=MAX_VOLUME_DB).contains(&db) {
            Ok(db)
        } else {
            Err(ConfigError::Volume(db))
        }
    }

    /// Linear gain applied to the mixed output.
    pub fn linear_gain(&self) -> f32 {
        10.0_f32.powf(self.volume_db / 20.0)
    }
}
