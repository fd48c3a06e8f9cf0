//! Instrument descriptions.
//!
//! A [`Patch`] is what lives on disk (JSON); an [`Instrument`] is the
//! validated, ready-to-play form the synth holds behind an `Arc`. Voices only
//! ever borrow from the instrument, so swapping instruments is a pointer swap
//! once every voice has been reset.

pub mod loader;

use std::ops::RangeInclusive;
use std::path::PathBuf;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::dsp::envelope::FlexEgDescription;
use crate::dsp::oscillator::OscillatorWaveform;

pub use loader::{load_instrument, LoadError, LoadReport};

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct Patch {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    pub regions: Vec<RegionDescriptor>,
    #[serde(default)]
    pub curves: Vec<CurveDescriptor>,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct RegionDescriptor {
    #[serde(default)]
    pub lokey: u8,
    #[serde(default = "max_midi_value")]
    pub hikey: u8,
    #[serde(default = "min_velocity")]
    pub lovel: u8,
    #[serde(default = "max_midi_value")]
    pub hivel: u8,
    #[serde(default = "default_keycenter")]
    pub pitch_keycenter: u8,
    /// Region gain in dB.
    #[serde(default)]
    pub volume_db: f32,
    pub source: SourceDescriptor,
    #[serde(default)]
    pub amplitude_envelope: EnvelopeDescriptor,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum SourceDescriptor {
    Oscillator { waveform: OscillatorWaveform },
    /// Path relative to the patch file.
    Sample { path: PathBuf },
}

/// Either the millisecond ADSR shorthand or a full flex envelope.
#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(untagged)]
pub enum EnvelopeDescriptor {
    Adsr {
        attack_ms: f32,
        decay_ms: f32,
        sustain_level: f32,
        release_ms: f32,
    },
    Flex(FlexEgDescription),
}

impl Default for EnvelopeDescriptor {
    fn default() -> Self {
        EnvelopeDescriptor::Adsr {
            attack_ms: 1.0,
            decay_ms: 0.0,
            sustain_level: 1.0,
            release_ms: 50.0,
        }
    }
}

impl EnvelopeDescriptor {
    pub fn to_description(&self) -> FlexEgDescription {
        match self {
            EnvelopeDescriptor::Adsr {
                attack_ms,
                decay_ms,
                sustain_level,
                release_ms,
            } => FlexEgDescription::adsr(
                attack_ms / 1000.0,
                decay_ms / 1000.0,
                *sustain_level,
                release_ms / 1000.0,
            ),
            EnvelopeDescriptor::Flex(desc) => desc.clone(),
        }
    }
}

/// A controller response curve: `(input, output)` breakpoints.
#[derive(Serialize, Deserialize, Debug, Clone, Default)]
pub struct CurveDescriptor {
    pub points: Vec<(u8, f32)>,
}

fn max_midi_value() -> u8 {
    127
}

fn min_velocity() -> u8 {
    1
}

fn default_keycenter() -> u8 {
    60
}

/// Decoded sample data, deinterleaved into one or two channels.
#[derive(Debug, Clone, PartialEq)]
pub struct SampleData {
    pub channels: Vec<Vec<f32>>,
    pub sample_rate: f32,
}

impl SampleData {
    pub fn num_frames(&self) -> usize {
        self.channels.first().map_or(0, Vec::len)
    }

    /// Linear interpolation at fractional `position`. `channel` beyond the
    /// last channel reads the last one, so mono data plays on both sides.
    #[inline]
    pub fn read(&self, channel: usize, position: f64) -> f32 {
        let Some(data) = self
            .channels
            .get(channel)
            .or_else(|| self.channels.last())
        else {
            return 0.0;
        };
        let index = position as usize;
        let frac = (position - index as f64) as f32;
        match (data.get(index), data.get(index + 1)) {
            (Some(&a), Some(&b)) => a + (b - a) * frac,
            (Some(&a), None) => a * (1.0 - frac),
            _ => 0.0,
        }
    }
}

#[derive(Debug, Clone)]
pub enum RegionSource {
    Oscillator(OscillatorWaveform),
    Sample(Arc<SampleData>),
}

#[derive(Debug, Clone)]
pub struct Region {
    pub keys: RangeInclusive<u8>,
    pub velocities: RangeInclusive<u8>,
    pub keycenter: u8,
    /// Linear gain.
    pub gain: f32,
    pub source: RegionSource,
    pub amplitude_envelope: Arc<FlexEgDescription>,
}

impl Region {
    pub fn matches(&self, key: u8, velocity: u8) -> bool {
        self.keys.contains(&key) && self.velocities.contains(&velocity)
    }
}

/// A loaded instrument, immutable once built.
#[derive(Debug, Clone, Default)]
pub struct Instrument {
    pub name: String,
    pub regions: Vec<Region>,
    pub curves: Vec<CurveDescriptor>,
}

impl Instrument {
    /// Indices of every region a note falls into, in declaration order.
    pub fn regions_for(&self, key: u8, velocity: u8) -> impl Iterator<Item = usize> + '_ {
        self.regions
            .iter()
            .enumerate()
            .filter(move |(_, region)| region.matches(key, velocity))
            .map(|(index, _)| index)
    }

    pub fn region(&self, index: usize) -> Option<&Region> {
        self.regions.get(index)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn region_defaults_cover_the_whole_keyboard() {
        let json = r#"{ "source": { "type": "oscillator", "waveform": "saw" } }"#;
        let region: RegionDescriptor = serde_json::from_str(json).unwrap();
        assert_eq!((region.lokey, region.hikey), (0, 127));
        assert_eq!((region.lovel, region.hivel), (1, 127));
        assert_eq!(region.pitch_keycenter, 60);
        assert!(matches!(
            region.amplitude_envelope,
            EnvelopeDescriptor::Adsr { .. }
        ));
    }

    #[test]
    fn envelope_accepts_adsr_and_flex_forms() {
        let adsr: EnvelopeDescriptor = serde_json::from_str(
            r#"{ "attack_ms": 10, "decay_ms": 20, "sustain_level": 0.5, "release_ms": 100 }"#,
        )
        .unwrap();
        let desc = adsr.to_description();
        assert_eq!(desc.points.len(), 3);
        assert!((desc.points[0].time - 0.010).abs() < 1e-6);
        assert!((desc.points[1].level - 0.5).abs() < 1e-6);

        let flex: EnvelopeDescriptor = serde_json::from_str(
            r#"{ "points": [ { "time": 0.1, "level": 1.0 }, { "time": 0.2, "level": 0.0, "shape": 2.0 } ], "sustain": 0 }"#,
        )
        .unwrap();
        let desc = flex.to_description();
        assert_eq!(desc.sustain, 0);
        assert_eq!(desc.points[1].shape, 2.0);
    }

    #[test]
    fn sample_reads_interpolate_and_mono_feeds_both_sides() {
        let sample = SampleData {
            channels: vec![vec![0.0, 1.0, 0.0]],
            sample_rate: 48_000.0,
        };
        assert!((sample.read(0, 0.5) - 0.5).abs() < 1e-6);
        assert_eq!(sample.read(1, 1.0), sample.read(0, 1.0));
        assert_eq!(sample.read(0, 10.0), 0.0);
    }
}
