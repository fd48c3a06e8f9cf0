use std::f32::consts::TAU;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OscillatorWaveform {
    Sine,
    Saw,
    Square,
    Triangle,
    Noise,
}

/// Naive (non band-limited) phase-accumulator oscillator.
#[derive(Debug, Clone)]
pub struct OscillatorBlock {
    waveform: OscillatorWaveform,
    phase: f32, // 0.0..1.0
    noise_state: u32,
}

impl OscillatorBlock {
    pub fn new(waveform: OscillatorWaveform) -> Self {
        Self {
            waveform,
            phase: 0.0,
            noise_state: 0x1234_5678,
        }
    }

    pub fn set_waveform(&mut self, waveform: OscillatorWaveform) {
        self.waveform = waveform;
    }

    pub fn reset(&mut self) {
        self.phase = 0.0;
    }

    #[inline]
    fn next_noise(&mut self) -> f32 {
        // xorshift32
        let mut x = self.noise_state;
        x ^= x << 13;
        x ^= x >> 17;
        x ^= x << 5;
        self.noise_state = x;
        (x as f32 / u32::MAX as f32) * 2.0 - 1.0
    }

    #[inline]
    pub fn next_sample(&mut self, increment: f32) -> f32 {
        let p = self.phase;
        let value = match self.waveform {
            OscillatorWaveform::Sine => (TAU * p).sin(),
            OscillatorWaveform::Saw => 2.0 * p - 1.0,
            OscillatorWaveform::Square => {
                if p < 0.5 {
                    1.0
                } else {
                    -1.0
                }
            }
            OscillatorWaveform::Triangle => 1.0 - 4.0 * (p - 0.5).abs(),
            OscillatorWaveform::Noise => self.next_noise(),
        };
        self.phase = (p + increment).fract();
        value
    }

    /// Fill `destination` at `frequency` Hz.
    pub fn render(&mut self, destination: &mut [f32], frequency: f32, sample_rate: f32) {
        let increment = frequency / sample_rate;
        for sample in destination.iter_mut() {
            *sample = self.next_sample(increment);
        }
    }
}
