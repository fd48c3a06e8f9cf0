use std::sync::Arc;

use crate::dsp::envelope::FlexEnvelope;
use crate::dsp::oscillator::{OscillatorBlock, OscillatorWaveform};
use crate::io::midi::midi_note_to_freq;
use crate::patch::{Instrument, Region, RegionSource};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VoiceState {
    Free,      // Available for allocation
    Active,    // Playing, envelope before its release
    Releasing, // Key released, envelope in release phase
}

/// One region being played for one note.
///
/// The voice keeps the region's envelope description bound after it goes
/// free, so the last reference to a description is never dropped here. The
/// synth unbinds every voice before it lets go of an instrument.
pub struct Voice {
    note: u8,
    velocity: u8,
    state: VoiceState,
    age: u64,
    sample_rate: f32,
    region: usize,
    envelope: FlexEnvelope,
    oscillator: OscillatorBlock,
    position: f64,
    source_delay: u32,
    sustained: bool,
}

impl Voice {
    pub fn new(sample_rate: f32) -> Self {
        Self {
            note: 0,
            velocity: 0,
            state: VoiceState::Free,
            age: 0,
            sample_rate,
            region: 0,
            envelope: FlexEnvelope::new(sample_rate),
            oscillator: OscillatorBlock::new(OscillatorWaveform::Sine),
            position: 0.0,
            source_delay: 0,
            sustained: false,
        }
    }

    /// Begin playing `region` `delay` frames into the current block.
    pub fn start(&mut self, region_index: usize, region: &Region, note: u8, velocity: u8, delay: u32, age: u64) {
        self.note = note;
        self.velocity = velocity;
        self.state = VoiceState::Active;
        self.age = age;
        self.region = region_index;
        self.position = 0.0;
        self.source_delay = delay;
        self.sustained = false;

        if let RegionSource::Oscillator(waveform) = region.source {
            self.oscillator.set_waveform(waveform);
            self.oscillator.reset();
        }

        self.envelope.reset();
        self.envelope.configure(Arc::clone(&region.amplitude_envelope));
        self.envelope.start(delay);
    }

    pub fn release(&mut self, delay: u32) {
        if self.state == VoiceState::Active {
            self.state = VoiceState::Releasing;
            self.sustained = false;
            self.envelope.release(delay);
        }
    }

    /// Mix one chunk into `left`/`right`. `envelope` is scratch space of the
    /// same length.
    pub fn render(
        &mut self,
        instrument: &Instrument,
        pitch_ratio: f32,
        left: &mut [f32],
        right: &mut [f32],
        envelope: &mut [f32],
    ) {
        let Some(region) = instrument.region(self.region) else {
            self.free();
            return;
        };

        let frames = left.len().min(right.len()).min(envelope.len());
        let envelope = &mut envelope[..frames];
        self.envelope.process(envelope);

        let start = (self.source_delay as usize).min(frames);
        self.source_delay -= start as u32;
        let gain = region.gain * f32::from(self.velocity) / 127.0;

        let mut source_ended = false;
        match &region.source {
            RegionSource::Oscillator(_) => {
                let increment = midi_note_to_freq(self.note) * pitch_ratio / self.sample_rate;
                for i in start..frames {
                    let sample = self.oscillator.next_sample(increment) * envelope[i] * gain;
                    left[i] += sample;
                    right[i] += sample;
                }
            }
            RegionSource::Sample(data) => {
                let transpose = (f32::from(self.note) - f32::from(region.keycenter)) / 12.0;
                let step = f64::from(data.sample_rate / self.sample_rate)
                    * f64::from(2.0_f32.powf(transpose) * pitch_ratio);
                let end = data.num_frames() as f64;
                for i in start..frames {
                    if self.position >= end {
                        source_ended = true;
                        break;
                    }
                    let amp = envelope[i] * gain;
                    left[i] += data.read(0, self.position) * amp;
                    right[i] += data.read(1, self.position) * amp;
                    self.position += step;
                }
            }
        }

        if source_ended || self.envelope.is_finished() {
            self.free();
        }
    }

    /// Note-off arrived while the sustain pedal was down.
    pub fn hold(&mut self) {
        if self.state == VoiceState::Active {
            self.sustained = true;
        }
    }

    pub fn is_sustained(&self) -> bool {
        self.sustained
    }

    pub fn set_sample_rate(&mut self, sample_rate: f32) {
        self.sample_rate = sample_rate;
        self.envelope.set_sample_rate(sample_rate);
    }

    /// Silence immediately, keeping the envelope binding.
    pub fn free(&mut self) {
        self.state = VoiceState::Free;
        self.note = 0;
        self.velocity = 0;
        self.sustained = false;
    }

    /// Silence and drop every reference into the current instrument.
    pub fn unbind(&mut self) {
        self.free();
        self.envelope.unbind();
    }

    pub fn is_free(&self) -> bool {
        self.state == VoiceState::Free
    }

    pub fn is_active(&self) -> bool {
        matches!(self.state, VoiceState::Active | VoiceState::Releasing)
    }

    pub fn note(&self) -> u8 {
        self.note
    }

    pub fn age(&self) -> u64 {
        self.age
    }

    pub fn state(&self) -> VoiceState {
        self.state
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dsp::envelope::FlexEgDescription;
    use crate::patch::SampleData;

    const SAMPLE_RATE: f32 = 1_000.0;

    fn region(source: RegionSource) -> Region {
        Region {
            keys: 0..=127,
            velocities: 1..=127,
            keycenter: 60,
            gain: 1.0,
            source,
            amplitude_envelope: Arc::new(FlexEgDescription::adsr(0.0, 0.0, 1.0, 0.01)),
        }
    }

    fn instrument(source: RegionSource) -> Instrument {
        Instrument {
            name: "test".into(),
            regions: vec![region(source)],
            curves: Vec::new(),
        }
    }

    #[test]
    fn delayed_start_keeps_leading_frames_silent() {
        let instrument = instrument(RegionSource::Oscillator(OscillatorWaveform::Square));
        let mut voice = Voice::new(SAMPLE_RATE);
        voice.start(0, &instrument.regions[0], 60, 127, 8, 0);

        let (mut l, mut r, mut env) = ([0.0f32; 16], [0.0f32; 16], [0.0f32; 16]);
        voice.render(&instrument, 1.0, &mut l, &mut r, &mut env);

        assert!(l[..8].iter().all(|s| *s == 0.0));
        assert!(l[8..].iter().any(|s| *s != 0.0));
        assert_eq!(l, r);
    }

    #[test]
    fn released_voice_frees_itself_once_the_envelope_ends() {
        let instrument = instrument(RegionSource::Oscillator(OscillatorWaveform::Sine));
        let mut voice = Voice::new(SAMPLE_RATE);
        voice.start(0, &instrument.regions[0], 60, 100, 0, 0);
        voice.release(4);
        assert_eq!(voice.state(), VoiceState::Releasing);

        let (mut l, mut r, mut env) = ([0.0f32; 64], [0.0f32; 64], [0.0f32; 64]);
        voice.render(&instrument, 1.0, &mut l, &mut r, &mut env);
        assert!(voice.is_free());
    }

    #[test]
    fn sample_voice_ends_with_its_data() {
        let data = Arc::new(SampleData {
            channels: vec![vec![0.5; 10]],
            sample_rate: SAMPLE_RATE,
        });
        let instrument = instrument(RegionSource::Sample(data));
        let mut voice = Voice::new(SAMPLE_RATE);
        voice.start(0, &instrument.regions[0], 60, 127, 0, 0);

        let (mut l, mut r, mut env) = ([0.0f32; 32], [0.0f32; 32], [0.0f32; 32]);
        voice.render(&instrument, 1.0, &mut l, &mut r, &mut env);

        assert!(l[..10].iter().all(|s| (*s - 0.5).abs() < 1e-6));
        assert!(l[10..].iter().all(|s| *s == 0.0));
        assert!(voice.is_free());
    }
}
