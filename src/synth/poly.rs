use std::sync::Arc;

use crate::{
    config::{Oversampling, SynthSettings},
    dsp::buffer::AudioBuffer,
    error::ConfigError,
    io::dispatch::EventSink,
    patch::Instrument,
    synth::voice::{Voice, VoiceState},
};

const MIX_LEFT: usize = 0;
const MIX_RIGHT: usize = 1;
const ENVELOPE: usize = 2;

/// Pitch wheel range in semitones.
const PITCH_BEND_RANGE: f32 = 2.0;

/// Controller changes one block can schedule before they start applying
/// immediately.
const MAX_PENDING_CHANGES: usize = 512;

pub mod cc {
    pub const VOLUME: u8 = 7;
    pub const EXPRESSION: u8 = 11;
    pub const SUSTAIN: u8 = 64;
    pub const ALL_SOUND_OFF: u8 = 120;
    pub const RESET_CONTROLLERS: u8 = 121;
    pub const ALL_NOTES_OFF: u8 = 123;
}

#[derive(Debug, Clone)]
struct Controllers {
    cc: [u8; 128],
    poly_pressure: [u8; 128],
    channel_pressure: u8,
    pitch_bend: i16,
}

impl Controllers {
    fn new() -> Self {
        let mut cc = [0u8; 128];
        cc[cc::VOLUME as usize] = 127;
        cc[cc::EXPRESSION as usize] = 127;
        Self {
            cc,
            poly_pressure: [0; 128],
            channel_pressure: 0,
            pitch_bend: 0,
        }
    }

    fn sustain_down(&self) -> bool {
        self.cc[cc::SUSTAIN as usize] >= 64
    }
}

/// A controller value the audio itself depends on.
#[derive(Debug, Clone, Copy, PartialEq)]
enum Change {
    Volume(u8),
    Expression(u8),
    PitchBend(i16),
}

/// Controller values as the renderer sees them. `Controllers` moves as
/// soon as an event is dispatched; this moves at the event's frame.
#[derive(Debug, Clone, Copy)]
struct Performance {
    volume: u8,
    expression: u8,
    pitch_bend: i16,
}

impl Performance {
    fn new() -> Self {
        Self {
            volume: 127,
            expression: 127,
            pitch_bend: 0,
        }
    }

    fn apply(&mut self, change: Change) {
        match change {
            Change::Volume(value) => self.volume = value,
            Change::Expression(value) => self.expression = value,
            Change::PitchBend(value) => self.pitch_bend = value,
        }
    }

    fn gain(&self) -> f32 {
        f32::from(self.volume) / 127.0 * f32::from(self.expression) / 127.0
    }

    fn pitch_ratio(&self) -> f32 {
        if self.pitch_bend == 0 {
            return 1.0;
        }
        let semitones = f32::from(self.pitch_bend) / 8192.0 * PITCH_BEND_RANGE;
        2.0_f32.powf(semitones / 12.0)
    }
}

/// The engine state the control gate protects: settings, the instrument,
/// the voice pool and the render scratch space.
///
/// Configuration methods validate before they commit anything, so a rejected
/// value leaves the synth exactly as it was.
pub struct Synth {
    settings: SynthSettings,
    master_gain: f32,
    instrument: Option<Arc<Instrument>>,
    voices: Vec<Voice>,
    scratch: AudioBuffer<3>,
    controllers: Controllers,
    performance: Performance,
    /// Scheduled `(frame, change)` pairs for the coming block, in frame order.
    changes: Vec<(u32, Change)>,
    frame_counter: u64,
}

impl Synth {
    pub fn new(settings: SynthSettings) -> Result<Self, ConfigError> {
        SynthSettings::validate_sample_rate(settings.sample_rate)?;
        SynthSettings::validate_block_size(settings.samples_per_block)?;
        SynthSettings::validate_num_voices(settings.num_voices)?;
        SynthSettings::validate_preload_size(settings.preload_size)?;
        SynthSettings::validate_volume(settings.volume_db)?;

        let mut scratch = AudioBuffer::<3>::empty();
        while scratch.add_channel() {}
        scratch
            .resize(settings.samples_per_block)
            .map_err(|err| ConfigError::Allocation { frames: err.frames })?;

        let mut voices = Vec::new();
        grow_pool(&mut voices, settings.num_voices, settings.sample_rate)?;

        Ok(Self {
            master_gain: settings.linear_gain(),
            settings,
            instrument: None,
            voices,
            scratch,
            controllers: Controllers::new(),
            performance: Performance::new(),
            changes: Vec::with_capacity(MAX_PENDING_CHANGES),
            frame_counter: 0,
        })
    }

    /// Render one block into `outputs` (one slice per channel, equal
    /// lengths). Blocks longer than the configured block size are rendered
    /// in block-size chunks, and chunks are cut again wherever a scheduled
    /// controller change lands.
    ///
    /// Frames past the shortest output are zeroed.
    pub fn render_block(&mut self, outputs: &mut [&mut [f32]]) {
        let frames = outputs.iter().map(|out| out.len()).min().unwrap_or(0);
        let chunk = self.scratch.num_frames().max(1);

        let mut offset = 0;
        while offset < frames {
            self.apply_changes_through(offset);
            let mut len = chunk.min(frames - offset);
            if let Some(&(frame, _)) = self.changes.first() {
                len = len.min(frame as usize - offset);
            }
            self.render_chunk(outputs, offset, len);
            offset += len;
        }

        // Changes scheduled past the end of the block still land.
        self.apply_changes_through(usize::MAX);
        for out in outputs.iter_mut() {
            out[frames..].fill(0.0);
        }
    }

    fn apply_changes_through(&mut self, frame: usize) {
        let due = self
            .changes
            .partition_point(|&(at, _)| at as usize <= frame);
        for &(_, change) in &self.changes[..due] {
            self.performance.apply(change);
        }
        self.changes.drain(..due);
    }

    fn schedule(&mut self, delay: u32, change: Change) {
        if self.changes.len() == self.changes.capacity() {
            // Never grown on the render thread.
            self.performance.apply(change);
            return;
        }
        let at = self.changes.partition_point(|&(frame, _)| frame <= delay);
        self.changes.insert(at, (delay, change));
    }

    fn render_chunk(&mut self, outputs: &mut [&mut [f32]], offset: usize, len: usize) {
        let gain = self.master_gain * self.performance.gain();
        let pitch_ratio = self.performance.pitch_ratio();

        let mut channels = self.scratch.channels_mut();
        let (Some(left), Some(right), Some(envelope)) =
            (channels.next(), channels.next(), channels.next())
        else {
            for out in outputs.iter_mut() {
                out[offset..offset + len].fill(0.0);
            }
            return;
        };
        let left = &mut left[..len];
        let right = &mut right[..len];
        let envelope = &mut envelope[..len];
        left.fill(0.0);
        right.fill(0.0);

        if let Some(instrument) = self.instrument.as_deref() {
            for voice in self.voices.iter_mut().filter(|v| v.is_active()) {
                voice.render(instrument, pitch_ratio, left, right, envelope);
            }
        }

        match outputs {
            [] => {}
            [mono] => {
                for (i, out) in mono[offset..offset + len].iter_mut().enumerate() {
                    *out = (left[i] + right[i]) * 0.5 * gain;
                }
            }
            [out_left, out_right, rest @ ..] => {
                for (out, mixed) in out_left[offset..offset + len].iter_mut().zip(left.iter()) {
                    *out = mixed * gain;
                }
                for (out, mixed) in out_right[offset..offset + len].iter_mut().zip(right.iter()) {
                    *out = mixed * gain;
                }
                for out in rest {
                    out[offset..offset + len].fill(0.0);
                }
            }
        }

        self.frame_counter += len as u64;
    }

    pub fn settings(&self) -> &SynthSettings {
        &self.settings
    }

    pub fn instrument(&self) -> Option<&Arc<Instrument>> {
        self.instrument.as_ref()
    }

    pub fn num_active_voices(&self) -> usize {
        self.voices.iter().filter(|v| v.is_active()).count()
    }

    pub fn voices(&self) -> &[Voice] {
        &self.voices
    }

    pub fn pitch_bend(&self) -> i16 {
        self.controllers.pitch_bend
    }

    pub fn cc_value(&self, controller: u8) -> u8 {
        self.controllers.cc[usize::from(controller & 0x7F)]
    }

    pub fn channel_pressure(&self) -> u8 {
        self.controllers.channel_pressure
    }

    pub fn poly_pressure(&self, key: u8) -> u8 {
        self.controllers.poly_pressure[usize::from(key & 0x7F)]
    }

    /// Swap the instrument. Every voice is unbound first; the previous
    /// instrument is handed back so the caller decides where it is dropped.
    pub fn set_instrument(&mut self, instrument: Option<Arc<Instrument>>) -> Option<Arc<Instrument>> {
        for voice in &mut self.voices {
            voice.unbind();
        }
        std::mem::replace(&mut self.instrument, instrument)
    }

    pub fn set_sample_rate(&mut self, sample_rate: f32) -> Result<(), ConfigError> {
        let sample_rate = SynthSettings::validate_sample_rate(sample_rate)?;
        self.settings.sample_rate = sample_rate;
        for voice in &mut self.voices {
            voice.set_sample_rate(sample_rate);
        }
        Ok(())
    }

    /// Resize the render scratch space. On allocation failure nothing
    /// changes.
    pub fn set_samples_per_block(&mut self, samples_per_block: usize) -> Result<(), ConfigError> {
        let samples_per_block = SynthSettings::validate_block_size(samples_per_block)?;
        self.scratch
            .resize(samples_per_block)
            .map_err(|err| ConfigError::Allocation { frames: err.frames })?;
        self.settings.samples_per_block = samples_per_block;
        Ok(())
    }

    pub fn set_num_voices(&mut self, num_voices: usize) -> Result<(), ConfigError> {
        let num_voices = SynthSettings::validate_num_voices(num_voices)?;
        grow_pool(&mut self.voices, num_voices, self.settings.sample_rate)?;
        self.settings.num_voices = num_voices;
        Ok(())
    }

    pub fn set_oversampling(&mut self, oversampling: Oversampling) {
        self.settings.oversampling = oversampling;
    }

    pub fn set_preload_size(&mut self, preload_size: u32) -> Result<(), ConfigError> {
        self.settings.preload_size = SynthSettings::validate_preload_size(preload_size)?;
        Ok(())
    }

    pub fn set_volume(&mut self, volume_db: f32) -> Result<(), ConfigError> {
        self.settings.volume_db = SynthSettings::validate_volume(volume_db)?;
        self.master_gain = self.settings.linear_gain();
        Ok(())
    }

    /// Cut every voice immediately.
    pub fn all_sound_off(&mut self) {
        for voice in &mut self.voices {
            voice.free();
        }
    }

    fn all_notes_off(&mut self, delay: u32) {
        for voice in &mut self.voices {
            voice.release(delay);
        }
    }

    fn release_sustained(&mut self, delay: u32) {
        for voice in self.voices.iter_mut().filter(|v| v.is_sustained()) {
            voice.release(delay);
        }
    }
}

/// Resize the pool to `num_voices`. Growth is reserved up front, so a
/// failed allocation leaves the pool as it was.
fn grow_pool(voices: &mut Vec<Voice>, num_voices: usize, sample_rate: f32) -> Result<(), ConfigError> {
    if let Some(extra) = num_voices.checked_sub(voices.len()) {
        voices
            .try_reserve_exact(extra)
            .map_err(|_| ConfigError::VoiceAllocation { voices: num_voices })?;
    }
    voices.resize_with(num_voices, || Voice::new(sample_rate));
    Ok(())
}

/// Pick a voice for a new note: a free one, else the oldest releasing one,
/// else the oldest playing one.
fn allocate_voice(voices: &mut [Voice]) -> Option<&mut Voice> {
    // First pass: find free voice index
    if let Some(idx) = voices.iter().position(|v| v.is_free()) {
        return Some(&mut voices[idx]);
    }

    // Second pass: steal oldest releasing voice, then oldest active one
    let steal_idx = voices
        .iter()
        .enumerate()
        .filter(|(_, v)| v.state() == VoiceState::Releasing)
        .min_by_key(|(_, v)| v.age())
        .or_else(|| voices.iter().enumerate().min_by_key(|(_, v)| v.age()))
        .map(|(idx, _)| idx);

    steal_idx.map(|idx| &mut voices[idx])
}

impl EventSink for Synth {
    fn note_on(&mut self, delay: u32, key: u8, velocity: u8) {
        let Some(instrument) = self.instrument.as_deref() else {
            return;
        };
        let age = self.frame_counter + u64::from(delay);
        for index in instrument.regions_for(key, velocity) {
            let region = &instrument.regions[index];
            if let Some(voice) = allocate_voice(&mut self.voices) {
                voice.start(index, region, key, velocity, delay, age);
            }
        }
    }

    fn note_off(&mut self, delay: u32, key: u8, _velocity: u8) {
        let sustain = self.controllers.sustain_down();
        for voice in self
            .voices
            .iter_mut()
            .filter(|v| v.state() == VoiceState::Active && v.note() == key)
        {
            if sustain {
                voice.hold();
            } else {
                voice.release(delay);
            }
        }
    }

    fn poly_aftertouch(&mut self, _delay: u32, key: u8, value: u8) {
        self.controllers.poly_pressure[usize::from(key & 0x7F)] = value;
    }

    fn channel_aftertouch(&mut self, _delay: u32, value: u8) {
        self.controllers.channel_pressure = value;
    }

    fn cc(&mut self, delay: u32, controller: u8, value: u8) {
        let controller = controller & 0x7F;
        self.controllers.cc[usize::from(controller)] = value;
        match controller {
            cc::VOLUME => self.schedule(delay, Change::Volume(value)),
            cc::EXPRESSION => self.schedule(delay, Change::Expression(value)),
            cc::SUSTAIN if value < 64 => self.release_sustained(delay),
            cc::ALL_SOUND_OFF => self.all_sound_off(),
            cc::RESET_CONTROLLERS => {
                let pedal_was_down = self.controllers.sustain_down();
                self.controllers = Controllers::new();
                if pedal_was_down {
                    self.release_sustained(delay);
                }
                self.schedule(delay, Change::Volume(127));
                self.schedule(delay, Change::Expression(127));
                self.schedule(delay, Change::PitchBend(0));
            }
            cc::ALL_NOTES_OFF => self.all_notes_off(delay),
            _ => {}
        }
    }

    fn pitch_wheel(&mut self, delay: u32, value: i16) {
        self.controllers.pitch_bend = value;
        self.schedule(delay, Change::PitchBend(value));
    }
}
