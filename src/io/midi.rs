//! Raw MIDI records and their decoding into typed events.

/// Status bytes (upper nibble) of channel voice messages.
pub mod status {
    pub const NOTE_OFF: u8 = 0x80;
    pub const NOTE_ON: u8 = 0x90;
    pub const POLYPHONIC_PRESSURE: u8 = 0xA0;
    pub const CONTROL_CHANGE: u8 = 0xB0;
    pub const PROGRAM_CHANGE: u8 = 0xC0;
    pub const CHANNEL_PRESSURE: u8 = 0xD0;
    pub const PITCH_BEND: u8 = 0xE0;
    pub const SYSTEM_MESSAGE: u8 = 0xF0;
}

/// Center of the 14-bit pitch bend range.
pub const PITCH_BEND_CENTER: i16 = 8192;

#[inline]
pub fn status(byte: u8) -> u8 {
    byte & 0xF0
}

#[inline]
pub fn channel(byte: u8) -> u8 {
    byte & 0x0F
}

/// Combine the two 7-bit pitch bend bytes into a value centered on zero,
/// in `-8192..=8191`.
#[inline]
pub fn build_and_center_pitch(lsb: u8, msb: u8) -> i16 {
    ((i16::from(msb & 0x7F) << 7) | i16::from(lsb & 0x7F)) - PITCH_BEND_CENTER
}

/// A decoded channel message. Velocity-zero note-ons are already turned into
/// note-offs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MidiEvent {
    NoteOn { channel: u8, key: u8, velocity: u8 },
    NoteOff { channel: u8, key: u8, velocity: u8 },
    PolyPressure { channel: u8, key: u8, pressure: u8 },
    ChannelPressure { channel: u8, pressure: u8 },
    ControlChange { channel: u8, controller: u8, value: u8 },
    PitchBend { channel: u8, value: i16 },
    ProgramChange { channel: u8, program: u8 },
    System,
}

impl MidiEvent {
    /// Note-on with velocity 0 means note-off.
    pub fn note_on(channel: u8, key: u8, velocity: u8) -> Self {
        if velocity == 0 {
            MidiEvent::NoteOff {
                channel,
                key,
                velocity: 0,
            }
        } else {
            MidiEvent::NoteOn {
                channel,
                key,
                velocity,
            }
        }
    }
}

/// Anything a transport hands us for one block: a frame offset and
/// something that may decode into a [`MidiEvent`].
pub trait TransportEvent {
    /// Frame offset within the current block.
    fn frame(&self) -> u32;

    /// `None` for malformed or unrecognised input.
    fn decode(&self) -> Option<MidiEvent>;
}

impl<T: TransportEvent + ?Sized> TransportEvent for &T {
    fn frame(&self) -> u32 {
        (**self).frame()
    }

    fn decode(&self) -> Option<MidiEvent> {
        (**self).decode()
    }
}

/// A short MIDI message as found in a driver's per-period MIDI buffer.
///
/// Only the first three bytes are kept; longer (SysEx) messages still decode
/// as [`MidiEvent::System`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RawMidiEvent {
    pub time: u32,
    bytes: [u8; 3],
    len: u8,
}

impl RawMidiEvent {
    pub fn new(time: u32, data: &[u8]) -> Self {
        let len = data.len().min(3);
        let mut bytes = [0u8; 3];
        bytes[..len].copy_from_slice(&data[..len]);
        Self {
            time,
            bytes,
            len: len as u8,
        }
    }

    pub fn note_on(time: u32, channel: u8, key: u8, velocity: u8) -> Self {
        Self::new(time, &[status::NOTE_ON | (channel & 0x0F), key, velocity])
    }

    pub fn note_off(time: u32, channel: u8, key: u8, velocity: u8) -> Self {
        Self::new(time, &[status::NOTE_OFF | (channel & 0x0F), key, velocity])
    }

    pub fn control_change(time: u32, channel: u8, controller: u8, value: u8) -> Self {
        Self::new(
            time,
            &[status::CONTROL_CHANGE | (channel & 0x0F), controller, value],
        )
    }

    pub fn with_time(mut self, time: u32) -> Self {
        self.time = time;
        self
    }

    pub fn data(&self) -> &[u8] {
        &self.bytes[..self.len as usize]
    }
}

impl TransportEvent for RawMidiEvent {
    fn frame(&self) -> u32 {
        self.time
    }

    fn decode(&self) -> Option<MidiEvent> {
        decode_bytes(self.data())
    }
}

/// Decode one raw message. Running status is not supported: a message must
/// start with a status byte.
pub fn decode_bytes(data: &[u8]) -> Option<MidiEvent> {
    let (&first, rest) = data.split_first()?;
    if first < 0x80 {
        return None;
    }

    let ch = channel(first);
    let data1 = rest.first().map(|b| b & 0x7F);
    let data2 = rest.get(1).map(|b| b & 0x7F);

    match status(first) {
        status::NOTE_OFF => Some(MidiEvent::NoteOff {
            channel: ch,
            key: data1?,
            velocity: data2?,
        }),
        status::NOTE_ON => Some(MidiEvent::note_on(ch, data1?, data2?)),
        status::POLYPHONIC_PRESSURE => Some(MidiEvent::PolyPressure {
            channel: ch,
            key: data1?,
            pressure: data2?,
        }),
        status::CONTROL_CHANGE => Some(MidiEvent::ControlChange {
            channel: ch,
            controller: data1?,
            value: data2?,
        }),
        status::PROGRAM_CHANGE => Some(MidiEvent::ProgramChange {
            channel: ch,
            program: data1?,
        }),
        status::CHANNEL_PRESSURE => Some(MidiEvent::ChannelPressure {
            channel: ch,
            pressure: data1?,
        }),
        status::PITCH_BEND => Some(MidiEvent::PitchBend {
            channel: ch,
            value: build_and_center_pitch(data1?, data2?),
        }),
        _ => Some(MidiEvent::System),
    }
}

pub fn midi_note_to_freq(note: u8) -> f32 {
    440.0 * 2.0_f32.powf((note as f32 - 69.0) / 12.0)
}
