//! Typed events as delivered by an OS sequencer queue.
//!
//! Unlike raw MIDI these arrive already split into fields, with controller
//! parameters and values widened to 32 bits and the pitch bend already
//! centered. Out-of-range fields make the event malformed.

use super::midi::{MidiEvent, TransportEvent};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SequencerEventKind {
    NoteOn { channel: u8, note: u8, velocity: u8 },
    NoteOff { channel: u8, note: u8, velocity: u8 },
    KeyPressure { channel: u8, note: u8, value: u8 },
    Controller { channel: u8, param: u32, value: i32 },
    ChannelPressure { channel: u8, value: i32 },
    PitchBend { channel: u8, value: i32 },
    ProgramChange { channel: u8, value: i32 },
    SysEx,
    Other,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SequencerEvent {
    /// Frame offset in the current block.
    pub tick: u32,
    pub kind: SequencerEventKind,
}

impl SequencerEvent {
    pub fn new(tick: u32, kind: SequencerEventKind) -> Self {
        Self { tick, kind }
    }
}

fn seven_bit(value: impl TryInto<u8>) -> Option<u8> {
    value.try_into().ok().filter(|v| *v < 0x80)
}

impl TransportEvent for SequencerEvent {
    fn frame(&self) -> u32 {
        self.tick
    }

    fn decode(&self) -> Option<MidiEvent> {
        let event = match self.kind {
            SequencerEventKind::NoteOn {
                channel,
                note,
                velocity,
            } => MidiEvent::note_on(channel & 0x0F, seven_bit(note)?, seven_bit(velocity)?),
            SequencerEventKind::NoteOff {
                channel,
                note,
                velocity,
            } => MidiEvent::NoteOff {
                channel: channel & 0x0F,
                key: seven_bit(note)?,
                velocity: seven_bit(velocity)?,
            },
            SequencerEventKind::KeyPressure {
                channel,
                note,
                value,
            } => MidiEvent::PolyPressure {
                channel: channel & 0x0F,
                key: seven_bit(note)?,
                pressure: seven_bit(value)?,
            },
            SequencerEventKind::Controller {
                channel,
                param,
                value,
            } => MidiEvent::ControlChange {
                channel: channel & 0x0F,
                controller: seven_bit(param)?,
                value: seven_bit(value)?,
            },
            SequencerEventKind::ChannelPressure { channel, value } => {
                MidiEvent::ChannelPressure {
                    channel: channel & 0x0F,
                    pressure: seven_bit(value)?,
                }
            }
            SequencerEventKind::PitchBend { channel, value } => {
                if !(-8192..=8191).contains(&value) {
                    return None;
                }
                MidiEvent::PitchBend {
                    channel: channel & 0x0F,
                    value: value as i16,
                }
            }
            SequencerEventKind::ProgramChange { channel, value } => MidiEvent::ProgramChange {
                channel: channel & 0x0F,
                program: seven_bit(value)?,
            },
            SequencerEventKind::SysEx => MidiEvent::System,
            SequencerEventKind::Other => return None,
        };
        Some(event)
    }
}
