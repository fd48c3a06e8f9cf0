//! Per-block event dispatch.
//!
//! Each transport hands over the events of one block in order. Every event is
//! decoded and forwarded to an [`EventSink`] with its frame offset; anything
//! that does not decode is dropped without a trace, since this runs on the
//! render thread.

use super::midi::{MidiEvent, TransportEvent};

/// The synthesis calls an event can turn into. Delays are frame offsets into
/// the current block.
pub trait EventSink {
    fn note_on(&mut self, delay: u32, key: u8, velocity: u8);
    fn note_off(&mut self, delay: u32, key: u8, velocity: u8);
    fn poly_aftertouch(&mut self, delay: u32, key: u8, value: u8);
    fn channel_aftertouch(&mut self, delay: u32, value: u8);
    fn cc(&mut self, delay: u32, controller: u8, value: u8);
    /// `value` is centered: `-8192..=8191`.
    fn pitch_wheel(&mut self, delay: u32, value: i16);
}

/// Forward one decoded event. Returns `false` for events that carry nothing
/// to synthesize (program change, system messages).
pub fn dispatch_event<S: EventSink + ?Sized>(sink: &mut S, delay: u32, event: MidiEvent) -> bool {
    match event {
        MidiEvent::NoteOn { key, velocity, .. } => sink.note_on(delay, key, velocity),
        MidiEvent::NoteOff { key, velocity, .. } => sink.note_off(delay, key, velocity),
        MidiEvent::PolyPressure { key, pressure, .. } => {
            sink.poly_aftertouch(delay, key, pressure)
        }
        MidiEvent::ChannelPressure { pressure, .. } => sink.channel_aftertouch(delay, pressure),
        MidiEvent::ControlChange {
            controller, value, ..
        } => sink.cc(delay, controller, value),
        MidiEvent::PitchBend { value, .. } => sink.pitch_wheel(delay, value),
        MidiEvent::ProgramChange { .. } | MidiEvent::System => return false,
    }
    true
}

/// Dispatch one transport's events for a block. Returns how many reached the
/// sink.
pub fn dispatch<S, I>(sink: &mut S, events: I) -> usize
where
    S: EventSink + ?Sized,
    I: IntoIterator,
    I::Item: TransportEvent,
{
    let mut delivered = 0;
    for event in events {
        if let Some(decoded) = event.decode() {
            if dispatch_event(sink, event.frame(), decoded) {
                delivered += 1;
            }
        }
    }
    delivered
}
