//! Event transports and the per-block dispatcher.
//!
//! Transports differ in how events arrive (raw bytes from a driver buffer,
//! typed records from a sequencer queue) but all decode into
//! [`midi::MidiEvent`] and go through the same [`dispatch::dispatch`].
//! Events from different transports are not merged or sorted against each
//! other.

pub mod dispatch;
pub mod midi;
pub mod sequencer;

pub use dispatch::{dispatch, EventSink};
pub use midi::{MidiEvent, RawMidiEvent, TransportEvent};
pub use sequencer::{SequencerEvent, SequencerEventKind};
