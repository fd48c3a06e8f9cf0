use rtrb::{Consumer, Producer, RingBuffer};

use crate::io::midi::RawMidiEvent;

pub const MIDI_QUEUE_CAPACITY: usize = 1024;

/// Source of events that arrive outside the driver's block, such as a MIDI
/// input thread.
pub trait MessageReceiver {
    fn pop(&mut self) -> Option<RawMidiEvent>;
}

impl MessageReceiver for Consumer<RawMidiEvent> {
    fn pop(&mut self) -> Option<RawMidiEvent> {
        Consumer::pop(self).ok()
    }
}

/// Producer half, held by the transport thread.
pub struct MidiSender {
    tx: Producer<RawMidiEvent>,
    dropped: u64,
}

impl MidiSender {
    /// Queue one raw message. A full queue drops it.
    pub fn send(&mut self, bytes: &[u8]) -> bool {
        match self.tx.push(RawMidiEvent::new(0, bytes)) {
            Ok(()) => true,
            Err(_) => {
                self.dropped += 1;
                false
            }
        }
    }

    pub fn dropped(&self) -> u64 {
        self.dropped
    }
}

/// Create the queue between an asynchronous transport and the render
/// callback.
pub fn midi_queue(capacity: usize) -> (MidiSender, Consumer<RawMidiEvent>) {
    let (tx, rx) = RingBuffer::new(capacity);
    (MidiSender { tx, dropped: 0 }, rx)
}

/// Drain everything queued so far. Queued events have no sub-block timing,
/// so they all land on frame 0.
pub fn drain<R: MessageReceiver + ?Sized>(rx: &mut R) -> impl Iterator<Item = RawMidiEvent> + '_ {
    std::iter::from_fn(move || rx.pop()).map(|event| event.with_time(0))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn full_queue_drops_at_the_producer() {
        let (mut tx, mut rx) = midi_queue(2);
        assert!(tx.send(&[0x90, 60, 100]));
        assert!(tx.send(&[0x90, 62, 100]));
        assert!(!tx.send(&[0x90, 64, 100]));
        assert_eq!(tx.dropped(), 1);

        let drained: Vec<_> = drain(&mut rx).collect();
        assert_eq!(drained.len(), 2);
        assert!(drained.iter().all(|event| event.time == 0));
        assert_eq!(drained[1].data(), &[0x90, 62, 100]);
        assert!(rx.is_empty());
    }
}
