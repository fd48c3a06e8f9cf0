// Purpose: Voice management, polyphony, event handling
// Everything in here runs under the control gate

pub mod message;
pub mod poly;
pub mod voice;

pub use poly::Synth;
