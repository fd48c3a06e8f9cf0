//! Low-level DSP primitives used by the voices.
//!
//! These components are allocation-free and realtime-safe once constructed,
//! making them safe to embed directly inside voice structs.

/// Owned, aligned multi-channel sample storage.
pub mod buffer;
/// Flex (multi-point) envelope generator with frame-accurate scheduling.
pub mod envelope;
/// Oscillator waveforms and noise sources.
pub mod oscillator;

pub use buffer::{AllocError, AudioBuffer};
pub use envelope::{EgState, FlexEgDescription, FlexEgPoint, FlexEnvelope};
