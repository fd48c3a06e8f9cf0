use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::MIN_TIME;

/*
Flex Envelope Generator
=======================

A multi-point envelope in the style of ARIA "flex EGs": instead of the fixed
attack/decay/sustain/release quartet, an envelope is an ordered list of
points, each reached after `time` seconds with a `shape`d curve. One point
is marked as the sustain point.

Vocabulary
----------

  point       A target {time, level, shape}. The segment leading to point i
              starts at the level where segment i-1 ended (0.0 for i = 0).

  sustain     Index of the point held while the key is down. Segments
              0..=sustain are the attack; segments after it are the release.

  trigger     The frame at which generation begins. `start(delay)` arms a
  delay       countdown so a note-on in the middle of a block starts on the
              exact frame it was played.

  release     Same idea for note-off: `release(delay)` arms a countdown and
  delay       the release segments begin on that exact frame, from whatever
              level the envelope has reached.


The State Machine
-----------------

            start(d)               d frames            reached sustain point
   ┌──────┐ ───────→ ┌────────────────┐ ────→ ┌────────┐ ─────→ ┌─────────┐
   │ Idle │          │ PendingTrigger │       │ Attack │        │ Sustain │
   └──────┘          └────────────────┘       └────────┘        └─────────┘
      ↑                                           │ release(d)       │
      │ configure / reuse                         ↓                  ↓
   ┌──────────┐  last point   ┌───────────┐  d frames  ┌────────────────┐
   │ Released │ ←──────────── │ Releasing │ ←───────── │ PendingRelease │
   └──────────┘               └───────────┘            └────────────────┘

Scheduling is counted in frames, never in seconds. A sample-rate change
rescales segment speeds but does not move a countdown already in flight.

A release requested while the trigger countdown is still running cannot
pre-empt it: the release is pushed back so that at least one attack frame
is produced first.


Shapes
------

  shape = 0   linear ramp
  shape > 0   slow start, fast finish   x^(1 + shape)
  shape < 0   fast start, slow finish   1 - (1 - x)^(1 - shape)

The curves are not meant to match any other implementation sample for
sample; they only need to be monotonic and hit the target exactly.
*/

/// One target point of a flex envelope.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FlexEgPoint {
    /// Seconds to travel from the previous level to `level`.
    pub time: f32,
    pub level: f32,
    #[serde(default)]
    pub shape: f32,
}

/// Immutable envelope parameters, shared between voices through an `Arc`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlexEgDescription {
    pub points: Vec<FlexEgPoint>,
    pub sustain: usize,
}

impl FlexEgDescription {
    /// Classic linear ADSR expressed as three flex points.
    pub fn adsr(attack: f32, decay: f32, sustain: f32, release: f32) -> Self {
        let sustain = sustain.clamp(0.0, 1.0);
        Self {
            points: vec![
                FlexEgPoint {
                    time: attack.max(MIN_TIME),
                    level: 1.0,
                    shape: 0.0,
                },
                FlexEgPoint {
                    time: decay.max(MIN_TIME),
                    level: sustain,
                    shape: 0.0,
                },
                FlexEgPoint {
                    time: release.max(MIN_TIME),
                    level: 0.0,
                    shape: 0.0,
                },
            ],
            sustain: 1,
        }
    }

    /// Check the description is usable before it reaches a voice.
    pub fn validate(&self) -> Result<(), String> {
        if self.points.is_empty() {
            return Err("envelope has no points".into());
        }
        if self.sustain >= self.points.len() {
            return Err(format!(
                "sustain point {} out of range ({} points)",
                self.sustain,
                self.points.len()
            ));
        }
        for (index, point) in self.points.iter().enumerate() {
            if !(point.time.is_finite() && point.time >= 0.0) {
                return Err(format!("point {index}: invalid time {}", point.time));
            }
            if !point.level.is_finite() || !point.shape.is_finite() {
                return Err(format!("point {index}: level and shape must be finite"));
            }
        }
        Ok(())
    }

    fn release_start(&self) -> usize {
        self.sustain + 1
    }
}

impl Default for FlexEgDescription {
    fn default() -> Self {
        Self::adsr(0.001, 0.0, 1.0, 0.05)
    }
}

/// Observable state of a [`FlexEnvelope`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EgState {
    Idle,
    PendingTrigger,
    Attack,
    Sustain,
    PendingRelease,
    Releasing,
    Released,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Stage {
    Idle,
    Delayed,
    Attack,
    Sustain,
    Release,
    Done,
}

#[inline]
fn shaped(x: f32, shape: f32) -> f32 {
    if shape > 0.0 {
        x.powf(1.0 + shape)
    } else if shape < 0.0 {
        1.0 - (1.0 - x).powf(1.0 - shape)
    } else {
        x
    }
}

#[inline]
fn segment_step(time: f32, sample_rate: f32) -> f32 {
    let frames = time * sample_rate;
    if frames <= 1.0 {
        1.0
    } else {
        1.0 / frames
    }
}

/// Per-note generator state, kept apart from the shared description so the
/// render loop can borrow both at once.
#[derive(Debug, Clone)]
struct Runtime {
    stage: Stage,
    trigger_countdown: u32,
    release_countdown: Option<u32>,
    segment: usize,
    segment_start: f32,
    segment_pos: f32,
    segment_step: f32,
    level: f32,
}

impl Runtime {
    fn new() -> Self {
        Self {
            stage: Stage::Idle,
            trigger_countdown: 0,
            release_countdown: None,
            segment: 0,
            segment_start: 0.0,
            segment_pos: 0.0,
            segment_step: 1.0,
            level: 0.0,
        }
    }

    fn enter_segment(&mut self, desc: &FlexEgDescription, segment: usize, sample_rate: f32) {
        self.segment = segment;
        self.segment_start = self.level;
        self.segment_pos = 0.0;
        self.segment_step = desc
            .points
            .get(segment)
            .map_or(1.0, |point| segment_step(point.time, sample_rate));
    }

    fn enter_release(&mut self, desc: &FlexEgDescription, sample_rate: f32) {
        let first = desc.release_start();
        if first >= desc.points.len() {
            self.level = 0.0;
            self.stage = Stage::Done;
        } else {
            self.stage = Stage::Release;
            self.enter_segment(desc, first, sample_rate);
        }
    }

    /// Produce one frame of output.
    fn tick(&mut self, desc: &FlexEgDescription, sample_rate: f32) -> f32 {
        match self.stage {
            Stage::Idle | Stage::Done => return 0.0,
            Stage::Delayed => {
                if self.trigger_countdown > 0 {
                    self.trigger_countdown -= 1;
                    if let Some(release) = self.release_countdown.as_mut() {
                        *release = release.saturating_sub(1);
                    }
                    return 0.0;
                }
                self.level = 0.0;
                self.stage = Stage::Attack;
                self.enter_segment(desc, 0, sample_rate);
            }
            _ => {}
        }

        if let Some(remaining) = self.release_countdown {
            if remaining == 0 {
                self.release_countdown = None;
                self.enter_release(desc, sample_rate);
            } else {
                self.release_countdown = Some(remaining - 1);
            }
        }

        match self.stage {
            Stage::Attack | Stage::Release => self.advance(desc, sample_rate),
            Stage::Sustain => {
                self.level = desc.points[desc.sustain].level;
            }
            Stage::Done => return 0.0,
            Stage::Idle | Stage::Delayed => {}
        }
        self.level
    }

    fn advance(&mut self, desc: &FlexEgDescription, sample_rate: f32) {
        let Some(point) = desc.points.get(self.segment) else {
            self.stage = Stage::Done;
            self.level = 0.0;
            return;
        };

        self.segment_pos = (self.segment_pos + self.segment_step).min(1.0);
        self.level = self.segment_start
            + (point.level - self.segment_start) * shaped(self.segment_pos, point.shape);

        if self.segment_pos < 1.0 {
            return;
        }

        self.level = point.level;
        let next = self.segment + 1;
        match self.stage {
            Stage::Attack if self.segment >= desc.sustain => self.stage = Stage::Sustain,
            Stage::Release if next >= desc.points.len() => self.stage = Stage::Done,
            _ => self.enter_segment(desc, next, sample_rate),
        }
    }
}

/// Sample-accurate flex envelope generator, one per voice slot.
///
/// The description is shared and immutable; the generator only keeps an
/// `Arc` to it. Reconfigure (or `reset`) before the description it holds is
/// invalidated by an instrument change.
#[derive(Debug, Clone)]
pub struct FlexEnvelope {
    desc: Option<Arc<FlexEgDescription>>,
    sample_rate: f32,
    run: Runtime,
}

impl FlexEnvelope {
    pub fn new(sample_rate: f32) -> Self {
        Self {
            desc: None,
            sample_rate,
            run: Runtime::new(),
        }
    }

    /// Rescale time-based coefficients. Frame countdowns are left untouched.
    pub fn set_sample_rate(&mut self, sample_rate: f32) {
        self.sample_rate = sample_rate;
        if let (Some(desc), Stage::Attack | Stage::Release) = (self.desc.as_deref(), self.run.stage)
        {
            if let Some(point) = desc.points.get(self.run.segment) {
                self.run.segment_step = segment_step(point.time, sample_rate);
            }
        }
    }

    /// Bind a description. Only valid while idle (or finished).
    pub fn configure(&mut self, desc: Arc<FlexEgDescription>) {
        debug_assert!(
            matches!(self.run.stage, Stage::Idle | Stage::Done),
            "configure on a running envelope"
        );
        self.desc = Some(desc);
        self.run = Runtime::new();
    }

    /// Arm the trigger: generation begins `trigger_delay` frames into the
    /// next `process` call.
    pub fn start(&mut self, trigger_delay: u32) {
        if self.desc.is_none() {
            return;
        }
        debug_assert!(matches!(self.run.stage, Stage::Idle | Stage::Done));
        self.run = Runtime::new();
        self.run.stage = Stage::Delayed;
        self.run.trigger_countdown = trigger_delay;
    }

    /// Schedule the release `release_delay` frames from the start of the
    /// next `process` call.
    pub fn release(&mut self, release_delay: u32) {
        let delay = match self.run.stage {
            Stage::Idle | Stage::Done | Stage::Release => return,
            // Never release before the first attack frame.
            Stage::Delayed => release_delay.max(self.run.trigger_countdown.saturating_add(1)),
            Stage::Attack | Stage::Sustain => release_delay,
        };
        self.run.release_countdown = Some(match self.run.release_countdown {
            Some(pending) => pending.min(delay),
            None => delay,
        });
    }

    /// Fill `out` with one block of envelope values.
    pub fn process(&mut self, out: &mut [f32]) {
        let Some(desc) = self.desc.as_deref() else {
            out.fill(0.0);
            return;
        };
        let sample_rate = self.sample_rate;
        for sample in out.iter_mut() {
            *sample = self.run.tick(desc, sample_rate);
        }
    }

    /// Force the generator back to idle, keeping the description.
    pub fn reset(&mut self) {
        self.run = Runtime::new();
    }

    /// Drop the description. Used before the owning instrument is released.
    pub fn unbind(&mut self) {
        self.desc = None;
        self.run = Runtime::new();
    }

    pub fn state(&self) -> EgState {
        match self.run.stage {
            Stage::Idle => EgState::Idle,
            Stage::Delayed => EgState::PendingTrigger,
            Stage::Attack | Stage::Sustain if self.run.release_countdown.is_some() => {
                EgState::PendingRelease
            }
            Stage::Attack => EgState::Attack,
            Stage::Sustain => EgState::Sustain,
            Stage::Release => EgState::Releasing,
            Stage::Done => EgState::Released,
        }
    }

    /// True once the last release point has been reached.
    pub fn is_finished(&self) -> bool {
        self.run.stage == Stage::Done
    }

    pub fn current_level(&self) -> f32 {
        self.run.level
    }
}
