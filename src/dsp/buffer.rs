/*
Owned Multi-Channel Audio Buffer
================================

An `AudioBuffer` owns up to `MAX_CHANNELS` independent sample arrays, all of
the same length. Each channel lives in its own allocation and starts on an
`ALIGNMENT`-byte boundary so SIMD kernels can use aligned loads.

  slot:    0         1         2 .. MAX_CHANNELS-1
         ┌───────┐ ┌───────┐ ┌──────┐
         │ ch 0  │ │ ch 1  │ │ None │   (unallocated capacity)
         └───────┘ └───────┘ └──────┘
          num_frames samples each

Alignment comes from storing samples in 32-byte `Lane`s: the allocator
honours the lane's alignment, and the public views reinterpret the lanes as
a flat `[f32]` trimmed to `num_frames`.

Resize is all-or-nothing. Growing first reserves capacity on every channel
(fallible, `try_reserve_exact`), and only once every reservation succeeded
are the lengths changed. A failed reservation leaves every channel at the
previous length. Shrinking never allocates.

There is no locking in here. Shape changes (resize, add_channel) belong to
the control plane under the engine gate; sample writes belong to the render
thread while it holds that gate.
*/

use std::collections::TryReserveError;
use std::mem::size_of;

use crate::NUM_CHANNELS;

/// Byte alignment of every channel's first sample.
pub const ALIGNMENT: usize = 32;
const LANE_WIDTH: usize = ALIGNMENT / size_of::<f32>();

#[derive(Debug, Clone, Copy, Default)]
#[repr(C, align(32))]
struct Lane([f32; LANE_WIDTH]);

const _: () = assert!(std::mem::align_of::<Lane>() == ALIGNMENT);
const _: () = assert!(size_of::<Lane>() == ALIGNMENT);

#[inline]
fn lanes_for(frames: usize) -> usize {
    frames.div_ceil(LANE_WIDTH)
}

/// One aligned channel. `lanes` may hold a few padding samples past `len`.
#[derive(Debug)]
struct AlignedChannel {
    lanes: Vec<Lane>,
    len: usize,
}

impl AlignedChannel {
    fn try_with_len(len: usize) -> Result<Self, TryReserveError> {
        let mut channel = Self {
            lanes: Vec::new(),
            len: 0,
        };
        channel.reserve(len)?;
        channel.set_len(len);
        Ok(channel)
    }

    /// Make room for `len` frames without touching the current length.
    fn reserve(&mut self, len: usize) -> Result<(), TryReserveError> {
        let needed = lanes_for(len);
        if needed > self.lanes.len() {
            self.lanes.try_reserve_exact(needed - self.lanes.len())?;
        }
        Ok(())
    }

    /// Must follow a successful `reserve(len)`; never allocates then.
    fn set_len(&mut self, len: usize) {
        let old = self.len;
        self.lanes.resize(lanes_for(len), Lane::default());
        self.len = len;
        if len > old {
            // Padding of the old last lane may hold stale samples.
            self.as_mut_slice()[old..].fill(0.0);
        }
    }

    fn as_slice(&self) -> &[f32] {
        // SAFETY: `Lane` is `repr(C)` over `[f32; LANE_WIDTH]` with no padding
        // (size == ALIGNMENT), so `lanes` is a contiguous run of
        // `lanes.len() * LANE_WIDTH` initialised f32s and `len` never exceeds it.
        unsafe { std::slice::from_raw_parts(self.lanes.as_ptr().cast::<f32>(), self.len) }
    }

    fn as_mut_slice(&mut self) -> &mut [f32] {
        // SAFETY: see `as_slice`; `&mut self` guarantees exclusivity.
        unsafe { std::slice::from_raw_parts_mut(self.lanes.as_mut_ptr().cast::<f32>(), self.len) }
    }
}

/// Returned when a channel allocation fails. The buffer keeps its prior shape.
#[derive(thiserror::Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("could not allocate {frames} frames per channel")]
pub struct AllocError {
    pub frames: usize,
}

/// Owned, aligned, fixed-capacity multi-channel sample storage.
pub struct AudioBuffer<const MAX_CHANNELS: usize = NUM_CHANNELS> {
    channels: [Option<AlignedChannel>; MAX_CHANNELS],
    num_channels: usize,
    num_frames: usize,
}

impl<const MAX_CHANNELS: usize> AudioBuffer<MAX_CHANNELS> {
    /// A buffer with no channels and no frames.
    pub fn empty() -> Self {
        Self {
            channels: std::array::from_fn(|_| None),
            num_channels: 0,
            num_frames: 0,
        }
    }

    /// Allocate `num_channels` channels of `num_frames` zeroed samples.
    ///
    /// Requests beyond `MAX_CHANNELS` are clamped; the extra slots stay empty.
    pub fn new(num_channels: usize, num_frames: usize) -> Self {
        let mut buffer = Self::empty();
        buffer.num_frames = num_frames;
        for _ in 0..num_channels.min(MAX_CHANNELS) {
            buffer.add_channel();
        }
        buffer
    }

    /// Resize every active channel to `new_frames`.
    ///
    /// Either every channel ends up with `new_frames` samples or none changes.
    /// Newly exposed samples are zero.
    pub fn resize(&mut self, new_frames: usize) -> Result<(), AllocError> {
        for channel in self.channels.iter_mut().flatten() {
            channel
                .reserve(new_frames)
                .map_err(|_| AllocError { frames: new_frames })?;
        }

        for channel in self.channels.iter_mut().flatten() {
            channel.set_len(new_frames);
        }
        self.num_frames = new_frames;
        Ok(())
    }

    /// Append one channel sized to the current frame count.
    ///
    /// Returns `false` when capacity is exhausted or allocation failed.
    pub fn add_channel(&mut self) -> bool {
        if self.num_channels >= MAX_CHANNELS {
            return false;
        }
        match AlignedChannel::try_with_len(self.num_frames) {
            Ok(channel) => {
                self.channels[self.num_channels] = Some(channel);
                self.num_channels += 1;
                true
            }
            Err(_) => false,
        }
    }

    /// Read view over channel `index`.
    ///
    /// `index >= num_channels()` is a contract violation: it asserts in debug
    /// builds and yields an empty slice in release builds.
    #[inline]
    pub fn channel(&self, index: usize) -> &[f32] {
        debug_assert!(index < self.num_channels, "channel {index} out of range");
        match self.channels.get(index) {
            Some(Some(channel)) => channel.as_slice(),
            _ => &[],
        }
    }

    /// Write view over channel `index`. Same bounds contract as [`channel`](Self::channel).
    #[inline]
    pub fn channel_mut(&mut self, index: usize) -> &mut [f32] {
        debug_assert!(index < self.num_channels, "channel {index} out of range");
        match self.channels.get_mut(index) {
            Some(Some(channel)) => channel.as_mut_slice(),
            _ => &mut [],
        }
    }

    /// Write views over every active channel, in order.
    pub fn channels_mut(&mut self) -> impl Iterator<Item = &mut [f32]> + '_ {
        self.channels
            .iter_mut()
            .flatten()
            .map(AlignedChannel::as_mut_slice)
    }

    /// Two distinct channels at once (e.g. left/right of a stereo voice).
    pub fn pair_mut(&mut self, first: usize, second: usize) -> (&mut [f32], &mut [f32]) {
        debug_assert!(first < second && second < self.num_channels);
        let (head, tail) = self.channels.split_at_mut(second);
        let a = match head.get_mut(first) {
            Some(Some(channel)) => channel.as_mut_slice(),
            _ => &mut [],
        };
        let b = match tail.first_mut() {
            Some(Some(channel)) => channel.as_mut_slice(),
            _ => &mut [],
        };
        (a, b)
    }

    #[inline]
    pub fn sample(&self, channel: usize, frame: usize) -> f32 {
        debug_assert!(frame < self.num_frames);
        self.channel(channel).get(frame).copied().unwrap_or(0.0)
    }

    /// Zero every active channel. Never allocates.
    pub fn clear(&mut self) {
        for channel in self.channels_mut() {
            channel.fill(0.0);
        }
    }

    pub fn num_channels(&self) -> usize {
        self.num_channels
    }

    pub fn num_frames(&self) -> usize {
        self.num_frames
    }

    pub fn is_empty(&self) -> bool {
        self.num_frames == 0
    }

    pub const fn max_channels() -> usize {
        MAX_CHANNELS
    }
}

impl<const MAX_CHANNELS: usize> Default for AudioBuffer<MAX_CHANNELS> {
    fn default() -> Self {
        Self::empty()
    }
}
