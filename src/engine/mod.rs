//! The engine handle shared by the audio callback and every control thread.
//!
//! All engine-wide state lives in a [`Synth`] behind one [`ControlGate`].
//! The render entry points make a single non-blocking attempt per block and
//! write silence when the control plane holds the gate; the configuration
//! entry points block until they get it.

pub mod gate;
pub mod shutdown;

use std::path::Path;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

use crate::{
    config::{Oversampling, SynthSettings},
    error::ConfigError,
    io::{
        dispatch::{dispatch, EventSink},
        midi::TransportEvent,
    },
    patch::{self, LoadReport},
    synth::Synth,
};

pub use self::{gate::ControlGate, shutdown::ShutdownToken};

/// Outcome of one render call. Both are success from the host's point of
/// view.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenderStatus {
    /// The block was synthesized; `events` reached the synth.
    Rendered { events: usize },
    /// The gate was busy; every output channel was zero-filled.
    Silenced,
}

impl RenderStatus {
    /// Host status code.
    pub fn code(self) -> i32 {
        0
    }
}

/// Counters the render thread publishes without taking the gate.
#[derive(Debug, Default)]
struct RenderStats {
    active_voices: AtomicUsize,
    rendered_blocks: AtomicU64,
}

struct Shared {
    gate: ControlGate<Synth>,
    stats: RenderStats,
}

/// Cheap to clone; every clone drives the same synth.
#[derive(Clone)]
pub struct Engine {
    shared: Arc<Shared>,
}

impl Engine {
    pub fn new(settings: SynthSettings) -> Result<Self, ConfigError> {
        let synth = Synth::new(settings)?;
        Ok(Self {
            shared: Arc::new(Shared {
                gate: ControlGate::new(synth),
                stats: RenderStats::default(),
            }),
        })
    }

    // ---------------------------------------------------------------------
    // Render path: no blocking, no allocation, no logging.
    // ---------------------------------------------------------------------

    /// Render one block from a single transport's events. Returns the host
    /// status code (always 0).
    ///
    /// Under contention the events are consumed and discarded; a contested
    /// block never replays them later.
    pub fn render<I>(&self, events: I, outputs: &mut [&mut [f32]]) -> i32
    where
        I: IntoIterator,
        I::Item: TransportEvent,
    {
        let mut events = Some(events);
        let status = self.render_with(
            |sink| events.take().map_or(0, |events| dispatch(sink, events)),
            outputs,
        );
        if let Some(events) = events {
            events.into_iter().for_each(drop);
        }
        status.code()
    }

    /// Render one block, letting `feed` dispatch events from any number of
    /// transports first. `feed` is not called when the block is contested.
    pub fn render_with<F>(&self, feed: F, outputs: &mut [&mut [f32]]) -> RenderStatus
    where
        F: FnOnce(&mut dyn EventSink) -> usize,
    {
        let shared = &*self.shared;
        let rendered = shared.gate.try_render(|synth| {
            let events = feed(synth);
            synth.render_block(outputs);
            shared
                .stats
                .active_voices
                .store(synth.num_active_voices(), Ordering::Relaxed);
            events
        });

        match rendered {
            Some(events) => {
                shared.stats.rendered_blocks.fetch_add(1, Ordering::Relaxed);
                RenderStatus::Rendered { events }
            }
            None => {
                for out in outputs.iter_mut() {
                    out.fill(0.0);
                }
                RenderStatus::Silenced
            }
        }
    }

    // ---------------------------------------------------------------------
    // Control plane: every entry point blocks on the gate.
    // ---------------------------------------------------------------------

    /// Load (or import) an instrument and swap it in. File I/O happens
    /// before the gate is taken; the previous instrument is dropped after it
    /// is released.
    pub fn load_instrument(&self, path: impl AsRef<Path>) -> Result<LoadReport, ConfigError> {
        let path = path.as_ref();
        let (instrument, report) = patch::load_instrument(path).map_err(|source| {
            log::warn!("could not load {}: {source}", path.display());
            ConfigError::Instrument {
                path: path.to_path_buf(),
                source,
            }
        })?;

        let previous = self
            .configure(|synth| synth.set_instrument(Some(Arc::new(instrument))));
        drop(previous);

        log::info!(
            "loaded {} ({} regions, {} samples{})",
            report.path.display(),
            report.regions,
            report.preloaded_samples,
            report
                .import_format
                .map(|format| format!(", imported from {format}"))
                .unwrap_or_default()
        );
        Ok(report)
    }

    /// Drop the current instrument; the engine renders silence until the
    /// next load.
    pub fn unload_instrument(&self) {
        let previous = self.configure(|synth| synth.set_instrument(None));
        drop(previous);
    }

    pub fn set_sample_rate(&self, sample_rate: f32) -> Result<(), ConfigError> {
        self.apply("sample rate", |synth| synth.set_sample_rate(sample_rate))
    }

    pub fn set_samples_per_block(&self, samples_per_block: usize) -> Result<(), ConfigError> {
        self.apply("block size", |synth| {
            synth.set_samples_per_block(samples_per_block)
        })
    }

    pub fn set_num_voices(&self, num_voices: usize) -> Result<(), ConfigError> {
        self.apply("voice count", |synth| synth.set_num_voices(num_voices))
    }

    pub fn set_oversampling_factor(&self, factor: u32) -> Result<(), ConfigError> {
        let oversampling = Oversampling::from_factor(factor).inspect_err(|err| {
            log::warn!("rejected oversampling: {err}");
        })?;
        self.set_oversampling(oversampling);
        Ok(())
    }

    pub fn set_oversampling(&self, oversampling: Oversampling) {
        self.configure(|synth| synth.set_oversampling(oversampling));
        log::info!("oversampling set to {oversampling}");
    }

    pub fn set_preload_size(&self, preload_size: u32) -> Result<(), ConfigError> {
        self.apply("preload size", |synth| synth.set_preload_size(preload_size))
    }

    /// Master volume in dB.
    pub fn set_volume(&self, volume_db: f32) -> Result<(), ConfigError> {
        self.apply("volume", |synth| synth.set_volume(volume_db))
    }

    /// Host notification: the device sample rate changed.
    pub fn sample_rate_changed(&self, sample_rate: u32) -> Result<(), ConfigError> {
        self.set_sample_rate(sample_rate as f32)
    }

    /// Host notification: the device period size changed.
    pub fn block_size_changed(&self, block_size: u32) -> Result<(), ConfigError> {
        self.set_samples_per_block(block_size as usize)
    }

    /// Run `f` with exclusive access to the synth.
    pub fn configure<R>(&self, f: impl FnOnce(&mut Synth) -> R) -> R {
        self.shared.gate.configure(f)
    }

    pub fn settings(&self) -> SynthSettings {
        self.configure(|synth| synth.settings().clone())
    }

    pub fn instrument_name(&self) -> Option<String> {
        self.configure(|synth| synth.instrument().map(|instrument| instrument.name.clone()))
    }

    // ---------------------------------------------------------------------
    // Lock-free diagnostics.
    // ---------------------------------------------------------------------

    /// Voices playing at the end of the last rendered block.
    pub fn num_active_voices(&self) -> usize {
        self.shared.stats.active_voices.load(Ordering::Relaxed)
    }

    pub fn rendered_blocks(&self) -> u64 {
        self.shared.stats.rendered_blocks.load(Ordering::Relaxed)
    }

    /// Blocks rendered as silence because the gate was busy.
    pub fn contention_count(&self) -> u64 {
        self.shared.gate.contention_count()
    }

    fn apply(
        &self,
        what: &str,
        f: impl FnOnce(&mut Synth) -> Result<(), ConfigError>,
    ) -> Result<(), ConfigError> {
        match self.configure(f) {
            Ok(()) => {
                log::info!("{what} updated");
                Ok(())
            }
            Err(err) => {
                log::warn!("rejected {what}: {err}");
                Err(err)
            }
        }
    }
}
