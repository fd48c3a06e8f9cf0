//! cpal output: the host adapter around `Engine::render`.

use color_eyre::eyre::{eyre, Result as EyreResult, WrapErr};
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use rtrb::{Consumer, Producer, PushError};

use saavy_sampler::{
    io::RawMidiEvent,
    synth::message,
    Engine, MAX_BLOCK_SIZE,
};

pub struct AudioOutput {
    /// Dropping the stream stops the callback.
    pub stream: cpal::Stream,
    pub device_name: String,
    pub sample_rate: u32,
    pub channels: usize,
}

pub fn list_devices() -> EyreResult<()> {
    let host = cpal::default_host();
    println!("Available output devices:");
    for device in host.output_devices()? {
        println!("- {}", device.name()?);
    }
    Ok(())
}

fn pick_device(name: Option<&str>) -> EyreResult<cpal::Device> {
    let host = cpal::default_host();
    if let Some(name) = name {
        for device in host.output_devices()? {
            if device.name().is_ok_and(|n| n == name) {
                return Ok(device);
            }
        }
        return Err(eyre!("requested device not found: {name}"));
    }
    host.default_output_device()
        .ok_or_else(|| eyre!("no default output device available"))
}

/// Open the device, tell the engine about its format and start rendering.
pub fn start(
    engine: &Engine,
    device_name: Option<&str>,
    midi_rx: Consumer<RawMidiEvent>,
    scope_tx: Producer<f32>,
) -> EyreResult<AudioOutput> {
    let device = pick_device(device_name)?;
    let supported = device
        .default_output_config()
        .wrap_err("failed to fetch default output config")?;
    let sample_format = supported.sample_format();
    let mut config: cpal::StreamConfig = supported.config();

    engine
        .sample_rate_changed(config.sample_rate.0)
        .wrap_err("device sample rate rejected")?;

    // Ask for the engine's block size when the device allows it, and settle
    // the engine on whatever was granted.
    let wanted = engine.settings().samples_per_block as u32;
    if let cpal::SupportedBufferSize::Range { min, max } = supported.buffer_size() {
        let upper = (*max).min(MAX_BLOCK_SIZE as u32);
        if *min <= upper {
            let granted = wanted.clamp(*min, upper);
            config.buffer_size = cpal::BufferSize::Fixed(granted);
            engine
                .block_size_changed(granted)
                .wrap_err("device block size rejected")?;
        }
    }

    let channels = config.channels as usize;
    let name = device.name().unwrap_or_else(|_| "unknown device".into());
    log::info!(
        "audio output: {name} ({} Hz, {channels} channels, {sample_format:?})",
        config.sample_rate.0
    );

    let stream = match sample_format {
        cpal::SampleFormat::F32 => build_stream::<f32>(&device, &config, engine.clone(), midi_rx, scope_tx)?,
        cpal::SampleFormat::I16 => build_stream::<i16>(&device, &config, engine.clone(), midi_rx, scope_tx)?,
        cpal::SampleFormat::U16 => build_stream::<u16>(&device, &config, engine.clone(), midi_rx, scope_tx)?,
        other => return Err(eyre!("unsupported device sample format: {other:?}")),
    };
    stream.play().wrap_err("failed to start output stream")?;

    Ok(AudioOutput {
        stream,
        device_name: name,
        sample_rate: config.sample_rate.0,
        channels,
    })
}

fn build_stream<T>(
    device: &cpal::Device,
    config: &cpal::StreamConfig,
    engine: Engine,
    mut midi_rx: Consumer<RawMidiEvent>,
    mut scope_tx: Producer<f32>,
) -> EyreResult<cpal::Stream>
where
    T: cpal::Sample + cpal::FromSample<f32> + cpal::SizedSample + Send + 'static,
{
    let channels = config.channels as usize;
    // Planar buffers reused by the callback
    let mut left_buf = vec![0.0f32; MAX_BLOCK_SIZE];
    let mut right_buf = vec![0.0f32; MAX_BLOCK_SIZE];

    let stream = device
        .build_output_stream(
            config,
            move |data: &mut [T], _| {
                let total_frames = data.len() / channels.max(1);
                let mut frames_written = 0;
                while frames_written < total_frames {
                    let frames_to_render = (total_frames - frames_written).min(MAX_BLOCK_SIZE);

                    let left = &mut left_buf[..frames_to_render];
                    let right = &mut right_buf[..frames_to_render];
                    engine.render(message::drain(&mut midi_rx), &mut [&mut *left, &mut *right]);

                    // Interleave to the device; mono devices get the sum
                    let out_off = frames_written * channels;
                    let out = &mut data[out_off..out_off + frames_to_render * channels];
                    for ((frame, &l), &r) in out.chunks_mut(channels).zip(left.iter()).zip(right.iter()) {
                        match frame {
                            [mono] => *mono = T::from_sample((l + r) * 0.5),
                            [first, second, rest @ ..] => {
                                *first = T::from_sample(l);
                                *second = T::from_sample(r);
                                for ch in rest {
                                    *ch = T::from_sample(0.0f32);
                                }
                            }
                            [] => {}
                        }
                    }

                    // Feed the scope, dropping the remainder if the UI lags
                    for (&l, &r) in left.iter().zip(right.iter()) {
                        if let Err(PushError::Full(_)) = scope_tx.push((l + r) * 0.5) {
                            break;
                        }
                    }

                    frames_written += frames_to_render;
                }
            },
            move |err| log::error!("stream error: {err}"),
            None,
        )
        .wrap_err("failed to build output stream")?;

    Ok(stream)
}
