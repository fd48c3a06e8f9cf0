//! saavy-sampler - realtime sampler with a terminal console
//!
//! Run with: cargo run -- [options] [instrument.json|sample.wav]

mod args;
mod audio;
mod logger;
mod midi_input;
mod ui;

use color_eyre::eyre::{Result as EyreResult, WrapErr};
use rtrb::RingBuffer;
use std::io;
use std::sync::mpsc;
use std::thread;
use std::time::Duration;

use saavy_sampler::{
    control,
    synth::message::{midi_queue, MIDI_QUEUE_CAPACITY},
    Engine, ShutdownToken,
};

/// How often the main thread checks for a shutdown request in plain mode.
const SHUTDOWN_POLL: Duration = Duration::from_millis(50);

fn main() -> EyreResult<()> {
    color_eyre::install()?;

    let args = args::parse_args(std::env::args().skip(1))?;
    if args.help {
        println!("{}", args::USAGE);
        return Ok(());
    }
    if args.list_devices {
        audio::list_devices()?;
        midi_input::list_ports()?;
        return Ok(());
    }

    let lines = logger::init(args.log_level, args.plain)?;
    let engine = Engine::new(args.settings()).wrap_err("invalid engine settings")?;

    if let Some(path) = &args.instrument {
        match engine.load_instrument(path) {
            Ok(report) => {
                for line in report.to_string().lines() {
                    log::info!("{line}");
                }
            }
            Err(err) => log::error!("{err}"),
        }
    }

    // --- Cross-thread rings ---
    let (midi_tx, midi_rx) = midi_queue(MIDI_QUEUE_CAPACITY);
    let (scope_tx, scope_rx) =
        RingBuffer::<f32>::new(ui::VIS_BUFFER_SIZE * ui::AUDIO_RING_BLOCKS);

    let output = audio::start(&engine, args.device.as_deref(), midi_rx, scope_tx)?;
    let _midi = midi_input::connect(args.midi_port.as_deref(), midi_tx)?;

    let shutdown = ShutdownToken::new();
    install_signal_handler(&shutdown)?;
    if args.plain {
        println!("=== saavy-sampler ===");
        println!("Device: {}", output.device_name);
        println!("Sample rate: {} Hz", output.sample_rate);
        println!("Channels: {}", output.channels);
        println!("Type 'help' for commands");

        if args.state {
            spawn_state_reporter(engine.clone(), shutdown.clone());
        }

        // stdin blocks, so the console gets its own thread and a signal can
        // end the session between lines.
        let (done_tx, done_rx) = mpsc::channel();
        {
            let engine = engine.clone();
            let shutdown = shutdown.clone();
            thread::spawn(move || {
                let res = control::run(&engine, io::stdin().lock(), io::stdout(), &shutdown);
                let _ = done_tx.send(res);
                shutdown.request();
            });
        }
        shutdown.wait(SHUTDOWN_POLL);
        // Empty when a signal ended the session.
        if let Ok(res) = done_rx.try_recv() {
            res.wrap_err("console failed")?;
        }
    } else {
        let terminal = ratatui::init();
        let res = ui::Console::new(
            engine.clone(),
            shutdown.clone(),
            lines,
            scope_rx,
            output.device_name.clone(),
            args.state,
        )
        .run(terminal);
        ratatui::restore();
        res?;
    }

    shutdown.request();
    drop(output);
    Ok(())
}

/// SIGINT, SIGTERM and SIGHUP request shutdown instead of killing the
/// process mid-stream.
fn install_signal_handler(shutdown: &ShutdownToken) -> EyreResult<()> {
    let shutdown = shutdown.clone();
    ctrlc::set_handler(move || shutdown.request()).wrap_err("failed to install the signal handler")
}

fn spawn_state_reporter(engine: Engine, shutdown: ShutdownToken) {
    thread::spawn(move || {
        while !shutdown.is_requested() {
            thread::sleep(Duration::from_secs(1));
            println!(
                "Active voices: {}  Silenced blocks: {}",
                engine.num_active_voices(),
                engine.contention_count()
            );
        }
    });
}
