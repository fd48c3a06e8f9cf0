//! Interactive command surface.
//!
//! Lines are parsed into a [`Command`] and executed against an [`Engine`].
//! Every mutating command goes through the engine's configuration entry
//! points, so it waits for the control gate like any other control thread.

pub mod command;

use std::io::{self, BufRead, Write};

use crate::engine::{Engine, ShutdownToken};
use crate::error::ConfigError;

pub use command::{Command, CommandError, HELP};

/// What the console should do after a command.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    Continue(Vec<String>),
    Quit,
}

#[derive(thiserror::Error, Debug)]
pub enum ControlError {
    #[error(transparent)]
    Command(#[from] CommandError),
    #[error(transparent)]
    Config(#[from] ConfigError),
}

pub fn execute(engine: &Engine, command: Command) -> Result<Outcome, ConfigError> {
    let lines = match command {
        Command::LoadInstrument(path) => {
            let report = engine.load_instrument(&path)?;
            report.to_string().lines().map(str::to_string).collect()
        }
        Command::UnloadInstrument => {
            engine.unload_instrument();
            vec!["instrument unloaded".to_string()]
        }
        Command::SetOversampling(factor) => {
            engine.set_oversampling(factor);
            vec![format!("oversampling {factor}")]
        }
        Command::SetPreloadSize(size) => {
            engine.set_preload_size(size)?;
            vec![format!("preload size {size}")]
        }
        Command::SetVoices(voices) => {
            engine.set_num_voices(voices)?;
            vec![format!("voices {voices}")]
        }
        Command::Gain(db) => {
            engine.set_volume(db)?;
            vec![format!("gain {db} dB")]
        }
        Command::Settings => settings_lines(engine),
        Command::Help => HELP.iter().map(|line| line.to_string()).collect(),
        Command::Quit => return Ok(Outcome::Quit),
    };
    Ok(Outcome::Continue(lines))
}

/// Parse and execute one console line.
pub fn execute_line(engine: &Engine, line: &str) -> Result<Outcome, ControlError> {
    match Command::parse(line)? {
        Some(command) => Ok(execute(engine, command)?),
        None => Ok(Outcome::Continue(Vec::new())),
    }
}

pub fn settings_lines(engine: &Engine) -> Vec<String> {
    let settings = engine.settings();
    let instrument = engine
        .instrument_name()
        .unwrap_or_else(|| "(none)".to_string());
    vec![
        format!("synth.gain {}", settings.volume_db),
        format!("synth.sample_rate {}", settings.sample_rate),
        format!("synth.samples_per_block {}", settings.samples_per_block),
        format!("synth.voices {}", settings.num_voices),
        format!("synth.oversampling {}", settings.oversampling),
        format!("synth.preload_size {}", settings.preload_size),
        format!("synth.instrument {instrument}"),
    ]
}

/// Line-oriented console: read commands from `input` until `quit`, end of
/// input or a shutdown request. End of input requests shutdown.
pub fn run<R: BufRead, W: Write>(
    engine: &Engine,
    input: R,
    mut output: W,
    shutdown: &ShutdownToken,
) -> io::Result<()> {
    write!(output, "> ")?;
    output.flush()?;

    for line in input.lines() {
        if shutdown.is_requested() {
            return Ok(());
        }
        let line = line?;
        match execute_line(engine, &line) {
            Ok(Outcome::Continue(lines)) => {
                for line in lines {
                    writeln!(output, "{line}")?;
                }
            }
            Ok(Outcome::Quit) => {
                shutdown.request();
                return Ok(());
            }
            Err(err) => writeln!(output, "ERROR: {err}")?,
        }
        write!(output, "> ")?;
        output.flush()?;
    }

    shutdown.request();
    Ok(())
}
