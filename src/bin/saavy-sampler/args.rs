use std::path::PathBuf;

use color_eyre::eyre::{eyre, Result as EyreResult, WrapErr};
use log::LevelFilter;

use saavy_sampler::config::{DEFAULT_NUM_VOICES, DEFAULT_PRELOAD_SIZE};
use saavy_sampler::{Oversampling, SynthSettings};

pub const USAGE: &str = "\
usage: saavy-sampler [options] [instrument]

  --oversampling=x1|x2|x4|x8   internal oversampling factor
  --preload-size=N             preloaded frames per sample
  --num-voices=N               polyphony
  --device=NAME                output device (default device otherwise)
  --midi-port=TEXT             connect the first MIDI input whose name contains TEXT
  --plain                      line console on stdin/stdout instead of the TUI
  --state                      report active voices every second
  --log-level=LEVEL            off, error, warn, info, debug, trace
  --list-devices               list audio outputs and MIDI inputs, then exit";

#[derive(Debug)]
pub struct Args {
    pub instrument: Option<PathBuf>,
    pub oversampling: Oversampling,
    pub preload_size: u32,
    pub num_voices: usize,
    pub device: Option<String>,
    pub midi_port: Option<String>,
    pub plain: bool,
    pub state: bool,
    pub log_level: LevelFilter,
    pub list_devices: bool,
    pub help: bool,
}

impl Default for Args {
    fn default() -> Self {
        Self {
            instrument: None,
            oversampling: Oversampling::X1,
            preload_size: DEFAULT_PRELOAD_SIZE,
            num_voices: DEFAULT_NUM_VOICES,
            device: None,
            midi_port: None,
            plain: false,
            state: false,
            log_level: LevelFilter::Info,
            list_devices: false,
            help: false,
        }
    }
}

impl Args {
    pub fn settings(&self) -> SynthSettings {
        SynthSettings {
            oversampling: self.oversampling,
            preload_size: self.preload_size,
            num_voices: self.num_voices,
            ..SynthSettings::default()
        }
    }
}

pub fn parse_args(args: impl IntoIterator<Item = String>) -> EyreResult<Args> {
    let mut a = Args::default();
    for s in args {
        if s == "--plain" { a.plain = true; continue; }
        if s == "--state" { a.state = true; continue; }
        if s == "--list-devices" { a.list_devices = true; continue; }
        if s == "--help" || s == "-h" { a.help = true; continue; }
        if let Some(rest) = s.strip_prefix("--oversampling=") {
            a.oversampling = rest.parse().wrap_err("--oversampling")?;
            continue;
        }
        if let Some(rest) = s.strip_prefix("--preload-size=") {
            a.preload_size = rest.parse().wrap_err("--preload-size")?;
            continue;
        }
        if let Some(rest) = s.strip_prefix("--num-voices=") {
            a.num_voices = rest.parse().wrap_err("--num-voices")?;
            continue;
        }
        if let Some(rest) = s.strip_prefix("--device=")    { a.device    = Some(rest.to_string()); continue; }
        if let Some(rest) = s.strip_prefix("--midi-port=") { a.midi_port = Some(rest.to_string()); continue; }
        if let Some(rest) = s.strip_prefix("--log-level=") {
            a.log_level = rest
                .parse()
                .map_err(|_| eyre!("--log-level: unknown level '{rest}'"))?;
            continue;
        }
        if s.starts_with("--") {
            eprintln!("[warn] unknown arg: {s}");
            continue;
        }
        if a.instrument.is_some() {
            return Err(eyre!("only one instrument file can be given (got '{s}')"));
        }
        a.instrument = Some(PathBuf::from(s));
    }
    Ok(a)
}
