use std::path::PathBuf;

use crate::config::Oversampling;

#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum CommandError {
    #[error("Unknown command '{0}'!")]
    Unknown(String),
    #[error("'{command}' expects {argument}")]
    MissingArgument {
        command: &'static str,
        argument: &'static str,
    },
    #[error("'{command}': invalid value '{value}'")]
    InvalidArgument { command: &'static str, value: String },
    #[error("unterminated quote")]
    UnterminatedQuote,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    LoadInstrument(PathBuf),
    UnloadInstrument,
    SetOversampling(Oversampling),
    SetPreloadSize(u32),
    SetVoices(usize),
    /// Master volume, dB.
    Gain(f32),
    Settings,
    Help,
    Quit,
}

pub const HELP: &[&str] = &[
    "load_instrument <file>",
    "unload_instrument",
    "set_oversampling <1|2|4|8>",
    "set_preload_size <frames>",
    "set_voices <count>",
    "gain <dB>",
    "settings",
    "help",
    "quit",
];

/// Split on whitespace; a double-quoted section is one token and may hold
/// spaces.
pub fn tokenize(line: &str) -> Result<Vec<String>, CommandError> {
    let mut tokens = Vec::new();
    let mut part = String::new();
    let mut chars = line.chars();

    while let Some(c) = chars.next() {
        match c {
            '"' => {
                let mut closed = false;
                for c in chars.by_ref() {
                    if c == '"' {
                        closed = true;
                        break;
                    }
                    part.push(c);
                }
                if !closed {
                    return Err(CommandError::UnterminatedQuote);
                }
                tokens.push(std::mem::take(&mut part));
            }
            c if c.is_whitespace() => {
                if !part.is_empty() {
                    tokens.push(std::mem::take(&mut part));
                }
            }
            c => part.push(c),
        }
    }
    if !part.is_empty() {
        tokens.push(part);
    }
    Ok(tokens)
}

fn argument<'a>(
    args: &'a [String],
    command: &'static str,
    argument: &'static str,
) -> Result<&'a str, CommandError> {
    args.first()
        .map(String::as_str)
        .ok_or(CommandError::MissingArgument { command, argument })
}

fn number<T: std::str::FromStr>(value: &str, command: &'static str) -> Result<T, CommandError> {
    value.parse().map_err(|_| CommandError::InvalidArgument {
        command,
        value: value.to_string(),
    })
}

impl Command {
    /// Parse one console line. Blank lines give `Ok(None)`.
    pub fn parse(line: &str) -> Result<Option<Command>, CommandError> {
        let tokens = tokenize(line)?;
        let Some((keyword, args)) = tokens.split_first() else {
            return Ok(None);
        };

        let command = match keyword.as_str() {
            "load_instrument" => {
                let path = argument(args, "load_instrument", "a file")?;
                Command::LoadInstrument(PathBuf::from(path))
            }
            "unload_instrument" => Command::UnloadInstrument,
            "set_oversampling" => {
                let value = argument(args, "set_oversampling", "a factor")?;
                let factor =
                    value
                        .parse::<Oversampling>()
                        .map_err(|_| CommandError::InvalidArgument {
                            command: "set_oversampling",
                            value: value.to_string(),
                        })?;
                Command::SetOversampling(factor)
            }
            "set_preload_size" => {
                let value = argument(args, "set_preload_size", "a size")?;
                Command::SetPreloadSize(number(value, "set_preload_size")?)
            }
            "set_voices" => {
                let value = argument(args, "set_voices", "a count")?;
                Command::SetVoices(number(value, "set_voices")?)
            }
            "gain" => {
                let value = argument(args, "gain", "a value in dB")?;
                Command::Gain(number(value, "gain")?)
            }
            "settings" => Command::Settings,
            "help" => Command::Help,
            "quit" | "exit" => Command::Quit,
            other => return Err(CommandError::Unknown(other.to_string())),
        };
        Ok(Some(command))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quoted_paths_stay_whole() {
        assert_eq!(
            tokenize(r#"load_instrument "My Patches/grand piano.json""#).unwrap(),
            vec!["load_instrument", "My Patches/grand piano.json"]
        );
        assert_eq!(
            tokenize("  set_voices   32  ").unwrap(),
            vec!["set_voices", "32"]
        );
        assert_eq!(
            tokenize(r#"load_instrument "broken"#),
            Err(CommandError::UnterminatedQuote)
        );
    }

    #[test]
    fn parses_every_command() {
        assert_eq!(
            Command::parse(r#"load_instrument "a b.json""#).unwrap(),
            Some(Command::LoadInstrument(PathBuf::from("a b.json")))
        );
        assert_eq!(
            Command::parse("set_oversampling x4").unwrap(),
            Some(Command::SetOversampling(Oversampling::X4))
        );
        assert_eq!(
            Command::parse("set_preload_size 4096").unwrap(),
            Some(Command::SetPreloadSize(4096))
        );
        assert_eq!(
            Command::parse("set_voices 16").unwrap(),
            Some(Command::SetVoices(16))
        );
        assert_eq!(
            Command::parse("gain -6.5").unwrap(),
            Some(Command::Gain(-6.5))
        );
        assert_eq!(
            Command::parse("unload_instrument").unwrap(),
            Some(Command::UnloadInstrument)
        );
        assert_eq!(Command::parse("settings").unwrap(), Some(Command::Settings));
        assert_eq!(Command::parse("help").unwrap(), Some(Command::Help));
        assert_eq!(Command::parse("quit").unwrap(), Some(Command::Quit));
        assert_eq!(Command::parse("   ").unwrap(), None);
    }

    #[test]
    fn reports_bad_input() {
        assert_eq!(
            Command::parse("explode"),
            Err(CommandError::Unknown("explode".into()))
        );
        assert!(matches!(
            Command::parse("set_voices"),
            Err(CommandError::MissingArgument { .. })
        ));
        assert!(matches!(
            Command::parse("set_voices many"),
            Err(CommandError::InvalidArgument { .. })
        ));
        assert!(matches!(
            Command::parse("set_oversampling 3"),
            Err(CommandError::InvalidArgument { .. })
        ));
    }
}
