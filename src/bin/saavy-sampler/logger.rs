//! `log` backend for the binary: records go to the console panel, or to
//! stderr with `--plain`.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, PoisonError};

use color_eyre::eyre::{eyre, Result as EyreResult};
use log::{LevelFilter, Log, Metadata, Record};

const MAX_LINES: usize = 500;

/// Lines shown in the console panel, newest last.
#[derive(Clone, Default)]
pub struct ConsoleLines(Arc<Mutex<VecDeque<String>>>);

impl ConsoleLines {
    pub fn push(&self, line: impl Into<String>) {
        let mut lines = self.0.lock().unwrap_or_else(PoisonError::into_inner);
        if lines.len() == MAX_LINES {
            lines.pop_front();
        }
        lines.push_back(line.into());
    }

    /// The last `count` lines.
    pub fn tail(&self, count: usize) -> Vec<String> {
        let lines = self.0.lock().unwrap_or_else(PoisonError::into_inner);
        let skip = lines.len().saturating_sub(count);
        lines.iter().skip(skip).cloned().collect()
    }
}

struct ConsoleLogger {
    level: LevelFilter,
    lines: Option<ConsoleLines>,
}

impl Log for ConsoleLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= self.level
    }

    fn log(&self, record: &Record) {
        if !self.enabled(record.metadata()) {
            return;
        }
        let line = format!("{:<5} {}", record.level(), record.args());
        match &self.lines {
            Some(lines) => lines.push(line),
            None => eprintln!("{line}"),
        }
    }

    fn flush(&self) {}
}

/// Install the logger. With `plain` set, records go to stderr and the
/// returned lines stay empty.
pub fn init(level: LevelFilter, plain: bool) -> EyreResult<ConsoleLines> {
    let lines = ConsoleLines::default();
    let logger = ConsoleLogger {
        level,
        lines: (!plain).then(|| lines.clone()),
    };
    log::set_logger(Box::leak(Box::new(logger)))
        .map_err(|err| eyre!("could not install the logger: {err}"))?;
    log::set_max_level(level);
    Ok(lines)
}
