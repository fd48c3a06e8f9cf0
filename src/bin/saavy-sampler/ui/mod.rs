//! Terminal console for saavy-sampler
//!
//! Shows engine status and the output spectrum, and takes the same commands
//! as the plain console on an input line.

mod spectrum;
mod status;

use color_eyre::eyre::Result as EyreResult;
use crossterm::event::{self, Event, KeyCode, KeyEventKind, KeyModifiers};
use ratatui::{
    layout::{Constraint, Direction, Layout},
    style::{Color, Style},
    text::Line,
    widgets::{Block, Borders, Paragraph},
    DefaultTerminal, Frame,
};
use rtrb::Consumer;
use std::time::{Duration, Instant};

use saavy_sampler::{
    control::{self, Outcome},
    Engine, ShutdownToken,
};

use crate::logger::ConsoleLines;
use spectrum::{render_spectrum, SpectrumAnalyzer};
use status::{render_status, AudioStats, StatusSnapshot};

/// Samples per analysis window
pub const VIS_BUFFER_SIZE: usize = 1024;
/// Capacity in windows of the audio-to-UI ring
pub const AUDIO_RING_BLOCKS: usize = 16;

const STATUS_INTERVAL: Duration = Duration::from_secs(1);

pub struct Console {
    engine: Engine,
    shutdown: ShutdownToken,
    lines: ConsoleLines,
    scope_rx: Consumer<f32>,
    audio_buffer: Vec<f32>,
    spectrum: SpectrumAnalyzer,
    status: StatusSnapshot,
    report_state: bool,
    last_status: Instant,
    input: String,
}

impl Console {
    pub fn new(
        engine: Engine,
        shutdown: ShutdownToken,
        lines: ConsoleLines,
        scope_rx: Consumer<f32>,
        device: String,
        report_state: bool,
    ) -> Self {
        let settings = engine.settings();
        let spectrum = SpectrumAnalyzer::new(VIS_BUFFER_SIZE, settings.sample_rate);
        let status = StatusSnapshot {
            settings,
            instrument: engine.instrument_name(),
            device,
            active_voices: 0,
            silenced_blocks: 0,
        };
        Self {
            engine,
            shutdown,
            lines,
            scope_rx,
            audio_buffer: vec![0.0; VIS_BUFFER_SIZE],
            spectrum,
            status,
            report_state,
            last_status: Instant::now(),
            input: String::new(),
        }
    }

    pub fn run(&mut self, mut terminal: DefaultTerminal) -> EyreResult<()> {
        while !self.shutdown.is_requested() {
            self.poll_audio();
            self.poll_status();

            terminal.draw(|frame| self.render(frame))?;

            // ~60fps
            if event::poll(Duration::from_millis(16))? {
                if let Event::Key(key) = event::read()? {
                    if key.kind == KeyEventKind::Press {
                        self.handle_key(key.code, key.modifiers);
                    }
                }
            }
        }
        Ok(())
    }

    /// Keep the last window of scope samples and analyze it.
    fn poll_audio(&mut self) {
        let available = self.scope_rx.slots();
        if available == 0 {
            return;
        }
        if let Ok(chunk) = self.scope_rx.read_chunk(available) {
            let (first, second) = chunk.as_slices();
            self.audio_buffer.extend_from_slice(first);
            self.audio_buffer.extend_from_slice(second);
            chunk.commit_all();
        }
        let excess = self.audio_buffer.len().saturating_sub(VIS_BUFFER_SIZE);
        self.audio_buffer.drain(..excess);
        self.spectrum.update(&self.audio_buffer);
    }

    /// Lock-free counters every frame; settings only once per interval,
    /// since reading them takes the control gate.
    fn poll_status(&mut self) {
        self.status.active_voices = self.engine.num_active_voices();
        self.status.silenced_blocks = self.engine.contention_count();

        if self.last_status.elapsed() >= STATUS_INTERVAL {
            self.last_status = Instant::now();
            if self.report_state {
                self.lines
                    .push(format!("Active voices: {}", self.status.active_voices));
            }
        }
    }

    fn refresh_settings(&mut self) {
        self.status.settings = self.engine.settings();
        self.status.instrument = self.engine.instrument_name();
    }

    fn handle_key(&mut self, key: KeyCode, modifiers: KeyModifiers) {
        match key {
            KeyCode::Esc => self.shutdown.request(),
            KeyCode::Char('c') if modifiers.contains(KeyModifiers::CONTROL) => {
                self.shutdown.request()
            }
            KeyCode::Char(c) => self.input.push(c),
            KeyCode::Backspace => {
                self.input.pop();
            }
            KeyCode::Enter => self.submit(),
            _ => {}
        }
    }

    fn submit(&mut self) {
        let line = std::mem::take(&mut self.input);
        if line.trim().is_empty() {
            return;
        }
        self.lines.push(format!("> {line}"));
        match control::execute_line(&self.engine, &line) {
            Ok(Outcome::Continue(reply)) => {
                for reply_line in reply {
                    self.lines.push(reply_line);
                }
            }
            Ok(Outcome::Quit) => self.shutdown.request(),
            Err(err) => self.lines.push(format!("ERROR: {err}")),
        }
        self.refresh_settings();
    }

    fn render(&self, frame: &mut Frame) {
        let area = frame.area();

        let chunks = Layout::default()
            .direction(Direction::Vertical)
            .constraints([
                Constraint::Length(3),  // Status bar
                Constraint::Min(8),     // Spectrum
                Constraint::Length(12), // Console
                Constraint::Length(3),  // Command input
                Constraint::Length(1),  // Help bar
            ])
            .split(area);

        let stats = AudioStats::from_buffer(&self.audio_buffer);
        render_status(frame, chunks[0], &self.status, &stats);

        render_spectrum(frame, chunks[1], self.spectrum.data());

        let console_block = Block::default().title(" Console ").borders(Borders::ALL);
        let visible = console_block.inner(chunks[2]).height as usize;
        let text: Vec<Line> = self
            .lines
            .tail(visible)
            .into_iter()
            .map(Line::from)
            .collect();
        frame.render_widget(Paragraph::new(text).block(console_block), chunks[2]);

        let input = Paragraph::new(format!("> {}", self.input))
            .block(Block::default().title(" Command ").borders(Borders::ALL));
        frame.render_widget(input, chunks[3]);

        let help = Paragraph::new(" [Enter] Run command  [Esc] Quit  type 'help' for commands")
            .style(Style::default().fg(Color::DarkGray));
        frame.render_widget(help, chunks[4]);
    }
}
