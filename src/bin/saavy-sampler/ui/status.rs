//! Status bar - engine settings, voice activity and output level

use ratatui::{
    layout::Rect,
    style::{Color, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Paragraph},
    Frame,
};

use saavy_sampler::SynthSettings;

/// Output level of the last scope window
pub struct AudioStats {
    pub peak: f32,
    pub rms: f32,
}

impl AudioStats {
    pub fn from_buffer(buffer: &[f32]) -> Self {
        if buffer.is_empty() {
            return Self { peak: 0.0, rms: 0.0 };
        }
        let peak = buffer.iter().fold(0.0f32, |acc, &x| acc.max(x.abs()));
        let rms = (buffer.iter().map(|&x| x * x).sum::<f32>() / buffer.len() as f32).sqrt();
        Self { peak, rms }
    }
}

/// What the status bar shows; refreshed from the engine by the console
pub struct StatusSnapshot {
    pub settings: SynthSettings,
    pub instrument: Option<String>,
    pub device: String,
    pub active_voices: usize,
    pub silenced_blocks: u64,
}

pub fn render_status(frame: &mut Frame, area: Rect, status: &StatusSnapshot, stats: &AudioStats) {
    let block = Block::default()
        .title(" saavy-sampler ")
        .borders(Borders::ALL);

    let settings = &status.settings;
    let instrument = status.instrument.as_deref().unwrap_or("no instrument");
    let voices_color = if status.active_voices >= settings.num_voices {
        Color::Red
    } else if status.active_voices > 0 {
        Color::Green
    } else {
        Color::DarkGray
    };

    let line = Line::from(vec![
        Span::styled(format!(" {instrument}  "), Style::default().fg(Color::Cyan)),
        Span::styled(
            format!("Voices {}/{}  ", status.active_voices, settings.num_voices),
            Style::default().fg(voices_color),
        ),
        Span::styled(
            format!(
                "{:.1}kHz  {} frames  {}  ",
                settings.sample_rate / 1000.0,
                settings.samples_per_block,
                settings.oversampling
            ),
            Style::default().fg(Color::DarkGray),
        ),
        Span::styled(
            format!("Gain {:+.1} dB  ", settings.volume_db),
            Style::default().fg(Color::White),
        ),
        Span::styled(
            format!("Peak: {:.2}  RMS: {:.2}  ", stats.peak, stats.rms),
            Style::default().fg(Color::Magenta),
        ),
        Span::styled(
            format!("Silenced: {}  ", status.silenced_blocks),
            Style::default().fg(if status.silenced_blocks > 0 {
                Color::Yellow
            } else {
                Color::DarkGray
            }),
        ),
        Span::styled(status.device.clone(), Style::default().fg(Color::DarkGray)),
    ]);

    let paragraph = Paragraph::new(line).block(block);
    frame.render_widget(paragraph, area);
}
