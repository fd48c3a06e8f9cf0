//! Spectrum analyzer widget
//!
//! FFT over the last scope window, read at log-spaced frequencies.

use ratatui::{
    layout::Rect,
    style::{Color, Style},
    symbols,
    widgets::{Axis, Block, Borders, Chart, Dataset, GraphType},
    Frame,
};
use rustfft::{num_complex::Complex, Fft, FftPlanner};
use std::sync::Arc;

/// Number of points drawn
const SPECTRUM_BINS: usize = 48;
/// Floor of the display range
const FLOOR_DB: f64 = -100.0;
/// Per-frame fall of each point, in dB, so peaks linger briefly
const FALL_DB: f64 = 3.0;

pub struct SpectrumAnalyzer {
    /// Hann window coefficients
    window: Vec<f32>,
    /// FFT bin read for each display point
    bin_indices: Vec<usize>,
    fft: Arc<dyn Fft<f32>>,
    scratch: Vec<Complex<f32>>,
    /// (log10 frequency, magnitude dB) per display point
    spectrum: Vec<(f64, f64)>,
}

impl SpectrumAnalyzer {
    pub fn new(window_len: usize, sample_rate: f32) -> Self {
        let window_len = window_len.max(2);
        let fft = FftPlanner::new().plan_fft_forward(window_len);

        let denom = (window_len - 1) as f32;
        let window = (0..window_len)
            .map(|i| 0.5 * (1.0 - (std::f32::consts::TAU * i as f32 / denom).cos()))
            .collect();

        // Log-spaced from 20 Hz to Nyquist (capped at 20 kHz)
        let max_freq = f64::from((sample_rate / 2.0).clamp(21.0, 20_000.0));
        let min_freq = 20.0_f64;
        let last_bin = window_len / 2 - 1;
        let mut bin_indices = Vec::with_capacity(SPECTRUM_BINS);
        let mut spectrum = Vec::with_capacity(SPECTRUM_BINS);
        for i in 0..SPECTRUM_BINS {
            let t = i as f64 / (SPECTRUM_BINS - 1) as f64;
            let freq = min_freq * (max_freq / min_freq).powf(t);
            let index = (freq * window_len as f64 / f64::from(sample_rate)).round() as usize;
            bin_indices.push(index.min(last_bin));
            spectrum.push((freq.log10(), FLOOR_DB));
        }

        Self {
            window,
            bin_indices,
            fft,
            scratch: vec![Complex::new(0.0, 0.0); window_len],
            spectrum,
        }
    }

    /// Analyze `buffer`, which must be exactly one window long.
    pub fn update(&mut self, buffer: &[f32]) {
        if buffer.len() != self.window.len() {
            return;
        }

        for ((slot, sample), w) in self.scratch.iter_mut().zip(buffer).zip(&self.window) {
            *slot = Complex::new(sample * w, 0.0);
        }
        self.fft.process(&mut self.scratch);

        // Normalize so a full-scale sine reads near 0 dB
        let norm = 2.0 / self.window.len() as f32;
        for (point, &index) in self.spectrum.iter_mut().zip(&self.bin_indices) {
            let bin = self.scratch[index] * norm;
            let power = f64::from(bin.norm_sqr()).max(1e-12);
            let db = (10.0 * power.log10()).max(FLOOR_DB);
            point.1 = db.max(point.1 - FALL_DB);
        }
    }

    pub fn data(&self) -> &[(f64, f64)] {
        &self.spectrum
    }
}

pub fn render_spectrum(frame: &mut Frame, area: Rect, spectrum: &[(f64, f64)]) {
    let block = Block::default()
        .title(" Spectrum ")
        .borders(Borders::ALL);

    let dataset = Dataset::default()
        .marker(symbols::Marker::Braille)
        .graph_type(GraphType::Line)
        .style(Style::default().fg(Color::Green))
        .data(spectrum);

    let (min_x, max_x) = match (spectrum.first(), spectrum.last()) {
        (Some(first), Some(last)) => (first.0, last.0.max(first.0 + 1.0)),
        _ => (1.0, 4.0),
    };

    let chart = Chart::new(vec![dataset])
        .block(block)
        .x_axis(
            Axis::default()
                .bounds([min_x, max_x])
                .labels(vec!["20", "200", "2k", "20k"])
                .style(Style::default().fg(Color::DarkGray)),
        )
        .y_axis(
            Axis::default()
                .bounds([FLOOR_DB, 6.0])
                .labels(vec!["-100", "-60", "-20", "0"])
                .style(Style::default().fg(Color::DarkGray)),
        );

    frame.render_widget(chart, area);
}
