//! Instrument loading. Runs on the control plane only: it reads files,
//! allocates and logs freely.
//!
//! `.json` files are native patches. With the `wav-import` feature a bare
//! `.wav` file is imported as a one-region instrument spanning the whole
//! keyboard.

use std::collections::HashMap;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use super::{
    EnvelopeDescriptor, Instrument, Patch, Region, RegionDescriptor, RegionSource,
    SampleData, SourceDescriptor,
};

#[derive(thiserror::Error, Debug)]
pub enum LoadError {
    #[error("could not read {path}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid patch description")]
    Json(#[from] serde_json::Error),
    #[cfg(feature = "wav-import")]
    #[error("could not decode {path}")]
    Wav {
        path: PathBuf,
        #[source]
        source: hound::Error,
    },
    #[error("unsupported instrument format '{0}'")]
    UnsupportedFormat(String),
    #[error("region {index}: {reason}")]
    InvalidRegion { index: usize, reason: String },
    #[error("the instrument has no regions")]
    Empty,
}

/// Summary of a successful load, for the console.
#[derive(Debug, Clone, PartialEq)]
pub struct LoadReport {
    pub path: PathBuf,
    pub name: String,
    pub regions: usize,
    pub curves: usize,
    pub preloaded_samples: usize,
    /// Set when the file was converted from a foreign format.
    pub import_format: Option<&'static str>,
}

impl fmt::Display for LoadReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Instrument loaded: {}", self.path.display())?;
        writeln!(f, "===========================")?;
        writeln!(f, "Name: {}", self.name)?;
        writeln!(f, "Regions: {}", self.regions)?;
        writeln!(f, "Curves: {}", self.curves)?;
        write!(f, "Preloaded samples: {}", self.preloaded_samples)?;
        if let Some(format) = self.import_format {
            write!(f, "\nImport format: {format}")?;
        }
        Ok(())
    }
}

/// Load a patch or import a foreign file, depending on the extension.
pub fn load_instrument(path: &Path) -> Result<(Instrument, LoadReport), LoadError> {
    let extension = path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(str::to_ascii_lowercase)
        .unwrap_or_default();

    let (instrument, samples, import_format) = match extension.as_str() {
        "json" => {
            let text = fs::read_to_string(path).map_err(|source| LoadError::Io {
                path: path.to_path_buf(),
                source,
            })?;
            let patch: Patch = serde_json::from_str(&text)?;
            let base = path.parent().unwrap_or_else(|| Path::new("."));
            let (instrument, samples) = build_instrument(patch, base)?;
            (instrument, samples, None)
        }
        "wav" => {
            let (instrument, samples) = import_wav(path)?;
            (instrument, samples, Some("wav"))
        }
        other => return Err(LoadError::UnsupportedFormat(other.to_string())),
    };

    let report = LoadReport {
        path: path.to_path_buf(),
        name: instrument.name.clone(),
        regions: instrument.regions.len(),
        curves: instrument.curves.len(),
        preloaded_samples: samples,
        import_format,
    };
    Ok((instrument, report))
}

/// Validate a patch and resolve its sample files against `base`. Returns the
/// instrument and the number of distinct sample files read.
pub fn build_instrument(patch: Patch, base: &Path) -> Result<(Instrument, usize), LoadError> {
    if patch.regions.is_empty() {
        return Err(LoadError::Empty);
    }

    let mut samples: HashMap<PathBuf, Arc<SampleData>> = HashMap::new();
    let mut regions = Vec::with_capacity(patch.regions.len());

    for (index, descriptor) in patch.regions.iter().enumerate() {
        check_region(descriptor).map_err(|reason| LoadError::InvalidRegion { index, reason })?;

        let source = match &descriptor.source {
            SourceDescriptor::Oscillator { waveform } => RegionSource::Oscillator(*waveform),
            SourceDescriptor::Sample { path } => {
                let full = base.join(path);
                let data = match samples.get(&full) {
                    Some(data) => Arc::clone(data),
                    None => {
                        let data = Arc::new(read_sample(&full)?);
                        samples.insert(full, Arc::clone(&data));
                        data
                    }
                };
                RegionSource::Sample(data)
            }
        };

        regions.push(Region {
            keys: descriptor.lokey..=descriptor.hikey,
            velocities: descriptor.lovel..=descriptor.hivel,
            keycenter: descriptor.pitch_keycenter,
            gain: 10.0_f32.powf(descriptor.volume_db / 20.0),
            source,
            amplitude_envelope: Arc::new(descriptor.amplitude_envelope.to_description()),
        });
    }

    let instrument = Instrument {
        name: patch.name,
        regions,
        curves: patch.curves,
    };
    Ok((instrument, samples.len()))
}

fn check_region(region: &RegionDescriptor) -> Result<(), String> {
    if region.hikey > 127 || region.hivel > 127 || region.pitch_keycenter > 127 {
        return Err("key, velocity and keycenter must be MIDI values".into());
    }
    if region.lokey > region.hikey {
        return Err(format!("empty key range {}..={}", region.lokey, region.hikey));
    }
    if region.lovel > region.hivel {
        return Err(format!(
            "empty velocity range {}..={}",
            region.lovel, region.hivel
        ));
    }
    if !region.volume_db.is_finite() {
        return Err("volume must be finite".into());
    }
    region.amplitude_envelope.to_description().validate()
}

fn import_wav(path: &Path) -> Result<(Instrument, usize), LoadError> {
    let data = Arc::new(read_sample(path)?);
    let name = path
        .file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_default();
    let amplitude_envelope = Arc::new(EnvelopeDescriptor::default().to_description());

    let instrument = Instrument {
        name,
        regions: vec![Region {
            keys: 0..=127,
            velocities: 1..=127,
            keycenter: 60,
            gain: 1.0,
            source: RegionSource::Sample(data),
            amplitude_envelope,
        }],
        curves: Vec::new(),
    };
    Ok((instrument, 1))
}

#[cfg(feature = "wav-import")]
fn read_sample(path: &Path) -> Result<SampleData, LoadError> {
    let wav_error = |source| LoadError::Wav {
        path: path.to_path_buf(),
        source,
    };

    let mut reader = hound::WavReader::open(path).map_err(wav_error)?;
    let spec = reader.spec();
    let interleaved: Vec<f32> = match spec.sample_format {
        hound::SampleFormat::Float => reader
            .samples::<f32>()
            .collect::<Result<_, _>>()
            .map_err(wav_error)?,
        hound::SampleFormat::Int => {
            let scale = 1.0 / (1_i64 << (spec.bits_per_sample.clamp(1, 32) - 1)) as f32;
            reader
                .samples::<i32>()
                .map(|sample| sample.map(|value| value as f32 * scale))
                .collect::<Result<_, _>>()
                .map_err(wav_error)?
        }
    };

    let source_channels = usize::from(spec.channels.max(1));
    let kept = source_channels.min(2);
    let mut channels = vec![Vec::with_capacity(interleaved.len() / source_channels); kept];
    for frame in interleaved.chunks_exact(source_channels) {
        for (channel, samples) in channels.iter_mut().enumerate() {
            samples.push(frame[channel]);
        }
    }

    log::debug!(
        "read {} ({} frames, {} channels, {} Hz)",
        path.display(),
        channels.first().map_or(0, Vec::len),
        source_channels,
        spec.sample_rate
    );

    Ok(SampleData {
        channels,
        sample_rate: spec.sample_rate as f32,
    })
}

#[cfg(not(feature = "wav-import"))]
fn read_sample(_path: &Path) -> Result<SampleData, LoadError> {
    Err(LoadError::UnsupportedFormat("wav".into()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_path(name: &str) -> PathBuf {
        std::env::temp_dir().join(format!("saavy-sampler-{}-{name}", std::process::id()))
    }

    #[test]
    fn loads_a_json_patch_with_oscillator_regions() {
        let path = temp_path("osc.json");
        fs::write(
            &path,
            r#"{
                "name": "Two layers",
                "regions": [
                    { "hikey": 59, "source": { "type": "oscillator", "waveform": "sine" } },
                    { "lokey": 60, "volume_db": -6.0,
                      "source": { "type": "oscillator", "waveform": "saw" } }
                ],
                "curves": [ { "points": [[0, 0.0], [127, 1.0]] } ]
            }"#,
        )
        .unwrap();

        let (instrument, report) = load_instrument(&path).unwrap();
        fs::remove_file(&path).ok();

        assert_eq!(report.regions, 2);
        assert_eq!(report.curves, 1);
        assert_eq!(report.preloaded_samples, 0);
        assert_eq!(report.import_format, None);
        assert_eq!(instrument.regions_for(40, 100).collect::<Vec<_>>(), vec![0]);
        assert_eq!(instrument.regions_for(72, 100).collect::<Vec<_>>(), vec![1]);
        assert!((instrument.regions[1].gain - 0.501).abs() < 1e-3);
    }

    #[test]
    fn rejects_bad_input_with_typed_errors() {
        let missing = temp_path("missing.json");
        assert!(matches!(
            load_instrument(&missing),
            Err(LoadError::Io { .. })
        ));
        assert!(matches!(
            load_instrument(Path::new("piano.sfz")),
            Err(LoadError::UnsupportedFormat(ext)) if ext == "sfz"
        ));

        let path = temp_path("inverted.json");
        fs::write(
            &path,
            r#"{ "name": "bad", "regions": [
                { "lokey": 80, "hikey": 20, "source": { "type": "oscillator", "waveform": "sine" } }
            ] }"#,
        )
        .unwrap();
        let result = load_instrument(&path);
        fs::remove_file(&path).ok();
        assert!(matches!(
            result,
            Err(LoadError::InvalidRegion { index: 0, .. })
        ));
    }

    #[test]
    fn empty_patches_are_refused() {
        let patch = Patch {
            name: "empty".into(),
            description: None,
            regions: Vec::new(),
            curves: Vec::new(),
        };
        assert!(matches!(
            build_instrument(patch, Path::new(".")),
            Err(LoadError::Empty)
        ));
    }

    #[cfg(feature = "wav-import")]
    fn write_wav(path: &Path, channels: u16, frames: usize) {
        let spec = hound::WavSpec {
            channels,
            sample_rate: 44_100,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut writer = hound::WavWriter::create(path, spec).unwrap();
        for frame in 0..frames {
            for channel in 0..channels {
                let value = if channel == 0 { 16_384 } else { -16_384 };
                writer.write_sample((value * (frame % 2) as i32) as i16).unwrap();
            }
        }
        writer.finalize().unwrap();
    }

    #[cfg(feature = "wav-import")]
    #[test]
    fn imports_a_wav_file_as_a_single_region() {
        let path = temp_path("import.wav");
        write_wav(&path, 2, 100);

        let (instrument, report) = load_instrument(&path).unwrap();
        fs::remove_file(&path).ok();

        assert_eq!(report.import_format, Some("wav"));
        assert_eq!(report.regions, 1);
        assert_eq!(report.preloaded_samples, 1);
        assert!(report.to_string().contains("Import format: wav"));

        let RegionSource::Sample(data) = &instrument.regions[0].source else {
            panic!("expected a sample region");
        };
        assert_eq!(data.channels.len(), 2);
        assert_eq!(data.num_frames(), 100);
        assert_eq!(data.sample_rate, 44_100.0);
        assert!((data.channels[0][1] - 0.5).abs() < 1e-4);
        assert!((data.channels[1][1] + 0.5).abs() < 1e-4);
    }

    #[cfg(feature = "wav-import")]
    #[test]
    fn shared_sample_files_are_read_once() {
        let dir = std::env::temp_dir();
        let wav = temp_path("shared.wav");
        write_wav(&wav, 1, 32);
        let file_name = wav.file_name().unwrap().to_string_lossy().into_owned();

        let patch: Patch = serde_json::from_str(&format!(
            r#"{{ "name": "shared", "regions": [
                {{ "hikey": 60, "source": {{ "type": "sample", "path": "{file_name}" }} }},
                {{ "lokey": 61, "source": {{ "type": "sample", "path": "{file_name}" }} }}
            ] }}"#
        ))
        .unwrap();
        let result = build_instrument(patch, &dir);
        fs::remove_file(&wav).ok();

        let (instrument, samples) = result.unwrap();
        assert_eq!(samples, 1);
        assert_eq!(instrument.regions.len(), 2);
    }
}
