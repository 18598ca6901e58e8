//! Audio file I/O for Sonodream
//!
//! Decodes WAV files into mono [`Waveform`]s at the dream sample rate and
//! writes results back as peak-normalized WAV files.
//!
//! Sample rate conversion uses linear interpolation.

use std::path::{Path, PathBuf};

use hound::{SampleFormat, WavReader, WavSpec, WavWriter};
use log::debug;

use crate::engine::buffer::Waveform;
use crate::error::{DreamError, Result};

/// Peak level written files are normalized to
const NORMALIZED_PEAK: f32 = 0.999;

/// Export format configuration
#[derive(Debug, Clone)]
pub struct ExportFormat {
    /// Bit depth: 16, 24, or 32 (default: 16)
    pub bit_depth: u16,
    /// Scale the output so its peak sits just below full scale
    pub normalize: bool,
}

impl Default for ExportFormat {
    fn default() -> Self {
        ExportFormat {
            bit_depth: 16,
            normalize: true,
        }
    }
}

/// Decode a WAV file into a mono waveform at `target_rate`
///
/// Multi-channel files are mixed down by averaging the channels.
///
/// # Arguments
/// * `path` - Path to the WAV file
/// * `target_rate` - Sample rate of the returned waveform
///
/// # Errors
/// * `FileNotFound` - If the file does not exist
/// * `InvalidAudio` - If the file is not a valid WAV file
/// * `UnsupportedFormat` - If the bit depth is not supported
/// * `EmptyAudio` - If the file contains no samples
pub fn load_audio(path: &Path, target_rate: u32) -> Result<Waveform> {
    if !path.exists() {
        return Err(DreamError::FileNotFound {
            path: path.display().to_string(),
            source: None,
        });
    }

    let reader = WavReader::open(path).map_err(|e| DreamError::InvalidAudio {
        reason: format!("Failed to open WAV file: {}", e),
        source: Some(Box::new(e)),
    })?;

    let spec = reader.spec();
    let channels = spec.channels.max(1) as usize;
    let interleaved = read_samples_as_f32(reader, spec.bits_per_sample, spec.sample_format)?;
    let mono = mix_to_mono(&interleaved, channels);

    debug!(
        "Decoded {}: {} Hz, {} channel(s), {} frames",
        path.display(),
        spec.sample_rate,
        channels,
        mono.len()
    );

    let samples = if spec.sample_rate != target_rate {
        resample_linear(&mono, target_rate as f64 / spec.sample_rate as f64)
    } else {
        mono
    };

    Waveform::new(samples, target_rate)
}

/// Write a waveform to a mono WAV file
///
/// # Errors
/// * `UnsupportedFormat` - If the bit depth is not 16, 24 or 32
/// * `Io` - If the file cannot be written
pub fn save_audio(wave: &Waveform, path: &Path, format: &ExportFormat) -> Result<()> {
    // Checked before the writer exists so a bad depth leaves no file behind
    if !matches!(format.bit_depth, 16 | 24 | 32) {
        return Err(unsupported_depth(format.bit_depth));
    }

    let gain = if format.normalize {
        let peak = wave.peak();
        if peak > 0.0 {
            NORMALIZED_PEAK / peak
        } else {
            1.0
        }
    } else {
        1.0
    };

    let spec = WavSpec {
        channels: 1,
        sample_rate: wave.sample_rate(),
        bits_per_sample: format.bit_depth,
        sample_format: if format.bit_depth == 32 {
            SampleFormat::Float
        } else {
            SampleFormat::Int
        },
    };

    let mut writer = WavWriter::create(path, spec).map_err(hound_to_io)?;
    let samples = wave.samples().iter().map(|&s| s * gain);

    match format.bit_depth {
        16 => {
            for sample in samples {
                let scaled = (sample * 32767.0).clamp(-32768.0, 32767.0) as i16;
                writer.write_sample(scaled).map_err(hound_to_io)?;
            }
        }
        24 => {
            for sample in samples {
                let scaled = (sample * 8388607.0).clamp(-8388608.0, 8388607.0) as i32;
                writer.write_sample(scaled).map_err(hound_to_io)?;
            }
        }
        32 => {
            for sample in samples {
                writer.write_sample(sample).map_err(hound_to_io)?;
            }
        }
        depth => return Err(unsupported_depth(depth)),
    }

    writer.finalize().map_err(hound_to_io)?;
    Ok(())
}

/// Output file path `{dir}/{base_name}_{index}.wav`
pub fn output_path(dir: &Path, base_name: &str, index: usize) -> PathBuf {
    dir.join(format!("{}_{}.wav", base_name, index))
}

// ============================================================================
// Internal helper functions
// ============================================================================

fn unsupported_depth(bit_depth: u16) -> DreamError {
    DreamError::UnsupportedFormat {
        format: format!("{}-bit audio (only 16, 24, 32 supported)", bit_depth),
    }
}

fn hound_to_io(e: hound::Error) -> DreamError {
    match e {
        hound::Error::IoError(io) => DreamError::Io(io),
        other => DreamError::Io(std::io::Error::new(
            std::io::ErrorKind::Other,
            other.to_string(),
        )),
    }
}

/// Read samples from WAV reader and convert to f32
fn read_samples_as_f32<R: std::io::Read>(
    mut reader: WavReader<R>,
    bits_per_sample: u16,
    sample_format: SampleFormat,
) -> Result<Vec<f32>> {
    let invalid = |e: hound::Error| DreamError::InvalidAudio {
        reason: format!("Failed to read {}-bit samples: {}", bits_per_sample, e),
        source: Some(Box::new(e)),
    };

    match sample_format {
        SampleFormat::Float => reader
            .samples::<f32>()
            .collect::<std::result::Result<Vec<f32>, _>>()
            .map_err(invalid),
        SampleFormat::Int => {
            let scale = match bits_per_sample {
                8 => 128.0,
                16 => 32768.0,
                24 => 8388608.0,
                32 => 2147483648.0,
                _ => {
                    return Err(DreamError::UnsupportedFormat {
                        format: format!("{}-bit integer audio", bits_per_sample),
                    })
                }
            };
            reader
                .samples::<i32>()
                .map(|s| s.map(|v| v as f32 / scale))
                .collect::<std::result::Result<Vec<f32>, _>>()
                .map_err(invalid)
        }
    }
}

/// Average interleaved frames down to one channel
fn mix_to_mono(interleaved: &[f32], channels: usize) -> Vec<f32> {
    if channels == 1 {
        return interleaved.to_vec();
    }
    interleaved
        .chunks_exact(channels)
        .map(|frame| frame.iter().sum::<f32>() / channels as f32)
        .collect()
}

/// Linear interpolation resampling
fn resample_linear(samples: &[f32], ratio: f64) -> Vec<f32> {
    if samples.is_empty() {
        return Vec::new();
    }

    let source_len = samples.len();
    let target_len = ((source_len as f64) * ratio).ceil() as usize;
    let mut output = Vec::with_capacity(target_len);

    for i in 0..target_len {
        let src_pos = i as f64 / ratio;
        let src_idx = src_pos.floor() as usize;
        let frac = (src_pos - src_idx as f64) as f32;

        let sample = if src_idx + 1 < source_len {
            samples[src_idx] * (1.0 - frac) + samples[src_idx + 1] * frac
        } else if src_idx < source_len {
            samples[src_idx]
        } else {
            0.0
        };

        output.push(sample);
    }

    output
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::buffer::{generate_test_tone, DREAM_SAMPLE_RATE};
    use tempfile::tempdir;

    #[test]
    fn test_mix_to_mono() {
        let interleaved = vec![1.0, 0.0, 0.5, 0.5, -1.0, 1.0];
        assert_eq!(mix_to_mono(&interleaved, 2), vec![0.5, 0.5, 0.0]);
    }

    #[test]
    fn test_resample_linear_upsample() {
        let samples = vec![0.0, 1.0, 0.0];
        let resampled = resample_linear(&samples, 2.0);
        assert_eq!(resampled.len(), 6);
        assert!((resampled[1] - 0.5).abs() < 0.01);
    }

    #[test]
    fn test_round_trip_float_without_normalization() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("tone.wav");
        let original = generate_test_tone(440.0, 0.25, 0.2, DREAM_SAMPLE_RATE).unwrap();

        let format = ExportFormat {
            bit_depth: 32,
            normalize: false,
        };
        save_audio(&original, &path, &format).unwrap();
        let loaded = load_audio(&path, DREAM_SAMPLE_RATE).unwrap();

        assert_eq!(loaded.len(), original.len());
        for (a, b) in original.samples().iter().zip(loaded.samples()) {
            assert!((a - b).abs() < 1e-6);
        }
    }

    #[test]
    fn test_save_normalizes_peak() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("quiet.wav");
        let original = generate_test_tone(220.0, 0.1, 0.2, DREAM_SAMPLE_RATE).unwrap();

        save_audio(&original, &path, &ExportFormat::default()).unwrap();
        let loaded = load_audio(&path, DREAM_SAMPLE_RATE).unwrap();

        assert!((loaded.peak() - NORMALIZED_PEAK).abs() < 0.01);
    }

    #[test]
    fn test_stereo_file_is_mixed_down_and_resampled() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("stereo.wav");
        let spec = WavSpec {
            channels: 2,
            sample_rate: 32000,
            bits_per_sample: 16,
            sample_format: SampleFormat::Int,
        };
        let mut writer = WavWriter::create(&path, spec).unwrap();
        for _ in 0..3200 {
            writer.write_sample(16384i16).unwrap();
            writer.write_sample(0i16).unwrap();
        }
        writer.finalize().unwrap();

        let loaded = load_audio(&path, DREAM_SAMPLE_RATE).unwrap();
        assert_eq!(loaded.sample_rate(), DREAM_SAMPLE_RATE);
        assert_eq!(loaded.len(), 1600);
        assert!((loaded.samples()[10] - 0.25).abs() < 1e-3);
    }

    #[test]
    fn test_unsupported_bit_depth_writes_nothing() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("eight_bit.wav");
        let wave = generate_test_tone(440.0, 0.5, 0.1, DREAM_SAMPLE_RATE).unwrap();
        let format = ExportFormat {
            bit_depth: 8,
            normalize: true,
        };

        assert!(matches!(
            save_audio(&wave, &path, &format),
            Err(DreamError::UnsupportedFormat { .. })
        ));
        assert!(!path.exists());
    }

    #[test]
    fn test_load_nonexistent_file() {
        let result = load_audio(Path::new("/nonexistent/path/audio.wav"), DREAM_SAMPLE_RATE);
        match result.unwrap_err() {
            DreamError::FileNotFound { path, .. } => assert!(path.contains("nonexistent")),
            other => panic!("Expected FileNotFound error, got: {:?}", other),
        }
    }

    #[test]
    fn test_output_path_naming() {
        let path = output_path(Path::new("."), "audio", 3);
        assert_eq!(path, Path::new("./audio_3.wav"));
    }
}
