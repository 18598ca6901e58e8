//! Waveform buffer
//!
//! Mono 32-bit float audio at a fixed sample rate. The dream pipeline only
//! ever works on a single channel: multi-channel input is mixed down on
//! import (see [`crate::engine::io`]).

use crate::error::{DreamError, Result};

// ============================================================================
// Constants
// ============================================================================

/// Sample rate every clip is converted to on import (LibriSpeech rate)
pub const DREAM_SAMPLE_RATE: u32 = 16000;

/// Threshold below which audio is considered silent (-80dBFS)
pub const SILENCE_THRESHOLD_DB: f32 = -80.0;

// ============================================================================
// Helper Functions
// ============================================================================

/// Convert linear amplitude to decibels
///
/// # Returns
/// Value in decibels. Returns -f32::INFINITY for zero input.
#[inline]
pub fn linear_to_db(linear: f32) -> f32 {
    if linear <= 0.0 {
        f32::NEG_INFINITY
    } else {
        20.0 * linear.log10()
    }
}

// ============================================================================
// Waveform
// ============================================================================

/// Mono audio clip
///
/// Created once per input and treated as immutable by the pipeline: the
/// spectral codec reads it, and reconstruction produces a new `Waveform`.
///
/// # Example
/// ```
/// use sonodream::engine::buffer::{Waveform, DREAM_SAMPLE_RATE};
///
/// let wave = Waveform::new(vec![0.0; 1600], DREAM_SAMPLE_RATE).unwrap();
/// assert_eq!(wave.len(), 1600);
/// assert!((wave.duration_secs() - 0.1).abs() < 1e-9);
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct Waveform {
    samples: Vec<f32>,
    sample_rate: u32,
}

impl Waveform {
    /// Wrap samples recorded at `sample_rate`
    ///
    /// # Errors
    /// * `EmptyAudio` - If `samples` is empty
    /// * `InvalidAudio` - If the sample rate is zero or a sample is NaN/Inf
    pub fn new(samples: Vec<f32>, sample_rate: u32) -> Result<Self> {
        if samples.is_empty() {
            return Err(DreamError::EmptyAudio);
        }
        if sample_rate == 0 {
            return Err(DreamError::InvalidAudio {
                reason: "sample rate must be positive".to_string(),
                source: None,
            });
        }
        if let Some(pos) = samples.iter().position(|s| !s.is_finite()) {
            return Err(DreamError::InvalidAudio {
                reason: format!("non-finite sample at index {}", pos),
                source: None,
            });
        }
        Ok(Self {
            samples,
            sample_rate,
        })
    }

    #[inline]
    pub fn samples(&self) -> &[f32] {
        &self.samples
    }

    pub fn into_samples(self) -> Vec<f32> {
        self.samples
    }

    #[inline]
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Number of samples
    #[inline]
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Duration in seconds
    pub fn duration_secs(&self) -> f64 {
        self.samples.len() as f64 / self.sample_rate as f64
    }

    /// Largest absolute sample value
    pub fn peak(&self) -> f32 {
        self.samples.iter().map(|s| s.abs()).fold(0.0_f32, f32::max)
    }

    /// RMS level in dB. Returns -f32::INFINITY for digital silence.
    pub fn rms_db(&self) -> f32 {
        let sum_squares: f64 = self.samples.iter().map(|&s| (s as f64) * (s as f64)).sum();
        let rms = (sum_squares / self.samples.len() as f64).sqrt() as f32;
        linear_to_db(rms)
    }

    /// Whether the clip is below the silence threshold
    pub fn is_silent(&self) -> bool {
        self.rms_db() < SILENCE_THRESHOLD_DB
    }
}

/// Generate a test tone (sine wave)
///
/// # Arguments
/// * `frequency` - Frequency of the sine wave in Hz
/// * `amplitude` - Peak amplitude
/// * `duration_secs` - Duration of the tone in seconds
/// * `sample_rate` - Sample rate in Hz
pub fn generate_test_tone(
    frequency: f32,
    amplitude: f32,
    duration_secs: f32,
    sample_rate: u32,
) -> Result<Waveform> {
    let num_samples = (duration_secs * sample_rate as f32) as usize;
    let angular_freq = 2.0 * std::f32::consts::PI * frequency / sample_rate as f32;
    let samples = (0..num_samples)
        .map(|i| amplitude * (angular_freq * i as f32).sin())
        .collect();
    Waveform::new(samples, sample_rate)
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_waveform_rejected() {
        assert!(matches!(
            Waveform::new(Vec::new(), DREAM_SAMPLE_RATE),
            Err(DreamError::EmptyAudio)
        ));
    }

    #[test]
    fn test_non_finite_rejected() {
        let result = Waveform::new(vec![0.0, f32::NAN], DREAM_SAMPLE_RATE);
        assert!(matches!(result, Err(DreamError::InvalidAudio { .. })));
    }

    #[test]
    fn test_generate_test_tone() {
        let wave = generate_test_tone(440.0, 0.5, 1.0, DREAM_SAMPLE_RATE).unwrap();
        assert_eq!(wave.len(), DREAM_SAMPLE_RATE as usize);
        assert!((wave.peak() - 0.5).abs() < 1e-3);
        assert!(!wave.is_silent());
    }

    #[test]
    fn test_silence_detection() {
        let wave = Waveform::new(vec![0.0; 100], DREAM_SAMPLE_RATE).unwrap();
        assert!(wave.is_silent());
        assert_eq!(wave.rms_db(), f32::NEG_INFINITY);
    }
}
