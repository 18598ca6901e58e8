//! Spectral codec
//!
//! Encodes a waveform into a bounded two-channel image-like [`Tensor`]
//! (compressed magnitude, phase angle) and decodes an optimized tensor back
//! into audio.
//!
//! The encoding is deliberately lossy: decoding needs the
//! [`InversionContext`] produced by the forward pass (the magnitude
//! normalizer and the original phase). Only the magnitude channel of the
//! tensor is used on the way back; the phase channel is along for the ride
//! so the classifier sees both.

use log::{debug, warn};
use rustfft::num_complex::Complex64;
use serde::{Deserialize, Serialize};

use crate::engine::buffer::{Waveform, DREAM_SAMPLE_RATE};
use crate::error::{DreamError, Result};
use crate::spectral::stft::{ComplexSpectrogram, Stft};
use crate::tensor::Tensor;

/// Order of the magnitude power compression
///
/// Forward raises magnitudes to `1 / MAGNITUDE_NONLINEARITY`, inverse raises
/// them back to `MAGNITUDE_NONLINEARITY`.
pub const MAGNITUDE_NONLINEARITY: f32 = 8.0;

/// Numeric range each channel is rescaled into
pub const CHANNEL_RANGE: f32 = 255.0;

/// Offset the perceptual inverse adds before renormalizing magnitudes
const PERCEPTUAL_OFFSET: f32 = 127.5;

/// Half-width of the range the perceptual inverse stretches audio into
/// before the hard clip
const PERCEPTUAL_SPREAD: f32 = 8.0;

/// Default window (and FFT) size
pub const DEFAULT_WINDOW_SIZE: usize = 512;

/// Default hop length (a quarter window)
pub const DEFAULT_HOP_LENGTH: usize = 128;

/// How the magnitude channel and waveform are denormalized on decode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum InverseMode {
    /// Offset-and-max renormalization of the magnitude channel followed by
    /// min-max stretching of the waveform into [-4, 4] and a hard clip to
    /// [-1, 1]. Loud, saturated, and insensitive to how far the ascent
    /// pushed the representation.
    #[default]
    Perceptual,
    /// Algebraic inverse of the forward rescale with only the final clip.
    /// Reproduces the input waveform when the representation is unchanged.
    Exact,
}

/// Spectral codec settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CodecConfig {
    /// Window size, also used as FFT size
    pub window_size: usize,
    /// Hop between consecutive frames
    pub hop_length: usize,
    /// Sample rate audio is decoded at
    pub sample_rate: u32,
    /// Denormalization used by [`SpectralCodec::inverse`]
    pub inverse_mode: InverseMode,
}

impl Default for CodecConfig {
    fn default() -> Self {
        Self {
            window_size: DEFAULT_WINDOW_SIZE,
            hop_length: DEFAULT_HOP_LENGTH,
            sample_rate: DREAM_SAMPLE_RATE,
            inverse_mode: InverseMode::default(),
        }
    }
}

/// Everything besides the representation needed to decode it
#[derive(Debug, Clone)]
pub struct InversionContext {
    /// Largest compressed magnitude seen by the forward pass
    pub mag_max_value: f32,
    /// Unit-modulus phase of the original spectrum
    pub phase: ComplexSpectrogram,
    /// Length of the encoded waveform in samples
    pub num_samples: usize,
}

/// Output of [`SpectralCodec::forward`]
#[derive(Debug, Clone)]
pub struct EncodedSpectrogram {
    /// `2 × bins × frames`: channel 0 magnitude, channel 1 phase. Row 0 is
    /// the highest frequency bin.
    pub representation: Tensor,
    pub context: InversionContext,
}

/// Forward and inverse spectral transform
#[derive(Debug)]
pub struct SpectralCodec {
    config: CodecConfig,
    stft: Stft,
}

impl SpectralCodec {
    pub fn new(config: CodecConfig) -> Result<Self> {
        let stft = Stft::new(config.window_size, config.hop_length)?;
        Ok(Self { config, stft })
    }

    pub fn config(&self) -> &CodecConfig {
        &self.config
    }

    /// Encode a waveform
    ///
    /// Magnitudes are compressed with a `1/8` power and mapped linearly so
    /// the loudest bin lands at `1 - 255` and silence at `1`; phase angles in
    /// `(-π, π]` map linearly onto `(-255, 255]`.
    ///
    /// # Errors
    /// `DegenerateInput` if the clip has no spectral energy (the magnitude
    /// normalizer would be zero).
    pub fn forward(&self, wave: &Waveform) -> Result<EncodedSpectrogram> {
        let spectrum = self.stft.forward(wave.samples())?;
        let bins = spectrum.bins();
        let frames = spectrum.frames();
        let exponent = 1.0 / MAGNITUDE_NONLINEARITY as f64;

        let mut compressed = Vec::with_capacity(bins * frames);
        let mut phase = ComplexSpectrogram::zeros(bins, frames);
        let mut angles = Vec::with_capacity(bins * frames);

        for bin in 0..bins {
            for frame in 0..frames {
                let value = spectrum.get(bin, frame);
                let magnitude = value.norm();
                let unit = if magnitude > 0.0 {
                    value / magnitude
                } else {
                    Complex64::new(1.0, 0.0)
                };
                phase.set(bin, frame, unit);
                angles.push(unit.arg());
                compressed.push(magnitude.powf(exponent));
            }
        }

        let mag_max = compressed.iter().copied().fold(0.0f64, f64::max);
        if !(mag_max > 0.0) || !mag_max.is_finite() {
            return Err(DreamError::DegenerateInput {
                reason: "input has no spectral energy (maximum magnitude is zero)".to_string(),
            });
        }

        let range = CHANNEL_RANGE as f64;
        let magnitude_plane: Vec<f32> = compressed
            .iter()
            .map(|&c| (1.0 - c / mag_max * range) as f32)
            .collect();
        let phase_plane: Vec<f32> = angles
            .iter()
            .map(|&a| (a / std::f64::consts::PI * range) as f32)
            .collect();

        let representation = Tensor::stack(&[magnitude_plane, phase_plane], bins, frames)?
            .flip_vertical();

        debug!(
            "Encoded {} samples into {}x{} representation (mag max {:.4})",
            wave.len(),
            bins,
            frames,
            mag_max
        );

        Ok(EncodedSpectrogram {
            representation,
            context: InversionContext {
                mag_max_value: mag_max as f32,
                phase,
                num_samples: wave.len(),
            },
        })
    }

    /// Decode a (possibly optimized) representation back into audio
    ///
    /// Only channel 0 is read; it is recombined with the original phase from
    /// `context`. The output is always clipped to [-1, 1]: energy the ascent
    /// pushed out of range is dropped at this point, not reported.
    ///
    /// # Errors
    /// * `ShapeMismatch` - If the representation does not match the phase grid
    /// * `DegenerateInput` - If the perceptual renormalizer is zero
    pub fn inverse(
        &self,
        representation: &Tensor,
        context: &InversionContext,
        sample_rate: u32,
    ) -> Result<Waveform> {
        let (channels, height, width) = representation.shape();
        let bins = context.phase.bins();
        let frames = context.phase.frames();
        if channels == 0 || height != bins || width != frames {
            return Err(DreamError::ShapeMismatch {
                expected: (2, bins, frames),
                actual: representation.shape(),
            });
        }

        let upright = representation.flip_vertical();
        let magnitude_plane = upright.channel(0);
        let mag_max = context.mag_max_value;

        let compressed: Vec<f32> = match self.config.inverse_mode {
            InverseMode::Perceptual => {
                let peak = magnitude_plane
                    .iter()
                    .map(|&m| m + PERCEPTUAL_OFFSET)
                    .fold(f32::NEG_INFINITY, f32::max);
                if peak.abs() <= f32::EPSILON || !peak.is_finite() {
                    return Err(DreamError::DegenerateInput {
                        reason: format!("magnitude channel peak is {}", peak),
                    });
                }
                magnitude_plane
                    .iter()
                    .map(|&m| (1.0 - (m + PERCEPTUAL_OFFSET) / peak) * mag_max)
                    .collect()
            }
            InverseMode::Exact => magnitude_plane
                .iter()
                .map(|&m| (1.0 - m) / CHANNEL_RANGE * mag_max)
                .collect(),
        };

        let mut spectrum = ComplexSpectrogram::zeros(bins, frames);
        for bin in 0..bins {
            for frame in 0..frames {
                let c = compressed[bin * frames + frame].max(0.0) as f64;
                let magnitude = c.powf(MAGNITUDE_NONLINEARITY as f64);
                spectrum.set(bin, frame, context.phase.get(bin, frame) * magnitude);
            }
        }

        let mut samples = self.stft.inverse(&spectrum, context.num_samples)?;

        if self.config.inverse_mode == InverseMode::Perceptual {
            stretch_to_spread(&mut samples);
        }
        for s in &mut samples {
            *s = s.clamp(-1.0, 1.0);
        }

        Waveform::new(samples, sample_rate)
    }
}

/// Min-max normalize to [0, 1], recentre, and stretch to the perceptual spread
fn stretch_to_spread(samples: &mut [f32]) {
    let min = samples.iter().copied().fold(f32::INFINITY, f32::min);
    let max = samples.iter().copied().fold(f32::NEG_INFINITY, f32::max);
    let span = max - min;
    if !(span > 0.0) || !span.is_finite() {
        warn!("Reconstructed waveform is flat; writing silence");
        samples.iter_mut().for_each(|s| *s = 0.0);
        return;
    }
    for s in samples.iter_mut() {
        *s = ((*s - min) / span - 0.5) * PERCEPTUAL_SPREAD;
    }
}
