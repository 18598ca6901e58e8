//! Short-time Fourier transform
//!
//! Hann-windowed STFT with centred frames (the signal is zero padded by half
//! a window on both sides) and its weighted overlap-add inverse. With the
//! periodic Hann window and a hop of a quarter window the pair reconstructs
//! the input to floating point precision.

use std::f64::consts::PI;
use std::sync::Arc;

use rustfft::num_complex::Complex64;
use rustfft::{Fft, FftPlanner};

use crate::error::{DreamError, Result};

/// Window-sum floor below which overlap-add samples are left unnormalized
const WINDOW_SUM_FLOOR: f64 = 1e-10;

/// Complex spectrogram stored bin-major (`bins × frames`)
#[derive(Debug, Clone, PartialEq)]
pub struct ComplexSpectrogram {
    bins: usize,
    frames: usize,
    data: Vec<Complex64>,
}

impl ComplexSpectrogram {
    pub fn zeros(bins: usize, frames: usize) -> Self {
        Self {
            bins,
            frames,
            data: vec![Complex64::new(0.0, 0.0); bins * frames],
        }
    }

    #[inline]
    pub fn bins(&self) -> usize {
        self.bins
    }

    #[inline]
    pub fn frames(&self) -> usize {
        self.frames
    }

    #[inline]
    pub fn get(&self, bin: usize, frame: usize) -> Complex64 {
        self.data[bin * self.frames + frame]
    }

    #[inline]
    pub fn set(&mut self, bin: usize, frame: usize, value: Complex64) {
        self.data[bin * self.frames + frame] = value;
    }

    pub fn iter(&self) -> impl Iterator<Item = &Complex64> {
        self.data.iter()
    }
}

/// Forward and inverse STFT sharing one window and FFT plan
pub struct Stft {
    n_fft: usize,
    hop_length: usize,
    window: Vec<f64>,
    fft: Arc<dyn Fft<f64>>,
    ifft: Arc<dyn Fft<f64>>,
}

impl std::fmt::Debug for Stft {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Stft")
            .field("n_fft", &self.n_fft)
            .field("hop_length", &self.hop_length)
            .finish()
    }
}

impl Stft {
    /// Plan an STFT with window (and FFT) size `n_fft`
    ///
    /// # Errors
    /// `InvalidConfig` unless `n_fft` is even and at least 4, and
    /// `0 < hop_length <= n_fft / 2`.
    pub fn new(n_fft: usize, hop_length: usize) -> Result<Self> {
        if n_fft < 4 || n_fft % 2 != 0 {
            return Err(DreamError::InvalidConfig {
                reason: format!("window size must be even and >= 4, got {}", n_fft),
            });
        }
        if hop_length == 0 || hop_length > n_fft / 2 {
            return Err(DreamError::InvalidConfig {
                reason: format!(
                    "hop length must be in 1..={}, got {}",
                    n_fft / 2,
                    hop_length
                ),
            });
        }

        let mut planner = FftPlanner::new();
        Ok(Self {
            n_fft,
            hop_length,
            window: hann_window(n_fft),
            fft: planner.plan_fft_forward(n_fft),
            ifft: planner.plan_fft_inverse(n_fft),
        })
    }

    pub fn n_fft(&self) -> usize {
        self.n_fft
    }

    pub fn hop_length(&self) -> usize {
        self.hop_length
    }

    /// Number of frequency bins per frame (`n_fft / 2 + 1`)
    pub fn num_bins(&self) -> usize {
        self.n_fft / 2 + 1
    }

    /// Number of frames produced for a signal of `num_samples` samples
    pub fn num_frames(&self, num_samples: usize) -> usize {
        1 + num_samples / self.hop_length
    }

    /// Forward transform
    ///
    /// # Errors
    /// `EmptyAudio` if `samples` is empty.
    pub fn forward(&self, samples: &[f32]) -> Result<ComplexSpectrogram> {
        if samples.is_empty() {
            return Err(DreamError::EmptyAudio);
        }

        let pad = self.n_fft / 2;
        let mut padded = vec![0.0f64; samples.len() + 2 * pad];
        for (dst, &s) in padded[pad..].iter_mut().zip(samples) {
            *dst = s as f64;
        }

        let num_frames = self.num_frames(samples.len());
        let num_bins = self.num_bins();
        let mut output = ComplexSpectrogram::zeros(num_bins, num_frames);
        let mut buffer = vec![Complex64::new(0.0, 0.0); self.n_fft];

        for frame in 0..num_frames {
            let start = frame * self.hop_length;
            for i in 0..self.n_fft {
                buffer[i] = Complex64::new(padded[start + i] * self.window[i], 0.0);
            }
            self.fft.process(&mut buffer);
            for bin in 0..num_bins {
                output.set(bin, frame, buffer[bin]);
            }
        }

        Ok(output)
    }

    /// Inverse transform, trimmed or zero-extended to `length` samples
    ///
    /// # Errors
    /// `InvalidGeometry` if the spectrogram has no frames or the wrong
    /// number of bins for this window size.
    pub fn inverse(&self, spec: &ComplexSpectrogram, length: usize) -> Result<Vec<f32>> {
        if spec.frames() == 0 || spec.bins() != self.num_bins() {
            return Err(DreamError::InvalidGeometry {
                reason: format!(
                    "expected {} bins and at least one frame, got {}x{}",
                    self.num_bins(),
                    spec.bins(),
                    spec.frames()
                ),
            });
        }

        let half = self.n_fft / 2;
        let padded_len = self.n_fft + self.hop_length * (spec.frames() - 1);
        let mut audio = vec![0.0f64; padded_len];
        let mut window_sum = vec![0.0f64; padded_len];
        let mut buffer = vec![Complex64::new(0.0, 0.0); self.n_fft];
        let scale = 1.0 / self.n_fft as f64;

        for frame in 0..spec.frames() {
            buffer[0] = Complex64::new(spec.get(0, frame).re, 0.0);
            for bin in 1..half {
                let value = spec.get(bin, frame);
                buffer[bin] = value;
                buffer[self.n_fft - bin] = value.conj();
            }
            buffer[half] = Complex64::new(spec.get(half, frame).re, 0.0);
            self.ifft.process(&mut buffer);

            let start = frame * self.hop_length;
            for i in 0..self.n_fft {
                audio[start + i] += buffer[i].re * scale * self.window[i];
                window_sum[start + i] += self.window[i] * self.window[i];
            }
        }

        for (sample, &ws) in audio.iter_mut().zip(window_sum.iter()) {
            if ws > WINDOW_SUM_FLOOR {
                *sample /= ws;
            }
        }

        let mut output: Vec<f32> = audio
            .iter()
            .skip(half)
            .take(length)
            .map(|&s| s as f32)
            .collect();
        output.resize(length, 0.0);
        Ok(output)
    }
}

/// Periodic Hann window
fn hann_window(size: usize) -> Vec<f64> {
    (0..size)
        .map(|i| 0.5 * (1.0 - (2.0 * PI * i as f64 / size as f64).cos()))
        .collect()
}
