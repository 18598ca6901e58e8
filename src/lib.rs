//! Sonodream - Deep Dream for Audio
//!
//! Sonodream turns speech into "dreamed" audio by running activation
//! maximization on its spectrogram:
//! 1. Spectral codec - waveform to a two-channel magnitude/phase image and back
//! 2. Deep dream - octave-by-octave gradient ascent that drives one channel
//!    of a classifier's residual block to fire harder
//!
//! # Architecture
//!
//! ```text
//! WAV -> SpectralCodec::forward -> OctavePyramid -> TiledGradientEngine (per step)
//!                                        |                 |
//!                                        +-- DeepDream ----+
//!                                                 |
//! WAV <- SpectralCodec::inverse <-----------------+
//! ```
//!
//! The classifier is any [`neural::Classifier`]; activations are returned
//! explicitly by each call.

pub mod cli;
pub mod dream;
pub mod engine;
pub mod error;
pub mod neural;
pub mod pipeline;
pub mod spectral;
pub mod tensor;

pub use dream::{DeepDream, DreamConfig, DreamOutcome, OctavePyramid, TiledGradientEngine};
pub use engine::Waveform;
pub use error::{DreamError, Result};
pub use neural::{Classifier, ResidualClassifier};
pub use pipeline::DreamPipeline;
pub use spectral::{CodecConfig, SpectralCodec};
pub use tensor::Tensor;
