//! Audio Engine Module
//!
//! Audio plumbing around the dream core:
//! - Mono waveform buffer
//! - WAV decode/encode

pub mod buffer;
pub mod io;

pub use buffer::{generate_test_tone, Waveform, DREAM_SAMPLE_RATE, SILENCE_THRESHOLD_DB};
pub use io::{load_audio, output_path, save_audio, ExportFormat};
