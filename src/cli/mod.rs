//! CLI Module
//!
//! Command-line interface for the sonodream audio deep dream tool.

pub mod commands;

use clap::Parser;
use std::path::PathBuf;

use crate::dream::DreamConfig;
use crate::error::{DreamError, Result};

/// Sonodream - deep dream on speech spectrograms
#[derive(Parser, Debug)]
#[command(name = "sonodream")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Path to the classifier parameter file
    pub model_path: PathBuf,

    /// WAV file to dream on
    pub input_path: PathBuf,

    /// JSON dream configuration (flags override its values)
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Residual block whose activation is maximized
    #[arg(short, long)]
    pub block: Option<String>,

    /// Channel of the block's feature map
    #[arg(long)]
    pub channel: Option<usize>,

    /// Gradient steps per octave
    #[arg(short, long)]
    pub iterations: Option<usize>,

    /// Number of octaves
    #[arg(long)]
    pub octaves: Option<usize>,

    /// Size ratio between octaves
    #[arg(long)]
    pub octave_scale: Option<f32>,

    /// Normalized ascent step size
    #[arg(long)]
    pub step_size: Option<f32>,

    /// Tile extent for gradient evaluation
    #[arg(long)]
    pub tile_size: Option<usize>,

    /// Seed for the tile shift generator
    #[arg(long)]
    pub seed: Option<u64>,

    /// Request an accelerator (falls back to the host)
    #[arg(long)]
    pub accelerator: bool,

    /// Directory output files are written to
    #[arg(short, long, default_value = ".")]
    pub output_dir: PathBuf,

    /// Output file stem; files are named `{base_name}_{index}.wav`
    #[arg(long, default_value = "audio")]
    pub base_name: String,

    /// Decode with the exact inverse instead of the perceptual renormalization
    #[arg(long)]
    pub exact_inverse: bool,

    /// Enable verbose output
    #[arg(short, long)]
    pub verbose: bool,
}

impl Cli {
    /// Dream configuration: the config file or the pipeline preset, with
    /// flags applied on top
    pub fn dream_config(&self) -> Result<DreamConfig> {
        let mut config = match &self.config {
            Some(path) => DreamConfig::from_json_file(path)?,
            None => DreamConfig::pipeline_preset(),
        };

        if let Some(block) = &self.block {
            config.block_name = block.clone();
        }
        if let Some(channel) = self.channel {
            config.channel_index = channel;
        }
        if let Some(iterations) = self.iterations {
            config.number_of_iterations = iterations;
        }
        if let Some(octaves) = self.octaves {
            config.n_octaves = octaves;
        }
        if let Some(scale) = self.octave_scale {
            config.octave_scale = scale;
        }
        if let Some(step) = self.step_size {
            config.optimisation_step_size = step;
        }
        if let Some(tile) = self.tile_size {
            config.tile_size = tile;
        }
        if self.seed.is_some() {
            config.seed = self.seed;
        }
        config.use_accelerator |= self.accelerator;

        config.validate()?;
        Ok(config)
    }

    /// Headline for a failed run: error code, what was being dreamed, and
    /// recovery suggestions. The error message itself is left to the cause.
    pub fn failure_report(&self, error: &DreamError) -> String {
        let mut report = format!(
            "[{}] dreaming on {} with model {}",
            error.error_code(),
            self.input_path.display(),
            self.model_path.display()
        );
        for suggestion in error.recovery_suggestions() {
            report.push_str("\n  - ");
            report.push_str(suggestion);
        }
        report
    }
}
