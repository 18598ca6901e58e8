//! Driver configuration
//!
//! Every knob of an activation-maximization run, with validation ranges.
//! Configurations can be read from JSON files; fields missing from the file
//! take their default values.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{DreamError, Result};

/// Tile extent used by the gradient engine unless configured otherwise
pub const DEFAULT_TILE_SIZE: usize = 128;

/// Activation-maximization parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DreamConfig {
    /// Layer whose activation is maximized (must contain `residual`)
    pub block_name: String,
    /// Channel of that layer's feature map
    pub channel_index: usize,
    /// Gradient steps per octave (0 makes the driver a pass-through)
    pub number_of_iterations: usize,
    /// Step length after gradient normalization
    pub optimisation_step_size: f32,
    /// Pyramid levels, including the coarse base (>= 1)
    pub n_octaves: usize,
    /// Size ratio between neighbouring octaves (> 1)
    pub octave_scale: f32,
    /// Square tile extent for gradient evaluation (>= 2)
    pub tile_size: usize,
    /// Ask for an accelerator; falls back to the host when unavailable
    pub use_accelerator: bool,
    /// Seed for the tile shift generator; `None` draws one from entropy
    pub seed: Option<u64>,
}

impl Default for DreamConfig {
    fn default() -> Self {
        Self {
            block_name: "residual_1a".to_string(),
            channel_index: 6,
            number_of_iterations: 10,
            optimisation_step_size: 1.5,
            n_octaves: 4,
            octave_scale: 1.4,
            tile_size: DEFAULT_TILE_SIZE,
            use_accelerator: false,
            seed: None,
        }
    }
}

impl DreamConfig {
    /// Settings used by the command-line pipeline
    pub fn pipeline_preset() -> Self {
        Self {
            n_octaves: 10,
            number_of_iterations: 10,
            optimisation_step_size: 0.6,
            ..Self::default()
        }
    }

    /// Load a configuration from a JSON file
    ///
    /// # Errors
    /// * `FileNotFound` - If the file cannot be read
    /// * `Serialization` - If the file is not a valid configuration document
    /// * `InvalidConfig` - If a value is out of range
    pub fn from_json_file(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path).map_err(|e| DreamError::FileNotFound {
            path: path.display().to_string(),
            source: Some(e),
        })?;
        let config: DreamConfig = serde_json::from_str(&text)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate parameter ranges
    pub fn validate(&self) -> Result<()> {
        let invalid = |reason: String| Err(DreamError::InvalidConfig { reason });

        if self.block_name.trim().is_empty() {
            return invalid("block_name must not be empty".to_string());
        }
        if self.n_octaves == 0 {
            return invalid("n_octaves must be at least 1".to_string());
        }
        if !self.octave_scale.is_finite() || self.octave_scale <= 1.0 {
            return invalid(format!(
                "octave_scale must be greater than 1, got {}",
                self.octave_scale
            ));
        }
        if !self.optimisation_step_size.is_finite() || self.optimisation_step_size <= 0.0 {
            return invalid(format!(
                "optimisation_step_size must be positive, got {}",
                self.optimisation_step_size
            ));
        }
        if self.tile_size < 2 {
            return invalid(format!("tile_size must be at least 2, got {}", self.tile_size));
        }
        Ok(())
    }
}
