//! Model parameter files
//!
//! Parameters are stored as a single JSON document holding the network
//! architecture and every weight, flattened row-major. Loading validates
//! all shapes against the declared architecture before a network is built.

use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::Path;

use log::info;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

use crate::error::{DreamError, Result};

/// Current parameter file format version
pub const PARAMS_FORMAT_VERSION: u32 = 1;

/// Shape of a [`super::ResidualClassifier`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Architecture {
    /// Input channels (2 for magnitude/phase representations)
    pub in_channels: usize,
    /// Channels of every hidden feature map
    pub width: usize,
    /// Square convolution kernel size (odd)
    pub kernel_size: usize,
    /// Residual block names, in network order
    pub blocks: Vec<String>,
    /// Output classes
    pub num_classes: usize,
}

impl Default for Architecture {
    fn default() -> Self {
        Self {
            in_channels: 2,
            width: 8,
            kernel_size: 3,
            blocks: vec![
                "residual_1a".to_string(),
                "residual_1b".to_string(),
                "residual_2a".to_string(),
            ],
            num_classes: 2,
        }
    }
}

/// Weights of one square convolution, `out × in × k × k`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConvParams {
    pub in_channels: usize,
    pub out_channels: usize,
    pub kernel_size: usize,
    pub weight: Vec<f32>,
    pub bias: Vec<f32>,
}

/// Weights of a fully connected layer, `out × in`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LinearParams {
    pub in_features: usize,
    pub out_features: usize,
    pub weight: Vec<f32>,
    pub bias: Vec<f32>,
}

/// One residual block: `relu(x + conv2(relu(conv1(x))))`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BlockParams {
    pub name: String,
    pub conv1: ConvParams,
    pub conv2: ConvParams,
}

/// Complete parameter set
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelParams {
    pub format_version: u32,
    pub architecture: Architecture,
    pub stem: ConvParams,
    pub blocks: Vec<BlockParams>,
    pub head: LinearParams,
}

impl ConvParams {
    fn check(&self, label: &str, in_channels: usize, out_channels: usize, kernel: usize) -> Result<()> {
        let expected_weights = out_channels * in_channels * kernel * kernel;
        if self.in_channels != in_channels
            || self.out_channels != out_channels
            || self.kernel_size != kernel
            || self.weight.len() != expected_weights
            || self.bias.len() != out_channels
        {
            return Err(DreamError::IncompatibleModel {
                reason: format!(
                    "{}: expected {}->{} k{} ({} weights, {} biases), found {}->{} k{} ({} weights, {} biases)",
                    label,
                    in_channels,
                    out_channels,
                    kernel,
                    expected_weights,
                    out_channels,
                    self.in_channels,
                    self.out_channels,
                    self.kernel_size,
                    self.weight.len(),
                    self.bias.len()
                ),
            });
        }
        Ok(())
    }

    /// He-uniform weights, PyTorch-style uniform biases
    fn random(rng: &mut StdRng, in_channels: usize, out_channels: usize, kernel: usize, gain: f32) -> Self {
        let fan_in = (in_channels * kernel * kernel) as f32;
        let bound = gain * (6.0 / fan_in).sqrt();
        let bias_bound = 1.0 / fan_in.sqrt();
        Self {
            in_channels,
            out_channels,
            kernel_size: kernel,
            weight: (0..out_channels * in_channels * kernel * kernel)
                .map(|_| rng.gen_range(-bound..bound))
                .collect(),
            bias: (0..out_channels)
                .map(|_| rng.gen_range(-bias_bound..bias_bound))
                .collect(),
        }
    }
}

impl LinearParams {
    fn check(&self, in_features: usize, out_features: usize) -> Result<()> {
        if self.in_features != in_features
            || self.out_features != out_features
            || self.weight.len() != in_features * out_features
            || self.bias.len() != out_features
        {
            return Err(DreamError::IncompatibleModel {
                reason: format!(
                    "head: expected {}->{}, found {}->{} ({} weights, {} biases)",
                    in_features,
                    out_features,
                    self.in_features,
                    self.out_features,
                    self.weight.len(),
                    self.bias.len()
                ),
            });
        }
        Ok(())
    }
}

impl ModelParams {
    /// Seeded random initialization for `architecture`
    ///
    /// Not a trained model; useful for tests and for exercising the pipeline.
    pub fn random(architecture: Architecture, seed: u64) -> Result<Self> {
        validate_architecture(&architecture)?;
        let mut rng = StdRng::seed_from_u64(seed);
        let k = architecture.kernel_size;
        let width = architecture.width;

        let stem = ConvParams::random(&mut rng, architecture.in_channels, width, k, 1.0);
        let blocks = architecture
            .blocks
            .iter()
            .map(|name| BlockParams {
                name: name.clone(),
                conv1: ConvParams::random(&mut rng, width, width, k, 1.0),
                conv2: ConvParams::random(&mut rng, width, width, k, 0.5),
            })
            .collect();
        let bound = 1.0 / (width as f32).sqrt();
        let head = LinearParams {
            in_features: width,
            out_features: architecture.num_classes,
            weight: (0..width * architecture.num_classes)
                .map(|_| rng.gen_range(-bound..bound))
                .collect(),
            bias: vec![0.0; architecture.num_classes],
        };

        Ok(Self {
            format_version: PARAMS_FORMAT_VERSION,
            architecture,
            stem,
            blocks,
            head,
        })
    }

    /// Check every tensor against the declared architecture
    ///
    /// # Errors
    /// `IncompatibleModel` on any version, name, or shape mismatch.
    pub fn validate(&self) -> Result<()> {
        if self.format_version != PARAMS_FORMAT_VERSION {
            return Err(DreamError::IncompatibleModel {
                reason: format!(
                    "unsupported format version {} (expected {})",
                    self.format_version, PARAMS_FORMAT_VERSION
                ),
            });
        }
        let arch = &self.architecture;
        validate_architecture(arch)?;

        self.stem
            .check("stem", arch.in_channels, arch.width, arch.kernel_size)?;

        if self.blocks.len() != arch.blocks.len() {
            return Err(DreamError::IncompatibleModel {
                reason: format!(
                    "architecture declares {} blocks, parameters hold {}",
                    arch.blocks.len(),
                    self.blocks.len()
                ),
            });
        }
        for (block, name) in self.blocks.iter().zip(&arch.blocks) {
            if &block.name != name {
                return Err(DreamError::IncompatibleModel {
                    reason: format!("block '{}' found where '{}' was declared", block.name, name),
                });
            }
            block
                .conv1
                .check(&format!("{}.conv1", name), arch.width, arch.width, arch.kernel_size)?;
            block
                .conv2
                .check(&format!("{}.conv2", name), arch.width, arch.width, arch.kernel_size)?;
        }

        self.head.check(arch.width, arch.num_classes)
    }

    /// Load and validate a parameter file
    ///
    /// # Errors
    /// * `ModelLoad` - If the file is missing or is not a parameter document
    /// * `IncompatibleModel` - If the shapes do not match the architecture
    pub fn load(path: &Path) -> Result<Self> {
        let file = File::open(path).map_err(|e| DreamError::ModelLoad {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;
        let params: ModelParams =
            serde_json::from_reader(BufReader::new(file)).map_err(|e| DreamError::ModelLoad {
                path: path.display().to_string(),
                reason: e.to_string(),
            })?;
        params.validate()?;
        info!(
            "Loaded model parameters from {} ({} blocks, width {})",
            path.display(),
            params.blocks.len(),
            params.architecture.width
        );
        Ok(params)
    }

    /// Write the parameter file
    pub fn save(&self, path: &Path) -> Result<()> {
        let file = File::create(path)?;
        serde_json::to_writer(BufWriter::new(file), self)?;
        Ok(())
    }
}

fn validate_architecture(arch: &Architecture) -> Result<()> {
    let reason = if arch.in_channels == 0 || arch.width == 0 || arch.num_classes == 0 {
        Some("channel and class counts must be positive".to_string())
    } else if arch.kernel_size == 0 || arch.kernel_size % 2 == 0 {
        Some(format!("kernel size must be odd, got {}", arch.kernel_size))
    } else if arch.blocks.iter().any(|name| name.is_empty()) {
        Some("block names must not be empty".to_string())
    } else {
        None
    };
    match reason {
        Some(reason) => Err(DreamError::IncompatibleModel { reason }),
        None => Ok(()),
    }
}
