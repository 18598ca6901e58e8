//! Activation-maximization driver
//!
//! Runs gradient ascent on a representation, one octave at a time from the
//! coarsest pyramid level to the finest. Before each octave after the first
//! the current result is upsampled and the matching detail level is added
//! back, so detail lost by the pyramid reappears at every scale.
//!
//! Repeated ascent is not bounded mid-loop. Values may grow far outside the
//! codec's range; the inverse codec clips the final waveform to [-1, 1].

use log::{debug, info};
use serde::{Deserialize, Serialize};

use super::config::DreamConfig;
use super::gradient::TiledGradientEngine;
use super::pyramid::{merge_detail, OctavePyramid};
use crate::error::{DreamError, Result};
use crate::neural::{
    dreamable_layers, resolve_target, ActivationTarget, Classifier, ComputeDevice, LayerInfo,
};
use crate::tensor::Tensor;

/// Added to the mean absolute gradient before normalizing
pub const GRADIENT_EPSILON: f32 = 1e-8;

/// One ascent step
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct IterationRecord {
    pub octave: usize,
    pub iteration: usize,
    /// Mean tile objective before the step
    pub objective: f32,
    /// Mean absolute raw gradient the step was normalized by
    pub gradient_scale: f32,
    /// Tiles evaluated for the gradient
    pub tiles: usize,
}

/// Optimized representation and its step history
#[derive(Debug, Clone)]
pub struct DreamOutcome {
    pub representation: Tensor,
    pub history: Vec<IterationRecord>,
}

/// Deep dream driver bound to one classifier
pub struct DeepDream<'a, C: Classifier + ?Sized> {
    classifier: &'a C,
    config: DreamConfig,
    target: ActivationTarget,
    engine: TiledGradientEngine,
    device: ComputeDevice,
}

impl<'a, C: Classifier + ?Sized> DeepDream<'a, C> {
    /// Validate the configuration against `classifier`
    ///
    /// # Errors
    /// * `InvalidConfig` - If a configuration value is out of range
    /// * `UnknownLayer` - If `block_name` is not a dreamable layer
    /// * `ChannelOutOfRange` - If `channel_index` exceeds the layer width
    pub fn new(classifier: &'a C, config: DreamConfig) -> Result<Self> {
        config.validate()?;
        let target = resolve_target(classifier, &config.block_name, config.channel_index)?;
        let engine = TiledGradientEngine::new(config.tile_size, config.seed)?;
        let device = ComputeDevice::select(config.use_accelerator);

        debug!(
            "Dreaming on {}[{}] with {} octaves x {} iterations on {}",
            target.layer, target.channel, config.n_octaves, config.number_of_iterations, device
        );

        Ok(Self {
            classifier,
            config,
            target,
            engine,
            device,
        })
    }

    pub fn config(&self) -> &DreamConfig {
        &self.config
    }

    pub fn target(&self) -> &ActivationTarget {
        &self.target
    }

    /// Layers `block_name` may name
    pub fn available_layers(&self) -> Vec<LayerInfo> {
        dreamable_layers(self.classifier)
    }

    /// Optimize `representation` and return the result
    pub fn run(&mut self, representation: &Tensor) -> Result<Tensor> {
        Ok(self.run_traced(representation)?.representation)
    }

    /// Optimize `representation`, recording every ascent step
    ///
    /// The shift generator keeps its state between calls, so running twice
    /// on one driver does not repeat the same shifts.
    pub fn run_traced(&mut self, representation: &Tensor) -> Result<DreamOutcome> {
        if representation.channels() != self.classifier.input_channels() {
            return Err(DreamError::ShapeMismatch {
                expected: (
                    self.classifier.input_channels(),
                    representation.height(),
                    representation.width(),
                ),
                actual: representation.shape(),
            });
        }

        let pyramid = OctavePyramid::decompose(
            representation,
            self.config.n_octaves,
            self.config.octave_scale,
        )?;

        let mut history =
            Vec::with_capacity(self.config.n_octaves * self.config.number_of_iterations);
        let mut current = pyramid.base().clone();

        for octave in 0..pyramid.num_octaves() {
            if let Some(detail) = pyramid.detail_for_octave(octave) {
                current = merge_detail(&current, detail)?;
            }

            info!(
                "Octave {}/{}: {}x{}",
                octave + 1,
                pyramid.num_octaves(),
                current.height(),
                current.width()
            );

            let mut state = self.device.to_device(current);
            for iteration in 0..self.config.number_of_iterations {
                let record = self.ascend(&mut state, octave, iteration)?;
                debug!(
                    "octave {} iteration {}: objective {:.6}, |g| {:.3e}, {} tiles",
                    octave, iteration, record.objective, record.gradient_scale, record.tiles
                );
                history.push(record);
            }
            current = self.device.to_host(state);
        }

        Ok(DreamOutcome {
            representation: current,
            history,
        })
    }

    /// One normalized gradient ascent step, in place
    fn ascend(&mut self, state: &mut Tensor, octave: usize, iteration: usize) -> Result<IterationRecord> {
        let tiled = self.engine.compute(self.classifier, &self.target, state)?;
        let gradient_scale = tiled.gradient.mean_abs();
        let mut step = tiled.gradient;
        step.scale_assign(self.config.optimisation_step_size / (gradient_scale + GRADIENT_EPSILON));
        state.add_scaled_assign(&step, 1.0)?;

        Ok(IterationRecord {
            octave,
            iteration,
            objective: tiled.objective,
            gradient_scale,
            tiles: tiled.tiles,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::neural::{ConstantGradientClassifier, TileMeanClassifier};

    fn config(iterations: usize, octaves: usize) -> DreamConfig {
        DreamConfig {
            block_name: TileMeanClassifier::LAYER.to_string(),
            channel_index: 0,
            number_of_iterations: iterations,
            optimisation_step_size: 0.5,
            n_octaves: octaves,
            octave_scale: 1.4,
            tile_size: 16,
            use_accelerator: false,
            seed: Some(7),
        }
    }

    #[test]
    fn test_unknown_block_fails_at_construction() {
        let classifier = TileMeanClassifier::new(2);
        let bad = DreamConfig {
            block_name: "residual_9z".to_string(),
            ..config(1, 1)
        };
        assert!(matches!(
            DeepDream::new(&classifier, bad),
            Err(DreamError::UnknownLayer { .. })
        ));
        let wide = DreamConfig {
            channel_index: 2,
            ..config(1, 1)
        };
        assert!(matches!(
            DeepDream::new(&classifier, wide),
            Err(DreamError::ChannelOutOfRange { .. })
        ));
    }

    #[test]
    fn test_zero_iterations_is_pass_through() {
        let classifier = ConstantGradientClassifier::new(2, 1.0);
        let cfg = DreamConfig {
            block_name: ConstantGradientClassifier::LAYER.to_string(),
            ..config(0, 3)
        };
        let input = Tensor::from_fn(2, 32, 48, |c, y, x| (c * 3 + y + 2 * x) as f32 * 0.1);
        let mut dream = DeepDream::new(&classifier, cfg).unwrap();
        let outcome = dream.run_traced(&input).unwrap();
        assert!(outcome.history.is_empty());
        assert_eq!(classifier.calls(), 0);
        assert!(outcome.representation.max_abs_diff(&input).unwrap() < 1e-4);
    }

    #[test]
    fn test_history_covers_every_step() {
        let classifier = TileMeanClassifier::new(2);
        let mut dream = DeepDream::new(&classifier, config(3, 2)).unwrap();
        let outcome = dream.run_traced(&Tensor::zeros(2, 32, 32)).unwrap();
        assert_eq!(outcome.history.len(), 6);
        assert_eq!(outcome.history[3].octave, 1);
        assert_eq!(outcome.history[3].iteration, 0);
        assert_eq!(outcome.representation.shape(), (2, 32, 32));
    }

    #[test]
    fn test_normalized_step_length() {
        // Constant gradient: every element moves by exactly the step size
        let classifier = ConstantGradientClassifier::new(1, 3.0);
        let cfg = DreamConfig {
            block_name: ConstantGradientClassifier::LAYER.to_string(),
            ..config(2, 1)
        };
        let mut dream = DeepDream::new(&classifier, cfg).unwrap();
        let out = dream.run(&Tensor::zeros(1, 32, 32)).unwrap();
        for &v in out.data() {
            assert!((v - 1.0).abs() < 1e-5);
        }
    }

    #[test]
    fn test_rejects_wrong_channel_count() {
        let classifier = TileMeanClassifier::new(2);
        let mut dream = DeepDream::new(&classifier, config(1, 1)).unwrap();
        assert!(matches!(
            dream.run(&Tensor::zeros(3, 16, 16)),
            Err(DreamError::ShapeMismatch { .. })
        ));
    }
}
