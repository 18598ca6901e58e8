//! Stub classifiers for testing
//!
//! These don't compute anything learned; their activations and gradients
//! have closed forms so optimizer behaviour can be checked exactly.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};

use super::classifier::{
    unknown_layer, ActivationGradient, ActivationTarget, Classifier, ForwardPass, LayerInfo,
};
use crate::error::{DreamError, Result};
use crate::tensor::Tensor;

fn check_channels<C: Classifier + ?Sized>(classifier: &C, input: &Tensor) -> Result<()> {
    if input.channels() != classifier.input_channels() {
        return Err(DreamError::ShapeMismatch {
            expected: (classifier.input_channels(), input.height(), input.width()),
            actual: input.shape(),
        });
    }
    Ok(())
}

/// Classifier whose dreamable activation is the input tile itself
///
/// Layers: `input` (not dreamable) and `residual_identity`, both equal to
/// the input. The objective for channel `c` is the mean of that channel, so
/// its gradient is `1 / (H * W)` on channel `c` and zero elsewhere.
#[derive(Debug)]
pub struct TileMeanClassifier {
    channels: usize,
}

impl TileMeanClassifier {
    pub const LAYER: &'static str = "residual_identity";

    pub fn new(channels: usize) -> Self {
        Self { channels }
    }
}

impl Classifier for TileMeanClassifier {
    fn input_channels(&self) -> usize {
        self.channels
    }

    fn layers(&self) -> Vec<LayerInfo> {
        vec![
            LayerInfo {
                name: "input".to_string(),
                channels: self.channels,
            },
            LayerInfo {
                name: Self::LAYER.to_string(),
                channels: self.channels,
            },
        ]
    }

    fn forward(&self, input: &Tensor, capture: &[&str]) -> Result<ForwardPass> {
        check_channels(self, input)?;
        let mut activations = HashMap::new();
        for &name in capture {
            if self.layer(name).is_none() {
                return Err(unknown_layer(self, name));
            }
            activations.insert(name.to_string(), input.clone());
        }
        let logits = (0..self.channels)
            .map(|c| {
                let plane = input.channel(c);
                plane.iter().sum::<f32>() / plane.len().max(1) as f32
            })
            .collect();
        Ok(ForwardPass {
            logits,
            activations,
        })
    }

    fn activation_gradient(
        &self,
        input: &Tensor,
        target: &ActivationTarget,
    ) -> Result<ActivationGradient> {
        let objective = self.objective(input, target)?;
        let (channels, height, width) = input.shape();
        let weight = 1.0 / (height * width).max(1) as f32;
        let input_gradient = Tensor::from_fn(channels, height, width, |c, _, _| {
            if c == target.channel {
                weight
            } else {
                0.0
            }
        });
        Ok(ActivationGradient {
            objective,
            input_gradient,
        })
    }
}

/// Classifier that returns the same gradient value everywhere and counts
/// how many times it was asked for a gradient
#[derive(Debug)]
pub struct ConstantGradientClassifier {
    channels: usize,
    value: f32,
    calls: AtomicUsize,
}

impl ConstantGradientClassifier {
    pub const LAYER: &'static str = "residual_constant";

    pub fn new(channels: usize, value: f32) -> Self {
        Self {
            channels,
            value,
            calls: AtomicUsize::new(0),
        }
    }

    /// Number of gradient evaluations so far
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl Classifier for ConstantGradientClassifier {
    fn input_channels(&self) -> usize {
        self.channels
    }

    fn layers(&self) -> Vec<LayerInfo> {
        vec![LayerInfo {
            name: Self::LAYER.to_string(),
            channels: self.channels,
        }]
    }

    fn forward(&self, input: &Tensor, capture: &[&str]) -> Result<ForwardPass> {
        check_channels(self, input)?;
        let mut activations = HashMap::new();
        for &name in capture {
            if name != Self::LAYER {
                return Err(unknown_layer(self, name));
            }
            activations.insert(name.to_string(), input.map(|v| v * self.value));
        }
        Ok(ForwardPass {
            logits: vec![0.0],
            activations,
        })
    }

    fn activation_gradient(
        &self,
        input: &Tensor,
        target: &ActivationTarget,
    ) -> Result<ActivationGradient> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let objective = self.objective(input, target)?;
        let (channels, height, width) = input.shape();
        Ok(ActivationGradient {
            objective,
            input_gradient: Tensor::filled(channels, height, width, self.value),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tile_mean_gradient_matches_objective() {
        let classifier = TileMeanClassifier::new(2);
        let input = Tensor::filled(2, 4, 5, 3.0);
        let target = ActivationTarget {
            layer: TileMeanClassifier::LAYER.to_string(),
            channel: 0,
        };
        let grad = classifier.activation_gradient(&input, &target).unwrap();
        assert_eq!(grad.objective, 3.0);
        assert_eq!(grad.input_gradient.get(0, 3, 4), 1.0 / 20.0);
        assert_eq!(grad.input_gradient.get(1, 3, 4), 0.0);
    }

    #[test]
    fn test_constant_gradient_counts_calls() {
        let classifier = ConstantGradientClassifier::new(1, 2.0);
        let target = ActivationTarget {
            layer: ConstantGradientClassifier::LAYER.to_string(),
            channel: 0,
        };
        let input = Tensor::zeros(1, 3, 3);
        classifier.activation_gradient(&input, &target).unwrap();
        classifier.activation_gradient(&input, &target).unwrap();
        assert_eq!(classifier.calls(), 2);
    }

    #[test]
    fn test_forward_rejects_unknown_capture() {
        let classifier = TileMeanClassifier::new(1);
        let input = Tensor::zeros(1, 2, 2);
        assert!(classifier.forward(&input, &["residual_missing"]).is_err());
    }
}
