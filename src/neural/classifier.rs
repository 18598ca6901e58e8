//! Classifier trait and core types
//!
//! Defines the interface the dream core needs from a trained classifier.
//! Activations are returned explicitly from each call instead of being
//! captured into shared state, so a classifier can be evaluated from several
//! places without the calls stepping on each other.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::error::{DreamError, Result};
use crate::tensor::Tensor;

/// Substring marking layers that can be dreamed on
pub const RESIDUAL_MARKER: &str = "residual";

/// Name and width of one named layer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LayerInfo {
    pub name: String,
    pub channels: usize,
}

/// The activation whose mean the ascent maximizes
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActivationTarget {
    /// Layer name, e.g. `residual_1a`
    pub layer: String,
    /// Channel of that layer's feature map
    pub channel: usize,
}

/// Result of a forward pass
#[derive(Debug, Clone)]
pub struct ForwardPass {
    /// Class scores
    pub logits: Vec<f32>,
    /// Activations of the layers that were asked for, keyed by name
    pub activations: HashMap<String, Tensor>,
}

/// Objective value and its gradient with respect to the input
#[derive(Debug, Clone)]
pub struct ActivationGradient {
    /// Mean of the target channel's activation
    pub objective: f32,
    /// d(objective)/d(input), same shape as the input
    pub input_gradient: Tensor,
}

/// Trait that all classifiers must implement
///
/// Inputs are single `C × H × W` tensors (a batch of one).
pub trait Classifier: Send + Sync {
    /// Number of input channels expected
    fn input_channels(&self) -> usize;

    /// All named layers, in network order
    fn layers(&self) -> Vec<LayerInfo>;

    /// Run the network and return the logits plus the activations of the
    /// layers named in `capture`
    ///
    /// # Errors
    /// `UnknownLayer` if a name in `capture` is not a layer of this network.
    fn forward(&self, input: &Tensor, capture: &[&str]) -> Result<ForwardPass>;

    /// Mean activation of `target` and its gradient with respect to `input`
    fn activation_gradient(
        &self,
        input: &Tensor,
        target: &ActivationTarget,
    ) -> Result<ActivationGradient>;

    /// Look up one layer by name
    fn layer(&self, name: &str) -> Option<LayerInfo> {
        self.layers().into_iter().find(|layer| layer.name == name)
    }

    /// Mean activation of `target` without computing a gradient
    fn objective(&self, input: &Tensor, target: &ActivationTarget) -> Result<f32> {
        let pass = self.forward(input, &[target.layer.as_str()])?;
        let activation = pass
            .activations
            .get(&target.layer)
            .ok_or_else(|| unknown_layer(self, &target.layer))?;
        if target.channel >= activation.channels() {
            return Err(DreamError::ChannelOutOfRange {
                layer: target.layer.clone(),
                channel: target.channel,
                channels: activation.channels(),
            });
        }
        let plane = activation.channel(target.channel);
        let sum: f64 = plane.iter().map(|&v| v as f64).sum();
        Ok((sum / plane.len().max(1) as f64) as f32)
    }
}

/// Layers whose name carries the residual-block marker
pub fn dreamable_layers<C: Classifier + ?Sized>(classifier: &C) -> Vec<LayerInfo> {
    classifier
        .layers()
        .into_iter()
        .filter(|layer| layer.name.contains(RESIDUAL_MARKER))
        .collect()
}

/// Validate a layer name and channel index against a classifier
///
/// # Errors
/// * `UnknownLayer` - If `layer` is not a dreamable layer
/// * `ChannelOutOfRange` - If `channel` is not smaller than the layer width
pub fn resolve_target<C: Classifier + ?Sized>(
    classifier: &C,
    layer: &str,
    channel: usize,
) -> Result<ActivationTarget> {
    let dreamable = dreamable_layers(classifier);
    let info = dreamable
        .iter()
        .find(|info| info.name == layer)
        .ok_or_else(|| DreamError::UnknownLayer {
            layer: layer.to_string(),
            available: dreamable.iter().map(|info| info.name.clone()).collect(),
        })?;

    if channel >= info.channels {
        return Err(DreamError::ChannelOutOfRange {
            layer: layer.to_string(),
            channel,
            channels: info.channels,
        });
    }

    Ok(ActivationTarget {
        layer: layer.to_string(),
        channel,
    })
}

/// `UnknownLayer` error listing every layer of `classifier`
pub(crate) fn unknown_layer<C: Classifier + ?Sized>(classifier: &C, layer: &str) -> DreamError {
    DreamError::UnknownLayer {
        layer: layer.to_string(),
        available: classifier.layers().into_iter().map(|l| l.name).collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::neural::mock::TileMeanClassifier;

    #[test]
    fn test_dreamable_layers_filters_by_marker() {
        let classifier = TileMeanClassifier::new(2);
        let names: Vec<String> = dreamable_layers(&classifier)
            .into_iter()
            .map(|l| l.name)
            .collect();
        assert_eq!(names, vec!["residual_identity".to_string()]);
    }

    #[test]
    fn test_resolve_target_validates_eagerly() {
        let classifier = TileMeanClassifier::new(2);
        assert!(resolve_target(&classifier, "residual_identity", 1).is_ok());
        assert!(matches!(
            resolve_target(&classifier, "input", 0),
            Err(DreamError::UnknownLayer { .. })
        ));
        assert!(matches!(
            resolve_target(&classifier, "residual_identity", 2),
            Err(DreamError::ChannelOutOfRange { .. })
        ));
    }

    #[test]
    fn test_default_objective_reads_channel_mean() {
        let classifier = TileMeanClassifier::new(2);
        let input = Tensor::from_fn(2, 2, 2, |c, _, x| (c * 10 + x) as f32);
        let target = ActivationTarget {
            layer: "residual_identity".to_string(),
            channel: 1,
        };
        assert_eq!(classifier.objective(&input, &target).unwrap(), 10.5);
    }
}
