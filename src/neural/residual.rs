//! Residual convolutional classifier
//!
//! A small all-convolutional network over `C × H × W` representations:
//!
//! ```text
//! input ─ stem conv ─ relu ─┬─ residual block ─ ... ─ residual block ─ mean pool ─ linear ─ logits
//!                           │
//!                  block: relu(x + conv2(relu(conv1(x))))
//! ```
//!
//! Every convolution is stride 1 with zero "same" padding, so feature maps
//! keep the input's spatial size and any tile size is accepted. Input
//! gradients are computed by an explicit reverse pass over the cached
//! pre-activations of the forward pass.

use std::collections::HashMap;
use std::path::Path;

use super::classifier::{
    unknown_layer, ActivationGradient, ActivationTarget, Classifier, ForwardPass, LayerInfo,
};
use super::params::{Architecture, ConvParams, LinearParams, ModelParams};
use crate::error::{DreamError, Result};
use crate::tensor::Tensor;

/// Name of the stem activation
pub const STEM_LAYER: &str = "stem";

// ============================================================================
// Layers
// ============================================================================

/// Square stride-1 convolution with zero "same" padding
#[derive(Debug, Clone)]
struct Conv2d {
    in_channels: usize,
    out_channels: usize,
    kernel: usize,
    weight: Vec<f32>,
    bias: Vec<f32>,
}

/// Output rows `[start, end)` for which `row + offset` stays inside `len`
#[inline]
fn valid_span(len: usize, offset: isize) -> (usize, usize) {
    let start = (-offset).max(0) as usize;
    let end = (len as isize - offset).clamp(0, len as isize) as usize;
    (start.min(end), end)
}

impl Conv2d {
    fn from_params(params: &ConvParams) -> Self {
        Self {
            in_channels: params.in_channels,
            out_channels: params.out_channels,
            kernel: params.kernel_size,
            weight: params.weight.clone(),
            bias: params.bias.clone(),
        }
    }

    #[inline]
    fn weight(&self, co: usize, ci: usize, ky: usize, kx: usize) -> f32 {
        self.weight[((co * self.in_channels + ci) * self.kernel + ky) * self.kernel + kx]
    }

    fn forward(&self, input: &Tensor) -> Tensor {
        let (_, h, w) = input.shape();
        let pad = (self.kernel / 2) as isize;
        let mut out = Tensor::zeros(self.out_channels, h, w);

        for co in 0..self.out_channels {
            out.channel_mut(co).fill(self.bias[co]);
            for ci in 0..self.in_channels {
                let src = input.channel(ci);
                for ky in 0..self.kernel {
                    let dy = ky as isize - pad;
                    let (y0, y1) = valid_span(h, dy);
                    for kx in 0..self.kernel {
                        let dx = kx as isize - pad;
                        let (x0, x1) = valid_span(w, dx);
                        let wv = self.weight(co, ci, ky, kx);
                        let dst = out.channel_mut(co);
                        for oy in y0..y1 {
                            let iy = (oy as isize + dy) as usize;
                            let ix0 = (x0 as isize + dx) as usize;
                            let in_row = &src[iy * w + ix0..iy * w + ix0 + (x1 - x0)];
                            let out_row = &mut dst[oy * w + x0..oy * w + x1];
                            for (o, &i) in out_row.iter_mut().zip(in_row) {
                                *o += wv * i;
                            }
                        }
                    }
                }
            }
        }
        out
    }

    /// Gradient with respect to the input given the gradient of the output
    fn backward_input(&self, grad_out: &Tensor) -> Tensor {
        let (_, h, w) = grad_out.shape();
        let pad = (self.kernel / 2) as isize;
        let mut grad_in = Tensor::zeros(self.in_channels, h, w);

        for co in 0..self.out_channels {
            let go = grad_out.channel(co);
            for ci in 0..self.in_channels {
                for ky in 0..self.kernel {
                    let dy = ky as isize - pad;
                    let (y0, y1) = valid_span(h, dy);
                    for kx in 0..self.kernel {
                        let dx = kx as isize - pad;
                        let (x0, x1) = valid_span(w, dx);
                        let wv = self.weight(co, ci, ky, kx);
                        let dst = grad_in.channel_mut(ci);
                        for oy in y0..y1 {
                            let iy = (oy as isize + dy) as usize;
                            let ix0 = (x0 as isize + dx) as usize;
                            let go_row = &go[oy * w + x0..oy * w + x1];
                            let in_row = &mut dst[iy * w + ix0..iy * w + ix0 + (x1 - x0)];
                            for (g, &o) in in_row.iter_mut().zip(go_row) {
                                *g += wv * o;
                            }
                        }
                    }
                }
            }
        }
        grad_in
    }
}

#[derive(Debug, Clone)]
struct Linear {
    in_features: usize,
    out_features: usize,
    weight: Vec<f32>,
    bias: Vec<f32>,
}

impl Linear {
    fn from_params(params: &LinearParams) -> Self {
        Self {
            in_features: params.in_features,
            out_features: params.out_features,
            weight: params.weight.clone(),
            bias: params.bias.clone(),
        }
    }

    fn forward(&self, input: &[f32]) -> Vec<f32> {
        (0..self.out_features)
            .map(|o| {
                let row = &self.weight[o * self.in_features..(o + 1) * self.in_features];
                self.bias[o] + row.iter().zip(input).map(|(w, x)| w * x).sum::<f32>()
            })
            .collect()
    }
}

#[derive(Debug, Clone)]
struct ResidualBlock {
    name: String,
    conv1: Conv2d,
    conv2: Conv2d,
}

// ============================================================================
// Forward trace
// ============================================================================

/// Cached values of one residual block needed by the reverse pass
struct BlockTrace {
    /// conv1 output before its ReLU
    hidden_pre: Tensor,
    /// `x + conv2(...)` before the output ReLU
    sum_pre: Tensor,
}

struct Trace {
    stem_pre: Tensor,
    blocks: Vec<BlockTrace>,
    /// Activation of the last layer that was evaluated
    output: Tensor,
}

fn relu(t: &Tensor) -> Tensor {
    t.map(|v| v.max(0.0))
}

/// `grad * relu'(pre)`, with a zero derivative at zero
fn relu_backward(grad: &Tensor, pre: &Tensor) -> Tensor {
    let mut out = grad.clone();
    for (g, &p) in out.data_mut().iter_mut().zip(pre.data()) {
        if p <= 0.0 {
            *g = 0.0;
        }
    }
    out
}

// ============================================================================
// Classifier
// ============================================================================

/// Residual convolutional classifier loaded from a [`ModelParams`] file
#[derive(Debug, Clone)]
pub struct ResidualClassifier {
    architecture: Architecture,
    stem: Conv2d,
    blocks: Vec<ResidualBlock>,
    head: Linear,
}

impl ResidualClassifier {
    /// Build a network from validated parameters
    pub fn from_params(params: &ModelParams) -> Result<Self> {
        params.validate()?;
        Ok(Self {
            architecture: params.architecture.clone(),
            stem: Conv2d::from_params(&params.stem),
            blocks: params
                .blocks
                .iter()
                .map(|block| ResidualBlock {
                    name: block.name.clone(),
                    conv1: Conv2d::from_params(&block.conv1),
                    conv2: Conv2d::from_params(&block.conv2),
                })
                .collect(),
            head: Linear::from_params(&params.head),
        })
    }

    /// Load a parameter file; any failure is fatal for the run
    pub fn load(path: &Path) -> Result<Self> {
        Self::from_params(&ModelParams::load(path)?)
    }

    /// Seeded, untrained network
    pub fn with_random_weights(architecture: Architecture, seed: u64) -> Result<Self> {
        Self::from_params(&ModelParams::random(architecture, seed)?)
    }

    pub fn architecture(&self) -> &Architecture {
        &self.architecture
    }

    fn check_input(&self, input: &Tensor) -> Result<()> {
        if input.channels() != self.architecture.in_channels || input.is_empty() {
            return Err(DreamError::ShapeMismatch {
                expected: (self.architecture.in_channels, input.height(), input.width()),
                actual: input.shape(),
            });
        }
        Ok(())
    }

    /// Index into the layer list: 0 is the stem, `i + 1` is block `i`
    fn layer_depth(&self, name: &str) -> Option<usize> {
        if name == STEM_LAYER {
            return Some(0);
        }
        self.blocks
            .iter()
            .position(|block| block.name == name)
            .map(|i| i + 1)
    }

    /// Run the stem and the first `depth` blocks, calling `visit` with each
    /// layer's name and activation
    fn run<F>(&self, input: &Tensor, depth: usize, mut visit: F) -> Trace
    where
        F: FnMut(&str, &Tensor),
    {
        let stem_pre = self.stem.forward(input);
        let mut current = relu(&stem_pre);
        visit(STEM_LAYER, &current);

        let mut blocks = Vec::with_capacity(depth);
        for block in self.blocks.iter().take(depth) {
            let hidden_pre = block.conv1.forward(&current);
            let residual = block.conv2.forward(&relu(&hidden_pre));
            let mut sum_pre = current;
            // Shapes match by construction: every conv preserves C x H x W
            for (s, &r) in sum_pre.data_mut().iter_mut().zip(residual.data()) {
                *s += r;
            }
            current = relu(&sum_pre);
            visit(&block.name, &current);
            blocks.push(BlockTrace {
                hidden_pre,
                sum_pre,
            });
        }

        Trace {
            stem_pre,
            blocks,
            output: current,
        }
    }
}

impl Classifier for ResidualClassifier {
    fn input_channels(&self) -> usize {
        self.architecture.in_channels
    }

    fn layers(&self) -> Vec<LayerInfo> {
        std::iter::once(STEM_LAYER.to_string())
            .chain(self.blocks.iter().map(|block| block.name.clone()))
            .map(|name| LayerInfo {
                name,
                channels: self.architecture.width,
            })
            .collect()
    }

    fn forward(&self, input: &Tensor, capture: &[&str]) -> Result<ForwardPass> {
        self.check_input(input)?;
        for &name in capture {
            if self.layer_depth(name).is_none() {
                return Err(unknown_layer(self, name));
            }
        }

        let mut activations = HashMap::new();
        let trace = self.run(input, self.blocks.len(), |name, activation| {
            if capture.contains(&name) {
                activations.insert(name.to_string(), activation.clone());
            }
        });

        let pooled: Vec<f32> = (0..trace.output.channels())
            .map(|c| {
                let plane = trace.output.channel(c);
                plane.iter().sum::<f32>() / plane.len() as f32
            })
            .collect();

        Ok(ForwardPass {
            logits: self.head.forward(&pooled),
            activations,
        })
    }

    fn activation_gradient(
        &self,
        input: &Tensor,
        target: &ActivationTarget,
    ) -> Result<ActivationGradient> {
        self.check_input(input)?;
        let depth = self
            .layer_depth(&target.layer)
            .ok_or_else(|| unknown_layer(self, &target.layer))?;
        if target.channel >= self.architecture.width {
            return Err(DreamError::ChannelOutOfRange {
                layer: target.layer.clone(),
                channel: target.channel,
                channels: self.architecture.width,
            });
        }

        // Blocks past the target layer do not affect its activation
        let trace = self.run(input, depth, |_, _| {});
        let (channels, h, w) = trace.output.shape();
        let plane = trace.output.channel(target.channel);
        let objective = plane.iter().map(|&v| v as f64).sum::<f64>() / plane.len() as f64;

        // d(mean)/d(activation): uniform over the target channel
        let mut grad = Tensor::zeros(channels, h, w);
        grad.channel_mut(target.channel)
            .fill(1.0 / (h * w) as f32);

        for (block, cache) in self.blocks.iter().zip(&trace.blocks).rev() {
            let grad_sum = relu_backward(&grad, &cache.sum_pre);
            let grad_hidden = relu_backward(&block.conv2.backward_input(&grad_sum), &cache.hidden_pre);
            let through_branch = block.conv1.backward_input(&grad_hidden);
            grad = grad_sum;
            for (g, &b) in grad.data_mut().iter_mut().zip(through_branch.data()) {
                *g += b;
            }
        }

        let grad_stem = relu_backward(&grad, &trace.stem_pre);
        Ok(ActivationGradient {
            objective: objective as f32,
            input_gradient: self.stem.backward_input(&grad_stem),
        })
    }
}
