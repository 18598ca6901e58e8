//! Neural classifier interfaces and implementations
//!
//! This module provides:
//! - `Classifier` trait with explicit activation capture
//! - `ResidualClassifier`, a residual CNN with analytic input gradients
//! - Parameter files and compute device selection
//! - Stub classifiers for testing

pub mod classifier;
pub mod device;
pub mod mock;
pub mod params;
pub mod residual;

pub use classifier::{
    dreamable_layers, resolve_target, ActivationGradient, ActivationTarget, Classifier,
    ForwardPass, LayerInfo, RESIDUAL_MARKER,
};
pub use device::{AcceleratorInfo, ComputeDevice};
pub use mock::{ConstantGradientClassifier, TileMeanClassifier};
pub use params::{Architecture, ModelParams, PARAMS_FORMAT_VERSION};
pub use residual::ResidualClassifier;
