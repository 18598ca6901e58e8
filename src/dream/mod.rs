//! Deep dream core
//!
//! - `config`: run parameters and validation
//! - `pyramid`: octave decomposition and recombination
//! - `gradient`: tiled, randomly shifted gradient evaluation
//! - `driver`: octave-by-octave gradient ascent

pub mod config;
pub mod driver;
pub mod gradient;
pub mod pyramid;

pub use config::{DreamConfig, DEFAULT_TILE_SIZE};
pub use driver::{DeepDream, DreamOutcome, IterationRecord, GRADIENT_EPSILON};
pub use gradient::{TileGrid, TiledGradient, TiledGradientEngine};
pub use pyramid::{merge_detail, OctavePyramid};
