//! Tiled gradient engine
//!
//! Evaluates the classifier on square tiles of a randomly rolled copy of
//! the representation and stitches the per-tile input gradients back into
//! one full-size gradient. The random toroidal shift moves tile seams to a
//! new place on every call.

use log::trace;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::error::{DreamError, Result};
use crate::neural::{ActivationTarget, Classifier};
use crate::tensor::Tensor;

// ============================================================================
// Tile grid
// ============================================================================

/// Tile origins covering an `height × width` plane
///
/// Origins step by `tile_size` from 0 up to (excluding)
/// `max(len - tile_size / 2, tile_size)` on each axis, so a dimension
/// smaller than a tile still gets one tile. Tiles that run past an edge are
/// clipped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TileGrid {
    pub height: usize,
    pub width: usize,
    pub tile_size: usize,
}

fn axis_origins(len: usize, tile_size: usize) -> Vec<usize> {
    let stop = len.saturating_sub(tile_size / 2).max(tile_size);
    (0..stop).step_by(tile_size).collect()
}

impl TileGrid {
    pub fn new(height: usize, width: usize, tile_size: usize) -> Result<Self> {
        if tile_size == 0 {
            return Err(DreamError::InvalidGeometry {
                reason: "tile size must be positive".to_string(),
            });
        }
        Ok(Self {
            height,
            width,
            tile_size,
        })
    }

    /// Row origins
    pub fn rows(&self) -> Vec<usize> {
        axis_origins(self.height, self.tile_size)
    }

    /// Column origins
    pub fn cols(&self) -> Vec<usize> {
        axis_origins(self.width, self.tile_size)
    }

    /// `(y, x)` origins in row-major order
    pub fn origins(&self) -> Vec<(usize, usize)> {
        let cols = self.cols();
        self.rows()
            .into_iter()
            .flat_map(|y| cols.iter().map(move |&x| (y, x)))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.rows().len() * self.cols().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// How many tiles cover each element, row-major `height × width`
    pub fn coverage(&self) -> Vec<u32> {
        let mut counts = vec![0u32; self.height * self.width];
        for (y, x) in self.origins() {
            for row in y..(y + self.tile_size).min(self.height) {
                for col in x..(x + self.tile_size).min(self.width) {
                    counts[row * self.width + col] += 1;
                }
            }
        }
        counts
    }
}

// ============================================================================
// Engine
// ============================================================================

/// Full-size gradient plus bookkeeping from one engine call
#[derive(Debug, Clone)]
pub struct TiledGradient {
    /// d(objective)/d(representation), aligned with the unshifted input
    pub gradient: Tensor,
    /// Mean of the per-tile objectives
    pub objective: f32,
    /// Number of tiles evaluated
    pub tiles: usize,
    /// `(sy, sx)` roll applied before tiling
    pub shift: (usize, usize),
}

/// Gradient engine with its own seeded shift generator
#[derive(Debug, Clone)]
pub struct TiledGradientEngine {
    tile_size: usize,
    rng: StdRng,
}

impl TiledGradientEngine {
    /// Create an engine; `seed = None` seeds from system entropy
    pub fn new(tile_size: usize, seed: Option<u64>) -> Result<Self> {
        if tile_size == 0 {
            return Err(DreamError::InvalidGeometry {
                reason: "tile size must be positive".to_string(),
            });
        }
        let rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Ok(Self { tile_size, rng })
    }

    pub fn tile_size(&self) -> usize {
        self.tile_size
    }

    /// Draw the next `(sx, sy)` shift, each uniform in `[0, tile_size)`
    fn draw_shift(&mut self) -> (usize, usize) {
        let sx = self.rng.gen_range(0..self.tile_size);
        let sy = self.rng.gen_range(0..self.tile_size);
        (sx, sy)
    }

    /// Gradient of the target activation's mean with respect to
    /// `representation`
    ///
    /// # Arguments
    /// * `classifier` - Network evaluated once per tile
    /// * `target` - Layer and channel whose mean activation is the objective
    /// * `representation` - `C × H × W` input
    ///
    /// # Returns
    /// A gradient with the same shape as `representation`.
    ///
    /// # Errors
    /// Propagates classifier errors; `ShapeMismatch` if a tile gradient does
    /// not match its tile.
    pub fn compute<C: Classifier + ?Sized>(
        &mut self,
        classifier: &C,
        target: &ActivationTarget,
        representation: &Tensor,
    ) -> Result<TiledGradient> {
        let (channels, height, width) = representation.shape();
        let (sx, sy) = self.draw_shift();
        let shifted = representation.roll(sy as isize, sx as isize);

        let grid = TileGrid::new(height, width, self.tile_size)?;
        let mut gradient = Tensor::zeros(channels, height, width);
        let mut objective_sum = 0.0f64;
        let mut tiles = 0usize;

        for (y, x) in grid.origins() {
            let frame = shifted.crop(y, x, self.tile_size, self.tile_size);
            let tile = classifier.activation_gradient(&frame, target)?;
            if tile.input_gradient.shape() != frame.shape() {
                return Err(DreamError::ShapeMismatch {
                    expected: frame.shape(),
                    actual: tile.input_gradient.shape(),
                });
            }
            gradient.paste(y, x, &tile.input_gradient)?;
            objective_sum += tile.objective as f64;
            tiles += 1;
        }

        trace!(
            "tiled gradient: {} tiles of {} at shift ({}, {})",
            tiles,
            self.tile_size,
            sy,
            sx
        );

        Ok(TiledGradient {
            gradient: gradient.roll(-(sy as isize), -(sx as isize)),
            objective: (objective_sum / tiles.max(1) as f64) as f32,
            tiles,
            shift: (sy, sx),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::neural::{ConstantGradientClassifier, TileMeanClassifier};
    use test_case::test_case;

    fn constant_target() -> ActivationTarget {
        ActivationTarget {
            layer: ConstantGradientClassifier::LAYER.to_string(),
            channel: 0,
        }
    }

    #[test_case(10, 10, 128 ; "smaller than one tile")]
    #[test_case(256, 384, 128 ; "exact multiple")]
    #[test_case(200, 200, 128 ; "remainder over half a tile")]
    #[test_case(1, 300, 64 ; "single row")]
    fn test_full_unique_coverage(height: usize, width: usize, tile: usize) {
        let grid = TileGrid::new(height, width, tile).unwrap();
        assert!(grid.coverage().iter().all(|&n| n == 1));
    }

    #[test]
    fn test_thin_remainder_left_for_later_shifts() {
        // 140 = 128 + 12, and 12 < 64: the last 12 rows get no tile this call
        let grid = TileGrid::new(140, 128, 128).unwrap();
        assert_eq!(grid.rows(), vec![0]);
        let coverage = grid.coverage();
        assert!(coverage[..128 * 128].iter().all(|&n| n == 1));
        assert!(coverage[128 * 128..].iter().all(|&n| n == 0));
    }

    #[test]
    fn test_at_least_one_tile() {
        let grid = TileGrid::new(3, 5, 128).unwrap();
        assert_eq!(grid.origins(), vec![(0, 0)]);
        assert!(!grid.is_empty());
    }

    #[test]
    fn test_constant_gradient_fills_accumulator() {
        let classifier = ConstantGradientClassifier::new(2, 0.25);
        let mut engine = TiledGradientEngine::new(16, Some(3)).unwrap();
        let input = Tensor::zeros(2, 48, 48);
        let result = engine.compute(&classifier, &constant_target(), &input).unwrap();
        assert_eq!(result.tiles, 9);
        assert_eq!(classifier.calls(), 9);
        assert!(result.gradient.data().iter().all(|&g| g == 0.25));
    }

    #[test]
    fn test_same_seed_is_bit_identical() {
        let classifier = TileMeanClassifier::new(2);
        let target = ActivationTarget {
            layer: TileMeanClassifier::LAYER.to_string(),
            channel: 0,
        };
        let input = Tensor::from_fn(2, 50, 70, |c, y, x| (c + y * x) as f32 * 0.01);
        let mut a = TiledGradientEngine::new(32, Some(42)).unwrap();
        let mut b = TiledGradientEngine::new(32, Some(42)).unwrap();
        for _ in 0..3 {
            let ga = a.compute(&classifier, &target, &input).unwrap();
            let gb = b.compute(&classifier, &target, &input).unwrap();
            assert_eq!(ga.shift, gb.shift);
            assert_eq!(ga.gradient, gb.gradient);
        }
    }

    #[test]
    fn test_shift_within_tile() {
        let mut engine = TiledGradientEngine::new(8, Some(1)).unwrap();
        for _ in 0..100 {
            let (sx, sy) = engine.draw_shift();
            assert!(sx < 8 && sy < 8);
        }
    }

    #[test]
    fn test_gradient_is_unshifted() {
        // Tile-mean gradients are 1/(tile area) on channel 0; with an exact
        // multiple every element sees a full tile, regardless of the shift
        let classifier = TileMeanClassifier::new(2);
        let target = ActivationTarget {
            layer: TileMeanClassifier::LAYER.to_string(),
            channel: 0,
        };
        let mut engine = TiledGradientEngine::new(8, Some(9)).unwrap();
        let result = engine
            .compute(&classifier, &target, &Tensor::zeros(2, 16, 24))
            .unwrap();
        assert!(result.gradient.channel(0).iter().all(|&g| g == 1.0 / 64.0));
        assert!(result.gradient.channel(1).iter().all(|&g| g == 0.0));
    }
}
