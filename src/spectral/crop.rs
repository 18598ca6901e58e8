//! Random time crops
//!
//! Cuts a fixed number of frames out of a representation at a random
//! offset. The random source is owned by the crop and seeded explicitly so
//! its sequence is independent of every other generator in the crate.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::error::{DreamError, Result};
use crate::tensor::Tensor;

/// Crops `crop_width` frames starting at a random frame
#[derive(Debug, Clone)]
pub struct RandomCrop {
    crop_width: usize,
    rng: StdRng,
}

impl RandomCrop {
    /// Create a crop with its own random stream; `None` seeds from entropy
    pub fn new(crop_width: usize, seed: Option<u64>) -> Self {
        let rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Self { crop_width, rng }
    }

    pub fn crop_width(&self) -> usize {
        self.crop_width
    }

    /// Crop along the time (width) axis
    ///
    /// The start frame is drawn from `[0, width - crop_width)`.
    ///
    /// # Errors
    /// `InvalidGeometry` unless the representation is strictly wider than
    /// the crop.
    pub fn apply(&mut self, representation: &Tensor) -> Result<Tensor> {
        let width = representation.width();
        if self.crop_width == 0 || width <= self.crop_width {
            return Err(DreamError::InvalidGeometry {
                reason: format!(
                    "cannot crop {} frames out of {}",
                    self.crop_width, width
                ),
            });
        }
        let start = self.rng.gen_range(0..width - self.crop_width);
        Ok(representation.crop(0, start, representation.height(), self.crop_width))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frames(width: usize) -> Tensor {
        Tensor::from_fn(2, 4, width, |_, _, x| x as f32)
    }

    #[test]
    fn test_crop_width_and_contiguity() {
        let mut crop = RandomCrop::new(8, Some(3));
        let out = crop.apply(&frames(50)).unwrap();
        assert_eq!(out.shape(), (2, 4, 8));
        let start = out.get(0, 0, 0);
        for x in 0..8 {
            assert_eq!(out.get(1, 3, x), start + x as f32);
        }
    }

    #[test]
    fn test_same_seed_same_offsets() {
        let input = frames(100);
        let mut a = RandomCrop::new(10, Some(42));
        let mut b = RandomCrop::new(10, Some(42));
        for _ in 0..5 {
            assert_eq!(a.apply(&input).unwrap(), b.apply(&input).unwrap());
        }
    }

    #[test]
    fn test_too_narrow_input_rejected() {
        let mut crop = RandomCrop::new(10, Some(0));
        assert!(crop.apply(&frames(10)).is_err());
    }
}
