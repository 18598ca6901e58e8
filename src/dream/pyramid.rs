//! Octave pyramid
//!
//! Splits a representation into a coarse base plus one high-frequency
//! detail level per octave step. Each step shrinks the current level by
//! `octave_scale` with bilinear resampling and keeps what the shrink lost:
//!
//! ```text
//! lo     = resize(current, floor(h / scale), floor(w / scale))
//! detail = current - resize(lo, h, w)
//! ```
//!
//! Details are stored finest first. Reconstruction walks them from the end,
//! so octave `k > 0` pulls `details[len - k]`.

use crate::error::{DreamError, Result};
use crate::tensor::Tensor;

/// Coarse base plus detail levels of a representation
#[derive(Debug, Clone)]
pub struct OctavePyramid {
    base: Tensor,
    /// Finest first
    details: Vec<Tensor>,
}

/// Spatial size of the next coarser octave
fn coarser_size(height: usize, width: usize, octave_scale: f32) -> (usize, usize) {
    (
        (height as f32 / octave_scale) as usize,
        (width as f32 / octave_scale) as usize,
    )
}

/// Upsample `current` to the detail's size and add the detail back in
pub fn merge_detail(current: &Tensor, detail: &Tensor) -> Result<Tensor> {
    current.resize(detail.height(), detail.width())?.add(detail)
}

impl OctavePyramid {
    /// Build a pyramid with `n_octaves - 1` detail levels
    ///
    /// # Errors
    /// * `InvalidConfig` - If `n_octaves` is 0 or `octave_scale <= 1`
    /// * `InvalidGeometry` - If an octave would shrink to an empty size
    pub fn decompose(representation: &Tensor, n_octaves: usize, octave_scale: f32) -> Result<Self> {
        if n_octaves == 0 {
            return Err(DreamError::InvalidConfig {
                reason: "n_octaves must be at least 1".to_string(),
            });
        }
        if !(octave_scale > 1.0) {
            return Err(DreamError::InvalidConfig {
                reason: format!("octave_scale must be greater than 1, got {}", octave_scale),
            });
        }

        let mut current = representation.clone();
        let mut details = Vec::with_capacity(n_octaves - 1);
        for octave in 0..n_octaves - 1 {
            let (h, w) = (current.height(), current.width());
            let (lo_h, lo_w) = coarser_size(h, w, octave_scale);
            if lo_h == 0 || lo_w == 0 {
                return Err(DreamError::InvalidGeometry {
                    reason: format!(
                        "octave {} of {}: {}x{} shrinks to {}x{} at scale {}",
                        octave + 1,
                        n_octaves,
                        h,
                        w,
                        lo_h,
                        lo_w,
                        octave_scale
                    ),
                });
            }
            let lo = current.resize(lo_h, lo_w)?;
            let detail = current.sub(&lo.resize(h, w)?)?;
            details.push(detail);
            current = lo;
        }

        Ok(Self {
            base: current,
            details,
        })
    }

    /// Coarsest level
    pub fn base(&self) -> &Tensor {
        &self.base
    }

    /// Detail levels, finest first
    pub fn details(&self) -> &[Tensor] {
        &self.details
    }

    /// Number of octaves, including the base
    pub fn num_octaves(&self) -> usize {
        self.details.len() + 1
    }

    /// Detail merged in at the start of `octave`
    ///
    /// Octave 0 works on the base alone and has no detail; octave `k` uses
    /// `details[len - k]`.
    pub fn detail_for_octave(&self, octave: usize) -> Option<&Tensor> {
        if octave == 0 || octave > self.details.len() {
            return None;
        }
        self.details.get(self.details.len() - octave)
    }

    /// Recombine all levels without optimization
    pub fn reconstruct(&self) -> Result<Tensor> {
        let mut current = self.base.clone();
        for octave in 1..self.num_octaves() {
            if let Some(detail) = self.detail_for_octave(octave) {
                current = merge_detail(&current, detail)?;
            }
        }
        Ok(current)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn texture(h: usize, w: usize) -> Tensor {
        Tensor::from_fn(2, h, w, |c, y, x| {
            ((y as f32 * 0.37 + c as f32).sin() * (x as f32 * 0.21).cos()) * 10.0
        })
    }

    #[test]
    fn test_level_sizes() {
        let pyramid = OctavePyramid::decompose(&texture(256, 256), 3, 1.4).unwrap();
        assert_eq!(pyramid.num_octaves(), 3);
        assert_eq!(pyramid.details()[0].shape(), (2, 256, 256));
        assert_eq!(pyramid.details()[1].shape(), (2, 182, 182));
        assert_eq!(pyramid.base().shape(), (2, 130, 130));
    }

    #[test]
    fn test_octave_pairing_walks_details_from_the_end() {
        let pyramid = OctavePyramid::decompose(&texture(40, 60), 4, 1.5).unwrap();
        let details = pyramid.details();
        assert_eq!(details.len(), 3);
        assert!(pyramid.detail_for_octave(0).is_none());
        assert_eq!(pyramid.detail_for_octave(1).unwrap(), &details[2]);
        assert_eq!(pyramid.detail_for_octave(2).unwrap(), &details[1]);
        assert_eq!(pyramid.detail_for_octave(3).unwrap(), &details[0]);
        assert!(pyramid.detail_for_octave(4).is_none());

        // Coarse to fine: every merge grows the representation
        assert_eq!(pyramid.detail_for_octave(1).unwrap().shape(), (2, 17, 26));
        assert_eq!(pyramid.detail_for_octave(3).unwrap().shape(), (2, 40, 60));
    }

    #[test]
    fn test_single_octave_is_identity() {
        let input = texture(9, 7);
        let pyramid = OctavePyramid::decompose(&input, 1, 1.4).unwrap();
        assert!(pyramid.details().is_empty());
        assert_eq!(pyramid.reconstruct().unwrap(), input);
    }

    #[test]
    fn test_reconstruction_recovers_input() {
        let input = texture(64, 96);
        let pyramid = OctavePyramid::decompose(&input, 4, 1.4).unwrap();
        let rebuilt = pyramid.reconstruct().unwrap();
        assert!(rebuilt.max_abs_diff(&input).unwrap() < 1e-3);
    }

    #[test]
    fn test_too_many_octaves_is_geometry_error() {
        let result = OctavePyramid::decompose(&texture(4, 4), 6, 2.0);
        assert!(matches!(result, Err(DreamError::InvalidGeometry { .. })));
    }
}
