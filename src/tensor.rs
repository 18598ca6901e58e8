//! Dense channel-major tensors
//!
//! A [`Tensor`] is a `C × H × W` grid of `f32` values stored contiguously in
//! channel-major order. It stands for a batch of exactly one: every place
//! that talks about a `[1, C, H, W]` input uses a `Tensor` directly.
//!
//! For spectrogram representations `H` is the frequency axis and `W` is the
//! time axis.

use crate::error::{DreamError, Result};

/// Channel-major `C × H × W` tensor of `f32`
#[derive(Debug, Clone, PartialEq)]
pub struct Tensor {
    channels: usize,
    height: usize,
    width: usize,
    data: Vec<f32>,
}

impl Tensor {
    /// Create a zero-filled tensor
    pub fn zeros(channels: usize, height: usize, width: usize) -> Self {
        Self {
            channels,
            height,
            width,
            data: vec![0.0; channels * height * width],
        }
    }

    /// Create a tensor filled with a constant
    pub fn filled(channels: usize, height: usize, width: usize, value: f32) -> Self {
        Self {
            channels,
            height,
            width,
            data: vec![value; channels * height * width],
        }
    }

    /// Wrap existing channel-major data
    ///
    /// # Errors
    /// `ShapeMismatch` if `data.len()` does not equal `channels * height * width`.
    pub fn from_vec(channels: usize, height: usize, width: usize, data: Vec<f32>) -> Result<Self> {
        if data.len() != channels * height * width {
            return Err(DreamError::ShapeMismatch {
                expected: (channels, height, width),
                actual: (1, 1, data.len()),
            });
        }
        Ok(Self {
            channels,
            height,
            width,
            data,
        })
    }

    /// Build a tensor by evaluating `f(c, y, x)` at every position
    pub fn from_fn<F>(channels: usize, height: usize, width: usize, mut f: F) -> Self
    where
        F: FnMut(usize, usize, usize) -> f32,
    {
        let mut data = Vec::with_capacity(channels * height * width);
        for c in 0..channels {
            for y in 0..height {
                for x in 0..width {
                    data.push(f(c, y, x));
                }
            }
        }
        Self {
            channels,
            height,
            width,
            data,
        }
    }

    /// Stack equally sized single-channel planes into one tensor
    pub fn stack(planes: &[Vec<f32>], height: usize, width: usize) -> Result<Self> {
        let mut data = Vec::with_capacity(planes.len() * height * width);
        for plane in planes {
            if plane.len() != height * width {
                return Err(DreamError::ShapeMismatch {
                    expected: (1, height, width),
                    actual: (1, 1, plane.len()),
                });
            }
            data.extend_from_slice(plane);
        }
        Ok(Self {
            channels: planes.len(),
            height,
            width,
            data,
        })
    }

    /// `(channels, height, width)`
    #[inline]
    pub fn shape(&self) -> (usize, usize, usize) {
        (self.channels, self.height, self.width)
    }

    #[inline]
    pub fn channels(&self) -> usize {
        self.channels
    }

    #[inline]
    pub fn height(&self) -> usize {
        self.height
    }

    #[inline]
    pub fn width(&self) -> usize {
        self.width
    }

    /// Total number of elements
    #[inline]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    #[inline]
    fn index(&self, c: usize, y: usize, x: usize) -> usize {
        (c * self.height + y) * self.width + x
    }

    #[inline]
    pub fn get(&self, c: usize, y: usize, x: usize) -> f32 {
        self.data[self.index(c, y, x)]
    }

    #[inline]
    pub fn set(&mut self, c: usize, y: usize, x: usize, value: f32) {
        let i = self.index(c, y, x);
        self.data[i] = value;
    }

    pub fn data(&self) -> &[f32] {
        &self.data
    }

    pub fn data_mut(&mut self) -> &mut [f32] {
        &mut self.data
    }

    pub fn into_vec(self) -> Vec<f32> {
        self.data
    }

    /// Borrow one channel as an `H × W` row-major plane
    pub fn channel(&self, c: usize) -> &[f32] {
        let plane = self.height * self.width;
        &self.data[c * plane..(c + 1) * plane]
    }

    pub fn channel_mut(&mut self, c: usize) -> &mut [f32] {
        let plane = self.height * self.width;
        &mut self.data[c * plane..(c + 1) * plane]
    }

    fn check_same_shape(&self, other: &Tensor) -> Result<()> {
        if self.shape() != other.shape() {
            return Err(DreamError::ShapeMismatch {
                expected: self.shape(),
                actual: other.shape(),
            });
        }
        Ok(())
    }

    /// Element-wise `self + other`
    pub fn add(&self, other: &Tensor) -> Result<Tensor> {
        self.check_same_shape(other)?;
        let mut out = self.clone();
        for (o, &b) in out.data.iter_mut().zip(other.data.iter()) {
            *o += b;
        }
        Ok(out)
    }

    /// Element-wise `self - other`
    pub fn sub(&self, other: &Tensor) -> Result<Tensor> {
        self.check_same_shape(other)?;
        let mut out = self.clone();
        for (o, &b) in out.data.iter_mut().zip(other.data.iter()) {
            *o -= b;
        }
        Ok(out)
    }

    /// In-place `self += scale * other`
    pub fn add_scaled_assign(&mut self, other: &Tensor, scale: f32) -> Result<()> {
        self.check_same_shape(other)?;
        for (o, &b) in self.data.iter_mut().zip(other.data.iter()) {
            *o += scale * b;
        }
        Ok(())
    }

    /// Multiply every element by `factor`
    pub fn scale_assign(&mut self, factor: f32) {
        for v in &mut self.data {
            *v *= factor;
        }
    }

    /// Apply `f` to every element
    pub fn map<F: Fn(f32) -> f32>(&self, f: F) -> Tensor {
        Tensor {
            channels: self.channels,
            height: self.height,
            width: self.width,
            data: self.data.iter().map(|&v| f(v)).collect(),
        }
    }

    pub fn mean(&self) -> f32 {
        if self.data.is_empty() {
            return 0.0;
        }
        let sum: f64 = self.data.iter().map(|&v| v as f64).sum();
        (sum / self.data.len() as f64) as f32
    }

    /// Mean absolute value
    pub fn mean_abs(&self) -> f32 {
        if self.data.is_empty() {
            return 0.0;
        }
        let sum: f64 = self.data.iter().map(|&v| v.abs() as f64).sum();
        (sum / self.data.len() as f64) as f32
    }

    pub fn max(&self) -> f32 {
        self.data.iter().copied().fold(f32::NEG_INFINITY, f32::max)
    }

    pub fn min(&self) -> f32 {
        self.data.iter().copied().fold(f32::INFINITY, f32::min)
    }

    /// Largest absolute element-wise difference to `other`
    pub fn max_abs_diff(&self, other: &Tensor) -> Result<f32> {
        self.check_same_shape(other)?;
        Ok(self
            .data
            .iter()
            .zip(other.data.iter())
            .map(|(a, b)| (a - b).abs())
            .fold(0.0, f32::max))
    }

    /// Circular shift along the two spatial axes
    ///
    /// Content at `(y, x)` moves to `((y + dy) mod H, (x + dx) mod W)`, so
    /// whatever leaves one edge re-enters at the opposite edge. Negative
    /// shifts move content the other way; `roll(dy, dx).roll(-dy, -dx)` is
    /// the identity.
    pub fn roll(&self, dy: isize, dx: isize) -> Tensor {
        if self.is_empty() {
            return self.clone();
        }
        let h = self.height as isize;
        let w = self.width as isize;
        let dy = dy.rem_euclid(h) as usize;
        let dx = dx.rem_euclid(w) as usize;

        let mut out = Tensor::zeros(self.channels, self.height, self.width);
        for c in 0..self.channels {
            for y in 0..self.height {
                let ty = (y + dy) % self.height;
                for x in 0..self.width {
                    let tx = (x + dx) % self.width;
                    let v = self.get(c, y, x);
                    out.set(c, ty, tx, v);
                }
            }
        }
        out
    }

    /// Copy out the `height × width` window starting at `(y, x)`
    ///
    /// The window is clipped to the tensor bounds, so the result may be
    /// smaller than requested when it runs past an edge.
    pub fn crop(&self, y: usize, x: usize, height: usize, width: usize) -> Tensor {
        let y_end = (y + height).min(self.height);
        let x_end = (x + width).min(self.width);
        let h = y_end.saturating_sub(y);
        let w = x_end.saturating_sub(x);

        let mut out = Tensor::zeros(self.channels, h, w);
        for c in 0..self.channels {
            for dy in 0..h {
                let src = self.index(c, y + dy, x);
                let dst = out.index(c, dy, 0);
                out.data[dst..dst + w].copy_from_slice(&self.data[src..src + w]);
            }
        }
        out
    }

    /// Write `patch` into this tensor with its top-left corner at `(y, x)`
    ///
    /// Parts of the patch that fall outside the tensor are dropped.
    pub fn paste(&mut self, y: usize, x: usize, patch: &Tensor) -> Result<()> {
        if patch.channels != self.channels {
            return Err(DreamError::ShapeMismatch {
                expected: (self.channels, patch.height, patch.width),
                actual: patch.shape(),
            });
        }
        let h = patch.height.min(self.height.saturating_sub(y));
        let w = patch.width.min(self.width.saturating_sub(x));
        for c in 0..self.channels {
            for dy in 0..h {
                let src = patch.index(c, dy, 0);
                let dst = self.index(c, y + dy, x);
                self.data[dst..dst + w].copy_from_slice(&patch.data[src..src + w]);
            }
        }
        Ok(())
    }

    /// Reverse the row order (row 0 becomes the last row)
    pub fn flip_vertical(&self) -> Tensor {
        let mut out = Tensor::zeros(self.channels, self.height, self.width);
        for c in 0..self.channels {
            for y in 0..self.height {
                let src = self.index(c, y, 0);
                let dst = out.index(c, self.height - 1 - y, 0);
                out.data[dst..dst + self.width]
                    .copy_from_slice(&self.data[src..src + self.width]);
            }
        }
        out
    }

    /// Bilinear resize of every channel to `height × width`
    ///
    /// Uses half-pixel centres with edge clamping, the same sampling grid
    /// as OpenCV's `INTER_LINEAR`. Deterministic for identical inputs.
    ///
    /// # Errors
    /// `InvalidGeometry` if either the source or the target size is empty.
    pub fn resize(&self, height: usize, width: usize) -> Result<Tensor> {
        if height == 0 || width == 0 || self.height == 0 || self.width == 0 {
            return Err(DreamError::InvalidGeometry {
                reason: format!(
                    "cannot resize {}x{} to {}x{}",
                    self.height, self.width, height, width
                ),
            });
        }
        if height == self.height && width == self.width {
            return Ok(self.clone());
        }

        let rows = sample_grid(self.height, height);
        let cols = sample_grid(self.width, width);

        let mut out = Tensor::zeros(self.channels, height, width);
        for c in 0..self.channels {
            for (oy, &(y0, y1, fy)) in rows.iter().enumerate() {
                for (ox, &(x0, x1, fx)) in cols.iter().enumerate() {
                    let top = self.get(c, y0, x0) * (1.0 - fx) + self.get(c, y0, x1) * fx;
                    let bottom = self.get(c, y1, x0) * (1.0 - fx) + self.get(c, y1, x1) * fx;
                    out.set(c, oy, ox, top * (1.0 - fy) + bottom * fy);
                }
            }
        }
        Ok(out)
    }
}

/// Source taps `(i0, i1, frac)` for each destination index along one axis
fn sample_grid(src_len: usize, dst_len: usize) -> Vec<(usize, usize, f32)> {
    let scale = src_len as f64 / dst_len as f64;
    (0..dst_len)
        .map(|d| {
            let pos = ((d as f64 + 0.5) * scale - 0.5).max(0.0);
            let i0 = (pos.floor() as usize).min(src_len - 1);
            let i1 = (i0 + 1).min(src_len - 1);
            let frac = if i0 == i1 { 0.0 } else { (pos - i0 as f64) as f32 };
            (i0, i1, frac)
        })
        .collect()
}
