//! Rolling-ball background estimation.
//!
//! The background is the grayscale opening of the image with a ball: the
//! highest surface the ball's top can trace while rolled underneath the
//! intensity landscape. Peaks narrower than the ball are cut off; slowly
//! varying background is followed closely.
//!
//! For large radii the image is first shrunk by block minimum and the
//! opened result is enlarged back by bilinear interpolation. A ball of
//! radius 25 is rolled at half resolution, which keeps the cost of the
//! per-position footprint scan manageable.

/// Spherical structuring element, possibly at reduced resolution.
pub(crate) struct RollingBall {
    /// Cap heights above the rim, row-major, `width * width` entries.
    heights: Vec<f32>,
    /// Side length of the footprint (always odd).
    width: usize,
    /// Image reduction factor the ball was built for.
    shrink_factor: usize,
    radius: f64,
    arc_trim_percent: usize,
}

/// Shrink factor and rim trim (percent of the reduced radius) for a
/// ball of the given radius.
fn shrink_for_radius(radius: f64) -> (usize, usize) {
    if radius <= 10.0 {
        (1, 24)
    } else if radius <= 30.0 {
        (2, 24)
    } else if radius <= 100.0 {
        (4, 32)
    } else {
        (8, 40)
    }
}

impl RollingBall {
    /// Build a ball of `radius` pixels (in full-resolution units).
    pub(crate) fn new(radius: f64) -> Self {
        let (shrink_factor, arc_trim_percent) = shrink_for_radius(radius);
        Self::build(radius, shrink_factor, arc_trim_percent)
    }

    #[allow(
        clippy::cast_possible_truncation,
        clippy::cast_sign_loss,
        clippy::cast_precision_loss
    )]
    fn build(radius: f64, shrink_factor: usize, arc_trim_percent: usize) -> Self {
        let small_radius = (radius / shrink_factor as f64).max(1.0);
        let r_square = small_radius * small_radius;
        let x_trim = (arc_trim_percent as f64 * small_radius) as usize / 100;
        let half_width = (small_radius - x_trim as f64).round() as usize;
        let width = 2 * half_width + 1;

        let mut heights = Vec::with_capacity(width * width);
        for y in 0..width {
            for x in 0..width {
                let dx = x as f64 - half_width as f64;
                let dy = y as f64 - half_width as f64;
                let temp = r_square - dx * dx - dy * dy;
                heights.push(if temp > 0.0 { temp.sqrt() as f32 } else { 0.0 });
            }
        }

        Self {
            heights,
            width,
            shrink_factor,
            radius,
            arc_trim_percent,
        }
    }

    /// Footprint side length.
    #[cfg(test)]
    pub(crate) const fn width(&self) -> usize {
        self.width
    }

    /// Image reduction factor.
    #[cfg(test)]
    pub(crate) const fn shrink_factor(&self) -> usize {
        self.shrink_factor
    }

    /// Estimate the background under `samples` (row-major, non-empty).
    ///
    /// Images too small to shrink to at least 2×2 are processed at full
    /// resolution with a correspondingly larger ball.
    pub(crate) fn background(&self, samples: &[f32], width: usize, height: usize) -> Vec<f32> {
        let factor = self.shrink_factor;
        if factor == 1 {
            return self.roll(samples, width, height);
        }
        let (small_width, small_height) = (width.div_ceil(factor), height.div_ceil(factor));
        if small_width < 2 || small_height < 2 {
            return Self::build(self.radius, 1, self.arc_trim_percent).roll(samples, width, height);
        }
        let small = shrink(samples, width, height, factor);
        let rolled = self.roll(&small, small_width, small_height);
        enlarge(&rolled, small_width, small_height, width, height, factor)
    }

    /// Pairs of (image index, ball index) covered by the ball centered at
    /// footprint-grid position `(cx, cy)`.
    ///
    /// Grid position `(cx, cy)` corresponds to image position
    /// `(cx - r, cy - r)` where `r` is the ball's half width, so the grid
    /// spans every center whose footprint touches the image.
    fn footprint(
        &self,
        cx: usize,
        cy: usize,
        width: usize,
        height: usize,
    ) -> impl Iterator<Item = (usize, usize)> + '_ {
        let span = self.width - 1;
        let (x0, x1) = (cx.saturating_sub(span), cx.min(width - 1));
        let (y0, y1) = (cy.saturating_sub(span), cy.min(height - 1));
        (y0..=y1).flat_map(move |y| {
            let ball_row = (y + span - cy) * self.width;
            (x0..=x1).map(move |x| (y * width + x, ball_row + x + span - cx))
        })
    }

    /// Grayscale opening of `samples` with the ball.
    fn roll(&self, samples: &[f32], width: usize, height: usize) -> Vec<f32> {
        let span = self.width - 1;
        let (grid_width, grid_height) = (width + span, height + span);

        // Erosion: the highest the ball can sit at each center without
        // poking through the image.
        let mut lift = vec![0.0_f32; grid_width * grid_height];
        for cy in 0..grid_height {
            for cx in 0..grid_width {
                lift[cy * grid_width + cx] = self
                    .footprint(cx, cy, width, height)
                    .map(|(p, b)| samples[p] - self.heights[b])
                    .fold(f32::MAX, f32::min);
            }
        }

        // Dilation: every pixel takes the highest ball surface above it.
        let mut background = vec![f32::MIN; width * height];
        for cy in 0..grid_height {
            for cx in 0..grid_width {
                let z = lift[cy * grid_width + cx];
                for (p, b) in self.footprint(cx, cy, width, height) {
                    background[p] = background[p].max(z + self.heights[b]);
                }
            }
        }
        background
    }
}

/// Reduce by `factor` on both axes, keeping each block's minimum.
fn shrink(samples: &[f32], width: usize, height: usize, factor: usize) -> Vec<f32> {
    let small_width = width.div_ceil(factor);
    let mut small = vec![f32::MAX; small_width * height.div_ceil(factor)];
    for y in 0..height {
        for x in 0..width {
            let cell = &mut small[(y / factor) * small_width + x / factor];
            *cell = cell.min(samples[y * width + x]);
        }
    }
    small
}

/// Source index and weight of the lower neighbor for each output
/// position along one axis.
///
/// Weights are measured between pixel centers and extrapolate past the
/// outermost reduced pixels. Requires `small_length >= 2`.
#[allow(clippy::cast_precision_loss)]
fn interpolation_axis(length: usize, small_length: usize, factor: usize) -> Vec<(usize, f32)> {
    (0..length)
        .map(|i| {
            let index = (i.saturating_sub(factor / 2) / factor).min(small_length - 2);
            let distance = (i as f32 + 0.5) / factor as f32 - (index as f32 + 0.5);
            (index, 1.0 - distance)
        })
        .collect()
}

/// Bilinear enlargement of a reduced image back to `width × height`.
fn enlarge(
    small: &[f32],
    small_width: usize,
    small_height: usize,
    width: usize,
    height: usize,
    factor: usize,
) -> Vec<f32> {
    let xs = interpolation_axis(width, small_width, factor);
    let ys = interpolation_axis(height, small_height, factor);
    let mut enlarged = Vec::with_capacity(width * height);
    for &(iy, wy) in &ys {
        let upper = &small[iy * small_width..(iy + 1) * small_width];
        let lower = &small[(iy + 1) * small_width..(iy + 2) * small_width];
        for &(ix, wx) in &xs {
            let top = upper[ix].mul_add(wx, upper[ix + 1] * (1.0 - wx));
            let bottom = lower[ix].mul_add(wx, lower[ix + 1] * (1.0 - wx));
            enlarged.push(top.mul_add(wy, bottom * (1.0 - wy)));
        }
    }
    enlarged
}
