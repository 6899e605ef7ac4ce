//! Background subtraction.
//!
//! Estimates a smooth background surface under each plane (rolling ball
//! or sliding paraboloid) and subtracts it. Every plane is processed
//! independently; a stack is never treated as a volume.

use serde::{Deserialize, Serialize};

use crate::lines::{map_columns, map_rows};
use crate::paraboloid;
use crate::rolling_ball::RollingBall;
use crate::types::{ImageStack, Plane};

/// Parameters for [`subtract_background`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BackgroundParams {
    /// Ball (or paraboloid curvature) radius in pixels.
    pub radius: f64,
    /// Return the estimated background instead of the subtracted image.
    pub create_background: bool,
    /// Objects are darker than the background.
    pub light_background: bool,
    /// Use a sliding paraboloid instead of a rolling ball.
    pub use_paraboloid: bool,
    /// Smooth with a 3×3 mean before estimating the background.
    pub presmooth: bool,
    /// Lower corner estimates toward their edges (paraboloid only).
    pub correct_corners: bool,
}

impl BackgroundParams {
    /// Default ball radius in pixels.
    pub const DEFAULT_RADIUS: f64 = 25.0;

    /// Plain rolling-ball subtraction with the given radius.
    #[must_use]
    pub const fn with_radius(radius: f64) -> Self {
        Self {
            radius,
            create_background: false,
            light_background: false,
            use_paraboloid: false,
            presmooth: false,
            correct_corners: false,
        }
    }
}

impl Default for BackgroundParams {
    fn default() -> Self {
        Self::with_radius(Self::DEFAULT_RADIUS)
    }
}

/// Subtract the estimated background from one plane.
///
/// With a dark background the result is `original - background`, floored
/// at 0. With `light_background` the result is
/// `original - background + max`, capped at the depth maximum, so
/// background regions come out white. With `create_background` the
/// background itself is returned.
///
/// Dimensions, bit depth and LUT are preserved. No output sample exceeds
/// the corresponding input sample in dark-background mode.
#[must_use = "returns the background-subtracted plane"]
pub fn subtract_background(plane: &Plane, params: &BackgroundParams) -> Plane {
    let (width, height) = (plane.width() as usize, plane.height() as usize);
    let max = f32::from(plane.depth().max_value());
    let original = plane.to_f32();
    let background = estimate_background(&original, width, height, max, params);

    if params.create_background {
        return plane.derive_from_f32(&background);
    }
    let offset = if params.light_background { max } else { 0.0 };
    let subtracted: Vec<f32> = original
        .iter()
        .zip(&background)
        .map(|(&o, &b)| o - b + offset)
        .collect();
    plane.derive_from_f32(&subtracted)
}

/// Apply [`subtract_background`] to every plane of a stack.
#[must_use = "returns the background-subtracted stack"]
pub fn subtract_background_stack(stack: &ImageStack, params: &BackgroundParams) -> ImageStack {
    stack.map_planes(|plane| subtract_background(plane, params))
}

/// Background surface under `samples`, within `[0, max]`.
fn estimate_background(
    samples: &[f32],
    width: usize,
    height: usize,
    max: f32,
    params: &BackgroundParams,
) -> Vec<f32> {
    if samples.is_empty() {
        return Vec::new();
    }
    let light = params.light_background;

    // Estimation always looks for a dark background; invert for light.
    let mut working: Vec<f32> = if light {
        samples.iter().map(|&v| -v).collect()
    } else {
        samples.to_vec()
    };
    if params.presmooth {
        map_rows(&mut working, width, mean_of_three);
        map_columns(&mut working, width, height, mean_of_three);
    }

    let mut background = if params.use_paraboloid {
        paraboloid::background(
            &working,
            width,
            height,
            params.radius,
            params.correct_corners,
        )
    } else {
        RollingBall::new(params.radius).background(&working, width, height)
    };

    for (bg, &orig) in background.iter_mut().zip(samples) {
        if light {
            *bg = -*bg;
        }
        // Smoothing can lift the estimate above the raw data.
        if params.presmooth {
            *bg = if light { bg.max(orig) } else { bg.min(orig) };
        }
        *bg = bg.clamp(0.0, max);
    }
    background
}

/// 3-tap mean with replicated ends.
fn mean_of_three(line: &[f32]) -> Vec<f32> {
    let last = line.len().saturating_sub(1);
    (0..line.len())
        .map(|i| (line[i.saturating_sub(1)] + line[i] + line[(i + 1).min(last)]) / 3.0)
        .collect()
}
