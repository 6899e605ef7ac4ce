//! Separable Gaussian smoothing.
//!
//! The kernel is truncated where its weight falls below `accuracy`
//! relative to the center, with a smooth tail correction so the cut-off
//! does not leave a step. Pixels outside the image take the value of the
//! nearest edge pixel.

use crate::lines::{map_columns, map_rows};
use crate::types::Plane;

/// Smallest permitted kernel cap, regardless of line length.
const MIN_MAX_RADIUS: usize = 50;

/// Blur a plane with independent horizontal and vertical sigmas.
///
/// Filtering runs along x then y in `f32`. A non-positive sigma leaves
/// that axis untouched. Results are rounded to the nearest sample and
/// clamped to the plane's depth range. Dimensions, depth and LUT are
/// preserved.
#[must_use = "returns the blurred plane"]
pub fn gaussian_blur(plane: &Plane, sigma_x: f64, sigma_y: f64, accuracy: f64) -> Plane {
    let (width, height) = (plane.width() as usize, plane.height() as usize);
    let mut samples = plane.to_f32();

    if sigma_x > 0.0 {
        let kernel = kernel_for_line(sigma_x, accuracy, width);
        map_rows(&mut samples, width, |line| convolve_line(line, &kernel));
    }
    if sigma_y > 0.0 {
        let kernel = kernel_for_line(sigma_y, accuracy, height);
        map_columns(&mut samples, width, height, |line| {
            convolve_line(line, &kernel)
        });
    }

    plane.derive_from_f32(&samples)
}

/// One half of a normalized Gaussian kernel, center first.
///
/// The full kernel is `k[n-1] .. k[1] k[0] k[1] .. k[n-1]` and sums to one.
/// The radius is capped at 50.
#[must_use]
pub fn gaussian_kernel(sigma: f64, accuracy: f64) -> Vec<f32> {
    kernel_for_line(sigma, accuracy, 0)
}

/// Half kernel for blurring lines of `line_length` samples.
#[allow(
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss,
    clippy::cast_precision_loss
)]
fn kernel_for_line(sigma: f64, accuracy: f64, line_length: usize) -> Vec<f32> {
    if sigma <= 0.0 || !sigma.is_finite() {
        return vec![1.0];
    }
    let accuracy = accuracy.clamp(1e-15, 0.999);
    let max_radius = line_length.max(MIN_MAX_RADIUS);
    let radius = ((sigma * (-2.0 * accuracy.ln()).sqrt()).ceil() as usize + 1).min(max_radius);

    let mut kernel: Vec<f64> = (0..radius)
        .map(|i| {
            let x = i as f64;
            (-0.5 * x * x / sigma / sigma).exp()
        })
        .collect();

    // Replace the tail by a parabola that reaches zero at the radius.
    if radius < max_radius && radius > 3 {
        let mut sqrt_slope = f64::MAX;
        let mut r = radius;
        while r > radius / 2 {
            r -= 1;
            let a = kernel[r].sqrt() / (radius - r) as f64;
            if a < sqrt_slope {
                sqrt_slope = a;
            } else {
                break;
            }
        }
        for (r1, value) in kernel.iter_mut().enumerate().skip(r + 2) {
            let distance = (radius - r1) as f64;
            *value = distance * distance * sqrt_slope * sqrt_slope;
        }
    }

    let sum = if radius < max_radius {
        kernel[0] + 2.0 * kernel[1..].iter().sum::<f64>()
    } else {
        sigma * (2.0 * std::f64::consts::PI).sqrt()
    };
    kernel.into_iter().map(|v| (v / sum) as f32).collect()
}

/// Convolve one line with a symmetric half kernel, replicating edges.
fn convolve_line(line: &[f32], kernel: &[f32]) -> Vec<f32> {
    let last = line.len().saturating_sub(1);
    (0..line.len())
        .map(|i| {
            kernel
                .iter()
                .enumerate()
                .skip(1)
                .fold(kernel[0] * line[i], |sum, (k, &w)| {
                    let left = line[i.saturating_sub(k)];
                    let right = line[(i + k).min(last)];
                    w.mul_add(left + right, sum)
                })
        })
        .collect()
}
