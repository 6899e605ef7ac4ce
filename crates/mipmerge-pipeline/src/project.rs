//! Maximum intensity projection along the z axis.

use crate::types::{ImageStack, Plane};

/// Reduce a stack to one plane by per-pixel maximum.
///
/// The result does not depend on plane order. A one-plane stack yields
/// that plane's samples unchanged. The output keeps the stack's bit depth
/// and the first plane's LUT.
#[must_use = "returns the projected plane"]
pub fn max_intensity(stack: &ImageStack) -> Plane {
    let first = stack.first();
    let mut image = first.image().clone();
    for plane in stack.planes().iter().skip(1) {
        for (pixel, other) in image.pixels_mut().zip(plane.image().pixels()) {
            pixel.0[0] = pixel.0[0].max(other.0[0]);
        }
    }
    first.derive(image)
}
