//! Contrast enhancement by histogram saturation.

use crate::types::{DisplayRange, Plane};

/// Display range that saturates `saturated_percent` of the pixels,
/// half at each end of the histogram.
///
/// The histogram has one bin per sample value over the plane's depth
/// range. The low bound is the first value at which the cumulative count
/// from below exceeds `floor(n * percent / 200)`; the high bound is the
/// same from above. If the bounds coincide or cross, the data range is
/// used.
#[must_use]
#[allow(
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss,
    clippy::cast_precision_loss
)]
pub fn saturated_range(plane: &Plane, saturated_percent: f64) -> DisplayRange {
    let samples = plane.samples();
    let data_range = DisplayRange::of_samples(samples);

    let mut histogram = vec![0_usize; usize::from(plane.depth().max_value()) + 1];
    for &value in samples {
        histogram[usize::from(value)] += 1;
    }

    let threshold = if saturated_percent > 0.0 {
        (samples.len() as f64 * saturated_percent / 200.0) as usize
    } else {
        0
    };
    let low = first_above(histogram.iter().enumerate(), threshold);
    let high = first_above(histogram.iter().enumerate().rev(), threshold);

    match (low, high) {
        (Some(low), Some(high)) if high > low => DisplayRange::new(low as u16, high as u16),
        _ => data_range,
    }
}

/// Bin index at which the running count first exceeds `threshold`.
fn first_above<'a>(
    bins: impl Iterator<Item = (usize, &'a usize)>,
    threshold: usize,
) -> Option<usize> {
    let mut total = 0;
    for (value, &count) in bins {
        total += count;
        if total > threshold {
            return Some(value);
        }
    }
    None
}

/// Set the plane's display range with [`saturated_range`].
///
/// Stored samples are untouched.
#[must_use = "returns the plane with its new display range"]
pub fn enhance_contrast(plane: Plane, saturated_percent: f64) -> Plane {
    let range = saturated_range(&plane, saturated_percent);
    plane.with_display_range(range)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::BitDepth;

    /// 100×100 plane: 10 px of 0, 30 px of 5, 30 px of 900, 5 px of 1000,
    /// everything else 500.
    fn skewed() -> Plane {
        Plane::from_fn(100, 100, BitDepth::Sixteen, |x, y| match y * 100 + x {
            0..10 => 0,
            10..40 => 5,
            40..70 => 900,
            70..75 => 1000,
            _ => 500,
        })
    }

    #[test]
    fn thin_tails_are_saturated() {
        // threshold = floor(10000 * 0.35 / 200) = 17
        assert_eq!(saturated_range(&skewed(), 0.35), DisplayRange::new(5, 900));
    }

    #[test]
    fn zero_percent_keeps_data_range() {
        assert_eq!(saturated_range(&skewed(), 0.0), DisplayRange::new(0, 1000));
    }

    #[test]
    fn uniform_plane_falls_back_to_data_range() {
        let plane = Plane::filled(8, 8, BitDepth::Eight, 77);
        assert_eq!(saturated_range(&plane, 0.35), DisplayRange::new(77, 77));
    }

    #[test]
    fn spread_values_saturate_by_cumulative_count() {
        // Every value appears once; threshold for 1000 px at 1% is 5, so
        // six values are needed from each end.
        let plane = Plane::from_fn(40, 25, BitDepth::Sixteen, |x, y| {
            u16::try_from(y * 40 + x).unwrap_or(0)
        });
        assert_eq!(saturated_range(&plane, 1.0), DisplayRange::new(5, 994));
    }

    #[test]
    fn default_percent_saturates_dense_sixteen_bit_data() {
        // 4096 distinct values; threshold = floor(4096 * 0.35 / 200) = 7.
        let plane = Plane::from_fn(64, 64, BitDepth::Sixteen, |x, y| {
            u16::try_from(y * 64 + x).unwrap_or(0)
        });
        assert_eq!(
            saturated_range(&plane, 0.35),
            DisplayRange::new(7, 4088)
        );
    }

    #[test]
    fn crossing_bounds_fall_back_to_data_range() {
        // Two values, half the pixels each; at 100% the threshold is half
        // the pixels, so low lands on 200 and high on 10.
        let plane = Plane::from_fn(4, 4, BitDepth::Eight, |x, _| if x < 2 { 10 } else { 200 });
        assert_eq!(saturated_range(&plane, 100.0), DisplayRange::new(10, 200));
    }

    #[test]
    fn enhance_changes_only_the_display_range() {
        let plane = skewed();
        let enhanced = enhance_contrast(plane.clone(), 0.35);
        assert_eq!(enhanced.samples(), plane.samples());
        assert_eq!(enhanced.display_range(), DisplayRange::new(5, 900));
        assert_eq!(enhanced.lut(), plane.lut());
    }
}
