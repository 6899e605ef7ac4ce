//! Sliding-paraboloid background estimation.
//!
//! The paraboloid `z = d² / (2r)` has the curvature of a ball of radius
//! `r` at its apex but, unlike a ball, never becomes vertical, so steep
//! edges are followed better. Grayscale erosion and dilation with a
//! paraboloid are separable: the 2D opening is an erosion of every row,
//! then every column, followed by a dilation of every row, then every
//! column. Each 1D pass is the lower envelope of parabolas and runs in
//! linear time.

use crate::lines::{column, map_columns, map_rows};

/// Opening of `samples` with a paraboloid of radius `radius`.
///
/// With `correct_corners`, each corner is first lowered to the mean of
/// the 1D openings of its two edges when that is lower, so a bright
/// object touching a corner does not pull the background up there.
#[allow(clippy::cast_possible_truncation)]
pub(crate) fn background(
    samples: &[f32],
    width: usize,
    height: usize,
    radius: f64,
    correct_corners: bool,
) -> Vec<f32> {
    let scale = 2.0 * radius.max(f64::EPSILON);
    let mut data: Vec<f64> = samples.iter().map(|&v| f64::from(v)).collect();
    if correct_corners {
        lower_corners(&mut data, width, height, scale);
    }

    map_rows(&mut data, width, |line| erode(line, scale));
    map_columns(&mut data, width, height, |line| erode(line, scale));
    map_rows(&mut data, width, |line| dilate(line, scale));
    map_columns(&mut data, width, height, |line| dilate(line, scale));

    data.into_iter().map(|v| v as f32).collect()
}

/// Lower each corner toward the opened profile of its adjacent edges.
fn lower_corners(data: &mut [f64], width: usize, height: usize, scale: f64) {
    let open = |line: &[f64]| dilate(&erode(line, scale), scale);
    let last_row = (height - 1) * width;
    let top = open(&data[..width]);
    let bottom = open(&data[last_row..last_row + width]);
    let left = open(&column(data, width, height, 0));
    let right = open(&column(data, width, height, width - 1));

    let corners = [
        (0, (top[0] + left[0]) / 2.0),
        (width - 1, (top[width - 1] + right[0]) / 2.0),
        (last_row, (bottom[0] + left[height - 1]) / 2.0),
        (last_row + width - 1, (bottom[width - 1] + right[height - 1]) / 2.0),
    ];
    for (index, estimate) in corners {
        data[index] = data[index].min(estimate);
    }
}

/// `out[x] = min_q line[q] + (x - q)² / scale`
fn erode(line: &[f64], scale: f64) -> Vec<f64> {
    let scaled: Vec<f64> = line.iter().map(|&v| v * scale).collect();
    lower_envelope(&scaled)
        .into_iter()
        .map(|v| v / scale)
        .collect()
}

/// `out[x] = max_q line[q] - (x - q)² / scale`
fn dilate(line: &[f64], scale: f64) -> Vec<f64> {
    let scaled: Vec<f64> = line.iter().map(|&v| -v * scale).collect();
    lower_envelope(&scaled)
        .into_iter()
        .map(|v| -v / scale)
        .collect()
}

/// `d[x] = min_q (x - q)² + g[q]` over all sample positions `q`.
#[allow(clippy::cast_precision_loss)]
fn lower_envelope(g: &[f64]) -> Vec<f64> {
    let n = g.len();
    if n == 0 {
        return Vec::new();
    }
    let position = |q: usize| q as f64;
    let intersection = |q: usize, p: usize| {
        let (fq, fp) = (position(q), position(p));
        (fq.mul_add(fq, g[q]) - fp.mul_add(fp, g[p])) / (2.0 * (fq - fp))
    };

    // Parabolas on the envelope, and the boundaries between them.
    let mut vertices = vec![0_usize; n];
    let mut bounds = vec![f64::INFINITY; n + 1];
    bounds[0] = f64::NEG_INFINITY;
    let mut k = 0;
    for q in 1..n {
        let mut s = intersection(q, vertices[k]);
        while s <= bounds[k] {
            k -= 1;
            s = intersection(q, vertices[k]);
        }
        k += 1;
        vertices[k] = q;
        bounds[k] = s;
        bounds[k + 1] = f64::INFINITY;
    }

    let mut k = 0;
    (0..n)
        .map(|x| {
            while bounds[k + 1] < position(x) {
                k += 1;
            }
            let p = vertices[k];
            let d = position(x) - position(p);
            d.mul_add(d, g[p])
        })
        .collect()
}
