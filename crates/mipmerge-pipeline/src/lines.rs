//! Row and column traversal of row-major sample buffers.
//!
//! Separable filters (Gaussian blur, 3×3 mean, paraboloid morphology)
//! process an image as independent 1D lines along each axis.

/// Replace every row of `data` with `f(row)`.
///
/// `f` must return a line of the same length.
pub(crate) fn map_rows<T: Copy>(data: &mut [T], width: usize, mut f: impl FnMut(&[T]) -> Vec<T>) {
    if width == 0 {
        return;
    }
    for row in data.chunks_mut(width) {
        let mapped = f(row);
        row.copy_from_slice(&mapped);
    }
}

/// Replace every column of `data` with `f(column)`.
///
/// `f` must return a line of the same length.
pub(crate) fn map_columns<T: Copy>(
    data: &mut [T],
    width: usize,
    height: usize,
    mut f: impl FnMut(&[T]) -> Vec<T>,
) {
    for x in 0..width {
        let column: Vec<T> = (0..height).map(|y| data[y * width + x]).collect();
        for (y, value) in f(&column).into_iter().enumerate() {
            data[y * width + x] = value;
        }
    }
}

/// Copy column `x` out of `data`.
pub(crate) fn column<T: Copy>(data: &[T], width: usize, height: usize, x: usize) -> Vec<T> {
    (0..height).map(|y| data[y * width + x]).collect()
}
