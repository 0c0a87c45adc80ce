use ndarray::ArrayView1;

/// Maps possibly-negative axis indices, counting from the last dimension, to
/// canonical indices in `[0, rank)`.
///
/// The index tensor is read fully into host memory before adjusting, so this
/// is the one call in the crate that may block on a device-to-host transfer.
/// A value that is still out of `[0, rank)` after the adjustment is passed
/// through unchanged.
///
/// # Arguments
/// * `rank` - The rank of the tensor the axes index into.
/// * `axes` - The axis indices to normalize.
///
/// # Returns
/// The adjusted indices, in input order.
pub fn normalize_axes(rank: usize, axes: ArrayView1<'_, i64>) -> Vec<i64> {
    let mut host: Vec<i64> = axes.iter().copied().collect();
    normalize_axes_in_place(rank, &mut host);
    host
}

/// In-place variant of [`normalize_axes`] over host memory.
pub fn normalize_axes_in_place(rank: usize, axes: &mut [i64]) {
    for axis in axes {
        if *axis < 0 {
            *axis += rank as i64;
        }
    }
}
