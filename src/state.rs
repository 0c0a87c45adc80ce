use std::collections::HashMap;

use log::debug;
use ndarray::{ArrayD, ArrayViewD, ArrayViewMut1, ArrayViewMutD, Axis, IxDyn, Order};

use crate::error::{Result, UpdaterErr};

/// A single named state slot of an updater.
///
/// In detached mode the slot owns its tensor outright; in view mode it is a
/// non-copying window into a caller-owned flat buffer, so every write lands
/// in memory somebody else (typically a network-wide state vector) also holds.
pub enum StateTensor<'s> {
    Owned(ArrayD<f32>),
    View(ArrayViewMutD<'s, f32>),
}

impl StateTensor<'_> {
    /// A read-only view of the slot's current contents.
    pub fn view(&self) -> ArrayViewD<'_, f32> {
        match self {
            StateTensor::Owned(tensor) => tensor.view(),
            StateTensor::View(view) => view.view(),
        }
    }

    /// A mutable view of the slot.
    pub fn view_mut(&mut self) -> ArrayViewMutD<'_, f32> {
        match self {
            StateTensor::Owned(tensor) => tensor.view_mut(),
            StateTensor::View(view) => view.view_mut(),
        }
    }
}

/// Cuts a flat state buffer into `slots` equal, contiguous, non-overlapping
/// views of `gradient_shape`, in slot order.
///
/// The views alias the buffer's memory, they never copy it. Cutting the same
/// buffer twice with the same arguments reproduces the same slice boundaries.
///
/// # Arguments
/// * `view` - The flat buffer, a 1-D vector or a `[1, n]` row vector.
/// * `slots` - How many equal spans to cut.
/// * `gradient_shape` - The shape every span is reshaped to.
/// * `order` - Row- or column-major interpretation of each span.
/// * `initialize` - Whether to zero-fill the whole buffer before cutting.
///
/// # Returns
/// `NotARowVector` if `view` has a higher rank, `UnpartitionableView` if its
/// length isn't exactly `slots` spans of `gradient_shape` or the reshape
/// cannot be done without a copy.
pub(crate) fn split_state_view<'s>(
    view: ArrayViewMutD<'s, f32>,
    slots: usize,
    gradient_shape: &[usize],
    order: Order,
    initialize: bool,
) -> Result<Vec<ArrayViewMutD<'s, f32>>> {
    if !(view.ndim() == 1 || (view.ndim() == 2 && view.shape()[0] == 1)) {
        return Err(UpdaterErr::NotARowVector { ndim: view.ndim() });
    }

    let len = view.len();
    let slot_len: usize = gradient_shape.iter().product();
    if len != slots * slot_len {
        return Err(UpdaterErr::UnpartitionableView {
            len,
            slots,
            slot_len,
        });
    }

    let mut flat: ArrayViewMut1<'s, f32> = view
        .into_shape_with_order(len)
        .map_err(|_| UpdaterErr::UnpartitionableView {
            len,
            slots,
            slot_len,
        })?;

    if initialize {
        flat.fill(0.0);
    }

    let mut views = Vec::with_capacity(slots);
    let mut rest = flat;

    for _ in 0..slots {
        let (span, tail) = rest.split_at(Axis(0), slot_len);
        rest = tail;

        let state = span
            .into_shape_with_order((IxDyn(gradient_shape), order))
            .map_err(|_| UpdaterErr::UnpartitionableView {
                len,
                slots,
                slot_len,
            })?;

        views.push(state);
    }

    debug!("cut state buffer of {len} elements into {slots} views of {slot_len}");

    Ok(views)
}

/// Validates a detached state map against the required slot keys and returns
/// the tensors in slot order.
///
/// # Arguments
/// * `map` - The injected state tensors, keyed by slot name.
/// * `keys` - The required key set, in slot order.
///
/// # Returns
/// `WrongStateKeys` if the map's key set isn't exactly `keys`.
pub(crate) fn take_state_map(
    mut map: HashMap<String, ArrayD<f32>>,
    keys: &'static [&'static str],
) -> Result<Vec<ArrayD<f32>>> {
    let exact = map.len() == keys.len() && keys.iter().all(|key| map.contains_key(*key));
    if !exact {
        let mut got: Vec<String> = map.into_keys().collect();
        got.sort();

        return Err(UpdaterErr::WrongStateKeys {
            got,
            expected: keys,
        });
    }

    // The key set was just checked, every remove hits.
    Ok(keys.iter().filter_map(|key| map.remove(*key)).collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{Array1, Array2, ArrayD};

    #[test]
    fn initialize_zero_fills_the_whole_buffer() {
        let mut buffer = Array1::from_elem(12, 7.0f32);

        let views =
            split_state_view(buffer.view_mut().into_dyn(), 2, &[2, 3], Order::RowMajor, true)
                .unwrap();

        assert!(views.iter().all(|v| v.iter().all(|&x| x == 0.0)));
        assert!(buffer.iter().all(|&x| x == 0.0));
    }

    #[test]
    fn views_are_disjoint_halves_of_the_buffer() {
        let mut buffer = Array1::<f32>::zeros(8);

        {
            let mut views =
                split_state_view(buffer.view_mut().into_dyn(), 2, &[4], Order::RowMajor, false)
                    .unwrap();

            views[0].fill(1.0);
            views[1].fill(2.0);
        }

        assert_eq!(buffer.to_vec(), [1., 1., 1., 1., 2., 2., 2., 2.]);
    }

    #[test]
    fn cutting_twice_reproduces_the_same_layout() {
        let mut buffer: Array1<f32> = (0..6).map(|x| x as f32).collect();

        let first: Vec<Vec<f32>> =
            split_state_view(buffer.view_mut().into_dyn(), 2, &[3], Order::RowMajor, false)
                .unwrap()
                .iter()
                .map(|v| v.iter().copied().collect())
                .collect();

        let second: Vec<Vec<f32>> =
            split_state_view(buffer.view_mut().into_dyn(), 2, &[3], Order::RowMajor, false)
                .unwrap()
                .iter()
                .map(|v| v.iter().copied().collect())
                .collect();

        assert_eq!(first, second);
        assert_eq!(first[0], [0., 1., 2.]);
        assert_eq!(first[1], [3., 4., 5.]);
    }

    #[test]
    fn column_major_spans_follow_the_declared_order() {
        let mut buffer: Array1<f32> = (0..4).map(|x| x as f32).collect();

        let views =
            split_state_view(buffer.view_mut().into_dyn(), 1, &[2, 2], Order::ColumnMajor, false)
                .unwrap();

        // Column-major layout: the span [0, 1, 2, 3] reads as [[0, 2], [1, 3]].
        assert_eq!(views[0][[0, 1]], 2.0);
        assert_eq!(views[0][[1, 0]], 1.0);
    }

    #[test]
    fn row_vector_shapes_are_accepted() {
        let mut buffer = Array2::<f32>::zeros((1, 6));

        let views =
            split_state_view(buffer.view_mut().into_dyn(), 2, &[3], Order::RowMajor, false)
                .unwrap();

        assert_eq!(views.len(), 2);
        assert_eq!(views[0].shape(), &[3]);
    }

    #[test]
    fn higher_rank_buffers_are_rejected() {
        let mut buffer = Array2::<f32>::zeros((2, 3));

        let err =
            split_state_view(buffer.view_mut().into_dyn(), 2, &[3], Order::RowMajor, false)
                .unwrap_err();

        assert!(matches!(err, UpdaterErr::NotARowVector { ndim: 2 }));
    }

    #[test]
    fn mismatched_buffer_length_is_rejected() {
        let mut buffer = Array1::<f32>::zeros(7);

        let err =
            split_state_view(buffer.view_mut().into_dyn(), 2, &[3], Order::RowMajor, false)
                .unwrap_err();

        assert!(matches!(
            err,
            UpdaterErr::UnpartitionableView {
                len: 7,
                slots: 2,
                slot_len: 3,
            }
        ));
    }

    #[test]
    fn state_map_with_exact_keys_comes_back_in_slot_order() {
        let map = HashMap::from([
            ("V".to_string(), ArrayD::from_elem(IxDyn(&[2]), 2.0f32)),
            ("M".to_string(), ArrayD::from_elem(IxDyn(&[2]), 1.0f32)),
        ]);

        let slots = take_state_map(map, &["M", "V"]).unwrap();

        assert_eq!(slots[0][[0]], 1.0);
        assert_eq!(slots[1][[0]], 2.0);
    }

    #[test]
    fn state_map_with_missing_key_is_rejected() {
        let map = HashMap::from([("M".to_string(), ArrayD::zeros(IxDyn(&[2])))]);

        let err = take_state_map(map, &["M", "V"]).unwrap_err();

        assert!(matches!(err, UpdaterErr::WrongStateKeys { .. }));
    }

    #[test]
    fn state_map_with_extra_key_is_rejected() {
        let map = HashMap::from([
            ("M".to_string(), ArrayD::zeros(IxDyn(&[2]))),
            ("V".to_string(), ArrayD::zeros(IxDyn(&[2]))),
            ("W".to_string(), ArrayD::zeros(IxDyn(&[2]))),
        ]);

        let err = take_state_map(map, &["M", "V"]).unwrap_err();

        assert!(matches!(err, UpdaterErr::WrongStateKeys { .. }));
    }
}
