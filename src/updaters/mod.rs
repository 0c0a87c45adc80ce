pub mod adagrad;
pub mod adam;
pub mod adamax;
pub mod rmsprop;
pub mod sgd;

use std::collections::HashMap;

use ndarray::{ArrayD, ArrayViewD, ArrayViewMutD, Order};

use crate::error::Result;

pub use adagrad::{AdaGradConfig, AdaGradUpdater};
pub use adam::{AdamConfig, AdamUpdater};
pub use adamax::{AdaMaxConfig, AdaMaxUpdater};
pub use rmsprop::{RmsPropConfig, RmsPropUpdater};
pub use sgd::{SgdConfig, SgdUpdater};

/// The strategy that turns a raw gradient into the step actually applied to
/// a model parameter, using accumulated per-parameter history.
///
/// State lives in memory tied to lifetime `'s`: either injected wholesale as
/// owned tensors (`set_state`) or cut out of one caller-owned flat buffer
/// (`set_state_view`) that a whole-network state vector may share. At most
/// one of the two binds is in effect at a time; a later bind replaces the
/// earlier one.
///
/// Implementations are not internally synchronized. `apply`, `set_state` and
/// `set_state_view` all read-modify-write the same state tensors, so
/// concurrent calls on one instance must be serialized by the driver,
/// typically by giving each parameter tensor its own updater.
pub trait GradientUpdater<'s> {
    /// The state slot names, in flat-buffer partition order.
    ///
    /// These names are also the dictionary keys of any persisted state map,
    /// so they are part of the checkpoint wire contract.
    fn state_keys(&self) -> &'static [&'static str];

    /// Injects independently-allocated state tensors (detached mode).
    ///
    /// # Arguments
    /// * `state` - One tensor per required slot, keyed by slot name.
    ///
    /// # Returns
    /// `WrongStateKeys` if the map's key set isn't exactly [`Self::state_keys`].
    fn set_state(&mut self, state: HashMap<String, ArrayD<f32>>) -> Result<()>;

    /// Binds state to spans of one caller-owned flat buffer (view mode).
    ///
    /// The spans alias `view` without copying, so every later state update is
    /// visible to whoever owns the buffer. Rebinding the same buffer with the
    /// same arguments reproduces the same span layout.
    ///
    /// # Arguments
    /// * `view` - A flat row vector of the updater's state size.
    /// * `gradient_shape` - The shape of the gradients this updater will see.
    /// * `order` - Memory order used to reshape each span.
    /// * `initialize` - Whether to zero-fill the buffer before cutting it.
    ///
    /// # Returns
    /// `NotARowVector` for a higher-rank buffer, `UnpartitionableView` when
    /// the buffer cannot be cut into spans of `gradient_shape`.
    fn set_state_view(
        &mut self,
        view: ArrayViewMutD<'s, f32>,
        gradient_shape: &[usize],
        order: Order,
        initialize: bool,
    ) -> Result<()>;

    /// Live views of the current state slots, keyed by slot name.
    ///
    /// The views alias the updater's state memory, they are not snapshots:
    /// a later `apply` call changes what checkpoint code reads through them.
    fn state(&self) -> Result<HashMap<&'static str, ArrayViewD<'_, f32>>>;

    /// Overwrites `gradient` in place with the final parameter delta while
    /// evolving the internal state.
    ///
    /// Numerical degeneracy (NaN or infinite step scaling) is absorbed by the
    /// algorithm rather than reported, training continues across bad steps.
    ///
    /// # Arguments
    /// * `gradient` - The raw gradient, replaced by the update.
    /// * `iteration` - The 0-indexed update counter.
    /// * `epoch` - The current epoch, forwarded to the learning-rate schedule.
    ///
    /// # Returns
    /// `StateNotBound` if the updater needs state and none was bound,
    /// `ShapeMismatch` if `gradient` doesn't match the bound state.
    fn apply(
        &mut self,
        gradient: &mut ArrayViewMutD<'_, f32>,
        iteration: usize,
        epoch: usize,
    ) -> Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{ArrayD, IxDyn};

    // One updater of each algorithm behind the trait, detached state, to pin
    // down the shared contract rather than any single update rule.
    #[test]
    fn every_algorithm_updates_through_the_trait_object() {
        let mut updaters: Vec<Box<dyn GradientUpdater<'static>>> = vec![
            Box::new(AdaMaxUpdater::new(AdaMaxConfig::default())),
            Box::new(AdamUpdater::new(AdamConfig::default())),
            Box::new(RmsPropUpdater::new(RmsPropConfig::default())),
            Box::new(AdaGradUpdater::new(AdaGradConfig::default())),
            Box::new(SgdUpdater::new(SgdConfig::default())),
        ];

        for updater in &mut updaters {
            let state: HashMap<String, ArrayD<f32>> = updater
                .state_keys()
                .iter()
                .map(|key| (key.to_string(), ArrayD::zeros(IxDyn(&[3]))))
                .collect();
            updater.set_state(state).unwrap();

            let mut gradient = ArrayD::from_elem(IxDyn(&[3]), 0.5f32);
            updater
                .apply(&mut gradient.view_mut(), 0, 0)
                .unwrap();

            assert!(
                gradient.iter().all(|x| x.is_finite()),
                "update produced a non-finite delta"
            );
            assert!(
                gradient.iter().any(|&x| x != 0.5),
                "update left the gradient untouched"
            );
        }
    }

    #[test]
    fn state_keys_follow_the_wire_contract() {
        assert_eq!(
            AdaMaxUpdater::new(AdaMaxConfig::default()).state_keys(),
            ["M", "V"]
        );
        assert_eq!(
            AdamUpdater::new(AdamConfig::default()).state_keys(),
            ["M", "V"]
        );
        assert_eq!(
            RmsPropUpdater::new(RmsPropConfig::default()).state_keys(),
            ["G"]
        );
        assert_eq!(
            AdaGradUpdater::new(AdaGradConfig::default()).state_keys(),
            ["grad"]
        );
        assert!(SgdUpdater::new(SgdConfig::default()).state_keys().is_empty());
    }
}
