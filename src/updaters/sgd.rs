use std::collections::HashMap;

use ndarray::{ArrayD, ArrayViewD, ArrayViewMutD, Order};
use serde::{Deserialize, Serialize};

use super::GradientUpdater;
use crate::error::Result;
use crate::schedule::LearningRate;
use crate::state::{split_state_view, take_state_map};

const STATE_KEYS: &[&str] = &[];

/// Hyperparameters of plain stochastic gradient descent.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SgdConfig {
    pub learning_rate: LearningRate,
}

impl Default for SgdConfig {
    fn default() -> Self {
        Self {
            learning_rate: LearningRate::Constant(1e-3),
        }
    }
}

impl SgdConfig {
    pub fn new(learning_rate: f64) -> Self {
        Self {
            learning_rate: LearningRate::Constant(learning_rate),
        }
    }

    /// SGD keeps no history, its state buffer is empty.
    pub fn state_size(&self, _num_params: usize) -> usize {
        0
    }

    pub fn updater(self) -> SgdUpdater {
        SgdUpdater::new(self)
    }
}

/// The plain SGD updater, the stateless end of the contract.
///
/// Scales the gradient by the learning rate and nothing else, so both bind
/// operations only validate their input.
pub struct SgdUpdater {
    config: SgdConfig,
}

impl SgdUpdater {
    pub fn new(config: SgdConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &SgdConfig {
        &self.config
    }
}

impl<'s> GradientUpdater<'s> for SgdUpdater {
    fn state_keys(&self) -> &'static [&'static str] {
        STATE_KEYS
    }

    fn set_state(&mut self, state: HashMap<String, ArrayD<f32>>) -> Result<()> {
        take_state_map(state, STATE_KEYS).map(|_| ())
    }

    fn set_state_view(
        &mut self,
        view: ArrayViewMutD<'s, f32>,
        gradient_shape: &[usize],
        order: Order,
        initialize: bool,
    ) -> Result<()> {
        split_state_view(view, 0, gradient_shape, order, initialize).map(|_| ())
    }

    fn state(&self) -> Result<HashMap<&'static str, ArrayViewD<'_, f32>>> {
        Ok(HashMap::new())
    }

    fn apply(
        &mut self,
        gradient: &mut ArrayViewMutD<'_, f32>,
        iteration: usize,
        epoch: usize,
    ) -> Result<()> {
        let learning_rate = self.config.learning_rate.value_at(iteration, epoch);

        *gradient *= learning_rate as f32;

        Ok(())
    }
}
