use std::collections::HashMap;

use ndarray::{ArrayD, ArrayViewD, ArrayViewMutD, Order};
use serde::{Deserialize, Serialize};

use super::GradientUpdater;
use crate::error::{Result, UpdaterErr};
use crate::schedule::LearningRate;
use crate::state::{split_state_view, take_state_map, StateTensor};

/// Key of the accumulated squared-gradient slot in persisted state maps.
pub const GRAD_STATE: &str = "grad";

const STATE_KEYS: &[&str] = &[GRAD_STATE];

/// Hyperparameters of the AdaGrad update rule.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AdaGradConfig {
    pub learning_rate: LearningRate,
    pub epsilon: f64,
}

impl Default for AdaGradConfig {
    fn default() -> Self {
        Self {
            learning_rate: LearningRate::Constant(1e-1),
            epsilon: 1e-6,
        }
    }
}

impl AdaGradConfig {
    pub fn new(learning_rate: f64) -> Self {
        Self {
            learning_rate: LearningRate::Constant(learning_rate),
            ..Self::default()
        }
    }

    /// Length of the flat state buffer needed for `num_params` parameters.
    pub fn state_size(&self, num_params: usize) -> usize {
        STATE_KEYS.len() * num_params
    }

    pub fn updater<'s>(self) -> AdaGradUpdater<'s> {
        AdaGradUpdater::new(self)
    }
}

/// The AdaGrad updater.
///
/// Divides each gradient component by the root of every square it has ever
/// accumulated, so frequently-updated parameters take smaller steps.
pub struct AdaGradUpdater<'s> {
    config: AdaGradConfig,
    history: Option<StateTensor<'s>>,
}

impl<'s> AdaGradUpdater<'s> {
    pub fn new(config: AdaGradConfig) -> Self {
        Self {
            config,
            history: None,
        }
    }

    pub fn config(&self) -> &AdaGradConfig {
        &self.config
    }
}

impl<'s> GradientUpdater<'s> for AdaGradUpdater<'s> {
    fn state_keys(&self) -> &'static [&'static str] {
        STATE_KEYS
    }

    fn set_state(&mut self, state: HashMap<String, ArrayD<f32>>) -> Result<()> {
        let mut slots = take_state_map(state, STATE_KEYS)?;
        self.history = slots.pop().map(StateTensor::Owned);

        Ok(())
    }

    fn set_state_view(
        &mut self,
        view: ArrayViewMutD<'s, f32>,
        gradient_shape: &[usize],
        order: Order,
        initialize: bool,
    ) -> Result<()> {
        let mut views =
            split_state_view(view, STATE_KEYS.len(), gradient_shape, order, initialize)?;
        self.history = views.pop().map(StateTensor::View);

        Ok(())
    }

    fn state(&self) -> Result<HashMap<&'static str, ArrayViewD<'_, f32>>> {
        match &self.history {
            Some(history) => Ok(HashMap::from([(GRAD_STATE, history.view())])),
            None => Err(UpdaterErr::StateNotBound),
        }
    }

    fn apply(
        &mut self,
        gradient: &mut ArrayViewMutD<'_, f32>,
        iteration: usize,
        epoch: usize,
    ) -> Result<()> {
        let eps = self.config.epsilon as f32;
        let learning_rate = self.config.learning_rate.value_at(iteration, epoch);

        let mut history = match &mut self.history {
            Some(history) => history.view_mut(),
            None => return Err(UpdaterErr::StateNotBound),
        };
        if gradient.shape() != history.shape() {
            return Err(UpdaterErr::ShapeMismatch {
                what: "gradient",
                got: gradient.len(),
                expected: history.len(),
            });
        }

        // history = history + grad^2
        history.zip_mut_with(&gradient.view(), |h, &g| *h += g * g);

        *gradient *= learning_rate as f32;
        gradient.zip_mut_with(&history.view(), |g, &h| *g /= h.sqrt() + eps);

        Ok(())
    }
}
