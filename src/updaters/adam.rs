use std::collections::HashMap;

use log::trace;
use ndarray::{ArrayD, ArrayViewD, ArrayViewMutD, Order};
use serde::{Deserialize, Serialize};

use super::GradientUpdater;
use crate::error::{Result, UpdaterErr};
use crate::schedule::LearningRate;
use crate::state::{split_state_view, take_state_map, StateTensor};

/// Key of the first-moment slot in persisted state maps.
pub const M_STATE: &str = "M";
/// Key of the second-moment slot in persisted state maps.
pub const V_STATE: &str = "V";

const STATE_KEYS: &[&str] = &[M_STATE, V_STATE];

/// Hyperparameters of the Adam update rule.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AdamConfig {
    pub learning_rate: LearningRate,
    pub beta1: f64,
    pub beta2: f64,
    pub epsilon: f64,
}

impl Default for AdamConfig {
    fn default() -> Self {
        Self {
            learning_rate: LearningRate::Constant(1e-3),
            beta1: 0.9,
            beta2: 0.999,
            epsilon: 1e-8,
        }
    }
}

impl AdamConfig {
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

    pub fn updater<'s>(self) -> AdamUpdater<'s> {
        AdamUpdater::new(self)
    }
}

/// The Adam updater.
///
/// Keeps exponential moving averages of the gradient and of its square, and
/// compensates both for their cold-start bias towards zero.
pub struct AdamUpdater<'s> {
    config: AdamConfig,
    m: Option<StateTensor<'s>>,
    v: Option<StateTensor<'s>>,
}

impl<'s> AdamUpdater<'s> {
    pub fn new(config: AdamConfig) -> Self {
        Self {
            config,
            m: None,
            v: None,
        }
    }

    pub fn config(&self) -> &AdamConfig {
        &self.config
    }

    fn bound_state(&mut self) -> Result<(ArrayViewMutD<'_, f32>, ArrayViewMutD<'_, f32>)> {
        match (&mut self.m, &mut self.v) {
            (Some(m), Some(v)) => Ok((m.view_mut(), v.view_mut())),
            _ => Err(UpdaterErr::StateNotBound),
        }
    }
}

impl<'s> GradientUpdater<'s> for AdamUpdater<'s> {
    fn state_keys(&self) -> &'static [&'static str] {
        STATE_KEYS
    }

    fn set_state(&mut self, state: HashMap<String, ArrayD<f32>>) -> Result<()> {
        let mut slots = take_state_map(state, STATE_KEYS)?;

        self.v = slots.pop().map(StateTensor::Owned);
        self.m = slots.pop().map(StateTensor::Owned);

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

        self.v = views.pop().map(StateTensor::View);
        self.m = views.pop().map(StateTensor::View);

        Ok(())
    }

    fn state(&self) -> Result<HashMap<&'static str, ArrayViewD<'_, f32>>> {
        match (&self.m, &self.v) {
            (Some(m), Some(v)) => Ok(HashMap::from([
                (M_STATE, m.view()),
                (V_STATE, v.view()),
            ])),
            _ => Err(UpdaterErr::StateNotBound),
        }
    }

    fn apply(
        &mut self,
        gradient: &mut ArrayViewMutD<'_, f32>,
        iteration: usize,
        epoch: usize,
    ) -> Result<()> {
        let beta1 = self.config.beta1;
        let beta2 = self.config.beta2;
        let epsilon = self.config.epsilon;
        let learning_rate = self.config.learning_rate.value_at(iteration, epoch);

        let (mut m, mut v) = self.bound_state()?;
        if gradient.shape() != m.shape() {
            return Err(UpdaterErr::ShapeMismatch {
                what: "gradient",
                got: gradient.len(),
                expected: m.len(),
            });
        }

        let b1 = beta1 as f32;
        let b2 = beta2 as f32;

        // m = beta1 * m + (1 - beta1) * grad
        m *= b1;
        m.scaled_add(1.0 - b1, &gradient.view());

        // v = beta2 * v + (1 - beta2) * grad^2
        v *= b2;
        v.zip_mut_with(&gradient.view(), |v, &g| *v += (1.0 - b2) * g * g);

        let beta1t = beta1.powf((iteration + 1) as f64);
        let beta2t = beta2.powf((iteration + 1) as f64);
        let mut alphat = learning_rate * (1.0 - beta2t).sqrt() / (1.0 - beta1t);
        if alphat.is_nan() || alphat.is_infinite() || alphat == 0.0 {
            trace!("degenerate step scaling at iteration {iteration}, substituting epsilon");
            alphat = epsilon;
        }

        let eps = epsilon as f32;
        gradient.assign(&m.view());
        *gradient *= alphat as f32;
        gradient.zip_mut_with(&v.view(), |g, &v| *g /= v.sqrt() + eps);

        Ok(())
    }
}
