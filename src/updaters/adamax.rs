use std::collections::HashMap;

use log::trace;
use ndarray::{ArrayD, ArrayViewD, ArrayViewMutD, Order};
use serde::{Deserialize, Serialize};

use super::GradientUpdater;
use crate::error::{Result, UpdaterErr};
use crate::schedule::LearningRate;
use crate::state::{split_state_view, take_state_map, StateTensor};

/// Key of the moving-average slot in persisted state maps.
pub const M_STATE: &str = "M";
/// Key of the infinity-norm slot in persisted state maps.
pub const U_STATE: &str = "V";

const STATE_KEYS: &[&str] = &[M_STATE, U_STATE];

/// Hyperparameters of the AdaMax update rule.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AdaMaxConfig {
    pub learning_rate: LearningRate,
    pub beta1: f64,
    pub beta2: f64,
    pub epsilon: f64,
}

impl Default for AdaMaxConfig {
    fn default() -> Self {
        Self {
            learning_rate: LearningRate::Constant(1e-3),
            beta1: 0.9,
            beta2: 0.999,
            epsilon: 1e-8,
        }
    }
}

impl AdaMaxConfig {
    /// Returns a config with the given constant learning rate and the paper
    /// defaults for every coefficient.
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

    /// Builds the updater driven by this configuration.
    pub fn updater<'s>(self) -> AdaMaxUpdater<'s> {
        AdaMaxUpdater::new(self)
    }
}

/// The AdaMax updater, the infinity-norm variant of Adam.
///
/// Keeps a moving average of the gradient and an exponentially weighted
/// infinity norm. The norm recurrence needs no bias correction of its own,
/// only the moving average's cold-start bias is compensated.
pub struct AdaMaxUpdater<'s> {
    config: AdaMaxConfig,
    m: Option<StateTensor<'s>>,
    u: Option<StateTensor<'s>>,
}

impl<'s> AdaMaxUpdater<'s> {
    /// Creates an updater driven by `config`.
    ///
    /// State stays unbound until `set_state` or `set_state_view` runs.
    pub fn new(config: AdaMaxConfig) -> Self {
        Self {
            config,
            m: None,
            u: None,
        }
    }

    pub fn config(&self) -> &AdaMaxConfig {
        &self.config
    }

    fn bound_state(&mut self) -> Result<(ArrayViewMutD<'_, f32>, ArrayViewMutD<'_, f32>)> {
        match (&mut self.m, &mut self.u) {
            (Some(m), Some(u)) => Ok((m.view_mut(), u.view_mut())),
            _ => Err(UpdaterErr::StateNotBound),
        }
    }
}

impl<'s> GradientUpdater<'s> for AdaMaxUpdater<'s> {
    fn state_keys(&self) -> &'static [&'static str] {
        STATE_KEYS
    }

    fn set_state(&mut self, state: HashMap<String, ArrayD<f32>>) -> Result<()> {
        let mut slots = take_state_map(state, STATE_KEYS)?;

        self.u = slots.pop().map(StateTensor::Owned);
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

        self.u = views.pop().map(StateTensor::View);
        self.m = views.pop().map(StateTensor::View);

        Ok(())
    }

    fn state(&self) -> Result<HashMap<&'static str, ArrayViewD<'_, f32>>> {
        match (&self.m, &self.u) {
            (Some(m), Some(u)) => Ok(HashMap::from([
                (M_STATE, m.view()),
                (U_STATE, u.view()),
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

        let (mut m, mut u) = self.bound_state()?;
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

        // u = max(beta2 * u, |grad|); the in-place abs is fine, the
        // gradient's original sign isn't read again this call.
        u *= b2;
        gradient.mapv_inplace(f32::abs);
        u.zip_mut_with(&gradient.view(), |u, &g| *u = u.max(g));

        let beta1t = beta1.powf((iteration + 1) as f64);
        let mut alphat = learning_rate / (1.0 - beta1t);
        if alphat.is_nan() || alphat.is_infinite() || alphat == 0.0 {
            trace!("degenerate step scaling at iteration {iteration}, substituting epsilon");
            alphat = epsilon;
        }

        // keep the divisor strictly positive, u is all-zero before the first
        // gradient has been observed
        u += 1e-32;

        gradient.assign(&m.view());
        *gradient *= alphat as f32;
        *gradient /= &u.view();

        Ok(())
    }
}
