use std::collections::HashMap;

use ndarray::{ArrayD, ArrayViewD, ArrayViewMutD, Order};
use serde::{Deserialize, Serialize};

use super::GradientUpdater;
use crate::error::{Result, UpdaterErr};
use crate::schedule::LearningRate;
use crate::state::{split_state_view, take_state_map, StateTensor};

/// Key of the squared-gradient cache in persisted state maps.
pub const G_STATE: &str = "G";

const STATE_KEYS: &[&str] = &[G_STATE];

/// Hyperparameters of the RMSProp update rule.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RmsPropConfig {
    pub learning_rate: LearningRate,
    pub decay: f64,
    pub epsilon: f64,
}

impl Default for RmsPropConfig {
    fn default() -> Self {
        Self {
            learning_rate: LearningRate::Constant(1e-1),
            decay: 0.95,
            epsilon: 1e-8,
        }
    }
}

impl RmsPropConfig {
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

    pub fn updater<'s>(self) -> RmsPropUpdater<'s> {
        RmsPropUpdater::new(self)
    }
}

/// The RMSProp updater.
///
/// Scales each gradient component by the inverse root of a decayed cache of
/// its recent squares.
pub struct RmsPropUpdater<'s> {
    config: RmsPropConfig,
    cache: Option<StateTensor<'s>>,
}

impl<'s> RmsPropUpdater<'s> {
    pub fn new(config: RmsPropConfig) -> Self {
        Self {
            config,
            cache: None,
        }
    }

    pub fn config(&self) -> &RmsPropConfig {
        &self.config
    }
}

impl<'s> GradientUpdater<'s> for RmsPropUpdater<'s> {
    fn state_keys(&self) -> &'static [&'static str] {
        STATE_KEYS
    }

    fn set_state(&mut self, state: HashMap<String, ArrayD<f32>>) -> Result<()> {
        let mut slots = take_state_map(state, STATE_KEYS)?;
        self.cache = slots.pop().map(StateTensor::Owned);

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
        self.cache = views.pop().map(StateTensor::View);

        Ok(())
    }

    fn state(&self) -> Result<HashMap<&'static str, ArrayViewD<'_, f32>>> {
        match &self.cache {
            Some(cache) => Ok(HashMap::from([(G_STATE, cache.view())])),
            None => Err(UpdaterErr::StateNotBound),
        }
    }

    fn apply(
        &mut self,
        gradient: &mut ArrayViewMutD<'_, f32>,
        iteration: usize,
        epoch: usize,
    ) -> Result<()> {
        let decay = self.config.decay as f32;
        let eps = self.config.epsilon as f32;
        let learning_rate = self.config.learning_rate.value_at(iteration, epoch);

        let mut cache = match &mut self.cache {
            Some(cache) => cache.view_mut(),
            None => return Err(UpdaterErr::StateNotBound),
        };
        if gradient.shape() != cache.shape() {
            return Err(UpdaterErr::ShapeMismatch {
                what: "gradient",
                got: gradient.len(),
                expected: cache.len(),
            });
        }

        // cache = decay * cache + (1 - decay) * grad^2
        cache *= decay;
        cache.zip_mut_with(&gradient.view(), |c, &g| *c += (1.0 - decay) * g * g);

        *gradient *= learning_rate as f32;
        gradient.zip_mut_with(&cache.view(), |g, &c| *g /= c.sqrt() + eps);

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{ArrayD, IxDyn};

    #[test]
    fn first_step_from_zero_cache() {
        let mut updater = RmsPropConfig::default().updater();
        updater
            .set_state(HashMap::from([(
                G_STATE.to_string(),
                ArrayD::zeros(IxDyn(&[2])),
            )]))
            .unwrap();

        let mut gradient = ArrayD::from_shape_vec(IxDyn(&[2]), vec![2.0f32, -2.0]).unwrap();
        updater.apply(&mut gradient.view_mut(), 0, 0).unwrap();

        // cache = 0.05 * 4, delta = 0.1 * g / (sqrt(cache) + 1e-8)
        let expected = 0.1 * 2.0 / (0.2f32.sqrt() + 1e-8);

        assert!((gradient[[0]] - expected).abs() < 1e-5);
        assert!((gradient[[1]] + expected).abs() < 1e-5);
    }

    #[test]
    fn apply_before_any_bind_fails() {
        let mut updater = RmsPropConfig::default().updater();
        let mut gradient = ArrayD::from_elem(IxDyn(&[2]), 1.0f32);

        let err = updater.apply(&mut gradient.view_mut(), 0, 0).unwrap_err();

        assert!(matches!(err, UpdaterErr::StateNotBound));
    }

    #[test]
    fn wrong_key_is_rejected() {
        let mut updater = RmsPropConfig::default().updater();
        let state = HashMap::from([("M".to_string(), ArrayD::zeros(IxDyn(&[2])))]);

        let err = updater.set_state(state).unwrap_err();

        assert!(matches!(err, UpdaterErr::WrongStateKeys { .. }));
    }

    #[test]
    fn state_size_is_one_slot() {
        assert_eq!(RmsPropConfig::default().state_size(7), 7);
    }
}
