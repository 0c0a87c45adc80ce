use serde::{Deserialize, Serialize};

/// A learning-rate strategy, evaluated once per update step.
///
/// Every variant is a pure function of the iteration and epoch counters, so
/// a schedule can be persisted next to the optimizer state and a re-created
/// driver resumes at the exact same rate.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LearningRate {
    /// A fixed rate for the whole run.
    Constant(f64),

    /// Multiplies `initial` by `decay_rate` once every `step_every` iterations.
    Step {
        initial: f64,
        decay_rate: f64,
        step_every: usize,
    },

    /// `initial * gamma^iteration`.
    Exponential { initial: f64, gamma: f64 },

    /// Linear warmup from zero to `peak`, then cosine decay towards `floor`
    /// over `total` iterations.
    Cosine {
        peak: f64,
        floor: f64,
        warmup: usize,
        total: usize,
    },
}

impl LearningRate {
    /// Evaluates the schedule at the given point of training.
    ///
    /// The built-in schedules are keyed on the iteration counter; the epoch
    /// is part of the evaluation contract for caller-defined bookkeeping.
    ///
    /// # Arguments
    /// * `iteration` - The 0-indexed update counter.
    /// * `epoch` - The current epoch.
    ///
    /// # Returns
    /// The learning rate to use for this step.
    pub fn value_at(&self, iteration: usize, _epoch: usize) -> f64 {
        match *self {
            LearningRate::Constant(rate) => rate,
            LearningRate::Step {
                initial,
                decay_rate,
                step_every,
            } => initial * decay_rate.powi((iteration / step_every.max(1)) as i32),
            LearningRate::Exponential { initial, gamma } => initial * gamma.powi(iteration as i32),
            LearningRate::Cosine {
                peak,
                floor,
                warmup,
                total,
            } => {
                if iteration < warmup {
                    return peak * iteration as f64 / warmup.max(1) as f64;
                }

                let progress = (iteration - warmup) as f64
                    / total.saturating_sub(warmup).max(1) as f64;
                let progress = progress.min(1.0);

                floor + 0.5 * (peak - floor) * (1.0 + (std::f64::consts::PI * progress).cos())
            }
        }
    }
}
