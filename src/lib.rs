//! Stateful gradient updaters over externally-owned state memory.
//!
//! Every updater implements one contract: bind per-parameter optimizer state
//! (detached tensors or views cut out of a single flat buffer), then rewrite
//! each incoming gradient in place into the step actually applied to the
//! model parameters.

mod error;
mod indexing;
mod schedule;
mod state;
pub mod updaters;

pub use error::{Result, UpdaterErr};
pub use indexing::{normalize_axes, normalize_axes_in_place};
pub use schedule::LearningRate;
pub use state::StateTensor;
pub use updaters::{
    AdaGradConfig, AdaGradUpdater, AdaMaxConfig, AdaMaxUpdater, AdamConfig, AdamUpdater,
    GradientUpdater, RmsPropConfig, RmsPropUpdater, SgdConfig, SgdUpdater,
};
