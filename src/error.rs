use std::{
    error::Error,
    fmt::{self, Display},
};

/// The result type used in the entire updater crate.
pub type Result<T> = std::result::Result<T, UpdaterErr>;

/// The updater crate's error type.
///
/// `NotARowVector` and `ShapeMismatch` report malformed caller input;
/// the remaining variants report operations running against missing or
/// unusable state. Neither family is retryable.
#[derive(Debug)]
pub enum UpdaterErr {
    /// A flat state buffer was expected but the given view isn't one.
    NotARowVector { ndim: usize },

    /// The gradient doesn't match the state tensors bound to the updater.
    ShapeMismatch {
        what: &'static str,
        got: usize,
        expected: usize,
    },

    /// An operation that needs state ran before any bind call.
    StateNotBound,

    /// A detached state map doesn't carry exactly the required slot keys.
    WrongStateKeys {
        got: Vec<String>,
        expected: &'static [&'static str],
    },

    /// The flat buffer cannot be cut into state views of the gradient shape.
    UnpartitionableView {
        len: usize,
        slots: usize,
        slot_len: usize,
    },
}

impl Display for UpdaterErr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            UpdaterErr::NotARowVector { ndim } => {
                format!("Expected a flat row vector as the state buffer, got a rank-{ndim} view")
            }
            UpdaterErr::ShapeMismatch {
                what,
                got,
                expected,
            } => {
                format!(
                    "There's a size mismatch between the {what} and the bound state, got {got} elements and expected {expected}"
                )
            }
            UpdaterErr::StateNotBound => {
                "The updater has not been initialized with state".to_string()
            }
            UpdaterErr::WrongStateKeys { got, expected } => {
                format!("The state map should contain only the keys {expected:?} but has {got:?}")
            }
            UpdaterErr::UnpartitionableView {
                len,
                slots,
                slot_len,
            } => {
                format!(
                    "Cannot cut a buffer of {len} elements into {slots} state views of {slot_len} elements each"
                )
            }
        };

        write!(f, "{s}")
    }
}

impl Error for UpdaterErr {}
