//! Side-effecting actions attached to states and transitions.
//!
//! There are three shapes of action:
//!
//! * [`EntryAction`] runs when a state is entered (including the initial state
//!   when the machine starts, with no previous state),
//! * [`ExitAction`] runs when a state is left,
//! * [`TransitionAction`] runs when a [`Transition`](crate::Transition) fires,
//!   between the exit and entry actions.
//!
//! Every action returns an [`Instruction`]. `Instruction::Nothing` is the
//! usual answer; anything else is resolved by the worker right after the
//! current transition, which is how cascading transitions are expressed.

use std::any::Any;
use std::error::Error as StdError;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use crate::context::ExecutionContext;
use crate::instruction::Instruction;

/// Result returned by every action.
pub type ActionResult<S> = Result<Instruction<S>, ActionError>;

/// Action run when entering a state: `(context, previous, entered)`.
pub type EntryAction<S> =
    dyn Fn(&ExecutionContext<'_, S>, Option<S>, S) -> ActionResult<S> + Send + Sync;

/// Action run when leaving a state: `(context, exited, next)`.
pub type ExitAction<S> = dyn Fn(&ExecutionContext<'_, S>, S, S) -> ActionResult<S> + Send + Sync;

/// Action run when a transition fires: `(context, transition name, from, to)`.
pub type TransitionAction<S> =
    dyn Fn(&ExecutionContext<'_, S>, &str, S, S) -> ActionResult<S> + Send + Sync;

pub(crate) type SharedEntryAction<S> = Arc<EntryAction<S>>;
pub(crate) type SharedExitAction<S> = Arc<ExitAction<S>>;
pub(crate) type SharedTransitionAction<S> = Arc<TransitionAction<S>>;

/// Failure of an action.
///
/// A failing action aborts the current cascade. It never leaves the machine
/// half way through a transition: the state is either the one before the
/// transition or the committed destination.
#[derive(Debug, thiserror::Error)]
pub enum ActionError {
    /// The action reported an error.
    #[error("action failed: {0}")]
    Failed(#[source] Box<dyn StdError + Send + Sync>),
    /// The action panicked.
    #[error("action panicked: {0}")]
    Panicked(String),
}

impl ActionError {
    /// Creates an [`ActionError::Failed`] from a message.
    pub fn msg(message: impl Into<String>) -> Self {
        Self::Failed(message.into().into())
    }

    /// Wraps any error as an [`ActionError::Failed`].
    pub fn new(error: impl StdError + Send + Sync + 'static) -> Self {
        Self::Failed(Box::new(error))
    }
}

/// Runs an action, turning a panic into [`ActionError::Panicked`].
pub(crate) fn guarded<S>(action: impl FnOnce() -> ActionResult<S>) -> ActionResult<S> {
    match panic::catch_unwind(AssertUnwindSafe(action)) {
        Ok(result) => result,
        Err(payload) => Err(ActionError::Panicked(panic_message(payload.as_ref()))),
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_owned()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "non-string panic payload".to_owned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    enum Valve {
        Open,
    }

    #[test]
    fn guarded_passes_results_through() {
        let ok: ActionResult<Valve> = guarded(|| Ok(Instruction::TransitionTo(Valve::Open)));
        assert_eq!(ok.unwrap(), Instruction::TransitionTo(Valve::Open));

        let err: ActionResult<Valve> = guarded(|| Err(ActionError::msg("stuck")));
        assert_eq!(err.unwrap_err().to_string(), "action failed: stuck");
    }

    #[test]
    fn wrapped_errors_keep_their_source() {
        let io = std::io::Error::new(std::io::ErrorKind::TimedOut, "no pressure reading");
        let err: ActionResult<Valve> = guarded(|| Err(ActionError::new(io)));
        let err = err.unwrap_err();
        assert_eq!(err.to_string(), "action failed: no pressure reading");
        let source = err.source().unwrap();
        assert!(source.downcast_ref::<std::io::Error>().is_some());
    }

    #[test]
    fn guarded_catches_panics() {
        let result: ActionResult<Valve> = guarded(|| panic!("valve jammed"));
        match result {
            Err(ActionError::Panicked(message)) => assert_eq!(message, "valve jammed"),
            other => panic!("expected a panic error, got {other:?}"),
        }

        let formatted: ActionResult<Valve> = guarded(|| panic!("jammed at {}%", 40));
        assert!(matches!(formatted, Err(ActionError::Panicked(m)) if m == "jammed at 40%"));
    }
}
