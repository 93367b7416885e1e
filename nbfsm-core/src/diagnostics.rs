//! Problems the worker reports while processing events.
//!
//! Every diagnostic is also logged. Subscribers receive them through
//! [`NonBlockingFsm::subscribe_diagnostics`](crate::NonBlockingFsm::subscribe_diagnostics).

use std::fmt;
use std::sync::Arc;

use crate::action::ActionError;

/// Capacity of the diagnostics broadcast channel. Slow subscribers lag and
/// miss the oldest diagnostics.
pub(crate) const DIAGNOSTICS_CAPACITY: usize = 64;

/// Which kind of action failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActionStage {
    Exit,
    Transition,
    Entry,
}

impl fmt::Display for ActionStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Exit => "exit",
            Self::Transition => "transition",
            Self::Entry => "entry",
        })
    }
}

/// Something that went wrong in a processing step.
#[derive(Debug, Clone)]
pub enum Diagnostic<S> {
    /// An action failed and the rest of the cascade was dropped.
    ///
    /// `state` is the state the action was attached to: the exited state for
    /// exit and transition actions, the entered state for entry actions.
    ActionFailed {
        stage: ActionStage,
        state: S,
        error: Arc<ActionError>,
    },
    /// An action asked for a transition the model does not have.
    NoTransition { from: S, to: S },
    /// A cascade of follow-up instructions exceeded the configured depth.
    CascadeLimit { state: S, limit: usize },
}
