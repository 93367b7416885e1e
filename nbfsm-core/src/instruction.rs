//! Outcomes of evaluating an event or running an action.

use crate::state::State;

/// What the machine should do next.
///
/// Returned by every action and produced by every event that applies to the
/// current state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Instruction<S> {
    /// No further action. Nothing is counted.
    Nothing,
    /// Transition to the given state, running exit, transition and entry
    /// actions.
    TransitionTo(S),
    /// Remain in the current state, but count the event as handled.
    Stay,
    /// Stop the machine. Anything still queued is discarded.
    Stop,
}

impl<S: State> Instruction<S> {
    /// Shorthand for [`Instruction::TransitionTo`].
    #[must_use]
    pub fn to(state: S) -> Self {
        Self::TransitionTo(state)
    }

    /// Returns `true` for [`Instruction::Nothing`].
    #[must_use]
    pub fn is_nothing(&self) -> bool {
        matches!(self, Self::Nothing)
    }
}

impl<S> Default for Instruction<S> {
    fn default() -> Self {
        Self::Nothing
    }
}
