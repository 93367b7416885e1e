//! Named edges of the state graph.

use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

use crate::action::{ActionResult, SharedTransitionAction};
use crate::context::ExecutionContext;
use crate::instruction::Instruction;
use crate::state::State;

/// A named edge from a set of source states to a single destination state.
///
/// The action runs when the edge fires, after the exit action of the source
/// state and before the entry action of the destination.
pub struct Transition<S: State> {
    name: Arc<str>,
    from: HashSet<S>,
    to: S,
    action: SharedTransitionAction<S>,
}

impl<S: State> Transition<S> {
    /// Creates a transition with an action.
    pub fn new<F>(name: impl Into<Arc<str>>, from: impl IntoIterator<Item = S>, to: S, action: F) -> Self
    where
        F: Fn(&ExecutionContext<'_, S>, &str, S, S) -> ActionResult<S> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            from: from.into_iter().collect(),
            to,
            action: Arc::new(action),
        }
    }

    /// Creates a transition whose action does nothing.
    pub fn between(name: impl Into<Arc<str>>, from: impl IntoIterator<Item = S>, to: S) -> Self {
        Self::new(name, from, to, |_, _, _, _| Ok(Instruction::Nothing))
    }

    /// Name of the transition. Named events select transitions by this name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// States this transition may fire from.
    pub fn from_states(&self) -> impl Iterator<Item = S> + '_ {
        self.from.iter().copied()
    }

    /// Returns `true` if the transition may fire from `state`.
    pub fn applies_to(&self, state: S) -> bool {
        self.from.contains(&state)
    }

    /// Destination state.
    pub fn to_state(&self) -> S {
        self.to
    }

    pub(crate) fn action(&self) -> &SharedTransitionAction<S> {
        &self.action
    }

    pub(crate) fn is_sourceless(&self) -> bool {
        self.from.is_empty()
    }
}

impl<S: State> fmt::Debug for Transition<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Transition")
            .field("name", &self.name)
            .field("from", &self.from)
            .field("to", &self.to)
            .finish_non_exhaustive()
    }
}
