//! The transition table and per-state actions of a machine.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::Arc;

use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::Dfs;

use crate::action::{ActionResult, SharedEntryAction, SharedExitAction};
use crate::context::ExecutionContext;
use crate::state::State;
use crate::transition::Transition;

/// Configuration errors raised while building a [`Model`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ModelError {
    /// A transition was registered without any source state.
    #[error("transition `{name}` has no source states")]
    NoSourceStates { name: String },
    /// A transition with the same name already fires from this state.
    #[error("transition `{name}` is already registered for state {state}")]
    DuplicateTransition { name: String, state: &'static str },
    /// Another transition already connects the same pair of states.
    #[error("transition `{name}` from {from} to {to} conflicts with `{existing}`")]
    AmbiguousDestination {
        name: String,
        existing: String,
        from: &'static str,
        to: &'static str,
    },
    /// The state already has an entry action.
    #[error("state {0} already has an entry action")]
    DuplicateEntryAction(&'static str),
    /// The state already has an exit action.
    #[error("state {0} already has an exit action")]
    DuplicateExitAction(&'static str),
}

/// Registry of transitions and state actions.
///
/// A model is built before the machine exists and handed to it by value, after
/// which it is shared read-only with the worker. Every registration method
/// checks for conflicts and leaves the model untouched when it fails.
///
/// Transitions are looked up two ways: by `(state, name)` for named events and
/// by `(state, destination)` for instruction events and for instructions
/// returned by actions.
pub struct Model<S: State> {
    by_name: HashMap<S, HashMap<Arc<str>, Arc<Transition<S>>>>,
    by_destination: HashMap<S, HashMap<S, Arc<Transition<S>>>>,
    entry: HashMap<S, SharedEntryAction<S>>,
    exit: HashMap<S, SharedExitAction<S>>,
    transitions: usize,
}

impl<S: State> Model<S> {
    pub fn new() -> Self {
        Self {
            by_name: HashMap::new(),
            by_destination: HashMap::new(),
            entry: HashMap::new(),
            exit: HashMap::new(),
            transitions: 0,
        }
    }

    /// Registers a transition.
    pub fn add_transition(&mut self, transition: Transition<S>) -> Result<(), ModelError> {
        if transition.is_sourceless() {
            return Err(ModelError::NoSourceStates {
                name: transition.name().to_owned(),
            });
        }

        for state in transition.from_states() {
            if self
                .by_name
                .get(&state)
                .is_some_and(|named| named.contains_key(transition.name()))
            {
                return Err(ModelError::DuplicateTransition {
                    name: transition.name().to_owned(),
                    state: state.name(),
                });
            }
            if let Some(existing) = self
                .by_destination
                .get(&state)
                .and_then(|targets| targets.get(&transition.to_state()))
            {
                return Err(ModelError::AmbiguousDestination {
                    name: transition.name().to_owned(),
                    existing: existing.name().to_owned(),
                    from: state.name(),
                    to: transition.to_state().name(),
                });
            }
        }

        let transition = Arc::new(transition);
        let name: Arc<str> = Arc::from(transition.name());
        for state in transition.from_states() {
            self.by_name
                .entry(state)
                .or_default()
                .insert(name.clone(), transition.clone());
            self.by_destination
                .entry(state)
                .or_default()
                .insert(transition.to_state(), transition.clone());
        }
        self.transitions += 1;
        Ok(())
    }

    /// Registers the action run whenever `state` is entered.
    pub fn add_state_entry_action<F>(&mut self, state: S, action: F) -> Result<(), ModelError>
    where
        F: Fn(&ExecutionContext<'_, S>, Option<S>, S) -> ActionResult<S> + Send + Sync + 'static,
    {
        if self.entry.contains_key(&state) {
            return Err(ModelError::DuplicateEntryAction(state.name()));
        }
        self.entry.insert(state, Arc::new(action));
        Ok(())
    }

    /// Registers the action run whenever `state` is left.
    pub fn add_state_exit_action<F>(&mut self, state: S, action: F) -> Result<(), ModelError>
    where
        F: Fn(&ExecutionContext<'_, S>, S, S) -> ActionResult<S> + Send + Sync + 'static,
    {
        if self.exit.contains_key(&state) {
            return Err(ModelError::DuplicateExitAction(state.name()));
        }
        self.exit.insert(state, Arc::new(action));
        Ok(())
    }

    /// The transition named `name` that fires from `state`, if any.
    pub fn transition_for(&self, state: S, name: &str) -> Option<&Arc<Transition<S>>> {
        self.by_name.get(&state)?.get(name)
    }

    /// The transition that leads from `from` to `to`, if any.
    pub fn transition_between(&self, from: S, to: S) -> Option<&Arc<Transition<S>>> {
        self.by_destination.get(&from)?.get(&to)
    }

    /// Returns `true` if some transition leads from `from` to `to`.
    pub fn has_edge(&self, from: S, to: S) -> bool {
        self.transition_between(from, to).is_some()
    }

    /// Number of registered transitions.
    pub fn len(&self) -> usize {
        self.transitions
    }

    pub fn is_empty(&self) -> bool {
        self.transitions == 0
    }

    /// States that no sequence of transitions can reach from `initial`, in
    /// the order of [`State::ALL`].
    pub fn unreachable_states(&self, initial: S) -> Vec<S> {
        let mut graph = DiGraph::<S, ()>::new();
        let mut nodes: HashMap<S, NodeIndex> = HashMap::new();
        for &state in S::ALL.iter().chain(std::iter::once(&initial)) {
            nodes.entry(state).or_insert_with(|| graph.add_node(state));
        }

        for (from, targets) in &self.by_destination {
            for to in targets.keys() {
                if let (Some(&a), Some(&b)) = (nodes.get(from), nodes.get(to)) {
                    graph.add_edge(a, b, ());
                }
            }
        }

        let mut reachable = HashSet::new();
        let mut dfs = Dfs::new(&graph, nodes[&initial]);
        while let Some(node) = dfs.next(&graph) {
            reachable.insert(graph[node]);
        }

        S::ALL
            .iter()
            .copied()
            .filter(|state| !reachable.contains(state))
            .collect()
    }

    pub(crate) fn entry_action(&self, state: S) -> Option<&SharedEntryAction<S>> {
        self.entry.get(&state)
    }

    pub(crate) fn exit_action(&self, state: S) -> Option<&SharedExitAction<S>> {
        self.exit.get(&state)
    }
}

impl<S: State> Default for Model<S> {
    fn default() -> Self {
        Self::new()
    }
}

impl<S: State> fmt::Debug for Model<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Model")
            .field("transitions", &self.transitions)
            .field("entry_actions", &self.entry.keys().collect::<Vec<_>>())
            .field("exit_actions", &self.exit.keys().collect::<Vec<_>>())
            .finish()
    }
}
