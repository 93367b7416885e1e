//! The handle actions get while a machine processes an event.

use std::time::Duration;

use crate::event::Event;
use crate::machine::Core;
use crate::state::State;

/// Per-action view of the machine.
///
/// Created by the worker for each action it runs and borrowed by the action;
/// it cannot outlive the processing step.
pub struct ExecutionContext<'a, S: State> {
    core: &'a Core<S>,
    state: S,
    transitions: u64,
}

impl<'a, S: State> ExecutionContext<'a, S> {
    pub(crate) fn new(core: &'a Core<S>, state: S, transitions: u64) -> Self {
        Self {
            core,
            state,
            transitions,
        }
    }

    /// Name of the machine.
    pub fn name(&self) -> &str {
        &self.core.name
    }

    /// The committed state when the action was invoked.
    pub fn state(&self) -> S {
        self.state
    }

    /// The transition count when the action was invoked.
    pub fn transition_count(&self) -> u64 {
        self.transitions
    }

    /// Queues an event behind everything already submitted.
    ///
    /// A subsequent event is measured against the count this action saw, so
    /// anything the rest of the cascade counts voids it.
    pub fn process(&self, mut event: Event<S>) {
        event.stamp(self.transitions);
        self.core.submit(event, None);
    }

    /// Queues an event once `delay` has elapsed.
    pub fn process_later(&self, mut event: Event<S>, delay: Duration) {
        event.stamp(self.transitions);
        self.core.submit(event, Some(delay));
    }
}
