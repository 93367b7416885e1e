//! Events submitted to a machine.
//!
//! An [`Event`] is a closed set of shapes: plain named events, instructions
//! wrapped as events, and three decorators that wrap another event:
//!
//! * [`Event::coalesced`] collapses a group of pending events to one,
//! * [`Event::subsequent`] voids the event if the machine counted anything
//!   else between scheduling and evaluation,
//! * [`Event::tracked`] records what happened to the event in an
//!   [`EventTracker`].
//!
//! Decorators compose freely; every check on the way to the innermost event
//! must pass for it to be evaluated.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::coalesce::{Coalesce, CoalescingRegistry};
use crate::instruction::Instruction;
use crate::model::Model;
use crate::state::State;
use crate::transition::Transition;

/// An event for a machine with states `S`.
pub enum Event<S: State> {
    /// Fires the transition with this name, if one applies to the current
    /// state.
    Named(Arc<str>),
    /// An instruction submitted directly. `TransitionTo` applies only when
    /// the model has a transition from the current state to the target.
    Instruction(Instruction<S>),
    /// See [`Event::coalesced`].
    Coalesced(Box<CoalescedEvent<S>>),
    /// See [`Event::subsequent`].
    Subsequent(Box<SubsequentEvent<S>>),
    /// See [`Event::tracked`].
    Tracked(Box<TrackedEvent<S>>),
}

/// A member of a coalescing group.
pub struct CoalescedEvent<S: State> {
    key: Arc<str>,
    policy: Coalesce,
    ticket: Option<u64>,
    inner: Event<S>,
}

/// An event that only applies if nothing else was counted since it was
/// scheduled.
pub struct SubsequentEvent<S: State> {
    stamp: Option<u64>,
    inner: Event<S>,
}

/// An event whose progress is recorded in an [`EventTracker`].
pub struct TrackedEvent<S: State> {
    tracker: Arc<EventTracker>,
    inner: Event<S>,
}

impl<S: State> Event<S> {
    /// An event selecting the transition called `name`.
    pub fn named(name: impl Into<Arc<str>>) -> Self {
        Self::Named(name.into())
    }

    /// An event requesting a transition to `state`.
    pub fn transition_to(state: S) -> Self {
        Self::Instruction(Instruction::TransitionTo(state))
    }

    /// An event that is counted without changing state.
    pub fn stay() -> Self {
        Self::Instruction(Instruction::Stay)
    }

    /// An event that stops the machine.
    pub fn stop() -> Self {
        Self::Instruction(Instruction::Stop)
    }

    /// Wraps an instruction as an event.
    pub fn instruction(instruction: Instruction<S>) -> Self {
        Self::Instruction(instruction)
    }

    /// Makes this event a member of the coalescing group `key`.
    ///
    /// Of all members of a group that are pending at the same time, only one
    /// is evaluated, chosen by `policy`. Group membership is decided when the
    /// event is submitted.
    pub fn coalesced(self, key: impl Into<Arc<str>>, policy: Coalesce) -> Self {
        Self::Coalesced(Box::new(CoalescedEvent {
            key: key.into(),
            policy,
            ticket: None,
            inner: self,
        }))
    }

    /// Makes this event void if the machine counts any other event between
    /// the moment it is scheduled and the moment it is evaluated.
    pub fn subsequent(self) -> Self {
        Self::Subsequent(Box::new(SubsequentEvent {
            stamp: None,
            inner: self,
        }))
    }

    /// Records the progress of this event in `tracker`.
    pub fn tracked(self, tracker: &Arc<EventTracker>) -> Self {
        Self::Tracked(Box::new(TrackedEvent {
            tracker: tracker.clone(),
            inner: self,
        }))
    }

    /// Called on the submitting thread when the machine takes the event.
    pub(crate) fn accept(&mut self, registry: &CoalescingRegistry) {
        match self {
            Self::Named(_) | Self::Instruction(_) => {}
            Self::Coalesced(coalesced) => {
                coalesced.ticket = Some(registry.enroll(&coalesced.key, coalesced.policy));
                coalesced.inner.accept(registry);
            }
            Self::Subsequent(subsequent) => subsequent.inner.accept(registry),
            Self::Tracked(tracked) => {
                tracked.tracker.accepted.store(true, Ordering::Release);
                tracked.inner.accept(registry);
            }
        }
    }

    /// Records the transition count subsequent events are measured against.
    /// Events submitted by an action are stamped with the count the action
    /// saw; all others on the worker, in queue order. The first stamp wins.
    pub(crate) fn stamp(&mut self, transitions: u64) {
        match self {
            Self::Named(_) | Self::Instruction(_) => {}
            Self::Coalesced(coalesced) => coalesced.inner.stamp(transitions),
            Self::Subsequent(subsequent) => {
                subsequent.stamp.get_or_insert(transitions);
                subsequent.inner.stamp(transitions);
            }
            Self::Tracked(tracked) => tracked.inner.stamp(transitions),
        }
    }

    /// Drops any coalescing claims held by this event without evaluating it.
    pub(crate) fn release(&self, registry: &CoalescingRegistry) {
        match self {
            Self::Named(_) | Self::Instruction(_) => {}
            Self::Coalesced(coalesced) => {
                if let Some(ticket) = coalesced.ticket {
                    registry.release(&coalesced.key, ticket);
                }
                coalesced.inner.release(registry);
            }
            Self::Subsequent(subsequent) => subsequent.inner.release(registry),
            Self::Tracked(tracked) => tracked.inner.release(registry),
        }
    }

    /// Evaluates the event against the current state.
    ///
    /// Returns `None` when the event declines. Trackers reached on the way
    /// in are pushed to `trackers` whether or not the event applies; they
    /// are marked evaluated only if every check down to the innermost event
    /// passed.
    pub(crate) fn evaluate(
        self,
        scope: &EvalScope<'_, S>,
        trackers: &mut Vec<Arc<EventTracker>>,
    ) -> Option<Evaluation<S>> {
        if matches!(self, Self::Named(_) | Self::Instruction(_)) {
            for tracker in trackers.iter() {
                tracker.evaluated.store(true, Ordering::Release);
            }
        }
        match self {
            Self::Named(name) => scope
                .model
                .transition_for(scope.state, &name)
                .map(|transition| Evaluation {
                    instruction: Instruction::TransitionTo(transition.to_state()),
                    transition: Some(transition.clone()),
                }),
            Self::Instruction(Instruction::TransitionTo(target)) => scope
                .model
                .transition_between(scope.state, target)
                .map(|transition| Evaluation {
                    instruction: Instruction::TransitionTo(target),
                    transition: Some(transition.clone()),
                }),
            Self::Instruction(instruction) => Some(Evaluation {
                instruction,
                transition: None,
            }),
            Self::Coalesced(coalesced) => {
                let CoalescedEvent {
                    key, ticket, inner, ..
                } = *coalesced;
                match ticket {
                    Some(ticket) if scope.registry.claim(&key, ticket) => {
                        inner.evaluate(scope, trackers)
                    }
                    _ => {
                        inner.release(scope.registry);
                        None
                    }
                }
            }
            Self::Subsequent(subsequent) => {
                let SubsequentEvent { stamp, inner } = *subsequent;
                if stamp.is_none_or(|stamp| stamp == scope.transitions) {
                    inner.evaluate(scope, trackers)
                } else {
                    inner.release(scope.registry);
                    None
                }
            }
            Self::Tracked(tracked) => {
                let TrackedEvent { tracker, inner } = *tracked;
                trackers.push(tracker);
                inner.evaluate(scope, trackers)
            }
        }
    }
}

impl<S: State> fmt::Display for Event<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Named(name) => f.write_str(name),
            Self::Instruction(Instruction::TransitionTo(state)) => {
                write!(f, "transition to {}", state.name())
            }
            Self::Instruction(instruction) => write!(f, "{instruction:?}"),
            Self::Coalesced(coalesced) => write!(
                f,
                "coalesced[{}, {:?}]({})",
                coalesced.key, coalesced.policy, coalesced.inner
            ),
            Self::Subsequent(subsequent) => write!(f, "subsequent({})", subsequent.inner),
            Self::Tracked(tracked) => fmt::Display::fmt(&tracked.inner, f),
        }
    }
}

impl<S: State> fmt::Debug for Event<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Event({self})")
    }
}

impl<S: State> From<Instruction<S>> for Event<S> {
    fn from(instruction: Instruction<S>) -> Self {
        Self::Instruction(instruction)
    }
}

/// What the worker needs to evaluate an event.
pub(crate) struct EvalScope<'a, S: State> {
    pub(crate) state: S,
    pub(crate) transitions: u64,
    pub(crate) model: &'a Model<S>,
    pub(crate) registry: &'a CoalescingRegistry,
}

/// An event that applies to the current state.
pub(crate) struct Evaluation<S: State> {
    pub(crate) instruction: Instruction<S>,
    pub(crate) transition: Option<Arc<Transition<S>>>,
}

/// Records what happened to a tracked event.
///
/// * `accepted`: the machine took the event (always, unless it was stopped),
/// * `evaluated`: the event passed every decorator check and was looked at
///   in the machine's current state,
/// * `processed`: that evaluation was counted: a transition committed or the
///   machine stayed.
#[derive(Debug, Default)]
pub struct EventTracker {
    accepted: AtomicBool,
    evaluated: AtomicBool,
    processed: AtomicBool,
}

impl EventTracker {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn accepted(&self) -> bool {
        self.accepted.load(Ordering::Acquire)
    }

    pub fn evaluated(&self) -> bool {
        self.evaluated.load(Ordering::Acquire)
    }

    pub fn processed(&self) -> bool {
        self.processed.load(Ordering::Acquire)
    }

    pub(crate) fn mark_processed(&self) {
        self.processed.store(true, Ordering::Release);
    }
}
