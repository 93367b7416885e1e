//! Runtime for nbfsm: a finite state machine whose transitions run on a
//! background worker, so submitting an event never waits for one.
//!
//! A machine is assembled from a [`Model`] of named [`Transition`]s plus
//! optional entry and exit actions per state, and driven by submitting
//! [`Event`]s to a [`NonBlockingFsm`].

mod action;
mod coalesce;
mod config;
mod context;
mod diagnostics;
mod event;
mod instruction;
mod lifecycle;
mod machine;
mod model;
mod state;
mod transition;
mod worker;

pub use crate::action::{ActionError, ActionResult, EntryAction, ExitAction, TransitionAction};
pub use crate::coalesce::Coalesce;
pub use crate::config::{ConfigError, DEFAULT_MAX_CASCADE_DEPTH, EngineConfig};
pub use crate::context::ExecutionContext;
pub use crate::diagnostics::{ActionStage, Diagnostic};
pub use crate::event::{CoalescedEvent, Event, EventTracker, SubsequentEvent, TrackedEvent};
pub use crate::instruction::Instruction;
pub use crate::lifecycle::{Lifecycle, ShutdownMode, Snapshot};
pub use crate::machine::NonBlockingFsm;
pub use crate::model::{Model, ModelError};
pub use crate::state::State;
pub use crate::transition::Transition;
