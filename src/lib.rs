//! # nbfsm
//!
//! Non-blocking finite state machines on Tokio. Submitting an event returns
//! at once; a background worker evaluates events one at a time, in order,
//! and runs the exit, transition and entry actions of every transition it
//! commits.
//!
//! Besides plain named events the engine understands delayed events,
//! *subsequent* events that are voided when anything else happened first,
//! and *coalesced* events where only one of a group of pending events runs.
//!
//! ## Example
//!
//! ```rust
//! use std::time::Duration;
//!
//! use nbfsm::{Event, Instruction, Model, NonBlockingFsm, State, Transition};
//!
//! #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, State)]
//! enum Light {
//!     On,
//!     Off,
//! }
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! let mut model = Model::new();
//! model.add_transition(Transition::between("Turn On", [Light::Off], Light::On)).unwrap();
//! model.add_transition(Transition::between("Turn Off", [Light::On], Light::Off)).unwrap();
//! model
//!     .add_state_entry_action(Light::On, |ctx, _, _| {
//!         println!("{} is lit", ctx.name());
//!         Ok(Instruction::Nothing)
//!     })
//!     .unwrap();
//!
//! let light = NonBlockingFsm::new("porch", model, Light::Off, tokio::runtime::Handle::current(), false);
//! light.process(Event::named("Turn On"));
//! // switches off after a while, unless something else happens first
//! light.process_later(Event::named("Turn Off").subsequent(), Duration::from_millis(10));
//! assert!(light.quiesce_then_stop().await);
//! assert_eq!(light.state(), Light::Off);
//! # }
//! ```

#[doc(inline)]
pub use nbfsm_core::*;
#[doc(inline)]
pub use nbfsm_macros::State;
