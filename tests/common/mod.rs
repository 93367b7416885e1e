#![allow(dead_code)]

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use nbfsm::{Event, Instruction, Model, State, Transition};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, State)]
pub enum Light {
    On,
    Off,
    Broken,
}

pub const TURN_ON: &str = "Turn On";
pub const TURN_OFF: &str = "Turn Off";
pub const BREAK: &str = "Break";

/// On and Off toggle; either can break, and Broken is final.
pub fn light_model() -> Model<Light> {
    let mut model = Model::new();
    model
        .add_transition(Transition::between(TURN_ON, [Light::Off], Light::On))
        .unwrap();
    model
        .add_transition(Transition::between(TURN_OFF, [Light::On], Light::Off))
        .unwrap();
    model
        .add_transition(Transition::between(
            BREAK,
            [Light::On, Light::Off],
            Light::Broken,
        ))
        .unwrap();
    model
}

/// Counts how often `state` is entered.
pub fn count_entries(model: &mut Model<Light>, state: Light) -> Arc<AtomicUsize> {
    let entries = Arc::new(AtomicUsize::new(0));
    let counter = entries.clone();
    model
        .add_state_entry_action(state, move |_, _, _| {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(Instruction::Nothing)
        })
        .unwrap();
    entries
}

pub fn named(name: &str) -> Event<Light> {
    Event::named(name)
}
