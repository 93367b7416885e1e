//! A porch light that switches itself off again.
//!
//! Run with `RUST_LOG=debug cargo run --example light_switch` to see every
//! event the worker looks at.

use std::time::Duration;

use nbfsm::{Coalesce, EngineConfig, Event, EventTracker, Instruction, Model, NonBlockingFsm, State, Transition};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, State)]
enum Light {
    On,
    Off,
    Broken,
}

fn porch_light() -> Result<Model<Light>, nbfsm::ModelError> {
    let mut model = Model::new();
    model.add_transition(Transition::between("Turn On", [Light::Off], Light::On))?;
    model.add_transition(Transition::between("Turn Off", [Light::On], Light::Off))?;
    model.add_transition(Transition::new(
        "Break",
        [Light::On, Light::Off],
        Light::Broken,
        |ctx, name, from, _| {
            info!(machine = ctx.name(), transition = name, from = from.name(), "bulb blew");
            Ok(Instruction::Nothing)
        },
    ))?;

    // lights go out on their own unless someone touches the switch again
    model.add_state_entry_action(Light::On, |ctx, _, _| {
        ctx.process_later(
            Event::named("Turn Off").coalesced("auto-off", Coalesce::MostRecent).subsequent(),
            Duration::from_millis(300),
        );
        Ok(Instruction::Nothing)
    })?;
    Ok(model)
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = EngineConfig::from_params_with_prefix("NBFSM_", std::env::vars())?
        .with_trace(true);
    let light = NonBlockingFsm::with_config(
        "porch",
        porch_light()?,
        Light::Off,
        tokio::runtime::Handle::current(),
        config,
    );

    light.process(Event::named("Turn On"));
    light.wait_for_state(Light::Off).await?;
    info!(count = light.transition_count(), "light went out by itself");

    let flicker = EventTracker::new();
    light.process(Event::named("Turn On"));
    light.process(Event::named("Turn On").tracked(&flicker));
    light.process(Event::named("Break"));

    let clean = light.quiesce_then_stop().await;
    info!(
        state = light.state().name(),
        count = light.transition_count(),
        flicker_processed = flicker.processed(),
        clean,
        "stopped"
    );
    Ok(())
}
