mod common;

use std::sync::{Arc, Mutex};
use std::thread;

use nbfsm::{Event, Instruction, Model, NonBlockingFsm, State};
use proptest::prelude::*;
use tokio::runtime::Handle;

use common::{BREAK, Light, TURN_OFF, TURN_ON, light_model};

/// Records every entry as `(previous, entered, count)`.
fn record_entries(model: &mut Model<Light>) -> Arc<Mutex<Vec<(Option<Light>, Light, u64)>>> {
    let entries = Arc::new(Mutex::new(Vec::new()));
    for &state in Light::ALL {
        let log = entries.clone();
        model
            .add_state_entry_action(state, move |ctx, previous, entered| {
                log.lock()
                    .unwrap()
                    .push((previous, entered, ctx.transition_count()));
                Ok(Instruction::Nothing)
            })
            .unwrap();
    }
    entries
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_producers_commit_valid_edges() {
    let mut model = light_model();
    let entries = record_entries(&mut model);
    let fsm = NonBlockingFsm::new("Light Bulb", model, Light::Off, Handle::current(), false);

    let mut observed = Vec::new();
    thread::scope(|scope| {
        for producer in 0..8 {
            let fsm = &fsm;
            scope.spawn(move || {
                for i in 0..250 {
                    let name = if producer == 0 && i == 249 {
                        BREAK
                    } else if (producer + i) % 2 == 0 {
                        TURN_ON
                    } else {
                        TURN_OFF
                    };
                    fsm.process(Event::named(name));
                }
            });
        }
        let fsm = &fsm;
        let reader = scope.spawn(move || {
            let mut counts = Vec::new();
            for _ in 0..1_000 {
                counts.push(fsm.transition_count());
                thread::yield_now();
            }
            counts
        });
        observed = reader.join().unwrap();
    });

    assert!(fsm.quiesce_then_stop().await);
    assert!(observed.windows(2).all(|pair| pair[0] <= pair[1]));

    let reference = light_model();
    let entries = entries.lock().unwrap();
    let (initial, transitions) = entries.split_first().unwrap();
    assert_eq!(*initial, (None, Light::Off, 0));

    let mut current = Light::Off;
    for (n, &(previous, entered, count)) in transitions.iter().enumerate() {
        let previous = previous.unwrap();
        assert_eq!(previous, current);
        assert!(reference.has_edge(previous, entered), "{previous:?} -> {entered:?}");
        assert_eq!(count, n as u64 + 1);
        current = entered;
    }
    assert_eq!(fsm.state(), current);
    assert_eq!(fsm.transition_count(), transitions.len() as u64);
}

#[derive(Debug, Clone, Copy)]
enum Step {
    On,
    Off,
    Stay,
}

/// What the machine must end up with after `steps`, worked out by hand.
fn expected(steps: &[Step]) -> (Light, u64) {
    let mut state = Light::Off;
    let mut count = 0;
    for step in steps {
        match (step, state) {
            (Step::On, Light::Off) => {
                state = Light::On;
                count += 1;
            }
            (Step::Off, Light::On) => {
                state = Light::Off;
                count += 1;
            }
            (Step::Stay, _) => count += 1,
            _ => {}
        }
    }
    (state, count)
}

fn step_strategy() -> impl Strategy<Value = Step> {
    prop_oneof![Just(Step::On), Just(Step::Off), Just(Step::Stay)]
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn counter_matches_counted_instructions(steps in prop::collection::vec(step_strategy(), 0..64)) {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(1)
            .enable_all()
            .build()
            .unwrap();
        let mut model = light_model();
        let entries = record_entries(&mut model);
        let fsm = NonBlockingFsm::new("Light Bulb", model, Light::Off, runtime.handle().clone(), false);

        for step in &steps {
            fsm.process(match step {
                Step::On => Event::named(TURN_ON),
                Step::Off => Event::named(TURN_OFF),
                Step::Stay => Event::stay(),
            });
        }
        prop_assert!(fsm.blocking_quiesce_then_stop());

        let (state, count) = expected(&steps);
        prop_assert_eq!(fsm.state(), state);
        prop_assert_eq!(fsm.transition_count(), count);

        let entries = entries.lock().unwrap();
        let counts: Vec<u64> = entries.iter().map(|&(_, _, count)| count).collect();
        prop_assert!(counts.windows(2).all(|pair| pair[0] < pair[1]));
    }
}
