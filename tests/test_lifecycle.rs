mod common;

use std::sync::atomic::Ordering;
use std::time::Duration;

use nbfsm::{EngineConfig, Event, EventTracker, Instruction, Lifecycle, NonBlockingFsm, ShutdownMode};
use tokio::runtime::Handle;

use common::{BREAK, Light, TURN_OFF, TURN_ON, count_entries, light_model, named};

#[tokio::test]
async fn test_start_runs_initial_entry_once() {
    let mut model = light_model();
    let off_entries = count_entries(&mut model, Light::Off);

    let fsm = NonBlockingFsm::new("Light Bulb", model, Light::Off, Handle::current(), false);
    assert_eq!(fsm.lifecycle(), Lifecycle::NotStarted);
    fsm.start();
    fsm.start();
    assert!(fsm.is_running());

    assert!(fsm.quiesce_then_stop().await);
    assert_eq!(off_entries.load(Ordering::SeqCst), 1);
    assert_eq!(fsm.transition_count(), 0);
}

#[tokio::test]
async fn test_first_event_starts_the_machine() {
    let fsm = NonBlockingFsm::new("Light Bulb", light_model(), Light::Off, Handle::current(), false);
    fsm.process(named(TURN_ON));
    assert!(fsm.is_running());

    fsm.wait_for_state(Light::On).await.unwrap();
    assert_eq!(fsm.snapshot().transitions, 1);
    assert!(fsm.quiesce_then_stop().await);
}

#[tokio::test]
async fn test_quiesce_before_start() {
    let mut model = light_model();
    let off_entries = count_entries(&mut model, Light::Off);
    let fsm = NonBlockingFsm::new("Light Bulb", model, Light::Off, Handle::current(), false);

    assert!(fsm.quiesce_then_stop().await);
    assert!(fsm.is_stopped());
    assert_eq!(off_entries.load(Ordering::SeqCst), 0);

    // a stopped machine cannot be started again
    fsm.start();
    assert!(fsm.is_stopped());
}

#[tokio::test]
async fn test_events_after_stop_are_not_accepted() {
    let fsm = NonBlockingFsm::new("Light Bulb", light_model(), Light::Off, Handle::current(), false);
    fsm.process(named(TURN_ON));
    assert!(fsm.quiesce_then_stop().await);

    let tracker = EventTracker::new();
    fsm.process(named(TURN_OFF).tracked(&tracker));
    tokio::task::yield_now().await;

    assert!(!tracker.accepted());
    assert_eq!(fsm.state(), Light::On);
    assert_eq!(fsm.abandoned(), 0);
}

#[tokio::test]
async fn test_stop_instruction_discards_queued_events() {
    let fsm = NonBlockingFsm::new("Light Bulb", light_model(), Light::Off, Handle::current(), false);
    let discarded = EventTracker::new();

    fsm.process(named(TURN_ON));
    fsm.process(Event::stop());
    fsm.process(named(TURN_OFF).tracked(&discarded));
    fsm.process(named(BREAK));

    // the queue was not drained, it was abandoned
    assert!(!fsm.quiesce_then_stop().await);
    assert!(fsm.is_stopped());
    assert_eq!(fsm.state(), Light::On);
    assert_eq!(fsm.transition_count(), 1);
    assert_eq!(fsm.abandoned(), 2);
    assert!(discarded.accepted());
    assert!(!discarded.evaluated());
}

#[tokio::test]
async fn test_stop_as_last_event_is_clean() {
    let mut model = light_model();
    model
        .add_state_entry_action(Light::Broken, |_, _, _| Ok(Instruction::Stop))
        .unwrap();
    let fsm = NonBlockingFsm::new("Light Bulb", model, Light::Off, Handle::current(), false);

    fsm.process(named(BREAK));
    fsm.wait_for_state(Light::Broken).await.unwrap();

    assert!(fsm.quiesce_then_stop().await);
    assert!(fsm.is_stopped());
    assert_eq!(fsm.transition_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_quiesce_timeout_abandons_pending_events() {
    let config = EngineConfig::default().with_quiesce_timeout(Duration::from_secs(1));
    let fsm = NonBlockingFsm::with_config("Light Bulb", light_model(), Light::Off, Handle::current(), config);
    let tracker = EventTracker::new();

    fsm.process(named(TURN_ON));
    fsm.process_later(named(TURN_OFF).tracked(&tracker), Duration::from_secs(3600));

    assert!(!fsm.quiesce_then_stop().await);
    assert!(fsm.is_stopped());
    assert_eq!(fsm.state(), Light::On);
    assert!(tracker.accepted());
    assert!(!tracker.evaluated());
    assert_eq!(fsm.abandoned(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_quiesce_waits_for_scheduled_events() {
    let fsm = NonBlockingFsm::new("Light Bulb", light_model(), Light::Off, Handle::current(), false);

    fsm.process_later(named(TURN_ON), Duration::from_secs(60));
    fsm.process_later(named(TURN_OFF), Duration::from_secs(120));

    assert!(fsm.quiesce_then_stop().await);
    assert_eq!(fsm.transition_count(), 2);
    assert_eq!(fsm.state(), Light::Off);
}

#[tokio::test(start_paused = true)]
async fn test_immediate_shutdown_discards_scheduled_events() {
    let fsm = NonBlockingFsm::new("Light Bulb", light_model(), Light::Off, Handle::current(), false);

    fsm.process(named(TURN_ON));
    fsm.wait_for_state(Light::On).await.unwrap();
    fsm.process_later(named(TURN_OFF), Duration::from_secs(60));

    assert!(!fsm.shutdown(ShutdownMode::Immediate).await);
    assert!(fsm.is_stopped());
    assert_eq!(fsm.state(), Light::On);
    assert_eq!(fsm.abandoned(), 1);
}

#[tokio::test]
async fn test_stop_is_idempotent() {
    let fsm = NonBlockingFsm::new("Light Bulb", light_model(), Light::Off, Handle::current(), false);
    fsm.process(named(TURN_ON));
    fsm.wait_for_state(Light::On).await.unwrap();

    fsm.stop();
    fsm.stop();
    assert!(fsm.is_stopped());
    assert!(fsm.shutdown(ShutdownMode::Graceful).await);
}

#[test]
fn test_blocking_quiesce_from_a_plain_thread() {
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(1)
        .enable_all()
        .build()
        .unwrap();

    let fsm = NonBlockingFsm::new("Light Bulb", light_model(), Light::Off, runtime.handle().clone(), false);
    fsm.process(named(TURN_ON));
    fsm.process(named(TURN_OFF));
    fsm.process(named(BREAK));

    assert!(fsm.blocking_quiesce_then_stop());
    assert_eq!(fsm.state(), Light::Broken);
    assert_eq!(fsm.transition_count(), 3);
}

#[test]
fn test_stop_during_an_action_abandons_only_queued_events() {
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(1)
        .enable_all()
        .build()
        .unwrap();

    let (entered_tx, entered_rx) = std::sync::mpsc::channel();
    let (release_tx, release_rx) = std::sync::mpsc::channel::<()>();
    let entered_tx = std::sync::Mutex::new(entered_tx);
    let release_rx = std::sync::Mutex::new(release_rx);

    let mut model = light_model();
    model
        .add_state_entry_action(Light::On, move |_, _, _| {
            let _ = entered_tx.lock().unwrap().send(());
            let _ = release_rx.lock().unwrap().recv_timeout(Duration::from_secs(5));
            Ok(Instruction::Nothing)
        })
        .unwrap();
    let fsm = NonBlockingFsm::new("Light Bulb", model, Light::Off, runtime.handle().clone(), false);

    fsm.process(named(TURN_ON));
    entered_rx.recv_timeout(Duration::from_secs(5)).unwrap();
    fsm.process(named(TURN_OFF));
    fsm.process(named(BREAK));

    fsm.stop();
    assert!(fsm.is_stopped());
    release_tx.send(()).unwrap();

    assert!(!runtime.block_on(fsm.shutdown(ShutdownMode::Immediate)));
    assert_eq!(fsm.abandoned(), 2);
    assert_eq!(fsm.transition_count(), 1);
    assert_eq!(fsm.state(), Light::On);
}
