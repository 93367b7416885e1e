//! The public machine handle and the state it shares with its worker.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use parking_lot::Mutex;
use tokio::runtime::Handle;
use tokio::sync::{broadcast, mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{Instrument, debug, info_span, warn};

use crate::coalesce::CoalescingRegistry;
use crate::config::EngineConfig;
use crate::diagnostics::{DIAGNOSTICS_CAPACITY, Diagnostic};
use crate::event::Event;
use crate::lifecycle::{Lifecycle, ShutdownMode, Snapshot, Status};
use crate::model::Model;
use crate::state::State;
use crate::worker::{Command, Worker};

/// State shared by the machine handle, its worker and every
/// [`ExecutionContext`](crate::ExecutionContext).
pub(crate) struct Core<S: State> {
    pub(crate) name: Arc<str>,
    pub(crate) config: EngineConfig,
    pub(crate) registry: CoalescingRegistry,
    commands: mpsc::UnboundedSender<Command<S>>,
    snapshot: watch::Sender<Snapshot<S>>,
    status: watch::Sender<Status>,
    diagnostics: broadcast::Sender<Diagnostic<S>>,
    abandoned: AtomicUsize,
}

impl<S: State> Core<S> {
    /// Accepts an event unless the machine is stopped and queues it.
    pub(crate) fn submit(&self, mut event: Event<S>, delay: Option<Duration>) {
        let accepted = self.status.send_if_modified(|status| {
            if status.lifecycle == Lifecycle::Stopped {
                return false;
            }
            status.outstanding += 1;
            true
        });
        if !accepted {
            debug!(machine = %self.name, %event, "machine stopped, event discarded");
            return;
        }

        event.accept(&self.registry);
        if let Err(mpsc::error::SendError(command)) =
            self.commands.send(Command::Submit { event, delay })
        {
            command.release(&self.registry);
            self.complete();
        }
    }

    /// Re-injects an event whose delay elapsed.
    pub(crate) fn fire(&self, event: Event<S>) {
        if let Err(mpsc::error::SendError(command)) = self.commands.send(Command::Fire(event)) {
            command.release(&self.registry);
        }
    }

    /// Claims the next accepted event for evaluation. Returns `false` once
    /// the machine is stopped; the event then counts as abandoned.
    pub(crate) fn begin(&self) -> bool {
        let mut running = false;
        self.status.send_if_modified(|status| {
            running = status.lifecycle != Lifecycle::Stopped;
            status.busy = running;
            false
        });
        running
    }

    /// Marks one accepted event as finished.
    pub(crate) fn complete(&self) {
        self.status.send_if_modified(|status| {
            status.busy = false;
            status.outstanding = status.outstanding.saturating_sub(1);
            status.outstanding == 0
        });
    }

    /// Stops accepting events. Returns how many accepted events will never
    /// be processed.
    pub(crate) fn halt(&self) -> usize {
        let mut abandoned = 0;
        self.status.send_if_modified(|status| {
            if status.lifecycle == Lifecycle::Stopped {
                return false;
            }
            status.lifecycle = Lifecycle::Stopped;
            // the event under evaluation still finishes
            let in_flight = usize::from(status.busy);
            abandoned = std::mem::take(&mut status.outstanding).saturating_sub(in_flight);
            status.outstanding = in_flight;
            true
        });
        self.abandoned.fetch_add(abandoned, Ordering::AcqRel);
        abandoned
    }

    pub(crate) fn publish(&self, snapshot: Snapshot<S>) {
        self.snapshot.send_replace(snapshot);
    }

    pub(crate) fn report(&self, diagnostic: Diagnostic<S>) {
        // no subscribers is fine
        let _ = self.diagnostics.send(diagnostic);
    }

    fn lifecycle(&self) -> Lifecycle {
        self.status.borrow().lifecycle
    }
}

/// A finite state machine that processes events on a background worker.
///
/// Submitting never blocks on a transition: [`process`](Self::process)
/// queues the event and returns. The worker, a task on the runtime passed at
/// construction, evaluates events one at a time in submission order and runs
/// the exit, transition and entry actions of every transition it commits.
///
/// ```rust
/// use nbfsm_core::{Event, Model, NonBlockingFsm, State, Transition};
///
/// #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
/// enum Door { Open, Closed }
///
/// impl State for Door {
///     const ALL: &'static [Self] = &[Door::Open, Door::Closed];
///     fn name(&self) -> &'static str {
///         match self { Door::Open => "Open", Door::Closed => "Closed" }
///     }
/// }
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() {
/// let mut model = Model::new();
/// model.add_transition(Transition::between("open", [Door::Closed], Door::Open)).unwrap();
/// model.add_transition(Transition::between("close", [Door::Open], Door::Closed)).unwrap();
///
/// let door = NonBlockingFsm::new("door", model, Door::Closed, tokio::runtime::Handle::current(), false);
/// door.process(Event::named("open"));
/// door.process(Event::named("close"));
/// assert!(door.quiesce_then_stop().await);
/// assert_eq!(door.state(), Door::Closed);
/// assert_eq!(door.transition_count(), 2);
/// # }
/// ```
pub struct NonBlockingFsm<S: State> {
    core: Arc<Core<S>>,
    runtime: Handle,
    pending: Mutex<Option<Worker<S>>>,
    task: Mutex<Option<JoinHandle<()>>>,
    shutdown_tx: watch::Sender<Option<ShutdownMode>>,
    snapshot_rx: watch::Receiver<Snapshot<S>>,
}

impl<S: State> NonBlockingFsm<S> {
    /// Creates a machine in `initial` with default settings. `trace` logs
    /// committed transitions at `info`.
    ///
    /// Nothing runs until the machine is started, explicitly or by the first
    /// call to [`process`](Self::process).
    pub fn new(
        name: impl Into<Arc<str>>,
        model: Model<S>,
        initial: S,
        runtime: Handle,
        trace: bool,
    ) -> Self {
        Self::with_config(
            name,
            model,
            initial,
            runtime,
            EngineConfig::default().with_trace(trace),
        )
    }

    pub fn with_config(
        name: impl Into<Arc<str>>,
        model: Model<S>,
        initial: S,
        runtime: Handle,
        config: EngineConfig,
    ) -> Self {
        let name = name.into();
        for state in model.unreachable_states(initial) {
            warn!(machine = %name, state = state.name(), "state is unreachable from the initial state");
        }

        let (commands_tx, commands_rx) = mpsc::unbounded_channel();
        let (snapshot_tx, snapshot_rx) = watch::channel(Snapshot {
            state: initial,
            transitions: 0,
        });
        let (shutdown_tx, shutdown_rx) = watch::channel(None);
        let (diagnostics_tx, _) = broadcast::channel(DIAGNOSTICS_CAPACITY);

        let core = Arc::new(Core {
            name,
            config,
            registry: CoalescingRegistry::default(),
            commands: commands_tx,
            snapshot: snapshot_tx,
            status: watch::Sender::new(Status::new()),
            diagnostics: diagnostics_tx,
            abandoned: AtomicUsize::new(0),
        });
        let worker = Worker::new(core.clone(), Arc::new(model), initial, commands_rx, shutdown_rx);

        Self {
            core,
            runtime,
            pending: Mutex::new(Some(worker)),
            task: Mutex::new(None),
            shutdown_tx,
            snapshot_rx,
        }
    }

    /// Starts the worker. The initial state's entry action runs first.
    ///
    /// Calling this more than once, or after the machine stopped, does
    /// nothing.
    pub fn start(&self) {
        let mut pending = self.pending.lock();
        let Some(worker) = pending.take() else {
            return;
        };
        let started = self.core.status.send_if_modified(|status| {
            if status.lifecycle != Lifecycle::NotStarted {
                return false;
            }
            status.lifecycle = Lifecycle::Running;
            true
        });
        if !started {
            return;
        }

        let span = info_span!("fsm", machine = %self.core.name);
        let handle = self.runtime.spawn(worker.run().instrument(span));
        *self.task.lock() = Some(handle);
    }

    /// Queues `event` and returns immediately. Starts the machine if needed.
    ///
    /// Events submitted after the machine stopped are discarded.
    pub fn process(&self, event: Event<S>) {
        self.ensure_started();
        self.core.submit(event, None);
    }

    /// Queues `event` once `delay` has elapsed. A zero delay behaves like
    /// [`process`](Self::process).
    pub fn process_later(&self, event: Event<S>, delay: Duration) {
        self.ensure_started();
        self.core.submit(event, Some(delay));
    }

    /// Waits until every accepted event has been processed, then stops.
    ///
    /// Returns `true` when the machine went quiet with nothing abandoned. It
    /// returns `false` if the configured quiesce timeout elapsed first, or if
    /// the machine had already been stopped with events still pending.
    pub async fn quiesce_then_stop(&self) -> bool {
        if self.stop_if_not_started() {
            return true;
        }

        let mut status = self.core.status.subscribe();
        let drained = status.wait_for(Status::is_idle);
        let quiet = match self.core.config.quiesce_timeout {
            Some(limit) => match tokio::time::timeout(limit, drained).await {
                Ok(result) => result.is_ok(),
                Err(_) => {
                    warn!(machine = %self.core.name, ?limit, "timed out waiting for pending events");
                    false
                }
            },
            None => drained.await.is_ok(),
        };

        let mode = if quiet {
            ShutdownMode::Graceful
        } else {
            ShutdownMode::Immediate
        };
        let joined = self.signal_and_join(mode).await;
        quiet && joined && self.core.abandoned.load(Ordering::Acquire) == 0
    }

    /// Blocking form of [`quiesce_then_stop`](Self::quiesce_then_stop).
    ///
    /// # Panics
    ///
    /// Panics when called from inside an asynchronous context, like
    /// [`Handle::block_on`]. On a current-thread runtime the worker only
    /// makes progress while some other thread is driving that runtime.
    pub fn blocking_quiesce_then_stop(&self) -> bool {
        self.runtime.block_on(self.quiesce_then_stop())
    }

    /// Stops the machine without waiting. Queued and scheduled events are
    /// discarded.
    pub fn stop(&self) {
        if self.stop_if_not_started() {
            return;
        }
        self.core.halt();
        let _ = self.shutdown_tx.send(Some(ShutdownMode::Immediate));
    }

    /// Shuts the machine down and waits for the worker to exit.
    ///
    /// `Graceful` is [`quiesce_then_stop`](Self::quiesce_then_stop).
    /// `Immediate` discards pending events; it returns `true` only if there
    /// were none.
    pub async fn shutdown(&self, mode: ShutdownMode) -> bool {
        match mode {
            ShutdownMode::Graceful => self.quiesce_then_stop().await,
            ShutdownMode::Immediate => {
                if self.stop_if_not_started() {
                    return true;
                }
                self.core.halt();
                let joined = self.signal_and_join(ShutdownMode::Immediate).await;
                joined && self.core.abandoned.load(Ordering::Acquire) == 0
            }
        }
    }

    pub fn name(&self) -> &str {
        &self.core.name
    }

    /// The last committed state.
    pub fn state(&self) -> S {
        self.snapshot_rx.borrow().state
    }

    /// Number of transitions counted so far.
    pub fn transition_count(&self) -> u64 {
        self.snapshot_rx.borrow().transitions
    }

    /// State and transition count from the same commit.
    pub fn snapshot(&self) -> Snapshot<S> {
        *self.snapshot_rx.borrow()
    }

    pub fn lifecycle(&self) -> Lifecycle {
        self.core.lifecycle()
    }

    pub fn is_running(&self) -> bool {
        self.lifecycle() == Lifecycle::Running
    }

    pub fn is_stopped(&self) -> bool {
        self.lifecycle() == Lifecycle::Stopped
    }

    /// Number of accepted events that were discarded by a stop.
    pub fn abandoned(&self) -> usize {
        self.core.abandoned.load(Ordering::Acquire)
    }

    /// Waits until the machine commits `target`.
    pub async fn wait_for_state(&self, target: S) -> Result<(), watch::error::RecvError> {
        let mut rx = self.snapshot_rx.clone();
        rx.wait_for(|snapshot| snapshot.state == target).await?;
        Ok(())
    }

    /// Waits until at least `count` transitions have been counted.
    pub async fn wait_for_transition_count(
        &self,
        count: u64,
    ) -> Result<(), watch::error::RecvError> {
        let mut rx = self.snapshot_rx.clone();
        rx.wait_for(|snapshot| snapshot.transitions >= count).await?;
        Ok(())
    }

    /// A receiver for every snapshot the machine publishes from now on.
    pub fn subscribe(&self) -> watch::Receiver<Snapshot<S>> {
        self.snapshot_rx.clone()
    }

    /// Receives action failures and other problems found while processing.
    pub fn subscribe_diagnostics(&self) -> broadcast::Receiver<Diagnostic<S>> {
        self.core.diagnostics.subscribe()
    }

    fn ensure_started(&self) {
        if self.core.lifecycle() == Lifecycle::NotStarted {
            self.start();
        }
    }

    /// Stops a machine whose worker never ran. Returns `false` if it is
    /// running or already stopped.
    fn stop_if_not_started(&self) -> bool {
        let stopped = self.core.status.send_if_modified(|status| {
            if status.lifecycle != Lifecycle::NotStarted {
                return false;
            }
            status.lifecycle = Lifecycle::Stopped;
            true
        });
        if stopped {
            self.pending.lock().take();
        }
        stopped
    }

    async fn signal_and_join(&self, mode: ShutdownMode) -> bool {
        let _ = self.shutdown_tx.send(Some(mode));
        let Some(task) = self.task.lock().take() else {
            return true;
        };
        match task.await {
            Ok(()) => true,
            Err(err) => {
                warn!(machine = %self.core.name, error = %err, "worker task failed");
                false
            }
        }
    }
}

impl<S: State> Drop for NonBlockingFsm<S> {
    fn drop(&mut self) {
        self.core.halt();
        let _ = self.shutdown_tx.send(Some(ShutdownMode::Immediate));
    }
}

impl<S: State> std::fmt::Debug for NonBlockingFsm<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NonBlockingFsm")
            .field("name", &self.core.name)
            .field("snapshot", &*self.snapshot_rx.borrow())
            .field("lifecycle", &self.core.lifecycle())
            .finish()
    }
}
