//! The background task that owns a machine's state.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tokio::task::JoinSet;
use tracing::{debug, error, info, trace, warn};

use crate::action::{ActionError, ActionResult, guarded};
use crate::coalesce::CoalescingRegistry;
use crate::context::ExecutionContext;
use crate::diagnostics::{ActionStage, Diagnostic};
use crate::event::{EvalScope, Evaluation, Event};
use crate::instruction::Instruction;
use crate::lifecycle::{ShutdownMode, Snapshot};
use crate::machine::Core;
use crate::model::Model;
use crate::state::State;
use crate::transition::Transition;

pub(crate) enum Command<S: State> {
    /// A freshly submitted event.
    Submit {
        event: Event<S>,
        delay: Option<Duration>,
    },
    /// A delayed event whose time has come.
    Fire(Event<S>),
}

impl<S: State> Command<S> {
    pub(crate) fn release(&self, registry: &CoalescingRegistry) {
        match self {
            Self::Submit { event, .. } | Self::Fire(event) => event.release(registry),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Flow {
    Continue,
    Stop,
}

/// The cascade stopped at a failed action.
struct Aborted;

/// Instruction waiting to be resolved, with the transition that produced it
/// when there is one.
type Pending<S> = (Instruction<S>, Option<Arc<Transition<S>>>);

pub(crate) struct Worker<S: State> {
    core: Arc<Core<S>>,
    model: Arc<Model<S>>,
    commands: mpsc::UnboundedReceiver<Command<S>>,
    shutdown: watch::Receiver<Option<ShutdownMode>>,
    timers: JoinSet<()>,
    state: S,
    transitions: u64,
}

impl<S: State> Worker<S> {
    pub(crate) fn new(
        core: Arc<Core<S>>,
        model: Arc<Model<S>>,
        initial: S,
        commands: mpsc::UnboundedReceiver<Command<S>>,
        shutdown: watch::Receiver<Option<ShutdownMode>>,
    ) -> Self {
        Self {
            core,
            model,
            commands,
            shutdown,
            timers: JoinSet::new(),
            state: initial,
            transitions: 0,
        }
    }

    pub(crate) async fn run(mut self) {
        debug!(state = self.state.name(), "worker started");
        if self.enter_initial_state() == Flow::Continue {
            self.event_loop().await;
        }

        let abandoned = self.core.halt();
        if abandoned > 0 {
            debug!(abandoned, "discarded pending events");
        }
        self.timers.shutdown().await;
        debug!(
            state = self.state.name(),
            transitions = self.transitions,
            "worker stopped"
        );
    }

    async fn event_loop(&mut self) {
        loop {
            tokio::select! {
                biased;

                changed = self.shutdown.changed() => {
                    // a dropped handle counts as an immediate shutdown
                    let mode = match changed {
                        Ok(()) => *self.shutdown.borrow_and_update(),
                        Err(_) => Some(ShutdownMode::Immediate),
                    };
                    match mode {
                        Some(ShutdownMode::Graceful) => {
                            self.drain();
                            return;
                        }
                        Some(ShutdownMode::Immediate) => return,
                        None => {}
                    }
                }
                command = self.commands.recv() => {
                    let Some(command) = command else { return };
                    if self.handle(command) == Flow::Stop {
                        return;
                    }
                }
                Some(joined) = self.timers.join_next(), if !self.timers.is_empty() => {
                    if let Err(err) = joined {
                        if err.is_panic() {
                            error!(error = %err, "timer task panicked");
                        }
                    }
                }
            }
        }
    }

    /// Processes everything already queued. Delayed events that have not
    /// fired yet are discarded.
    fn drain(&mut self) {
        while let Ok(command) = self.commands.try_recv() {
            match command {
                Command::Submit {
                    event,
                    delay: Some(delay),
                } if !delay.is_zero() => {
                    debug!(%event, "shutting down, delayed event discarded");
                    event.release(&self.core.registry);
                }
                command => {
                    if self.handle(command) == Flow::Stop {
                        return;
                    }
                }
            }
        }
    }

    fn handle(&mut self, command: Command<S>) -> Flow {
        match command {
            Command::Submit { mut event, delay } => {
                event.stamp(self.transitions);
                match delay {
                    Some(delay) if !delay.is_zero() => {
                        self.schedule(event, delay);
                        Flow::Continue
                    }
                    _ => self.process(event),
                }
            }
            Command::Fire(event) => self.process(event),
        }
    }

    fn schedule(&mut self, event: Event<S>, delay: Duration) {
        trace!(%event, ?delay, "event scheduled");
        let core = self.core.clone();
        self.timers.spawn(async move {
            tokio::time::sleep(delay).await;
            core.fire(event);
        });
    }

    fn process(&mut self, event: Event<S>) -> Flow {
        if !self.core.begin() {
            debug!(%event, "machine stopped, event discarded");
            event.release(&self.core.registry);
            return Flow::Stop;
        }
        let flow = self.step(event);
        self.core.complete();
        flow
    }

    /// Evaluates one event and resolves everything it leads to.
    fn step(&mut self, event: Event<S>) -> Flow {
        let label = tracing::enabled!(tracing::Level::TRACE).then(|| event.to_string());
        let mut trackers = Vec::new();
        let scope = EvalScope {
            state: self.state,
            transitions: self.transitions,
            model: &self.model,
            registry: &self.core.registry,
        };
        let Some(Evaluation {
            instruction,
            transition,
        }) = event.evaluate(&scope, &mut trackers)
        else {
            trace!(state = self.state.name(), event = label.as_deref(), "event declined");
            return Flow::Continue;
        };

        let before = self.transitions;
        let flow = self.resolve(VecDeque::from([(instruction, transition)]));
        if self.transitions > before {
            for tracker in trackers {
                tracker.mark_processed();
            }
        }
        flow
    }

    /// Runs the initial state's entry action. It is not counted as a
    /// transition.
    fn enter_initial_state(&mut self) -> Flow {
        let state = self.state;
        let Some(entry) = self.model.entry_action(state) else {
            return Flow::Continue;
        };
        match guarded(|| entry(&self.context(), None, state)) {
            Ok(Instruction::Nothing) => Flow::Continue,
            Ok(instruction) => self.resolve(VecDeque::from([(instruction, None)])),
            Err(err) => {
                self.fail(ActionStage::Entry, state, err);
                Flow::Continue
            }
        }
    }

    /// Resolves instructions in order until none are left. Follow-ups
    /// returned by actions join the back of the queue, so cascades never
    /// grow the stack.
    fn resolve(&mut self, mut pending: VecDeque<Pending<S>>) -> Flow {
        let limit = self.core.config.max_cascade_depth;
        let mut resolved = 0;
        while let Some((instruction, transition)) = pending.pop_front() {
            resolved += 1;
            if resolved > limit {
                error!(
                    state = self.state.name(),
                    limit, "cascade limit exceeded, remaining instructions dropped"
                );
                self.core.report(Diagnostic::CascadeLimit {
                    state: self.state,
                    limit,
                });
                return Flow::Continue;
            }

            match instruction {
                Instruction::Nothing => {}
                Instruction::Stay => {
                    self.commit(self.state);
                    trace!(state = self.state.name(), "stayed");
                }
                Instruction::Stop => {
                    debug!(state = self.state.name(), "stop requested");
                    return Flow::Stop;
                }
                Instruction::TransitionTo(target) => {
                    let transition = transition
                        .or_else(|| self.model.transition_between(self.state, target).cloned());
                    let Some(transition) = transition else {
                        warn!(
                            from = self.state.name(),
                            to = target.name(),
                            "no transition between states, instruction dropped"
                        );
                        self.core.report(Diagnostic::NoTransition {
                            from: self.state,
                            to: target,
                        });
                        continue;
                    };
                    if self.fire(&transition, &mut pending).is_err() {
                        return Flow::Continue;
                    }
                }
            }
        }
        Flow::Continue
    }

    /// Runs exit, transition and entry actions around the commit. An exit or
    /// transition action failure leaves the state untouched; an entry action
    /// failure happens after the commit.
    fn fire(
        &mut self,
        transition: &Transition<S>,
        pending: &mut VecDeque<Pending<S>>,
    ) -> Result<(), Aborted> {
        let from = self.state;
        let to = transition.to_state();

        if let Some(exit) = self.model.exit_action(from) {
            let result = guarded(|| exit(&self.context(), from, to));
            self.follow(ActionStage::Exit, from, result, pending)?;
        }

        let action = transition.action();
        let result = guarded(|| action(&self.context(), transition.name(), from, to));
        self.follow(ActionStage::Transition, from, result, pending)?;

        self.commit(to);
        if self.core.config.trace {
            info!(
                transition = transition.name(),
                from = from.name(),
                to = to.name(),
                count = self.transitions,
                "transition committed"
            );
        } else {
            debug!(
                transition = transition.name(),
                from = from.name(),
                to = to.name(),
                count = self.transitions,
                "transition committed"
            );
        }

        if let Some(entry) = self.model.entry_action(to) {
            let result = guarded(|| entry(&self.context(), Some(from), to));
            self.follow(ActionStage::Entry, to, result, pending)?;
        }
        Ok(())
    }

    /// Queues the follow-up of a successful action, or reports the failure.
    fn follow(
        &self,
        stage: ActionStage,
        state: S,
        result: ActionResult<S>,
        pending: &mut VecDeque<Pending<S>>,
    ) -> Result<(), Aborted> {
        match result {
            Ok(instruction) => {
                if !instruction.is_nothing() {
                    pending.push_back((instruction, None));
                }
                Ok(())
            }
            Err(err) => {
                self.fail(stage, state, err);
                Err(Aborted)
            }
        }
    }

    fn fail(&self, stage: ActionStage, state: S, error: ActionError) {
        error!(%stage, state = state.name(), error = %error, "action failed, cascade aborted");
        self.core.report(Diagnostic::ActionFailed {
            stage,
            state,
            error: Arc::new(error),
        });
    }

    fn commit(&mut self, state: S) {
        self.state = state;
        self.transitions += 1;
        self.core.publish(Snapshot {
            state,
            transitions: self.transitions,
        });
    }

    fn context(&self) -> ExecutionContext<'_, S> {
        ExecutionContext::new(&self.core, self.state, self.transitions)
    }
}
