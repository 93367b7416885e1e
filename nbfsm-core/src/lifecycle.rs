//! Lifecycle and observation types.

/// How a running machine is shut down.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownMode {
    /// Graceful shutdown: queued and scheduled events are processed before the
    /// worker exits.
    Graceful,
    /// Immediate shutdown: the worker exits right away and every queued or
    /// scheduled event is discarded.
    Immediate,
}

/// Where a machine is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lifecycle {
    /// Constructed; events are queued but nothing is processed yet.
    NotStarted,
    /// The worker is processing events.
    Running,
    /// The machine no longer accepts or processes events.
    Stopped,
}

/// The most recently committed state and transition count.
///
/// Both values are published together after each commit, so a snapshot never
/// shows the state of one transition with the count of another.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Snapshot<S> {
    pub state: S,
    pub transitions: u64,
}

/// Lifecycle plus the number of accepted events not yet finished.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Status {
    pub(crate) lifecycle: Lifecycle,
    pub(crate) outstanding: usize,
    /// The worker is evaluating one of the outstanding events.
    pub(crate) busy: bool,
}

impl Status {
    pub(crate) fn new() -> Self {
        Self {
            lifecycle: Lifecycle::NotStarted,
            outstanding: 0,
            busy: false,
        }
    }

    pub(crate) fn is_idle(&self) -> bool {
        self.outstanding == 0 || self.lifecycle == Lifecycle::Stopped
    }
}
