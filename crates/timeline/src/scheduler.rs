//! Deferred task scheduling for coalesced observer delivery.
//!
//! The timeline schedules at most one dispatch task at a time and re-arms
//! after it fires. Any single-shot "run later" primitive works as long as it
//! never runs the task inline from `schedule`.

use std::collections::VecDeque;
use std::fmt;
use std::sync::{Mutex, PoisonError};

/// A unit of deferred work.
pub type Task = Box<dyn FnOnce() + Send + 'static>;

/// Runs tasks after the current synchronous work completes.
pub trait Scheduler: Send + Sync {
    /// Queue a task. Must not run it before returning.
    fn schedule(&self, task: Task);
}

/// Explicit run loop.
///
/// Tasks accumulate until the owner runs a turn, which makes delivery points
/// fully deterministic.
#[derive(Default)]
pub struct TurnQueue {
    tasks: Mutex<VecDeque<Task>>,
}

impl TurnQueue {
    /// Create an empty queue.
    pub fn new() -> Self {
        Self::default()
    }

    /// Run the tasks that were queued when the turn began.
    ///
    /// Tasks queued while the turn runs wait for the next turn. Returns the
    /// number of tasks run.
    pub fn run_turn(&self) -> usize {
        let batch: Vec<Task> = self.lock().drain(..).collect();
        let ran = batch.len();
        for task in batch {
            task();
        }
        ran
    }

    /// Run turns until no tasks remain. Returns the total number of tasks run.
    pub fn run_until_idle(&self) -> usize {
        let mut total = 0;
        loop {
            let ran = self.run_turn();
            if ran == 0 {
                return total;
            }
            total += ran;
        }
    }

    /// Number of tasks waiting for the next turn.
    pub fn pending_tasks(&self) -> usize {
        self.lock().len()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, VecDeque<Task>> {
        self.tasks.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Scheduler for TurnQueue {
    fn schedule(&self, task: Task) {
        self.lock().push_back(task);
    }
}

impl fmt::Debug for TurnQueue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TurnQueue")
            .field("pending_tasks", &self.pending_tasks())
            .finish()
    }
}

/// Scheduler that spawns each task onto a tokio runtime.
#[derive(Debug, Clone)]
pub struct TokioScheduler {
    handle: tokio::runtime::Handle,
}

impl TokioScheduler {
    /// Schedule onto the given runtime.
    pub fn new(handle: tokio::runtime::Handle) -> Self {
        Self { handle }
    }

    /// Schedule onto the runtime the caller is running in, if any.
    pub fn try_current() -> Option<Self> {
        tokio::runtime::Handle::try_current().ok().map(Self::new)
    }
}

impl Scheduler for TokioScheduler {
    fn schedule(&self, task: Task) {
        self.handle.spawn(async move { task() });
    }
}
