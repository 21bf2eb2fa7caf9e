//! # Task Scheduler
//!
//! Every deferred piece of engine work lives here as a named, cancellable
//! task with a deadline: batch flushes, unbatched dispatches, retry backoffs,
//! viewport debounce, delayed auto-advance and the periodic cache sweep.
//!
//! The scheduler never runs anything itself. The owner asks for the next
//! deadline, sleeps until then, and collects the due tasks with
//! [`Scheduler::take_due`]. Scheduling a task whose kind is already pending
//! replaces the old deadline, which is how debouncing works.
//!
//! After [`Scheduler::dispose`] every pending task is dropped and new ones are
//! refused, so nothing is dispatched into a torn-down session.

use std::time::Instant;

/// Identity of a scheduled task
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TaskKind {
    /// Flush the oldest eligible resolution batch
    BatchFlush,

    /// Send one resolution action right away (batching disabled)
    Dispatch(String),

    /// Re-dispatch a failed resolution action (by action id)
    Retry(String),

    /// Apply the debounced viewport visibility set
    VisibilityUpdate,

    /// Select the next suggestion after the active one was resolved
    AutoAdvance,

    /// Evict expired cache entries
    CacheSweep,
}

#[derive(Debug, Clone)]
pub struct ScheduledTask {
    pub kind: TaskKind,
    pub due: Instant,
    seq: u64,
}

#[derive(Debug, Default)]
pub struct Scheduler {
    tasks: Vec<ScheduledTask>,
    next_seq: u64,
    disposed: bool,
}

impl Scheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Schedule `kind` at `due`, replacing a pending task of the same kind.
    ///
    /// Returns `false` once the scheduler has been disposed.
    pub fn schedule(&mut self, kind: TaskKind, due: Instant) -> bool {
        if self.disposed {
            return false;
        }

        self.tasks.retain(|t| t.kind != kind);
        let seq = self.next_seq;
        self.next_seq += 1;
        self.tasks.push(ScheduledTask { kind, due, seq });
        true
    }

    /// Cancel a pending task. Returns whether one was pending.
    pub fn cancel(&mut self, kind: &TaskKind) -> bool {
        let before = self.tasks.len();
        self.tasks.retain(|t| &t.kind != kind);
        self.tasks.len() != before
    }

    pub fn is_scheduled(&self, kind: &TaskKind) -> bool {
        self.tasks.iter().any(|t| &t.kind == kind)
    }

    pub fn due_at(&self, kind: &TaskKind) -> Option<Instant> {
        self.tasks.iter().find(|t| &t.kind == kind).map(|t| t.due)
    }

    /// Earliest pending deadline
    pub fn next_deadline(&self) -> Option<Instant> {
        self.tasks.iter().map(|t| t.due).min()
    }

    /// Remove and return every task due at or before `now`, earliest first
    /// (scheduling order breaks ties).
    pub fn take_due(&mut self, now: Instant) -> Vec<TaskKind> {
        let (mut due, pending): (Vec<_>, Vec<_>) =
            std::mem::take(&mut self.tasks).into_iter().partition(|t| t.due <= now);
        self.tasks = pending;

        due.sort_by_key(|t| (t.due, t.seq));
        due.into_iter().map(|t| t.kind).collect()
    }

    pub fn pending(&self) -> impl Iterator<Item = &ScheduledTask> {
        self.tasks.iter()
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Cancel everything and refuse further scheduling
    pub fn dispose(&mut self) {
        self.tasks.clear();
        self.disposed = true;
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed
    }
}
