//! The injected deferral capability.
//!
//! The promise core never blocks and never runs a continuation synchronously
//! inside `chain`; everything it wants to run later is handed to a
//! [`Scheduler`]. Any "run later, non-blocking, best-effort ordered"
//! primitive satisfies the contract: a single-threaded event-loop post, a
//! thread-pool submit, or the deterministic [`LabScheduler`](crate::lab::LabScheduler)
//! used by this crate's tests.
//!
//! The one hard requirement: `defer` must not execute the task synchronously
//! within the call that requests it. Callers must not be able to observe
//! whether a promise settled before or after they attached a continuation.

use std::sync::Arc;

/// A deferred unit of work.
pub type Task = Box<dyn FnOnce() + Send>;

/// Capability to schedule a task for later execution.
///
/// Implementations must run each deferred task at most once, after the
/// current synchronous execution completes, and should preserve submission
/// order between tasks deferred from the same context.
pub trait Scheduler: Send + Sync {
    /// Schedules `task` to run later. Must not run it synchronously.
    fn defer(&self, task: Task);
}

impl<S: Scheduler + ?Sized> Scheduler for Arc<S> {
    fn defer(&self, task: Task) {
        (**self).defer(task);
    }
}
