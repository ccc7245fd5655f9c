//! Deterministic lab scheduler for testing.
//!
//! The lab scheduler provides:
//!
//! - A plain FIFO task queue (no wall-clock, no threads)
//! - Explicit, single-stepped or run-to-idle execution
//! - Step accounting for assertions about how much work ran
//!
//! Tests drive it by hand: attach continuations, assert nothing has run yet,
//! then call [`LabScheduler::run_until_idle`] and assert on the settled
//! promises. Same submissions, same order, every run.

use crate::sched::{Scheduler, Task};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

/// A deterministic FIFO scheduler.
///
/// Cloning yields another handle to the same queue. Tasks deferred while the
/// queue is being drained land at the back and run in the same drain.
#[derive(Clone, Default)]
pub struct LabScheduler {
    queue: Arc<Mutex<VecDeque<Task>>>,
}

impl LabScheduler {
    /// Creates a new, empty lab scheduler.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns this scheduler as a shared [`Scheduler`] handle, in the form
    /// promises take it.
    #[must_use]
    pub fn handle(&self) -> Arc<dyn Scheduler> {
        Arc::new(self.clone())
    }

    /// Number of tasks currently queued.
    #[must_use]
    pub fn pending_tasks(&self) -> usize {
        self.queue.lock().expect("lab queue lock poisoned").len()
    }

    /// Returns true if no tasks are queued.
    #[must_use]
    pub fn is_idle(&self) -> bool {
        self.pending_tasks() == 0
    }

    /// Runs the task at the front of the queue, if any.
    ///
    /// Returns true if a task ran.
    pub fn run_next(&self) -> bool {
        let task = self
            .queue
            .lock()
            .expect("lab queue lock poisoned")
            .pop_front();
        match task {
            Some(task) => {
                tracing::trace!("lab: running task");
                task();
                true
            }
            None => false,
        }
    }

    /// Runs tasks until the queue is empty, including tasks deferred while
    /// draining.
    ///
    /// Returns the number of tasks executed.
    pub fn run_until_idle(&self) -> u64 {
        let mut steps = 0;
        while self.run_next() {
            steps += 1;
        }
        tracing::debug!(steps, "lab: idle");
        steps
    }
}

impl Scheduler for LabScheduler {
    fn defer(&self, task: Task) {
        tracing::trace!("lab: task deferred");
        self.queue
            .lock()
            .expect("lab queue lock poisoned")
            .push_back(task);
    }
}

impl std::fmt::Debug for LabScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LabScheduler")
            .field("pending_tasks", &self.pending_tasks())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_idle() {
        let lab = LabScheduler::new();
        assert!(lab.is_idle());
        assert!(!lab.run_next());
        assert_eq!(lab.run_until_idle(), 0);
    }

    #[test]
    fn defer_does_not_run_synchronously() {
        let lab = LabScheduler::new();
        let ran = Arc::new(Mutex::new(false));
        let flag = Arc::clone(&ran);
        lab.defer(Box::new(move || {
            *flag.lock().unwrap() = true;
        }));
        assert!(!*ran.lock().unwrap());
        assert_eq!(lab.pending_tasks(), 1);
        lab.run_until_idle();
        assert!(*ran.lock().unwrap());
    }

    #[test]
    fn tasks_run_in_submission_order() {
        let lab = LabScheduler::new();
        let order = Arc::new(Mutex::new(Vec::new()));
        for i in 0..4 {
            let order = Arc::clone(&order);
            lab.defer(Box::new(move || order.lock().unwrap().push(i)));
        }
        assert_eq!(lab.run_until_idle(), 4);
        assert_eq!(*order.lock().unwrap(), vec![0, 1, 2, 3]);
    }

    #[test]
    fn tasks_deferred_while_draining_run_in_same_drain() {
        let lab = LabScheduler::new();
        let order = Arc::new(Mutex::new(Vec::new()));
        {
            let lab_inner = lab.clone();
            let order_outer = Arc::clone(&order);
            lab.defer(Box::new(move || {
                order_outer.lock().unwrap().push("outer");
                let order_inner = Arc::clone(&order_outer);
                lab_inner.defer(Box::new(move || {
                    order_inner.lock().unwrap().push("inner");
                }));
            }));
        }
        assert_eq!(lab.run_until_idle(), 2);
        assert_eq!(*order.lock().unwrap(), vec!["outer", "inner"]);
    }

    #[test]
    fn clones_share_the_queue() {
        let lab = LabScheduler::new();
        let other = lab.clone();
        other.defer(Box::new(|| {}));
        assert_eq!(lab.pending_tasks(), 1);
        assert_eq!(lab.run_until_idle(), 1);
        assert!(other.is_idle());
    }
}
