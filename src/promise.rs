//! The promise: one-shot settlement plus chaining.
//!
//! A [`Promise`] is a cloneable handle to shared settlement state:
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────┐
//! │                        SETTLEMENT AND DRAIN                         │
//! │                                                                     │
//! │  Producer                 Promise state             Consumers       │
//! │     │                         │                        │            │
//! │     │                     Pending ◄── chain() queues ──┤            │
//! │     │── fulfill(v) ──► Fulfilled(v)                    │            │
//! │     │                         │                        │            │
//! │     │                         └── drain queue, FIFO ──►│ (deferred) │
//! │     │                                                  │            │
//! │     │── fulfill(w) ──► no-op (already settled)                      │
//! └─────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Settlement is idempotent across both capabilities: the first call wins and
//! every later call is a no-op. Continuations attached with [`Promise::chain`]
//! never run synchronously inside the call; they are routed through the
//! promise's [`Scheduler`] whether or not the promise is already settled, so
//! callers cannot observe whether settlement happened before or after they
//! attached.
//!
//! # Cross-thread settlement
//!
//! The settlement capabilities may be invoked from a different execution
//! context than construction (an I/O completion callback, another thread).
//! All state access is serialized behind one mutex; queued reactions are
//! invoked after the lock is released.

use crate::adopt::{self, Completion};
use crate::error::CycleError;
use crate::sched::Scheduler;
use crate::state::{FulfillReaction, PromiseState, RejectReaction, State};
use std::mem;
use std::sync::{Arc, Mutex};

/// A fulfillment continuation: consumes the upstream value and produces the
/// downstream settlement, or fails with an error that rejects the downstream.
pub type OnFulfilled<T, E> = Box<dyn FnOnce(T) -> Result<Completion<T, E>, E> + Send>;

/// A rejection continuation: consumes the upstream error and produces the
/// downstream settlement, or re-raises an error that rejects the downstream.
pub type OnRejected<T, E> = Box<dyn FnOnce(E) -> Result<Completion<T, E>, E> + Send>;

/// Shared settlement state behind every handle to one promise.
struct Shared<T, E> {
    /// Settlement state machine; queues live inside the `Pending` variant.
    state: Mutex<State<T, E>>,
    /// Deferral capability; inherited by downstream promises.
    scheduler: Arc<dyn Scheduler>,
}

impl<T: Clone, E: Clone> Shared<T, E> {
    /// First settlement wins; drains the fulfillment queue in FIFO order
    /// outside the lock. The rejection queue is dropped at the transition.
    fn fulfill(&self, value: T) {
        let reactions = {
            let mut state = self.state.lock().expect("promise state lock poisoned");
            match mem::replace(&mut *state, State::Fulfilled(value.clone())) {
                State::Pending {
                    on_fulfilled,
                    on_rejected,
                } => {
                    drop(on_rejected);
                    on_fulfilled
                }
                settled => {
                    *state = settled;
                    return;
                }
            }
        };
        tracing::trace!(reactions = reactions.len(), "promise fulfilled");
        for reaction in reactions {
            reaction(value.clone());
        }
    }

    /// Symmetric to [`Shared::fulfill`], using the rejection queue.
    fn reject(&self, error: E) {
        let reactions = {
            let mut state = self.state.lock().expect("promise state lock poisoned");
            match mem::replace(&mut *state, State::Rejected(error.clone())) {
                State::Pending {
                    on_fulfilled,
                    on_rejected,
                } => {
                    drop(on_fulfilled);
                    on_rejected
                }
                settled => {
                    *state = settled;
                    return;
                }
            }
        };
        tracing::trace!(reactions = reactions.len(), "promise rejected");
        for reaction in reactions {
            reaction(error.clone());
        }
    }
}

/// A one-shot container for a value that becomes available asynchronously.
///
/// Cloning yields another handle to the same settlement state. A promise is
/// settled at most once, by whichever [`Completer`] capability fires first.
pub struct Promise<T, E> {
    shared: Arc<Shared<T, E>>,
}

impl<T, E> Clone for Promise<T, E> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<T, E> Promise<T, E> {
    /// The current settlement state.
    #[must_use]
    pub fn state(&self) -> PromiseState {
        self.shared
            .state
            .lock()
            .expect("promise state lock poisoned")
            .tag()
    }

    /// Returns true if the promise has not settled yet.
    #[must_use]
    pub fn is_pending(&self) -> bool {
        self.state() == PromiseState::Pending
    }

    /// Returns true if both handles refer to the same settlement state.
    pub(crate) fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.shared, &other.shared)
    }
}

impl<T, E> Promise<T, E>
where
    T: Clone + Send + 'static,
    E: Clone + Send + 'static,
{
    /// Creates an unsettled promise and its settlement capability as two
    /// halves.
    #[must_use]
    pub fn parts(scheduler: Arc<dyn Scheduler>) -> (Self, Completer<T, E>) {
        let shared = Arc::new(Shared {
            state: Mutex::new(State::pending()),
            scheduler,
        });
        (
            Self {
                shared: Arc::clone(&shared),
            },
            Completer { shared },
        )
    }

    /// Creates a promise from a producer callback.
    ///
    /// The producer runs synchronously, before this constructor returns,
    /// receiving the settlement capability. If it returns `Err` without
    /// having settled, the promise is rejected with that error; if it
    /// already settled, the late error is a no-op.
    pub fn new<P>(scheduler: Arc<dyn Scheduler>, producer: P) -> Self
    where
        P: FnOnce(&Completer<T, E>) -> Result<(), E>,
    {
        let (promise, completer) = Self::parts(scheduler);
        if let Err(error) = producer(&completer) {
            completer.reject(error);
        }
        promise
    }

    /// Creates a promise already fulfilled with `value`.
    #[must_use]
    pub fn fulfilled(scheduler: Arc<dyn Scheduler>, value: T) -> Self {
        let (promise, completer) = Self::parts(scheduler);
        completer.fulfill(value);
        promise
    }

    /// Creates a promise already rejected with `error`.
    #[must_use]
    pub fn rejected(scheduler: Arc<dyn Scheduler>, error: E) -> Self {
        let (promise, completer) = Self::parts(scheduler);
        completer.reject(error);
        promise
    }

    /// Returns a clone of the settled outcome, or `None` while pending.
    #[must_use]
    pub fn try_result(&self) -> Option<Result<T, E>> {
        let state = self.shared.state.lock().expect("promise state lock poisoned");
        match &*state {
            State::Pending { .. } => None,
            State::Fulfilled(value) => Some(Ok(value.clone())),
            State::Rejected(error) => Some(Err(error.clone())),
        }
    }

    /// Registers raw reactions to this promise's settlement.
    ///
    /// Exactly one of the two ever runs, with a clone of the payload, and its
    /// invocation is always routed through the scheduler: if the promise is
    /// still pending the reaction is queued (FIFO) and deferred at drain
    /// time; if already settled it is deferred immediately.
    pub(crate) fn register(
        &self,
        on_fulfilled: FulfillReaction<T>,
        on_rejected: RejectReaction<E>,
    ) {
        enum Disposition<T, E> {
            Queued,
            Fulfilled(T, FulfillReaction<T>),
            Rejected(E, RejectReaction<E>),
        }
        let scheduler = Arc::clone(&self.shared.scheduler);
        let disposition = {
            let mut state = self.shared.state.lock().expect("promise state lock poisoned");
            match &mut *state {
                State::Pending {
                    on_fulfilled: fulfill_queue,
                    on_rejected: reject_queue,
                } => {
                    let fulfill_scheduler = Arc::clone(&scheduler);
                    fulfill_queue.push(Box::new(move |value: T| {
                        fulfill_scheduler.defer(Box::new(move || on_fulfilled(value)));
                    }));
                    let reject_scheduler = Arc::clone(&scheduler);
                    reject_queue.push(Box::new(move |error: E| {
                        reject_scheduler.defer(Box::new(move || on_rejected(error)));
                    }));
                    Disposition::Queued
                }
                State::Fulfilled(value) => Disposition::Fulfilled(value.clone(), on_fulfilled),
                State::Rejected(error) => Disposition::Rejected(error.clone(), on_rejected),
            }
        };
        match disposition {
            Disposition::Queued => {}
            Disposition::Fulfilled(value, reaction) => {
                scheduler.defer(Box::new(move || reaction(value)));
            }
            Disposition::Rejected(error, reaction) => {
                scheduler.defer(Box::new(move || reaction(error)));
            }
        }
    }

    pub(crate) fn settle_fulfilled(&self, value: T) {
        self.shared.fulfill(value);
    }

    pub(crate) fn settle_rejected(&self, error: E) {
        self.shared.reject(error);
    }

    /// The composition primitive: returns a new downstream promise settled by
    /// this promise's settlement plus the matching continuation's outcome.
    ///
    /// `None` selects the pass-through defaults: a missing `on_fulfilled`
    /// forwards the value unchanged, and a missing `on_rejected` re-raises
    /// the error unchanged, so rejection propagates past links that only
    /// handle success.
    ///
    /// The continuation's return value is routed through adoption: a
    /// [`Completion::Value`] fulfills the downstream directly, while a
    /// promise or foreign future-like value is subscribed to and its eventual
    /// settlement forwarded. A continuation returning `Err` rejects the
    /// downstream with that error.
    #[must_use = "the downstream promise carries the continuation's outcome"]
    pub fn chain(
        &self,
        on_fulfilled: Option<OnFulfilled<T, E>>,
        on_rejected: Option<OnRejected<T, E>>,
    ) -> Self
    where
        E: From<CycleError>,
    {
        let on_fulfilled =
            on_fulfilled.unwrap_or_else(|| Box::new(|value| Ok(Completion::Value(value))));
        let on_rejected = on_rejected.unwrap_or_else(|| Box::new(|error| Err(error)));

        let (downstream, _) = Self::parts(Arc::clone(&self.shared.scheduler));
        tracing::trace!(upstream = %self.state(), "chain registered");

        let fulfill_target = downstream.clone();
        let reject_target = downstream.clone();
        self.register(
            Box::new(move |value| match on_fulfilled(value) {
                Ok(completion) => adopt::adopt(&fulfill_target, completion),
                Err(error) => fulfill_target.settle_rejected(error),
            }),
            Box::new(move |error| match on_rejected(error) {
                Ok(completion) => adopt::adopt(&reject_target, completion),
                Err(error) => reject_target.settle_rejected(error),
            }),
        );
        downstream
    }

    /// Sugar for [`Promise::chain`] with only a fulfillment continuation.
    #[must_use = "the downstream promise carries the continuation's outcome"]
    pub fn then<F>(&self, on_fulfilled: F) -> Self
    where
        E: From<CycleError>,
        F: FnOnce(T) -> Result<Completion<T, E>, E> + Send + 'static,
    {
        self.chain(Some(Box::new(on_fulfilled)), None)
    }

    /// Sugar for [`Promise::chain`] with only a rejection continuation. The
    /// returned downstream stays chainable.
    #[must_use = "the downstream promise carries the continuation's outcome"]
    pub fn catch<F>(&self, on_rejected: F) -> Self
    where
        E: From<CycleError>,
        F: FnOnce(E) -> Result<Completion<T, E>, E> + Send + 'static,
    {
        self.chain(None, Some(Box::new(on_rejected)))
    }
}

impl<T, E> std::fmt::Debug for Promise<T, E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Promise")
            .field("state", &self.state().name())
            .finish()
    }
}

/// The settlement capability pair for one promise.
///
/// Exposes the two producer-side operations, `fulfill` and `reject`. They are
/// jointly idempotent: across both, only the first call has effect. Cloning
/// yields another capability handle to the same promise.
pub struct Completer<T, E> {
    shared: Arc<Shared<T, E>>,
}

impl<T, E> Clone for Completer<T, E> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<T: Clone, E: Clone> Completer<T, E> {
    /// Settles the promise as fulfilled with `value`. No-op if already
    /// settled.
    pub fn fulfill(&self, value: T) {
        self.shared.fulfill(value);
    }

    /// Settles the promise as rejected with `error`. No-op if already
    /// settled.
    pub fn reject(&self, error: E) {
        self.shared.reject(error);
    }
}

impl<T, E> std::fmt::Debug for Completer<T, E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Completer")
            .field(
                "state",
                &self
                    .shared
                    .state
                    .lock()
                    .expect("promise state lock poisoned")
                    .tag()
                    .name(),
            )
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lab::LabScheduler;

    #[derive(Debug, Clone, PartialEq, Eq)]
    enum TestError {
        Boom(&'static str),
        Cyclic,
    }

    impl From<CycleError> for TestError {
        fn from(_: CycleError) -> Self {
            Self::Cyclic
        }
    }

    type TestPromise = Promise<i32, TestError>;

    #[test]
    fn first_settlement_wins() {
        let lab = LabScheduler::new();
        let (promise, completer) = TestPromise::parts(lab.handle());

        completer.fulfill(1);
        completer.fulfill(2);
        completer.reject(TestError::Boom("late"));

        assert_eq!(promise.state(), PromiseState::Fulfilled);
        assert_eq!(promise.try_result(), Some(Ok(1)));
    }

    #[test]
    fn rejection_is_also_one_shot() {
        let lab = LabScheduler::new();
        let (promise, completer) = TestPromise::parts(lab.handle());

        completer.reject(TestError::Boom("first"));
        completer.fulfill(7);
        completer.reject(TestError::Boom("second"));

        assert_eq!(promise.try_result(), Some(Err(TestError::Boom("first"))));
    }

    #[test]
    fn producer_runs_before_construction_returns() {
        let lab = LabScheduler::new();
        let promise = TestPromise::new(lab.handle(), |completer| {
            completer.fulfill(1);
            Ok(())
        });
        // Settled without driving the scheduler: the producer is synchronous.
        assert_eq!(promise.try_result(), Some(Ok(1)));
    }

    #[test]
    fn producer_error_rejects() {
        let lab = LabScheduler::new();
        let promise = TestPromise::new(lab.handle(), |_| Err(TestError::Boom("bang")));
        assert_eq!(promise.try_result(), Some(Err(TestError::Boom("bang"))));
    }

    #[test]
    fn producer_error_after_settlement_is_a_no_op() {
        let lab = LabScheduler::new();
        let promise = TestPromise::new(lab.handle(), |completer| {
            completer.fulfill(3);
            Err(TestError::Boom("too late"))
        });
        assert_eq!(promise.try_result(), Some(Ok(3)));
    }

    #[test]
    fn pre_settled_constructors() {
        let lab = LabScheduler::new();
        let fulfilled = TestPromise::fulfilled(lab.handle(), 5);
        let rejected = TestPromise::rejected(lab.handle(), TestError::Boom("no"));
        assert_eq!(fulfilled.try_result(), Some(Ok(5)));
        assert_eq!(rejected.try_result(), Some(Err(TestError::Boom("no"))));
    }

    #[test]
    fn try_result_is_none_while_pending() {
        let lab = LabScheduler::new();
        let (promise, _completer) = TestPromise::parts(lab.handle());
        assert!(promise.is_pending());
        assert_eq!(promise.try_result(), None);
    }

    #[test]
    fn continuations_do_not_run_inside_chain() {
        let lab = LabScheduler::new();
        let promise = TestPromise::fulfilled(lab.handle(), 1);

        let downstream = promise.then(|value| Ok(Completion::Value(value + 1)));

        // Already-settled upstream, but the continuation is still deferred.
        assert!(downstream.is_pending());
        lab.run_until_idle();
        assert_eq!(downstream.try_result(), Some(Ok(2)));
    }

    #[test]
    fn queued_continuations_drain_in_registration_order() {
        let lab = LabScheduler::new();
        let (promise, completer) = TestPromise::parts(lab.handle());

        let order = Arc::new(Mutex::new(Vec::new()));
        let mut downstreams = Vec::new();
        for i in 0..5 {
            let order = Arc::clone(&order);
            downstreams.push(promise.then(move |value| {
                order.lock().unwrap().push(i);
                Ok(Completion::Value(value))
            }));
        }

        completer.fulfill(0);
        lab.run_until_idle();

        assert_eq!(*order.lock().unwrap(), vec![0, 1, 2, 3, 4]);
        for downstream in &downstreams {
            assert_eq!(downstream.try_result(), Some(Ok(0)));
        }
    }

    #[test]
    fn default_continuations_pass_through() {
        let lab = LabScheduler::new();

        let fulfilled = TestPromise::fulfilled(lab.handle(), 9).chain(None, None);
        let rejected = TestPromise::rejected(lab.handle(), TestError::Boom("boom")).chain(None, None);
        lab.run_until_idle();

        assert_eq!(fulfilled.try_result(), Some(Ok(9)));
        assert_eq!(rejected.try_result(), Some(Err(TestError::Boom("boom"))));
    }

    #[test]
    fn rejection_skips_fulfillment_only_links() {
        let lab = LabScheduler::new();
        let rejected = TestPromise::rejected(lab.handle(), TestError::Boom("down"));

        let caught = rejected
            .then(|value| Ok(Completion::Value(value + 1)))
            .catch(|error| {
                assert_eq!(error, TestError::Boom("down"));
                Ok(Completion::Value(-1))
            });
        lab.run_until_idle();

        assert_eq!(caught.try_result(), Some(Ok(-1)));
    }

    #[test]
    fn continuation_error_rejects_downstream() {
        let lab = LabScheduler::new();
        let promise = TestPromise::fulfilled(lab.handle(), 1);

        let downstream = promise.then(|_| Err(TestError::Boom("err")));
        lab.run_until_idle();

        assert_eq!(downstream.try_result(), Some(Err(TestError::Boom("err"))));
    }

    #[test]
    fn only_the_matching_queue_runs() {
        let lab = LabScheduler::new();
        let (promise, completer) = TestPromise::parts(lab.handle());

        let fulfilled_ran = Arc::new(Mutex::new(0));
        let rejected_ran = Arc::new(Mutex::new(0));
        {
            let fulfilled_ran = Arc::clone(&fulfilled_ran);
            let rejected_ran = Arc::clone(&rejected_ran);
            let _downstream = promise.chain(
                Some(Box::new(move |value| {
                    *fulfilled_ran.lock().unwrap() += 1;
                    Ok(Completion::Value(value))
                })),
                Some(Box::new(move |error| {
                    *rejected_ran.lock().unwrap() += 1;
                    Err(error)
                })),
            );
        }

        completer.reject(TestError::Boom("x"));
        // Settling again must not revive the dropped fulfillment queue.
        completer.fulfill(1);
        lab.run_until_idle();

        assert_eq!(*fulfilled_ran.lock().unwrap(), 0);
        assert_eq!(*rejected_ran.lock().unwrap(), 1);
    }

    #[test]
    fn chains_attached_before_and_after_settlement_share_one_scheduler() {
        let lab = LabScheduler::new();
        let (promise, completer) = TestPromise::parts(lab.handle());

        // Queued while pending: exercises both queue entries.
        let early = promise.chain(None, None);
        completer.reject(TestError::Boom("down"));
        // Registered after settlement: exercises the settled disposition.
        let late = promise.chain(None, None);

        lab.run_until_idle();
        assert_eq!(early.try_result(), Some(Err(TestError::Boom("down"))));
        assert_eq!(late.try_result(), Some(Err(TestError::Boom("down"))));
    }

    #[test]
    fn settlement_from_another_thread() {
        let lab = LabScheduler::new();
        let (promise, completer) = TestPromise::parts(lab.handle());

        let handle = std::thread::spawn(move || completer.fulfill(11));
        handle.join().expect("settling thread panicked");

        assert_eq!(promise.try_result(), Some(Ok(11)));
    }

    #[test]
    fn debug_reports_state() {
        let lab = LabScheduler::new();
        let (promise, completer) = TestPromise::parts(lab.handle());
        assert!(format!("{promise:?}").contains("pending"));
        completer.fulfill(1);
        assert!(format!("{promise:?}").contains("fulfilled"));
        assert!(format!("{completer:?}").contains("fulfilled"));
    }
}
