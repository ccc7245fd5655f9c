//! Adoption of continuation return values.
//!
//! When a continuation returns, the downstream promise must decide whether
//! the returned value is final or is itself an asynchronous handle to wait
//! on. [`adopt`] makes that decision:
//!
//! 1. A continuation that resolves its own downstream promise with itself
//!    would deadlock settlement forever; the referential cycle is detected
//!    and the downstream rejected with [`CycleError`].
//! 2. A plain value fulfills the downstream directly.
//! 3. A promise, or any foreign value exposing the [`FutureLike`]
//!    registration capability, is subscribed to; its eventual settlement is
//!    forwarded to the downstream. A fulfillment may itself carry another
//!    [`Completion`], which re-enters adoption.
//!
//! Foreign future-like values are untrusted: their registration mechanism
//! may invoke both callbacks, invoke one twice, or fail outright. A per-
//! adoption [`OnceLatch`] guarantees the downstream settles at most once
//! through this path, matching the first invocation; a registration failure
//! rejects the downstream under the same latch. No failure escapes `adopt`
//! itself.

use crate::error::CycleError;
use crate::promise::Promise;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Callback handed to [`FutureLike::subscribe`] for the fulfillment path.
///
/// The payload is a [`Completion`] rather than a bare value so a future-like
/// object can fulfill with another deferred handle, which adoption unwraps
/// recursively.
pub type AdoptFulfilled<T, E> = Box<dyn FnOnce(Completion<T, E>) + Send>;

/// Callback handed to [`FutureLike::subscribe`] for the rejection path.
pub type AdoptRejected<E> = Box<dyn FnOnce(E) + Send>;

/// The continuation-registration capability of a future-like value.
///
/// Satisfied by [`Promise`] itself and by any external type whose eventual
/// outcome can be observed through a one-shot callback pair. Implementations
/// should invoke exactly one of the two callbacks exactly once; adoption
/// tolerates violations of that contract but well-behaved implementations
/// honor it.
pub trait FutureLike<T, E>: Send {
    /// Registers the callback pair, consuming the handle.
    ///
    /// # Errors
    ///
    /// An `Err` reports that registration itself failed; the caller rejects
    /// its downstream promise with the error.
    fn subscribe(
        self: Box<Self>,
        on_fulfilled: AdoptFulfilled<T, E>,
        on_rejected: AdoptRejected<E>,
    ) -> Result<(), E>;
}

impl<T, E> FutureLike<T, E> for Promise<T, E>
where
    T: Clone + Send + 'static,
    E: Clone + Send + 'static,
{
    fn subscribe(
        self: Box<Self>,
        on_fulfilled: AdoptFulfilled<T, E>,
        on_rejected: AdoptRejected<E>,
    ) -> Result<(), E> {
        self.register(
            Box::new(move |value| on_fulfilled(Completion::Value(value))),
            on_rejected,
        );
        Ok(())
    }
}

/// What a continuation settled on: a final value, or a handle to adopt.
pub enum Completion<T, E> {
    /// A plain value; fulfills the downstream directly.
    Value(T),
    /// One of this crate's own promises; subscribed to, with the referential
    /// cycle check applied first.
    Promise(Promise<T, E>),
    /// A foreign future-like value; subscribed to under the one-shot latch.
    Foreign(Box<dyn FutureLike<T, E>>),
}

impl<T, E> std::fmt::Debug for Completion<T, E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Value(_) => f.write_str("Completion::Value"),
            Self::Promise(promise) => f
                .debug_tuple("Completion::Promise")
                .field(&promise.state().name())
                .finish(),
            Self::Foreign(_) => f.write_str("Completion::Foreign"),
        }
    }
}

/// A one-time-write guard: the first `acquire` wins, every later one fails.
///
/// Clones share the flag. The compare-and-set makes the guard hold even when
/// the callbacks it protects fire from another thread.
#[derive(Clone, Debug, Default)]
pub struct OnceLatch {
    fired: Arc<AtomicBool>,
}

impl OnceLatch {
    /// Creates an unfired latch.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Attempts to fire the latch. Returns true exactly once across all
    /// clones.
    #[must_use]
    pub fn acquire(&self) -> bool {
        self.fired
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    /// Returns true if the latch has fired.
    #[must_use]
    pub fn is_fired(&self) -> bool {
        self.fired.load(Ordering::Acquire)
    }
}

/// Routes a continuation's outcome into the downstream promise.
pub(crate) fn adopt<T, E>(downstream: &Promise<T, E>, completion: Completion<T, E>)
where
    T: Clone + Send + 'static,
    E: Clone + From<CycleError> + Send + 'static,
{
    match completion {
        Completion::Value(value) => downstream.settle_fulfilled(value),
        Completion::Promise(upstream) => {
            if upstream.ptr_eq(downstream) {
                tracing::debug!("adoption: cyclic chaining detected");
                downstream.settle_rejected(E::from(CycleError));
            } else {
                subscribe_guarded(downstream, Box::new(upstream));
            }
        }
        Completion::Foreign(future_like) => subscribe_guarded(downstream, future_like),
    }
}

/// Subscribes to a future-like value with both callbacks behind one latch.
fn subscribe_guarded<T, E>(downstream: &Promise<T, E>, future_like: Box<dyn FutureLike<T, E>>)
where
    T: Clone + Send + 'static,
    E: Clone + From<CycleError> + Send + 'static,
{
    let latch = OnceLatch::new();

    let on_fulfilled: AdoptFulfilled<T, E> = {
        let latch = latch.clone();
        let downstream = downstream.clone();
        Box::new(move |next| {
            if latch.acquire() {
                // Recurse on the newly produced completion: it may itself be
                // a deferred handle that needs adopting.
                adopt(&downstream, next);
            }
        })
    };
    let on_rejected: AdoptRejected<E> = {
        let latch = latch.clone();
        let downstream = downstream.clone();
        Box::new(move |error| {
            if latch.acquire() {
                downstream.settle_rejected(error);
            }
        })
    };

    if let Err(error) = future_like.subscribe(on_fulfilled, on_rejected) {
        tracing::debug!("adoption: registration on future-like value failed");
        if latch.acquire() {
            downstream.settle_rejected(error);
        }
    }
}
