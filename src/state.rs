//! Settlement state machine.
//!
//! A promise is in exactly one of three states:
//!
//! ```text
//!               fulfill(value)
//!             ┌───────────────► Fulfilled(value)
//!   Pending ──┤
//!             └───────────────► Rejected(error)
//!               reject(error)
//! ```
//!
//! The transition out of `Pending` happens exactly once; whichever settlement
//! capability fires first wins and every later attempt is a no-op. The
//! continuation queues live *inside* the `Pending` variant, so "queues are
//! populated only while pending and cleared at settlement" is structural: the
//! transition consumes them.

/// A queued reaction to fulfillment, invoked with a clone of the value.
pub(crate) type FulfillReaction<T> = Box<dyn FnOnce(T) + Send>;

/// A queued reaction to rejection, invoked with a clone of the error.
pub(crate) type RejectReaction<E> = Box<dyn FnOnce(E) + Send>;

/// Internal settlement state of a promise.
pub(crate) enum State<T, E> {
    /// Not yet settled; holds the continuation queues in registration order.
    Pending {
        /// Reactions to run on fulfillment, FIFO.
        on_fulfilled: Vec<FulfillReaction<T>>,
        /// Reactions to run on rejection, FIFO.
        on_rejected: Vec<RejectReaction<E>>,
    },
    /// Settled with a success value.
    Fulfilled(T),
    /// Settled with an error.
    Rejected(E),
}

impl<T, E> State<T, E> {
    /// A fresh pending state with empty queues.
    pub(crate) fn pending() -> Self {
        Self::Pending {
            on_fulfilled: Vec::new(),
            on_rejected: Vec::new(),
        }
    }

    /// The observable tag for this state.
    pub(crate) fn tag(&self) -> PromiseState {
        match self {
            Self::Pending { .. } => PromiseState::Pending,
            Self::Fulfilled(_) => PromiseState::Fulfilled,
            Self::Rejected(_) => PromiseState::Rejected,
        }
    }
}

/// The observable settlement state of a promise.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PromiseState {
    /// Not yet settled.
    Pending,
    /// Settled with a success value.
    Fulfilled,
    /// Settled with an error.
    Rejected,
}

impl PromiseState {
    /// Returns a human-readable name for the state.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Fulfilled => "fulfilled",
            Self::Rejected => "rejected",
        }
    }

    /// Returns true if this is a settled (non-pending) state.
    #[must_use]
    pub const fn is_settled(self) -> bool {
        !matches!(self, Self::Pending)
    }
}

impl std::fmt::Display for PromiseState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}
