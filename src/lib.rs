//! Promissory: a deferred-value primitive with one-shot settlement, chaining,
//! and adoption of future-like values.
//!
//! # Overview
//!
//! A [`Promise`] is a one-shot container for a value that becomes available
//! later. A producer settles it exactly once, with either a success value or
//! an error; consumers attach continuations with [`Promise::chain`] without
//! knowing whether settlement has already happened. Each chaining call
//! produces a new downstream promise whose settlement is driven by the
//! upstream's settlement plus the continuation's outcome.
//!
//! # Core Guarantees
//!
//! - **Monotonic settlement**: a promise leaves `Pending` exactly once; every
//!   later settlement attempt is a no-op
//! - **FIFO drain**: continuations registered while pending fire in
//!   registration order, each exactly once, after settlement
//! - **Uniform deferral**: continuations never run synchronously inside
//!   `chain`, even when the upstream is already settled
//! - **Cycle guard**: a continuation that resolves its own downstream promise
//!   with itself rejects that downstream with [`CycleError`] instead of
//!   deadlocking settlement
//! - **Adoption idempotence**: a misbehaving foreign future-like value that
//!   invokes its callbacks more than once settles the downstream exactly once
//!
//! # Module Structure
//!
//! - [`promise`]: the promise itself, its settlement capabilities, and chaining
//! - [`adopt`]: the adoption algorithm for continuation return values
//! - [`state`]: the settlement state machine
//! - [`error`]: typed errors
//! - [`sched`]: the injected deferral capability
//! - [`lab`]: deterministic scheduler for tests
//!
//! # Example
//!
//! ```
//! use promissory::{Completion, CycleError, LabScheduler, Promise};
//!
//! #[derive(Debug, Clone, PartialEq)]
//! struct Boom;
//! impl From<CycleError> for Boom {
//!     fn from(_: CycleError) -> Self {
//!         Boom
//!     }
//! }
//!
//! let lab = LabScheduler::new();
//! let scheduler = lab.handle();
//!
//! let doubled = Promise::<i32, Boom>::fulfilled(scheduler, 21)
//!     .then(|value| Ok(Completion::Value(value * 2)));
//!
//! // Nothing runs until the scheduler is driven.
//! assert!(doubled.is_pending());
//! lab.run_until_idle();
//! assert_eq!(doubled.try_result(), Some(Ok(42)));
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_panics_doc)]

pub mod adopt;
pub mod error;
pub mod lab;
pub mod promise;
pub mod sched;
pub mod state;

pub use adopt::{AdoptFulfilled, AdoptRejected, Completion, FutureLike, OnceLatch};
pub use error::CycleError;
pub use lab::LabScheduler;
pub use promise::{Completer, OnFulfilled, OnRejected, Promise};
pub use sched::{Scheduler, Task};
pub use state::PromiseState;
