//! Error types for promise settlement.
//!
//! Error handling follows these principles:
//!
//! - Errors are explicit and typed (no stringly-typed errors)
//! - All failure is expressed by rejecting a promise; nothing is thrown
//!   across a chain boundary
//! - The error channel is the caller's type `E`; the one error the core
//!   itself can originate is [`CycleError`], absorbed into `E` via
//!   `From<CycleError>`
//!
//! # Error Categories
//!
//! - **Producer failure**: the construction-time producer returns `Err`
//!   before settling; the promise under construction is rejected with it
//! - **Continuation failure**: a chained callback returns `Err`; the
//!   downstream promise is rejected with it
//! - **Cyclic adoption**: a continuation resolves its own downstream promise
//!   with itself; the downstream is rejected with [`CycleError`]
//! - **Foreign adoption failure**: a future-like value's registration
//!   capability returns `Err`; the downstream is rejected with it

/// A continuation tried to resolve its own downstream promise with itself.
///
/// Adopting such a value could never settle: the downstream would be waiting
/// on its own settlement. The adoption algorithm detects the referential
/// cycle and rejects the downstream with this error instead. Error types used
/// with [`Promise::chain`](crate::Promise::chain) must absorb it via
/// `From<CycleError>`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("cyclic chaining detected")]
pub struct CycleError;
