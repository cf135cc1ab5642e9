//! Cooperative cancellation for pipeline runs.
//!
//! A caller holds the [`CancellationToken`] for a request; the stage invoker
//! races every external call against it.

mod token;

pub use token::CancellationToken;
