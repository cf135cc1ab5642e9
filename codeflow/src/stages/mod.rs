//! Stage invocation against external capabilities.
//!
//! - [`ports`]: the capability traits and the [`Capabilities`] bundle
//! - [`normalize`]: raw response shapes folded into [`Outcome`](crate::core::Outcome)
//! - [`StageInvoker`]: one attempt with timeout and cancellation

pub mod normalize;
mod invoker;
mod ports;

pub use invoker::{Invocation, StageInvoker};
pub use ports::{Capabilities, CodeGenerator, CodeReviewer, ReferenceChecker, SyntaxChecker};
