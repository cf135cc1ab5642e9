//! Pipeline planning and execution.
//!
//! This module provides:
//! - Stage definitions and the validated [`StagePlan`]
//! - Quality gate classification and plan checks
//! - The pure retry policy and retry backoff
//! - Request-scoped [`PipelineState`]
//! - The [`Pipeline`] state machine that drives a run

mod definition;
mod gates;
mod machine;
mod retry;
mod state;


pub use definition::{StageDefinition, StagePlan, DEFAULT_MAX_ATTEMPTS};
pub use gates::{validate_plan, GateClass, QualityGates};
pub use machine::Pipeline;
pub use retry::{accumulated_feedback, decide, BackoffStrategy, RetryBackoff, RetryDecision};
pub use state::{Phase, PipelineState};
