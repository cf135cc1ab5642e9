//! # Codeflow
//!
//! A bounded-retry, feedback-driven pipeline controller for code generation.
//!
//! A run drives one task through a fixed sequence of stages, each delegated to
//! an external capability:
//!
//! - **generate**: produce code from the task description
//! - **check_syntax** / **check_references**: blocking validators; a failed
//!   check is repaired by regenerating with the accumulated error details
//! - **review**: optional and advisory; its failure never fails the run
//!
//! Every attempt is recorded, retries are bounded per stage and by a global
//! external-call budget, and the run ends in a single [`Report`](report::Report).
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use codeflow::prelude::*;
//!
//! let pipeline = Pipeline::new(capabilities)
//!     .with_config(PipelineConfig::default().apply_env()?);
//!
//! let report = pipeline
//!     .run_task("parse an ISO-8601 date", RunOptions::new().with_review(false))
//!     .await;
//!
//! match report.status {
//!     ReportStatus::Completed | ReportStatus::PartiallyCompleted => {
//!         println!("{}", report.final_artifact.unwrap().content);
//!     }
//!     ReportStatus::Failed => eprintln!("{:?}", report.failure),
//! }
//! ```

#![forbid(unsafe_code)]
#![warn(
    clippy::all,
    clippy::pedantic,
    missing_docs,
    rust_2018_idioms
)]
#![allow(
    clippy::module_name_repetitions,
    clippy::must_use_candidate,
    clippy::missing_errors_doc,
    clippy::missing_panics_doc
)]

pub mod cancellation;
pub mod config;
pub mod core;
pub mod errors;
pub mod events;
pub mod observability;
pub mod pipeline;
pub mod report;
pub mod stages;
pub mod testing;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::cancellation::CancellationToken;
    pub use crate::config::PipelineConfig;
    pub use crate::core::{
        Artifact, AttemptRecord, FailureReason, Outcome, OutcomeKind, ReportStatus, Request,
        RunOptions, StageKind,
    };
    pub use crate::errors::{CodeflowError, ContractErrorInfo, PipelineValidationError};
    pub use crate::events::{CollectingEventSink, EventSink, LoggingEventSink, NoOpEventSink};
    pub use crate::observability::{init_tracing, LogFormat};
    pub use crate::pipeline::{
        GateClass, Pipeline, QualityGates, RetryBackoff, StageDefinition, StagePlan,
    };
    pub use crate::report::{FailureInfo, Report};
    pub use crate::stages::{
        Capabilities, CodeGenerator, CodeReviewer, ReferenceChecker, SyntaxChecker,
    };
}
