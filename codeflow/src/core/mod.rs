//! Core domain model types for codeflow.
//!
//! This module contains the fundamental types shared by every component:
//! - Stage kind, outcome kind, failure reason and report status enums
//! - The code artifact carried between stages
//! - The normalized three-way stage outcome
//! - The per-attempt history record
//! - The request and its per-run options

mod artifact;
mod attempt;
mod outcome;
mod request;
mod status;

pub use artifact::Artifact;
pub use attempt::AttemptRecord;
pub use outcome::Outcome;
pub use request::{Request, RunOptions};
pub use status::{FailureReason, OutcomeKind, ReportStatus, StageKind};
