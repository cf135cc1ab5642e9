//! The immutable result of a pipeline run.

mod aggregate;

pub use aggregate::{aggregate, rejected};

use crate::core::{Artifact, AttemptRecord, FailureReason, ReportStatus, StageKind};
use crate::pipeline::GateClass;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

/// Why and where a run failed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailureInfo {
    /// The stage that halted the run.
    pub stage: String,
    /// The failure category.
    pub reason: FailureReason,
    /// Attempts the stage made before halting.
    pub attempts: usize,
    /// Error details of the stage's last attempt.
    #[serde(default)]
    pub last_errors: Vec<String>,
}

/// The full attempt history of one stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageHistory {
    /// Stage name.
    pub stage: String,
    /// Stage kind.
    pub kind: StageKind,
    /// Gate class the stage ran under.
    pub gate: GateClass,
    /// Configured attempt ceiling.
    pub max_attempts: usize,
    /// Attempts in order. Empty if the stage was never entered.
    pub attempts: Vec<AttemptRecord>,
}

impl StageHistory {
    /// Returns true if the stage was entered.
    #[must_use]
    pub fn was_entered(&self) -> bool {
        !self.attempts.is_empty()
    }

    /// Returns the latest attempt.
    #[must_use]
    pub fn last(&self) -> Option<&AttemptRecord> {
        self.attempts.last()
    }
}

/// Attempt and call counts across the run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttemptTotals {
    /// Calls made to the generation capability, including repairs.
    pub generation_calls: usize,
    /// Retries of the generation stage itself.
    pub generation_retries: usize,
    /// Retries of validation stages.
    pub validation_retries: usize,
    /// External calls across every capability.
    pub total_external_calls: usize,
    /// Attempts per stage name.
    pub per_stage: BTreeMap<String, usize>,
}

/// Snapshot of a finished run. The only output of the pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Report {
    /// Request identifier.
    pub request_id: Uuid,
    /// The task that was requested.
    pub task: String,
    /// When the request was created.
    pub created_at: DateTime<Utc>,
    /// Terminal status.
    pub status: ReportStatus,
    /// The artifact that passed every blocking stage.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub final_artifact: Option<Artifact>,
    /// The last code produced, when the run failed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_candidate: Option<Artifact>,
    /// Per-stage history in plan order.
    pub stages: Vec<StageHistory>,
    /// Advisory stages that gave up.
    #[serde(default)]
    pub degraded_stages: Vec<String>,
    /// Failure details when `status` is `failed`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure: Option<FailureInfo>,
    /// Attempt and call counts.
    pub totals: AttemptTotals,
}

impl Report {
    /// Returns the history of a stage by name.
    #[must_use]
    pub fn stage(&self, name: &str) -> Option<&StageHistory> {
        self.stages.iter().find(|s| s.stage == name)
    }

    /// Returns the attempts a stage made; empty for unknown or unentered stages.
    #[must_use]
    pub fn attempts(&self, name: &str) -> &[AttemptRecord] {
        self.stage(name).map_or(&[], |s| s.attempts.as_slice())
    }

    /// Returns true if the run produced an accepted artifact.
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }

    /// Returns every advisory note gathered by successful attempts, in stage order.
    #[must_use]
    pub fn notes(&self) -> Vec<&str> {
        self.stages
            .iter()
            .flat_map(|s| s.attempts.iter())
            .filter(|a| a.is_success())
            .flat_map(|a| a.notes.iter().map(String::as_str))
            .collect()
    }

    /// Serializes the report as pretty-printed JSON.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn to_json_pretty(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}
