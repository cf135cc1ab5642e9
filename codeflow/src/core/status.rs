//! Stage kind, outcome kind, report status and failure reason enums.

use serde::{Deserialize, Serialize};
use std::fmt;

/// The capability a stage delegates to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageKind {
    /// Produces the artifact from the task description.
    Generate,
    /// Validates the artifact's syntax.
    CheckSyntax,
    /// Verifies imports and API references used by the artifact.
    CheckReferences,
    /// Reviews the artifact against the task.
    Review,
}

impl StageKind {
    /// Returns the default stage name for this kind.
    #[must_use]
    pub const fn default_name(self) -> &'static str {
        match self {
            Self::Generate => "generate",
            Self::CheckSyntax => "check_syntax",
            Self::CheckReferences => "check_references",
            Self::Review => "review",
        }
    }

    /// Returns true if the stage validates an existing artifact and can
    /// repair it by regenerating with feedback.
    #[must_use]
    pub const fn is_validation(self) -> bool {
        matches!(self, Self::CheckSyntax | Self::CheckReferences)
    }

    /// Returns true if a successful attempt of this stage yields a new artifact.
    #[must_use]
    pub const fn produces_artifact(self) -> bool {
        matches!(self, Self::Generate)
    }
}

impl fmt::Display for StageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.default_name())
    }
}

/// The kind of a single attempt's outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutcomeKind {
    /// The capability accepted the artifact.
    Success,
    /// A retryable failure with actionable details.
    SoftFailure,
    /// The capability did not answer in time.
    Timeout,
    /// A non-retryable failure.
    Fatal,
    /// The caller cancelled the request.
    Cancelled,
}

impl OutcomeKind {
    /// Returns true if the outcome may be retried.
    #[must_use]
    pub const fn is_retryable(self) -> bool {
        matches!(self, Self::SoftFailure | Self::Timeout)
    }

    /// Returns true if the outcome indicates success.
    #[must_use]
    pub const fn is_success(self) -> bool {
        matches!(self, Self::Success)
    }
}

impl fmt::Display for OutcomeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Success => write!(f, "success"),
            Self::SoftFailure => write!(f, "soft_failure"),
            Self::Timeout => write!(f, "timeout"),
            Self::Fatal => write!(f, "fatal"),
            Self::Cancelled => write!(f, "cancelled"),
        }
    }
}

/// Terminal status of a pipeline run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReportStatus {
    /// Every stage advanced without degradation.
    Completed,
    /// Every blocking stage passed but at least one advisory stage degraded.
    PartiallyCompleted,
    /// A blocking stage failed, the budget ran out or the run was cancelled.
    Failed,
}

impl ReportStatus {
    /// Returns true if the final artifact passed every blocking stage.
    #[must_use]
    pub const fn is_success(self) -> bool {
        matches!(self, Self::Completed | Self::PartiallyCompleted)
    }
}

impl fmt::Display for ReportStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Completed => write!(f, "completed"),
            Self::PartiallyCompleted => write!(f, "partially_completed"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

/// Why a run ended in `failed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureReason {
    /// A blocking stage used every attempt with soft failures.
    StageExhausted,
    /// A blocking stage returned a non-retryable failure.
    Fatal,
    /// A blocking stage timed out on its last allowed attempt.
    Timeout,
    /// The caller cancelled the request.
    Cancelled,
    /// The global external-call budget ran out.
    BudgetExceeded,
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::StageExhausted => write!(f, "stage_exhausted"),
            Self::Fatal => write!(f, "fatal"),
            Self::Timeout => write!(f, "timeout"),
            Self::Cancelled => write!(f, "cancelled"),
            Self::BudgetExceeded => write!(f, "budget_exceeded"),
        }
    }
}
