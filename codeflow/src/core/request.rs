//! The immutable request a run serves.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Per-request overrides applied on top of the pipeline configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunOptions {
    /// Whether the review stage runs. `None` defers to the configuration.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enable_review: Option<bool>,
    /// Attempt ceiling for every stage.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_attempts_per_stage: Option<usize>,
    /// External-call ceiling for the whole run.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub global_attempt_budget: Option<usize>,
}

impl RunOptions {
    /// Creates options that defer to the configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Enables or disables the review stage.
    #[must_use]
    pub fn with_review(mut self, enable: bool) -> Self {
        self.enable_review = Some(enable);
        self
    }

    /// Sets the attempt ceiling for every stage.
    #[must_use]
    pub fn with_max_attempts(mut self, max_attempts: usize) -> Self {
        self.max_attempts_per_stage = Some(max_attempts);
        self
    }

    /// Sets the external-call budget.
    #[must_use]
    pub fn with_budget(mut self, budget: usize) -> Self {
        self.global_attempt_budget = Some(budget);
        self
    }
}

/// One code-generation request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Request {
    /// Unique request identifier.
    pub id: Uuid,
    /// The task description handed to the generator.
    pub task: String,
    /// Options snapshot taken at creation.
    pub options: RunOptions,
    /// Creation time.
    pub created_at: DateTime<Utc>,
}

impl Request {
    /// Creates a request with a fresh id and the current time.
    #[must_use]
    pub fn new(task: impl Into<String>, options: RunOptions) -> Self {
        Self {
            id: Uuid::new_v4(),
            task: task.into(),
            options,
            created_at: Utc::now(),
        }
    }

    /// Overrides the request id.
    #[must_use]
    pub fn with_id(mut self, id: Uuid) -> Self {
        self.id = id;
        self
    }

    /// Overrides the creation time.
    #[must_use]
    pub fn with_created_at(mut self, created_at: DateTime<Utc>) -> Self {
        self.created_at = created_at;
        self
    }
}
