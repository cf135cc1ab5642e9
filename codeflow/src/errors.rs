//! Error types for the codeflow crate.
//!
//! Stage failures during a run are never surfaced as `Err`; they are recorded
//! in the [`Report`](crate::report::Report). The errors here cover invalid
//! stage plans, invalid configuration and misuse of the state machine.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;

/// The main error type for codeflow operations.
#[derive(Debug, Error)]
pub enum CodeflowError {
    /// A stage plan failed validation.
    #[error("{0}")]
    Validation(#[from] PipelineValidationError),

    /// The configuration is invalid.
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// A phase transition was attempted out of a terminal phase.
    #[error("Invalid transition from {from} to {to}")]
    InvalidTransition {
        /// The phase the pipeline was in.
        from: String,
        /// The phase that was requested.
        to: String,
    },

    /// Serialization/deserialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl CodeflowError {
    /// Creates an invalid configuration error.
    #[must_use]
    pub fn invalid_config(message: impl Into<String>) -> Self {
        Self::InvalidConfiguration(message.into())
    }

    /// Creates an invalid transition error.
    #[must_use]
    pub fn invalid_transition(from: impl ToString, to: impl ToString) -> Self {
        Self::InvalidTransition {
            from: from.to_string(),
            to: to.to_string(),
        }
    }
}

/// Metadata about a contract error for better diagnostics.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
pub struct ContractErrorInfo {
    /// Error code (e.g., "GATE-001-ORDER").
    pub code: String,
    /// Short summary of the error.
    pub summary: String,
    /// Hint for fixing the error.
    pub fix_hint: Option<String>,
    /// Additional context key-value pairs.
    #[serde(default)]
    pub context: HashMap<String, String>,
}

impl ContractErrorInfo {
    /// Creates a new contract error info.
    #[must_use]
    pub fn new(code: impl Into<String>, summary: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            summary: summary.into(),
            fix_hint: None,
            context: HashMap::new(),
        }
    }

    /// Sets the fix hint.
    #[must_use]
    pub fn with_fix_hint(mut self, hint: impl Into<String>) -> Self {
        self.fix_hint = Some(hint.into());
        self
    }

    /// Adds a single context entry.
    #[must_use]
    pub fn with_context_entry(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.context.insert(key.into(), value.into());
        self
    }
}

/// Error raised when a stage plan fails validation.
#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct PipelineValidationError {
    /// The error message.
    pub message: String,
    /// The stages involved in the error.
    pub stages: Vec<String>,
    /// Optional contract error info.
    pub error_info: Option<ContractErrorInfo>,
}

impl PipelineValidationError {
    /// Creates a new pipeline validation error.
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            stages: Vec::new(),
            error_info: None,
        }
    }

    /// Sets the stages involved.
    #[must_use]
    pub fn with_stages(mut self, stages: Vec<String>) -> Self {
        self.stages = stages;
        self
    }

    /// Sets the contract error info.
    #[must_use]
    pub fn with_error_info(mut self, info: ContractErrorInfo) -> Self {
        self.error_info = Some(info);
        self
    }

    /// Returns the contract error code, if any.
    #[must_use]
    pub fn code(&self) -> Option<&str> {
        self.error_info.as_ref().map(|info| info.code.as_str())
    }
}

/// Provides default suggestions for stage plan error codes.
pub struct ContractSuggestions;

impl ContractSuggestions {
    /// Gets a suggestion for a given error code.
    #[must_use]
    pub fn get(code: &str) -> Option<&'static str> {
        match code {
            "GATE-001-ORDER" => Some(
                "A blocking stage cannot consume the output of an advisory stage. \
                 Point its `consumes` link at the last blocking stage instead.",
            ),
            "GATE-002-MISSING_UPSTREAM" => Some(
                "Every `consumes` link must name a stage defined earlier in the plan.",
            ),
            "GATE-003-DUPLICATE" => Some("Stage names must be unique within a plan."),
            "GATE-004-EMPTY" => Some("Add at least one stage to the plan."),
            "GATE-005-NO_PRODUCER" => Some(
                "The first stage must produce the artifact; start the plan with a generate stage.",
            ),
            "GATE-006-ZERO_ATTEMPTS" => Some("max_attempts must be at least 1."),
            _ => None,
        }
    }
}
