//! Pipeline configuration.
//!
//! Values come from [`PipelineConfig::default`], optionally a JSON file, then
//! `CODEFLOW_*` environment overrides. Per-request [`RunOptions`] are applied
//! last when the stage plan is built.

use crate::core::RunOptions;
use crate::errors::CodeflowError;
use crate::pipeline::{QualityGates, RetryBackoff, StagePlan, DEFAULT_MAX_ATTEMPTS};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tracing::debug;

/// Environment variable overriding the per-stage attempt ceiling.
pub const ENV_MAX_ATTEMPTS: &str = "CODEFLOW_MAX_ATTEMPTS";
/// Environment variable overriding the external-call budget.
pub const ENV_GLOBAL_BUDGET: &str = "CODEFLOW_GLOBAL_BUDGET";
/// Environment variable overriding the per-attempt timeout, in seconds. `0` disables it.
pub const ENV_STAGE_TIMEOUT_SECS: &str = "CODEFLOW_STAGE_TIMEOUT_SECS";
/// Environment variable toggling the review stage.
pub const ENV_ENABLE_REVIEW: &str = "CODEFLOW_ENABLE_REVIEW";

/// Configuration shared by every run of a pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Attempt ceiling for every stage.
    #[serde(default = "default_max_attempts")]
    pub max_attempts_per_stage: usize,
    /// External-call ceiling for one run.
    #[serde(default = "default_global_budget")]
    pub global_attempt_budget: usize,
    /// Per-attempt timeout in milliseconds. `None` disables it.
    #[serde(default = "default_stage_timeout_ms")]
    pub stage_timeout_ms: Option<u64>,
    /// Whether the review stage runs when a request does not say.
    #[serde(default = "default_enable_review")]
    pub enable_review: bool,
    /// Delay before retries.
    #[serde(default)]
    pub backoff: RetryBackoff,
    /// Gate overrides by stage name.
    #[serde(default)]
    pub gates: QualityGates,
}

fn default_max_attempts() -> usize {
    DEFAULT_MAX_ATTEMPTS
}

fn default_global_budget() -> usize {
    12
}

#[allow(clippy::unnecessary_wraps)]
fn default_stage_timeout_ms() -> Option<u64> {
    Some(60_000)
}

fn default_enable_review() -> bool {
    true
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            max_attempts_per_stage: default_max_attempts(),
            global_attempt_budget: default_global_budget(),
            stage_timeout_ms: default_stage_timeout_ms(),
            enable_review: default_enable_review(),
            backoff: RetryBackoff::default(),
            gates: QualityGates::default(),
        }
    }
}

impl PipelineConfig {
    /// Creates the default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads a configuration from a JSON file. Missing fields take defaults.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, is not valid JSON, or
    /// fails [`validate`](Self::validate).
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, CodeflowError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&raw)?;
        debug!(path = %path.display(), "Loaded pipeline config");
        config.validate()?;
        Ok(config)
    }

    /// Applies `CODEFLOW_*` overrides from the process environment.
    ///
    /// # Errors
    ///
    /// Returns an error if a variable is set but cannot be parsed.
    pub fn apply_env(self) -> Result<Self, CodeflowError> {
        self.apply_env_from(|key| std::env::var(key).ok())
    }

    /// Applies `CODEFLOW_*` overrides read through `lookup`.
    ///
    /// # Errors
    ///
    /// Returns an error if a variable is set but cannot be parsed, or the
    /// result fails [`validate`](Self::validate).
    pub fn apply_env_from<F>(mut self, lookup: F) -> Result<Self, CodeflowError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(value) = lookup(ENV_MAX_ATTEMPTS) {
            self.max_attempts_per_stage = parse_env(ENV_MAX_ATTEMPTS, &value)?;
        }
        if let Some(value) = lookup(ENV_GLOBAL_BUDGET) {
            self.global_attempt_budget = parse_env(ENV_GLOBAL_BUDGET, &value)?;
        }
        if let Some(value) = lookup(ENV_STAGE_TIMEOUT_SECS) {
            let secs: u64 = parse_env(ENV_STAGE_TIMEOUT_SECS, &value)?;
            self.stage_timeout_ms = (secs > 0).then(|| secs.saturating_mul(1000));
        }
        if let Some(value) = lookup(ENV_ENABLE_REVIEW) {
            self.enable_review = match value.trim().to_ascii_lowercase().as_str() {
                "1" | "true" | "yes" | "on" => true,
                "0" | "false" | "no" | "off" => false,
                other => {
                    return Err(CodeflowError::invalid_config(format!(
                        "{ENV_ENABLE_REVIEW} must be a boolean, got '{other}'"
                    )))
                }
            };
        }
        self.validate()?;
        Ok(self)
    }

    /// Sets the per-stage attempt ceiling.
    #[must_use]
    pub fn with_max_attempts(mut self, max_attempts: usize) -> Self {
        self.max_attempts_per_stage = max_attempts;
        self
    }

    /// Sets the external-call budget.
    #[must_use]
    pub fn with_global_budget(mut self, budget: usize) -> Self {
        self.global_attempt_budget = budget;
        self
    }

    /// Sets the per-attempt timeout. `None` disables it.
    #[must_use]
    pub fn with_stage_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.stage_timeout_ms = timeout.map(|t| u64::try_from(t.as_millis()).unwrap_or(u64::MAX));
        self
    }

    /// Sets whether review runs by default.
    #[must_use]
    pub fn with_review(mut self, enable: bool) -> Self {
        self.enable_review = enable;
        self
    }

    /// Sets the retry backoff.
    #[must_use]
    pub fn with_backoff(mut self, backoff: RetryBackoff) -> Self {
        self.backoff = backoff;
        self
    }

    /// Sets the gate overrides.
    #[must_use]
    pub fn with_gates(mut self, gates: QualityGates) -> Self {
        self.gates = gates;
        self
    }

    /// Returns the per-attempt timeout.
    #[must_use]
    pub fn stage_timeout(&self) -> Option<Duration> {
        self.stage_timeout_ms.map(Duration::from_millis)
    }

    /// Returns whether a run with `options` includes the review stage.
    #[must_use]
    pub fn review_enabled(&self, options: &RunOptions) -> bool {
        options.enable_review.unwrap_or(self.enable_review)
    }

    /// Returns the budget a run with `options` gets.
    #[must_use]
    pub fn budget_for(&self, options: &RunOptions) -> usize {
        options
            .global_attempt_budget
            .unwrap_or(self.global_attempt_budget)
    }

    /// Builds the stage plan for a run with `options`.
    ///
    /// # Errors
    ///
    /// Returns an error if the resulting plan is invalid, e.g. a zero attempt
    /// ceiling.
    pub fn plan_for(&self, options: &RunOptions) -> Result<StagePlan, CodeflowError> {
        let max_attempts = options
            .max_attempts_per_stage
            .unwrap_or(self.max_attempts_per_stage);
        Ok(StagePlan::standard(
            self.review_enabled(options),
            max_attempts,
            self.stage_timeout(),
            &self.gates,
        )?)
    }

    /// Checks the configuration for values no run could succeed with.
    ///
    /// # Errors
    ///
    /// Returns [`CodeflowError::InvalidConfiguration`] for a zero attempt
    /// ceiling or a zero timeout, and a validation error if the gate
    /// overrides produce an invalid plan.
    pub fn validate(&self) -> Result<(), CodeflowError> {
        if self.max_attempts_per_stage == 0 {
            return Err(CodeflowError::invalid_config(
                "max_attempts_per_stage must be at least 1",
            ));
        }
        if self.stage_timeout_ms == Some(0) {
            return Err(CodeflowError::invalid_config(
                "stage_timeout_ms must be positive; omit it to disable the timeout",
            ));
        }
        self.plan_for(&RunOptions::new().with_review(true))?;
        Ok(())
    }
}

fn parse_env<T: std::str::FromStr>(key: &str, value: &str) -> Result<T, CodeflowError> {
    value
        .trim()
        .parse()
        .map_err(|_| CodeflowError::invalid_config(format!("{key} has invalid value '{value}'")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::GateClass;
    use std::collections::HashMap;
    use std::io::Write;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = PipelineConfig::default();
        assert_eq!(config.max_attempts_per_stage, 3);
        assert_eq!(config.global_attempt_budget, 12);
        assert_eq!(config.stage_timeout(), Some(Duration::from_secs(60)));
        assert!(config.enable_review);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_from_json_file_fills_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{"max_attempts_per_stage": 5, "gates": {{"overrides": {{"check_references": "advisory"}}}}}}"#
        )
        .unwrap();

        let config = PipelineConfig::from_json_file(file.path()).unwrap();
        assert_eq!(config.max_attempts_per_stage, 5);
        assert_eq!(config.global_attempt_budget, 12);
        assert_eq!(
            config.gates.classify("check_references", crate::core::StageKind::CheckReferences),
            GateClass::Advisory
        );
    }

    #[test]
    fn test_from_json_file_rejects_invalid() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"max_attempts_per_stage": 0}}"#).unwrap();
        assert!(matches!(
            PipelineConfig::from_json_file(file.path()),
            Err(CodeflowError::InvalidConfiguration(_))
        ));

        let missing = PipelineConfig::from_json_file("/nonexistent/codeflow.json");
        assert!(matches!(missing, Err(CodeflowError::Io(_))));
    }

    #[test]
    fn test_env_overrides() {
        let config = PipelineConfig::default()
            .apply_env_from(env(&[
                (ENV_MAX_ATTEMPTS, "4"),
                (ENV_GLOBAL_BUDGET, "20"),
                (ENV_STAGE_TIMEOUT_SECS, "0"),
                (ENV_ENABLE_REVIEW, "false"),
            ]))
            .unwrap();

        assert_eq!(config.max_attempts_per_stage, 4);
        assert_eq!(config.global_attempt_budget, 20);
        assert_eq!(config.stage_timeout(), None);
        assert!(!config.enable_review);
    }

    #[test]
    fn test_env_rejects_garbage() {
        let err = PipelineConfig::default()
            .apply_env_from(env(&[(ENV_GLOBAL_BUDGET, "lots")]))
            .unwrap_err();
        assert!(err.to_string().contains(ENV_GLOBAL_BUDGET));

        assert!(PipelineConfig::default()
            .apply_env_from(env(&[(ENV_ENABLE_REVIEW, "maybe")]))
            .is_err());
    }

    #[test]
    fn test_plan_for_applies_options() {
        let config = PipelineConfig::default();
        let plan = config
            .plan_for(&RunOptions::new().with_review(false).with_max_attempts(1))
            .unwrap();
        assert_eq!(plan.len(), 3);
        assert!(plan.stages().iter().all(|s| s.max_attempts == 1));

        assert_eq!(config.plan_for(&RunOptions::new()).unwrap().len(), 4);
        let quiet = PipelineConfig::default().with_review(false);
        assert_eq!(quiet.plan_for(&RunOptions::new()).unwrap().len(), 3);
        assert_eq!(quiet.plan_for(&RunOptions::new().with_review(true)).unwrap().len(), 4);

        assert_eq!(config.budget_for(&RunOptions::new()), 12);
        assert_eq!(config.budget_for(&RunOptions::new().with_budget(2)), 2);

        let err = config.plan_for(&RunOptions::new().with_max_attempts(0)).unwrap_err();
        assert!(matches!(err, CodeflowError::Validation(_)));
    }
}
