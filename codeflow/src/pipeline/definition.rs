//! Stage definitions and the validated, ordered stage plan.

use super::gates::{validate_plan, GateClass, QualityGates};
use crate::core::StageKind;
use crate::errors::PipelineValidationError;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Attempt ceiling used when neither the config nor the request sets one.
pub const DEFAULT_MAX_ATTEMPTS: usize = 3;

/// Specification for a single stage in the plan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageDefinition {
    /// The unique name of the stage.
    pub name: String,
    /// The capability the stage delegates to.
    pub kind: StageKind,
    /// Whether failure halts the pipeline.
    pub gate: GateClass,
    /// Maximum attempts, including the first.
    pub max_attempts: usize,
    /// Name of the upstream stage whose artifact this stage reads.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub consumes: Option<String>,
    /// Per-attempt timeout in milliseconds. A repair attempt shares it across both calls.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_ms: Option<u64>,
}

impl StageDefinition {
    /// Creates a definition with the kind's default name and gate.
    #[must_use]
    pub fn new(kind: StageKind) -> Self {
        Self {
            name: kind.default_name().to_string(),
            kind,
            gate: QualityGates::default_for(kind),
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            consumes: None,
            timeout_ms: None,
        }
    }

    /// Sets the stage name.
    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Sets the gate class.
    #[must_use]
    pub fn with_gate(mut self, gate: GateClass) -> Self {
        self.gate = gate;
        self
    }

    /// Sets the maximum attempts.
    #[must_use]
    pub fn with_max_attempts(mut self, max_attempts: usize) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    /// Sets the upstream stage this stage consumes.
    #[must_use]
    pub fn consumes(mut self, upstream: impl Into<String>) -> Self {
        self.consumes = Some(upstream.into());
        self
    }

    /// Sets the per-attempt timeout.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout_ms = Some(u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX));
        self
    }

    /// Returns the per-attempt timeout, if any.
    #[must_use]
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_ms.map(Duration::from_millis)
    }

    /// Returns true if failure of this stage halts the pipeline.
    #[must_use]
    pub fn is_blocking(&self) -> bool {
        self.gate == GateClass::Blocking
    }
}

/// An ordered, validated sequence of stage definitions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StagePlan {
    stages: Vec<StageDefinition>,
}

impl StagePlan {
    /// Creates a plan after validating stage ordering and gates.
    ///
    /// # Errors
    ///
    /// Returns an error if the plan violates any of the checks in
    /// [`validate_plan`].
    pub fn new(stages: Vec<StageDefinition>) -> Result<Self, PipelineValidationError> {
        validate_plan(&stages)?;
        Ok(Self { stages })
    }

    /// Builds the standard generate → syntax → references (→ review) plan.
    ///
    /// # Errors
    ///
    /// Returns an error if `max_attempts` is zero.
    pub fn standard(
        enable_review: bool,
        max_attempts: usize,
        timeout: Option<Duration>,
        gates: &QualityGates,
    ) -> Result<Self, PipelineValidationError> {
        let mut kinds = vec![
            StageKind::Generate,
            StageKind::CheckSyntax,
            StageKind::CheckReferences,
        ];
        if enable_review {
            kinds.push(StageKind::Review);
        }

        let mut stages: Vec<StageDefinition> = Vec::with_capacity(kinds.len());
        for kind in kinds {
            let mut stage = StageDefinition::new(kind)
                .with_max_attempts(max_attempts)
                .with_gate(gates.classify(kind.default_name(), kind));
            if let Some(timeout) = timeout {
                stage = stage.with_timeout(timeout);
            }
            if let Some(previous) = stages.last() {
                stage = stage.consumes(previous.name.clone());
            }
            stages.push(stage);
        }

        Self::new(stages)
    }

    /// Returns the stages in execution order.
    #[must_use]
    pub fn stages(&self) -> &[StageDefinition] {
        &self.stages
    }

    /// Returns the stage at `index`.
    #[must_use]
    pub fn get(&self, index: usize) -> Option<&StageDefinition> {
        self.stages.get(index)
    }

    /// Returns the stage with the given name.
    #[must_use]
    pub fn find(&self, name: &str) -> Option<&StageDefinition> {
        self.stages.iter().find(|s| s.name == name)
    }

    /// Returns the number of stages.
    #[must_use]
    pub fn len(&self) -> usize {
        self.stages.len()
    }

    /// Returns true if the plan has no stages. Never true for a validated plan.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }

    /// Returns the stage names in execution order.
    #[must_use]
    pub fn names(&self) -> Vec<String> {
        self.stages.iter().map(|s| s.name.clone()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stage_definition_defaults() {
        let stage = StageDefinition::new(StageKind::Review);
        assert_eq!(stage.name, "review");
        assert_eq!(stage.gate, GateClass::Advisory);
        assert_eq!(stage.max_attempts, DEFAULT_MAX_ATTEMPTS);
        assert!(stage.consumes.is_none());
        assert!(stage.timeout().is_none());
    }

    #[test]
    fn test_stage_definition_builder() {
        let stage = StageDefinition::new(StageKind::CheckSyntax)
            .with_name("lint")
            .with_max_attempts(5)
            .consumes("generate")
            .with_timeout(Duration::from_secs(2));

        assert_eq!(stage.name, "lint");
        assert_eq!(stage.max_attempts, 5);
        assert_eq!(stage.consumes.as_deref(), Some("generate"));
        assert_eq!(stage.timeout(), Some(Duration::from_secs(2)));
        assert!(stage.is_blocking());
    }

    #[test]
    fn test_standard_plan_with_review() {
        let plan = StagePlan::standard(true, 3, None, &QualityGates::new()).unwrap();
        assert_eq!(
            plan.names(),
            vec!["generate", "check_syntax", "check_references", "review"]
        );
        assert_eq!(plan.find("review").unwrap().consumes.as_deref(), Some("check_references"));
        assert!(!plan.find("review").unwrap().is_blocking());
    }

    #[test]
    fn test_standard_plan_without_review() {
        let plan = StagePlan::standard(false, 2, Some(Duration::from_secs(1)), &QualityGates::new())
            .unwrap();
        assert_eq!(plan.len(), 3);
        assert!(plan.find("review").is_none());
        assert!(plan.stages().iter().all(|s| s.max_attempts == 2));
        assert!(plan.stages().iter().all(|s| s.timeout_ms == Some(1000)));
    }

    #[test]
    fn test_standard_plan_zero_attempts() {
        assert!(StagePlan::standard(true, 0, None, &QualityGates::new()).is_err());
    }
}
