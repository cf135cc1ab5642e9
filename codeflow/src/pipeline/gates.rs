//! Quality gate classification and stage-plan consistency checks.
//!
//! Whether a stage blocks the pipeline is data on its [`StageDefinition`];
//! this module supplies the defaults and rejects plans whose ordering would
//! make the retry policy unsound.

use super::StageDefinition;
use crate::core::StageKind;
use crate::errors::{ContractErrorInfo, ContractSuggestions, PipelineValidationError};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::fmt;

/// Whether a stage's failure halts the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GateClass {
    /// Must pass for the pipeline to proceed.
    Blocking,
    /// Failure is recorded but does not halt the pipeline.
    Advisory,
}

impl fmt::Display for GateClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Blocking => write!(f, "blocking"),
            Self::Advisory => write!(f, "advisory"),
        }
    }
}

/// Static blocking/advisory classification.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QualityGates {
    /// Per-stage-name overrides of the kind defaults.
    #[serde(default)]
    pub overrides: HashMap<String, GateClass>,
}

impl QualityGates {
    /// Creates gates with the default classification.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the default gate for a stage kind.
    ///
    /// Generation and both validators block; review is advisory.
    #[must_use]
    pub const fn default_for(kind: StageKind) -> GateClass {
        match kind {
            StageKind::Generate | StageKind::CheckSyntax | StageKind::CheckReferences => {
                GateClass::Blocking
            }
            StageKind::Review => GateClass::Advisory,
        }
    }

    /// Overrides the gate for a named stage.
    #[must_use]
    pub fn with_override(mut self, stage: impl Into<String>, gate: GateClass) -> Self {
        self.overrides.insert(stage.into(), gate);
        self
    }

    /// Classifies a stage by name and kind.
    #[must_use]
    pub fn classify(&self, name: &str, kind: StageKind) -> GateClass {
        self.overrides
            .get(name)
            .copied()
            .unwrap_or_else(|| Self::default_for(kind))
    }
}

fn contract_error(
    code: &str,
    message: String,
    stages: Vec<String>,
) -> PipelineValidationError {
    let mut info = ContractErrorInfo::new(code, message.clone());
    if let Some(hint) = ContractSuggestions::get(code) {
        info = info.with_fix_hint(hint);
    }
    if let Some(first) = stages.first() {
        info = info.with_context_entry("stage", first.clone());
    }
    PipelineValidationError::new(message)
        .with_stages(stages)
        .with_error_info(info)
}

/// Validates an ordered stage plan.
///
/// # Errors
///
/// Returns a [`PipelineValidationError`] with a `GATE-*` code when the plan is
/// empty, has duplicate names or zero attempt ceilings, does not start with the
/// artifact-producing stage, has a `consumes` link that does not point at an
/// earlier stage, or has a blocking stage consuming an advisory stage's output.
pub fn validate_plan(stages: &[StageDefinition]) -> Result<(), PipelineValidationError> {
    if stages.is_empty() {
        return Err(contract_error(
            "GATE-004-EMPTY",
            "Stage plan cannot be empty".to_string(),
            Vec::new(),
        ));
    }

    let mut seen: HashMap<&str, &StageDefinition> = HashMap::new();
    let mut names: HashSet<&str> = HashSet::new();

    for (index, stage) in stages.iter().enumerate() {
        if !names.insert(stage.name.as_str()) {
            return Err(contract_error(
                "GATE-003-DUPLICATE",
                format!("Stage '{}' is defined more than once", stage.name),
                vec![stage.name.clone()],
            ));
        }

        if stage.max_attempts == 0 {
            return Err(contract_error(
                "GATE-006-ZERO_ATTEMPTS",
                format!("Stage '{}' has max_attempts = 0", stage.name),
                vec![stage.name.clone()],
            ));
        }

        let is_first = index == 0;
        if is_first != stage.kind.produces_artifact() {
            let message = if is_first {
                format!("First stage '{}' does not produce the artifact", stage.name)
            } else {
                format!("Only the first stage may produce the artifact; '{}' is at position {index}", stage.name)
            };
            return Err(contract_error(
                "GATE-005-NO_PRODUCER",
                message,
                vec![stage.name.clone()],
            ));
        }

        match (&stage.consumes, is_first) {
            (None, true) => {}
            (Some(upstream), true) => {
                return Err(contract_error(
                    "GATE-002-MISSING_UPSTREAM",
                    format!("First stage '{}' cannot consume '{upstream}'", stage.name),
                    vec![stage.name.clone(), upstream.clone()],
                ));
            }
            (None, false) => {
                return Err(contract_error(
                    "GATE-002-MISSING_UPSTREAM",
                    format!("Stage '{}' does not name the stage it consumes", stage.name),
                    vec![stage.name.clone()],
                ));
            }
            (Some(upstream), false) => {
                let Some(producer) = seen.get(upstream.as_str()) else {
                    return Err(contract_error(
                        "GATE-002-MISSING_UPSTREAM",
                        format!(
                            "Stage '{}' consumes '{upstream}', which is not an earlier stage",
                            stage.name
                        ),
                        vec![stage.name.clone(), upstream.clone()],
                    ));
                };

                if stage.gate == GateClass::Blocking && producer.gate == GateClass::Advisory {
                    return Err(contract_error(
                        "GATE-001-ORDER",
                        format!(
                            "Blocking stage '{}' consumes advisory stage '{upstream}'",
                            stage.name
                        ),
                        vec![stage.name.clone(), upstream.clone()],
                    ));
                }
            }
        }

        seen.insert(stage.name.as_str(), stage);
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn standard() -> Vec<StageDefinition> {
        vec![
            StageDefinition::new(StageKind::Generate),
            StageDefinition::new(StageKind::CheckSyntax).consumes("generate"),
            StageDefinition::new(StageKind::CheckReferences).consumes("check_syntax"),
            StageDefinition::new(StageKind::Review).consumes("check_references"),
        ]
    }

    #[test]
    fn test_default_classification() {
        assert_eq!(QualityGates::default_for(StageKind::Generate), GateClass::Blocking);
        assert_eq!(QualityGates::default_for(StageKind::CheckSyntax), GateClass::Blocking);
        assert_eq!(QualityGates::default_for(StageKind::CheckReferences), GateClass::Blocking);
        assert_eq!(QualityGates::default_for(StageKind::Review), GateClass::Advisory);
    }

    #[test]
    fn test_override_classification() {
        let gates = QualityGates::new().with_override("check_references", GateClass::Advisory);
        assert_eq!(
            gates.classify("check_references", StageKind::CheckReferences),
            GateClass::Advisory
        );
        assert_eq!(gates.classify("check_syntax", StageKind::CheckSyntax), GateClass::Blocking);
    }

    #[test]
    fn test_standard_plan_is_valid() {
        assert!(validate_plan(&standard()).is_ok());
    }

    #[test]
    fn test_empty_plan_rejected() {
        let err = validate_plan(&[]).unwrap_err();
        assert_eq!(err.code(), Some("GATE-004-EMPTY"));
    }

    #[test]
    fn test_blocking_after_advisory_rejected() {
        let plan = vec![
            StageDefinition::new(StageKind::Generate),
            StageDefinition::new(StageKind::Review).consumes("generate"),
            StageDefinition::new(StageKind::CheckSyntax).consumes("review"),
        ];
        let err = validate_plan(&plan).unwrap_err();
        assert_eq!(err.code(), Some("GATE-001-ORDER"));
        assert_eq!(err.stages, vec!["check_syntax".to_string(), "review".to_string()]);
        assert!(err.error_info.unwrap().fix_hint.is_some());
    }

    #[test]
    fn test_blocking_after_advisory_with_explicit_link_allowed() {
        let plan = vec![
            StageDefinition::new(StageKind::Generate),
            StageDefinition::new(StageKind::Review).consumes("generate"),
            StageDefinition::new(StageKind::CheckSyntax).consumes("generate"),
        ];
        assert!(validate_plan(&plan).is_ok());
    }

    #[test]
    fn test_forward_link_rejected() {
        let plan = vec![
            StageDefinition::new(StageKind::Generate),
            StageDefinition::new(StageKind::CheckSyntax).consumes("check_references"),
            StageDefinition::new(StageKind::CheckReferences).consumes("generate"),
        ];
        let err = validate_plan(&plan).unwrap_err();
        assert_eq!(err.code(), Some("GATE-002-MISSING_UPSTREAM"));
    }

    #[test]
    fn test_first_stage_must_generate() {
        let plan = vec![StageDefinition::new(StageKind::CheckSyntax)];
        let err = validate_plan(&plan).unwrap_err();
        assert_eq!(err.code(), Some("GATE-005-NO_PRODUCER"));
    }

    #[test]
    fn test_duplicate_and_zero_attempts_rejected() {
        let plan = vec![
            StageDefinition::new(StageKind::Generate),
            StageDefinition::new(StageKind::CheckSyntax).consumes("generate"),
            StageDefinition::new(StageKind::CheckSyntax).consumes("generate"),
        ];
        assert_eq!(validate_plan(&plan).unwrap_err().code(), Some("GATE-003-DUPLICATE"));

        let plan = vec![StageDefinition::new(StageKind::Generate).with_max_attempts(0)];
        assert_eq!(
            validate_plan(&plan).unwrap_err().code(),
            Some("GATE-006-ZERO_ATTEMPTS")
        );
    }
}
