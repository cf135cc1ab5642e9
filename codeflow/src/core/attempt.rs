//! Immutable record of one stage attempt.

use super::{Artifact, Outcome, OutcomeKind};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// One invocation attempt of a stage.
///
/// Records are appended to a per-stage history and never modified.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttemptRecord {
    /// Stage name.
    pub stage: String,
    /// Attempt index, starting at 1.
    pub attempt: usize,
    /// Outcome kind.
    pub kind: OutcomeKind,
    /// Ordered error details (empty on success).
    #[serde(default)]
    pub details: Vec<String>,
    /// Artifact produced by a successful attempt.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub artifact: Option<Artifact>,
    /// Advisory notes returned with a success.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub notes: Vec<String>,
    /// Structured extras returned with a success (e.g. review score).
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub metadata: BTreeMap<String, serde_json::Value>,
    /// Fixed code proposed by a failed check, tried by the next attempt.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub correction: Option<Artifact>,
    /// Digest of the artifact this attempt operated on.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input_digest: Option<String>,
    /// Number of feedback entries passed to the capability.
    pub feedback_count: usize,
    /// Whether the attempt regenerated the artifact before checking it.
    pub regenerated: bool,
    /// External calls consumed by this attempt.
    pub external_calls: usize,
}

impl AttemptRecord {
    /// Creates a record from a normalized outcome.
    #[must_use]
    pub fn new(stage: impl Into<String>, attempt: usize, outcome: Outcome) -> Self {
        let kind = outcome.kind();
        let details = outcome.error_details();
        let (artifact, notes, metadata, correction) = match outcome {
            Outcome::Success {
                artifact,
                notes,
                metadata,
            } => (artifact, notes, metadata, None),
            Outcome::SoftFailure { correction, .. } => {
                (None, Vec::new(), BTreeMap::new(), correction)
            }
            _ => (None, Vec::new(), BTreeMap::new(), None),
        };

        Self {
            stage: stage.into(),
            attempt,
            kind,
            details,
            artifact,
            notes,
            metadata,
            correction,
            input_digest: None,
            feedback_count: 0,
            regenerated: false,
            external_calls: 1,
        }
    }

    /// Sets the digest of the artifact the attempt operated on.
    #[must_use]
    pub fn with_input_digest(mut self, digest: Option<String>) -> Self {
        self.input_digest = digest;
        self
    }

    /// Sets the number of feedback entries supplied.
    #[must_use]
    pub fn with_feedback_count(mut self, count: usize) -> Self {
        self.feedback_count = count;
        self
    }

    /// Records how many external calls the attempt made and whether it regenerated.
    #[must_use]
    pub fn with_calls(mut self, external_calls: usize, regenerated: bool) -> Self {
        self.external_calls = external_calls;
        self.regenerated = regenerated;
        self
    }

    /// Returns true if the attempt succeeded.
    #[must_use]
    pub const fn is_success(&self) -> bool {
        self.kind.is_success()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_from_success() {
        let outcome = Outcome::success(Artifact::new("x = 1", "generate"));
        let record = AttemptRecord::new("generate", 1, outcome);

        assert!(record.is_success());
        assert_eq!(record.artifact.as_ref().map(|a| a.content.as_str()), Some("x = 1"));
        assert!(record.details.is_empty());
        assert_eq!(record.external_calls, 1);
    }

    #[test]
    fn test_record_from_soft_failure() {
        let record = AttemptRecord::new(
            "check_syntax",
            2,
            Outcome::soft_failure(vec!["Line 1: missing colon".into()]),
        )
        .with_feedback_count(1)
        .with_calls(2, true)
        .with_input_digest(Some("abc".into()));

        assert_eq!(record.kind, OutcomeKind::SoftFailure);
        assert_eq!(record.details, vec!["Line 1: missing colon".to_string()]);
        assert!(record.artifact.is_none());
        assert!(record.correction.is_none());
        assert!(record.regenerated);
        assert_eq!(record.external_calls, 2);
        assert_eq!(record.input_digest.as_deref(), Some("abc"));
    }

    #[test]
    fn test_record_keeps_correction() {
        let fixed = Artifact::new("def f():\n    pass", "check_syntax");
        let record = AttemptRecord::new(
            "check_syntax",
            1,
            Outcome::corrected(vec!["Line 1: missing colon".into()], fixed.clone()),
        );

        assert_eq!(record.kind, OutcomeKind::SoftFailure);
        assert_eq!(record.correction, Some(fixed));
        assert!(record.artifact.is_none());
    }
}
