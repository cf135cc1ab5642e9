//! Normalized result of one stage invocation.

use super::{Artifact, OutcomeKind};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;

/// The normalized outcome of invoking a stage once.
///
/// Every capability response is folded into one of these variants at the
/// invoker boundary; nothing downstream inspects raw responses.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Outcome {
    /// The capability accepted the input.
    Success {
        /// A new artifact, for stages that produce one.
        artifact: Option<Artifact>,
        /// Advisory notes (review text, partial-verification notes).
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        notes: Vec<String>,
        /// Extra structured data such as a review score.
        #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
        metadata: BTreeMap<String, serde_json::Value>,
    },
    /// A retryable failure.
    SoftFailure {
        /// Ordered error details, fed back on retry.
        details: Vec<String>,
        /// A fixed version of the input proposed by the checker, tried on
        /// the next attempt instead of regenerating.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        correction: Option<Artifact>,
    },
    /// The call exceeded the stage timeout.
    Timeout {
        /// The timeout that elapsed, in milliseconds.
        after_ms: u64,
    },
    /// A non-retryable failure.
    Fatal {
        /// Why the stage cannot continue.
        reason: String,
    },
    /// The caller cancelled the request while the stage was running.
    Cancelled {
        /// The cancellation reason.
        reason: String,
    },
}

impl Outcome {
    /// Creates a success that carries a new artifact.
    #[must_use]
    pub fn success(artifact: Artifact) -> Self {
        Self::Success {
            artifact: Some(artifact),
            notes: Vec::new(),
            metadata: BTreeMap::new(),
        }
    }

    /// Creates a success without a new artifact.
    #[must_use]
    pub fn accepted() -> Self {
        Self::Success {
            artifact: None,
            notes: Vec::new(),
            metadata: BTreeMap::new(),
        }
    }

    /// Creates a success carrying advisory notes.
    #[must_use]
    pub fn accepted_with_notes(notes: Vec<String>) -> Self {
        Self::Success {
            artifact: None,
            notes,
            metadata: BTreeMap::new(),
        }
    }

    /// Creates a soft failure.
    #[must_use]
    pub fn soft_failure(details: Vec<String>) -> Self {
        Self::SoftFailure {
            details,
            correction: None,
        }
    }

    /// Creates a soft failure carrying a proposed correction.
    #[must_use]
    pub fn corrected(details: Vec<String>, correction: Artifact) -> Self {
        Self::SoftFailure {
            details,
            correction: Some(correction),
        }
    }

    /// Creates a timeout outcome.
    #[must_use]
    pub fn timeout(after: Duration) -> Self {
        Self::Timeout {
            after_ms: u64::try_from(after.as_millis()).unwrap_or(u64::MAX),
        }
    }

    /// Creates a fatal outcome.
    #[must_use]
    pub fn fatal(reason: impl Into<String>) -> Self {
        Self::Fatal {
            reason: reason.into(),
        }
    }

    /// Creates a cancelled outcome.
    #[must_use]
    pub fn cancelled(reason: impl Into<String>) -> Self {
        Self::Cancelled {
            reason: reason.into(),
        }
    }

    /// Adds a metadata entry to a success outcome. Other variants are unchanged.
    #[must_use]
    pub fn with_metadata(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        if let Self::Success { metadata, .. } = &mut self {
            metadata.insert(key.into(), value);
        }
        self
    }

    /// Returns the outcome kind.
    #[must_use]
    pub const fn kind(&self) -> OutcomeKind {
        match self {
            Self::Success { .. } => OutcomeKind::Success,
            Self::SoftFailure { .. } => OutcomeKind::SoftFailure,
            Self::Timeout { .. } => OutcomeKind::Timeout,
            Self::Fatal { .. } => OutcomeKind::Fatal,
            Self::Cancelled { .. } => OutcomeKind::Cancelled,
        }
    }

    /// Returns the error details of a failed outcome, in order.
    ///
    /// Timeouts, fatal and cancelled outcomes produce a single detail line.
    #[must_use]
    pub fn error_details(&self) -> Vec<String> {
        match self {
            Self::Success { .. } => Vec::new(),
            Self::SoftFailure { details, .. } => details.clone(),
            Self::Timeout { after_ms } => vec![format!("timed out after {after_ms}ms")],
            Self::Fatal { reason } | Self::Cancelled { reason } => vec![reason.clone()],
        }
    }

    /// Returns true if the outcome is a success.
    #[must_use]
    pub const fn is_success(&self) -> bool {
        matches!(self, Self::Success { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_success_with_artifact() {
        let outcome = Outcome::success(Artifact::new("x = 1", "generate"));
        assert_eq!(outcome.kind(), OutcomeKind::Success);
        assert!(outcome.is_success());
        assert!(outcome.error_details().is_empty());
    }

    #[test]
    fn test_error_details_per_kind() {
        let soft = Outcome::soft_failure(vec!["Line 2: missing colon".into(), "Line 5: bad indent".into()]);
        assert_eq!(soft.error_details().len(), 2);

        let timeout = Outcome::timeout(Duration::from_millis(1500));
        assert_eq!(timeout.error_details(), vec!["timed out after 1500ms".to_string()]);

        let fatal = Outcome::fatal("malformed response");
        assert_eq!(fatal.kind(), OutcomeKind::Fatal);
        assert_eq!(fatal.error_details(), vec!["malformed response".to_string()]);
    }

    #[test]
    fn test_metadata_only_on_success() {
        let review = Outcome::accepted_with_notes(vec!["Looks good".into()])
            .with_metadata("score", serde_json::json!(8));
        match review {
            Outcome::Success { metadata, notes, .. } => {
                assert_eq!(metadata.get("score"), Some(&serde_json::json!(8)));
                assert_eq!(notes, vec!["Looks good".to_string()]);
            }
            other => panic!("unexpected outcome: {other:?}"),
        }

        let fatal = Outcome::fatal("x").with_metadata("score", serde_json::json!(1));
        assert_eq!(fatal, Outcome::fatal("x"));
    }

    #[test]
    fn test_outcome_serialization_tag() {
        let json = serde_json::to_value(Outcome::soft_failure(vec!["e".into()])).unwrap();
        assert_eq!(json["kind"], "soft_failure");
        assert_eq!(json["details"][0], "e");
        assert!(json.get("correction").is_none());

        let corrected = Outcome::corrected(vec!["e".into()], Artifact::new("x = 1", "check_syntax"));
        assert_eq!(corrected.kind(), OutcomeKind::SoftFailure);
        let json = serde_json::to_value(&corrected).unwrap();
        assert_eq!(json["correction"]["content"], "x = 1");
    }
}
