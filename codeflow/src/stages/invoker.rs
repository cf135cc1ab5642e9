//! Single-attempt stage invocation with timeout and cancellation.

use super::normalize;
use super::ports::Capabilities;
use crate::cancellation::CancellationToken;
use crate::core::{Artifact, Outcome, StageKind};
use crate::pipeline::StageDefinition;
use serde_json::Value;
use std::future::Future;
use std::time::Duration;
use tokio::time::Instant;
use tracing::debug;

/// The normalized result of one attempt, with its cost.
#[derive(Debug, Clone, PartialEq)]
pub struct Invocation {
    /// Normalized outcome.
    pub outcome: Outcome,
    /// External calls started by this attempt.
    pub calls: usize,
    /// Whether the attempt regenerated the artifact before checking it.
    pub regenerated: bool,
    /// Digest of the artifact the attempt checked.
    pub input_digest: Option<String>,
    /// Freshly generated or corrected code, whether or not it passed.
    pub candidate: Option<Artifact>,
}

impl Invocation {
    fn new(outcome: Outcome, calls: usize) -> Self {
        Self {
            outcome,
            calls,
            regenerated: false,
            input_digest: None,
            candidate: None,
        }
    }
}

/// One deadline shared by every call of an attempt.
#[derive(Debug, Clone, Copy)]
struct Deadline {
    limit: Duration,
    at: Instant,
}

impl Deadline {
    fn start(limit: Option<Duration>) -> Option<Self> {
        limit.map(|limit| Self {
            limit,
            at: Instant::now() + limit,
        })
    }
}

/// Invokes stage capabilities and normalizes their responses.
///
/// Never mutates pipeline state; the caller records the returned
/// [`Invocation`].
#[derive(Debug, Clone)]
pub struct StageInvoker {
    capabilities: Capabilities,
}

impl StageInvoker {
    /// Creates an invoker over the given capabilities.
    #[must_use]
    pub fn new(capabilities: Capabilities) -> Self {
        Self { capabilities }
    }

    /// Returns the external calls attempt number `attempt` of `stage` will make.
    ///
    /// Retries of validation stages regenerate before checking and cost two,
    /// unless the previous attempt left a correction to check instead.
    #[must_use]
    pub const fn calls_for(stage: &StageDefinition, attempt: usize, corrected: bool) -> usize {
        if stage.kind.is_validation() && attempt > 1 && !corrected {
            2
        } else {
            1
        }
    }

    /// Runs attempt number `attempt` (1-based) of `stage`.
    ///
    /// `input` is the artifact handed over by the consumed stage; `feedback`
    /// is the stage's accumulated error details. The stage timeout bounds the
    /// whole attempt, including both calls of a repair.
    pub async fn invoke(
        &self,
        stage: &StageDefinition,
        attempt: usize,
        task: &str,
        input: Option<&Artifact>,
        feedback: &[String],
        cancel: &CancellationToken,
    ) -> Invocation {
        if cancel.is_cancelled() {
            return Invocation::new(Outcome::cancelled(cancel_reason(cancel)), 0);
        }

        let deadline = Deadline::start(stage.timeout());
        if stage.kind == StageKind::Generate {
            return self.generate(stage, task, feedback, deadline, cancel).await;
        }

        let Some(input) = input else {
            return Invocation::new(
                Outcome::fatal(format!("stage '{}' has no input artifact", stage.name)),
                0,
            );
        };

        if stage.kind.is_validation() && attempt > 1 {
            return self.repair(stage, task, feedback, deadline, cancel).await;
        }

        let checked = self.check(stage.kind, task, input, deadline, cancel).await;
        Invocation {
            outcome: carry(checked, input),
            calls: 1,
            regenerated: false,
            input_digest: Some(input.digest()),
            candidate: None,
        }
    }

    /// Checks a correction proposed by the stage's previous attempt, without
    /// regenerating.
    pub async fn invoke_correction(
        &self,
        stage: &StageDefinition,
        task: &str,
        correction: &Artifact,
        cancel: &CancellationToken,
    ) -> Invocation {
        if cancel.is_cancelled() {
            return Invocation::new(Outcome::cancelled(cancel_reason(cancel)), 0);
        }

        debug!(stage = %stage.name, digest = %correction.digest(), "Checking proposed correction");
        let deadline = Deadline::start(stage.timeout());
        let checked = self.check(stage.kind, task, correction, deadline, cancel).await;
        Invocation {
            outcome: carry(checked, correction),
            calls: 1,
            regenerated: false,
            input_digest: Some(correction.digest()),
            candidate: Some(correction.clone()),
        }
    }

    async fn generate(
        &self,
        stage: &StageDefinition,
        task: &str,
        feedback: &[String],
        deadline: Option<Deadline>,
        cancel: &CancellationToken,
    ) -> Invocation {
        debug!(stage = %stage.name, feedback = feedback.len(), "Calling generator");
        let outcome = match guarded(
            "generate",
            self.capabilities.generator.generate(task, feedback),
            deadline,
            cancel,
        )
        .await
        {
            Ok(value) => normalize::generation(value, &stage.name),
            Err(outcome) => outcome,
        };

        let candidate = produced(&outcome);
        Invocation {
            outcome,
            calls: 1,
            regenerated: false,
            input_digest: None,
            candidate,
        }
    }

    async fn repair(
        &self,
        stage: &StageDefinition,
        task: &str,
        feedback: &[String],
        deadline: Option<Deadline>,
        cancel: &CancellationToken,
    ) -> Invocation {
        let regenerated = self.generate(stage, task, feedback, deadline, cancel).await;
        let Some(fresh) = regenerated.candidate.clone() else {
            return Invocation {
                regenerated: true,
                ..regenerated
            };
        };

        debug!(stage = %stage.name, digest = %fresh.digest(), "Checking regenerated code");
        let checked = self.check(stage.kind, task, &fresh, deadline, cancel).await;
        Invocation {
            outcome: carry(checked, &fresh),
            calls: 2,
            regenerated: true,
            input_digest: Some(fresh.digest()),
            candidate: Some(fresh),
        }
    }

    async fn check(
        &self,
        kind: StageKind,
        task: &str,
        artifact: &Artifact,
        deadline: Option<Deadline>,
        cancel: &CancellationToken,
    ) -> Outcome {
        let code = artifact.content.as_str();
        let response = match kind {
            StageKind::CheckSyntax => {
                guarded("check_syntax", self.capabilities.syntax.check_syntax(code), deadline, cancel)
                    .await
                    .map(normalize::syntax)
            }
            StageKind::CheckReferences => guarded(
                "check_references",
                self.capabilities.references.check_references(code),
                deadline,
                cancel,
            )
            .await
            .map(normalize::references),
            StageKind::Review => {
                guarded("review", self.capabilities.reviewer.review(code, task), deadline, cancel)
                    .await
                    .map(normalize::review)
            }
            StageKind::Generate => Ok(Outcome::fatal("generation is not a check")),
        };
        match response {
            Ok(outcome) | Err(outcome) => outcome,
        }
    }
}

/// Races one capability call against the attempt deadline and cancellation.
///
/// Returns the raw response, or the outcome that replaces it: a soft failure
/// for transport errors, a timeout, or a cancellation.
async fn guarded<F>(
    capability: &str,
    call: F,
    deadline: Option<Deadline>,
    cancel: &CancellationToken,
) -> Result<Value, Outcome>
where
    F: Future<Output = anyhow::Result<Value>>,
{
    let bounded = async {
        match deadline {
            Some(deadline) => tokio::time::timeout_at(deadline.at, call)
                .await
                .map_err(|_| Outcome::timeout(deadline.limit)),
            None => Ok(call.await),
        }
    };

    let result = tokio::select! {
        biased;
        () = cancel.cancelled() => Err(Outcome::cancelled(cancel_reason(cancel))),
        result = bounded => result,
    };

    match result {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(error)) => {
            debug!(capability, error = %error, "Capability call failed");
            Err(Outcome::soft_failure(vec![format!("{capability} call failed: {error}")]))
        }
        Err(outcome) => Err(outcome),
    }
}

fn cancel_reason(cancel: &CancellationToken) -> String {
    cancel.reason().unwrap_or_else(|| "cancelled".to_string())
}

fn produced(outcome: &Outcome) -> Option<Artifact> {
    match outcome {
        Outcome::Success { artifact, .. } => artifact.clone(),
        _ => None,
    }
}

/// Makes a successful check hand over the artifact it checked, and lets a
/// proposed correction keep the checked artifact's dependencies.
fn carry(outcome: Outcome, artifact: &Artifact) -> Outcome {
    match outcome {
        Outcome::Success {
            notes, metadata, ..
        } => Outcome::Success {
            artifact: Some(artifact.clone()),
            notes,
            metadata,
        },
        Outcome::SoftFailure {
            details,
            correction: Some(correction),
        } => Outcome::corrected(
            details,
            correction.with_dependencies(artifact.dependencies.clone()),
        ),
        other => other,
    }
}
