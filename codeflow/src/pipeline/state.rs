//! Request-scoped mutable state of one pipeline run.

use crate::core::{Artifact, AttemptRecord};
use crate::errors::CodeflowError;
use crate::report::FailureInfo;
use std::collections::BTreeMap;
use std::fmt;

/// Lifecycle phase of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// No stage has been entered.
    NotStarted,
    /// The stage at this plan index is current.
    Running(usize),
    /// Every stage advanced without degradation.
    Completed,
    /// Every blocking stage passed; at least one advisory stage degraded.
    PartiallyCompleted,
    /// The run halted.
    Failed,
}

impl Phase {
    /// Returns true for phases that accept no further transitions.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::PartiallyCompleted | Self::Failed)
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotStarted => write!(f, "not_started"),
            Self::Running(index) => write!(f, "running({index})"),
            Self::Completed => write!(f, "completed"),
            Self::PartiallyCompleted => write!(f, "partially_completed"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

/// Mutable state owned by a single run.
///
/// Never shared between runs; the state machine is the only writer.
#[derive(Debug, Clone)]
pub struct PipelineState {
    phase: Phase,
    history: BTreeMap<String, Vec<AttemptRecord>>,
    outputs: BTreeMap<String, Artifact>,
    last_candidate: Option<Artifact>,
    degraded: Vec<String>,
    external_calls: usize,
    failure: Option<FailureInfo>,
}

impl Default for PipelineState {
    fn default() -> Self {
        Self::new()
    }
}

impl PipelineState {
    /// Creates an empty state in [`Phase::NotStarted`].
    #[must_use]
    pub fn new() -> Self {
        Self {
            phase: Phase::NotStarted,
            history: BTreeMap::new(),
            outputs: BTreeMap::new(),
            last_candidate: None,
            degraded: Vec::new(),
            external_calls: 0,
            failure: None,
        }
    }

    /// Returns the current phase.
    #[must_use]
    pub const fn phase(&self) -> Phase {
        self.phase
    }

    /// Moves to a new phase.
    ///
    /// # Errors
    ///
    /// Returns [`CodeflowError::InvalidTransition`] when leaving a terminal
    /// phase, moving backwards between stages or completing a run that never
    /// started.
    pub fn transition(&mut self, to: Phase) -> Result<(), CodeflowError> {
        let allowed = match (self.phase, to) {
            (from, _) if from.is_terminal() => false,
            (Phase::NotStarted, Phase::Running(_) | Phase::Failed) => true,
            (Phase::Running(current), Phase::Running(next)) => next > current,
            (Phase::Running(_), to) => to.is_terminal(),
            _ => false,
        };

        if !allowed {
            return Err(CodeflowError::invalid_transition(self.phase, to));
        }
        self.phase = to;
        Ok(())
    }

    /// Appends an attempt record to its stage's history.
    pub fn record(&mut self, record: AttemptRecord) {
        self.external_calls += record.external_calls;
        self.history
            .entry(record.stage.clone())
            .or_default()
            .push(record);
    }

    /// Returns the attempts made by a stage, oldest first.
    #[must_use]
    pub fn history(&self, stage: &str) -> &[AttemptRecord] {
        self.history.get(stage).map_or(&[], Vec::as_slice)
    }

    /// Returns the number of attempts made by a stage.
    #[must_use]
    pub fn attempts(&self, stage: &str) -> usize {
        self.history(stage).len()
    }

    /// Stores the artifact a stage hands to its consumers.
    pub fn set_output(&mut self, stage: impl Into<String>, artifact: Artifact) {
        self.outputs.insert(stage.into(), artifact);
    }

    /// Returns the artifact a stage handed to its consumers.
    #[must_use]
    pub fn output(&self, stage: &str) -> Option<&Artifact> {
        self.outputs.get(stage)
    }

    /// Remembers the most recently produced code, passing or not.
    pub fn set_candidate(&mut self, artifact: Artifact) {
        self.last_candidate = Some(artifact);
    }

    /// Returns the most recently produced code.
    #[must_use]
    pub fn last_candidate(&self) -> Option<&Artifact> {
        self.last_candidate.as_ref()
    }

    /// Marks an advisory stage as degraded.
    pub fn mark_degraded(&mut self, stage: impl Into<String>) {
        self.degraded.push(stage.into());
    }

    /// Returns the degraded stages in the order they gave up.
    #[must_use]
    pub fn degraded(&self) -> &[String] {
        &self.degraded
    }

    /// Returns the external calls consumed so far.
    #[must_use]
    pub const fn external_calls(&self) -> usize {
        self.external_calls
    }

    /// Halts the run with the given failure.
    ///
    /// # Errors
    ///
    /// Returns [`CodeflowError::InvalidTransition`] if the run already ended.
    pub fn fail(&mut self, failure: FailureInfo) -> Result<(), CodeflowError> {
        self.transition(Phase::Failed)?;
        self.failure = Some(failure);
        Ok(())
    }

    /// Returns the failure that halted the run, if any.
    #[must_use]
    pub fn failure(&self) -> Option<&FailureInfo> {
        self.failure.as_ref()
    }
}
