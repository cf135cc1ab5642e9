//! Folds a finished run's state into a [`Report`].

use super::{AttemptTotals, FailureInfo, Report, StageHistory};
use crate::core::{FailureReason, ReportStatus, Request, StageKind};
use crate::errors::CodeflowError;
use crate::pipeline::{Phase, PipelineState, StagePlan};

/// Builds the report for a finished run.
///
/// Pure and deterministic: the only time and identity data comes from the
/// request, so replaying the same outcomes yields an equal report. A state
/// that never reached a terminal phase is reported as `failed`.
#[must_use]
pub fn aggregate(state: &PipelineState, request: &Request, plan: &StagePlan) -> Report {
    let status = match state.phase() {
        Phase::Completed => ReportStatus::Completed,
        Phase::PartiallyCompleted => ReportStatus::PartiallyCompleted,
        Phase::NotStarted | Phase::Running(_) | Phase::Failed => ReportStatus::Failed,
    };

    let stages: Vec<StageHistory> = plan
        .stages()
        .iter()
        .map(|stage| StageHistory {
            stage: stage.name.clone(),
            kind: stage.kind,
            gate: stage.gate,
            max_attempts: stage.max_attempts,
            attempts: state.history(&stage.name).to_vec(),
        })
        .collect();

    let final_artifact = if status.is_success() {
        plan.stages()
            .last()
            .and_then(|stage| state.output(&stage.name))
            .cloned()
    } else {
        None
    };

    let last_candidate = if status.is_success() {
        None
    } else {
        state.last_candidate().cloned()
    };

    Report {
        request_id: request.id,
        task: request.task.clone(),
        created_at: request.created_at,
        status,
        final_artifact,
        last_candidate,
        totals: totals(&stages, state.external_calls()),
        stages,
        degraded_stages: state.degraded().to_vec(),
        failure: state.failure().cloned(),
    }
}

/// Builds the report for a request whose options could not form a valid plan.
///
/// No stage is entered; the error is reported as a fatal failure of the
/// `configuration` pseudo-stage.
#[must_use]
pub fn rejected(request: &Request, error: &CodeflowError) -> Report {
    Report {
        request_id: request.id,
        task: request.task.clone(),
        created_at: request.created_at,
        status: ReportStatus::Failed,
        final_artifact: None,
        last_candidate: None,
        stages: Vec::new(),
        degraded_stages: Vec::new(),
        failure: Some(FailureInfo {
            stage: "configuration".to_string(),
            reason: FailureReason::Fatal,
            attempts: 0,
            last_errors: vec![error.to_string()],
        }),
        totals: AttemptTotals::default(),
    }
}

fn totals(stages: &[StageHistory], external_calls: usize) -> AttemptTotals {
    let mut totals = AttemptTotals {
        total_external_calls: external_calls,
        ..AttemptTotals::default()
    };

    for history in stages {
        let attempts = history.attempts.len();
        totals.per_stage.insert(history.stage.clone(), attempts);

        let retries = attempts.saturating_sub(1);
        match history.kind {
            StageKind::Generate => {
                totals.generation_retries += retries;
                totals.generation_calls += history
                    .attempts
                    .iter()
                    .filter(|a| a.external_calls > 0)
                    .count();
            }
            kind if kind.is_validation() => {
                totals.validation_retries += retries;
                totals.generation_calls += history.attempts.iter().filter(|a| a.regenerated).count();
            }
            _ => {}
        }
    }

    totals
}
