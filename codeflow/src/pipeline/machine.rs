//! The bounded-retry pipeline state machine.

use super::retry::{accumulated_feedback, decide, RetryDecision};
use super::state::{Phase, PipelineState};
use super::{StageDefinition, StagePlan};
use crate::cancellation::CancellationToken;
use crate::config::PipelineConfig;
use crate::core::{Artifact, AttemptRecord, FailureReason, Request, RunOptions};
use crate::errors::CodeflowError;
use crate::events::{kinds, EventSink, NoOpEventSink};
use crate::observability::wide_events;
use crate::report::{self, aggregate, FailureInfo, Report};
use crate::stages::{Capabilities, StageInvoker};
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{debug, error, info, info_span, warn, Instrument};

enum StageExit {
    Advanced,
    Halted,
}

/// Runs requests through generate → check → (review) with bounded retries.
///
/// A `Pipeline` holds no per-request state; one instance can serve any
/// number of concurrent runs.
///
/// # Example
///
/// ```rust,ignore
/// let pipeline = Pipeline::new(capabilities)
///     .with_config(PipelineConfig::default().with_max_attempts(2));
/// let report = pipeline.run_task("parse a CSV header", RunOptions::new()).await;
/// ```
#[derive(Clone)]
pub struct Pipeline {
    config: PipelineConfig,
    invoker: StageInvoker,
    events: Arc<dyn EventSink>,
}

impl std::fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pipeline")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl Pipeline {
    /// Creates a pipeline with the default configuration and no event sink.
    #[must_use]
    pub fn new(capabilities: Capabilities) -> Self {
        Self {
            config: PipelineConfig::default(),
            invoker: StageInvoker::new(capabilities),
            events: Arc::new(NoOpEventSink),
        }
    }

    /// Sets the configuration.
    #[must_use]
    pub fn with_config(mut self, config: PipelineConfig) -> Self {
        self.config = config;
        self
    }

    /// Sets the event sink.
    #[must_use]
    pub fn with_event_sink(mut self, events: Arc<dyn EventSink>) -> Self {
        self.events = events;
        self
    }

    /// Returns the configuration.
    #[must_use]
    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Creates a request for `task` and runs it to completion.
    pub async fn run_task(&self, task: impl Into<String>, options: RunOptions) -> Report {
        let request = Request::new(task, options);
        self.run(&request, &CancellationToken::new()).await
    }

    /// Runs a request to completion.
    ///
    /// Never fails: stage failures, budget exhaustion, cancellation and
    /// invalid per-request options are all reported in the returned
    /// [`Report`].
    pub async fn run(&self, request: &Request, cancel: &CancellationToken) -> Report {
        let span = info_span!("pipeline", request_id = %request.id);

        let plan = match self.config.plan_for(&request.options) {
            Ok(plan) => plan,
            Err(error) => {
                warn!(parent: &span, error = %error, "Rejected run options");
                let report = report::rejected(request, &error);
                self.emit(kinds::PIPELINE_FAILED, wide_events::pipeline_payload(&report)).await;
                return report;
            }
        };
        let budget = self.config.budget_for(&request.options);

        let mut state = PipelineState::new();
        let driven = self
            .drive(&plan, request, budget, cancel, &mut state)
            .instrument(span.clone())
            .await;
        if let Err(error) = driven {
            error!(parent: &span, error = %error, "State machine rejected a transition");
            let failure = FailureInfo {
                stage: "pipeline".to_string(),
                reason: FailureReason::Fatal,
                attempts: 0,
                last_errors: vec![error.to_string()],
            };
            if state.fail(failure).is_err() {
                debug!(parent: &span, "Run had already ended");
            }
        }

        let report = aggregate(&state, request, &plan);
        info!(
            parent: &span,
            status = %report.status,
            external_calls = report.totals.total_external_calls,
            "Pipeline finished"
        );
        let kind = if report.is_success() {
            kinds::PIPELINE_COMPLETED
        } else {
            kinds::PIPELINE_FAILED
        };
        self.emit(kind, wide_events::pipeline_payload(&report)).await;
        report
    }

    async fn drive(
        &self,
        plan: &StagePlan,
        request: &Request,
        budget: usize,
        cancel: &CancellationToken,
        state: &mut PipelineState,
    ) -> Result<(), CodeflowError> {
        info!(stages = ?plan.names(), budget, "Pipeline started");
        self.emit(
            kinds::PIPELINE_STARTED,
            json!({
                "request_id": request.id,
                "stages": plan.names(),
                "budget": budget,
            }),
        )
        .await;

        for (index, stage) in plan.stages().iter().enumerate() {
            state.transition(Phase::Running(index))?;
            match self.run_stage(stage, request, budget, cancel, state).await? {
                StageExit::Advanced => {}
                StageExit::Halted => return Ok(()),
            }
        }

        let terminal = if state.degraded().is_empty() {
            Phase::Completed
        } else {
            Phase::PartiallyCompleted
        };
        state.transition(terminal)
    }

    async fn run_stage(
        &self,
        stage: &StageDefinition,
        request: &Request,
        budget: usize,
        cancel: &CancellationToken,
        state: &mut PipelineState,
    ) -> Result<StageExit, CodeflowError> {
        let input: Option<Artifact> = stage
            .consumes
            .as_deref()
            .and_then(|upstream| state.output(upstream))
            .cloned();

        loop {
            let (attempt, feedback, last_errors, correction) = {
                let history = state.history(&stage.name);
                let last = history.last();
                (
                    history.len() + 1,
                    accumulated_feedback(history),
                    last.map(|r| r.details.clone()).unwrap_or_default(),
                    last.and_then(|r| r.correction.clone()),
                )
            };

            if cancel.is_cancelled() {
                let reason = cancel.reason().unwrap_or_else(|| "cancelled".to_string());
                warn!(stage = %stage.name, reason = %reason, "Run cancelled");
                halt(state, stage, FailureReason::Cancelled, vec![reason])?;
                return Ok(StageExit::Halted);
            }

            let cost = StageInvoker::calls_for(stage, attempt, correction.is_some());
            if state.external_calls() + cost > budget {
                warn!(
                    stage = %stage.name,
                    used = state.external_calls(),
                    cost,
                    budget,
                    "Global attempt budget exhausted"
                );
                let mut errors = last_errors;
                errors.push(format!(
                    "budget of {budget} external calls exhausted ({} used, next attempt needs {cost})",
                    state.external_calls()
                ));
                halt(state, stage, FailureReason::BudgetExceeded, errors)?;
                return Ok(StageExit::Halted);
            }

            let span = info_span!("stage_attempt", stage = %stage.name, attempt);
            let invocation = match &correction {
                Some(correction) => {
                    self.invoker
                        .invoke_correction(stage, &request.task, correction, cancel)
                        .instrument(span)
                        .await
                }
                None => {
                    self.invoker
                        .invoke(stage, attempt, &request.task, input.as_ref(), &feedback, cancel)
                        .instrument(span)
                        .await
                }
            };

            if let Some(candidate) = &invocation.candidate {
                state.set_candidate(candidate.clone());
            }
            let record = AttemptRecord::new(stage.name.clone(), attempt, invocation.outcome)
                .with_input_digest(invocation.input_digest)
                .with_feedback_count(if correction.is_some() { 0 } else { feedback.len() })
                .with_calls(invocation.calls, invocation.regenerated);
            debug!(
                stage = %stage.name,
                attempt,
                kind = %record.kind,
                calls = record.external_calls,
                "Attempt finished"
            );
            self.emit(kinds::STAGE_ATTEMPT, wide_events::attempt_payload(&record))
                .await;

            let produced = record.artifact.clone();
            let details = record.details.clone();
            state.record(record);

            match decide(stage, state.history(&stage.name)) {
                RetryDecision::Retry => {
                    let delay = self.config.backoff.delay_for(attempt - 1);
                    debug!(stage = %stage.name, next_attempt = attempt + 1, ?delay, "Retrying with feedback");
                    self.emit(
                        kinds::STAGE_RETRY,
                        json!({
                            "stage": &stage.name,
                            "next_attempt": attempt + 1,
                            "feedback": details,
                        }),
                    )
                    .await;
                    if !delay.is_zero() {
                        tokio::select! {
                            () = cancel.cancelled() => {}
                            () = tokio::time::sleep(delay) => {}
                        }
                    }
                }
                RetryDecision::Advance { degraded: false } => {
                    if let Some(artifact) = produced.or_else(|| input.clone()) {
                        state.set_output(stage.name.clone(), artifact);
                    }
                    info!(stage = %stage.name, attempts = attempt, "Stage passed");
                    self.emit(
                        kinds::STAGE_ADVANCED,
                        json!({"stage": &stage.name, "attempts": attempt}),
                    )
                    .await;
                    return Ok(StageExit::Advanced);
                }
                RetryDecision::Advance { degraded: true } => {
                    if let Some(artifact) = input {
                        state.set_output(stage.name.clone(), artifact);
                    }
                    state.mark_degraded(stage.name.clone());
                    warn!(stage = %stage.name, attempts = attempt, "Advisory stage degraded");
                    self.emit(
                        kinds::STAGE_DEGRADED,
                        json!({
                            "stage": &stage.name,
                            "attempts": attempt,
                            "details": details,
                        }),
                    )
                    .await;
                    return Ok(StageExit::Advanced);
                }
                RetryDecision::Abort(reason) => {
                    warn!(stage = %stage.name, attempts = attempt, %reason, "Blocking stage failed");
                    halt(state, stage, reason, details)?;
                    return Ok(StageExit::Halted);
                }
            }
        }
    }

    async fn emit(&self, event_type: &str, data: Value) {
        self.events.emit(event_type, Some(data)).await;
    }
}

fn halt(
    state: &mut PipelineState,
    stage: &StageDefinition,
    reason: FailureReason,
    last_errors: Vec<String>,
) -> Result<(), CodeflowError> {
    let failure = FailureInfo {
        stage: stage.name.clone(),
        reason,
        attempts: state.attempts(&stage.name),
        last_errors,
    };
    state.fail(failure)
}
