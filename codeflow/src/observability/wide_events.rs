//! Wide event payloads: one self-contained JSON object per attempt and per run.

use crate::core::AttemptRecord;
use crate::report::Report;
use serde_json::{json, Value};

/// Builds the payload for a finished attempt.
#[must_use]
pub fn attempt_payload(record: &AttemptRecord) -> Value {
    let mut payload = json!({
        "stage": &record.stage,
        "attempt": record.attempt,
        "kind": record.kind,
        "calls": record.external_calls,
        "regenerated": record.regenerated,
        "feedback_count": record.feedback_count,
    });

    if !record.details.is_empty() {
        payload["details"] = json!(&record.details);
    }
    if let Some(digest) = &record.input_digest {
        payload["input_digest"] = json!(digest);
    }
    if let Some(correction) = &record.correction {
        payload["correction_digest"] = json!(correction.digest());
    }

    payload
}

/// Builds the payload for a finished run.
#[must_use]
pub fn pipeline_payload(report: &Report) -> Value {
    let stages: Vec<Value> = report
        .stages
        .iter()
        .map(|history| {
            json!({
                "stage": &history.stage,
                "gate": history.gate,
                "attempts": history.attempts.len(),
                "last_kind": history.last().map(|r| r.kind),
            })
        })
        .collect();

    let mut payload = json!({
        "request_id": report.request_id,
        "status": report.status,
        "stages": stages,
        "degraded_stages": &report.degraded_stages,
        "totals": &report.totals,
    });

    if let Some(failure) = &report.failure {
        payload["failure"] = json!(failure);
    }
    if let Some(artifact) = &report.final_artifact {
        payload["artifact_digest"] = json!(artifact.digest());
    }

    payload
}
