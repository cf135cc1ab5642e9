//! Scripted capabilities for deterministic pipeline tests.

use crate::core::StageKind;
use crate::stages::{Capabilities, CodeGenerator, CodeReviewer, ReferenceChecker, SyntaxChecker};
use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;

/// One scripted reaction to a capability call.
#[derive(Debug, Clone, PartialEq)]
pub enum ScriptStep {
    /// Return this raw response.
    Respond(Value),
    /// Fail the call as a transport error.
    TransportError(String),
    /// Wait, then return the response.
    Stall(Duration, Value),
}

/// Capabilities that replay queued responses, one queue per capability.
///
/// When a queue runs dry the capability answers with a passing default, so a
/// test only scripts the calls it cares about. Every call is recorded.
#[derive(Debug, Default)]
pub struct ScriptedCapabilities {
    queues: Mutex<HashMap<StageKind, VecDeque<ScriptStep>>>,
    calls: Mutex<HashMap<StageKind, usize>>,
    feedback_log: Mutex<Vec<Vec<String>>>,
    checked: Mutex<Vec<(StageKind, String)>>,
}

impl ScriptedCapabilities {
    /// Creates a script where every call passes.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues a step for the capability behind `kind`.
    #[must_use]
    pub fn then(self, kind: StageKind, step: ScriptStep) -> Self {
        self.queues.lock().entry(kind).or_default().push_back(step);
        self
    }

    /// Queues a raw response for the capability behind `kind`.
    #[must_use]
    pub fn respond(self, kind: StageKind, response: Value) -> Self {
        self.then(kind, ScriptStep::Respond(response))
    }

    /// Queues a transport error for the capability behind `kind`.
    #[must_use]
    pub fn fail_transport(self, kind: StageKind, message: impl Into<String>) -> Self {
        self.then(kind, ScriptStep::TransportError(message.into()))
    }

    /// Queues a delayed response for the capability behind `kind`.
    #[must_use]
    pub fn stall(self, kind: StageKind, delay: Duration, response: Value) -> Self {
        self.then(kind, ScriptStep::Stall(delay, response))
    }

    /// Wraps the script as the capability set of a pipeline.
    #[must_use]
    pub fn into_capabilities(self) -> (Arc<Self>, Capabilities) {
        let shared = Arc::new(self);
        let capabilities = Capabilities::from_shared(Arc::clone(&shared));
        (shared, capabilities)
    }

    /// Returns the calls made to the capability behind `kind`.
    #[must_use]
    pub fn call_count(&self, kind: StageKind) -> usize {
        self.calls.lock().get(&kind).copied().unwrap_or(0)
    }

    /// Returns the feedback passed to each generation call, in call order.
    #[must_use]
    pub fn feedback_log(&self) -> Vec<Vec<String>> {
        self.feedback_log.lock().clone()
    }

    /// Returns the code each checker or reviewer was given, in call order.
    #[must_use]
    pub fn checked_code(&self) -> Vec<(StageKind, String)> {
        self.checked.lock().clone()
    }

    /// Returns the number of steps still queued for `kind`.
    #[must_use]
    pub fn remaining(&self, kind: StageKind) -> usize {
        self.queues.lock().get(&kind).map_or(0, VecDeque::len)
    }

    async fn answer(&self, kind: StageKind) -> anyhow::Result<Value> {
        let call = {
            let mut calls = self.calls.lock();
            let count = calls.entry(kind).or_insert(0);
            *count += 1;
            *count
        };
        let step = self.queues.lock().get_mut(&kind).and_then(VecDeque::pop_front);

        match step {
            Some(ScriptStep::Respond(value)) => Ok(value),
            Some(ScriptStep::TransportError(message)) => Err(anyhow::anyhow!(message)),
            Some(ScriptStep::Stall(delay, value)) => {
                tokio::time::sleep(delay).await;
                Ok(value)
            }
            None => Ok(responses::passing(kind, call)),
        }
    }

    fn record_checked(&self, kind: StageKind, code: &str) {
        self.checked.lock().push((kind, code.to_string()));
    }
}

#[async_trait]
impl CodeGenerator for ScriptedCapabilities {
    async fn generate(&self, _task: &str, feedback: &[String]) -> anyhow::Result<Value> {
        self.feedback_log.lock().push(feedback.to_vec());
        self.answer(StageKind::Generate).await
    }
}

#[async_trait]
impl SyntaxChecker for ScriptedCapabilities {
    async fn check_syntax(&self, code: &str) -> anyhow::Result<Value> {
        self.record_checked(StageKind::CheckSyntax, code);
        self.answer(StageKind::CheckSyntax).await
    }
}

#[async_trait]
impl ReferenceChecker for ScriptedCapabilities {
    async fn check_references(&self, code: &str) -> anyhow::Result<Value> {
        self.record_checked(StageKind::CheckReferences, code);
        self.answer(StageKind::CheckReferences).await
    }
}

#[async_trait]
impl CodeReviewer for ScriptedCapabilities {
    async fn review(&self, code: &str, _task: &str) -> anyhow::Result<Value> {
        self.record_checked(StageKind::Review, code);
        self.answer(StageKind::Review).await
    }
}

/// Builders for raw capability responses.
pub mod responses {
    use crate::core::StageKind;
    use serde_json::{json, Value};

    /// The default passing response for the `call`-th call of a capability.
    #[must_use]
    pub fn passing(kind: StageKind, call: usize) -> Value {
        match kind {
            StageKind::Generate => code(&format!("def solution():\n    return {call}")),
            StageKind::CheckSyntax => syntax_valid(),
            StageKind::CheckReferences => references_verified(),
            StageKind::Review => review("Looks correct.", Some(8.0)),
        }
    }

    /// A successful generation.
    #[must_use]
    pub fn code(code: &str) -> Value {
        json!({"status": "success", "code": code})
    }

    /// A generation error.
    #[must_use]
    pub fn generation_error(message: &str) -> Value {
        json!({"status": "error", "error": message})
    }

    /// A passing syntax check.
    #[must_use]
    pub fn syntax_valid() -> Value {
        json!({"status": "SYNTAX_VALID"})
    }

    /// A failing syntax check with `(line, issue)` errors.
    #[must_use]
    pub fn syntax_errors(errors: &[(u64, &str)]) -> Value {
        let errors: Vec<Value> = errors
            .iter()
            .map(|(line, issue)| json!({"line": line, "issue": issue}))
            .collect();
        json!({"status": "SYNTAX_ERROR", "errors": errors})
    }

    /// A failing syntax check that proposes `corrected` as the fix.
    #[must_use]
    pub fn syntax_corrected(errors: &[(u64, &str)], corrected: &str) -> Value {
        let mut response = syntax_errors(errors);
        response["corrected_code"] = json!(corrected);
        response
    }

    /// A passing reference check.
    #[must_use]
    pub fn references_verified() -> Value {
        json!({"status": "VERIFIED"})
    }

    /// A reference check flagging the given names.
    #[must_use]
    pub fn references_flagged(referenced: &[&str]) -> Value {
        let flagged: Vec<Value> = referenced
            .iter()
            .map(|name| json!({"type": "Library", "referenced": name}))
            .collect();
        json!({"status": "HALLUCINATION_DETECTED", "hallucinations": flagged})
    }

    /// A successful review.
    #[must_use]
    pub fn review(text: &str, score: Option<f64>) -> Value {
        json!({"status": "success", "review": text, "score": score})
    }

    /// A response no capability shape accepts.
    #[must_use]
    pub fn malformed() -> Value {
        json!({"unexpected": true})
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_queue_then_default() {
        let script = ScriptedCapabilities::new()
            .respond(StageKind::CheckSyntax, responses::syntax_errors(&[(1, "bad")]))
            .fail_transport(StageKind::CheckSyntax, "reset");

        let first = script.check_syntax("x").await.unwrap();
        assert_eq!(first["status"], "SYNTAX_ERROR");
        assert!(script.check_syntax("x").await.is_err());
        let third = script.check_syntax("y").await.unwrap();
        assert_eq!(third, responses::syntax_valid());

        assert_eq!(script.call_count(StageKind::CheckSyntax), 3);
        assert_eq!(script.remaining(StageKind::CheckSyntax), 0);
        assert_eq!(script.checked_code().len(), 3);
    }

    #[tokio::test]
    async fn test_generation_records_feedback() {
        let script = ScriptedCapabilities::new();
        script.generate("t", &[]).await.unwrap();
        let second = script.generate("t", &["Line 1: bad".to_string()]).await.unwrap();

        assert_eq!(second["code"], "def solution():\n    return 2");
        assert_eq!(
            script.feedback_log(),
            vec![Vec::<String>::new(), vec!["Line 1: bad".to_string()]]
        );
    }
}
