//! Event sink system for observability.
//!
//! The pipeline state machine reports every transition through an injected
//! [`EventSink`]; the event type names live in [`kinds`].

mod sink;

pub use sink::{CollectingEventSink, EventSink, LoggingEventSink, NoOpEventSink};

/// Event type names emitted by the pipeline.
pub mod kinds {
    /// A run was accepted and is about to enter its first stage.
    pub const PIPELINE_STARTED: &str = "pipeline.started";
    /// A run reached `completed` or `partially_completed`.
    pub const PIPELINE_COMPLETED: &str = "pipeline.completed";
    /// A run reached `failed`.
    pub const PIPELINE_FAILED: &str = "pipeline.failed";
    /// An attempt finished and was recorded.
    pub const STAGE_ATTEMPT: &str = "stage.attempt";
    /// A stage will be attempted again with feedback.
    pub const STAGE_RETRY: &str = "stage.retry";
    /// A stage passed and the pipeline moved on.
    pub const STAGE_ADVANCED: &str = "stage.advanced";
    /// An advisory stage gave up; the pipeline moved on without it.
    pub const STAGE_DEGRADED: &str = "stage.degraded";
}
