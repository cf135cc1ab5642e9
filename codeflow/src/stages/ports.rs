//! Capability ports the stages delegate to.
//!
//! Each capability is a narrow async trait returning the raw JSON response
//! of the external service. Transport failures are `Err`; everything else is
//! interpreted by the response normalizer.

use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;

/// Produces code from a task description, optionally guided by feedback.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait CodeGenerator: Send + Sync {
    /// Generates code for `task`.
    ///
    /// `feedback` holds every error detail accumulated for the current stage,
    /// oldest first; it is empty on a first attempt.
    async fn generate(&self, task: &str, feedback: &[String]) -> anyhow::Result<Value>;
}

/// Checks code for syntax errors.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait SyntaxChecker: Send + Sync {
    /// Checks the syntax of `code`.
    async fn check_syntax(&self, code: &str) -> anyhow::Result<Value>;
}

/// Verifies that imports and API references in code exist.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ReferenceChecker: Send + Sync {
    /// Verifies the references used by `code`.
    async fn check_references(&self, code: &str) -> anyhow::Result<Value>;
}

/// Reviews code against the task it was written for.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait CodeReviewer: Send + Sync {
    /// Reviews `code`.
    async fn review(&self, code: &str, task: &str) -> anyhow::Result<Value>;
}

/// The set of capabilities a pipeline runs against.
///
/// Cheap to clone and safe to share between concurrently running pipelines.
#[derive(Clone)]
pub struct Capabilities {
    /// Code generation.
    pub generator: Arc<dyn CodeGenerator>,
    /// Syntax validation.
    pub syntax: Arc<dyn SyntaxChecker>,
    /// Reference verification.
    pub references: Arc<dyn ReferenceChecker>,
    /// Code review.
    pub reviewer: Arc<dyn CodeReviewer>,
}

impl Capabilities {
    /// Bundles the four capabilities.
    #[must_use]
    pub fn new(
        generator: Arc<dyn CodeGenerator>,
        syntax: Arc<dyn SyntaxChecker>,
        references: Arc<dyn ReferenceChecker>,
        reviewer: Arc<dyn CodeReviewer>,
    ) -> Self {
        Self {
            generator,
            syntax,
            references,
            reviewer,
        }
    }

    /// Uses one object for every capability.
    #[must_use]
    pub fn from_shared<T>(shared: Arc<T>) -> Self
    where
        T: CodeGenerator + SyntaxChecker + ReferenceChecker + CodeReviewer + 'static,
    {
        Self {
            generator: shared.clone(),
            syntax: shared.clone(),
            references: shared.clone(),
            reviewer: shared,
        }
    }
}

impl std::fmt::Debug for Capabilities {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Capabilities").finish_non_exhaustive()
    }
}
