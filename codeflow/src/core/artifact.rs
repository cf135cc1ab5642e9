//! The code artifact carried between stages.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Code produced by the generation capability and refined across stages.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Artifact {
    /// The code text.
    pub content: String,

    /// Name of the stage that produced this version.
    pub produced_by: String,

    /// Dependencies the generator declared for this code.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub dependencies: Vec<String>,
}

impl Artifact {
    /// Creates a new artifact.
    #[must_use]
    pub fn new(content: impl Into<String>, produced_by: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            produced_by: produced_by.into(),
            dependencies: Vec::new(),
        }
    }

    /// Sets the declared dependencies.
    #[must_use]
    pub fn with_dependencies(mut self, dependencies: Vec<String>) -> Self {
        self.dependencies = dependencies;
        self
    }

    /// Returns the SHA-256 hex digest of the content.
    ///
    /// Identifies which version of the code an attempt operated on.
    #[must_use]
    pub fn digest(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.content.as_bytes());
        hex::encode(hasher.finalize())
    }

    /// Returns true if the content is empty or whitespace-only.
    #[must_use]
    pub fn is_blank(&self) -> bool {
        self.content.trim().is_empty()
    }
}
