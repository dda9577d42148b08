//! Collaborator traits the batch orchestrator is built against.
//!
//! The orchestrator receives implementations of these at construction time;
//! nothing is looked up from ambient state.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::models::{DocumentFile, ProcessingStats};

// =============================================================================
// DOCUMENT STORE
// =============================================================================

/// Read/write access to the documents a batch operates on.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Read a document's full content.
    async fn read(&self, path: &str) -> Result<String>;

    /// Replace a document's full content.
    async fn write(&self, path: &str, content: &str) -> Result<()>;

    /// Enumerate all documents.
    async fn list(&self) -> Result<Vec<DocumentFile>>;
}

// =============================================================================
// TEXT GENERATION
// =============================================================================

/// Input to a text generator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenerationRequest {
    /// Optional system instructions.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub system: Option<String>,
    /// The user prompt.
    pub prompt: String,
}

impl GenerationRequest {
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            system: None,
            prompt: prompt.into(),
        }
    }

    pub fn with_system(mut self, system: impl Into<String>) -> Self {
        self.system = Some(system.into());
        self
    }
}

/// Text produced by a generator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GeneratedText {
    pub content: String,
}

impl GeneratedText {
    pub fn new(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
        }
    }
}

/// Backend for text generation (LLM). One instance per transform step.
#[async_trait]
pub trait TextGenerator: Send + Sync {
    /// Generate text for the request. May fail; callers retry.
    async fn generate(&self, request: &GenerationRequest) -> Result<GeneratedText>;

    /// Get the model name being used.
    fn model_name(&self) -> &str;
}

// =============================================================================
// STATS SINK
// =============================================================================

/// Append-only persistence of completed-run summaries.
#[async_trait]
pub trait StatsSink: Send + Sync {
    /// Record a completed run.
    async fn append(&self, stats: ProcessingStats) -> Result<()>;

    /// Past runs, oldest first.
    async fn list(&self) -> Result<Vec<ProcessingStats>>;
}
