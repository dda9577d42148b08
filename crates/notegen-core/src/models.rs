//! Batch processing data model.
//!
//! These are plain data types shared by the orchestrator, its collaborators
//! and observers. `ProcessingStatus` is owned by the orchestrator during a
//! run; everything observers receive is a copy.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::defaults;
use crate::error::{Error, Result};

// =============================================================================
// OPTIONS
// =============================================================================

/// Options for a single batch run. Immutable once the run starts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessingOptions {
    /// Maximum number of files per chunk.
    pub chunk_size: usize,
    /// Cooldown after each chunk except the last.
    pub delay_between_chunks_ms: u64,
    /// Per-file retry budget.
    pub max_retries: u32,
    /// Fixed delay between retry attempts.
    pub retry_delay_ms: u64,
    /// Run the front matter step.
    pub generate_front_matter: bool,
    /// Run the wikilink step.
    pub generate_wikilinks: bool,
    /// Additional concurrency cap within a chunk.
    pub max_concurrent_processing: usize,
}

impl Default for ProcessingOptions {
    fn default() -> Self {
        Self {
            chunk_size: defaults::CHUNK_SIZE,
            delay_between_chunks_ms: defaults::CHUNK_DELAY_MS,
            max_retries: defaults::MAX_RETRIES,
            retry_delay_ms: defaults::RETRY_DELAY_MS,
            generate_front_matter: true,
            generate_wikilinks: false,
            max_concurrent_processing: defaults::MAX_CONCURRENT_PROCESSING,
        }
    }
}

impl ProcessingOptions {
    /// Create options from environment variables (with defaults).
    ///
    /// | Variable | Default | Description |
    /// |----------|---------|-------------|
    /// | `NOTEGEN_CHUNK_SIZE` | `5` | Files per chunk |
    /// | `NOTEGEN_CHUNK_DELAY_MS` | `1000` | Cooldown between chunks |
    /// | `NOTEGEN_MAX_RETRIES` | `3` | Per-file retry budget |
    /// | `NOTEGEN_RETRY_DELAY_MS` | `1000` | Delay between retries |
    /// | `NOTEGEN_MAX_CONCURRENT` | `3` | Concurrency cap within a chunk |
    pub fn from_env() -> Self {
        fn env_or<T: std::str::FromStr>(key: &str, default: T) -> T {
            std::env::var(key)
                .ok()
                .and_then(|v| v.parse::<T>().ok())
                .unwrap_or(default)
        }

        Self {
            chunk_size: env_or("NOTEGEN_CHUNK_SIZE", defaults::CHUNK_SIZE).max(1),
            delay_between_chunks_ms: env_or("NOTEGEN_CHUNK_DELAY_MS", defaults::CHUNK_DELAY_MS),
            max_retries: env_or("NOTEGEN_MAX_RETRIES", defaults::MAX_RETRIES),
            retry_delay_ms: env_or("NOTEGEN_RETRY_DELAY_MS", defaults::RETRY_DELAY_MS),
            max_concurrent_processing: env_or(
                "NOTEGEN_MAX_CONCURRENT",
                defaults::MAX_CONCURRENT_PROCESSING,
            )
            .max(1),
            ..Self::default()
        }
    }

    /// Set the chunk size.
    pub fn with_chunk_size(mut self, size: usize) -> Self {
        self.chunk_size = size;
        self
    }

    /// Set the cooldown between chunks.
    pub fn with_delay_between_chunks(mut self, ms: u64) -> Self {
        self.delay_between_chunks_ms = ms;
        self
    }

    /// Set the per-file retry budget.
    pub fn with_max_retries(mut self, retries: u32) -> Self {
        self.max_retries = retries;
        self
    }

    /// Set the delay between retry attempts.
    pub fn with_retry_delay(mut self, ms: u64) -> Self {
        self.retry_delay_ms = ms;
        self
    }

    /// Set the concurrency cap within a chunk.
    pub fn with_max_concurrent(mut self, max: usize) -> Self {
        self.max_concurrent_processing = max;
        self
    }

    /// Select which transform steps run.
    pub fn with_steps(mut self, front_matter: bool, wikilinks: bool) -> Self {
        self.generate_front_matter = front_matter;
        self.generate_wikilinks = wikilinks;
        self
    }

    /// Number of files allowed in flight at once.
    pub fn effective_concurrency(&self) -> usize {
        self.max_concurrent_processing.min(self.chunk_size).max(1)
    }

    /// Reject options the scheduler cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.chunk_size == 0 {
            return Err(Error::InvalidInput("chunk_size must be greater than 0".into()));
        }
        if self.max_concurrent_processing == 0 {
            return Err(Error::InvalidInput(
                "max_concurrent_processing must be greater than 0".into(),
            ));
        }
        Ok(())
    }
}

// =============================================================================
// STATE
// =============================================================================

/// Canonical processing state of an orchestrator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ProcessingState {
    #[default]
    Idle,
    Running,
    Paused,
    Error,
}

impl ProcessingState {
    /// Whether the state machine permits moving from `self` to `next`.
    ///
    /// `Paused -> Idle` is the completion transition for a batch whose last
    /// chunk was already in flight when it was paused.
    pub fn can_transition_to(self, next: ProcessingState) -> bool {
        use ProcessingState::{Idle, Paused, Running};
        matches!(
            (self, next),
            (Idle, Running)
                | (Running, Paused)
                | (Paused, Running)
                | (Running, Idle)
                | (Paused, Idle)
                | (Running, ProcessingState::Error)
                | (Paused, ProcessingState::Error)
                | (ProcessingState::Error, Idle)
        )
    }

    /// True while a batch is in progress.
    pub fn is_active(self) -> bool {
        matches!(self, ProcessingState::Running | ProcessingState::Paused)
    }
}

impl fmt::Display for ProcessingState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Idle => write!(f, "idle"),
            Self::Running => write!(f, "running"),
            Self::Paused => write!(f, "paused"),
            Self::Error => write!(f, "error"),
        }
    }
}

// =============================================================================
// STATUS
// =============================================================================

/// A recorded per-file failure.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessingError {
    pub file_path: String,
    pub error: String,
    pub timestamp: DateTime<Utc>,
    /// Retries spent before giving up.
    pub retry_count: u32,
}

/// Live snapshot of a batch in progress.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct ProcessingStatus {
    pub state: ProcessingState,
    pub files_queued: usize,
    /// Files attempted so far, successful or not.
    pub files_processed: usize,
    pub files_remaining: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_file: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start_time: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub estimated_time_remaining_ms: Option<f64>,
    /// Append-only during a run, reset when the next run starts.
    pub errors: Vec<ProcessingError>,
}

impl ProcessingStatus {
    /// Completion percentage in `[0, 100]`; 0 for an empty queue.
    pub fn percent_complete(&self) -> f64 {
        if self.files_queued == 0 {
            return 0.0;
        }
        (self.files_processed as f64 / self.files_queued as f64) * 100.0
    }
}

// =============================================================================
// RESULTS
// =============================================================================

/// Outcome of one file in one batch. Produced exactly once per file,
/// whatever the number of retries behind it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileProcessingResult {
    pub success: bool,
    pub path: String,
    pub front_matter_generated: bool,
    pub wikilinks_generated: bool,
    pub processing_time_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub retry_count: u32,
}

impl FileProcessingResult {
    pub fn succeeded(
        path: impl Into<String>,
        front_matter_generated: bool,
        wikilinks_generated: bool,
        processing_time_ms: u64,
        retry_count: u32,
    ) -> Self {
        Self {
            success: true,
            path: path.into(),
            front_matter_generated,
            wikilinks_generated,
            processing_time_ms,
            error: None,
            retry_count,
        }
    }

    pub fn failed(
        path: impl Into<String>,
        error: impl Into<String>,
        processing_time_ms: u64,
        retry_count: u32,
    ) -> Self {
        Self {
            success: false,
            path: path.into(),
            front_matter_generated: false,
            wikilinks_generated: false,
            processing_time_ms,
            error: Some(error.into()),
            retry_count,
        }
    }

    /// Successful, but no step changed the document.
    pub fn is_skipped(&self) -> bool {
        self.success && !self.front_matter_generated && !self.wikilinks_generated
    }
}

/// Terminal summary of one batch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessingStats {
    pub batch_id: Uuid,
    pub total_files: usize,
    pub processed_files: usize,
    pub error_files: usize,
    /// Successful files no step changed; included in `processed_files`.
    pub skipped_files: usize,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub average_processing_time_ms: f64,
}

impl ProcessingStats {
    /// Wall-clock duration of the batch.
    pub fn duration_ms(&self) -> i64 {
        (self.end_time - self.start_time).num_milliseconds()
    }
}

// =============================================================================
// DOCUMENTS & REQUESTS
// =============================================================================

/// A document reference as listed by a [`crate::DocumentStore`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DocumentFile {
    /// Store-relative path with `/` separators.
    pub path: String,
    /// File name without directory or extension.
    pub basename: String,
}

impl DocumentFile {
    /// Build a reference from a path, deriving the basename.
    pub fn new(path: impl Into<String>) -> Self {
        let path = path.into();
        let file_name = path.rsplit('/').next().unwrap_or(path.as_str());
        let basename = match file_name.rfind('.') {
            Some(idx) if idx > 0 => &file_name[..idx],
            _ => file_name,
        }
        .to_string();
        Self { path, basename }
    }
}

/// A request to process a batch of documents.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchRequest {
    pub files: Vec<DocumentFile>,
    pub generate_front_matter: bool,
    pub generate_wikilinks: bool,
    /// Overrides the orchestrator's default options. The step flags above
    /// take precedence over the ones carried here.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub options: Option<ProcessingOptions>,
}

impl BatchRequest {
    pub fn new(files: Vec<DocumentFile>, generate_front_matter: bool, generate_wikilinks: bool) -> Self {
        Self {
            files,
            generate_front_matter,
            generate_wikilinks,
            options: None,
        }
    }

    pub fn with_options(mut self, options: ProcessingOptions) -> Self {
        self.options = Some(options);
        self
    }

    /// Resolve the effective options against a default.
    pub fn resolve_options(&self, default: &ProcessingOptions) -> ProcessingOptions {
        self.options
            .clone()
            .unwrap_or_else(|| default.clone())
            .with_steps(self.generate_front_matter, self.generate_wikilinks)
    }

    /// Validate the request shape. Does not touch any state.
    pub fn validate(&self, default: &ProcessingOptions) -> Result<ProcessingOptions> {
        if self.files.is_empty() {
            return Err(Error::InvalidInput("files must not be empty".into()));
        }
        if let Some(file) = self.files.iter().find(|f| f.path.trim().is_empty()) {
            return Err(Error::InvalidInput(format!(
                "file with empty path (basename {:?})",
                file.basename
            )));
        }
        let options = self.resolve_options(default);
        options.validate()?;
        Ok(options)
    }
}

/// What `process` returns for a completed batch.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchOutcome {
    pub file_results: Vec<FileProcessingResult>,
    pub stats: ProcessingStats,
}
