//! Structured logging field name constants for notegen.
//!
//! All crates use these constants for consistent structured logging fields,
//! so log aggregation can query the same names across subsystems.
//!
//! ## Log Level Contract
//!
//! | Level | Usage |
//! |-------|-------|
//! | ERROR | Orchestration failure, the batch was aborted |
//! | WARN  | Recoverable issue: per-file failure, best-effort persistence failed |
//! | INFO  | Lifecycle events (batch start/complete, pause/resume, shutdown) |
//! | DEBUG | Chunk boundaries, retries, state transitions |
//! | TRACE | Per-file iteration, event emission |

// ─── Identity fields ───────────────────────────────────────────────────────

/// Batch UUID (UUIDv7, time-ordered).
pub const BATCH_ID: &str = "batch_id";

/// Subsystem originating the log event.
/// Values: "jobs", "store", "inference", "cli"
pub const SUBSYSTEM: &str = "subsystem";

/// Component within a subsystem.
/// Examples: "orchestrator", "scheduler", "retry", "ollama", "history"
pub const COMPONENT: &str = "component";

// ─── Entity fields ─────────────────────────────────────────────────────────

/// Vault-relative path of the document being processed.
pub const FILE_PATH: &str = "file_path";

/// Zero-based chunk index within a batch.
pub const CHUNK_INDEX: &str = "chunk_index";

/// Transform step name ("front_matter", "wikilinks").
pub const STEP: &str = "step";

// ─── Measurement fields ────────────────────────────────────────────────────

/// Wall-clock duration in milliseconds.
pub const DURATION_MS: &str = "duration_ms";

/// Number of files in a batch or chunk.
pub const FILE_COUNT: &str = "file_count";

/// Number of retries spent on a file.
pub const RETRY_COUNT: &str = "retry_count";

/// Byte length of a prompt.
pub const PROMPT_LEN: &str = "prompt_len";

/// Byte length of a model response.
pub const RESPONSE_LEN: &str = "response_len";

/// Every field name defined above, for schema checks.
pub const ALL_FIELDS: &[&str] = &[
    BATCH_ID,
    SUBSYSTEM,
    COMPONENT,
    FILE_PATH,
    CHUNK_INDEX,
    STEP,
    DURATION_MS,
    FILE_COUNT,
    RETRY_COUNT,
    PROMPT_LEN,
    RESPONSE_LEN,
];
