//! Centralized default constants for notegen.
//!
//! **This module is the single source of truth** for shared default values.
//! Crates and the CLI reference these constants instead of defining their
//! own magic numbers.

// =============================================================================
// BATCH PROCESSING
// =============================================================================

/// Maximum number of files processed concurrently per chunk.
pub const CHUNK_SIZE: usize = 5;

/// Cooldown between chunks in milliseconds.
///
/// Keeps bursts against the generation backend spaced out.
pub const CHUNK_DELAY_MS: u64 = 1_000;

/// Per-file retry budget (retries, not attempts).
pub const MAX_RETRIES: u32 = 3;

/// Fixed delay between retry attempts in milliseconds.
pub const RETRY_DELAY_MS: u64 = 1_000;

/// Additional concurrency cap within a chunk.
pub const MAX_CONCURRENT_PROCESSING: usize = 3;

// =============================================================================
// EVENTS
// =============================================================================

/// Broadcast buffer for the event bus.
///
/// A batch emits roughly four events per file; receivers that fall further
/// behind than this observe `RecvError::Lagged`.
pub const EVENT_BUS_CAPACITY: usize = 256;

// =============================================================================
// STATS HISTORY
// =============================================================================

/// Number of past runs retained by the stats history file.
pub const STATS_HISTORY_LIMIT: usize = 100;

/// Debounce window for persisting the stats history (milliseconds).
pub const STATS_SAVE_DEBOUNCE_MS: u64 = 2_000;

/// File name of the stats history inside a vault's data directory.
pub const STATS_HISTORY_FILE: &str = "notegen-history.json";

// =============================================================================
// INFERENCE
// =============================================================================

/// Default Ollama endpoint.
pub const OLLAMA_URL: &str = "http://127.0.0.1:11434";

/// Default generation model.
pub const GEN_MODEL: &str = "llama3.1:8b";

/// Timeout for generation requests in seconds.
pub const GEN_TIMEOUT_SECS: u64 = 120;

// =============================================================================
// DOCUMENTS
// =============================================================================

/// File extension of documents picked up by the filesystem store.
pub const DOCUMENT_EXTENSION: &str = "md";
