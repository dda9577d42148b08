//! # notegen-store
//!
//! Persistence collaborators for the notegen batch orchestrator.
//!
//! This crate provides:
//! - [`FsDocumentStore`]: Markdown documents in a vault directory
//! - [`MemoryDocumentStore`]: in-memory documents for tests and embedding
//! - [`MemoryStatsSink`] and [`JsonStatsHistory`]: completed-run history
//! - [`Debouncer`]: coalesces bursts of mutations into a single save

pub mod debounce;
pub mod fs;
pub mod history;
pub mod memory;

pub use debounce::Debouncer;
pub use fs::FsDocumentStore;
pub use history::JsonStatsHistory;
pub use memory::{MemoryDocumentStore, MemoryStatsSink};
