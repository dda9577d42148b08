//! # notegen-jobs
//!
//! Batch processing of AI transform steps over a set of documents.
//!
//! This crate provides:
//! - Chunked scheduling: chunks run sequentially, files within a chunk
//!   concurrently, with a cooldown between chunks
//! - Bounded per-file retries
//! - Pause/resume that gates the start of the next chunk
//! - Live progress and ETA, published on the [`EventBus`]
//! - A terminal [`ProcessingStats`] summary handed to a [`StatsSink`]
//!
//! ## Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use notegen_jobs::{BatchOrchestrator, BatchRequest, EventKind};
//! use notegen_store::{FsDocumentStore, MemoryStatsSink};
//! use notegen_inference::OllamaGenerator;
//!
//! let store = Arc::new(FsDocumentStore::new("/path/to/vault"));
//! let orchestrator = BatchOrchestrator::builder(store.clone())
//!     .with_front_matter_generator(Arc::new(OllamaGenerator::from_env()?))
//!     .with_stats_sink(Arc::new(MemoryStatsSink::new()))
//!     .build();
//!
//! orchestrator.events().on(EventKind::Progress, |event| println!("{:?}", event.payload));
//!
//! let files = orchestrator.list_documents().await?;
//! let outcome = orchestrator.process(BatchRequest::new(files, true, false)).await?;
//! println!("{} processed, {} failed", outcome.stats.processed_files, outcome.stats.error_files);
//! ```

pub mod orchestrator;
pub mod pause;
pub mod progress;
pub mod retry;
pub mod scheduler;
pub mod state;
pub mod stats;
pub mod steps;

// Re-export core types
pub use notegen_core::*;

pub use orchestrator::{BatchOrchestrator, BatchOrchestratorBuilder};
pub use pause::{PauseGate, ShutdownSignal};
pub use progress::ProgressTracker;
pub use retry::{Attempted, RetryExhausted, RetryableStep};
pub use scheduler::{ChunkObserver, ChunkScheduler};
pub use state::ProcessingStateMachine;
pub use stats::StatsAggregator;
pub use steps::{
    FileTransform, FrontMatterStep, LinkTransform, StepOutcome, StepPipeline, WikilinkStep,
};
