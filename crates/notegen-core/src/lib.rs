//! # notegen-core
//!
//! Core types, traits, and abstractions for notegen.
//!
//! This crate provides the batch data model, the crate-wide error type, the
//! event bus observers subscribe to, and the collaborator traits the batch
//! orchestrator is built against (document store, text generator, stats sink).

pub mod defaults;
pub mod error;
pub mod events;
pub mod logging;
pub mod models;
pub mod traits;

// Re-export commonly used types at crate root
pub use error::{Error, Result};
pub use events::{BatchEvent, EventBus, EventEnvelope, EventKind, SubscriptionId};
pub use models::*;
pub use traits::*;
