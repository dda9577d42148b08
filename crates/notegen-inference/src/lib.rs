//! # notegen-inference
//!
//! Text generation backends for notegen transform steps.
//!
//! This crate provides:
//! - Ollama chat backend (default, feature `ollama`)
//! - Deterministic mock backend for tests
//!
//! # Example
//!
//! ```rust,no_run
//! use notegen_core::{GenerationRequest, TextGenerator};
//! use notegen_inference::{OllamaConfig, OllamaGenerator};
//!
//! #[tokio::main]
//! async fn main() {
//!     let generator = OllamaGenerator::new(OllamaConfig::from_env()).unwrap();
//!     let text = generator
//!         .generate(&GenerationRequest::new("Suggest three tags for a note on Rust"))
//!         .await
//!         .unwrap();
//!     println!("{}", text.content);
//! }
//! ```

pub mod config;

#[cfg(feature = "ollama")]
pub mod ollama;

pub mod mock;

pub use config::OllamaConfig;

#[cfg(feature = "ollama")]
pub use ollama::OllamaGenerator;

pub use mock::{MockCall, MockGenerator};
