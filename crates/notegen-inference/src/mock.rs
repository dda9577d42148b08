//! Mock text generator for deterministic testing.
//!
//! ## Usage
//!
//! ```rust
//! use notegen_core::{GenerationRequest, TextGenerator};
//! use notegen_inference::mock::MockGenerator;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! let generator = MockGenerator::new()
//!     .with_fixed_response("title: Test")
//!     .fail_when_contains("Broken");
//!
//! let ok = generator.generate(&GenerationRequest::new("note Healthy")).await;
//! assert!(ok.is_ok());
//! let err = generator.generate(&GenerationRequest::new("note Broken")).await;
//! assert!(err.is_err());
//! assert_eq!(generator.call_count(), 2);
//! # }
//! ```

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;

use notegen_core::{Error, GeneratedText, GenerationRequest, Result, TextGenerator};

#[derive(Debug, Clone)]
struct MockConfig {
    model: String,
    default_response: String,
    responses: Vec<(String, String)>,
    fail_patterns: Vec<String>,
    fail_first: usize,
    latency: Duration,
}

impl Default for MockConfig {
    fn default() -> Self {
        Self {
            model: "mock-model".to_string(),
            default_response: "Mock response".to_string(),
            responses: Vec::new(),
            fail_patterns: Vec::new(),
            fail_first: 0,
            latency: Duration::ZERO,
        }
    }
}

/// A recorded call to the mock.
#[derive(Debug, Clone)]
pub struct MockCall {
    pub request: GenerationRequest,
    pub succeeded: bool,
}

/// Mock generator. Clones share configuration, counters and the call log.
#[derive(Clone, Default)]
pub struct MockGenerator {
    config: Arc<MockConfig>,
    calls: Arc<AtomicUsize>,
    call_log: Arc<Mutex<Vec<MockCall>>>,
}

impl MockGenerator {
    /// Create a new mock with default configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Response returned when no pattern matches.
    pub fn with_fixed_response(mut self, response: impl Into<String>) -> Self {
        Arc::make_mut(&mut self.config).default_response = response.into();
        self
    }

    /// Respond with `response` when the prompt contains `pattern`.
    pub fn with_response_for(
        mut self,
        pattern: impl Into<String>,
        response: impl Into<String>,
    ) -> Self {
        Arc::make_mut(&mut self.config)
            .responses
            .push((pattern.into(), response.into()));
        self
    }

    /// Fail every call whose prompt contains `pattern`.
    pub fn fail_when_contains(mut self, pattern: impl Into<String>) -> Self {
        Arc::make_mut(&mut self.config)
            .fail_patterns
            .push(pattern.into());
        self
    }

    /// Fail the first `n` calls, then behave normally.
    pub fn fail_first(mut self, n: usize) -> Self {
        Arc::make_mut(&mut self.config).fail_first = n;
        self
    }

    /// Simulated latency per call (tokio time, so paused clocks apply).
    pub fn with_latency(mut self, latency: Duration) -> Self {
        Arc::make_mut(&mut self.config).latency = latency;
        self
    }

    /// Name reported by [`TextGenerator::model_name`].
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        Arc::make_mut(&mut self.config).model = model.into();
        self
    }

    /// Number of calls made so far.
    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Snapshot of all calls made so far.
    pub fn calls(&self) -> Vec<MockCall> {
        self.call_log
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn respond(&self, call_index: usize, prompt: &str) -> Result<GeneratedText> {
        if call_index < self.config.fail_first {
            return Err(Error::Generation(format!(
                "mock failure {} of {}",
                call_index + 1,
                self.config.fail_first
            )));
        }
        if let Some(pattern) = self
            .config
            .fail_patterns
            .iter()
            .find(|p| prompt.contains(p.as_str()))
        {
            return Err(Error::Generation(format!("mock failure for {pattern:?}")));
        }
        let content = self
            .config
            .responses
            .iter()
            .find(|(pattern, _)| prompt.contains(pattern.as_str()))
            .map(|(_, response)| response.clone())
            .unwrap_or_else(|| self.config.default_response.clone());
        Ok(GeneratedText::new(content))
    }
}

#[async_trait]
impl TextGenerator for MockGenerator {
    async fn generate(&self, request: &GenerationRequest) -> Result<GeneratedText> {
        let call_index = self.calls.fetch_add(1, Ordering::SeqCst);
        if !self.config.latency.is_zero() {
            tokio::time::sleep(self.config.latency).await;
        }
        let result = self.respond(call_index, &request.prompt);
        self.call_log
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(MockCall {
                request: request.clone(),
                succeeded: result.is_ok(),
            });
        result
    }

    fn model_name(&self) -> &str {
        &self.config.model
    }
}
