//! Generation backend configuration.
//!
//! Configuration comes from environment variables with defaults from
//! [`notegen_core::defaults`]; callers may override fields with the
//! `with_*` setters (the CLI does this for its flags).

use serde::{Deserialize, Serialize};
use tracing::debug;

use notegen_core::{defaults, Error, Result};

/// Settings for the Ollama chat backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OllamaConfig {
    /// Base URL of the Ollama server, without trailing slash.
    pub base_url: String,
    /// Model used for generation.
    pub gen_model: String,
    /// Per-request timeout.
    pub timeout_secs: u64,
}

impl Default for OllamaConfig {
    fn default() -> Self {
        Self {
            base_url: defaults::OLLAMA_URL.to_string(),
            gen_model: defaults::GEN_MODEL.to_string(),
            timeout_secs: defaults::GEN_TIMEOUT_SECS,
        }
    }
}

impl OllamaConfig {
    /// Create config from environment variables (with defaults).
    ///
    /// | Variable | Default | Description |
    /// |----------|---------|-------------|
    /// | `OLLAMA_BASE` | `http://127.0.0.1:11434` | Server URL |
    /// | `OLLAMA_GEN_MODEL` | `llama3.1:8b` | Generation model |
    /// | `NOTEGEN_GEN_TIMEOUT_SECS` | `120` | Request timeout |
    pub fn from_env() -> Self {
        let base_url =
            std::env::var("OLLAMA_BASE").unwrap_or_else(|_| defaults::OLLAMA_URL.to_string());
        let gen_model =
            std::env::var("OLLAMA_GEN_MODEL").unwrap_or_else(|_| defaults::GEN_MODEL.to_string());
        let timeout_secs = std::env::var("NOTEGEN_GEN_TIMEOUT_SECS")
            .ok()
            .and_then(|v| v.parse::<u64>().ok())
            .unwrap_or(defaults::GEN_TIMEOUT_SECS);

        let config = Self::default()
            .with_base_url(base_url)
            .with_model(gen_model)
            .with_timeout(timeout_secs);
        debug!(base_url = %config.base_url, model = %config.gen_model, "Ollama config loaded");
        config
    }

    /// Set the server URL. A trailing slash is dropped.
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into().trim_end_matches('/').to_string();
        self
    }

    /// Set the generation model.
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.gen_model = model.into();
        self
    }

    /// Set the request timeout.
    pub fn with_timeout(mut self, secs: u64) -> Self {
        self.timeout_secs = secs;
        self
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<()> {
        if !(self.base_url.starts_with("http://") || self.base_url.starts_with("https://")) {
            return Err(Error::Config(format!(
                "base_url must be an http(s) URL: {}",
                self.base_url
            )));
        }
        if self.gen_model.trim().is_empty() {
            return Err(Error::Config("gen_model must not be empty".into()));
        }
        if self.timeout_secs == 0 {
            return Err(Error::Config("timeout_secs must be greater than 0".into()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = OllamaConfig::default();
        assert_eq!(config.base_url, "http://127.0.0.1:11434");
        assert_eq!(config.timeout_secs, 120);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_trailing_slash_is_trimmed() {
        let config = OllamaConfig::default().with_base_url("http://gpu-box:11434/");
        assert_eq!(config.base_url, "http://gpu-box:11434");
    }

    #[test]
    fn test_validate_rejects_non_http_url() {
        let config = OllamaConfig::default().with_base_url("gpu-box:11434");
        assert!(matches!(config.validate(), Err(Error::Config(_))));
    }

    #[test]
    fn test_validate_rejects_empty_model() {
        let config = OllamaConfig::default().with_model("  ");
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_zero_timeout() {
        let config = OllamaConfig::default().with_timeout(0);
        assert!(config.validate().is_err());
    }
}
