//! Analyzer configuration
//!
//! Every field has a default, so an empty (or absent) YAML file is valid.
//! API keys are never read from the file; the CLI takes them from
//! `OPENAI_API_KEY`.

use crate::pipeline::DEFAULT_CHUNK_SIZE;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

/// Default cap on live categories per contract.
pub const DEFAULT_MAX_CATEGORIES: usize = 20;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid YAML: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("invalid config: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalyzerConfig {
    /// Target chunk size in characters
    pub chunk_size: usize,
    /// Maximum live categories per contract
    pub max_categories: usize,
    pub extraction_temperature: f32,
    pub explanation_temperature: f32,
    pub answer_temperature: f32,
    pub email_temperature: f32,
    /// Chat model used for every completion
    pub chat_model: String,
    /// Embedding model; must not change during one contract's lifetime
    pub embedding_model: String,
    /// Base URL of an OpenAI-compatible API
    pub api_base_url: String,
    /// Inputs longer than this are rejected by the embedder
    pub embedding_max_input_chars: usize,
    pub request_timeout_secs: u64,
}

impl Default for AnalyzerConfig {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            max_categories: DEFAULT_MAX_CATEGORIES,
            extraction_temperature: 0.1,
            explanation_temperature: 0.1,
            answer_temperature: 0.1,
            email_temperature: 0.4,
            chat_model: "gpt-4o-mini".to_string(),
            embedding_model: "text-embedding-3-small".to_string(),
            api_base_url: "https://api.openai.com/v1".to_string(),
            embedding_max_input_chars: 8000,
            request_timeout_secs: 120,
        }
    }
}

impl AnalyzerConfig {
    /// Parse and validate a YAML document.
    pub fn from_yaml_str(yaml: &str) -> Result<Self, ConfigError> {
        let config: Self = if yaml.trim().is_empty() {
            Self::default()
        } else {
            serde_yaml::from_str(yaml)?
        };
        config.validate()?;
        Ok(config)
    }

    /// Load and validate a YAML config file.
    pub fn from_yaml_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let yaml = std::fs::read_to_string(path)?;
        Self::from_yaml_str(&yaml)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.chunk_size == 0 {
            return Err(ConfigError::Invalid("chunk_size must be positive".into()));
        }
        if self.embedding_max_input_chars == 0 {
            return Err(ConfigError::Invalid(
                "embedding_max_input_chars must be positive".into(),
            ));
        }
        for (name, value) in [
            ("extraction_temperature", self.extraction_temperature),
            ("explanation_temperature", self.explanation_temperature),
            ("answer_temperature", self.answer_temperature),
            ("email_temperature", self.email_temperature),
        ] {
            if !(0.0..=2.0).contains(&value) {
                return Err(ConfigError::Invalid(format!(
                    "{} must be within [0, 2], got {}",
                    name, value
                )));
            }
        }
        Ok(())
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}
