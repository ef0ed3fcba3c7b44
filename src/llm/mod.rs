//! LLM integration.
//!
//! The pipeline only talks to `LlmProvider`. The concrete backend is an
//! OpenAI-compatible chat-completions client, which is what the decision
//! step's function-calling contract is written against.

pub mod openai;
pub mod provider;

pub use openai::OpenAiProvider;
pub use provider::*;

use std::sync::Arc;

use crate::config::require_secret;
use crate::error::ConfigError;

/// Default model for every LLM call the pipeline makes.
pub const DEFAULT_MODEL: &str = "gpt-4o-mini";

/// Default API base URL.
pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

/// Configuration for creating an LLM provider.
#[derive(Debug, Clone)]
pub struct LlmConfig {
    pub api_key: secrecy::SecretString,
    pub model: String,
    pub base_url: String,
}

impl LlmConfig {
    /// Build from `OPENAI_API_KEY`, `TRIAGE_MODEL` and `TRIAGE_LLM_BASE_URL`.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let api_key = require_secret("OPENAI_API_KEY", &lookup)?;
        let model = lookup("TRIAGE_MODEL")
            .filter(|m| !m.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_MODEL.to_string());
        let base_url = lookup("TRIAGE_LLM_BASE_URL")
            .filter(|u| !u.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_BASE_URL.to_string());
        Ok(Self {
            api_key,
            model,
            base_url,
        })
    }
}

/// Create an LLM provider from configuration.
pub fn create_provider(config: &LlmConfig) -> Arc<dyn LlmProvider> {
    tracing::info!("Using OpenAI-compatible provider (model: {})", config.model);
    Arc::new(OpenAiProvider::new(
        config.api_key.clone(),
        &config.base_url,
        config.model.clone(),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_provider_uses_configured_model() {
        let config = LlmConfig {
            api_key: secrecy::SecretString::from("sk-test"),
            model: "gpt-4o".to_string(),
            base_url: DEFAULT_BASE_URL.to_string(),
        };
        let provider = create_provider(&config);
        assert_eq!(provider.model_name(), "gpt-4o");
    }

    #[test]
    fn config_defaults_model_and_base_url() {
        let config = LlmConfig::from_lookup(|key: &str| {
            (key == "OPENAI_API_KEY").then(|| "sk-test".to_string())
        })
        .unwrap();
        assert_eq!(config.model, DEFAULT_MODEL);
        assert_eq!(config.base_url, DEFAULT_BASE_URL);
    }

    #[test]
    fn config_requires_api_key() {
        let err = LlmConfig::from_lookup(|_: &str| None).unwrap_err();
        assert!(matches!(err, ConfigError::MissingEnvVar(_)));
    }
}
