//! Embedding provider implementations and the factory that selects one
//! from project configuration (spec §4.6).

pub mod gemini;
pub mod local;
pub mod mistral;
pub mod openai;
pub mod provider;

use std::sync::Arc;

use viberag_core::config::{EmbeddingProviderKind, ProjectConfig};

pub use provider::{EmbedOptions, EmbeddingProvider, ProgressCallback, ProviderKind};

use crate::error::{Result, SearchError};
use gemini::{GeminiConfig, GeminiProvider};
use local::{LocalModelSpec, LocalProvider};
use mistral::{MistralConfig, MistralProvider};
use openai::{OpenAIConfig, OpenAIProvider};

/// Build the configured embedding provider. Remote providers are validated
/// (credential shape) eagerly; callers should still call `initialize` before
/// the first `embed` to surface connectivity failures early.
pub fn build_provider(config: &ProjectConfig) -> Result<Arc<dyn EmbeddingProvider>> {
    let dimensions = config.effective_dimensions();

    match config.embedding_provider {
        EmbeddingProviderKind::Local => Ok(Arc::new(LocalProvider::new(LocalModelSpec::qwen3_0_6b())?)),
        EmbeddingProviderKind::Local4b => Ok(Arc::new(LocalProvider::new(LocalModelSpec::qwen3_4b())?)),
        EmbeddingProviderKind::Gemini => {
            let api_key = require_api_key(config, "gemini")?;
            let model = config.embedding_model.clone().unwrap_or_else(|| "text-embedding-004".to_string());
            Ok(Arc::new(GeminiProvider::new(GeminiConfig::new(api_key, model, dimensions))?))
        }
        EmbeddingProviderKind::Mistral => {
            let api_key = require_api_key(config, "mistral")?;
            let model = config.embedding_model.clone().unwrap_or_else(|| "mistral-embed".to_string());
            Ok(Arc::new(MistralProvider::new(MistralConfig::new(api_key, model, dimensions))?))
        }
        EmbeddingProviderKind::Openai => {
            let api_key = require_api_key(config, "openai")?;
            let model = config.embedding_model.clone().unwrap_or_else(|| "text-embedding-3-small".to_string());
            let mut openai_cfg = OpenAIConfig::new(api_key, model, dimensions);
            if let Some(base_url) = &config.openai_base_url {
                openai_cfg.base_url = base_url.clone();
            }
            Ok(Arc::new(OpenAIProvider::new(openai_cfg)?))
        }
    }
}

fn require_api_key(config: &ProjectConfig, provider_name: &str) -> Result<String> {
    config
        .api_key
        .clone()
        .ok_or_else(|| SearchError::InvalidConfig(format!("{} requires an apiKey", provider_name)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn local_provider_needs_no_api_key() {
        let config = ProjectConfig { embedding_provider: EmbeddingProviderKind::Local, ..Default::default() };
        assert!(build_provider(&config).is_ok());
    }

    #[test]
    fn remote_provider_without_key_fails_to_build() {
        let config = ProjectConfig { embedding_provider: EmbeddingProviderKind::Openai, ..Default::default() };
        assert!(build_provider(&config).is_err());
    }

    #[test]
    fn remote_provider_with_key_builds() {
        let config = ProjectConfig {
            embedding_provider: EmbeddingProviderKind::Mistral,
            api_key: Some("test-key".into()),
            ..Default::default()
        };
        assert!(build_provider(&config).is_ok());
    }
}
