//! Project configuration (spec §6, `config.json`).

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::{CoreError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EmbeddingProviderKind {
    Local,
    Local4b,
    Gemini,
    Mistral,
    Openai,
}

impl Default for EmbeddingProviderKind {
    fn default() -> Self {
        EmbeddingProviderKind::Local
    }
}

impl EmbeddingProviderKind {
    pub fn is_remote(&self) -> bool {
        !matches!(self, EmbeddingProviderKind::Local | EmbeddingProviderKind::Local4b)
    }

    pub fn default_dimensions(&self) -> usize {
        match self {
            EmbeddingProviderKind::Local => 1024,
            EmbeddingProviderKind::Local4b => 2560,
            EmbeddingProviderKind::Gemini => 768,
            EmbeddingProviderKind::Mistral => 1024,
            EmbeddingProviderKind::Openai => 1536,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WatchConfig {
    pub enabled: bool,
    pub debounce_ms: u64,
    pub batch_window_ms: u64,
    pub await_write_finish: bool,
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            debounce_ms: 500,
            batch_window_ms: 2000,
            await_write_finish: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProjectConfig {
    pub embedding_provider: EmbeddingProviderKind,
    pub embedding_model: Option<String>,
    pub embedding_dimensions: Option<usize>,
    pub api_key: Option<String>,
    pub openai_base_url: Option<String>,
    pub extensions: Vec<String>,
    pub chunk_max_size: usize,
    pub watch: WatchConfig,
}

impl Default for ProjectConfig {
    fn default() -> Self {
        Self {
            embedding_provider: EmbeddingProviderKind::default(),
            embedding_model: None,
            embedding_dimensions: None,
            api_key: None,
            openai_base_url: None,
            extensions: Vec::new(),
            chunk_max_size: 4000,
            watch: WatchConfig::default(),
        }
    }
}

impl ProjectConfig {
    pub fn load(path: &Path) -> Result<Option<Self>> {
        if !path.is_file() {
            return Ok(None);
        }
        let raw = std::fs::read_to_string(path)?;
        Ok(Some(serde_json::from_str(&raw)?))
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        Ok(())
    }

    pub fn effective_dimensions(&self) -> usize {
        self.embedding_dimensions.unwrap_or_else(|| self.embedding_provider.default_dimensions())
    }

    /// Validate that a remote provider has credentials before the daemon
    /// tries to use it. Missing config is fatal: callers must run `init`.
    pub fn validate(&self) -> Result<()> {
        if self.embedding_provider.is_remote() && self.api_key.is_none() {
            return Err(CoreError::InvalidConfig(format!(
                "embeddingProvider '{:?}' requires an apiKey",
                self.embedding_provider
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn default_config_is_valid() {
        assert!(ProjectConfig::default().validate().is_ok());
    }

    #[test]
    fn remote_provider_without_key_is_invalid() {
        let mut cfg = ProjectConfig::default();
        cfg.embedding_provider = EmbeddingProviderKind::Openai;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn remote_provider_with_key_is_valid() {
        let mut cfg = ProjectConfig::default();
        cfg.embedding_provider = EmbeddingProviderKind::Openai;
        cfg.api_key = Some("sk-test".into());
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn round_trip_save_load() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.json");
        let cfg = ProjectConfig::default();
        cfg.save(&path).unwrap();

        let loaded = ProjectConfig::load(&path).unwrap().unwrap();
        assert_eq!(loaded.chunk_max_size, cfg.chunk_max_size);
    }

    #[test]
    fn missing_config_returns_none() {
        let dir = TempDir::new().unwrap();
        assert!(ProjectConfig::load(&dir.path().join("config.json")).unwrap().is_none());
    }

    #[test]
    fn effective_dimensions_falls_back_to_provider_default() {
        let cfg = ProjectConfig::default();
        assert_eq!(cfg.effective_dimensions(), 1024);
    }
}
