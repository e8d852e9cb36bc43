//! Uniform embedding provider capability (spec §4.6).

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::error::Result;

/// Identifies which provider implementation is in use, for status/config
/// reporting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ProviderKind {
    Local,
    Local4b,
    Gemini,
    Mistral,
    Openai,
}

impl std::fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProviderKind::Local => write!(f, "local"),
            ProviderKind::Local4b => write!(f, "local-4b"),
            ProviderKind::Gemini => write!(f, "gemini"),
            ProviderKind::Mistral => write!(f, "mistral"),
            ProviderKind::Openai => write!(f, "openai"),
        }
    }
}

/// Progress callback invoked during model load / credential check.
pub type ProgressCallback = Arc<dyn Fn(&str) + Send + Sync>;

/// Options accompanying an `embed` call.
#[derive(Debug, Clone, Default)]
pub struct EmbedOptions {
    /// Override the provider's default per-request batch size.
    pub batch_size: Option<usize>,
}

/// Uniform capability exposed by every embedding backend, local or remote.
///
/// `embed` returns one `Option<Vec<f32>>` per input text, in input order;
/// `None` marks a definitively failed text rather than aborting the whole
/// call. `embed_single` is a convenience that throws on failure.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Constant per provider+model.
    fn dimensions(&self) -> usize;

    fn kind(&self) -> ProviderKind;

    /// Eager model load (local) or credential check (remote).
    async fn initialize(&self, progress_cb: Option<ProgressCallback>) -> Result<()>;

    /// Parallel list; `None` entries indicate a definitively failed text.
    async fn embed(&self, texts: Vec<String>, options: EmbedOptions) -> Result<Vec<Option<Vec<f32>>>>;

    /// Throws on failure instead of returning `None`.
    async fn embed_single(&self, text: &str) -> Result<Vec<f32>> {
        let mut results = self.embed(vec![text.to_string()], EmbedOptions::default()).await?;
        results
            .pop()
            .flatten()
            .ok_or_else(|| crate::error::SearchError::ProviderUnavailable("embedding failed for single text".into()))
    }

    async fn close(&self) -> Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn provider_kind_display() {
        assert_eq!(ProviderKind::Local.to_string(), "local");
        assert_eq!(ProviderKind::Local4b.to_string(), "local-4b");
        assert_eq!(ProviderKind::Openai.to_string(), "openai");
    }
}
