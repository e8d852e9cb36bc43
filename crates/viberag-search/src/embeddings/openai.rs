//! OpenAI embedding provider (spec §4.6).
//!
//! `POST {base_url}/embeddings` with `{"model", "input": [...]}`, optional
//! region prefix (`us.`/`eu.`) folded into `base_url` by the caller.
//! Matryoshka-truncated `text-embedding-3-*` dimensions are honored via
//! the `dimensions` request field when the configured dimension differs
//! from the model's native one.

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use super::provider::{EmbedOptions, EmbeddingProvider, ProgressCallback, ProviderKind};
use crate::error::{Result, SearchError};

const DEFAULT_BATCH_SIZE: usize = 32;

#[derive(Debug, Clone)]
pub struct OpenAIConfig {
    pub base_url: String,
    pub api_key: String,
    pub model: String,
    pub dimensions: usize,
    pub timeout_secs: u64,
    pub batch_size: usize,
}

impl OpenAIConfig {
    pub fn new(api_key: impl Into<String>, model: impl Into<String>, dimensions: usize) -> Self {
        Self {
            base_url: "https://api.openai.com/v1".into(),
            api_key: api_key.into(),
            model: model.into(),
            dimensions,
            timeout_secs: 30,
            batch_size: DEFAULT_BATCH_SIZE,
        }
    }

    /// Validate the key format cheaply before the first request, per §4.6
    /// ("invalid key format is rejected before the first request when
    /// cheaply detectable").
    pub fn validate(&self) -> Result<()> {
        if self.api_key.trim().is_empty() {
            return Err(SearchError::InvalidConfig("openai apiKey is empty".into()));
        }
        if !self.api_key.starts_with("sk-") {
            return Err(SearchError::InvalidConfig(
                "openai apiKey does not look like a valid key (expected to start with 'sk-')".into(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Serialize)]
struct EmbeddingsRequest {
    model: String,
    input: Vec<String>,
    dimensions: usize,
}

#[derive(Debug, Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
    index: usize,
}

#[derive(Debug, Deserialize)]
struct EmbeddingsResponse {
    data: Vec<EmbeddingData>,
}

pub struct OpenAIProvider {
    client: Client,
    config: OpenAIConfig,
    detected_dim: AtomicUsize,
}

impl OpenAIProvider {
    pub fn new(config: OpenAIConfig) -> Result<Self> {
        config.validate()?;
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| SearchError::ProviderUnavailable(format!("HTTP client error: {}", e)))?;

        Ok(Self {
            client,
            config,
            detected_dim: AtomicUsize::new(0),
        })
    }

    fn embeddings_url(&self) -> String {
        let base = self.config.base_url.trim_end_matches('/');
        if base.ends_with("/v1") {
            format!("{}/embeddings", base)
        } else {
            format!("{}/v1/embeddings", base)
        }
    }

    async fn send_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let request_body = EmbeddingsRequest {
            model: self.config.model.clone(),
            input: texts.to_vec(),
            dimensions: self.config.dimensions,
        };

        let response = self
            .client
            .post(self.embeddings_url())
            .bearer_auth(&self.config.api_key)
            .json(&request_body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    SearchError::ProviderUnavailable("request timed out".into())
                } else {
                    SearchError::ProviderUnavailable(format!("request failed: {}", e))
                }
            })?;

        let status = response.status();
        match status {
            StatusCode::OK => {
                let parsed: EmbeddingsResponse = response
                    .json()
                    .await
                    .map_err(|e| SearchError::ProviderUnavailable(format!("invalid response: {}", e)))?;

                let mut ordered = vec![Vec::new(); parsed.data.len()];
                for item in parsed.data {
                    if let Some(slot) = ordered.get_mut(item.index) {
                        *slot = item.embedding;
                    }
                }

                if let Some(first) = ordered.first().filter(|v| !v.is_empty()) {
                    self.detected_dim.store(first.len(), Ordering::Relaxed);
                }

                Ok(ordered)
            }
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                let body = response.text().await.unwrap_or_default();
                Err(SearchError::ProviderAuth(format!("openai authentication failed: {}", body)))
            }
            StatusCode::TOO_MANY_REQUESTS => {
                let retry_after = response
                    .headers()
                    .get("Retry-After")
                    .and_then(|v| v.to_str().ok())
                    .and_then(|s| s.parse::<u64>().ok());
                Err(SearchError::RateLimited { retry_after_secs: retry_after })
            }
            StatusCode::BAD_REQUEST => {
                let body = response.text().await.unwrap_or_default();
                if body.contains("maximum context length") {
                    Err(SearchError::ContextLengthExceeded)
                } else {
                    Err(SearchError::ProviderUnavailable(format!("bad request: {}", body)))
                }
            }
            StatusCode::NOT_FOUND => {
                let base = &self.config.base_url;
                let hint = if base.contains("api.openai.com") {
                    String::new()
                } else {
                    format!(" (check region host: {})", base)
                };
                Err(SearchError::ProviderUnavailable(format!("model or endpoint not found{}", hint)))
            }
            _ => {
                let body = response.text().await.unwrap_or_default();
                Err(SearchError::ProviderUnavailable(format!("request failed with status {}: {}", status, body)))
            }
        }
    }
}

#[async_trait]
impl EmbeddingProvider for OpenAIProvider {
    fn dimensions(&self) -> usize {
        let detected = self.detected_dim.load(Ordering::Relaxed);
        if detected > 0 {
            detected
        } else {
            self.config.dimensions
        }
    }

    fn kind(&self) -> ProviderKind {
        ProviderKind::Openai
    }

    async fn initialize(&self, progress_cb: Option<ProgressCallback>) -> Result<()> {
        if let Some(cb) = &progress_cb {
            cb("checking openai credentials");
        }
        self.config.validate()?;
        // A single cheap call doubles as credential + region-host check.
        let _ = self.send_batch(&["ping".to_string()]).await?;
        Ok(())
    }

    async fn embed(&self, texts: Vec<String>, options: EmbedOptions) -> Result<Vec<Option<Vec<f32>>>> {
        if texts.is_empty() {
            return Ok(vec![]);
        }
        let batch_size = options.batch_size.unwrap_or(self.config.batch_size);
        let mut out = Vec::with_capacity(texts.len());

        for chunk in texts.chunks(batch_size) {
            match self.send_batch(chunk).await {
                Ok(vectors) => out.extend(vectors.into_iter().map(Some)),
                Err(SearchError::ContextLengthExceeded) => {
                    out.extend(chunk.iter().map(|_| None));
                }
                Err(e) => return Err(e),
            }
        }

        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn mock_response(dim: usize, count: usize) -> serde_json::Value {
        let data: Vec<serde_json::Value> = (0..count)
            .map(|i| serde_json::json!({"embedding": vec![0.1_f32; dim], "index": i}))
            .collect();
        serde_json::json!({"data": data})
    }

    fn config(server: &MockServer) -> OpenAIConfig {
        OpenAIConfig {
            base_url: server.uri(),
            api_key: "sk-test".into(),
            model: "text-embedding-3-small".into(),
            dimensions: 1536,
            timeout_secs: 5,
            batch_size: 32,
        }
    }

    #[test]
    fn rejects_malformed_key() {
        let cfg = OpenAIConfig::new("not-a-key", "m", 768);
        assert!(cfg.validate().is_err());
    }

    #[tokio::test]
    async fn embeds_successfully() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/embeddings"))
            .and(header("Authorization", "Bearer sk-test"))
            .respond_with(ResponseTemplate::new(200).set_body_json(mock_response(1536, 1)))
            .mount(&server)
            .await;

        let provider = OpenAIProvider::new(config(&server)).unwrap();
        let result = provider.embed(vec!["hello".into()], EmbedOptions::default()).await.unwrap();

        assert_eq!(result.len(), 1);
        assert_eq!(result[0].as_ref().unwrap().len(), 1536);
    }

    #[tokio::test]
    async fn auth_failure_is_surfaced() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/embeddings"))
            .respond_with(ResponseTemplate::new(401).set_body_string("bad key"))
            .mount(&server)
            .await;

        let provider = OpenAIProvider::new(config(&server)).unwrap();
        let result = provider.embed(vec!["hello".into()], EmbedOptions::default()).await;
        assert!(matches!(result, Err(SearchError::ProviderAuth(_))));
    }

    #[tokio::test]
    async fn rate_limit_is_retriable_kind() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/embeddings"))
            .respond_with(ResponseTemplate::new(429).insert_header("Retry-After", "30"))
            .mount(&server)
            .await;

        let provider = OpenAIProvider::new(config(&server)).unwrap();
        let result = provider.embed(vec!["hello".into()], EmbedOptions::default()).await;
        match result {
            Err(SearchError::RateLimited { retry_after_secs }) => assert_eq!(retry_after_secs, Some(30)),
            other => panic!("expected RateLimited, got {:?}", other.err()),
        }
    }

    #[tokio::test]
    async fn empty_input_short_circuits() {
        let server = MockServer::start().await;
        let provider = OpenAIProvider::new(config(&server)).unwrap();
        let result = provider.embed(vec![], EmbedOptions::default()).await.unwrap();
        assert!(result.is_empty());
    }
}
