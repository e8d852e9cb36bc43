//! Mistral embedding provider (spec §4.6).
//!
//! Same request/response shape as OpenAI's `/v1/embeddings` endpoint, so
//! this mirrors `openai.rs` closely; kept as its own provider because
//! auth, base URL and rate-limit headers differ enough to not be worth
//! abstracting over.

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::provider::{EmbedOptions, EmbeddingProvider, ProgressCallback, ProviderKind};
use crate::error::{Result, SearchError};

const DEFAULT_BATCH_SIZE: usize = 32;

#[derive(Debug, Clone)]
pub struct MistralConfig {
    pub base_url: String,
    pub api_key: String,
    pub model: String,
    pub dimensions: usize,
    pub timeout_secs: u64,
    pub batch_size: usize,
}

impl MistralConfig {
    pub fn new(api_key: impl Into<String>, model: impl Into<String>, dimensions: usize) -> Self {
        Self {
            base_url: "https://api.mistral.ai/v1".into(),
            api_key: api_key.into(),
            model: model.into(),
            dimensions,
            timeout_secs: 30,
            batch_size: DEFAULT_BATCH_SIZE,
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.api_key.trim().is_empty() {
            return Err(SearchError::InvalidConfig("mistral apiKey is empty".into()));
        }
        Ok(())
    }
}

#[derive(Debug, Serialize)]
struct EmbeddingsRequest {
    model: String,
    input: Vec<String>,
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

pub struct MistralProvider {
    client: Client,
    config: MistralConfig,
}

impl MistralProvider {
    pub fn new(config: MistralConfig) -> Result<Self> {
        config.validate()?;
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| SearchError::ProviderUnavailable(format!("HTTP client error: {}", e)))?;
        Ok(Self { client, config })
    }

    async fn send_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let url = format!("{}/embeddings", self.config.base_url.trim_end_matches('/'));
        let request_body = EmbeddingsRequest {
            model: self.config.model.clone(),
            input: texts.to_vec(),
        };

        let response = self
            .client
            .post(url)
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
                Ok(ordered)
            }
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                let body = response.text().await.unwrap_or_default();
                Err(SearchError::ProviderAuth(format!("mistral authentication failed: {}", body)))
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
                if body.to_lowercase().contains("too long") {
                    Err(SearchError::ContextLengthExceeded)
                } else {
                    Err(SearchError::ProviderUnavailable(format!("bad request: {}", body)))
                }
            }
            _ => {
                let body = response.text().await.unwrap_or_default();
                Err(SearchError::ProviderUnavailable(format!("request failed with status {}: {}", status, body)))
            }
        }
    }
}

#[async_trait]
impl EmbeddingProvider for MistralProvider {
    fn dimensions(&self) -> usize {
        self.config.dimensions
    }

    fn kind(&self) -> ProviderKind {
        ProviderKind::Mistral
    }

    async fn initialize(&self, progress_cb: Option<ProgressCallback>) -> Result<()> {
        if let Some(cb) = &progress_cb {
            cb("checking mistral credentials");
        }
        self.config.validate()?;
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
                Err(SearchError::ContextLengthExceeded) => out.extend(chunk.iter().map(|_| None)),
                Err(e) => return Err(e),
            }
        }

        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn mock_response(dim: usize, count: usize) -> serde_json::Value {
        let data: Vec<serde_json::Value> = (0..count)
            .map(|i| serde_json::json!({"embedding": vec![0.1_f32; dim], "index": i}))
            .collect();
        serde_json::json!({"data": data})
    }

    fn config(server: &MockServer) -> MistralConfig {
        MistralConfig {
            base_url: server.uri(),
            api_key: "test-key".into(),
            model: "mistral-embed".into(),
            dimensions: 1024,
            timeout_secs: 5,
            batch_size: 32,
        }
    }

    #[tokio::test]
    async fn embeds_successfully() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/embeddings"))
            .respond_with(ResponseTemplate::new(200).set_body_json(mock_response(1024, 2)))
            .mount(&server)
            .await;

        let provider = MistralProvider::new(config(&server)).unwrap();
        let result = provider
            .embed(vec!["a".into(), "b".into()], EmbedOptions::default())
            .await
            .unwrap();
        assert_eq!(result.len(), 2);
        assert!(result.iter().all(|v| v.as_ref().unwrap().len() == 1024));
    }

    #[tokio::test]
    async fn auth_failure_is_surfaced() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/embeddings"))
            .respond_with(ResponseTemplate::new(401))
            .mount(&server)
            .await;

        let provider = MistralProvider::new(config(&server)).unwrap();
        let result = provider.embed(vec!["a".into()], EmbedOptions::default()).await;
        assert!(matches!(result, Err(SearchError::ProviderAuth(_))));
    }
}
