//! Gemini embedding provider (spec §4.6).
//!
//! `POST {base_url}/models/{model}:batchEmbedContents?key={api_key}` with
//! `{"requests":[{"model":"models/{model}","content":{"parts":[{"text":..}]}}]}`.
//! Gemini has no context-length-exceeded error distinct from a generic 400,
//! so oversized inputs surface as `ProviderUnavailable` rather than a
//! per-text `None`.

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::provider::{EmbedOptions, EmbeddingProvider, ProgressCallback, ProviderKind};
use crate::error::{Result, SearchError};

const DEFAULT_BATCH_SIZE: usize = 32;

#[derive(Debug, Clone)]
pub struct GeminiConfig {
    pub base_url: String,
    pub api_key: String,
    pub model: String,
    pub dimensions: usize,
    pub timeout_secs: u64,
    pub batch_size: usize,
}

impl GeminiConfig {
    pub fn new(api_key: impl Into<String>, model: impl Into<String>, dimensions: usize) -> Self {
        Self {
            base_url: "https://generativelanguage.googleapis.com/v1beta".into(),
            api_key: api_key.into(),
            model: model.into(),
            dimensions,
            timeout_secs: 30,
            batch_size: DEFAULT_BATCH_SIZE,
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.api_key.trim().is_empty() {
            return Err(SearchError::InvalidConfig("gemini apiKey is empty".into()));
        }
        Ok(())
    }
}

#[derive(Debug, Serialize)]
struct Part {
    text: String,
}

#[derive(Debug, Serialize)]
struct Content {
    parts: Vec<Part>,
}

#[derive(Debug, Serialize)]
struct EmbedRequest {
    model: String,
    content: Content,
    #[serde(rename = "outputDimensionality", skip_serializing_if = "Option::is_none")]
    output_dimensionality: Option<usize>,
}

#[derive(Debug, Serialize)]
struct BatchEmbedRequest {
    requests: Vec<EmbedRequest>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingValues {
    values: Vec<f32>,
}

#[derive(Debug, Deserialize)]
struct BatchEmbedResponse {
    embeddings: Vec<EmbeddingValues>,
}

pub struct GeminiProvider {
    client: Client,
    config: GeminiConfig,
}

impl GeminiProvider {
    pub fn new(config: GeminiConfig) -> Result<Self> {
        config.validate()?;
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| SearchError::ProviderUnavailable(format!("HTTP client error: {}", e)))?;
        Ok(Self { client, config })
    }

    fn batch_url(&self) -> String {
        format!(
            "{}/models/{}:batchEmbedContents?key={}",
            self.config.base_url.trim_end_matches('/'),
            self.config.model,
            self.config.api_key
        )
    }

    async fn send_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let model_ref = format!("models/{}", self.config.model);
        let requests = texts
            .iter()
            .map(|t| EmbedRequest {
                model: model_ref.clone(),
                content: Content { parts: vec![Part { text: t.clone() }] },
                output_dimensionality: Some(self.config.dimensions),
            })
            .collect();

        let response = self
            .client
            .post(self.batch_url())
            .json(&BatchEmbedRequest { requests })
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
                let parsed: BatchEmbedResponse = response
                    .json()
                    .await
                    .map_err(|e| SearchError::ProviderUnavailable(format!("invalid response: {}", e)))?;
                Ok(parsed.embeddings.into_iter().map(|e| e.values).collect())
            }
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                let body = response.text().await.unwrap_or_default();
                Err(SearchError::ProviderAuth(format!("gemini authentication failed: {}", body)))
            }
            StatusCode::TOO_MANY_REQUESTS => {
                let retry_after = response
                    .headers()
                    .get("Retry-After")
                    .and_then(|v| v.to_str().ok())
                    .and_then(|s| s.parse::<u64>().ok());
                Err(SearchError::RateLimited { retry_after_secs: retry_after })
            }
            _ => {
                let body = response.text().await.unwrap_or_default();
                Err(SearchError::ProviderUnavailable(format!("request failed with status {}: {}", status, body)))
            }
        }
    }
}

#[async_trait]
impl EmbeddingProvider for GeminiProvider {
    fn dimensions(&self) -> usize {
        self.config.dimensions
    }

    fn kind(&self) -> ProviderKind {
        ProviderKind::Gemini
    }

    async fn initialize(&self, progress_cb: Option<ProgressCallback>) -> Result<()> {
        if let Some(cb) = &progress_cb {
            cb("checking gemini credentials");
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
            let vectors = self.send_batch(chunk).await?;
            out.extend(vectors.into_iter().map(Some));
        }

        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path_regex};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn mock_response(dim: usize, count: usize) -> serde_json::Value {
        let embeddings: Vec<serde_json::Value> =
            (0..count).map(|_| serde_json::json!({"values": vec![0.1_f32; dim]})).collect();
        serde_json::json!({"embeddings": embeddings})
    }

    fn config(server: &MockServer) -> GeminiConfig {
        GeminiConfig {
            base_url: server.uri(),
            api_key: "test-key".into(),
            model: "text-embedding-004".into(),
            dimensions: 768,
            timeout_secs: 5,
            batch_size: 32,
        }
    }

    #[tokio::test]
    async fn embeds_successfully() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path_regex(r"^/models/.*:batchEmbedContents$"))
            .respond_with(ResponseTemplate::new(200).set_body_json(mock_response(768, 1)))
            .mount(&server)
            .await;

        let provider = GeminiProvider::new(config(&server)).unwrap();
        let result = provider.embed(vec!["hello".into()], EmbedOptions::default()).await.unwrap();
        assert_eq!(result.len(), 1);
        assert_eq!(result[0].as_ref().unwrap().len(), 768);
    }

    #[tokio::test]
    async fn auth_failure_is_surfaced() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path_regex(r"^/models/.*:batchEmbedContents$"))
            .respond_with(ResponseTemplate::new(403))
            .mount(&server)
            .await;

        let provider = GeminiProvider::new(config(&server)).unwrap();
        let result = provider.embed(vec!["hello".into()], EmbedOptions::default()).await;
        assert!(matches!(result, Err(SearchError::ProviderAuth(_))));
    }
}
