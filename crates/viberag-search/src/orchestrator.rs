//! Bounded-concurrency batch embedding orchestrator (spec §4.7).
//!
//! Submits texts to an `EmbeddingProvider` in fixed-size batches across a
//! bounded number of concurrent slots, retrying retriable failures with
//! exponential backoff and reporting per-slot progress. A failure
//! classified as fatal (auth, invalid config) aborts the whole run instead
//! of being retried.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::embeddings::provider::{EmbedOptions, EmbeddingProvider};
use crate::error::{Result, SearchError};

const DEFAULT_CONCURRENCY: usize = 5;
const DEFAULT_BATCH_DELAY_MS: u64 = 200;
const DEFAULT_MAX_ATTEMPTS: u32 = 10;
const DEFAULT_INITIAL_BACKOFF_MS: u64 = 1000;
const DEFAULT_MAX_BACKOFF_MS: u64 = 60_000;

#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    pub concurrency: usize,
    pub batch_size: usize,
    pub batch_delay: Duration,
    pub max_attempts: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            concurrency: DEFAULT_CONCURRENCY,
            batch_size: 32,
            batch_delay: Duration::from_millis(DEFAULT_BATCH_DELAY_MS),
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            initial_backoff: Duration::from_millis(DEFAULT_INITIAL_BACKOFF_MS),
            max_backoff: Duration::from_millis(DEFAULT_MAX_BACKOFF_MS),
        }
    }
}

/// One unit of embeddable work: an opaque id the caller uses to re-associate
/// results, plus the text to embed.
#[derive(Debug, Clone)]
pub struct EmbedTask {
    pub id: String,
    pub text: String,
}

#[derive(Debug, Clone)]
pub struct EmbedResult {
    pub id: String,
    pub vector: Option<Vec<f32>>,
}

/// Invoked after each batch completes with `(completed, total)`.
pub type ProgressCallback = Arc<dyn Fn(usize, usize) + Send + Sync>;

fn is_fatal(err: &SearchError) -> bool {
    matches!(err, SearchError::ProviderAuth(_) | SearchError::InvalidConfig(_) | SearchError::DimensionMismatch { .. })
}

/// Runs `tasks` through `provider`, batching and bounding concurrency per
/// `config`. Returns one `EmbedResult` per input task, in the same relative
/// order tasks were submitted within their batch (batches may complete out
/// of submission order).
pub async fn run(
    provider: Arc<dyn EmbeddingProvider>,
    tasks: Vec<EmbedTask>,
    config: OrchestratorConfig,
    progress_cb: Option<ProgressCallback>,
    cancel: CancellationToken,
) -> Result<Vec<EmbedResult>> {
    if tasks.is_empty() {
        return Ok(vec![]);
    }

    let total = tasks.len();
    let batches: Vec<Vec<EmbedTask>> = tasks.chunks(config.batch_size.max(1)).map(|c| c.to_vec()).collect();
    let semaphore = Arc::new(Semaphore::new(config.concurrency.max(1)));
    let completed = Arc::new(AtomicUsize::new(0));

    let mut handles = Vec::with_capacity(batches.len());

    for batch in batches {
        let provider = provider.clone();
        let config = config.clone();
        let semaphore = semaphore.clone();
        let completed = completed.clone();
        let progress_cb = progress_cb.clone();
        let cancel = cancel.clone();

        handles.push(tokio::spawn(async move {
            let _permit = semaphore.acquire_owned().await.map_err(|_| SearchError::Cancelled("semaphore closed".into()))?;

            if cancel.is_cancelled() {
                return Err(SearchError::Cancelled("indexing cancelled before batch started".into()));
            }

            let result = embed_batch_with_retry(&provider, &batch, &config, &cancel).await?;

            let done = completed.fetch_add(batch.len(), Ordering::SeqCst) + batch.len();
            if let Some(cb) = &progress_cb {
                cb(done, total);
            }

            tokio::time::sleep(config.batch_delay).await;
            Ok::<Vec<EmbedResult>, SearchError>(result)
        }));
    }

    let mut out = Vec::with_capacity(total);
    for handle in handles {
        let batch_result = handle
            .await
            .map_err(|e| SearchError::ProviderUnavailable(format!("embedding task panicked: {}", e)))??;
        out.extend(batch_result);
    }

    Ok(out)
}

async fn embed_batch_with_retry(
    provider: &Arc<dyn EmbeddingProvider>,
    batch: &[EmbedTask],
    config: &OrchestratorConfig,
    cancel: &CancellationToken,
) -> Result<Vec<EmbedResult>> {
    let texts: Vec<String> = batch.iter().map(|t| t.text.clone()).collect();
    let mut backoff = config.initial_backoff;
    let mut last_error = None;

    for attempt in 0..config.max_attempts {
        if cancel.is_cancelled() {
            return Err(SearchError::Cancelled("indexing cancelled mid-retry".into()));
        }

        match provider.embed(texts.clone(), EmbedOptions::default()).await {
            Ok(vectors) => {
                return Ok(batch
                    .iter()
                    .zip(vectors)
                    .map(|(task, vector)| EmbedResult { id: task.id.clone(), vector })
                    .collect());
            }
            // Context-length is fatal for this batch but not for the run: fill
            // with nulls and skip remaining attempts (spec §4.7, §7).
            Err(SearchError::ContextLengthExceeded) => {
                warn!("context length exceeded for batch, recording null vectors");
                return Ok(batch.iter().map(|task| EmbedResult { id: task.id.clone(), vector: None }).collect());
            }
            Err(e) if is_fatal(&e) => return Err(e),
            Err(SearchError::RateLimited { retry_after_secs }) => {
                let wait = retry_after_secs.map(Duration::from_secs).unwrap_or(backoff);
                warn!(attempt, wait_ms = wait.as_millis() as u64, "rate limited, backing off");
                tokio::time::sleep(wait).await;
                backoff = (backoff * 2).min(config.max_backoff);
                last_error = Some(SearchError::RateLimited { retry_after_secs });
            }
            Err(e) => {
                debug!(attempt, error = %e, "retriable embedding failure");
                tokio::time::sleep(backoff).await;
                backoff = (backoff * 2).min(config.max_backoff);
                last_error = Some(e);
            }
        }
    }

    Err(last_error.unwrap_or_else(|| SearchError::ProviderUnavailable("batch failed after retries".into())))
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::AtomicU32;
    use crate::embeddings::provider::{ProgressCallback as InitProgressCallback, ProviderKind};

    struct FlakyProvider {
        fail_times: AtomicU32,
        dim: usize,
    }

    #[async_trait]
    impl EmbeddingProvider for FlakyProvider {
        fn dimensions(&self) -> usize {
            self.dim
        }
        fn kind(&self) -> ProviderKind {
            ProviderKind::Local
        }
        async fn initialize(&self, _progress_cb: Option<InitProgressCallback>) -> Result<()> {
            Ok(())
        }
        async fn embed(&self, texts: Vec<String>, _options: EmbedOptions) -> Result<Vec<Option<Vec<f32>>>> {
            if self.fail_times.load(Ordering::SeqCst) > 0 {
                self.fail_times.fetch_sub(1, Ordering::SeqCst);
                return Err(SearchError::ProviderUnavailable("transient".into()));
            }
            Ok(texts.iter().map(|_| Some(vec![0.1; self.dim])).collect())
        }
    }

    struct AuthFailProvider;

    #[async_trait]
    impl EmbeddingProvider for AuthFailProvider {
        fn dimensions(&self) -> usize {
            768
        }
        fn kind(&self) -> ProviderKind {
            ProviderKind::Openai
        }
        async fn initialize(&self, _progress_cb: Option<InitProgressCallback>) -> Result<()> {
            Ok(())
        }
        async fn embed(&self, _texts: Vec<String>, _options: EmbedOptions) -> Result<Vec<Option<Vec<f32>>>> {
            Err(SearchError::ProviderAuth("bad key".into()))
        }
    }

    fn tasks(n: usize) -> Vec<EmbedTask> {
        (0..n).map(|i| EmbedTask { id: format!("t{}", i), text: format!("text {}", i) }).collect()
    }

    #[tokio::test]
    async fn embeds_all_tasks_in_order_of_submission() {
        let provider: Arc<dyn EmbeddingProvider> = Arc::new(FlakyProvider { fail_times: AtomicU32::new(0), dim: 4 });
        let results = run(provider, tasks(10), OrchestratorConfig { batch_size: 3, ..Default::default() }, None, CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(results.len(), 10);
        assert!(results.iter().all(|r| r.vector.is_some()));
    }

    #[tokio::test]
    async fn retries_transient_failures() {
        let provider: Arc<dyn EmbeddingProvider> = Arc::new(FlakyProvider { fail_times: AtomicU32::new(2), dim: 4 });
        let mut config = OrchestratorConfig::default();
        config.initial_backoff = Duration::from_millis(1);
        config.max_backoff = Duration::from_millis(5);
        let results = run(provider, tasks(2), config, None, CancellationToken::new()).await.unwrap();
        assert_eq!(results.len(), 2);
    }

    #[tokio::test]
    async fn fatal_error_aborts_without_retry() {
        let provider: Arc<dyn EmbeddingProvider> = Arc::new(AuthFailProvider);
        let result = run(provider, tasks(2), OrchestratorConfig::default(), None, CancellationToken::new()).await;
        assert!(matches!(result, Err(SearchError::ProviderAuth(_))));
    }

    #[tokio::test]
    async fn cancellation_short_circuits() {
        let provider: Arc<dyn EmbeddingProvider> = Arc::new(FlakyProvider { fail_times: AtomicU32::new(0), dim: 4 });
        let cancel = CancellationToken::new();
        cancel.cancel();
        let result = run(provider, tasks(4), OrchestratorConfig::default(), None, cancel).await;
        assert!(matches!(result, Err(SearchError::Cancelled(_))));
    }

    struct ContextLengthProvider;

    #[async_trait]
    impl EmbeddingProvider for ContextLengthProvider {
        fn dimensions(&self) -> usize {
            4
        }
        fn kind(&self) -> ProviderKind {
            ProviderKind::Openai
        }
        async fn initialize(&self, _progress_cb: Option<InitProgressCallback>) -> Result<()> {
            Ok(())
        }
        async fn embed(&self, _texts: Vec<String>, _options: EmbedOptions) -> Result<Vec<Option<Vec<f32>>>> {
            Err(SearchError::ContextLengthExceeded)
        }
    }

    #[tokio::test]
    async fn context_length_errors_fill_nulls_without_aborting_the_run() {
        let provider: Arc<dyn EmbeddingProvider> = Arc::new(ContextLengthProvider);
        let results = run(provider, tasks(3), OrchestratorConfig::default(), None, CancellationToken::new()).await.unwrap();
        assert_eq!(results.len(), 3);
        assert!(results.iter().all(|r| r.vector.is_none()));
    }

    #[tokio::test]
    async fn empty_task_list_short_circuits() {
        let provider: Arc<dyn EmbeddingProvider> = Arc::new(FlakyProvider { fail_times: AtomicU32::new(0), dim: 4 });
        let results = run(provider, vec![], OrchestratorConfig::default(), None, CancellationToken::new()).await.unwrap();
        assert!(results.is_empty());
    }
}
