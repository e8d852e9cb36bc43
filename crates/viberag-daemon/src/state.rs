//! Owns the daemon's singletons and dispatches JSON-RPC calls onto them
//! (spec §4.13).

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Weak};
use std::time::Instant;

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use viberag_core::config::ProjectConfig;
use viberag_core::paths::PathResolver;
use viberag_rpc::{ClientTag, RpcErrorObject, RpcHandler};
use viberag_search::{EmbeddingProvider, IndexOptions, IndexStats, Indexer, SearchEngine, SearchOptions, Store};
use viberag_watch::{FileWatcher, IndexTrigger, WatchStatus};

const PROTOCOL_VERSION: u32 = 1;

#[derive(Debug, Clone, Serialize, Deserialize)]
struct IndexRunRecord {
    id: String,
    state: String,
    stats: Option<IndexStats>,
    error: Option<String>,
    started_at: chrono::DateTime<Utc>,
}

/// Everything the daemon owns for the lifetime of one process, shared
/// across RPC connections and the watcher's trigger callback.
pub struct DaemonState {
    pub paths: PathResolver,
    config: Mutex<ProjectConfig>,
    store: Arc<Store>,
    provider: Arc<dyn EmbeddingProvider>,
    search_engine: Arc<SearchEngine>,
    indexer: Arc<Indexer>,
    watcher: Arc<FileWatcher>,

    started_at: Instant,
    last_activity: Mutex<Instant>,
    active_clients: AtomicUsize,
    indexing_in_progress: AtomicBool,
    indexing_cancel: Mutex<CancellationToken>,
    next_run_id: AtomicU64,
    runs: Mutex<HashMap<String, IndexRunRecord>>,
    pub shutdown_requested: CancellationToken,
    /// Set once via [`DaemonState::install_self_ref`] right after
    /// construction, so `indexAsync` can spawn a task holding a strong
    /// reference to `self` without the `RpcHandler` trait exposing `Arc<Self>`.
    self_ref: Mutex<Weak<DaemonState>>,
}

impl DaemonState {
    pub fn new(
        paths: PathResolver,
        config: ProjectConfig,
        store: Arc<Store>,
        provider: Arc<dyn EmbeddingProvider>,
        search_engine: Arc<SearchEngine>,
        indexer: Arc<Indexer>,
        watcher: Arc<FileWatcher>,
    ) -> Self {
        Self {
            paths,
            config: Mutex::new(config),
            store,
            provider,
            search_engine,
            indexer,
            watcher,
            started_at: Instant::now(),
            last_activity: Mutex::new(Instant::now()),
            active_clients: AtomicUsize::new(0),
            indexing_in_progress: AtomicBool::new(false),
            indexing_cancel: Mutex::new(CancellationToken::new()),
            next_run_id: AtomicU64::new(1),
            runs: Mutex::new(HashMap::new()),
            shutdown_requested: CancellationToken::new(),
            self_ref: Mutex::new(Weak::new()),
        }
    }

    /// Must be called once with the `Arc` that owns this state, immediately
    /// after construction, so background tasks (`indexAsync`) can clone a
    /// strong reference to `self`.
    pub fn install_self_ref(self_arc: &Arc<DaemonState>) {
        *self_arc.self_ref.lock() = Arc::downgrade(self_arc);
    }

    pub fn touch_activity(&self) {
        *self.last_activity.lock() = Instant::now();
    }

    pub fn idle_for(&self) -> std::time::Duration {
        self.last_activity.lock().elapsed()
    }

    /// Cancel any in-flight indexing and stop the watcher, in the order
    /// the spec's graceful shutdown sequence requires.
    pub async fn shutdown(&self) {
        self.indexing_cancel.lock().cancel();
        self.watcher.stop().await;
        let _ = self.provider.close().await;
    }

    async fn run_index(&self, options: IndexOptions) -> viberag_search::Result<IndexStats> {
        self.indexing_in_progress.store(true, Ordering::SeqCst);
        let cancel = CancellationToken::new();
        *self.indexing_cancel.lock() = cancel.clone();

        let result = self.indexer.run(options, None, cancel).await;
        self.indexing_in_progress.store(false, Ordering::SeqCst);
        self.touch_activity();
        result
    }

    fn health_json(&self) -> serde_json::Value {
        serde_json::json!({
            "uptimeSeconds": self.started_at.elapsed().as_secs(),
            "residentMemoryKb": resident_memory_kb(),
            "activeClients": self.active_clients.load(Ordering::SeqCst),
            "protocolVersion": PROTOCOL_VERSION,
            "indexingInProgress": self.indexing_in_progress.load(Ordering::SeqCst),
        })
    }

    fn status_json(&self) -> serde_json::Value {
        let watch_status: WatchStatus = self.watcher.status();
        let runs: Vec<IndexRunRecord> = self.runs.lock().values().cloned().collect();
        serde_json::json!({
            "health": self.health_json(),
            "watchStatus": watch_status,
            "provider": self.provider.kind().to_string(),
            "indexRuns": runs,
            "projectId": self.paths.project_id(),
        })
    }
}

#[async_trait]
impl IndexTrigger for DaemonState {
    async fn trigger_indexing(&self, changed_paths: Vec<String>, cancel: CancellationToken) -> Result<(), String> {
        if self.indexing_in_progress.load(Ordering::SeqCst) {
            return Err("indexing already in progress".to_string());
        }
        info!(files = changed_paths.len(), "watcher triggered reindex");
        *self.indexing_cancel.lock() = cancel;
        self.run_index(IndexOptions::default()).await.map(|_| ()).map_err(|e| e.to_string())
    }
}

#[async_trait]
impl RpcHandler for DaemonState {
    async fn handle(
        &self,
        method: &str,
        params: serde_json::Value,
        _client: ClientTag,
    ) -> Result<serde_json::Value, RpcErrorObject> {
        self.touch_activity();

        match method {
            "ping" => Ok(serde_json::json!({ "pong": true, "version": env!("CARGO_PKG_VERSION") })),

            "health" => Ok(self.health_json()),

            "status" => Ok(self.status_json()),

            "watchStatus" => Ok(serde_json::to_value(self.watcher.status()).unwrap_or(serde_json::Value::Null)),

            "index" => {
                if self.indexing_in_progress.load(Ordering::SeqCst) {
                    return Err(RpcErrorObject::index_in_progress("an indexing run is already in progress"));
                }
                let force = params.get("force").and_then(|v| v.as_bool()).unwrap_or(false);
                let drop_cache = params.get("dropCache").and_then(|v| v.as_bool()).unwrap_or(false);
                let options = IndexOptions { force, drop_cache };
                self.run_index(options)
                    .await
                    .map(|stats| serde_json::to_value(stats).unwrap_or(serde_json::Value::Null))
                    .map_err(|e| RpcErrorObject::internal(e.to_string()))
            }

            "indexAsync" => {
                if self.indexing_in_progress.load(Ordering::SeqCst) {
                    return Err(RpcErrorObject::index_in_progress("an indexing run is already in progress"));
                }
                let Some(state) = self.self_ref.lock().upgrade() else {
                    return Err(RpcErrorObject::internal("daemon state not fully initialized"));
                };

                let force = params.get("force").and_then(|v| v.as_bool()).unwrap_or(false);
                let drop_cache = params.get("dropCache").and_then(|v| v.as_bool()).unwrap_or(false);
                let options = IndexOptions { force, drop_cache };

                let id = format!("run-{}", self.next_run_id.fetch_add(1, Ordering::SeqCst));
                self.runs.lock().insert(
                    id.clone(),
                    IndexRunRecord { id: id.clone(), state: "running".to_string(), stats: None, error: None, started_at: Utc::now() },
                );

                let run_id = id.clone();
                tokio::spawn(async move {
                    let result = state.run_index(options).await;
                    let mut runs = state.runs.lock();
                    if let Some(record) = runs.get_mut(&run_id) {
                        match result {
                            Ok(stats) => {
                                record.state = "completed".to_string();
                                record.stats = Some(stats);
                            }
                            Err(e) => {
                                record.state = if matches!(e, viberag_search::error::SearchError::Cancelled(_)) {
                                    "cancelled".to_string()
                                } else {
                                    "error".to_string()
                                };
                                record.error = Some(e.to_string());
                            }
                        }
                    }
                });

                Ok(serde_json::json!({ "id": id }))
            }

            "search" => {
                let query = params
                    .get("query")
                    .and_then(|v| v.as_str())
                    .ok_or_else(|| RpcErrorObject::invalid_params("search requires a 'query' string"))?;
                let options: SearchOptions = params
                    .get("options")
                    .cloned()
                    .map(serde_json::from_value)
                    .transpose()
                    .map_err(|e: serde_json::Error| RpcErrorObject::invalid_params(e.to_string()))?
                    .unwrap_or_default();

                self.search_engine
                    .search(query, options)
                    .await
                    .map(|results| serde_json::to_value(results).unwrap_or(serde_json::Value::Null))
                    .map_err(|e| RpcErrorObject::internal(e.to_string()))
            }

            "getSymbol" => {
                let symbol_id = params
                    .get("symbolId")
                    .and_then(|v| v.as_str())
                    .ok_or_else(|| RpcErrorObject::invalid_params("getSymbol requires 'symbolId'"))?;
                self.search_engine
                    .get_symbol(symbol_id)
                    .await
                    .map(|found| serde_json::to_value(found).unwrap_or(serde_json::Value::Null))
                    .map_err(|e| RpcErrorObject::internal(e.to_string()))
            }

            "findUsages" => {
                let token_text = params.get("tokenText").and_then(|v| v.as_str());
                let limit = params.get("limit").and_then(|v| v.as_u64()).unwrap_or(50) as usize;
                self.search_engine
                    .find_usages(token_text, limit)
                    .await
                    .map(|hits| serde_json::to_value(hits).unwrap_or(serde_json::Value::Null))
                    .map_err(|e| RpcErrorObject::internal(e.to_string()))
            }

            "expandContext" => {
                let table = params
                    .get("table")
                    .and_then(|v| v.as_str())
                    .ok_or_else(|| RpcErrorObject::invalid_params("expandContext requires 'table'"))?;
                let id = params
                    .get("id")
                    .and_then(|v| v.as_str())
                    .ok_or_else(|| RpcErrorObject::invalid_params("expandContext requires 'id'"))?;
                let window = params.get("window").and_then(|v| v.as_u64()).unwrap_or(3) as usize;
                self.search_engine
                    .expand_context(table, id, window)
                    .await
                    .map(|rows| serde_json::to_value(rows).unwrap_or(serde_json::Value::Null))
                    .map_err(|e| RpcErrorObject::internal(e.to_string()))
            }

            "eval" => Ok(run_eval_harness(&self.search_engine).await),

            "cancel" => {
                let target = params.get("target").and_then(|v| v.as_str()).unwrap_or("all");
                if matches!(target, "indexing" | "all") {
                    self.indexing_cancel.lock().cancel();
                }
                Ok(serde_json::json!({ "cancelled": target }))
            }

            "shutdown" => {
                self.shutdown_requested.cancel();
                Ok(serde_json::json!({ "shuttingDown": true }))
            }

            "testException" => Err(RpcErrorObject::internal("testException: unthrottled test hook fired")),

            other => Err(RpcErrorObject::method_not_found(other)),
        }
    }
}

/// A small bundled query-quality harness: runs a fixed set of
/// `(query, expected_path_substring)` pairs against the live store and
/// reports per-query latency and hit/miss, exercising `search` end to end
/// without inventing a benchmark DSL.
async fn run_eval_harness(engine: &SearchEngine) -> serde_json::Value {
    const FIXTURES: &[(&str, &str)] = &[
        ("parse configuration file", "config"),
        ("hash file contents", "hash"),
        ("compute merkle tree diff", "merkle"),
    ];

    let mut results = Vec::new();
    for (query, expected_substring) in FIXTURES {
        let start = Instant::now();
        let outcome = engine.search(query, SearchOptions::default()).await;
        let elapsed_ms = start.elapsed().as_millis();

        let hit = match &outcome {
            Ok(r) => r.blocks.iter().any(|b| b.file_path.contains(expected_substring)),
            Err(_) => false,
        };
        if let Err(e) = &outcome {
            warn!(query, error = %e, "eval harness query failed");
        }

        results.push(serde_json::json!({
            "query": query,
            "expected": expected_substring,
            "hit": hit,
            "latencyMs": elapsed_ms,
        }));
    }

    serde_json::json!({ "results": results })
}

#[cfg(target_os = "linux")]
fn resident_memory_kb() -> Option<u64> {
    let status = std::fs::read_to_string("/proc/self/status").ok()?;
    status.lines().find_map(|line| {
        line.strip_prefix("VmRSS:").map(|rest| rest.trim().trim_end_matches(" kB").trim().parse().ok()).flatten()
    })
}

#[cfg(not(target_os = "linux"))]
fn resident_memory_kb() -> Option<u64> {
    None
}
