//! End-to-end incremental index update (spec §4.9).

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use once_cell::sync::Lazy;
use regex::Regex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use viberag_core::chunker;
use viberag_core::config::ProjectConfig;
use viberag_core::ignore_engine::IgnoreEngine;
use viberag_core::manifest::{FailedBatch, FailedFile, Manifest};
use viberag_core::merkle::{MerkleBuilder, MerkleTree};
use viberag_core::model::{ChunkKind, ChunkRow, EmbeddingCacheRow, FileRow, RefKind, RefRow, SymbolRow};
use viberag_core::paths::PathResolver;

use crate::embeddings::{self, EmbeddingProvider};
use crate::error::{Result, SearchError};
use crate::orchestrator::{self, EmbedTask, OrchestratorConfig};
use crate::store::Store;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexPhase {
    Init,
    Scan,
    Chunk,
    Embed,
    Persist,
    Finalize,
}

#[derive(Debug, Clone, Default, serde::Serialize, serde::Deserialize)]
pub struct IndexStats {
    pub files_scanned: usize,
    pub files_new: usize,
    pub files_modified: usize,
    pub files_deleted: usize,
    pub rows_added: usize,
    pub rows_deleted: usize,
    pub embeddings_computed: usize,
    pub embeddings_cached: usize,
}

/// Invoked as `(phase, current, total)` while a phase makes progress.
pub type ProgressCallback = Arc<dyn Fn(IndexPhase, usize, usize) + Send + Sync>;

pub struct IndexOptions {
    pub force: bool,
    pub drop_cache: bool,
}

impl Default for IndexOptions {
    fn default() -> Self {
        Self { force: false, drop_cache: false }
    }
}

pub struct Indexer {
    paths: PathResolver,
    config: ProjectConfig,
    store: Arc<Store>,
    provider: Arc<dyn EmbeddingProvider>,
}

impl Indexer {
    pub fn new(paths: PathResolver, config: ProjectConfig, store: Arc<Store>) -> Result<Self> {
        let provider = embeddings::build_provider(&config)?;
        Ok(Self { paths, config, store, provider })
    }

    pub async fn run(
        &self,
        options: IndexOptions,
        progress_cb: Option<ProgressCallback>,
        cancel: CancellationToken,
    ) -> Result<IndexStats> {
        let start = Instant::now();
        report(&progress_cb, IndexPhase::Init, 0, 1);

        self.provider.initialize(None).await?;

        let manifest_path = self.paths.manifest_path();
        let mut manifest = Manifest::load(&manifest_path)?.unwrap_or_else(Manifest::new);
        manifest.verify_schema()?;

        if options.force {
            self.store.reset_entity_tables(options.drop_cache).await?;
            manifest.merkle_tree = None;
            manifest.failed_files.clear();
            manifest.failed_batches.clear();
        }

        report(&progress_cb, IndexPhase::Scan, 0, 1);
        let mut ignore_engine = IgnoreEngine::load(self.paths.project_root());
        ignore_engine.reload();

        let builder = MerkleBuilder::new(&ignore_engine, &self.config.extensions);
        let (new_tree, build_stats) = builder.build(self.paths.project_root(), manifest.merkle_tree.as_ref())?;
        debug!(?build_stats, "merkle build complete");

        let empty_tree = MerkleTree::empty();
        let previous_tree = manifest.merkle_tree.as_ref().unwrap_or(&empty_tree);
        let diff = previous_tree.compare(&new_tree);

        if cancel.is_cancelled() {
            return Err(SearchError::Cancelled("indexing cancelled before scan completed".into()));
        }

        let mut stats = IndexStats {
            files_scanned: build_stats.files_scanned,
            files_new: diff.new.len(),
            files_modified: diff.modified.len(),
            files_deleted: diff.deleted.len(),
            ..Default::default()
        };

        for file_path in diff.deleted.iter().chain(diff.modified.iter()) {
            let deleted = self.store.delete_by_file_path(file_path).await?;
            stats.rows_deleted += deleted;
            manifest.clear_failed_for_file(file_path);
        }

        let mut to_process: Vec<&String> = diff.new.iter().chain(diff.modified.iter()).collect();
        to_process.sort_by_cached_key(|p| file_size(&self.paths.project_root().join(p)));

        report(&progress_cb, IndexPhase::Chunk, 0, to_process.len());

        for (i, rel_path) in to_process.iter().enumerate() {
            if cancel.is_cancelled() {
                return Err(SearchError::Cancelled("indexing cancelled mid-file".into()));
            }

            if let Err(e) = self.index_one_file(rel_path, &mut manifest, &mut stats, &progress_cb, &cancel).await {
                warn!(file = %rel_path, error = %e, "failed to index file, skipping");
                manifest.failed_files.push(FailedFile { file_path: rel_path.to_string(), error: e.to_string() });
            }

            report(&progress_cb, IndexPhase::Chunk, i + 1, to_process.len());
        }

        report(&progress_cb, IndexPhase::Persist, 0, 1);
        manifest.merkle_tree = Some(new_tree);
        manifest.stats.total_files = build_stats.files_scanned;
        manifest.updated_at = chrono::Utc::now();
        manifest.save(&manifest_path)?;

        report(&progress_cb, IndexPhase::Finalize, 1, 1);
        info!(elapsed = ?start.elapsed(), ?stats, "index run complete");
        Ok(stats)
    }

    async fn index_one_file(
        &self,
        rel_path: &str,
        manifest: &mut Manifest,
        stats: &mut IndexStats,
        progress_cb: &Option<ProgressCallback>,
        cancel: &CancellationToken,
    ) -> Result<()> {
        let abs_path = self.paths.project_root().join(rel_path);
        let content = std::fs::read_to_string(&abs_path)?;
        let file_hash = viberag_core::hash::hash_string(&content);

        let chunks = chunker::chunk_file(Path::new(rel_path), &content, self.config.chunk_max_size);
        if chunks.is_empty() {
            return Ok(());
        }

        let extension = Path::new(rel_path).extension().and_then(|e| e.to_str()).unwrap_or("").to_string();

        let input_hashes: Vec<String> = chunks.iter().map(|c| c.content_hash.clone()).collect();
        let cached = self.store.get_cached_embeddings(&input_hashes).await?;
        stats.embeddings_cached += cached.len();

        let misses: Vec<EmbedTask> = chunks
            .iter()
            .filter(|c| !cached.contains_key(&c.content_hash))
            .map(|c| EmbedTask { id: c.content_hash.clone(), text: embedding_input(c) })
            .collect();

        let mut computed = HashMap::new();
        if !misses.is_empty() {
            report(progress_cb, IndexPhase::Embed, 0, misses.len());
            let results = orchestrator::run(self.provider.clone(), misses, OrchestratorConfig::default(), None, cancel.clone()).await?;

            let mut to_cache = Vec::new();
            for result in results {
                match result.vector {
                    Some(vector) => {
                        to_cache.push(EmbeddingCacheRow { input_hash: result.id.clone(), vector: vector.clone(), created_at: chrono::Utc::now() });
                        computed.insert(result.id, vector);
                        stats.embeddings_computed += 1;
                    }
                    None => {
                        manifest.failed_batches.push(FailedBatch {
                            chunk_count: 1,
                            files: vec![rel_path.to_string()],
                            error: "embedding provider returned no vector".to_string(),
                            timestamp: chrono::Utc::now(),
                        });
                    }
                }
            }
            self.store.cache_embeddings(&to_cache).await?;
        }

        let mut symbol_rows = Vec::new();
        let mut chunk_rows = Vec::new();
        let mut ref_rows = Vec::new();

        for chunk in &chunks {
            let vector = cached.get(&chunk.content_hash).cloned().or_else(|| computed.get(&chunk.content_hash).cloned());
            let chunk_id = format!("{}::{}:{}", rel_path, chunk.start_line, chunk.end_line);

            let owner_symbol_id = if chunk.kind != ChunkKind::Module {
                let symbol_id = format!("sym::{}", chunk_id);
                symbol_rows.push(build_symbol_row(&symbol_id, rel_path, &extension, &file_hash, chunk, vector.clone()));
                ref_rows.extend(build_refs(rel_path, chunk));
                Some(symbol_id)
            } else {
                None
            };

            chunk_rows.push(build_chunk_row(&chunk_id, owner_symbol_id, rel_path, &extension, &file_hash, chunk, vector));
        }

        let file_row = build_file_row(rel_path, &file_hash, &content, &chunks);

        self.store.upsert_symbols(&symbol_rows).await?;
        self.store.upsert_chunks(&chunk_rows).await?;
        self.store.upsert_files(std::slice::from_ref(&file_row)).await?;
        self.store.add_refs(&ref_rows).await?;

        stats.rows_added += symbol_rows.len() + chunk_rows.len() + 1 + ref_rows.len();
        Ok(())
    }
}

fn report(cb: &Option<ProgressCallback>, phase: IndexPhase, current: usize, total: usize) {
    if let Some(cb) = cb {
        cb(phase, current, total);
    }
}

fn file_size(path: &Path) -> u64 {
    std::fs::metadata(path).map(|m| m.len()).unwrap_or(0)
}

/// Text actually sent to the embedding provider: the context header plus
/// the chunk body, so file/class/function context influences the vector.
fn embedding_input(chunk: &viberag_core::model::Chunk) -> String {
    format!("{}\n{}", chunk.context_header, chunk.text)
}

static IDENTIFIER_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"[A-Za-z_][A-Za-z0-9_]*").unwrap());
static CALL_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"([A-Za-z_][A-Za-z0-9_]*)\s*\(").unwrap());
static STRING_LITERAL_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r#"(?:"([^"\\]*(?:\\.[^"\\]*)*)")|(?:'([^'\\]*(?:\\.[^'\\]*)*)')"#).unwrap());
static IMPORT_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?m)^\s*(?:import|from|use|require)\s+([A-Za-z0-9_./:]+)").unwrap());

fn extract_identifiers(text: &str) -> Vec<String> {
    let mut seen = std::collections::BTreeSet::new();
    for m in IDENTIFIER_RE.find_iter(text) {
        seen.insert(m.as_str().to_string());
    }
    seen.into_iter().collect()
}

fn split_identifier_parts(identifiers: &[String]) -> Vec<String> {
    let mut parts = std::collections::BTreeSet::new();
    for ident in identifiers {
        for part in ident.split('_') {
            if !part.is_empty() {
                push_camel_parts(part, &mut parts);
            }
        }
    }
    parts.into_iter().collect()
}

fn push_camel_parts(word: &str, out: &mut std::collections::BTreeSet<String>) {
    let mut current = String::new();
    for c in word.chars() {
        if c.is_uppercase() && !current.is_empty() {
            out.insert(current.to_lowercase());
            current = String::new();
        }
        current.push(c);
    }
    if !current.is_empty() {
        out.insert(current.to_lowercase());
    }
}

fn extract_called_names(text: &str) -> Vec<String> {
    let mut seen = std::collections::BTreeSet::new();
    for cap in CALL_RE.captures_iter(text) {
        seen.insert(cap[1].to_string());
    }
    seen.into_iter().collect()
}

fn extract_string_literals(text: &str) -> Vec<String> {
    let mut out = Vec::new();
    for cap in STRING_LITERAL_RE.captures_iter(text) {
        if let Some(m) = cap.get(1).or_else(|| cap.get(2)) {
            if !m.as_str().is_empty() {
                out.push(m.as_str().to_string());
            }
        }
    }
    out
}

fn build_symbol_row(
    symbol_id: &str,
    file_path: &str,
    extension: &str,
    file_hash: &str,
    chunk: &viberag_core::model::Chunk,
    vector: Option<Vec<f32>>,
) -> SymbolRow {
    let identifiers = extract_identifiers(&chunk.text);
    let identifier_parts = split_identifier_parts(&identifiers);

    SymbolRow {
        symbol_id: symbol_id.to_string(),
        repo_id: file_path.to_string(),
        revision: file_hash.to_string(),
        file_path: file_path.to_string(),
        extension: extension.to_string(),
        language_hint: None,
        start_line: chunk.start_line,
        end_line: chunk.end_line,
        start_byte: chunk.start_byte,
        end_byte: chunk.end_byte,
        symbol_kind: chunk.kind.as_str().to_string(),
        symbol_name: chunk.symbol_name.clone(),
        qualname: chunk.symbol_name.clone(),
        parent_symbol_id: None,
        signature: chunk.signature.clone(),
        docstring: chunk.docstring.clone(),
        is_exported: chunk.is_exported,
        decorator_names: chunk.decorator_names.clone(),
        context_header: chunk.context_header.clone(),
        code_text: chunk.text.clone(),
        search_text: format!("{} {}", chunk.symbol_name, chunk.text),
        identifiers_text: identifiers.join(" "),
        identifiers: identifiers.clone(),
        identifier_parts,
        called_names: extract_called_names(&chunk.text),
        string_literals: extract_string_literals(&chunk.text),
        content_hash: chunk.content_hash.clone(),
        file_hash: file_hash.to_string(),
        vec_summary: vector,
    }
}

fn build_chunk_row(
    chunk_id: &str,
    owner_symbol_id: Option<String>,
    file_path: &str,
    extension: &str,
    file_hash: &str,
    chunk: &viberag_core::model::Chunk,
    vector: Option<Vec<f32>>,
) -> ChunkRow {
    ChunkRow {
        chunk_id: chunk_id.to_string(),
        owner_symbol_id,
        chunk_kind: chunk.kind.as_str().to_string(),
        repo_id: file_path.to_string(),
        revision: file_hash.to_string(),
        file_path: file_path.to_string(),
        extension: extension.to_string(),
        start_line: chunk.start_line,
        end_line: chunk.end_line,
        start_byte: chunk.start_byte,
        end_byte: chunk.end_byte,
        context_header: chunk.context_header.clone(),
        code_text: chunk.text.clone(),
        search_text: chunk.text.clone(),
        content_hash: chunk.content_hash.clone(),
        file_hash: file_hash.to_string(),
        vec_code: vector,
    }
}

fn build_refs(file_path: &str, chunk: &viberag_core::model::Chunk) -> Vec<RefRow> {
    let mut refs = Vec::new();

    for name in extract_called_names(&chunk.text) {
        refs.push(RefRow {
            ref_id: format!("ref::{}::{}:{}::call::{}", file_path, chunk.start_line, chunk.end_line, name),
            ref_kind: RefKind::Call,
            token_text: name,
            context_snippet: chunk.context_header.clone(),
            start_byte: 0,
            end_byte: 0,
            start_line: chunk.start_line,
            end_line: chunk.end_line,
            module_name: None,
            imported_name: None,
            file_path: file_path.to_string(),
        });
    }

    for cap in IMPORT_RE.captures_iter(&chunk.text) {
        let module = cap[1].to_string();
        refs.push(RefRow {
            ref_id: format!("ref::{}::{}:{}::import::{}", file_path, chunk.start_line, chunk.end_line, module),
            ref_kind: RefKind::Import,
            token_text: module.clone(),
            context_snippet: chunk.context_header.clone(),
            start_byte: 0,
            end_byte: 0,
            start_line: chunk.start_line,
            end_line: chunk.end_line,
            module_name: Some(module.clone()),
            imported_name: Some(module),
            file_path: file_path.to_string(),
        });
    }

    refs
}

fn build_file_row(rel_path: &str, file_hash: &str, content: &str, chunks: &[viberag_core::model::Chunk]) -> FileRow {
    let imports: Vec<String> = IMPORT_RE.captures_iter(content).map(|c| c[1].to_string()).collect();
    let exports: Vec<String> = chunks.iter().filter(|c| c.is_exported).map(|c| c.symbol_name.clone()).collect();
    let top_level_doc = chunks.iter().find(|c| c.kind == ChunkKind::Module).and_then(|c| c.docstring.clone());
    let summary = format!("{} symbols across {} lines", chunks.len(), content.lines().count());

    FileRow {
        file_id: rel_path.to_string(),
        file_hash: file_hash.to_string(),
        imports,
        exports,
        top_level_doc,
        summary,
        vec_file: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identifiers_are_deduped_and_sorted() {
        let ids = extract_identifiers("fn foo() { let bar = foo(); }");
        assert!(ids.contains(&"foo".to_string()));
        assert!(ids.contains(&"bar".to_string()));
    }

    #[test]
    fn camel_case_identifiers_split_into_parts() {
        let parts = split_identifier_parts(&["parseHttpRequest".to_string()]);
        assert!(parts.contains(&"parse".to_string()));
        assert!(parts.contains(&"http".to_string()));
        assert!(parts.contains(&"request".to_string()));
    }

    #[test]
    fn called_names_match_function_call_syntax() {
        let calls = extract_called_names("result = compute(x, y); helper()");
        assert!(calls.contains(&"compute".to_string()));
        assert!(calls.contains(&"helper".to_string()));
    }

    #[test]
    fn string_literals_are_extracted_without_quotes() {
        let literals = extract_string_literals(r#"let s = "hello"; let t = 'world';"#);
        assert!(literals.contains(&"hello".to_string()));
        assert!(literals.contains(&"world".to_string()));
    }

    #[test]
    fn import_statements_are_detected_across_languages() {
        let text = "import os\nfrom foo import bar\nuse std::collections::HashMap;\nconst x = require('fs');";
        let modules: Vec<String> = IMPORT_RE.captures_iter(text).map(|c| c[1].to_string()).collect();
        assert!(modules.iter().any(|m| m == "os"));
        assert!(modules.iter().any(|m| m.contains("collections")));
    }
}
