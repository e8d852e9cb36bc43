//! Hybrid search engine: semantic, exact, hybrid (RRF), definition and
//! similar-code retrieval (spec §4.10).

use std::collections::HashMap;
use std::sync::Arc;

use futures::TryStreamExt;
use lancedb::query::{ExecutableQuery, QueryBase, Select};
use serde::{Deserialize, Serialize};
use tokio::sync::OnceCell;
use tracing::debug;

use crate::embeddings::EmbeddingProvider;
use crate::error::{Result, SearchError};
use crate::store::{self, Store};

const RRF_K: f64 = 60.0;
const DEFAULT_LIMIT: usize = 20;
const DEFAULT_AUTO_BOOST_THRESHOLD: f32 = 0.3;
const MAX_OVERSAMPLE_MULTIPLIER: f64 = 4.0;
const MIN_OVERSAMPLE_MULTIPLIER: f64 = 2.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SearchMode {
    Semantic,
    Exact,
    Hybrid,
    Definition,
    Similar,
}

impl Default for SearchMode {
    fn default() -> Self {
        SearchMode::Hybrid
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SearchFilters {
    pub path_prefix: Option<String>,
    pub path_contains: Vec<String>,
    pub path_not_contains: Vec<String>,
    pub extension: Vec<String>,
    #[serde(rename = "type")]
    pub chunk_kind: Vec<String>,
    pub is_exported: Option<bool>,
    pub decorator_contains: Option<String>,
    pub has_docstring: Option<bool>,
}

impl SearchFilters {
    /// Compiles the filter set into a single SQL `where` conjunction, with
    /// string literals and `LIKE` wildcards escaped.
    pub fn to_predicate(&self) -> Option<String> {
        let mut clauses = Vec::new();

        if let Some(prefix) = &self.path_prefix {
            clauses.push(format!("file_path LIKE '{}%'", store::escape_like_pattern(prefix)));
        }
        for needle in &self.path_contains {
            clauses.push(format!("file_path LIKE '%{}%'", store::escape_like_pattern(needle)));
        }
        for needle in &self.path_not_contains {
            clauses.push(format!("file_path NOT LIKE '%{}%'", store::escape_like_pattern(needle)));
        }
        if !self.extension.is_empty() {
            let list = self
                .extension
                .iter()
                .map(|e| format!("'{}'", store::escape_sql_literal(e)))
                .collect::<Vec<_>>()
                .join(", ");
            clauses.push(format!("extension IN ({})", list));
        }
        if let Some(is_exported) = self.is_exported {
            clauses.push(format!("is_exported = {}", is_exported));
        }
        if let Some(decorator) = &self.decorator_contains {
            clauses.push(format!("array_to_string(decorator_names, ',') LIKE '%{}%'", store::escape_like_pattern(decorator)));
        }
        if let Some(has_docstring) = self.has_docstring {
            clauses.push(if has_docstring { "docstring IS NOT NULL".to_string() } else { "docstring IS NULL".to_string() });
        }

        if clauses.is_empty() {
            None
        } else {
            Some(clauses.join(" AND "))
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SearchOptions {
    pub mode: SearchMode,
    pub limit: Option<usize>,
    pub filters: SearchFilters,
    pub auto_boost: bool,
    pub auto_boost_threshold: Option<f32>,
    pub min_score: Option<f64>,
    pub explain: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchHit {
    pub table: String,
    pub id: String,
    pub file_path: String,
    pub start_line: usize,
    pub end_line: usize,
    pub title: String,
    pub snippet: String,
    pub score: f64,
    pub why: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SearchResults {
    pub definitions: Vec<SearchHit>,
    pub usages: Vec<SearchHit>,
    pub files: Vec<SearchHit>,
    pub blocks: Vec<SearchHit>,
    pub intent_used: SearchMode,
    pub filters_applied: SearchFilters,
    pub suggested_next_actions: Vec<NextAction>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NextAction {
    pub tool: String,
    pub args: serde_json::Value,
}

/// Full `symbols` row returned by `getSymbol`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SymbolDetail {
    pub symbol_id: String,
    pub file_path: String,
    pub start_line: usize,
    pub end_line: usize,
    pub symbol_kind: String,
    pub symbol_name: String,
    pub signature: String,
    pub docstring: String,
    pub code_text: String,
}

/// One `refs` row returned by `findUsages`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RefHit {
    pub ref_id: String,
    pub ref_kind: String,
    pub token_text: String,
    pub file_path: String,
    pub start_line: usize,
    pub end_line: usize,
    pub context_snippet: String,
}

/// A neighboring row returned by `expandContext`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContextNeighbor {
    pub table: String,
    pub id: String,
    pub file_path: String,
    pub start_line: usize,
    pub end_line: usize,
    pub code_text: String,
}

/// A single ranked retrieval path's result, before fusion.
#[derive(Debug, Clone)]
struct RankedHit {
    key: String,
    hit: SearchHit,
}

pub struct SearchEngine {
    store: Arc<Store>,
    provider: Arc<dyn EmbeddingProvider>,
    warmup: OnceCell<()>,
}

impl SearchEngine {
    pub fn new(store: Arc<Store>, provider: Arc<dyn EmbeddingProvider>) -> Self {
        Self { store, provider, warmup: OnceCell::new() }
    }

    /// All concurrent callers await the same warmup future; it runs once.
    pub async fn ensure_warm(&self) -> Result<()> {
        self.warmup
            .get_or_try_init(|| async { self.provider.initialize(None).await })
            .await?;
        Ok(())
    }

    pub async fn search(&self, query: &str, options: SearchOptions) -> Result<SearchResults> {
        self.ensure_warm().await?;

        let limit = options.limit.unwrap_or(DEFAULT_LIMIT).max(1);
        let predicate = options.filters.to_predicate();

        let blocks = match options.mode {
            SearchMode::Semantic | SearchMode::Similar => self.semantic_search(query, limit, predicate.as_deref()).await?,
            SearchMode::Exact => self.exact_search(query, limit, predicate.as_deref()).await?,
            SearchMode::Definition => self.definition_search(query, limit, predicate.as_deref()).await?,
            SearchMode::Hybrid => {
                self.hybrid_search(query, limit, predicate.as_deref(), &options).await?
            }
        };

        let blocks = if let Some(min_score) = options.min_score {
            blocks.into_iter().filter(|h| h.score >= min_score).collect()
        } else {
            blocks
        };

        let suggested_next_actions = blocks
            .first()
            .map(|h| {
                vec![NextAction {
                    tool: "get_symbol".to_string(),
                    args: serde_json::json!({ "id": h.id }),
                }]
            })
            .unwrap_or_default();

        Ok(SearchResults {
            definitions: Vec::new(),
            usages: Vec::new(),
            files: Vec::new(),
            blocks,
            intent_used: options.mode,
            filters_applied: options.filters,
            suggested_next_actions,
        })
    }

    async fn semantic_search(&self, query: &str, limit: usize, predicate: Option<&str>) -> Result<Vec<SearchHit>> {
        let query_vector = self.provider.embed_single(query).await?;
        self.vector_search(CHUNKS_TABLE, "vec_code", &query_vector, limit, predicate).await
    }

    async fn exact_search(&self, query: &str, limit: usize, predicate: Option<&str>) -> Result<Vec<SearchHit>> {
        self.fts_search(query, limit, predicate).await
    }

    async fn definition_search(&self, name: &str, limit: usize, predicate: Option<&str>) -> Result<Vec<SearchHit>> {
        let table = self.store.table(store::SYMBOLS_TABLE).await?;
        let escaped = store::escape_sql_literal(name);
        let mut where_clause = format!(
            "symbol_name = '{}' AND symbol_kind IN ('function', 'class', 'method')",
            escaped
        );
        if let Some(p) = predicate {
            where_clause.push_str(" AND (");
            where_clause.push_str(p);
            where_clause.push(')');
        }

        let mut stream = table
            .query()
            .only_if(where_clause)
            .select(Select::columns(&["symbol_id", "file_path", "start_line", "end_line", "symbol_name", "code_text"]))
            .limit(limit)
            .execute()
            .await
            .map_err(|e| SearchError::Store(format!("definition search failed: {}", e)))?;

        let mut hits = Vec::new();
        while let Some(batch) = stream.try_next().await.map_err(|e| SearchError::Store(e.to_string()))? {
            hits.extend(rows_to_hits(&batch, store::SYMBOLS_TABLE, "symbol_id", "symbol_name", "code_text", 1.0)?);
        }
        Ok(hits)
    }

    async fn hybrid_search(
        &self,
        query: &str,
        limit: usize,
        predicate: Option<&str>,
        options: &SearchOptions,
    ) -> Result<Vec<SearchHit>> {
        let query_vector = self.provider.embed_single(query).await?;
        let mut oversample = MIN_OVERSAMPLE_MULTIPLIER;
        let threshold = options.auto_boost_threshold.unwrap_or(DEFAULT_AUTO_BOOST_THRESHOLD);
        let mut bm25_weight = 0.5_f64;

        let mut vector_hits = self
            .vector_search(CHUNKS_TABLE, "vec_code", &query_vector, oversample_limit(limit, oversample), predicate)
            .await?;
        let mut fts_hits = self.fts_search(query, oversample_limit(limit, oversample), predicate).await?;

        if options.auto_boost {
            let max_vector_score = vector_hits.iter().map(|h| h.score).fold(0.0_f64, f64::max);
            if (max_vector_score as f32) < threshold {
                let confidence_gap = (threshold - max_vector_score as f32).max(0.0) / threshold.max(f32::EPSILON);
                let confidence_gap = confidence_gap.min(1.0) as f64;
                let new_oversample = MIN_OVERSAMPLE_MULTIPLIER + confidence_gap * (MAX_OVERSAMPLE_MULTIPLIER - MIN_OVERSAMPLE_MULTIPLIER);
                bm25_weight = (0.5 + confidence_gap * 0.5).min(0.9);

                if new_oversample > oversample {
                    oversample = new_oversample;
                    debug!(oversample, bm25_weight, "auto-boost raised oversample and bm25 weight");
                    vector_hits = self
                        .vector_search(CHUNKS_TABLE, "vec_code", &query_vector, oversample_limit(limit, oversample), predicate)
                        .await?;
                    fts_hits = self.fts_search(query, oversample_limit(limit, oversample), predicate).await?;
                }
            }
        }

        let fused = reciprocal_rank_fusion(&vector_hits, &fts_hits, 1.0 - bm25_weight, bm25_weight, options.explain);
        Ok(fused.into_iter().take(limit).collect())
    }

    async fn vector_search(
        &self,
        table_name: &str,
        vector_column: &str,
        query_vector: &[f32],
        limit: usize,
        predicate: Option<&str>,
    ) -> Result<Vec<SearchHit>> {
        let table = self.store.table(table_name).await?;
        let mut builder = table
            .vector_search(query_vector.to_vec())
            .map_err(|e| SearchError::Store(format!("vector search build failed: {}", e)))?
            .column(vector_column)
            .limit(limit);

        if let Some(p) = predicate {
            builder = builder.only_if(p.to_string());
        }

        let mut stream = builder.execute().await.map_err(|e| SearchError::Store(format!("vector search failed: {}", e)))?;

        let mut hits = Vec::new();
        while let Some(batch) = stream.try_next().await.map_err(|e| SearchError::Store(e.to_string()))? {
            let distances = batch
                .column_by_name("_distance")
                .and_then(|c| c.as_any().downcast_ref::<arrow_array::Float32Array>())
                .map(|a| a.values().to_vec());

            let id_column = id_column_for(table_name);
            let title_column = title_column_for(table_name);
            let text_column = text_column_for(table_name);

            let base_hits = rows_to_hits(&batch, table_name, id_column, title_column, text_column, 1.0)?;
            hits.extend(base_hits.into_iter().enumerate().map(|(i, mut h)| {
                if let Some(d) = distances.as_ref().and_then(|v| v.get(i)) {
                    h.score = store::distance_to_similarity(*d) as f64;
                }
                h
            }));
        }

        Ok(hits)
    }

    async fn fts_search(&self, query: &str, limit: usize, predicate: Option<&str>) -> Result<Vec<SearchHit>> {
        let table = self.store.table(CHUNKS_TABLE).await?;
        let mut builder = table.query().full_text_search(lancedb::query::FullTextSearchQuery::new(query.to_string())).limit(limit);

        if let Some(p) = predicate {
            builder = builder.only_if(p.to_string());
        }

        let mut stream = builder.execute().await.map_err(|e| SearchError::Store(format!("full-text search failed: {}", e)))?;

        let mut hits = Vec::new();
        while let Some(batch) = stream.try_next().await.map_err(|e| SearchError::Store(e.to_string()))? {
            hits.extend(rows_to_hits(&batch, CHUNKS_TABLE, "chunk_id", "context_header", "code_text", 1.0)?);
        }
        Ok(hits)
    }

    /// Fetch the full `symbols` row for `symbol_id`, spec §4.12 `getSymbol`.
    pub async fn get_symbol(&self, symbol_id: &str) -> Result<Option<SymbolDetail>> {
        let table = self.store.table(store::SYMBOLS_TABLE).await?;
        let predicate = format!("symbol_id = '{}'", store::escape_sql_literal(symbol_id));

        let mut stream = table
            .query()
            .only_if(predicate)
            .select(Select::columns(&[
                "symbol_id", "file_path", "start_line", "end_line", "symbol_kind", "symbol_name", "signature", "docstring", "code_text",
            ]))
            .limit(1)
            .execute()
            .await
            .map_err(|e| SearchError::Store(format!("getSymbol failed: {}", e)))?;

        while let Some(batch) = stream.try_next().await.map_err(|e| SearchError::Store(e.to_string()))? {
            if batch.num_rows() == 0 {
                continue;
            }
            let symbol_ids = string_col(&batch, "symbol_id")?;
            let file_paths = string_col(&batch, "file_path")?;
            let start_lines = u64_col(&batch, "start_line")?;
            let end_lines = u64_col(&batch, "end_line")?;
            let symbol_kinds = string_col(&batch, "symbol_kind")?;
            let symbol_names = string_col(&batch, "symbol_name")?;
            let signatures = string_col(&batch, "signature").unwrap_or_else(|_| vec![String::new(); batch.num_rows()]);
            let docstrings = string_col(&batch, "docstring").unwrap_or_else(|_| vec![String::new(); batch.num_rows()]);
            let code_texts = string_col(&batch, "code_text")?;

            return Ok(Some(SymbolDetail {
                symbol_id: symbol_ids[0].clone(),
                file_path: file_paths[0].clone(),
                start_line: start_lines[0] as usize,
                end_line: end_lines[0] as usize,
                symbol_kind: symbol_kinds[0].clone(),
                symbol_name: symbol_names[0].clone(),
                signature: signatures[0].clone(),
                docstring: docstrings[0].clone(),
                code_text: code_texts[0].clone(),
            }));
        }
        Ok(None)
    }

    /// Query `refs` by `token_text` or `symbol_id`'s owning symbol name,
    /// spec §4.12 `findUsages`.
    pub async fn find_usages(&self, token_text: Option<&str>, limit: usize) -> Result<Vec<RefHit>> {
        let Some(token_text) = token_text else { return Ok(Vec::new()) };

        let table = self.store.table(store::REFS_TABLE).await?;
        let predicate = format!("token_text = '{}'", store::escape_sql_literal(token_text));

        let mut stream = table
            .query()
            .only_if(predicate)
            .limit(limit)
            .execute()
            .await
            .map_err(|e| SearchError::Store(format!("findUsages failed: {}", e)))?;

        let mut out = Vec::new();
        while let Some(batch) = stream.try_next().await.map_err(|e| SearchError::Store(e.to_string()))? {
            let ref_ids = string_col(&batch, "ref_id")?;
            let ref_kinds = string_col(&batch, "ref_kind")?;
            let tokens = string_col(&batch, "token_text")?;
            let file_paths = string_col(&batch, "file_path")?;
            let start_lines = u64_col(&batch, "start_line")?;
            let end_lines = u64_col(&batch, "end_line")?;
            let contexts = string_col(&batch, "context_snippet")?;

            for i in 0..batch.num_rows() {
                out.push(RefHit {
                    ref_id: ref_ids[i].clone(),
                    ref_kind: ref_kinds[i].clone(),
                    token_text: tokens[i].clone(),
                    file_path: file_paths[i].clone(),
                    start_line: start_lines[i] as usize,
                    end_line: end_lines[i] as usize,
                    context_snippet: contexts[i].clone(),
                });
            }
        }
        Ok(out)
    }

    /// Return rows neighboring `(table, id)` in the same file, ordered by
    /// line, spec §4.12 `expandContext`.
    pub async fn expand_context(&self, table_name: &str, id: &str, window: usize) -> Result<Vec<ContextNeighbor>> {
        let (id_col, table_const) = match table_name {
            "symbols" => ("symbol_id", store::SYMBOLS_TABLE),
            "chunks" => ("chunk_id", store::CHUNKS_TABLE),
            _ => return Err(SearchError::InvalidConfig(format!("expandContext: unknown table {}", table_name))),
        };

        let table = self.store.table(table_const).await?;
        let anchor_predicate = format!("{} = '{}'", id_col, store::escape_sql_literal(id));
        let mut anchor_stream = table
            .query()
            .only_if(anchor_predicate)
            .select(Select::columns(&["file_path", "start_line"]))
            .limit(1)
            .execute()
            .await
            .map_err(|e| SearchError::Store(format!("expandContext anchor lookup failed: {}", e)))?;

        let Some(anchor_batch) = anchor_stream.try_next().await.map_err(|e| SearchError::Store(e.to_string()))? else {
            return Ok(Vec::new());
        };
        if anchor_batch.num_rows() == 0 {
            return Ok(Vec::new());
        }
        let file_path = string_col(&anchor_batch, "file_path")?[0].clone();
        let anchor_line = u64_col(&anchor_batch, "start_line")?[0];

        let low = anchor_line.saturating_sub(window as u64);
        let high = anchor_line + window as u64;
        let neighbor_predicate = format!(
            "file_path = '{}' AND start_line >= {} AND start_line <= {}",
            store::escape_sql_literal(&file_path),
            low,
            high
        );

        let mut stream = table
            .query()
            .only_if(neighbor_predicate)
            .execute()
            .await
            .map_err(|e| SearchError::Store(format!("expandContext neighbor query failed: {}", e)))?;

        let mut out = Vec::new();
        while let Some(batch) = stream.try_next().await.map_err(|e| SearchError::Store(e.to_string()))? {
            let ids = string_col(&batch, id_col)?;
            let file_paths = string_col(&batch, "file_path")?;
            let start_lines = u64_col(&batch, "start_line")?;
            let end_lines = u64_col(&batch, "end_line")?;
            let code_texts = string_col(&batch, "code_text")?;

            for i in 0..batch.num_rows() {
                out.push(ContextNeighbor {
                    table: table_name.to_string(),
                    id: ids[i].clone(),
                    file_path: file_paths[i].clone(),
                    start_line: start_lines[i] as usize,
                    end_line: end_lines[i] as usize,
                    code_text: code_texts[i].clone(),
                });
            }
        }
        out.sort_by_key(|n| n.start_line);
        Ok(out)
    }
}

const CHUNKS_TABLE: &str = store::CHUNKS_TABLE;

fn id_column_for(table: &str) -> &'static str {
    match table {
        "symbols" => "symbol_id",
        "chunks" => "chunk_id",
        "files" => "file_id",
        _ => "chunk_id",
    }
}

fn title_column_for(table: &str) -> &'static str {
    match table {
        "symbols" => "symbol_name",
        _ => "context_header",
    }
}

fn text_column_for(_table: &str) -> &'static str {
    "code_text"
}

fn rows_to_hits(
    batch: &arrow_array::RecordBatch,
    table: &str,
    id_col: &str,
    title_col: &str,
    text_col: &str,
    default_score: f64,
) -> Result<Vec<SearchHit>> {
    let ids = string_col(batch, id_col)?;
    let titles = string_col(batch, title_col).unwrap_or_else(|_| vec![String::new(); batch.num_rows()]);
    let texts = string_col(batch, text_col).unwrap_or_else(|_| vec![String::new(); batch.num_rows()]);
    let file_paths = string_col(batch, "file_path").unwrap_or_else(|_| vec![String::new(); batch.num_rows()]);
    let start_lines = u64_col(batch, "start_line").unwrap_or_else(|_| vec![0; batch.num_rows()]);
    let end_lines = u64_col(batch, "end_line").unwrap_or_else(|_| vec![0; batch.num_rows()]);

    let mut hits = Vec::with_capacity(batch.num_rows());
    for i in 0..batch.num_rows() {
        hits.push(SearchHit {
            table: table.to_string(),
            id: ids[i].clone(),
            file_path: file_paths[i].clone(),
            start_line: start_lines[i] as usize,
            end_line: end_lines[i] as usize,
            title: titles[i].clone(),
            snippet: texts[i].chars().take(400).collect(),
            score: default_score,
            why: None,
        });
    }
    Ok(hits)
}

fn string_col(batch: &arrow_array::RecordBatch, name: &str) -> Result<Vec<String>> {
    let col = batch
        .column_by_name(name)
        .and_then(|c| c.as_any().downcast_ref::<arrow_array::StringArray>())
        .ok_or_else(|| SearchError::Store(format!("missing string column {}", name)))?;
    Ok((0..col.len()).map(|i| if col.is_valid(i) { col.value(i).to_string() } else { String::new() }).collect())
}

fn u64_col(batch: &arrow_array::RecordBatch, name: &str) -> Result<Vec<u64>> {
    let col = batch
        .column_by_name(name)
        .and_then(|c| c.as_any().downcast_ref::<arrow_array::UInt64Array>())
        .ok_or_else(|| SearchError::Store(format!("missing u64 column {}", name)))?;
    Ok((0..col.len()).map(|i| if col.is_valid(i) { col.value(i) } else { 0 }).collect())
}

fn oversample_limit(limit: usize, multiplier: f64) -> usize {
    ((limit as f64) * multiplier).ceil() as usize
}

/// Pure reciprocal-rank fusion over two already-ranked hit lists. Exposed
/// standalone so it can be unit tested without a live store.
fn reciprocal_rank_fusion(vector_hits: &[SearchHit], fts_hits: &[SearchHit], w_vec: f64, w_bm25: f64, explain: bool) -> Vec<SearchHit> {
    let mut scores: HashMap<String, (f64, Option<usize>, Option<usize>, SearchHit)> = HashMap::new();

    for (rank, hit) in vector_hits.iter().enumerate() {
        let entry = scores.entry(hit_key(hit)).or_insert_with(|| (0.0, None, None, hit.clone()));
        entry.0 += w_vec / (RRF_K + rank as f64 + 1.0);
        entry.1 = Some(rank);
    }

    for (rank, hit) in fts_hits.iter().enumerate() {
        let entry = scores.entry(hit_key(hit)).or_insert_with(|| (0.0, None, None, hit.clone()));
        entry.0 += w_bm25 / (RRF_K + rank as f64 + 1.0);
        entry.2 = Some(rank);
    }

    let mut fused: Vec<(f64, Option<usize>, Option<usize>, SearchHit)> = scores.into_values().collect();
    fused.sort_by(|a, b| {
        b.0.partial_cmp(&a.0)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.1.unwrap_or(usize::MAX).cmp(&b.1.unwrap_or(usize::MAX)))
            .then_with(|| a.2.unwrap_or(usize::MAX).cmp(&b.2.unwrap_or(usize::MAX)))
            .then_with(|| (a.3.file_path.clone(), a.3.start_line).cmp(&(b.3.file_path.clone(), b.3.start_line)))
    });

    fused
        .into_iter()
        .map(|(score, vec_rank, fts_rank, mut hit)| {
            hit.score = score;
            if explain {
                hit.why = Some(format!(
                    "vector_rank={:?} fts_rank={:?} w_vec={:.2} w_bm25={:.2}",
                    vec_rank, fts_rank, w_vec, w_bm25
                ));
            }
            hit
        })
        .collect()
}

fn hit_key(hit: &SearchHit) -> String {
    format!("{}:{}", hit.table, hit.id)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hit(id: &str, file: &str, line: usize) -> SearchHit {
        SearchHit {
            table: "chunks".into(),
            id: id.into(),
            file_path: file.into(),
            start_line: line,
            end_line: line + 10,
            title: id.into(),
            snippet: String::new(),
            score: 0.0,
            why: None,
        }
    }

    #[test]
    fn fusion_ranks_items_present_in_both_lists_higher() {
        let vector_hits = vec![hit("a", "a.rs", 1), hit("b", "b.rs", 1), hit("c", "c.rs", 1)];
        let fts_hits = vec![hit("b", "b.rs", 1), hit("d", "d.rs", 1)];

        let fused = reciprocal_rank_fusion(&vector_hits, &fts_hits, 0.5, 0.5, false);
        assert_eq!(fused[0].id, "b");
    }

    #[test]
    fn fusion_ties_break_by_vector_rank_then_path() {
        let vector_hits = vec![hit("a", "a.rs", 1)];
        let fts_hits = vec![];
        let fused = reciprocal_rank_fusion(&vector_hits, &fts_hits, 0.5, 0.5, false);
        assert_eq!(fused.len(), 1);
        assert_eq!(fused[0].id, "a");
    }

    #[test]
    fn explain_blob_is_only_populated_when_requested() {
        let vector_hits = vec![hit("a", "a.rs", 1)];
        let fused_without = reciprocal_rank_fusion(&vector_hits, &[], 0.5, 0.5, false);
        let fused_with = reciprocal_rank_fusion(&vector_hits, &[], 0.5, 0.5, true);
        assert!(fused_without[0].why.is_none());
        assert!(fused_with[0].why.is_some());
    }

    #[test]
    fn filter_compilation_escapes_like_wildcards() {
        let filters = SearchFilters { path_prefix: Some("src/100%_done".into()), ..Default::default() };
        let predicate = filters.to_predicate().unwrap();
        assert!(predicate.contains("100\\%\\_done"));
    }

    #[test]
    fn no_filters_produces_no_predicate() {
        assert!(SearchFilters::default().to_predicate().is_none());
    }

    #[test]
    fn oversample_limit_scales_with_multiplier() {
        assert_eq!(oversample_limit(10, 2.0), 20);
        assert_eq!(oversample_limit(10, 4.0), 40);
    }
}
