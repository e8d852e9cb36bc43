//! Typed, content-addressed vector+FTS store facade over LanceDB
//! (spec §4.8).

mod rows;
mod schema;

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use arrow_array::{Array, FixedSizeListArray, Float32Array, RecordBatch, RecordBatchIterator, StringArray};
use futures::TryStreamExt;
use lancedb::query::{ExecutableQuery, QueryBase, Select};
use lancedb::{Connection, Table};
use tracing::warn;

use viberag_core::model::{ChunkRow, EmbeddingCacheRow, FileRow, RefRow, SymbolRow};

use crate::error::{Result, SearchError};

pub const SYMBOLS_TABLE: &str = "symbols";
pub const CHUNKS_TABLE: &str = "chunks";
pub const FILES_TABLE: &str = "files";
pub const REFS_TABLE: &str = "refs";
pub const EMBEDDING_CACHE_TABLE: &str = "embedding_cache";

const ALL_TABLES: [&str; 4] = [SYMBOLS_TABLE, CHUNKS_TABLE, FILES_TABLE, REFS_TABLE];

/// Escapes a string literal for embedding in a `where`/`only_if` clause.
pub fn escape_sql_literal(value: &str) -> String {
    value.replace('\'', "''")
}

/// Escapes a value for use inside a `LIKE` pattern, in addition to
/// single-quote escaping.
pub fn escape_like_pattern(value: &str) -> String {
    escape_sql_literal(value).replace('%', "\\%").replace('_', "\\_")
}

pub struct Store {
    connection: Connection,
    dim: usize,
}

impl Store {
    /// Opens (or creates) every table. Tables whose existing vector column
    /// width doesn't match `dim` are dropped and recreated so the indexer
    /// repopulates them from scratch.
    pub async fn connect(path: &Path, dim: usize) -> Result<Self> {
        let uri = path.to_string_lossy().to_string();
        let connection = lancedb::connect(&uri)
            .execute()
            .await
            .map_err(|e| SearchError::StoreIo(format!("failed to open lancedb at {}: {}", uri, e)))?;

        let store = Self { connection, dim };
        store.ensure_tables().await?;
        Ok(store)
    }

    async fn ensure_tables(&self) -> Result<()> {
        self.ensure_table(SYMBOLS_TABLE, schema::symbols_schema(self.dim), "vec_summary").await?;
        self.ensure_table(CHUNKS_TABLE, schema::chunks_schema(self.dim), "vec_code").await?;
        self.ensure_table(FILES_TABLE, schema::files_schema(self.dim), "vec_file").await?;
        self.ensure_table_no_vector(REFS_TABLE, schema::refs_schema()).await?;
        self.ensure_table(EMBEDDING_CACHE_TABLE, schema::embedding_cache_schema(self.dim), "vector").await?;
        Ok(())
    }

    async fn ensure_table(&self, name: &str, expected_schema: Arc<arrow_schema::Schema>, vector_column: &str) -> Result<()> {
        match self.connection.open_table(name).execute().await {
            Ok(table) => {
                let existing_schema = table
                    .schema()
                    .await
                    .map_err(|e| SearchError::Store(format!("failed to read schema for {}: {}", name, e)))?;

                let existing_dim = rows::vector_dim_in_schema(&existing_schema, vector_column);
                if existing_dim != Some(self.dim) {
                    warn!(table = name, existing = ?existing_dim, expected = self.dim, "vector dimension mismatch, recreating table");
                    self.connection
                        .drop_table(name)
                        .await
                        .map_err(|e| SearchError::Store(format!("failed to drop {}: {}", name, e)))?;
                    self.create_empty_table(name, expected_schema).await?;
                }
                Ok(())
            }
            Err(_) => self.create_empty_table(name, expected_schema).await,
        }
    }

    async fn ensure_table_no_vector(&self, name: &str, expected_schema: Arc<arrow_schema::Schema>) -> Result<()> {
        match self.connection.open_table(name).execute().await {
            Ok(_) => Ok(()),
            Err(_) => self.create_empty_table(name, expected_schema).await,
        }
    }

    async fn create_empty_table(&self, name: &str, schema: Arc<arrow_schema::Schema>) -> Result<()> {
        let empty = RecordBatch::new_empty(schema.clone());
        let reader = RecordBatchIterator::new(vec![Ok(empty)], schema);
        self.connection
            .create_table(name, Box::new(reader))
            .execute()
            .await
            .map_err(|e| SearchError::Store(format!("failed to create table {}: {}", name, e)))?;
        Ok(())
    }

    async fn open(&self, name: &str) -> Result<Table> {
        self.connection
            .open_table(name)
            .execute()
            .await
            .map_err(|e| SearchError::Store(format!("failed to open table {}: {}", name, e)))
    }

    async fn upsert_batch(&self, table_name: &str, batch: RecordBatch, key_columns: &[&str]) -> Result<()> {
        let table = self.open(table_name).await?;
        let schema = batch.schema();
        let reader = RecordBatchIterator::new(vec![Ok(batch)], schema);

        let keys: Vec<String> = key_columns.iter().map(|k| k.to_string()).collect();
        table
            .merge_insert(&keys.iter().map(String::as_str).collect::<Vec<_>>())
            .when_matched_update_all(None)
            .when_not_matched_insert_all()
            .execute(Box::new(reader))
            .await
            .map_err(|e| SearchError::Store(format!("merge-insert into {} failed: {}", table_name, e)))?;
        Ok(())
    }

    async fn add_batch(&self, table_name: &str, batch: RecordBatch) -> Result<()> {
        let table = self.open(table_name).await?;
        let schema = batch.schema();
        let reader = RecordBatchIterator::new(vec![Ok(batch)], schema);
        table
            .add(Box::new(reader))
            .execute()
            .await
            .map_err(|e| SearchError::Store(format!("add into {} failed: {}", table_name, e)))?;
        Ok(())
    }

    pub async fn upsert_symbols(&self, rows: &[SymbolRow]) -> Result<()> {
        if rows.is_empty() {
            return Ok(());
        }
        let batch = rows::symbol_rows_to_batch(rows, self.dim)?;
        self.upsert_batch(SYMBOLS_TABLE, batch, &["symbol_id"]).await
    }

    pub async fn upsert_chunks(&self, rows: &[ChunkRow]) -> Result<()> {
        if rows.is_empty() {
            return Ok(());
        }
        let batch = rows::chunk_rows_to_batch(rows, self.dim)?;
        self.upsert_batch(CHUNKS_TABLE, batch, &["chunk_id"]).await
    }

    pub async fn upsert_files(&self, rows: &[FileRow]) -> Result<()> {
        if rows.is_empty() {
            return Ok(());
        }
        let batch = rows::file_rows_to_batch(rows, self.dim)?;
        self.upsert_batch(FILES_TABLE, batch, &["file_id"]).await
    }

    pub async fn add_refs(&self, rows: &[RefRow]) -> Result<()> {
        if rows.is_empty() {
            return Ok(());
        }
        let batch = rows::ref_rows_to_batch(rows)?;
        self.add_batch(REFS_TABLE, batch).await
    }

    /// Deletes all rows across entity tables for `file_path`, returning the
    /// number of rows removed.
    pub async fn delete_by_file_path(&self, file_path: &str) -> Result<usize> {
        let escaped = escape_sql_literal(file_path);
        let predicate = format!("file_path = '{}'", escaped);
        let mut total = 0usize;

        for table_name in ALL_TABLES {
            let table = self.open(table_name).await?;
            let before = self.count_rows(table_name, Some(&predicate)).await?;
            if before == 0 {
                continue;
            }
            table
                .delete(&predicate)
                .await
                .map_err(|e| SearchError::Store(format!("delete from {} failed: {}", table_name, e)))?;
            total += before;
        }

        Ok(total)
    }

    pub async fn count_rows(&self, table_name: &str, predicate: Option<&str>) -> Result<usize> {
        let table = self.open(table_name).await?;
        table
            .count_rows(predicate.map(str::to_string))
            .await
            .map_err(|e| SearchError::Store(format!("count_rows on {} failed: {}", table_name, e)))
    }

    /// Batched `IN` lookup against `embedding_cache`.
    pub async fn get_cached_embeddings(&self, input_hashes: &[String]) -> Result<HashMap<String, Vec<f32>>> {
        let mut out = HashMap::new();
        if input_hashes.is_empty() {
            return Ok(out);
        }

        let table = self.open(EMBEDDING_CACHE_TABLE).await?;
        let quoted: Vec<String> = input_hashes.iter().map(|h| format!("'{}'", escape_sql_literal(h))).collect();
        let predicate = format!("input_hash IN ({})", quoted.join(", "));

        let mut stream = table
            .query()
            .only_if(predicate)
            .select(Select::columns(&["input_hash", "vector"]))
            .execute()
            .await
            .map_err(|e| SearchError::Store(format!("embedding cache lookup failed: {}", e)))?;

        while let Some(batch) = stream
            .try_next()
            .await
            .map_err(|e| SearchError::Store(format!("embedding cache stream failed: {}", e)))?
        {
            let hashes = batch
                .column_by_name("input_hash")
                .and_then(|c| c.as_any().downcast_ref::<StringArray>())
                .ok_or_else(|| SearchError::Store("missing input_hash column".into()))?;
            let vectors = batch
                .column_by_name("vector")
                .and_then(|c| c.as_any().downcast_ref::<FixedSizeListArray>())
                .ok_or_else(|| SearchError::Store("missing vector column".into()))?;

            for i in 0..batch.num_rows() {
                if !hashes.is_valid(i) || !vectors.is_valid(i) {
                    continue;
                }
                let values = vectors.value(i);
                let floats = values
                    .as_any()
                    .downcast_ref::<Float32Array>()
                    .ok_or_else(|| SearchError::Store("vector column is not float32".into()))?;
                out.insert(hashes.value(i).to_string(), floats.values().to_vec());
            }
        }

        Ok(out)
    }

    pub async fn cache_embeddings(&self, rows: &[EmbeddingCacheRow]) -> Result<()> {
        if rows.is_empty() {
            return Ok(());
        }
        let batch = rows::embedding_cache_rows_to_batch(rows, self.dim)?;
        self.upsert_batch(EMBEDDING_CACHE_TABLE, batch, &["input_hash"]).await
    }

    /// Drops and recreates all entity tables (not `embedding_cache` unless
    /// `drop_cache` is set).
    pub async fn reset_entity_tables(&self, drop_cache: bool) -> Result<()> {
        for table_name in ALL_TABLES {
            self.connection
                .drop_table(table_name)
                .await
                .map_err(|e| SearchError::Store(format!("failed to drop {}: {}", table_name, e)))?;
        }
        if drop_cache {
            self.connection
                .drop_table(EMBEDDING_CACHE_TABLE)
                .await
                .map_err(|e| SearchError::Store(format!("failed to drop {}: {}", EMBEDDING_CACHE_TABLE, e)))?;
        }
        self.ensure_tables().await
    }

    pub fn dim(&self) -> usize {
        self.dim
    }

    pub(crate) async fn table(&self, name: &str) -> Result<Table> {
        self.open(name).await
    }
}

/// Converts an L2 distance on normalized vectors to a similarity in (0, 1].
pub fn distance_to_similarity(distance: f32) -> f32 {
    1.0 / (1.0 + distance)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn escapes_single_quotes() {
        assert_eq!(escape_sql_literal("O'Brien"), "O''Brien");
    }

    #[test]
    fn escapes_like_wildcards() {
        assert_eq!(escape_like_pattern("100%_done"), "100\\%\\_done");
    }

    #[test]
    fn distance_converts_to_similarity_in_unit_range() {
        assert!((distance_to_similarity(0.0) - 1.0).abs() < 1e-6);
        assert!(distance_to_similarity(1.0) < 1.0);
        assert!(distance_to_similarity(1.0) > 0.0);
    }

    #[tokio::test]
    async fn connect_creates_all_tables() {
        let dir = tempfile::TempDir::new().unwrap();
        let store = Store::connect(dir.path(), 4).await.unwrap();
        for name in ALL_TABLES.iter().chain([EMBEDDING_CACHE_TABLE].iter()) {
            assert_eq!(store.count_rows(name, None).await.unwrap(), 0);
        }
    }

    #[tokio::test]
    async fn reconnecting_with_a_different_dimension_recreates_tables() {
        let dir = tempfile::TempDir::new().unwrap();
        {
            let _store = Store::connect(dir.path(), 4).await.unwrap();
        }
        let store = Store::connect(dir.path(), 8).await.unwrap();
        assert_eq!(store.dim(), 8);
    }

    #[tokio::test]
    async fn cache_embeddings_round_trips() {
        let dir = tempfile::TempDir::new().unwrap();
        let store = Store::connect(dir.path(), 3).await.unwrap();

        let rows = vec![EmbeddingCacheRow {
            input_hash: "abc123".into(),
            vector: vec![0.1, 0.2, 0.3],
            created_at: chrono::Utc::now(),
        }];
        store.cache_embeddings(&rows).await.unwrap();

        let fetched = store.get_cached_embeddings(&["abc123".to_string(), "missing".to_string()]).await.unwrap();
        assert_eq!(fetched.len(), 1);
        assert_eq!(fetched["abc123"], vec![0.1, 0.2, 0.3]);
    }
}
