//! Conversions from typed row structs (`viberag_core::model`) to Arrow
//! `RecordBatch`es, and back for reads that need them.

use std::sync::Arc;

use arrow_array::builder::{ListBuilder, StringBuilder};
use arrow_array::{
    ArrayRef, BooleanArray, Float32Array, RecordBatch, StringArray, UInt64Array,
};
use arrow_array::FixedSizeListArray;
use arrow_buffer::NullBuffer;
use arrow_schema::{Field, Schema};

use viberag_core::model::{ChunkRow, EmbeddingCacheRow, FileRow, RefRow, SymbolRow};

use super::schema;
use crate::error::{Result, SearchError};

pub fn string_column(values: Vec<String>) -> ArrayRef {
    Arc::new(StringArray::from(values))
}

pub fn opt_string_column(values: Vec<Option<String>>) -> ArrayRef {
    Arc::new(StringArray::from(values))
}

pub fn bool_column(values: Vec<bool>) -> ArrayRef {
    Arc::new(BooleanArray::from(values))
}

pub fn u64_column(values: Vec<u64>) -> ArrayRef {
    Arc::new(UInt64Array::from(values))
}

pub fn string_list_column(values: &[Vec<String>]) -> ArrayRef {
    let mut builder = ListBuilder::new(StringBuilder::new());
    for row in values {
        for item in row {
            builder.values().append_value(item);
        }
        builder.append(true);
    }
    Arc::new(builder.finish())
}

/// A fixed-size-list float32 column; `None` rows are null entries, not
/// zero-filled, so "not yet embedded" is queryable distinctly from a
/// zero vector.
pub fn vector_column(dim: usize, values: &[Option<Vec<f32>>]) -> Result<ArrayRef> {
    let mut flat = Vec::with_capacity(values.len() * dim);
    let mut validity = Vec::with_capacity(values.len());

    for v in values {
        match v {
            Some(vec) => {
                if vec.len() != dim {
                    return Err(SearchError::DimensionMismatch { expected: dim, actual: vec.len() });
                }
                flat.extend_from_slice(vec);
                validity.push(true);
            }
            None => {
                flat.extend(std::iter::repeat(0.0_f32).take(dim));
                validity.push(false);
            }
        }
    }

    let item_field = Arc::new(Field::new("item", arrow_schema::DataType::Float32, false));
    let values_array: ArrayRef = Arc::new(Float32Array::from(flat));
    let nulls = NullBuffer::from(validity);
    let list = FixedSizeListArray::try_new(item_field, dim as i32, values_array, Some(nulls))
        .map_err(|e| SearchError::Store(format!("failed to build vector column: {}", e)))?;
    Ok(Arc::new(list))
}

pub fn symbol_rows_to_batch(rows: &[SymbolRow], dim: usize) -> Result<RecordBatch> {
    let schema = schema::symbols_schema(dim);
    let n = rows.len();

    let mut identifiers_text = Vec::with_capacity(n);
    let mut decorators = Vec::with_capacity(n);
    let mut identifiers = Vec::with_capacity(n);
    let mut identifier_parts = Vec::with_capacity(n);
    let mut called_names = Vec::with_capacity(n);
    let mut string_literals = Vec::with_capacity(n);

    for r in rows {
        identifiers_text.push(r.identifiers_text.clone());
        decorators.push(r.decorator_names.clone());
        identifiers.push(r.identifiers.clone());
        identifier_parts.push(r.identifier_parts.clone());
        called_names.push(r.called_names.clone());
        string_literals.push(r.string_literals.clone());
    }

    let columns: Vec<ArrayRef> = vec![
        string_column(rows.iter().map(|r| r.symbol_id.clone()).collect()),
        string_column(rows.iter().map(|r| r.repo_id.clone()).collect()),
        string_column(rows.iter().map(|r| r.revision.clone()).collect()),
        string_column(rows.iter().map(|r| r.file_path.clone()).collect()),
        string_column(rows.iter().map(|r| r.extension.clone()).collect()),
        opt_string_column(rows.iter().map(|r| r.language_hint.clone()).collect()),
        u64_column(rows.iter().map(|r| r.start_line as u64).collect()),
        u64_column(rows.iter().map(|r| r.end_line as u64).collect()),
        u64_column(rows.iter().map(|r| r.start_byte as u64).collect()),
        u64_column(rows.iter().map(|r| r.end_byte as u64).collect()),
        string_column(rows.iter().map(|r| r.symbol_kind.clone()).collect()),
        string_column(rows.iter().map(|r| r.symbol_name.clone()).collect()),
        string_column(rows.iter().map(|r| r.qualname.clone()).collect()),
        opt_string_column(rows.iter().map(|r| r.parent_symbol_id.clone()).collect()),
        opt_string_column(rows.iter().map(|r| r.signature.clone()).collect()),
        opt_string_column(rows.iter().map(|r| r.docstring.clone()).collect()),
        bool_column(rows.iter().map(|r| r.is_exported).collect()),
        string_list_column(&decorators),
        string_column(rows.iter().map(|r| r.context_header.clone()).collect()),
        string_column(rows.iter().map(|r| r.code_text.clone()).collect()),
        string_column(rows.iter().map(|r| r.search_text.clone()).collect()),
        string_column(identifiers_text),
        string_list_column(&identifiers),
        string_list_column(&identifier_parts),
        string_list_column(&called_names),
        string_list_column(&string_literals),
        string_column(rows.iter().map(|r| r.content_hash.clone()).collect()),
        string_column(rows.iter().map(|r| r.file_hash.clone()).collect()),
        vector_column(dim, &rows.iter().map(|r| r.vec_summary.clone()).collect::<Vec<_>>())?,
    ];

    RecordBatch::try_new(schema, columns).map_err(|e| SearchError::Store(format!("symbols batch build failed: {}", e)))
}

pub fn chunk_rows_to_batch(rows: &[ChunkRow], dim: usize) -> Result<RecordBatch> {
    let schema = schema::chunks_schema(dim);

    let columns: Vec<ArrayRef> = vec![
        string_column(rows.iter().map(|r| r.chunk_id.clone()).collect()),
        opt_string_column(rows.iter().map(|r| r.owner_symbol_id.clone()).collect()),
        string_column(rows.iter().map(|r| r.chunk_kind.clone()).collect()),
        string_column(rows.iter().map(|r| r.repo_id.clone()).collect()),
        string_column(rows.iter().map(|r| r.revision.clone()).collect()),
        string_column(rows.iter().map(|r| r.file_path.clone()).collect()),
        string_column(rows.iter().map(|r| r.extension.clone()).collect()),
        u64_column(rows.iter().map(|r| r.start_line as u64).collect()),
        u64_column(rows.iter().map(|r| r.end_line as u64).collect()),
        u64_column(rows.iter().map(|r| r.start_byte as u64).collect()),
        u64_column(rows.iter().map(|r| r.end_byte as u64).collect()),
        string_column(rows.iter().map(|r| r.context_header.clone()).collect()),
        string_column(rows.iter().map(|r| r.code_text.clone()).collect()),
        string_column(rows.iter().map(|r| r.search_text.clone()).collect()),
        string_column(rows.iter().map(|r| r.content_hash.clone()).collect()),
        string_column(rows.iter().map(|r| r.file_hash.clone()).collect()),
        vector_column(dim, &rows.iter().map(|r| r.vec_code.clone()).collect::<Vec<_>>())?,
    ];

    RecordBatch::try_new(schema, columns).map_err(|e| SearchError::Store(format!("chunks batch build failed: {}", e)))
}

pub fn file_rows_to_batch(rows: &[FileRow], dim: usize) -> Result<RecordBatch> {
    let schema = schema::files_schema(dim);
    let imports: Vec<Vec<String>> = rows.iter().map(|r| r.imports.clone()).collect();
    let exports: Vec<Vec<String>> = rows.iter().map(|r| r.exports.clone()).collect();

    let columns: Vec<ArrayRef> = vec![
        string_column(rows.iter().map(|r| r.file_id.clone()).collect()),
        string_column(rows.iter().map(|r| r.file_hash.clone()).collect()),
        string_list_column(&imports),
        string_list_column(&exports),
        opt_string_column(rows.iter().map(|r| r.top_level_doc.clone()).collect()),
        string_column(rows.iter().map(|r| r.summary.clone()).collect()),
        vector_column(dim, &rows.iter().map(|r| r.vec_file.clone()).collect::<Vec<_>>())?,
    ];

    RecordBatch::try_new(schema, columns).map_err(|e| SearchError::Store(format!("files batch build failed: {}", e)))
}

pub fn ref_rows_to_batch(rows: &[RefRow]) -> Result<RecordBatch> {
    let schema = schema::refs_schema();

    let columns: Vec<ArrayRef> = vec![
        string_column(rows.iter().map(|r| r.ref_id.clone()).collect()),
        string_column(rows.iter().map(|r| r.ref_kind.as_str().to_string()).collect()),
        string_column(rows.iter().map(|r| r.token_text.clone()).collect()),
        string_column(rows.iter().map(|r| r.context_snippet.clone()).collect()),
        u64_column(rows.iter().map(|r| r.start_byte as u64).collect()),
        u64_column(rows.iter().map(|r| r.end_byte as u64).collect()),
        u64_column(rows.iter().map(|r| r.start_line as u64).collect()),
        u64_column(rows.iter().map(|r| r.end_line as u64).collect()),
        opt_string_column(rows.iter().map(|r| r.module_name.clone()).collect()),
        opt_string_column(rows.iter().map(|r| r.imported_name.clone()).collect()),
        string_column(rows.iter().map(|r| r.file_path.clone()).collect()),
    ];

    RecordBatch::try_new(schema, columns).map_err(|e| SearchError::Store(format!("refs batch build failed: {}", e)))
}

pub fn embedding_cache_rows_to_batch(rows: &[EmbeddingCacheRow], dim: usize) -> Result<RecordBatch> {
    let schema = schema::embedding_cache_schema(dim);

    let columns: Vec<ArrayRef> = vec![
        string_column(rows.iter().map(|r| r.input_hash.clone()).collect()),
        vector_column(dim, &rows.iter().map(|r| Some(r.vector.clone())).collect::<Vec<_>>())?,
        string_column(rows.iter().map(|r| r.created_at.to_rfc3339()).collect()),
    ];

    RecordBatch::try_new(schema, columns).map_err(|e| SearchError::Store(format!("embedding_cache batch build failed: {}", e)))
}

/// Width of the fixed-size-list vector column in an existing schema, if any.
pub fn vector_dim_in_schema(schema: &Schema, column: &str) -> Option<usize> {
    let field = schema.field_with_name(column).ok()?;
    match field.data_type() {
        arrow_schema::DataType::FixedSizeList(_, size) => Some(*size as usize),
        _ => None,
    }
}
