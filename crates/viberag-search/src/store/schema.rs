//! Arrow schemas for the five typed tables (spec §4.8, §3).

use std::sync::Arc;

use arrow_schema::{DataType, Field, Schema};

fn vector_field(name: &str, dim: usize) -> Field {
    Field::new(
        name,
        DataType::FixedSizeList(Arc::new(Field::new("item", DataType::Float32, false)), dim as i32),
        true,
    )
}

fn string_list_field(name: &str) -> Field {
    Field::new(name, DataType::List(Arc::new(Field::new("item", DataType::Utf8, true))), false)
}

pub fn symbols_schema(dim: usize) -> Arc<Schema> {
    Arc::new(Schema::new(vec![
        Field::new("symbol_id", DataType::Utf8, false),
        Field::new("repo_id", DataType::Utf8, false),
        Field::new("revision", DataType::Utf8, false),
        Field::new("file_path", DataType::Utf8, false),
        Field::new("extension", DataType::Utf8, false),
        Field::new("language_hint", DataType::Utf8, true),
        Field::new("start_line", DataType::UInt64, false),
        Field::new("end_line", DataType::UInt64, false),
        Field::new("start_byte", DataType::UInt64, false),
        Field::new("end_byte", DataType::UInt64, false),
        Field::new("symbol_kind", DataType::Utf8, false),
        Field::new("symbol_name", DataType::Utf8, false),
        Field::new("qualname", DataType::Utf8, false),
        Field::new("parent_symbol_id", DataType::Utf8, true),
        Field::new("signature", DataType::Utf8, true),
        Field::new("docstring", DataType::Utf8, true),
        Field::new("is_exported", DataType::Boolean, false),
        string_list_field("decorator_names"),
        Field::new("context_header", DataType::Utf8, false),
        Field::new("code_text", DataType::Utf8, false),
        Field::new("search_text", DataType::Utf8, false),
        Field::new("identifiers_text", DataType::Utf8, false),
        string_list_field("identifiers"),
        string_list_field("identifier_parts"),
        string_list_field("called_names"),
        string_list_field("string_literals"),
        Field::new("content_hash", DataType::Utf8, false),
        Field::new("file_hash", DataType::Utf8, false),
        vector_field("vec_summary", dim),
    ]))
}

pub fn chunks_schema(dim: usize) -> Arc<Schema> {
    Arc::new(Schema::new(vec![
        Field::new("chunk_id", DataType::Utf8, false),
        Field::new("owner_symbol_id", DataType::Utf8, true),
        Field::new("chunk_kind", DataType::Utf8, false),
        Field::new("repo_id", DataType::Utf8, false),
        Field::new("revision", DataType::Utf8, false),
        Field::new("file_path", DataType::Utf8, false),
        Field::new("extension", DataType::Utf8, false),
        Field::new("start_line", DataType::UInt64, false),
        Field::new("end_line", DataType::UInt64, false),
        Field::new("start_byte", DataType::UInt64, false),
        Field::new("end_byte", DataType::UInt64, false),
        Field::new("context_header", DataType::Utf8, false),
        Field::new("code_text", DataType::Utf8, false),
        Field::new("search_text", DataType::Utf8, false),
        Field::new("content_hash", DataType::Utf8, false),
        Field::new("file_hash", DataType::Utf8, false),
        vector_field("vec_code", dim),
    ]))
}

pub fn files_schema(dim: usize) -> Arc<Schema> {
    Arc::new(Schema::new(vec![
        Field::new("file_id", DataType::Utf8, false),
        Field::new("file_hash", DataType::Utf8, false),
        string_list_field("imports"),
        string_list_field("exports"),
        Field::new("top_level_doc", DataType::Utf8, true),
        Field::new("summary", DataType::Utf8, false),
        vector_field("vec_file", dim),
    ]))
}

pub fn refs_schema() -> Arc<Schema> {
    Arc::new(Schema::new(vec![
        Field::new("ref_id", DataType::Utf8, false),
        Field::new("ref_kind", DataType::Utf8, false),
        Field::new("token_text", DataType::Utf8, false),
        Field::new("context_snippet", DataType::Utf8, false),
        Field::new("start_byte", DataType::UInt64, false),
        Field::new("end_byte", DataType::UInt64, false),
        Field::new("start_line", DataType::UInt64, false),
        Field::new("end_line", DataType::UInt64, false),
        Field::new("module_name", DataType::Utf8, true),
        Field::new("imported_name", DataType::Utf8, true),
        Field::new("file_path", DataType::Utf8, false),
    ]))
}

pub fn embedding_cache_schema(dim: usize) -> Arc<Schema> {
    Arc::new(Schema::new(vec![
        Field::new("input_hash", DataType::Utf8, false),
        vector_field("vector", dim),
        Field::new("created_at", DataType::Utf8, false),
    ]))
}

/// The vector column name for each table, or `None` for tables with no
/// vector column (`refs`).
pub fn vector_column(table: &str) -> Option<&'static str> {
    match table {
        "symbols" => Some("vec_summary"),
        "chunks" => Some("vec_code"),
        "files" => Some("vec_file"),
        "embedding_cache" => Some("vector"),
        _ => None,
    }
}
