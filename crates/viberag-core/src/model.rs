//! Data model shared across the indexing pipeline (spec §3).

use serde::{Deserialize, Serialize};

/// Kind of a semantic chunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChunkKind {
    Function,
    Class,
    Method,
    Module,
}

impl ChunkKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChunkKind::Function => "function",
            ChunkKind::Class => "class",
            ChunkKind::Method => "method",
            ChunkKind::Module => "module",
        }
    }
}

/// A semantic fragment of one file, in legacy (function/class/method/module) mode.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Chunk {
    pub kind: ChunkKind,
    /// Empty for module chunks.
    pub symbol_name: String,
    /// 1-indexed, inclusive.
    pub start_line: usize,
    /// 1-indexed, inclusive.
    pub end_line: usize,
    pub start_byte: usize,
    pub end_byte: usize,
    pub text: String,
    pub context_header: String,
    pub content_hash: String,
    pub is_continuation: bool,
    pub signature: Option<String>,
    pub docstring: Option<String>,
    pub is_exported: bool,
    pub decorator_names: Vec<String>,
}

/// Richer v2 row describing a symbol (spec §3, "Symbol row").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SymbolRow {
    pub symbol_id: String,
    pub repo_id: String,
    pub revision: String,
    pub file_path: String,
    pub extension: String,
    pub language_hint: Option<String>,
    pub start_line: usize,
    pub end_line: usize,
    pub start_byte: usize,
    pub end_byte: usize,

    pub symbol_kind: String,
    pub symbol_name: String,
    pub qualname: String,
    pub parent_symbol_id: Option<String>,
    pub signature: Option<String>,
    pub docstring: Option<String>,
    pub is_exported: bool,
    pub decorator_names: Vec<String>,

    pub context_header: String,
    pub code_text: String,
    pub search_text: String,

    pub identifiers_text: String,
    pub identifiers: Vec<String>,
    pub identifier_parts: Vec<String>,
    pub called_names: Vec<String>,
    pub string_literals: Vec<String>,

    pub content_hash: String,
    pub file_hash: String,

    /// Dense vector, populated after embedding. `None` until embedded.
    pub vec_summary: Option<Vec<f32>>,
}

/// Richer v2 row describing a chunk (spec §3, "Chunk row").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkRow {
    pub chunk_id: String,
    pub owner_symbol_id: Option<String>,
    pub chunk_kind: String,
    pub repo_id: String,
    pub revision: String,
    pub file_path: String,
    pub extension: String,
    pub start_line: usize,
    pub end_line: usize,
    pub start_byte: usize,
    pub end_byte: usize,

    pub context_header: String,
    pub code_text: String,
    pub search_text: String,

    pub content_hash: String,
    pub file_hash: String,

    pub vec_code: Option<Vec<f32>>,
}

/// Per-file summary row (spec §3, "File row").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileRow {
    pub file_id: String,
    pub file_hash: String,
    pub imports: Vec<String>,
    pub exports: Vec<String>,
    pub top_level_doc: Option<String>,
    pub summary: String,
    pub vec_file: Option<Vec<f32>>,
}

/// Kind of a token-level reference.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RefKind {
    Import,
    Call,
    Identifier,
    StringLiteral,
}

impl RefKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            RefKind::Import => "import",
            RefKind::Call => "call",
            RefKind::Identifier => "identifier",
            RefKind::StringLiteral => "string_literal",
        }
    }
}

/// Token-level fact occurrence (spec §3, "Ref row").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RefRow {
    pub ref_id: String,
    pub ref_kind: RefKind,
    pub token_text: String,
    pub context_snippet: String,
    pub start_byte: usize,
    pub end_byte: usize,
    pub start_line: usize,
    pub end_line: usize,
    pub module_name: Option<String>,
    pub imported_name: Option<String>,
    pub file_path: String,
}

/// Content-addressed embedding cache row (spec §3, "Embedding-cache row").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingCacheRow {
    pub input_hash: String,
    pub vector: Vec<f32>,
    pub created_at: chrono::DateTime<chrono::Utc>,
}

/// The set of rows produced by chunking+extracting one file, in richer mode.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FileRows {
    pub symbols: Vec<SymbolRow>,
    pub chunks: Vec<ChunkRow>,
    pub file: Option<FileRow>,
    pub refs: Vec<RefRow>,
}
