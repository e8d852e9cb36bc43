//! Tree-sitter based chunker (spec §4.5).
//!
//! Parses a file with a language-specific grammar and walks the syntax
//! tree with a parent-class context stack, emitting one chunk per class
//! definition, top-level function, and method. Extraction of query-file
//! assets (`.scm` patterns) was not available in this build's retrieval
//! pack, so extraction walks `Node`/`TreeCursor` directly instead of
//! compiled tree-sitter queries.

use crate::hash::hash_string;
use crate::model::{Chunk, ChunkKind};
use std::path::Path;
use tree_sitter::{Node, Parser, Tree};

/// Chunks smaller than this (after splitting) are candidates for merging
/// with an adjacent chunk of the same kind and enclosing context.
pub const MIN_CHUNK_SIZE: usize = 100;

/// Supported languages. Anything else falls back to a single module chunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Language {
    Python,
    JavaScript,
    TypeScript,
    Rust,
    Go,
}

impl Language {
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext {
            "py" | "pyi" => Some(Language::Python),
            "js" | "jsx" | "mjs" | "cjs" => Some(Language::JavaScript),
            "ts" | "tsx" => Some(Language::TypeScript),
            "rs" => Some(Language::Rust),
            "go" => Some(Language::Go),
            _ => None,
        }
    }

    fn ts_language(self) -> tree_sitter::Language {
        match self {
            Language::Python => tree_sitter_python::LANGUAGE.into(),
            Language::JavaScript => tree_sitter_javascript::LANGUAGE.into(),
            Language::TypeScript => tree_sitter_typescript::LANGUAGE_TYPESCRIPT.into(),
            Language::Rust => tree_sitter_rust::LANGUAGE.into(),
            Language::Go => tree_sitter_go::LANGUAGE.into(),
        }
    }
}

/// One definition found by the AST walk, before size-limit enforcement.
struct RawDefinition {
    kind: ChunkKind,
    name: String,
    enclosing_class: Option<String>,
    start_byte: usize,
    end_byte: usize,
    start_line: usize,
    end_line: usize,
    decorator_names: Vec<String>,
    docstring: Option<String>,
    is_exported: bool,
}

/// Parse `content` as `language` and return the raw tree, or `None` if
/// parsing fails outright (never panics; falls back to a module chunk).
fn parse(content: &str, language: Language) -> Option<Tree> {
    let mut parser = Parser::new();
    parser.set_language(&language.ts_language()).ok()?;
    parser.parse(content, None)
}

/// Chunk one file's content into an ordered list of [`Chunk`]s (spec §3).
///
/// Falls back to a single module chunk when no grammar matches the
/// extension or the parser fails; never panics.
pub fn chunk_file(file_path: &Path, content: &str, max_chunk_size: usize) -> Vec<Chunk> {
    let language = file_path
        .extension()
        .and_then(|e| e.to_str())
        .and_then(Language::from_extension);

    let defs = match language.and_then(|lang| parse(content, lang).map(|t| (lang, t))) {
        Some((lang, tree)) => extract_definitions(&tree, content.as_bytes(), lang),
        None => Vec::new(),
    };

    let file_label = file_path.to_string_lossy().replace('\\', "/");

    let raw_chunks: Vec<Chunk> = if defs.is_empty() {
        vec![module_chunk(&file_label, content)]
    } else {
        defs.into_iter()
            .map(|d| definition_to_chunk(&file_label, content, d))
            .collect()
    };

    let split = raw_chunks
        .into_iter()
        .flat_map(|c| split_if_oversized(c, max_chunk_size))
        .collect::<Vec<_>>();

    merge_small_adjacent(split, max_chunk_size)
}

fn module_chunk(file_label: &str, content: &str) -> Chunk {
    let context_header = format!("// File: {}", file_label);
    let line_count = content.lines().count().max(1);
    Chunk {
        kind: ChunkKind::Module,
        symbol_name: String::new(),
        start_line: 1,
        end_line: line_count,
        start_byte: 0,
        end_byte: content.len(),
        content_hash: hash_string(&format!("{}\n{}", context_header, content)),
        text: content.to_string(),
        context_header,
        is_continuation: false,
        signature: None,
        docstring: None,
        is_exported: false,
        decorator_names: Vec::new(),
    }
}

fn definition_to_chunk(file_label: &str, source: &str, def: RawDefinition) -> Chunk {
    let text = byte_slice_to_string(source, def.start_byte, def.end_byte);
    let context_header = build_context_header(file_label, def.enclosing_class.as_deref(), Some(&def.name), false);
    let signature = text.lines().next().map(|l| l.trim().to_string());

    Chunk {
        kind: def.kind,
        symbol_name: def.name,
        start_line: def.start_line,
        end_line: def.end_line,
        start_byte: def.start_byte,
        end_byte: def.end_byte,
        content_hash: hash_string(&format!("{}\n{}", context_header, text)),
        text,
        context_header,
        is_continuation: false,
        signature,
        docstring: def.docstring,
        is_exported: def.is_exported,
        decorator_names: def.decorator_names,
    }
}

/// `"// File: <path>, Class: <C>, Function: <F>[, (continued)]"` with only
/// the applicable clauses present.
fn build_context_header(file_label: &str, class: Option<&str>, function: Option<&str>, continued: bool) -> String {
    let mut header = format!("// File: {}", file_label);
    if let Some(class) = class {
        header.push_str(&format!(", Class: {}", class));
    }
    if let Some(function) = function {
        header.push_str(&format!(", Function: {}", function));
    }
    if continued {
        header.push_str(", (continued)");
    }
    header
}

fn byte_slice_to_string(source: &str, start: usize, end: usize) -> String {
    source
        .get(start.min(source.len())..end.min(source.len()))
        .unwrap_or_default()
        .to_string()
}

/// Split a chunk whose text exceeds `max_chunk_size` bytes into consecutive
/// sub-chunks, preferring blank-line boundaries, so the original chunk's
/// lines are partitioned without gaps.
fn split_if_oversized(chunk: Chunk, max_chunk_size: usize) -> Vec<Chunk> {
    if chunk.text.len() <= max_chunk_size {
        return vec![chunk];
    }

    let lines: Vec<&str> = chunk.text.lines().collect();
    let mut parts: Vec<(usize, usize)> = Vec::new(); // (start_line_idx, end_line_idx) inclusive, 0-based into `lines`
    let mut current_start = 0usize;
    let mut current_len = 0usize;
    let mut last_blank_boundary: Option<usize> = None;

    for (i, line) in lines.iter().enumerate() {
        let line_len = line.len() + 1;
        if current_len + line_len > max_chunk_size && current_len > 0 {
            let split_at = last_blank_boundary.filter(|&b| b > current_start).unwrap_or(i.saturating_sub(1));
            let split_at = split_at.max(current_start);
            parts.push((current_start, split_at));
            current_start = split_at + 1;
            current_len = lines[current_start..=i].iter().map(|l| l.len() + 1).sum();
            last_blank_boundary = None;
        } else {
            current_len += line_len;
        }

        if line.trim().is_empty() {
            last_blank_boundary = Some(i);
        }
    }
    parts.push((current_start, lines.len().saturating_sub(1)));

    // Cumulative byte offset of the start of each line within `chunk.text`,
    // assuming a `\n` separator between lines (mirroring the length math
    // used above to pack lines into parts).
    let mut line_starts: Vec<usize> = Vec::with_capacity(lines.len() + 1);
    let mut offset = 0usize;
    for line in &lines {
        line_starts.push(offset);
        offset += line.len() + 1;
    }
    line_starts.push(offset);

    let last_part_idx = parts.len() - 1;

    parts
        .into_iter()
        .enumerate()
        .map(|(idx, (start_idx, end_idx))| {
            let sub_text = lines[start_idx..=end_idx.max(start_idx)].join("\n");
            let is_continuation = idx > 0;
            let context_header = header_with_continuation(&chunk.context_header, is_continuation);

            let sub_start_byte = chunk.start_byte + line_starts[start_idx];
            let sub_end_byte = if idx == last_part_idx {
                chunk.end_byte
            } else {
                chunk.start_byte + line_starts[end_idx] + lines[end_idx].len()
            };

            Chunk {
                kind: chunk.kind,
                symbol_name: chunk.symbol_name.clone(),
                start_line: chunk.start_line + start_idx,
                end_line: chunk.start_line + end_idx,
                start_byte: sub_start_byte,
                end_byte: sub_end_byte,
                content_hash: hash_string(&format!("{}\n{}", context_header, sub_text)),
                text: sub_text,
                context_header,
                is_continuation,
                signature: chunk.signature.clone(),
                docstring: if idx == 0 { chunk.docstring.clone() } else { None },
                is_exported: chunk.is_exported,
                decorator_names: chunk.decorator_names.clone(),
            }
        })
        .collect()
}

fn header_with_continuation(header: &str, continued: bool) -> String {
    if !continued || header.ends_with("(continued)") {
        return header.to_string();
    }
    format!("{}, (continued)", header)
}

/// Merge adjacent small chunks (< [`MIN_CHUNK_SIZE`]) of the same kind and
/// enclosing context when the merge stays within `max_chunk_size`.
fn merge_small_adjacent(chunks: Vec<Chunk>, max_chunk_size: usize) -> Vec<Chunk> {
    let mut out: Vec<Chunk> = Vec::with_capacity(chunks.len());

    for chunk in chunks {
        if let Some(prev) = out.last_mut() {
            let mergeable = prev.text.len() < MIN_CHUNK_SIZE
                && prev.kind == chunk.kind
                && prev.context_header == chunk.context_header
                && prev.text.len() + chunk.text.len() + 1 <= max_chunk_size
                && prev.end_line + 1 >= chunk.start_line;

            if mergeable {
                prev.text.push('\n');
                prev.text.push_str(&chunk.text);
                prev.end_line = chunk.end_line;
                prev.end_byte = chunk.end_byte;
                prev.content_hash = hash_string(&format!("{}\n{}", prev.context_header, prev.text));
                continue;
            }
        }
        out.push(chunk);
    }

    out
}

/// Walk `tree` with a class-context stack, collecting [`RawDefinition`]s.
fn extract_definitions(tree: &Tree, source: &[u8], language: Language) -> Vec<RawDefinition> {
    let mut out = Vec::new();
    let mut class_stack: Vec<String> = Vec::new();
    walk(tree.root_node(), source, language, &mut class_stack, &mut out);
    out
}

fn walk(node: Node, source: &[u8], language: Language, class_stack: &mut Vec<String>, out: &mut Vec<RawDefinition>) {
    let kind = node.kind();

    if is_class_like(kind, language) {
        let name = node_name(node, source).unwrap_or_else(|| "<anonymous>".to_string());
        let (start_line, end_line) = line_span(node);
        out.push(RawDefinition {
            kind: ChunkKind::Class,
            name: name.clone(),
            enclosing_class: class_stack.last().cloned(),
            start_byte: node.start_byte(),
            end_byte: node.end_byte(),
            start_line,
            end_line,
            decorator_names: decorator_names(node, source, language),
            docstring: docstring_of(node, source, language),
            is_exported: is_exported(node, source, language),
        });

        class_stack.push(name);
        for child in node.children(&mut node.walk()) {
            walk(child, source, language, class_stack, out);
        }
        class_stack.pop();
        return;
    }

    if is_impl_like(kind, language) {
        let impl_name = node_name(node, source).unwrap_or_default();
        class_stack.push(impl_name);
        for child in node.children(&mut node.walk()) {
            walk(child, source, language, class_stack, out);
        }
        class_stack.pop();
        return;
    }

    if is_function_like(kind, language) {
        let name = node_name(node, source).unwrap_or_else(|| "<anonymous>".to_string());
        let (start_line, end_line) = line_span(node);
        let chunk_kind = if class_stack.is_empty() {
            ChunkKind::Function
        } else {
            ChunkKind::Method
        };
        out.push(RawDefinition {
            kind: chunk_kind,
            name,
            enclosing_class: class_stack.last().cloned(),
            start_byte: node.start_byte(),
            end_byte: node.end_byte(),
            start_line,
            end_line,
            decorator_names: decorator_names(node, source, language),
            docstring: docstring_of(node, source, language),
            is_exported: is_exported(node, source, language),
        });
        // Functions may still contain nested functions/classes; keep walking
        // but don't change the class context.
        for child in node.children(&mut node.walk()) {
            walk(child, source, language, class_stack, out);
        }
        return;
    }

    for child in node.children(&mut node.walk()) {
        walk(child, source, language, class_stack, out);
    }
}

fn is_class_like(kind: &str, language: Language) -> bool {
    match language {
        Language::Python => kind == "class_definition",
        Language::JavaScript | Language::TypeScript => kind == "class_declaration",
        Language::Rust => matches!(kind, "struct_item" | "trait_item" | "enum_item"),
        Language::Go => kind == "type_declaration",
    }
}

fn is_impl_like(kind: &str, language: Language) -> bool {
    matches!(language, Language::Rust) && kind == "impl_item"
}

fn is_function_like(kind: &str, language: Language) -> bool {
    match language {
        Language::Python => kind == "function_definition",
        Language::JavaScript | Language::TypeScript => {
            matches!(kind, "function_declaration" | "method_definition")
        }
        Language::Rust => kind == "function_item",
        Language::Go => matches!(kind, "function_declaration" | "method_declaration"),
    }
}

fn node_name(node: Node, source: &[u8]) -> Option<String> {
    node.child_by_field_name("name")
        .and_then(|n| n.utf8_text(source).ok())
        .map(|s| s.to_string())
}

fn line_span(node: Node) -> (usize, usize) {
    (node.start_position().row + 1, node.end_position().row + 1)
}

fn decorator_names(node: Node, source: &[u8], language: Language) -> Vec<String> {
    if language != Language::Python {
        return Vec::new();
    }
    // Python wraps decorated definitions in a `decorated_definition` parent;
    // its `decorator` children precede the actual def.
    let Some(parent) = node.parent() else {
        return Vec::new();
    };
    if parent.kind() != "decorated_definition" {
        return Vec::new();
    }
    let mut names = Vec::new();
    for child in parent.children(&mut parent.walk()) {
        if child.kind() == "decorator" {
            if let Ok(text) = child.utf8_text(source) {
                names.push(text.trim_start_matches('@').trim().to_string());
            }
        }
    }
    names
}

fn docstring_of(node: Node, source: &[u8], language: Language) -> Option<String> {
    match language {
        Language::Python => {
            let body = node.child_by_field_name("body")?;
            let first_stmt = body.named_child(0)?;
            if first_stmt.kind() == "expression_statement" {
                let expr = first_stmt.named_child(0)?;
                if expr.kind() == "string" {
                    return expr.utf8_text(source).ok().map(|s| s.trim_matches(['"', '\'']).to_string());
                }
            }
            None
        }
        Language::JavaScript | Language::TypeScript => {
            // JSDoc: a `comment` node immediately preceding this node.
            let prev = node.prev_sibling()?;
            if prev.kind() == "comment" {
                prev.utf8_text(source).ok().map(|s| s.to_string())
            } else {
                None
            }
        }
        _ => None,
    }
}

fn is_exported(node: Node, source: &[u8], language: Language) -> bool {
    match language {
        Language::JavaScript | Language::TypeScript => node
            .parent()
            .map(|p| p.kind() == "export_statement")
            .unwrap_or(false),
        Language::Python => {
            // Heuristic: membership in a module-level `__all__` list is a
            // whole-module fact, not a per-node one; without a query engine
            // we approximate it as "not a name prefixed with an underscore".
            node_name(node, source)
                .map(|n| !n.starts_with('_'))
                .unwrap_or(false)
        }
        Language::Rust => {
            node.prev_sibling().map(|s| s.kind() == "visibility_modifier").unwrap_or(false)
        }
        Language::Go => node_name(node, source)
            .map(|n| n.chars().next().map(|c| c.is_uppercase()).unwrap_or(false))
            .unwrap_or(false),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn unknown_extension_falls_back_to_module_chunk() {
        let chunks = chunk_file(&PathBuf::from("data.txt"), "hello\nworld\n", 10_000);
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].kind, ChunkKind::Module);
    }

    #[test]
    fn empty_file_yields_one_empty_module_chunk() {
        let chunks = chunk_file(&PathBuf::from("empty.py"), "", 10_000);
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].text, "");
    }

    #[test]
    fn python_function_is_chunked() {
        let src = "def add(a, b):\n    return a + b\n";
        let chunks = chunk_file(&PathBuf::from("math.py"), src, 10_000);
        assert!(chunks.iter().any(|c| c.kind == ChunkKind::Function && c.symbol_name == "add"));
    }

    #[test]
    fn python_class_methods_are_methods_not_functions() {
        let src = "class Greeter:\n    def hello(self):\n        return 'hi'\n";
        let chunks = chunk_file(&PathBuf::from("g.py"), src, 10_000);
        assert!(chunks.iter().any(|c| c.kind == ChunkKind::Class && c.symbol_name == "Greeter"));
        assert!(chunks
            .iter()
            .any(|c| c.kind == ChunkKind::Method && c.symbol_name == "hello" && c.context_header.contains("Greeter")));
    }

    #[test]
    fn chunk_idempotence() {
        let src = "def add(a, b):\n    return a + b\n";
        let c1 = chunk_file(&PathBuf::from("math.py"), src, 10_000);
        let c2 = chunk_file(&PathBuf::from("math.py"), src, 10_000);
        assert_eq!(
            c1.iter().map(|c| &c.content_hash).collect::<Vec<_>>(),
            c2.iter().map(|c| &c.content_hash).collect::<Vec<_>>()
        );
    }

    #[test]
    fn identical_header_and_text_hash_identically_across_files() {
        let src = "def add(a, b):\n    return a + b\n";
        let c1 = chunk_file(&PathBuf::from("same.py"), src, 10_000);
        let c2 = chunk_file(&PathBuf::from("same.py"), src, 10_000);
        assert_eq!(c1[0].content_hash, c2[0].content_hash);
    }

    #[test]
    fn oversized_chunk_is_split_contiguously() {
        let mut src = String::from("def big():\n");
        for i in 0..200 {
            src.push_str(&format!("    x{} = {}\n", i, i));
        }
        let chunks = chunk_file(&PathBuf::from("big.py"), &src, 500);
        assert!(chunks.len() > 1);

        let mut expected_next_start = chunks[0].start_line;
        for c in &chunks {
            assert_eq!(c.start_line, expected_next_start);
            assert!(c.start_line <= c.end_line);
            expected_next_start = c.end_line + 1;
        }
        assert!(chunks[1].is_continuation);
        assert!(chunks[1].context_header.contains("(continued)"));
    }

    #[test]
    fn rust_impl_methods_get_struct_context() {
        let src = "struct Foo;\nimpl Foo {\n    fn bar(&self) -> i32 { 1 }\n}\n";
        let chunks = chunk_file(&PathBuf::from("foo.rs"), src, 10_000);
        assert!(chunks
            .iter()
            .any(|c| c.kind == ChunkKind::Method && c.symbol_name == "bar" && c.context_header.contains("Foo")));
    }
}
