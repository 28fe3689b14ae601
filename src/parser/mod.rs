use crate::model::{symbol_kind, Chunk, Usage};
use crate::util;
use anyhow::{anyhow, Result};
use std::collections::HashMap;
use tree_sitter::Node;

pub mod dart;
pub mod firestore;
pub mod generic;
pub mod javascript;
pub mod markdown;
pub mod python;
pub mod sql;

/// A definition found by a language extractor, before chunk identity and
/// file-level metadata are attached.
#[derive(Debug, Clone, Default)]
pub struct RawChunk {
    pub symbol_name: String,
    pub symbol_kind: String,
    pub start_line: i64,
    pub end_line: i64,
    pub start_byte: usize,
    pub end_byte: usize,
    pub signature: String,
    pub docstring: String,
    pub parent_symbol: String,
    pub complexity: i64,
}

/// A name reference found by a language extractor. The parser attaches it
/// to its enclosing chunk by line containment.
#[derive(Debug, Clone)]
pub struct RawUsage {
    pub name: String,
    pub kind: String,
    pub context: Option<String>,
    pub line: i64,
}

#[derive(Debug, Default)]
pub struct FileSyntax {
    pub chunks: Vec<RawChunk>,
    pub usages: Vec<RawUsage>,
    pub dependencies: Vec<String>,
}

/// A fully materialized file: persisted chunks plus the transient usages
/// the linker consumes in pass 2.
#[derive(Debug)]
pub struct ParsedFile {
    pub chunks: Vec<Chunk>,
    pub usages: Vec<Usage>,
}

pub trait ChunkExtractor {
    fn extract(&mut self, source: &str) -> Result<FileSyntax>;
}

/// Language-dispatching parser. Languages without an extractor (html, css,
/// plain text) fall through to a single whole-file chunk.
pub struct CodeParser {
    extractors: HashMap<&'static str, Box<dyn ChunkExtractor + Send>>,
}

impl CodeParser {
    pub fn new() -> Result<Self> {
        let mut extractors: HashMap<&'static str, Box<dyn ChunkExtractor + Send>> = HashMap::new();
        extractors.insert("python", Box::new(python::PythonExtractor::new()?));
        extractors.insert(
            "javascript",
            Box::new(javascript::JsExtractor::javascript()?),
        );
        extractors.insert(
            "typescript",
            Box::new(javascript::JsExtractor::typescript()?),
        );
        extractors.insert("tsx", Box::new(javascript::JsExtractor::tsx()?));
        extractors.insert("go", Box::new(generic::GenericExtractor::go()?));
        extractors.insert("rust", Box::new(generic::GenericExtractor::rust()?));
        extractors.insert("java", Box::new(generic::GenericExtractor::java()?));
        extractors.insert("cpp", Box::new(generic::GenericExtractor::cpp()?));
        extractors.insert("sql", Box::new(sql::SqlExtractor::new()?));
        extractors.insert("dart", Box::new(dart::DartExtractor::new()));
        extractors.insert("firestore", Box::new(firestore::FirestoreExtractor::new()));
        extractors.insert("markdown", Box::new(markdown::MarkdownExtractor::new()));
        Ok(Self { extractors })
    }

    pub fn parse_file(
        &mut self,
        filename: &str,
        language: &str,
        source: &str,
        content_hash: &str,
    ) -> Result<ParsedFile> {
        let syntax = match self.extractors.get_mut(language) {
            Some(extractor) => extractor
                .extract(source)
                .map_err(|err| anyhow!("parse {filename}: {err}"))?,
            None => FileSyntax::default(),
        };
        Ok(materialize(filename, language, source, content_hash, syntax))
    }
}

/// Attach identity, content, and file-level metadata to raw definitions.
/// Files with no definitions become one synthetic chunk covering every
/// line; `symbol_name` is never left empty.
fn materialize(
    filename: &str,
    language: &str,
    source: &str,
    content_hash: &str,
    syntax: FileSyntax,
) -> ParsedFile {
    let mut raw_chunks = syntax.chunks;
    if raw_chunks.is_empty() {
        let end_line = source.lines().count().max(1) as i64;
        raw_chunks.push(RawChunk {
            symbol_name: String::new(),
            symbol_kind: symbol_kind::CHUNK.to_string(),
            start_line: 1,
            end_line,
            start_byte: 0,
            end_byte: source.len(),
            complexity: 1,
            ..Default::default()
        });
    }

    let mut chunks: Vec<Chunk> = Vec::with_capacity(raw_chunks.len());
    for raw in raw_chunks {
        let symbol_name = if raw.symbol_name.is_empty() {
            format!("{filename}:{}-{}", raw.start_line, raw.end_line)
        } else {
            raw.symbol_name
        };
        let content = source
            .get(raw.start_byte..raw.end_byte.min(source.len()))
            .unwrap_or("")
            .to_string();
        chunks.push(Chunk {
            id: util::chunk_id(filename, &symbol_name, raw.start_line),
            filename: filename.to_string(),
            language: language.to_string(),
            symbol_name,
            symbol_kind: raw.symbol_kind,
            start_line: raw.start_line,
            end_line: raw.end_line.max(raw.start_line),
            content,
            signature: raw.signature,
            docstring: raw.docstring,
            parent_symbol: raw.parent_symbol,
            complexity: raw.complexity.max(1),
            dependencies: syntax.dependencies.clone(),
            author: None,
            last_modified: None,
            content_hash: content_hash.to_string(),
        });
    }

    // Usages bind to the innermost chunk covering their line; anything
    // outside every chunk has no source to hang an edge on and is dropped.
    let mut usages = Vec::new();
    for raw in syntax.usages {
        let owner = chunks
            .iter()
            .filter(|c| c.start_line <= raw.line && raw.line <= c.end_line)
            .min_by_key(|c| c.end_line - c.start_line);
        if let Some(owner) = owner {
            usages.push(Usage {
                chunk_id: owner.id.clone(),
                name: raw.name,
                kind: raw.kind,
                context: raw.context,
                line: raw.line,
            });
        }
    }

    ParsedFile { chunks, usages }
}

// Shared tree-sitter helpers used by every grammar-backed extractor.

pub(crate) fn node_text(node: Node<'_>, source: &str) -> String {
    source
        .get(node.start_byte()..node.end_byte())
        .unwrap_or("")
        .trim()
        .to_string()
}

pub(crate) fn start_line(node: Node<'_>) -> i64 {
    node.start_position().row as i64 + 1
}

pub(crate) fn end_line(node: Node<'_>) -> i64 {
    node.end_position().row as i64 + 1
}

/// Cyclomatic count: 1 + branch nodes beneath `node`, inclusive. Each
/// language supplies its branch node kinds.
pub(crate) fn count_branches(node: Node<'_>, branch_kinds: &[&str]) -> i64 {
    let mut count = 1;
    let mut stack = vec![node];
    while let Some(current) = stack.pop() {
        if branch_kinds.contains(&current.kind()) {
            count += 1;
        }
        let mut cursor = current.walk();
        for child in current.children(&mut cursor) {
            stack.push(child);
        }
    }
    count
}

/// Signature text: declared name plus parameter list, whitespace collapsed.
pub(crate) fn callable_signature(name: &str, params: Option<Node<'_>>, source: &str) -> String {
    match params {
        Some(params) => util::squash_whitespace(&format!("{name}{}", node_text(params, source))),
        None => name.to_string(),
    }
}

pub(crate) fn unquote(raw: &str) -> String {
    let trimmed = raw.trim();
    for quote in ["\"\"\"", "'''"] {
        if trimmed.len() >= 2 * quote.len()
            && trimmed.starts_with(quote)
            && trimmed.ends_with(quote)
        {
            return trimmed[quote.len()..trimmed.len() - quote.len()].to_string();
        }
    }
    for quote in ['"', '\'', '`'] {
        if trimmed.len() >= 2 && trimmed.starts_with(quote) && trimmed.ends_with(quote) {
            return trimmed[1..trimmed.len() - 1].to_string();
        }
    }
    trimmed.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unsupported_language_yields_synthetic_chunk() {
        let mut parser = CodeParser::new().unwrap();
        let parsed = parser
            .parse_file("styles/site.css", "css", "body { color: red; }\n", "h")
            .unwrap();
        assert_eq!(parsed.chunks.len(), 1);
        let chunk = &parsed.chunks[0];
        assert_eq!(chunk.symbol_kind, symbol_kind::CHUNK);
        assert_eq!(chunk.symbol_name, "styles/site.css:1-1");
        assert_eq!(chunk.start_line, 1);
        assert!(!chunk.symbol_name.is_empty());
    }

    #[test]
    fn chunk_ids_follow_identity_formula() {
        let mut parser = CodeParser::new().unwrap();
        let parsed = parser
            .parse_file("src/a.py", "python", "def foo():\n    pass\n", "h")
            .unwrap();
        let chunk = parsed.chunks.iter().find(|c| c.symbol_name == "foo").unwrap();
        assert_eq!(
            chunk.id,
            util::chunk_id("src/a.py", "foo", chunk.start_line)
        );
    }

    #[test]
    fn unquote_strips_matching_quotes() {
        assert_eq!(unquote("'a'"), "a");
        assert_eq!(unquote("\"\"\"doc\"\"\""), "doc");
        assert_eq!(unquote("plain"), "plain");
    }
}
