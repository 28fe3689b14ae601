use crate::model::symbol_kind;
use crate::parser::{
    count_branches, end_line, node_text, start_line, ChunkExtractor, FileSyntax, RawChunk,
};
use anyhow::Result;
use tree_sitter::{Node, Parser};

const BRANCH_KINDS: &[&str] = &["case", "when_clause", "AND", "OR"];

pub struct SqlExtractor {
    parser: Parser,
}

impl SqlExtractor {
    pub fn new() -> Result<Self> {
        let mut parser = Parser::new();
        let language = tree_sitter_sequel::LANGUAGE;
        parser.set_language(&language.into())?;
        Ok(Self { parser })
    }
}

impl ChunkExtractor for SqlExtractor {
    fn extract(&mut self, source: &str) -> Result<FileSyntax> {
        let mut output = FileSyntax::default();
        let Some(tree) = self.parser.parse(source, None) else {
            return Ok(output);
        };
        walk_node(tree.root_node(), source, &mut output);
        Ok(output)
    }
}

fn walk_node(node: Node<'_>, source: &str, output: &mut FileSyntax) {
    if let Some(kind) = chunk_kind(node.kind()) {
        let symbol_name = extract_object_name(node, source).unwrap_or_default();
        output.chunks.push(RawChunk {
            symbol_name,
            symbol_kind: kind.to_string(),
            start_line: start_line(node),
            end_line: end_line(node),
            start_byte: node.start_byte(),
            end_byte: node.end_byte(),
            complexity: count_branches(node, BRANCH_KINDS),
            ..Default::default()
        });
        return;
    }

    let mut cursor = node.walk();
    for child in node.named_children(&mut cursor) {
        walk_node(child, source, output);
    }
}

/// CREATE statements keep their object identity; bare SELECT blocks become
/// anonymous chunks named after their span.
fn chunk_kind(kind: &str) -> Option<&'static str> {
    match kind {
        "create_function" | "create_trigger" => Some(symbol_kind::FUNCTION),
        "create_table" | "create_view" | "create_materialized_view" | "create_index"
        | "create_type" | "create_schema" | "create_sequence" => Some(symbol_kind::CLASS),
        "select" | "select_statement" => Some(symbol_kind::CHUNK),
        _ => None,
    }
}

fn extract_object_name(node: Node<'_>, source: &str) -> Option<String> {
    let object_node = find_object_reference(node)?;
    let qualname = node_text(object_node, source);
    if qualname.is_empty() {
        return None;
    }
    Some(
        qualname
            .rsplit('.')
            .next()
            .unwrap_or(&qualname)
            .trim_matches(|ch| ch == '"' || ch == '`')
            .to_string(),
    )
}

fn find_object_reference(node: Node<'_>) -> Option<Node<'_>> {
    let mut cursor = node.walk();
    for child in node.named_children(&mut cursor) {
        if matches!(child.kind(), "object_reference" | "identifier") {
            return Some(child);
        }
        if let Some(found) = find_object_reference(child) {
            return Some(found);
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_statements_become_chunks() {
        let mut extractor = SqlExtractor::new().unwrap();
        let syntax = extractor
            .extract(
                "CREATE TABLE users (id INTEGER PRIMARY KEY, name TEXT);\n\nCREATE VIEW active_users AS SELECT * FROM users WHERE active = 1;\n",
            )
            .unwrap();
        assert!(syntax
            .chunks
            .iter()
            .any(|c| c.symbol_name == "users" && c.symbol_kind == symbol_kind::CLASS));
        assert!(syntax.chunks.iter().any(|c| c.symbol_name == "active_users"));
    }
}
