use crate::model::symbol_kind;
use crate::parser::{ChunkExtractor, FileSyntax, RawChunk};
use anyhow::Result;

/// Markdown files contribute structure only through Mermaid diagrams: each
/// node label inside a ```mermaid fence becomes a `diagram_node` chunk.
/// Files without diagrams fall back to the whole-file chunk.
pub struct MarkdownExtractor;

impl MarkdownExtractor {
    pub fn new() -> Self {
        Self
    }
}

impl ChunkExtractor for MarkdownExtractor {
    fn extract(&mut self, source: &str) -> Result<FileSyntax> {
        let mut output = FileSyntax::default();
        let mut in_mermaid = false;
        let mut byte = 0usize;
        let mut seen: Vec<String> = Vec::new();

        for (idx, line) in source.lines().enumerate() {
            let line_no = idx as i64 + 1;
            let trimmed = line.trim();
            if trimmed.starts_with("```") {
                if in_mermaid {
                    in_mermaid = false;
                } else if trimmed.trim_start_matches('`').trim().starts_with("mermaid") {
                    in_mermaid = true;
                }
            } else if in_mermaid {
                for (name, label) in mermaid_nodes(trimmed) {
                    if seen.contains(&name) {
                        continue;
                    }
                    seen.push(name.clone());
                    output.chunks.push(RawChunk {
                        symbol_name: name,
                        symbol_kind: symbol_kind::DIAGRAM_NODE.to_string(),
                        start_line: line_no,
                        end_line: line_no,
                        start_byte: byte,
                        end_byte: byte + line.len(),
                        signature: label,
                        complexity: 1,
                        ..Default::default()
                    });
                }
            }
            byte += line.len() + 1;
        }
        Ok(output)
    }
}

/// Node declarations on one Mermaid line: `A[Label]`, `B(Label)`,
/// `C{Label}`, and the bare identifiers of edges `A --> B`.
fn mermaid_nodes(line: &str) -> Vec<(String, String)> {
    let mut out = Vec::new();
    let skip = ["graph", "flowchart", "sequenceDiagram", "subgraph", "end", "classDiagram"];
    let first_word = line.split_whitespace().next().unwrap_or("");
    if skip.contains(&first_word) {
        return out;
    }

    let mut chars = line.char_indices().peekable();
    while let Some((idx, ch)) = chars.next() {
        if !(ch.is_ascii_alphabetic() || ch == '_') {
            continue;
        }
        let start = idx;
        let mut end = idx + ch.len_utf8();
        while let Some((next_idx, next_ch)) = chars.peek().copied() {
            if next_ch.is_ascii_alphanumeric() || next_ch == '_' {
                chars.next();
                end = next_idx + next_ch.len_utf8();
            } else {
                break;
            }
        }
        let name = line[start..end].to_string();
        let rest = &line[end..];
        let label = match rest.chars().next() {
            Some('[') => delimited(rest, '[', ']'),
            Some('(') => delimited(rest, '(', ')'),
            Some('{') => delimited(rest, '{', '}'),
            _ => String::new(),
        };
        // skip arrow/link keywords between nodes
        if name == "o" || name == "x" {
            continue;
        }
        out.push((name, label));
        // consume past the label so its words are not read as node names
        if !label_is_empty(rest) {
            let mut depth = 0;
            for (rest_idx, rest_ch) in rest.char_indices() {
                match rest_ch {
                    '[' | '(' | '{' => depth += 1,
                    ']' | ')' | '}' => {
                        depth -= 1;
                        if depth == 0 {
                            let consumed_to = end + rest_idx;
                            while let Some((peek_idx, _)) = chars.peek().copied() {
                                if peek_idx <= consumed_to {
                                    chars.next();
                                } else {
                                    break;
                                }
                            }
                            break;
                        }
                    }
                    _ => {}
                }
            }
        }
    }
    out
}

fn label_is_empty(rest: &str) -> bool {
    !matches!(rest.chars().next(), Some('[') | Some('(') | Some('{'))
}

fn delimited(rest: &str, open: char, close: char) -> String {
    let mut depth = 0;
    let mut start = None;
    for (idx, ch) in rest.char_indices() {
        if ch == open {
            depth += 1;
            if depth == 1 {
                start = Some(idx + ch.len_utf8());
            }
        } else if ch == close {
            depth -= 1;
            if depth == 0 {
                return rest[start.unwrap_or(0)..idx].trim().to_string();
            }
        }
    }
    String::new()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mermaid_nodes_become_diagram_chunks() {
        let source = "# Architecture\n\n```mermaid\ngraph TD\n  Indexer[Indexing pipeline] --> Store\n  Store --> Retriever[Hybrid search]\n```\n";
        let syntax = MarkdownExtractor::new().extract(source).unwrap();
        let names: Vec<&str> = syntax.chunks.iter().map(|c| c.symbol_name.as_str()).collect();
        assert!(names.contains(&"Indexer"));
        assert!(names.contains(&"Store"));
        assert!(names.contains(&"Retriever"));
        assert!(syntax
            .chunks
            .iter()
            .all(|c| c.symbol_kind == symbol_kind::DIAGRAM_NODE));
        let indexer = syntax.chunks.iter().find(|c| c.symbol_name == "Indexer").unwrap();
        assert_eq!(indexer.signature, "Indexing pipeline");
    }

    #[test]
    fn plain_markdown_has_no_chunks() {
        let syntax = MarkdownExtractor::new()
            .extract("# Title\n\nJust prose, no diagrams.\n")
            .unwrap();
        assert!(syntax.chunks.is_empty());
    }
}
