use crate::model::{symbol_kind, usage_kind};
use crate::parser::{ChunkExtractor, FileSyntax, RawChunk, RawUsage};
use anyhow::Result;

/// Firestore security rules. Every `match /path { ... }` block becomes a
/// chunk of kind `match_path` whose symbol name is the literal path;
/// `function` declarations inside rules files chunk as functions, and calls
/// to them surface as `match_target` usages.
pub struct FirestoreExtractor;

impl FirestoreExtractor {
    pub fn new() -> Self {
        Self
    }
}

impl ChunkExtractor for FirestoreExtractor {
    fn extract(&mut self, source: &str) -> Result<FileSyntax> {
        let mut output = FileSyntax::default();
        let bytes = source.as_bytes();
        let mut search_from = 0;

        while let Some(offset) = source[search_from..].find("match ") {
            let start = search_from + offset;
            // only statement-position matches; skip occurrences inside
            // longer identifiers
            if start > 0 {
                let prev = bytes[start - 1] as char;
                if prev.is_ascii_alphanumeric() || prev == '_' {
                    search_from = start + 6;
                    continue;
                }
            }
            let Some(brace_rel) = source[start..].find('{') else {
                break;
            };
            let open = start + brace_rel;
            let path = source[start + 6..open].trim().to_string();
            let Some(close) = matching_brace(bytes, open) else {
                search_from = open + 1;
                continue;
            };
            let start_line = line_of(source, start);
            let end_line = line_of(source, close);
            output.chunks.push(RawChunk {
                symbol_name: path.clone(),
                symbol_kind: symbol_kind::MATCH_PATH.to_string(),
                start_line,
                end_line,
                start_byte: start,
                end_byte: close + 1,
                signature: format!("match {path}"),
                complexity: 1 + count_conditions(&source[start..close + 1]),
                ..Default::default()
            });
            // nested matches are their own chunks; continue inside the block
            search_from = open + 1;
        }

        collect_rule_functions(source, &mut output);
        Ok(output)
    }
}

/// `function isOwner(uid) { ... }` declarations and their call sites.
fn collect_rule_functions(source: &str, output: &mut FileSyntax) {
    let mut declared: Vec<String> = Vec::new();
    let mut search_from = 0;
    while let Some(offset) = source[search_from..].find("function ") {
        let start = search_from + offset;
        let rest = &source[start + 9..];
        let name: String = rest
            .chars()
            .take_while(|ch| ch.is_ascii_alphanumeric() || *ch == '_')
            .collect();
        if !name.is_empty() {
            let open = source[start..].find('{').map(|rel| start + rel);
            let close = open.and_then(|open| matching_brace(source.as_bytes(), open));
            if let (Some(_), Some(close)) = (open, close) {
                output.chunks.push(RawChunk {
                    symbol_name: name.clone(),
                    symbol_kind: symbol_kind::FUNCTION.to_string(),
                    start_line: line_of(source, start),
                    end_line: line_of(source, close),
                    start_byte: start,
                    end_byte: close + 1,
                    complexity: 1 + count_conditions(&source[start..close + 1]),
                    ..Default::default()
                });
                declared.push(name);
            }
        }
        search_from = start + 9;
    }

    // call sites of declared rule functions inside allow conditions
    for name in &declared {
        let needle = format!("{name}(");
        let mut from = 0;
        while let Some(offset) = source[from..].find(&needle) {
            let at = from + offset;
            let decl_site = source[..at].trim_end().ends_with("function");
            if !decl_site {
                output.usages.push(RawUsage {
                    name: name.clone(),
                    kind: usage_kind::MATCH_TARGET.to_string(),
                    context: None,
                    line: line_of(source, at),
                });
            }
            from = at + needle.len();
        }
    }
}

fn matching_brace(bytes: &[u8], open: usize) -> Option<usize> {
    let mut balance = 0;
    for (idx, byte) in bytes.iter().enumerate().skip(open) {
        match byte {
            b'{' => balance += 1,
            b'}' => {
                balance -= 1;
                if balance == 0 {
                    return Some(idx);
                }
            }
            _ => {}
        }
    }
    None
}

fn line_of(source: &str, byte: usize) -> i64 {
    source[..byte.min(source.len())].bytes().filter(|b| *b == b'\n').count() as i64 + 1
}

fn count_conditions(snippet: &str) -> i64 {
    (snippet.matches("&&").count() + snippet.matches("||").count()) as i64
}

#[cfg(test)]
mod tests {
    use super::*;

    const RULES: &str = r#"rules_version = '2';
service cloud.firestore {
  match /databases/{database}/documents {
    function isOwner(uid) {
      return request.auth != null && request.auth.uid == uid;
    }
    match /users/{userId} {
      allow read: if isOwner(userId);
      allow write: if false;
    }
  }
}
"#;

    #[test]
    fn match_blocks_become_match_path_chunks() {
        let syntax = FirestoreExtractor::new().extract(RULES).unwrap();
        let paths: Vec<&str> = syntax
            .chunks
            .iter()
            .filter(|c| c.symbol_kind == symbol_kind::MATCH_PATH)
            .map(|c| c.symbol_name.as_str())
            .collect();
        assert!(paths.contains(&"/databases/{database}/documents"));
        assert!(paths.contains(&"/users/{userId}"));
    }

    #[test]
    fn rule_functions_and_their_calls() {
        let syntax = FirestoreExtractor::new().extract(RULES).unwrap();
        assert!(syntax
            .chunks
            .iter()
            .any(|c| c.symbol_name == "isOwner" && c.symbol_kind == symbol_kind::FUNCTION));
        assert!(syntax
            .usages
            .iter()
            .any(|u| u.name == "isOwner" && u.kind == usage_kind::MATCH_TARGET));
    }
}
