use crate::model::{symbol_kind, usage_kind};
use crate::parser::{ChunkExtractor, FileSyntax, RawChunk, RawUsage};
use crate::util;
use anyhow::Result;

/// Token-level Dart extractor. Classes, mixins, enums, top-level functions
/// and variables become chunks; widget invocations inside bodies become
/// `instantiation` usages, method calls become `call` usages. Bare
/// identifiers that are neither call targets nor type positions are
/// dropped.
pub struct DartExtractor;

impl DartExtractor {
    pub fn new() -> Self {
        Self
    }
}

#[derive(Clone, Debug, PartialEq)]
enum TokenKind {
    Ident,
    Str,
    Punct(char),
    Arrow,
}

#[derive(Clone, Debug)]
struct Token {
    kind: TokenKind,
    text: String,
    line: i64,
    byte: usize,
}

impl ChunkExtractor for DartExtractor {
    fn extract(&mut self, source: &str) -> Result<FileSyntax> {
        let tokens = tokenize(source);
        let mut output = FileSyntax::default();
        parse_tokens(&tokens, source, &mut output);
        Ok(output)
    }
}

fn tokenize(source: &str) -> Vec<Token> {
    let bytes = source.as_bytes();
    let mut tokens = Vec::new();
    let mut line: i64 = 1;
    let mut i = 0;
    while i < bytes.len() {
        let ch = bytes[i] as char;
        match ch {
            '\n' => {
                line += 1;
                i += 1;
            }
            '/' if bytes.get(i + 1) == Some(&b'/') => {
                while i < bytes.len() && bytes[i] != b'\n' {
                    i += 1;
                }
            }
            '/' if bytes.get(i + 1) == Some(&b'*') => {
                i += 2;
                while i + 1 < bytes.len() && !(bytes[i] == b'*' && bytes[i + 1] == b'/') {
                    if bytes[i] == b'\n' {
                        line += 1;
                    }
                    i += 1;
                }
                i = (i + 2).min(bytes.len());
            }
            '\'' | '"' => {
                let quote = bytes[i];
                let start = i + 1;
                i += 1;
                while i < bytes.len() && bytes[i] != quote {
                    if bytes[i] == b'\\' {
                        i += 1;
                    }
                    if i < bytes.len() && bytes[i] == b'\n' {
                        line += 1;
                    }
                    i += 1;
                }
                tokens.push(Token {
                    kind: TokenKind::Str,
                    text: String::from_utf8_lossy(&bytes[start..i.min(bytes.len())]).to_string(),
                    line,
                    byte: start,
                });
                i += 1;
            }
            '=' if bytes.get(i + 1) == Some(&b'>') => {
                tokens.push(Token {
                    kind: TokenKind::Arrow,
                    text: "=>".to_string(),
                    line,
                    byte: i,
                });
                i += 2;
            }
            _ if ch.is_ascii_alphabetic() || ch == '_' || ch == '$' => {
                let start = i;
                while i < bytes.len() {
                    let c = bytes[i] as char;
                    if c.is_ascii_alphanumeric() || c == '_' || c == '$' {
                        i += 1;
                    } else {
                        break;
                    }
                }
                tokens.push(Token {
                    kind: TokenKind::Ident,
                    text: source[start..i].to_string(),
                    line,
                    byte: start,
                });
            }
            _ if ch.is_ascii_whitespace() => {
                i += 1;
            }
            _ => {
                tokens.push(Token {
                    kind: TokenKind::Punct(ch),
                    text: ch.to_string(),
                    line,
                    byte: i,
                });
                i += 1;
            }
        }
    }
    tokens
}

fn parse_tokens(tokens: &[Token], source: &str, output: &mut FileSyntax) {
    let mut depth: i64 = 0;
    let mut class_end_depth: Option<i64> = None;
    let mut current_class = String::new();
    let mut idx = 0;

    while idx < tokens.len() {
        let token = &tokens[idx];
        match &token.kind {
            TokenKind::Punct('{') => {
                depth += 1;
                idx += 1;
            }
            TokenKind::Punct('}') => {
                depth -= 1;
                if Some(depth) == class_end_depth {
                    class_end_depth = None;
                    current_class.clear();
                }
                idx += 1;
            }
            TokenKind::Ident => {
                let consumed = match token.text.as_str() {
                    "import" | "export" if depth == 0 => {
                        if let Some(next) = tokens.get(idx + 1) {
                            if next.kind == TokenKind::Str && !output.dependencies.contains(&next.text)
                            {
                                output.dependencies.push(next.text.clone());
                            }
                        }
                        idx += 2;
                        true
                    }
                    "class" | "mixin" | "enum" if depth == 0 => {
                        if let Some((name, next_idx)) =
                            parse_type_decl(tokens, idx, source, output)
                        {
                            current_class = name;
                            class_end_depth = Some(depth);
                            idx = next_idx;
                        } else {
                            idx += 1;
                        }
                        true
                    }
                    "new" => {
                        if let Some(next) = tokens.get(idx + 1) {
                            if next.kind == TokenKind::Ident && is_type_name(&next.text) {
                                output.usages.push(RawUsage {
                                    name: next.text.clone(),
                                    kind: usage_kind::INSTANTIATION.to_string(),
                                    context: None,
                                    line: next.line,
                                });
                            }
                        }
                        idx += 1;
                        true
                    }
                    _ => false,
                };
                if consumed {
                    continue;
                }

                // identifier followed by '(' is either a declaration or a
                // call site, decided by what follows the parameter list
                if matches!(
                    tokens.get(idx + 1).map(|t| &t.kind),
                    Some(TokenKind::Punct('('))
                ) {
                    let close = match matching_paren(tokens, idx + 1) {
                        Some(close) => close,
                        None => {
                            idx += 1;
                            continue;
                        }
                    };
                    let after = tokens.get(close + 1).map(|t| &t.kind);
                    let opens_body = matches!(after, Some(TokenKind::Punct('{')))
                        || matches!(after, Some(TokenKind::Arrow));
                    let is_decl_scope =
                        depth == 0 || (depth == 1 && class_end_depth == Some(0));
                    let preceded_by_dot = idx > 0
                        && matches!(tokens[idx - 1].kind, TokenKind::Punct('.'));

                    if opens_body && is_decl_scope && !preceded_by_dot {
                        idx = push_callable(
                            tokens,
                            idx,
                            close,
                            depth,
                            &current_class,
                            source,
                            output,
                        );
                        continue;
                    }
                    record_call_usage(tokens, idx, &current_class, output);
                    idx += 1;
                    continue;
                }

                // top-level variable: `final x = ...;` / `const Type y = ...;`
                if depth == 0 {
                    if let Some(next_idx) = parse_top_level_variable(tokens, idx, output) {
                        idx = next_idx;
                        continue;
                    }
                }
                idx += 1;
            }
            _ => {
                idx += 1;
            }
        }
    }
}

/// `class Name extends Base with A, B { ... }`: emits the type chunk and
/// its heritage references, returns the index of the opening brace so the
/// main loop walks the body.
fn parse_type_decl(
    tokens: &[Token],
    keyword_idx: usize,
    source: &str,
    output: &mut FileSyntax,
) -> Option<(String, usize)> {
    let name_token = tokens.get(keyword_idx + 1)?;
    if name_token.kind != TokenKind::Ident {
        return None;
    }
    let name = name_token.text.clone();

    // heritage clause up to the class body
    let mut idx = keyword_idx + 2;
    let mut heritage_keyword: Option<&str> = None;
    while let Some(token) = tokens.get(idx) {
        match &token.kind {
            TokenKind::Punct('{') => break,
            TokenKind::Ident => match token.text.as_str() {
                "extends" => heritage_keyword = Some("inherits"),
                "with" | "implements" => heritage_keyword = Some("mixes"),
                other => {
                    if let Some(context) = heritage_keyword {
                        if is_type_name(other) {
                            output.usages.push(RawUsage {
                                name: other.to_string(),
                                kind: usage_kind::REFERENCE.to_string(),
                                context: Some(context.to_string()),
                                line: token.line,
                            });
                        }
                    }
                }
            },
            _ => {}
        }
        idx += 1;
    }

    let open = idx;
    let close = matching_brace(tokens, open)?;
    let start_byte = tokens[keyword_idx].byte;
    let end_byte = tokens[close].byte + 1;
    output.chunks.push(RawChunk {
        symbol_name: name.clone(),
        symbol_kind: symbol_kind::CLASS.to_string(),
        start_line: tokens[keyword_idx].line,
        end_line: tokens[close].line,
        start_byte,
        end_byte,
        complexity: token_complexity(&source[start_byte..end_byte.min(source.len())]),
        ..Default::default()
    });
    // return just past the opening brace so the body is walked for methods
    Some((name, open))
}

fn push_callable(
    tokens: &[Token],
    name_idx: usize,
    params_close: usize,
    depth: i64,
    current_class: &str,
    source: &str,
    output: &mut FileSyntax,
) -> usize {
    let name = tokens[name_idx].text.clone();
    // a constructor declaration repeats the class name; keep it as a chunk
    // but never as a usage of itself
    let start_byte = tokens[name_idx].byte;
    let params_text = source
        .get(tokens[name_idx + 1].byte..tokens[params_close].byte + 1)
        .unwrap_or("()");
    let (end_idx, end_byte) = match tokens.get(params_close + 1).map(|t| &t.kind) {
        Some(TokenKind::Punct('{')) => match matching_brace(tokens, params_close + 1) {
            Some(close) => (close, tokens[close].byte + 1),
            None => (params_close, tokens[params_close].byte + 1),
        },
        _ => {
            // arrow body runs to the terminating semicolon
            let mut idx = params_close + 1;
            while let Some(token) = tokens.get(idx) {
                if token.kind == TokenKind::Punct(';') {
                    break;
                }
                idx += 1;
            }
            let end = idx.min(tokens.len() - 1);
            (end, tokens[end].byte + 1)
        }
    };
    let kind = if depth == 1 {
        symbol_kind::METHOD
    } else {
        symbol_kind::FUNCTION
    };
    output.chunks.push(RawChunk {
        symbol_name: name.clone(),
        symbol_kind: kind.to_string(),
        start_line: tokens[name_idx].line,
        end_line: tokens[end_idx].line,
        start_byte,
        end_byte,
        signature: util::squash_whitespace(&format!("{name}{params_text}")),
        parent_symbol: if depth == 1 {
            current_class.to_string()
        } else {
            String::new()
        },
        complexity: token_complexity(source.get(start_byte..end_byte).unwrap_or("")),
        ..Default::default()
    });
    // continue from the params close so the body tokens are scanned for
    // usages by the main loop
    params_close + 1
}

fn record_call_usage(
    tokens: &[Token],
    name_idx: usize,
    current_class: &str,
    output: &mut FileSyntax,
) {
    let token = &tokens[name_idx];
    let name = token.text.as_str();
    if is_reserved(name) || name == current_class {
        return;
    }
    let kind = if is_type_name(name) {
        usage_kind::INSTANTIATION
    } else {
        usage_kind::CALL
    };
    output.usages.push(RawUsage {
        name: name.to_string(),
        kind: kind.to_string(),
        context: None,
        line: token.line,
    });
}

fn parse_top_level_variable(
    tokens: &[Token],
    idx: usize,
    output: &mut FileSyntax,
) -> Option<usize> {
    let first = &tokens[idx];
    if !matches!(first.text.as_str(), "final" | "const" | "var" | "late") {
        return None;
    }
    // walk to the identifier directly before `=` or `;`
    let mut name_idx = None;
    let mut end = idx + 1;
    while let Some(token) = tokens.get(end) {
        match &token.kind {
            TokenKind::Punct('=') | TokenKind::Punct(';') => break,
            TokenKind::Ident => name_idx = Some(end),
            _ => {}
        }
        end += 1;
    }
    let name_idx = name_idx?;
    // consume through the terminating semicolon
    let mut close = end;
    while let Some(token) = tokens.get(close) {
        if token.kind == TokenKind::Punct(';') {
            break;
        }
        close += 1;
    }
    let close = close.min(tokens.len() - 1);
    let kind = if first.text == "const" {
        symbol_kind::CONSTANT
    } else {
        symbol_kind::VARIABLE
    };
    let start_byte = first.byte;
    let end_byte = tokens[close].byte + 1;
    output.chunks.push(RawChunk {
        symbol_name: tokens[name_idx].text.clone(),
        symbol_kind: kind.to_string(),
        start_line: first.line,
        end_line: tokens[close].line,
        start_byte,
        end_byte,
        complexity: 1,
        ..Default::default()
    });
    Some(close + 1)
}

fn matching_paren(tokens: &[Token], open: usize) -> Option<usize> {
    matching(tokens, open, '(', ')')
}

fn matching_brace(tokens: &[Token], open: usize) -> Option<usize> {
    matching(tokens, open, '{', '}')
}

fn matching(tokens: &[Token], open: usize, open_ch: char, close_ch: char) -> Option<usize> {
    if tokens.get(open)?.kind != TokenKind::Punct(open_ch) {
        return None;
    }
    let mut balance = 0;
    for (offset, token) in tokens[open..].iter().enumerate() {
        if token.kind == TokenKind::Punct(open_ch) {
            balance += 1;
        } else if token.kind == TokenKind::Punct(close_ch) {
            balance -= 1;
            if balance == 0 {
                return Some(open + offset);
            }
        }
    }
    None
}

fn is_type_name(name: &str) -> bool {
    name.chars().next().map(|ch| ch.is_ascii_uppercase()).unwrap_or(false)
}

fn is_reserved(name: &str) -> bool {
    matches!(
        name,
        "if" | "for" | "while" | "switch" | "catch" | "return" | "await" | "assert" | "super"
            | "this" | "throw"
    )
}

/// Teacher-style token complexity for a language without a grammar: 1 plus
/// branch keyword and operator hits in the snippet.
fn token_complexity(snippet: &str) -> i64 {
    const KEYWORDS: &[&str] = &["if", "for", "while", "case", "catch"];
    let mut count = 1;
    let mut token = String::new();
    for ch in snippet.chars() {
        if ch.is_ascii_alphanumeric() || ch == '_' {
            token.push(ch);
        } else {
            if KEYWORDS.contains(&token.as_str()) {
                count += 1;
            }
            token.clear();
        }
    }
    if KEYWORDS.contains(&token.as_str()) {
        count += 1;
    }
    count += snippet.matches("&&").count() as i64;
    count += snippet.matches("||").count() as i64;
    count
}

#[cfg(test)]
mod tests {
    use super::*;

    fn extract(source: &str) -> FileSyntax {
        DartExtractor::new().extract(source).unwrap()
    }

    #[test]
    fn classes_functions_and_variables_are_chunked() {
        let syntax = extract(
            r#"import 'package:flutter/material.dart';

const appTitle = 'demo';

class AuthGate extends StatelessWidget {
  Widget build(BuildContext context) {
    if (loggedIn) {
      return HomeScreen();
    }
    return LoginScreen();
  }
}

void main() => runApp(AuthGate());
"#,
        );
        let names: Vec<(&str, &str)> = syntax
            .chunks
            .iter()
            .map(|c| (c.symbol_kind.as_str(), c.symbol_name.as_str()))
            .collect();
        assert!(names.contains(&("class", "AuthGate")));
        assert!(names.contains(&("method", "build")));
        assert!(names.contains(&("constant", "appTitle")));
        assert!(names.contains(&("function", "main")));
        assert_eq!(
            syntax.dependencies,
            vec!["package:flutter/material.dart"]
        );

        let build = syntax.chunks.iter().find(|c| c.symbol_name == "build").unwrap();
        assert_eq!(build.parent_symbol, "AuthGate");
        assert_eq!(build.complexity, 2);
    }

    #[test]
    fn widget_invocations_are_instantiations() {
        let syntax = extract(
            "class AuthGate {\n  Widget build() {\n    return LoginScreen();\n  }\n}\n",
        );
        assert!(syntax
            .usages
            .iter()
            .any(|u| u.name == "LoginScreen" && u.kind == usage_kind::INSTANTIATION));
        // the widget invocation is a usage, not a chunk
        assert!(!syntax.chunks.iter().any(|c| c.symbol_name == "LoginScreen"));
    }

    #[test]
    fn new_expressions_and_method_calls() {
        let syntax = extract(
            "void main() {\n  final svc = new AuthService();\n  svc.login();\n}\n",
        );
        assert!(syntax
            .usages
            .iter()
            .any(|u| u.name == "AuthService" && u.kind == usage_kind::INSTANTIATION));
        assert!(syntax
            .usages
            .iter()
            .any(|u| u.name == "login" && u.kind == usage_kind::CALL));
    }

    #[test]
    fn extends_and_mixins_are_references() {
        let syntax = extract("class A extends B with C {\n}\n");
        assert!(syntax
            .usages
            .iter()
            .any(|u| u.name == "B" && u.context.as_deref() == Some("inherits")));
        assert!(syntax
            .usages
            .iter()
            .any(|u| u.name == "C" && u.context.as_deref() == Some("mixes")));
    }
}
