use crate::model::{symbol_kind, usage_kind};
use crate::parser::{
    callable_signature, count_branches, end_line, node_text, start_line, unquote, ChunkExtractor,
    FileSyntax, RawChunk, RawUsage,
};
use anyhow::Result;
use tree_sitter::{Node, Parser};

/// Anonymous operator tokens count as branch nodes alongside the named
/// statement kinds; tree-sitter exposes them with their literal as kind.
const BRANCH_KINDS: &[&str] = &[
    "if_statement",
    "for_statement",
    "for_in_statement",
    "while_statement",
    "do_statement",
    "switch_case",
    "catch_clause",
    "ternary_expression",
    "&&",
    "||",
    "??",
];

#[derive(Clone, Copy, PartialEq)]
enum Flavor {
    Javascript,
    Typescript,
    Tsx,
}

pub struct JsExtractor {
    parser: Parser,
    flavor: Flavor,
}

impl JsExtractor {
    pub fn javascript() -> Result<Self> {
        let mut parser = Parser::new();
        parser.set_language(&tree_sitter_javascript::LANGUAGE.into())?;
        Ok(Self {
            parser,
            flavor: Flavor::Javascript,
        })
    }

    pub fn typescript() -> Result<Self> {
        let mut parser = Parser::new();
        parser.set_language(&tree_sitter_typescript::LANGUAGE_TYPESCRIPT.into())?;
        Ok(Self {
            parser,
            flavor: Flavor::Typescript,
        })
    }

    pub fn tsx() -> Result<Self> {
        let mut parser = Parser::new();
        parser.set_language(&tree_sitter_typescript::LANGUAGE_TSX.into())?;
        Ok(Self {
            parser,
            flavor: Flavor::Tsx,
        })
    }
}

impl ChunkExtractor for JsExtractor {
    fn extract(&mut self, source: &str) -> Result<FileSyntax> {
        let mut output = FileSyntax::default();
        let Some(tree) = self.parser.parse(source, None) else {
            return Ok(output);
        };
        let ctx = Context {
            class_name: None,
            fn_depth: 0,
            flavor: self.flavor,
        };
        walk_node(tree.root_node(), &ctx, source, &mut output);
        Ok(output)
    }
}

#[derive(Clone)]
struct Context {
    class_name: Option<String>,
    fn_depth: usize,
    flavor: Flavor,
}

fn walk_node(node: Node<'_>, ctx: &Context, source: &str, output: &mut FileSyntax) {
    match node.kind() {
        "function_declaration" | "generator_function_declaration" => {
            handle_function(node, ctx, source, output);
            return;
        }
        "class_declaration" => {
            handle_class(node, ctx, source, output);
            return;
        }
        "interface_declaration" | "enum_declaration" if ctx.flavor != Flavor::Javascript => {
            handle_type_decl(node, ctx, source, output);
            return;
        }
        "method_definition" => {
            handle_method(node, ctx, source, output);
            return;
        }
        "lexical_declaration" | "variable_declaration" => {
            if ctx.fn_depth == 0 && ctx.class_name.is_none() {
                handle_top_level_declaration(node, source, output);
            }
            // initializer expressions still carry usages
        }
        "import_statement" | "export_statement" => {
            if let Some(import_source) = node.child_by_field_name("source") {
                let dep = unquote(&node_text(import_source, source));
                if !dep.is_empty() && !output.dependencies.contains(&dep) {
                    output.dependencies.push(dep);
                }
            }
        }
        "call_expression" => handle_call(node, source, output),
        "new_expression" => {
            if let Some(ctor) = node.child_by_field_name("constructor") {
                push_instantiation(node_text(ctor, source), start_line(node), output);
            }
        }
        "jsx_opening_element" | "jsx_self_closing_element" => {
            if let Some(name) = node.child_by_field_name("name") {
                push_instantiation(node_text(name, source), start_line(node), output);
            }
        }
        "decorator" => {
            let raw = node_text(node, source);
            let raw = raw.trim_start_matches('@');
            let callee = raw.split('(').next().unwrap_or(raw);
            let last = callee.rsplit('.').next().unwrap_or(callee).trim();
            if !last.is_empty() {
                output.usages.push(RawUsage {
                    name: last.to_string(),
                    kind: usage_kind::DECORATOR.to_string(),
                    context: None,
                    line: start_line(node),
                });
            }
        }
        _ => {}
    }

    let mut cursor = node.walk();
    for child in node.named_children(&mut cursor) {
        walk_node(child, ctx, source, output);
    }
}

fn handle_function(node: Node<'_>, ctx: &Context, source: &str, output: &mut FileSyntax) {
    let Some(name_node) = node.child_by_field_name("name") else {
        return;
    };
    if ctx.fn_depth == 0 {
        let name = node_text(name_node, source);
        output.chunks.push(RawChunk {
            symbol_name: name.clone(),
            symbol_kind: symbol_kind::FUNCTION.to_string(),
            start_line: start_line(node),
            end_line: end_line(node),
            start_byte: node.start_byte(),
            end_byte: node.end_byte(),
            signature: callable_signature(&name, node.child_by_field_name("parameters"), source),
            docstring: leading_comment(node, source),
            parent_symbol: String::new(),
            complexity: count_branches(node, BRANCH_KINDS),
        });
    }
    descend_into_body(node, ctx, source, output);
}

fn handle_class(node: Node<'_>, ctx: &Context, source: &str, output: &mut FileSyntax) {
    if ctx.fn_depth > 0 {
        return;
    }
    let Some(name_node) = node.child_by_field_name("name") else {
        return;
    };
    let name = node_text(name_node, source);
    output.chunks.push(RawChunk {
        symbol_name: name.clone(),
        symbol_kind: symbol_kind::CLASS.to_string(),
        start_line: start_line(node),
        end_line: end_line(node),
        start_byte: node.start_byte(),
        end_byte: node.end_byte(),
        docstring: leading_comment(node, source),
        complexity: count_branches(node, BRANCH_KINDS),
        ..Default::default()
    });

    // extends clause
    let mut cursor = node.walk();
    for child in node.named_children(&mut cursor) {
        if child.kind() == "class_heritage" {
            let raw = node_text(child, source);
            let base = raw
                .trim_start_matches("extends")
                .trim()
                .split(|ch: char| ch == ' ' || ch == '(' || ch == '{')
                .next()
                .unwrap_or("")
                .trim();
            let base = base.rsplit('.').next().unwrap_or(base);
            if !base.is_empty() {
                output.usages.push(RawUsage {
                    name: base.to_string(),
                    kind: usage_kind::REFERENCE.to_string(),
                    context: Some("inherits".to_string()),
                    line: start_line(node),
                });
            }
        }
    }

    if let Some(body) = node.child_by_field_name("body") {
        let mut next = ctx.clone();
        next.class_name = Some(name);
        let mut body_cursor = body.walk();
        for child in body.named_children(&mut body_cursor) {
            walk_node(child, &next, source, output);
        }
    }
}

fn handle_type_decl(node: Node<'_>, ctx: &Context, source: &str, output: &mut FileSyntax) {
    if ctx.fn_depth > 0 || ctx.class_name.is_some() {
        return;
    }
    let Some(name_node) = node.child_by_field_name("name") else {
        return;
    };
    output.chunks.push(RawChunk {
        symbol_name: node_text(name_node, source),
        symbol_kind: symbol_kind::CLASS.to_string(),
        start_line: start_line(node),
        end_line: end_line(node),
        start_byte: node.start_byte(),
        end_byte: node.end_byte(),
        docstring: leading_comment(node, source),
        complexity: 1,
        ..Default::default()
    });
}

fn handle_method(node: Node<'_>, ctx: &Context, source: &str, output: &mut FileSyntax) {
    let Some(name_node) = node.child_by_field_name("name") else {
        return;
    };
    if ctx.fn_depth == 0 {
        let name = node_text(name_node, source);
        output.chunks.push(RawChunk {
            symbol_name: name.clone(),
            symbol_kind: symbol_kind::METHOD.to_string(),
            start_line: start_line(node),
            end_line: end_line(node),
            start_byte: node.start_byte(),
            end_byte: node.end_byte(),
            signature: callable_signature(&name, node.child_by_field_name("parameters"), source),
            docstring: leading_comment(node, source),
            parent_symbol: ctx.class_name.clone().unwrap_or_default(),
            complexity: count_branches(node, BRANCH_KINDS),
        });
    }
    descend_into_body(node, ctx, source, output);
}

/// Top-level `const`/`let`/`var`. Arrow and function initializers become
/// function chunks; everything else is a variable or constant.
fn handle_top_level_declaration(node: Node<'_>, source: &str, output: &mut FileSyntax) {
    let mut cursor = node.walk();
    for declarator in node.named_children(&mut cursor) {
        if declarator.kind() != "variable_declarator" {
            continue;
        }
        let Some(name_node) = declarator.child_by_field_name("name") else {
            continue;
        };
        if name_node.kind() != "identifier" {
            continue;
        }
        let name = node_text(name_node, source);
        let value = declarator.child_by_field_name("value");
        let is_callable = matches!(
            value.map(|v| v.kind()),
            Some("arrow_function") | Some("function_expression") | Some("function")
        );
        let kind = if is_callable {
            symbol_kind::FUNCTION
        } else if name
            .chars()
            .all(|ch| ch.is_ascii_uppercase() || ch == '_' || ch.is_ascii_digit())
        {
            symbol_kind::CONSTANT
        } else {
            symbol_kind::VARIABLE
        };
        let signature = if is_callable {
            let params = value.and_then(|v| v.child_by_field_name("parameters"));
            callable_signature(&name, params, source)
        } else {
            String::new()
        };
        output.chunks.push(RawChunk {
            symbol_name: name,
            symbol_kind: kind.to_string(),
            start_line: start_line(node),
            end_line: end_line(node),
            start_byte: node.start_byte(),
            end_byte: node.end_byte(),
            signature,
            complexity: count_branches(node, BRANCH_KINDS),
            ..Default::default()
        });
    }
}

fn descend_into_body(node: Node<'_>, ctx: &Context, source: &str, output: &mut FileSyntax) {
    if let Some(body) = node.child_by_field_name("body") {
        let mut next = ctx.clone();
        next.fn_depth += 1;
        let mut cursor = body.walk();
        for child in body.named_children(&mut cursor) {
            walk_node(child, &next, source, output);
        }
    }
}

fn handle_call(node: Node<'_>, source: &str, output: &mut FileSyntax) {
    let Some(function) = node.child_by_field_name("function") else {
        return;
    };
    let raw = node_text(function, source);
    let target = raw.rsplit('.').next().unwrap_or(&raw).trim();
    if target.is_empty() || !is_identifier(target) {
        return;
    }
    output.usages.push(RawUsage {
        name: target.to_string(),
        kind: usage_kind::CALL.to_string(),
        context: None,
        line: start_line(node),
    });
}

/// JSX tags and `new` targets. Lowercase JSX tags are host elements, not
/// component references.
fn push_instantiation(raw: String, line: i64, output: &mut FileSyntax) {
    let name = raw.rsplit('.').next().unwrap_or(&raw).trim().to_string();
    if name.is_empty() || !name.chars().next().unwrap_or('a').is_ascii_uppercase() {
        return;
    }
    output.usages.push(RawUsage {
        name,
        kind: usage_kind::INSTANTIATION.to_string(),
        context: None,
        line,
    });
}

fn is_identifier(raw: &str) -> bool {
    !raw.is_empty()
        && raw
            .chars()
            .all(|ch| ch.is_ascii_alphanumeric() || ch == '_' || ch == '$')
}

fn leading_comment(node: Node<'_>, source: &str) -> String {
    let Some(prev) = node.prev_named_sibling() else {
        return String::new();
    };
    if prev.kind() != "comment" {
        return String::new();
    }
    node_text(prev, source)
        .trim_start_matches("/**")
        .trim_start_matches("/*")
        .trim_start_matches("//")
        .trim_end_matches("*/")
        .trim()
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn extract_ts(source: &str) -> FileSyntax {
        let mut extractor = JsExtractor::typescript().unwrap();
        extractor.extract(source).unwrap()
    }

    fn extract_tsx(source: &str) -> FileSyntax {
        let mut extractor = JsExtractor::tsx().unwrap();
        extractor.extract(source).unwrap()
    }

    #[test]
    fn chunks_functions_classes_and_consts() {
        let syntax = extract_ts(
            r#"import { api } from "./api";

const MAX_SIZE = 10;
const fetchUser = async (id: string) => api.get(id);

export function render(input: string) {
    if (input) {
        return input.trim();
    }
    return "";
}

class Session {
    refresh(token: string) {
        return api.post(token);
    }
}
"#,
        );
        let names: Vec<(&str, &str)> = syntax
            .chunks
            .iter()
            .map(|c| (c.symbol_kind.as_str(), c.symbol_name.as_str()))
            .collect();
        assert!(names.contains(&("constant", "MAX_SIZE")));
        assert!(names.contains(&("function", "fetchUser")));
        assert!(names.contains(&("function", "render")));
        assert!(names.contains(&("class", "Session")));
        assert!(names.contains(&("method", "refresh")));
        assert_eq!(syntax.dependencies, vec!["./api"]);

        let render = syntax
            .chunks
            .iter()
            .find(|c| c.symbol_name == "render")
            .unwrap();
        assert_eq!(render.complexity, 2);

        let refresh = syntax
            .chunks
            .iter()
            .find(|c| c.symbol_name == "refresh")
            .unwrap();
        assert_eq!(refresh.parent_symbol, "Session");
    }

    #[test]
    fn jsx_tags_become_instantiations() {
        let syntax = extract_tsx(
            "import { LoginScreen } from './login';\nexport function AuthGate() {\n  return <LoginScreen title=\"hi\" />;\n}\n",
        );
        assert!(syntax
            .usages
            .iter()
            .any(|u| u.name == "LoginScreen" && u.kind == usage_kind::INSTANTIATION));
        // lowercase DOM tags are not component references
        let dom = extract_tsx("export function App() {\n  return <div>x</div>;\n}\n");
        assert!(!dom.usages.iter().any(|u| u.kind == usage_kind::INSTANTIATION));
    }

    #[test]
    fn interfaces_are_chunked_in_typescript() {
        let syntax = extract_ts("export interface User {\n  id: string;\n}\n");
        assert!(syntax
            .chunks
            .iter()
            .any(|c| c.symbol_name == "User" && c.symbol_kind == symbol_kind::CLASS));
    }

    #[test]
    fn extends_clause_is_an_inherit_reference() {
        let syntax = extract_ts("class Admin extends User {}\n");
        assert!(syntax
            .usages
            .iter()
            .any(|u| u.name == "User" && u.context.as_deref() == Some("inherits")));
    }
}
