use crate::model::{symbol_kind, usage_kind};
use crate::parser::{
    callable_signature, count_branches, end_line, node_text, start_line, unquote, ChunkExtractor,
    FileSyntax, RawChunk, RawUsage,
};
use anyhow::Result;
use tree_sitter::{Node, Parser};

/// Call targets whose arguments are dependency-injection references, not
/// plain values. `Depends(verify_token)` is a usage of `verify_token`.
const INJECTION_CALLS: &[&str] = &["Depends", "Provide"];

const BRANCH_KINDS: &[&str] = &[
    "if_statement",
    "elif_clause",
    "for_statement",
    "while_statement",
    "case_clause",
    "except_clause",
    "boolean_operator",
    "conditional_expression",
];

#[derive(Clone, Default)]
struct Context {
    class_stack: Vec<String>,
    fn_depth: usize,
}

pub struct PythonExtractor {
    parser: Parser,
}

impl PythonExtractor {
    pub fn new() -> Result<Self> {
        let mut parser = Parser::new();
        let language = tree_sitter_python::LANGUAGE;
        parser.set_language(&language.into())?;
        Ok(Self { parser })
    }
}

impl ChunkExtractor for PythonExtractor {
    fn extract(&mut self, source: &str) -> Result<FileSyntax> {
        let mut output = FileSyntax::default();
        let Some(tree) = self.parser.parse(source, None) else {
            return Ok(output);
        };
        walk_node(tree.root_node(), &Context::default(), source, &mut output);
        Ok(output)
    }
}

fn walk_node(node: Node<'_>, ctx: &Context, source: &str, output: &mut FileSyntax) {
    match node.kind() {
        "decorated_definition" => {
            handle_decorated(node, ctx, source, output);
            return;
        }
        "class_definition" => {
            handle_class(node, ctx, source, output);
            return;
        }
        "function_definition" => {
            handle_function(node, ctx, source, output);
            return;
        }
        "import_statement" | "import_from_statement" => {
            if ctx.fn_depth == 0 && ctx.class_stack.is_empty() {
                collect_imports(node, source, &mut output.dependencies);
            }
            return;
        }
        "expression_statement" => {
            if ctx.fn_depth == 0 && ctx.class_stack.is_empty() {
                if let Some(assignment) = assignment_child(node) {
                    handle_module_assignment(node, assignment, source, output);
                }
            }
            // fall through: calls inside the expression still count as usages
        }
        "call" => handle_call(node, source, output),
        _ => {}
    }

    let mut cursor = node.walk();
    for child in node.named_children(&mut cursor) {
        walk_node(child, ctx, source, output);
    }
}

fn handle_decorated(node: Node<'_>, ctx: &Context, source: &str, output: &mut FileSyntax) {
    let mut cursor = node.walk();
    for child in node.named_children(&mut cursor) {
        match child.kind() {
            "decorator" => {
                if let Some(name) = decorator_name(child, source) {
                    output.usages.push(RawUsage {
                        name,
                        kind: usage_kind::DECORATOR.to_string(),
                        context: None,
                        line: start_line(child),
                    });
                }
                // decorator arguments may carry injected references
                let mut inner = child.walk();
                for grand in child.named_children(&mut inner) {
                    walk_node(grand, ctx, source, output);
                }
            }
            "class_definition" => handle_class(child, ctx, source, output),
            "function_definition" => handle_function(child, ctx, source, output),
            _ => {}
        }
    }
}

/// Decorator reference: strip the leading `@`, drop any call arguments,
/// keep the last dotted component.
fn decorator_name(node: Node<'_>, source: &str) -> Option<String> {
    let raw = node_text(node, source);
    let raw = raw.trim_start_matches('@').trim();
    let callee = raw.split('(').next().unwrap_or(raw);
    let last = callee.rsplit('.').next().unwrap_or(callee).trim();
    if last.is_empty() {
        None
    } else {
        Some(last.to_string())
    }
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
        docstring: body_docstring(node, source),
        parent_symbol: ctx.class_stack.last().cloned().unwrap_or_default(),
        complexity: count_branches(node, BRANCH_KINDS),
        ..Default::default()
    });

    if let Some(superclasses) = node.child_by_field_name("superclasses") {
        let mut cursor = superclasses.walk();
        for base in superclasses.named_children(&mut cursor) {
            let raw = node_text(base, source);
            let last = raw.rsplit('.').next().unwrap_or(&raw).trim().to_string();
            if !last.is_empty() && base.kind() != "keyword_argument" {
                output.usages.push(RawUsage {
                    name: last,
                    kind: usage_kind::REFERENCE.to_string(),
                    context: Some("inherits".to_string()),
                    line: start_line(node),
                });
            }
        }
    }

    if let Some(body) = node.child_by_field_name("body") {
        let mut next = ctx.clone();
        next.class_stack.push(name);
        let mut cursor = body.walk();
        for child in body.named_children(&mut cursor) {
            walk_node(child, &next, source, output);
        }
    }
}

fn handle_function(node: Node<'_>, ctx: &Context, source: &str, output: &mut FileSyntax) {
    let Some(name_node) = node.child_by_field_name("name") else {
        return;
    };
    if ctx.fn_depth == 0 {
        let name = node_text(name_node, source);
        let kind = if ctx.class_stack.is_empty() {
            symbol_kind::FUNCTION
        } else {
            symbol_kind::METHOD
        };
        output.chunks.push(RawChunk {
            symbol_name: name.clone(),
            symbol_kind: kind.to_string(),
            start_line: start_line(node),
            end_line: end_line(node),
            start_byte: node.start_byte(),
            end_byte: node.end_byte(),
            signature: callable_signature(&name, node.child_by_field_name("parameters"), source),
            docstring: body_docstring(node, source),
            parent_symbol: ctx.class_stack.last().cloned().unwrap_or_default(),
            complexity: count_branches(node, BRANCH_KINDS),
            ..Default::default()
        });
    }
    if let Some(body) = node.child_by_field_name("body") {
        let mut next = ctx.clone();
        next.fn_depth += 1;
        let mut cursor = body.walk();
        for child in body.named_children(&mut cursor) {
            walk_node(child, &next, source, output);
        }
    }
}

fn handle_module_assignment(
    stmt: Node<'_>,
    assignment: Node<'_>,
    source: &str,
    output: &mut FileSyntax,
) {
    let Some(left) = assignment.child_by_field_name("left") else {
        return;
    };
    if left.kind() != "identifier" {
        return;
    }
    let name = node_text(left, source);
    let kind = if name.chars().all(|ch| ch.is_ascii_uppercase() || ch == '_' || ch.is_ascii_digit())
    {
        symbol_kind::CONSTANT
    } else {
        symbol_kind::VARIABLE
    };
    output.chunks.push(RawChunk {
        symbol_name: name,
        symbol_kind: kind.to_string(),
        start_line: start_line(stmt),
        end_line: end_line(stmt),
        start_byte: stmt.start_byte(),
        end_byte: stmt.end_byte(),
        complexity: 1,
        ..Default::default()
    });
}

fn assignment_child(stmt: Node<'_>) -> Option<Node<'_>> {
    let child = stmt.named_child(0)?;
    if child.kind() == "assignment" {
        Some(child)
    } else {
        None
    }
}

fn handle_call(node: Node<'_>, source: &str, output: &mut FileSyntax) {
    let Some(function) = node.child_by_field_name("function") else {
        return;
    };
    let raw = node_text(function, source);
    let target = raw.rsplit('.').next().unwrap_or(&raw).trim().to_string();
    if target.is_empty() {
        return;
    }
    output.usages.push(RawUsage {
        name: target.clone(),
        kind: usage_kind::CALL.to_string(),
        context: None,
        line: start_line(node),
    });

    // Identifiers handed to an injection call are references in their own
    // right, tagged with the enclosing call for the linker.
    if INJECTION_CALLS.contains(&target.as_str()) {
        if let Some(args) = node.child_by_field_name("arguments") {
            let mut cursor = args.walk();
            for arg in args.named_children(&mut cursor) {
                if arg.kind() == "identifier" {
                    output.usages.push(RawUsage {
                        name: node_text(arg, source),
                        kind: usage_kind::CALL.to_string(),
                        context: Some(target.clone()),
                        line: start_line(arg),
                    });
                }
            }
        }
    }
}

fn collect_imports(node: Node<'_>, source: &str, dependencies: &mut Vec<String>) {
    match node.kind() {
        "import_statement" => {
            let mut cursor = node.walk();
            for child in node.named_children(&mut cursor) {
                match child.kind() {
                    "dotted_name" => push_dep(dependencies, node_text(child, source)),
                    "aliased_import" => {
                        if let Some(name) = child.child_by_field_name("name") {
                            push_dep(dependencies, node_text(name, source));
                        }
                    }
                    _ => {}
                }
            }
        }
        "import_from_statement" => {
            if let Some(module) = node.child_by_field_name("module_name") {
                push_dep(dependencies, node_text(module, source));
            }
        }
        _ => {}
    }
}

fn push_dep(dependencies: &mut Vec<String>, dep: String) {
    if !dep.is_empty() && !dependencies.contains(&dep) {
        dependencies.push(dep);
    }
}

fn body_docstring(node: Node<'_>, source: &str) -> String {
    let Some(body) = node.child_by_field_name("body") else {
        return String::new();
    };
    let mut cursor = body.walk();
    let Some(first) = body.named_children(&mut cursor).next() else {
        return String::new();
    };
    if first.kind() != "expression_statement" {
        return String::new();
    }
    match first.named_child(0) {
        Some(string_node) if string_node.kind() == "string" => {
            unquote(&node_text(string_node, source))
        }
        _ => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn extract(source: &str) -> FileSyntax {
        let mut extractor = PythonExtractor::new().unwrap();
        extractor.extract(source).unwrap()
    }

    #[test]
    fn chunks_functions_classes_and_module_vars() {
        let syntax = extract(
            r#""""module doc"""
import os
from pkg import helpers

MAX_RETRIES = 3

class Base:
    pass

class Service(Base):
    """service doc"""
    def handle(self, req):
        if req:
            return helpers.run(req)

def main():
    Service().handle(None)
"#,
        );
        let names: Vec<(&str, &str)> = syntax
            .chunks
            .iter()
            .map(|c| (c.symbol_kind.as_str(), c.symbol_name.as_str()))
            .collect();
        assert!(names.contains(&("constant", "MAX_RETRIES")));
        assert!(names.contains(&("class", "Base")));
        assert!(names.contains(&("class", "Service")));
        assert!(names.contains(&("method", "handle")));
        assert!(names.contains(&("function", "main")));

        assert_eq!(syntax.dependencies, vec!["os", "pkg"]);

        let handle = syntax
            .chunks
            .iter()
            .find(|c| c.symbol_name == "handle")
            .unwrap();
        assert_eq!(handle.parent_symbol, "Service");
        assert_eq!(handle.signature, "handle(self, req)");
        assert_eq!(handle.complexity, 2);

        let service = syntax
            .chunks
            .iter()
            .find(|c| c.symbol_name == "Service")
            .unwrap();
        assert_eq!(service.docstring, "service doc");

        assert!(syntax
            .usages
            .iter()
            .any(|u| u.name == "Base" && u.context.as_deref() == Some("inherits")));
        assert!(syntax
            .usages
            .iter()
            .any(|u| u.name == "run" && u.kind == usage_kind::CALL));
    }

    #[test]
    fn depends_arguments_become_usages() {
        let syntax = extract("from fastapi import Depends\nx = Depends(verify_token)\n");
        let injected = syntax
            .usages
            .iter()
            .find(|u| u.name == "verify_token")
            .unwrap();
        assert_eq!(injected.kind, usage_kind::CALL);
        assert_eq!(injected.context.as_deref(), Some("Depends"));
    }

    #[test]
    fn decorators_are_stripped_to_last_component() {
        let syntax = extract("@app.route('/x')\ndef handler():\n    pass\n");
        assert!(syntax
            .usages
            .iter()
            .any(|u| u.name == "route" && u.kind == usage_kind::DECORATOR));
    }

    #[test]
    fn nested_functions_are_not_chunked() {
        let syntax = extract("def outer():\n    def inner():\n        pass\n    inner()\n");
        let chunk_names: Vec<&str> = syntax.chunks.iter().map(|c| c.symbol_name.as_str()).collect();
        assert_eq!(chunk_names, vec!["outer"]);
        assert!(syntax.usages.iter().any(|u| u.name == "inner"));
    }

    #[test]
    fn relative_import_dependency_is_kept() {
        let syntax = extract("from .auth import verify\n");
        assert_eq!(syntax.dependencies, vec![".auth"]);
    }
}
