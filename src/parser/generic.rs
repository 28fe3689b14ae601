use crate::model::{symbol_kind, usage_kind};
use crate::parser::{
    callable_signature, count_branches, end_line, node_text, start_line, unquote, ChunkExtractor,
    FileSyntax, RawChunk, RawUsage,
};
use anyhow::Result;
use tree_sitter::{Node, Parser};

/// Shared walker for the brace languages whose chunking rules are the same
/// shape: functions and type declarations at top or type scope, plus call
/// usages and file-level imports.
#[derive(Clone, Copy, PartialEq)]
enum Lang {
    Go,
    Rust,
    Java,
    Cpp,
}

pub struct GenericExtractor {
    parser: Parser,
    lang: Lang,
}

impl GenericExtractor {
    pub fn go() -> Result<Self> {
        let mut parser = Parser::new();
        parser.set_language(&tree_sitter_go::LANGUAGE.into())?;
        Ok(Self {
            parser,
            lang: Lang::Go,
        })
    }

    pub fn rust() -> Result<Self> {
        let mut parser = Parser::new();
        parser.set_language(&tree_sitter_rust::LANGUAGE.into())?;
        Ok(Self {
            parser,
            lang: Lang::Rust,
        })
    }

    pub fn java() -> Result<Self> {
        let mut parser = Parser::new();
        parser.set_language(&tree_sitter_java::LANGUAGE.into())?;
        Ok(Self {
            parser,
            lang: Lang::Java,
        })
    }

    pub fn cpp() -> Result<Self> {
        let mut parser = Parser::new();
        parser.set_language(&tree_sitter_cpp::LANGUAGE.into())?;
        Ok(Self {
            parser,
            lang: Lang::Cpp,
        })
    }
}

impl ChunkExtractor for GenericExtractor {
    fn extract(&mut self, source: &str) -> Result<FileSyntax> {
        let mut output = FileSyntax::default();
        let Some(tree) = self.parser.parse(source, None) else {
            return Ok(output);
        };
        walk(tree.root_node(), self.lang, None, source, &mut output);
        Ok(output)
    }
}

fn branch_kinds(lang: Lang) -> &'static [&'static str] {
    match lang {
        Lang::Go => &[
            "if_statement",
            "for_statement",
            "expression_case",
            "type_case",
            "communication_case",
            "&&",
            "||",
        ],
        Lang::Rust => &[
            "if_expression",
            "while_expression",
            "for_expression",
            "loop_expression",
            "match_arm",
            "&&",
            "||",
        ],
        Lang::Java => &[
            "if_statement",
            "for_statement",
            "enhanced_for_statement",
            "while_statement",
            "do_statement",
            "switch_block_statement_group",
            "catch_clause",
            "ternary_expression",
            "&&",
            "||",
        ],
        Lang::Cpp => &[
            "if_statement",
            "for_statement",
            "while_statement",
            "do_statement",
            "case_statement",
            "catch_clause",
            "conditional_expression",
            "&&",
            "||",
        ],
    }
}

fn walk(node: Node<'_>, lang: Lang, parent: Option<&str>, source: &str, output: &mut FileSyntax) {
    match (lang, node.kind()) {
        (Lang::Go, "function_declaration")
        | (Lang::Rust, "function_item")
        | (Lang::Java, "method_declaration")
        | (Lang::Cpp, "function_definition") => {
            push_callable(node, lang, parent, source, output);
            collect_calls(node, lang, source, output);
            return;
        }
        (Lang::Go, "method_declaration") => {
            let receiver = receiver_type(node, source);
            push_callable(node, lang, receiver.as_deref(), source, output);
            collect_calls(node, lang, source, output);
            return;
        }
        (Lang::Go, "type_declaration") => {
            let mut cursor = node.walk();
            for spec in node.named_children(&mut cursor) {
                if spec.kind() == "type_spec" {
                    if let Some(name) = spec.child_by_field_name("name") {
                        push_type(node, node_text(name, source), lang, source, output);
                    }
                }
            }
            return;
        }
        (Lang::Rust, "struct_item")
        | (Lang::Rust, "enum_item")
        | (Lang::Rust, "trait_item")
        | (Lang::Java, "class_declaration")
        | (Lang::Java, "interface_declaration")
        | (Lang::Java, "enum_declaration")
        | (Lang::Cpp, "class_specifier")
        | (Lang::Cpp, "struct_specifier")
        | (Lang::Cpp, "enum_specifier") => {
            if let Some(name) = node.child_by_field_name("name") {
                let type_name = node_text(name, source);
                push_type(node, type_name.clone(), lang, source, output);
                if let Some(body) = node.child_by_field_name("body") {
                    let mut cursor = body.walk();
                    for child in body.named_children(&mut cursor) {
                        walk(child, lang, Some(&type_name), source, output);
                    }
                }
            }
            return;
        }
        (Lang::Rust, "impl_item") => {
            let type_name = node
                .child_by_field_name("type")
                .map(|n| node_text(n, source))
                .unwrap_or_default();
            let type_name = type_name.split('<').next().unwrap_or("").trim().to_string();
            if let Some(body) = node.child_by_field_name("body") {
                let mut cursor = body.walk();
                for child in body.named_children(&mut cursor) {
                    walk(child, lang, Some(&type_name), source, output);
                }
            }
            return;
        }
        (Lang::Rust, "const_item") | (Lang::Rust, "static_item") => {
            if parent.is_none() {
                if let Some(name) = node.child_by_field_name("name") {
                    output.chunks.push(RawChunk {
                        symbol_name: node_text(name, source),
                        symbol_kind: symbol_kind::CONSTANT.to_string(),
                        start_line: start_line(node),
                        end_line: end_line(node),
                        start_byte: node.start_byte(),
                        end_byte: node.end_byte(),
                        complexity: 1,
                        ..Default::default()
                    });
                }
            }
            return;
        }
        (Lang::Go, "const_declaration") | (Lang::Go, "var_declaration") => {
            if parent.is_none() && node.parent().map(|p| p.kind()) == Some("source_file") {
                collect_go_value_specs(node, lang, source, output);
            }
            return;
        }
        (Lang::Go, "import_declaration") => {
            collect_go_imports(node, source, &mut output.dependencies);
            return;
        }
        (Lang::Rust, "use_declaration") => {
            if let Some(arg) = node.child_by_field_name("argument") {
                push_dep(&mut output.dependencies, node_text(arg, source));
            }
            return;
        }
        (Lang::Java, "import_declaration") => {
            let raw = node_text(node, source);
            let dep = raw
                .trim_start_matches("import")
                .trim()
                .trim_start_matches("static")
                .trim()
                .trim_end_matches(';')
                .trim()
                .to_string();
            push_dep(&mut output.dependencies, dep);
            return;
        }
        (Lang::Cpp, "preproc_include") => {
            if let Some(path) = node.child_by_field_name("path") {
                let raw = node_text(path, source);
                let dep = raw.trim_matches(|ch| ch == '<' || ch == '>' || ch == '"').to_string();
                push_dep(&mut output.dependencies, dep);
            }
            return;
        }
        _ => {}
    }

    let mut cursor = node.walk();
    for child in node.named_children(&mut cursor) {
        walk(child, lang, parent, source, output);
    }
}

fn push_callable(
    node: Node<'_>,
    lang: Lang,
    parent: Option<&str>,
    source: &str,
    output: &mut FileSyntax,
) {
    let Some(name) = callable_name(node, lang, source) else {
        return;
    };
    let params = match lang {
        Lang::Cpp => node
            .child_by_field_name("declarator")
            .and_then(|d| d.child_by_field_name("parameters")),
        _ => node.child_by_field_name("parameters"),
    };
    let kind = if parent.is_some() {
        symbol_kind::METHOD
    } else {
        symbol_kind::FUNCTION
    };
    output.chunks.push(RawChunk {
        symbol_name: name.clone(),
        symbol_kind: kind.to_string(),
        start_line: start_line(node),
        end_line: end_line(node),
        start_byte: node.start_byte(),
        end_byte: node.end_byte(),
        signature: callable_signature(&name, params, source),
        docstring: leading_comment(node, source),
        parent_symbol: parent.unwrap_or("").to_string(),
        complexity: count_branches(node, branch_kinds(lang)),
    });
}

fn callable_name(node: Node<'_>, lang: Lang, source: &str) -> Option<String> {
    match lang {
        Lang::Cpp => {
            let declarator = node.child_by_field_name("declarator")?;
            let inner = declarator
                .child_by_field_name("declarator")
                .unwrap_or(declarator);
            let raw = node_text(inner, source);
            let name = raw.split('(').next().unwrap_or(&raw);
            let name = name.rsplit("::").next().unwrap_or(name).trim();
            if name.is_empty() {
                None
            } else {
                Some(name.to_string())
            }
        }
        _ => {
            let name = node.child_by_field_name("name")?;
            Some(node_text(name, source))
        }
    }
}

fn push_type(node: Node<'_>, name: String, lang: Lang, source: &str, output: &mut FileSyntax) {
    if name.is_empty() {
        return;
    }
    output.chunks.push(RawChunk {
        symbol_name: name,
        symbol_kind: symbol_kind::CLASS.to_string(),
        start_line: start_line(node),
        end_line: end_line(node),
        start_byte: node.start_byte(),
        end_byte: node.end_byte(),
        docstring: leading_comment(node, source),
        complexity: count_branches(node, branch_kinds(lang)),
        ..Default::default()
    });
}

fn receiver_type(node: Node<'_>, source: &str) -> Option<String> {
    let receiver = node.child_by_field_name("receiver")?;
    let raw = node_text(receiver, source);
    let cleaned = raw
        .trim_matches(|ch| ch == '(' || ch == ')')
        .rsplit(|ch: char| ch == ' ' || ch == '*')
        .next()
        .unwrap_or("")
        .trim()
        .to_string();
    if cleaned.is_empty() {
        None
    } else {
        Some(cleaned)
    }
}

fn collect_go_value_specs(node: Node<'_>, _lang: Lang, source: &str, output: &mut FileSyntax) {
    let kind = if node.kind() == "const_declaration" {
        symbol_kind::CONSTANT
    } else {
        symbol_kind::VARIABLE
    };
    let mut cursor = node.walk();
    for spec in node.named_children(&mut cursor) {
        if spec.kind() != "const_spec" && spec.kind() != "var_spec" {
            continue;
        }
        if let Some(name) = spec.child_by_field_name("name") {
            output.chunks.push(RawChunk {
                symbol_name: node_text(name, source),
                symbol_kind: kind.to_string(),
                start_line: start_line(node),
                end_line: end_line(node),
                start_byte: node.start_byte(),
                end_byte: node.end_byte(),
                complexity: 1,
                ..Default::default()
            });
        }
    }
}

fn collect_go_imports(node: Node<'_>, source: &str, dependencies: &mut Vec<String>) {
    let mut stack = vec![node];
    while let Some(current) = stack.pop() {
        if current.kind() == "import_spec" {
            if let Some(path) = current.child_by_field_name("path") {
                push_dep(dependencies, unquote(&node_text(path, source)));
            }
            continue;
        }
        let mut cursor = current.walk();
        for child in current.named_children(&mut cursor) {
            stack.push(child);
        }
    }
}

fn collect_calls(node: Node<'_>, lang: Lang, source: &str, output: &mut FileSyntax) {
    let mut stack = vec![node];
    while let Some(current) = stack.pop() {
        let target = match (lang, current.kind()) {
            (Lang::Java, "method_invocation") => current
                .child_by_field_name("name")
                .map(|n| node_text(n, source)),
            (Lang::Java, "object_creation_expression") => current
                .child_by_field_name("type")
                .map(|n| node_text(n, source)),
            (_, "call_expression") => current
                .child_by_field_name("function")
                .map(|n| node_text(n, source)),
            _ => None,
        };
        if let Some(raw) = target {
            let name = raw
                .rsplit("::")
                .next()
                .unwrap_or(&raw)
                .rsplit('.')
                .next()
                .unwrap_or(&raw)
                .split('<')
                .next()
                .unwrap_or(&raw)
                .trim()
                .to_string();
            if !name.is_empty()
                && name
                    .chars()
                    .all(|ch| ch.is_ascii_alphanumeric() || ch == '_')
            {
                let kind = if current.kind() == "object_creation_expression" {
                    usage_kind::INSTANTIATION
                } else {
                    usage_kind::CALL
                };
                output.usages.push(RawUsage {
                    name,
                    kind: kind.to_string(),
                    context: None,
                    line: start_line(current),
                });
            }
        }
        let mut cursor = current.walk();
        for child in current.named_children(&mut cursor) {
            stack.push(child);
        }
    }
}

fn push_dep(dependencies: &mut Vec<String>, dep: String) {
    if !dep.is_empty() && !dependencies.contains(&dep) {
        dependencies.push(dep);
    }
}

fn leading_comment(node: Node<'_>, source: &str) -> String {
    let Some(prev) = node.prev_named_sibling() else {
        return String::new();
    };
    if !prev.kind().contains("comment") {
        return String::new();
    }
    node_text(prev, source)
        .lines()
        .map(|line| {
            line.trim()
                .trim_start_matches("///")
                .trim_start_matches("//")
                .trim_start_matches("/*")
                .trim_start_matches('*')
                .trim_end_matches("*/")
                .trim()
        })
        .collect::<Vec<_>>()
        .join(" ")
        .trim()
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn go_functions_methods_and_types() {
        let mut extractor = GenericExtractor::go().unwrap();
        let syntax = extractor
            .extract(
                r#"package main

import "fmt"

type Server struct {
    addr string
}

func (s *Server) Start() error {
    if s.addr == "" {
        return fmt.Errorf("no addr")
    }
    return nil
}

func main() {
    NewServer().Start()
}
"#,
            )
            .unwrap();
        let names: Vec<(&str, &str)> = syntax
            .chunks
            .iter()
            .map(|c| (c.symbol_kind.as_str(), c.symbol_name.as_str()))
            .collect();
        assert!(names.contains(&("class", "Server")));
        assert!(names.contains(&("method", "Start")));
        assert!(names.contains(&("function", "main")));
        assert_eq!(syntax.dependencies, vec!["fmt"]);

        let start = syntax.chunks.iter().find(|c| c.symbol_name == "Start").unwrap();
        assert_eq!(start.parent_symbol, "Server");
        assert_eq!(start.complexity, 2);
        assert!(syntax.usages.iter().any(|u| u.name == "Start"));
    }

    #[test]
    fn rust_impl_methods_have_parent() {
        let mut extractor = GenericExtractor::rust().unwrap();
        let syntax = extractor
            .extract(
                "use crate::db::Db;\n\npub struct Indexer;\n\nimpl Indexer {\n    pub fn run(&self) {\n        self.scan();\n    }\n}\n",
            )
            .unwrap();
        assert!(syntax
            .chunks
            .iter()
            .any(|c| c.symbol_name == "Indexer" && c.symbol_kind == symbol_kind::CLASS));
        let run = syntax.chunks.iter().find(|c| c.symbol_name == "run").unwrap();
        assert_eq!(run.symbol_kind, symbol_kind::METHOD);
        assert_eq!(run.parent_symbol, "Indexer");
        assert_eq!(syntax.dependencies, vec!["crate::db::Db"]);
        assert!(syntax.usages.iter().any(|u| u.name == "scan"));
    }

    #[test]
    fn java_classes_and_imports() {
        let mut extractor = GenericExtractor::java().unwrap();
        let syntax = extractor
            .extract(
                "import java.util.List;\n\npublic class Repo {\n    public List<String> all() {\n        return store.fetch();\n    }\n}\n",
            )
            .unwrap();
        assert!(syntax
            .chunks
            .iter()
            .any(|c| c.symbol_name == "Repo" && c.symbol_kind == symbol_kind::CLASS));
        let all = syntax.chunks.iter().find(|c| c.symbol_name == "all").unwrap();
        assert_eq!(all.parent_symbol, "Repo");
        assert_eq!(syntax.dependencies, vec!["java.util.List"]);
        assert!(syntax.usages.iter().any(|u| u.name == "fetch"));
    }

    #[test]
    fn cpp_functions_and_includes() {
        let mut extractor = GenericExtractor::cpp().unwrap();
        let syntax = extractor
            .extract(
                "#include <vector>\n\nint add(int a, int b) {\n    return a + b;\n}\n",
            )
            .unwrap();
        assert!(syntax
            .chunks
            .iter()
            .any(|c| c.symbol_name == "add" && c.symbol_kind == symbol_kind::FUNCTION));
        assert_eq!(syntax.dependencies, vec!["vector"]);
    }
}
