//! Tree-sitter symbol extraction.
//!
//! One walker covers all six grammars: a stack-driven traversal carrying the
//! enclosing class name (to tell methods from functions) and a nesting flag
//! (symbols inside function bodies are not emitted). Parsers are
//! failure-tolerant: a tree with syntax errors still yields the symbols the
//! parser could recognize; only a file the parser refuses entirely is an
//! error.

use crate::errors::{Error, Result};
use crate::types::{LanguageKind, SymbolKind, SymbolRecord};

use tree_sitter::{Language, Node, Parser};

fn language_for(lang: LanguageKind) -> Language {
    match lang {
        LanguageKind::Python => tree_sitter_python::LANGUAGE.into(),
        LanguageKind::Typescript => tree_sitter_typescript::LANGUAGE_TYPESCRIPT.into(),
        LanguageKind::Javascript => tree_sitter_javascript::LANGUAGE.into(),
        LanguageKind::Rust => tree_sitter_rust::LANGUAGE.into(),
        LanguageKind::Go => tree_sitter_go::LANGUAGE.into(),
        LanguageKind::Java => tree_sitter_java::LANGUAGE.into(),
    }
}

/// Parse one file and emit its top-level and class-level symbols.
pub fn parse_symbols(lang: LanguageKind, file: &str, source: &str) -> Result<Vec<SymbolRecord>> {
    let mut parser = Parser::new();
    parser
        .set_language(&language_for(lang))
        .map_err(|e| Error::Language(e.to_string()))?;

    let tree = parser
        .parse(source, None)
        .ok_or_else(|| Error::Parse { path: file.to_string() })?;

    let mut out: Vec<SymbolRecord> = Vec::new();
    // (node, enclosing class, inside a function body)
    let mut stack: Vec<(Node, Option<String>, bool)> = vec![(tree.root_node(), None, false)];

    while let Some((node, owner, in_function)) = stack.pop() {
        let mut owner_for_children = owner.clone();
        let mut function_for_children = in_function;

        if let Some((name, kind)) = symbol_at(lang, node, owner.as_deref(), source) {
            if !in_function {
                out.push(SymbolRecord::new(
                    file,
                    &name,
                    kind,
                    lang,
                    node.start_position().row + 1,
                    node.end_position().row + 1,
                ));
            }
            match kind {
                SymbolKind::Class | SymbolKind::Interface => {
                    owner_for_children = Some(name);
                }
                SymbolKind::Function | SymbolKind::Method => {
                    function_for_children = true;
                }
            }
        } else if is_owner_scope(lang, node) {
            if let Some(name) = scope_name(node, source) {
                owner_for_children = Some(name);
            }
        }

        let mut cursor = node.walk();
        for child in node.children(&mut cursor) {
            stack.push((child, owner_for_children.clone(), function_for_children));
        }
    }

    // Overload sets and partial re-definitions collapse onto one uid.
    out.sort_by(|a, b| a.uid.cmp(&b.uid).then(a.start_line.cmp(&b.start_line)));
    out.dedup_by(|a, b| a.uid == b.uid);
    out.sort_by_key(|s| s.start_line);
    Ok(out)
}

/// Classify a node as a symbol, if it is one for this grammar.
fn symbol_at(
    lang: LanguageKind,
    node: Node,
    owner: Option<&str>,
    source: &str,
) -> Option<(String, SymbolKind)> {
    let kind = match (lang, node.kind()) {
        (LanguageKind::Python, "class_definition") => SymbolKind::Class,
        (LanguageKind::Python, "function_definition" | "async_function_definition") => {
            if owner.is_some() {
                SymbolKind::Method
            } else {
                SymbolKind::Function
            }
        }

        (LanguageKind::Typescript, "class_declaration" | "abstract_class_declaration") => {
            SymbolKind::Class
        }
        (LanguageKind::Typescript, "interface_declaration") => SymbolKind::Interface,
        (LanguageKind::Typescript | LanguageKind::Javascript, "function_declaration") => {
            SymbolKind::Function
        }
        (LanguageKind::Javascript, "generator_function_declaration") => SymbolKind::Function,
        (LanguageKind::Javascript, "class_declaration") => SymbolKind::Class,
        (LanguageKind::Typescript | LanguageKind::Javascript, "method_definition") => {
            SymbolKind::Method
        }

        (LanguageKind::Rust, "function_item") => {
            if owner.is_some() {
                SymbolKind::Method
            } else {
                SymbolKind::Function
            }
        }
        (LanguageKind::Rust, "struct_item" | "enum_item") => SymbolKind::Class,
        (LanguageKind::Rust, "trait_item") => SymbolKind::Interface,

        (LanguageKind::Go, "function_declaration") => SymbolKind::Function,
        (LanguageKind::Go, "method_declaration") => SymbolKind::Method,
        (LanguageKind::Go, "type_spec") => {
            let type_node = node.child_by_field_name("type")?;
            match type_node.kind() {
                "struct_type" => SymbolKind::Class,
                "interface_type" => SymbolKind::Interface,
                _ => return None,
            }
        }

        (LanguageKind::Java, "class_declaration") => SymbolKind::Class,
        (LanguageKind::Java, "interface_declaration") => SymbolKind::Interface,
        (LanguageKind::Java, "method_declaration") => SymbolKind::Method,

        _ => return None,
    };

    let name_node = node.child_by_field_name("name")?;
    let name = source.get(name_node.byte_range())?.trim().to_string();
    if name.is_empty() {
        return None;
    }
    Some((name, kind))
}

/// Scopes that make inner functions methods without being symbols themselves.
fn is_owner_scope(lang: LanguageKind, node: Node) -> bool {
    matches!(
        (lang, node.kind()),
        (LanguageKind::Rust, "impl_item") | (LanguageKind::Go, "method_spec")
    )
}

fn scope_name(node: Node, source: &str) -> Option<String> {
    let target = node
        .child_by_field_name("type")
        .or_else(|| node.child_by_field_name("name"))?;
    source.get(target.byte_range()).map(|s| s.trim().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn python_functions_classes_methods() {
        let src = "def foo():\n    pass\n\nclass Bar:\n    def baz(self):\n        def inner():\n            pass\n        return 1\n";
        let symbols = parse_symbols(LanguageKind::Python, "src/a.py", src).unwrap();
        let mut summary: Vec<(String, SymbolKind)> =
            symbols.iter().map(|s| (s.name.clone(), s.kind)).collect();
        summary.sort();
        assert_eq!(summary, vec![
            (String::from("Bar"), SymbolKind::Class),
            (String::from("baz"), SymbolKind::Method),
            (String::from("foo"), SymbolKind::Function),
        ]);
        // inner() is nested inside a body and must not appear
        assert!(!symbols.iter().any(|s| s.name == "inner"));
    }

    #[test]
    fn typescript_interfaces_and_methods() {
        let src = "interface Shape { area(): number }\nclass Circle {\n  area(): number { return 1; }\n}\nfunction make(): Circle { return new Circle(); }\n";
        let symbols = parse_symbols(LanguageKind::Typescript, "src/shape.ts", src).unwrap();
        assert!(symbols.iter().any(|s| s.name == "Shape" && s.kind == SymbolKind::Interface));
        assert!(symbols.iter().any(|s| s.name == "Circle" && s.kind == SymbolKind::Class));
        assert!(symbols.iter().any(|s| s.name == "area" && s.kind == SymbolKind::Method));
        assert!(symbols.iter().any(|s| s.name == "make" && s.kind == SymbolKind::Function));
    }

    #[test]
    fn rust_impl_functions_are_methods() {
        let src = "struct S;\n\nimpl S {\n    fn get(&self) -> u8 { 0 }\n}\n\nfn free() {}\n";
        let symbols = parse_symbols(LanguageKind::Rust, "src/lib.rs", src).unwrap();
        assert!(symbols.iter().any(|s| s.name == "S" && s.kind == SymbolKind::Class));
        assert!(symbols.iter().any(|s| s.name == "get" && s.kind == SymbolKind::Method));
        assert!(symbols.iter().any(|s| s.name == "free" && s.kind == SymbolKind::Function));
    }

    #[test]
    fn go_types_split_struct_and_interface() {
        let src = "package p\n\ntype A struct{}\n\ntype B interface{ M() }\n\nfunc F() {}\n\nfunc (a A) G() {}\n";
        let symbols = parse_symbols(LanguageKind::Go, "pkg/p.go", src).unwrap();
        assert!(symbols.iter().any(|s| s.name == "A" && s.kind == SymbolKind::Class));
        assert!(symbols.iter().any(|s| s.name == "B" && s.kind == SymbolKind::Interface));
        assert!(symbols.iter().any(|s| s.name == "F" && s.kind == SymbolKind::Function));
        assert!(symbols.iter().any(|s| s.name == "G" && s.kind == SymbolKind::Method));
    }

    #[test]
    fn broken_source_still_yields_recognized_symbols() {
        let src = "def ok():\n    pass\n\ndef broken(:\n";
        let symbols = parse_symbols(LanguageKind::Python, "src/broken.py", src).unwrap();
        assert!(symbols.iter().any(|s| s.name == "ok"));
    }

    #[test]
    fn duplicate_names_collapse_to_one_uid() {
        let src = "def foo():\n    pass\n\ndef foo():\n    pass\n";
        let symbols = parse_symbols(LanguageKind::Python, "src/a.py", src).unwrap();
        assert_eq!(symbols.len(), 1);
        assert_eq!(symbols[0].uid, "src/a.py#foo:function");
    }
}
