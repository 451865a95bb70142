//! Definition recognition per language family

use tree_sitter::Node;

use super::{node_text, Definition};
use crate::lang::{Lang, LangFamily};
use crate::schema::SymbolKind;

/// Node kinds that carry a plain name
pub(crate) const NAME_KINDS: &[&str] = &[
    "identifier",
    "type_identifier",
    "field_identifier",
    "property_identifier",
    "simple_identifier",
    "namespace_identifier",
    "constant",
    "word",
    "name",
];

/// Recognise a definition node, returning its name and kind
pub(crate) fn definition<'t>(node: Node<'t>, source: &str, lang: Lang) -> Option<Definition<'t>> {
    match lang.family() {
        LangFamily::JavaScript => javascript(node, source),
        LangFamily::Rust => rust(node, source),
        LangFamily::Python => python(node, source),
        LangFamily::Go => go(node, source),
        LangFamily::Jvm => jvm(node, source, lang),
        LangFamily::DotNet => csharp(node, source),
        LangFamily::CFamily => c_family(node, source),
        LangFamily::Shell => simple(node, source, &[("function_definition", SymbolKind::Function)]),
        LangFamily::Hcl => hcl(node, source),
        LangFamily::Markup => markdown(node, source),
    }
}

/// Whether a definition is visible outside its file/module
pub(crate) fn is_exported(node: Node, name: &str, source: &str, lang: Lang) -> bool {
    match lang.family() {
        LangFamily::JavaScript => {
            let mut current = node.parent();
            for _ in 0..3 {
                match current {
                    Some(p) if p.kind() == "export_statement" => return true,
                    Some(p) => current = p.parent(),
                    None => break,
                }
            }
            false
        }
        LangFamily::Rust => {
            let mut cursor = node.walk();
            let has_pub = node
                .children(&mut cursor)
                .any(|c| c.kind() == "visibility_modifier");
            has_pub || in_trait_context(node)
        }
        LangFamily::Python => !name.starts_with('_') || (name.starts_with("__") && name.ends_with("__")),
        LangFamily::Go => name.chars().next().map(|c| c.is_uppercase()).unwrap_or(false),
        LangFamily::Jvm | LangFamily::DotNet => {
            let prefix = modifier_prefix(node, name, source);
            match lang {
                Lang::Kotlin | Lang::Groovy => {
                    !prefix.contains("private") && !prefix.contains("internal")
                }
                _ => prefix.contains("public") || in_interface(node),
            }
        }
        LangFamily::CFamily => !node_text(node, source).trim_start().starts_with("static"),
        LangFamily::Shell | LangFamily::Hcl | LangFamily::Markup => true,
    }
}

/// Text on the definition's first line before its name (modifiers and keywords)
fn modifier_prefix<'s>(node: Node, name: &str, source: &'s str) -> &'s str {
    let text = node_text(node, source);
    let first_line = text.lines().next().unwrap_or("");
    match first_line.find(name) {
        Some(pos) => &first_line[..pos],
        None => first_line,
    }
}

fn in_interface(node: Node) -> bool {
    let mut current = node.parent();
    while let Some(p) = current {
        match p.kind() {
            "interface_declaration" | "interface_body" => return true,
            "class_declaration" | "class_body" | "enum_declaration" => return false,
            _ => current = p.parent(),
        }
    }
    false
}

/// Rust trait methods and methods of `impl Trait for Type` blocks
fn in_trait_context(node: Node) -> bool {
    let mut current = node.parent();
    while let Some(p) = current {
        match p.kind() {
            "trait_item" => return true,
            "impl_item" => return p.child_by_field_name("trait").is_some(),
            "function_item" | "mod_item" => return false,
            _ => current = p.parent(),
        }
    }
    false
}

/// Name from the `name` field, falling back to the first identifier child
pub(crate) fn name_of(node: Node, source: &str) -> Option<String> {
    if let Some(n) = node.child_by_field_name("name") {
        let text = node_text(n, source).trim();
        if !text.is_empty() {
            return Some(text.to_string());
        }
    }
    let mut cursor = node.walk();
    let found = node
        .named_children(&mut cursor)
        .find(|c| NAME_KINDS.contains(&c.kind()))
        .map(|c| node_text(c, source).trim().to_string());
    found.filter(|n| !n.is_empty())
}

fn def<'t>(node: Node<'t>, name: String, kind: SymbolKind) -> Option<Definition<'t>> {
    Some(Definition {
        name,
        kind,
        container: None,
        node,
    })
}

fn simple<'t>(node: Node<'t>, source: &str, table: &[(&str, SymbolKind)]) -> Option<Definition<'t>> {
    let kind = table
        .iter()
        .find(|(k, _)| *k == node.kind())
        .map(|(_, kind)| *kind)?;
    def(node, name_of(node, source)?, kind)
}

fn javascript<'t>(node: Node<'t>, source: &str) -> Option<Definition<'t>> {
    match node.kind() {
        "variable_declarator" => {
            let value = node.child_by_field_name("value")?;
            if !matches!(
                value.kind(),
                "arrow_function" | "function_expression" | "function" | "generator_function"
            ) {
                return None;
            }
            let name = node.child_by_field_name("name")?;
            if name.kind() != "identifier" {
                return None;
            }
            def(node, node_text(name, source).to_string(), SymbolKind::Function)
        }
        _ => simple(
            node,
            source,
            &[
                ("function_declaration", SymbolKind::Function),
                ("generator_function_declaration", SymbolKind::Function),
                ("class_declaration", SymbolKind::Class),
                ("abstract_class_declaration", SymbolKind::Class),
                ("method_definition", SymbolKind::Method),
                ("interface_declaration", SymbolKind::Interface),
                ("type_alias_declaration", SymbolKind::TypeAlias),
                ("enum_declaration", SymbolKind::Enum),
                ("internal_module", SymbolKind::Module),
            ],
        ),
    }
}

fn rust<'t>(node: Node<'t>, source: &str) -> Option<Definition<'t>> {
    match node.kind() {
        "impl_item" => {
            let ty = node.child_by_field_name("type")?;
            let name = base_type_name(node_text(ty, source));
            if name.is_empty() {
                return None;
            }
            def(node, name, SymbolKind::Impl)
        }
        _ => simple(
            node,
            source,
            &[
                ("function_item", SymbolKind::Function),
                ("function_signature_item", SymbolKind::Function),
                ("struct_item", SymbolKind::Struct),
                ("union_item", SymbolKind::Struct),
                ("enum_item", SymbolKind::Enum),
                ("trait_item", SymbolKind::Trait),
                ("mod_item", SymbolKind::Module),
                ("const_item", SymbolKind::Constant),
                ("static_item", SymbolKind::Constant),
                ("type_item", SymbolKind::TypeAlias),
                ("macro_definition", SymbolKind::Macro),
            ],
        ),
    }
}

/// `Vec<T>` -> `Vec`, `&'a mut Foo` -> `Foo`, `crate::a::Foo` -> `Foo`
fn base_type_name(text: &str) -> String {
    let ty = text
        .split_whitespace()
        .map(|t| t.trim_start_matches('&'))
        .find(|t| !t.is_empty() && !t.starts_with('\'') && *t != "mut" && *t != "dyn")
        .unwrap_or("");
    let ty = ty.split('<').next().unwrap_or("");
    ty.rsplit("::").next().unwrap_or(ty).to_string()
}

fn python<'t>(node: Node<'t>, source: &str) -> Option<Definition<'t>> {
    match node.kind() {
        "function_definition" => def(node, name_of(node, source)?, SymbolKind::Function),
        "class_definition" => def(node, name_of(node, source)?, SymbolKind::Class),
        "assignment" => {
            // module-level UPPER_CASE assignments are constants
            let statement = node.parent()?;
            if statement.kind() != "expression_statement" || statement.parent()?.kind() != "module" {
                return None;
            }
            let left = node.child_by_field_name("left")?;
            if left.kind() != "identifier" {
                return None;
            }
            let name = node_text(left, source);
            let is_constant = name.chars().any(|c| c.is_ascii_alphabetic())
                && name.chars().all(|c| c.is_ascii_uppercase() || c.is_ascii_digit() || c == '_');
            if !is_constant {
                return None;
            }
            def(node, name.to_string(), SymbolKind::Constant)
        }
        _ => None,
    }
}

fn go<'t>(node: Node<'t>, source: &str) -> Option<Definition<'t>> {
    match node.kind() {
        "function_declaration" => def(node, name_of(node, source)?, SymbolKind::Function),
        "method_declaration" => {
            let name = name_of(node, source)?;
            let container = node
                .child_by_field_name("receiver")
                .map(|r| go_receiver_type(node_text(r, source)))
                .filter(|r| !r.is_empty());
            Some(Definition {
                name,
                kind: SymbolKind::Method,
                container,
                node,
            })
        }
        "type_spec" | "type_alias" => {
            let name = name_of(node, source)?;
            let kind = match node.child_by_field_name("type").map(|t| t.kind()) {
                Some("struct_type") => SymbolKind::Struct,
                Some("interface_type") => SymbolKind::Interface,
                _ => SymbolKind::TypeAlias,
            };
            def(node, name, kind)
        }
        "const_spec" => {
            // only package-level constants
            let in_function = ancestor_kinds(node).any(|k| k == "function_declaration" || k == "method_declaration");
            if in_function {
                return None;
            }
            def(node, name_of(node, source)?, SymbolKind::Constant)
        }
        _ => None,
    }
}

/// `(s *Store)` -> `Store`, `(r Repo[T])` -> `Repo`
fn go_receiver_type(text: &str) -> String {
    let inner = text.trim().trim_start_matches('(').trim_end_matches(')');
    let ty = inner.split_whitespace().last().unwrap_or("");
    ty.trim_start_matches('*')
        .split('[')
        .next()
        .unwrap_or("")
        .to_string()
}

fn ancestor_kinds<'t>(node: Node<'t>) -> impl Iterator<Item = &'static str> + 't {
    std::iter::successors(node.parent(), |n| n.parent()).map(|n| n.kind())
}

fn jvm<'t>(node: Node<'t>, source: &str, lang: Lang) -> Option<Definition<'t>> {
    let kind = match node.kind() {
        "class_declaration" | "class_definition" => {
            if lang == Lang::Kotlin {
                kotlin_class_kind(node, source)
            } else {
                SymbolKind::Class
            }
        }
        "record_declaration" | "object_declaration" | "companion_object" => SymbolKind::Class,
        "interface_declaration" | "annotation_type_declaration" => SymbolKind::Interface,
        "enum_declaration" => SymbolKind::Enum,
        "method_declaration" | "constructor_declaration" => SymbolKind::Method,
        "function_declaration" | "function_definition" => SymbolKind::Function,
        "type_alias" => SymbolKind::TypeAlias,
        _ => return None,
    };
    def(node, name_of(node, source)?, kind)
}

fn kotlin_class_kind(node: Node, source: &str) -> SymbolKind {
    let text = node_text(node, source);
    let header = text.split('{').next().unwrap_or("");
    let words: Vec<&str> = header.split_whitespace().collect();
    if words.contains(&"interface") {
        SymbolKind::Interface
    } else if words.windows(2).any(|w| w == ["enum", "class"]) {
        SymbolKind::Enum
    } else {
        SymbolKind::Class
    }
}

fn csharp<'t>(node: Node<'t>, source: &str) -> Option<Definition<'t>> {
    simple(
        node,
        source,
        &[
            ("class_declaration", SymbolKind::Class),
            ("record_declaration", SymbolKind::Class),
            ("struct_declaration", SymbolKind::Struct),
            ("record_struct_declaration", SymbolKind::Struct),
            ("interface_declaration", SymbolKind::Interface),
            ("enum_declaration", SymbolKind::Enum),
            ("method_declaration", SymbolKind::Method),
            ("constructor_declaration", SymbolKind::Method),
            ("local_function_statement", SymbolKind::Function),
            ("namespace_declaration", SymbolKind::Module),
            ("file_scoped_namespace_declaration", SymbolKind::Module),
            ("delegate_declaration", SymbolKind::TypeAlias),
        ],
    )
}

fn c_family<'t>(node: Node<'t>, source: &str) -> Option<Definition<'t>> {
    match node.kind() {
        "function_definition" => {
            let declarator = node.child_by_field_name("declarator")?;
            let (name, container) = declarator_name(declarator, source)?;
            let kind = if container.is_some() {
                SymbolKind::Method
            } else {
                SymbolKind::Function
            };
            Some(Definition {
                name,
                kind,
                container,
                node,
            })
        }
        "struct_specifier" | "union_specifier" | "class_specifier" | "enum_specifier" => {
            // forward declarations and type references have no body
            node.child_by_field_name("body")?;
            let kind = match node.kind() {
                "class_specifier" => SymbolKind::Class,
                "enum_specifier" => SymbolKind::Enum,
                _ => SymbolKind::Struct,
            };
            def(node, name_of(node, source)?, kind)
        }
        "namespace_definition" => def(node, name_of(node, source)?, SymbolKind::Module),
        "type_definition" => {
            let declarator = node.child_by_field_name("declarator")?;
            let (name, _) = declarator_name(declarator, source)?;
            def(node, name, SymbolKind::TypeAlias)
        }
        "preproc_function_def" | "preproc_def" => def(node, name_of(node, source)?, SymbolKind::Macro),
        _ => None,
    }
}

/// Walk a C/C++ declarator down to its identifier.
/// Returns the name and, for `Class::method`, the qualifying scope.
fn declarator_name(node: Node, source: &str) -> Option<(String, Option<String>)> {
    match node.kind() {
        "identifier" | "field_identifier" | "type_identifier" | "destructor_name" | "operator_name" => {
            Some((node_text(node, source).to_string(), None))
        }
        "qualified_identifier" => {
            let scope = node
                .child_by_field_name("scope")
                .map(|s| node_text(s, source).to_string());
            let name = node.child_by_field_name("name")?;
            let (name, _) = declarator_name(name, source)?;
            Some((name, scope))
        }
        _ => {
            let inner = node.child_by_field_name("declarator").or_else(|| {
                let mut cursor = node.walk();
                let first = node.named_children(&mut cursor).next();
                first
            })?;
            declarator_name(inner, source)
        }
    }
}

fn hcl<'t>(node: Node<'t>, source: &str) -> Option<Definition<'t>> {
    if node.kind() != "block" {
        return None;
    }
    let mut cursor = node.walk();
    let mut parts = node.named_children(&mut cursor).filter_map(|c| match c.kind() {
        "identifier" => Some(node_text(c, source).to_string()),
        "string_lit" => Some(node_text(c, source).trim_matches('"').to_string()),
        _ => None,
    });
    let block_type = parts.next()?;
    let labels: Vec<String> = parts.collect();
    let (kind, name) = match block_type.as_str() {
        "resource" | "data" if labels.len() >= 2 => {
            (SymbolKind::Resource, format!("{}.{}", labels[0], labels[1]))
        }
        "module" => (SymbolKind::Module, labels.first()?.clone()),
        "variable" => (SymbolKind::Variable, labels.first()?.clone()),
        "output" => (SymbolKind::Constant, labels.first()?.clone()),
        "provider" => (SymbolKind::Module, format!("provider.{}", labels.first()?)),
        _ => return None,
    };
    def(node, name, kind)
}

fn markdown<'t>(node: Node<'t>, source: &str) -> Option<Definition<'t>> {
    let title = match node.kind() {
        "atx_heading" => node_text(node, source)
            .trim()
            .trim_start_matches('#')
            .trim_end_matches('#')
            .trim()
            .to_string(),
        "setext_heading" => node_text(node, source)
            .lines()
            .next()
            .unwrap_or("")
            .trim()
            .to_string(),
        _ => return None,
    };
    if title.is_empty() {
        return None;
    }
    def(node, title, SymbolKind::Section)
}
