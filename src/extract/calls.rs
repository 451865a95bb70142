//! Call-site recognition per language family

use tree_sitter::Node;

use super::defs::NAME_KINDS;
use super::{node_text, truncate_to_char_boundary};
use crate::lang::{Lang, LangFamily};

const MAX_RECEIVER_LEN: usize = 60;

/// Shell builtins that never resolve to a repository function
const SHELL_BUILTINS: &[&str] = &[
    "source", ".", "echo", "cd", "export", "set", "unset", "local", "return", "exit", "test", "[",
    "[[", "printf", "read", "shift", "eval", "exec", "true", "false", "declare", "readonly",
];

/// Recognise a call node. Returns `(callee name, receiver)`.
pub(crate) fn call_from_node(node: Node, source: &str, lang: Lang) -> Option<(String, Option<String>)> {
    let kind = node.kind();
    match lang.family() {
        LangFamily::JavaScript => match kind {
            "call_expression" => callee_parts(node.child_by_field_name("function")?, source),
            "new_expression" => callee_parts(node.child_by_field_name("constructor")?, source),
            _ => None,
        },
        LangFamily::Rust | LangFamily::Go | LangFamily::CFamily => match kind {
            "call_expression" => callee_parts(node.child_by_field_name("function")?, source),
            "new_expression" => callee_parts(node.child_by_field_name("type")?, source),
            _ => None,
        },
        LangFamily::Python => match kind {
            "call" => callee_parts(node.child_by_field_name("function")?, source),
            _ => None,
        },
        LangFamily::Jvm | LangFamily::DotNet => match kind {
            "method_invocation" => {
                let name = node_text(node.child_by_field_name("name")?, source).to_string();
                let receiver = node
                    .child_by_field_name("object")
                    .map(|o| receiver_text(o, source));
                Some((name, receiver))
            }
            "object_creation_expression" => callee_parts(node.child_by_field_name("type")?, source),
            "invocation_expression" | "call_expression" | "function_call" | "juxt_function_call" => {
                let target = node
                    .child_by_field_name("function")
                    .or_else(|| first_named_child(node))?;
                callee_parts(target, source)
            }
            _ => None,
        },
        LangFamily::Shell => {
            if kind != "command" {
                return None;
            }
            let name = node_text(node.child_by_field_name("name")?, source).trim();
            if name.is_empty() || SHELL_BUILTINS.contains(&name) || name.contains('$') {
                return None;
            }
            Some((name.to_string(), None))
        }
        LangFamily::Hcl | LangFamily::Markup => None,
    }
}

fn first_named_child(node: Node) -> Option<Node> {
    let mut cursor = node.walk();
    let first = node.named_children(&mut cursor).next();
    first
}

/// Split a callee expression into name and receiver
fn callee_parts(node: Node, source: &str) -> Option<(String, Option<String>)> {
    let kind = node.kind();
    if NAME_KINDS.contains(&kind) {
        return Some((node_text(node, source).to_string(), None));
    }
    match kind {
        "member_expression"
        | "field_expression"
        | "attribute"
        | "selector_expression"
        | "member_access_expression"
        | "navigation_expression"
        | "scoped_identifier"
        | "qualified_identifier"
        | "scoped_type_identifier" => {
            let name_node = ["property", "field", "attribute", "name"]
                .iter()
                .find_map(|f| node.child_by_field_name(f))
                .or_else(|| last_named_child(node))?;
            let name = last_identifier(name_node, source)?;
            let receiver = ["object", "value", "operand", "expression", "path", "scope"]
                .iter()
                .find_map(|f| node.child_by_field_name(f))
                .or_else(|| first_named_child(node).filter(|c| c.id() != name_node.id()))
                .map(|r| receiver_text(r, source));
            Some((name, receiver))
        }
        "generic_function" | "template_function" | "generic_name" | "generic_type" => {
            let inner = node
                .child_by_field_name("function")
                .or_else(|| node.child_by_field_name("name"))
                .or_else(|| first_named_child(node))?;
            callee_parts(inner, source)
        }
        _ => None,
    }
}

fn last_named_child(node: Node) -> Option<Node> {
    let mut cursor = node.walk();
    let last = node.named_children(&mut cursor).last();
    last
}

fn last_identifier(node: Node, source: &str) -> Option<String> {
    if NAME_KINDS.contains(&node.kind()) {
        return Some(node_text(node, source).to_string());
    }
    let mut cursor = node.walk();
    let children: Vec<Node> = node.named_children(&mut cursor).collect();
    children
        .into_iter()
        .rev()
        .find_map(|c| last_identifier(c, source))
}

fn receiver_text(node: Node, source: &str) -> String {
    let text = node_text(node, source);
    let first_line = text.lines().next().unwrap_or("").trim();
    truncate_to_char_boundary(first_line, MAX_RECEIVER_LEN).to_string()
}
