//! Import, include and module-declaration recognition

use tree_sitter::Node;

use super::node_text;
use crate::lang::{Lang, LangFamily};
use crate::schema::ImportRef;

/// Imports declared by this node, empty when it is not an import
pub(crate) fn imports_from_node(node: Node, source: &str, lang: Lang) -> Vec<ImportRef> {
    let line = node.start_position().row + 1;
    let make = |module: String, names: Vec<String>| ImportRef {
        module,
        names,
        line,
    };

    match (lang.family(), node.kind()) {
        (LangFamily::JavaScript, "import_statement") | (LangFamily::JavaScript, "export_statement") => {
            let Some(src) = node.child_by_field_name("source") else {
                return Vec::new();
            };
            let module = unquote(node_text(src, source));
            let clause = &source[node.start_byte()..src.start_byte()];
            vec![make(module, js_import_names(clause))]
        }
        (LangFamily::JavaScript, "call_expression") => {
            let Some(function) = node.child_by_field_name("function") else {
                return Vec::new();
            };
            if !matches!(node_text(function, source), "require" | "import") {
                return Vec::new();
            }
            let module = node
                .child_by_field_name("arguments")
                .and_then(|args| {
                    let mut cursor = args.walk();
                    let first = args.named_children(&mut cursor).next();
                    first
                })
                .filter(|a| a.kind() == "string")
                .map(|a| unquote(node_text(a, source)));
            module.map(|m| vec![make(m, Vec::new())]).unwrap_or_default()
        }
        (LangFamily::Rust, "use_declaration") => {
            let Some(arg) = node.child_by_field_name("argument") else {
                return Vec::new();
            };
            let (module, names) = parse_rust_use(node_text(arg, source));
            vec![make(module, names)]
        }
        (LangFamily::Rust, "mod_item") => {
            // `mod foo;` declares a file module; inline modules have a body
            if node.child_by_field_name("body").is_some() {
                return Vec::new();
            }
            match node.child_by_field_name("name") {
                Some(name) => vec![make(format!("self::{}", node_text(name, source)), Vec::new())],
                None => Vec::new(),
            }
        }
        (LangFamily::Python, "import_statement") => parse_python_import(node_text(node, source))
            .into_iter()
            .map(|m| make(m, Vec::new()))
            .collect(),
        (LangFamily::Python, "import_from_statement") => {
            match parse_python_from(node_text(node, source)) {
                Some((module, names)) => vec![make(module, names)],
                None => Vec::new(),
            }
        }
        (LangFamily::Go, "import_spec") => match node.child_by_field_name("path") {
            Some(path) => vec![make(unquote(node_text(path, source)), Vec::new())],
            None => Vec::new(),
        },
        (LangFamily::Jvm, "import_declaration")
        | (LangFamily::Jvm, "import")
        | (LangFamily::Jvm, "import_header")
        | (LangFamily::Jvm, "groovy_import") => match parse_dotted_import(node_text(node, source), "import") {
            Some((module, names)) => vec![make(module, names)],
            None => Vec::new(),
        },
        (LangFamily::DotNet, "using_directive") => {
            let text = node_text(node, source);
            let text = text.rsplit('=').next().unwrap_or(text);
            match parse_dotted_import(text, "using") {
                Some((module, _)) => vec![make(module, Vec::new())],
                None => Vec::new(),
            }
        }
        (LangFamily::CFamily, "preproc_include") => match node.child_by_field_name("path") {
            Some(path) => {
                let raw = node_text(path, source).trim();
                let module = raw
                    .trim_start_matches(['"', '<'])
                    .trim_end_matches(['"', '>'])
                    .to_string();
                vec![make(module, Vec::new())]
            }
            None => Vec::new(),
        },
        (LangFamily::Shell, "command") => {
            let Some(name) = node.child_by_field_name("name") else {
                return Vec::new();
            };
            if !matches!(node_text(name, source).trim(), "source" | ".") {
                return Vec::new();
            }
            match node.child_by_field_name("argument") {
                Some(arg) => vec![make(unquote(node_text(arg, source)), Vec::new())],
                None => Vec::new(),
            }
        }
        (LangFamily::Hcl, "block") => hcl_module_source(node, source)
            .map(|m| vec![make(m, Vec::new())])
            .unwrap_or_default(),
        _ => Vec::new(),
    }
}

fn unquote(text: &str) -> String {
    text.trim()
        .trim_matches(|c| c == '"' || c == '\'' || c == '`')
        .to_string()
}

fn is_ident_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_' || c == '$'
}

/// Names bound by a JS/TS import or re-export clause, without aliases
fn js_import_names(clause: &str) -> Vec<String> {
    let mut names = Vec::new();
    let mut skip_next = false;
    for token in clause.split(|c: char| !is_ident_char(c)).filter(|t| !t.is_empty()) {
        if skip_next {
            skip_next = false;
            continue;
        }
        match token {
            "as" => skip_next = true,
            "import" | "export" | "from" | "type" | "typeof" | "default" => {}
            _ => names.push(token.to_string()),
        }
    }
    names
}

/// `crate::a::{B, c::D}` -> (`crate::a`, [B, D]); `crate::a::B as C` -> (`crate::a::B`, [B])
fn parse_rust_use(text: &str) -> (String, Vec<String>) {
    let text = text.trim();
    if let Some(pos) = text.find("::{") {
        let module = text[..pos].to_string();
        let inner = text[pos + 3..].trim_end_matches('}');
        let names = inner
            .split(|c| c == ',' || c == '{' || c == '}')
            .map(|part| part.split(" as ").next().unwrap_or("").trim())
            .filter_map(|part| part.rsplit("::").next())
            .filter(|n| !n.is_empty() && *n != "self" && *n != "*")
            .map(str::to_string)
            .collect();
        return (module, names);
    }

    let path = text.split(" as ").next().unwrap_or(text).trim();
    if let Some(module) = path.strip_suffix("::*") {
        return (module.to_string(), Vec::new());
    }
    let last = path.rsplit("::").next().unwrap_or(path).to_string();
    (path.to_string(), vec![last])
}

/// `import a.b as c, d` -> [a.b, d]
fn parse_python_import(text: &str) -> Vec<String> {
    let rest = text.trim().strip_prefix("import").unwrap_or("");
    rest.split(',')
        .map(|part| part.split(" as ").next().unwrap_or("").trim().to_string())
        .filter(|m| !m.is_empty())
        .collect()
}

/// `from .models import (A, B as C)` -> (`.models`, [A, B])
fn parse_python_from(text: &str) -> Option<(String, Vec<String>)> {
    let rest = text.trim().strip_prefix("from")?;
    let (module, names) = rest.split_once(" import ")?;
    let names = names
        .replace(['(', ')', '\n', '\\'], " ")
        .split(',')
        .map(|part| part.split(" as ").next().unwrap_or("").trim().to_string())
        .filter(|n| !n.is_empty() && n != "*")
        .collect();
    Some((module.trim().to_string(), names))
}

/// `import static com.a.B.c;` -> (`com.a.B.c`, [c]); `import com.a.*` -> (`com.a`, [])
fn parse_dotted_import(text: &str, keyword: &str) -> Option<(String, Vec<String>)> {
    let text = text.trim().trim_end_matches(';').trim();
    let text = text.strip_prefix(keyword).unwrap_or(text).trim();
    let text = text.strip_prefix("static ").unwrap_or(text).trim();
    let text = text.strip_prefix("global ").unwrap_or(text).trim();
    let path = text.split(" as ").next().unwrap_or(text).trim();
    if path.is_empty() {
        return None;
    }
    if let Some(module) = path.strip_suffix(".*") {
        return Some((module.to_string(), Vec::new()));
    }
    let last = path.rsplit('.').next().unwrap_or(path).to_string();
    Some((path.to_string(), vec![last]))
}

/// `module "x" { source = "./modules/x" }` -> `./modules/x`
fn hcl_module_source(node: Node, source: &str) -> Option<String> {
    let mut cursor = node.walk();
    let children: Vec<Node> = node.named_children(&mut cursor).collect();
    let block_type = children.first()?;
    if node_text(*block_type, source) != "module" {
        return None;
    }
    let body = children.iter().find(|c| c.kind() == "body")?;
    let mut body_cursor = body.walk();
    let attributes: Vec<Node> = body.named_children(&mut body_cursor).collect();
    attributes.into_iter().find_map(|attr| {
        if attr.kind() != "attribute" {
            return None;
        }
        let text = node_text(attr, source);
        let (key, value) = text.split_once('=')?;
        if key.trim() == "source" {
            Some(unquote(value))
        } else {
            None
        }
    })
}
