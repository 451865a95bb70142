//! Markdown rendering of tool results

use std::fmt::Write as _;

use crate::deps::DependencyReport;
use crate::engine::{
    CallTree, Definition, IndexStatusReport, ProjectStructure, ReferenceKind, References, ReindexReport,
    RepoStatus, RepoSummary, SearchHit, SearchResults, SymbolSummary,
};
use crate::git::CommitInfo;
use crate::grep::GrepMatch;
use crate::security::{ScanReport, Severity};

const MAX_LINE: usize = 160;

fn truncate(s: &str, max: usize) -> String {
    let s = s.trim();
    if s.len() <= max {
        return s.to_string();
    }
    let cut = (0..=max).rev().find(|&i| s.is_char_boundary(i)).unwrap_or(0);
    format!("{}...", &s[..cut])
}

fn status_text(status: &RepoStatus) -> String {
    match status {
        RepoStatus::Ready => "ready".to_string(),
        RepoStatus::Indexing { phase, done, total } => format!("indexing ({}, {}/{} files)", phase, done, total),
        RepoStatus::Failed { message } => format!("failed: {}", message),
    }
}

fn symbol_line(s: &SymbolSummary) -> String {
    format!(
        "`{}` ({}) {}:{}-{}",
        s.qualified_name, s.kind, s.file, s.start_line, s.end_line
    )
}

pub fn repos(repos: &[RepoSummary]) -> String {
    if repos.is_empty() {
        return "No repositories configured.\n".to_string();
    }
    let mut out = String::from("# Repositories\n\n");
    for r in repos {
        let _ = writeln!(
            out,
            "- **{}** `{}`: {} ({} files, {} symbols)",
            r.name,
            r.root,
            status_text(&r.status),
            r.files,
            r.symbols
        );
    }
    out
}

pub fn index_status(reports: &[IndexStatusReport]) -> String {
    let mut out = String::new();
    for r in reports {
        let _ = writeln!(out, "# {}\n", r.name);
        let _ = writeln!(out, "- Root: `{}`", r.root);
        let _ = writeln!(out, "- Status: {}", status_text(&r.status));
        if !r.status.is_ready() && r.files == 0 {
            out.push('\n');
            continue;
        }
        let _ = writeln!(out, "- Files: {} ({} failed, {} partial)", r.files, r.failed_files, r.partial_files);
        let _ = writeln!(out, "- Symbols: {}", r.symbols);
        let _ = writeln!(out, "- Import edges: {}", r.import_edges);
        if r.call_graph {
            let _ = writeln!(out, "- Call edges: {}", r.call_edges);
        } else {
            out.push_str("- Call graph: disabled\n");
        }
        if let Some(at) = &r.indexed_at {
            let _ = writeln!(out, "- Indexed at: {}", at);
        }
        if let Some(ms) = r.last_run_ms {
            let _ = writeln!(out, "- Last run: {} ms", ms);
        }
        if !r.languages.is_empty() {
            let langs: Vec<String> = r.languages.iter().map(|(l, n)| format!("{} {}", l, n)).collect();
            let _ = writeln!(out, "- Languages: {}", langs.join(", "));
        }
        out.push('\n');
    }
    out
}

pub fn hits(title: &str, query: &str, hits: &[SearchHit]) -> String {
    let mut out = format!("# {} for \"{}\"\n\n", title, query);
    if hits.is_empty() {
        out.push_str("No matches.\n");
        return out;
    }
    for (i, hit) in hits.iter().enumerate() {
        let _ = writeln!(out, "{}. {} score {:.3}", i + 1, symbol_line(&hit.symbol), hit.score);
        if !hit.symbol.signature.is_empty() {
            let _ = writeln!(out, "   `{}`", truncate(&hit.symbol.signature, MAX_LINE));
        }
    }
    out
}

pub fn search(query: &str, results: &SearchResults) -> String {
    match results {
        SearchResults::Ranked { hits: ranked, related_terms } => {
            let mut out = hits("Search results", query, ranked);
            if !related_terms.is_empty() {
                let _ = writeln!(out, "\nRelated terms: {}", related_terms.join(", "));
            }
            out
        }
        SearchResults::Grep { matches, done, total } => {
            let mut out = format!(
                "_Index still building ({}/{} files); showing text matches._\n\n",
                done, total
            );
            out.push_str(&grep(query, matches));
            out
        }
    }
}

pub fn grep(pattern: &str, matches: &[GrepMatch]) -> String {
    let mut out = format!("# Matches for `{}`\n\n", pattern);
    if matches.is_empty() {
        out.push_str("No matches.\n");
        return out;
    }
    for m in matches {
        let _ = writeln!(out, "- {}:{}:{}: `{}`", m.file, m.line, m.column, truncate(&m.content, MAX_LINE));
    }
    out
}

pub fn symbols(symbols: &[SymbolSummary]) -> String {
    if symbols.is_empty() {
        return "No symbols found.\n".to_string();
    }
    let mut out = format!("# {} symbols\n\n", symbols.len());
    for s in symbols {
        let marker = if s.exported { "" } else { " (private)" };
        let _ = writeln!(out, "- {}{}", symbol_line(s), marker);
    }
    out
}

pub fn definitions(defs: &[Definition]) -> String {
    let mut out = String::new();
    for d in defs {
        let _ = writeln!(out, "## {}\n", symbol_line(&d.symbol));
        if let Some(doc) = &d.symbol.doc {
            let _ = writeln!(out, "{}\n", doc);
        }
        let _ = writeln!(out, "```\n{}\n```\n", d.source);
    }
    out
}

pub fn references(symbol: &str, refs: &References) -> String {
    let mut out = format!("# References to `{}`\n\n", symbol);
    out.push_str("Defined at:\n");
    for d in &refs.definitions {
        let _ = writeln!(out, "- {}", symbol_line(d));
    }
    out.push('\n');
    if refs.references.is_empty() {
        out.push_str("No references found.\n");
        return out;
    }
    for r in &refs.references {
        let kind = match r.kind {
            ReferenceKind::Call => "call",
            ReferenceKind::PossibleCall => "possible call",
            ReferenceKind::Import => "import",
        };
        match &r.context {
            Some(ctx) => {
                let _ = writeln!(out, "- {}:{} {} in `{}`", r.file, r.line, kind, ctx);
            }
            None => {
                let _ = writeln!(out, "- {}:{} {}", r.file, r.line, kind);
            }
        }
    }
    out
}

pub fn call_trees(direction: &str, trees: &[CallTree]) -> String {
    if trees.is_empty() {
        return "No callable symbol matched.\n".to_string();
    }
    let mut out = String::new();
    for tree in trees {
        let _ = writeln!(out, "# {} of {}\n", direction, symbol_line(&tree.symbol));
        if tree.entries.is_empty() {
            out.push_str("None.\n\n");
            continue;
        }
        for e in &tree.entries {
            let indent = "  ".repeat(e.depth.saturating_sub(1));
            let location = match &e.file {
                Some(f) => format!("{}:{}", f, e.line),
                None => format!("line {}", e.line),
            };
            let unresolved = if e.resolved { "" } else { " (unresolved)" };
            let _ = writeln!(out, "{}- `{}` {}{}", indent, e.name, location, unresolved);
        }
        out.push('\n');
    }
    out
}

pub fn dead_code(symbols: &[SymbolSummary]) -> String {
    if symbols.is_empty() {
        return "No dead code found.\n".to_string();
    }
    let mut out = format!("# {} possibly unused functions\n\n", symbols.len());
    for s in symbols {
        let _ = writeln!(out, "- {}", symbol_line(s));
    }
    out
}

pub fn cycles(cycles: &[Vec<String>]) -> String {
    if cycles.is_empty() {
        return "No circular imports.\n".to_string();
    }
    let mut out = format!("# {} import cycles\n\n", cycles.len());
    for (i, cycle) in cycles.iter().enumerate() {
        let _ = writeln!(out, "{}. {}", i + 1, cycle.join(" -> "));
    }
    out
}

pub fn security(report: &ScanReport) -> String {
    let mut out = String::from("# Security scan\n\n");
    let _ = writeln!(
        out,
        "Scanned {} files with {} rules: {} findings",
        report.files_scanned,
        report.rules_applied,
        report.findings.len()
    );
    let counts: Vec<String> = Severity::ALL
        .iter()
        .filter(|s| report.count(**s) > 0)
        .map(|s| format!("{} {}", s, report.count(*s)))
        .collect();
    if !counts.is_empty() {
        let _ = writeln!(out, "({})", counts.join(", "));
    }
    for f in &report.findings {
        let _ = writeln!(out, "\n## [{}] {} {} ({})", f.severity, f.rule_id, f.rule_name, f.cwe);
        let _ = writeln!(out, "{}:{} `{}`", f.file, f.line, truncate(&f.snippet, MAX_LINE));
        let _ = writeln!(out, "{}", f.description);
        let _ = writeln!(out, "Fix: {}", f.remediation);
    }
    out
}

pub fn dependencies(report: &DependencyReport) -> String {
    let mut out = String::from("# Dependencies\n\n");
    if report.manifests.is_empty() {
        out.push_str("No Cargo.toml, package.json, requirements.txt or go.mod found.\n");
        return out;
    }
    for m in &report.manifests {
        let dev = m.dependencies.iter().filter(|d| d.dev).count();
        let _ = writeln!(
            out,
            "- `{}` ({}): {} dependencies, {} dev",
            m.path,
            m.ecosystem.name(),
            m.dependencies.len() - dev,
            dev
        );
    }
    out.push('\n');
    if report.matches.is_empty() {
        out.push_str("No known advisories match the declared versions.\n");
    } else {
        let _ = writeln!(out, "## {} advisories\n", report.matches.len());
        for m in &report.matches {
            let _ = writeln!(
                out,
                "- [{}] {} `{}` {} in `{}`: {} (fixed in {})",
                m.severity, m.advisory_id, m.package, m.requirement, m.manifest, m.summary, m.fixed
            );
        }
    }
    if report.unversioned > 0 {
        let _ = writeln!(out, "\n{} dependencies have no checkable version.", report.unversioned);
    }
    out
}

pub fn structure(s: &ProjectStructure) -> String {
    let mut out = format!("# {}\n\n`{}`: {} files, {} symbols\n\n", s.name, s.root, s.files, s.symbols);
    if !s.languages.is_empty() {
        let langs: Vec<String> = s.languages.iter().map(|(l, n)| format!("{} {}", l, n)).collect();
        let _ = writeln!(out, "Languages: {}\n", langs.join(", "));
    }
    if !s.manifests.is_empty() {
        let _ = writeln!(out, "Manifests: {}\n", s.manifests.join(", "));
    }
    out.push_str("```\n");
    for e in &s.entries {
        let indent = "  ".repeat(e.depth);
        if e.is_dir {
            let _ = writeln!(out, "{}{}/ ({} files)", indent, e.name, e.files);
        } else {
            let _ = writeln!(out, "{}{}", indent, e.name);
        }
    }
    out.push_str("```\n");
    out
}

pub fn reindex(reports: &[ReindexReport]) -> String {
    let mut out = String::new();
    for r in reports {
        let _ = writeln!(
            out,
            "Reindexed **{}**: {} files ({} parsed, {} removed, {} failed), {} symbols, {} edges in {} ms",
            r.name, r.files, r.parsed, r.removed, r.failed, r.symbols, r.edges, r.elapsed_ms
        );
    }
    out
}

pub fn commits(commits: &[CommitInfo]) -> String {
    if commits.is_empty() {
        return "No commits.\n".to_string();
    }
    let mut out = String::from("# Recent changes\n\n");
    for c in commits {
        let _ = writeln!(out, "## {} {}\n{} on {}\n", c.short_sha, c.subject, c.author, c.date);
        for f in &c.files {
            match &f.old_path {
                Some(old) => {
                    let _ = writeln!(out, "- {} {} -> {}", f.change_type.marker(), old, f.path);
                }
                None => {
                    let _ = writeln!(out, "- {} {}", f.change_type.marker(), f.path);
                }
            }
        }
        out.push('\n');
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::CallEntry;
    use crate::schema::SymbolKind;

    fn summary(name: &str) -> SymbolSummary {
        SymbolSummary {
            id: "00000000000000ff".into(),
            name: name.into(),
            qualified_name: format!("Db.{}", name),
            kind: SymbolKind::Method,
            file: "app/db.py".into(),
            start_line: 3,
            end_line: 9,
            signature: format!("def {}(self):", name),
            exported: true,
            doc: None,
        }
    }

    #[test]
    fn test_truncate_on_char_boundary() {
        assert_eq!(truncate("  short  ", 10), "short");
        assert_eq!(truncate("ééééé", 3), "é...");
    }

    #[test]
    fn test_call_tree_indentation() {
        let tree = CallTree {
            symbol: summary("connect"),
            entries: vec![
                CallEntry {
                    depth: 1,
                    name: "run".into(),
                    file: Some("app/main.py".into()),
                    line: 5,
                    resolved: true,
                },
                CallEntry {
                    depth: 2,
                    name: "dispatch".into(),
                    file: None,
                    line: 12,
                    resolved: false,
                },
            ],
        };
        let text = call_trees("Callers", &[tree]);
        assert!(text.contains("# Callers of `Db.connect` (method) app/db.py:3-9"));
        assert!(text.contains("\n- `run` app/main.py:5\n"));
        assert!(text.contains("\n  - `dispatch` line 12 (unresolved)\n"));
    }

    #[test]
    fn test_grep_fallback_note() {
        let results = SearchResults::Grep {
            matches: vec![GrepMatch {
                file: "a.rs".into(),
                line: 2,
                column: 4,
                content: "fn connect() {}".into(),
            }],
            done: 3,
            total: 10,
        };
        let text = search("connect", &results);
        assert!(text.starts_with("_Index still building (3/10 files)"));
        assert!(text.contains("- a.rs:2:4: `fn connect() {}`"));
    }
}
