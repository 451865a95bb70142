//! Query engine end to end: search, navigation, call graph, dead code, cycles

use narsil_mcp::engine::{ReferenceKind, SearchResults};
use narsil_mcp::mcp_server::dispatch;
use narsil_mcp::NarsilError;
use serde_json::json;

use crate::common::TestRepo;

#[test]
fn test_ranked_and_hybrid_search() {
    let repo = TestRepo::new();
    repo.with_python_service();
    let engine = repo.engine();

    match engine.search_code(None, "find user", Some(5)).unwrap() {
        SearchResults::Ranked { hits, .. } => {
            assert!(!hits.is_empty());
            assert_eq!(hits[0].symbol.name, "find_user");
        }
        other => panic!("expected ranked results, got {:?}", other),
    }

    let hits = engine.hybrid_search(None, "database connect", Some(5)).unwrap();
    assert!(hits.iter().any(|h| h.symbol.name == "connect"));
    assert!(hits.len() <= 5);

    assert!(matches!(
        engine.hybrid_search(None, "   ", None),
        Err(NarsilError::QueryError { .. })
    ));
}

#[test]
fn test_find_symbols_filters() {
    let repo = TestRepo::new();
    repo.with_python_service().with_rust_crate();
    let engine = repo.engine();

    let classes = engine.find_symbols(None, Some("class"), None, None, None).unwrap();
    assert_eq!(classes.len(), 1);
    assert_eq!(classes[0].name, "UserService");

    let in_rust = engine.find_symbols(None, Some("function"), None, Some("src/"), None).unwrap();
    let names: Vec<&str> = in_rust.iter().map(|s| s.name.as_str()).collect();
    assert!(names.contains(&"load"));
    assert!(!names.contains(&"connect"));

    assert!(matches!(
        engine.find_symbols(None, Some("gizmo"), None, None, None),
        Err(NarsilError::QueryError { .. })
    ));
}

#[test]
fn test_definition_by_qualified_name() {
    let repo = TestRepo::new();
    repo.with_python_service();
    let engine = repo.engine();

    let defs = engine.symbol_definition(None, "UserService.find_user").unwrap();
    assert_eq!(defs.len(), 1);
    assert_eq!(defs[0].symbol.file, "app/service.py");
    assert!(defs[0].source.trim_start().starts_with("def find_user(self, user_id):"));
    assert!(defs[0].source.contains("fetchone"));

    let db = engine.symbol_definition(None, "connect").unwrap();
    assert_eq!(db[0].symbol.doc.as_deref(), Some("Open the application database."));
}

#[test]
fn test_references_and_callers() {
    let repo = TestRepo::new();
    repo.with_python_service();
    let engine = repo.engine();

    let refs = engine.find_references(None, "connect").unwrap();
    assert_eq!(refs.definitions.len(), 1);
    assert!(refs
        .references
        .iter()
        .any(|r| r.file == "app/service.py" && r.kind == ReferenceKind::Call));
    assert!(refs
        .references
        .iter()
        .any(|r| r.file == "app/service.py" && r.kind == ReferenceKind::Import));

    let callers = engine.callers(None, "find_user", Some(1)).unwrap();
    assert_eq!(callers.len(), 1);
    assert_eq!(callers[0].entries[0].name, "get_user");
    assert_eq!(callers[0].entries[0].file.as_deref(), Some("app/handlers.py"));

    let callers = engine.callers(None, "connect", Some(2)).unwrap();
    assert!(callers[0]
        .entries
        .iter()
        .any(|e| e.name == "UserService.__init__" && e.depth == 1));
}

#[test]
fn test_rust_callees_and_dead_code() {
    let repo = TestRepo::new();
    repo.with_rust_crate();
    let engine = repo.engine();

    let callees = engine.callees(None, "load", None).unwrap();
    assert!(callees[0].entries.iter().any(|e| e.name == "read_name" && e.resolved));

    let dead: Vec<String> = engine
        .dead_code(None, false, None)
        .unwrap()
        .into_iter()
        .map(|s| s.name)
        .collect();
    assert!(dead.contains(&"never_called".to_string()));
    assert!(!dead.contains(&"read_name".to_string()));
    assert!(!dead.contains(&"main".to_string()));
}

#[test]
fn test_python_dead_code_respects_exports() {
    let repo = TestRepo::new();
    repo.with_python_service();
    let engine = repo.engine();

    let private_only: Vec<String> = engine
        .dead_code(None, false, None)
        .unwrap()
        .into_iter()
        .map(|s| s.name)
        .collect();
    assert_eq!(private_only, vec!["_legacy_dump".to_string()]);

    let with_exported: Vec<String> = engine
        .dead_code(None, true, None)
        .unwrap()
        .into_iter()
        .map(|s| s.name)
        .collect();
    assert!(with_exported.contains(&"get_user".to_string()));
    assert!(!with_exported.contains(&"__init__".to_string()));
}

#[test]
fn test_circular_imports() {
    let repo = TestRepo::new();
    repo.with_ts_cycle();
    let engine = repo.engine();

    let cycles = engine.circular_imports(None).unwrap();
    assert_eq!(cycles.len(), 1);
    for file in ["src/a.ts", "src/b.ts", "src/c.ts"] {
        assert!(cycles[0].iter().any(|f| f == file), "{} missing from {:?}", file, cycles[0]);
    }

    let acyclic = TestRepo::new();
    acyclic.with_python_service();
    assert!(acyclic.engine().circular_imports(None).unwrap().is_empty());
}

#[test]
fn test_project_structure_and_grep() {
    let repo = TestRepo::new();
    repo.with_rust_crate().with_python_service();
    let engine = repo.engine();

    let structure = engine.project_structure(None, Some(1)).unwrap();
    assert_eq!(structure.files, 5);
    assert_eq!(structure.languages.get("rust"), Some(&2));
    assert!(structure.manifests.contains(&"Cargo.toml".to_string()));
    let top: Vec<&str> = structure.entries.iter().map(|e| e.name.as_str()).collect();
    assert!(top.contains(&"app"));
    assert!(top.contains(&"src"));

    let matches = engine.grep(None, r"sqlite3\.connect", false, None).unwrap();
    assert_eq!(matches.len(), 1);
    assert_eq!(matches[0].file, "app/db.py");
    assert_eq!(matches[0].line, 6);
}

#[test]
fn test_tool_dispatch_end_to_end() {
    let repo = TestRepo::new();
    repo.with_python_service();
    let engine = repo.engine();

    let out = dispatch(&engine, "get_symbol_definition", json!({ "symbol": "UserService.find_user" })).unwrap();
    assert!(out.text.contains("```"));
    assert!(out.text.contains("def find_user"));

    let out = dispatch(&engine, "find_symbols", json!({ "kind": "class" })).unwrap();
    assert_eq!(out.data[0]["name"], "UserService");

    let out = dispatch(&engine, "get_index_status", json!({})).unwrap();
    assert_eq!(out.data[0]["status"]["state"], "ready");
    assert_eq!(out.data[0]["files"], 3);
}
