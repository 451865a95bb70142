//! Indexing: language coverage, persistence and incremental updates

use std::path::PathBuf;

use narsil_mcp::engine::{EngineOptions, RepoStatus};

use crate::common::TestRepo;
use narsil_mcp::Engine;

#[test]
fn test_every_front_end_is_indexed() {
    let repo = TestRepo::new();
    repo.with_multilang();
    let engine = repo.engine();

    let status = &engine.index_status(None).unwrap()[0];
    assert_eq!(status.status, RepoStatus::Ready);
    assert_eq!(status.files, 14);
    assert_eq!(status.failed_files, 0);
    for lang in [
        "typescript", "tsx", "javascript", "go", "java", "c", "cpp", "csharp", "kotlin", "bash", "hcl",
        "markdown", "python", "rust",
    ] {
        assert_eq!(status.languages.get(lang), Some(&1), "language {}", lang);
    }

    for name in [
        "renderPage",
        "Widget",
        "oldHelper",
        "handleRequest",
        "parseAll",
        "buffer_len",
        "Charge",
        "deploy_app",
        "scan_tree",
        "tokenize_input",
    ] {
        let found = engine.find_symbols(None, None, Some(name), None, None).unwrap();
        assert!(found.iter().any(|s| s.name == name), "symbol {} not indexed", name);
    }
}

#[test]
fn test_ignored_and_oversized_files_are_skipped() {
    let repo = TestRepo::new();
    repo.add_file(".gitignore", "generated/\n")
        .add_file("src/app.py", "def run():\n    pass\n")
        .add_file("generated/out.py", "def generated():\n    pass\n")
        .add_file("node_modules/pkg/index.js", "function vendored() {}\n")
        .add_file("notes.txt", "not source\n");

    let engine = repo.engine();
    let status = &engine.index_status(None).unwrap()[0];
    assert_eq!(status.files, 1);
    assert!(engine.find_symbols(None, None, Some("generated"), None, None).unwrap().is_empty());
    assert!(engine.find_symbols(None, None, Some("vendored"), None, None).unwrap().is_empty());
}

#[test]
fn test_persisted_snapshot_reconciles_changes() {
    let repo = TestRepo::new();
    repo.with_python_service();
    let options = EngineOptions {
        persist: true,
        ..repo.options()
    };

    let first = repo.engine_with(options.clone());
    assert_eq!(first.index_status(None).unwrap()[0].files, 3);
    drop(first);

    repo.add_file("app/db.py", "def connect(path, timeout=5):\n    return None\n")
        .remove_file("app/handlers.py")
        .add_file("app/cli.py", "def main():\n    pass\n");

    let engine = Engine::new(options).unwrap();
    let (_, stats) = engine.index_all_blocking().remove(0);
    let stats = stats.unwrap();
    assert_eq!(stats.files, 3);
    assert_eq!(stats.parsed, 2);
    assert_eq!(stats.reused, 1);
    assert_eq!(stats.removed, 1);

    let defs = engine.symbol_definition(None, "connect").unwrap();
    assert!(defs[0].symbol.signature.contains("timeout"));
    assert!(engine.symbol_definition(None, "get_user").is_err());
}

#[test]
fn test_corrupt_cache_is_rebuilt() {
    let repo = TestRepo::new();
    repo.with_rust_crate();
    let options = EngineOptions {
        persist: true,
        ..repo.options()
    };
    drop(repo.engine_with(options.clone()));

    let snapshots: Vec<PathBuf> = std::fs::read_dir(repo.cache_dir())
        .unwrap()
        .flatten()
        .map(|e| e.path().join("snapshot.bin"))
        .filter(|p| p.exists())
        .collect();
    assert_eq!(snapshots.len(), 1);
    std::fs::write(&snapshots[0], b"not a snapshot").unwrap();

    let engine = Engine::new(options).unwrap();
    let (_, stats) = engine.index_all_blocking().remove(0);
    assert_eq!(stats.unwrap().parsed, 2);
    assert!(!engine.find_symbols(None, None, Some("load"), None, None).unwrap().is_empty());
}

#[test]
fn test_update_files_applies_edits() {
    let repo = TestRepo::new();
    repo.with_rust_crate();
    let engine = repo.engine();
    let name = engine.repo_names()[0].clone();

    repo.add_file("src/extra.rs", "pub fn brand_new_symbol() {}\n");
    let root = repo.path().canonicalize().unwrap();
    engine.update_files(&name, &[root.join("src/extra.rs")]).unwrap();
    let found = engine
        .find_symbols(None, None, Some("brand_new_symbol"), None, None)
        .unwrap();
    assert_eq!(found.len(), 1);
    assert_eq!(found[0].file, "src/extra.rs");
}

#[test]
fn test_two_repositories_need_a_repo_argument() {
    let a = TestRepo::new();
    a.with_python_service();
    let b = TestRepo::new();
    b.with_rust_crate();

    let engine = a.engine_with(EngineOptions {
        repos: vec![a.path().to_path_buf(), b.path().to_path_buf()],
        ..a.options()
    });
    assert_eq!(engine.list_repos().len(), 2);
    assert!(engine.find_symbols(None, None, Some("load"), None, None).is_err());

    let b_path = b.path_str();
    let found = engine
        .find_symbols(Some(&b_path), None, Some("load"), None, None)
        .unwrap();
    assert!(found.iter().any(|s| s.name == "load"));
}
