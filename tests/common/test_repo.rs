//! TestRepo builder for integration tests
//!
//! Creates throwaway repositories in a temp dir and runs the narsil-mcp
//! binary or an in-process engine against them.

use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Command, Output};
use std::sync::Arc;

use narsil_mcp::engine::{Engine, EngineOptions};
use tempfile::TempDir;

pub struct TestRepo {
    dir: TempDir,
    cache: TempDir,
}

impl TestRepo {
    pub fn new() -> Self {
        Self {
            dir: TempDir::new().expect("Failed to create temp dir"),
            cache: TempDir::new().expect("Failed to create cache dir"),
        }
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    pub fn path_str(&self) -> String {
        self.dir.path().to_string_lossy().to_string()
    }

    /// Separate from the repository so it is never walked
    pub fn cache_dir(&self) -> &Path {
        self.cache.path()
    }

    pub fn add_file(&self, relative_path: &str, content: &str) -> &Self {
        let full_path = self.dir.path().join(relative_path);
        if let Some(parent) = full_path.parent() {
            fs::create_dir_all(parent).expect("Failed to create parent dirs");
        }
        fs::write(&full_path, content).expect("Failed to write file");
        self
    }

    pub fn remove_file(&self, relative_path: &str) -> &Self {
        fs::remove_file(self.dir.path().join(relative_path)).expect("Failed to remove file");
        self
    }

    pub fn options(&self) -> EngineOptions {
        EngineOptions {
            repos: vec![self.path().to_path_buf()],
            call_graph: true,
            cache_dir: Some(self.cache_dir().to_path_buf()),
            ..Default::default()
        }
    }

    /// Engine with the call graph enabled, fully indexed
    pub fn engine(&self) -> Arc<Engine> {
        self.engine_with(self.options())
    }

    pub fn engine_with(&self, options: EngineOptions) -> Arc<Engine> {
        let engine = Engine::new(options).expect("Failed to create engine");
        for (name, result) in engine.index_all_blocking() {
            result.unwrap_or_else(|e| panic!("indexing {} failed: {}", name, e));
        }
        engine
    }

    /// Run the narsil-mcp binary with `XDG_CACHE_HOME` pointed at the test cache
    pub fn run_cli(&self, args: &[&str]) -> std::io::Result<Output> {
        let binary = PathBuf::from(env!("CARGO_BIN_EXE_narsil-mcp"));
        Command::new(binary)
            .current_dir(self.path())
            .env("XDG_CACHE_HOME", self.cache_dir())
            .env("HOME", self.cache_dir())
            .env_remove("RUST_LOG")
            .args(args)
            .output()
    }

    pub fn run_cli_success(&self, args: &[&str]) -> String {
        let output = self.run_cli(args).expect("Failed to run CLI");
        assert!(
            output.status.success(),
            "CLI command {:?} failed: {}",
            args,
            String::from_utf8_lossy(&output.stderr)
        );
        String::from_utf8_lossy(&output.stdout).to_string()
    }

    pub fn run_cli_failure(&self, args: &[&str]) -> (i32, String) {
        let output = self.run_cli(args).expect("Failed to run CLI");
        assert!(!output.status.success(), "CLI command {:?} should have failed", args);
        (
            output.status.code().unwrap_or(-1),
            String::from_utf8_lossy(&output.stderr).to_string(),
        )
    }

    pub fn init_git(&self) -> &Self {
        for args in [
            vec!["init", "-q"],
            vec!["config", "user.email", "test@test.com"],
            vec!["config", "user.name", "Test User"],
            vec!["config", "commit.gpgsign", "false"],
        ] {
            Command::new("git")
                .current_dir(self.path())
                .args(&args)
                .output()
                .expect("Failed to run git");
        }
        self
    }

    pub fn commit(&self, message: &str) -> &Self {
        Command::new("git")
            .current_dir(self.path())
            .args(["add", "-A"])
            .output()
            .expect("Failed to git add");
        Command::new("git")
            .current_dir(self.path())
            .args(["commit", "-q", "-m", message])
            .output()
            .expect("Failed to git commit");
        self
    }

    // ========================================================================
    // PRE-BUILT REPO STRUCTURES
    // ========================================================================

    /// Python package: handlers -> service -> db, with an unused helper
    pub fn with_python_service(&self) -> &Self {
        self.add_file(
            "app/db.py",
            r#"import sqlite3


def connect(path):
    """Open the application database."""
    return sqlite3.connect(path)


def _legacy_dump(conn):
    return conn.iterdump()
"#,
        )
        .add_file(
            "app/service.py",
            r#"from app.db import connect


class UserService:
    def __init__(self, path):
        self.conn = connect(path)

    def find_user(self, user_id):
        cursor = self.conn.cursor()
        cursor.execute("SELECT * FROM users WHERE id = " + user_id)
        return cursor.fetchone()
"#,
        )
        .add_file(
            "app/handlers.py",
            r#"from app.service import UserService


def get_user(request):
    service = UserService("app.db")
    return service.find_user(request.args["id"])
"#,
        )
    }

    /// TypeScript modules importing each other in a cycle
    pub fn with_ts_cycle(&self) -> &Self {
        self.add_file(
            "src/a.ts",
            "import { b } from './b';\n\nexport function a(): number {\n  return b() + 1;\n}\n",
        )
        .add_file(
            "src/b.ts",
            "import { c } from './c';\n\nexport function b(): number {\n  return c() + 1;\n}\n",
        )
        .add_file(
            "src/c.ts",
            "import { a } from './a';\n\nexport function c(): number {\n  return 0;\n}\n\nexport const again = () => a();\n",
        )
    }

    /// Rust crate with a private dead function
    pub fn with_rust_crate(&self) -> &Self {
        self.add_file(
            "Cargo.toml",
            "[package]\nname = \"demo\"\nversion = \"0.1.0\"\n\n[dependencies]\nserde = \"1.0\"\n",
        )
        .add_file(
            "src/main.rs",
            r#"mod config;

fn main() {
    let cfg = config::load("app.toml");
    println!("{}", cfg.name);
}
"#,
        )
        .add_file(
            "src/config.rs",
            r#"/// Application settings.
pub struct Config {
    pub name: String,
}

pub fn load(path: &str) -> Config {
    Config { name: read_name(path) }
}

fn read_name(path: &str) -> String {
    path.trim_end_matches(".toml").to_string()
}

fn never_called() -> u32 {
    42
}
"#,
        )
    }

    /// One file per language front-end
    pub fn with_multilang(&self) -> &Self {
        self.add_file("web/app.ts", "export function renderPage(): string { return ''; }\n")
            .add_file("web/widget.tsx", "export function Widget() { return <div />; }\n")
            .add_file("web/legacy.js", "function oldHelper() { return 1; }\n")
            .add_file("svc/main.go", "package main\n\nfunc handleRequest() {}\n\nfunc main() { handleRequest() }\n")
            .add_file("lib/Parser.java", "public class Parser {\n  public void parseAll() {}\n}\n")
            .add_file("native/buffer.c", "int buffer_len(int x) { return x; }\n")
            .add_file("native/engine.cpp", "class Engine {\npublic:\n  void start() {}\n};\n")
            .add_file("dotnet/Service.cs", "public class Billing {\n  public void Charge() {}\n}\n")
            .add_file("android/Repo.kt", "class Repository {\n  fun loadAll() {}\n}\n")
            .add_file("scripts/deploy.sh", "deploy_app() {\n  echo deploying\n}\n")
            .add_file("infra/main.tf", "resource \"aws_s3_bucket\" \"logs\" {\n  bucket = \"logs\"\n}\n")
            .add_file("docs/GUIDE.md", "# Getting Started\n\nSome text.\n")
            .add_file("tools/scan.py", "def scan_tree(root):\n    return []\n")
            .add_file("src/lib.rs", "pub fn tokenize_input() {}\n")
    }
}

impl Default for TestRepo {
    fn default() -> Self {
        Self::new()
    }
}
