//! Indexing performance benchmarks
//!
//! Measures time and throughput for indexing generated repositories of
//! various sizes, plus a real checkout when `NARSIL_BENCH_REPO` is set.
//!
//! Run with: cargo bench --bench indexing

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use narsil_mcp::extract::extract_file;
use narsil_mcp::indexer::{index_repository, IndexOptions, IndexProgress};
use narsil_mcp::Lang;
use tempfile::TempDir;

/// Generated repos: (label, modules per language)
const SIZES: &[(&str, usize)] = &[("small", 20), ("medium", 100), ("large", 400)];

fn python_module(i: usize) -> String {
    format!(
        r#"from pkg.mod_{prev} import helper_{prev}


class Service{i}:
    """Service number {i}."""

    def __init__(self, conn):
        self.conn = conn

    def load_{i}(self, key):
        value = helper_{prev}(key)
        return self.conn.get(value)


def helper_{i}(key):
    return key.strip().lower()
"#,
        i = i,
        prev = i.saturating_sub(1)
    )
}

fn rust_module(i: usize) -> String {
    format!(
        r#"use crate::mod_{prev}::parse_{prev};

/// Record number {i}
pub struct Record{i} {{
    pub id: u64,
    pub name: String,
}}

impl Record{i} {{
    pub fn new(id: u64, name: &str) -> Self {{
        Self {{ id, name: parse_{prev}(name) }}
    }}
}}

pub fn parse_{i}(input: &str) -> String {{
    input.trim().to_string()
}}
"#,
        i = i,
        prev = i.saturating_sub(1)
    )
}

fn typescript_module(i: usize) -> String {
    format!(
        r#"import {{ render{prev} }} from './mod_{prev}';

export interface Props{i} {{
  title: string;
}}

export function render{i}(props: Props{i}): string {{
  return render{prev}({{ title: props.title }}) + '{i}';
}}
"#,
        i = i,
        prev = i.saturating_sub(1)
    )
}

/// Write `modules` files per language into a fresh temp dir
fn generate_repo(modules: usize) -> TempDir {
    let dir = tempfile::tempdir().unwrap();
    for sub in ["pkg", "src", "web"] {
        fs::create_dir_all(dir.path().join(sub)).unwrap();
    }
    for i in 0..modules {
        fs::write(dir.path().join(format!("pkg/mod_{}.py", i)), python_module(i)).unwrap();
        fs::write(dir.path().join(format!("src/mod_{}.rs", i)), rust_module(i)).unwrap();
        fs::write(dir.path().join(format!("web/mod_{}.ts", i)), typescript_module(i)).unwrap();
    }
    dir
}

fn options() -> IndexOptions {
    IndexOptions {
        call_graph: true,
        ..Default::default()
    }
}

fn index_once(path: &Path) {
    let progress = IndexProgress::new();
    let _ = index_repository(black_box(path), &options(), None, &progress);
}

fn bench_index_creation(c: &mut Criterion) {
    let mut group = c.benchmark_group("index_creation");
    group.sample_size(10);
    group.measurement_time(Duration::from_secs(20));

    for (label, modules) in SIZES {
        let repo = generate_repo(*modules);
        group.throughput(Throughput::Elements((modules * 3) as u64));
        group.bench_with_input(BenchmarkId::new("generated", label), &repo.path().to_path_buf(), |b, path| {
            b.iter(|| index_once(path));
        });
    }

    if let Some(path) = std::env::var_os("NARSIL_BENCH_REPO").map(PathBuf::from) {
        if path.is_dir() {
            group.bench_with_input(BenchmarkId::new("checkout", path.display()), &path, |b, path| {
                b.iter(|| index_once(path));
            });
        } else {
            eprintln!("Skipping NARSIL_BENCH_REPO {}: not a directory", path.display());
        }
    }

    group.finish();
}

fn bench_incremental(c: &mut Criterion) {
    let repo = generate_repo(100);
    let progress = IndexProgress::new();
    let (snapshot, _) = index_repository(repo.path(), &options(), None, &progress).unwrap();

    let mut group = c.benchmark_group("incremental");
    group.sample_size(20);

    group.bench_function("unchanged", |b| {
        b.iter(|| {
            let progress = IndexProgress::new();
            let _ = index_repository(repo.path(), &options(), Some(snapshot.clone()), &progress);
        });
    });

    group.finish();
}

fn bench_extract(c: &mut Criterion) {
    let sources = [
        ("python", "pkg/mod_7.py", python_module(7), Lang::Python),
        ("rust", "src/mod_7.rs", rust_module(7), Lang::Rust),
        ("typescript", "web/mod_7.ts", typescript_module(7), Lang::TypeScript),
    ];

    let mut group = c.benchmark_group("extract_file");
    for (label, path, source, lang) in &sources {
        group.throughput(Throughput::Bytes(source.len() as u64));
        group.bench_function(*label, |b| {
            b.iter(|| extract_file(path, black_box(source), *lang));
        });
    }
    group.finish();
}

criterion_group!(benches, bench_index_creation, bench_incremental, bench_extract);
criterion_main!(benches);
