//! Dependency manifest parsing and advisory matching
//!
//! Manifests are discovered by file name (`Cargo.toml`, `package.json`,
//! `requirements*.txt`, `go.mod`) outside excluded directories. Each declared
//! version requirement is reduced to the lowest version it admits and checked
//! against a small built-in advisory table.

use std::cmp::Ordering;
use std::fs;
use std::path::Path;

use ignore::WalkBuilder;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::Result;
use crate::security::Severity;
use crate::walker;

/// Package ecosystem of a manifest
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Ecosystem {
    Cargo,
    Npm,
    PyPI,
    Go,
}

impl Ecosystem {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Cargo => "crates.io",
            Self::Npm => "npm",
            Self::PyPI => "PyPI",
            Self::Go => "Go",
        }
    }

    /// Ecosystem for a manifest file name
    pub fn for_manifest(file_name: &str) -> Option<Self> {
        match file_name {
            "Cargo.toml" => Some(Self::Cargo),
            "package.json" => Some(Self::Npm),
            "go.mod" => Some(Self::Go),
            n if n.starts_with("requirements") && n.ends_with(".txt") => Some(Self::PyPI),
            _ => None,
        }
    }

    fn normalize(&self, name: &str) -> String {
        match self {
            Self::PyPI => name.to_ascii_lowercase().replace('_', "-"),
            _ => name.to_string(),
        }
    }
}

/// One declared dependency
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dependency {
    pub name: String,
    /// Requirement as written; empty when none was given
    pub requirement: String,
    pub dev: bool,
}

impl Dependency {
    fn new(name: impl Into<String>, requirement: impl Into<String>, dev: bool) -> Self {
        Self {
            name: name.into(),
            requirement: requirement.into(),
            dev,
        }
    }

    /// Lowest version the requirement admits
    pub fn min_version(&self) -> Option<Version> {
        Version::from_requirement(&self.requirement)
    }
}

/// A parsed manifest
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Manifest {
    /// Repository-relative path
    pub path: String,
    pub ecosystem: Ecosystem,
    pub dependencies: Vec<Dependency>,
}

/// Dotted numeric version; missing components compare as zero
#[derive(Debug, Clone, Eq, Serialize, Deserialize)]
pub struct Version(pub Vec<u64>);

impl Version {
    pub fn parse(s: &str) -> Option<Self> {
        let s = s.trim().trim_start_matches('v');
        let core = s.split(|c| c == '-' || c == '+').next().unwrap_or(s);
        let mut parts = Vec::new();
        for piece in core.split('.') {
            if piece == "*" || piece.eq_ignore_ascii_case("x") {
                break;
            }
            let digits: String = piece.chars().take_while(|c| c.is_ascii_digit()).collect();
            if digits.is_empty() {
                break;
            }
            parts.push(digits.parse().ok()?);
        }
        if parts.is_empty() {
            None
        } else {
            Some(Self(parts))
        }
    }

    /// Lowest version admitted by requirement syntax from any supported
    /// ecosystem: `^1.2`, `~1.2.3`, `>=1.0, <2`, `==2.0.1`, `~=1.4`, `1.2.x`
    pub fn from_requirement(req: &str) -> Option<Self> {
        let first = req.split(|c| c == ',' || c == '|' || c == ' ').find(|p| {
            let p = p.trim();
            !p.is_empty() && !p.starts_with('<') && !p.starts_with("!=")
        })?;
        let stripped = first.trim().trim_start_matches(|c: char| matches!(c, '^' | '~' | '=' | '>'));
        Self::parse(stripped)
    }

    fn component(&self, i: usize) -> u64 {
        self.0.get(i).copied().unwrap_or(0)
    }
}

impl PartialEq for Version {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl PartialOrd for Version {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Version {
    fn cmp(&self, other: &Self) -> Ordering {
        let len = self.0.len().max(other.0.len());
        (0..len)
            .map(|i| self.component(i).cmp(&other.component(i)))
            .find(|o| *o != Ordering::Equal)
            .unwrap_or(Ordering::Equal)
    }
}

impl std::fmt::Display for Version {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let parts: Vec<String> = self.0.iter().map(u64::to_string).collect();
        f.write_str(&parts.join("."))
    }
}

/// Known vulnerable version range of a package
#[derive(Debug, Clone)]
pub struct Advisory {
    pub id: &'static str,
    pub ecosystem: Ecosystem,
    pub package: &'static str,
    /// First affected version, when the range has a lower bound
    pub introduced: Option<&'static str>,
    /// First fixed version
    pub fixed: &'static str,
    pub severity: Severity,
    pub summary: &'static str,
}

impl Advisory {
    pub fn affects(&self, version: &Version) -> bool {
        let lower_ok = self
            .introduced
            .and_then(Version::parse)
            .map(|low| *version >= low)
            .unwrap_or(true);
        let below_fix = Version::parse(self.fixed).map(|fix| *version < fix).unwrap_or(false);
        lower_ok && below_fix
    }
}

pub const ADVISORIES: &[Advisory] = &[
    Advisory {
        id: "GHSA-35jh-r3h4-6jhm",
        ecosystem: Ecosystem::Npm,
        package: "lodash",
        introduced: None,
        fixed: "4.17.21",
        severity: Severity::High,
        summary: "Command injection via template",
    },
    Advisory {
        id: "GHSA-xvch-5gv4-984h",
        ecosystem: Ecosystem::Npm,
        package: "minimist",
        introduced: None,
        fixed: "1.2.6",
        severity: Severity::Critical,
        summary: "Prototype pollution",
    },
    Advisory {
        id: "GHSA-4w2v-q235-vp99",
        ecosystem: Ecosystem::Npm,
        package: "axios",
        introduced: None,
        fixed: "0.21.1",
        severity: Severity::Medium,
        summary: "Server-side request forgery through redirects",
    },
    Advisory {
        id: "GHSA-r683-j2x4-v87g",
        ecosystem: Ecosystem::Npm,
        package: "node-fetch",
        introduced: None,
        fixed: "2.6.7",
        severity: Severity::High,
        summary: "Exposure of sensitive headers to an untrusted redirect target",
    },
    Advisory {
        id: "GHSA-27h2-hvpr-p74q",
        ecosystem: Ecosystem::Npm,
        package: "jsonwebtoken",
        introduced: None,
        fixed: "9.0.0",
        severity: Severity::High,
        summary: "Insecure key handling in verify",
    },
    Advisory {
        id: "GHSA-8q59-q68h-6hv4",
        ecosystem: Ecosystem::PyPI,
        package: "pyyaml",
        introduced: None,
        fixed: "5.4",
        severity: Severity::Critical,
        summary: "Arbitrary code execution in full_load and FullLoader",
    },
    Advisory {
        id: "GHSA-j8r2-6x86-q33q",
        ecosystem: Ecosystem::PyPI,
        package: "requests",
        introduced: Some("2.3.0"),
        fixed: "2.31.0",
        severity: Severity::Medium,
        summary: "Proxy-Authorization header leaked on redirect",
    },
    Advisory {
        id: "GHSA-q2q7-5pp4-w6pg",
        ecosystem: Ecosystem::PyPI,
        package: "urllib3",
        introduced: None,
        fixed: "1.26.5",
        severity: Severity::High,
        summary: "Catastrophic backtracking in URL authority parsing",
    },
    Advisory {
        id: "GHSA-g3rq-g295-4j3m",
        ecosystem: Ecosystem::PyPI,
        package: "jinja2",
        introduced: None,
        fixed: "2.11.3",
        severity: Severity::Medium,
        summary: "Regular expression denial of service in urlize",
    },
    Advisory {
        id: "RUSTSEC-2022-0013",
        ecosystem: Ecosystem::Cargo,
        package: "regex",
        introduced: None,
        fixed: "1.5.5",
        severity: Severity::High,
        summary: "Denial of service from crafted regular expressions",
    },
    Advisory {
        id: "RUSTSEC-2021-0078",
        ecosystem: Ecosystem::Cargo,
        package: "hyper",
        introduced: None,
        fixed: "0.14.10",
        severity: Severity::High,
        summary: "Lenient Content-Length parsing enables request smuggling",
    },
    Advisory {
        id: "RUSTSEC-2021-0003",
        ecosystem: Ecosystem::Cargo,
        package: "smallvec",
        introduced: Some("1.0.0"),
        fixed: "1.6.1",
        severity: Severity::High,
        summary: "Buffer overflow in SmallVec::insert_many",
    },
    Advisory {
        id: "RUSTSEC-2020-0071",
        ecosystem: Ecosystem::Cargo,
        package: "time",
        introduced: None,
        fixed: "0.2.23",
        severity: Severity::Medium,
        summary: "Potential segfault when the environment is modified concurrently",
    },
    Advisory {
        id: "GHSA-45x7-px36-x8w8",
        ecosystem: Ecosystem::Go,
        package: "golang.org/x/crypto",
        introduced: None,
        fixed: "0.17.0",
        severity: Severity::Medium,
        summary: "SSH prefix truncation (Terrapin)",
    },
    Advisory {
        id: "GHSA-4374-p667-p6c8",
        ecosystem: Ecosystem::Go,
        package: "golang.org/x/net",
        introduced: None,
        fixed: "0.17.0",
        severity: Severity::High,
        summary: "HTTP/2 rapid reset denial of service",
    },
    Advisory {
        id: "GHSA-3vp4-m3rf-835h",
        ecosystem: Ecosystem::Go,
        package: "github.com/gin-gonic/gin",
        introduced: None,
        fixed: "1.9.1",
        severity: Severity::Medium,
        summary: "Improper handling of filenames in Context.FileAttachment",
    },
];

/// A dependency whose requirement admits an affected version
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdvisoryMatch {
    pub advisory_id: String,
    pub package: String,
    pub ecosystem: Ecosystem,
    pub requirement: String,
    pub manifest: String,
    pub severity: Severity,
    pub summary: String,
    pub fixed: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DependencyReport {
    pub manifests: Vec<Manifest>,
    pub matches: Vec<AdvisoryMatch>,
    /// Dependencies whose requirement could not be reduced to a version
    pub unversioned: usize,
}

impl DependencyReport {
    pub fn dependency_count(&self) -> usize {
        self.manifests.iter().map(|m| m.dependencies.len()).sum()
    }
}

/// Find and check every manifest under `root`
pub fn check_repository(root: &Path) -> Result<DependencyReport> {
    let mut manifests = Vec::new();
    for path in find_manifests(root) {
        let rel = walker::relative_path(root, &path);
        let content = match fs::read_to_string(&path) {
            Ok(c) => c,
            Err(e) => {
                warn!("cannot read manifest {}: {}", rel, e);
                continue;
            }
        };
        let file_name = path.file_name().and_then(|n| n.to_str()).unwrap_or_default();
        if let Some(ecosystem) = Ecosystem::for_manifest(file_name) {
            match parse_manifest(ecosystem, &content) {
                Some(dependencies) => manifests.push(Manifest {
                    path: rel,
                    ecosystem,
                    dependencies,
                }),
                None => warn!("skipping malformed manifest {}", rel),
            }
        }
    }
    Ok(check_manifests(manifests))
}

/// Match parsed manifests against the advisory table
pub fn check_manifests(manifests: Vec<Manifest>) -> DependencyReport {
    let mut report = DependencyReport::default();
    for manifest in &manifests {
        for dep in &manifest.dependencies {
            let Some(version) = dep.min_version() else {
                report.unversioned += 1;
                continue;
            };
            let name = manifest.ecosystem.normalize(&dep.name);
            for advisory in ADVISORIES
                .iter()
                .filter(|a| a.ecosystem == manifest.ecosystem && a.package == name)
            {
                if advisory.affects(&version) {
                    report.matches.push(AdvisoryMatch {
                        advisory_id: advisory.id.to_string(),
                        package: dep.name.clone(),
                        ecosystem: manifest.ecosystem,
                        requirement: dep.requirement.clone(),
                        manifest: manifest.path.clone(),
                        severity: advisory.severity,
                        summary: advisory.summary.to_string(),
                        fixed: advisory.fixed.to_string(),
                    });
                }
            }
        }
    }
    report.matches.sort_by(|a, b| {
        b.severity
            .cmp(&a.severity)
            .then_with(|| a.manifest.cmp(&b.manifest))
            .then_with(|| a.package.cmp(&b.package))
    });
    report.manifests = manifests;
    report
}

fn find_manifests(root: &Path) -> Vec<std::path::PathBuf> {
    let walk = WalkBuilder::new(root)
        .hidden(true)
        .git_ignore(true)
        .filter_entry(|entry| {
            let is_dir = entry.file_type().map(|t| t.is_dir()).unwrap_or(false);
            !(is_dir && entry.depth() > 0 && walker::is_excluded_dir_name(&entry.file_name().to_string_lossy()))
        })
        .build();

    let mut found: Vec<_> = walk
        .filter_map(|entry| entry.ok())
        .filter(|e| e.file_type().map(|t| t.is_file()).unwrap_or(false))
        .filter(|e| Ecosystem::for_manifest(&e.file_name().to_string_lossy()).is_some())
        .map(|e| e.into_path())
        .collect();
    found.sort();
    debug!("found {} dependency manifests", found.len());
    found
}

/// Parse a manifest's dependency list; `None` when the file is malformed
pub fn parse_manifest(ecosystem: Ecosystem, content: &str) -> Option<Vec<Dependency>> {
    match ecosystem {
        Ecosystem::Cargo => parse_cargo(content),
        Ecosystem::Npm => parse_package_json(content),
        Ecosystem::PyPI => Some(parse_requirements(content)),
        Ecosystem::Go => Some(parse_go_mod(content)),
    }
}

fn parse_cargo(content: &str) -> Option<Vec<Dependency>> {
    let value: toml::Value = toml::from_str(content).ok()?;
    let mut deps = Vec::new();

    let mut collect = |table: Option<&toml::Value>, dev: bool| {
        let Some(table) = table.and_then(|t| t.as_table()) else {
            return;
        };
        for (name, spec) in table {
            let requirement = match spec {
                toml::Value::String(s) => s.clone(),
                toml::Value::Table(t) => t
                    .get("version")
                    .and_then(|v| v.as_str())
                    .unwrap_or_default()
                    .to_string(),
                _ => String::new(),
            };
            let package = match spec {
                toml::Value::Table(t) => t.get("package").and_then(|p| p.as_str()).unwrap_or(name.as_str()),
                _ => name.as_str(),
            };
            deps.push(Dependency::new(package, requirement, dev));
        }
    };

    collect(value.get("dependencies"), false);
    collect(value.get("build-dependencies"), false);
    collect(value.get("dev-dependencies"), true);
    collect(value.get("workspace").and_then(|w| w.get("dependencies")), false);
    if let Some(targets) = value.get("target").and_then(|t| t.as_table()) {
        for target in targets.values() {
            collect(target.get("dependencies"), false);
            collect(target.get("dev-dependencies"), true);
        }
    }
    Some(deps)
}

fn parse_package_json(content: &str) -> Option<Vec<Dependency>> {
    let value: serde_json::Value = serde_json::from_str(content).ok()?;
    let mut deps = Vec::new();
    for (section, dev) in [
        ("dependencies", false),
        ("peerDependencies", false),
        ("optionalDependencies", false),
        ("devDependencies", true),
    ] {
        if let Some(map) = value.get(section).and_then(|v| v.as_object()) {
            for (name, req) in map {
                deps.push(Dependency::new(name.clone(), req.as_str().unwrap_or_default(), dev));
            }
        }
    }
    Some(deps)
}

fn parse_requirements(content: &str) -> Vec<Dependency> {
    content
        .lines()
        .map(|line| line.split('#').next().unwrap_or_default().trim())
        .filter(|line| !line.is_empty() && !line.starts_with('-'))
        .filter_map(|line| {
            let line = line.split(';').next().unwrap_or(line).trim();
            let split = line
                .find(|c: char| matches!(c, '=' | '<' | '>' | '~' | '!' | ' '))
                .unwrap_or(line.len());
            let (name, requirement) = line.split_at(split);
            let name = name.split('[').next().unwrap_or(name).trim();
            if name.is_empty() || name.contains('/') {
                return None;
            }
            Some(Dependency::new(name, requirement.trim(), false))
        })
        .collect()
}

fn parse_go_mod(content: &str) -> Vec<Dependency> {
    let mut deps = Vec::new();
    let mut in_block = false;
    for line in content.lines() {
        let line = line.split("//").next().unwrap_or_default().trim();
        if in_block {
            if line == ")" {
                in_block = false;
                continue;
            }
            push_go_requirement(&mut deps, line);
        } else if line == "require (" {
            in_block = true;
        } else if let Some(rest) = line.strip_prefix("require ") {
            push_go_requirement(&mut deps, rest);
        }
    }
    deps
}

fn push_go_requirement(deps: &mut Vec<Dependency>, line: &str) {
    let mut parts = line.split_whitespace();
    if let (Some(module), Some(version)) = (parts.next(), parts.next()) {
        deps.push(Dependency::new(module, version, false));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_version_ordering_and_requirements() {
        let v = |s: &str| Version::parse(s).unwrap();
        assert!(v("1.2.10") > v("1.2.9"));
        assert_eq!(v("1.2"), v("1.2.0"));
        assert_eq!(v("v0.17.0-rc1"), v("0.17.0"));
        assert_eq!(Version::from_requirement("^4.17.0"), Some(v("4.17.0")));
        assert_eq!(Version::from_requirement(">=2.0, <3"), Some(v("2.0")));
        assert_eq!(Version::from_requirement("~=1.4"), Some(v("1.4")));
        assert_eq!(Version::from_requirement("<2.0, >=1.1"), Some(v("1.1")));
        assert_eq!(Version::from_requirement("*"), None);
        assert_eq!(Version::from_requirement("git+https://example.com/x.git"), None);
    }

    #[test]
    fn test_parse_each_manifest_kind() {
        let cargo = parse_manifest(
            Ecosystem::Cargo,
            "[dependencies]\nregex = \"1.5.4\"\nserde = { version = \"1\", features = [\"derive\"] }\nlocal = { path = \"../local\" }\n\n[dev-dependencies]\ntempfile = \"3\"\n",
        )
        .unwrap();
        assert_eq!(cargo.len(), 4);
        assert!(cargo.iter().any(|d| d.name == "tempfile" && d.dev));
        assert!(cargo.iter().any(|d| d.name == "local" && d.requirement.is_empty()));

        let npm = parse_manifest(
            Ecosystem::Npm,
            r#"{"dependencies": {"lodash": "^4.17.15"}, "devDependencies": {"jest": "29"}}"#,
        )
        .unwrap();
        assert_eq!(npm.len(), 2);

        let py = parse_manifest(
            Ecosystem::PyPI,
            "# comment\n-r base.txt\nPyYAML==5.3.1\nrequests[socks]>=2.20 ; python_version > '3'\nflask\n",
        )
        .unwrap();
        let names: Vec<&str> = py.iter().map(|d| d.name.as_str()).collect();
        assert_eq!(names, vec!["PyYAML", "requests", "flask"]);
        assert_eq!(py[1].requirement, ">=2.20");

        let go = parse_manifest(
            Ecosystem::Go,
            "module example.com/app\n\ngo 1.21\n\nrequire (\n\tgolang.org/x/net v0.10.0\n\tgithub.com/pkg/errors v0.9.1 // indirect\n)\nrequire golang.org/x/crypto v0.18.0\n",
        )
        .unwrap();
        assert_eq!(go.len(), 3);
        assert_eq!(go[0].requirement, "v0.10.0");

        assert!(parse_manifest(Ecosystem::Npm, "{not json").is_none());
    }

    #[test]
    fn test_advisory_ranges() {
        let smallvec = ADVISORIES.iter().find(|a| a.package == "smallvec").unwrap();
        assert!(!smallvec.affects(&Version::parse("0.6.13").unwrap()));
        assert!(smallvec.affects(&Version::parse("1.4.0").unwrap()));
        assert!(!smallvec.affects(&Version::parse("1.6.1").unwrap()));
    }

    #[test]
    fn test_check_repository() {
        let dir = TempDir::new().unwrap();
        fs::write(
            dir.path().join("package.json"),
            r#"{"dependencies": {"lodash": "^4.17.15", "minimist": "1.2.8"}}"#,
        )
        .unwrap();
        fs::create_dir_all(dir.path().join("svc")).unwrap();
        fs::write(dir.path().join("svc/requirements.txt"), "pyyaml==5.3\nrequests==2.31.0\n").unwrap();
        fs::create_dir_all(dir.path().join("node_modules/lodash")).unwrap();
        fs::write(
            dir.path().join("node_modules/lodash/package.json"),
            r#"{"dependencies": {"minimist": "0.0.1"}}"#,
        )
        .unwrap();

        let report = check_repository(dir.path()).unwrap();
        assert_eq!(report.manifests.len(), 2);
        assert_eq!(report.dependency_count(), 4);

        let ids: Vec<&str> = report.matches.iter().map(|m| m.advisory_id.as_str()).collect();
        assert_eq!(ids, vec!["GHSA-8q59-q68h-6hv4", "GHSA-35jh-r3h4-6jhm"]);
        assert_eq!(report.matches[0].manifest, "svc/requirements.txt");
    }
}
