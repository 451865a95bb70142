//! Language detection and tree-sitter grammar loading

use std::path::Path;

use serde::{Deserialize, Serialize};
use tree_sitter::Language;

use crate::error::{NarsilError, Result};

/// Supported languages, one per parser front-end
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Lang {
    TypeScript,
    Tsx,
    JavaScript,
    Jsx,
    Rust,
    Python,
    Go,
    Java,
    C,
    Cpp,
    CSharp,
    Kotlin,
    /// Shell/Bash scripts
    Bash,
    /// Groovy sources and Gradle build files
    Groovy,
    /// HCL/Terraform
    Hcl,
    Markdown,
}

impl Lang {
    pub const ALL: [Lang; 16] = [
        Lang::TypeScript,
        Lang::Tsx,
        Lang::JavaScript,
        Lang::Jsx,
        Lang::Rust,
        Lang::Python,
        Lang::Go,
        Lang::Java,
        Lang::C,
        Lang::Cpp,
        Lang::CSharp,
        Lang::Kotlin,
        Lang::Bash,
        Lang::Groovy,
        Lang::Hcl,
        Lang::Markdown,
    ];

    /// Detect language from file path extension
    pub fn from_path(path: &Path) -> Result<Self> {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .ok_or_else(|| NarsilError::UnsupportedLanguage {
                extension: "none".to_string(),
            })?;

        Self::from_extension(ext)
    }

    /// Detect language from file extension string
    pub fn from_extension(ext: &str) -> Result<Self> {
        match ext.to_lowercase().as_str() {
            "ts" | "mts" | "cts" => Ok(Self::TypeScript),
            "tsx" => Ok(Self::Tsx),
            "js" | "mjs" | "cjs" => Ok(Self::JavaScript),
            "jsx" => Ok(Self::Jsx),
            "rs" => Ok(Self::Rust),
            "py" | "pyi" => Ok(Self::Python),
            "go" => Ok(Self::Go),
            "java" => Ok(Self::Java),
            "c" | "h" => Ok(Self::C),
            "cpp" | "cc" | "cxx" | "hpp" | "hxx" | "hh" => Ok(Self::Cpp),
            "cs" => Ok(Self::CSharp),
            "kt" | "kts" => Ok(Self::Kotlin),
            "sh" | "bash" | "zsh" => Ok(Self::Bash),
            "groovy" | "gradle" => Ok(Self::Groovy),
            "tf" | "hcl" | "tfvars" => Ok(Self::Hcl),
            "md" | "markdown" => Ok(Self::Markdown),
            _ => Err(NarsilError::UnsupportedLanguage {
                extension: ext.to_string(),
            }),
        }
    }

    /// Get the canonical name of the language
    pub fn name(&self) -> &'static str {
        match self {
            Self::TypeScript => "typescript",
            Self::Tsx => "tsx",
            Self::JavaScript => "javascript",
            Self::Jsx => "jsx",
            Self::Rust => "rust",
            Self::Python => "python",
            Self::Go => "go",
            Self::Java => "java",
            Self::C => "c",
            Self::Cpp => "cpp",
            Self::CSharp => "csharp",
            Self::Kotlin => "kotlin",
            Self::Bash => "bash",
            Self::Groovy => "groovy",
            Self::Hcl => "hcl",
            Self::Markdown => "markdown",
        }
    }

    /// Get the tree-sitter Language for parsing
    pub fn tree_sitter_language(&self) -> Language {
        match self {
            Self::TypeScript => tree_sitter_typescript::LANGUAGE_TYPESCRIPT.into(),
            Self::Tsx => tree_sitter_typescript::LANGUAGE_TSX.into(),
            Self::JavaScript | Self::Jsx => tree_sitter_javascript::LANGUAGE.into(),
            Self::Rust => tree_sitter_rust::LANGUAGE.into(),
            Self::Python => tree_sitter_python::LANGUAGE.into(),
            Self::Go => tree_sitter_go::LANGUAGE.into(),
            Self::Java => tree_sitter_java::LANGUAGE.into(),
            Self::C => tree_sitter_c::LANGUAGE.into(),
            Self::Cpp => tree_sitter_cpp::LANGUAGE.into(),
            Self::CSharp => tree_sitter_c_sharp::LANGUAGE.into(),
            Self::Kotlin => tree_sitter_kotlin_ng::LANGUAGE.into(),
            Self::Bash => tree_sitter_bash::LANGUAGE.into(),
            Self::Groovy => tree_sitter_groovy::LANGUAGE.into(),
            Self::Hcl => tree_sitter_hcl::LANGUAGE.into(),
            Self::Markdown => tree_sitter_md::LANGUAGE.into(),
        }
    }

    /// Get the language family
    pub fn family(&self) -> LangFamily {
        match self {
            Self::TypeScript | Self::Tsx | Self::JavaScript | Self::Jsx => LangFamily::JavaScript,
            Self::Rust => LangFamily::Rust,
            Self::Python => LangFamily::Python,
            Self::Go => LangFamily::Go,
            Self::Java | Self::Kotlin | Self::Groovy => LangFamily::Jvm,
            Self::CSharp => LangFamily::DotNet,
            Self::C | Self::Cpp => LangFamily::CFamily,
            Self::Bash => LangFamily::Shell,
            Self::Hcl => LangFamily::Hcl,
            Self::Markdown => LangFamily::Markup,
        }
    }

    /// Whether the language has functions and call sites
    pub fn is_programming_language(&self) -> bool {
        !matches!(self.family(), LangFamily::Markup | LangFamily::Hcl)
    }

    /// Get common file extensions for this language
    pub fn extensions(&self) -> &'static [&'static str] {
        match self {
            Self::TypeScript => &["ts", "mts", "cts"],
            Self::Tsx => &["tsx"],
            Self::JavaScript => &["js", "mjs", "cjs"],
            Self::Jsx => &["jsx"],
            Self::Rust => &["rs"],
            Self::Python => &["py", "pyi"],
            Self::Go => &["go"],
            Self::Java => &["java"],
            Self::C => &["c", "h"],
            Self::Cpp => &["cpp", "cc", "cxx", "hpp", "hxx", "hh"],
            Self::CSharp => &["cs"],
            Self::Kotlin => &["kt", "kts"],
            Self::Bash => &["sh", "bash", "zsh"],
            Self::Groovy => &["groovy", "gradle"],
            Self::Hcl => &["tf", "hcl", "tfvars"],
            Self::Markdown => &["md", "markdown"],
        }
    }

    /// Whether a file extension belongs to any supported language
    pub fn is_supported_extension(ext: &str) -> bool {
        Self::from_extension(ext).is_ok()
    }
}

impl std::fmt::Display for Lang {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Language families for grouping similar extraction logic
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LangFamily {
    /// JavaScript, TypeScript, JSX, TSX
    JavaScript,
    Rust,
    Python,
    Go,
    /// Java, Kotlin, Groovy
    Jvm,
    /// C#
    DotNet,
    /// C and C++
    CFamily,
    /// Shell/Bash
    Shell,
    /// HCL/Terraform
    Hcl,
    /// Markdown
    Markup,
}

impl LangFamily {
    /// Get the canonical name of the language family
    pub fn name(&self) -> &'static str {
        match self {
            Self::JavaScript => "javascript",
            Self::Rust => "rust",
            Self::Python => "python",
            Self::Go => "go",
            Self::Jvm => "jvm",
            Self::DotNet => "dotnet",
            Self::CFamily => "c_family",
            Self::Shell => "shell",
            Self::Hcl => "hcl",
            Self::Markup => "markup",
        }
    }
}
