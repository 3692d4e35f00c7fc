//! Regex-based dependency extraction for Python, JavaScript/TypeScript,
//! and C/C++.
//!
//! Produces [`ExtractionRecord`]s: the dependency statements of a single
//! source file (imports, includes, requires, inheritance) plus its
//! top-level symbol names. Extraction is a pure function of the file
//! contents — no filesystem access and no cross-file resolution happens
//! here; symbolic targets are resolved later by the graph store.

pub mod languages;

use serde::{Deserialize, Serialize};

pub use languages::{ExtractorRegistry, LanguageExtractor};

/// Error type for the extraction engine.
#[derive(thiserror::Error, Debug)]
pub enum ExtractError {
    /// The file's language is not supported.
    #[error("Unsupported language: {0}")]
    UnsupportedLanguage(String),

    /// A single file's extraction failed or timed out.
    #[error("Extraction failed for {path}: {reason}")]
    Failed {
        /// Path of the file that failed.
        path: String,
        /// Description of the failure.
        reason: String,
    },

    /// Filesystem I/O error reading source bytes.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Convenience alias for `Result<T, ExtractError>`.
pub type Result<T> = std::result::Result<T, ExtractError>;

// ── Language tags ──────────────────────────────────────────────────

/// Supported source languages, derived from file extensions.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    Python,
    JavaScript,
    TypeScript,
    C,
    Cpp,
}

impl Language {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Python => "python",
            Self::JavaScript => "javascript",
            Self::TypeScript => "typescript",
            Self::C => "c",
            Self::Cpp => "cpp",
        }
    }

    /// Map a file extension (without the dot) to a language tag.
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext {
            "py" => Some(Self::Python),
            "js" | "jsx" | "mjs" | "cjs" => Some(Self::JavaScript),
            "ts" | "tsx" => Some(Self::TypeScript),
            "c" | "h" => Some(Self::C),
            "cpp" | "cc" | "cxx" | "hpp" => Some(Self::Cpp),
            _ => None,
        }
    }

    /// Map a repo-relative path to a language tag via its extension.
    pub fn from_path(path: &str) -> Option<Self> {
        let ext = path.rsplit('.').next()?;
        if ext.len() == path.len() {
            return None; // no dot at all
        }
        Self::from_extension(ext)
    }
}

impl std::fmt::Display for Language {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ── Dependency records ─────────────────────────────────────────────

/// Relationship carried by a dependency statement.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum EdgeKind {
    Import,
    Include,
    Require,
    Call,
    Inheritance,
}

impl EdgeKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Import => "import",
            Self::Include => "include",
            Self::Require => "require",
            Self::Call => "call",
            Self::Inheritance => "inheritance",
        }
    }
}

impl std::fmt::Display for EdgeKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for EdgeKind {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "import" => Ok(Self::Import),
            "include" => Ok(Self::Include),
            "require" => Ok(Self::Require),
            "call" => Ok(Self::Call),
            "inheritance" => Ok(Self::Inheritance),
            other => Err(format!("unknown edge kind: {other}")),
        }
    }
}

/// Raw, unresolved target of a dependency statement.
///
/// Extraction never decides whether a target exists in the repository;
/// it only classifies the specifier's shape so the store can apply the
/// matching resolution rule.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DepTarget {
    /// Dotted module path (`pkg.mod`), possibly with leading dots for
    /// Python relative imports.
    Module(String),
    /// Path-shaped specifier resolved against the source file's
    /// directory (`./util`, `../lib/x`, `internal/defs.h`).
    Relative(String),
    /// Bare package name, system header, or symbol — stays external
    /// unless it happens to name a repository file exactly.
    External(String),
}

impl DepTarget {
    /// The raw specifier text, whatever the shape.
    pub fn raw(&self) -> &str {
        match self {
            Self::Module(s) | Self::Relative(s) | Self::External(s) => s,
        }
    }
}

/// One dependency statement found in a source file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dependency {
    pub kind: EdgeKind,
    pub target: DepTarget,
    /// 1-based line number of the originating statement.
    pub line: u32,
}

/// The complete output of extracting one file.
///
/// A pure function of `(path, contents)`: re-extracting the same bytes
/// always yields an identical record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtractionRecord {
    /// Repo-relative path of the extracted file.
    pub path: String,
    pub language: Language,
    pub dependencies: Vec<Dependency>,
    /// Top-level symbol names (functions, classes, exported consts).
    pub symbols: Vec<String>,
}

impl ExtractionRecord {
    /// An empty record for a file that parsed to nothing.
    pub fn empty(path: &str, language: Language) -> Self {
        Self {
            path: path.to_string(),
            language,
            dependencies: Vec::new(),
            symbols: Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extension_mapping() {
        assert_eq!(Language::from_path("src/app.py"), Some(Language::Python));
        assert_eq!(Language::from_path("a/b.tsx"), Some(Language::TypeScript));
        assert_eq!(Language::from_path("lib.cc"), Some(Language::Cpp));
        assert_eq!(Language::from_path("defs.h"), Some(Language::C));
        assert_eq!(Language::from_path("README.md"), None);
        assert_eq!(Language::from_path("Makefile"), None);
    }

    #[test]
    fn target_raw_text() {
        assert_eq!(DepTarget::Module("a.b".into()).raw(), "a.b");
        assert_eq!(DepTarget::Relative("./x".into()).raw(), "./x");
        assert_eq!(DepTarget::External("react".into()).raw(), "react");
    }
}
