use std::sync::LazyLock;

use regex::Regex;

use crate::{DepTarget, Dependency, EdgeKind, ExtractionRecord, Language};

use super::{LanguageExtractor, scan_lines};

static ES_IMPORT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"^import\s+(?:type\s+)?[\w$*{},\s]*?\s*from\s+['"]([^'"]+)['"]"#).unwrap()
});
static BARE_IMPORT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"^import\s+['"]([^'"]+)['"]"#).unwrap());
static EXPORT_FROM_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"^export\s+(?:\*(?:\s+as\s+[\w$]+)?|\{[^}]*\})\s*from\s+['"]([^'"]+)['"]"#)
        .unwrap()
});
static DYN_IMPORT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"\bimport\s*\(\s*['"]([^'"]+)['"]\s*\)"#).unwrap());
static REQUIRE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"\brequire\s*\(\s*['"]([^'"]+)['"]\s*\)"#).unwrap());
static FUNCTION_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?:export\s+)?(?:default\s+)?(?:async\s+)?function\s*\*?\s*([A-Za-z_$][\w$]*)")
        .unwrap()
});
static CLASS_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?:export\s+)?(?:default\s+)?(?:abstract\s+)?class\s+([A-Za-z_$][\w$]*)")
        .unwrap()
});
static EXTENDS_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\bclass\s+[A-Za-z_$][\w$]*\s+extends\s+([A-Za-z_$][\w$.]*)").unwrap()
});
static EXPORT_CONST_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^export\s+(?:const|let|var)\s+([A-Za-z_$][\w$]*)").unwrap());

/// Shared extractor for JavaScript and TypeScript (plus JSX/TSX).
#[derive(Debug)]
pub struct EcmaExtractor;

fn classify(spec: &str) -> DepTarget {
    if spec.starts_with("./") || spec.starts_with("../") {
        DepTarget::Relative(spec.to_string())
    } else {
        DepTarget::External(spec.to_string())
    }
}

impl LanguageExtractor for EcmaExtractor {
    fn id(&self) -> &'static str {
        "ecma"
    }

    fn languages(&self) -> &'static [Language] {
        &[Language::JavaScript, Language::TypeScript]
    }

    fn extract(&self, path: &str, language: Language, source: &str) -> ExtractionRecord {
        let mut record = ExtractionRecord::empty(path, language);

        for (line, raw) in scan_lines(source, &["//", "*", "/*"]) {
            let stmt = raw.trim_start();
            let top_level = raw.len() == stmt.len();

            let statement_import = ES_IMPORT_RE
                .captures(stmt)
                .or_else(|| BARE_IMPORT_RE.captures(stmt))
                .or_else(|| EXPORT_FROM_RE.captures(stmt));

            if let Some(caps) = statement_import {
                record.dependencies.push(Dependency {
                    kind: EdgeKind::Import,
                    target: classify(&caps[1]),
                    line,
                });
            } else {
                // Expression-position forms may occur several times per line.
                for caps in DYN_IMPORT_RE.captures_iter(stmt) {
                    record.dependencies.push(Dependency {
                        kind: EdgeKind::Import,
                        target: classify(&caps[1]),
                        line,
                    });
                }
                for caps in REQUIRE_RE.captures_iter(stmt) {
                    record.dependencies.push(Dependency {
                        kind: EdgeKind::Require,
                        target: classify(&caps[1]),
                        line,
                    });
                }
            }

            if let Some(caps) = EXTENDS_RE.captures(stmt) {
                record.dependencies.push(Dependency {
                    kind: EdgeKind::Inheritance,
                    target: DepTarget::External(caps[1].to_string()),
                    line,
                });
            }

            if top_level {
                if let Some(caps) = FUNCTION_RE.captures(stmt) {
                    record.symbols.push(caps[1].to_string());
                } else if let Some(caps) = CLASS_RE.captures(stmt) {
                    record.symbols.push(caps[1].to_string());
                } else if let Some(caps) = EXPORT_CONST_RE.captures(stmt) {
                    record.symbols.push(caps[1].to_string());
                }
            }
        }

        record
    }
}
