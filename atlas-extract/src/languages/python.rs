use std::sync::LazyLock;

use regex::Regex;

use crate::{DepTarget, Dependency, EdgeKind, ExtractionRecord, Language};

use super::{LanguageExtractor, scan_lines};

static IMPORT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^import\s+(.+)$").unwrap());
static FROM_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^from\s+(\.*[A-Za-z0-9_.]*)\s+import\b").unwrap());
static CLASS_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^class\s+([A-Za-z_]\w*)\s*(?:\(([^)]*)\))?\s*:").unwrap());
static DEF_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(?:async\s+)?def\s+([A-Za-z_]\w*)\s*\(").unwrap());
static MODULE_NAME_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_.]*$").unwrap());

#[derive(Debug)]
pub struct PythonExtractor;

impl LanguageExtractor for PythonExtractor {
    fn id(&self) -> &'static str {
        "python"
    }

    fn languages(&self) -> &'static [Language] {
        &[Language::Python]
    }

    fn extract(&self, path: &str, language: Language, source: &str) -> ExtractionRecord {
        let mut record = ExtractionRecord::empty(path, language);

        for (line, raw) in scan_lines(source, &["#"]) {
            let stmt = raw.trim_start();
            let top_level = raw.len() == stmt.len();

            if let Some(caps) = IMPORT_RE.captures(stmt) {
                // `import a.b, c as d` — one dependency per comma entry.
                for entry in caps[1].split(',') {
                    let Some(module) = entry.split_whitespace().next() else {
                        continue;
                    };
                    if MODULE_NAME_RE.is_match(module) {
                        record.dependencies.push(Dependency {
                            kind: EdgeKind::Import,
                            target: DepTarget::Module(module.to_string()),
                            line,
                        });
                    }
                }
            } else if let Some(caps) = FROM_RE.captures(stmt) {
                let module = &caps[1];
                if !module.is_empty() {
                    record.dependencies.push(Dependency {
                        kind: EdgeKind::Import,
                        target: DepTarget::Module(module.to_string()),
                        line,
                    });
                }
            } else if let Some(caps) = CLASS_RE.captures(stmt) {
                if top_level {
                    record.symbols.push(caps[1].to_string());
                }
                if let Some(bases) = caps.get(2) {
                    for base in bases.as_str().split(',') {
                        let base = base.trim();
                        // Strip subscripted generics: `Generic[T]` → `Generic`.
                        let base = base.split('[').next().unwrap_or(base).trim();
                        if base.is_empty()
                            || base == "object"
                            || base.contains('=')
                            || !MODULE_NAME_RE.is_match(base)
                        {
                            continue;
                        }
                        record.dependencies.push(Dependency {
                            kind: EdgeKind::Inheritance,
                            target: DepTarget::External(base.to_string()),
                            line,
                        });
                    }
                }
            } else if top_level {
                if let Some(caps) = DEF_RE.captures(stmt) {
                    record.symbols.push(caps[1].to_string());
                }
            }
        }

        record
    }
}
