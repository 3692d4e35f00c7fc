use std::sync::LazyLock;

use regex::Regex;

use crate::{DepTarget, Dependency, EdgeKind, ExtractionRecord, Language};

use super::{LanguageExtractor, scan_lines};

static LOCAL_INCLUDE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"^\s*#\s*include\s*"([^"]+)""#).unwrap());
static SYSTEM_INCLUDE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*#\s*include\s*<([^>]+)>").unwrap());

/// Shared extractor for C and C++.
///
/// Only include directives are recognized; local includes are path
/// candidates, system includes stay external.
#[derive(Debug)]
pub struct CFamilyExtractor;

impl LanguageExtractor for CFamilyExtractor {
    fn id(&self) -> &'static str {
        "cfamily"
    }

    fn languages(&self) -> &'static [Language] {
        &[Language::C, Language::Cpp]
    }

    fn extract(&self, path: &str, language: Language, source: &str) -> ExtractionRecord {
        let mut record = ExtractionRecord::empty(path, language);

        for (line, raw) in scan_lines(source, &["//", "*", "/*"]) {
            if let Some(caps) = LOCAL_INCLUDE_RE.captures(raw) {
                record.dependencies.push(Dependency {
                    kind: EdgeKind::Include,
                    target: DepTarget::Relative(caps[1].to_string()),
                    line,
                });
            } else if let Some(caps) = SYSTEM_INCLUDE_RE.captures(raw) {
                record.dependencies.push(Dependency {
                    kind: EdgeKind::Include,
                    target: DepTarget::External(caps[1].to_string()),
                    line,
                });
            }
        }

        record
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn extract(source: &str) -> ExtractionRecord {
        CFamilyExtractor.extract("src/main.c", Language::C, source)
    }

    #[test]
    fn local_and_system_includes() {
        let rec = extract("#include \"util.h\"\n#include <stdio.h>\n# include \"sub/defs.h\"\n");
        assert_eq!(rec.dependencies.len(), 3);
        assert_eq!(
            rec.dependencies[0].target,
            DepTarget::Relative("util.h".into())
        );
        assert_eq!(
            rec.dependencies[1].target,
            DepTarget::External("stdio.h".into())
        );
        assert_eq!(
            rec.dependencies[2].target,
            DepTarget::Relative("sub/defs.h".into())
        );
        assert!(rec.dependencies.iter().all(|d| d.kind == EdgeKind::Include));
    }

    #[test]
    fn non_include_lines_ignored() {
        let rec = extract("int main(void) {\n    return 0;\n}\n");
        assert!(rec.dependencies.is_empty());
    }

    #[test]
    fn indented_include_captured() {
        let rec = extract("#ifdef FOO\n  #include \"foo.h\"\n#endif\n");
        assert_eq!(rec.dependencies.len(), 1);
        assert_eq!(rec.dependencies[0].line, 2);
    }
}
