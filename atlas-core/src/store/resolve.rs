// Target resolution: raw dependency specifiers → file nodes.
//
// Resolution is deliberately narrow: exact repo-relative path match,
// plus language-specific module-to-path conversion. Substring matching
// is out.

use atlas_extract::{DepTarget, Language};

use crate::types::canonical_path;

/// Directory part of a canonical path ("" at the repo root).
fn parent_dir(path: &str) -> &str {
    path.rfind('/').map_or("", |i| &path[..i])
}

fn join(dir: &str, rest: &str) -> String {
    if dir.is_empty() {
        canonical_path(rest)
    } else {
        canonical_path(&format!("{dir}/{rest}"))
    }
}

/// Extensions tried for JS/TS relative specifiers without one.
const ECMA_EXTENSIONS: [&str; 4] = ["js", "ts", "tsx", "jsx"];

/// Attempt to resolve a raw target observed in `source` to a known file
/// node. `exists` answers membership in the store's node set.
///
/// Returns `None` when the target stays external. Resolutions that land
/// back on the source file are kept only for explicit path specifiers
/// (a file naming its own path is a genuine self-reference; a dotted
/// module landing on its own file is not).
pub(crate) fn resolve_target<F>(
    source: &str,
    language: Language,
    target: &DepTarget,
    exists: F,
) -> Option<String>
where
    F: Fn(&str) -> bool,
{
    match target {
        DepTarget::Relative(spec) => resolve_relative(source, language, spec, &exists),
        DepTarget::Module(dotted) => resolve_module(source, dotted, &exists)
            .filter(|candidate| candidate != source),
        DepTarget::External(name) => {
            // Rule (i): exact repo-relative path match only.
            let candidate = canonical_path(name);
            (!candidate.is_empty()
                && !candidate.starts_with("../")
                && candidate != source
                && exists(&candidate))
            .then_some(candidate)
        }
    }
}

fn resolve_relative<F>(source: &str, language: Language, spec: &str, exists: &F) -> Option<String>
where
    F: Fn(&str) -> bool,
{
    let dir = parent_dir(source);
    let base = join(dir, spec);
    if base.starts_with("../") {
        return None;
    }

    if exists(&base) {
        return Some(base);
    }

    match language {
        Language::JavaScript | Language::TypeScript => {
            for ext in ECMA_EXTENSIONS {
                let candidate = format!("{base}.{ext}");
                if candidate != source && exists(&candidate) {
                    return Some(candidate);
                }
            }
            for ext in ECMA_EXTENSIONS {
                let candidate = format!("{base}/index.{ext}");
                if exists(&candidate) {
                    return Some(candidate);
                }
            }
            None
        }
        Language::C | Language::Cpp => {
            // Quoted includes fall back to a repo-root lookup.
            let candidate = canonical_path(spec);
            (!candidate.starts_with("../") && exists(&candidate)).then_some(candidate)
        }
        Language::Python => None,
    }
}

/// Python dotted-module conversion: `a.b` → `a/b.py` | `a/b/__init__.py`,
/// tried from the repo root and from the importing file's package;
/// leading dots walk parent packages.
fn resolve_module<F>(source: &str, dotted: &str, exists: &F) -> Option<String>
where
    F: Fn(&str) -> bool,
{
    let dots = dotted.len() - dotted.trim_start_matches('.').len();
    let rest = &dotted[dots..];
    let rel = rest.replace('.', "/");

    if dots > 0 {
        // Relative import: one dot is the current package, each further
        // dot one package up.
        let mut dir = parent_dir(source).to_string();
        for _ in 1..dots {
            if dir.is_empty() {
                return None;
            }
            dir = parent_dir(&dir).to_string();
        }
        return module_candidates(&dir, &rel, exists);
    }

    module_candidates("", &rel, exists)
        .or_else(|| module_candidates(parent_dir(source), &rel, exists))
}

fn module_candidates<F>(dir: &str, rel: &str, exists: &F) -> Option<String>
where
    F: Fn(&str) -> bool,
{
    if rel.is_empty() {
        let candidate = join(dir, "__init__.py");
        return exists(&candidate).then_some(candidate);
    }
    let file = join(dir, &format!("{rel}.py"));
    if exists(&file) {
        return Some(file);
    }
    let package = join(dir, &format!("{rel}/__init__.py"));
    exists(&package).then_some(package)
}
