pub mod cfamily;
pub mod ecma;
pub mod python;

use std::collections::HashMap;
use std::sync::Arc;

use crate::{ExtractionRecord, Language};

/// Trait implemented by each language family's extraction support.
///
/// `extract` must be deterministic, must not perform I/O, and must not
/// panic on malformed input — unrecognizable content yields an empty
/// record.
pub trait LanguageExtractor: Send + Sync + std::fmt::Debug {
    /// Extractor identifier (e.g., "python", "ecma").
    fn id(&self) -> &'static str;

    /// Language tags this extractor handles.
    fn languages(&self) -> &'static [Language];

    /// Extract dependency statements and top-level symbols.
    fn extract(&self, path: &str, language: Language, source: &str) -> ExtractionRecord;
}

/// Registry of all supported languages.
#[derive(Debug)]
pub struct ExtractorRegistry {
    by_language: HashMap<Language, Arc<dyn LanguageExtractor>>,
}

impl ExtractorRegistry {
    pub fn new() -> Self {
        let mut reg = Self {
            by_language: HashMap::new(),
        };
        reg.register(Arc::new(python::PythonExtractor));
        reg.register(Arc::new(ecma::EcmaExtractor));
        reg.register(Arc::new(cfamily::CFamilyExtractor));
        reg
    }

    fn register(&mut self, extractor: Arc<dyn LanguageExtractor>) {
        for lang in extractor.languages() {
            self.by_language.insert(*lang, extractor.clone());
        }
    }

    /// Look up the extractor for a file by its extension.
    pub fn for_path(&self, path: &str) -> Option<(Language, Arc<dyn LanguageExtractor>)> {
        let lang = Language::from_path(path)?;
        let extractor = self.by_language.get(&lang)?.clone();
        Some((lang, extractor))
    }

    /// Extract a file, returning `None` when its language is unsupported.
    pub fn extract(&self, path: &str, source: &str) -> Option<ExtractionRecord> {
        let (lang, extractor) = self.for_path(path)?;
        Some(extractor.extract(path, lang, source))
    }

    /// Extractor IDs with the languages each one covers, for the
    /// availability section of the metrics artifact.
    pub fn availability(&self) -> Vec<(Language, &'static str)> {
        let mut out: Vec<(Language, &'static str)> = self
            .by_language
            .iter()
            .map(|(lang, ex)| (*lang, ex.id()))
            .collect();
        out.sort();
        out
    }
}

impl Default for ExtractorRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Line-number walk shared by the line-oriented extractors: yields
/// `(1-based line, raw text)` skipping blank and comment-only lines.
pub(crate) fn scan_lines<'a>(
    source: &'a str,
    comment_starts: &'a [&'a str],
) -> impl Iterator<Item = (u32, &'a str)> + 'a {
    source.lines().enumerate().filter_map(move |(idx, raw)| {
        let trimmed = raw.trim();
        if trimmed.is_empty() || comment_starts.iter().any(|c| trimmed.starts_with(c)) {
            return None;
        }
        // Line numbers saturate rather than wrap on absurd inputs.
        Some((u32::try_from(idx + 1).unwrap_or(u32::MAX), raw))
    })
}
