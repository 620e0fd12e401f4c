//! PDF checks: file size, page count, and spelling of the extracted text.

use std::collections::{BTreeSet, HashSet};
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use anyhow::Context;
use async_trait::async_trait;
use regex::bytes::Regex as BytesRegex;

use super::{CheckInput, Finding, FindingSource, QualityCheck};
use crate::errors::BuildError;

/// 512 KiB
pub const DEFAULT_MAX_PDF_BYTES: u64 = 512 * 1024;

// Page objects are `/Type /Page`; the page tree root is `/Type /Pages`.
static PAGE_OBJECT_RE: LazyLock<BytesRegex> =
    LazyLock::new(|| BytesRegex::new(r"/Type\s*/Page(?-u:[^s]|$)").expect("static regex"));

const STOP_WORDS: &[&str] = &[
    "and", "the", "for", "with", "from", "that", "this", "are", "was", "were", "has", "have",
    "had", "not", "but", "all", "any", "can", "our", "out", "its", "into", "than", "then",
    "them", "they", "their", "there", "these", "those", "who", "whom", "which", "what", "when",
    "where", "why", "how", "been", "being", "such", "very", "will", "would", "should", "could",
    "about", "over", "under", "also", "both", "each", "few", "more", "most", "other", "some",
    "only", "own", "same", "too", "just", "you", "your", "his", "her", "him", "she", "off",
];

/// Accepted words: a base word list plus a user-maintained list of known words.
#[derive(Debug, Default)]
pub struct Dictionary {
    words: HashSet<String>,
}

impl Dictionary {
    /// Loads one word per line from `words_path`, and from `known_words_path` if it exists.
    pub fn load(words_path: &Path, known_words_path: Option<&Path>) -> anyhow::Result<Self> {
        let mut dict = Dictionary::default();
        let base = std::fs::read_to_string(words_path)
            .with_context(|| format!("cannot read dictionary {}", words_path.display()))?;
        dict.extend(&base);

        if let Some(known) = known_words_path.filter(|p| p.is_file()) {
            let extra = std::fs::read_to_string(known)
                .with_context(|| format!("cannot read known words {}", known.display()))?;
            dict.extend(&extra);
        }
        Ok(dict)
    }

    #[cfg(test)]
    pub fn from_words<'a>(words: impl IntoIterator<Item = &'a str>) -> Self {
        let mut dict = Dictionary::default();
        for w in words {
            dict.words.insert(w.to_lowercase());
        }
        dict
    }

    fn extend(&mut self, list: &str) {
        self.words.extend(
            list.lines()
                .map(str::trim)
                .filter(|w| !w.is_empty())
                .map(str::to_lowercase),
        );
    }

    pub fn contains(&self, word: &str) -> bool {
        self.words.contains(&word.to_lowercase())
    }

    /// Words from `text` that are not in the dictionary, sorted and deduplicated.
    /// Ignores short words, stop words and all-caps acronyms.
    pub fn unknown_words(&self, text: &str) -> Vec<String> {
        let candidates: BTreeSet<&str> = text
            .split(|c: char| !c.is_alphabetic())
            .filter(|w| w.chars().count() > 2)
            .filter(|w| !STOP_WORDS.contains(&w.to_lowercase().as_str()))
            .filter(|w| !w.chars().all(|c| c.is_uppercase()))
            .collect();

        candidates
            .into_iter()
            .filter(|w| !self.contains(w))
            .map(str::to_string)
            .collect()
    }
}

pub fn count_pages(pdf: &[u8]) -> usize {
    PAGE_OBJECT_RE.find_iter(pdf).count()
}

/// Where the spelling dictionary comes from; loaded on every run so edits to
/// the known-words file apply without a restart.
#[derive(Debug, Clone)]
pub struct DictionarySource {
    pub words: PathBuf,
    pub known_words: Option<PathBuf>,
}

pub struct PdfCheck {
    max_bytes: u64,
    dictionary: Option<DictionarySource>,
}

impl PdfCheck {
    pub fn new(max_bytes: u64, dictionary: Option<DictionarySource>) -> Self {
        Self {
            max_bytes,
            dictionary,
        }
    }

    fn size_and_pages(&self, bytes: &[u8]) -> Vec<Finding> {
        let mut findings = Vec::new();
        let size = bytes.len() as u64;
        if size > self.max_bytes {
            findings.push(Finding::warning(
                FindingSource::Pdf,
                format!("File size is {:.2} MiB", size as f64 / 1024.0 / 1024.0),
            ));
        }
        let pages = count_pages(bytes);
        if pages > 1 {
            findings.push(Finding::warning(
                FindingSource::Pdf,
                format!("More than one page ({pages})"),
            ));
        }
        findings
    }

    async fn spelling(&self, bytes: Vec<u8>) -> Result<Vec<Finding>, BuildError> {
        let Some(source) = self.dictionary.clone() else {
            return Ok(vec![Finding::info(
                FindingSource::Pdf,
                "Spelling check skipped: no dictionary configured",
            )]);
        };

        // Text extraction and dictionary loading are CPU/IO bound; keep them off the runtime.
        let unknown = tokio::task::spawn_blocking(move || -> Result<Vec<String>, BuildError> {
            let dict = Dictionary::load(&source.words, source.known_words.as_deref()).map_err(
                |e| BuildError::CheckUnavailable {
                    check: "Spelling".to_string(),
                    reason: format!("{e:#}"),
                },
            )?;
            let text = pdf_extract::extract_text_from_mem(&bytes).map_err(|e| {
                BuildError::CheckUnavailable {
                    check: "Spelling".to_string(),
                    reason: format!("cannot extract PDF text: {e:?}"),
                }
            })?;
            Ok(dict.unknown_words(&text))
        })
        .await
        .map_err(|e| BuildError::CheckUnavailable {
            check: "Spelling".to_string(),
            reason: e.to_string(),
        })??;

        Ok(unknown
            .into_iter()
            .map(|w| Finding::warning(FindingSource::Pdf, format!("Possibly misspelled: {w}")))
            .collect())
    }
}

#[async_trait]
impl QualityCheck for PdfCheck {
    fn name(&self) -> &str {
        "PDF"
    }

    fn source(&self) -> FindingSource {
        FindingSource::Pdf
    }

    async fn check(&self, input: &CheckInput<'_>) -> Result<Vec<Finding>, BuildError> {
        let Some(path) = input.pdf_path else {
            return Ok(Vec::new());
        };
        let bytes = tokio::fs::read(path)
            .await
            .map_err(|e| BuildError::io(path, e))?;

        let mut findings = self.size_and_pages(&bytes);
        match self.spelling(bytes).await {
            Ok(found) => findings.extend(found),
            Err(e) => findings.push(Finding::warning(FindingSource::Pdf, e.to_string())),
        }
        Ok(findings)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::ProfileId;
    use tempfile::TempDir;

    const TWO_PAGE_SKELETON: &[u8] = b"%PDF-1.4\n1 0 obj << /Type /Catalog /Pages 2 0 R >> endobj\n\
        2 0 obj << /Type /Pages /Kids [3 0 R 4 0 R] /Count 2 >> endobj\n\
        3 0 obj << /Type /Page /Parent 2 0 R >> endobj\n\
        4 0 obj << /Type/Page /Parent 2 0 R >> endobj\n%%EOF";

    #[test]
    fn test_count_pages_ignores_page_tree() {
        assert_eq!(count_pages(TWO_PAGE_SKELETON), 2);
        assert_eq!(count_pages(b"/Type /Pages"), 0);
    }

    #[test]
    fn test_size_and_page_findings() {
        let check = PdfCheck::new(10, None);
        let findings = check.size_and_pages(TWO_PAGE_SKELETON);
        let messages: Vec<_> = findings.iter().map(|f| f.message.clone()).collect();
        assert!(messages[0].starts_with("File size is 0.00 MiB"));
        assert_eq!(messages[1], "More than one page (2)");
    }

    #[test]
    fn test_unknown_words() {
        let dict = Dictionary::from_words(["rust", "engineer", "built", "systems"]);
        let unknown = dict.unknown_words("Rust engineer. Bulit systems and the AWS stack, 2020");
        assert_eq!(unknown, vec!["Bulit".to_string(), "stack".to_string()]);
    }

    #[test]
    fn test_dictionary_load_merges_known_words() {
        let dir = TempDir::new().unwrap();
        let words = dir.path().join("words.txt");
        let known = dir.path().join("known_words.txt");
        std::fs::write(&words, "alpha\nbeta\n").unwrap();
        std::fs::write(&known, "Kubernetes\n\n").unwrap();

        let dict = Dictionary::load(&words, Some(&known)).unwrap();
        assert!(dict.contains("Alpha"));
        assert!(dict.contains("kubernetes"));
        assert!(!dict.contains("gamma"));

        assert!(Dictionary::load(&dir.path().join("missing.txt"), None).is_err());
    }

    #[tokio::test]
    async fn test_missing_dictionary_is_reported_not_fatal() {
        let dir = TempDir::new().unwrap();
        let pdf = dir.path().join("cv.pdf");
        std::fs::write(&pdf, TWO_PAGE_SKELETON).unwrap();
        let check = PdfCheck::new(
            DEFAULT_MAX_PDF_BYTES,
            Some(DictionarySource {
                words: dir.path().join("missing-words.txt"),
                known_words: None,
            }),
        );
        let id = ProfileId::from("alice");
        let input = CheckInput {
            id: &id,
            data: None,
            html_path: None,
            pdf_path: Some(&pdf),
        };

        let findings = check.check(&input).await.unwrap();
        assert_eq!(findings[0].message, "More than one page (2)");
        assert!(findings[1].message.starts_with("Spelling check unavailable"));
    }

    #[tokio::test]
    async fn test_no_dictionary_configured_is_info() {
        let check = PdfCheck::new(DEFAULT_MAX_PDF_BYTES, None);
        let findings = check.spelling(Vec::new()).await.unwrap();
        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].severity, super::super::Severity::Info);
    }
}
