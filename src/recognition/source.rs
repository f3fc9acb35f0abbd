//! Recognition sources
//!
//! Adapters that produce one page of raw words. Each source is constructed
//! with everything it needs (paths, credentials of a remote client, ...) so
//! pages can be processed independently.

use super::{RawPage, RawWord, RecognitionError, RecognitionOutcome, Result, RetryPolicy};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Capability of producing one page of raw recognized words
pub trait WordSource: Send + Sync {
    /// Short description used in log messages
    fn describe(&self) -> String;

    /// Fetch the page's words
    fn fetch(&self) -> Result<RecognitionOutcome>;
}

/// Already available outcome, e.g. from an in-process recognizer
impl WordSource for RecognitionOutcome {
    fn describe(&self) -> String {
        "in-memory result".to_string()
    }

    fn fetch(&self) -> Result<RecognitionOutcome> {
        Ok(self.clone())
    }
}

// ============================================================
// Shared JSON helpers
// ============================================================

/// Polygon as nested pairs or as a flat coordinate list
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum PolygonRepr {
    Pairs(Vec<[f64; 2]>),
    Flat(Vec<f64>),
}

impl PolygonRepr {
    /// Vertices; a flat list with an odd length yields no points
    fn into_points(self) -> Vec<(f64, f64)> {
        match self {
            PolygonRepr::Pairs(pairs) => pairs.into_iter().map(|[x, y]| (x, y)).collect(),
            PolygonRepr::Flat(flat) if flat.len() % 2 == 0 => {
                flat.chunks_exact(2).map(|c| (c[0], c[1])).collect()
            }
            PolygonRepr::Flat(_) => Vec::new(),
        }
    }
}

impl Default for PolygonRepr {
    fn default() -> Self {
        PolygonRepr::Flat(Vec::new())
    }
}

fn read_document(path: &Path) -> Result<String> {
    if !path.exists() {
        return Err(RecognitionError::NotFound(path.to_path_buf()));
    }
    Ok(std::fs::read_to_string(path)?)
}

// ============================================================
// Document Intelligence "prebuilt-read" results
// ============================================================

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AzureEnvelope {
    status: Option<String>,
    analyze_result: Option<AzureAnalyzeResult>,
}

#[derive(Debug, Default, Deserialize)]
struct AzureAnalyzeResult {
    #[serde(default)]
    pages: Vec<AzurePage>,
}

#[derive(Debug, Deserialize)]
struct AzurePage {
    width: Option<f64>,
    height: Option<f64>,
    unit: Option<String>,
    #[serde(default)]
    words: Vec<AzureWord>,
}

#[derive(Debug, Deserialize)]
struct AzureWord {
    #[serde(default)]
    content: String,
    #[serde(default)]
    polygon: PolygonRepr,
    confidence: Option<f64>,
}

/// Stored analyze result of the Document Intelligence read model.
///
/// Only the first page is used; a result whose status is not `succeeded`
/// is reported as [`RecognitionOutcome::NoResult`].
#[derive(Debug, Clone)]
pub struct AzureReadJson {
    path: PathBuf,
}

impl AzureReadJson {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Parse an analyze result document (full envelope or bare `analyzeResult`)
    pub fn parse(json: &str) -> Result<RecognitionOutcome> {
        let value: serde_json::Value = serde_json::from_str(json)?;

        let analyze = if value.get("analyzeResult").is_some() || value.get("status").is_some() {
            let envelope: AzureEnvelope = serde_json::from_value(value)?;
            if let Some(status) = envelope.status.as_deref() {
                if !status.eq_ignore_ascii_case("succeeded") {
                    debug!(status, "analyze operation did not succeed");
                    return Ok(RecognitionOutcome::NoResult);
                }
            }
            envelope.analyze_result.ok_or_else(|| {
                RecognitionError::InvalidDocument("missing analyzeResult".to_string())
            })?
        } else if value.get("pages").is_some() {
            serde_json::from_value(value)?
        } else {
            return Err(RecognitionError::InvalidDocument(
                "expected analyzeResult or pages".to_string(),
            ));
        };

        let Some(first) = analyze.pages.into_iter().next() else {
            return Ok(RecognitionOutcome::Page(RawPage::default()));
        };

        // Polygons share the page's unit, so the reported size normalizes them
        // whether it is pixels or inches
        debug!(unit = first.unit.as_deref().unwrap_or("pixel"), "analyze result page");

        let words = first
            .words
            .into_iter()
            .map(|w| RawWord::new(w.polygon.into_points(), w.content, w.confidence))
            .collect();

        Ok(RecognitionOutcome::Page(RawPage {
            width: first.width,
            height: first.height,
            words,
        }))
    }
}

impl WordSource for AzureReadJson {
    fn describe(&self) -> String {
        format!("analyze result {}", self.path.display())
    }

    fn fetch(&self) -> Result<RecognitionOutcome> {
        Self::parse(&read_document(&self.path)?)
    }
}

// ============================================================
// Generic word list
// ============================================================

#[derive(Debug, Deserialize)]
struct WordListDocument {
    width: Option<f64>,
    height: Option<f64>,
    words: Vec<WordListEntry>,
}

#[derive(Debug, Deserialize)]
struct WordListEntry {
    polygon: PolygonRepr,
    #[serde(alias = "content")]
    text: String,
    confidence: Option<f64>,
}

/// Recognizer-neutral word list:
/// `{ "width"?, "height"?, "words": [{ "polygon", "text", "confidence"? }] }`
#[derive(Debug, Clone)]
pub struct WordListJson {
    path: PathBuf,
}

impl WordListJson {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn parse(json: &str) -> Result<RecognitionOutcome> {
        let doc: WordListDocument = serde_json::from_str(json)?;
        let words = doc
            .words
            .into_iter()
            .map(|w| RawWord::new(w.polygon.into_points(), w.text, w.confidence))
            .collect();

        Ok(RecognitionOutcome::Page(RawPage {
            width: doc.width,
            height: doc.height,
            words,
        }))
    }
}

impl WordSource for WordListJson {
    fn describe(&self) -> String {
        format!("word list {}", self.path.display())
    }

    fn fetch(&self) -> Result<RecognitionOutcome> {
        Self::parse(&read_document(&self.path)?)
    }
}

// ============================================================
// Format selection
// ============================================================

/// Layout of a stored recognition document
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RecognitionFormat {
    /// Decide from the document's top-level keys
    #[default]
    Auto,
    /// Document Intelligence analyze result
    AzureRead,
    /// Generic word list
    WordList,
}

impl RecognitionFormat {
    /// Parse a document in this format
    pub fn parse(self, json: &str) -> Result<RecognitionOutcome> {
        match self {
            RecognitionFormat::AzureRead => AzureReadJson::parse(json),
            RecognitionFormat::WordList => WordListJson::parse(json),
            RecognitionFormat::Auto => {
                let value: serde_json::Value = serde_json::from_str(json)?;
                if value.get("words").is_some() {
                    WordListJson::parse(json)
                } else {
                    AzureReadJson::parse(json)
                }
            }
        }
    }

    /// File-backed source for this format
    pub fn source(self, path: impl Into<PathBuf>) -> Box<dyn WordSource> {
        let path = path.into();
        match self {
            RecognitionFormat::AzureRead => Box::new(AzureReadJson::new(path)),
            RecognitionFormat::WordList => Box::new(WordListJson::new(path)),
            RecognitionFormat::Auto => Box::new(AutoJson { path }),
        }
    }
}

struct AutoJson {
    path: PathBuf,
}

impl WordSource for AutoJson {
    fn describe(&self) -> String {
        format!("recognition result {}", self.path.display())
    }

    fn fetch(&self) -> Result<RecognitionOutcome> {
        RecognitionFormat::Auto.parse(&read_document(&self.path)?)
    }
}

// ============================================================
// Retrying wrapper
// ============================================================

/// Applies a [`RetryPolicy`] to a source.
///
/// Transient failures are retried; once attempts are exhausted the page is
/// reported as [`RecognitionOutcome::NoResult`] instead of an error.
/// Permanent failures (missing or malformed documents) are returned as is.
pub struct ResilientSource<S> {
    inner: S,
    policy: RetryPolicy,
}

impl<S: WordSource> ResilientSource<S> {
    pub fn new(inner: S, policy: RetryPolicy) -> Self {
        Self { inner, policy }
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }
}

impl<S: WordSource> WordSource for ResilientSource<S> {
    fn describe(&self) -> String {
        self.inner.describe()
    }

    fn fetch(&self) -> Result<RecognitionOutcome> {
        let result = self.policy.run_while(
            |_| match self.inner.fetch()? {
                RecognitionOutcome::NoResult => Err(RecognitionError::NoResult),
                outcome => Ok(outcome),
            },
            RecognitionError::is_transient,
        );

        match result {
            Ok(outcome) => Ok(outcome),
            Err(e) if e.is_transient() => {
                warn!(source = %self.inner.describe(), "no recognition result: {}", e);
                Ok(RecognitionOutcome::NoResult)
            }
            Err(e) => Err(e),
        }
    }
}

impl WordSource for Box<dyn WordSource> {
    fn describe(&self) -> String {
        (**self).describe()
    }

    fn fetch(&self) -> Result<RecognitionOutcome> {
        (**self).fetch()
    }
}
