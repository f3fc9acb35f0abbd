//! Recognition result model
//!
//! Validated in-memory representation of recognized words, the extraction
//! step that filters raw recognizer records, and the adapters that read
//! recognizer output.
//!
//! # Example
//!
//! ```rust
//! use textlayer_pdf::recognition::{extract_words, RawWord};
//!
//! let raw = vec![RawWord::new(
//!     vec![(100.0, 100.0), (300.0, 100.0), (300.0, 150.0), (100.0, 150.0)],
//!     "Hello",
//!     Some(0.98),
//! )];
//!
//! let extraction = extract_words(&raw);
//! assert_eq!(extraction.words.len(), 1);
//! assert_eq!(extraction.sidecar_text(), "Hello");
//! ```

mod retry;
mod source;

pub use retry::{RetryPolicy, DEFAULT_ATTEMPTS, DEFAULT_BASE_DELAY, DEFAULT_MULTIPLIER};
pub use source::{
    AzureReadJson, RecognitionFormat, ResilientSource, WordListJson, WordSource,
};

use std::path::PathBuf;
use thiserror::Error;
use tracing::debug;

// ============================================================
// Constants
// ============================================================

/// Minimum number of polygon vertices for a usable word
pub const MIN_POLYGON_POINTS: usize = 4;

/// Confidence assumed when the recognizer does not report one
pub const DEFAULT_CONFIDENCE: f64 = 1.0;

// ============================================================
// Error Types
// ============================================================

/// Recognition source error types
#[derive(Debug, Error)]
pub enum RecognitionError {
    #[error("Recognition result not found: {0}")]
    NotFound(PathBuf),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON parse error: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Invalid recognition document: {0}")]
    InvalidDocument(String),

    #[error("Recognition produced no result")]
    NoResult,
}

impl RecognitionError {
    /// Whether retrying the same request may succeed
    pub fn is_transient(&self) -> bool {
        matches!(self, RecognitionError::Io(_) | RecognitionError::NoResult)
    }
}

pub type Result<T> = std::result::Result<T, RecognitionError>;

/// Why a raw record was refused at extraction
#[derive(Debug, Clone, PartialEq, Error)]
pub enum RejectReason {
    #[error("polygon has {0} points, need at least 4")]
    TooFewPoints(usize),

    #[error("empty text")]
    EmptyText,

    #[error("non-finite polygon coordinate")]
    NonFiniteCoordinate,
}

// ============================================================
// Raw Records
// ============================================================

/// Word record as reported by a recognizer, before validation
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct RawWord {
    /// Polygon vertices in recognizer pixel space
    pub polygon: Vec<(f64, f64)>,
    /// Recognized content
    pub text: String,
    /// Reported confidence, if any
    pub confidence: Option<f64>,
}

impl RawWord {
    pub fn new(polygon: Vec<(f64, f64)>, text: impl Into<String>, confidence: Option<f64>) -> Self {
        Self {
            polygon,
            text: text.into(),
            confidence,
        }
    }
}

/// One page of raw recognizer output
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawPage {
    /// Page width in the polygons' unit, when the recognizer reports it
    pub width: Option<f64>,
    /// Page height in the polygons' unit, when the recognizer reports it
    pub height: Option<f64>,
    /// Words in recognizer order
    pub words: Vec<RawWord>,
}

impl RawPage {
    /// Page without size information
    pub fn from_words(words: Vec<RawWord>) -> Self {
        Self {
            width: None,
            height: None,
            words,
        }
    }

    /// Reported page size, if both dimensions are usable
    pub fn dimensions(&self) -> Option<(f64, f64)> {
        match (self.width, self.height) {
            (Some(w), Some(h)) if w.is_finite() && h.is_finite() && w > 0.0 && h > 0.0 => {
                Some((w, h))
            }
            _ => None,
        }
    }
}

/// Result of asking a recognizer for one page
#[derive(Debug, Clone, PartialEq)]
pub enum RecognitionOutcome {
    /// Recognizer answered (possibly with zero words)
    Page(RawPage),
    /// Recognizer failed after exhausting its retries
    NoResult,
}

impl RecognitionOutcome {
    pub fn is_no_result(&self) -> bool {
        matches!(self, RecognitionOutcome::NoResult)
    }

    /// Raw words, empty for `NoResult`
    pub fn raw_words(&self) -> &[RawWord] {
        match self {
            RecognitionOutcome::Page(page) => &page.words,
            RecognitionOutcome::NoResult => &[],
        }
    }

    /// Reported image size, if any
    pub fn dimensions(&self) -> Option<(f64, f64)> {
        match self {
            RecognitionOutcome::Page(page) => page.dimensions(),
            RecognitionOutcome::NoResult => None,
        }
    }
}

// ============================================================
// Validated Model
// ============================================================

/// A validated recognized word
#[derive(Debug, Clone, PartialEq)]
pub struct RecognizedWord {
    polygon: Vec<(f64, f64)>,
    text: String,
    confidence: f64,
}

impl RecognizedWord {
    /// Validate and build a word.
    ///
    /// Confidence is clamped into [0, 1] (NaN becomes 0); everything else
    /// invalid is rejected.
    pub fn new(
        polygon: Vec<(f64, f64)>,
        text: impl Into<String>,
        confidence: f64,
    ) -> std::result::Result<Self, RejectReason> {
        let text = text.into();
        if polygon.len() < MIN_POLYGON_POINTS {
            return Err(RejectReason::TooFewPoints(polygon.len()));
        }
        if text.trim().is_empty() {
            return Err(RejectReason::EmptyText);
        }
        if polygon.iter().any(|(x, y)| !x.is_finite() || !y.is_finite()) {
            return Err(RejectReason::NonFiniteCoordinate);
        }

        Ok(Self {
            polygon,
            text,
            confidence: clamp_confidence(confidence),
        })
    }

    pub fn polygon(&self) -> &[(f64, f64)] {
        &self.polygon
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn confidence(&self) -> f64 {
        self.confidence
    }
}

fn clamp_confidence(value: f64) -> f64 {
    if value.is_nan() {
        0.0
    } else {
        value.clamp(0.0, 1.0)
    }
}

// ============================================================
// Extraction
// ============================================================

/// Validated words of one page plus diagnostics
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Extraction {
    /// Accepted words in recognizer order
    pub words: Vec<RecognizedWord>,
    /// Records refused at the boundary
    pub rejected: usize,
    /// Accepted records whose confidence had to be clamped
    pub clamped: usize,
}

impl Extraction {
    /// Plain-text sidecar: words joined by single spaces, in source order
    pub fn sidecar_text(&self) -> String {
        self.words
            .iter()
            .map(RecognizedWord::text)
            .collect::<Vec<_>>()
            .join(" ")
    }

    pub fn is_empty(&self) -> bool {
        self.words.is_empty()
    }
}

/// Filter one page of raw records, preserving their order
pub fn extract_words(raw: &[RawWord]) -> Extraction {
    let mut extraction = Extraction::default();

    for (index, record) in raw.iter().enumerate() {
        let confidence = record.confidence.unwrap_or(DEFAULT_CONFIDENCE);
        match RecognizedWord::new(record.polygon.clone(), record.text.clone(), confidence) {
            Ok(word) => {
                if word.confidence() != confidence {
                    extraction.clamped += 1;
                }
                extraction.words.push(word);
            }
            Err(reason) => {
                debug!(index, %reason, "rejected recognized word");
                extraction.rejected += 1;
            }
        }
    }

    extraction
}
