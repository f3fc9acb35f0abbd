//! textlayer-pdf - invisible, searchable text layers for scanned PDF pages
//!
//! Takes a page image, the words a text recognizer found on it and the
//! original PDF page, and writes the page back with every word drawn as
//! invisible text exactly over its image.
//!
//! # Features
//!
//! - **Skew Estimation** ([`deskew`]) - Measure page tilt from the image
//! - **Recognition Results** ([`recognition`]) - Load and validate recognized words
//! - **Geometry** ([`geometry`]) - Map word polygons from pixels to PDF user space
//! - **Glyph Widths** ([`glyphs`]) - Advance widths for stretching text runs
//! - **Text Layer** ([`text_layer`]) - Merge the text layer into an existing page
//! - **Pipeline** ([`pipeline`]) - Per-page and parallel batch processing
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use textlayer_pdf::{PageJob, PageProcessor, PipelineConfig};
//!
//! let processor = PageProcessor::new(PipelineConfig::default()).unwrap();
//! let job = PageJob::new("page.png", "page.pdf", "page.json", "out/page.pdf");
//! let report = processor.process(&job).unwrap();
//! println!("placed {} words", report.placed);
//! ```
//!
//! ## Placing words by hand
//!
//! ```rust
//! use textlayer_pdf::{place, PageGeometry, RecognizedWord, Size};
//!
//! let word = RecognizedWord::new(
//!     vec![(100.0, 100.0), (300.0, 100.0), (300.0, 150.0), (100.0, 150.0)],
//!     "Hello",
//!     1.0,
//! )
//! .unwrap();
//! let page = PageGeometry::new(612.0, 792.0, 0).unwrap();
//! let outcome = place(&word, Size::new(1000.0, 800.0), 0.0, &page);
//! let placement = outcome.placement().unwrap();
//! assert!((placement.width - 122.4).abs() < 1e-9);
//! ```
//!
//! # Architecture
//!
//! ```text
//! Image -> Skew Estimation ----------------.
//!                                           v
//! Recognition JSON -> Word Validation -> Placement -> Text Layer -> PDF + .txt
//!                                           ^
//! Original PDF page -> Page Geometry -------'
//! ```

pub mod cli;
pub mod config;
pub mod deskew;
pub mod geometry;
pub mod glyphs;
pub mod logging;
pub mod pdf_reader;
pub mod pipeline;
pub mod recognition;
pub mod text_layer;
pub mod util;

#[cfg(test)]
pub(crate) mod test_fixtures;

// Re-exports for convenience
pub use cli::{
    create_page_progress_bar, AlgorithmArg, BatchArgs, Cli, Commands, ComposeArgs, ExitCode,
    FormatArg, LayerArgs, SkewArgs,
};
pub use config::{CliOverrides, Config, ConfigError};
pub use deskew::{
    estimate_skew, DeskewAlgorithm, DeskewError, DeskewOptions, DeskewOptionsBuilder,
    SkewDetection, SkewEstimator,
};
pub use geometry::{
    place, place_all, DropReason, GeometryError, PageGeometry, PlaceOutcome, Placement,
    Placements, Size,
};
pub use glyphs::{GlyphError, GlyphWidths, TrueTypeWidths, UniformWidths};
pub use pdf_reader::{LopdfReader, PdfPage, PdfReaderError};
pub use pipeline::{
    discover_jobs, PageJob, PageProcessor, PageRecognition, PageReport, PipelineConfig,
    PipelineError,
};
pub use recognition::{
    extract_words, AzureReadJson, Extraction, RawPage, RawWord, RecognitionError,
    RecognitionFormat, RecognitionOutcome, RecognizedWord, ResilientSource, RetryPolicy,
    WordListJson, WordSource,
};
pub use text_layer::{
    commit, compose, stage_bytes, stage_document, write_atomic, ComposeOptions, ComposeReport,
    CompositionError, StagedFile,
};
