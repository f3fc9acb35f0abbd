//! Page processing pipeline
//!
//! Provides a clean API for the per-page text-layer pipeline, separating
//! business logic from CLI handling.
//!
//! ## Processing Steps
//!
//! 1. Decode the page image
//! 2. Estimate skew (optional)
//! 3. Fetch recognized words (with retries)
//! 4. Validate words
//! 5. Read page geometry
//! 6. Place words in page space
//! 7. Compose the text layer
//! 8. Write the page and the plain-text sidecar

use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{info, instrument, warn};

use crate::deskew::{DeskewAlgorithm, DeskewError, DeskewOptions, SkewDetection, SkewEstimator};
use crate::deskew::{
    DEFAULT_ANGLE_STEP, DEFAULT_MAX_ANGLE, DEFAULT_MAX_WORKING_SIDE, DEFAULT_NOISE_RADIUS,
};
use crate::geometry::{place_all, Size};
use crate::glyphs::{GlyphError, GlyphWidths, TrueTypeWidths, UniformWidths};
use crate::pdf_reader::{LopdfReader, PdfReaderError};
use crate::recognition::{
    extract_words, RecognitionError, RecognitionFormat, RecognitionOutcome, ResilientSource,
    RetryPolicy, WordSource, DEFAULT_ATTEMPTS, DEFAULT_MULTIPLIER,
};
use crate::text_layer::{
    commit, compose, stage_bytes, stage_document, ComposeOptions, CompositionError,
};

/// Image extensions picked up by [`discover_jobs`]
pub const IMAGE_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "tif", "tiff"];

/// Pipeline processing error
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Input not found: {0}")]
    InputNotFound(PathBuf),

    #[error("Skew estimation failed: {0}")]
    Deskew(#[from] DeskewError),

    #[error("Recognition failed: {0}")]
    Recognition(#[from] RecognitionError),

    #[error("PDF read failed: {0}")]
    PdfRead(#[from] PdfReaderError),

    #[error("Text layer composition failed: {0}")]
    Composition(#[from] CompositionError),

    #[error("Font error: {0}")]
    Glyph(#[from] GlyphError),

    #[error("Thread pool error: {0}")]
    ThreadPool(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, PipelineError>;

// ============================================================
// Configuration
// ============================================================

/// Pipeline configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Estimate page skew
    pub skew: bool,
    /// Skew detection algorithm
    pub skew_algorithm: DeskewAlgorithm,
    /// Projection sweep range (degrees)
    pub max_angle: f64,
    /// Projection sweep step (degrees)
    pub angle_step: f64,
    /// Longest side of the skew analysis image
    pub max_working_side: u32,
    /// Noise removal radius for skew analysis
    pub noise_radius: u8,
    /// Text render mode 3 (invisible)
    pub render_invisible: bool,
    /// Draw word outlines instead of text
    pub show_boxes: bool,
    /// TrueType font for glyph widths (None = uniform widths)
    #[serde(default)]
    pub font: Option<PathBuf>,
    /// Layout of recognition documents
    #[serde(default)]
    pub recognition_format: RecognitionFormat,
    /// Attempts per recognition fetch
    pub retry_attempts: u32,
    /// First retry delay in milliseconds
    pub retry_base_delay_ms: u64,
    /// Retry delay multiplier
    pub retry_multiplier: f64,
    /// Thread count (None = auto)
    pub threads: Option<usize>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            skew: true,
            skew_algorithm: DeskewAlgorithm::default(),
            max_angle: DEFAULT_MAX_ANGLE,
            angle_step: DEFAULT_ANGLE_STEP,
            max_working_side: DEFAULT_MAX_WORKING_SIDE,
            noise_radius: DEFAULT_NOISE_RADIUS,
            render_invisible: true,
            show_boxes: false,
            font: None,
            recognition_format: RecognitionFormat::default(),
            retry_attempts: DEFAULT_ATTEMPTS,
            retry_base_delay_ms: 1000,
            retry_multiplier: DEFAULT_MULTIPLIER,
            threads: None,
        }
    }
}

impl PipelineConfig {
    /// Convert to JSON string for logging
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| "{}".to_string())
    }

    /// Builder pattern: enable or disable skew estimation
    #[must_use]
    pub fn with_skew(mut self, enabled: bool) -> Self {
        self.skew = enabled;
        self
    }

    #[must_use]
    pub fn with_skew_algorithm(mut self, algorithm: DeskewAlgorithm) -> Self {
        self.skew_algorithm = algorithm;
        self
    }

    /// Builder pattern: draw outlines instead of text
    #[must_use]
    pub fn with_show_boxes(mut self, show_boxes: bool) -> Self {
        self.show_boxes = show_boxes;
        self
    }

    #[must_use]
    pub fn with_font(mut self, font: impl Into<PathBuf>) -> Self {
        self.font = Some(font.into());
        self
    }

    #[must_use]
    pub fn with_recognition_format(mut self, format: RecognitionFormat) -> Self {
        self.recognition_format = format;
        self
    }

    /// Builder pattern: set recognition attempts (at least one)
    #[must_use]
    pub fn with_retry_attempts(mut self, attempts: u32) -> Self {
        self.retry_attempts = attempts.max(1);
        self
    }

    /// Builder pattern: set first retry delay
    #[must_use]
    pub fn with_retry_delay(mut self, delay: Duration) -> Self {
        self.retry_base_delay_ms = delay.as_millis().min(u64::MAX as u128) as u64;
        self
    }

    /// Builder pattern: set thread count
    #[must_use]
    pub fn with_threads(mut self, threads: usize) -> Self {
        self.threads = Some(threads);
        self
    }

    /// Skew estimator options
    pub fn deskew_options(&self) -> DeskewOptions {
        DeskewOptions::builder()
            .algorithm(self.skew_algorithm)
            .max_angle(self.max_angle)
            .angle_step(self.angle_step)
            .max_working_side(self.max_working_side)
            .noise_radius(self.noise_radius)
            .build()
    }

    /// Composer options
    pub fn compose_options(&self) -> ComposeOptions {
        ComposeOptions {
            render_invisible: self.render_invisible,
            show_boxes: self.show_boxes,
        }
    }

    /// Retry policy for recognition sources
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            attempts: self.retry_attempts.max(1),
            base_delay: Duration::from_millis(self.retry_base_delay_ms),
            multiplier: self.retry_multiplier,
        }
    }
}

// ============================================================
// Jobs and reports
// ============================================================

/// Where a page's recognized words come from
#[derive(Debug, Clone)]
pub enum PageRecognition {
    /// Stored recognition document, parsed with the configured format
    File(PathBuf),
    /// Result already in memory
    Inline(RecognitionOutcome),
}

impl PageRecognition {
    fn source(&self, format: RecognitionFormat) -> Box<dyn WordSource> {
        match self {
            PageRecognition::File(path) => format.source(path.clone()),
            PageRecognition::Inline(outcome) => Box::new(outcome.clone()),
        }
    }
}

/// Everything needed to process one page
#[derive(Debug, Clone)]
pub struct PageJob {
    /// Page image the recognizer saw
    pub image: PathBuf,
    /// PDF holding the original page
    pub page_pdf: PathBuf,
    /// 0-indexed page within `page_pdf`
    pub page_index: usize,
    pub recognition: PageRecognition,
    /// Output PDF path
    pub output_pdf: PathBuf,
    /// Plain-text sidecar path (None = no sidecar)
    pub output_text: Option<PathBuf>,
}

impl PageJob {
    /// Job with a recognition file; the sidecar goes next to the output
    pub fn new(
        image: impl Into<PathBuf>,
        page_pdf: impl Into<PathBuf>,
        recognition: impl Into<PathBuf>,
        output_pdf: impl Into<PathBuf>,
    ) -> Self {
        let output_pdf = output_pdf.into();
        Self {
            image: image.into(),
            page_pdf: page_pdf.into(),
            page_index: 0,
            recognition: PageRecognition::File(recognition.into()),
            output_text: Some(output_pdf.with_extension("txt")),
            output_pdf,
        }
    }

    #[must_use]
    pub fn with_page_index(mut self, index: usize) -> Self {
        self.page_index = index;
        self
    }

    #[must_use]
    pub fn with_recognition(mut self, recognition: PageRecognition) -> Self {
        self.recognition = recognition;
        self
    }

    #[must_use]
    pub fn with_output_text(mut self, path: Option<PathBuf>) -> Self {
        self.output_text = path;
        self
    }
}

/// Per-page result summary
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PageReport {
    /// Skew estimate used for placement
    pub skew: SkewDetection,
    /// Words that passed validation
    pub words: usize,
    /// Words drawn on the page
    pub placed: usize,
    /// Words dropped during placement or composition
    pub dropped: usize,
    /// Raw words rejected during validation
    pub rejected: usize,
    /// Confidences clamped into [0, 1]
    pub clamped: usize,
    /// Recognizer gave no result; the page was copied unchanged
    pub no_recognition_result: bool,
    /// Processing time in seconds
    pub elapsed_seconds: f64,
}

// ============================================================
// Processor
// ============================================================

/// Processes pages; shared read-only between workers
pub struct PageProcessor {
    config: PipelineConfig,
    widths: Box<dyn GlyphWidths>,
}

impl PageProcessor {
    /// Create a processor, loading the configured font if any
    pub fn new(config: PipelineConfig) -> Result<Self> {
        let widths: Box<dyn GlyphWidths> = match &config.font {
            Some(path) => Box::new(TrueTypeWidths::from_file(path)?),
            None => Box::new(UniformWidths::default()),
        };
        Ok(Self::with_widths(config, widths))
    }

    /// Create a processor with an explicit width table
    pub fn with_widths(config: PipelineConfig, widths: Box<dyn GlyphWidths>) -> Self {
        Self { config, widths }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Process one page end to end.
    ///
    /// Outputs are only written once every step succeeded. A page without a
    /// recognition result is copied unchanged with an empty sidecar.
    #[instrument(skip_all, fields(image = %job.image.display()))]
    pub fn process(&self, job: &PageJob) -> Result<PageReport> {
        let started = Instant::now();

        if !job.image.exists() {
            return Err(DeskewError::ImageNotFound(job.image.clone()).into());
        }
        let image =
            image::open(&job.image).map_err(|e| DeskewError::ImageDecode(e.to_string()))?;
        let skew = if self.config.skew {
            SkewEstimator::estimate(&image, &self.config.deskew_options())
        } else {
            SkewDetection::blank()
        };
        let image_size = Size::new(f64::from(image.width()), f64::from(image.height()));
        drop(image);

        let source = ResilientSource::new(
            job.recognition.source(self.config.recognition_format),
            self.config.retry_policy(),
        );
        let outcome = source.fetch()?;
        let extraction = extract_words(outcome.raw_words());

        if !job.page_pdf.exists() {
            return Err(PdfReaderError::FileNotFound(job.page_pdf.clone()).into());
        }
        let original = std::fs::read(&job.page_pdf).map_err(PdfReaderError::from)?;
        let reader = LopdfReader::from_bytes(&original)?;
        let page = reader.get_page(job.page_index)?.clone();
        let geometry = page.geometry()?;

        // Boxes are relative to the page size the recognizer reported
        let recognized_size = outcome
            .dimensions()
            .map(|(w, h)| Size::new(w, h))
            .unwrap_or(image_size);
        let placements = place_all(&extraction.words, recognized_size, skew.angle, &geometry);

        let mut document = reader.into_document();
        let composed = compose(
            &mut document,
            page.id,
            &placements.placed,
            &*self.widths,
            &self.config.compose_options(),
        )?;

        // Both outputs are staged first so a failed write leaves neither behind
        let mut staged = vec![if composed.modified {
            stage_document(&mut document, &job.output_pdf)?
        } else {
            stage_bytes(&original, &job.output_pdf)?
        }];
        if let Some(text_path) = &job.output_text {
            staged.push(stage_bytes(extraction.sidecar_text().as_bytes(), text_path)?);
        }
        commit(staged)?;

        let report = PageReport {
            skew,
            words: extraction.words.len(),
            placed: composed.words_drawn,
            dropped: placements.dropped + composed.words_skipped,
            rejected: extraction.rejected,
            clamped: extraction.clamped,
            no_recognition_result: outcome.is_no_result(),
            elapsed_seconds: started.elapsed().as_secs_f64(),
        };

        info!(
            skew = report.skew.angle,
            words = report.words,
            placed = report.placed,
            dropped = report.dropped,
            rejected = report.rejected,
            no_result = report.no_recognition_result,
            "page done"
        );

        Ok(report)
    }

    /// Process pages in parallel.
    ///
    /// Results are returned in job order; one failing page does not stop
    /// the others. `progress` is called with (completed, total).
    pub fn process_batch<P>(
        &self,
        jobs: &[PageJob],
        progress: Option<&P>,
    ) -> Result<Vec<Result<PageReport>>>
    where
        P: Fn(usize, usize) + Sync,
    {
        let total = jobs.len();
        if total == 0 {
            return Ok(vec![]);
        }

        let mut builder = rayon::ThreadPoolBuilder::new();
        if let Some(threads) = self.config.threads.filter(|&t| t > 0) {
            builder = builder.num_threads(threads);
        }
        let pool = builder
            .build()
            .map_err(|e| PipelineError::ThreadPool(e.to_string()))?;

        let completed = AtomicUsize::new(0);
        let results: Vec<Result<PageReport>> = pool.install(|| {
            jobs.par_iter()
                .map(|job| {
                    let result = self.process(job);
                    if let Err(e) = &result {
                        warn!(image = %job.image.display(), "page failed: {}", e);
                    }
                    let done = completed.fetch_add(1, Ordering::Relaxed) + 1;
                    if let Some(cb) = progress {
                        cb(done, total);
                    }
                    result
                })
                .collect()
        });

        Ok(results)
    }
}

// ============================================================
// Job discovery
// ============================================================

/// Build jobs from `<stem>.<image>` + `<stem>.pdf` + `<stem>.json` triples.
///
/// Outputs go to `out_dir/<stem>.pdf` and `out_dir/<stem>.txt`. Images
/// without a matching PDF or recognition document are skipped.
pub fn discover_jobs(dir: &Path, out_dir: &Path) -> Result<Vec<PageJob>> {
    if !dir.is_dir() {
        return Err(PipelineError::InputNotFound(dir.to_path_buf()));
    }

    let mut images: Vec<PathBuf> = std::fs::read_dir(dir)?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|path| path.is_file() && is_page_image(path))
        .collect();
    images.sort();

    let mut jobs = Vec::with_capacity(images.len());
    for image in images {
        let Some(stem) = image.file_stem().map(|s| s.to_os_string()) else {
            continue;
        };
        let pdf = image.with_extension("pdf");
        let json = image.with_extension("json");
        if !pdf.is_file() || !json.is_file() {
            warn!(image = %image.display(), "skipping image without page PDF or recognition JSON");
            continue;
        }
        let output = out_dir.join(&stem).with_extension("pdf");
        jobs.push(PageJob::new(image, pdf, json, output));
    }
    Ok(jobs)
}

fn is_page_image(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| IMAGE_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()))
        .unwrap_or(false)
}
