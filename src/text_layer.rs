//! Text-Layer Composer
//!
//! Turns placed words into a text-drawing content stream and merges it onto
//! an existing page without touching the page's own content.
//!
//! # Features
//!
//! - One `BT`/`ET` block per word, invisible (`3 Tr`) by default
//! - Horizontal scaling from glyph advances so each run spans its word
//! - Type0 font with a generated `/W` array and a `ToUnicode` CMap
//! - Debug mode drawing placement boxes instead of glyphs
//!
//! # Example
//!
//! ```rust,no_run
//! use textlayer_pdf::text_layer::{compose, write_atomic, ComposeOptions};
//! use textlayer_pdf::{LopdfReader, UniformWidths};
//! use std::path::Path;
//!
//! let reader = LopdfReader::new("page.pdf").unwrap();
//! let page_id = reader.get_page(0).unwrap().id;
//! let mut doc = reader.into_document();
//!
//! // Placements come from geometry::place_all
//! let report = compose(&mut doc, page_id, &[], &UniformWidths::default(), &ComposeOptions::default()).unwrap();
//! assert!(!report.modified);
//! write_atomic(&mut doc, Path::new("out.pdf")).unwrap();
//! ```

use crate::geometry::Placement;
use crate::glyphs::{encodable, GlyphWidths};
use crate::pdf_reader::{inherited_attribute, resolve};
use crate::recognition::RecognizedWord;
use crate::util::parent_dir;
use lopdf::content::{Content, Operation};
use lopdf::{dictionary, Dictionary, Document, Object, ObjectId, Stream, StringFormat};
use std::collections::BTreeMap;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, warn};

// ============================================================
// Constants
// ============================================================

/// Prefix of the font resource name added to the page
const FONT_RESOURCE_PREFIX: &str = "FTxtLayer";

/// Entries per `beginbfchar` block (PDF limit)
const CMAP_CHUNK: usize = 100;

/// Stroke width of debug boxes, in points
const BOX_LINE_WIDTH: f64 = 0.5;

// ============================================================
// Error Types
// ============================================================

/// Composition error types
#[derive(Debug, Error)]
pub enum CompositionError {
    #[error("Page not found: {0:?}")]
    PageNotFound(ObjectId),

    #[error("Malformed page: {0}")]
    MalformedPage(String),

    #[error("PDF error: {0}")]
    Pdf(#[from] lopdf::Error),

    #[error("Content encoding error: {0}")]
    Encode(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, CompositionError>;

// ============================================================
// Options and Report
// ============================================================

/// Text layer options
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ComposeOptions {
    /// Draw text with rendering mode 3 (not painted)
    pub render_invisible: bool,
    /// Stroke placement boxes instead of drawing text
    pub show_boxes: bool,
}

impl Default for ComposeOptions {
    fn default() -> Self {
        Self {
            render_invisible: true,
            show_boxes: false,
        }
    }
}

impl ComposeOptions {
    /// Visible text, for checking alignment against the scan
    pub fn visible_text() -> Self {
        Self {
            render_invisible: false,
            ..Default::default()
        }
    }

    /// Placement boxes only
    pub fn debug_boxes() -> Self {
        Self {
            show_boxes: true,
            ..Default::default()
        }
    }
}

/// What a composition did to the page
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ComposeReport {
    /// Words drawn into the layer
    pub words_drawn: usize,
    /// Words with nothing measurable to draw
    pub words_skipped: usize,
    /// Font resource name added to the page
    pub font_resource: Option<String>,
    /// Whether the document was changed
    pub modified: bool,
}

// ============================================================
// Measurement
// ============================================================

/// Unscaled width of `text` at `font_size`, in page units
pub fn natural_width(text: &str, font_size: f64, widths: &dyn GlyphWidths) -> f64 {
    widths.run_advance(text) / 1000.0 * font_size
}

/// `Tz` operand making `text` span exactly `placement.width`
pub fn horizontal_scale(text: &str, placement: &Placement, widths: &dyn GlyphWidths) -> Option<f64> {
    let natural = natural_width(text, placement.height, widths);
    if !natural.is_finite() || natural <= 0.0 {
        return None;
    }
    let scale = 100.0 * placement.width / natural;
    scale.is_finite().then_some(scale)
}

/// Big-endian two-byte codes of the drawable characters
fn encode_text(text: &str) -> Vec<u8> {
    text.chars()
        .flat_map(|ch| (encodable(ch) as u16).to_be_bytes())
        .collect()
}

fn real(value: f64) -> Object {
    Object::Real(value as f32)
}

fn rotation_matrix(placement: &Placement) -> Vec<Object> {
    let (sin, cos) = placement.rotation.to_radians().sin_cos();
    vec![
        real(cos),
        real(sin),
        real(-sin),
        real(cos),
        real(placement.origin.0),
        real(placement.origin.1),
    ]
}

/// Red for low confidence through green for high
fn confidence_color(confidence: f64) -> [f64; 3] {
    let c = confidence.clamp(0.0, 1.0);
    [1.0 - c, c, 0.0]
}

// ============================================================
// Layer content
// ============================================================

struct Layer {
    operations: Vec<Operation>,
    used: BTreeMap<u16, char>,
    drawn: usize,
    skipped: usize,
}

fn build_layer(
    words: &[(Placement, &RecognizedWord)],
    font: &str,
    widths: &dyn GlyphWidths,
    options: &ComposeOptions,
) -> Layer {
    let mut layer = Layer {
        operations: vec![Operation::new("Q", vec![]), Operation::new("q", vec![])],
        used: BTreeMap::new(),
        drawn: 0,
        skipped: 0,
    };
    let render_mode = if options.render_invisible { 3 } else { 0 };

    for (placement, word) in words {
        if options.show_boxes {
            let [r, g, b] = confidence_color(word.confidence());
            layer.operations.extend([
                Operation::new("q", vec![]),
                Operation::new("cm", rotation_matrix(placement)),
                Operation::new("RG", vec![real(r), real(g), real(b)]),
                Operation::new("w", vec![real(BOX_LINE_WIDTH)]),
                Operation::new(
                    "re",
                    vec![0.into(), 0.into(), real(placement.width), real(placement.height)],
                ),
                Operation::new("S", vec![]),
                Operation::new("Q", vec![]),
            ]);
            layer.drawn += 1;
            continue;
        }

        let Some(scale) = horizontal_scale(word.text(), placement, widths) else {
            debug!(text = word.text(), "skipping word without measurable width");
            layer.skipped += 1;
            continue;
        };

        for ch in word.text().chars() {
            let ch = encodable(ch);
            layer.used.insert(ch as u16, ch);
        }

        layer.operations.extend([
            Operation::new("BT", vec![]),
            Operation::new(
                "Tf",
                vec![Object::Name(font.as_bytes().to_vec()), real(placement.height)],
            ),
            Operation::new("Tr", vec![Object::Integer(render_mode)]),
            Operation::new("Tz", vec![real(scale)]),
            Operation::new("Tm", rotation_matrix(placement)),
            Operation::new(
                "Tj",
                vec![Object::String(encode_text(word.text()), StringFormat::Hexadecimal)],
            ),
            Operation::new("ET", vec![]),
        ]);
        layer.drawn += 1;
    }

    layer.operations.push(Operation::new("Q", vec![]));
    layer
}

// ============================================================
// Font objects
// ============================================================

/// `/W` array grouping consecutive codes into runs
fn width_array(used: &BTreeMap<u16, char>, widths: &dyn GlyphWidths) -> Vec<Object> {
    let mut array = Vec::new();
    let mut run_start: Option<u16> = None;
    let mut run: Vec<Object> = Vec::new();
    let mut previous: Option<u16> = None;

    for (&code, &ch) in used {
        let contiguous = previous.is_some_and(|p| p.checked_add(1) == Some(code));
        if !contiguous {
            if let Some(start) = run_start.take() {
                array.push(Object::Integer(start as i64));
                array.push(Object::Array(std::mem::take(&mut run)));
            }
            run_start = Some(code);
        }
        run.push(real(widths.advance(ch)));
        previous = Some(code);
    }
    if let Some(start) = run_start {
        array.push(Object::Integer(start as i64));
        array.push(Object::Array(run));
    }
    array
}

/// ToUnicode CMap mapping each two-byte code to its character
fn to_unicode_cmap(used: &BTreeMap<u16, char>) -> String {
    let mut cmap = String::from(
        "/CIDInit /ProcSet findresource begin\n\
         12 dict begin\n\
         begincmap\n\
         /CIDSystemInfo << /Registry (Adobe) /Ordering (UCS) /Supplement 0 >> def\n\
         /CMapName /Adobe-Identity-UCS def\n\
         /CMapType 2 def\n\
         1 begincodespacerange\n\
         <0000> <FFFF>\n\
         endcodespacerange\n",
    );

    let entries: Vec<(&u16, &char)> = used.iter().collect();
    for chunk in entries.chunks(CMAP_CHUNK) {
        cmap.push_str(&format!("{} beginbfchar\n", chunk.len()));
        for (code, ch) in chunk {
            let mut units = [0u16; 2];
            let utf16: String = ch
                .encode_utf16(&mut units)
                .iter()
                .map(|u| format!("{:04X}", u))
                .collect();
            cmap.push_str(&format!("<{:04X}> <{}>\n", code, utf16));
        }
        cmap.push_str("endbfchar\n");
    }

    cmap.push_str(
        "endcmap\n\
         CMapName currentdict /CMapResource defineresource pop\n\
         end\n\
         end\n",
    );
    cmap
}

/// Font objects, built before anything is added to the document
struct FontObjects {
    descriptor: Dictionary,
    cid_font: Dictionary,
    type0: Dictionary,
    to_unicode: Stream,
}

fn build_font(used: &BTreeMap<u16, char>, widths: &dyn GlyphWidths) -> FontObjects {
    let base_font = Object::Name(widths.font_name().as_bytes().to_vec());

    let descriptor = dictionary! {
        "Type" => "FontDescriptor",
        "FontName" => base_font.clone(),
        "Flags" => 4,
        "FontBBox" => vec![Object::Integer(0), Object::Integer(0), Object::Integer(1000), Object::Integer(1000)],
        "ItalicAngle" => 0,
        "Ascent" => 1000,
        "Descent" => 0,
        "CapHeight" => 1000,
        "StemV" => 80,
    };

    let cid_font = dictionary! {
        "Type" => "Font",
        "Subtype" => "CIDFontType2",
        "BaseFont" => base_font.clone(),
        "CIDSystemInfo" => dictionary! {
            "Registry" => Object::string_literal("Adobe"),
            "Ordering" => Object::string_literal("Identity"),
            "Supplement" => 0,
        },
        "DW" => real(widths.default_width()),
        "W" => width_array(used, widths),
        "CIDToGIDMap" => "Identity",
    };

    let type0 = dictionary! {
        "Type" => "Font",
        "Subtype" => "Type0",
        "BaseFont" => base_font,
        "Encoding" => "Identity-H",
    };

    FontObjects {
        descriptor,
        cid_font,
        type0,
        to_unicode: Stream::new(Dictionary::new(), to_unicode_cmap(used).into_bytes()),
    }
}

// ============================================================
// Page inspection
// ============================================================

/// Object ids of the page's current content streams
fn content_streams(doc: &Document, page: &Dictionary) -> Result<Vec<ObjectId>> {
    let Ok(contents) = page.get(b"Contents") else {
        return Ok(Vec::new());
    };

    let refs: Vec<&Object> = match contents {
        Object::Reference(id) => match doc.get_object(*id)? {
            Object::Stream(_) => return Ok(vec![*id]),
            Object::Array(items) => items.iter().collect(),
            _ => {
                return Err(CompositionError::MalformedPage(
                    "Contents points to neither a stream nor an array".to_string(),
                ))
            }
        },
        Object::Array(items) => items.iter().collect(),
        Object::Null => return Ok(Vec::new()),
        _ => {
            return Err(CompositionError::MalformedPage(
                "Contents is neither a stream reference nor an array".to_string(),
            ))
        }
    };

    refs.into_iter()
        .map(|item| match item {
            Object::Reference(id) if matches!(doc.get_object(*id), Ok(Object::Stream(_))) => {
                Ok(*id)
            }
            _ => Err(CompositionError::MalformedPage(
                "Contents array holds a non-stream entry".to_string(),
            )),
        })
        .collect()
}

/// Copy of the page's effective resources, with the font dictionary direct
fn materialized_resources(doc: &Document, page_id: ObjectId) -> Result<Dictionary> {
    let mut resources = match inherited_attribute(doc, page_id, b"Resources") {
        None | Some(Object::Null) => Dictionary::new(),
        Some(Object::Dictionary(dict)) => dict.clone(),
        Some(_) => {
            return Err(CompositionError::MalformedPage(
                "Resources is not a dictionary".to_string(),
            ))
        }
    };

    let fonts = match resources.get(b"Font") {
        Err(_) => Dictionary::new(),
        Ok(obj) => match resolve(doc, obj) {
            Some(Object::Dictionary(dict)) => dict.clone(),
            _ => {
                return Err(CompositionError::MalformedPage(
                    "Font resources are not a dictionary".to_string(),
                ))
            }
        },
    };
    resources.set("Font", fonts);
    Ok(resources)
}

/// First free resource name
fn unique_font_name(resources: &Dictionary) -> String {
    let fonts = resources.get(b"Font").and_then(Object::as_dict).ok();
    (0..)
        .map(|i| format!("{}{}", FONT_RESOURCE_PREFIX, i))
        .find(|name| fonts.map_or(true, |f| !f.has(name.as_bytes())))
        .unwrap_or_else(|| FONT_RESOURCE_PREFIX.to_string())
}

// ============================================================
// Composition
// ============================================================

/// Merge a text layer for `words` onto the page `page_id`.
///
/// Every check runs before the document is touched; on error the document
/// is unchanged. With no words the document is not modified at all.
pub fn compose(
    doc: &mut Document,
    page_id: ObjectId,
    words: &[(Placement, &RecognizedWord)],
    widths: &dyn GlyphWidths,
    options: &ComposeOptions,
) -> Result<ComposeReport> {
    let page = doc
        .get_dictionary(page_id)
        .map_err(|_| CompositionError::PageNotFound(page_id))?;
    if let Ok(kind) = page.get(b"Type").and_then(Object::as_name) {
        if kind != b"Page" {
            return Err(CompositionError::PageNotFound(page_id));
        }
    }

    if words.is_empty() {
        return Ok(ComposeReport::default());
    }

    let existing = content_streams(doc, page)?;
    let mut resources = materialized_resources(doc, page_id)?;
    let font_name = unique_font_name(&resources);

    let layer = build_layer(words, &font_name, widths, options);
    if layer.drawn == 0 {
        return Ok(ComposeReport {
            words_skipped: layer.skipped,
            ..Default::default()
        });
    }

    let mut layer_bytes = b"\n".to_vec();
    layer_bytes.extend(
        Content {
            operations: layer.operations,
        }
        .encode()
        .map_err(|e| CompositionError::Encode(e.to_string()))?,
    );
    let font = (!layer.used.is_empty()).then(|| build_font(&layer.used, widths));

    // Mutation starts here; nothing below can fail
    if let Some(font) = font {
        let descriptor_id = doc.add_object(font.descriptor);
        let mut cid_font = font.cid_font;
        cid_font.set("FontDescriptor", descriptor_id);
        let cid_font_id = doc.add_object(cid_font);
        let to_unicode_id = doc.add_object(font.to_unicode);

        let mut type0 = font.type0;
        type0.set("DescendantFonts", vec![Object::Reference(cid_font_id)]);
        type0.set("ToUnicode", to_unicode_id);
        let type0_id = doc.add_object(type0);

        if let Ok(Object::Dictionary(fonts)) = resources.get_mut(b"Font") {
            fonts.set(font_name.as_bytes().to_vec(), type0_id);
        }
    }

    let open_id = doc.add_object(Stream::new(Dictionary::new(), b"q\n".to_vec()));
    let layer_id = doc.add_object(Stream::new(Dictionary::new(), layer_bytes));

    let mut contents = Vec::with_capacity(existing.len() + 2);
    contents.push(Object::Reference(open_id));
    contents.extend(existing.into_iter().map(Object::Reference));
    contents.push(Object::Reference(layer_id));

    if let Ok(Object::Dictionary(page)) = doc.get_object_mut(page_id) {
        page.set("Resources", resources);
        page.set("Contents", contents);
    }

    debug!(
        drawn = layer.drawn,
        skipped = layer.skipped,
        font = %font_name,
        "composed text layer"
    );

    Ok(ComposeReport {
        words_drawn: layer.drawn,
        words_skipped: layer.skipped,
        font_resource: (!options.show_boxes).then_some(font_name),
        modified: true,
    })
}

// ============================================================
// Output
// ============================================================

/// Output written to a temporary file next to its target, not yet visible
/// under the target name
#[derive(Debug)]
pub struct StagedFile {
    temp: tempfile::NamedTempFile,
    target: PathBuf,
}

impl StagedFile {
    pub fn target(&self) -> &Path {
        &self.target
    }
}

/// Save `doc` into a temporary file in `path`'s directory
pub fn stage_document(doc: &mut Document, path: &Path) -> Result<StagedFile> {
    let temp = tempfile::NamedTempFile::new_in(parent_dir(path))?;
    {
        let mut writer = BufWriter::new(temp.as_file());
        doc.save_to(&mut writer)?;
        writer.flush()?;
    }
    Ok(StagedFile {
        temp,
        target: path.to_path_buf(),
    })
}

/// Write raw bytes into a temporary file in `path`'s directory
pub fn stage_bytes(bytes: &[u8], path: &Path) -> std::io::Result<StagedFile> {
    let mut temp = tempfile::NamedTempFile::new_in(parent_dir(path))?;
    temp.write_all(bytes)?;
    temp.flush()?;
    Ok(StagedFile {
        temp,
        target: path.to_path_buf(),
    })
}

/// Move staged files to their targets in order.
///
/// When one fails, targets already moved in this call are removed and the
/// remaining temporaries are discarded.
pub fn commit(files: Vec<StagedFile>) -> std::io::Result<()> {
    let mut moved: Vec<PathBuf> = Vec::with_capacity(files.len());
    for StagedFile { temp, target } in files {
        if let Err(e) = temp.persist(&target) {
            for path in &moved {
                if let Err(cleanup) = std::fs::remove_file(path) {
                    warn!(path = %path.display(), "could not remove partial output: {}", cleanup);
                }
            }
            return Err(e.error);
        }
        moved.push(target);
    }
    Ok(())
}

/// Save `doc` to `path` through a temporary file in the same directory
pub fn write_atomic(doc: &mut Document, path: &Path) -> Result<()> {
    let staged = stage_document(doc, path)?;
    commit(vec![staged])?;
    Ok(())
}
