//! PDF Reader module
//!
//! Loads the original page document and reads the page attributes the
//! geometry needs, following the page tree for inherited values.

use crate::geometry::{GeometryError, PageGeometry};
use lopdf::{Dictionary, Document, Object, ObjectId};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Nesting limit when walking `/Parent` chains and references
const MAX_TREE_DEPTH: usize = 64;

/// PDF reading error types
#[derive(Debug, Error)]
pub enum PdfReaderError {
    #[error("File not found: {0}")]
    FileNotFound(PathBuf),

    #[error("Invalid PDF format: {0}")]
    InvalidFormat(String),

    #[error("Encrypted PDF not supported")]
    EncryptedPdf,

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("PDF parse error: {0}")]
    ParseError(String),

    #[error("Page {0} not found")]
    PageNotFound(usize),

    #[error("Page geometry error: {0}")]
    Geometry(#[from] GeometryError),
}

pub type Result<T> = std::result::Result<T, PdfReaderError>;

/// Page information
#[derive(Debug, Clone, PartialEq)]
pub struct PdfPage {
    /// 0-indexed page number
    pub index: usize,
    /// Page object id
    pub id: ObjectId,
    /// Effective box width in points (CropBox, else MediaBox)
    pub width_pt: f64,
    /// Effective box height in points
    pub height_pt: f64,
    /// Lower-left corner of the effective box
    pub origin_pt: (f64, f64),
    /// Raw `/Rotate` value
    pub rotation: i64,
}

impl PdfPage {
    /// Geometry used to place words on this page
    pub fn geometry(&self) -> Result<PageGeometry> {
        Ok(PageGeometry::new(self.width_pt, self.height_pt, self.rotation)?
            .with_offset(self.origin_pt.0, self.origin_pt.1))
    }
}

/// lopdf-based PDF reader implementation
pub struct LopdfReader {
    document: Document,
    pub path: Option<PathBuf>,
    pub pages: Vec<PdfPage>,
}

impl LopdfReader {
    /// Create a new PDF reader for the given path
    pub fn new(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();

        if !path.exists() {
            return Err(PdfReaderError::FileNotFound(path.to_path_buf()));
        }

        let bytes = std::fs::read(path)?;
        let mut reader = Self::from_bytes(&bytes)?;
        reader.path = Some(path.to_path_buf());
        Ok(reader)
    }

    /// Read a document held in memory
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let document = Document::load_mem(bytes).map_err(Self::classify)?;
        Self::from_document(document)
    }

    /// Wrap an already loaded document
    pub fn from_document(document: Document) -> Result<Self> {
        if document.is_encrypted() {
            return Err(PdfReaderError::EncryptedPdf);
        }
        let pages = Self::extract_pages(&document)?;
        Ok(Self {
            document,
            path: None,
            pages,
        })
    }

    fn classify(e: lopdf::Error) -> PdfReaderError {
        let err_str = e.to_string();
        if err_str.contains("header") || err_str.contains("PDF") {
            PdfReaderError::InvalidFormat(err_str)
        } else {
            PdfReaderError::ParseError(err_str)
        }
    }

    /// Extract page information from PDF document
    fn extract_pages(doc: &Document) -> Result<Vec<PdfPage>> {
        let page_ids = doc.get_pages();
        let mut pages = Vec::with_capacity(page_ids.len());

        for (index, (_, page_id)) in page_ids.iter().enumerate() {
            let (origin_pt, (width_pt, height_pt)) = Self::get_page_box(doc, *page_id)
                .ok_or_else(|| {
                    PdfReaderError::InvalidFormat(format!("page {} has no usable MediaBox", index))
                })?;

            let rotation = inherited_attribute(doc, *page_id, b"Rotate")
                .and_then(|obj| obj.as_i64().ok())
                .unwrap_or(0);

            pages.push(PdfPage {
                index,
                id: *page_id,
                width_pt,
                height_pt,
                origin_pt,
                rotation,
            });
        }

        Ok(pages)
    }

    /// Get the effective page box: CropBox first, then MediaBox
    fn get_page_box(doc: &Document, page_id: ObjectId) -> Option<((f64, f64), (f64, f64))> {
        for key in [b"CropBox".as_slice(), b"MediaBox".as_slice()] {
            let Some(Object::Array(values)) = inherited_attribute(doc, page_id, key) else {
                continue;
            };
            if values.len() < 4 {
                continue;
            }
            let numbers: Vec<f64> = values
                .iter()
                .take(4)
                .filter_map(|v| resolve(doc, v).and_then(get_number))
                .collect();
            if let [x1, y1, x2, y2] = numbers[..] {
                let (width, height) = ((x2 - x1).abs(), (y2 - y1).abs());
                if width > 0.0 && height > 0.0 {
                    return Some(((x1.min(x2), y1.min(y2)), (width, height)));
                }
            }
        }
        None
    }

    /// Get page by index
    pub fn get_page(&self, index: usize) -> Result<&PdfPage> {
        self.pages
            .get(index)
            .ok_or(PdfReaderError::PageNotFound(index))
    }

    pub fn page_count(&self) -> usize {
        self.pages.len()
    }

    pub fn document(&self) -> &Document {
        &self.document
    }

    /// Hand the document over for modification
    pub fn into_document(self) -> Document {
        self.document
    }
}

/// Follow references until a direct object is reached
pub fn resolve<'a>(doc: &'a Document, obj: &'a Object) -> Option<&'a Object> {
    let mut current = obj;
    for _ in 0..MAX_TREE_DEPTH {
        match current {
            Object::Reference(id) => current = doc.get_object(*id).ok()?,
            other => return Some(other),
        }
    }
    None
}

/// Resolve an object to a dictionary (following references)
pub fn resolve_dict<'a>(doc: &'a Document, obj: &'a Object) -> Option<&'a Dictionary> {
    resolve(doc, obj)?.as_dict().ok()
}

/// Look up a page attribute, walking `/Parent` for inheritable keys.
///
/// The returned object is already dereferenced.
pub fn inherited_attribute<'a>(
    doc: &'a Document,
    page_id: ObjectId,
    key: &[u8],
) -> Option<&'a Object> {
    let mut node = doc.get_dictionary(page_id).ok()?;
    for _ in 0..MAX_TREE_DEPTH {
        if let Ok(value) = node.get(key) {
            return resolve(doc, value);
        }
        let parent = node.get(b"Parent").ok()?;
        node = resolve_dict(doc, parent)?;
    }
    None
}

/// Extract number from PDF object
pub fn get_number(obj: &Object) -> Option<f64> {
    match obj {
        Object::Integer(i) => Some(*i as f64),
        Object::Real(f) => Some(*f as f64),
        _ => None,
    }
}
