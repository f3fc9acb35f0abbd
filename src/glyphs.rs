//! Glyph width tables
//!
//! Advance widths used to stretch an invisible text run so it spans exactly
//! the width of the word it covers. Widths are in glyph space units
//! (1/1000 em), as PDF font dictionaries expect them.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use thiserror::Error;
use ttf_parser::{name_id, Face};

/// Advance of every glyph in [`UniformWidths`]
pub const UNIFORM_ADVANCE: f64 = 500.0;

/// Replacement for characters the text layer cannot encode
pub const REPLACEMENT_CHAR: char = '\u{FFFD}';

/// Glyph table error types
#[derive(Debug, Error)]
pub enum GlyphError {
    #[error("Font not found: {0}")]
    NotFound(PathBuf),

    #[error("Invalid font data: {0}")]
    InvalidFont(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, GlyphError>;

/// Advance-width lookup consumed by the text-layer composer
pub trait GlyphWidths: Send + Sync {
    /// Advance of `ch` in 1/1000 em
    fn advance(&self, ch: char) -> f64;

    /// Width reported for codes without an explicit entry
    fn default_width(&self) -> f64 {
        UNIFORM_ADVANCE
    }

    /// PostScript-safe base font name
    fn font_name(&self) -> &str;

    /// Total advance of a run of characters, in 1/1000 em
    fn run_advance(&self, text: &str) -> f64 {
        text.chars().map(|ch| self.advance(encodable(ch))).sum()
    }
}

/// Map characters outside the Basic Multilingual Plane to U+FFFD
pub fn encodable(ch: char) -> char {
    if (ch as u32) <= 0xFFFF {
        ch
    } else {
        REPLACEMENT_CHAR
    }
}

// ============================================================
// Uniform widths
// ============================================================

/// Every glyph has the same advance
#[derive(Debug, Clone)]
pub struct UniformWidths {
    advance: f64,
}

impl Default for UniformWidths {
    fn default() -> Self {
        Self {
            advance: UNIFORM_ADVANCE,
        }
    }
}

impl UniformWidths {
    pub fn new(advance: f64) -> Self {
        let advance = if advance.is_finite() && advance > 0.0 {
            advance
        } else {
            UNIFORM_ADVANCE
        };
        Self { advance }
    }
}

impl GlyphWidths for UniformWidths {
    fn advance(&self, _ch: char) -> f64 {
        self.advance
    }

    fn default_width(&self) -> f64 {
        self.advance
    }

    fn font_name(&self) -> &str {
        "GlyphLessFont"
    }
}

// ============================================================
// TrueType widths
// ============================================================

/// Advances read from a TrueType/OpenType font
#[derive(Debug, Clone)]
pub struct TrueTypeWidths {
    name: String,
    advances: HashMap<char, f64>,
    fallback: f64,
}

impl TrueTypeWidths {
    /// Load the first face of a font file
    pub fn from_file(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(GlyphError::NotFound(path.to_path_buf()));
        }
        let data = std::fs::read(path)?;
        Self::from_data(&data)
    }

    /// Parse the first face of in-memory font data
    pub fn from_data(data: &[u8]) -> Result<Self> {
        let face = Face::parse(data, 0).map_err(|e| GlyphError::InvalidFont(e.to_string()))?;
        let units = face.units_per_em().max(1) as f64;
        let scale = 1000.0 / units;

        let space_advance = face
            .glyph_index(' ')
            .and_then(|id| face.glyph_hor_advance(id))
            .map(|a| a as f64 * scale)
            .unwrap_or(UNIFORM_ADVANCE);

        let mut advances = HashMap::new();
        for code in 0u32..=0xFFFF {
            let Some(ch) = char::from_u32(code) else {
                continue;
            };
            if let Some(advance) = face
                .glyph_index(ch)
                .and_then(|id| face.glyph_hor_advance(id))
            {
                advances.insert(ch, advance as f64 * scale);
            }
        }

        let name = family_name(&face).unwrap_or_else(|| "TextLayerFont".to_string());

        Ok(Self {
            name,
            advances,
            fallback: space_advance,
        })
    }

    /// Number of characters with a glyph in the font
    pub fn len(&self) -> usize {
        self.advances.len()
    }

    pub fn is_empty(&self) -> bool {
        self.advances.is_empty()
    }
}

impl GlyphWidths for TrueTypeWidths {
    fn advance(&self, ch: char) -> f64 {
        self.advances.get(&ch).copied().unwrap_or(self.fallback)
    }

    fn default_width(&self) -> f64 {
        self.fallback
    }

    fn font_name(&self) -> &str {
        &self.name
    }
}

/// Family name with everything but ASCII alphanumerics removed
fn family_name(face: &Face<'_>) -> Option<String> {
    face.names()
        .into_iter()
        .filter(|name| name.name_id == name_id::POST_SCRIPT_NAME || name.name_id == name_id::FAMILY)
        .filter_map(|name| name.to_string())
        .map(|name| name.chars().filter(|c| c.is_ascii_alphanumeric() || *c == '-').collect::<String>())
        .find(|name| !name.is_empty())
}
