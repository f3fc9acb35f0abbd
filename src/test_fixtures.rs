//! PDF and font fixtures for unit tests

use lopdf::content::{Content, Operation};
use lopdf::{dictionary, Dictionary, Document, Object, ObjectId, Stream};

/// Where the page's resource dictionary lives
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourcesAt {
    /// Direct dictionary in the page
    Inline,
    /// Indirect object referenced by the page
    Referenced,
    /// Inherited from the page tree node
    Inherited,
}

/// How the page's content is stored
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContentsAs {
    Single,
    Array,
    Missing,
}

#[derive(Debug, Clone)]
pub struct FixturePage {
    pub media_box: [f64; 4],
    pub crop_box: Option<[f64; 4]>,
    pub rotate: Option<i64>,
    pub resources: ResourcesAt,
    pub contents: ContentsAs,
    pub inherit_media_box: bool,
    pub inherit_rotate: bool,
}

impl Default for FixturePage {
    fn default() -> Self {
        Self {
            media_box: [0.0, 0.0, 612.0, 792.0],
            crop_box: None,
            rotate: None,
            resources: ResourcesAt::Inline,
            contents: ContentsAs::Single,
            inherit_media_box: false,
            inherit_rotate: false,
        }
    }
}

fn rect(values: [f64; 4]) -> Object {
    Object::Array(values.iter().map(|&v| Object::Real(v as f32)).collect())
}

/// Build a one-page document whose page paints a small gray image.
///
/// Returns the document and the page's object id.
pub fn image_page(fixture: &FixturePage) -> (Document, ObjectId) {
    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();

    let image_id = doc.add_object(Stream::new(
        dictionary! {
            "Type" => "XObject",
            "Subtype" => "Image",
            "Width" => 2,
            "Height" => 2,
            "ColorSpace" => "DeviceGray",
            "BitsPerComponent" => 8,
        },
        vec![0, 255, 255, 0],
    ));
    let resources = dictionary! {
        "XObject" => dictionary! { "Im0" => image_id },
    };

    let [x0, y0, x1, y1] = fixture.media_box;
    let draw = Content {
        operations: vec![
            Operation::new("q", vec![]),
            Operation::new(
                "cm",
                vec![
                    Object::Real((x1 - x0) as f32),
                    0.into(),
                    0.into(),
                    Object::Real((y1 - y0) as f32),
                    Object::Real(x0 as f32),
                    Object::Real(y0 as f32),
                ],
            ),
            Operation::new("Do", vec![Object::Name(b"Im0".to_vec())]),
            Operation::new("Q", vec![]),
        ],
    };
    let encoded = draw.encode().unwrap();

    let mut page = dictionary! {
        "Type" => "Page",
        "Parent" => pages_id,
    };
    let mut pages = dictionary! {
        "Type" => "Pages",
        "Count" => 1,
    };

    match fixture.contents {
        ContentsAs::Single => {
            let id = doc.add_object(Stream::new(Dictionary::new(), encoded));
            page.set("Contents", id);
        }
        ContentsAs::Array => {
            let (head, tail) = encoded.split_at(encoded.len() / 2);
            let first = doc.add_object(Stream::new(Dictionary::new(), head.to_vec()));
            let second = doc.add_object(Stream::new(Dictionary::new(), tail.to_vec()));
            page.set("Contents", vec![first.into(), second.into()]);
        }
        ContentsAs::Missing => {}
    }

    match fixture.resources {
        ResourcesAt::Inline => page.set("Resources", resources),
        ResourcesAt::Referenced => {
            let id = doc.add_object(resources);
            page.set("Resources", id);
        }
        ResourcesAt::Inherited => pages.set("Resources", resources),
    }

    if fixture.inherit_media_box {
        pages.set("MediaBox", rect(fixture.media_box));
    } else {
        page.set("MediaBox", rect(fixture.media_box));
    }
    if let Some(crop) = fixture.crop_box {
        page.set("CropBox", rect(crop));
    }
    if let Some(rotate) = fixture.rotate {
        if fixture.inherit_rotate {
            pages.set("Rotate", rotate);
        } else {
            page.set("Rotate", rotate);
        }
    }

    let page_id = doc.add_object(page);
    pages.set("Kids", vec![page_id.into()]);
    doc.objects.insert(pages_id, Object::Dictionary(pages));

    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);

    (doc, page_id)
}

/// Serialize a fixture to bytes
///
/// Saves a clone: lopdf bumps `max_id` on every xref-stream save, which
/// would otherwise make repeated serializations of one document differ.
pub fn to_bytes(doc: &mut Document) -> Vec<u8> {
    let mut bytes = Vec::new();
    doc.clone().save_to(&mut bytes).unwrap();
    bytes
}

// ============================================================
// Font
// ============================================================

/// Units per em of [`tiny_font`]
pub const TINY_FONT_UNITS: f64 = 2048.0;

/// `(code point, advance)` of glyphs 1.. in [`tiny_font`]; glyph 0 is
/// `.notdef` with advance 1024
pub const TINY_FONT_GLYPHS: [(u16, u16); 4] = [(0x20, 512), (0x57, 1933), (0x69, 569), (0x6D, 1706)];

fn put_u16(buf: &mut Vec<u8>, value: u16) {
    buf.extend_from_slice(&value.to_be_bytes());
}

fn put_u32(buf: &mut Vec<u8>, value: u32) {
    buf.extend_from_slice(&value.to_be_bytes());
}

/// Smallest TrueType font ttf-parser accepts with advances, a cmap and a
/// name table: space, `W`, `i` and `m`, family "Tiny Test"
pub fn tiny_font() -> Vec<u8> {
    let num_glyphs = TINY_FONT_GLYPHS.len() as u16 + 1;

    let mut head = Vec::new();
    put_u32(&mut head, 0x0001_0000);
    put_u32(&mut head, 0x0001_0000);
    put_u32(&mut head, 0);
    put_u32(&mut head, 0x5F0F_3CF5);
    put_u16(&mut head, 0);
    put_u16(&mut head, TINY_FONT_UNITS as u16);
    head.extend_from_slice(&[0; 16]); // created, modified
    for bound in [0i16, -512, 2048, 2048] {
        put_u16(&mut head, bound as u16);
    }
    put_u16(&mut head, 0); // macStyle
    put_u16(&mut head, 8); // lowestRecPPEM
    put_u16(&mut head, 2); // fontDirectionHint
    put_u16(&mut head, 0); // indexToLocFormat
    put_u16(&mut head, 0); // glyphDataFormat

    let mut hhea = Vec::new();
    put_u32(&mut hhea, 0x0001_0000);
    put_u16(&mut hhea, 1900);
    put_u16(&mut hhea, (-500i16) as u16);
    put_u16(&mut hhea, 0);
    hhea.extend_from_slice(&[0; 24]);
    put_u16(&mut hhea, num_glyphs);

    let mut maxp = Vec::new();
    put_u32(&mut maxp, 0x0000_5000);
    put_u16(&mut maxp, num_glyphs);

    let mut hmtx = Vec::new();
    put_u16(&mut hmtx, 1024);
    put_u16(&mut hmtx, 0);
    for (_, advance) in TINY_FONT_GLYPHS {
        put_u16(&mut hmtx, advance);
        put_u16(&mut hmtx, 0);
    }

    // Format 4: one segment per glyph plus the closing 0xFFFF segment
    let seg_count = TINY_FONT_GLYPHS.len() as u16 + 1;
    let mut cmap = Vec::new();
    put_u16(&mut cmap, 0);
    put_u16(&mut cmap, 1);
    put_u16(&mut cmap, 3); // Windows
    put_u16(&mut cmap, 1); // Unicode BMP
    put_u32(&mut cmap, 12);
    put_u16(&mut cmap, 4);
    put_u16(&mut cmap, 16 + 8 * seg_count);
    put_u16(&mut cmap, 0);
    put_u16(&mut cmap, seg_count * 2);
    cmap.extend_from_slice(&[0; 6]); // searchRange, entrySelector, rangeShift
    for (code, _) in TINY_FONT_GLYPHS {
        put_u16(&mut cmap, code);
    }
    put_u16(&mut cmap, 0xFFFF);
    put_u16(&mut cmap, 0); // reservedPad
    for (code, _) in TINY_FONT_GLYPHS {
        put_u16(&mut cmap, code);
    }
    put_u16(&mut cmap, 0xFFFF);
    for (gid, (code, _)) in (1u16..).zip(TINY_FONT_GLYPHS) {
        put_u16(&mut cmap, gid.wrapping_sub(code));
    }
    put_u16(&mut cmap, 1);
    cmap.extend(std::iter::repeat(0).take(2 * seg_count as usize));

    let names = [(1u16, "Tiny Test"), (6u16, "TinyTest-Regular")];
    let mut name = Vec::new();
    put_u16(&mut name, 0);
    put_u16(&mut name, names.len() as u16);
    put_u16(&mut name, 6 + 12 * names.len() as u16);
    let mut storage = Vec::new();
    for (id, value) in names {
        let encoded: Vec<u8> = value.encode_utf16().flat_map(u16::to_be_bytes).collect();
        put_u16(&mut name, 3);
        put_u16(&mut name, 1);
        put_u16(&mut name, 0x0409);
        put_u16(&mut name, id);
        put_u16(&mut name, encoded.len() as u16);
        put_u16(&mut name, storage.len() as u16);
        storage.extend(encoded);
    }
    name.extend(storage);

    let tables: [(&[u8; 4], Vec<u8>); 6] = [
        (b"cmap", cmap),
        (b"head", head),
        (b"hhea", hhea),
        (b"hmtx", hmtx),
        (b"maxp", maxp),
        (b"name", name),
    ];
    let mut font = Vec::new();
    put_u32(&mut font, 0x0001_0000);
    put_u16(&mut font, tables.len() as u16);
    font.extend_from_slice(&[0; 6]);
    let data_start = 12 + 16 * tables.len();
    let mut body = Vec::new();
    for (tag, data) in &tables {
        font.extend_from_slice(*tag);
        put_u32(&mut font, 0); // checksum, not verified
        put_u32(&mut font, (data_start + body.len()) as u32);
        put_u32(&mut font, data.len() as u32);
        body.extend_from_slice(data);
        body.resize(body.len().next_multiple_of(4), 0);
    }
    font.extend(body);
    font
}
