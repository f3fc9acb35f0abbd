//! Word placement geometry
//!
//! Maps a recognized word polygon from recognizer pixel space onto the PDF
//! page. The chain is explicit, one function per step:
//!
//! 1. [`normalize`]: pixels → unit square (origin top-left, y down)
//! 2. [`orient`]: minimum-area rectangle → baseline direction, origin, extents
//! 3. skew is added to the word rotation
//! 4. [`OrientedBox::to_display`] + [`PageGeometry::display_to_user`]:
//!    unit square → display space (points, y up) → unrotated user space
//!
//! Display space is the page as a viewer shows it, i.e. after `/Rotate`.

use crate::recognition::RecognizedWord;
use geo::{Coord, MinimumRotatedRect, MultiPoint, Point};
use thiserror::Error;
use tracing::debug;

// ============================================================
// Constants
// ============================================================

/// Extents below this (in unit-square coordinates) make a word unplaceable
pub const DEGENERATE_EPSILON: f64 = 1e-6;

// ============================================================
// Error Types
// ============================================================

/// Page geometry error types
#[derive(Debug, Error, PartialEq)]
pub enum GeometryError {
    #[error("Unsupported page rotation: {0} (must be a multiple of 90)")]
    UnsupportedRotation(i64),

    #[error("Invalid page size: {width} x {height}")]
    InvalidPageSize { width: f64, height: f64 },
}

pub type Result<T> = std::result::Result<T, GeometryError>;

/// Why a word produced no placement
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum DropReason {
    #[error("degenerate polygon")]
    DegeneratePolygon,

    #[error("invalid image size")]
    InvalidImageSize,

    #[error("non-finite geometry")]
    NonFiniteGeometry,
}

// ============================================================
// Sizes and page geometry
// ============================================================

/// Width and height in some unit
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Size {
    pub width: f64,
    pub height: f64,
}

impl Size {
    pub fn new(width: f64, height: f64) -> Self {
        Self { width, height }
    }

    fn is_valid(&self) -> bool {
        self.width.is_finite() && self.height.is_finite() && self.width > 0.0 && self.height > 0.0
    }
}

/// The effective box of a page and its `/Rotate` attribute
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PageGeometry {
    size: Size,
    offset: (f64, f64),
    rotation: u32,
}

impl PageGeometry {
    /// Build page geometry from the box size (user space) and `/Rotate`.
    ///
    /// Any multiple of 90 is accepted and folded into 0..360.
    pub fn new(width: f64, height: f64, rotation: i64) -> Result<Self> {
        let size = Size::new(width, height);
        if !size.is_valid() {
            return Err(GeometryError::InvalidPageSize { width, height });
        }
        if rotation % 90 != 0 {
            return Err(GeometryError::UnsupportedRotation(rotation));
        }
        Ok(Self {
            size,
            offset: (0.0, 0.0),
            rotation: rotation.rem_euclid(360) as u32,
        })
    }

    /// Lower-left corner of the box in user space
    #[must_use]
    pub fn with_offset(mut self, x: f64, y: f64) -> Self {
        self.offset = (x, y);
        self
    }

    pub fn size(&self) -> Size {
        self.size
    }

    pub fn offset(&self) -> (f64, f64) {
        self.offset
    }

    /// Normalized `/Rotate`: 0, 90, 180 or 270
    pub fn rotation(&self) -> u32 {
        self.rotation
    }

    /// Page size as displayed; width and height swap for 90/270
    pub fn display_size(&self) -> Size {
        match self.rotation {
            90 | 270 => Size::new(self.size.height, self.size.width),
            _ => self.size,
        }
    }

    /// Map a display-space point into user space (inverse of `/Rotate`)
    pub fn display_to_user(&self, (x, y): (f64, f64)) -> (f64, f64) {
        let Size { width: w, height: h } = self.size;
        let (ux, uy) = match self.rotation {
            90 => (w - y, x),
            180 => (w - x, h - y),
            270 => (y, h - x),
            _ => (x, y),
        };
        (ux + self.offset.0, uy + self.offset.1)
    }

    /// Map a display-space angle into user space
    pub fn display_to_user_angle(&self, degrees: f64) -> f64 {
        normalize_rotation(degrees + self.rotation as f64)
    }
}

/// Fold an angle into (-180, 180]
pub fn normalize_rotation(degrees: f64) -> f64 {
    if degrees > -180.0 && degrees <= 180.0 {
        return degrees;
    }
    let folded = degrees.rem_euclid(360.0);
    if folded > 180.0 {
        folded - 360.0
    } else {
        folded
    }
}

// ============================================================
// Placement
// ============================================================

/// Where and how a word's invisible text is drawn, in user space
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Placement {
    /// Baseline start of the text run
    pub origin: (f64, f64),
    /// Baseline direction, degrees counter-clockwise
    pub rotation: f64,
    /// Extent along the baseline
    pub width: f64,
    /// Extent across the baseline
    pub height: f64,
}

/// Result of placing one word
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PlaceOutcome {
    Placed(Placement),
    Dropped(DropReason),
}

impl PlaceOutcome {
    pub fn placement(&self) -> Option<&Placement> {
        match self {
            PlaceOutcome::Placed(p) => Some(p),
            PlaceOutcome::Dropped(_) => None,
        }
    }
}

/// Placements of one page, in word order
#[derive(Debug, Clone, Default)]
pub struct Placements<'a> {
    pub placed: Vec<(Placement, &'a RecognizedWord)>,
    pub dropped: usize,
}

// ============================================================
// Step 1: normalize
// ============================================================

/// Divide pixel coordinates by the image size
pub fn normalize(points: &[(f64, f64)], image: Size) -> Option<Vec<(f64, f64)>> {
    if !image.is_valid() {
        return None;
    }
    Some(
        points
            .iter()
            .map(|&(x, y)| (x / image.width, y / image.height))
            .collect(),
    )
}

/// Inverse of [`normalize`]
pub fn denormalize(points: &[(f64, f64)], image: Size) -> Vec<(f64, f64)> {
    points
        .iter()
        .map(|&(x, y)| (x * image.width, y * image.height))
        .collect()
}

// ============================================================
// Step 2: orient
// ============================================================

/// Oriented word box in the unit square (y down)
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OrientedBox {
    /// Baseline start: bottom-left of the upright text line
    pub origin: (f64, f64),
    /// Unit baseline direction
    pub direction: (f64, f64),
    /// Extent along `direction`
    pub width: f64,
    /// Extent across `direction`
    pub height: f64,
}

impl OrientedBox {
    /// Text "down" direction, perpendicular to the baseline (y down frame)
    pub fn down(&self) -> (f64, f64) {
        (-self.direction.1, self.direction.0)
    }

    /// Map into display space, giving a placement relative to the page as
    /// viewed.
    ///
    /// Extents are measured after scaling, so a page with a different
    /// aspect ratio than the image still gets the true footprint.
    pub fn to_display(&self, display: Size) -> Placement {
        let Size {
            width: dw,
            height: dh,
        } = display;
        let x = self.origin.0 * dw;
        let y = (1.0 - self.origin.1) * dh;

        let along = (
            self.direction.0 * self.width * dw,
            -self.direction.1 * self.width * dh,
        );
        let (down_x, down_y) = self.down();
        let across = (down_x * self.height * dw, -down_y * self.height * dh);

        let width = along.0.hypot(along.1);
        let height = if width > 0.0 {
            ((along.0 * across.1 - along.1 * across.0) / width).abs()
        } else {
            0.0
        };
        Placement {
            origin: (x, y),
            rotation: along.1.atan2(along.0).to_degrees(),
            width,
            height,
        }
    }
}

/// Compute the oriented box of a normalized polygon
pub fn orient(points: &[(f64, f64)]) -> std::result::Result<OrientedBox, DropReason> {
    if points.len() < 2 {
        return Err(DropReason::DegeneratePolygon);
    }
    if points.iter().any(|(x, y)| !x.is_finite() || !y.is_finite()) {
        return Err(DropReason::NonFiniteGeometry);
    }
    if is_collinear(points) {
        return Err(DropReason::DegeneratePolygon);
    }

    let cloud: MultiPoint<f64> = points.iter().map(|&(x, y)| Point::new(x, y)).collect();
    let rect = cloud
        .minimum_rotated_rect()
        .ok_or(DropReason::DegeneratePolygon)?;
    let corners: Vec<Coord<f64>> = rect.exterior().coords().take(4).copied().collect();
    if corners.len() < 4 {
        return Err(DropReason::DegeneratePolygon);
    }

    let e1 = corners[1] - corners[0];
    let e2 = corners[2] - corners[1];
    let l1 = e1.x.hypot(e1.y);
    let l2 = e2.x.hypot(e2.y);
    if l1 < DEGENERATE_EPSILON || l2 < DEGENERATE_EPSILON {
        return Err(DropReason::DegeneratePolygon);
    }
    let d1 = (e1.x / l1, e1.y / l1);
    let d2 = (e2.x / l2, e2.y / l2);

    // Candidate baseline directions with the extent along and across each
    let candidates = [
        (d1, l1, l2),
        ((-d1.0, -d1.1), l1, l2),
        (d2, l2, l1),
        ((-d2.0, -d2.1), l2, l1),
    ];

    let (p0, p1) = (points[0], points[1]);
    let first_edge = (p1.0 - p0.0, p1.1 - p0.1);
    let reference = if first_edge.0.hypot(first_edge.1) >= DEGENERATE_EPSILON {
        first_edge
    } else {
        (1.0, 0.0)
    };

    let mut best = candidates[0];
    let mut best_score = f64::MIN;
    for candidate in candidates {
        let score = candidate.0 .0 * reference.0 + candidate.0 .1 * reference.1;
        if score > best_score {
            best_score = score;
            best = candidate;
        }
    }
    let (direction, width, height) = best;

    let center = corners.iter().fold((0.0, 0.0), |acc, c| {
        (acc.0 + c.x / 4.0, acc.1 + c.y / 4.0)
    });
    let down = (-direction.1, direction.0);
    let origin = (
        center.0 - direction.0 * width / 2.0 + down.0 * height / 2.0,
        center.1 - direction.1 * width / 2.0 + down.1 * height / 2.0,
    );

    let oriented = OrientedBox {
        origin,
        direction,
        width,
        height,
    };
    if !oriented.origin.0.is_finite() || !oriented.origin.1.is_finite() {
        return Err(DropReason::NonFiniteGeometry);
    }
    Ok(oriented)
}

/// All points identical or on one line
fn is_collinear(points: &[(f64, f64)]) -> bool {
    let p0 = points[0];
    let far = points
        .iter()
        .copied()
        .max_by(|a, b| {
            let da = (a.0 - p0.0).hypot(a.1 - p0.1);
            let db = (b.0 - p0.0).hypot(b.1 - p0.1);
            da.total_cmp(&db)
        })
        .unwrap_or(p0);
    let axis = (far.0 - p0.0, far.1 - p0.1);
    let length = axis.0.hypot(axis.1);
    if length < DEGENERATE_EPSILON {
        return true;
    }
    points.iter().all(|&(x, y)| {
        let offset = ((x - p0.0) * axis.1 - (y - p0.1) * axis.0).abs() / length;
        offset < DEGENERATE_EPSILON
    })
}

// ============================================================
// Steps 3 and 4: skew and page mapping
// ============================================================

/// Place one word on the page.
///
/// `image` is the size of the image the recognizer saw, `skew_angle` the
/// page skew in degrees (counter-clockwise positive).
pub fn place(
    word: &RecognizedWord,
    image: Size,
    skew_angle: f64,
    page: &PageGeometry,
) -> PlaceOutcome {
    match try_place(word, image, skew_angle, page) {
        Ok(placement) => PlaceOutcome::Placed(placement),
        Err(reason) => {
            debug!(text = word.text(), %reason, "dropped word");
            PlaceOutcome::Dropped(reason)
        }
    }
}

fn try_place(
    word: &RecognizedWord,
    image: Size,
    skew_angle: f64,
    page: &PageGeometry,
) -> std::result::Result<Placement, DropReason> {
    let normalized = normalize(word.polygon(), image).ok_or(DropReason::InvalidImageSize)?;
    let oriented = orient(&normalized)?;
    if oriented.width < DEGENERATE_EPSILON || oriented.height < DEGENERATE_EPSILON {
        return Err(DropReason::DegeneratePolygon);
    }

    let display = oriented.to_display(page.display_size());
    let skew = if skew_angle.is_finite() { skew_angle } else { 0.0 };
    let rotation = page.display_to_user_angle(display.rotation + skew);
    let origin = page.display_to_user(display.origin);
    let (width, height) = (display.width, display.height);

    let values = [origin.0, origin.1, rotation, width, height];
    if values.iter().any(|v| !v.is_finite()) {
        return Err(DropReason::NonFiniteGeometry);
    }
    if width <= 0.0 || height <= 0.0 {
        return Err(DropReason::DegeneratePolygon);
    }

    Ok(Placement {
        origin,
        rotation,
        width,
        height,
    })
}

/// Place every word of a page, keeping word order
pub fn place_all<'a>(
    words: &'a [RecognizedWord],
    image: Size,
    skew_angle: f64,
    page: &PageGeometry,
) -> Placements<'a> {
    let mut placements = Placements::default();
    for word in words {
        match place(word, image, skew_angle, page) {
            PlaceOutcome::Placed(placement) => placements.placed.push((placement, word)),
            PlaceOutcome::Dropped(_) => placements.dropped += 1,
        }
    }
    placements
}

#[cfg(test)]
mod tests {
    use super::*;

    const TOL: f64 = 1e-9;

    fn hello() -> RecognizedWord {
        RecognizedWord::new(
            vec![(100.0, 100.0), (300.0, 100.0), (300.0, 150.0), (100.0, 150.0)],
            "Hello",
            0.99,
        )
        .unwrap()
    }

    fn letter() -> PageGeometry {
        PageGeometry::new(612.0, 792.0, 0).unwrap()
    }

    fn image() -> Size {
        Size::new(1000.0, 800.0)
    }

    fn placed(outcome: PlaceOutcome) -> Placement {
        match outcome {
            PlaceOutcome::Placed(p) => p,
            PlaceOutcome::Dropped(reason) => panic!("unexpectedly dropped: {reason}"),
        }
    }

    fn assert_close(a: f64, b: f64) {
        assert!((a - b).abs() < 1e-6, "{a} != {b}");
    }

    #[test]
    fn test_normalize_round_trip() {
        let polygon = vec![(12.5, 7.0), (640.0, 3.25), (641.0, 99.0), (10.0, 480.0)];
        for size in [Size::new(640.0, 480.0), Size::new(3.0, 7000.0), Size::new(0.5, 0.25)] {
            let normalized = normalize(&polygon, size).unwrap();
            let back = denormalize(&normalized, size);
            for (a, b) in polygon.iter().zip(back.iter()) {
                assert!((a.0 - b.0).abs() < TOL && (a.1 - b.1).abs() < TOL);
            }
        }
    }

    #[test]
    fn test_normalize_rejects_bad_size() {
        assert!(normalize(&[(1.0, 1.0)], Size::new(0.0, 10.0)).is_none());
        assert!(normalize(&[(1.0, 1.0)], Size::new(10.0, f64::NAN)).is_none());
    }

    #[test]
    fn test_scenario_axis_aligned() {
        let p = placed(place(&hello(), image(), 0.0, &letter()));
        assert_close(p.origin.0, 61.2);
        assert_close(p.origin.1, 643.5);
        assert_close(p.width, 122.4);
        assert_close(p.height, 49.5);
        assert_close(p.rotation, 0.0);
    }

    #[test]
    fn test_scenario_skew_only_rotates() {
        let base = placed(place(&hello(), image(), 0.0, &letter()));
        let skewed = placed(place(&hello(), image(), 5.0, &letter()));
        assert_close(skewed.rotation, 5.0);
        assert_eq!(skewed.origin, base.origin);
        assert_eq!(skewed.width, base.width);
        assert_eq!(skewed.height, base.height);
    }

    #[test]
    fn test_scenario_rotated_page_swaps_extents() {
        let page = PageGeometry::new(612.0, 792.0, 90).unwrap();
        assert_eq!(page.display_size(), Size::new(792.0, 612.0));

        let p = placed(place(&hello(), image(), 0.0, &page));
        assert_close(p.width, 0.2 * 792.0);
        assert_close(p.height, 0.0625 * 612.0);
        assert_close(p.rotation, 90.0);
        // Display origin (79.2, 497.25) seen through /Rotate 90
        assert_close(p.origin.0, 612.0 - 497.25);
        assert_close(p.origin.1, 79.2);
    }

    #[test]
    fn test_rotation_composition() {
        let oriented = orient(&normalize(hello().polygon(), image()).unwrap()).unwrap();
        let page = letter();
        let r = oriented.to_display(page.display_size()).rotation;

        let p = placed(place(&hello(), image(), 0.0, &page));
        assert_eq!(p.rotation, r);

        for (s, rot) in [(3.0, 0), (-7.5, 90), (12.0, 180), (1.0, 270)] {
            let page = PageGeometry::new(612.0, 792.0, rot).unwrap();
            let r = oriented.to_display(page.display_size()).rotation;
            let p = placed(place(&hello(), image(), s, &page));
            assert_close(p.rotation, normalize_rotation(r + s + rot as f64));
        }
    }

    #[test]
    fn test_determinism() {
        let word = RecognizedWord::new(
            vec![(10.0, 40.0), (210.0, 20.0), (213.0, 55.0), (13.0, 75.0)],
            "tilted",
            0.8,
        )
        .unwrap();
        let page = PageGeometry::new(595.0, 842.0, 270).unwrap();
        let first = place(&word, image(), 1.25, &page);
        for _ in 0..5 {
            assert_eq!(place(&word, image(), 1.25, &page), first);
        }
    }

    #[test]
    fn test_tilted_word_orientation() {
        // 10° counter-clockwise on a square image and page
        let angle = 10.0f64.to_radians();
        let (c, s) = (angle.cos(), angle.sin());
        let (w, h) = (200.0, 40.0);
        let start = (100.0, 500.0);
        // Upper-left, upper-right, lower-right, lower-left in pixel space (y down)
        let corner = |a: f64, b: f64| (start.0 + a * c + b * s, start.1 - a * s + b * c);
        let polygon = vec![corner(0.0, 0.0), corner(w, 0.0), corner(w, h), corner(0.0, h)];
        let word = RecognizedWord::new(polygon, "tilted", 1.0).unwrap();

        let page = PageGeometry::new(1000.0, 1000.0, 0).unwrap();
        let p = placed(place(&word, Size::new(1000.0, 1000.0), 0.0, &page));
        assert_close(p.rotation, 10.0);
        assert_close(p.width, w);
        assert_close(p.height, h);
        // Baseline start is the lower-left pixel corner, flipped into y-up
        let lower_left = corner(0.0, h);
        assert_close(p.origin.0, lower_left.0);
        assert_close(p.origin.1, 1000.0 - lower_left.1);
    }

    #[test]
    fn test_upside_down_word_orientation() {
        // Vertices listed from the reading start of a 180° rotated word
        let word = RecognizedWord::new(
            vec![(300.0, 150.0), (100.0, 150.0), (100.0, 100.0), (300.0, 100.0)],
            "nwob",
            1.0,
        )
        .unwrap();
        let p = placed(place(&word, image(), 0.0, &letter()));
        assert_close(p.rotation.abs(), 180.0);
        assert_close(p.origin.0, 0.3 * 612.0);
        assert_close(p.origin.1, (1.0 - 0.125) * 792.0);
    }

    #[test]
    fn test_identical_points_dropped() {
        let word = RecognizedWord::new(vec![(5.0, 5.0); 4], "x", 1.0).unwrap();
        assert_eq!(
            place(&word, image(), 0.0, &letter()),
            PlaceOutcome::Dropped(DropReason::DegeneratePolygon)
        );
    }

    #[test]
    fn test_collinear_points_dropped() {
        let word = RecognizedWord::new(
            vec![(0.0, 0.0), (10.0, 10.0), (20.0, 20.0), (30.0, 30.0)],
            "line",
            1.0,
        )
        .unwrap();
        assert_eq!(
            place(&word, image(), 0.0, &letter()),
            PlaceOutcome::Dropped(DropReason::DegeneratePolygon)
        );
    }

    #[test]
    fn test_invalid_image_size_dropped() {
        assert_eq!(
            place(&hello(), Size::new(0.0, 800.0), 0.0, &letter()),
            PlaceOutcome::Dropped(DropReason::InvalidImageSize)
        );
    }

    #[test]
    fn test_place_all_keeps_order_and_counts_drops() {
        let words = vec![
            hello(),
            RecognizedWord::new(vec![(5.0, 5.0); 4], "gone", 1.0).unwrap(),
            RecognizedWord::new(
                vec![(400.0, 100.0), (600.0, 100.0), (600.0, 150.0), (400.0, 150.0)],
                "world",
                1.0,
            )
            .unwrap(),
        ];
        let placements = place_all(&words, image(), 0.0, &letter());
        assert_eq!(placements.dropped, 1);
        let texts: Vec<&str> = placements.placed.iter().map(|(_, w)| w.text()).collect();
        assert_eq!(texts, vec!["Hello", "world"]);
    }

    #[test]
    fn test_page_offset_applied() {
        let page = letter().with_offset(10.0, 20.0);
        let p = placed(place(&hello(), image(), 0.0, &page));
        assert_close(p.origin.0, 71.2);
        assert_close(p.origin.1, 663.5);
    }

    #[test]
    fn test_display_to_user_corners() {
        let cases = [
            (0, (0.0, 0.0), (0.0, 0.0)),
            (90, (0.0, 0.0), (100.0, 0.0)),
            (180, (0.0, 0.0), (100.0, 200.0)),
            (270, (0.0, 0.0), (0.0, 200.0)),
            (90, (200.0, 100.0), (0.0, 200.0)),
        ];
        for (rotation, display, user) in cases {
            let page = PageGeometry::new(100.0, 200.0, rotation).unwrap();
            assert_eq!(page.display_to_user(display), user, "rotation {rotation}");
        }
    }

    #[test]
    fn test_page_geometry_validation() {
        assert_eq!(
            PageGeometry::new(612.0, 792.0, 45),
            Err(GeometryError::UnsupportedRotation(45))
        );
        assert!(matches!(
            PageGeometry::new(0.0, 792.0, 0),
            Err(GeometryError::InvalidPageSize { .. })
        ));
        assert_eq!(PageGeometry::new(1.0, 1.0, -90).unwrap().rotation(), 270);
        assert_eq!(PageGeometry::new(1.0, 1.0, 450).unwrap().rotation(), 90);
    }

    #[test]
    fn test_normalize_rotation() {
        assert_eq!(normalize_rotation(0.0), 0.0);
        assert_eq!(normalize_rotation(180.0), 180.0);
        assert_eq!(normalize_rotation(-180.0), 180.0);
        assert_eq!(normalize_rotation(270.0), -90.0);
        assert_eq!(normalize_rotation(-270.0), 90.0);
        assert_eq!(normalize_rotation(540.0), 180.0);
    }
}
