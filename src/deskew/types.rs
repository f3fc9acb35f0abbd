//! Skew estimation core types
//!
//! Contains the option, result and error types shared by the estimators.

use std::path::PathBuf;
use thiserror::Error;

// ============================================================
// Constants
// ============================================================

/// Default search range for the projection profile sweep (degrees)
pub const DEFAULT_MAX_ANGLE: f64 = 15.0;

/// Default sweep resolution for the projection profile (degrees)
pub const DEFAULT_ANGLE_STEP: f64 = 0.1;

/// Images larger than this (longest side, pixels) are downscaled before analysis
pub const DEFAULT_MAX_WORKING_SIDE: u32 = 2000;

/// Below this many foreground pixels a page is treated as blank
pub const MIN_FOREGROUND_PIXELS: usize = 32;

/// Morphological opening radius used to drop speckle noise
pub const DEFAULT_NOISE_RADIUS: u8 = 1;

// ============================================================
// Error Types
// ============================================================

/// Skew estimation error types
#[derive(Debug, Error)]
pub enum DeskewError {
    #[error("Image not found: {0}")]
    ImageNotFound(PathBuf),

    #[error("Image decode error: {0}")]
    ImageDecode(String),
}

pub type Result<T> = std::result::Result<T, DeskewError>;

// ============================================================
// Options and Enums
// ============================================================

/// Skew detection algorithms
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DeskewAlgorithm {
    /// Minimum-area rotated rectangle around the foreground pixels
    #[default]
    MinAreaRect,
    /// Projection profile variance sweep
    ProjectionProfile,
    /// Confidence-weighted average of both
    Combined,
}

/// Skew estimation options
#[derive(Debug, Clone)]
pub struct DeskewOptions {
    /// Detection algorithm
    pub algorithm: DeskewAlgorithm,
    /// Sweep range for the projection profile (degrees)
    pub max_angle: f64,
    /// Sweep resolution for the projection profile (degrees)
    pub angle_step: f64,
    /// Longest side of the working image (0 disables downscaling)
    pub max_working_side: u32,
    /// Opening radius for noise removal (0 disables)
    pub noise_radius: u8,
}

impl Default for DeskewOptions {
    fn default() -> Self {
        Self {
            algorithm: DeskewAlgorithm::MinAreaRect,
            max_angle: DEFAULT_MAX_ANGLE,
            angle_step: DEFAULT_ANGLE_STEP,
            max_working_side: DEFAULT_MAX_WORKING_SIDE,
            noise_radius: DEFAULT_NOISE_RADIUS,
        }
    }
}

impl DeskewOptions {
    /// Create a new options builder
    pub fn builder() -> DeskewOptionsBuilder {
        DeskewOptionsBuilder::default()
    }

    /// Options favouring accuracy over speed
    pub fn high_quality() -> Self {
        Self {
            algorithm: DeskewAlgorithm::Combined,
            angle_step: 0.05,
            max_working_side: 4000,
            ..Default::default()
        }
    }

    /// Options favouring speed
    pub fn fast() -> Self {
        Self {
            algorithm: DeskewAlgorithm::MinAreaRect,
            max_working_side: 1000,
            noise_radius: 0,
            ..Default::default()
        }
    }
}

/// Builder for DeskewOptions
#[derive(Debug, Default)]
pub struct DeskewOptionsBuilder {
    options: DeskewOptions,
}

impl DeskewOptionsBuilder {
    /// Set the detection algorithm
    #[must_use]
    pub fn algorithm(mut self, algorithm: DeskewAlgorithm) -> Self {
        self.options.algorithm = algorithm;
        self
    }

    /// Set the projection sweep range
    #[must_use]
    pub fn max_angle(mut self, angle: f64) -> Self {
        self.options.max_angle = angle.abs().min(89.0);
        self
    }

    /// Set the projection sweep resolution
    #[must_use]
    pub fn angle_step(mut self, step: f64) -> Self {
        self.options.angle_step = step.abs().max(0.01);
        self
    }

    /// Set the longest working side in pixels
    #[must_use]
    pub fn max_working_side(mut self, side: u32) -> Self {
        self.options.max_working_side = side;
        self
    }

    /// Set the noise removal radius
    #[must_use]
    pub fn noise_radius(mut self, radius: u8) -> Self {
        self.options.noise_radius = radius;
        self
    }

    /// Build the options
    #[must_use]
    pub fn build(self) -> DeskewOptions {
        self.options
    }
}

// ============================================================
// Result Types
// ============================================================

/// Skew detection result
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SkewDetection {
    /// Baseline tilt in degrees, (-90, 90], positive = counter-clockwise
    pub angle: f64,
    /// Detection confidence (0.0 - 1.0)
    pub confidence: f64,
    /// Number of foreground pixels the estimate is based on
    pub feature_count: usize,
}

impl SkewDetection {
    /// Result for a page without detectable structure
    pub fn blank() -> Self {
        Self {
            angle: 0.0,
            confidence: 0.0,
            feature_count: 0,
        }
    }
}

impl Default for SkewDetection {
    fn default() -> Self {
        Self::blank()
    }
}

/// Fold an angle into (-90, 90].
///
/// A line has no direction, so angles 180° apart are the same tilt; -90 and
/// 90 both collapse to 90.
pub fn normalize_angle(degrees: f64) -> f64 {
    if !degrees.is_finite() {
        return 0.0;
    }
    let mut angle = degrees % 180.0;
    if angle <= -90.0 {
        angle += 180.0;
    } else if angle > 90.0 {
        angle -= 180.0;
    }
    // Rounding can land exactly on the excluded bound
    if angle <= -90.0 {
        angle = 90.0;
    }
    angle
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deskew_options_default() {
        let opts = DeskewOptions::default();
        assert_eq!(opts.max_angle, 15.0);
        assert_eq!(opts.angle_step, 0.1);
        assert_eq!(opts.max_working_side, 2000);
        assert!(matches!(opts.algorithm, DeskewAlgorithm::MinAreaRect));
    }

    #[test]
    fn test_deskew_options_presets() {
        let opts = DeskewOptions::high_quality();
        assert!(matches!(opts.algorithm, DeskewAlgorithm::Combined));
        assert_eq!(opts.max_working_side, 4000);

        let opts = DeskewOptions::fast();
        assert_eq!(opts.noise_radius, 0);
        assert_eq!(opts.max_working_side, 1000);
    }

    #[test]
    fn test_deskew_options_builder() {
        let opts = DeskewOptions::builder()
            .algorithm(DeskewAlgorithm::ProjectionProfile)
            .max_angle(-20.0)
            .angle_step(0.0)
            .max_working_side(0)
            .noise_radius(2)
            .build();

        assert!(matches!(opts.algorithm, DeskewAlgorithm::ProjectionProfile));
        assert_eq!(opts.max_angle, 20.0);
        assert_eq!(opts.angle_step, 0.01);
        assert_eq!(opts.max_working_side, 0);
        assert_eq!(opts.noise_radius, 2);
    }

    #[test]
    fn test_builder_caps_max_angle() {
        let opts = DeskewOptions::builder().max_angle(120.0).build();
        assert_eq!(opts.max_angle, 89.0);
    }

    #[test]
    fn test_normalize_angle_range() {
        assert_eq!(normalize_angle(0.0), 0.0);
        assert_eq!(normalize_angle(45.0), 45.0);
        assert_eq!(normalize_angle(90.0), 90.0);
        assert_eq!(normalize_angle(-90.0), 90.0);
        assert_eq!(normalize_angle(135.0), -45.0);
        assert_eq!(normalize_angle(-135.0), 45.0);
        assert_eq!(normalize_angle(270.0), 90.0);
        assert_eq!(normalize_angle(f64::NAN), 0.0);

        for i in -720..=720 {
            let a = normalize_angle(i as f64 * 0.5);
            assert!(a > -90.0 && a <= 90.0, "{} -> {}", i as f64 * 0.5, a);
        }
    }

    #[test]
    fn test_blank_detection() {
        let blank = SkewDetection::blank();
        assert_eq!(blank.angle, 0.0);
        assert_eq!(blank.confidence, 0.0);
        assert_eq!(blank.feature_count, 0);
    }

    #[test]
    fn test_error_types() {
        let _err1 = DeskewError::ImageNotFound(PathBuf::from("/test"));
        let _err2 = DeskewError::ImageDecode("bad".to_string());
    }
}
