//! Skew estimation module
//!
//! Estimates the tilt of the text baselines on a rasterized page so that
//! recognized word boxes can be mapped back onto the unrotated page.
//!
//! # Features
//!
//! - Minimum-area rectangle and projection profile detectors
//! - Confidence-weighted combination of both
//! - Downscaling and speckle removal before analysis
//!
//! # Example
//!
//! ```rust,no_run
//! use textlayer_pdf::{DeskewOptions, SkewEstimator};
//! use std::path::Path;
//!
//! let options = DeskewOptions::builder().max_angle(10.0).build();
//! let detection = SkewEstimator::estimate_path(Path::new("page.png"), &options).unwrap();
//!
//! println!("Detected angle: {:.2}°", detection.angle);
//! ```

mod algorithm;
mod types;

pub use algorithm::SkewEstimator;
pub use types::{
    normalize_angle, DeskewAlgorithm, DeskewError, DeskewOptions, DeskewOptionsBuilder, Result,
    SkewDetection, DEFAULT_ANGLE_STEP, DEFAULT_MAX_ANGLE, DEFAULT_MAX_WORKING_SIDE,
    DEFAULT_NOISE_RADIUS, MIN_FOREGROUND_PIXELS,
};

/// Skew of `image` with default options
pub fn estimate_skew(image: &image::DynamicImage) -> SkewDetection {
    SkewEstimator::estimate(image, &DeskewOptions::default())
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{DynamicImage, GrayImage, Luma};

    #[test]
    fn test_public_api_roundtrip() {
        let options = DeskewOptions::builder()
            .algorithm(DeskewAlgorithm::Combined)
            .max_angle(10.0)
            .build();
        let img = DynamicImage::ImageLuma8(GrayImage::from_pixel(64, 64, Luma([255])));

        let detection = SkewEstimator::estimate(&img, &options);
        assert_eq!(detection, SkewDetection::blank());
        assert_eq!(estimate_skew(&img), SkewDetection::blank());
    }

    #[test]
    fn test_single_dot_is_blank() {
        let mut img = GrayImage::from_pixel(100, 100, Luma([255]));
        img.put_pixel(50, 50, Luma([0]));
        let detection = SkewEstimator::estimate_gray(&img, &DeskewOptions::default());
        assert_eq!(detection.angle, 0.0);
    }

    #[test]
    fn test_algorithm_serde_names() {
        let json = serde_json::to_string(&DeskewAlgorithm::ProjectionProfile).unwrap();
        assert_eq!(json, "\"projection-profile\"");
        let parsed: DeskewAlgorithm = serde_json::from_str("\"min-area-rect\"").unwrap();
        assert_eq!(parsed, DeskewAlgorithm::MinAreaRect);
    }
}
