//! Skew Estimation Algorithms
//!
//! Contains the `SkewEstimator` implementation.
//!
//! Every algorithm works on the same foreground set: the page is converted to
//! grayscale, optionally downscaled, binarized with Otsu's threshold (dark
//! pixels are foreground) and cleaned with a morphological opening.

use super::types::{
    normalize_angle, DeskewAlgorithm, DeskewError, DeskewOptions, Result, SkewDetection,
    MIN_FOREGROUND_PIXELS,
};
use geo::{Coord, MinimumRotatedRect, MultiPoint, Point};
use image::imageops::FilterType;
use image::{DynamicImage, GrayImage, Luma};
use imageproc::distance_transform::Norm;
use std::path::Path;
use tracing::{debug, instrument};

/// Upper bound on points fed to the projection sweep
const MAX_PROJECTION_POINTS: usize = 200_000;

/// Foreground value in binarized images
const FOREGROUND: u8 = 255;

/// Skew estimator over rasterized page images
pub struct SkewEstimator;

impl SkewEstimator {
    /// Estimate skew of an image file
    pub fn estimate_path(image_path: &Path, options: &DeskewOptions) -> Result<SkewDetection> {
        if !image_path.exists() {
            return Err(DeskewError::ImageNotFound(image_path.to_path_buf()));
        }
        let img =
            image::open(image_path).map_err(|e| DeskewError::ImageDecode(e.to_string()))?;
        Ok(Self::estimate(&img, options))
    }

    /// Estimate skew of an encoded image held in memory
    pub fn estimate_bytes(bytes: &[u8], options: &DeskewOptions) -> Result<SkewDetection> {
        let img =
            image::load_from_memory(bytes).map_err(|e| DeskewError::ImageDecode(e.to_string()))?;
        Ok(Self::estimate(&img, options))
    }

    /// Estimate skew of a decoded image
    #[instrument(level = "debug", skip(image, options), fields(width = image.width(), height = image.height()))]
    pub fn estimate(image: &DynamicImage, options: &DeskewOptions) -> SkewDetection {
        let gray = image.to_luma8();
        Self::estimate_gray(&gray, options)
    }

    /// Estimate skew of a grayscale image
    pub fn estimate_gray(gray: &GrayImage, options: &DeskewOptions) -> SkewDetection {
        let working = Self::downscale(gray, options.max_working_side);
        let Some(binary) = Self::binarize(&working, options.noise_radius) else {
            debug!("no contrast in page image, reporting zero skew");
            return SkewDetection::blank();
        };

        let points = Self::foreground_points(&binary);
        if points.len() < MIN_FOREGROUND_PIXELS {
            debug!(foreground = points.len(), "too little foreground for skew estimation");
            return SkewDetection::blank();
        }

        let detection = match options.algorithm {
            DeskewAlgorithm::MinAreaRect => Self::detect_min_area_rect(&points),
            DeskewAlgorithm::ProjectionProfile => Self::detect_projection(&points, options),
            DeskewAlgorithm::Combined => Self::detect_combined(&points, options),
        };

        let detection = SkewDetection {
            angle: normalize_angle(detection.angle),
            ..detection
        };
        debug!(
            angle = detection.angle,
            confidence = detection.confidence,
            features = detection.feature_count,
            "estimated skew"
        );
        detection
    }

    /// Uniformly shrink the image so its longest side fits `max_side`
    fn downscale(gray: &GrayImage, max_side: u32) -> GrayImage {
        let (width, height) = gray.dimensions();
        let longest = width.max(height);
        if max_side == 0 || longest <= max_side {
            return gray.clone();
        }
        let scale = max_side as f64 / longest as f64;
        let new_width = ((width as f64 * scale).round() as u32).max(1);
        let new_height = ((height as f64 * scale).round() as u32).max(1);
        image::imageops::resize(gray, new_width, new_height, FilterType::Triangle)
    }

    /// Otsu binarization with dark pixels as foreground.
    ///
    /// Returns `None` for images without any contrast.
    pub fn binarize(gray: &GrayImage, noise_radius: u8) -> Option<GrayImage> {
        let (min, max) = gray
            .pixels()
            .fold((u8::MAX, u8::MIN), |(lo, hi), p| (lo.min(p.0[0]), hi.max(p.0[0])));
        if gray.width() == 0 || gray.height() == 0 || min == max {
            return None;
        }

        let level = imageproc::contrast::otsu_level(gray);
        let mut binary = GrayImage::new(gray.width(), gray.height());
        for (x, y, pixel) in gray.enumerate_pixels() {
            let value = if pixel.0[0] <= level { FOREGROUND } else { 0 };
            binary.put_pixel(x, y, Luma([value]));
        }

        if noise_radius > 0 {
            binary = imageproc::morphology::open(&binary, Norm::LInf, noise_radius);
        }
        Some(binary)
    }

    /// Foreground pixel centres in pixel coordinates (y down)
    fn foreground_points(binary: &GrayImage) -> Vec<(f64, f64)> {
        binary
            .enumerate_pixels()
            .filter(|(_, _, p)| p.0[0] == FOREGROUND)
            .map(|(x, y, _)| (x as f64 + 0.5, y as f64 + 0.5))
            .collect()
    }

    /// Angle of the minimum-area rectangle edge closest to horizontal
    fn detect_min_area_rect(points: &[(f64, f64)]) -> SkewDetection {
        let cloud: MultiPoint<f64> = points.iter().map(|&(x, y)| Point::new(x, y)).collect();
        let Some(rect) = cloud.minimum_rotated_rect() else {
            return SkewDetection::blank();
        };
        let corners: Vec<Coord<f64>> = rect.exterior().coords().take(4).copied().collect();
        if corners.len() < 3 {
            return SkewDetection::blank();
        }

        let edges = [corners[1] - corners[0], corners[2] - corners[1]];
        let lengths = [edges[0].x.hypot(edges[0].y), edges[1].x.hypot(edges[1].y)];
        // Pixel space has y pointing down, so negate it for a CCW-positive angle
        let angles = edges.map(|e| normalize_angle((-e.y).atan2(e.x).to_degrees()));
        let horizontal = if angles[0].abs() <= angles[1].abs() { 0 } else { 1 };

        let long = lengths[0].max(lengths[1]);
        let short = lengths[0].min(lengths[1]);
        if long <= f64::EPSILON || !angles[horizontal].is_finite() {
            return SkewDetection::blank();
        }

        SkewDetection {
            angle: angles[horizontal],
            confidence: (1.0 - short / long).clamp(0.0, 1.0),
            feature_count: points.len(),
        }
    }

    /// Sweep candidate angles and keep the one with the sharpest row profile
    fn detect_projection(points: &[(f64, f64)], options: &DeskewOptions) -> SkewDetection {
        let stride = points.len().div_ceil(MAX_PROJECTION_POINTS).max(1);
        let sample: Vec<(f64, f64)> = points.iter().step_by(stride).copied().collect();

        let radius = sample
            .iter()
            .map(|&(x, y)| x.hypot(y))
            .fold(0.0f64, f64::max)
            .ceil() as usize;
        let mut bins = vec![0u32; 2 * radius + 2];

        let step = options.angle_step.max(0.01);
        let steps = (options.max_angle / step).floor() as i64;

        let mut best_angle = 0.0;
        let mut best_score = f64::MIN;
        let mut worst_score = f64::MAX;

        // Visit 0, +1, -1, +2, -2 ... so ties resolve towards the smaller tilt
        let order = std::iter::once(0).chain((1..=steps).flat_map(|i| [i, -i]));
        for i in order {
            let angle = i as f64 * step;
            let score = Self::profile_score(&sample, angle, radius, &mut bins);
            if score > best_score {
                best_score = score;
                best_angle = angle;
            }
            worst_score = worst_score.min(score);
        }

        let confidence = if best_score > 0.0 {
            ((best_score - worst_score) / best_score).clamp(0.0, 1.0)
        } else {
            0.0
        };

        SkewDetection {
            angle: best_angle,
            confidence,
            feature_count: sample.len(),
        }
    }

    /// Sum of squared bin counts of the projection onto the baseline normal
    fn profile_score(points: &[(f64, f64)], angle: f64, radius: usize, bins: &mut [u32]) -> f64 {
        bins.iter_mut().for_each(|b| *b = 0);
        let (sin, cos) = angle.to_radians().sin_cos();
        for &(x, y) in points {
            // Baseline normal coordinate in a y-up frame
            let r = -x * sin - y * cos;
            let index = (r.round() as i64 + radius as i64).clamp(0, bins.len() as i64 - 1);
            bins[index as usize] += 1;
        }
        bins.iter().map(|&c| (c as f64) * (c as f64)).sum()
    }

    /// Confidence-weighted average of both detectors
    fn detect_combined(points: &[(f64, f64)], options: &DeskewOptions) -> SkewDetection {
        let rect = Self::detect_min_area_rect(points);
        let projection = Self::detect_projection(points, options);

        let total_confidence = rect.confidence + projection.confidence;
        if total_confidence == 0.0 {
            return SkewDetection::blank();
        }

        let weighted_angle = (rect.angle * rect.confidence
            + projection.angle * projection.confidence)
            / total_confidence;

        SkewDetection {
            angle: weighted_angle,
            confidence: total_confidence / 2.0,
            feature_count: rect.feature_count.max(projection.feature_count),
        }
    }
}
