//! Deterministic image transforms for applicant uploads.
//!
//! Uploads are resized to a fixed width, re-encoded as JPEG, and a "fixed"
//! variant gets the standard cleanup pass (brighten, sharpen, normalise).
//! Admins can then re-run the pipeline with explicit adjustments when a
//! page needs manual correction.

use image::{imageops, RgbImage};
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const UPLOAD_WIDTH: u32 = 1240;
pub const STANDARD_BRIGHTNESS_BOOST: f32 = 1.2;
const JPEG_QUALITY: u8 = 85;

const SHARPEN_BASE_KERNEL: [f32; 9] = [0.0, -1.0, 0.0, -1.0, 5.0, -1.0, 0.0, -1.0, 0.0];

#[derive(Debug, Error)]
pub enum ImagingError {
    #[error("image processing failed: {0}")]
    Image(#[from] image::ImageError),
    #[error("unsupported rotation angle {0}")]
    Rotation(u16),
}

/// Manual correction parameters stored on a page. Absent fields mean the
/// corresponding step is skipped entirely.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ImageAdjustments {
    pub brightness: Option<f32>,
    pub sharpness: Option<f32>,
    pub contrast: Option<f32>,
    pub rotate_right: Option<u16>,
    #[serde(default)]
    pub normalise: bool,
}

impl ImageAdjustments {
    /// The cleanup applied to every fixed upload artifact.
    pub fn standard() -> Self {
        ImageAdjustments {
            brightness: Some(STANDARD_BRIGHTNESS_BOOST),
            sharpness: Some(0.0),
            contrast: None,
            rotate_right: None,
            normalise: true,
        }
    }

    pub fn is_noop(&self) -> bool {
        *self == ImageAdjustments::default()
    }
}

pub fn decode(bytes: &[u8]) -> Result<RgbImage, ImagingError> {
    Ok(image::load_from_memory(bytes)?.to_rgb8())
}

pub fn encode_jpeg(image: &RgbImage) -> Result<Vec<u8>, ImagingError> {
    let mut buffer = Vec::new();
    let mut encoder = image::codecs::jpeg::JpegEncoder::new_with_quality(&mut buffer, JPEG_QUALITY);
    encoder.encode(
        image.as_raw(),
        image.width(),
        image.height(),
        image::ExtendedColorType::Rgb8,
    )?;
    Ok(buffer)
}

/// Scales to the standard upload width, preserving aspect ratio.
pub fn resize_to_upload_width(image: &RgbImage) -> RgbImage {
    resize_to_width(image, UPLOAD_WIDTH)
}

pub fn resize_to_width(image: &RgbImage, width: u32) -> RgbImage {
    if image.width() == width {
        return image.clone();
    }
    let height =
        ((u64::from(image.height()) * u64::from(width)) / u64::from(image.width())).max(1) as u32;
    imageops::resize(image, width, height, imageops::FilterType::Lanczos3)
}

/// Applies the adjustment steps in a fixed order: brightness, sharpen,
/// contrast, rotate, normalise. Each step is independently skippable.
pub fn apply_adjustments(
    image: RgbImage,
    adjustments: &ImageAdjustments,
) -> Result<RgbImage, ImagingError> {
    let mut image = image;

    if let Some(brightness) = adjustments.brightness {
        image = scale_brightness(&image, brightness);
    }

    if let Some(sharpness) = adjustments.sharpness {
        image = sharpen(&image, sharpness);
    }

    if let Some(contrast) = adjustments.contrast {
        image = linear_contrast(&image, contrast);
    }

    if let Some(angle) = adjustments.rotate_right {
        image = rotate_right(&image, angle)?;
    }

    if adjustments.normalise {
        image = normalise(&image);
    }

    Ok(image)
}

/// Per-channel linear multiplier.
pub fn scale_brightness(image: &RgbImage, factor: f32) -> RgbImage {
    map_channels(image, |v| f32::from(v) * factor)
}

/// 3x3 sharpening. An amount of zero means the stock kernel; a positive
/// amount scales the edge weight.
pub fn sharpen(image: &RgbImage, amount: f32) -> RgbImage {
    if amount == 0.0 {
        return imageops::filter3x3(image, &SHARPEN_BASE_KERNEL);
    }
    let kernel = [
        0.0,
        -amount,
        0.0,
        -amount,
        1.0 + 4.0 * amount,
        -amount,
        0.0,
        -amount,
        0.0,
    ];
    imageops::filter3x3(image, &kernel)
}

/// `c*v + (-128*c + 128)` — the linear contrast transform. The offset must
/// stay exactly this expression; output parity with the previous system
/// depends on it.
pub fn linear_contrast(image: &RgbImage, factor: f32) -> RgbImage {
    let offset = contrast_offset(factor);
    map_channels(image, |v| f32::from(v) * factor + offset)
}

pub fn contrast_offset(factor: f32) -> f32 {
    -(128.0 * factor) + 128.0
}

pub fn rotate_right(image: &RgbImage, angle: u16) -> Result<RgbImage, ImagingError> {
    match angle {
        0 => Ok(image.clone()),
        90 => Ok(imageops::rotate90(image)),
        180 => Ok(imageops::rotate180(image)),
        270 => Ok(imageops::rotate270(image)),
        other => Err(ImagingError::Rotation(other)),
    }
}

/// Stretches the intensity histogram to the full 0..255 range.
pub fn normalise(image: &RgbImage) -> RgbImage {
    let mut min = u8::MAX;
    let mut max = u8::MIN;
    for value in image.as_raw() {
        min = min.min(*value);
        max = max.max(*value);
    }
    if min >= max {
        return image.clone();
    }
    let span = f32::from(max - min);
    map_channels(image, |v| f32::from(v - min) * 255.0 / span)
}

fn map_channels(image: &RgbImage, f: impl Fn(u8) -> f32) -> RgbImage {
    let mut out = image.clone();
    for pixel in out.pixels_mut() {
        for channel in pixel.0.iter_mut() {
            *channel = f(*channel).round().clamp(0.0, 255.0) as u8;
        }
    }
    out
}

// --- quality gate -----------------------------------------------------------

pub const MIN_BRIGHTNESS: f64 = 0.3;
pub const MIN_SHARPNESS: f64 = 0.9;
pub const MIN_CONTRAST: f64 = 0.75;

/// Resubmissions beyond this count are accepted regardless of quality so an
/// applicant is never locked out by their camera.
pub const MAX_RESUBMISSIONS: i32 = 3;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct QualityScores {
    pub brightness: f64,
    pub sharpness: f64,
    pub contrast: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QualityVerdict {
    Accepted,
    Rejected,
}

pub fn assess_quality(scores: &QualityScores, submission_count: i32) -> QualityVerdict {
    if submission_count > MAX_RESUBMISSIONS {
        return QualityVerdict::Accepted;
    }
    let passes = scores.brightness > MIN_BRIGHTNESS
        && scores.sharpness > MIN_SHARPNESS
        && scores.contrast > MIN_CONTRAST;
    if passes {
        QualityVerdict::Accepted
    } else {
        QualityVerdict::Rejected
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    fn gray(width: u32, height: u32, value: u8) -> RgbImage {
        RgbImage::from_pixel(width, height, Rgb([value, value, value]))
    }

    #[test]
    fn contrast_offset_matches_the_linear_formula() {
        assert_eq!(contrast_offset(1.5), -64.0);
        assert_eq!(contrast_offset(1.0), 0.0);
    }

    #[test]
    fn linear_contrast_pulls_midtones_apart() {
        let image = gray(2, 2, 200);
        let out = linear_contrast(&image, 1.5);
        // 1.5 * 200 - 64 = 236
        assert_eq!(out.get_pixel(0, 0).0, [236, 236, 236]);

        let dark = linear_contrast(&gray(1, 1, 50), 1.5);
        // 1.5 * 50 - 64 = 11
        assert_eq!(dark.get_pixel(0, 0).0, [11, 11, 11]);
    }

    #[test]
    fn brightness_scaling_clamps() {
        let out = scale_brightness(&gray(1, 1, 100), 1.2);
        assert_eq!(out.get_pixel(0, 0).0, [120, 120, 120]);
        let clamped = scale_brightness(&gray(1, 1, 240), 1.2);
        assert_eq!(clamped.get_pixel(0, 0).0, [255, 255, 255]);
    }

    #[test]
    fn normalise_stretches_to_full_range() {
        let mut image = gray(2, 1, 100);
        image.put_pixel(1, 0, Rgb([150, 150, 150]));
        let out = normalise(&image);
        assert_eq!(out.get_pixel(0, 0).0, [0, 0, 0]);
        assert_eq!(out.get_pixel(1, 0).0, [255, 255, 255]);
    }

    #[test]
    fn normalise_leaves_flat_images_alone() {
        let image = gray(2, 2, 90);
        assert_eq!(normalise(&image).as_raw(), image.as_raw());
    }

    #[test]
    fn rotation_swaps_dimensions_on_quarter_turns() {
        let image = gray(4, 2, 10);
        assert_eq!(rotate_right(&image, 90).unwrap().dimensions(), (2, 4));
        assert_eq!(rotate_right(&image, 180).unwrap().dimensions(), (4, 2));
        assert!(rotate_right(&image, 45).is_err());
    }

    #[test]
    fn resize_preserves_aspect_ratio() {
        let image = gray(2480, 1240, 10);
        let out = resize_to_upload_width(&image);
        assert_eq!(out.dimensions(), (1240, 620));
    }

    #[test]
    fn noop_adjustments_change_nothing() {
        let image = gray(3, 3, 77);
        let out = apply_adjustments(image.clone(), &ImageAdjustments::default()).unwrap();
        assert_eq!(out.as_raw(), image.as_raw());
    }

    #[test]
    fn quality_gate_accepts_good_scans() {
        let scores = QualityScores {
            brightness: 0.35,
            sharpness: 0.95,
            contrast: 0.8,
        };
        assert_eq!(assess_quality(&scores, 0), QualityVerdict::Accepted);
    }

    #[test]
    fn quality_gate_rejects_dark_scans_within_the_limit() {
        let scores = QualityScores {
            brightness: 0.1,
            sharpness: 0.95,
            contrast: 0.8,
        };
        assert_eq!(assess_quality(&scores, 1), QualityVerdict::Rejected);
    }

    #[test]
    fn quality_gate_force_accepts_past_the_resubmission_limit() {
        let scores = QualityScores {
            brightness: 0.1,
            sharpness: 0.95,
            contrast: 0.8,
        };
        assert_eq!(assess_quality(&scores, 4), QualityVerdict::Accepted);
    }
}
