//! Resize primitive.
//!
//! Derivatives are produced with Lanczos3. When both dimensions are requested
//! the source is scaled to cover the box and center-cropped, so the output is
//! exactly `W×H`. When one dimension is unset it is derived from the source
//! aspect ratio, in which case cover-and-crop degenerates to a plain resize.

use image::imageops::FilterType;
use image::{DynamicImage, GenericImageView};

use crate::identity::ResizeSpec;

/// Output dimensions for `spec` applied to a `src_width × src_height` source.
///
/// An unset side is `max(1, floor(set_side × ratio + 0.5))`.
pub fn target_dimensions(src_width: u32, src_height: u32, spec: ResizeSpec) -> (u32, u32) {
    let src_w = src_width.max(1) as f64;
    let src_h = src_height.max(1) as f64;

    match (spec.width, spec.height) {
        (0, 0) => (src_width.max(1), src_height.max(1)),
        (0, h) => (scale(h, src_w / src_h), h),
        (w, 0) => (w, scale(w, src_h / src_w)),
        (w, h) => (w, h),
    }
}

fn scale(side: u32, ratio: f64) -> u32 {
    let value = (side as f64 * ratio + 0.5).floor();
    if value < 1.0 {
        1
    } else if value > u32::MAX as f64 {
        u32::MAX
    } else {
        value as u32
    }
}

/// Size of the intermediate image that covers the target box before the
/// center crop. Never smaller than the target; equal to it when one side is
/// derived from the aspect ratio.
pub fn fill_dimensions(src_width: u32, src_height: u32, spec: ResizeSpec) -> (u64, u64) {
    let (width, height) = target_dimensions(src_width, src_height, spec);
    let src_w = src_width.max(1) as f64;
    let src_h = src_height.max(1) as f64;

    let scale = (width as f64 / src_w).max(height as f64 / src_h);
    let cover = |side: f64| ((side * scale).round() as u64).max(1);
    (cover(src_w).max(width as u64), cover(src_h).max(height as u64))
}

/// Produce the derivative pixels for `spec`.
pub fn resize_to_spec(image: &DynamicImage, spec: ResizeSpec) -> DynamicImage {
    let (src_width, src_height) = image.dimensions();
    let (width, height) = target_dimensions(src_width, src_height, spec);
    image.resize_to_fill(width, height, FilterType::Lanczos3)
}

/// Downscale an upload so that portrait and square images are at most
/// `max_width` wide and landscape images at most `max_height` tall.
/// A limit of 0 disables that rule. Returns `None` when nothing changes.
pub fn bound_upload(image: &DynamicImage, max_width: u32, max_height: u32) -> Option<DynamicImage> {
    let (width, height) = image.dimensions();

    let spec = if width <= height {
        (max_width > 0 && width > max_width).then(|| ResizeSpec::new(max_width, 0))
    } else {
        (max_height > 0 && height > max_height).then(|| ResizeSpec::new(0, max_height))
    }?;

    Some(resize_to_spec(image, spec))
}
