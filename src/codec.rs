//! Image codec.
//!
//! Decodes stored bytes into pixels and encodes pixels into the format
//! implied by a file extension. All calls are CPU bound; async callers run
//! them inside `spawn_blocking`.
//!
//! - **JPEG**: always written as 8-bit RGB at the configured quality.
//! - **PNG**: fast compression with adaptive filtering.
//! - **GIF**: single RGBA frame.

use bytes::Bytes;
use image::codecs::gif::GifEncoder;
use image::codecs::jpeg::JpegEncoder;
use image::codecs::png::{CompressionType, FilterType as PngFilterType, PngEncoder};
use image::{DynamicImage, Frame, ImageFormat};

use crate::error::CodecError;

/// Default JPEG quality (1-100).
pub const DEFAULT_JPEG_QUALITY: u8 = 85;

/// Minimum allowed JPEG quality.
pub const MIN_JPEG_QUALITY: u8 = 1;

/// Maximum allowed JPEG quality.
pub const MAX_JPEG_QUALITY: u8 = 100;

// =============================================================================
// Codec
// =============================================================================

/// Extension-driven image encoder/decoder.
#[derive(Debug, Clone, Copy)]
pub struct ImageCodec {
    jpeg_quality: u8,
}

impl ImageCodec {
    /// Create a codec writing JPEG at `jpeg_quality` (clamped to 1-100).
    pub fn new(jpeg_quality: u8) -> Self {
        Self {
            jpeg_quality: clamp_quality(jpeg_quality),
        }
    }

    pub fn jpeg_quality(&self) -> u8 {
        self.jpeg_quality
    }

    /// Decode bytes in any supported format, detected from content.
    pub fn decode(&self, data: &[u8]) -> Result<DynamicImage, CodecError> {
        Ok(image::load_from_memory(data)?)
    }

    /// Encode `image` into the format implied by `extension`.
    pub fn encode(&self, image: &DynamicImage, extension: &str) -> Result<Bytes, CodecError> {
        let format = format_for_extension(extension)
            .ok_or_else(|| CodecError::UnsupportedFormat(extension.to_string()))?;

        let mut output = Vec::new();
        match format {
            ImageFormat::Jpeg => {
                let encoder = JpegEncoder::new_with_quality(&mut output, self.jpeg_quality);
                DynamicImage::ImageRgb8(image.to_rgb8()).write_with_encoder(encoder)?;
            }
            ImageFormat::Png => {
                let encoder = PngEncoder::new_with_quality(
                    &mut output,
                    CompressionType::Fast,
                    PngFilterType::Adaptive,
                );
                image.write_with_encoder(encoder)?;
            }
            ImageFormat::Gif => {
                let mut encoder = GifEncoder::new(&mut output);
                encoder.encode_frame(Frame::new(image.to_rgba8()))?;
            }
            _ => return Err(CodecError::UnsupportedFormat(extension.to_string())),
        }

        Ok(Bytes::from(output))
    }
}

impl Default for ImageCodec {
    fn default() -> Self {
        Self::new(DEFAULT_JPEG_QUALITY)
    }
}

// =============================================================================
// Utility Functions
// =============================================================================

/// Output format for a file extension, if this build can encode it.
pub fn format_for_extension(extension: &str) -> Option<ImageFormat> {
    match extension.to_ascii_lowercase().as_str() {
        "jpg" | "jpeg" => Some(ImageFormat::Jpeg),
        "png" => Some(ImageFormat::Png),
        "gif" => Some(ImageFormat::Gif),
        _ => None,
    }
}

/// Detect the image format from the leading bytes.
pub fn sniff_format(data: &[u8]) -> Option<ImageFormat> {
    image::guess_format(data).ok()
}

/// Clamp quality to valid range.
#[inline]
pub fn clamp_quality(quality: u8) -> u8 {
    quality.clamp(MIN_JPEG_QUALITY, MAX_JPEG_QUALITY)
}

// =============================================================================
// Tests
// =============================================================================
