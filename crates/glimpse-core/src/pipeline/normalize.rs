//! Pre-transmission image normalization.
//!
//! Decides whether an image needs to be shrunk before it is sent to a
//! provider, and if so resizes and re-encodes it to fit a byte budget:
//!
//! 1. Downscale to fit within [`MAX_DIMENSION`] (never upscale).
//! 2. Re-encode as PNG at best compression.
//! 3. If still over budget, JPEG from quality 90 down to 60 in steps of 5.
//!
//! Normalization is best effort. Every internal failure degrades to
//! forwarding the original bytes, labelled `image/jpeg`.

use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use image::imageops::FilterType;
use serde::Serialize;

use super::decode::{decode_bytes, encode_jpeg, encode_png_best, probe_dimensions};
use super::mime::{sniff_mime, FALLBACK_MIME};
use super::source::{base64_decoded_len, parse_data_uri, to_data_uri, ImageSource, LoadedImage};
use crate::error::ImageError;

/// Longest allowed edge, in pixels, before an image is downscaled.
pub const MAX_DIMENSION: u32 = 1920;

/// First JPEG quality tried once PNG is over budget.
pub const JPEG_START_QUALITY: u8 = 90;

/// Quality decrement between JPEG attempts.
pub const JPEG_QUALITY_STEP: u8 = 5;

/// Lowest JPEG quality tried; its output is returned even if over budget.
pub const JPEG_QUALITY_FLOOR: u8 = 60;

/// When and how hard to compress.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CompressionPolicy {
    /// Whether compression is allowed at all
    pub auto_compress: bool,
    /// Byte budget for the encoded image
    pub max_size_bytes: usize,
}

/// An image ready to embed in a provider request.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NormalizedImage {
    /// Base64-encoded image bytes
    pub base64: String,
    /// MIME type of the encoded bytes
    pub mime_type: String,
    /// Size of the input image in bytes
    pub original_size: usize,
    /// Size after re-encoding, when it happened
    pub compressed_size: Option<usize>,
    /// Whether the bytes differ from the input
    pub was_compressed: bool,
    /// JPEG quality of the final encoding, when lossy encoding was used
    pub quality: Option<u8>,
}

impl NormalizedImage {
    /// The image as a `data:` URI.
    pub fn data_uri(&self) -> String {
        to_data_uri(&self.mime_type, &self.base64)
    }

    fn unchanged(base64: String, mime_type: &str, original_size: usize) -> Self {
        Self {
            base64,
            mime_type: mime_type.to_string(),
            original_size,
            compressed_size: None,
            was_compressed: false,
            quality: None,
        }
    }

    /// Original payload forwarded as opaque JPEG after a failure.
    fn fallback(base64: String) -> Self {
        let original_size = base64_decoded_len(&base64);
        Self::unchanged(base64, FALLBACK_MIME, original_size)
    }
}

/// Result of re-encoding a decoded image.
struct Encoded {
    bytes: Vec<u8>,
    mime_type: &'static str,
    quality: Option<u8>,
}

/// Resizes and recompresses images according to a [`CompressionPolicy`].
#[derive(Debug, Clone, Copy)]
pub struct ImageNormalizer {
    policy: CompressionPolicy,
}

impl ImageNormalizer {
    pub fn new(policy: CompressionPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> CompressionPolicy {
        self.policy
    }

    /// Normalize an image for transmission. Never fails.
    pub fn normalize(&self, source: ImageSource) -> NormalizedImage {
        if !self.policy.auto_compress {
            return Self::passthrough(source);
        }

        let loaded = match source.load() {
            Ok(loaded) => loaded,
            Err((text, e)) => {
                tracing::warn!("Image normalization skipped: {e}");
                return NormalizedImage::fallback(text);
            }
        };

        match self.recompress(&loaded.bytes) {
            Ok(None) => {
                let mime = Self::effective_mime(&loaded).to_string();
                let original_size = loaded.bytes.len();
                NormalizedImage::unchanged(loaded.into_base64(), &mime, original_size)
            }
            Ok(Some(encoded)) => {
                let original_size = loaded.bytes.len();
                tracing::debug!(
                    "Compressed image {} -> {} bytes as {} (quality {:?})",
                    original_size,
                    encoded.bytes.len(),
                    encoded.mime_type,
                    encoded.quality
                );
                NormalizedImage {
                    base64: BASE64.encode(&encoded.bytes),
                    mime_type: encoded.mime_type.to_string(),
                    original_size,
                    compressed_size: Some(encoded.bytes.len()),
                    was_compressed: true,
                    quality: encoded.quality,
                }
            }
            Err(e) => {
                tracing::warn!("Image compression failed, sending original: {e}");
                let original_size = loaded.bytes.len();
                NormalizedImage::unchanged(loaded.into_base64(), FALLBACK_MIME, original_size)
            }
        }
    }

    /// Forward the image without touching its bytes.
    ///
    /// Text inputs are never base64-decoded on this path.
    fn passthrough(source: ImageSource) -> NormalizedImage {
        match source {
            ImageSource::DataUri(uri) => match parse_data_uri(&uri) {
                Some((mime, data)) => {
                    NormalizedImage::unchanged(data.to_string(), mime, base64_decoded_len(data))
                }
                None => NormalizedImage::fallback(uri),
            },
            ImageSource::Base64 { data, mime_type } => {
                let size = base64_decoded_len(&data);
                NormalizedImage::unchanged(data, &mime_type, size)
            }
            other => match other.load() {
                Ok(loaded) => {
                    let mime = Self::effective_mime(&loaded).to_string();
                    let size = loaded.bytes.len();
                    NormalizedImage::unchanged(loaded.into_base64(), &mime, size)
                }
                Err((text, _)) => NormalizedImage::fallback(text),
            },
        }
    }

    /// MIME type of unchanged bytes: sniffed, then declared, then JPEG.
    fn effective_mime(loaded: &LoadedImage) -> &str {
        sniff_mime(&loaded.bytes)
            .or(loaded.declared_mime.as_deref())
            .unwrap_or(FALLBACK_MIME)
    }

    /// Re-encode the image if it is too large, returning `None` if it fits.
    fn recompress(&self, bytes: &[u8]) -> Result<Option<Encoded>, ImageError> {
        let (width, height) = probe_dimensions(bytes)?;
        let needs_resize = width > MAX_DIMENSION || height > MAX_DIMENSION;
        let needs_compress = bytes.len() > self.policy.max_size_bytes;

        if !needs_resize && !needs_compress {
            return Ok(None);
        }

        let image = decode_bytes(bytes)?;
        let image = if needs_resize {
            image.resize(MAX_DIMENSION, MAX_DIMENSION, FilterType::Lanczos3)
        } else {
            image
        };

        let png = encode_png_best(&image)?;
        if png.len() <= self.policy.max_size_bytes {
            return Ok(Some(Encoded {
                bytes: png,
                mime_type: "image/png",
                quality: None,
            }));
        }

        let mut quality = JPEG_START_QUALITY;
        loop {
            let jpeg = encode_jpeg(&image, quality)?;
            if jpeg.len() <= self.policy.max_size_bytes || quality <= JPEG_QUALITY_FLOOR {
                return Ok(Some(Encoded {
                    bytes: jpeg,
                    mime_type: "image/jpeg",
                    quality: Some(quality),
                }));
            }
            quality = quality.saturating_sub(JPEG_QUALITY_STEP).max(JPEG_QUALITY_FLOOR);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::decode::sample_image;
    use image::ImageFormat;

    fn normalizer(auto_compress: bool, max_size_bytes: usize) -> ImageNormalizer {
        ImageNormalizer::new(CompressionPolicy {
            auto_compress,
            max_size_bytes,
        })
    }

    fn decode_output(out: &NormalizedImage) -> Vec<u8> {
        BASE64.decode(&out.base64).unwrap()
    }

    #[test]
    fn test_small_image_is_passed_through_byte_identical() {
        let png = sample_image(100, 80, ImageFormat::Png);
        let input = BASE64.encode(&png);
        let out = normalizer(true, 10 * 1024 * 1024).normalize(ImageSource::Base64 {
            data: input.clone(),
            mime_type: "image/png".into(),
        });
        assert!(!out.was_compressed);
        assert_eq!(out.base64, input);
        assert_eq!(out.mime_type, "image/png");
        assert_eq!(out.original_size, png.len());
        assert_eq!(out.compressed_size, None);
    }

    #[test]
    fn test_unchanged_bytes_use_sniffed_mime_over_declared() {
        let jpeg = sample_image(50, 50, ImageFormat::Jpeg);
        let out = normalizer(true, usize::MAX).normalize(ImageSource::Base64 {
            data: BASE64.encode(&jpeg),
            mime_type: "image/png".into(),
        });
        assert_eq!(out.mime_type, "image/jpeg");
    }

    #[test]
    fn test_disabled_compression_skips_decoding_data_uri() {
        // Invalid base64 would fail to decode; passthrough must not care.
        let uri = "data:image/webp;base64,@@not-really-base64@@";
        let out = normalizer(false, 1).normalize(ImageSource::DataUri(uri.to_string()));
        assert!(!out.was_compressed);
        assert_eq!(out.base64, "@@not-really-base64@@");
        assert_eq!(out.mime_type, "image/webp");
    }

    #[test]
    fn test_disabled_compression_keeps_oversized_image() {
        let png = sample_image(2500, 100, ImageFormat::Png);
        let out = normalizer(false, 10).normalize(ImageSource::Bytes(png.clone()));
        assert!(!out.was_compressed);
        assert_eq!(decode_output(&out), png);
        assert_eq!(out.mime_type, "image/png");
    }

    #[test]
    fn test_oversized_dimensions_are_downscaled_preserving_aspect() {
        let png = sample_image(3840, 1000, ImageFormat::Png);
        let out = normalizer(true, 50 * 1024 * 1024).normalize(ImageSource::Bytes(png));
        assert!(out.was_compressed);
        assert_eq!(out.mime_type, "image/png");

        let (w, h) = probe_dimensions(&decode_output(&out)).unwrap();
        assert_eq!(w, MAX_DIMENSION);
        assert_eq!(h, 500);
    }

    #[test]
    fn test_lossless_output_fits_within_dimension_cap() {
        let png = sample_image(2000, 2400, ImageFormat::Png);
        let out = normalizer(true, 100 * 1024 * 1024).normalize(ImageSource::Bytes(png));
        assert_eq!(out.mime_type, "image/png");
        let (w, h) = probe_dimensions(&decode_output(&out)).unwrap();
        assert!(w <= MAX_DIMENSION && h <= MAX_DIMENSION);
    }

    #[test]
    fn test_byte_budget_met_or_quality_floor_reached() {
        let png = sample_image(800, 600, ImageFormat::Png);
        let budget = png.len() / 10;
        let out = normalizer(true, budget).normalize(ImageSource::Bytes(png));
        assert!(out.was_compressed);
        assert_eq!(out.mime_type, "image/jpeg");
        let size = out.compressed_size.unwrap();
        assert_eq!(size, decode_output(&out).len());
        assert!(size <= budget || out.quality == Some(JPEG_QUALITY_FLOOR));
    }

    #[test]
    fn test_impossible_budget_stops_at_quality_floor() {
        let png = sample_image(400, 400, ImageFormat::Png);
        let out = normalizer(true, 16).normalize(ImageSource::Bytes(png));
        assert!(out.was_compressed);
        assert_eq!(out.quality, Some(JPEG_QUALITY_FLOOR));
        assert!(out.compressed_size.unwrap() > 16);
    }

    #[test]
    fn test_corrupt_image_falls_back_to_original_bytes() {
        let garbage = b"this is not an image at all".to_vec();
        let input = BASE64.encode(&garbage);
        let out = normalizer(true, 1).normalize(ImageSource::DataUri(format!(
            "data:image/png;base64,{input}"
        )));
        assert!(!out.was_compressed);
        assert_eq!(out.base64, input);
        assert_eq!(out.mime_type, "image/jpeg");
    }

    #[test]
    fn test_invalid_base64_falls_back_to_original_text() {
        let out = normalizer(true, 1).normalize(ImageSource::Base64 {
            data: "%%%".into(),
            mime_type: "image/png".into(),
        });
        assert!(!out.was_compressed);
        assert_eq!(out.base64, "%%%");
        assert_eq!(out.mime_type, "image/jpeg");
    }

    #[test]
    fn test_data_uri_round_trip() {
        let png = sample_image(10, 10, ImageFormat::Png);
        let out = normalizer(true, usize::MAX).normalize(ImageSource::Bytes(png));
        assert!(out.data_uri().starts_with("data:image/png;base64,"));
    }
}
