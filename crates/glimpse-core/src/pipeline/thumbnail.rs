//! Thumbnail generation for history display.

use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use image::imageops::FilterType;
use image::DynamicImage;

use super::decode::{decode_bytes, encode_jpeg};
use super::source::{to_data_uri, ImageSource};
use crate::error::ImageError;

/// Edge length of the square thumbnail, in pixels.
pub const THUMBNAIL_SIZE: u32 = 200;

/// JPEG quality used for thumbnails.
pub const THUMBNAIL_QUALITY: u8 = 70;

/// Generates fixed-size, cover-cropped JPEG thumbnails.
pub struct ThumbnailGenerator {
    size: u32,
    quality: u8,
}

impl Default for ThumbnailGenerator {
    fn default() -> Self {
        Self {
            size: THUMBNAIL_SIZE,
            quality: THUMBNAIL_QUALITY,
        }
    }
}

impl ThumbnailGenerator {
    /// Generate a thumbnail and return it as a `data:image/jpeg` URI.
    pub fn generate(&self, source: ImageSource) -> Result<String, ImageError> {
        let bytes = self.generate_bytes(source)?;
        Ok(to_data_uri("image/jpeg", &BASE64.encode(bytes)))
    }

    /// Generate a thumbnail and return the raw JPEG bytes.
    ///
    /// Useful for writing directly to disk.
    pub fn generate_bytes(&self, source: ImageSource) -> Result<Vec<u8>, ImageError> {
        let loaded = source.load().map_err(|(_, e)| e)?;
        let image = decode_bytes(&loaded.bytes)?;
        encode_jpeg(&self.cover_crop(&image), self.quality)
    }

    /// Scale to cover the square, then crop the overflow from the center.
    fn cover_crop(&self, image: &DynamicImage) -> DynamicImage {
        image.resize_to_fill(self.size, self.size, FilterType::Lanczos3)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::decode::{probe_dimensions, sample_image};
    use image::ImageFormat;

    #[test]
    fn test_thumbnail_is_square_cover_crop() {
        let png = sample_image(1000, 500, ImageFormat::Png);
        let bytes = ThumbnailGenerator::default()
            .generate_bytes(ImageSource::Bytes(png))
            .unwrap();
        assert_eq!(&bytes[0..3], &[0xFF, 0xD8, 0xFF]);
        assert_eq!(probe_dimensions(&bytes).unwrap(), (200, 200));
    }

    #[test]
    fn test_small_image_is_upscaled_to_fill() {
        let png = sample_image(50, 20, ImageFormat::Png);
        let bytes = ThumbnailGenerator::default()
            .generate_bytes(ImageSource::Bytes(png))
            .unwrap();
        assert_eq!(probe_dimensions(&bytes).unwrap(), (200, 200));
    }

    #[test]
    fn test_thumbnail_data_uri() {
        let png = sample_image(300, 300, ImageFormat::Png);
        let uri = ThumbnailGenerator::default()
            .generate(ImageSource::Bytes(png))
            .unwrap();
        assert!(uri.starts_with("data:image/jpeg;base64,"));
    }

    #[test]
    fn test_thumbnail_of_garbage_is_an_error() {
        let result =
            ThumbnailGenerator::default().generate(ImageSource::Bytes(b"nope".to_vec()));
        assert!(matches!(result, Err(ImageError::Decode(_))));
    }
}
