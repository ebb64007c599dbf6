//! Image decoding and encoding primitives shared by the normalizer and thumbnails.

use image::codecs::jpeg::JpegEncoder;
use image::codecs::png::{CompressionType, FilterType as PngFilterType, PngEncoder};
use image::{DynamicImage, ImageReader};
use std::io::Cursor;

use crate::error::ImageError;

/// Read image dimensions from the header without decoding pixel data.
pub fn probe_dimensions(bytes: &[u8]) -> Result<(u32, u32), ImageError> {
    ImageReader::new(Cursor::new(bytes))
        .with_guessed_format()
        .map_err(|e| ImageError::Decode(format!("Cannot detect image format: {e}")))?
        .into_dimensions()
        .map_err(|e| ImageError::Decode(e.to_string()))
}

/// Fully decode an in-memory image, detecting the format from its content.
pub fn decode_bytes(bytes: &[u8]) -> Result<DynamicImage, ImageError> {
    let reader = ImageReader::new(Cursor::new(bytes))
        .with_guessed_format()
        .map_err(|e| ImageError::Decode(format!("Cannot detect image format: {e}")))?;
    if reader.format().is_none() {
        return Err(ImageError::Decode("Unrecognized image format".to_string()));
    }
    reader
        .decode()
        .map_err(|e| ImageError::Decode(e.to_string()))
}

/// Encode as PNG with the slowest, smallest compression setting.
pub fn encode_png_best(image: &DynamicImage) -> Result<Vec<u8>, ImageError> {
    let mut buffer = Vec::new();
    let encoder = PngEncoder::new_with_quality(
        &mut buffer,
        CompressionType::Best,
        PngFilterType::Adaptive,
    );
    image
        .write_with_encoder(encoder)
        .map_err(|e| ImageError::Encode(format!("Failed to encode PNG: {e}")))?;
    Ok(buffer)
}

/// Encode as baseline JPEG at the given quality (alpha is dropped).
pub fn encode_jpeg(image: &DynamicImage, quality: u8) -> Result<Vec<u8>, ImageError> {
    let mut buffer = Vec::new();
    let encoder = JpegEncoder::new_with_quality(&mut buffer, quality);
    DynamicImage::ImageRgb8(image.to_rgb8())
        .write_with_encoder(encoder)
        .map_err(|e| ImageError::Encode(format!("Failed to encode JPEG: {e}")))?;
    Ok(buffer)
}

/// Encode a test image of the given size and format (test helper).
#[cfg(test)]
pub(crate) fn sample_image(width: u32, height: u32, format: image::ImageFormat) -> Vec<u8> {
    let img = image::RgbImage::from_fn(width, height, |x, y| {
        image::Rgb([(x % 256) as u8, (y % 256) as u8, ((x * y) % 256) as u8])
    });
    let mut buffer = Cursor::new(Vec::new());
    DynamicImage::ImageRgb8(img)
        .write_to(&mut buffer, format)
        .unwrap();
    buffer.into_inner()
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::ImageFormat;

    #[test]
    fn test_probe_dimensions_without_decode() {
        let png = sample_image(64, 32, ImageFormat::Png);
        assert_eq!(probe_dimensions(&png).unwrap(), (64, 32));
    }

    #[test]
    fn test_format_detected_by_content() {
        let png = sample_image(8, 8, ImageFormat::Png);
        let reader = ImageReader::new(Cursor::new(&png))
            .with_guessed_format()
            .unwrap();
        assert_eq!(reader.format(), Some(ImageFormat::Png));
    }

    #[test]
    fn test_decode_rejects_garbage() {
        let err = decode_bytes(b"definitely not an image").unwrap_err();
        assert!(matches!(err, ImageError::Decode(_)));
    }

    #[test]
    fn test_jpeg_quality_affects_size() {
        let img = decode_bytes(&sample_image(256, 256, ImageFormat::Png)).unwrap();
        let high = encode_jpeg(&img, 95).unwrap();
        let low = encode_jpeg(&img, 40).unwrap();
        assert!(low.len() < high.len());
        assert_eq!(&high[0..3], &[0xFF, 0xD8, 0xFF]);
    }
}
