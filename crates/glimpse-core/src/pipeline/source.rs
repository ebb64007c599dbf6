//! Image inputs: data URIs, base64 payloads, raw bytes, files, and clipboard captures.

use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use image::{ExtendedColorType, ImageFormat};
use std::io::Cursor;
use std::path::Path;

use super::mime::{mime_for_extension, sniff_mime};
use crate::error::ImageError;

/// An image as it arrives from the caller.
#[derive(Debug, Clone)]
pub enum ImageSource {
    /// `data:<mime>;base64,<payload>` text, as pasted or dropped into the UI
    DataUri(String),
    /// Bare base64 payload with a declared MIME type
    Base64 { data: String, mime_type: String },
    /// Encoded image bytes (PNG, JPEG, ...)
    Bytes(Vec<u8>),
    /// Raw RGBA8 pixels from a clipboard capture
    Rgba {
        width: u32,
        height: u32,
        pixels: Vec<u8>,
    },
}

/// An image materialized in memory.
#[derive(Debug)]
pub(crate) struct LoadedImage {
    /// Encoded image bytes
    pub bytes: Vec<u8>,
    /// The base64 text the image arrived in, reused when the output is unchanged
    pub base64: Option<String>,
    /// MIME type declared by the caller, if any
    pub declared_mime: Option<String>,
}

impl LoadedImage {
    /// Base64 text of the bytes, reusing the input text when available.
    pub fn into_base64(self) -> String {
        match self.base64 {
            Some(text) => text,
            None => BASE64.encode(&self.bytes),
        }
    }
}

impl ImageSource {
    /// Read an image file, rejecting files larger than `max_file_size_mb`.
    pub fn load_path(path: &Path, max_file_size_mb: u64) -> Result<Self, ImageError> {
        if !path.exists() {
            return Err(ImageError::FileNotFound(path.to_path_buf()));
        }

        let metadata = std::fs::metadata(path)?;
        let max_bytes = max_file_size_mb * 1024 * 1024;
        if metadata.len() > max_bytes {
            return Err(ImageError::FileTooLarge {
                path: path.to_path_buf(),
                size_mb: metadata.len() / (1024 * 1024),
                max_mb: max_file_size_mb,
            });
        }

        let bytes = std::fs::read(path)?;
        if sniff_mime(&bytes).is_none() {
            let by_extension = path
                .extension()
                .and_then(|e| e.to_str())
                .and_then(mime_for_extension);
            if by_extension.is_none() {
                tracing::warn!(
                    "Unrecognized image format for {}, sending as-is",
                    path.display()
                );
            }
        }
        Ok(ImageSource::Bytes(bytes))
    }

    /// Parse a string that is either a data URI or a bare base64 payload.
    pub fn from_text(text: &str, fallback_mime: &str) -> Self {
        let trimmed = text.trim();
        if trimmed.starts_with("data:") {
            ImageSource::DataUri(trimmed.to_string())
        } else {
            ImageSource::Base64 {
                data: trimmed.to_string(),
                mime_type: fallback_mime.to_string(),
            }
        }
    }

    /// MIME type the caller declared, without inspecting any bytes.
    pub fn declared_mime(&self) -> Option<&str> {
        match self {
            ImageSource::DataUri(uri) => parse_data_uri(uri).map(|(mime, _)| mime),
            ImageSource::Base64 { mime_type, .. } => Some(mime_type.as_str()),
            ImageSource::Bytes(bytes) => sniff_mime(bytes),
            ImageSource::Rgba { .. } => Some("image/png"),
        }
    }

    /// The base64 text of the image, if it arrived as text.
    pub fn base64_text(&self) -> Option<&str> {
        match self {
            ImageSource::DataUri(uri) => Some(parse_data_uri(uri).map_or(uri.as_str(), |(_, d)| d)),
            ImageSource::Base64 { data, .. } => Some(data.as_str()),
            _ => None,
        }
    }

    /// The image as submitted, rendered as a data URI for display.
    pub fn original_data_uri(&self) -> String {
        match self {
            ImageSource::DataUri(uri) => uri.clone(),
            ImageSource::Base64 { data, mime_type } => to_data_uri(mime_type, data),
            ImageSource::Bytes(bytes) => {
                let mime = sniff_mime(bytes).unwrap_or(super::mime::FALLBACK_MIME);
                to_data_uri(mime, &BASE64.encode(bytes))
            }
            ImageSource::Rgba { .. } => match self.clone().load() {
                Ok(loaded) => to_data_uri("image/png", &loaded.into_base64()),
                Err((text, _)) => text,
            },
        }
    }

    /// Decode the source into encoded image bytes.
    ///
    /// On failure the error carries the original text so callers can fall
    /// back to forwarding it untouched.
    pub(crate) fn load(self) -> Result<LoadedImage, (String, ImageError)> {
        match self {
            ImageSource::DataUri(uri) => match parse_data_uri(&uri) {
                Some((mime, data)) => {
                    let (mime, data) = (mime.to_string(), data.to_string());
                    decode_text(data, Some(mime))
                }
                None => decode_text(uri, None),
            },
            ImageSource::Base64 { data, mime_type } => decode_text(data, Some(mime_type)),
            ImageSource::Bytes(bytes) => Ok(LoadedImage {
                bytes,
                base64: None,
                declared_mime: None,
            }),
            ImageSource::Rgba {
                width,
                height,
                pixels,
            } => {
                let bytes = match encode_rgba_png(width, height, &pixels) {
                    Ok(png) => png,
                    Err(e) => {
                        tracing::warn!("Failed to encode clipboard capture as PNG: {e}");
                        pixels
                    }
                };
                Ok(LoadedImage {
                    bytes,
                    base64: None,
                    declared_mime: Some("image/png".to_string()),
                })
            }
        }
    }
}

fn decode_text(
    data: String,
    declared_mime: Option<String>,
) -> Result<LoadedImage, (String, ImageError)> {
    match BASE64.decode(data.trim()) {
        Ok(bytes) => Ok(LoadedImage {
            bytes,
            base64: Some(data),
            declared_mime,
        }),
        Err(e) => {
            let err = ImageError::InvalidPayload(format!("invalid base64: {e}"));
            Err((data, err))
        }
    }
}

/// Split a `data:<mime>;base64,<payload>` URI into its MIME type and payload.
pub fn parse_data_uri(uri: &str) -> Option<(&str, &str)> {
    let rest = uri.strip_prefix("data:")?;
    let (header, payload) = rest.split_once(',')?;
    let mime = header.strip_suffix(";base64")?;
    Some((mime, payload))
}

/// Build a data URI from a MIME type and base64 payload.
pub fn to_data_uri(mime_type: &str, base64: &str) -> String {
    format!("data:{mime_type};base64,{base64}")
}

/// Decoded length of a base64 payload, computed without decoding it.
pub fn base64_decoded_len(data: &str) -> usize {
    let len = data.trim().len();
    let padding = data.trim_end().bytes().rev().take_while(|b| *b == b'=').count();
    (len / 4 * 3).saturating_sub(padding)
}

/// Encode raw RGBA8 pixels as PNG.
pub fn encode_rgba_png(width: u32, height: u32, pixels: &[u8]) -> Result<Vec<u8>, ImageError> {
    let expected = width as usize * height as usize * 4;
    if width == 0 || height == 0 || pixels.len() != expected {
        return Err(ImageError::InvalidPayload(format!(
            "RGBA buffer of {} bytes does not match {width}x{height}",
            pixels.len()
        )));
    }

    let mut buffer = Cursor::new(Vec::new());
    image::write_buffer_with_format(
        &mut buffer,
        pixels,
        width,
        height,
        ExtendedColorType::Rgba8,
        ImageFormat::Png,
    )
    .map_err(|e| ImageError::Encode(e.to_string()))?;
    Ok(buffer.into_inner())
}
