//! Image pipeline components.
//!
//! - **source**: Image inputs (data URIs, base64, bytes, files, clipboard captures)
//! - **mime**: MIME detection from magic bytes
//! - **decode**: Decode/encode primitives
//! - **normalize**: Resize and recompress to fit a byte budget
//! - **thumbnail**: Square JPEG thumbnails for history display

pub mod decode;
pub mod mime;
pub mod normalize;
pub mod source;
pub mod thumbnail;

// Re-exports for convenient access
pub use normalize::{CompressionPolicy, ImageNormalizer, NormalizedImage, MAX_DIMENSION};
pub use source::{parse_data_uri, to_data_uri, ImageSource};
pub use thumbnail::ThumbnailGenerator;
