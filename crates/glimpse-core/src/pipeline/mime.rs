//! MIME type detection from magic bytes.

/// MIME types every provider accepts for inline images.
pub const SUPPORTED_MIME_TYPES: &[&str] = &["image/jpeg", "image/png", "image/gif", "image/webp"];

/// Fallback label for payloads whose type is unknown.
pub const FALLBACK_MIME: &str = "image/jpeg";

/// Detect the MIME type of an encoded image from its header bytes.
///
/// Returns `None` for anything other than JPEG, PNG, GIF, or WebP.
pub fn sniff_mime(bytes: &[u8]) -> Option<&'static str> {
    if bytes.len() < 4 {
        return None;
    }

    // PNG: 89 50 4E 47
    if bytes.starts_with(&[0x89, b'P', b'N', b'G']) {
        return Some("image/png");
    }

    // JPEG: FF D8 FF
    if bytes.starts_with(&[0xFF, 0xD8, 0xFF]) {
        return Some("image/jpeg");
    }

    // GIF: GIF87a / GIF89a
    if bytes.starts_with(b"GIF87a") || bytes.starts_with(b"GIF89a") {
        return Some("image/gif");
    }

    // WebP: RIFF....WEBP
    if bytes.len() >= 12 && bytes.starts_with(b"RIFF") && &bytes[8..12] == b"WEBP" {
        return Some("image/webp");
    }

    None
}

/// Map a declared MIME type to one of the supported inline types.
pub fn normalize_media_type(mime: &str) -> &'static str {
    SUPPORTED_MIME_TYPES
        .iter()
        .copied()
        .find(|supported| supported.eq_ignore_ascii_case(mime.trim()))
        .unwrap_or(FALLBACK_MIME)
}

/// Guess a MIME type from a file extension.
pub fn mime_for_extension(ext: &str) -> Option<&'static str> {
    match ext.to_ascii_lowercase().as_str() {
        "jpg" | "jpeg" => Some("image/jpeg"),
        "png" => Some("image/png"),
        "gif" => Some("image/gif"),
        "webp" => Some("image/webp"),
        _ => None,
    }
}
