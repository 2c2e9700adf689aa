// FILE: src/core/mime.rs
//! Extension-based MIME guessing for library files and cover images.

use std::path::Path;

const MIME_TYPES: &[(&str, &str)] = &[
    // Audio
    ("mp3", "audio/mpeg"),
    ("flac", "audio/flac"),
    ("ogg", "audio/ogg"),
    ("oga", "audio/ogg"),
    ("opus", "audio/ogg"),
    ("m4a", "audio/mp4"),
    ("aac", "audio/aac"),
    ("wav", "audio/x-wav"),
    ("aiff", "audio/x-aiff"),
    ("aif", "audio/x-aiff"),
    ("wma", "audio/x-ms-wma"),
    ("ape", "audio/x-ape"),
    ("wv", "audio/x-wavpack"),
    // Images
    ("jpg", "image/jpeg"),
    ("jpeg", "image/jpeg"),
    ("png", "image/png"),
    ("gif", "image/gif"),
    ("webp", "image/webp"),
    ("bmp", "image/bmp"),
];

/// Guess a MIME type from the file extension (case-insensitive).
pub fn guess_mime(path: &Path) -> Option<&'static str> {
    let ext = path.extension()?.to_str()?.to_ascii_lowercase();
    MIME_TYPES
        .iter()
        .find(|(e, _)| *e == ext)
        .map(|(_, mime)| *mime)
}

/// File extension (with dot) used when exposing an image of this MIME type.
pub fn image_extension(mime: &str) -> &'static str {
    if mime.to_ascii_lowercase().contains("jpeg") || mime.eq_ignore_ascii_case("image/jpg") {
        ".jpg"
    } else {
        ".png"
    }
}
