// FILE: src/core/sanitize.rs
//! Turns rendered template text into a single safe path component.
//!
//! Removed outright:
//! 1. Path separators and NUL
//! 2. Control characters
//! 3. Characters other platforms reject in filenames (`\ : * ? " < > |`)
//!
//! Trailing dots/spaces and leading spaces are trimmed, the result is capped
//! at 255 bytes, and an empty result becomes `_`.

use regex::Regex;
use std::sync::OnceLock;

pub const MAX_COMPONENT_BYTES: usize = 255;
const EMPTY_REPLACEMENT: &str = "_";

fn invalid_chars() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        // \x00-\x1f and \x7f are the control characters
        Regex::new(r#"[/\\:*?"<>|\x00-\x1f\x7f]"#).expect("static regex")
    })
}

/// Sanitize one path component.
pub fn sanitize(name: &str) -> String {
    let cleaned = invalid_chars().replace_all(name, "");
    let trimmed = cleaned
        .trim_start()
        .trim_end_matches(|c: char| c == '.' || c.is_whitespace());

    let capped = truncate_bytes(trimmed, MAX_COMPONENT_BYTES);

    // "." and ".." are already gone: trailing dots are trimmed.
    if capped.is_empty() {
        EMPTY_REPLACEMENT.to_string()
    } else {
        capped.to_string()
    }
}

/// Join a sanitized stem and an extension, shortening the stem so the whole
/// name stays within [`MAX_COMPONENT_BYTES`].
pub fn with_extension(stem: &str, extension: &str) -> String {
    let budget = MAX_COMPONENT_BYTES.saturating_sub(extension.len());
    let stem = truncate_bytes(stem, budget)
        .trim_end_matches(|c: char| c == '.' || c.is_whitespace());
    let stem = if stem.is_empty() { EMPTY_REPLACEMENT } else { stem };
    format!("{}{}", stem, extension)
}

fn truncate_bytes(s: &str, max: usize) -> &str {
    if s.len() <= max {
        return s;
    }
    let mut end = max;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    &s[..end]
}
