//! Utility functions and helpers.

pub mod fs;
pub mod http;

/// Lower-case a content type and strip its parameters.
///
/// `"Image/JPEG; charset=binary"` becomes `"image/jpeg"`. Blank input gives `None`.
pub fn normalize_content_type(raw: &str) -> Option<String> {
    let essence = raw.split(';').next().unwrap_or_default().trim();
    if essence.is_empty() {
        None
    } else {
        Some(essence.to_ascii_lowercase())
    }
}

/// Check a normalized content type against an allow-list.
pub fn is_allowed_content_type(content_type: &str, allow_list: &[String]) -> bool {
    allow_list
        .iter()
        .any(|allowed| allowed.trim().eq_ignore_ascii_case(content_type))
}
