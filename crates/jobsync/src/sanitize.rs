//! Helpers for keeping log lines and span fields small and free of
//! credentials or full storage paths.

use std::path::Path;

/// Maximum length of a remote response body kept in an error message.
pub const MAX_ERROR_BODY_LENGTH: usize = 200;

/// Returns only the file name component of a path.
pub fn redact_path(path: &Path) -> String {
    path.file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("<unknown>")
        .to_string()
}

/// Truncates a response body so it can be logged or stored as an error
/// message without flooding either.
pub fn truncate_body(body: &str) -> String {
    let body = body.trim();
    if body.len() <= MAX_ERROR_BODY_LENGTH {
        return body.to_string();
    }
    let mut end = MAX_ERROR_BODY_LENGTH;
    while !body.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}... (truncated)", &body[..end])
}
