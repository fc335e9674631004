//! Content types for produced files.

use std::path::Path;

/// Guess the MIME type of a produced file from its extension.
///
/// Streaming formats are mapped explicitly; everything else goes through
/// `mime_guess`.
pub fn content_type_for(path: &Path) -> &'static str {
    let ext = path
        .extension()
        .map(|e| e.to_string_lossy().to_ascii_lowercase())
        .unwrap_or_default();

    match ext.as_str() {
        "m3u8" => "application/vnd.apple.mpegurl",
        "ts" => "video/mp2t",
        "m4s" | "mp4" => "video/mp4",
        "mp3" => "audio/mpeg",
        "aac" => "audio/aac",
        "vtt" => "text/vtt",
        _ => mime_guess::from_path(path)
            .first_raw()
            .unwrap_or("application/octet-stream"),
    }
}
