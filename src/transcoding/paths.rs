//! On-disk locations of requested segments and playlists.
//!
//! Resolution is pure string work under the output directory. Identifiers are
//! not checked against any catalog; a bad id simply produces a path that does
//! not exist.

use std::path::{Path, PathBuf};

/// Extension of the request path's last segment including the dot, e.g.
/// `".mp3"` for `stream.mp3`. Empty when there is none.
pub fn request_extension(file_name: &str) -> &str {
    match file_name.rfind('.') {
        Some(idx) if idx > 0 => &file_name[idx..],
        _ => "",
    }
}

/// `<output_dir>/<segment_id><request_extension>`.
pub fn audio_segment_path(output_dir: &Path, segment_id: &str, request_extension: &str) -> PathBuf {
    output_dir.join(format!("{segment_id}{request_extension}"))
}

/// `<output_dir>/<segment_id>.<segment_container>`.
///
/// The container is used only as the filename extension; the playlist the
/// segment belongs to is located separately.
pub fn video_segment_path(output_dir: &Path, segment_id: &str, segment_container: &str) -> PathBuf {
    output_dir.join(format!("{segment_id}.{segment_container}"))
}

/// `<output_dir>/<playlist_id><request_extension>`.
pub fn playlist_path(output_dir: &Path, playlist_id: &str, request_extension: &str) -> PathBuf {
    output_dir.join(format!("{playlist_id}{request_extension}"))
}

/// Whether `component` can be joined onto the output directory without
/// escaping it.
pub fn is_safe_component(component: &str) -> bool {
    !component.is_empty()
        && component != "."
        && component != ".."
        && !component.contains(['/', '\\', '\0'])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_extension() {
        assert_eq!(request_extension("stream.mp3"), ".mp3");
        assert_eq!(request_extension("stream.tar.aac"), ".aac");
        assert_eq!(request_extension("stream"), "");
        assert_eq!(request_extension(".hidden"), "");
    }

    #[test]
    fn test_audio_segment_path() {
        let path = audio_segment_path(Path::new("/t"), "seg1", ".mp3");
        assert_eq!(path, PathBuf::from("/t/seg1.mp3"));
    }

    #[test]
    fn test_video_segment_path_uses_container_verbatim() {
        let path = video_segment_path(Path::new("/t"), "abc1230", "ts");
        assert_eq!(path, PathBuf::from("/t/abc1230.ts"));

        let path = video_segment_path(Path::new("/t"), "abc1230", "MP4");
        assert_eq!(path, PathBuf::from("/t/abc1230.MP4"));
    }

    #[test]
    fn test_playlist_path() {
        let path = playlist_path(Path::new("/t"), "abc123", ".m3u8");
        assert_eq!(path, PathBuf::from("/t/abc123.m3u8"));
    }

    #[test]
    fn test_is_safe_component() {
        assert!(is_safe_component("seg1"));
        assert!(is_safe_component("abc123-hls1"));
        assert!(!is_safe_component(""));
        assert!(!is_safe_component(".."));
        assert!(!is_safe_component("../etc/passwd"));
        assert!(!is_safe_component("a\\b"));
    }
}
