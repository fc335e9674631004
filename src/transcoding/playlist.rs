//! Locating a playlist on disk from a client-supplied token.
//!
//! The encoder picks the playlist filename, and clients only echo back an
//! opaque token that is contained in it. The first `.m3u8` file in the output
//! directory whose name contains the token (ignoring case) wins. Directory
//! enumeration order is filesystem-dependent, so tokens must be unique enough
//! to match a single file.

use std::path::{Path, PathBuf};

pub const PLAYLIST_EXTENSION: &str = "m3u8";

/// Find the playlist in `output_dir` whose filename contains `playlist_token`.
///
/// A missing or unreadable directory is treated like an empty one.
pub async fn find_playlist_path(output_dir: &Path, playlist_token: &str) -> Option<PathBuf> {
    let mut entries = match tokio::fs::read_dir(output_dir).await {
        Ok(entries) => entries,
        Err(e) => {
            tracing::debug!(
                dir = %output_dir.display(),
                error = %e,
                "Cannot list transcode output directory"
            );
            return None;
        }
    };

    let token = playlist_token.to_lowercase();
    loop {
        let entry = match entries.next_entry().await {
            Ok(Some(entry)) => entry,
            Ok(None) => return None,
            Err(e) => {
                tracing::debug!(dir = %output_dir.display(), error = %e, "Directory listing failed");
                return None;
            }
        };

        let path = entry.path();
        if !is_playlist_file(&path) {
            continue;
        }
        let Some(name) = path.file_name().map(|n| n.to_string_lossy().to_lowercase()) else {
            continue;
        };
        if !name.contains(&token) {
            continue;
        }
        match entry.file_type().await {
            Ok(ft) if ft.is_dir() => continue,
            Ok(_) => return Some(path),
            Err(_) => continue,
        }
    }
}

fn is_playlist_file(path: &Path) -> bool {
    path.extension()
        .is_some_and(|ext| ext.to_string_lossy().eq_ignore_ascii_case(PLAYLIST_EXTENSION))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn touch(dir: &Path, name: &str) {
        std::fs::write(dir.join(name), b"").unwrap();
    }

    #[tokio::test]
    async fn test_finds_playlist_containing_token() {
        let dir = tempfile::tempdir().unwrap();
        touch(dir.path(), "abc123-hls1.m3u8");
        touch(dir.path(), "xyz999-hls1.m3u8");

        let found = find_playlist_path(dir.path(), "abc123").await;
        assert_eq!(found, Some(dir.path().join("abc123-hls1.m3u8")));
    }

    #[tokio::test]
    async fn test_match_ignores_case() {
        let dir = tempfile::tempdir().unwrap();
        touch(dir.path(), "ABC123-hls1.M3U8");

        let found = find_playlist_path(dir.path(), "abc123").await;
        assert_eq!(found, Some(dir.path().join("ABC123-hls1.M3U8")));
    }

    #[tokio::test]
    async fn test_ignores_non_playlist_files() {
        let dir = tempfile::tempdir().unwrap();
        touch(dir.path(), "abc1230.ts");
        touch(dir.path(), "abc123.m3u8.tmp");

        assert_eq!(find_playlist_path(dir.path(), "abc123").await, None);
    }

    #[tokio::test]
    async fn test_ignores_directories() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("abc123.m3u8")).unwrap();

        assert_eq!(find_playlist_path(dir.path(), "abc123").await, None);
    }

    #[tokio::test]
    async fn test_no_match_returns_none() {
        let dir = tempfile::tempdir().unwrap();
        touch(dir.path(), "xyz999-hls1.m3u8");

        assert_eq!(find_playlist_path(dir.path(), "abc123").await, None);
    }

    #[tokio::test]
    async fn test_missing_directory_returns_none() {
        let found = find_playlist_path(Path::new("/nonexistent/segmentd"), "abc123").await;
        assert_eq!(found, None);
    }
}
