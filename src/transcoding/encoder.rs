//! Control surface of the encoder that owns the transcode processes.

use async_trait::async_trait;
use std::path::{Path, PathBuf};

use super::job::TranscodeJob;
use crate::error::Result;

/// Operations the coordinator delegates to the encoder.
///
/// Jobs handed to [`EncoderControl::stop`] have already been removed from the
/// registry; the implementation only has to deal with the process and its
/// files.
#[async_trait]
pub trait EncoderControl: Send + Sync {
    /// Terminate the job's process and apply `cleanup` to its output files.
    async fn stop(&self, job: &TranscodeJob, cleanup: &OutputCleanup) -> Result<()>;
}

/// What happens to a stopped job's files.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum OutputCleanup {
    /// Leave everything on disk.
    #[default]
    Keep,
    /// Delete the job's playlist and segments. Files that may belong to one
    /// of `live_outputs` are left alone.
    Delete { live_outputs: Vec<PathBuf> },
}

/// Stops encoders by process id and cleans up their partial output.
#[derive(Debug, Default, Clone)]
pub struct ProcessEncoderControl;

#[async_trait]
impl EncoderControl for ProcessEncoderControl {
    async fn stop(&self, job: &TranscodeJob, cleanup: &OutputCleanup) -> Result<()> {
        if let Some(pid) = job.pid {
            terminate_process(pid);
        }

        if let OutputCleanup::Delete { live_outputs } = cleanup {
            let removed = delete_partial_output(&job.output_path, live_outputs).await?;
            tracing::debug!(
                path = %job.output_path.display(),
                removed,
                "Deleted transcode output files"
            );
        }

        Ok(())
    }
}

#[cfg(unix)]
fn terminate_process(pid: u32) {
    use nix::sys::signal::{kill, Signal};
    use nix::unistd::Pid;

    let Ok(raw) = i32::try_from(pid) else {
        tracing::warn!(pid, "Encoder pid out of range");
        return;
    };

    match kill(Pid::from_raw(raw), Signal::SIGTERM) {
        Ok(()) => tracing::info!(pid, "Sent SIGTERM to encoder"),
        Err(nix::errno::Errno::ESRCH) => tracing::debug!(pid, "Encoder already exited"),
        Err(e) => tracing::warn!(pid, error = %e, "Failed to signal encoder"),
    }
}

#[cfg(not(unix))]
fn terminate_process(pid: u32) {
    tracing::warn!(pid, "Signalling encoder processes is not supported on this platform");
}

/// Delete the output file at `output_path` and its numbered segments.
///
/// Segments are named `<stem><index>.<ext>` next to the output file. A name
/// that also starts with the stem of a job in `live_outputs` (for example
/// `abc12.m3u8` when `abc1.m3u8` is being cleaned up) is skipped, since it
/// may be that job's file.
pub async fn delete_partial_output(output_path: &Path, live_outputs: &[PathBuf]) -> Result<usize> {
    let (Some(dir), Some(file_name), Some(stem)) = (
        output_path.parent(),
        output_path.file_name(),
        output_path.file_stem(),
    ) else {
        return Ok(0);
    };
    let file_name = file_name.to_string_lossy();
    let stem = stem.to_string_lossy();

    let live_stems: Vec<String> = live_outputs
        .iter()
        .filter(|live| live.as_path() != output_path && live.parent() == Some(dir))
        .filter_map(|live| live.file_stem())
        .map(|live| live.to_string_lossy().into_owned())
        .filter(|live| live.starts_with(stem.as_ref()))
        .collect();

    let mut entries = match tokio::fs::read_dir(dir).await {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(0),
        Err(e) => return Err(e.into()),
    };

    let mut removed = 0;
    while let Some(entry) = entries.next_entry().await? {
        let name = entry.file_name();
        let name = name.to_string_lossy();
        let owned = name == file_name
            || (is_numbered_segment(&name, &stem)
                && !live_stems.iter().any(|live| name.starts_with(live.as_str())));
        if !owned {
            continue;
        }
        match tokio::fs::remove_file(entry.path()).await {
            Ok(()) => removed += 1,
            Err(e) => tracing::warn!(
                path = %entry.path().display(),
                error = %e,
                "Failed to delete transcode output file"
            ),
        }
    }

    Ok(removed)
}

/// `<stem><digits>.<ext>` with at least one digit and a non-empty extension.
fn is_numbered_segment(name: &str, stem: &str) -> bool {
    let Some((index, ext)) = name.strip_prefix(stem).and_then(|rest| rest.split_once('.')) else {
        return false;
    };
    !index.is_empty() && index.bytes().all(|b| b.is_ascii_digit()) && !ext.is_empty()
}
