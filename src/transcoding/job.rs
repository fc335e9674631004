//! Transcode job model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use uuid::Uuid;

/// Unique identity of one registered job.
///
/// Two jobs that target the same output path one after another get different
/// ids, so a lease taken on the first can never touch the second.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct JobId(Uuid);

impl JobId {
    pub(crate) fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// How the encoder delivers its output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum JobKind {
    /// Segmented output (playlist + segment files).
    Hls,
    /// A single progressively written file.
    Progressive,
}

impl fmt::Display for JobKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JobKind::Hls => write!(f, "hls"),
            JobKind::Progressive => write!(f, "progressive"),
        }
    }
}

/// A running encode as described by the encoder when it registers.
///
/// The registry stores this value behind its lock and never hands out a
/// mutable reference, so the owning device and play session stay fixed for
/// the lifetime of the job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TranscodeJob {
    /// Path the encoder writes its playlist (or progressive file) to.
    pub output_path: PathBuf,
    pub kind: JobKind,
    pub device_id: Option<String>,
    pub play_session_id: Option<String>,
    /// OS process id of the encoder, when the encoder chose to share it.
    pub pid: Option<u32>,
}

impl TranscodeJob {
    pub fn new(output_path: impl Into<PathBuf>, kind: JobKind) -> Self {
        Self {
            output_path: output_path.into(),
            kind,
            device_id: None,
            play_session_id: None,
            pid: None,
        }
    }

    pub fn with_device(mut self, device_id: impl Into<String>) -> Self {
        self.device_id = Some(device_id.into());
        self
    }

    pub fn with_play_session(mut self, play_session_id: impl Into<String>) -> Self {
        self.play_session_id = Some(play_session_id.into());
        self
    }

    pub fn with_pid(mut self, pid: u32) -> Self {
        self.pid = Some(pid);
        self
    }
}

/// Point-in-time copy of a registry entry.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct JobSnapshot {
    pub id: JobId,
    pub output_path: PathBuf,
    pub kind: JobKind,
    pub device_id: Option<String>,
    pub play_session_id: Option<String>,
    pub active_request_count: usize,
    pub last_activity: DateTime<Utc>,
    /// Set while no request references the job.
    pub idle_since: Option<DateTime<Utc>>,
    pub has_exited: bool,
}
