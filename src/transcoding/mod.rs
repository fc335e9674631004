//! Request-to-transcode-job lifecycle coordination.
//!
//! Segments and playlists are produced by long-running encoder processes.
//! This module binds each HTTP request to the job writing the file it asks
//! for, counts the requests depending on every job, and stops jobs either
//! when they sit idle or when a client asks for it.
//!
//! - [`JobRegistry`]: the single serialization point for job state.
//! - [`JobLease`]: a request's reference, released exactly once.
//! - [`TerminationService`]: forced kills by [`JobFilter`] and idle reaping.
//! - [`paths`] and [`playlist`]: turning request identifiers into files.

pub mod encoder;
pub mod filter;
pub mod job;
pub mod paths;
pub mod playlist;
pub mod registry;
pub mod termination;

pub use encoder::{EncoderControl, OutputCleanup, ProcessEncoderControl};
pub use filter::{JobFilter, MATCH_ALL};
pub use job::{JobId, JobKind, JobSnapshot, TranscodeJob};
pub use playlist::find_playlist_path;
pub use registry::{IdleTimeouts, JobLease, JobRegistry};
pub use termination::{start_reaper_task, TerminationService};
