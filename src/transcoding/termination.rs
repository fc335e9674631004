//! Forced termination and idle reaping of transcode jobs.

use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;

use super::encoder::{EncoderControl, OutputCleanup};
use super::filter::JobFilter;
use super::job::TranscodeJob;
use super::registry::{IdleTimeouts, JobRegistry};

/// Removes jobs from the registry and asks the encoder to stop them.
///
/// Removal happens under the registry lock before the encoder is contacted,
/// so a request finishing concurrently finds the entry gone and its release
/// degrades to a no-op.
pub struct TerminationService {
    registry: Arc<JobRegistry>,
    encoder: Arc<dyn EncoderControl>,
    idle_timeouts: IdleTimeouts,
    delete_files: bool,
}

impl TerminationService {
    pub fn new(
        registry: Arc<JobRegistry>,
        encoder: Arc<dyn EncoderControl>,
        idle_timeouts: IdleTimeouts,
        delete_files: bool,
    ) -> Self {
        Self {
            registry,
            encoder,
            idle_timeouts,
            delete_files,
        }
    }

    /// Stop every job whose device and session satisfy `filter`, ignoring
    /// outstanding references. Returns the number of jobs stopped.
    pub async fn kill(&self, filter: &JobFilter) -> usize {
        let jobs = self.registry.remove_matching(filter);
        if jobs.is_empty() {
            tracing::debug!(?filter, "No transcode jobs matched kill filter");
            return 0;
        }

        for job in &jobs {
            tracing::info!(
                path = %job.output_path.display(),
                device_id = ?job.device_id,
                play_session_id = ?job.play_session_id,
                "Killing transcode job"
            );
            self.stop(job).await;
        }
        jobs.len()
    }

    /// Stop jobs that have been unreferenced for longer than their idle
    /// timeout. Returns the number of jobs reaped.
    pub async fn reap_idle(&self) -> usize {
        let jobs = self.registry.take_idle(Utc::now(), &self.idle_timeouts);
        for job in &jobs {
            tracing::info!(
                path = %job.output_path.display(),
                kind = %job.kind,
                "Reaping idle transcode job"
            );
            self.stop(job).await;
        }
        jobs.len()
    }

    async fn stop(&self, job: &TranscodeJob) {
        let cleanup = if self.delete_files {
            OutputCleanup::Delete {
                live_outputs: self.registry.output_paths(),
            }
        } else {
            OutputCleanup::Keep
        };
        if let Err(e) = self.encoder.stop(job, &cleanup).await {
            tracing::warn!(
                path = %job.output_path.display(),
                error = %e,
                "Encoder failed to stop transcode job"
            );
        }
    }
}

/// Start a background task that periodically reaps idle jobs.
pub fn start_reaper_task(
    service: Arc<TerminationService>,
    interval_secs: u64,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(interval_secs.max(1)));
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            interval.tick().await;
            let reaped = service.reap_idle().await;
            if reaped > 0 {
                tracing::debug!(reaped, "Reaped idle transcode jobs");
            }
        }
    })
}
