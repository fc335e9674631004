//! Job registry and per-request leases.
//!
//! The registry maps an output path to the one job currently writing it. All
//! lookups and mutations go through a single mutex, so `begin`, `end`,
//! removal by filter, and idle reaping are linearizable with respect to each
//! other. A [`JobLease`] is the request-side handle: it is acquired by
//! [`JobRegistry::begin`] and releases its reference exactly once, either
//! explicitly or when dropped.

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use super::filter::JobFilter;
use super::job::{JobId, JobKind, JobSnapshot, TranscodeJob};
use crate::error::{Error, Result};

struct JobEntry {
    id: JobId,
    job: TranscodeJob,
    active_requests: usize,
    last_activity: DateTime<Utc>,
    idle_since: Option<DateTime<Utc>>,
    has_exited: bool,
}

impl JobEntry {
    fn snapshot(&self) -> JobSnapshot {
        JobSnapshot {
            id: self.id,
            output_path: self.job.output_path.clone(),
            kind: self.job.kind,
            device_id: self.job.device_id.clone(),
            play_session_id: self.job.play_session_id.clone(),
            active_request_count: self.active_requests,
            last_activity: self.last_activity,
            idle_since: self.idle_since,
            has_exited: self.has_exited,
        }
    }

    fn touch(&mut self, now: DateTime<Utc>) {
        self.last_activity = now;
        if self.active_requests == 0 {
            self.idle_since = Some(now);
        }
    }
}

/// How long a job may sit unreferenced before it is reaped, per kind.
#[derive(Debug, Clone, Copy)]
pub struct IdleTimeouts {
    pub hls: Duration,
    pub progressive: Duration,
}

impl IdleTimeouts {
    fn for_kind(&self, kind: JobKind) -> chrono::Duration {
        let timeout = match kind {
            JobKind::Hls => self.hls,
            JobKind::Progressive => self.progressive,
        };
        chrono::Duration::from_std(timeout).unwrap_or_else(|_| chrono::Duration::seconds(60))
    }
}

impl Default for IdleTimeouts {
    fn default() -> Self {
        Self {
            hls: Duration::from_secs(60),
            progressive: Duration::from_secs(10),
        }
    }
}

/// Shared table of running transcode jobs keyed by output path.
#[derive(Default)]
pub struct JobRegistry {
    jobs: Mutex<HashMap<PathBuf, JobEntry>>,
}

impl JobRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a job the encoder has just started.
    ///
    /// Fails with [`Error::Conflict`] if another job already targets the same
    /// output path.
    pub fn register(&self, job: TranscodeJob) -> Result<JobId> {
        let mut jobs = self.jobs.lock();
        if jobs.contains_key(&job.output_path) {
            return Err(Error::Conflict(format!(
                "a transcode job is already writing {}",
                job.output_path.display()
            )));
        }

        let id = JobId::new();
        let now = Utc::now();
        tracing::info!(
            job_id = %id,
            path = %job.output_path.display(),
            kind = %job.kind,
            device_id = ?job.device_id,
            play_session_id = ?job.play_session_id,
            "Registered transcode job"
        );
        jobs.insert(
            job.output_path.clone(),
            JobEntry {
                id,
                job,
                active_requests: 0,
                last_activity: now,
                idle_since: Some(now),
                has_exited: false,
            },
        );
        Ok(id)
    }

    /// Associate a request with the job writing `output_path`.
    ///
    /// Returns `None` when no job targets the path; jobs are never created here.
    pub fn begin(self: &Arc<Self>, output_path: &Path) -> Option<JobLease> {
        let mut jobs = self.jobs.lock();
        let entry = jobs.get_mut(output_path)?;

        entry.active_requests += 1;
        entry.last_activity = Utc::now();
        entry.idle_since = None;
        tracing::debug!(
            job_id = %entry.id,
            path = %output_path.display(),
            active_requests = entry.active_requests,
            "Transcode request began"
        );

        Some(JobLease {
            registry: Arc::clone(self),
            path: output_path.to_path_buf(),
            job_id: entry.id,
            released: false,
        })
    }

    /// Drop one reference taken by `begin`. A no-op when the job has been
    /// removed or replaced since.
    fn end(&self, output_path: &Path, job_id: JobId) {
        let mut jobs = self.jobs.lock();
        let Some(entry) = jobs.get_mut(output_path).filter(|e| e.id == job_id) else {
            tracing::debug!(
                job_id = %job_id,
                path = %output_path.display(),
                "Transcode request ended after job was removed"
            );
            return;
        };

        if entry.active_requests == 0 {
            tracing::warn!(
                job_id = %job_id,
                path = %output_path.display(),
                "Transcode request ended with no active requests recorded"
            );
            return;
        }

        entry.active_requests -= 1;
        entry.touch(Utc::now());
        tracing::debug!(
            job_id = %job_id,
            path = %output_path.display(),
            active_requests = entry.active_requests,
            "Transcode request ended"
        );
        if entry.active_requests == 0 {
            tracing::debug!(job_id = %job_id, "Transcode job eligible for idle cleanup");
        }
    }

    /// Flag a job whose encoder process finished on its own. The entry stays
    /// so that already produced files remain servable.
    pub fn mark_exited(&self, output_path: &Path) -> bool {
        let mut jobs = self.jobs.lock();
        match jobs.get_mut(output_path) {
            Some(entry) => {
                entry.has_exited = true;
                tracing::info!(job_id = %entry.id, path = %output_path.display(), "Transcode job exited");
                true
            }
            None => false,
        }
    }

    /// Remove the job writing `output_path`, regardless of its references.
    pub fn remove(&self, output_path: &Path) -> Option<TranscodeJob> {
        self.jobs.lock().remove(output_path).map(|entry| entry.job)
    }

    /// Remove every job whose device and session satisfy `filter`,
    /// regardless of outstanding references.
    pub fn remove_matching(&self, filter: &JobFilter) -> Vec<TranscodeJob> {
        let mut jobs = self.jobs.lock();
        let matching: Vec<PathBuf> = jobs
            .iter()
            .filter(|(_, entry)| {
                filter.matches(
                    entry.job.device_id.as_deref(),
                    entry.job.play_session_id.as_deref(),
                )
            })
            .map(|(path, _)| path.clone())
            .collect();

        matching
            .iter()
            .filter_map(|path| jobs.remove(path))
            .map(|entry| entry.job)
            .collect()
    }

    /// Refresh the activity timestamp of every job matching `filter`.
    ///
    /// Unreferenced jobs restart their idle window. Returns how many jobs
    /// were touched.
    pub fn ping(&self, filter: &JobFilter) -> usize {
        let now = Utc::now();
        let mut jobs = self.jobs.lock();
        let mut touched = 0;
        for entry in jobs.values_mut().filter(|entry| {
            filter.matches(
                entry.job.device_id.as_deref(),
                entry.job.play_session_id.as_deref(),
            )
        }) {
            entry.touch(now);
            touched += 1;
        }
        touched
    }

    /// Remove unreferenced jobs that have been idle longer than their kind's
    /// timeout as of `now`.
    pub fn take_idle(&self, now: DateTime<Utc>, timeouts: &IdleTimeouts) -> Vec<TranscodeJob> {
        let mut jobs = self.jobs.lock();
        let expired: Vec<PathBuf> = jobs
            .iter()
            .filter(|(_, entry)| {
                entry.active_requests == 0
                    && entry
                        .idle_since
                        .is_some_and(|since| now - since >= timeouts.for_kind(entry.job.kind))
            })
            .map(|(path, _)| path.clone())
            .collect();

        expired
            .iter()
            .filter_map(|path| jobs.remove(path))
            .map(|entry| entry.job)
            .collect()
    }

    pub fn get(&self, output_path: &Path) -> Option<JobSnapshot> {
        self.jobs.lock().get(output_path).map(JobEntry::snapshot)
    }

    pub fn snapshot(&self) -> Vec<JobSnapshot> {
        let mut snapshots: Vec<JobSnapshot> =
            self.jobs.lock().values().map(JobEntry::snapshot).collect();
        snapshots.sort_by(|a, b| a.output_path.cmp(&b.output_path));
        snapshots
    }

    /// Output paths of every registered job.
    pub fn output_paths(&self) -> Vec<PathBuf> {
        self.jobs.lock().keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.jobs.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.lock().is_empty()
    }
}

/// A request's reference on a transcode job.
///
/// Releasing is idempotent and also happens on drop, so the reference is
/// returned exactly once on every exit path of the request.
pub struct JobLease {
    registry: Arc<JobRegistry>,
    path: PathBuf,
    job_id: JobId,
    released: bool,
}

impl JobLease {
    pub fn job_id(&self) -> JobId {
        self.job_id
    }

    pub fn release(&mut self) {
        if self.released {
            return;
        }
        self.released = true;
        self.registry.end(&self.path, self.job_id);
    }
}

impl Drop for JobLease {
    fn drop(&mut self) {
        self.release();
    }
}

impl std::fmt::Debug for JobLease {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JobLease")
            .field("path", &self.path)
            .field("job_id", &self.job_id)
            .field("released", &self.released)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transcoding::filter::MATCH_ALL;

    fn registry_with(job: TranscodeJob) -> Arc<JobRegistry> {
        let registry = Arc::new(JobRegistry::new());
        registry.register(job).unwrap();
        registry
    }

    fn count(registry: &JobRegistry, path: &str) -> usize {
        registry.get(Path::new(path)).unwrap().active_request_count
    }

    #[test]
    fn test_register_rejects_duplicate_path() {
        let registry = registry_with(TranscodeJob::new("/t/a.m3u8", JobKind::Hls));
        let err = registry
            .register(TranscodeJob::new("/t/a.m3u8", JobKind::Hls))
            .unwrap_err();
        assert!(matches!(err, Error::Conflict(_)));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_begin_without_job_returns_none() {
        let registry = Arc::new(JobRegistry::new());
        assert!(registry.begin(Path::new("/t/missing.m3u8")).is_none());
        assert!(registry.is_empty());
    }

    #[test]
    fn test_begin_then_release_restores_count() {
        let registry = registry_with(TranscodeJob::new("/t/a.m3u8", JobKind::Hls));

        let mut lease = registry.begin(Path::new("/t/a.m3u8")).unwrap();
        assert_eq!(count(&registry, "/t/a.m3u8"), 1);
        assert!(registry.get(Path::new("/t/a.m3u8")).unwrap().idle_since.is_none());

        lease.release();
        assert_eq!(count(&registry, "/t/a.m3u8"), 0);
        assert!(registry.get(Path::new("/t/a.m3u8")).unwrap().idle_since.is_some());
    }

    #[test]
    fn test_double_release_is_noop() {
        let registry = registry_with(TranscodeJob::new("/t/a.m3u8", JobKind::Hls));
        let _other = registry.begin(Path::new("/t/a.m3u8")).unwrap();
        let mut lease = registry.begin(Path::new("/t/a.m3u8")).unwrap();
        assert_eq!(count(&registry, "/t/a.m3u8"), 2);

        lease.release();
        lease.release();
        drop(lease);
        assert_eq!(count(&registry, "/t/a.m3u8"), 1);
    }

    #[test]
    fn test_drop_releases() {
        let registry = registry_with(TranscodeJob::new("/t/a.m3u8", JobKind::Hls));
        {
            let _lease = registry.begin(Path::new("/t/a.m3u8")).unwrap();
            assert_eq!(count(&registry, "/t/a.m3u8"), 1);
        }
        assert_eq!(count(&registry, "/t/a.m3u8"), 0);
    }

    #[test]
    fn test_release_after_removal_is_noop() {
        let registry = registry_with(TranscodeJob::new("/t/a.m3u8", JobKind::Hls));
        let mut lease = registry.begin(Path::new("/t/a.m3u8")).unwrap();

        assert_eq!(registry.remove_matching(&MATCH_ALL).len(), 1);
        lease.release();
        assert!(registry.is_empty());
    }

    #[test]
    fn test_stale_lease_does_not_touch_replacement_job() {
        let registry = registry_with(TranscodeJob::new("/t/a.m3u8", JobKind::Hls));
        let stale = registry.begin(Path::new("/t/a.m3u8")).unwrap();
        registry.remove(Path::new("/t/a.m3u8"));

        registry
            .register(TranscodeJob::new("/t/a.m3u8", JobKind::Hls))
            .unwrap();
        let _fresh = registry.begin(Path::new("/t/a.m3u8")).unwrap();

        drop(stale);
        assert_eq!(count(&registry, "/t/a.m3u8"), 1);
    }

    #[test]
    fn test_mark_exited_keeps_entry() {
        let registry = registry_with(TranscodeJob::new("/t/a.m3u8", JobKind::Hls));
        assert!(registry.mark_exited(Path::new("/t/a.m3u8")));
        assert!(!registry.mark_exited(Path::new("/t/b.m3u8")));

        let snapshot = registry.get(Path::new("/t/a.m3u8")).unwrap();
        assert!(snapshot.has_exited);
    }

    #[test]
    fn test_take_idle_respects_references_and_kind() {
        let registry = Arc::new(JobRegistry::new());
        registry
            .register(TranscodeJob::new("/t/hls.m3u8", JobKind::Hls))
            .unwrap();
        registry
            .register(TranscodeJob::new("/t/prog.mp4", JobKind::Progressive))
            .unwrap();
        registry
            .register(TranscodeJob::new("/t/busy.m3u8", JobKind::Hls))
            .unwrap();
        let _busy = registry.begin(Path::new("/t/busy.m3u8")).unwrap();

        let timeouts = IdleTimeouts {
            hls: Duration::from_secs(60),
            progressive: Duration::from_secs(10),
        };

        let soon = Utc::now() + chrono::Duration::seconds(30);
        let reaped = registry.take_idle(soon, &timeouts);
        assert_eq!(reaped.len(), 1);
        assert_eq!(reaped[0].output_path, PathBuf::from("/t/prog.mp4"));

        let later = Utc::now() + chrono::Duration::seconds(120);
        let reaped = registry.take_idle(later, &timeouts);
        assert_eq!(reaped.len(), 1);
        assert_eq!(reaped[0].output_path, PathBuf::from("/t/hls.m3u8"));

        assert_eq!(registry.len(), 1);
        assert!(registry.get(Path::new("/t/busy.m3u8")).is_some());
    }

    #[test]
    fn test_ping_restarts_idle_window() {
        let registry = registry_with(
            TranscodeJob::new("/t/a.m3u8", JobKind::Hls)
                .with_device("d1")
                .with_play_session("s1"),
        );
        let before = registry.get(Path::new("/t/a.m3u8")).unwrap().idle_since.unwrap();

        std::thread::sleep(std::time::Duration::from_millis(10));
        assert_eq!(registry.ping(&JobFilter::PlaySession("s1".into())), 1);
        assert_eq!(registry.ping(&JobFilter::PlaySession("other".into())), 0);

        let after = registry.get(Path::new("/t/a.m3u8")).unwrap().idle_since.unwrap();
        assert!(after > before);
    }

    #[test]
    fn test_ping_keeps_referenced_job_busy() {
        let registry = registry_with(
            TranscodeJob::new("/t/a.m3u8", JobKind::Hls).with_play_session("s1"),
        );
        let _lease = registry.begin(Path::new("/t/a.m3u8")).unwrap();

        registry.ping(&JobFilter::PlaySession("s1".into()));
        assert!(registry.get(Path::new("/t/a.m3u8")).unwrap().idle_since.is_none());
    }
}
