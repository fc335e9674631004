//! Job selection by owning device and play session.

/// Predicate over a job's `(device_id, play_session_id)` pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobFilter {
    /// Matches every job.
    All,
    /// Matches jobs whose device and play session both equal the given values.
    Session {
        device_id: String,
        play_session_id: String,
    },
    /// Matches jobs belonging to the play session, whatever the device.
    PlaySession(String),
}

/// Canonical filter for blanket termination.
pub const MATCH_ALL: JobFilter = JobFilter::All;

impl JobFilter {
    pub fn session(device_id: impl Into<String>, play_session_id: impl Into<String>) -> Self {
        JobFilter::Session {
            device_id: device_id.into(),
            play_session_id: play_session_id.into(),
        }
    }

    /// Jobs without a recorded device or session never match a filter that names one.
    pub fn matches(&self, device_id: Option<&str>, play_session_id: Option<&str>) -> bool {
        match self {
            JobFilter::All => true,
            JobFilter::Session {
                device_id: want_device,
                play_session_id: want_session,
            } => {
                device_id == Some(want_device.as_str())
                    && play_session_id == Some(want_session.as_str())
            }
            JobFilter::PlaySession(want_session) => {
                play_session_id == Some(want_session.as_str())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn match_all_accepts_anything() {
        assert!(MATCH_ALL.matches(None, None));
        assert!(MATCH_ALL.matches(Some("d1"), Some("s1")));
    }

    #[test]
    fn session_requires_both_fields() {
        let filter = JobFilter::session("d1", "s1");
        assert!(filter.matches(Some("d1"), Some("s1")));
        assert!(!filter.matches(Some("d1"), Some("s2")));
        assert!(!filter.matches(Some("d2"), Some("s1")));
        assert!(!filter.matches(None, Some("s1")));
        assert!(!filter.matches(Some("d1"), None));
    }

    #[test]
    fn session_match_is_case_sensitive() {
        let filter = JobFilter::session("Device", "Session");
        assert!(!filter.matches(Some("device"), Some("session")));
    }

    #[test]
    fn play_session_ignores_device() {
        let filter = JobFilter::PlaySession("s1".into());
        assert!(filter.matches(Some("d1"), Some("s1")));
        assert!(filter.matches(None, Some("s1")));
        assert!(!filter.matches(Some("d1"), Some("s2")));
    }
}
