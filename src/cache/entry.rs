//! Cached analysis state for one image

use crate::analysis::ImageAnalysis;
use crate::error::{StrataError, StrataResult};
use chrono::{DateTime, Utc};
use serde::{Serialize, Serializer};
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

/// Lifecycle state of an entry
///
/// `Failed` and `Succeeded` are terminal for the entry; a new computation
/// always gets a new entry.
#[derive(Debug, Clone)]
pub enum EntryState {
    InProgress,
    Failed {
        error: Arc<StrataError>,
        duration: Duration,
    },
    Succeeded {
        analysis: Arc<ImageAnalysis>,
        duration: Duration,
    },
}

/// Status name, as exposed in cache listings
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum EntryStatus {
    InProgress,
    Failed,
    Succeeded,
}

/// What a lookup hands back to its caller
#[derive(Debug, Clone)]
pub enum Resolution {
    /// Analysis running; retry later
    Pending,
    /// Analysis failed; replayed until the entry expires
    Failed(Arc<StrataError>),
    /// Analysis finished
    Ready(Arc<ImageAnalysis>),
}

impl Resolution {
    /// Whether the analysis is still running
    pub fn is_pending(&self) -> bool {
        matches!(self, Self::Pending)
    }
}

/// Cached state for one image
#[derive(Debug, Clone)]
pub struct Entry {
    created_at: DateTime<Utc>,
    job_id: Uuid,
    state: EntryState,
}

impl Entry {
    /// Placeholder for a computation that has just been scheduled
    pub fn in_progress(job_id: Uuid, created_at: DateTime<Utc>) -> Self {
        Self {
            created_at,
            job_id,
            state: EntryState::InProgress,
        }
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Computation that owns this entry
    pub fn job_id(&self) -> Uuid {
        self.job_id
    }

    pub fn state(&self) -> &EntryState {
        &self.state
    }

    pub fn status(&self) -> EntryStatus {
        match self.state {
            EntryState::InProgress => EntryStatus::InProgress,
            EntryState::Failed { .. } => EntryStatus::Failed,
            EntryState::Succeeded { .. } => EntryStatus::Succeeded,
        }
    }

    /// How long the computation took, once it finished
    pub fn duration(&self) -> Option<Duration> {
        match &self.state {
            EntryState::InProgress => None,
            EntryState::Failed { duration, .. } | EntryState::Succeeded { duration, .. } => {
                Some(*duration)
            }
        }
    }

    pub fn error(&self) -> Option<&Arc<StrataError>> {
        match &self.state {
            EntryState::Failed { error, .. } => Some(error),
            _ => None,
        }
    }

    pub fn analysis(&self) -> Option<&Arc<ImageAnalysis>> {
        match &self.state {
            EntryState::Succeeded { analysis, .. } => Some(analysis),
            _ => None,
        }
    }

    /// Fresh while younger than `ttl`, measured from creation
    pub fn is_fresh(&self, now: DateTime<Utc>, ttl: Duration) -> bool {
        match chrono::Duration::from_std(ttl) {
            Ok(ttl) => now - self.created_at < ttl,
            Err(_) => true,
        }
    }

    /// Record the outcome of the computation
    ///
    /// Returns false, leaving the entry untouched, if it already finished.
    pub fn complete(&mut self, outcome: StrataResult<ImageAnalysis>, duration: Duration) -> bool {
        if !matches!(self.state, EntryState::InProgress) {
            return false;
        }
        self.state = match outcome {
            Ok(analysis) => EntryState::Succeeded {
                analysis: Arc::new(analysis),
                duration,
            },
            Err(error) => EntryState::Failed {
                error: Arc::new(error),
                duration,
            },
        };
        true
    }

    /// Current view of the entry
    pub fn resolution(&self) -> Resolution {
        match &self.state {
            EntryState::InProgress => Resolution::Pending,
            EntryState::Failed { error, .. } => Resolution::Failed(Arc::clone(error)),
            EntryState::Succeeded { analysis, .. } => Resolution::Ready(Arc::clone(analysis)),
        }
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct EntryView {
    created_at: DateTime<Utc>,
    status: EntryStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    duration_ms: Option<u64>,
}

impl Serialize for Entry {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        EntryView {
            created_at: self.created_at,
            status: self.status(),
            error: self.error().map(|e| e.to_string()),
            duration_ms: self
                .duration()
                .map(|d| u64::try_from(d.as_millis()).unwrap_or(u64::MAX)),
        }
        .serialize(serializer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::ImageMeta;

    fn analysis() -> ImageAnalysis {
        ImageAnalysis::assemble("redis:7", ImageMeta::default(), vec![], 10)
    }

    #[test]
    fn new_entry_is_in_progress() {
        let entry = Entry::in_progress(Uuid::new_v4(), Utc::now());
        assert_eq!(entry.status(), EntryStatus::InProgress);
        assert!(entry.error().is_none());
        assert!(entry.analysis().is_none());
        assert!(entry.duration().is_none());
        assert!(entry.resolution().is_pending());
    }

    #[test]
    fn completes_exactly_once() {
        let created = Utc::now();
        let mut entry = Entry::in_progress(Uuid::new_v4(), created);

        assert!(entry.complete(Ok(analysis()), Duration::from_millis(1500)));
        assert_eq!(entry.status(), EntryStatus::Succeeded);
        assert_eq!(entry.duration(), Some(Duration::from_millis(1500)));
        assert!(entry.error().is_none());

        let again = entry.complete(
            Err(StrataError::Internal("late".into())),
            Duration::from_secs(1),
        );
        assert!(!again);
        assert_eq!(entry.status(), EntryStatus::Succeeded);
        assert_eq!(entry.created_at(), created);
    }

    #[test]
    fn failure_is_kept() {
        let mut entry = Entry::in_progress(Uuid::new_v4(), Utc::now());
        entry.complete(
            Err(StrataError::ImageNotFound("ghost".into())),
            Duration::from_secs(2),
        );

        assert_eq!(entry.status(), EntryStatus::Failed);
        assert!(entry.analysis().is_none());
        match entry.resolution() {
            Resolution::Failed(err) => assert!(err.to_string().contains("ghost")),
            other => panic!("unexpected resolution: {other:?}"),
        }
    }

    #[test]
    fn freshness_boundary() {
        let created = Utc::now();
        let entry = Entry::in_progress(Uuid::new_v4(), created);
        let ttl = Duration::from_secs(600);

        assert!(entry.is_fresh(created + chrono::Duration::seconds(599), ttl));
        assert!(!entry.is_fresh(created + chrono::Duration::seconds(600), ttl));
        assert!(!entry.is_fresh(created + chrono::Duration::seconds(601), ttl));
    }

    #[test]
    fn serializes_without_payload() {
        let mut entry = Entry::in_progress(Uuid::new_v4(), Utc::now());
        entry.complete(Err(StrataError::Internal("boom".into())), Duration::from_millis(250));

        let json = serde_json::to_value(&entry).unwrap();
        assert_eq!(json["status"], "failed");
        assert_eq!(json["durationMs"], 250);
        assert!(json["error"].as_str().unwrap().contains("boom"));
        assert!(json.get("createdAt").is_some());
        assert!(json.get("analysis").is_none());
    }
}
