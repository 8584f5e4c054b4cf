//! The mutable stream entity and its caller-visible snapshot.

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use super::{StreamSource, StreamStatus};
use crate::collaborator::CollaboratorTask;

/// A tracked stream. Lives inside the registry; mutations go through the
/// registry so status changes stay on the checked transition table.
#[derive(Debug)]
pub struct StreamRecord {
    pub id: Uuid,
    pub source: StreamSource,
    pub status: StreamStatus,
    /// Set only while a recording is in progress.
    pub recording_path: Option<PathBuf>,
    /// Outcome of the last repair pass over the recording artifact.
    pub recording_fixed: bool,
    pub proxy_url: Option<String>,
    /// Owned background collaborator task (e.g. a live transcription).
    /// Never exposed to callers; cancelled on cleanup with a bounded wait.
    pub collaborator: Option<CollaboratorTask>,
    pub created_at: DateTime<Utc>,
}

impl StreamRecord {
    pub fn new(source: StreamSource) -> Self {
        Self {
            id: Uuid::new_v4(),
            source,
            status: StreamStatus::PendingValidation,
            recording_path: None,
            recording_fixed: false,
            proxy_url: None,
            collaborator: None,
            created_at: Utc::now(),
        }
    }

    pub fn take_collaborator(&mut self) -> Option<CollaboratorTask> {
        self.collaborator.take()
    }

    /// Clonable view handed to callers. `is_recording` is derived from the
    /// live handle table, which the record itself does not see.
    pub fn snapshot(&self, is_recording: bool) -> StreamSnapshot {
        StreamSnapshot {
            id: self.id,
            url: self.source.url.clone(),
            platform: self.source.platform,
            external_id: self.source.external_id.clone(),
            title: self.source.title.clone(),
            embed_url: self.source.embed_url.clone(),
            is_live: self.source.is_live,
            status: self.status,
            recording_path: self.recording_path.clone(),
            recording_fixed: self.recording_fixed,
            proxy_url: self.proxy_url.clone(),
            is_recording,
            collaborator_ref: self.collaborator.as_ref().map(|task| task.id()),
            created_at: self.created_at,
        }
    }
}

/// Caller-visible state of one stream. Carries no process internals.
#[derive(Debug, Clone, Serialize)]
pub struct StreamSnapshot {
    pub id: Uuid,
    pub url: String,
    pub platform: super::PlatformKind,
    pub external_id: Option<String>,
    pub title: Option<String>,
    pub embed_url: Option<String>,
    pub is_live: bool,
    pub status: StreamStatus,
    pub recording_path: Option<PathBuf>,
    pub recording_fixed: bool,
    pub proxy_url: Option<String>,
    pub is_recording: bool,
    pub collaborator_ref: Option<Uuid>,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::PlatformKind;

    #[test]
    fn test_new_record_is_pending() {
        let source = StreamSource::detected(
            "https://twitch.tv/chan",
            PlatformKind::Twitch,
            Some("chan".to_string()),
        );
        let record = StreamRecord::new(source);

        assert_eq!(record.status, StreamStatus::PendingValidation);
        assert!(record.recording_path.is_none());
        assert!(!record.recording_fixed);
        assert!(record.collaborator.is_none());
    }

    #[test]
    fn test_snapshot_reflects_record() {
        let mut record = StreamRecord::new(StreamSource::detected(
            "https://example.com/live.m3u8",
            PlatformKind::Other,
            None,
        ));
        record.status = StreamStatus::Active;
        record.proxy_url = Some("/hls/live_x/playlist.m3u8".to_string());

        let snapshot = record.snapshot(false);
        assert_eq!(snapshot.id, record.id);
        assert_eq!(snapshot.status, StreamStatus::Active);
        assert!(!snapshot.is_recording);
        assert_eq!(
            snapshot.proxy_url.as_deref(),
            Some("/hls/live_x/playlist.m3u8")
        );
        assert!(snapshot.collaborator_ref.is_none());
    }
}
