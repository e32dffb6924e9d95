// ============================
// crates/backend-lib/src/storage.rs
// ============================
//! Storage abstraction with flat-file implementation.
use std::{
    fs,
    path::{Path, PathBuf},
};

use async_trait::async_trait;
use tokio::fs as tokio_fs;
use tracing::warn;

use crate::error::AppError;
use crate::meeting::Meeting;
use crate::validation::validate_room_id;

/// Trait for storage backends
#[async_trait]
pub trait Storage: Send + Sync {
    /// Load the meeting document for a room, `None` if it was never written
    async fn load_meeting(&self, room_id: &str) -> Result<Option<Meeting>, AppError>;

    /// Replace the stored meeting document. Must be atomic: a reader sees
    /// either the old or the new document.
    async fn save_meeting(&self, meeting: &Meeting) -> Result<(), AppError>;

    /// All stored meetings, oldest first
    async fn list_meetings(&self) -> Result<Vec<Meeting>, AppError>;
}

/// Flat-file implementation of the Storage trait
///
/// One pretty-printed JSON document per room under `<root>/meetings/`.
#[derive(Clone, Debug)]
pub struct FlatFileStorage {
    root: PathBuf,
}

impl FlatFileStorage {
    pub fn new<P: AsRef<Path>>(root: P) -> anyhow::Result<Self> {
        let root = root.as_ref().to_path_buf();
        fs::create_dir_all(root.join("meetings"))?;
        Ok(Self { root })
    }

    fn meetings_dir(&self) -> PathBuf {
        self.root.join("meetings")
    }

    fn meeting_path(&self, room_id: &str) -> Result<PathBuf, AppError> {
        // room ids become file names
        validate_room_id(room_id)?;
        Ok(self.meetings_dir().join(format!("{room_id}.json")))
    }
}

#[async_trait]
impl Storage for FlatFileStorage {
    async fn load_meeting(&self, room_id: &str) -> Result<Option<Meeting>, AppError> {
        let path = self.meeting_path(room_id)?;

        let content = match tokio_fs::read_to_string(&path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        Ok(Some(serde_json::from_str(&content)?))
    }

    async fn save_meeting(&self, meeting: &Meeting) -> Result<(), AppError> {
        let path = self.meeting_path(&meeting.room_id)?;
        let tmp = path.with_extension("json.tmp");

        let json = serde_json::to_string_pretty(meeting)?;
        tokio_fs::write(&tmp, json).await?;
        tokio_fs::rename(&tmp, &path).await?;

        Ok(())
    }

    async fn list_meetings(&self) -> Result<Vec<Meeting>, AppError> {
        let mut entries = tokio_fs::read_dir(self.meetings_dir()).await?;
        let mut meetings = Vec::new();

        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }

            let content = tokio_fs::read_to_string(&path).await?;
            match serde_json::from_str::<Meeting>(&content) {
                Ok(meeting) => meetings.push(meeting),
                Err(e) => warn!(path = %path.display(), error = %e, "Skipping unreadable meeting document"),
            }
        }

        meetings.sort_by(|a, b| {
            a.started_at
                .cmp(&b.started_at)
                .then_with(|| a.room_id.cmp(&b.room_id))
        });
        Ok(meetings)
    }
}
