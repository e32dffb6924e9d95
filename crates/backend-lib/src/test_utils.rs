// ============================
// crates/backend-lib/src/test_utils.rs
// ============================
//! Shared helpers for unit tests.
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;

use crate::error::AppError;
use crate::meeting::Meeting;
use crate::storage::{FlatFileStorage, Storage};

/// Flat-file storage whose writes can be switched off
pub struct FlakyStorage {
    inner: FlatFileStorage,
    fail_writes: AtomicBool,
}

impl FlakyStorage {
    pub fn new(root: &Path) -> Self {
        Self {
            inner: FlatFileStorage::new(root).unwrap(),
            fail_writes: AtomicBool::new(false),
        }
    }

    pub fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }
}

#[async_trait]
impl Storage for FlakyStorage {
    async fn load_meeting(&self, room_id: &str) -> Result<Option<Meeting>, AppError> {
        self.inner.load_meeting(room_id).await
    }

    async fn save_meeting(&self, meeting: &Meeting) -> Result<(), AppError> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(AppError::Io(std::io::Error::other("disk unavailable")));
        }
        self.inner.save_meeting(meeting).await
    }

    async fn list_meetings(&self) -> Result<Vec<Meeting>, AppError> {
        self.inner.list_meetings().await
    }
}
