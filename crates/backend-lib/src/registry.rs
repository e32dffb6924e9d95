// ============================
// crates/backend-lib/src/registry.rs
// ============================
//! Meeting registry: routes every room to its single-writer actor.
use std::sync::Arc;

use dashmap::DashMap;
use metrics::{counter, gauge};
use rand::Rng;
use serde::Deserialize;
use templemeet_common::ConnectionId;
use tokio::sync::broadcast;

use crate::error::AppError;
use crate::meeting::{Applied, BookingDetails, Meeting, RoomDelta};
use crate::meeting_actor::{spawn_meeting_actor, MeetingHandle, RoomBroadcast};
use crate::metrics as keys;
use crate::storage::Storage;
use crate::validation::{validate_reference, validate_room_id, validate_user_name};

pub type RoomId = String;

const GENERATED_ROOM_ID_LENGTH: usize = 8;
const ROOM_ID_ALPHABET: &[u8] = b"abcdefghijklmnopqrstuvwxyz0123456789";

/// Request to create (or attach booking details to) a meeting
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateMeeting {
    #[serde(default)]
    pub room_id: Option<String>,
    #[serde(flatten)]
    pub booking: BookingDetails,
}

/// Manager for all rooms with a live actor
pub struct MeetingRegistry {
    rooms: DashMap<RoomId, MeetingHandle>,
    storage: Arc<dyn Storage>,
    relay_capacity: usize,
}

impl MeetingRegistry {
    pub fn new(storage: Arc<dyn Storage>, relay_capacity: usize) -> Self {
        MeetingRegistry {
            rooms: DashMap::new(),
            storage,
            relay_capacity,
        }
    }

    /// Get the handle for a room, spawning its actor on first use
    pub fn handle(&self, room_id: &str) -> MeetingHandle {
        if let Some(handle) = self.rooms.get(room_id) {
            return handle.value().clone();
        }

        let handle = self
            .rooms
            .entry(room_id.to_string())
            .or_insert_with(|| {
                spawn_meeting_actor(room_id, self.storage.clone(), self.relay_capacity)
            })
            .value()
            .clone();
        gauge!(keys::ROOM_ACTORS).set(self.rooms.len() as f64);
        handle
    }

    /// Apply a delta to a room, creating the meeting if needed
    pub async fn upsert_and_append(
        &self,
        room_id: &str,
        delta: RoomDelta,
        origin: Option<ConnectionId>,
    ) -> Result<Applied, AppError> {
        validate_room_id(room_id)?;
        let (applied, _) = self.handle(room_id).apply(delta, origin).await?;
        Ok(applied)
    }

    /// Record a join and subscribe to everything relayed after it
    pub async fn join_and_subscribe(
        &self,
        room_id: &str,
        delta: RoomDelta,
        origin: Option<ConnectionId>,
    ) -> Result<(Applied, broadcast::Receiver<RoomBroadcast>), AppError> {
        validate_room_id(room_id)?;
        self.handle(room_id).apply_and_subscribe(delta, origin).await
    }

    /// Handle for a room that already has a document; never spawns for unknown rooms
    async fn existing_handle(&self, room_id: &str) -> Result<MeetingHandle, AppError> {
        validate_room_id(room_id)?;
        if let Some(handle) = self.rooms.get(room_id).map(|h| h.value().clone()) {
            return Ok(handle);
        }
        if self.storage.load_meeting(room_id).await?.is_none() {
            return Err(AppError::MeetingNotFound(room_id.to_string()));
        }
        Ok(self.handle(room_id))
    }

    /// Subscribe to events relayed for a room
    pub fn subscribe(&self, room_id: &str) -> broadcast::Receiver<RoomBroadcast> {
        self.handle(room_id).subscribe()
    }

    /// Fetch one meeting
    pub async fn get(&self, room_id: &str) -> Result<Meeting, AppError> {
        validate_room_id(room_id)?;
        let live = self.rooms.get(room_id).map(|h| h.value().clone());
        let found = match live {
            Some(handle) => handle.snapshot().await?,
            None => self.storage.load_meeting(room_id).await?,
        };
        found.ok_or_else(|| AppError::MeetingNotFound(room_id.to_string()))
    }

    /// All meetings, oldest first
    pub async fn list(&self) -> Result<Vec<Meeting>, AppError> {
        self.storage.list_meetings().await
    }

    /// Meetings in which a pandit was requested
    pub async fn list_for_pandit(&self, pandit_id: &str) -> Result<Vec<Meeting>, AppError> {
        let pandit_id = validate_reference(pandit_id, "panditId")?;
        let meetings = self.list().await?;
        Ok(meetings
            .into_iter()
            .filter(|m| m.pandit_requested.as_deref() == Some(pandit_id))
            .collect())
    }

    /// Meetings a user created or took part in
    pub async fn list_for_user(&self, user_id: &str) -> Result<Vec<Meeting>, AppError> {
        let user_id = validate_user_name(user_id, "userId")?;
        let meetings = self.list().await?;
        Ok(meetings
            .into_iter()
            .filter(|m| {
                m.created_by.as_deref() == Some(user_id)
                    || m.participants.iter().any(|p| p.user_name == user_id)
            })
            .collect())
    }

    /// Create a meeting from a booking, generating a room id if none was given
    ///
    /// `title` and `createdBy` are required.
    pub async fn create(&self, mut request: CreateMeeting) -> Result<Meeting, AppError> {
        let title = validate_reference(request.booking.title.as_deref().unwrap_or(""), "title")?
            .to_string();
        let created_by = validate_user_name(
            request.booking.created_by.as_deref().unwrap_or(""),
            "createdBy",
        )?
        .to_string();
        request.booking.title = Some(title);
        request.booking.created_by = Some(created_by);

        let room_id = match request.room_id {
            Some(id) => validate_room_id(id.trim())?.to_string(),
            None => generate_room_id(),
        };

        let (_, meeting) = self
            .handle(&room_id)
            .apply(RoomDelta::Book(request.booking), None)
            .await?;
        counter!(keys::MEETING_CREATED).increment(1);
        Ok(meeting)
    }

    pub async fn request_pandit(&self, room_id: &str, pandit_id: &str) -> Result<Meeting, AppError> {
        let pandit_id = validate_reference(pandit_id, "panditId")?.to_string();
        let (_, meeting) = self
            .existing_handle(room_id)
            .await?
            .apply(RoomDelta::RequestPandit { pandit_id }, None)
            .await?;
        Ok(meeting)
    }

    pub async fn decide(
        &self,
        room_id: &str,
        pandit_id: &str,
        approve: bool,
    ) -> Result<Meeting, AppError> {
        let pandit_id = validate_reference(pandit_id, "panditId")?.to_string();
        let (_, meeting) = self
            .existing_handle(room_id)
            .await?
            .apply(RoomDelta::PanditDecision { pandit_id, approve }, None)
            .await?;
        Ok(meeting)
    }

    /// Room IDs with a live actor
    pub fn active_room_ids(&self) -> Vec<RoomId> {
        self.rooms.iter().map(|entry| entry.key().clone()).collect()
    }
}

fn generate_room_id() -> RoomId {
    let mut rng = rand::rng();
    (0..GENERATED_ROOM_ID_LENGTH)
        .map(|_| ROOM_ID_ALPHABET[rng.random_range(0..ROOM_ID_ALPHABET.len())] as char)
        .collect()
}
