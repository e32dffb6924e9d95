// ============================
// crates/backend-lib/src/meeting_actor.rs
// ============================
//! Per-room single-writer actor.
//!
//! Every write to a room goes through its actor's command queue, so
//! concurrent deltas for one room are applied one at a time and never
//! overwrite each other. The actor persists a new document before it
//! commits it in memory and before anything is relayed to the room.
//!
//! A joining connection subscribes to the relay inside the same command
//! that records its join, so it only sees events written after it.
use std::sync::Arc;

use chrono::Utc;
use metrics::counter;
use templemeet_common::{ConnectionId, ServerEvent};
use tokio::sync::{broadcast, mpsc, oneshot};
use tracing::{debug, error, info};

use crate::error::AppError;
use crate::meeting::{Applied, Meeting, RoomDelta};
use crate::metrics as keys;
use crate::storage::Storage;

/// Relayed room event, tagged with the connection that caused it
#[derive(Debug, Clone)]
pub struct RoomBroadcast {
    pub origin: Option<ConnectionId>,
    pub event: ServerEvent,
}

/// Message sent *into* the actor
#[derive(Debug)]
pub enum ActorMsg {
    Apply {
        delta: RoomDelta,
        origin: Option<ConnectionId>,
        resp_tx: oneshot::Sender<Result<(Applied, Meeting), AppError>>,
    },
    /// Apply, then subscribe to the relay once the write is committed
    ApplyAndSubscribe {
        delta: RoomDelta,
        origin: Option<ConnectionId>,
        resp_tx: oneshot::Sender<Result<(Applied, broadcast::Receiver<RoomBroadcast>), AppError>>,
    },
    Snapshot {
        resp_tx: oneshot::Sender<Result<Option<Meeting>, AppError>>,
    },
}

/// Handle that other components keep: command channel + broadcast sender
#[derive(Clone)]
pub struct MeetingHandle {
    pub cmd_tx: mpsc::UnboundedSender<ActorMsg>,
    pub relay_tx: broadcast::Sender<RoomBroadcast>,
}

impl MeetingHandle {
    /// Apply a delta and return the outcome together with the new document
    pub async fn apply(
        &self,
        delta: RoomDelta,
        origin: Option<ConnectionId>,
    ) -> Result<(Applied, Meeting), AppError> {
        let (resp_tx, resp_rx) = oneshot::channel();
        self.cmd_tx.send(ActorMsg::Apply {
            delta,
            origin,
            resp_tx,
        })?;
        resp_rx.await?
    }

    /// Apply a delta and receive every event relayed after it
    pub async fn apply_and_subscribe(
        &self,
        delta: RoomDelta,
        origin: Option<ConnectionId>,
    ) -> Result<(Applied, broadcast::Receiver<RoomBroadcast>), AppError> {
        let (resp_tx, resp_rx) = oneshot::channel();
        self.cmd_tx.send(ActorMsg::ApplyAndSubscribe {
            delta,
            origin,
            resp_tx,
        })?;
        resp_rx.await?
    }

    /// Current document, `None` if the room was never written
    pub async fn snapshot(&self) -> Result<Option<Meeting>, AppError> {
        let (resp_tx, resp_rx) = oneshot::channel();
        self.cmd_tx.send(ActorMsg::Snapshot { resp_tx })?;
        resp_rx.await?
    }

    /// Receive events relayed after successful writes
    pub fn subscribe(&self) -> broadcast::Receiver<RoomBroadcast> {
        self.relay_tx.subscribe()
    }
}

pub struct MeetingActor {
    room_id: String,
    storage: Arc<dyn Storage>,
    meeting: Option<Meeting>,
    loaded: bool,
    relay_tx: broadcast::Sender<RoomBroadcast>,
}

impl MeetingActor {
    pub fn new(
        room_id: String,
        storage: Arc<dyn Storage>,
        relay_tx: broadcast::Sender<RoomBroadcast>,
    ) -> Self {
        MeetingActor {
            room_id,
            storage,
            meeting: None,
            loaded: false,
            relay_tx,
        }
    }

    /// Load the stored document once. A failed load is retried on the next
    /// command so a transient error never lets a fresh document overwrite
    /// a stored one.
    async fn ensure_loaded(&mut self) -> Result<(), AppError> {
        if !self.loaded {
            self.meeting = self.storage.load_meeting(&self.room_id).await?;
            self.loaded = true;
        }
        Ok(())
    }

    pub async fn handle_apply(
        &mut self,
        delta: RoomDelta,
        origin: Option<ConnectionId>,
    ) -> Result<(Applied, Meeting), AppError> {
        self.ensure_loaded().await?;

        let now = Utc::now();
        let mut next = match &self.meeting {
            Some(meeting) => meeting.clone(),
            None if delta.requires_existing() => {
                return Err(AppError::MeetingNotFound(self.room_id.clone()));
            },
            None => {
                info!(room_id = %self.room_id, "Creating meeting");
                Meeting::new(self.room_id.clone(), now)
            },
        };

        let applied = next.apply(&delta, now);

        if let Err(e) = self.storage.save_meeting(&next).await {
            counter!(keys::STORAGE_FAILURE).increment(1);
            error!(room_id = %self.room_id, error = %e, "Failed to persist meeting, change dropped");
            return Err(e);
        }

        if applied.ended {
            counter!(keys::ROOM_ENDED).increment(1);
            info!(room_id = %self.room_id, "Meeting ended");
        }

        self.meeting = Some(next.clone());

        if let Some(event) = applied.broadcast.clone() {
            // no receivers is fine
            let receivers = self
                .relay_tx
                .send(RoomBroadcast { origin, event })
                .unwrap_or(0);
            debug!(room_id = %self.room_id, receivers, "Relayed room event");
        }

        Ok((applied, next))
    }

    pub async fn handle_snapshot(&mut self) -> Result<Option<Meeting>, AppError> {
        self.ensure_loaded().await?;
        Ok(self.meeting.clone())
    }

    pub async fn run(mut self, mut rx: mpsc::UnboundedReceiver<ActorMsg>) {
        while let Some(msg) = rx.recv().await {
            match msg {
                ActorMsg::Apply {
                    delta,
                    origin,
                    resp_tx,
                } => {
                    let result = self.handle_apply(delta, origin).await;
                    let _ = resp_tx.send(result);
                },
                ActorMsg::ApplyAndSubscribe {
                    delta,
                    origin,
                    resp_tx,
                } => {
                    let result = self
                        .handle_apply(delta, origin)
                        .await
                        .map(|(applied, _)| (applied, self.relay_tx.subscribe()));
                    let _ = resp_tx.send(result);
                },
                ActorMsg::Snapshot { resp_tx } => {
                    let result = self.handle_snapshot().await;
                    let _ = resp_tx.send(result);
                },
            }
        }
        debug!(room_id = %self.room_id, "Meeting actor stopped");
    }
}

/// Spawn a new meeting actor and return its handle
pub fn spawn_meeting_actor(
    room_id: &str,
    storage: Arc<dyn Storage>,
    relay_capacity: usize,
) -> MeetingHandle {
    let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
    let (relay_tx, _) = broadcast::channel(relay_capacity);
    let actor = MeetingActor::new(room_id.to_string(), storage, relay_tx.clone());

    tokio::spawn(async move {
        actor.run(cmd_rx).await;
    });

    MeetingHandle { cmd_tx, relay_tx }
}
