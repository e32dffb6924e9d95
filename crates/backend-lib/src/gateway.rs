// ==================
// crates/backend-lib/src/gateway.rs
// ==================
//! Real-time Gateway
//!
//! The gateway owns the mapping from room to subscribed connections and
//! turns inbound client events into registry writes. It never broadcasts by
//! itself: each room actor relays an event after its write succeeds, and a
//! per-(connection, room) forwarder task copies relayed events to the
//! connection's outbound queue, skipping events the connection caused.
//!
//! Because relays leave the actor in write order, every member sees a
//! room's chat in the order the registry recorded it.
//!
//! # Failure semantics
//! - invalid events are logged and dropped
//! - a failed registry write drops the event; the connection stays open
//! - a client whose outbound queue is full is disconnected
//! - a closed connection has its open participant entries closed with a
//!   `leave` write

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use dashmap::DashMap;
use metrics::{counter, gauge};
use parking_lot::Mutex;
use templemeet_common::{ClientEvent, ConnectionId, ParticipantId, ServerEvent};
use tokio::sync::{broadcast, broadcast::error::RecvError, mpsc, mpsc::error::TrySendError};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::AppError;
use crate::meeting::{Applied, RoomDelta, Signal};
use crate::meeting_actor::RoomBroadcast;
use crate::metrics as keys;
use crate::registry::{MeetingRegistry, RoomId};
use crate::validation::validate_client_event;

/// One room as seen from one connection
struct RoomMembership {
    /// Open participant entries this connection created, oldest first
    participants: Vec<(ParticipantId, String)>,
    forwarder: JoinHandle<()>,
}

struct Connection {
    outbound: mpsc::Sender<ServerEvent>,
    rooms: Mutex<HashMap<RoomId, RoomMembership>>,
}

pub struct Gateway {
    registry: Arc<MeetingRegistry>,
    connections: DashMap<ConnectionId, Arc<Connection>>,
    rooms: DashMap<RoomId, HashSet<ConnectionId>>,
}

impl Gateway {
    pub fn new(registry: Arc<MeetingRegistry>) -> Self {
        Self {
            registry,
            connections: DashMap::new(),
            rooms: DashMap::new(),
        }
    }

    pub fn registry(&self) -> &Arc<MeetingRegistry> {
        &self.registry
    }

    /// Register a new connection; events for it are pushed into `outbound`
    pub fn connect(&self, outbound: mpsc::Sender<ServerEvent>) -> ConnectionId {
        let connection_id = Uuid::new_v4();
        self.connections.insert(
            connection_id,
            Arc::new(Connection {
                outbound,
                rooms: Mutex::new(HashMap::new()),
            }),
        );
        gauge!(keys::WS_ACTIVE).set(self.connections.len() as f64);
        debug!(%connection_id, "Connection registered");
        connection_id
    }

    fn connection(&self, connection_id: ConnectionId) -> Result<Arc<Connection>, AppError> {
        self.connections
            .get(&connection_id)
            .map(|c| c.value().clone())
            .ok_or_else(|| AppError::Internal(format!("Unknown connection {connection_id}")))
    }

    /// Handle one inbound event.
    ///
    /// Invalid events and failed writes are logged and swallowed. The only
    /// error returned is [`AppError::OutboundFull`]: the client stopped
    /// reading and the caller should close the connection.
    pub async fn dispatch(&self, connection_id: ConnectionId, event: ClientEvent) -> Result<(), AppError> {
        if let Err(e) = validate_client_event(&event) {
            counter!(keys::WS_IGNORED_FRAME).increment(1);
            warn!(%connection_id, event = event.name(), error = %e, "Ignoring invalid event");
            return Ok(());
        }

        let name = event.name();
        let room_id = event.room_id().map(str::to_string);
        let result = match event {
            ClientEvent::JoinRoom(p) => self
                .join(connection_id, &p.room_id, p.user_name.trim())
                .await
                .map(|_| ()),
            ClientEvent::LeaveRoom(p) => self
                .leave(connection_id, &p.room_id, p.user_name.trim())
                .await
                .map(|_| ()),
            ClientEvent::ChatMessage(p) => self
                .chat(connection_id, &p.room_id, p.sender.trim(), &p.message)
                .await
                .map(|_| ()),
            ClientEvent::ScreenShareStart(p) => self
                .signal(connection_id, &p.room_id, Signal::ScreenShareStart, p.sender.trim())
                .await
                .map(|_| ()),
            ClientEvent::ScreenShareEnd(p) => self
                .signal(connection_id, &p.room_id, Signal::ScreenShareEnd, p.sender.trim())
                .await
                .map(|_| ()),
            ClientEvent::RaiseHand(p) => self
                .signal(connection_id, &p.room_id, Signal::RaiseHand, p.sender.trim())
                .await
                .map(|_| ()),
            ClientEvent::Heartbeat => self
                .connection(connection_id)
                .and_then(|c| push(&c, connection_id, ServerEvent::HeartbeatAck)),
        };

        match result {
            Ok(()) => Ok(()),
            Err(e @ AppError::OutboundFull(_)) => {
                counter!(keys::WS_SLOW_CONSUMER).increment(1);
                warn!(%connection_id, event = name, "Outbound queue full");
                Err(e)
            },
            Err(e) => {
                warn!(
                    %connection_id,
                    event = name,
                    room_id = room_id.as_deref().unwrap_or("-"),
                    error = %e,
                    "Event dropped"
                );
                Ok(())
            },
        }
    }

    /// Join a room. Every join creates a new participant entry.
    ///
    /// The first join of a connection subscribes to the room relay inside
    /// the same actor command as the write, so it receives only events
    /// recorded after its join. Returns [`AppError::OutboundFull`] when the
    /// join was recorded but the ack could not be queued.
    pub async fn join(
        &self,
        connection_id: ConnectionId,
        room_id: &str,
        user_name: &str,
    ) -> Result<ParticipantId, AppError> {
        let connection = self.connection(connection_id)?;
        let participant_id = Uuid::new_v4();
        let delta = RoomDelta::Join {
            participant_id,
            user_name: user_name.to_string(),
        };

        let already_member = connection.rooms.lock().contains_key(room_id);
        let mut receiver = if already_member {
            self.registry
                .upsert_and_append(room_id, delta, Some(connection_id))
                .await?;
            None
        } else {
            let (_, rx) = self
                .registry
                .join_and_subscribe(room_id, delta, Some(connection_id))
                .await?;
            Some(rx)
        };

        {
            let mut rooms = connection.rooms.lock();
            let membership = rooms.entry(room_id.to_string()).or_insert_with(|| {
                let rx = receiver
                    .take()
                    .unwrap_or_else(|| self.registry.subscribe(room_id));
                RoomMembership {
                    participants: Vec::new(),
                    forwarder: spawn_forwarder(
                        connection_id,
                        room_id.to_string(),
                        rx,
                        connection.outbound.clone(),
                    ),
                }
            });
            membership
                .participants
                .push((participant_id, user_name.to_string()));
        }
        self.rooms
            .entry(room_id.to_string())
            .or_default()
            .insert(connection_id);

        counter!(keys::ROOM_JOINED).increment(1);
        info!(%connection_id, room_id, user_name, %participant_id, "Joined room");

        let ack = ServerEvent::RoomJoined {
            room_id: room_id.to_string(),
            participant_id,
        };
        push(&connection, connection_id, ack)?;

        Ok(participant_id)
    }

    /// Leave a room, closing this connection's latest open entry for `user_name`
    pub async fn leave(
        &self,
        connection_id: ConnectionId,
        room_id: &str,
        user_name: &str,
    ) -> Result<Applied, AppError> {
        let connection = self.connection(connection_id)?;
        let participant_id = connection.rooms.lock().get(room_id).and_then(|m| {
            m.participants
                .iter()
                .rev()
                .find(|(_, name)| name == user_name)
                .map(|(pid, _)| *pid)
        });

        if participant_id.is_none() {
            debug!(%connection_id, room_id, user_name, "Leave without a matching participant");
        }

        let applied = self
            .registry
            .upsert_and_append(
                room_id,
                RoomDelta::Leave {
                    participant_id,
                    user_name: user_name.to_string(),
                },
                Some(connection_id),
            )
            .await?;

        // on a failed write the entry stays held so disconnect can close it later
        if let Some(pid) = participant_id {
            self.release(&connection, connection_id, room_id, pid);
        }

        counter!(keys::ROOM_LEFT).increment(1);
        info!(%connection_id, room_id, user_name, state = ?applied.state, "Left room");
        Ok(applied)
    }

    /// Record a chat message; members other than the sender receive it
    pub async fn chat(
        &self,
        connection_id: ConnectionId,
        room_id: &str,
        sender: &str,
        message: &str,
    ) -> Result<Applied, AppError> {
        let applied = self
            .registry
            .upsert_and_append(
                room_id,
                RoomDelta::Chat {
                    sender: sender.to_string(),
                    message: message.to_string(),
                },
                Some(connection_id),
            )
            .await?;
        counter!(keys::CHAT_MESSAGE).increment(1);
        Ok(applied)
    }

    /// Record a screen-share or raise-hand signal; relayed like chat
    pub async fn signal(
        &self,
        connection_id: ConnectionId,
        room_id: &str,
        signal: Signal,
        sender: &str,
    ) -> Result<Applied, AppError> {
        debug!(%connection_id, room_id, ?signal, sender, "Room signal");
        self.registry
            .upsert_and_append(
                room_id,
                RoomDelta::Signal {
                    signal,
                    sender: sender.to_string(),
                },
                Some(connection_id),
            )
            .await
    }

    /// Drop the connection and close every participant entry it still holds
    pub async fn disconnect(&self, connection_id: ConnectionId) {
        let Some((_, connection)) = self.connections.remove(&connection_id) else {
            return;
        };
        gauge!(keys::WS_ACTIVE).set(self.connections.len() as f64);

        let memberships: Vec<(RoomId, RoomMembership)> = connection.rooms.lock().drain().collect();
        for (room_id, membership) in memberships {
            membership.forwarder.abort();
            self.remove_from_room(&room_id, connection_id);

            for (participant_id, user_name) in membership.participants {
                let delta = RoomDelta::Leave {
                    participant_id: Some(participant_id),
                    user_name: user_name.clone(),
                };
                match self
                    .registry
                    .upsert_and_append(&room_id, delta, Some(connection_id))
                    .await
                {
                    Ok(applied) => {
                        counter!(keys::ROOM_LEFT).increment(1);
                        info!(
                            %connection_id,
                            room_id = %room_id,
                            user_name = %user_name,
                            state = ?applied.state,
                            "Closed participant on disconnect"
                        );
                    },
                    Err(e) => warn!(
                        %connection_id,
                        room_id = %room_id,
                        user_name = %user_name,
                        error = %e,
                        "Failed to close participant on disconnect"
                    ),
                }
            }
        }

        debug!(%connection_id, "Connection removed");
    }

    /// Forget one participant entry; leaves the room group when it was the last
    fn release(
        &self,
        connection: &Connection,
        connection_id: ConnectionId,
        room_id: &str,
        participant_id: ParticipantId,
    ) {
        let emptied = {
            let mut rooms = connection.rooms.lock();
            let emptied = match rooms.get_mut(room_id) {
                Some(membership) => {
                    membership.participants.retain(|(pid, _)| *pid != participant_id);
                    membership.participants.is_empty()
                },
                None => false,
            };
            if emptied {
                if let Some(membership) = rooms.remove(room_id) {
                    membership.forwarder.abort();
                }
            }
            emptied
        };

        if emptied {
            self.remove_from_room(room_id, connection_id);
        }
    }

    fn remove_from_room(&self, room_id: &str, connection_id: ConnectionId) {
        if let Some(mut members) = self.rooms.get_mut(room_id) {
            members.remove(&connection_id);
        }
        self.rooms.remove_if(room_id, |_, members| members.is_empty());
    }

    /// Connections currently in a room's broadcast group
    pub fn room_members(&self, room_id: &str) -> Vec<ConnectionId> {
        self.rooms
            .get(room_id)
            .map(|members| members.iter().copied().collect())
            .unwrap_or_default()
    }

    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }
}

/// Queue a direct reply without waiting on a client that stopped reading
fn push(connection: &Connection, connection_id: ConnectionId, event: ServerEvent) -> Result<(), AppError> {
    match connection.outbound.try_send(event) {
        Ok(()) => Ok(()),
        Err(TrySendError::Full(_)) => Err(AppError::OutboundFull(connection_id)),
        Err(TrySendError::Closed(_)) => {
            debug!(%connection_id, "Connection closed before reply");
            Ok(())
        },
    }
}

/// Copy relayed room events to one connection, skipping its own
fn spawn_forwarder(
    connection_id: ConnectionId,
    room_id: RoomId,
    mut rx: broadcast::Receiver<RoomBroadcast>,
    outbound: mpsc::Sender<ServerEvent>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            match rx.recv().await {
                Ok(relayed) => {
                    if relayed.origin == Some(connection_id) {
                        continue;
                    }
                    if outbound.send(relayed.event).await.is_err() {
                        break;
                    }
                },
                Err(RecvError::Lagged(skipped)) => {
                    counter!(keys::RELAY_LAGGED).increment(skipped);
                    warn!(%connection_id, room_id = %room_id, skipped, "Connection lagged behind room relay");
                },
                Err(RecvError::Closed) => break,
            }
        }
    })
}
