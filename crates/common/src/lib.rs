// ================
// crates/common/src/lib.rs
// ================
//! Common types and structures
//! used for communication between meeting clients and the server.
//! This module defines the WebSocket event frames and their payloads.
//!
//! Every frame is a JSON object of the form `{"event": "<name>", "data": {...}}`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Identifier of a single WebSocket connection
pub type ConnectionId = Uuid;

/// Identifier of one participant entry (one per join)
pub type ParticipantId = Uuid;

/// Events sent from client to server
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(tag = "event", content = "data", rename_all = "kebab-case")]
pub enum ClientEvent {
    /// Join a room
    /// # Fields
    /// * `roomId` - Room to join, created on first join
    /// * `userName` - Display name of the joining participant
    JoinRoom(RoomUser),
    /// Leave a room
    /// # Fields
    /// * `roomId` - Room to leave
    /// * `userName` - Display name used when joining
    LeaveRoom(RoomUser),
    /// Send a chat message to the room
    /// # Fields
    /// * `roomId` - Target room
    /// * `sender` - Display name of the sender
    /// * `message` - Message text
    ChatMessage(ChatPayload),
    /// Sender started sharing a screen
    ScreenShareStart(RoomSender),
    /// Sender stopped sharing a screen
    ScreenShareEnd(RoomSender),
    /// Sender raised a hand
    RaiseHand(RoomSender),
    /// Keep-alive, answered with [`ServerEvent::HeartbeatAck`]
    Heartbeat,
}

/// Payload of join/leave events.
///
/// Fields default to empty so that a missing field surfaces as a
/// validation error instead of a parse error.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct RoomUser {
    #[serde(default)]
    pub room_id: String,
    #[serde(default)]
    pub user_name: String,
}

/// Payload of screen-share and raise-hand events
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct RoomSender {
    #[serde(default)]
    pub room_id: String,
    #[serde(default)]
    pub sender: String,
}

/// Payload of a chat message
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ChatPayload {
    #[serde(default)]
    pub room_id: String,
    #[serde(default)]
    pub sender: String,
    #[serde(default)]
    pub message: String,
}

impl ClientEvent {
    /// Wire name of the event, used in logs
    pub fn name(&self) -> &'static str {
        match self {
            ClientEvent::JoinRoom(_) => "join-room",
            ClientEvent::LeaveRoom(_) => "leave-room",
            ClientEvent::ChatMessage(_) => "chat-message",
            ClientEvent::ScreenShareStart(_) => "screen-share-start",
            ClientEvent::ScreenShareEnd(_) => "screen-share-end",
            ClientEvent::RaiseHand(_) => "raise-hand",
            ClientEvent::Heartbeat => "heartbeat",
        }
    }

    /// Room addressed by the event, if any
    pub fn room_id(&self) -> Option<&str> {
        match self {
            ClientEvent::JoinRoom(p) | ClientEvent::LeaveRoom(p) => Some(&p.room_id),
            ClientEvent::ChatMessage(p) => Some(&p.room_id),
            ClientEvent::ScreenShareStart(p)
            | ClientEvent::ScreenShareEnd(p)
            | ClientEvent::RaiseHand(p) => Some(&p.room_id),
            ClientEvent::Heartbeat => None,
        }
    }
}

/// Events sent from server to client
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(tag = "event", content = "data", rename_all = "kebab-case")]
pub enum ServerEvent {
    /// Acknowledges a successful join
    #[serde(rename_all = "camelCase")]
    RoomJoined {
        room_id: String,
        /// Identifier of the participant entry created by this join
        participant_id: ParticipantId,
    },
    /// Chat message relayed to the other members of a room
    #[serde(rename_all = "camelCase")]
    ChatMessage {
        room_id: String,
        sender: String,
        message: String,
        time: DateTime<Utc>,
    },
    #[serde(rename_all = "camelCase")]
    ScreenShareStart { room_id: String, sender: String },
    #[serde(rename_all = "camelCase")]
    ScreenShareEnd { room_id: String, sender: String },
    #[serde(rename_all = "camelCase")]
    RaiseHand { room_id: String, sender: String },
    /// Answer to [`ClientEvent::Heartbeat`]
    HeartbeatAck,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_client_event_wire_format() {
        let raw = json!({
            "event": "join-room",
            "data": { "roomId": "R1", "userName": "Asha" }
        });
        let event: ClientEvent = serde_json::from_value(raw).unwrap();
        assert_eq!(
            event,
            ClientEvent::JoinRoom(RoomUser {
                room_id: "R1".to_string(),
                user_name: "Asha".to_string(),
            })
        );
        assert_eq!(event.name(), "join-room");
        assert_eq!(event.room_id(), Some("R1"));
    }

    #[test]
    fn test_missing_fields_default_to_empty() {
        let raw = json!({ "event": "chat-message", "data": { "roomId": "R1" } });
        let event: ClientEvent = serde_json::from_value(raw).unwrap();
        let ClientEvent::ChatMessage(payload) = event else {
            panic!("Expected ChatMessage")
        };
        assert!(payload.sender.is_empty());
        assert!(payload.message.is_empty());
    }

    #[test]
    fn test_heartbeat_without_data() {
        let event: ClientEvent = serde_json::from_str(r#"{"event":"heartbeat"}"#).unwrap();
        assert_eq!(event, ClientEvent::Heartbeat);
        assert_eq!(event.room_id(), None);
    }

    #[test]
    fn test_unknown_event_is_rejected() {
        let result = serde_json::from_str::<ClientEvent>(r#"{"event":"dance","data":{}}"#);
        assert!(result.is_err());
    }

    #[test]
    fn test_server_event_wire_format() {
        let event = ServerEvent::RaiseHand {
            room_id: "R1".to_string(),
            sender: "Ravi".to_string(),
        };
        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["event"], "raise-hand");
        assert_eq!(value["data"]["roomId"], "R1");
        assert_eq!(value["data"]["sender"], "Ravi");

        let ack = serde_json::to_value(ServerEvent::HeartbeatAck).unwrap();
        assert_eq!(ack["event"], "heartbeat-ack");
    }
}
