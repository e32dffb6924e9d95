// ==============
// crates/backend-lib/src/metrics.rs

//! Central place for metric keys
pub const WS_CONNECTION: &str = "ws.connection";
pub const WS_DISCONNECTION: &str = "ws.disconnection";
pub const WS_ACTIVE: &str = "ws.active";
pub const WS_IGNORED_FRAME: &str = "ws.ignored_frame";
pub const ROOM_JOINED: &str = "room.joined";
pub const ROOM_LEFT: &str = "room.left";
pub const ROOM_ENDED: &str = "room.ended";
pub const ROOM_ACTORS: &str = "room.actors";
pub const CHAT_MESSAGE: &str = "chat.message";
pub const RELAY_LAGGED: &str = "relay.lagged";
pub const STORAGE_FAILURE: &str = "storage.failure";
pub const MEETING_CREATED: &str = "meeting.created";
pub const WS_SLOW_CONSUMER: &str = "ws.slow_consumer";
