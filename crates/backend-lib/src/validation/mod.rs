// ============================
// crates/backend-lib/src/validation/mod.rs
// ============================
//! Inbound event validation.
//!
//! Payload fields arrive defaulted to empty strings; everything a handler
//! needs is checked here before the registry is touched.

use regex::Regex;
use std::sync::LazyLock;
use templemeet_common::{ChatPayload, ClientEvent, RoomSender, RoomUser};
use thiserror::Error;

const MAX_ROOM_ID_LENGTH: usize = 64;
const MAX_USER_NAME_LENGTH: usize = 100;
const MAX_MESSAGE_LENGTH: usize = 2000;
const MAX_REFERENCE_LENGTH: usize = 128;

static ROOM_ID_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9_-]+$").expect("room id pattern is valid"));

/// Possible validation errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Missing required field: {0}")]
    MissingField(&'static str),

    #[error("Invalid room ID: {0}")]
    InvalidRoomId(String),

    #[error("Invalid user name: {0}")]
    InvalidUserName(String),

    #[error("Invalid message: {0}")]
    InvalidMessage(String),

    #[error("Invalid reference: {0}")]
    InvalidReference(String),
}

/// Result type for validation operations
pub type ValidationResult<T> = Result<T, ValidationError>;

/// Validate a room ID. Room IDs double as file names, so the charset is strict.
pub fn validate_room_id(room_id: &str) -> ValidationResult<&str> {
    if room_id.is_empty() {
        return Err(ValidationError::MissingField("roomId"));
    }

    if room_id.len() > MAX_ROOM_ID_LENGTH {
        return Err(ValidationError::InvalidRoomId(format!(
            "Room ID must be at most {MAX_ROOM_ID_LENGTH} characters"
        )));
    }

    if !ROOM_ID_REGEX.is_match(room_id) {
        return Err(ValidationError::InvalidRoomId(
            "Room ID must contain only alphanumeric characters, hyphens and underscores"
                .to_string(),
        ));
    }

    Ok(room_id)
}

/// Validate a display name; `field` names the payload key for error reporting
pub fn validate_user_name<'a>(name: &'a str, field: &'static str) -> ValidationResult<&'a str> {
    let trimmed = name.trim();
    if trimmed.is_empty() {
        return Err(ValidationError::MissingField(field));
    }

    if trimmed.chars().count() > MAX_USER_NAME_LENGTH {
        return Err(ValidationError::InvalidUserName(format!(
            "{field} must be at most {MAX_USER_NAME_LENGTH} characters"
        )));
    }

    if trimmed.chars().any(char::is_control) {
        return Err(ValidationError::InvalidUserName(format!(
            "{field} must not contain control characters"
        )));
    }

    Ok(trimmed)
}

/// Validate chat text
pub fn validate_message(text: &str) -> ValidationResult<&str> {
    if text.trim().is_empty() {
        return Err(ValidationError::MissingField("message"));
    }

    if text.chars().count() > MAX_MESSAGE_LENGTH {
        return Err(ValidationError::InvalidMessage(format!(
            "Message must be at most {MAX_MESSAGE_LENGTH} characters"
        )));
    }

    Ok(text)
}

/// Validate an opaque reference such as a booking or pandit id
pub fn validate_reference<'a>(value: &'a str, field: &'static str) -> ValidationResult<&'a str> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(ValidationError::MissingField(field));
    }
    if trimmed.len() > MAX_REFERENCE_LENGTH || trimmed.chars().any(char::is_control) {
        return Err(ValidationError::InvalidReference(format!(
            "{field} must be at most {MAX_REFERENCE_LENGTH} printable characters"
        )));
    }
    Ok(trimmed)
}

fn validate_room_user(payload: &RoomUser) -> ValidationResult<()> {
    validate_room_id(&payload.room_id)?;
    validate_user_name(&payload.user_name, "userName")?;
    Ok(())
}

fn validate_room_sender(payload: &RoomSender) -> ValidationResult<()> {
    validate_room_id(&payload.room_id)?;
    validate_user_name(&payload.sender, "sender")?;
    Ok(())
}

fn validate_chat(payload: &ChatPayload) -> ValidationResult<()> {
    validate_room_id(&payload.room_id)?;
    validate_user_name(&payload.sender, "sender")?;
    validate_message(&payload.message)?;
    Ok(())
}

/// Validate an inbound client event
pub fn validate_client_event(event: &ClientEvent) -> ValidationResult<()> {
    match event {
        ClientEvent::JoinRoom(p) | ClientEvent::LeaveRoom(p) => validate_room_user(p),
        ClientEvent::ChatMessage(p) => validate_chat(p),
        ClientEvent::ScreenShareStart(p)
        | ClientEvent::ScreenShareEnd(p)
        | ClientEvent::RaiseHand(p) => validate_room_sender(p),
        ClientEvent::Heartbeat => Ok(()),
    }
}
