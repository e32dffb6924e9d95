// ============================
// crates/backend-lib/src/handlers/meetings.rs
// ============================
//! HTTP handlers for meeting records.
use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::Deserialize;
use tracing::info;

use crate::error::AppError;
use crate::meeting::Meeting;
use crate::registry::CreateMeeting;
use crate::AppState;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PanditRequest {
    #[serde(default)]
    pub pandit_id: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PanditDecision {
    #[serde(default)]
    pub pandit_id: String,
    pub approve: bool,
}

pub async fn list_meetings(State(state): State<AppState>) -> Result<Json<Vec<Meeting>>, AppError> {
    Ok(Json(state.registry.list().await?))
}

pub async fn get_meeting(
    State(state): State<AppState>,
    Path(room_id): Path<String>,
) -> Result<Json<Meeting>, AppError> {
    Ok(Json(state.registry.get(&room_id).await?))
}

pub async fn create_meeting(
    State(state): State<AppState>,
    Json(request): Json<CreateMeeting>,
) -> Result<(StatusCode, Json<Meeting>), AppError> {
    let meeting = state.registry.create(request).await?;
    info!(room_id = %meeting.room_id, booking_id = ?meeting.booking_id, "Meeting created");
    Ok((StatusCode::CREATED, Json(meeting)))
}

pub async fn request_pandit(
    State(state): State<AppState>,
    Path(room_id): Path<String>,
    Json(request): Json<PanditRequest>,
) -> Result<Json<Meeting>, AppError> {
    let meeting = state
        .registry
        .request_pandit(&room_id, &request.pandit_id)
        .await?;
    info!(room_id = %room_id, pandit_id = %request.pandit_id, "Pandit requested");
    Ok(Json(meeting))
}

pub async fn pandit_decision(
    State(state): State<AppState>,
    Path(room_id): Path<String>,
    Json(decision): Json<PanditDecision>,
) -> Result<Json<Meeting>, AppError> {
    let meeting = state
        .registry
        .decide(&room_id, &decision.pandit_id, decision.approve)
        .await?;
    info!(room_id = %room_id, approve = decision.approve, "Pandit decision recorded");
    Ok(Json(meeting))
}

pub async fn meetings_for_pandit(
    State(state): State<AppState>,
    Path(pandit_id): Path<String>,
) -> Result<Json<Vec<Meeting>>, AppError> {
    Ok(Json(state.registry.list_for_pandit(&pandit_id).await?))
}

/// Meetings a user created or took part in
pub async fn meetings_for_user(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
) -> Result<Json<Vec<Meeting>>, AppError> {
    Ok(Json(state.registry.list_for_user(&user_id).await?))
}

pub async fn health() -> &'static str {
    "Healthy"
}
