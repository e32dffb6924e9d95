// ============================
// crates/backend-lib/tests/api.rs
// ============================
//! Integration tests for the HTTP API.

use std::sync::Arc;

use axum::{
    body::{to_bytes, Body},
    http::{Request, StatusCode},
    Router,
};
use backend_lib::{
    config::Settings, create_router, meeting::RoomDelta, storage::FlatFileStorage, AppState,
};
use serde_json::{json, Value};
use tempfile::TempDir;
use tower::ServiceExt;
use uuid::Uuid;

fn setup_with(settings: Settings) -> (Router, AppState, TempDir) {
    let temp_dir = TempDir::new().unwrap();
    let storage = Arc::new(FlatFileStorage::new(temp_dir.path()).unwrap());
    let state = AppState::new(storage, settings);
    (create_router(state.clone()), state, temp_dir)
}

fn setup() -> (Router, AppState, TempDir) {
    setup_with(Settings::default())
}

async fn send(app: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&bytes).into_owned()))
    };
    (status, body)
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

fn post(uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

#[tokio::test]
async fn test_health() {
    let (app, _state, _temp_dir) = setup();
    let (status, body) = send(&app, get("/health")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, Value::String("Healthy".to_string()));
}

#[tokio::test]
async fn test_create_and_fetch_meeting() {
    let (app, _state, _temp_dir) = setup();

    let (status, created) = send(
        &app,
        post(
            "/api/meetings",
            json!({ "bookingId": "b-1", "title": "Griha Pravesh", "createdBy": "u-9" }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    let room_id = created["roomId"].as_str().unwrap().to_string();
    assert_eq!(room_id.len(), 8);
    assert_eq!(created["bookingId"], "b-1");
    assert_eq!(created["approval"], "pending");
    assert_eq!(created["participants"], json!([]));

    let (status, fetched) = send(&app, get(&format!("/api/meetings/{room_id}"))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(fetched["title"], "Griha Pravesh");

    let (status, listed) = send(&app, get("/api/meetings")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(listed.as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn test_unknown_meeting_is_404() {
    let (app, _state, _temp_dir) = setup();
    let (status, body) = send(&app, get("/api/meetings/nothing-here")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"]["code"], "MEET_001");
}

#[tokio::test]
async fn test_invalid_room_id_is_400() {
    let (app, _state, _temp_dir) = setup();
    let (status, body) = send(
        &app,
        post(
            "/api/meetings",
            json!({ "roomId": "no spaces allowed", "title": "Havan", "createdBy": "u-1" }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "VAL_001");
}

#[tokio::test]
async fn test_create_requires_title_and_creator() {
    let (app, state, _temp_dir) = setup();

    for body in [
        json!({ "roomId": "R1", "createdBy": "u-1" }),
        json!({ "roomId": "R1", "title": "Havan" }),
        json!({ "roomId": "R1", "title": "  ", "createdBy": "u-1" }),
    ] {
        let (status, response) = send(&app, post("/api/meetings", body)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(response["error"]["code"], "VAL_001");
    }
    assert!(state.registry.list().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_meetings_for_user() {
    let (app, state, _temp_dir) = setup();
    for (room, creator) in [("R1", "u-1"), ("R2", "u-2"), ("R3", "u-2")] {
        let (status, _) = send(
            &app,
            post(
                "/api/meetings",
                json!({ "roomId": room, "title": "Havan", "createdBy": creator }),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
    }
    state
        .registry
        .upsert_and_append(
            "R2",
            RoomDelta::Join {
                participant_id: Uuid::new_v4(),
                user_name: "u-1".to_string(),
            },
            None,
        )
        .await
        .unwrap();

    let (status, mine) = send(&app, get("/api/meetings/user/u-1")).await;
    assert_eq!(status, StatusCode::OK);
    let mut rooms: Vec<_> = mine
        .as_array()
        .unwrap()
        .iter()
        .map(|m| m["roomId"].as_str().unwrap().to_string())
        .collect();
    rooms.sort();
    assert_eq!(rooms, vec!["R1", "R2"]);

    let (_, nobody) = send(&app, get("/api/meetings/user/u-7")).await;
    assert!(nobody.as_array().unwrap().is_empty());
}

#[tokio::test]
async fn test_pandit_flow() {
    let (app, _state, _temp_dir) = setup();

    let (status, _) = send(
        &app,
        post("/api/meetings/R1/request-pandit", json!({ "panditId": "p-1" })),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = send(
        &app,
        post(
            "/api/meetings",
            json!({ "roomId": "R1", "title": "Satyanarayan Puja", "createdBy": "u-1" }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);

    let (status, requested) = send(
        &app,
        post("/api/meetings/R1/request-pandit", json!({ "panditId": "p-1" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(requested["panditRequested"], "p-1");
    assert_eq!(requested["approval"], "pending");

    let (status, mine) = send(&app, get("/api/meetings/pandit/p-1")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(mine.as_array().unwrap().len(), 1);
    let (_, other) = send(&app, get("/api/meetings/pandit/p-2")).await;
    assert!(other.as_array().unwrap().is_empty());

    let (status, decided) = send(
        &app,
        post(
            "/api/meetings/R1/pandit-decision",
            json!({ "panditId": "p-1", "approve": true }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(decided["approval"], "approved");
    assert_eq!(decided["panditApproved"], "p-1");
}

#[tokio::test]
async fn test_api_rate_limited_per_client() {
    let mut settings = Settings::default();
    settings.rate_limit.max_requests = 2;
    let (app, _state, _temp_dir) = setup_with(settings);

    let from = |ip: &str| {
        Request::builder()
            .uri("/api/meetings")
            .header("x-real-ip", ip)
            .body(Body::empty())
            .unwrap()
    };

    assert_eq!(send(&app, from("10.0.0.1")).await.0, StatusCode::OK);
    assert_eq!(send(&app, from("10.0.0.1")).await.0, StatusCode::OK);
    let (status, body) = send(&app, from("10.0.0.1")).await;
    assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(body["error"]["code"], "RATE_001");

    assert_eq!(send(&app, from("10.0.0.2")).await.0, StatusCode::OK);
    // health is not rate limited
    assert_eq!(send(&app, get("/health")).await.0, StatusCode::OK);
}
