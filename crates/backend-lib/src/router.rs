// ============================
// crates/backend-lib/src/router.rs
// ============================
//! HTTP routes and WebSocket connection handling.
use std::time::Duration;

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    middleware,
    response::IntoResponse,
    routing::{get, post},
    Router,
};
use futures_util::{SinkExt, StreamExt};
use metrics::counter;
use templemeet_common::{ClientEvent, ServerEvent};
use tokio::{sync::mpsc, time::timeout};
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{debug, error, info, warn};

use crate::handlers::meetings::{
    create_meeting, get_meeting, health, list_meetings, meetings_for_pandit, meetings_for_user,
    pandit_decision, request_pandit,
};
use crate::metrics as keys;
use crate::middleware::rate_limit;
use crate::AppState;

/// Build the full application router
pub fn create_router(state: AppState) -> Router {
    let api = Router::new()
        .route("/meetings", get(list_meetings).post(create_meeting))
        .route("/meetings/pandit/{pandit_id}", get(meetings_for_pandit))
        .route("/meetings/user/{user_id}", get(meetings_for_user))
        .route("/meetings/{room_id}", get(get_meeting))
        .route("/meetings/{room_id}/request-pandit", post(request_pandit))
        .route("/meetings/{room_id}/pandit-decision", post(pandit_decision))
        .route_layer(middleware::from_fn_with_state(state.clone(), rate_limit));

    Router::new()
        .route("/ws", get(ws_handler))
        .route("/health", get(health))
        .nest("/api", api)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Handler for WebSocket connections
pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    counter!(keys::WS_CONNECTION).increment(1);
    ws.on_upgrade(move |socket| handle_connection(socket, state))
}

async fn handle_connection(socket: WebSocket, state: AppState) {
    let (mut sink, mut stream) = socket.split();
    let (outbound_tx, mut outbound_rx) = mpsc::channel::<ServerEvent>(state.settings.outbound_buffer);
    let connection_id = state.gateway.connect(outbound_tx);
    info!(%connection_id, "WebSocket connected");

    // Forward queued events to the socket
    let writer = tokio::spawn(async move {
        while let Some(event) = outbound_rx.recv().await {
            let json = match serde_json::to_string(&event) {
                Ok(json) => json,
                Err(e) => {
                    error!(%connection_id, error = %e, "Failed to serialize server event");
                    continue;
                },
            };
            if sink.send(Message::Text(json.into())).await.is_err() {
                break;
            }
        }
    });

    let idle = Duration::from_secs(state.settings.heartbeat_timeout_secs);
    loop {
        let frame = match timeout(idle, stream.next()).await {
            Err(_) => {
                info!(%connection_id, "No traffic within heartbeat timeout, closing");
                break;
            },
            Ok(None) => break,
            Ok(Some(Err(e))) => {
                warn!(%connection_id, error = %e, "WebSocket read error");
                break;
            },
            Ok(Some(Ok(frame))) => frame,
        };

        match frame {
            Message::Text(text) => match serde_json::from_str::<ClientEvent>(text.as_str()) {
                Ok(event) => {
                    if let Err(e) = state.gateway.dispatch(connection_id, event).await {
                        warn!(%connection_id, error = %e, "Client not reading, closing");
                        break;
                    }
                },
                Err(e) => {
                    counter!(keys::WS_IGNORED_FRAME).increment(1);
                    warn!(%connection_id, error = %e, "Ignoring malformed frame");
                },
            },
            Message::Binary(_) => {
                counter!(keys::WS_IGNORED_FRAME).increment(1);
                warn!(%connection_id, "Ignoring binary frame");
            },
            Message::Close(_) => break,
            // pings are answered by axum
            Message::Ping(_) | Message::Pong(_) => debug!(%connection_id, "Keepalive frame"),
        }
    }

    state.gateway.disconnect(connection_id).await;
    writer.abort();
    counter!(keys::WS_DISCONNECTION).increment(1);
    info!(%connection_id, "WebSocket disconnected");
}
