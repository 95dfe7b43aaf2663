//! Live investigation updates over WebSocket.
//!
//! Each connection gets a welcome frame, then every update published for its
//! session. Client text frames are echoed back as `response` frames.

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Path, State,
    },
    response::IntoResponse,
    routing::get,
    Router,
};
use futures::stream::SplitSink;
use futures::{SinkExt, StreamExt};
use serde_json::{json, Value};
use std::sync::Arc;
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::models::{AppState, InvestigationUpdate, WebSocketMessage};
use crate::services::InvestigationService;
use crate::types::{AppError, AppResult};

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/ws/{session_id}", get(ws_handler))
        .with_state(state)
}

async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> AppResult<impl IntoResponse> {
    let session_id = Uuid::parse_str(&session_id)
        .map_err(|_| AppError::NotFound(format!("Investigation {} not found", session_id)))?;
    if !state.service.exists(session_id).await {
        return Err(AppError::NotFound(format!("Investigation {} not found", session_id)));
    }
    let service = state.service.clone();
    Ok(ws.on_upgrade(move |socket| handle_socket(socket, session_id, service)))
}

/// Reply to a client text frame: parsed JSON is echoed, anything else is an error frame.
pub fn reply_to(text: &str) -> WebSocketMessage {
    match serde_json::from_str::<Value>(text) {
        Ok(echo) => WebSocketMessage::new(
            "response",
            json!({ "echo": echo, "received_at": chrono::Utc::now() }),
        ),
        Err(_) => WebSocketMessage::new("error", json!({ "message": "Invalid JSON format" })),
    }
}

/// Frame for an update published on the service channel, if it belongs to `session_id`.
pub fn session_frame(update: InvestigationUpdate, session_id: Uuid) -> Option<WebSocketMessage> {
    (update.session_id == session_id).then(|| WebSocketMessage::new(update.kind, update.data))
}

async fn send(sender: &mut SplitSink<WebSocket, Message>, message: &WebSocketMessage) -> bool {
    match serde_json::to_string(message) {
        Ok(text) => sender.send(Message::Text(text.into())).await.is_ok(),
        Err(e) => {
            warn!(error = %e, "Failed to serialize WebSocket message");
            true
        }
    }
}

async fn handle_socket(socket: WebSocket, session_id: Uuid, service: Arc<InvestigationService>) {
    let (mut sender, mut receiver) = socket.split();
    let mut updates = service.subscribe();
    info!(session_id = %session_id, "WebSocket client connected");

    let welcome = WebSocketMessage::new(
        "connection",
        json!({ "message": format!("Connected to investigation {}", session_id) }),
    );
    if !send(&mut sender, &welcome).await {
        return;
    }

    loop {
        tokio::select! {
            incoming = receiver.next() => match incoming {
                Some(Ok(Message::Text(text))) => {
                    if !send(&mut sender, &reply_to(text.as_str())).await {
                        break;
                    }
                }
                Some(Ok(Message::Close(_))) | None => break,
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    debug!(session_id = %session_id, error = %e, "WebSocket receive failed");
                    break;
                }
            },
            update = updates.recv() => match update {
                Ok(update) => {
                    if let Some(frame) = session_frame(update, session_id) {
                        if !send(&mut sender, &frame).await {
                            break;
                        }
                    }
                }
                Err(RecvError::Lagged(skipped)) => {
                    warn!(session_id = %session_id, skipped, "WebSocket client lagging behind updates");
                }
                Err(RecvError::Closed) => break,
            },
        }
    }

    info!(session_id = %session_id, "WebSocket connection closed");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_json_is_echoed() {
        let reply = reply_to(r#"{"ping": 1}"#);
        assert_eq!(reply.kind, "response");
        assert_eq!(reply.data["echo"], json!({ "ping": 1 }));
        assert!(reply.data.get("received_at").is_some());
    }

    #[test]
    fn test_invalid_json_is_an_error_frame() {
        let reply = reply_to("not json");
        assert_eq!(reply.kind, "error");
        assert_eq!(reply.data["message"], json!("Invalid JSON format"));
    }

    #[test]
    fn test_updates_are_filtered_by_session() {
        let ours = Uuid::new_v4();
        let update = |session_id| InvestigationUpdate {
            session_id,
            kind: "investigation_updated".to_string(),
            data: json!({ "progress": 42 }),
        };

        let frame = session_frame(update(ours), ours).unwrap();
        assert_eq!(frame.kind, "investigation_updated");
        assert_eq!(frame.data["progress"], json!(42));

        assert!(session_frame(update(Uuid::new_v4()), ours).is_none());
    }
}
