//! Real-time notification channel
//!
//! GET /ws/notifications. The caller authenticates with a bearer header or a
//! `?token=` query parameter before the upgrade; anything else is a 401 and no
//! connection is made. Each connection subscribes to its owner's topic only.
//!
//! Server to client: `threat_notification`, `analysis_update`, `pong`.
//! Client to server: `ping` (anything else is ignored).

use axum::{
    extract::{
        ws::{rejection::WebSocketUpgradeRejection, Message, WebSocket, WebSocketUpgrade},
        Query, State,
    },
    http::HeaderMap,
    response::{IntoResponse, Response},
    routing::get,
    Router,
};
use serde::Deserialize;
use tracing::{debug, info, warn};
use vigil_common::events::{ClientMessage, ServerMessage, Subscription};

use super::auth::{authenticate, bearer_token};
use crate::error::ApiError;
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct WsQuery {
    pub token: Option<String>,
}

/// GET /ws/notifications
pub async fn notifications(
    State(state): State<AppState>,
    Query(query): Query<WsQuery>,
    headers: HeaderMap,
    upgrade: Result<WebSocketUpgrade, WebSocketUpgradeRejection>,
) -> Result<Response, ApiError> {
    let token = bearer_token(&headers)
        .or(query.token.as_deref())
        .ok_or_else(|| ApiError::Unauthorized("Authentication credentials were not provided".to_string()))?;

    let user = authenticate(&state, token).await?;

    let upgrade = match upgrade {
        Ok(upgrade) => upgrade,
        Err(rejection) => return Ok(rejection.into_response()),
    };

    // Subscribe before the upgrade completes so no event published after the
    // handshake is missed
    let subscription = state.hub.subscribe(user.id);
    info!(owner_id = user.id, "Notification client connected");

    Ok(upgrade.on_upgrade(move |socket| serve_connection(socket, subscription)))
}

async fn serve_connection(mut socket: WebSocket, mut subscription: Subscription) {
    let owner_id = subscription.owner_id();

    loop {
        tokio::select! {
            notification = subscription.recv() => {
                let Some(notification) = notification else {
                    break;
                };
                let event_type = notification.event_type();
                if !send(&mut socket, &ServerMessage::from(notification)).await {
                    break;
                }
                debug!(owner_id, event = event_type, "Notification delivered");
            }

            incoming = socket.recv() => {
                match incoming {
                    Some(Ok(Message::Text(text))) => {
                        match ClientMessage::parse(&text).and_then(ClientMessage::reply) {
                            Some(reply) => {
                                if !send(&mut socket, &reply).await {
                                    break;
                                }
                            }
                            None => debug!(owner_id, "Ignoring unrecognised client message"),
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        debug!(owner_id, error = %e, "Notification socket error");
                        break;
                    }
                }
            }
        }
    }

    // Dropping the subscription deregisters it
    info!(owner_id, "Notification client disconnected");
}

async fn send(socket: &mut WebSocket, message: &ServerMessage) -> bool {
    match serde_json::to_string(message) {
        Ok(json) => socket.send(Message::Text(json)).await.is_ok(),
        Err(e) => {
            warn!(error = %e, "Failed to serialize notification");
            true
        }
    }
}

pub fn ws_routes() -> Router<AppState> {
    Router::new().route("/ws/notifications", get(notifications))
}
