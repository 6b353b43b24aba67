//! WebSocket transport for tab channels.
//!
//! Bridges one socket to one `TabPort`: text frames in are decoded into
//! `TabMessage`s, engine messages out are encoded as text frames.

use super::hub::ChannelHub;
use super::protocol::{self, CHANNEL_NAME};
use crate::server::AppState;
use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Path, State,
    },
    http::{header::ORIGIN, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
};
use futures::{SinkExt, StreamExt};
use std::sync::Arc;
use tracing::{debug, warn};

/// `GET /channels/:name`
pub async fn channel_handler(
    Path(name): Path<String>,
    State(state): State<AppState>,
    headers: HeaderMap,
    ws: Option<WebSocketUpgrade>,
) -> Response {
    if name != CHANNEL_NAME {
        return StatusCode::NOT_FOUND.into_response();
    }
    if !state.origins.allows(&headers) {
        warn!("[ws] Rejecting channel from origin {:?}", headers.get(ORIGIN));
        return StatusCode::FORBIDDEN.into_response();
    }
    let Some(ws) = ws else {
        return StatusCode::UPGRADE_REQUIRED.into_response();
    };
    let hub = state.sync.hub();
    ws.on_upgrade(move |socket| serve_tab(socket, hub))
}

async fn serve_tab(socket: WebSocket, hub: Arc<ChannelHub>) {
    let port = match hub.connect(CHANNEL_NAME).await {
        Ok(port) => port,
        Err(e) => {
            warn!("[ws] Failed to open channel: {}", e);
            return;
        }
    };
    let id = port.id();
    let (sender, mut incoming) = port.into_parts();
    let (mut ws_tx, mut ws_rx) = socket.split();

    let mut outbound = tokio::spawn(async move {
        while let Some(message) = incoming.recv().await {
            let text = match protocol::encode(&message) {
                Ok(text) => text,
                Err(e) => {
                    warn!("[ws] Failed to encode message for tab {}: {}", id, e);
                    continue;
                }
            };
            if ws_tx.send(Message::Text(text)).await.is_err() {
                break;
            }
        }
    });

    let mut inbound = tokio::spawn(async move {
        while let Some(Ok(frame)) = ws_rx.next().await {
            match frame {
                Message::Text(text) => match protocol::decode_tab_message(&text) {
                    Ok(message) => {
                        if sender.send(message).await.is_err() {
                            break;
                        }
                    }
                    Err(e) => warn!("[ws] Ignoring frame from tab {}: {}", id, e),
                },
                Message::Close(_) => break,
                _ => debug!("[ws] Ignoring non-text frame from tab {}", id),
            }
        }
    });

    tokio::select! {
        _ = &mut outbound => inbound.abort(),
        _ = &mut inbound => outbound.abort(),
    }

    hub.disconnect(id).await;
}
