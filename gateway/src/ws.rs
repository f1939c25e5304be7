use crate::rest::AppState;
use axum::{
    extract::{
        ws::{Message, WebSocket},
        State, WebSocketUpgrade,
    },
    response::IntoResponse,
};
use futures::{SinkExt, StreamExt};
use tracing::{debug, error, warn};

pub async fn ws_telemetry(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    ws.on_upgrade(|socket| handle_socket(socket, state))
}

/// Streams the snapshot and every later broadcast to one WebSocket client.
async fn handle_socket(socket: WebSocket, state: AppState) {
    let (mut ws_tx, mut ws_rx) = socket.split();

    let (id, mut rx) = match state.hub.subscribe().await {
        Ok(subscription) => subscription,
        Err(e) => {
            error!("Failed to subscribe WebSocket client: {}", e);
            let _ = ws_tx.close().await;
            return;
        }
    };

    // Ends when the registry drops our handle or the socket stops accepting frames
    let mut send_task = tokio::spawn(async move {
        while let Some(frame) = rx.recv().await {
            if ws_tx.send(Message::Text(frame.to_string())).await.is_err() {
                break;
            }
        }
        let _ = ws_tx.close().await;
    });

    // Inbound frames are not part of the protocol; read only to notice the close
    let mut recv_task = tokio::spawn(async move {
        while let Some(msg) = ws_rx.next().await {
            match msg {
                Ok(Message::Close(_)) => break,
                Ok(_) => {}
                Err(e) => {
                    warn!("WebSocket error for {}: {}", id, e);
                    break;
                }
            }
        }
    });

    tokio::select! {
        _ = &mut send_task => recv_task.abort(),
        _ = &mut recv_task => send_task.abort(),
    }

    state.hub.unsubscribe(&id).await;
    debug!("Subscriber {} connection closed", id);
}
