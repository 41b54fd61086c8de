use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::IntoResponse;
use futures::SinkExt;
use futures::StreamExt;
use tokio_stream::wrappers::errors::BroadcastStreamRecvError;
use tokio_stream::wrappers::BroadcastStream;
use tracing::{info, warn};

use crate::state::AppState;

pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    ws.on_upgrade(|socket| handle_socket(socket, state))
}

/// Streams every committed order transition to the socket. Slow clients
/// skip what they missed instead of stalling the feed.
async fn handle_socket(socket: WebSocket, state: Arc<AppState>) {
    let (mut sender, mut receiver) = socket.split();
    let mut events = BroadcastStream::new(state.order_events_tx.subscribe());

    info!("websocket client connected");

    let send_task = tokio::spawn(async move {
        while let Some(next) = events.next().await {
            let event = match next {
                Ok(event) => event,
                Err(BroadcastStreamRecvError::Lagged(skipped)) => {
                    warn!(skipped, "websocket client lagged behind order feed");
                    continue;
                }
            };

            let json = match serde_json::to_string(&event) {
                Ok(json) => json,
                Err(err) => {
                    warn!(order_id = %event.order_id, error = %err, "failed to serialize order event for ws");
                    continue;
                }
            };

            if sender.send(Message::Text(json.into())).await.is_err() {
                break;
            }
        }
    });

    let recv_task = tokio::spawn(async move {
        while let Some(Ok(_msg)) = receiver.next().await {}
    });

    tokio::select! {
        _ = send_task => {},
        _ = recv_task => {},
    }

    info!("websocket client disconnected");
}
