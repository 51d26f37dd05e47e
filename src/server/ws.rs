//! Progress streaming over WebSocket.
//!
//! The client opens `/ws/progress` and sends one handshake frame,
//! `{"doc_id": "...", "token": "..."}`. The server replies with the
//! latest known progress snapshot (if the run already emitted one) and
//! then pushes every subsequent event for that document. After the
//! terminal event (`completed: true`) the connection is closed.

use axum::{
    extract::{
        ws::{Message, WebSocket},
        State, WebSocketUpgrade,
    },
    response::IntoResponse,
};
use futures::stream::SplitSink;
use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use serde_json::json;
use tracing::debug;

use super::AppState;

/// Handshake frame the client must send first.
#[derive(Debug, Deserialize)]
struct Handshake {
    doc_id: String,
    /// Opaque client token. Checked for presence; validation belongs to
    /// the deployment's auth layer.
    token: String,
}

pub async fn progress_socket(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: AppState) {
    let (mut sender, mut receiver) = socket.split();

    // First frame must be the handshake.
    let handshake = loop {
        match receiver.next().await {
            Some(Ok(Message::Text(text))) => match serde_json::from_str::<Handshake>(&text) {
                Ok(h) if !h.doc_id.is_empty() && !h.token.is_empty() => break h,
                _ => {
                    let _ = sender
                        .send(Message::Text(
                            json!({ "error": "expected {doc_id, token} handshake" }).to_string(),
                        ))
                        .await;
                    return;
                }
            },
            Some(Ok(Message::Close(_))) | Some(Err(_)) | None => return,
            // Pings are answered by axum itself.
            Some(Ok(_)) => continue,
        }
    };

    // Only known documents get a channel; arbitrary ids would otherwise
    // accumulate in the publisher.
    match state.gateway.load_document(&handshake.doc_id).await {
        Ok(Some(_)) => {}
        Ok(None) | Err(_) => {
            let _ = sender
                .send(Message::Text(
                    json!({ "error": "unknown document" }).to_string(),
                ))
                .await;
            return;
        }
    }

    debug!(doc_id = %handshake.doc_id, "progress subscriber connected");
    let subscription = state.publisher.subscribe(&handshake.doc_id).await;
    stream_progress(&mut sender, &mut receiver, subscription).await;

    let _ = sender.send(Message::Close(None)).await;
    state.publisher.release_if_idle(&handshake.doc_id).await;
    debug!(doc_id = %handshake.doc_id, "progress subscriber disconnected");
}

async fn stream_progress(
    sender: &mut SplitSink<WebSocket, Message>,
    receiver: &mut futures::stream::SplitStream<WebSocket>,
    mut subscription: crate::progress::Subscription,
) {
    if let Some(snapshot) = subscription.snapshot.take() {
        let is_final = snapshot.is_final();
        if send_event(sender, &snapshot).await.is_err() || is_final {
            return;
        }
    }

    loop {
        tokio::select! {
            event = subscription.next_event() => {
                let Some(event) = event else { break };
                let is_final = event.is_final();
                if send_event(sender, &event).await.is_err() || is_final {
                    break;
                }
            }
            incoming = receiver.next() => {
                match incoming {
                    Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                    _ => {}
                }
            }
        }
    }
}

async fn send_event(
    sender: &mut SplitSink<WebSocket, Message>,
    event: &crate::progress::ProgressEvent,
) -> Result<(), ()> {
    let payload = match serde_json::to_string(event) {
        Ok(p) => p,
        Err(_) => return Err(()),
    };
    sender.send(Message::Text(payload)).await.map_err(|_| ())
}
