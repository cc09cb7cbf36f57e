//! WebSocket push channel.
//!
//! Inbound protocol: a text frame `"ping"` elicits `"pong"`; a frame
//! `"session_id:<token>"` binds the channel to that session id. All other
//! inbound frames are ignored. Outbound frames are JSON progress events
//! forwarded from the session's channel.

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::IntoResponse;
use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio::time::{timeout, Duration};
use tracing::debug;

use super::AppState;
use crate::session::SessionRegistry;

/// Receive poll bound. Keeps the loop responsive to external cancellation;
/// not a protocol signal.
const RECV_TIMEOUT: Duration = Duration::from_secs(1);

/// Parsed inbound text frame.
#[derive(Debug, PartialEq, Eq)]
pub enum InboundFrame {
    Ping,
    Bind(String),
}

impl InboundFrame {
    /// Parse a text frame; unrecognized frames yield `None` and are ignored.
    pub fn parse(text: &str) -> Option<Self> {
        if text == "ping" {
            return Some(InboundFrame::Ping);
        }
        if let Some(token) = text.strip_prefix("session_id:") {
            if !token.is_empty() {
                return Some(InboundFrame::Bind(token.to_string()));
            }
        }
        None
    }
}

/// GET /ws
pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state.registry))
}

async fn handle_socket(socket: WebSocket, registry: SessionRegistry) {
    let (mut sink, mut stream) = socket.split();

    // Outbound frames flow through an mpsc channel so the registry can push
    // without holding the socket; this task forwards them to the client.
    let (tx, mut rx) = mpsc::unbounded_channel::<String>();
    let forward = tokio::spawn(async move {
        while let Some(text) = rx.recv().await {
            if sink.send(Message::Text(text)).await.is_err() {
                break;
            }
        }
    });

    let mut bound = false;
    loop {
        match timeout(RECV_TIMEOUT, stream.next()).await {
            // Poll timeout: keep listening.
            Err(_) => continue,
            Ok(None) => break,
            Ok(Some(Err(e))) => {
                debug!(error = %e, "WebSocket receive error");
                break;
            }
            Ok(Some(Ok(Message::Text(text)))) => match InboundFrame::parse(&text) {
                Some(InboundFrame::Ping) => {
                    if tx.send("pong".to_string()).is_err() {
                        break;
                    }
                }
                Some(InboundFrame::Bind(session_id)) => {
                    registry
                        .connect_with_session_id(tx.clone(), &session_id)
                        .await;
                    bound = true;
                }
                None => {}
            },
            Ok(Some(Ok(Message::Close(_)))) => break,
            // Binary and protocol ping/pong frames are ignored.
            Ok(Some(Ok(_))) => {}
        }
    }

    if bound {
        registry.disconnect(&tx).await;
    }
    forward.abort();
}
