//! WebSocket editor adapter.
//!
//! Each connected editor gets one socket: client messages dispatch to the
//! session and mesh handles, and every server-side notification fans out
//! through a broadcast channel that all sockets subscribe to.

use axum::Router;
use axum::extract::State;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::response::Response;
use axum::routing::get;
use futures::{Sink, SinkExt, StreamExt};
use tokio::sync::broadcast;
use tracing::{debug, warn};

use tandem_core::PeerId;
use tandem_peer::{EventEmitter, InitPayload, JoinMode, MeshHandle, SessionHandle};

use crate::protocol::{ClientMessage, EditorOp, IndexField, ServerMessage};

/// Shared handles for every socket and API route.
#[derive(Clone)]
pub struct AppState {
    pub session: SessionHandle,
    pub mesh: MeshHandle,
    pub updates: broadcast::Sender<ServerMessage>,
}

/// Routes session notifications into the socket broadcast.
#[derive(Clone)]
pub struct WsEmitter {
    updates: broadcast::Sender<ServerMessage>,
}

impl WsEmitter {
    #[must_use]
    pub fn new(updates: broadcast::Sender<ServerMessage>) -> Self {
        Self { updates }
    }
}

impl EventEmitter for WsEmitter {
    fn emit_init(&self, payload: &InitPayload) {
        let _ = self.updates.send(ServerMessage::Init {
            client_id: payload.client_id.clone(),
            content: payload.content.clone(),
            neighbors: payload.neighbors.clone(),
        });
    }

    fn emit_remote_insert(&self, index: usize, value: char) {
        let _ = self.updates.send(ServerMessage::Operations {
            operations: vec![EditorOp::Insert {
                index: index as u64,
                char: value,
            }],
        });
    }

    fn emit_remote_delete(&self, index: usize) {
        let _ = self.updates.send(ServerMessage::Operations {
            operations: vec![EditorOp::Delete {
                index: index as u64,
            }],
        });
    }

    fn emit_error(&self, message: &str) {
        let _ = self.updates.send(ServerMessage::Error {
            message: message.to_owned(),
        });
    }
}

pub fn router(state: AppState) -> Router {
    Router::new().route("/ws", get(ws_handler)).with_state(state)
}

async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: AppState) {
    let mut updates = state.updates.subscribe();
    let (mut sink, mut stream) = socket.split();

    loop {
        tokio::select! {
            incoming = stream.next() => {
                let Some(Ok(message)) = incoming else { break };
                let Message::Text(text) = message else { continue };
                let reply = match serde_json::from_str::<ClientMessage>(text.as_str()) {
                    Ok(message) => dispatch(&state, message).await,
                    Err(e) => {
                        debug!(error = %e, "unparseable editor message");
                        None
                    }
                };
                if let Some(reply) = reply
                    && send(&mut sink, &reply).await.is_err()
                {
                    break;
                }
            }
            update = updates.recv() => {
                match update {
                    Ok(message) => {
                        if send(&mut sink, &message).await.is_err() {
                            break;
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!(skipped, "socket lagged behind notifications");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        }
    }
    debug!("editor socket closed");
}

async fn send(
    sink: &mut (impl Sink<Message, Error = axum::Error> + Unpin),
    message: &ServerMessage,
) -> Result<(), axum::Error> {
    let json = serde_json::to_string(message).map_err(axum::Error::new)?;
    sink.send(Message::Text(json.into())).await
}

async fn dispatch(state: &AppState, message: ClientMessage) -> Option<ServerMessage> {
    match message {
        ClientMessage::Ping => Some(ServerMessage::Pong),
        ClientMessage::GetClientId => {
            let payload = state.session.init_payload().await?;
            Some(ServerMessage::Init {
                client_id: payload.client_id,
                content: payload.content,
                neighbors: payload.neighbors,
            })
        }
        ClientMessage::Connect { peer_address } => {
            let Ok(peer) = PeerId::parse(&peer_address) else {
                return Some(ServerMessage::Error {
                    message: "invalid_peer_address".to_owned(),
                });
            };
            if let Err(e) = state.mesh.join(peer, JoinMode::Ask).await {
                // Transient by the error policy: logged, not user-visible.
                warn!(error = ?e, %peer_address, "join failed");
            }
            None
        }
        ClientMessage::Disconnect { peer_id } => {
            match peer_id.as_deref().map(PeerId::parse) {
                Some(Ok(peer)) => state.mesh.leave(peer).await,
                Some(Err(e)) => debug!(error = %e, "disconnect with bad peer id"),
                None => state.mesh.leave_all().await,
            }
            None
        }
        ClientMessage::Insert { index, char, .. } => {
            // The wire index names where the character lands (1-based); the
            // document wants the character it goes after. The session
            // broadcasts contract errors to the editors itself.
            let after = usize::try_from(index).unwrap_or(usize::MAX).saturating_sub(1);
            if let Err(e) = state.session.local_insert(after, char).await {
                warn!(error = %e, "rejected insert");
            }
            None
        }
        ClientMessage::Delete { index, .. } => {
            let IndexField::Index(index) = index else {
                return None;
            };
            let index = usize::try_from(index).unwrap_or(usize::MAX);
            if let Err(e) = state.session.local_delete(index).await {
                warn!(error = %e, "rejected delete");
            }
            None
        }
    }
}
