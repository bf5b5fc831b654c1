//! WebSocket endpoint at `/ws`.
//!
//! The upgrade itself requires a valid session. After connecting, the client
//! sends `{"type":"auth","userId":...}` naming the session user; only then is
//! the connection registered with the hub and eligible for task events.

use axum::{
    extract::{
        State,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    response::IntoResponse,
};
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tracing::{debug, warn};

use super::{ClientMessage, ConnectionId, Hub, ServerMessage};
use crate::api::AppState;
use crate::api::extract::CurrentUser;
use crate::types::{TaskId, User};

pub async fn ws_handler(
    ws: WebSocketUpgrade,
    CurrentUser(user): CurrentUser,
    State(state): State<AppState>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| async move {
        if let Err(e) = handle_socket(socket, state, user).await {
            warn!("realtime WS closed: {}", e);
        }
    })
}

struct Registration {
    id: ConnectionId,
    rx: mpsc::UnboundedReceiver<ServerMessage>,
}

/// Per-connection handshake state, independent of the socket.
pub(crate) struct ConnState<'a> {
    hub: &'a Hub,
    user: &'a User,
    registration: Option<Registration>,
    joined: Option<TaskId>,
}

impl<'a> ConnState<'a> {
    pub(crate) fn new(hub: &'a Hub, user: &'a User) -> Self {
        Self {
            hub,
            user,
            registration: None,
            joined: None,
        }
    }

    #[cfg(test)]
    fn is_registered(&self) -> bool {
        self.registration.is_some()
    }

    /// Handle one text frame. Returns the reply to send, if any.
    /// Malformed frames are logged and ignored.
    pub(crate) fn on_text(&mut self, text: &str) -> Option<ServerMessage> {
        match serde_json::from_str::<ClientMessage>(text) {
            Ok(message) => self.on_message(message),
            Err(e) => {
                warn!(user_id = %self.user.id, "Ignoring malformed WS message: {}", e);
                None
            }
        }
    }

    fn on_message(&mut self, message: ClientMessage) -> Option<ServerMessage> {
        match message {
            ClientMessage::Auth { user_id } if user_id == self.user.id => {
                if self.registration.is_none() {
                    let (id, rx) = self.hub.register(&self.user.id);
                    self.registration = Some(Registration { id, rx });
                }
                Some(ServerMessage::AuthSuccess)
            }
            ClientMessage::Auth { user_id } => {
                warn!(session_user = %self.user.id, claimed = %user_id, "WS auth user mismatch");
                Some(ServerMessage::AuthError {
                    message: "User id does not match session".to_string(),
                })
            }
            ClientMessage::JoinTask { task_id } => {
                debug!(user_id = %self.user.id, task_id, "Joined task room");
                self.joined = Some(task_id);
                None
            }
        }
    }

    /// Next event queued for this connection; pending forever until registered.
    async fn next_outbound(&mut self) -> Option<ServerMessage> {
        match &mut self.registration {
            Some(reg) => reg.rx.recv().await,
            None => std::future::pending().await,
        }
    }

    /// Drop the hub registration, if any.
    pub(crate) fn finish(mut self) {
        if let Some(reg) = self.registration.take() {
            self.hub.unregister(&self.user.id, reg.id);
        }
        debug!(user_id = %self.user.id, last_joined = ?self.joined, "WS connection finished");
    }
}

fn encode(message: &ServerMessage) -> anyhow::Result<Message> {
    Ok(Message::Text(serde_json::to_string(message)?.into()))
}

async fn handle_socket(socket: WebSocket, state: AppState, user: User) -> anyhow::Result<()> {
    let (mut sender, mut receiver) = socket.split();
    let mut conn = ConnState::new(&state.hub, &user);

    let result: anyhow::Result<()> = async {
        loop {
            tokio::select! {
                outbound = conn.next_outbound() => {
                    let Some(message) = outbound else { break };
                    if sender.send(encode(&message)?).await.is_err() {
                        break; // client disconnected
                    }
                }
                inbound = receiver.next() => {
                    let text = match inbound {
                        Some(Ok(Message::Text(text))) => text,
                        Some(Ok(Message::Close(_))) | None => break,
                        Some(Ok(_)) => continue,
                        Some(Err(e)) => {
                            debug!(user_id = %user.id, "WS receive error: {}", e);
                            break;
                        }
                    };
                    if let Some(reply) = conn.on_text(text.as_str()) {
                        sender.send(encode(&reply)?).await?;
                    }
                }
            }
        }
        Ok(())
    }
    .await;

    conn.finish();
    let _ = sender.close().await;
    result
}
