//! WebSocket leg of the transport boundary: the `messageAdded` and
//! `groupAdded` subscription feeds. One socket carries both feeds; their
//! registrations live exactly as long as the socket.

use axum::{
    extract::{
        ws::{Message as WsMessage, WebSocket},
        Query, State, WebSocketUpgrade,
    },
    http::StatusCode,
    response::{IntoResponse, Response},
};
use futures_util::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};
use uuid::Uuid;

use palaver_bus::{GroupAddedFilter, MessageAddedFilter};
use palaver_core::{Event, Group, GroupId, Message, Topic, User};

use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct WsQuery {
    pub token: String,
}

/// Frames sent by the client.
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ClientFrame {
    /// Registers (or replaces) this socket's feeds: `message_groups` is the
    /// interest set for `messageAdded`, `groups` opts into `groupAdded`.
    Subscribe {
        #[serde(default)]
        message_groups: Vec<GroupId>,
        #[serde(default)]
        groups: bool,
    },
    Ping,
}

/// Frames sent by the server.
#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ServerFrame {
    Subscribed {
        message_groups: Vec<GroupId>,
        groups: bool,
    },
    MessageAdded {
        message: Message,
    },
    GroupAdded {
        group: Group,
    },
    Error {
        message: String,
    },
    Pong,
}

pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    Query(params): Query<WsQuery>,
) -> Response {
    match state.authed_user(&params.token).await {
        Ok(user) => ws.on_upgrade(move |socket| handle_socket(socket, state, user)),
        Err(_) => StatusCode::UNAUTHORIZED.into_response(),
    }
}

async fn handle_socket(socket: WebSocket, state: AppState, user: User) {
    let connection_id = Uuid::new_v4();
    let (mut sender, mut receiver) = socket.split();
    let (tx, mut rx) = mpsc::unbounded_channel::<ServerFrame>();

    // Forward outbound frames from the feed tasks to the socket.
    let forwarder = tokio::spawn(async move {
        while let Some(frame) = rx.recv().await {
            match serde_json::to_string(&frame) {
                Ok(json) => {
                    if sender.send(WsMessage::Text(json)).await.is_err() {
                        break;
                    }
                }
                Err(err) => warn!(%err, "failed to encode server frame"),
            }
        }
    });

    debug!(%connection_id, user = %user.id, "subscription socket connected");

    let mut feeds: Vec<JoinHandle<()>> = Vec::new();

    while let Some(frame) = receiver.next().await {
        let frame = match frame {
            Ok(frame) => frame,
            Err(err) => {
                debug!(%connection_id, %err, "socket error");
                break;
            }
        };
        match frame {
            WsMessage::Text(text) => match serde_json::from_str::<ClientFrame>(&text) {
                Ok(ClientFrame::Subscribe {
                    message_groups,
                    groups,
                }) => {
                    // A new subscribe frame replaces the previous feeds.
                    for feed in feeds.drain(..) {
                        feed.abort();
                    }
                    feeds = spawn_feeds(&state, &user, &message_groups, groups, &tx);
                    let _ = tx.send(ServerFrame::Subscribed {
                        message_groups,
                        groups,
                    });
                }
                Ok(ClientFrame::Ping) => {
                    let _ = tx.send(ServerFrame::Pong);
                }
                Err(err) => {
                    let _ = tx.send(ServerFrame::Error {
                        message: format!("invalid frame: {err}"),
                    });
                }
            },
            WsMessage::Close(_) => break,
            // Ignore binary and transport-level ping/pong frames.
            _ => {}
        }
    }

    for feed in feeds {
        feed.abort();
    }
    forwarder.abort();
    debug!(%connection_id, user = %user.id, "subscription socket closed");
}

fn spawn_feeds(
    state: &AppState,
    user: &User,
    message_groups: &[GroupId],
    groups: bool,
    tx: &mpsc::UnboundedSender<ServerFrame>,
) -> Vec<JoinHandle<()>> {
    let mut feeds = Vec::new();

    if !message_groups.is_empty() {
        let mut subscription = state.bus.subscribe(
            Topic::MessageAdded,
            MessageAddedFilter::new(
                user.id,
                message_groups.iter().copied(),
                state.membership(),
            ),
        );
        let tx = tx.clone();
        feeds.push(tokio::spawn(async move {
            while let Some(event) = subscription.recv().await {
                let Event::MessageAdded { message } = event else {
                    continue;
                };
                if tx.send(ServerFrame::MessageAdded { message }).is_err() {
                    break;
                }
            }
        }));
    }

    if groups {
        let mut subscription = state
            .bus
            .subscribe(Topic::GroupAdded, GroupAddedFilter::new(user.id));
        let tx = tx.clone();
        feeds.push(tokio::spawn(async move {
            while let Some(event) = subscription.recv().await {
                let Event::GroupAdded { group } = event else {
                    continue;
                };
                if tx.send(ServerFrame::GroupAdded { group }).is_err() {
                    break;
                }
            }
        }));
    }

    feeds
}
