//! WebSocket endpoints for both live channels
//!
//! Each accepted socket is split: a forward task drains the connection's
//! hub queue into the socket, while this module's loop reads client
//! messages. Dashboards receive the full event stream; extension clients
//! receive task sync payloads and may pull a re-sync at any time.

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::IntoResponse;
use futures::{SinkExt, StreamExt};
use log::{debug, warn};

use crate::constants::TASK_SYNC_LIMIT;
use crate::events::{ClientMessage, DashboardEvent, ExtensionEvent};
use crate::hub::{Channel, ConnectionId};
use crate::serve::AppState;

pub async fn dashboard_ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state, Channel::Dashboard))
}

pub async fn extension_ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state, Channel::Extension))
}

async fn handle_socket(socket: WebSocket, state: AppState, channel: Channel) {
    let (conn_id, mut outbound) = state.hub.register(channel);
    let (mut sink, mut stream) = socket.split();

    // Drains the hub queue into the socket until either side goes away
    let forward = tokio::spawn(async move {
        while let Some(message) = outbound.recv().await {
            if sink.send(message).await.is_err() {
                break;
            }
        }
    });

    // New extension clients immediately get the current open-task snapshot
    if channel == Channel::Extension {
        send_task_snapshot(&state, conn_id).await;
    }

    while let Some(Ok(message)) = stream.next().await {
        match message {
            Message::Text(text) => {
                handle_client_message(&state, channel, conn_id, text.as_str()).await;
            }
            Message::Close(_) => break,
            // Pings are answered by axum; binary frames are not part of
            // either channel's protocol
            _ => {}
        }
    }

    state.hub.unregister(channel, conn_id);
    forward.abort();
}

async fn handle_client_message(
    state: &AppState,
    channel: Channel,
    conn_id: ConnectionId,
    raw: &str,
) {
    let parsed: ClientMessage = match serde_json::from_str(raw) {
        Ok(parsed) => parsed,
        Err(e) => {
            warn!("Ignoring unparseable {:?} client message: {}", channel, e);
            return;
        }
    };

    match parsed {
        ClientMessage::Ping { timestamp } => {
            let payload = match channel {
                Channel::Dashboard => serde_json::to_string(&DashboardEvent::Pong { timestamp }),
                Channel::Extension => serde_json::to_string(&ExtensionEvent::Pong { timestamp }),
            };
            if let Ok(payload) = payload {
                state.hub.send_to(channel, conn_id, payload);
            }
        }
        ClientMessage::RequestTasks => {
            if channel == Channel::Extension {
                send_task_snapshot(state, conn_id).await;
            } else {
                debug!("REQUEST_TASKS ignored on the dashboard channel");
            }
        }
    }
}

/// Reply on one extension connection with the bounded open-task subset
async fn send_task_snapshot(state: &AppState, conn_id: ConnectionId) {
    let tasks = match state.store.list_open_tasks(TASK_SYNC_LIMIT).await {
        Ok(tasks) => tasks,
        Err(e) => {
            warn!("Could not load task snapshot: {}", e);
            return;
        }
    };
    if let Ok(payload) = serde_json::to_string(&ExtensionEvent::SyncedTasks { tasks }) {
        state.hub.send_to(Channel::Extension, conn_id, payload);
    }
}
