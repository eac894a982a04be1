use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{ConnectInfo, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use tokio::time::timeout;
use tracing::{debug, warn};

use crate::error::AppError;
use crate::models::PresenceState;
use crate::security::jwt;
use crate::state::AppState;
use crate::websocket::message_types::{error_frame, pong_frame, InboundFrame};
use crate::websocket::{ConnectionHandle, HEARTBEAT_INTERVAL, READ_DEADLINE, WRITE_DEADLINE};

#[derive(Debug, Deserialize)]
pub struct WsParams {
    pub token: Option<String>,
}

fn bearer_from_headers(headers: &HeaderMap) -> Option<String> {
    headers
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(|v| v.to_string())
}

/// Upgrade handler. A token in the query string or Authorization header
/// authenticates before the upgrade; otherwise the client owes an `auth`
/// frame as its first message.
pub async fn ws_handler(
    State(state): State<AppState>,
    Query(params): Query<WsParams>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    ws: WebSocketUpgrade,
) -> Response {
    let token = params.token.clone().or_else(|| bearer_from_headers(&headers));

    let authenticated = match token {
        Some(token) => match jwt::validate_access(&token, &state.config.jwt_secret) {
            Ok(user_id) => Some(user_id),
            Err(_) => return StatusCode::UNAUTHORIZED.into_response(),
        },
        None => None,
    };

    ws.on_upgrade(move |socket| handle_socket(state, authenticated, addr, socket))
}

/// Wait for the first-frame `auth` handshake.
async fn await_auth_frame(socket: &mut WebSocket, secret: &str) -> Option<i64> {
    let first = timeout(WRITE_DEADLINE, socket.recv()).await.ok()??;
    let Ok(Message::Text(text)) = first else {
        return None;
    };
    match serde_json::from_str::<InboundFrame>(&text) {
        Ok(InboundFrame::Auth { token }) => jwt::validate_access(&token, secret).ok(),
        _ => None,
    }
}

fn ingest_error_frame(error: &AppError) -> String {
    match error {
        AppError::BadRequest(_) => error_frame(&error.to_string()),
        _ => error_frame("failed to send message"),
    }
}

async fn handle_socket(
    state: AppState,
    authenticated: Option<i64>,
    addr: SocketAddr,
    mut socket: WebSocket,
) {
    let user_id = match authenticated {
        Some(id) => id,
        None => match await_auth_frame(&mut socket, &state.config.jwt_secret).await {
            Some(id) => id,
            None => {
                let _ = socket.send(Message::Close(None)).await;
                return;
            }
        },
    };
    let user_key = user_id.to_string();
    let conn_addr = addr.to_string();

    let (mut sink, mut stream) = socket.split();
    let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel::<Message>();
    let handle = state.registry.register(&user_key, &conn_addr, tx.clone()).await;

    {
        let chat = Arc::clone(&state.chat);
        let user = user_key.clone();
        tokio::spawn(async move {
            if let Err(e) = chat.set_user_status(&user, PresenceState::Online).await {
                warn!(user_id = %user, error = %e, "online status write failed");
            }
        });
    }

    // Writer task: the only owner of the sink. A write past its deadline
    // marks the connection inactive for the janitor.
    let writer_handle = Arc::clone(&handle);
    let writer = tokio::spawn(async move {
        while let Some(message) = rx.recv().await {
            let closing = matches!(message, Message::Close(_));
            match timeout(WRITE_DEADLINE, sink.send(message)).await {
                Ok(Ok(())) => {}
                Ok(Err(_)) | Err(_) => {
                    writer_handle.deactivate();
                    break;
                }
            }
            if closing {
                break;
            }
        }
    });

    // Protocol-level heartbeat.
    let heartbeat_handle = Arc::clone(&handle);
    let heartbeat = tokio::spawn(async move {
        let mut ticker = tokio::time::interval(HEARTBEAT_INTERVAL);
        ticker.tick().await;
        loop {
            ticker.tick().await;
            if !heartbeat_handle.send(Message::Ping(Vec::new())) {
                return;
            }
        }
    });

    read_loop(&state, &user_key, &handle, &mut stream).await;

    heartbeat.abort();
    let last_connection = state.registry.remove(&user_key, &conn_addr).await;
    writer.abort();

    if last_connection {
        if let Err(e) = state
            .chat
            .set_user_status(&user_key, PresenceState::Offline)
            .await
        {
            warn!(user_id = %user_key, error = %e, "offline status write failed");
        }
    }
    debug!(user_id = %user_key, addr = %conn_addr, "socket closed");
}

async fn read_loop(
    state: &AppState,
    user_key: &str,
    handle: &Arc<ConnectionHandle>,
    stream: &mut futures_util::stream::SplitStream<WebSocket>,
) {
    loop {
        let received = match timeout(READ_DEADLINE, stream.next()).await {
            Ok(received) => received,
            Err(_) => {
                // Read deadline exceeded; janitor will collect the entry.
                handle.deactivate();
                return;
            }
        };

        let message = match received {
            Some(Ok(message)) => message,
            Some(Err(_)) | None => {
                handle.deactivate();
                return;
            }
        };

        match message {
            Message::Text(text) => match serde_json::from_str::<InboundFrame>(&text) {
                Ok(InboundFrame::Ping) => {
                    handle.touch();
                    handle.send(Message::Text(pong_frame()));
                }
                Ok(InboundFrame::Chat { mut data }) => {
                    data.sender_id = user_key.to_string();
                    if let Err(e) = state.ingest.ingest(data).await {
                        handle.send(Message::Text(ingest_error_frame(&e)));
                    }
                }
                Ok(InboundFrame::Auth { .. }) => {
                    // Already authenticated; a repeat handshake is harmless.
                }
                Err(_) => {
                    handle.send(Message::Text(error_frame("unrecognized frame")));
                }
            },
            Message::Ping(payload) => {
                handle.touch();
                handle.send(Message::Pong(payload));
            }
            Message::Pong(_) => handle.touch(),
            Message::Close(_) => return,
            Message::Binary(_) => {}
        }
    }
}
