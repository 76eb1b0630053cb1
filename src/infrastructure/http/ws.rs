//! Live-stream WebSocket attach.
//!
//! The client authenticates on the upgrade request, preferably with an
//! `Authorization: Bearer` header; a `token` query parameter is accepted
//! for clients that cannot set headers. After attach the server pushes
//! `{type, task, timestamp}` frames. The client sends a `"ping"` text
//! frame every 30 seconds; two missed heartbeats close the connection.

use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Query, State};
use axum::http::header::AUTHORIZATION;
use axum::http::HeaderMap;
use axum::response::{IntoResponse, Response};
use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use tokio::sync::Mutex;

use crate::domain::errors::CoreError;
use crate::services::ConnectionRegistry;

use super::error::ApiError;
use super::routes::AppState;

/// Expected client heartbeat cadence.
const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(30);
/// Connection closes after this silence (two missed heartbeats, plus slack
/// for the first ping).
const HEARTBEAT_TIMEOUT: Duration = Duration::from_secs(75);
/// Budget for one frame write to the socket.
const SOCKET_WRITE_TIMEOUT: Duration = Duration::from_secs(1);

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct WsParams {
    token: Option<String>,
}

pub async fn ws_handler(
    State(state): State<AppState>,
    Query(params): Query<WsParams>,
    headers: HeaderMap,
    ws: WebSocketUpgrade,
) -> Response {
    let token = headers
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(|t| t.trim().to_string())
        .or(params.token);

    let Some(token) = token else {
        return ApiError(CoreError::Unauthenticated("missing token".to_string()))
            .into_response();
    };

    let user_id = match state.verifier.verify(&token) {
        Ok(user_id) => user_id,
        Err(err) => return ApiError(err).into_response(),
    };

    let registry = state.registry.clone();
    ws.on_upgrade(move |socket| serve_connection(socket, user_id, registry))
}

async fn serve_connection(socket: WebSocket, user_id: String, registry: Arc<ConnectionRegistry>) {
    let (conn_id, frame_tx, mut frame_rx) = registry.register(&user_id).await;
    let (mut ws_tx, mut ws_rx) = socket.split();
    let last_heartbeat = Arc::new(Mutex::new(Instant::now()));

    let heartbeat_for_writer = last_heartbeat.clone();
    let writer = tokio::spawn(async move {
        let mut check = tokio::time::interval(HEARTBEAT_INTERVAL / 2);
        loop {
            tokio::select! {
                frame = frame_rx.recv() => match frame {
                    Some(frame) => {
                        let send = ws_tx.send(Message::Text(frame.into()));
                        match tokio::time::timeout(SOCKET_WRITE_TIMEOUT, send).await {
                            Ok(Ok(())) => {}
                            _ => break,
                        }
                    }
                    None => {
                        // Registry dropped us (deregister or drain); say
                        // goodbye properly.
                        let _ = ws_tx.send(Message::Close(None)).await;
                        break;
                    }
                },
                _ = check.tick() => {
                    if heartbeat_for_writer.lock().await.elapsed() > HEARTBEAT_TIMEOUT {
                        tracing::debug!("closing connection after missed heartbeats");
                        let _ = ws_tx.send(Message::Close(None)).await;
                        break;
                    }
                }
            }
        }
    });

    while let Some(Ok(message)) = ws_rx.next().await {
        match message {
            Message::Text(text) if text.as_str() == "ping" => {
                *last_heartbeat.lock().await = Instant::now();
                let _ = frame_tx.send("pong".to_string()).await;
            }
            Message::Close(_) => break,
            _ => {}
        }
    }

    registry.deregister(&user_id, conn_id).await;
    // Dropping the registry handle closes the frame queue, which lets the
    // writer flush its close frame and exit.
    drop(frame_tx);
    let _ = writer.await;
}
