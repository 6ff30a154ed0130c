//! `GET /ws` — replay then live event streaming.
//!
//! Auth rides a query parameter rather than a header because browsers
//! cannot set request headers on a WebSocket upgrade. Token validation
//! failures still close with a *WebSocket* close code (4401/4403) rather
//! than rejecting the HTTP upgrade, since that's the only channel available
//! post-101.

use axum::extract::ws::{CloseFrame, Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Query, State};
use axum::response::IntoResponse;
use serde::Deserialize;
use tokio::sync::broadcast;
use tracing::{info, warn};

use crate::auth;
use crate::models::Event;
use crate::services::event as event_service;
use crate::state::AppState;

use super::events::{ClientMessage, ServerMessage, Subscriptions};

const CLOSE_BACKPRESSURE: u16 = 1008;
const CLOSE_GOING_AWAY: u16 = 1001;
const CLOSE_INTERNAL_ERROR: u16 = 1011;
const CLOSE_MISSING_TOKEN: u16 = 4401;
const CLOSE_INVALID_TOKEN: u16 = 4403;

#[derive(Debug, Deserialize)]
pub struct WsQuery {
    token: Option<String>,
}

pub async fn websocket_handler(
    ws: WebSocketUpgrade,
    Query(query): Query<WsQuery>,
    State(state): State<AppState>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state, query.token))
}

async fn handle_socket(mut socket: WebSocket, state: AppState, token: Option<String>) {
    let Some(token) = token else {
        close_with(&mut socket, CLOSE_MISSING_TOKEN, "missing token").await;
        return;
    };
    if auth::check_token(&state, &token).is_err() {
        close_with(&mut socket, CLOSE_INVALID_TOKEN, "invalid token").await;
        return;
    }

    // Subscribe before computing `replay_until` so no committed event can
    // fall in the gap between the two.
    let mut live_rx = state.broadcast_tx.subscribe();

    let hello = match socket.recv().await {
        Some(Ok(Message::Text(text))) => text,
        _ => {
            close_with(&mut socket, CLOSE_BACKPRESSURE, "expected hello").await;
            return;
        }
    };

    let ClientMessage::Hello {
        after_event_id,
        subscriptions,
    } = match serde_json::from_str::<ClientMessage>(&hello) {
        Ok(msg) => msg,
        Err(_) => {
            close_with(&mut socket, CLOSE_BACKPRESSURE, "malformed hello").await;
            return;
        }
    };
    let Subscriptions { channels, topics } = subscriptions.unwrap_or_default();

    let replay_until = match event_service::max_event_id(&state.pool).await {
        Ok(max) => max,
        Err(_) => {
            close_with(&mut socket, CLOSE_INTERNAL_ERROR, "internal error").await;
            return;
        }
    };

    let hello_ok = ServerMessage::HelloOk {
        replay_until,
        instance_id: state.instance_id.to_string(),
    };
    if send_json(&mut socket, &hello_ok).await.is_err() {
        return;
    }

    let replay = match event_service::list_range_filtered(
        &state.pool,
        after_event_id,
        replay_until,
        Some(&channels),
        Some(&topics),
    )
    .await
    {
        Ok(events) => events,
        Err(_) => {
            close_with(&mut socket, CLOSE_INTERNAL_ERROR, "internal error").await;
            return;
        }
    };

    for event in replay {
        if send_json(&mut socket, &ServerMessage::event(event)).await.is_err() {
            return;
        }
    }

    info!(instance_id = %state.instance_id, replay_until, "websocket connection entered live mode");
    live_loop(socket, &mut live_rx, state, replay_until, channels, topics).await;
}

async fn live_loop(
    mut socket: WebSocket,
    live_rx: &mut broadcast::Receiver<Event>,
    state: AppState,
    replay_until: i64,
    channels: Vec<String>,
    topics: Vec<String>,
) {
    let mut shutdown_rx = state.shutdown_rx.clone();

    loop {
        tokio::select! {
            _ = shutdown_rx.changed() => {
                if *shutdown_rx.borrow() {
                    close_with(&mut socket, CLOSE_GOING_AWAY, "daemon shutting down").await;
                    return;
                }
            }
            incoming = socket.recv() => {
                match incoming {
                    Some(Ok(Message::Close(_))) | None => {
                        return;
                    }
                    Some(Ok(_)) => {
                        // Clients only ever send `hello`; anything else on a
                        // live connection is ignored rather than rejected.
                    }
                    Some(Err(_)) => return,
                }
            }
            event = live_rx.recv() => {
                match event {
                    Ok(event) => {
                        if event.event_id <= replay_until {
                            continue;
                        }
                        if !event_service::matches_subscription(&event, Some(&channels), Some(&topics)) {
                            continue;
                        }
                        if send_json(&mut socket, &ServerMessage::event(event)).await.is_err() {
                            return;
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(_)) => {
                        warn!("websocket connection lagged past broadcast capacity, closing");
                        close_with(&mut socket, CLOSE_BACKPRESSURE, "backpressure").await;
                        return;
                    }
                    Err(broadcast::error::RecvError::Closed) => {
                        close_with(&mut socket, CLOSE_GOING_AWAY, "daemon shutting down").await;
                        return;
                    }
                }
            }
        }
    }
}

async fn send_json(socket: &mut WebSocket, message: &ServerMessage) -> Result<(), ()> {
    let text = serde_json::to_string(message).map_err(|_| ())?;
    socket.send(Message::Text(text)).await.map_err(|_| ())
}

async fn close_with(socket: &mut WebSocket, code: u16, reason: &str) {
    let _ = socket
        .send(Message::Close(Some(CloseFrame {
            code,
            reason: reason.to_string().into(),
        })))
        .await;
}
