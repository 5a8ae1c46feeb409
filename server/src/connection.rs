//! One task per WebSocket connection (spec.md §4.6 per-session state
//! machine: `Handshaking -> Subscribed -> (Publishing <-> Receiving) ->
//! Closed`). Frames are dispatched in arrival order to the relevant
//! [`HubHandle`] — this task never touches another connection's state
//! directly, only through hub command channels.

use std::collections::HashSet;

use axum::extract::ws::{Message, WebSocket};
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;

use synckit_core::wire::{ErrorPayload, Frame, WelcomePayload, WireErrorCode};
use synckit_core::{ClientId, Delta, DocumentId};

use crate::app::AppState;
use crate::session::{self, RateLimiter, SessionState};

/// Drives one connection end to end: handshake, subscribe/publish
/// dispatch, heartbeat-timeout enforcement, and cleanup on close.
pub async fn handle_socket(socket: WebSocket, state: AppState) {
    let (mut sink, mut stream) = socket.split();
    let (out_tx, mut out_rx) = mpsc::channel::<Frame>(256);

    // Forward whatever this connection's hubs (or this handler) enqueue
    // onto the socket. A separate task so a slow hub fan-out never blocks
    // this connection's own read loop.
    let writer = tokio::spawn(async move {
        while let Some(frame) = out_rx.recv().await {
            let Ok(line) = frame.encode_line() else { continue };
            if sink.send(Message::Text(line)).await.is_err() {
                break;
            }
        }
    });

    let mut conn_state = SessionState::Handshaking;
    let mut session_row = None;
    let mut client_id: Option<ClientId> = None;
    let mut subscribed_docs: HashSet<DocumentId> = HashSet::new();
    let mut limiter = RateLimiter::new(state.config.rate_limit_per_minute);

    loop {
        let next = tokio::time::timeout(state.config.heartbeat_timeout, stream.next()).await;
        let message = match next {
            Ok(Some(Ok(msg))) => msg,
            Ok(Some(Err(e))) => {
                tracing::debug!(error = %e, "websocket read error, closing connection");
                break;
            }
            Ok(None) => break,
            Err(_) => {
                tracing::debug!(session = ?session_row.as_ref().map(|s: &synckit_storage::Session| &s.id), "heartbeat timeout, closing connection");
                break;
            }
        };

        match message {
            Message::Text(text) => {
                let frame = match Frame::decode_line(&text) {
                    Ok(f) => f,
                    Err(e) => {
                        tracing::warn!(error = %e, "dropping malformed wire frame");
                        continue;
                    }
                };

                if let Some(session) = session_row.as_mut() {
                    let _ = session::touch_session(state.storage.as_ref(), session).await;
                }

                match frame {
                    Frame::Hello(payload) => {
                        if conn_state != SessionState::Handshaking {
                            continue;
                        }
                        match session::open_session(state.storage.as_ref(), payload.client_id.clone(), None).await {
                            Ok(session) => {
                                let _ = out_tx
                                    .send(Frame::Welcome(WelcomePayload {
                                        session_id: session.id.clone(),
                                        server_time: now_millis(),
                                    }))
                                    .await;
                                client_id = Some(payload.client_id);
                                session_row = Some(session);
                                conn_state = SessionState::Receiving;
                            }
                            Err(e) => {
                                send_error(&out_tx, WireErrorCode::Internal, e.to_string()).await;
                            }
                        }
                    }

                    Frame::Subscribe(payload) => {
                        if conn_state == SessionState::Handshaking {
                            send_error(&out_tx, WireErrorCode::AuthFailed, "subscribe before hello".into()).await;
                            continue;
                        }
                        let Some(session) = session_row.as_ref() else { continue };
                        match state.registry.get_or_spawn(&payload.document_id).await {
                            Ok(hub) => {
                                subscribed_docs.insert(payload.document_id.clone());
                                conn_state = SessionState::Subscribed;
                                if let Err(e) = hub.subscribe(session.id.clone(), payload.vector_clock, out_tx.clone()).await {
                                    send_error(&out_tx, WireErrorCode::Internal, e.to_string()).await;
                                }
                            }
                            Err(e) => send_error(&out_tx, WireErrorCode::Internal, e.to_string()).await,
                        }
                    }

                    Frame::Delta(frame) => {
                        if conn_state == SessionState::Handshaking {
                            send_error(&out_tx, WireErrorCode::AuthFailed, "publish before hello".into()).await;
                            continue;
                        }
                        let Some(session) = session_row.as_ref() else { continue };

                        if let Err(wait) = limiter.try_acquire() {
                            send_error(
                                &out_tx,
                                WireErrorCode::RateLimited,
                                format!("retry after {}ms", wait.as_millis()),
                            )
                            .await;
                            continue;
                        }

                        let delta: Delta = match frame.try_into() {
                            Ok(d) => d,
                            Err(e) => {
                                send_error(&out_tx, WireErrorCode::Internal, format!("{e}")).await;
                                continue;
                            }
                        };

                        if let Err(oversize) = check_oversize(&delta, &state) {
                            send_error(&out_tx, WireErrorCode::Oversize, oversize).await;
                            continue;
                        }

                        conn_state = SessionState::Publishing;
                        match state.registry.get_or_spawn(&delta.document_id).await {
                            Ok(hub) => {
                                if let Err(e) = hub.publish(session.id.clone(), delta).await {
                                    send_error(&out_tx, WireErrorCode::Internal, e.to_string()).await;
                                }
                            }
                            Err(e) => send_error(&out_tx, WireErrorCode::Internal, e.to_string()).await,
                        }
                        conn_state = SessionState::Receiving;
                    }

                    Frame::Ping(payload) => {
                        let _ = out_tx.send(Frame::Pong(payload)).await;
                    }

                    Frame::Pong(_) => {}

                    Frame::Welcome(_) | Frame::Ack(_) | Frame::SubscribeComplete(_) | Frame::Error(_) => {
                        // Server-to-client-only frames never arrive inbound; ignore defensively.
                    }
                }
            }
            Message::Close(_) => break,
            Message::Ping(_) | Message::Pong(_) | Message::Binary(_) => {}
        }
    }

    for document_id in &subscribed_docs {
        if let (Some(hub), Some(session)) = (state.registry.get(document_id), session_row.as_ref()) {
            hub.unsubscribe(session.id.clone()).await;
        }
    }
    if let Some(session) = &session_row {
        let _ = session::close_session(state.storage.as_ref(), &session.id).await;
    }
    writer.abort();
    tracing::debug!(client_id = ?client_id, "connection closed");
}

fn check_oversize(delta: &Delta, state: &AppState) -> Result<(), String> {
    let limits = &state.config.limits;
    if delta.field_name.len() > limits.max_field_name_bytes {
        return Err(format!(
            "field name {} bytes exceeds limit of {} bytes",
            delta.field_name.len(),
            limits.max_field_name_bytes
        ));
    }
    if let synckit_core::Op::Set(value) = &delta.op {
        let size = serde_json::to_vec(value).map(|b| b.len()).unwrap_or(usize::MAX);
        if size > limits.max_value_bytes {
            return Err(format!("value {} bytes exceeds limit of {} bytes", size, limits.max_value_bytes));
        }
    }
    match delta.wire_size() {
        Ok(size) if size > limits.max_delta_bytes => {
            Err(format!("delta {} bytes exceeds limit of {} bytes", size, limits.max_delta_bytes))
        }
        Ok(_) => Ok(()),
        Err(e) => Err(e.to_string()),
    }
}

async fn send_error(out_tx: &mpsc::Sender<Frame>, code: WireErrorCode, message: String) {
    let _ = out_tx
        .send(Frame::Error(ErrorPayload { code, message, context: None }))
        .await;
}

fn now_millis() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}
