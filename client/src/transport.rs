//! Transport: one long-lived framed WebSocket connection per client
//! (spec.md §4.5), newline-delimited JSON [`Frame`]s over
//! `tokio-tungstenite`.
//!
//! Reconnection, backoff, and the heartbeat loop live here; everything
//! above this module only sees [`ConnectionState`] transitions and
//! [`Frame`] values arriving on a channel.

use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use rand::Rng;
use tokio::sync::{mpsc, watch};
use tokio_tungstenite::tungstenite::Message;

use synckit_core::wire::{Frame, HelloPayload, PingPongPayload};

/// Connection lifecycle, matching spec.md §4.5 exactly. Initial state is
/// `Disconnected`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    Reconnecting,
    Failed,
}

/// Exponential backoff with jitter: `base * 2^attempt`, capped, with
/// ±20% uniform jitter so a reconnect storm doesn't retry in lockstep
/// (spec.md §4.5, §8 "reconnect storm" boundary case).
pub fn backoff_delay(attempt: u32, base_ms: u64, cap_ms: u64) -> Duration {
    let exp = base_ms.saturating_mul(1u64 << attempt.min(16));
    let capped = exp.min(cap_ms).max(1);
    let jitter_span = (capped as f64 * 0.2) as i64;
    let jitter = if jitter_span > 0 {
        rand::thread_rng().gen_range(-jitter_span..=jitter_span)
    } else {
        0
    };
    let millis = (capped as i64 + jitter).max(1) as u64;
    Duration::from_millis(millis)
}

/// Handle to a running transport loop: send [`Frame`]s out, receive
/// [`Frame`]s in, watch [`ConnectionState`] transitions, and force an
/// immediate reconnect (used by the Subscribe soft timeout, spec.md §5).
pub struct TransportHandle {
    pub outgoing: mpsc::Sender<Frame>,
    pub incoming: mpsc::Receiver<Frame>,
    pub state: watch::Receiver<ConnectionState>,
    pub force_reconnect: mpsc::Sender<()>,
}

/// Drives one reconnect-forever loop against `url`, per spec.md §4.5:
/// infinite retries with backoff unless the server sends `AUTH_FAILED`,
/// which transitions permanently to `Failed`.
///
/// Runs until the returned `outgoing` sender is dropped.
pub fn spawn(
    url: String,
    client_id: String,
    auth_token: Option<String>,
    heartbeat_interval_ms: u64,
    reconnect_base_ms: u64,
    reconnect_cap_ms: u64,
) -> TransportHandle {
    let (out_tx, out_rx) = mpsc::channel::<Frame>(256);
    let (in_tx, in_rx) = mpsc::channel::<Frame>(256);
    let (state_tx, state_rx) = watch::channel(ConnectionState::Disconnected);
    let (force_tx, force_rx) = mpsc::channel::<()>(8);

    tokio::spawn(run_reconnect_loop(
        url,
        client_id,
        auth_token,
        heartbeat_interval_ms,
        reconnect_base_ms,
        reconnect_cap_ms,
        out_rx,
        in_tx,
        state_tx,
        force_rx,
    ));

    TransportHandle {
        outgoing: out_tx,
        incoming: in_rx,
        state: state_rx,
        force_reconnect: force_tx,
    }
}

#[allow(clippy::too_many_arguments)]
async fn run_reconnect_loop(
    url: String,
    client_id: String,
    auth_token: Option<String>,
    heartbeat_interval_ms: u64,
    reconnect_base_ms: u64,
    reconnect_cap_ms: u64,
    mut out_rx: mpsc::Receiver<Frame>,
    in_tx: mpsc::Sender<Frame>,
    state_tx: watch::Sender<ConnectionState>,
    mut force_rx: mpsc::Receiver<()>,
) {
    // Outgoing frames queued while disconnected are simply left in the
    // channel; the Offline Queue above this module is the durable buffer,
    // this channel is only the in-flight hop to the socket.
    let mut attempt: u32 = 0;

    loop {
        if *state_tx.borrow() == ConnectionState::Failed {
            return;
        }

        let _ = state_tx.send(if attempt == 0 {
            ConnectionState::Connecting
        } else {
            ConnectionState::Reconnecting
        });

        match connect_once(
            &url,
            &client_id,
            auth_token.clone(),
            heartbeat_interval_ms,
            &mut out_rx,
            &in_tx,
            &state_tx,
            &mut force_rx,
        )
        .await
        {
            ConnectOutcome::AuthRejected => {
                let _ = state_tx.send(ConnectionState::Failed);
                return;
            }
            ConnectOutcome::ChannelClosed => return,
            ConnectOutcome::Disconnected { ever_connected } => {
                attempt = if ever_connected { 0 } else { attempt + 1 };
                let _ = state_tx.send(ConnectionState::Reconnecting);
                tokio::time::sleep(backoff_delay(attempt, reconnect_base_ms, reconnect_cap_ms)).await;
            }
        }
    }
}

enum ConnectOutcome {
    Disconnected { ever_connected: bool },
    AuthRejected,
    ChannelClosed,
}

async fn connect_once(
    url: &str,
    client_id: &str,
    auth_token: Option<String>,
    heartbeat_interval_ms: u64,
    out_rx: &mut mpsc::Receiver<Frame>,
    in_tx: &mpsc::Sender<Frame>,
    state_tx: &watch::Sender<ConnectionState>,
    force_rx: &mut mpsc::Receiver<()>,
) -> ConnectOutcome {
    let ws_stream = match tokio_tungstenite::connect_async(url).await {
        Ok((stream, _)) => stream,
        Err(e) => {
            tracing::debug!(error = %e, "transport connect failed, will retry");
            return ConnectOutcome::Disconnected { ever_connected: false };
        }
    };

    let (mut writer, mut reader) = ws_stream.split();

    let hello = Frame::Hello(HelloPayload {
        client_id: client_id.to_string(),
        token: auth_token,
        protocol_version: 1,
    });
    let Ok(line) = hello.encode_line() else {
        return ConnectOutcome::Disconnected { ever_connected: false };
    };
    if writer.send(Message::Text(line)).await.is_err() {
        return ConnectOutcome::Disconnected { ever_connected: false };
    }

    let _ = state_tx.send(ConnectionState::Connected);
    let mut missed_pongs = 0u32;
    let mut heartbeat = tokio::time::interval(Duration::from_millis(heartbeat_interval_ms));
    heartbeat.tick().await; // first tick fires immediately; consume it

    loop {
        tokio::select! {
            biased;

            _ = force_rx.recv() => {
                tracing::debug!("forced reconnect requested (subscribe timeout), reconnecting");
                return ConnectOutcome::Disconnected { ever_connected: true };
            }

            maybe_frame = out_rx.recv() => {
                match maybe_frame {
                    Some(frame) => {
                        let Ok(line) = frame.encode_line() else { continue };
                        if writer.send(Message::Text(line)).await.is_err() {
                            return ConnectOutcome::Disconnected { ever_connected: true };
                        }
                    }
                    None => return ConnectOutcome::ChannelClosed,
                }
            }

            _ = heartbeat.tick() => {
                missed_pongs += 1;
                if missed_pongs >= 2 {
                    tracing::debug!("missed two consecutive pongs, reconnecting");
                    return ConnectOutcome::Disconnected { ever_connected: true };
                }
                let ping = Frame::Ping(PingPongPayload { t: now_millis() });
                if let Ok(line) = ping.encode_line() {
                    if writer.send(Message::Text(line)).await.is_err() {
                        return ConnectOutcome::Disconnected { ever_connected: true };
                    }
                }
            }

            incoming = reader.next() => {
                match incoming {
                    Some(Ok(Message::Text(text))) => {
                        match Frame::decode_line(&text) {
                            Ok(frame) => {
                                if matches!(frame, Frame::Pong(_)) {
                                    missed_pongs = 0;
                                }
                                let is_auth_error = matches!(
                                    &frame,
                                    Frame::Error(p) if p.code == synckit_core::wire::WireErrorCode::AuthFailed
                                );
                                if in_tx.send(frame).await.is_err() {
                                    return ConnectOutcome::ChannelClosed;
                                }
                                if is_auth_error {
                                    return ConnectOutcome::AuthRejected;
                                }
                            }
                            Err(e) => {
                                tracing::warn!(error = %e, "dropping malformed wire frame");
                            }
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => return ConnectOutcome::Disconnected { ever_connected: true },
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        tracing::debug!(error = %e, "websocket read error, reconnecting");
                        return ConnectOutcome::Disconnected { ever_connected: true };
                    }
                }
            }
        }
    }
}

fn now_millis() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}
