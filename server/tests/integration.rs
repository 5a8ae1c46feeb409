//! End-to-end wire-level tests against a real `axum` server bound to an
//! ephemeral port, exercising the scenarios in spec.md §8 across actual
//! WebSocket connections rather than in-process hub commands (see
//! `hub.rs`'s unit tests for those).

use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use serde_json::json;
use tokio::net::TcpListener;
use tokio_tungstenite::tungstenite::Message;

use synckit_core::wire::{DeltaFrame, Frame, HelloPayload, SubscribePayload, WireOp};
use synckit_core::{HybridClock, VectorClock};
use synckit_server::{build_router, AppState, ServerConfig};
use synckit_storage::{InMemoryStorage, StorageAdapter};

struct TestServer {
    url: String,
}

async fn spawn_test_server() -> TestServer {
    let storage: Arc<dyn StorageAdapter> = Arc::new(InMemoryStorage::new());
    let state = AppState::new(storage, ServerConfig::default());
    let router = build_router(state);

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });

    TestServer {
        url: format!("ws://{addr}/sync"),
    }
}

type WsStream = tokio_tungstenite::WebSocketStream<tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>>;

async fn connect_and_hello(url: &str, client_id: &str) -> WsStream {
    let (mut ws, _) = tokio_tungstenite::connect_async(url).await.expect("connect");
    let hello = Frame::Hello(HelloPayload {
        client_id: client_id.to_string(),
        token: None,
        protocol_version: 1,
    });
    ws.send(Message::Text(hello.encode_line().unwrap())).await.unwrap();
    // Drain the `welcome` frame.
    let welcome = next_frame(&mut ws).await;
    assert!(matches!(welcome, Frame::Welcome(_)));
    ws
}

async fn subscribe(ws: &mut WsStream, document_id: &str, vector_clock: VectorClock) {
    let frame = Frame::Subscribe(SubscribePayload {
        document_id: document_id.to_string(),
        vector_clock,
    });
    ws.send(Message::Text(frame.encode_line().unwrap())).await.unwrap();
}

async fn drain_until_subscribe_complete(ws: &mut WsStream) -> Vec<Frame> {
    let mut deltas = Vec::new();
    loop {
        match next_frame(ws).await {
            Frame::SubscribeComplete(_) => return deltas,
            other => deltas.push(other),
        }
    }
}

async fn next_frame(ws: &mut WsStream) -> Frame {
    loop {
        let msg = tokio::time::timeout(Duration::from_secs(5), ws.next())
            .await
            .expect("timed out waiting for a frame")
            .expect("stream ended")
            .expect("websocket error");
        if let Message::Text(text) = msg {
            return Frame::decode_line(&text).expect("malformed frame from server");
        }
    }
}

fn delta_frame(document_id: &str, field: &str, value: serde_json::Value, client: &str, seq: u64, clock: &mut HybridClock) -> Frame {
    let stamp = clock.stamp();
    Frame::Delta(DeltaFrame {
        document_id: document_id.to_string(),
        field_name: field.to_string(),
        op: WireOp::Set,
        value: Some(value),
        stamp: (&stamp).into(),
        origin_client: client.to_string(),
        seq_at_origin: seq,
    })
}

#[tokio::test]
async fn s3_concurrent_writes_to_different_fields_both_persist_and_fan_out() {
    let server = spawn_test_server().await;

    let mut ws_a = connect_and_hello(&server.url, "A").await;
    let mut ws_b = connect_and_hello(&server.url, "B").await;

    subscribe(&mut ws_a, "doc", VectorClock::new()).await;
    subscribe(&mut ws_b, "doc", VectorClock::new()).await;
    drain_until_subscribe_complete(&mut ws_a).await;
    drain_until_subscribe_complete(&mut ws_b).await;

    let mut clock_a = HybridClock::new("A".to_string());
    let mut clock_b = HybridClock::new("B".to_string());

    ws_a.send(Message::Text(
        delta_frame("doc", "a", json!("A"), "A", 1, &mut clock_a).encode_line().unwrap(),
    ))
    .await
    .unwrap();
    ws_b.send(Message::Text(
        delta_frame("doc", "b", json!("B"), "B", 1, &mut clock_b).encode_line().unwrap(),
    ))
    .await
    .unwrap();

    // Each publisher gets its own Ack, then the other's Delta arrives.
    assert!(matches!(next_frame(&mut ws_a).await, Frame::Ack(_)));
    assert!(matches!(next_frame(&mut ws_b).await, Frame::Ack(_)));

    let seen_by_a = next_frame(&mut ws_a).await;
    let seen_by_b = next_frame(&mut ws_b).await;
    let Frame::Delta(fa) = seen_by_a else { panic!("expected delta") };
    let Frame::Delta(fb) = seen_by_b else { panic!("expected delta") };
    assert_eq!(fa.field_name, "b");
    assert_eq!(fb.field_name, "a");
}

#[tokio::test]
async fn late_subscriber_catches_up_on_full_history_via_vector_clock_gap() {
    let server = spawn_test_server().await;

    let mut writer = connect_and_hello(&server.url, "A").await;
    subscribe(&mut writer, "doc", VectorClock::new()).await;
    drain_until_subscribe_complete(&mut writer).await;

    let mut clock = HybridClock::new("A".to_string());
    for i in 1..=3u64 {
        writer
            .send(Message::Text(
                delta_frame("doc", &format!("f{i}"), json!(i), "A", i, &mut clock)
                    .encode_line()
                    .unwrap(),
            ))
            .await
            .unwrap();
        assert!(matches!(next_frame(&mut writer).await, Frame::Ack(_)));
    }

    let mut reader = connect_and_hello(&server.url, "B").await;
    subscribe(&mut reader, "doc", VectorClock::new()).await;
    let deltas = drain_until_subscribe_complete(&mut reader).await;
    assert_eq!(deltas.len(), 3);
}

#[tokio::test]
async fn oversize_field_name_is_rejected_synchronously_without_fan_out() {
    let server = spawn_test_server().await;

    let mut writer = connect_and_hello(&server.url, "A").await;
    let mut observer = connect_and_hello(&server.url, "B").await;
    subscribe(&mut writer, "doc", VectorClock::new()).await;
    subscribe(&mut observer, "doc", VectorClock::new()).await;
    drain_until_subscribe_complete(&mut writer).await;
    drain_until_subscribe_complete(&mut observer).await;

    let mut clock = HybridClock::new("A".to_string());
    let huge_field = "x".repeat(2000);
    writer
        .send(Message::Text(
            delta_frame("doc", &huge_field, json!(1), "A", 1, &mut clock)
                .encode_line()
                .unwrap(),
        ))
        .await
        .unwrap();

    let response = next_frame(&mut writer).await;
    let Frame::Error(payload) = response else { panic!("expected error frame") };
    assert_eq!(payload.code, synckit_core::wire::WireErrorCode::Oversize);

    // Nothing should have been fanned out to the observer.
    let result = tokio::time::timeout(Duration::from_millis(300), observer.next()).await;
    assert!(result.is_err(), "observer should not have received anything");
}

#[tokio::test]
async fn ping_is_answered_with_pong() {
    let server = spawn_test_server().await;
    let mut ws = connect_and_hello(&server.url, "A").await;
    ws.send(Message::Text(
        Frame::Ping(synckit_core::wire::PingPongPayload { t: 42 }).encode_line().unwrap(),
    ))
    .await
    .unwrap();
    let pong = next_frame(&mut ws).await;
    assert!(matches!(pong, Frame::Pong(p) if p.t == 42));
}
