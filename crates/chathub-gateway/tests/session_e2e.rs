//! End-to-end sessions over a real socket: handshake, fan-out, liveness, close paths.

#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]
#![allow(clippy::panic)]

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use futures_util::{SinkExt, StreamExt};
use serde_json::json;
use tokio::net::{TcpListener, TcpStream};
use tokio_tungstenite::tungstenite::{self, Message};
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

use chathub_core::protocol::{ChatKind, Envelope, EnvelopeKind, RoomId};
use chathub_gateway::app_state::AppState;
use chathub_gateway::config;
use chathub_gateway::router::build_router;
use chathub_gateway::services::{AuthError, Identity, InMemoryPersister, TokenValidator};

type Client = WebSocketStream<MaybeTlsStream<TcpStream>>;

const WAIT: Duration = Duration::from_secs(5);

/// ping 1s, read deadline 2s, write timeout 1s.
const FAST_TIMERS: &str = r#"
  ping_interval_ms: 1000
  read_deadline_ms: 2000
  write_timeout_ms: 1000
"#;

struct FixedTokens;

#[async_trait]
impl TokenValidator for FixedTokens {
    async fn validate(&self, credential: &str) -> Result<Identity, AuthError> {
        let (user_id, username) = match credential {
            "t1" => (7, "alice"),
            "t2" => (8, "bob"),
            "" => return Err(AuthError::Missing),
            other => return Err(AuthError::Invalid(format!("unknown token {other}"))),
        };
        Ok(Identity { user_id, username: username.to_string() })
    }
}

struct Server {
    addr: SocketAddr,
    state: AppState,
    store: Arc<InMemoryPersister>,
}

async fn start() -> Server {
    start_with(FAST_TIMERS).await
}

/// `gateway` is the indented body of the `gateway:` section.
async fn start_with(gateway: &str) -> Server {
    let cfg = config::load_from_str(&format!(
        "version: 1\ngateway:{gateway}\nauth:\n  jwt_secret: \"test-secret\"\n"
    ))
    .unwrap();

    let store = Arc::new(InMemoryPersister::new());
    store.add_user(7, "alice");
    store.add_user(8, "bob");
    store.add_room(5);
    store.add_room(9);

    let state = AppState::with_collaborators(cfg, Arc::new(FixedTokens), store.clone()).unwrap();
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let app = build_router(state.clone());
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    Server { addr, state, store }
}

async fn connect(addr: SocketAddr, room: RoomId) -> Client {
    let (ws, _) = tokio_tungstenite::connect_async(format!("ws://{addr}/ws/{room}"))
        .await
        .expect("upgrade");
    ws
}

async fn send(ws: &mut Client, frame: serde_json::Value) {
    ws.send(Message::Text(frame.to_string())).await.unwrap();
}

/// Next text frame as an envelope; keepalives are skipped.
async fn next_envelope(ws: &mut Client) -> Envelope {
    loop {
        let msg = tokio::time::timeout(WAIT, ws.next())
            .await
            .expect("timed out waiting for a frame")
            .expect("stream ended")
            .expect("read failed");
        match msg {
            Message::Text(s) => return serde_json::from_str(&s).unwrap(),
            Message::Ping(_) | Message::Pong(_) => continue,
            other => panic!("unexpected frame: {other:?}"),
        }
    }
}

/// The server must close without sending any envelope first.
async fn expect_closed(ws: &mut Client) {
    loop {
        let next = tokio::time::timeout(WAIT, ws.next())
            .await
            .expect("connection stayed open");
        match next {
            None | Some(Err(_)) | Some(Ok(Message::Close(_))) => return,
            Some(Ok(Message::Ping(_))) | Some(Ok(Message::Pong(_))) => continue,
            Some(Ok(other)) => panic!("expected close, got {other:?}"),
        }
    }
}

async fn authenticate(ws: &mut Client, token: &str) -> Envelope {
    send(ws, json!({"type": "auth", "token": token})).await;
    let ack = next_envelope(ws).await;
    assert_eq!(ack.kind, EnvelopeKind::AuthAck);
    ack
}

/// Registration lands in the hub just after the ack is queued.
async fn wait_for_members(state: &AppState, room: RoomId, n: usize) {
    tokio::time::timeout(WAIT, async {
        while state.hub().room_members(room).await.unwrap().len() != n {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("room never reached expected size");
}

/// The close metric is recorded right after the session submits its unregister.
async fn wait_for_close(state: &AppState, reason: &str) {
    tokio::time::timeout(WAIT, async {
        while state.metrics().connection_closes.get(&[("reason", reason)]) == 0 {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .unwrap_or_else(|_| panic!("no close recorded with reason {reason}"));
}

#[tokio::test]
async fn message_fans_out_to_the_whole_room() {
    let Server { addr, state, store } = start().await;
    let mut x = connect(addr, 5).await;
    let mut y = connect(addr, 5).await;

    let ack = authenticate(&mut x, "t1").await;
    assert_eq!(ack.user_id, Some(7));
    assert_eq!(ack.username.as_deref(), Some("alice"));
    assert_eq!(ack.chat_room_id, Some(5));
    assert_eq!(ack.content, "Authentication successful");
    authenticate(&mut y, "t2").await;
    wait_for_members(&state, 5, 2).await;

    send(&mut x, json!({"type": "message", "content": "hello"})).await;

    for ws in [&mut x, &mut y] {
        let env = next_envelope(ws).await;
        assert_eq!(env.kind, EnvelopeKind::Message);
        assert_eq!(env.content, "hello");
        assert_eq!(env.user_id, Some(7));
        assert_eq!(env.username.as_deref(), Some("alice"));
        assert_eq!(env.chat_room_id, Some(5));
        assert!(env.timestamp.is_some());
        assert!(env.token.is_none());
    }

    // One stored record, one broadcast.
    assert_eq!(store.count(5), 1);
    assert_eq!(state.metrics().broadcasts.get(&[("scope", "room")]), 1);
}

#[tokio::test]
async fn file_events_fan_out_like_messages() {
    let Server { addr, state, .. } = start().await;
    let mut x = connect(addr, 5).await;
    authenticate(&mut x, "t1").await;
    wait_for_members(&state, 5, 1).await;

    send(&mut x, json!({"type": "file", "content": "https://files.example/cat.png"})).await;
    let env = next_envelope(&mut x).await;
    assert_eq!(env.kind, EnvelopeKind::File);
    assert_eq!(env.content, "https://files.example/cat.png");
}

#[tokio::test]
async fn rooms_do_not_leak_into_each_other() {
    let Server { addr, state, .. } = start().await;
    let mut five = connect(addr, 5).await;
    let mut nine = connect(addr, 9).await;
    authenticate(&mut five, "t1").await;
    authenticate(&mut nine, "t2").await;
    wait_for_members(&state, 5, 1).await;
    wait_for_members(&state, 9, 1).await;

    send(&mut five, json!({"type": "message", "content": "only five"})).await;
    send(&mut nine, json!({"type": "message", "content": "only nine"})).await;

    assert_eq!(next_envelope(&mut five).await.content, "only five");
    let env = next_envelope(&mut nine).await;
    assert_eq!(env.content, "only nine");
    assert_eq!(env.chat_room_id, Some(9));
}

#[tokio::test]
async fn first_frame_must_be_auth() {
    let Server { addr, state, .. } = start().await;
    let mut ws = connect(addr, 5).await;

    send(&mut ws, json!({"type": "message", "content": "sneaky"})).await;
    expect_closed(&mut ws).await;
    assert!(state.hub().room_members(5).await.unwrap().is_empty());
}

#[tokio::test]
async fn bad_token_closes_without_ack() {
    let Server { addr, state, .. } = start().await;
    let mut ws = connect(addr, 5).await;

    send(&mut ws, json!({"type": "auth", "token": "forged"})).await;
    expect_closed(&mut ws).await;
    assert!(state.hub().room_members(5).await.unwrap().is_empty());
    assert_eq!(state.metrics().auth_failures.get(), 1);
}

#[tokio::test]
async fn second_auth_is_a_protocol_violation() {
    let Server { addr, state, .. } = start().await;
    let mut ws = connect(addr, 5).await;
    authenticate(&mut ws, "t1").await;
    wait_for_members(&state, 5, 1).await;

    send(&mut ws, json!({"type": "auth", "token": "t2"})).await;
    expect_closed(&mut ws).await;
    wait_for_close(&state, "PROTOCOL_VIOLATION").await;
    wait_for_members(&state, 5, 0).await;
}

#[tokio::test]
async fn failed_persist_drops_the_event_but_keeps_the_connection() {
    let Server { addr, state, .. } = start().await;
    let mut ws = connect(addr, 5).await;
    authenticate(&mut ws, "t1").await;
    wait_for_members(&state, 5, 1).await;

    send(&mut ws, json!({"type": "message", "content": ""})).await;
    send(&mut ws, json!({"type": "message", "content": "still here"})).await;

    assert_eq!(next_envelope(&mut ws).await.content, "still here");
    assert_eq!(state.metrics().persist_failures.get(&[("kind", "message")]), 1);
    assert_eq!(state.metrics().broadcasts.get(&[("scope", "room")]), 1);
    assert_eq!(state.hub().room_members(5).await.unwrap().len(), 1);
}

#[tokio::test]
async fn non_numeric_room_is_rejected_before_upgrade() {
    let Server { addr, .. } = start().await;
    let err = tokio_tungstenite::connect_async(format!("ws://{addr}/ws/lobby"))
        .await
        .expect_err("upgrade must be refused");
    match err {
        tungstenite::Error::Http(resp) => assert_eq!(resp.status().as_u16(), 400),
        other => panic!("expected http error, got {other:?}"),
    }
}

#[tokio::test]
async fn idle_unauthenticated_connection_times_out() {
    let Server { addr, state, .. } = start().await;
    let mut ws = connect(addr, 5).await;

    expect_closed(&mut ws).await;
    assert!(state.hub().room_members(5).await.unwrap().is_empty());
    wait_for_close(&state, "TIMEOUT").await;
}

#[tokio::test]
async fn silent_member_is_dropped_after_read_deadline() {
    let Server { addr, state, .. } = start().await;
    let mut ws = connect(addr, 5).await;
    authenticate(&mut ws, "t1").await;
    wait_for_members(&state, 5, 1).await;

    // Not polling the socket means server pings go unanswered.
    wait_for_members(&state, 5, 0).await;
    wait_for_close(&state, "TIMEOUT").await;
    assert_eq!(state.metrics().connections_active.get(), 0);
}

#[tokio::test]
async fn ping_envelopes_keep_a_member_alive() {
    let Server { addr, state, store } = start().await;
    let mut ws = connect(addr, 5).await;
    authenticate(&mut ws, "t1").await;
    wait_for_members(&state, 5, 1).await;

    // 4s of envelope keepalives against a 2s read deadline.
    for i in 0..8 {
        let kind = if i % 2 == 0 { "ping" } else { "pong" };
        send(&mut ws, json!({"type": kind})).await;
        tokio::time::sleep(Duration::from_millis(500)).await;
    }

    assert_eq!(state.hub().room_members(5).await.unwrap().len(), 1);
    assert_eq!(state.metrics().broadcasts.get(&[("scope", "room")]), 0);
    assert_eq!(store.count(5), 0);
    assert_eq!(state.metrics().connection_closes.get(&[("reason", "TIMEOUT")]), 0);
}

#[tokio::test]
async fn server_sends_keepalive_pings() {
    let Server { addr, state, .. } = start().await;
    let mut ws = connect(addr, 5).await;
    authenticate(&mut ws, "t1").await;
    wait_for_members(&state, 5, 1).await;

    let ping_interval = Duration::from_millis(state.cfg().gateway.ping_interval_ms);
    let got_ping = tokio::time::timeout(ping_interval * 2, async {
        loop {
            match ws.next().await {
                Some(Ok(Message::Ping(_))) => return,
                Some(Ok(Message::Pong(_))) => continue,
                other => panic!("expected a ping, got {other:?}"),
            }
        }
    })
    .await;
    assert!(got_ping.is_ok(), "no keepalive ping within {ping_interval:?}");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn stalled_reader_is_evicted_and_closed() {
    // Long timers: only the full queue may end this session.
    let Server { addr, state, .. } = start_with(
        r#"
  ping_interval_ms: 30000
  read_deadline_ms: 60000
  write_timeout_ms: 30000
  send_queue_capacity: 1
"#,
    )
    .await;
    let mut ws = connect(addr, 5).await;
    authenticate(&mut ws, "t1").await;
    wait_for_members(&state, 5, 1).await;

    // Fill socket buffers until the writer stalls and the queue overflows.
    let big = "x".repeat(256 * 1024);
    for _ in 0..400 {
        let env = Envelope::chat(ChatKind::Message, big.clone(), 7, "alice".into(), 5, Utc::now());
        state.hub().broadcast_to_room(5, &env).await.unwrap();
        state.hub().stats().await.unwrap();
        if state.metrics().evictions.get() > 0 {
            break;
        }
    }
    assert_eq!(state.metrics().evictions.get(), 1);
    assert!(state.hub().room_members(5).await.unwrap().is_empty());

    // Draining lets the writer finish the closed queue and send a close frame.
    tokio::time::timeout(Duration::from_secs(10), async {
        loop {
            match ws.next().await {
                None | Some(Err(_)) | Some(Ok(Message::Close(_))) => return,
                Some(Ok(_)) => continue,
            }
        }
    })
    .await
    .expect("evicted connection never closed");

    wait_for_close(&state, "EVICTED").await;
    assert_eq!(state.metrics().connections_active.get(), 0);
}
