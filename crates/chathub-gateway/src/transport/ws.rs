//! Room WebSocket handler.
//!
//! Responsibilities:
//! - Upgrade HTTP -> WS on `/ws/:room_id` (room bound for the connection lifetime)
//! - In-band handshake: the first envelope must be `auth`
//! - Inbound pump: decode, persist chat/file events, submit broadcasts
//! - Outbound pump: drain the outbound queue, keepalive pings, close frame
//! - Teardown: exactly one unregister per connection, whatever ended it
//!
//! The outbound queue's sender is held by the handshake until it succeeds and
//! then handed to the hub, so only the hub's unregister path can close it.

use std::pin::Pin;
use std::time::Duration;

use axum::{
    extract::{ws::Message, ws::WebSocket, ws::WebSocketUpgrade, Path, State},
    response::Response,
};
use chrono::Utc;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::sync::oneshot;
use tokio::time::{Instant, MissedTickBehavior, Sleep};
use tracing::Instrument;

use chathub_core::error::{ChatHubError, Result};
use chathub_core::protocol::{Envelope, EnvelopeKind, InboundEnvelope, RoomId};

use crate::app_state::AppState;
use crate::realtime::{outbound_queue, CloseReason, ConnectionHandle, ConnectionId, OutboundRx, OutboundTx, PreparedMsg};
use crate::services::Identity;
use crate::transport::codec::{decode, Inbound};

// --------------------
// Entry
// --------------------
pub async fn ws_upgrade(
    State(app): State<AppState>,
    Path(room): Path<RoomId>,
    ws: WebSocketUpgrade,
) -> Response {
    app.metrics().ws_upgrades.inc();
    let max = app.cfg().gateway.max_frame_bytes;
    ws.max_message_size(max)
        .max_frame_size(max)
        .on_upgrade(move |socket| run_session(app, room, socket))
}

/// Drive one connection from upgrade to close.
pub async fn run_session(app: AppState, room: RoomId, socket: WebSocket) {
    let conn = ConnectionId::next();
    let span = tracing::info_span!("ws", conn = %conn, room);

    async move {
        let gw = &app.cfg().gateway;
        let (ws_tx, ws_rx) = socket.split();
        let (out_tx, out_rx) = outbound_queue(gw.send_queue_capacity);

        let (writer_done_tx, writer_done) = oneshot::channel();
        let (ping_every, write_timeout) = (gw.ping_interval(), gw.write_timeout());
        let writer = tokio::spawn(
            async move {
                let res = outbound_pump(ws_tx, out_rx, ping_every, write_timeout).await;
                let _ = writer_done_tx.send(res);
            }
            .instrument(tracing::Span::current()),
        );

        let mut session = Session {
            app: &app,
            conn,
            room,
            read_deadline: gw.read_deadline(),
            // Before auth this is never renewed: the handshake must finish in time.
            deadline: Box::pin(tokio::time::sleep(gw.read_deadline())),
        };
        let reason = session.inbound_pump(ws_rx, out_tx, writer_done).await;

        app.hub().unregister(conn, reason).await;
        app.metrics().connection_closes.inc(&[("reason", reason.as_str())]);
        tracing::info!(%reason, "connection closed");

        let _ = writer.await;
    }
    .instrument(span)
    .await
}

// --------------------
// Inbound pump + handshake
// --------------------
enum Phase {
    /// Holds the outbound queue until the hub takes it over.
    Unauthenticated(OutboundTx),
    Authenticated(Identity),
}

struct Session<'a> {
    app: &'a AppState,
    conn: ConnectionId,
    room: RoomId,
    read_deadline: Duration,
    deadline: Pin<Box<Sleep>>,
}

impl Session<'_> {
    async fn inbound_pump(
        &mut self,
        mut ws_rx: SplitStream<WebSocket>,
        out_tx: OutboundTx,
        mut writer_done: oneshot::Receiver<Result<()>>,
    ) -> CloseReason {
        let mut phase = Phase::Unauthenticated(out_tx);

        loop {
            let incoming = tokio::select! {
                incoming = ws_rx.next() => incoming,
                _ = &mut self.deadline => {
                    return self.fail(ChatHubError::Timeout);
                }
                done = &mut writer_done => {
                    return self.fail(writer_exit_error(done));
                }
            };

            let msg = match incoming {
                Some(Ok(msg)) => msg,
                Some(Err(e)) => return self.fail(ChatHubError::Transport(e.to_string())),
                None => return CloseReason::Normal,
            };

            let step = match decode(msg) {
                Ok(Inbound::Envelope(env)) => self.on_envelope(phase, env).await,
                Ok(Inbound::Ping) | Ok(Inbound::Pong) => {
                    if matches!(phase, Phase::Authenticated(_)) {
                        self.renew_deadline();
                    }
                    Ok(phase)
                }
                Ok(Inbound::Close) => return CloseReason::Normal,
                Err(e) => Err(e),
            };

            phase = match step {
                Ok(next) => next,
                Err(e) => return self.fail(e),
            };
        }
    }

    async fn on_envelope(&mut self, phase: Phase, env: InboundEnvelope) -> Result<Phase> {
        let identity = match phase {
            Phase::Unauthenticated(tx) => {
                if env.kind != EnvelopeKind::Auth {
                    return Err(ChatHubError::ProtocolViolation(format!(
                        "first envelope must be auth, got {}",
                        env.kind.as_str()
                    )));
                }
                return self.authenticate(tx, env.token.unwrap_or_default()).await;
            }
            Phase::Authenticated(identity) => identity,
        };

        let Some(chat_kind) = env.kind.chat_kind() else {
            return match env.kind {
                EnvelopeKind::Ping | EnvelopeKind::Pong => {
                    self.renew_deadline();
                    Ok(Phase::Authenticated(identity))
                }
                EnvelopeKind::AuthAck => {
                    Err(ChatHubError::ProtocolViolation("auth_ack is server-only".into()))
                }
                _ => Err(ChatHubError::ProtocolViolation("already authenticated".into())),
            };
        };

        if let Err(e) = self.app.chat().handle(chat_kind, &env.content, &identity, self.room).await {
            // Persistence failures drop only this event.
            if e.is_terminal() {
                return Err(e);
            }
        }
        Ok(Phase::Authenticated(identity))
    }

    async fn authenticate(&mut self, tx: OutboundTx, token: String) -> Result<Phase> {
        let identity = match self.app.validator().validate(&token).await {
            Ok(identity) => identity,
            Err(e) => {
                self.app.metrics().auth_failures.inc();
                return Err(e.into());
            }
        };

        // Ack goes in before the hub owns the queue, so it precedes any room traffic.
        let ack = Envelope::auth_ack(self.room, identity.user_id, &identity.username, Utc::now());
        if tx.try_send(PreparedMsg::prepare(&ack)?).is_err() {
            tracing::debug!("auth_ack dropped, outbound queue full");
        }

        self.app
            .hub()
            .register(ConnectionHandle::new(self.conn, self.room, identity.clone(), tx))
            .await?;
        self.renew_deadline();
        tracing::info!(user = identity.user_id, username = %identity.username, "authenticated");

        Ok(Phase::Authenticated(identity))
    }

    fn renew_deadline(&mut self) {
        self.deadline.as_mut().reset(Instant::now() + self.read_deadline);
    }

    fn fail(&self, e: ChatHubError) -> CloseReason {
        tracing::warn!(code = e.code().as_str(), error = %e, "closing connection");
        CloseReason::from(&e)
    }
}

fn writer_exit_error(done: std::result::Result<Result<()>, oneshot::error::RecvError>) -> ChatHubError {
    match done {
        // The queue closes under a live reader only when the hub evicted us.
        Ok(Ok(())) => ChatHubError::Evicted,
        Ok(Err(e)) => e,
        Err(_) => ChatHubError::Internal("outbound pump aborted".into()),
    }
}

// --------------------
// Outbound pump
// --------------------
async fn outbound_pump(
    mut ws_tx: SplitSink<WebSocket, Message>,
    mut out_rx: OutboundRx,
    ping_every: Duration,
    write_timeout: Duration,
) -> Result<()> {
    let mut ping_tick = tokio::time::interval_at(Instant::now() + ping_every, ping_every);
    ping_tick.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            maybe_out = out_rx.recv() => {
                match maybe_out {
                    Some(msg) => write_frame(&mut ws_tx, msg.to_ws_message(), write_timeout).await?,
                    None => {
                        let _ = write_frame(&mut ws_tx, Message::Close(None), write_timeout).await;
                        return Ok(());
                    }
                }
            }
            _ = ping_tick.tick() => {
                write_frame(&mut ws_tx, Message::Ping(Vec::new()), write_timeout).await?;
            }
        }
    }
}

async fn write_frame(
    ws_tx: &mut SplitSink<WebSocket, Message>,
    msg: Message,
    write_timeout: Duration,
) -> Result<()> {
    match tokio::time::timeout(write_timeout, ws_tx.send(msg)).await {
        Ok(Ok(())) => Ok(()),
        Ok(Err(e)) => Err(ChatHubError::Transport(e.to_string())),
        Err(_) => Err(ChatHubError::Timeout),
    }
}
