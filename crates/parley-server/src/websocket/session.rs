//! Connection lifecycle: the read pump, the write pump, and teardown.

use std::fmt::Display;
use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::ws::{Message, Utf8Bytes};
use futures::{Sink, SinkExt, Stream, StreamExt};
use metrics::{counter, gauge, histogram};
use tokio::sync::mpsc;
use tokio::time::{Instant, interval_at, timeout_at};
use tracing::{Instrument, debug, info, info_span, trace, warn};

use super::connection::{Connection, OutboundFrame};
use super::heartbeat::{HeartbeatConfig, ReadDeadline};
use super::router::{EventRouter, HandlerContext};
use crate::errors::ConnectionError;
use crate::metrics::{
    WS_CONNECTION_DURATION_SECONDS, WS_CONNECTIONS_ACTIVE, WS_CONNECTIONS_TOTAL,
    WS_DISCONNECTIONS_TOTAL,
};

/// Everything a connection's pumps need besides the socket.
#[derive(Clone)]
pub struct SessionContext {
    /// Inbound dispatch table.
    pub router: Arc<EventRouter>,
    /// Handler collaborators, including the registry.
    pub handlers: HandlerContext,
    /// Ping/pong timing.
    pub heartbeat: HeartbeatConfig,
    /// Largest accepted inbound frame.
    pub max_frame_bytes: usize,
}

/// Decode inbound frames and dispatch them until the connection ends.
///
/// Returns `Ok` when the peer closes or the connection is closed locally.
/// Oversize frames, malformed envelopes, transport errors and a missed pong
/// end the pump with an error. Routing and handler errors are logged and the
/// loop continues.
pub async fn read_pump<S, E>(
    mut frames: S,
    conn: Arc<Connection>,
    ctx: SessionContext,
) -> Result<(), ConnectionError>
where
    S: Stream<Item = Result<Message, E>> + Unpin,
    E: Display,
{
    let mut deadline = ReadDeadline::new(ctx.heartbeat.pong_wait);
    loop {
        let next = tokio::select! {
            () = conn.closed() => return Ok(()),
            next = timeout_at(deadline.at(), frames.next()) => next,
        };
        let Ok(next) = next else {
            return Err(ConnectionError::HeartbeatTimeout(deadline.window()));
        };
        let message = match next {
            None => return Ok(()),
            Some(Err(e)) => return Err(ConnectionError::Transport(e.to_string())),
            Some(Ok(message)) => message,
        };

        let envelope = match message {
            Message::Text(text) => decode(text.as_str().as_bytes(), ctx.max_frame_bytes)?,
            Message::Binary(data) => decode(&data, ctx.max_frame_bytes)?,
            Message::Pong(_) => {
                trace!("pong received");
                deadline.refresh();
                continue;
            }
            Message::Ping(_) => {
                trace!("ping received");
                continue;
            }
            Message::Close(frame) => {
                debug!(?frame, "client sent close frame");
                return Ok(());
            }
        };

        if let Err(e) = ctx.router.route(&envelope, &conn, &ctx.handlers).await {
            warn!(kind = envelope.kind(), error = %e, "event dropped");
        }
    }
}

fn decode(body: &[u8], limit: usize) -> Result<parley_core::Envelope, ConnectionError> {
    if body.len() > limit {
        return Err(ConnectionError::FrameTooLarge {
            size: body.len(),
            limit,
        });
    }
    Ok(parley_core::Envelope::decode(body)?)
}

/// Write queued frames and heartbeat pings until the connection ends.
///
/// This is the only writer of the socket. When the connection is closed it
/// sends a close frame and returns `Ok`.
pub async fn write_pump<K>(
    mut sink: K,
    mut outbound: mpsc::Receiver<OutboundFrame>,
    conn: Arc<Connection>,
    heartbeat: HeartbeatConfig,
) -> Result<(), ConnectionError>
where
    K: Sink<Message> + Unpin,
    K::Error: Display,
{
    let transport = |e: K::Error| ConnectionError::Transport(e.to_string());
    let mut ping = interval_at(
        Instant::now() + heartbeat.ping_interval,
        heartbeat.ping_interval,
    );

    loop {
        tokio::select! {
            () = conn.closed() => break,
            frame = outbound.recv() => {
                let Some(frame) = frame else { break };
                sink.send(Message::Text(Utf8Bytes::from(&*frame)))
                    .await
                    .map_err(transport)?;
            }
            _ = ping.tick() => {
                trace!("sending ping");
                sink.send(Message::Ping(Bytes::new())).await.map_err(transport)?;
            }
        }
    }

    let _ = sink.send(Message::Close(None)).await;
    Ok(())
}

/// Run both pumps for a registered connection until it is torn down.
///
/// Whichever pump finishes first unregisters the connection, which closes it
/// and stops the other pump.
pub async fn run_connection<S, E, K>(
    frames: S,
    sink: K,
    outbound: mpsc::Receiver<OutboundFrame>,
    conn: Arc<Connection>,
    ctx: SessionContext,
) where
    S: Stream<Item = Result<Message, E>> + Unpin + Send + 'static,
    E: Display + Send + 'static,
    K: Sink<Message> + Unpin + Send + 'static,
    K::Error: Display + Send,
{
    let span = info_span!(
        "connection",
        conn_id = %conn.id(),
        email = %conn.identity().email,
    );
    let registry = ctx.handlers.registry.clone();
    let heartbeat = ctx.heartbeat;

    async {
        info!(room = %conn.room(), "client connected");
        counter!(WS_CONNECTIONS_TOTAL).increment(1);
        gauge!(WS_CONNECTIONS_ACTIVE).increment(1.0);

        let reader = {
            let conn = conn.clone();
            let registry = registry.clone();
            tokio::spawn(
                async move {
                    let result = read_pump(frames, conn.clone(), ctx).await;
                    teardown("read", &conn, &registry, &result);
                    result
                }
                .in_current_span(),
            )
        };
        let writer = {
            let conn = conn.clone();
            let registry = registry.clone();
            tokio::spawn(
                async move {
                    let result = write_pump(sink, outbound, conn.clone(), heartbeat).await;
                    teardown("write", &conn, &registry, &result);
                    result
                }
                .in_current_span(),
            )
        };

        let (read, write) = tokio::join!(reader, writer);
        // A panicked pump never reached its teardown.
        if read.is_err() || write.is_err() {
            let _ = registry.unregister(&conn.id());
        }

        let reason = match (read, write) {
            (Ok(Err(e)), _) | (_, Ok(Err(e))) => label(&e),
            (Ok(Ok(())), Ok(Ok(()))) => "closed",
            _ => "panic",
        };
        counter!(WS_DISCONNECTIONS_TOTAL, "reason" => reason).increment(1);
        gauge!(WS_CONNECTIONS_ACTIVE).decrement(1.0);
        histogram!(WS_CONNECTION_DURATION_SECONDS).record(conn.age().as_secs_f64());
        info!(reason, "client disconnected");
    }
    .instrument(span)
    .await;
}

fn teardown(
    pump: &'static str,
    conn: &Connection,
    registry: &super::registry::ConnectionRegistry,
    result: &Result<(), ConnectionError>,
) {
    match result {
        Ok(()) => debug!(pump, "pump finished"),
        Err(e) => info!(pump, error = %e, "pump failed"),
    }
    let _ = registry.unregister(&conn.id());
}

fn label(err: &ConnectionError) -> &'static str {
    match err {
        ConnectionError::Closed => "closed",
        ConnectionError::QueueFull(_) => "queue_full",
        ConnectionError::HeartbeatTimeout(_) => "heartbeat_timeout",
        ConnectionError::FrameTooLarge { .. } => "frame_too_large",
        ConnectionError::Protocol(_) => "protocol",
        ConnectionError::Transport(_) => "transport",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;
    use std::time::Duration;

    use assert_matches::assert_matches;
    use futures::FutureExt;
    use futures::channel::mpsc as duplex;
    use parley_core::{ConnectionId, Identity};
    use parley_store::{MessageStore, SqliteStore};
    use serde_json::json;

    use crate::websocket::registry::ConnectionRegistry;

    type Inbound = duplex::UnboundedSender<Result<Message, io::Error>>;
    type Written = duplex::UnboundedReceiver<Message>;

    struct Harness {
        ctx: SessionContext,
        store: Arc<SqliteStore>,
    }

    impl Harness {
        fn new(pong_wait: Duration) -> Self {
            let store = Arc::new(SqliteStore::in_memory().unwrap());
            let ctx = SessionContext {
                router: Arc::new(EventRouter::with_default_handlers()),
                handlers: HandlerContext {
                    registry: Arc::new(ConnectionRegistry::new(Duration::from_millis(100))),
                    messages: store.clone(),
                },
                heartbeat: HeartbeatConfig::new(pong_wait),
                max_frame_bytes: 512,
            };
            Self { ctx, store }
        }

        fn registry(&self) -> &Arc<ConnectionRegistry> {
            &self.ctx.handlers.registry
        }

        fn connect(
            &self,
            email: &str,
        ) -> (Arc<Connection>, Inbound, Written, tokio::task::JoinHandle<()>) {
            let (conn, outbound) = Connection::new(
                ConnectionId::new(),
                Identity::from_email(email),
                "general",
                4,
            );
            assert!(self.registry().register(conn.clone()));
            let (in_tx, in_rx) = duplex::unbounded();
            let (out_tx, out_rx) = duplex::unbounded();
            let handle = tokio::spawn(run_connection(
                in_rx,
                out_tx,
                outbound,
                conn.clone(),
                self.ctx.clone(),
            ));
            (conn, in_tx, out_rx, handle)
        }
    }

    fn text(value: &serde_json::Value) -> Result<Message, io::Error> {
        Ok(Message::Text(value.to_string().into()))
    }

    fn change_room(name: &str) -> Result<Message, io::Error> {
        text(&json!({"kind": "change_room", "payload": {"name": name}}))
    }

    fn send_message(message: &str) -> Result<Message, io::Error> {
        text(&json!({
            "kind": "send_message",
            "payload": {
                "message": message,
                "from": "alice",
                "email": "a@x.com",
                "chatroom": "general",
            }
        }))
    }

    fn drain(written: &mut Written) -> Vec<Message> {
        let mut messages = Vec::new();
        while let Some(Some(msg)) = written.next().now_or_never() {
            messages.push(msg);
        }
        messages
    }

    fn detached(email: &str) -> Arc<Connection> {
        let (conn, _outbound) =
            Connection::new(ConnectionId::new(), Identity::from_email(email), "general", 1);
        conn
    }

    async fn next_text(written: &mut Written) -> serde_json::Value {
        loop {
            let msg = tokio::time::timeout(Duration::from_secs(5), written.next())
                .await
                .expect("timed out waiting for a frame")
                .expect("write side ended");
            if let Message::Text(t) = msg {
                return serde_json::from_str(t.as_str()).unwrap();
            }
        }
    }

    #[tokio::test]
    async fn two_rooms_scenario() {
        let h = Harness::new(Duration::from_secs(30));
        let (_a, a_in, mut a_out, _ha) = h.connect("a@x.com");
        let (_b, b_in, mut b_out, _hb) = h.connect("b@x.com");
        let (c, c_in, mut c_out, _hc) = h.connect("c@x.com");

        a_in.unbounded_send(change_room("general")).unwrap();
        b_in.unbounded_send(change_room("general")).unwrap();
        c_in.unbounded_send(change_room("other")).unwrap();
        tokio::time::timeout(Duration::from_secs(5), async {
            while !c.is_in("other") {
                tokio::task::yield_now().await;
            }
        })
        .await
        .unwrap();

        a_in.unbounded_send(send_message("hi")).unwrap();

        for out in [&mut a_out, &mut b_out] {
            let frame = next_text(out).await;
            assert_eq!(frame["kind"], "new_message");
            assert_eq!(frame["payload"]["message"], "hi");
            assert_eq!(frame["payload"]["from"], "alice");
            assert!(frame["payload"]["sent"].is_string());
        }

        let history = h.store.recent_messages("general", 10).await.unwrap();
        assert_eq!(history.len(), 1);

        tokio::time::sleep(Duration::from_millis(50)).await;
        let leaked = drain(&mut c_out)
            .into_iter()
            .any(|msg| matches!(msg, Message::Text(_)));
        assert!(!leaked, "connection in another room received the message");
    }

    #[tokio::test]
    async fn unknown_kind_keeps_connection_alive() {
        let h = Harness::new(Duration::from_secs(30));
        let (a, a_in, mut a_out, _ha) = h.connect("a@x.com");

        a_in.unbounded_send(text(&json!({"kind": "dance", "payload": {}}))).unwrap();
        a_in.unbounded_send(send_message("still here")).unwrap();

        let frame = next_text(&mut a_out).await;
        assert_eq!(frame["payload"]["message"], "still here");
        assert!(h.registry().contains(&a.id()));
    }

    #[tokio::test]
    async fn malformed_envelope_tears_down() {
        let h = Harness::new(Duration::from_secs(30));
        let (a, a_in, mut a_out, handle) = h.connect("a@x.com");

        a_in.unbounded_send(Ok(Message::Text("{not json".into()))).unwrap();
        handle.await.unwrap();

        assert!(!h.registry().contains(&a.id()));
        assert!(a.is_closed());
        assert_matches!(drain(&mut a_out).last(), Some(Message::Close(None)));
    }

    #[tokio::test]
    async fn oversize_frame_is_fatal() {
        let h = Harness::new(Duration::from_secs(30));
        let big = json!({"kind": "change_room", "payload": {"name": "x".repeat(600)}});
        let frames = futures::stream::iter(vec![text(&big)]);
        let err = read_pump(frames, detached("a@x.com"), h.ctx.clone())
            .await
            .unwrap_err();
        assert_matches!(err, ConnectionError::FrameTooLarge { size, limit: 512 } if size > 600);
    }

    #[tokio::test]
    async fn binary_frames_are_decoded() {
        let h = Harness::new(Duration::from_secs(30));
        let conn = detached("a@x.com");
        let body = json!({"type": "change_room", "payload": {"name": "lobby"}}).to_string();
        let frames = futures::stream::iter(vec![Ok::<_, io::Error>(Message::Binary(
            body.into(),
        ))]);
        read_pump(frames, conn.clone(), h.ctx.clone()).await.unwrap();
        assert_eq!(conn.room(), "lobby");
    }

    #[tokio::test]
    async fn transport_error_is_fatal() {
        let h = Harness::new(Duration::from_secs(30));
        let frames = futures::stream::iter(vec![Err::<Message, _>(io::Error::other("reset"))]);
        let err = read_pump(frames, detached("a@x.com"), h.ctx.clone())
            .await
            .unwrap_err();
        assert_matches!(err, ConnectionError::Transport(m) if m.contains("reset"));
    }

    #[tokio::test(start_paused = true)]
    async fn missing_pong_tears_down() {
        let h = Harness::new(Duration::from_secs(10));
        let (a, _a_in, mut a_out, handle) = h.connect("a@x.com");

        handle.await.unwrap();
        assert!(!h.registry().contains(&a.id()));

        let written = drain(&mut a_out);
        let pings = written
            .iter()
            .filter(|msg| matches!(msg, Message::Ping(_)))
            .count();
        assert_eq!(pings, 1);
        assert_matches!(written.last(), Some(Message::Close(None)));
    }

    #[tokio::test(start_paused = true)]
    async fn pongs_keep_connection_alive() {
        let h = Harness::new(Duration::from_secs(10));
        let (a, a_in, _a_out, _handle) = h.connect("a@x.com");

        for _ in 0..5 {
            tokio::time::sleep(Duration::from_secs(8)).await;
            a_in.unbounded_send(Ok(Message::Pong(Bytes::new()))).unwrap();
        }
        tokio::task::yield_now().await;
        assert!(h.registry().contains(&a.id()));
        assert!(!a.is_closed());
    }

    #[tokio::test(start_paused = true)]
    async fn client_pings_do_not_refresh_deadline() {
        let h = Harness::new(Duration::from_secs(10));
        let (a, a_in, _a_out, handle) = h.connect("a@x.com");

        for _ in 0..3 {
            tokio::time::sleep(Duration::from_secs(4)).await;
            let _ = a_in.unbounded_send(Ok(Message::Ping(Bytes::new())));
        }
        handle.await.unwrap();
        assert!(!h.registry().contains(&a.id()));
    }

    #[tokio::test]
    async fn unregister_stops_both_pumps() {
        let h = Harness::new(Duration::from_secs(30));
        let (a, _a_in, mut a_out, handle) = h.connect("a@x.com");

        assert!(h.registry().unregister(&a.id()));
        tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .unwrap()
            .unwrap();

        assert_matches!(drain(&mut a_out).last(), Some(Message::Close(None)));
    }

    #[tokio::test]
    async fn peer_close_tears_down() {
        let h = Harness::new(Duration::from_secs(30));
        let (a, a_in, _a_out, handle) = h.connect("a@x.com");

        a_in.unbounded_send(Ok(Message::Close(None))).unwrap();
        handle.await.unwrap();
        assert!(!h.registry().contains(&a.id()));
    }

    #[tokio::test]
    async fn write_pump_preserves_queue_order() {
        let (conn, outbound) =
            Connection::new(ConnectionId::new(), Identity::from_email("a@x.com"), "general", 8);
        let (out_tx, mut out_rx) = duplex::unbounded();
        let pump = tokio::spawn(write_pump(
            out_tx,
            outbound,
            conn.clone(),
            HeartbeatConfig::new(Duration::from_secs(30)),
        ));

        for i in 0..3 {
            conn.enqueue(Arc::from(format!("m{i}")), Duration::from_secs(1))
                .await
                .unwrap();
        }
        for i in 0..3 {
            let msg = out_rx.next().await.unwrap();
            assert_matches!(msg, Message::Text(t) if t.as_str() == format!("m{i}"));
        }

        let _ = conn.close();
        pump.await.unwrap().unwrap();
        assert_matches!(out_rx.next().await, Some(Message::Close(None)));
    }
}
