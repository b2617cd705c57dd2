use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use futures::{SinkExt, StreamExt};
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio_util::codec::{Framed, LinesCodec, LinesCodecError};
use tracing::{debug, warn};

use crate::engine::{BookingEngine, EngineError};
use crate::limits::*;
use crate::model::BookingEvent;
use crate::notify::NotifyHub;
use crate::observability::*;
use crate::protocol::{self, Request, Response};

#[derive(Debug, Error)]
pub enum WireError {
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
    #[error("codec: {0}")]
    Codec(#[from] LinesCodecError),
}

/// Everything a connection needs from the server.
#[derive(Clone)]
pub struct Context {
    pub engine: Arc<BookingEngine>,
    pub hub: Arc<NotifyHub>,
    /// Pending pushed events per connection before listeners start waiting.
    pub event_buffer: usize,
}

impl Context {
    pub fn new(engine: Arc<BookingEngine>, hub: Arc<NotifyHub>, event_buffer: usize) -> Self {
        Self {
            engine,
            hub,
            event_buffer: event_buffer.max(1),
        }
    }
}

/// Per-connection LISTEN state. Each subscription is a forwarder task that
/// copies one hub channel into the connection's event queue; dropping the
/// stop sender ends it.
struct Session {
    hub: Arc<NotifyHub>,
    events: mpsc::Sender<BookingEvent>,
    /// Keyed by room id; `None` is the all-rooms subscription.
    listeners: HashMap<Option<String>, oneshot::Sender<()>>,
}

impl Session {
    fn new(hub: Arc<NotifyHub>, events: mpsc::Sender<BookingEvent>) -> Self {
        Self {
            hub,
            events,
            listeners: HashMap::new(),
        }
    }

    fn apply(&mut self, req: Request) -> Result<Response, EngineError> {
        match req {
            Request::Listen { room_id } => self.listen(room_id),
            Request::Unlisten { room_id } => {
                self.listeners.remove(&room_id);
                Ok(Response::Ok)
            }
            Request::UnlistenAll => {
                self.listeners.clear();
                Ok(Response::Ok)
            }
            _ => Err(EngineError::Internal("not a subscription request".into())),
        }
    }

    fn listen(&mut self, room_id: Option<String>) -> Result<Response, EngineError> {
        if let Some(id) = &room_id {
            if id.trim().is_empty() || id.len() > MAX_ID_LEN {
                return Err(EngineError::InvalidArgument(format!(
                    "invalid listen room id: {id:?}"
                )));
            }
        }
        if self.listeners.contains_key(&room_id) {
            return Ok(Response::Ok);
        }
        if self.listeners.len() >= MAX_SUBSCRIPTIONS_PER_CONNECTION {
            return Err(EngineError::LimitExceeded("too many subscriptions"));
        }

        let rx = match &room_id {
            Some(id) => self.hub.subscribe(id),
            None => self.hub.subscribe_all(),
        };
        let (stop_tx, stop_rx) = oneshot::channel();
        tokio::spawn(forward(
            rx,
            stop_rx,
            self.events.clone(),
            self.hub.clone(),
            room_id.clone(),
        ));
        self.listeners.insert(room_id, stop_tx);
        Ok(Response::Ok)
    }
}

async fn forward(
    mut rx: broadcast::Receiver<BookingEvent>,
    mut stop: oneshot::Receiver<()>,
    events: mpsc::Sender<BookingEvent>,
    hub: Arc<NotifyHub>,
    room_id: Option<String>,
) {
    loop {
        tokio::select! {
            _ = &mut stop => break,
            recv = rx.recv() => match recv {
                Ok(event) => {
                    if events.send(event).await.is_err() {
                        break;
                    }
                }
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    warn!("listener fell behind, skipped {n} events");
                    metrics::counter!(EVENTS_DROPPED_TOTAL).increment(n);
                }
                Err(broadcast::error::RecvError::Closed) => break,
            },
        }
    }
    drop(rx);
    if let Some(id) = room_id {
        hub.prune(&id);
    }
}

/// Serve one client: read JSON request lines, answer each with one response
/// line, and interleave pushed `event` lines for active subscriptions.
pub async fn process_connection<S>(socket: S, ctx: Context) -> Result<(), WireError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let mut framed = Framed::new(socket, LinesCodec::new_with_max_length(MAX_FRAME_LEN));
    let (events_tx, mut events_rx) = mpsc::channel(ctx.event_buffer);
    let mut session = Session::new(ctx.hub.clone(), events_tx);

    loop {
        tokio::select! {
            line = framed.next() => {
                let Some(line) = line else { break };
                let response = match line {
                    Ok(line) if line.trim().is_empty() => continue,
                    Ok(line) => handle_line(&ctx.engine, &mut session, &line).await,
                    // The codec ends the stream after a decode error; answer, then hang up.
                    Err(LinesCodecError::MaxLineLengthExceeded) => {
                        warn!("request line over {MAX_FRAME_LEN} bytes, closing connection");
                        let resp: Response = EngineError::LimitExceeded("request line too long").into();
                        framed.send(resp.encode()).await?;
                        break;
                    }
                    Err(LinesCodecError::Io(e)) => return Err(e.into()),
                };
                framed.send(response.encode()).await?;
            }
            Some(event) = events_rx.recv() => {
                framed.send(Response::Event { event }.encode()).await?;
            }
        }
    }
    debug!("client closed, {} subscriptions released", session.listeners.len());
    Ok(())
}

async fn handle_line(engine: &BookingEngine, session: &mut Session, line: &str) -> Response {
    let req = match Request::parse(line) {
        Ok(req) => req,
        Err(e) => {
            metrics::counter!(OPERATIONS_TOTAL, "op" => "malformed", "status" => "invalid_argument")
                .increment(1);
            return e.into();
        }
    };

    let op = op_label(&req);
    let started = Instant::now();
    let result = if req.is_subscription() {
        session.apply(req)
    } else {
        protocol::execute(engine, req).await
    };
    metrics::histogram!(OPERATION_DURATION_SECONDS, "op" => op)
        .record(started.elapsed().as_secs_f64());

    let status = match &result {
        Ok(_) => "ok",
        Err(e) => e.kind().as_str(),
    };
    metrics::counter!(OPERATIONS_TOTAL, "op" => op, "status" => status).increment(1);

    match result {
        Ok(resp) => resp,
        Err(e) => {
            debug!("{op} failed: {e}");
            e.into()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::ErrorKind;
    use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, DuplexStream};

    struct Client {
        reader: BufReader<tokio::io::ReadHalf<DuplexStream>>,
        writer: tokio::io::WriteHalf<DuplexStream>,
    }

    impl Client {
        async fn send(&mut self, line: &str) {
            self.writer.write_all(line.as_bytes()).await.unwrap();
            self.writer.write_all(b"\n").await.unwrap();
        }

        async fn recv(&mut self) -> Response {
            let mut buf = String::new();
            self.reader.read_line(&mut buf).await.unwrap();
            serde_json::from_str(buf.trim_end()).unwrap()
        }

        async fn call(&mut self, line: &str) -> Response {
            self.send(line).await;
            self.recv().await
        }
    }

    fn start() -> (Client, Context) {
        let hub = Arc::new(NotifyHub::new());
        let engine = Arc::new(BookingEngine::new(hub.clone()));
        let ctx = Context::new(engine, hub, 16);
        let (client, server) = tokio::io::duplex(256 * 1024);
        tokio::spawn(process_connection(server, ctx.clone()));
        let (r, w) = tokio::io::split(client);
        (
            Client {
                reader: BufReader::new(r),
                writer: w,
            },
            ctx,
        )
    }

    #[tokio::test]
    async fn malformed_line_keeps_connection_open() {
        let (mut client, _ctx) = start();
        let resp = client.call("{nope").await;
        assert!(matches!(
            resp,
            Response::Error {
                kind: ErrorKind::InvalidArgument,
                ..
            }
        ));
        assert_eq!(
            client.call(r#"{"op":"list_rooms"}"#).await,
            Response::Rooms { rooms: vec![] }
        );
    }

    #[tokio::test]
    async fn blank_lines_are_skipped() {
        let (mut client, _ctx) = start();
        client.send("").await;
        client.send("   ").await;
        assert_eq!(
            client.call(r#"{"op":"list_rooms"}"#).await,
            Response::Rooms { rooms: vec![] }
        );
    }

    #[tokio::test]
    async fn oversized_line_rejected_then_closed() {
        let (mut client, _ctx) = start();
        let huge = "x".repeat(MAX_FRAME_LEN + 10);
        let resp = client.call(&huge).await;
        assert!(resp.is_error());

        let mut rest = String::new();
        assert_eq!(client.reader.read_line(&mut rest).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn listen_is_idempotent_and_unlisten_prunes() {
        let (mut client, ctx) = start();
        assert_eq!(client.call(r#"{"op":"listen","room_id":"1"}"#).await, Response::Ok);
        assert_eq!(client.call(r#"{"op":"listen","room_id":"1"}"#).await, Response::Ok);
        assert_eq!(ctx.hub.room_channels(), 1);

        assert_eq!(client.call(r#"{"op":"unlisten","room_id":"1"}"#).await, Response::Ok);
        // The forwarder prunes after it observes the stop signal.
        for _ in 0..100 {
            if ctx.hub.room_channels() == 0 {
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        }
        assert_eq!(ctx.hub.room_channels(), 0);
    }

    #[tokio::test]
    async fn subscription_limit() {
        let (mut client, _ctx) = start();
        for i in 0..MAX_SUBSCRIPTIONS_PER_CONNECTION {
            let line = format!(r#"{{"op":"listen","room_id":"r{i}"}}"#);
            assert_eq!(client.call(&line).await, Response::Ok);
        }
        let resp = client.call(r#"{"op":"listen"}"#).await;
        assert!(matches!(
            resp,
            Response::Error {
                kind: ErrorKind::InvalidArgument,
                ..
            }
        ));
        assert_eq!(client.call(r#"{"op":"unlisten_all"}"#).await, Response::Ok);
        assert_eq!(client.call(r#"{"op":"listen"}"#).await, Response::Ok);
    }

    #[tokio::test]
    async fn listen_rejects_blank_room() {
        let (mut client, _ctx) = start();
        assert!(client.call(r#"{"op":"listen","room_id":" "}"#).await.is_error());
    }
}
