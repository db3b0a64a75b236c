//! fastws Client
//!
//! Application handle plus the driver task that owns the connection. The
//! handle forwards calls to the driver over a command channel; the driver
//! multiplexes transport frames, commands, heartbeat ticks and reply
//! deadlines in a single `select!` loop, so the pending-reply table is only
//! ever touched from one place.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use bytes::Bytes;
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::time::Instant;
use tracing::Instrument;
use uuid::Uuid;

use super::connection::{ConnectionMachine, ConnectionState, Gate};
use super::heartbeat::Heartbeat;
use super::rpc::{PendingReplies, ReplySender};
use super::transport::{Transport, TransportError, WireFrame};
use super::ClientOptions;
use crate::events::{DispatchKey, EventData, EventFacade, Lifecycle, ListenerId};
use crate::protocol::{now_millis, CodecError, CorrelationId, EventId, FrameCodec, Packet};

/// Client errors
#[derive(Error, Debug)]
pub enum ClientError {
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("Protocol error: {0}")]
    Codec(#[from] CodecError),

    #[error("Serialization error: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("Client version mismatch: unexpected handshake frame {received}")]
    VersionMismatch { received: String },

    #[error("Response timeout: event {event} (id {id}) got no reply within {timeout:?}")]
    ReplyTimeout {
        event: EventId,
        id: CorrelationId,
        timeout: Duration,
    },

    #[error("Binary data must be a byte buffer, got {0}")]
    InvalidBinaryArgument(String),

    #[error("Unrecognized frame: {0}")]
    UnparsedFrame(String),

    #[error("Invalid options: {0}")]
    InvalidOptions(String),

    #[error("Client already opened")]
    AlreadyOpened,

    #[error("Connection closed")]
    Closed,

    #[error("Disconnected before a reply arrived")]
    Disconnected,

    #[error("Connection timeout")]
    Timeout,
}

pub type ClientResult<T> = Result<T, ClientError>;

/// Requests from the handle to the driver
enum Command {
    Event {
        event: EventId,
        payload: Value,
        wait_return: bool,
        done: ReplySender,
    },
    Message {
        payload: Value,
        done: oneshot::Sender<ClientResult<()>>,
    },
    Binary {
        blob: Bytes,
        done: oneshot::Sender<ClientResult<()>>,
    },
    Ping {
        done: oneshot::Sender<ClientResult<()>>,
    },
    Close {
        done: oneshot::Sender<ClientResult<()>>,
    },
}

impl Command {
    fn fail(self, error: ClientError) {
        match self {
            Command::Event { done, .. } => {
                let _ = done.send(Err(error));
            }
            Command::Message { done, .. }
            | Command::Binary { done, .. }
            | Command::Ping { done }
            | Command::Close { done } => {
                let _ = done.send(Err(error));
            }
        }
    }
}

/// Driver inputs held until `open`
struct Startup {
    commands: mpsc::UnboundedReceiver<Command>,
    state: watch::Sender<ConnectionState>,
}

/// fastws Client
pub struct Client {
    /// Identifies this client in logs
    id: Uuid,
    /// Client options
    options: ClientOptions,
    /// Listener registry shared with the driver
    events: Arc<EventFacade>,
    /// Command sender to the driver
    commands: mpsc::UnboundedSender<Command>,
    /// Published connection state
    state: watch::Receiver<ConnectionState>,
    /// Taken by the first `open`
    startup: Mutex<Option<Startup>>,
}

impl Client {
    /// Create a client in the `Init` state
    pub fn new(options: ClientOptions) -> Self {
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let (state_tx, state_rx) = watch::channel(ConnectionState::Init);

        Self {
            id: Uuid::new_v4(),
            options,
            events: Arc::new(EventFacade::new()),
            commands: command_tx,
            state: state_rx,
            startup: Mutex::new(Some(Startup {
                commands: command_rx,
                state: state_tx,
            })),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn options(&self) -> &ClientOptions {
        &self.options
    }

    /// Current connection state
    pub fn state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    /// Receiver notified on every state transition
    pub fn state_changes(&self) -> watch::Receiver<ConnectionState> {
        self.state.clone()
    }

    pub fn is_connected(&self) -> bool {
        self.state() == ConnectionState::Connected
    }

    /// Open `transport` and start the connection driver.
    ///
    /// Emits `open` on success. On failure emits `error` and moves straight to
    /// `Closed`.
    pub async fn open<T: Transport>(&self, mut transport: T) -> ClientResult<()> {
        self.options.validate()?;
        let startup = self
            .startup
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
            .ok_or(ClientError::AlreadyOpened)?;

        let mut machine = ConnectionMachine::new();

        if let Err(e) = transport.open().await {
            tracing::warn!(client = %self.id, "Failed to open transport: {}", e);
            machine.on_close();
            startup.state.send_replace(machine.state());
            let reported = ClientError::Transport(TransportError::Connect(e.to_string()));
            self.events
                .emit_lifecycle(Lifecycle::Error, &EventData::Error(Arc::new(reported)));
            return Err(ClientError::Transport(e));
        }

        machine.on_open();
        startup.state.send_replace(machine.state());
        tracing::info!(client = %self.id, "Transport open, awaiting handshake");
        self.events.emit_lifecycle(Lifecycle::Open, &EventData::Empty);

        let driver = Driver {
            transport,
            machine,
            state: startup.state,
            commands: startup.commands,
            codec: FrameCodec::new(self.options.serializer.clone()),
            events: self.events.clone(),
            heartbeat: Heartbeat::new(self.options.ping_interval),
            replies: PendingReplies::new(self.options.reply_timeout),
        };
        let span = tracing::info_span!("fastws", client = %self.id);
        tokio::spawn(driver.run().instrument(span));

        Ok(())
    }

    /// Wait until the handshake completes
    pub async fn wait_connected(&self, timeout: Duration) -> ClientResult<()> {
        let mut state = self.state.clone();
        let result = tokio::time::timeout(
            timeout,
            state.wait_for(|s| matches!(s, ConnectionState::Connected | ConnectionState::Closed)),
        )
        .await;

        match result {
            Ok(Ok(current)) if *current == ConnectionState::Connected => Ok(()),
            Ok(_) => Err(ClientError::Closed),
            Err(_) => Err(ClientError::Timeout),
        }
    }

    /// Register a listener for `event`
    pub fn on<F>(&self, event: &str, listener: F) -> ListenerId
    where
        F: Fn(&EventData) + Send + Sync + 'static,
    {
        self.events.on(event, listener)
    }

    /// Register a listener for the next emission of `event`
    pub fn once<F>(&self, event: &str, listener: F) -> ListenerId
    where
        F: Fn(&EventData) + Send + Sync + 'static,
    {
        self.events.once(event, listener)
    }

    /// Remove one listener
    pub fn off(&self, event: &str, id: ListenerId) -> bool {
        self.events.off(event, id)
    }

    /// Remove every listener for `event`
    pub fn remove_all_listeners(&self, event: &str) -> usize {
        self.events.remove_all_listeners(event)
    }

    /// Emit `event` with `payload`.
    ///
    /// Lifecycle names are delivered to local listeners only and resolve to
    /// `None`. Any other name is sent as an event frame; with `wait_return`
    /// the call resolves to the response payload or fails after the reply
    /// timeout, otherwise it resolves to `None` once the frame was sent.
    pub async fn emit<P: Serialize>(
        &self,
        event: &str,
        payload: P,
        wait_return: bool,
    ) -> ClientResult<Option<Value>> {
        let payload = serde_json::to_value(payload)?;

        if let Some(lifecycle) = Lifecycle::from_name(event) {
            let data = if payload.is_null() {
                EventData::Empty
            } else {
                EventData::Value(payload)
            };
            self.events.emit_lifecycle(lifecycle, &data);
            return Ok(None);
        }

        let (done, reply) = oneshot::channel();
        self.submit(Command::Event {
            event: EventId::of(event),
            payload,
            wait_return,
            done,
        })?;
        reply.await.map_err(|_| ClientError::Closed)?
    }

    /// Emit `event` and wait for its response
    pub async fn request<P: Serialize>(&self, event: &str, payload: P) -> ClientResult<Value> {
        Ok(self.emit(event, payload, true).await?.unwrap_or(Value::Null))
    }

    /// Send a plain message frame
    pub async fn send<P: Serialize>(&self, payload: P) -> ClientResult<()> {
        let payload = serde_json::to_value(payload)?;
        let (done, result) = oneshot::channel();
        self.submit(Command::Message { payload, done })?;
        result.await.map_err(|_| ClientError::Closed)?
    }

    /// Send raw binary data, bypassing the frame codec
    pub async fn send_binary(&self, blob: impl Into<Bytes>) -> ClientResult<()> {
        let (done, result) = oneshot::channel();
        self.submit(Command::Binary {
            blob: blob.into(),
            done,
        })?;
        result.await.map_err(|_| ClientError::Closed)?
    }

    /// Send a dynamically typed byte buffer (a JSON array of byte values)
    pub async fn send_binary_value(&self, value: &Value) -> ClientResult<()> {
        let blob = binary_from_value(value)?;
        self.send_binary(blob).await
    }

    /// Send a ping frame now
    pub async fn ping(&self) -> ClientResult<()> {
        let (done, result) = oneshot::channel();
        self.submit(Command::Ping { done })?;
        result.await.map_err(|_| ClientError::Closed)?
    }

    /// Close the transport
    pub async fn close(&self) -> ClientResult<()> {
        let (done, result) = oneshot::channel();
        self.submit(Command::Close { done })?;
        result.await.map_err(|_| ClientError::Closed)?
    }

    fn submit(&self, command: Command) -> ClientResult<()> {
        self.commands.send(command).map_err(|_| ClientError::Closed)
    }
}

/// Convert a JSON array of byte values into a binary blob
pub fn binary_from_value(value: &Value) -> ClientResult<Bytes> {
    let Value::Array(items) = value else {
        return Err(ClientError::InvalidBinaryArgument(value_kind(value).to_string()));
    };
    items
        .iter()
        .map(|item| {
            item.as_u64()
                .and_then(|n| u8::try_from(n).ok())
                .ok_or_else(|| ClientError::InvalidBinaryArgument(format!("array containing {}", item)))
        })
        .collect::<ClientResult<Vec<u8>>>()
        .map(Bytes::from)
}

fn value_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Printable excerpt of a frame for errors and logs
fn preview(frame: &WireFrame) -> String {
    match frame {
        WireFrame::Text(text) => {
            let head: String = text.chars().take(32).collect();
            format!("\"{}\"", head.escape_debug())
        }
        WireFrame::Binary(bytes) => format!("<{} binary bytes>", bytes.len()),
    }
}

/// Owns the transport and all mutable connection state
struct Driver<T> {
    transport: T,
    machine: ConnectionMachine,
    state: watch::Sender<ConnectionState>,
    commands: mpsc::UnboundedReceiver<Command>,
    codec: FrameCodec,
    events: Arc<EventFacade>,
    heartbeat: Heartbeat,
    replies: PendingReplies,
}

impl<T: Transport> Driver<T> {
    async fn run(mut self) {
        self.heartbeat.start();

        loop {
            let deadline = self.replies.next_deadline();

            tokio::select! {
                incoming = self.transport.recv() => match incoming {
                    Some(Ok(frame)) => self.on_frame(frame),
                    Some(Err(e)) => {
                        tracing::warn!("Transport error: {}", e);
                        self.emit_error(ClientError::Transport(e));
                    }
                    None => {
                        tracing::debug!("Transport closed by peer");
                        break;
                    }
                },

                command = self.commands.recv() => match command {
                    Some(Command::Close { done }) => {
                        tracing::debug!("Closing transport");
                        let result = self.transport.close().await.map_err(ClientError::from);
                        let _ = done.send(result);
                        break;
                    }
                    Some(command) => self.on_command(command).await,
                    None => {
                        tracing::debug!("All client handles dropped, closing transport");
                        let _ = self.transport.close().await;
                        break;
                    }
                },

                () = self.heartbeat.tick() => {
                    let frame = self.codec.encode_ping(now_millis());
                    if let Err(e) = self.send_text(frame).await {
                        tracing::warn!("Heartbeat error: {}", e);
                        self.emit_error(e);
                    }
                }

                () = tokio::time::sleep_until(deadline.unwrap_or_else(Instant::now)), if deadline.is_some() => {
                    let expired = self.replies.expire(Instant::now());
                    tracing::debug!("{} pending replies timed out", expired);
                }
            }
        }

        self.shutdown();
    }

    async fn on_command(&mut self, command: Command) {
        match command {
            Command::Event {
                event,
                payload,
                wait_return: true,
                done,
            } => {
                let id = self.replies.register(event, done);
                tracing::trace!("Event {} awaiting reply with id {}", event, id);
                let sent = match self.codec.encode_event(event, Some(id), &payload) {
                    Ok(frame) => self.send_text(frame).await,
                    Err(e) => Err(e.into()),
                };
                if let Err(e) = sent {
                    self.replies.reject(id, e);
                }
            }
            Command::Event {
                event,
                payload,
                wait_return: false,
                done,
            } => {
                let sent = match self.codec.encode_event(event, None, &payload) {
                    Ok(frame) => self.send_text(frame).await,
                    Err(e) => Err(e.into()),
                };
                let _ = done.send(sent.map(|()| None));
            }
            Command::Message { payload, done } => {
                let sent = match self.codec.encode_message(&payload) {
                    Ok(frame) => self.send_text(frame).await,
                    Err(e) => Err(e.into()),
                };
                let _ = done.send(sent);
            }
            Command::Binary { blob, done } => {
                let sent = self
                    .transport
                    .send(WireFrame::Binary(blob))
                    .await
                    .map_err(ClientError::from);
                let _ = done.send(sent);
            }
            Command::Ping { done } => {
                let frame = self.codec.encode_ping(now_millis());
                let _ = done.send(self.send_text(frame).await);
            }
            Command::Close { done } => {
                // Handled by the run loop
                let _ = done.send(Ok(()));
            }
        }
    }

    fn on_frame(&mut self, frame: WireFrame) {
        match self.machine.on_frame(frame) {
            Gate::Connected => {
                self.publish_state();
                tracing::info!("Handshake complete");
                self.emit(Lifecycle::Connect, EventData::Empty);
            }
            Gate::VersionMismatch(frame) => {
                let received = preview(&frame);
                tracing::warn!("Version mismatch: expected handshake token, got {}", received);
                self.emit_error(ClientError::VersionMismatch { received });
            }
            Gate::Deliver(WireFrame::Binary(bytes)) => {
                self.emit(Lifecycle::Binary, EventData::Binary(bytes));
            }
            Gate::Deliver(WireFrame::Text(text)) => self.on_text(&text),
            Gate::Dropped(frame) => {
                tracing::trace!("Dropping frame in state {}: {}", self.machine.state(), preview(&frame));
            }
        }
    }

    fn on_text(&mut self, text: &str) {
        let packet = match self.codec.decode(text) {
            Ok(Some(packet)) => packet,
            Ok(None) => {
                let frame = preview(&WireFrame::Text(text.to_string()));
                tracing::warn!("Unrecognized frame: {}", frame);
                self.emit_error(ClientError::UnparsedFrame(frame));
                return;
            }
            Err(e) => {
                tracing::warn!("Malformed frame: {}", e);
                self.emit_error(ClientError::Codec(e));
                return;
            }
        };

        tracing::trace!("Received {} frame", packet.kind());
        match packet {
            Packet::Event {
                id,
                correlation,
                payload,
            } => {
                let delivered = self
                    .events
                    .dispatch(DispatchKey::Event(id), &EventData::Value(payload));
                if delivered == 0 {
                    tracing::trace!("No listener for event {} (correlation {:?})", id, correlation);
                }
            }
            Packet::Response {
                correlation,
                payload,
            } => {
                if !self.replies.resolve(correlation, payload) {
                    tracing::debug!("Dropping response for unknown or expired id {}", correlation);
                }
            }
            Packet::Message(value) => self.emit(Lifecycle::Message, EventData::Value(value)),
            Packet::Ping { timestamp } => self.emit(Lifecycle::Ping, EventData::Ping { timestamp }),
            Packet::Pong { latency_ms } => self.emit(Lifecycle::Pong, EventData::Pong { latency_ms }),
        }
    }

    fn shutdown(&mut self) {
        if let Some(previous) = self.machine.on_close() {
            self.publish_state();
            tracing::info!("Connection closed (was {})", previous);
            self.emit(Lifecycle::Close, EventData::Empty);
            self.heartbeat.stop();
            self.emit(Lifecycle::Disconnect, EventData::Empty);
        }

        let rejected = self.replies.reject_all(|| ClientError::Disconnected);
        if rejected > 0 {
            tracing::debug!("Rejected {} pending replies on close", rejected);
        }

        self.commands.close();
        while let Ok(command) = self.commands.try_recv() {
            command.fail(ClientError::Closed);
        }
    }

    async fn send_text(&mut self, frame: String) -> ClientResult<()> {
        self.transport
            .send(WireFrame::Text(frame))
            .await
            .map_err(|e| {
                tracing::warn!("Send failed: {}", e);
                ClientError::from(e)
            })
    }

    fn publish_state(&self) {
        self.state.send_replace(self.machine.state());
    }

    fn emit(&self, event: Lifecycle, data: EventData) {
        self.events.emit_lifecycle(event, &data);
    }

    fn emit_error(&self, error: ClientError) {
        self.emit(Lifecycle::Error, EventData::Error(Arc::new(error)));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::network::transport::mock;
    use serde_json::json;
    use tokio_test::{assert_err, assert_ok};

    fn record(client: &Client, event: &str) -> mpsc::UnboundedReceiver<EventData> {
        let (tx, rx) = mpsc::unbounded_channel();
        client.on(event, move |data| {
            let _ = tx.send(data.clone());
        });
        rx
    }

    async fn connected(options: ClientOptions) -> (Arc<Client>, mock::MockPeer) {
        let client = Arc::new(Client::new(options));
        let (transport, peer) = mock::pair();
        assert_ok!(client.open(transport).await);
        peer.push_text("\u{0}\u{2}");
        assert_ok!(client.wait_connected(Duration::from_secs(1)).await);
        (client, peer)
    }

    #[tokio::test]
    async fn test_open_and_handshake() {
        let client = Client::new(ClientOptions::default());
        let mut opened = record(&client, "open");
        let mut connects = record(&client, "connect");
        assert_eq!(client.state(), ConnectionState::Init);

        let (transport, peer) = mock::pair();
        client.open(transport).await.unwrap();
        assert_eq!(client.state(), ConnectionState::Open);
        assert!(matches!(opened.try_recv(), Ok(EventData::Empty)));

        peer.push_text("\u{0}\u{2}");
        client.wait_connected(Duration::from_secs(1)).await.unwrap();
        assert!(client.is_connected());
        assert!(matches!(connects.recv().await, Some(EventData::Empty)));
    }

    #[tokio::test]
    async fn test_version_mismatch_stays_open() {
        let client = Client::new(ClientOptions::default());
        let mut errors = record(&client, "error");
        let (transport, peer) = mock::pair();
        client.open(transport).await.unwrap();

        peer.push_text("\u{0}\u{1}");
        let error = errors.recv().await.unwrap();
        assert!(matches!(
            error.as_error(),
            Some(ClientError::VersionMismatch { .. })
        ));
        assert_eq!(client.state(), ConnectionState::Open);

        // A later correct token still completes the handshake
        peer.push_text("\u{0}\u{2}");
        client.wait_connected(Duration::from_secs(1)).await.unwrap();
    }

    #[tokio::test]
    async fn test_request_resolves_with_response() {
        let (client, mut peer) = connected(ClientOptions::default()).await;
        let codec = FrameCodec::default();

        let caller = client.clone();
        let call = tokio::spawn(async move { caller.request("sum", json!({"a": 1, "b": 2})).await });

        let frame = peer.next_text().await;
        let Some(Packet::Event { id, correlation, payload }) = codec.decode(&frame).unwrap() else {
            panic!("expected event frame, got {:?}", frame);
        };
        assert_eq!(id, EventId::of("sum"));
        assert_eq!(correlation, Some(0));

        let sum = payload["a"].as_i64().unwrap() + payload["b"].as_i64().unwrap();
        peer.push_text(&codec.encode_response(0, &json!(sum)).unwrap());

        assert_eq!(call.await.unwrap().unwrap(), json!(3));
    }

    #[tokio::test]
    async fn test_fire_and_forget_has_no_correlation() {
        let (client, mut peer) = connected(ClientOptions::default()).await;

        let result = client.emit("chat", json!("hi"), false).await.unwrap();
        assert_eq!(result, None);

        let frame = peer.next_text().await;
        let expected = FrameCodec::default()
            .encode_event(EventId::of("chat"), None, &json!("hi"))
            .unwrap();
        assert_eq!(frame, expected);
    }

    #[tokio::test(start_paused = true)]
    async fn test_reply_timeout_and_late_response() {
        let (client, mut peer) = connected(ClientOptions::default()).await;
        let mut errors = record(&client, "error");
        let mut messages = record(&client, "message");

        let start = Instant::now();
        let caller = client.clone();
        let call = tokio::spawn(async move { caller.request("slow", json!(null)).await });
        peer.next_text().await;

        let err = call.await.unwrap().unwrap_err();
        assert!(matches!(err, ClientError::ReplyTimeout { id: 0, .. }));
        assert!(start.elapsed() >= Duration::from_millis(5000));

        // The late response must be dropped silently
        let codec = FrameCodec::default();
        peer.push_text(&codec.encode_response(0, &json!("late")).unwrap());
        peer.push_text(&codec.encode_message(&json!("marker")).unwrap());
        let marker = messages.recv().await.unwrap();
        assert_eq!(marker.as_value(), Some(&json!("marker")));
        assert!(errors.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_incoming_event_dispatch() {
        let (client, peer) = connected(ClientOptions::default()).await;
        let mut news = record(&client, "news");

        let frame = FrameCodec::default()
            .encode_event(EventId::of("news"), None, &json!({"x": 1}))
            .unwrap();
        peer.push_text(&frame);

        let data = news.recv().await.unwrap();
        assert_eq!(data.as_value(), Some(&json!({"x": 1})));
    }

    #[tokio::test]
    async fn test_message_frames() {
        let (client, mut peer) = connected(ClientOptions::default()).await;
        let mut messages = record(&client, "message");

        client.send(json!({"k": 1})).await.unwrap();
        assert_eq!(peer.next_text().await, "\u{1}{\"k\":1}\u{2}");

        peer.push_text("\u{1}[1,2]\u{2}");
        let data = messages.recv().await.unwrap();
        assert_eq!(data.as_value(), Some(&json!([1, 2])));
    }

    #[tokio::test(start_paused = true)]
    async fn test_heartbeat_ping_and_pong_latency() {
        let options = ClientOptions::default().with_ping_interval(Duration::from_millis(1000));
        let (client, mut peer) = connected(options).await;
        let mut pongs = record(&client, "pong");

        let ping = peer.next_text().await;
        let Some(Packet::Ping { timestamp }) = FrameCodec::default().decode(&ping).unwrap() else {
            panic!("expected ping frame, got {:?}", ping);
        };

        peer.push_text(&FrameCodec::default().encode_pong(timestamp));
        match pongs.recv().await.unwrap() {
            EventData::Pong { latency_ms } => assert!(latency_ms >= 0),
            other => panic!("unexpected pong data: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_out_of_range_pong_keeps_connection() {
        let (client, mut peer) = connected(ClientOptions::default()).await;
        let mut errors = record(&client, "error");

        peer.push_text("\u{e}9223372036854775808");
        let error = errors.recv().await.unwrap();
        assert!(matches!(
            error.as_error(),
            Some(ClientError::Codec(CodecError::InvalidTimestamp(_)))
        ));

        assert_ok!(client.send(json!(1)).await);
        assert_eq!(peer.next_text().await, "\u{1}1\u{2}");
        assert!(client.is_connected());
    }

    #[tokio::test(start_paused = true)]
    async fn test_heartbeat_send_failure_is_reported() {
        let options = ClientOptions::default().with_ping_interval(Duration::from_millis(1000));
        let (client, peer) = connected(options).await;
        let mut errors = record(&client, "error");

        // Dropping the receiving half makes every send fail
        let mock::MockPeer { inbound, outbound } = peer;
        drop(outbound);

        let error = errors.recv().await.unwrap();
        assert!(matches!(
            error.as_error(),
            Some(ClientError::Transport(TransportError::Closed))
        ));
        drop(inbound);
    }

    #[tokio::test]
    async fn test_incoming_ping_is_reported() {
        let (client, peer) = connected(ClientOptions::default()).await;
        let mut pings = record(&client, "ping");

        peer.push_text("\u{f}42");
        assert!(matches!(
            pings.recv().await,
            Some(EventData::Ping { timestamp: 42 })
        ));
    }

    #[tokio::test]
    async fn test_binary_passthrough() {
        let (client, mut peer) = connected(ClientOptions::default()).await;
        let mut binaries = record(&client, "binary");

        peer.push_binary(b"\x01raw\x02");
        let data = binaries.recv().await.unwrap();
        assert_eq!(data.as_binary().map(|b| &b[..]), Some(&b"\x01raw\x02"[..]));

        client.send_binary(vec![1u8, 2, 3]).await.unwrap();
        assert_eq!(
            peer.next_sent().await,
            WireFrame::Binary(Bytes::from_static(&[1, 2, 3]))
        );
    }

    #[tokio::test]
    async fn test_send_binary_value() {
        let (client, mut peer) = connected(ClientOptions::default()).await;

        let err = assert_err!(client.send_binary_value(&json!("text")).await);
        assert!(matches!(err, ClientError::InvalidBinaryArgument(_)));
        let err = assert_err!(client.send_binary_value(&json!([1, 256])).await);
        assert!(matches!(err, ClientError::InvalidBinaryArgument(_)));
        assert!(peer.outbound.try_recv().is_err());

        assert_ok!(client.send_binary_value(&json!([0, 255])).await);
        assert_eq!(
            peer.next_sent().await,
            WireFrame::Binary(Bytes::from_static(&[0, 255]))
        );
    }

    #[tokio::test]
    async fn test_unparsed_frame_is_reported() {
        let (client, peer) = connected(ClientOptions::default()).await;
        let mut errors = record(&client, "error");

        peer.push_text("garbage");
        let error = errors.recv().await.unwrap();
        assert!(matches!(error.as_error(), Some(ClientError::UnparsedFrame(_))));

        peer.push_text("\u{6}1");
        let error = errors.recv().await.unwrap();
        assert!(matches!(error.as_error(), Some(ClientError::Codec(_))));
        assert!(client.is_connected());
    }

    #[tokio::test]
    async fn test_transport_error_is_reported() {
        let (client, peer) = connected(ClientOptions::default()).await;
        let mut errors = record(&client, "error");

        peer.push_error("reset");
        let error = errors.recv().await.unwrap();
        assert!(matches!(error.as_error(), Some(ClientError::Transport(_))));
        assert!(client.is_connected());
    }

    #[tokio::test]
    async fn test_lifecycle_emit_is_local() {
        let client = Client::new(ClientOptions::default());
        let mut messages = record(&client, "message");

        let result = client.emit("message", json!("local"), true).await.unwrap();
        assert_eq!(result, None);
        assert_eq!(messages.try_recv().unwrap().as_value(), Some(&json!("local")));
        assert_eq!(client.state(), ConnectionState::Init);
    }

    #[tokio::test]
    async fn test_close_sequence() {
        let (client, mut peer) = connected(ClientOptions::default()).await;
        let order = Arc::new(Mutex::new(Vec::new()));
        for event in ["close", "disconnect"] {
            let order = order.clone();
            client.on(event, move |_| order.lock().unwrap().push(event));
        }

        let caller = client.clone();
        let call = tokio::spawn(async move { caller.request("slow", json!(null)).await });
        peer.next_text().await;

        client.close().await.unwrap();
        let mut state = client.state_changes();
        state
            .wait_for(|s| *s == ConnectionState::Closed)
            .await
            .unwrap();

        assert!(matches!(call.await.unwrap(), Err(ClientError::Disconnected)));
        assert_eq!(*order.lock().unwrap(), vec!["close", "disconnect"]);

        let err = client.emit("chat", json!(1), false).await.unwrap_err();
        assert!(matches!(err, ClientError::Closed));
    }

    #[tokio::test]
    async fn test_peer_close_moves_to_closed() {
        let (client, peer) = connected(ClientOptions::default()).await;
        let mut disconnects = record(&client, "disconnect");

        drop(peer);
        assert!(matches!(disconnects.recv().await, Some(EventData::Empty)));
        assert_eq!(client.state(), ConnectionState::Closed);
    }

    #[tokio::test]
    async fn test_open_failure() {
        let client = Client::new(ClientOptions::default());
        let mut errors = record(&client, "error");
        let mut closes = record(&client, "close");

        let err = client.open(mock::failing()).await.unwrap_err();
        assert!(matches!(err, ClientError::Transport(_)));
        assert_eq!(client.state(), ConnectionState::Closed);
        assert!(errors.try_recv().is_ok());
        assert!(closes.try_recv().is_err());

        let (transport, _peer) = mock::pair();
        assert!(matches!(
            client.open(transport).await,
            Err(ClientError::AlreadyOpened)
        ));
    }

    #[tokio::test]
    async fn test_calls_before_open_are_queued() {
        let client = Arc::new(Client::new(ClientOptions::default()));
        let caller = client.clone();
        let call = tokio::spawn(async move { caller.emit("early", json!(1), false).await });
        tokio::task::yield_now().await;

        let (transport, mut peer) = mock::pair();
        client.open(transport).await.unwrap();

        let frame = peer.next_text().await;
        assert!(frame.starts_with(&format!("\u{5}{}\u{16}", EventId::of("early"))));
        assert_eq!(call.await.unwrap().unwrap(), None);
    }

    #[test]
    fn test_binary_from_value() {
        assert_eq!(binary_from_value(&json!([104, 105])).unwrap(), Bytes::from_static(b"hi"));
        assert!(binary_from_value(&json!({"0": 1})).is_err());
        assert!(binary_from_value(&json!([-1])).is_err());
    }
}
