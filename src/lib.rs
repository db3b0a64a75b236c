//! fastws - Event-bus client protocol over a message channel
//!
//! Named events with optional request/response correlation, a versioned
//! handshake and a latency heartbeat, framed as compact text over any
//! transport that moves whole messages (WebSocket by default).

pub mod config;
pub mod events;
pub mod network;
pub mod protocol;

pub use events::{EventData, Lifecycle, ListenerId};
pub use network::{
    Client, ClientError, ClientOptions, ClientResult, ConnectionState, Transport, TransportError,
    WebSocketTransport, WireFrame,
};
pub use protocol::{EventId, FrameCodec, JsonSerializer, Packet, Serializer};
