//! Protocol module - Defines the wire protocol spoken over the message channel
//!
//! Every text frame starts with a single sentinel byte selecting its kind:
//! - `0x01` ... `0x02` plain message (serialized value between the sentinels)
//! - `0x0F` ping, `0x0E` pong (decimal epoch-millisecond timestamp)
//! - `0x05` event (hex event id, `0x16`, optional correlation id, message)
//! - `0x06` response (decimal correlation id, message)
//!
//! Binary frames are never interpreted and travel untouched.

mod codec;
mod event_id;
mod serializer;

pub use codec::*;
pub use event_id::*;
pub use serializer::*;

/// Opens a serialized message body
pub const DATA_START: u8 = 0x01;

/// Closes a serialized message body
pub const DATA_END: u8 = 0x02;

/// Leading byte of an event frame
pub const EVENT_SENTINEL: u8 = 0x05;

/// Leading byte of a response frame
pub const RESPONSE_SENTINEL: u8 = 0x06;

/// Leading byte of a pong frame
pub const PONG_SENTINEL: u8 = 0x0E;

/// Leading byte of a ping frame
pub const PING_SENTINEL: u8 = 0x0F;

/// Separates the event id from the correlation id in an event frame
pub const ID_SEPARATOR: u8 = 0x16;

/// Version token the server sends right after the channel opens
pub const HANDSHAKE_TOKEN: &str = "\x00\x02";

/// WebSocket subprotocol requested when connecting
pub const DEFAULT_SUBPROTOCOL: &str = "fast-ws";

/// Correlation id carried by event frames that await a response.
///
/// Assigned from a counter that wraps to zero after `u16::MAX`.
pub type CorrelationId = u16;

/// Current wall-clock time in milliseconds since the Unix epoch
pub fn now_millis() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}
