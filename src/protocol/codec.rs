//! Frame codec
//!
//! Encodes packets into text frames and parses text frames back into packets.
//! The codec holds no connection state; only the serializer is shared.

use std::fmt::Write as _;
use std::str::FromStr;
use std::sync::Arc;

use serde_json::Value;
use thiserror::Error;

use super::{
    now_millis, CorrelationId, EventId, InvalidEventId, JsonSerializer, Serializer,
    SerializerError, DATA_END, DATA_START, EVENT_SENTINEL, ID_SEPARATOR, PING_SENTINEL,
    PONG_SENTINEL, RESPONSE_SENTINEL,
};

/// Codec errors
#[derive(Error, Debug)]
pub enum CodecError {
    #[error("Serialization error: {0}")]
    Serialization(#[from] SerializerError),

    #[error("Invalid timestamp: {0:?}")]
    InvalidTimestamp(String),

    #[error("Invalid correlation id: {0:?}")]
    InvalidCorrelationId(String),

    #[error("{0}")]
    InvalidEventId(#[from] InvalidEventId),

    #[error("Malformed message body in {0} frame")]
    MalformedBody(&'static str),
}

pub type CodecResult<T> = Result<T, CodecError>;

/// A decoded protocol frame
#[derive(Debug, Clone, PartialEq)]
pub enum Packet {
    /// Plain message carrying a value
    Message(Value),
    /// Heartbeat probe with the sender's timestamp
    Ping { timestamp: u64 },
    /// Heartbeat answer, already converted into elapsed milliseconds
    Pong { latency_ms: i64 },
    /// Named event, optionally awaiting a response
    Event {
        id: EventId,
        correlation: Option<CorrelationId>,
        payload: Value,
    },
    /// Answer to an event that carried a correlation id
    Response {
        correlation: CorrelationId,
        payload: Value,
    },
}

impl Packet {
    /// Short name of the frame kind, used in logs
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Message(_) => "message",
            Self::Ping { .. } => "ping",
            Self::Pong { .. } => "pong",
            Self::Event { .. } => "event",
            Self::Response { .. } => "response",
        }
    }
}

/// Encodes and decodes text frames
#[derive(Clone)]
pub struct FrameCodec {
    serializer: Arc<dyn Serializer>,
}

impl FrameCodec {
    pub fn new(serializer: Arc<dyn Serializer>) -> Self {
        Self { serializer }
    }

    /// Encode a plain message frame
    pub fn encode_message(&self, value: &Value) -> CodecResult<String> {
        let body = self.serializer.encode(value)?;
        let mut frame = String::with_capacity(body.len() + 2);
        frame.push(char::from(DATA_START));
        frame.push_str(&body);
        frame.push(char::from(DATA_END));
        Ok(frame)
    }

    /// Encode a ping frame carrying `timestamp` (epoch milliseconds)
    pub fn encode_ping(&self, timestamp: u64) -> String {
        format!("{}{}", char::from(PING_SENTINEL), timestamp)
    }

    /// Encode a pong frame echoing a ping's `timestamp`
    pub fn encode_pong(&self, timestamp: u64) -> String {
        format!("{}{}", char::from(PONG_SENTINEL), timestamp)
    }

    /// Encode an event frame
    pub fn encode_event(
        &self,
        id: EventId,
        correlation: Option<CorrelationId>,
        payload: &Value,
    ) -> CodecResult<String> {
        let message = self.encode_message(payload)?;
        let mut frame = String::with_capacity(message.len() + 16);
        frame.push(char::from(EVENT_SENTINEL));
        let _ = write!(frame, "{}", id);
        frame.push(char::from(ID_SEPARATOR));
        if let Some(correlation) = correlation {
            let _ = write!(frame, "{}", correlation);
        }
        frame.push_str(&message);
        Ok(frame)
    }

    /// Encode a response frame
    pub fn encode_response(&self, correlation: CorrelationId, payload: &Value) -> CodecResult<String> {
        let message = self.encode_message(payload)?;
        let mut frame = String::with_capacity(message.len() + 8);
        frame.push(char::from(RESPONSE_SENTINEL));
        let _ = write!(frame, "{}", correlation);
        frame.push_str(&message);
        Ok(frame)
    }

    /// Decode a text frame.
    ///
    /// Returns `Ok(None)` when the leading byte matches no known frame kind.
    pub fn decode(&self, frame: &str) -> CodecResult<Option<Packet>> {
        self.decode_at(frame, now_millis())
    }

    /// Decode a text frame, measuring pong latency against `now` (epoch ms)
    pub fn decode_at(&self, frame: &str, now: u64) -> CodecResult<Option<Packet>> {
        let bytes = frame.as_bytes();
        let (Some(&first), Some(&last)) = (bytes.first(), bytes.last()) else {
            return Ok(None);
        };

        // The message check needs both ends; every other kind is keyed on the first byte.
        if first == DATA_START && last == DATA_END && bytes.len() >= 2 {
            return self.decode_body(frame, "message").map(|v| Some(Packet::Message(v)));
        }

        let packet = match first {
            PING_SENTINEL => Packet::Ping {
                timestamp: parse_timestamp(&frame[1..])?,
            },
            PONG_SENTINEL => {
                let timestamp = parse_timestamp(&frame[1..])?;
                Packet::Pong {
                    latency_ms: latency_since(timestamp, now)
                        .ok_or_else(|| CodecError::InvalidTimestamp(frame[1..].to_string()))?,
                }
            }
            RESPONSE_SENTINEL => {
                let (head, body) = split_body(frame, "response")?;
                Packet::Response {
                    correlation: parse_correlation(head)?,
                    payload: self.decode_body(body, "response")?,
                }
            }
            EVENT_SENTINEL => {
                let (head, body) = split_body(frame, "event")?;
                let (id, correlation) = match head.split_once(char::from(ID_SEPARATOR)) {
                    Some((id, "")) => (id, None),
                    Some((id, correlation)) => (id, Some(parse_correlation(correlation)?)),
                    None => (head, None),
                };
                Packet::Event {
                    id: id.parse()?,
                    correlation,
                    payload: self.decode_body(body, "event")?,
                }
            }
            _ => return Ok(None),
        };

        Ok(Some(packet))
    }

    /// Decode a `DATA_START ... DATA_END` section
    fn decode_body(&self, section: &str, kind: &'static str) -> CodecResult<Value> {
        let bytes = section.as_bytes();
        if bytes.len() < 2 || bytes[0] != DATA_START || bytes[bytes.len() - 1] != DATA_END {
            return Err(CodecError::MalformedBody(kind));
        }
        Ok(self.serializer.decode(&section[1..section.len() - 1])?)
    }
}

impl Default for FrameCodec {
    fn default() -> Self {
        Self::new(Arc::new(JsonSerializer))
    }
}

impl std::fmt::Debug for FrameCodec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FrameCodec").finish_non_exhaustive()
    }
}

/// Split `SENTINEL head DATA_START ...` into the head and the message section
fn split_body<'a>(frame: &'a str, kind: &'static str) -> CodecResult<(&'a str, &'a str)> {
    let split = frame
        .find(char::from(DATA_START))
        .ok_or(CodecError::MalformedBody(kind))?;
    Ok((&frame[1..split], &frame[split..]))
}

fn parse_decimal<T: FromStr>(s: &str) -> Option<T> {
    if s.is_empty() || !s.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    s.parse().ok()
}

fn parse_timestamp(s: &str) -> CodecResult<u64> {
    parse_decimal(s).ok_or_else(|| CodecError::InvalidTimestamp(s.to_string()))
}

/// Milliseconds from `timestamp` to `now`; `None` if either is out of `i64` range
fn latency_since(timestamp: u64, now: u64) -> Option<i64> {
    let timestamp = i64::try_from(timestamp).ok()?;
    let now = i64::try_from(now).ok()?;
    now.checked_sub(timestamp)
}

fn parse_correlation(s: &str) -> CodecResult<CorrelationId> {
    parse_decimal(s).ok_or_else(|| CodecError::InvalidCorrelationId(s.to_string()))
}
