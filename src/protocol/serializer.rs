//! Value serialization for message bodies
//!
//! The codec treats the serializer as a black box: it only needs `encode` and
//! `decode` to round-trip a value. Implementations must not emit the frame
//! sentinel bytes inside their output.

use serde_json::Value;
use thiserror::Error;

/// Serializer errors
#[derive(Error, Debug)]
pub enum SerializerError {
    #[error("Encode error: {0}")]
    Encode(String),

    #[error("Decode error: {0}")]
    Decode(String),
}

pub type SerializerResult<T> = Result<T, SerializerError>;

/// Turns payload values into message bodies and back
pub trait Serializer: Send + Sync + 'static {
    /// Encode a value into a message body
    fn encode(&self, value: &Value) -> SerializerResult<String>;

    /// Decode a message body into a value
    fn decode(&self, body: &str) -> SerializerResult<Value>;
}

/// JSON message bodies via `serde_json`.
///
/// JSON escapes every control character inside strings, so bodies never
/// contain a sentinel byte.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonSerializer;

impl Serializer for JsonSerializer {
    fn encode(&self, value: &Value) -> SerializerResult<String> {
        serde_json::to_string(value).map_err(|e| SerializerError::Encode(e.to_string()))
    }

    fn decode(&self, body: &str) -> SerializerResult<Value> {
        serde_json::from_str(body).map_err(|e| SerializerError::Decode(e.to_string()))
    }
}
