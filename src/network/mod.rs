//! Network module - Runs the event protocol over a message channel
//!
//! Provides:
//! - The transport abstraction and a WebSocket implementation
//! - The connection state machine and heartbeat
//! - Reply correlation for request/response calls
//! - The application-facing client

mod client;
mod connection;
mod heartbeat;
mod rpc;
mod transport;
mod websocket;

pub use client::*;
pub use connection::*;
pub use heartbeat::*;
pub use rpc::*;
pub use transport::*;
pub use websocket::*;

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use crate::protocol::{JsonSerializer, Serializer};

/// Runtime options for a client
#[derive(Clone)]
pub struct ClientOptions {
    /// Interval between heartbeat pings
    pub ping_interval: Duration,
    /// Accepted for compatibility; no watchdog consumes it
    pub ping_timeout: Duration,
    /// How long a call waits for its response
    pub reply_timeout: Duration,
    /// Message body serializer
    pub serializer: Arc<dyn Serializer>,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            ping_interval: Duration::from_millis(30_000),
            ping_timeout: Duration::from_millis(1_000),
            reply_timeout: Duration::from_millis(5_000),
            serializer: Arc::new(JsonSerializer),
        }
    }
}

impl fmt::Debug for ClientOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientOptions")
            .field("ping_interval", &self.ping_interval)
            .field("ping_timeout", &self.ping_timeout)
            .field("reply_timeout", &self.reply_timeout)
            .finish_non_exhaustive()
    }
}

impl ClientOptions {
    pub fn with_ping_interval(mut self, interval: Duration) -> Self {
        self.ping_interval = interval;
        self
    }

    pub fn with_ping_timeout(mut self, timeout: Duration) -> Self {
        self.ping_timeout = timeout;
        self
    }

    pub fn with_reply_timeout(mut self, timeout: Duration) -> Self {
        self.reply_timeout = timeout;
        self
    }

    pub fn with_serializer(mut self, serializer: Arc<dyn Serializer>) -> Self {
        self.serializer = serializer;
        self
    }

    /// Reject zero durations
    pub fn validate(&self) -> ClientResult<()> {
        if self.ping_interval.is_zero() {
            return Err(ClientError::InvalidOptions("ping_interval must be positive".to_string()));
        }
        if self.reply_timeout.is_zero() {
            return Err(ClientError::InvalidOptions("reply_timeout must be positive".to_string()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_options() {
        let options = ClientOptions::default();
        assert_eq!(options.ping_interval, Duration::from_secs(30));
        assert_eq!(options.ping_timeout, Duration::from_secs(1));
        assert_eq!(options.reply_timeout, Duration::from_secs(5));
        assert!(options.validate().is_ok());
    }

    #[test]
    fn test_zero_interval_rejected() {
        let options = ClientOptions::default().with_ping_interval(Duration::ZERO);
        assert!(matches!(options.validate(), Err(ClientError::InvalidOptions(_))));

        let options = ClientOptions::default().with_reply_timeout(Duration::ZERO);
        assert!(matches!(options.validate(), Err(ClientError::InvalidOptions(_))));
    }
}
