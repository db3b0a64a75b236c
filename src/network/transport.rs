//! Message channel abstraction
//!
//! The client runs on top of any bidirectional channel that moves whole text
//! or binary frames. Notifications map onto the trait as follows:
//! - `open()` resolving `Ok` is the open notification
//! - `recv()` yielding `Some(Ok(frame))` is a message
//! - `recv()` yielding `Some(Err(_))` is an error
//! - `recv()` yielding `None` is the close notification

use async_trait::async_trait;
use bytes::Bytes;
use thiserror::Error;

/// Transport errors
#[derive(Error, Debug)]
pub enum TransportError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Connect failed: {0}")]
    Connect(String),

    #[error("Transport not open")]
    NotOpen,

    #[error("Transport closed")]
    Closed,

    #[error("{0}")]
    Other(String),
}

pub type TransportResult<T> = Result<T, TransportError>;

/// A single frame as moved by the transport
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WireFrame {
    Text(String),
    Binary(Bytes),
}

impl WireFrame {
    pub fn len(&self) -> usize {
        match self {
            Self::Text(text) => text.len(),
            Self::Binary(bytes) => bytes.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl From<String> for WireFrame {
    fn from(text: String) -> Self {
        Self::Text(text)
    }
}

impl From<Bytes> for WireFrame {
    fn from(bytes: Bytes) -> Self {
        Self::Binary(bytes)
    }
}

/// Bidirectional frame channel driven by the client.
///
/// `recv` is polled inside a `tokio::select!` loop and must be cancel-safe:
/// dropping its future before completion must not lose a frame.
#[async_trait]
pub trait Transport: Send + 'static {
    /// Establish the channel
    async fn open(&mut self) -> TransportResult<()>;

    /// Send one frame
    async fn send(&mut self, frame: WireFrame) -> TransportResult<()>;

    /// Wait for the next frame; `None` once the channel is closed
    async fn recv(&mut self) -> Option<TransportResult<WireFrame>>;

    /// Close the channel
    async fn close(&mut self) -> TransportResult<()>;
}

#[cfg(test)]
pub(crate) mod mock {
    //! In-memory transport for driving the client from tests

    use super::*;
    use tokio::sync::mpsc;

    /// Client side of the in-memory channel
    pub struct MockTransport {
        inbound: mpsc::UnboundedReceiver<TransportResult<WireFrame>>,
        outbound: mpsc::UnboundedSender<WireFrame>,
        fail_open: bool,
    }

    /// Test side: pushes frames to the client and reads what it sent
    pub struct MockPeer {
        pub inbound: mpsc::UnboundedSender<TransportResult<WireFrame>>,
        pub outbound: mpsc::UnboundedReceiver<WireFrame>,
    }

    impl MockPeer {
        pub fn push_text(&self, text: &str) {
            let _ = self.inbound.send(Ok(WireFrame::Text(text.to_string())));
        }

        pub fn push_binary(&self, bytes: &'static [u8]) {
            let _ = self.inbound.send(Ok(WireFrame::Binary(Bytes::from_static(bytes))));
        }

        pub fn push_error(&self, message: &str) {
            let _ = self.inbound.send(Err(TransportError::Other(message.to_string())));
        }

        pub async fn next_sent(&mut self) -> WireFrame {
            self.outbound.recv().await.expect("client dropped the channel")
        }

        pub async fn next_text(&mut self) -> String {
            match self.next_sent().await {
                WireFrame::Text(text) => text,
                other => panic!("expected text frame, got {:?}", other),
            }
        }
    }

    pub fn pair() -> (MockTransport, MockPeer) {
        let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        (
            MockTransport {
                inbound: inbound_rx,
                outbound: outbound_tx,
                fail_open: false,
            },
            MockPeer {
                inbound: inbound_tx,
                outbound: outbound_rx,
            },
        )
    }

    pub fn failing() -> MockTransport {
        let (mut transport, _peer) = pair();
        transport.fail_open = true;
        transport
    }

    #[async_trait]
    impl Transport for MockTransport {
        async fn open(&mut self) -> TransportResult<()> {
            if self.fail_open {
                return Err(TransportError::Connect("connection refused".to_string()));
            }
            Ok(())
        }

        async fn send(&mut self, frame: WireFrame) -> TransportResult<()> {
            self.outbound.send(frame).map_err(|_| TransportError::Closed)
        }

        async fn recv(&mut self) -> Option<TransportResult<WireFrame>> {
            self.inbound.recv().await
        }

        async fn close(&mut self) -> TransportResult<()> {
            self.inbound.close();
            Ok(())
        }
    }
}
