//! WebSocket transport over `tokio-tungstenite`

use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

use super::transport::{Transport, TransportError, TransportResult, WireFrame};
use crate::protocol::DEFAULT_SUBPROTOCOL;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// WebSocket client channel
pub struct WebSocketTransport {
    url: String,
    protocol: String,
    stream: Option<WsStream>,
}

impl WebSocketTransport {
    /// Create a transport for `url`, requesting the default subprotocol
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            protocol: DEFAULT_SUBPROTOCOL.to_string(),
            stream: None,
        }
    }

    /// Request a different subprotocol
    pub fn with_protocol(mut self, protocol: impl Into<String>) -> Self {
        self.protocol = protocol.into();
        self
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

fn ws_error(e: tokio_tungstenite::tungstenite::Error) -> TransportError {
    TransportError::Other(e.to_string())
}

#[async_trait]
impl Transport for WebSocketTransport {
    async fn open(&mut self) -> TransportResult<()> {
        let mut request = self
            .url
            .as_str()
            .into_client_request()
            .map_err(|e| TransportError::Connect(e.to_string()))?;
        if !self.protocol.is_empty() {
            let value = HeaderValue::from_str(&self.protocol)
                .map_err(|e| TransportError::Connect(e.to_string()))?;
            request.headers_mut().insert("Sec-WebSocket-Protocol", value);
        }

        tracing::debug!("Opening WebSocket to {}", self.url);
        let (stream, _response) = connect_async(request)
            .await
            .map_err(|e| TransportError::Connect(e.to_string()))?;
        self.stream = Some(stream);
        Ok(())
    }

    async fn send(&mut self, frame: WireFrame) -> TransportResult<()> {
        let stream = self.stream.as_mut().ok_or(TransportError::NotOpen)?;
        let message = match frame {
            WireFrame::Text(text) => Message::text(text),
            WireFrame::Binary(bytes) => Message::binary(bytes),
        };
        stream.send(message).await.map_err(ws_error)
    }

    async fn recv(&mut self) -> Option<TransportResult<WireFrame>> {
        let stream = self.stream.as_mut()?;
        loop {
            match stream.next().await? {
                Ok(Message::Text(text)) => return Some(Ok(WireFrame::Text(text.as_str().to_owned()))),
                Ok(Message::Binary(bytes)) => return Some(Ok(WireFrame::Binary(bytes))),
                Ok(Message::Close(frame)) => {
                    tracing::debug!("WebSocket close frame: {:?}", frame);
                    return None;
                }
                // Control frames are answered by tungstenite itself
                Ok(Message::Ping(_) | Message::Pong(_) | Message::Frame(_)) => continue,
                Err(e) => return Some(Err(ws_error(e))),
            }
        }
    }

    async fn close(&mut self) -> TransportResult<()> {
        match self.stream.as_mut() {
            Some(stream) => stream.close(None).await.map_err(ws_error),
            None => Err(TransportError::NotOpen),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_send_before_open() {
        let mut transport = WebSocketTransport::new("ws://127.0.0.1:9/fast-ws");
        let err = transport
            .send(WireFrame::Text("x".to_string()))
            .await
            .unwrap_err();
        assert!(matches!(err, TransportError::NotOpen));
        assert!(transport.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_invalid_url() {
        let mut transport = WebSocketTransport::new("not a url");
        let err = transport.open().await.unwrap_err();
        assert!(matches!(err, TransportError::Connect(_)));
    }
}
