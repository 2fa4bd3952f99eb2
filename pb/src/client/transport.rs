//! Transport seam between the connection manager and the wire
//!
//! The manager is written against [`Transport`]/[`TransportLink`] so it
//! can be driven by an in-memory transport in tests; [`WsTransport`] is
//! the production WebSocket implementation.

use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use thiserror::Error;
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tracing::debug;

/// Errors from the transport layer
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("Connect failed: {0}")]
    Connect(String),

    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    #[error("Connection closed")]
    Closed,
}

/// Opens links to the backend's realtime endpoint
#[async_trait]
pub trait Transport: Send + Sync {
    async fn connect(&self, url: &str) -> Result<Box<dyn TransportLink>, TransportError>;
}

/// One live bidirectional link
///
/// `recv` returning `None` means the peer closed the link cleanly; an
/// `Err` item means it broke. Either way the link is done.
#[async_trait]
pub trait TransportLink: Send {
    async fn send(&mut self, text: &str) -> Result<(), TransportError>;

    async fn recv(&mut self) -> Option<Result<String, TransportError>>;

    async fn close(&mut self);
}

/// Production transport over tokio-tungstenite
pub struct WsTransport;

#[async_trait]
impl Transport for WsTransport {
    async fn connect(&self, url: &str) -> Result<Box<dyn TransportLink>, TransportError> {
        debug!(%url, "WsTransport: connecting");
        let (stream, response) = connect_async(url).await?;
        debug!(status = %response.status(), "WsTransport: connected");
        Ok(Box::new(WsLink { stream }))
    }
}

struct WsLink {
    stream: WebSocketStream<MaybeTlsStream<TcpStream>>,
}

#[async_trait]
impl TransportLink for WsLink {
    async fn send(&mut self, text: &str) -> Result<(), TransportError> {
        self.stream.send(Message::Text(text.into())).await?;
        Ok(())
    }

    async fn recv(&mut self) -> Option<Result<String, TransportError>> {
        // Ping/pong is answered by tungstenite while the stream is polled;
        // only text frames carry protocol traffic.
        loop {
            match self.stream.next().await? {
                Ok(Message::Text(text)) => return Some(Ok(text.to_string())),
                Ok(Message::Close(frame)) => {
                    debug!(?frame, "WsLink: close frame received");
                    return None;
                }
                Ok(_) => continue,
                Err(e) => return Some(Err(e.into())),
            }
        }
    }

    async fn close(&mut self) {
        let _ = self.stream.close(None).await;
    }
}
