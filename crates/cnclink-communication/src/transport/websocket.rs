//! WebSocket transport
//!
//! Client connection to a controller's WebSocket endpoint (FluidNC, ESP32
//! WiFi bridges). Each incoming text or binary message is forwarded as one
//! chunk; outgoing frames are sent as one message each.

use super::{kind_mismatch, IncomingStream, Transport, TransportEvent, INCOMING_CHANNEL_CAPACITY};
use async_trait::async_trait;
use cnclink_core::{ConnectionConfig, ConnectionError, Result, TransportKind};
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// WebSocket transport backed by `tokio-tungstenite`
pub struct WebSocketTransport {
    url: Option<String>,
    sink: Option<SplitSink<WsStream, Message>>,
    reader: Option<JoinHandle<()>>,
}

impl WebSocketTransport {
    /// Create an unopened WebSocket transport
    pub fn new() -> Self {
        Self {
            url: None,
            sink: None,
            reader: None,
        }
    }

    /// Endpoint of the open connection, if any
    pub fn url(&self) -> Option<&str> {
        self.url.as_deref()
    }

    async fn forward(mut stream: SplitStream<WsStream>, tx: mpsc::Sender<TransportEvent>) {
        let reason = loop {
            let event = match stream.next().await {
                Some(Ok(Message::Text(text))) => TransportEvent::Data(text.into_bytes()),
                Some(Ok(Message::Binary(data))) => TransportEvent::Data(data),
                Some(Ok(Message::Close(frame))) => {
                    break frame
                        .map(|f| format!("closed by peer: {} {}", u16::from(f.code), f.reason))
                        .unwrap_or_else(|| "closed by peer".to_string());
                }
                Some(Ok(_)) => continue,
                Some(Err(e)) => break e.to_string(),
                None => break "stream ended".to_string(),
            };
            if tx.send(event).await.is_err() {
                return;
            }
        };
        let _ = tx.send(TransportEvent::Closed { reason }).await;
    }
}

impl Default for WebSocketTransport {
    fn default() -> Self {
        Self::new()
    }
}

/// Message carrying `frame`: text when it is valid UTF-8, binary otherwise
pub fn frame_message(frame: &[u8]) -> Message {
    match std::str::from_utf8(frame) {
        Ok(text) => Message::Text(text.to_string()),
        Err(_) => Message::Binary(frame.to_vec()),
    }
}

#[async_trait]
impl Transport for WebSocketTransport {
    fn kind(&self) -> TransportKind {
        TransportKind::WebSocket
    }

    async fn open(&mut self, config: &ConnectionConfig) -> Result<IncomingStream> {
        let ConnectionConfig::WebSocket { url } = config else {
            return Err(kind_mismatch(TransportKind::WebSocket, config).into());
        };
        config.validate()?;
        if self.is_open() {
            self.close().await?;
        }

        let url = url.trim().to_string();
        let (stream, _response) = connect_async(url.as_str()).await.map_err(|e| {
            tracing::warn!("WebSocket handshake with {} failed: {}", url, e);
            ConnectionError::HandshakeFailed {
                endpoint: url.clone(),
                reason: e.to_string(),
            }
        })?;
        let (sink, stream) = stream.split();

        let (tx, rx) = mpsc::channel(INCOMING_CHANNEL_CAPACITY);
        self.reader = Some(tokio::spawn(Self::forward(stream, tx)));
        self.sink = Some(sink);
        tracing::info!("Connected to WebSocket {}", url);
        self.url = Some(url);
        Ok(rx)
    }

    async fn write_frame(&mut self, frame: &[u8]) -> Result<()> {
        let sink = self.sink.as_mut().ok_or(ConnectionError::NotOpen)?;
        sink.send(frame_message(frame)).await.map_err(|e| {
            ConnectionError::WriteFailed {
                reason: e.to_string(),
            }
            .into()
        })
    }

    async fn close(&mut self) -> Result<()> {
        if let Some(reader) = self.reader.take() {
            reader.abort();
        }
        if let Some(mut sink) = self.sink.take() {
            if let Err(e) = sink.close().await {
                tracing::debug!("WebSocket close handshake failed: {}", e);
            }
        }
        if let Some(url) = self.url.take() {
            tracing::info!("Closed WebSocket {}", url);
        }
        Ok(())
    }

    fn is_open(&self) -> bool {
        self.sink.is_some()
    }
}

impl Drop for WebSocketTransport {
    fn drop(&mut self) {
        // The socket closes once both halves are gone.
        if let Some(reader) = self.reader.take() {
            reader.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_message_text_or_binary() {
        assert_eq!(frame_message(b"$H\n"), Message::Text("$H\n".to_string()));
        assert_eq!(frame_message(&[0x18]), Message::Text("\u{18}".to_string()));
        assert_eq!(frame_message(&[0xff, 0x00]), Message::Binary(vec![0xff, 0x00]));
    }

    #[tokio::test]
    async fn test_open_rejects_invalid_url() {
        let mut transport = WebSocketTransport::new();
        let err = transport
            .open(&ConnectionConfig::websocket("192.168.1.1/ws"))
            .await
            .unwrap_err();
        assert!(err.is_connection_error());
        assert!(!transport.is_open());
    }

    #[tokio::test]
    async fn test_write_without_open_fails() {
        let mut transport = WebSocketTransport::new();
        assert!(transport.write_frame(b"?").await.unwrap_err().is_not_connected());
    }
}
