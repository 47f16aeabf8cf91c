//! axum WebSocket adapter.
//!
//! Splits an upgraded [`WebSocket`] into the [`FrameSink`] / [`FrameStream`]
//! halves the relay consumes. Ping and pong control frames are answered by
//! the underlying WebSocket implementation and filtered out here.

use async_trait::async_trait;
use ::axum::extract::ws::{Message, WebSocket};
use bytes::Bytes;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tracing::debug;

use crate::traits::{Frame, FrameSink, FrameStream, TransportError};

/// Split an upgraded socket into its write and read halves.
#[must_use]
pub fn split(socket: WebSocket) -> (WsSink, WsStream) {
    let (sink, stream) = socket.split();
    (WsSink { inner: sink }, WsStream { inner: stream })
}

/// Write half of an axum WebSocket.
pub struct WsSink {
    inner: SplitSink<WebSocket, Message>,
}

#[async_trait]
impl FrameSink for WsSink {
    async fn send(&mut self, frame: Frame) -> Result<(), TransportError> {
        let message = match frame {
            Frame::Text(text) => Message::Text(text),
            Frame::Binary(data) => Message::Binary(data.to_vec()),
        };
        self.inner
            .send(message)
            .await
            .map_err(|e| TransportError::SendFailed(e.to_string()))
    }

    async fn ping(&mut self) -> Result<(), TransportError> {
        self.inner
            .send(Message::Ping(Vec::new()))
            .await
            .map_err(|e| TransportError::SendFailed(e.to_string()))
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        self.inner
            .close()
            .await
            .map_err(|e| TransportError::SendFailed(format!("Failed to close: {}", e)))
    }
}

/// Read half of an axum WebSocket.
pub struct WsStream {
    inner: SplitStream<WebSocket>,
}

#[async_trait]
impl FrameStream for WsStream {
    async fn recv(&mut self) -> Result<Option<Frame>, TransportError> {
        loop {
            match self.inner.next().await {
                Some(Ok(Message::Text(text))) => return Ok(Some(Frame::Text(text))),
                Some(Ok(Message::Binary(data))) => return Ok(Some(Frame::Binary(Bytes::from(data)))),
                Some(Ok(Message::Ping(_))) | Some(Ok(Message::Pong(_))) => {
                    // Control frames, answered by the socket itself
                }
                Some(Ok(Message::Close(_))) => {
                    debug!("Received close frame");
                    return Ok(None);
                }
                Some(Err(e)) => return Err(TransportError::ReceiveFailed(e.to_string())),
                None => {
                    debug!("WebSocket stream ended");
                    return Ok(None);
                }
            }
        }
    }
}
