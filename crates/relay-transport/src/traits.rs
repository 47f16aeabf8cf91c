//! Channel abstraction traits for Relay.
//!
//! These traits define what the relay core needs from a transport, allowing
//! the core to be transport-agnostic.

use async_trait::async_trait;
use bytes::Bytes;
use thiserror::Error;

/// A data frame carried by a channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    /// UTF-8 text frame.
    Text(String),
    /// Binary frame.
    Binary(Bytes),
}

impl Frame {
    /// Get the frame payload as bytes.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        match self {
            Frame::Text(text) => text.as_bytes(),
            Frame::Binary(data) => data,
        }
    }

    /// Get the payload size in bytes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.as_bytes().len()
    }

    /// Check if the payload is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl From<String> for Frame {
    fn from(text: String) -> Self {
        Frame::Text(text)
    }
}

impl From<&str> for Frame {
    fn from(text: &str) -> Self {
        Frame::Text(text.to_string())
    }
}

/// Handshake-time information about the remote peer. Informational only.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConnectionMetadata {
    /// Remote socket address, if the transport knows it.
    pub remote_address: Option<String>,
    /// `User-Agent` header sent during the handshake.
    pub user_agent: Option<String>,
}

impl ConnectionMetadata {
    /// Create metadata from optional address and user agent.
    #[must_use]
    pub fn new(remote_address: Option<String>, user_agent: Option<String>) -> Self {
        Self {
            remote_address,
            user_agent,
        }
    }
}

/// Transport errors.
#[derive(Debug, Error)]
pub enum TransportError {
    /// Channel was closed.
    #[error("Connection closed")]
    ConnectionClosed,

    /// Failed to send data.
    #[error("Send failed: {0}")]
    SendFailed(String),

    /// Failed to receive data.
    #[error("Receive failed: {0}")]
    ReceiveFailed(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// The write half of an established channel.
#[async_trait]
pub trait FrameSink: Send {
    /// Write one frame.
    async fn send(&mut self, frame: Frame) -> Result<(), TransportError>;

    /// Send the transport's own liveness probe (a WebSocket ping).
    async fn ping(&mut self) -> Result<(), TransportError>;

    /// Close the channel, notifying the peer.
    async fn close(&mut self) -> Result<(), TransportError>;
}

/// The read half of an established channel.
#[async_trait]
pub trait FrameStream: Send {
    /// Receive the next data frame.
    ///
    /// Returns `Ok(None)` when the channel closes cleanly. Control frames are
    /// handled by the transport and never surface here.
    async fn recv(&mut self) -> Result<Option<Frame>, TransportError>;
}
