//! In-process channel transport.
//!
//! [`channel`] returns the two halves the relay consumes plus a
//! [`MemoryPeer`] standing in for the remote client. Closing the sink ends
//! the stream, the way a WebSocket close handshake would.

use async_trait::async_trait;
use bytes::Bytes;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, Notify};

use crate::traits::{Frame, FrameSink, FrameStream, TransportError};

#[derive(Debug, Default)]
struct Shared {
    closed: AtomicBool,
    broken: AtomicBool,
    pings: AtomicUsize,
    close_notify: Notify,
}

/// Create a connected in-memory channel.
#[must_use]
pub fn channel() -> (MemorySink, MemoryStream, MemoryPeer) {
    let (to_peer, from_server) = mpsc::unbounded_channel();
    let (to_server, from_peer) = mpsc::unbounded_channel();
    let shared = Arc::new(Shared::default());

    let sink = MemorySink {
        outbound: to_peer,
        shared: Arc::clone(&shared),
    };
    let stream = MemoryStream {
        inbound: from_peer,
        shared: Arc::clone(&shared),
    };
    let peer = MemoryPeer {
        inbound: Some(to_server),
        outbound: from_server,
        shared,
    };

    (sink, stream, peer)
}

/// Server-side write half.
#[derive(Debug)]
pub struct MemorySink {
    outbound: mpsc::UnboundedSender<Frame>,
    shared: Arc<Shared>,
}

impl MemorySink {
    fn check_writable(&self) -> Result<(), TransportError> {
        if self.shared.closed.load(Ordering::SeqCst) {
            return Err(TransportError::ConnectionClosed);
        }
        if self.shared.broken.load(Ordering::SeqCst) {
            return Err(TransportError::SendFailed("broken pipe".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl FrameSink for MemorySink {
    async fn send(&mut self, frame: Frame) -> Result<(), TransportError> {
        self.check_writable()?;
        self.outbound
            .send(frame)
            .map_err(|_| TransportError::ConnectionClosed)
    }

    async fn ping(&mut self) -> Result<(), TransportError> {
        self.check_writable()?;
        self.shared.pings.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        if !self.shared.closed.swap(true, Ordering::SeqCst) {
            self.shared.close_notify.notify_one();
        }
        Ok(())
    }
}

/// Server-side read half.
#[derive(Debug)]
pub struct MemoryStream {
    inbound: mpsc::UnboundedReceiver<Result<Frame, TransportError>>,
    shared: Arc<Shared>,
}

#[async_trait]
impl FrameStream for MemoryStream {
    async fn recv(&mut self) -> Result<Option<Frame>, TransportError> {
        if self.shared.closed.load(Ordering::SeqCst) {
            return Ok(None);
        }

        tokio::select! {
            received = self.inbound.recv() => match received {
                Some(Ok(frame)) => Ok(Some(frame)),
                Some(Err(e)) => Err(e),
                None => Ok(None),
            },
            _ = self.shared.close_notify.notified() => Ok(None),
        }
    }
}

/// The remote end of an in-memory channel.
#[derive(Debug)]
pub struct MemoryPeer {
    inbound: Option<mpsc::UnboundedSender<Result<Frame, TransportError>>>,
    outbound: mpsc::UnboundedReceiver<Frame>,
    shared: Arc<Shared>,
}

impl MemoryPeer {
    /// Send a frame to the server. Returns `false` once the peer hung up or
    /// the server stopped reading.
    pub fn send(&self, frame: impl Into<Frame>) -> bool {
        match &self.inbound {
            Some(tx) => tx.send(Ok(frame.into())).is_ok(),
            None => false,
        }
    }

    /// Send a binary frame to the server.
    pub fn send_binary(&self, data: impl Into<Bytes>) -> bool {
        self.send(Frame::Binary(data.into()))
    }

    /// Make the server's next read fail with a transport error.
    pub fn fail(&self, reason: impl Into<String>) -> bool {
        match &self.inbound {
            Some(tx) => tx
                .send(Err(TransportError::ReceiveFailed(reason.into())))
                .is_ok(),
            None => false,
        }
    }

    /// Close the peer's side cleanly; the server's stream ends.
    pub fn hang_up(&mut self) {
        self.inbound = None;
    }

    /// Make every subsequent server write and ping fail.
    pub fn break_pipe(&self) {
        self.shared.broken.store(true, Ordering::SeqCst);
    }

    /// Wait for the next frame written by the server.
    pub async fn recv(&mut self) -> Option<Frame> {
        self.outbound.recv().await
    }

    /// Take the next frame written by the server, if one is queued.
    pub fn try_recv(&mut self) -> Option<Frame> {
        self.outbound.try_recv().ok()
    }

    /// Number of liveness probes the server has sent.
    #[must_use]
    pub fn pings(&self) -> usize {
        self.shared.pings.load(Ordering::SeqCst)
    }

    /// Whether the server has closed the channel.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.shared.closed.load(Ordering::SeqCst)
    }
}
