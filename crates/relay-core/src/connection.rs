//! Connection identity and the write side of a connection's channel.
//!
//! Every registered connection owns a [`ChannelHandle`]: an outbound queue
//! drained by a dedicated writer task that holds the transport sink. Sends
//! never block the caller and report success as a plain `bool`.

use chrono::{DateTime, Utc};
use rand::Rng;
use relay_transport::{ConnectionMetadata, Frame, FrameSink};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, trace};

const ID_ALPHABET: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";
const ID_SUFFIX_LEN: usize = 9;

/// Unique identifier for a connection.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(String);

impl ConnectionId {
    /// Create a connection ID from an existing string.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Generate an ID of the form `client_<unix millis>_<random base36>`.
    #[must_use]
    pub fn generate() -> Self {
        let mut rng = rand::thread_rng();
        let suffix: String = (0..ID_SUFFIX_LEN)
            .map(|_| ID_ALPHABET[rng.gen_range(0..ID_ALPHABET.len())] as char)
            .collect();
        Self(format!("client_{}_{}", Utc::now().timestamp_millis(), suffix))
    }

    /// Get the ID as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for ConnectionId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for ConnectionId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// Work items for a connection's writer task.
#[derive(Debug)]
pub(crate) enum Outgoing {
    Text(Arc<str>),
    Probe,
    Close,
}

/// Cloneable handle to the write side of a connection's channel.
#[derive(Debug, Clone)]
pub struct ChannelHandle {
    tx: mpsc::UnboundedSender<Outgoing>,
    open: Arc<AtomicBool>,
}

impl ChannelHandle {
    pub(crate) fn new() -> (Self, mpsc::UnboundedReceiver<Outgoing>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let handle = Self {
            tx,
            open: Arc::new(AtomicBool::new(true)),
        };
        (handle, rx)
    }

    /// Whether the channel is still in a ready-to-write state.
    #[must_use]
    pub fn is_open(&self) -> bool {
        self.open.load(Ordering::SeqCst) && !self.tx.is_closed()
    }

    /// Queue an encoded text frame. Returns `false` if the channel is not open.
    pub(crate) fn send_text(&self, text: Arc<str>) -> bool {
        self.is_open() && self.tx.send(Outgoing::Text(text)).is_ok()
    }

    /// Queue a transport liveness probe.
    pub(crate) fn probe(&self) -> bool {
        self.is_open() && self.tx.send(Outgoing::Probe).is_ok()
    }

    /// The flag the writer task clears when the channel stops accepting writes.
    pub(crate) fn open_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.open)
    }

    /// Ask the writer to flush what is queued and close the channel.
    pub(crate) fn close(&self) -> bool {
        let queued = self.tx.send(Outgoing::Close).is_ok();
        self.open.store(false, Ordering::SeqCst);
        queued
    }
}

/// Drain a connection's outbound queue into its sink.
///
/// Stops on the first write failure, on an explicit close, or when every
/// handle has been dropped. The sink is closed on the way out.
pub(crate) async fn write_loop<S: FrameSink>(
    id: ConnectionId,
    mut sink: S,
    mut outgoing: mpsc::UnboundedReceiver<Outgoing>,
    open: Arc<AtomicBool>,
) {
    while let Some(item) = outgoing.recv().await {
        let result = match item {
            Outgoing::Text(text) => sink.send(Frame::Text(text.to_string())).await,
            Outgoing::Probe => {
                trace!(connection = %id, "Probing channel");
                sink.ping().await
            }
            Outgoing::Close => break,
        };

        if let Err(e) = result {
            debug!(connection = %id, error = %e, "Channel write failed");
            break;
        }
    }

    open.store(false, Ordering::SeqCst);
    outgoing.close();

    if let Err(e) = sink.close().await {
        debug!(connection = %id, error = %e, "Channel close failed");
    }
}

/// A registered connection.
#[derive(Debug)]
pub struct Connection {
    /// Connection identifier.
    pub id: ConnectionId,
    /// Remote address captured at handshake time.
    pub remote_address: Option<String>,
    /// User agent captured at handshake time.
    pub user_agent: Option<String>,
    /// When the connection was registered.
    pub connected_at: DateTime<Utc>,
    pub(crate) channel: ChannelHandle,
    pub(crate) writer: Option<JoinHandle<()>>,
}

impl Connection {
    pub(crate) fn new(id: ConnectionId, channel: ChannelHandle, metadata: ConnectionMetadata) -> Self {
        Self {
            id,
            remote_address: metadata.remote_address,
            user_agent: metadata.user_agent,
            connected_at: Utc::now(),
            channel,
            writer: None,
        }
    }

    /// The connection's channel handle.
    #[must_use]
    pub fn channel(&self) -> &ChannelHandle {
        &self.channel
    }
}
