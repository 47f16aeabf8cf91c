//! The relay server object.
//!
//! A [`Relay`] is constructed once at process start and shared by handle
//! with whatever accepts transport channels. It owns the registry and room
//! index (behind one lock) and wires the dispatcher, broadcaster, stats
//! collector and heartbeat monitor to them.

use crate::broadcast::Broadcaster;
use crate::connection::{write_loop, ChannelHandle, ConnectionId};
use crate::dispatch::Dispatcher;
use crate::heartbeat::HeartbeatMonitor;
use crate::rooms::RoomId;
use crate::state::{self, SharedState};
use crate::stats::StatsCollector;
use futures_util::future::join_all;
use relay_protocol::{Envelope, StatsSnapshot};
use relay_transport::{ConnectionMetadata, FrameSink, FrameStream, TransportError};
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{info, warn};

/// Why a connection's session ended.
#[derive(Debug)]
pub enum SessionEnd {
    /// The peer closed the channel.
    Closed,
    /// The transport reported an error.
    Failed(TransportError),
    /// The relay is shutting down.
    Shutdown,
}

/// The relay server.
pub struct Relay {
    state: SharedState,
    broadcaster: Broadcaster,
    dispatcher: Dispatcher,
    stats: StatsCollector,
    shutdown: broadcast::Sender<()>,
    closing: AtomicBool,
}

impl Relay {
    /// Create a relay with empty state.
    #[must_use]
    pub fn new() -> Self {
        let state = SharedState::default();
        let broadcaster = Broadcaster::new(state.clone());
        let stats = StatsCollector::new(state.clone());
        let dispatcher = Dispatcher::new(state.clone(), broadcaster.clone(), stats.clone());
        let (shutdown, _) = broadcast::channel(1);

        Self {
            state,
            broadcaster,
            dispatcher,
            stats,
            shutdown,
            closing: AtomicBool::new(false),
        }
    }

    /// Fan-out primitives.
    #[must_use]
    pub fn broadcaster(&self) -> &Broadcaster {
        &self.broadcaster
    }

    /// Inbound frame dispatcher.
    #[must_use]
    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    /// Current counters.
    #[must_use]
    pub fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }

    /// Register a channel and greet it with its connection ID.
    ///
    /// Spawns the writer task that owns `sink`.
    pub fn register<S>(&self, sink: S, metadata: ConnectionMetadata) -> ConnectionId
    where
        S: FrameSink + 'static,
    {
        let (channel, outgoing) = ChannelHandle::new();
        let open = channel.open_flag();
        let remote = metadata.remote_address.clone();

        let mut guard = self.state.lock();
        let id = guard.registry.register(channel, metadata);
        let writer = tokio::spawn(write_loop(id.clone(), sink, outgoing, open));
        guard.registry.attach_writer(&id, writer);
        let active = guard.registry.len();
        drop(guard);

        info!(
            connection = %id,
            remote = remote.as_deref().unwrap_or("unknown"),
            active,
            "Client connected"
        );

        self.broadcaster.to_one(&id, &Envelope::connected(id.as_str()));
        id
    }

    /// Run a connection from registration to deregistration.
    ///
    /// Inbound frames are dispatched in arrival order. The session ends when
    /// the peer closes, the transport fails, or the relay shuts down; in
    /// every case the connection is deregistered before returning.
    pub async fn serve<S, R>(&self, sink: S, mut stream: R, metadata: ConnectionMetadata) -> SessionEnd
    where
        S: FrameSink + 'static,
        R: FrameStream,
    {
        let mut shutdown = self.shutdown.subscribe();
        if self.closing.load(Ordering::SeqCst) {
            return SessionEnd::Shutdown;
        }

        let id = self.register(sink, metadata);

        let end = loop {
            tokio::select! {
                biased;
                _ = shutdown.recv() => break SessionEnd::Shutdown,
                received = stream.recv() => match received {
                    Ok(Some(frame)) => {
                        self.dispatcher.dispatch(&id, frame.as_bytes());
                    }
                    Ok(None) => break SessionEnd::Closed,
                    Err(e) => {
                        warn!(connection = %id, error = %e, "Transport error");
                        break SessionEnd::Failed(e);
                    }
                },
            }
        };

        self.disconnect(&id);
        end
    }

    /// Deregister a connection and drop it from every room.
    ///
    /// Returns `false` if it was already gone.
    pub fn disconnect(&self, id: &ConnectionId) -> bool {
        state::disconnect(&self.state, id)
    }

    /// Check if a connection is registered.
    #[must_use]
    pub fn is_connected(&self, id: &ConnectionId) -> bool {
        self.state.lock().registry.contains(id)
    }

    /// Number of live connections.
    #[must_use]
    pub fn connection_count(&self) -> usize {
        self.state.lock().registry.len()
    }

    /// Number of rooms.
    #[must_use]
    pub fn room_count(&self) -> usize {
        self.state.lock().rooms.len()
    }

    /// Members of a room.
    #[must_use]
    pub fn members_of(&self, room: &str) -> HashSet<ConnectionId> {
        self.state.lock().rooms.members_of(room)
    }

    /// Rooms a connection belongs to.
    #[must_use]
    pub fn rooms_of(&self, id: &ConnectionId) -> HashSet<RoomId> {
        self.state.lock().rooms.rooms_of(id)
    }

    /// Visit a point-in-time snapshot of live connections.
    ///
    /// The lock is released before `f` runs, so `f` may disconnect.
    pub fn for_each_connection(&self, mut f: impl FnMut(&ConnectionId, &ChannelHandle)) {
        let snapshot = self.state.lock().registry.snapshot();
        for (id, channel) in &snapshot {
            f(id, channel);
        }
    }

    /// Build a heartbeat monitor over this relay's connections.
    #[must_use]
    pub fn heartbeat(&self, interval: Duration) -> HeartbeatMonitor {
        HeartbeatMonitor::new(self.state.clone(), interval)
    }

    /// Start the heartbeat monitor; it stops on [`Relay::shutdown`].
    pub fn spawn_heartbeat(&self, interval: Duration) -> JoinHandle<()> {
        let monitor = self.heartbeat(interval);
        tokio::spawn(monitor.run(self.shutdown.subscribe()))
    }

    /// Subscribe to the shutdown signal.
    #[must_use]
    pub fn subscribe_shutdown(&self) -> broadcast::Receiver<()> {
        self.shutdown.subscribe()
    }

    /// Close every connection and stop background tasks.
    ///
    /// Each channel gets a close request after whatever is already queued
    /// for it. Waits at most `timeout` for the channels to close; a channel
    /// that does not close in time is abandoned without holding up the rest.
    /// Returns the number of connections that were closed.
    pub async fn shutdown(&self, timeout: Duration) -> usize {
        if self.closing.swap(true, Ordering::SeqCst) {
            return 0;
        }
        let _ = self.shutdown.send(());

        let connections = self.state.lock().drain();
        let count = connections.len();
        info!(connections = count, "Closing all connections");

        let mut writers = Vec::with_capacity(count);
        for mut connection in connections {
            connection.channel.close();
            if let Some(writer) = connection.writer.take() {
                writers.push(writer);
            }
        }

        let aborts: Vec<_> = writers.iter().map(JoinHandle::abort_handle).collect();
        if tokio::time::timeout(timeout, join_all(writers)).await.is_err() {
            warn!(
                timeout_ms = timeout.as_millis() as u64,
                "Timed out waiting for channels to close"
            );
            for abort in aborts {
                abort.abort();
            }
        }

        info!("Relay stopped");
        count
    }
}

impl Default for Relay {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use relay_transport::{memory, Frame};
    use serde_json::Value;
    use std::time::Instant;

    /// A sink whose writes and close never complete.
    struct StuckSink;

    #[async_trait]
    impl FrameSink for StuckSink {
        async fn send(&mut self, _frame: Frame) -> Result<(), TransportError> {
            std::future::pending().await
        }

        async fn ping(&mut self) -> Result<(), TransportError> {
            std::future::pending().await
        }

        async fn close(&mut self) -> Result<(), TransportError> {
            std::future::pending().await
        }
    }

    fn json(frame: Frame) -> Value {
        serde_json::from_slice(frame.as_bytes()).unwrap()
    }

    #[tokio::test]
    async fn test_register_sends_connected() {
        let relay = Relay::new();
        let (sink, _stream, mut peer) = memory::channel();

        let id = relay.register(sink, ConnectionMetadata::default());
        let greeting = json(peer.recv().await.unwrap());

        assert_eq!(greeting["type"], "connected");
        assert_eq!(greeting["clientId"], id.as_str());
        assert!(greeting["timestamp"].is_string());
        assert_eq!(relay.stats().active_connections, 1);
    }

    #[tokio::test]
    async fn test_serve_deregisters_on_hang_up() {
        let relay = Relay::new();
        let (sink, stream, mut peer) = memory::channel();

        peer.send(r#"{"type":"join","room":"lobby"}"#);
        peer.hang_up();

        let end = relay.serve(sink, stream, ConnectionMetadata::default()).await;
        assert!(matches!(end, SessionEnd::Closed));
        assert_eq!(relay.connection_count(), 0);
        assert_eq!(relay.room_count(), 0);

        let stats = relay.stats();
        assert_eq!(stats.total_connections, 1);
        assert_eq!(stats.total_messages, 1);
    }

    #[tokio::test]
    async fn test_serve_deregisters_on_transport_error() {
        let relay = Relay::new();
        let (sink, stream, peer) = memory::channel();

        peer.fail("connection reset");
        let end = relay.serve(sink, stream, ConnectionMetadata::default()).await;

        assert!(matches!(end, SessionEnd::Failed(TransportError::ReceiveFailed(_))));
        assert_eq!(relay.connection_count(), 0);
    }

    #[tokio::test]
    async fn test_for_each_tolerates_disconnect() {
        let relay = Relay::new();
        let (a, _sa, _pa) = memory::channel();
        let (b, _sb, _pb) = memory::channel();
        relay.register(a, ConnectionMetadata::default());
        relay.register(b, ConnectionMetadata::default());

        let mut visited = 0;
        relay.for_each_connection(|id, _| {
            visited += 1;
            relay.disconnect(id);
        });

        assert_eq!(visited, 2);
        assert_eq!(relay.connection_count(), 0);
    }

    #[tokio::test]
    async fn test_shutdown_closes_every_channel() {
        let relay = Relay::new();
        let (a, _sa, mut pa) = memory::channel();
        let (b, _sb, pb) = memory::channel();
        relay.register(a, ConnectionMetadata::default());
        relay.register(b, ConnectionMetadata::default());

        let closed = relay.shutdown(Duration::from_secs(1)).await;

        assert_eq!(closed, 2);
        assert!(pa.is_closed());
        assert!(pb.is_closed());
        assert_eq!(relay.connection_count(), 0);
        // The greeting queued before shutdown is still flushed.
        assert_eq!(json(pa.recv().await.unwrap())["type"], "connected");

        assert_eq!(relay.shutdown(Duration::from_secs(1)).await, 0);
    }

    #[tokio::test]
    async fn test_shutdown_abandons_stuck_channel() {
        let relay = Relay::new();
        relay.register(StuckSink, ConnectionMetadata::default());
        let (healthy, _stream, peer) = memory::channel();
        relay.register(healthy, ConnectionMetadata::default());

        let started = Instant::now();
        let closed = relay.shutdown(Duration::from_millis(200)).await;
        let elapsed = started.elapsed();

        assert_eq!(closed, 2);
        assert!(elapsed >= Duration::from_millis(200));
        assert!(elapsed < Duration::from_secs(2), "took {elapsed:?}");
        assert!(peer.is_closed());
        assert_eq!(relay.connection_count(), 0);
    }

    #[tokio::test]
    async fn test_serve_after_shutdown_is_refused() {
        let relay = Relay::new();
        relay.shutdown(Duration::from_millis(10)).await;

        let (sink, stream, _peer) = memory::channel();
        let end = relay.serve(sink, stream, ConnectionMetadata::default()).await;
        assert!(matches!(end, SessionEnd::Shutdown));
        assert_eq!(relay.stats().total_connections, 0);
    }
}
