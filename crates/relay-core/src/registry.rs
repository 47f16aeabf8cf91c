//! The canonical set of live connections.

use crate::connection::{ChannelHandle, Connection, ConnectionId};
use relay_transport::ConnectionMetadata;
use std::collections::HashMap;
use tokio::task::JoinHandle;

/// Registry of live connections and the connection counters.
///
/// The registry is not internally synchronized; it lives inside the relay's
/// single state lock together with the [`RoomIndex`](crate::RoomIndex).
#[derive(Debug, Default)]
pub struct ConnectionRegistry {
    connections: HashMap<ConnectionId, Connection>,
    total_connections: u64,
}

impl ConnectionRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a new connection under a freshly generated ID.
    pub fn register(&mut self, channel: ChannelHandle, metadata: ConnectionMetadata) -> ConnectionId {
        let mut id = ConnectionId::generate();
        while self.connections.contains_key(&id) {
            id = ConnectionId::generate();
        }

        self.connections
            .insert(id.clone(), Connection::new(id.clone(), channel, metadata));
        self.total_connections += 1;
        id
    }

    /// Attach the writer task that drains the connection's channel.
    pub(crate) fn attach_writer(&mut self, id: &ConnectionId, writer: JoinHandle<()>) {
        if let Some(connection) = self.connections.get_mut(id) {
            connection.writer = Some(writer);
        }
    }

    /// Look up a connection. `None` means it is already gone.
    #[must_use]
    pub fn get(&self, id: &ConnectionId) -> Option<&Connection> {
        self.connections.get(id)
    }

    /// Check if a connection is registered.
    #[must_use]
    pub fn contains(&self, id: &ConnectionId) -> bool {
        self.connections.contains_key(id)
    }

    /// Remove a connection. Removing an absent ID is a no-op.
    pub fn deregister(&mut self, id: &ConnectionId) -> Option<Connection> {
        self.connections.remove(id)
    }

    /// Remove every connection.
    pub(crate) fn drain(&mut self) -> Vec<Connection> {
        self.connections.drain().map(|(_, c)| c).collect()
    }

    /// Point-in-time copy of every live connection's channel.
    ///
    /// Callers iterate the copy after releasing the lock, so the iteration
    /// tolerates deregistrations it triggers itself.
    #[must_use]
    pub fn snapshot(&self) -> Vec<(ConnectionId, ChannelHandle)> {
        self.connections
            .iter()
            .map(|(id, c)| (id.clone(), c.channel.clone()))
            .collect()
    }

    /// Number of live connections.
    #[must_use]
    pub fn len(&self) -> usize {
        self.connections.len()
    }

    /// Check if no connection is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }

    /// Connections registered since creation. Never decreases.
    #[must_use]
    pub fn total_connections(&self) -> u64 {
        self.total_connections
    }

    /// Connections currently registered.
    #[must_use]
    pub fn active_connections(&self) -> u64 {
        self.connections.len() as u64
    }
}
