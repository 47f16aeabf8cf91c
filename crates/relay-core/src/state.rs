//! Shared relay state behind a single coarse lock.
//!
//! Every operation that touches both the registry and the room index runs
//! inside one critical section, so the membership invariant is never
//! observable half-updated.

use crate::connection::{ChannelHandle, Connection, ConnectionId};
use crate::registry::ConnectionRegistry;
use crate::rooms::{RoomId, RoomIndex};
use parking_lot::Mutex;
use std::sync::Arc;
use tracing::info;

pub(crate) type SharedState = Arc<Mutex<State>>;

#[derive(Debug, Default)]
pub(crate) struct State {
    pub(crate) registry: ConnectionRegistry,
    pub(crate) rooms: RoomIndex,
    pub(crate) total_messages: u64,
}

impl State {
    /// Join a room on behalf of a registered connection.
    ///
    /// Returns `None` if the connection is gone, otherwise whether the
    /// membership changed.
    pub(crate) fn join(&mut self, id: &ConnectionId, room: &str) -> Option<bool> {
        if !self.registry.contains(id) {
            return None;
        }
        Some(self.rooms.join(id, room))
    }

    /// Leave a room on behalf of a registered connection.
    pub(crate) fn leave(&mut self, id: &ConnectionId, room: &str) -> Option<bool> {
        if !self.registry.contains(id) {
            return None;
        }
        Some(self.rooms.leave(id, room))
    }

    /// Drop a connection from every room, then from the registry.
    pub(crate) fn disconnect(&mut self, id: &ConnectionId) -> Option<(Connection, Vec<RoomId>)> {
        let connection = self.registry.deregister(id)?;
        let rooms = self.rooms.drop_connection(id);
        Some((connection, rooms))
    }

    /// Remove every connection, clearing their memberships.
    pub(crate) fn drain(&mut self) -> Vec<Connection> {
        let connections = self.registry.drain();
        for connection in &connections {
            self.rooms.drop_connection(&connection.id);
        }
        connections
    }

    /// Channels of a room's members, minus `exclude`.
    pub(crate) fn room_channels(&self, room: &str, exclude: Option<&ConnectionId>) -> Vec<ChannelHandle> {
        self.rooms
            .iter_members(room)
            .filter(|id| Some(*id) != exclude)
            .filter_map(|id| self.registry.get(id).map(|c| c.channel.clone()))
            .collect()
    }

    /// Channels of every live connection, minus `exclude`.
    pub(crate) fn all_channels(&self, exclude: Option<&ConnectionId>) -> Vec<ChannelHandle> {
        self.registry
            .snapshot()
            .into_iter()
            .filter(|(id, _)| Some(id) != exclude)
            .map(|(_, channel)| channel)
            .collect()
    }
}

/// The disconnect path shared by sessions, the heartbeat monitor and
/// explicit callers. Idempotent.
pub(crate) fn disconnect(state: &SharedState, id: &ConnectionId) -> bool {
    let mut guard = state.lock();
    let Some((connection, rooms)) = guard.disconnect(id) else {
        return false;
    };
    let active = guard.registry.len();
    drop(guard);

    info!(
        connection = %connection.id,
        rooms = rooms.len(),
        active,
        "Client disconnected"
    );
    true
}
