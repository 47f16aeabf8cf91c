//! Room membership.
//!
//! Rooms are named groups of connections, created on first join and deleted
//! as soon as their last member leaves.

use crate::connection::ConnectionId;
use std::collections::{HashMap, HashSet};
use tracing::debug;

/// A room identifier.
pub type RoomId = String;

/// Bidirectional room membership index.
///
/// Owns both directions of the relation (room to members and connection to
/// rooms) and keeps them consistent: `r ∈ rooms_of(c)` exactly when
/// `c ∈ members_of(r)`. A room present in the index always has at least one
/// member.
#[derive(Debug, Default)]
pub struct RoomIndex {
    members: HashMap<RoomId, HashSet<ConnectionId>>,
    memberships: HashMap<ConnectionId, HashSet<RoomId>>,
}

impl RoomIndex {
    /// Create an empty index.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a connection to a room, creating the room if needed.
    ///
    /// Returns `false` if the connection was already a member.
    pub fn join(&mut self, connection_id: &ConnectionId, room: &str) -> bool {
        let joined = self
            .members
            .entry(room.to_string())
            .or_default()
            .insert(connection_id.clone());

        if joined {
            self.memberships
                .entry(connection_id.clone())
                .or_default()
                .insert(room.to_string());
            debug!(room = %room, connection = %connection_id, "Joined room");
        }

        joined
    }

    /// Remove a connection from a room, deleting the room once empty.
    ///
    /// Returns `false` if the connection was not a member.
    pub fn leave(&mut self, connection_id: &ConnectionId, room: &str) -> bool {
        let Some(members) = self.members.get_mut(room) else {
            return false;
        };

        if !members.remove(connection_id) {
            return false;
        }

        if members.is_empty() {
            self.members.remove(room);
            debug!(room = %room, "Deleted empty room");
        }

        if let Some(rooms) = self.memberships.get_mut(connection_id) {
            rooms.remove(room);
            if rooms.is_empty() {
                self.memberships.remove(connection_id);
            }
        }

        debug!(room = %room, connection = %connection_id, "Left room");
        true
    }

    /// Members of a room. Empty if the room does not exist.
    #[must_use]
    pub fn members_of(&self, room: &str) -> HashSet<ConnectionId> {
        self.members.get(room).cloned().unwrap_or_default()
    }

    /// Iterate the members of a room without copying.
    pub(crate) fn iter_members<'a>(&'a self, room: &str) -> impl Iterator<Item = &'a ConnectionId> + 'a {
        self.members.get(room).into_iter().flatten()
    }

    /// Rooms a connection belongs to. Empty if it has none.
    #[must_use]
    pub fn rooms_of(&self, connection_id: &ConnectionId) -> HashSet<RoomId> {
        self.memberships
            .get(connection_id)
            .cloned()
            .unwrap_or_default()
    }

    /// Remove a connection from every room it belongs to.
    ///
    /// Returns the rooms it left. Safe to call for a connection without rooms.
    pub fn drop_connection(&mut self, connection_id: &ConnectionId) -> Vec<RoomId> {
        let Some(rooms) = self.memberships.remove(connection_id) else {
            return Vec::new();
        };

        for room in &rooms {
            if let Some(members) = self.members.get_mut(room) {
                members.remove(connection_id);
                if members.is_empty() {
                    self.members.remove(room);
                    debug!(room = %room, "Deleted empty room");
                }
            }
        }

        debug!(connection = %connection_id, rooms = rooms.len(), "Dropped from all rooms");
        rooms.into_iter().collect()
    }

    /// Check if a room exists.
    #[must_use]
    pub fn contains(&self, room: &str) -> bool {
        self.members.contains_key(room)
    }

    /// Number of rooms.
    #[must_use]
    pub fn len(&self) -> usize {
        self.members.len()
    }

    /// Check if there are no rooms.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }
}
