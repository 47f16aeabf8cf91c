//! Fan-out send primitives.
//!
//! Recipients are resolved under the state lock, the lock is released, and
//! only then are frames queued. A payload is encoded once per fan-out and
//! shared between recipients.

use crate::connection::{ChannelHandle, ConnectionId};
use crate::state::SharedState;
use relay_protocol::{codec, Envelope};
use std::sync::Arc;
use tracing::{trace, warn};

/// Sends envelopes to one connection, a room, or everyone.
#[derive(Clone)]
pub struct Broadcaster {
    state: SharedState,
}

impl Broadcaster {
    pub(crate) fn new(state: SharedState) -> Self {
        Self { state }
    }

    /// Send to a single connection.
    ///
    /// Returns `false`, without I/O, if the connection is gone or its channel
    /// is not open. A failed send never deregisters the connection.
    pub fn to_one(&self, id: &ConnectionId, envelope: &Envelope) -> bool {
        let channel = self
            .state
            .lock()
            .registry
            .get(id)
            .map(|c| c.channel.clone());

        let Some(channel) = channel else {
            trace!(connection = %id, "Send to unknown connection");
            return false;
        };

        if !channel.is_open() {
            return false;
        }

        match encode(envelope) {
            Some(text) => channel.send_text(text),
            None => false,
        }
    }

    /// Send to every member of a room except `exclude`, tagging the envelope
    /// with the room.
    ///
    /// Returns the number of members the envelope was delivered to.
    pub fn to_room(&self, room: &str, envelope: Envelope, exclude: Option<&ConnectionId>) -> usize {
        let recipients = self.state.lock().room_channels(room, exclude);
        if recipients.is_empty() {
            return 0;
        }

        let Some(text) = encode(&envelope.in_room(room)) else {
            return 0;
        };
        let delivered = deliver(&recipients, &text);

        trace!(
            room = %room,
            recipients = recipients.len(),
            delivered,
            "Room fan-out"
        );
        delivered
    }

    /// Send to every live connection except `exclude`.
    pub fn to_all(&self, envelope: &Envelope, exclude: Option<&ConnectionId>) -> usize {
        let recipients = self.state.lock().all_channels(exclude);
        if recipients.is_empty() {
            return 0;
        }

        let Some(text) = encode(envelope) else {
            return 0;
        };
        let delivered = deliver(&recipients, &text);

        trace!(recipients = recipients.len(), delivered, "Global fan-out");
        delivered
    }
}

fn encode(envelope: &Envelope) -> Option<Arc<str>> {
    match codec::encode(envelope) {
        Ok(text) => Some(Arc::from(text)),
        Err(e) => {
            warn!(error = %e, kind = envelope.event.kind(), "Failed to encode envelope");
            None
        }
    }
}

fn deliver(recipients: &[ChannelHandle], text: &Arc<str>) -> usize {
    recipients
        .iter()
        .filter(|channel| channel.send_text(Arc::clone(text)))
        .count()
}
