//! Envelope types for the Relay protocol.
//!
//! Inbound traffic is modelled as a closed [`Request`] enum with an explicit
//! [`Request::Unknown`] arm. Outbound traffic is an [`Event`] wrapped in an
//! [`Envelope`] that carries the send timestamp and optional room tag.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Request type tags understood by the server.
pub const KNOWN_REQUEST_TYPES: [&str; 5] = ["join", "leave", "broadcast", "ping", "get_stats"];

/// A request sent by a client.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Request {
    /// Join a room, creating it if needed.
    Join {
        /// Room to join.
        room: String,
    },

    /// Leave a room.
    Leave {
        /// Room to leave.
        room: String,
    },

    /// Send `data` to every member of `room`, the sender included.
    Broadcast {
        /// Target room.
        room: String,
        /// Opaque application payload.
        data: serde_json::Value,
    },

    /// Application-level ping.
    Ping,

    /// Ask for a stats snapshot.
    GetStats,

    /// A well-formed envelope with a `type` the server does not handle.
    #[serde(skip_deserializing)]
    Unknown {
        /// The unrecognized type tag.
        kind: String,
    },
}

impl Request {
    /// The wire `type` tag of this request.
    #[must_use]
    pub fn kind(&self) -> &str {
        match self {
            Request::Join { .. } => "join",
            Request::Leave { .. } => "leave",
            Request::Broadcast { .. } => "broadcast",
            Request::Ping => "ping",
            Request::GetStats => "get_stats",
            Request::Unknown { kind } => kind,
        }
    }

    /// Whether `kind` is one of the request types the server handles.
    #[must_use]
    pub fn is_known(kind: &str) -> bool {
        KNOWN_REQUEST_TYPES.contains(&kind)
    }
}

/// Server counters as reported to clients and the HTTP stats endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatsSnapshot {
    /// Connections registered since start.
    pub total_connections: u64,
    /// Connections currently registered.
    pub active_connections: u64,
    /// Successfully parsed inbound envelopes since start.
    pub total_messages: u64,
    /// Rooms that currently have at least one member.
    pub total_rooms: u64,
    /// Whole seconds since the server started.
    pub uptime_seconds: u64,
    /// When the server started.
    pub start_time: DateTime<Utc>,
}

/// The payload of a server-to-client envelope.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    /// Sent once, right after registration.
    Connected {
        #[serde(rename = "clientId")]
        client_id: String,
        message: String,
    },

    /// Acknowledges a `join`.
    Joined,

    /// Acknowledges a `leave`.
    Left,

    /// Another connection joined a room this client is in.
    UserJoined {
        #[serde(rename = "clientId")]
        client_id: String,
    },

    /// Room fan-out of a client `broadcast`.
    Broadcast { data: serde_json::Value },

    /// Reply to `ping`.
    Pong,

    /// Reply to `get_stats`.
    Stats { stats: StatsSnapshot },

    /// Protocol error reply.
    Error { message: String },
}

impl Event {
    /// The wire `type` tag of this event.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Event::Connected { .. } => "connected",
            Event::Joined => "joined",
            Event::Left => "left",
            Event::UserJoined { .. } => "user_joined",
            Event::Broadcast { .. } => "broadcast",
            Event::Pong => "pong",
            Event::Stats { .. } => "stats",
            Event::Error { .. } => "error",
        }
    }
}

/// A server-to-client message.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Envelope {
    /// The event, flattened so its `type` and fields sit at the top level.
    #[serde(flatten)]
    pub event: Event,
    /// Room the envelope is addressed to, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub room: Option<String>,
    /// Time the envelope was built for sending.
    pub timestamp: DateTime<Utc>,
}

impl Envelope {
    /// Wrap an event, stamping it with the current time.
    #[must_use]
    pub fn new(event: Event) -> Self {
        Self {
            event,
            room: None,
            timestamp: Utc::now(),
        }
    }

    /// Tag the envelope with a room.
    #[must_use]
    pub fn in_room(mut self, room: impl Into<String>) -> Self {
        self.room = Some(room.into());
        self
    }

    /// The `connected` greeting for a freshly registered client.
    #[must_use]
    pub fn connected(client_id: impl Into<String>) -> Self {
        Self::new(Event::Connected {
            client_id: client_id.into(),
            message: "Connected to relay server".to_string(),
        })
    }

    /// An `error` reply.
    #[must_use]
    pub fn error(message: impl Into<String>) -> Self {
        Self::new(Event::Error {
            message: message.into(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Value};

    #[test]
    fn test_request_kind() {
        let join = Request::Join {
            room: "lobby".into(),
        };
        assert_eq!(join.kind(), "join");
        assert_eq!(Request::GetStats.kind(), "get_stats");
        assert_eq!(
            Request::Unknown {
                kind: "typing".into()
            }
            .kind(),
            "typing"
        );
    }

    #[test]
    fn test_is_known() {
        assert!(Request::is_known("broadcast"));
        assert!(!Request::is_known("subscribe"));
        assert!(!Request::is_known("Unknown"));
    }

    #[test]
    fn test_envelope_flattens_event() {
        let envelope = Envelope::new(Event::UserJoined {
            client_id: "client_1_abc".into(),
        })
        .in_room("lobby");

        let value: Value = serde_json::to_value(&envelope).unwrap();
        assert_eq!(value["type"], "user_joined");
        assert_eq!(value["clientId"], "client_1_abc");
        assert_eq!(value["room"], "lobby");
        assert!(value["timestamp"].is_string());
    }

    #[test]
    fn test_unit_event_without_room() {
        let value: Value = serde_json::to_value(Envelope::new(Event::Pong)).unwrap();
        let object = value.as_object().unwrap();
        assert_eq!(object.len(), 2);
        assert_eq!(object["type"], "pong");
        assert!(!object.contains_key("room"));
    }

    #[test]
    fn test_stats_snapshot_is_camel_case() {
        let snapshot = StatsSnapshot {
            total_connections: 3,
            active_connections: 2,
            total_messages: 10,
            total_rooms: 1,
            uptime_seconds: 42,
            start_time: Utc::now(),
        };
        let value = serde_json::to_value(&snapshot).unwrap();
        assert_eq!(value["totalConnections"], json!(3));
        assert_eq!(value["activeConnections"], json!(2));
        assert_eq!(value["totalMessages"], json!(10));
        assert_eq!(value["totalRooms"], json!(1));
        assert_eq!(value["uptimeSeconds"], json!(42));
    }
}
