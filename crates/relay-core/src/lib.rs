//! # relay-core
//!
//! Connection registry, room membership, dispatch and fan-out for the Relay
//! room server.
//!
//! This crate provides the building blocks behind a [`Relay`]:
//!
//! - **ConnectionRegistry** - The canonical set of live connections
//! - **RoomIndex** - Bidirectional room membership
//! - **Dispatcher** - Decodes inbound frames and routes requests
//! - **Broadcaster** - Send to one connection, a room, or everyone
//! - **HeartbeatMonitor** - Periodic liveness probing and reaping
//! - **StatsCollector** - Aggregate counters
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐     ┌─────────────┐     ┌─────────────┐
//! │  Transport  │────▶│ Dispatcher  │────▶│ Broadcaster │
//! └─────────────┘     └─────────────┘     └─────────────┘
//!        │                   │                   │
//!        ▼                   ▼                   ▼
//! ┌──────────────────────────────────────────────────────┐
//! │     ConnectionRegistry + RoomIndex (single lock)     │
//! └──────────────────────────────────────────────────────┘
//!        ▲                   ▲
//! ┌─────────────┐     ┌─────────────┐
//! │  Heartbeat  │     │    Stats    │
//! └─────────────┘     └─────────────┘
//! ```

pub mod broadcast;
pub mod connection;
pub mod dispatch;
pub mod heartbeat;
pub mod registry;
pub mod relay;
pub mod rooms;
mod state;
pub mod stats;

pub use broadcast::Broadcaster;
pub use connection::{ChannelHandle, Connection, ConnectionId};
pub use dispatch::{Dispatched, Dispatcher};
pub use heartbeat::{
    HeartbeatMonitor, HeartbeatReport, Liveness, DEFAULT_HEARTBEAT_INTERVAL,
    MIN_HEARTBEAT_INTERVAL,
};
pub use registry::ConnectionRegistry;
pub use relay::{Relay, SessionEnd};
pub use rooms::{RoomId, RoomIndex};
pub use stats::StatsCollector;
