//! Aggregate server counters.

use crate::state::SharedState;
use chrono::{DateTime, Utc};
use relay_protocol::StatsSnapshot;
use std::time::Instant;

/// Read-only view over the relay's counters.
///
/// Every counter is mutated as a side effect of registry and dispatch
/// operations; the collector only reads them.
#[derive(Clone)]
pub struct StatsCollector {
    state: SharedState,
    started_at: DateTime<Utc>,
    started: Instant,
}

impl StatsCollector {
    pub(crate) fn new(state: SharedState) -> Self {
        Self {
            state,
            started_at: Utc::now(),
            started: Instant::now(),
        }
    }

    /// Take a consistent snapshot of the counters.
    #[must_use]
    pub fn snapshot(&self) -> StatsSnapshot {
        let state = self.state.lock();
        StatsSnapshot {
            total_connections: state.registry.total_connections(),
            active_connections: state.registry.active_connections(),
            total_messages: state.total_messages,
            total_rooms: state.rooms.len() as u64,
            uptime_seconds: self.started.elapsed().as_secs(),
            start_time: self.started_at,
        }
    }

    /// When the relay started.
    #[must_use]
    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }
}
