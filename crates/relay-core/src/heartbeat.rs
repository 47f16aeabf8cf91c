//! Periodic liveness probing.
//!
//! A single process-wide task probes every live connection on each tick
//! instead of one timer per connection.
//!
//! ```text
//!   tick, channel open, probe queued      ──▶ Alive
//!   tick, channel open, probe rejected    ──▶ PendingReap
//!   tick, PendingReap and still present   ──▶ removed
//!   tick, channel not open                ──▶ removed
//! ```

use crate::connection::ConnectionId;
use crate::state::{self, SharedState};
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::broadcast;
use tracing::{debug, info};

/// Default probe interval.
pub const DEFAULT_HEARTBEAT_INTERVAL: Duration = Duration::from_secs(30);

/// Shortest interval the monitor will tick at.
pub const MIN_HEARTBEAT_INTERVAL: Duration = Duration::from_millis(1);

/// Per-connection liveness state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Liveness {
    /// Last probe was queued on an open channel.
    Alive,
    /// Last probe could not be queued; removed on the next tick.
    PendingReap,
}

/// Outcome of one heartbeat tick.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HeartbeatReport {
    /// Connections probed.
    pub probed: usize,
    /// Connections whose probe could not be queued.
    pub pending: usize,
    /// Connections removed this tick.
    pub reaped: usize,
}

/// Probes live connections and reaps the ones whose channel is gone.
pub struct HeartbeatMonitor {
    state: SharedState,
    interval: Duration,
    liveness: HashMap<ConnectionId, Liveness>,
}

impl HeartbeatMonitor {
    /// `interval` is raised to [`MIN_HEARTBEAT_INTERVAL`] if shorter.
    pub(crate) fn new(state: SharedState, interval: Duration) -> Self {
        Self {
            state,
            interval: interval.max(MIN_HEARTBEAT_INTERVAL),
            liveness: HashMap::new(),
        }
    }

    /// The probe interval.
    #[must_use]
    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Tracked liveness of a connection.
    #[must_use]
    pub fn liveness(&self, id: &ConnectionId) -> Option<Liveness> {
        self.liveness.get(id).copied()
    }

    /// Probe every live connection once.
    pub fn tick(&mut self) -> HeartbeatReport {
        let live = self.state.lock().registry.snapshot();
        let mut report = HeartbeatReport::default();
        let mut next = HashMap::with_capacity(live.len());

        for (id, channel) in live {
            let pending = self.liveness.get(&id) == Some(&Liveness::PendingReap);

            if pending || !channel.is_open() {
                if state::disconnect(&self.state, &id) {
                    debug!(connection = %id, "Reaped dead connection");
                    report.reaped += 1;
                }
                continue;
            }

            if channel.probe() {
                report.probed += 1;
                next.insert(id, Liveness::Alive);
            } else {
                report.pending += 1;
                next.insert(id, Liveness::PendingReap);
            }
        }

        // Connections absent from the snapshot are gone; stop tracking them.
        self.liveness = next;
        report
    }

    /// Tick on the configured interval until shutdown is signalled.
    pub async fn run(mut self, mut shutdown: broadcast::Receiver<()>) {
        let mut timer = tokio::time::interval(self.interval);

        // Skip immediate first tick
        timer.tick().await;

        info!(
            interval_ms = self.interval.as_millis() as u64,
            "Heartbeat monitor started"
        );

        loop {
            tokio::select! {
                _ = shutdown.recv() => {
                    debug!("Heartbeat monitor received shutdown signal");
                    break;
                }
                _ = timer.tick() => {
                    let report = self.tick();
                    debug!(
                        probed = report.probed,
                        pending = report.pending,
                        reaped = report.reaped,
                        "Heartbeat round completed"
                    );
                }
            }
        }

        info!("Heartbeat monitor stopped");
    }
}
