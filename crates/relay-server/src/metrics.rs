//! Prometheus metrics for the relay server.
//!
//! Connection counts are recorded per WebSocket session; room and message
//! counts are synced from [`StatsSnapshot`] on a timer.

use anyhow::Result;
use metrics::{counter, gauge};
use metrics_exporter_prometheus::PrometheusBuilder;
use relay_protocol::StatsSnapshot;
use std::net::SocketAddr;
use tracing::info;

/// Metric names.
pub mod names {
    pub const CONNECTIONS_TOTAL: &str = "relay_connections_total";
    pub const CONNECTIONS_ACTIVE: &str = "relay_connections_active";
    pub const MESSAGES_TOTAL: &str = "relay_messages_total";
    pub const ROOMS_ACTIVE: &str = "relay_rooms_active";
    pub const UPTIME_SECONDS: &str = "relay_uptime_seconds";
    pub const SESSIONS_ENDED_TOTAL: &str = "relay_sessions_ended_total";
}

/// Describe every metric the server records.
pub fn init_metrics() {
    metrics::describe_counter!(
        names::CONNECTIONS_TOTAL,
        "Total number of WebSocket sessions since server start"
    );
    metrics::describe_gauge!(
        names::CONNECTIONS_ACTIVE,
        "Current number of open WebSocket sessions"
    );
    metrics::describe_counter!(
        names::MESSAGES_TOTAL,
        "Total number of well-formed client messages"
    );
    metrics::describe_gauge!(names::ROOMS_ACTIVE, "Current number of rooms");
    metrics::describe_gauge!(names::UPTIME_SECONDS, "Seconds since the relay started");
    metrics::describe_counter!(
        names::SESSIONS_ENDED_TOTAL,
        "Sessions ended, by reason"
    );

    info!("Metrics initialized");
}

/// Start the Prometheus exporter.
///
/// # Errors
///
/// Returns an error if the exporter cannot be installed.
pub fn start_metrics_server(port: u16) -> Result<()> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));

    PrometheusBuilder::new().with_http_listener(addr).install()?;

    info!("Metrics server listening on {}", addr);
    Ok(())
}

/// Sync the relay's own counters into the exporter.
pub fn record_stats(stats: &StatsSnapshot) {
    counter!(names::MESSAGES_TOTAL).absolute(stats.total_messages);
    gauge!(names::ROOMS_ACTIVE).set(stats.total_rooms as f64);
    gauge!(names::UPTIME_SECONDS).set(stats.uptime_seconds as f64);
}

/// Record why a session ended.
pub fn record_session_end(reason: &'static str) {
    counter!(names::SESSIONS_ENDED_TOTAL, "reason" => reason).increment(1);
}

/// Records a session on creation and its end on drop.
pub struct ConnectionMetricsGuard;

impl ConnectionMetricsGuard {
    #[must_use]
    pub fn new() -> Self {
        counter!(names::CONNECTIONS_TOTAL).increment(1);
        gauge!(names::CONNECTIONS_ACTIVE).increment(1.0);
        Self
    }
}

impl Default for ConnectionMetricsGuard {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for ConnectionMetricsGuard {
    fn drop(&mut self) {
        gauge!(names::CONNECTIONS_ACTIVE).decrement(1.0);
    }
}
