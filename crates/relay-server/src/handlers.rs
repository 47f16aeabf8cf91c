//! HTTP and WebSocket handlers for the relay server.
//!
//! Each upgraded WebSocket is handed to [`Relay::serve`], which owns the
//! session until the socket closes or the server shuts down.

use crate::config::Config;
use crate::metrics::{self, ConnectionMetricsGuard};
use anyhow::{Context, Result};
use axum::{
    extract::{ws::WebSocketUpgrade, ConnectInfo, State},
    http::{header, HeaderMap},
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use relay_core::{Relay, SessionEnd};
use relay_transport::ConnectionMetadata;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::signal;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Shared server state.
pub struct AppState {
    pub relay: Arc<Relay>,
    pub config: Config,
}

impl AppState {
    #[must_use]
    pub fn new(config: Config) -> Self {
        Self {
            relay: Arc::new(Relay::new()),
            config,
        }
    }
}

/// Build the HTTP router.
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route(&state.config.transport.websocket_path, get(ws_handler))
        .route("/health", get(health_handler))
        .route("/stats", get(stats_handler))
        .with_state(state)
}

/// Run the HTTP/WebSocket server until SIGINT or SIGTERM.
///
/// # Errors
///
/// Returns an error if the listen address is invalid or cannot be bound.
pub async fn run_server(config: Config) -> Result<()> {
    let addr = config.bind_addr()?;
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {addr}"))?;

    if config.metrics.enabled {
        if let Err(e) = metrics::start_metrics_server(config.metrics.port) {
            error!("Failed to start metrics server: {}", e);
        }
    }

    serve(listener, Arc::new(AppState::new(config)), shutdown_signal()).await
}

/// Serve on an already-bound listener until `signal` resolves, then shut the
/// relay down.
///
/// # Errors
///
/// Returns an error if the server fails while accepting connections.
pub async fn serve<F>(listener: TcpListener, state: Arc<AppState>, signal: F) -> Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    state.config.validate()?;
    let relay = Arc::clone(&state.relay);
    let config = state.config.clone();
    let addr = listener.local_addr()?;

    let heartbeat = relay.spawn_heartbeat(config.heartbeat_interval());
    let stats_sync = config.metrics.enabled.then(|| spawn_stats_sync(&relay, &config));

    info!("Relay server listening on {}", addr);
    info!(
        "WebSocket endpoint: ws://{}{}",
        addr, config.transport.websocket_path
    );

    let app = router(state).into_make_service_with_connect_info::<SocketAddr>();
    let shutdown_relay = Arc::clone(&relay);
    let timeout = config.shutdown_timeout();

    let served = axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            signal.await;
            info!("Shutting down");
            shutdown_relay.shutdown(timeout).await;
        })
        .await;

    // No-op after a graceful stop; stops background tasks if serving failed.
    relay.shutdown(timeout).await;
    served?;

    if let Err(e) = heartbeat.await {
        error!(error = %e, "Heartbeat task failed");
    }
    if let Some(task) = stats_sync {
        if let Err(e) = task.await {
            error!(error = %e, "Stats sync task failed");
        }
    }

    info!("Server stopped");
    Ok(())
}

/// Mirror the relay's counters into the metrics exporter on the heartbeat
/// interval.
fn spawn_stats_sync(relay: &Arc<Relay>, config: &Config) -> JoinHandle<()> {
    let relay = Arc::clone(relay);
    let mut shutdown = relay.subscribe_shutdown();
    let mut timer = tokio::time::interval(config.heartbeat_interval());

    tokio::spawn(async move {
        loop {
            tokio::select! {
                _ = shutdown.recv() => break,
                _ = timer.tick() => metrics::record_stats(&relay.stats()),
            }
        }
    })
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C, initiating graceful shutdown"),
        _ = terminate => info!("Received terminate signal, initiating graceful shutdown"),
    }
}

/// Health check handler.
async fn health_handler() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION")
    }))
}

async fn stats_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(state.relay.stats())
}

/// WebSocket upgrade handler.
async fn ws_handler(
    ws: WebSocketUpgrade,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    let user_agent = headers
        .get(header::USER_AGENT)
        .and_then(|v| v.to_str().ok())
        .map(str::to_owned);
    let metadata = ConnectionMetadata::new(Some(addr.to_string()), user_agent);
    let relay = Arc::clone(&state.relay);

    ws.on_upgrade(move |socket| async move {
        let _metrics_guard = ConnectionMetricsGuard::new();
        let (sink, stream) = relay_transport::axum::split(socket);

        let reason = match relay.serve(sink, stream, metadata).await {
            SessionEnd::Closed => "closed",
            SessionEnd::Failed(e) => {
                warn!(remote = %addr, error = %e, "WebSocket session failed");
                "failed"
            }
            SessionEnd::Shutdown => "shutdown",
        };

        debug!(remote = %addr, reason, "WebSocket session ended");
        metrics::record_session_end(reason);
    })
}
