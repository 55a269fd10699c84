//! Prometheus metrics recorder and metric names.

use metrics_exporter_prometheus::{BuildError, PrometheusBuilder, PrometheusHandle};
use tracing::info;

/// Install the Prometheus metrics recorder (global).
///
/// Returns the handle used to render `/metrics`. Fails if a recorder is
/// already installed.
pub fn install_recorder() -> Result<PrometheusHandle, BuildError> {
    let handle = PrometheusBuilder::new().install_recorder()?;
    info!("prometheus metrics recorder installed");
    Ok(handle)
}

/// Render Prometheus text format from the installed recorder.
pub fn render(handle: &PrometheusHandle) -> String {
    handle.render()
}

/// WebSocket connections opened total (counter).
pub const WS_CONNECTIONS_TOTAL: &str = "ws_connections_total";
/// WebSocket disconnections total (counter, labels: reason).
pub const WS_DISCONNECTIONS_TOTAL: &str = "ws_disconnections_total";
/// Active WebSocket connections (gauge).
pub const WS_CONNECTIONS_ACTIVE: &str = "ws_connections_active";
/// WebSocket connection lifetime (histogram).
pub const WS_CONNECTION_DURATION_SECONDS: &str = "ws_connection_duration_seconds";
/// Refused upgrade requests (counter, labels: reason).
pub const WS_UPGRADES_REFUSED_TOTAL: &str = "ws_upgrades_refused_total";
/// Inbound events routed (counter, labels: kind).
pub const EVENTS_ROUTED_TOTAL: &str = "events_routed_total";
/// Inbound events that failed routing or handling (counter, labels: error_type).
pub const EVENT_ERRORS_TOTAL: &str = "event_errors_total";
/// Recipients per broadcast (histogram).
pub const BROADCAST_RECIPIENTS: &str = "broadcast_recipients";
/// Broadcast drops total (counter).
pub const WS_BROADCAST_DROPS_TOTAL: &str = "ws_broadcast_drops_total";
/// Chat messages persisted (counter).
pub const MESSAGES_PERSISTED_TOTAL: &str = "messages_persisted_total";
