//! `GET /ws`: admission checks, protocol upgrade, registration.

use axum::extract::ws::rejection::WebSocketUpgradeRejection;
use axum::extract::ws::{WebSocket, WebSocketUpgrade};
use axum::extract::{Query, State};
use axum::http::header::ORIGIN;
use axum::http::{Extensions, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use futures::StreamExt;
use metrics::counter;
use parley_core::{ConnectionId, Identity};
use serde::Deserialize;
use tracing::{info, warn};

use super::connection::Connection;
use super::session::run_connection;
use crate::metrics::WS_UPGRADES_REFUSED_TOTAL;
use crate::server::AppState;

/// Query parameters accepted on the upgrade request.
#[derive(Debug, Default, Deserialize)]
pub struct UpgradeParams {
    /// Room to join initially.
    pub room: Option<String>,
}

/// Why an upgrade request was refused before negotiation.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Refusal {
    /// `Origin` missing or not on the allow-list.
    Origin,
    /// No authenticated identity on the request.
    Unauthenticated,
    /// `max_connections` reached, or the server is shutting down.
    Unavailable,
}

impl Refusal {
    /// Status code returned to the client.
    pub fn status(self) -> StatusCode {
        match self {
            Self::Origin => StatusCode::FORBIDDEN,
            Self::Unauthenticated => StatusCode::UNAUTHORIZED,
            Self::Unavailable => StatusCode::SERVICE_UNAVAILABLE,
        }
    }

    fn label(self) -> &'static str {
        match self {
            Self::Origin => "origin",
            Self::Unauthenticated => "unauthenticated",
            Self::Unavailable => "unavailable",
        }
    }
}

impl IntoResponse for Refusal {
    fn into_response(self) -> Response {
        counter!(WS_UPGRADES_REFUSED_TOTAL, "reason" => self.label()).increment(1);
        self.status().into_response()
    }
}

/// Run the admission checks in order: origin, identity, capacity.
pub fn admit(
    state: &AppState,
    headers: &HeaderMap,
    extensions: &Extensions,
) -> Result<Identity, Refusal> {
    if !state.origins.allows_request(headers) {
        warn!(
            origin = ?headers.get(ORIGIN),
            "upgrade refused: origin not allowed"
        );
        return Err(Refusal::Origin);
    }
    let Some(identity) = extensions.get::<Identity>().cloned() else {
        warn!("upgrade refused: no identity");
        return Err(Refusal::Unauthenticated);
    };
    if state.shutdown.is_shutting_down()
        || state.session.handlers.registry.count() >= state.config.max_connections
    {
        warn!(email = %identity.email, "upgrade refused: at capacity");
        return Err(Refusal::Unavailable);
    }
    Ok(identity)
}

/// Initial room: the trimmed `room` parameter if non-blank, else the default.
pub fn initial_room(params: &UpgradeParams, default_room: &str) -> String {
    params
        .room
        .as_deref()
        .map(str::trim)
        .filter(|room| !room.is_empty())
        .unwrap_or(default_room)
        .to_owned()
}

/// GET /ws
pub async fn ws_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    extensions: Extensions,
    params: Result<Query<UpgradeParams>, axum::extract::rejection::QueryRejection>,
    ws: Result<WebSocketUpgrade, WebSocketUpgradeRejection>,
) -> Response {
    let identity = match admit(&state, &headers, &extensions) {
        Ok(identity) => identity,
        Err(refusal) => return refusal.into_response(),
    };
    let ws = match ws {
        Ok(ws) => ws,
        Err(rejection) => {
            warn!(error = %rejection, "upgrade negotiation failed");
            return rejection.into_response();
        }
    };

    let params = params.map(|Query(p)| p).unwrap_or_default();
    let room = initial_room(&params, &state.config.default_room);
    let limit = state.config.max_frame_bytes;

    ws.max_message_size(limit)
        .max_frame_size(limit)
        .on_failed_upgrade(|e| warn!(error = %e, "websocket upgrade failed"))
        .on_upgrade(move |socket| {
            let shutdown = state.shutdown.clone();
            shutdown.track(serve_socket(socket, identity, room, state))
        })
}

/// Register a freshly upgraded socket and drive it to completion.
async fn serve_socket(socket: WebSocket, identity: Identity, room: String, state: AppState) {
    let (conn, outbound) = Connection::new(
        ConnectionId::new(),
        identity,
        room,
        state.config.outbound_capacity,
    );
    if !state.session.handlers.registry.register(conn.clone()) {
        return;
    }
    if state.shutdown.is_shutting_down() {
        info!(conn_id = %conn.id(), "shutting down, closing new connection");
        let _ = state.session.handlers.registry.unregister(&conn.id());
    }

    let (sink, stream) = socket.split();
    run_connection(stream, sink, outbound, conn, state.session.clone()).await;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn initial_room_defaults() {
        let params = UpgradeParams::default();
        assert_eq!(initial_room(&params, "general"), "general");
    }

    #[test]
    fn initial_room_from_query() {
        let params = UpgradeParams {
            room: Some("  lobby ".into()),
        };
        assert_eq!(initial_room(&params, "general"), "lobby");
    }

    #[test]
    fn blank_room_param_falls_back() {
        let params = UpgradeParams {
            room: Some("   ".into()),
        };
        assert_eq!(initial_room(&params, "general"), "general");
    }

    #[test]
    fn refusal_status_codes() {
        assert_eq!(Refusal::Origin.status(), StatusCode::FORBIDDEN);
        assert_eq!(Refusal::Unauthenticated.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(Refusal::Unavailable.status(), StatusCode::SERVICE_UNAVAILABLE);
    }
}
