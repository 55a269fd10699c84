//! `ParleyServer`: Axum HTTP + WebSocket server.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::Router;
use axum::extract::{Path, Query, State};
use axum::http::{Extensions, StatusCode};
use axum::middleware;
use axum::response::{IntoResponse, Json, Response};
use axum::routing::get;
use metrics_exporter_prometheus::PrometheusHandle;
use parley_core::Identity;
use parley_store::{DEFAULT_HISTORY_LIMIT, DisplayNames, MessageStore};
use serde::Deserialize;
use tokio::task::JoinHandle;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use crate::config::ServerConfig;
use crate::errors::ServerError;
use crate::health::{self, HealthResponse};
use crate::identity::identity_layer;
use crate::origin::OriginPolicy;
use crate::shutdown::ShutdownCoordinator;
use crate::websocket::heartbeat::HeartbeatConfig;
use crate::websocket::registry::ConnectionRegistry;
use crate::websocket::router::{EventRouter, HandlerContext};
use crate::websocket::session::SessionContext;
use crate::websocket::upgrade::ws_handler;

/// Shared state accessible from Axum handlers.
#[derive(Clone)]
pub struct AppState {
    /// Server configuration.
    pub config: Arc<ServerConfig>,
    /// Origin allow-list for upgrades.
    pub origins: OriginPolicy,
    /// Router, handler collaborators and pump settings for new connections.
    pub session: SessionContext,
    /// Display-name collaborator used by the identity middleware.
    pub display_names: Arc<dyn DisplayNames>,
    /// Shutdown coordinator.
    pub shutdown: Arc<ShutdownCoordinator>,
    /// When the server started.
    pub start_time: Instant,
    /// Prometheus handle for `/metrics`.
    pub metrics: Option<PrometheusHandle>,
}

/// The Parley server.
pub struct ParleyServer {
    state: AppState,
}

impl ParleyServer {
    /// Create a server with the default `change_room` / `send_message`
    /// handlers.
    pub fn new(
        config: ServerConfig,
        messages: Arc<dyn MessageStore>,
        display_names: Arc<dyn DisplayNames>,
    ) -> Self {
        Self::with_router(config, EventRouter::with_default_handlers(), messages, display_names)
    }

    /// Create a server with a custom handler table.
    pub fn with_router(
        config: ServerConfig,
        router: EventRouter,
        messages: Arc<dyn MessageStore>,
        display_names: Arc<dyn DisplayNames>,
    ) -> Self {
        let registry = Arc::new(ConnectionRegistry::new(config.enqueue_timeout()));
        let session = SessionContext {
            router: Arc::new(router),
            handlers: HandlerContext { registry, messages },
            heartbeat: HeartbeatConfig::new(config.pong_wait()),
            max_frame_bytes: config.max_frame_bytes,
        };
        let state = AppState {
            origins: OriginPolicy::new(&config.allowed_origins),
            config: Arc::new(config),
            session,
            display_names,
            shutdown: Arc::new(ShutdownCoordinator::new()),
            start_time: Instant::now(),
            metrics: None,
        };
        Self { state }
    }

    /// Serve `/metrics` from this handle.
    #[must_use]
    pub fn with_metrics(mut self, handle: PrometheusHandle) -> Self {
        self.state.metrics = Some(handle);
        self
    }

    /// Build the Axum router with all routes.
    pub fn router(&self) -> Router {
        Router::new()
            .route("/ws", get(ws_handler))
            .route("/rooms/{room}/messages", get(history_handler))
            .route_layer(middleware::from_fn_with_state(
                self.state.clone(),
                identity_layer,
            ))
            .route("/health", get(health_handler))
            .route("/metrics", get(metrics_handler))
            .layer(TraceLayer::new_for_http())
            .with_state(self.state.clone())
    }

    /// Bind the configured address and serve until shutdown.
    ///
    /// Returns the bound address (useful with port `0`) and the serve task.
    pub async fn listen(&self) -> Result<(SocketAddr, JoinHandle<()>), ServerError> {
        let addr = self.state.config.bind_addr();
        let listener = tokio::net::TcpListener::bind(&addr)
            .await
            .map_err(|source| ServerError::Bind { addr, source })?;
        let local_addr = listener.local_addr()?;
        info!(
            %local_addr,
            handlers = ?self.state.session.router.kinds(),
            "parley server listening"
        );

        let app = self.router();
        let token = self.state.shutdown.token();
        let handle = tokio::spawn(async move {
            if let Err(e) = axum::serve(listener, app)
                .with_graceful_shutdown(token.cancelled_owned())
                .await
            {
                warn!(error = %e, "server stopped with error");
            }
        });
        Ok((local_addr, handle))
    }

    /// Stop accepting connections, close every live one and wait (bounded)
    /// for their pumps to finish.
    pub async fn shutdown_gracefully(&self, timeout: Option<Duration>) {
        self.state.shutdown.shutdown();
        let closed = self.registry().close_all();
        info!(closed, "shutting down");
        self.state.shutdown.graceful_shutdown(timeout).await;
    }

    /// Live connections.
    pub fn registry(&self) -> &Arc<ConnectionRegistry> {
        &self.state.session.handlers.registry
    }

    /// Get the shutdown coordinator.
    pub fn shutdown(&self) -> &Arc<ShutdownCoordinator> {
        &self.state.shutdown
    }

    /// Get the server configuration.
    pub fn config(&self) -> &ServerConfig {
        &self.state.config
    }
}

/// GET /health
async fn health_handler(State(state): State<AppState>) -> Json<HealthResponse> {
    let registry = &state.session.handlers.registry;
    let rooms = registry.room_counts().len();
    Json(health::health_check(state.start_time, registry.count(), rooms))
}

/// GET /metrics
async fn metrics_handler(State(state): State<AppState>) -> Response {
    match &state.metrics {
        Some(handle) => crate::metrics::render(handle).into_response(),
        None => StatusCode::NOT_FOUND.into_response(),
    }
}

#[derive(Debug, Deserialize)]
struct HistoryParams {
    limit: Option<usize>,
}

/// GET /rooms/{room}/messages
async fn history_handler(
    State(state): State<AppState>,
    Path(room): Path<String>,
    Query(params): Query<HistoryParams>,
    extensions: Extensions,
) -> Response {
    if extensions.get::<Identity>().is_none() {
        return StatusCode::UNAUTHORIZED.into_response();
    }
    let limit = params
        .limit
        .unwrap_or(DEFAULT_HISTORY_LIMIT)
        .min(DEFAULT_HISTORY_LIMIT);
    match state
        .session
        .handlers
        .messages
        .recent_messages(&room, limit)
        .await
    {
        Ok(records) => Json(records).into_response(),
        Err(e) => {
            warn!(room = %room, error = %e, "history lookup failed");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}
