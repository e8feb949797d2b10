//! HTTP route handlers for the Chatter server.
//!
//! This module provides the HTTP API endpoints:
//!
//! - `GET /user` - Profile of the authenticated caller
//! - `GET /ws` - Realtime chat WebSocket
//! - `GET /api/v1/messages` - Message history sorted by creation time
//! - `GET /health` - Health check endpoint
//!
//! # Architecture
//!
//! All routes share application state through [`AppState`], which contains:
//! - The document stores
//! - The realtime [`Hub`]
//! - The bearer token verifier used by the auth middleware
//! - Server start time for uptime reporting
//!
//! # Example
//!
//! ```rust,no_run
//! use chatter_server::config::Config;
//! use chatter_server::routes::{create_router, AppState};
//! use chatter_server::store::Stores;
//!
//! #[tokio::main]
//! async fn main() {
//!     let config = Config::from_env().expect("failed to load config");
//!     let state = AppState::new(&config, Stores::in_memory());
//!     let app = create_router(state);
//!
//!     let listener = tokio::net::TcpListener::bind("0.0.0.0:3000").await.unwrap();
//!     axum::serve(listener, app).await.unwrap();
//! }
//! ```

use axum::{
    extract::{
        ws::{Message as WsMessage, WebSocket},
        State, WebSocketUpgrade,
    },
    http::{header, Method},
    middleware,
    response::Response,
    routing::get,
    Json, Router,
};
use futures_util::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use tokio::time::Instant;
use tower::ServiceBuilder;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{debug, error, trace};

use crate::auth::{authenticate, AuthError, Identity, TokenVerifier};
use crate::config::Config;
use crate::error::ServerError;
use crate::hub::Hub;
use crate::store::Stores;
use crate::types::{ClientEvent, Message, User};

// ============================================================================
// Application State
// ============================================================================

/// Shared application state for all route handlers.
///
/// Every field is cheap to clone; axum clones the state for each request.
#[derive(Clone)]
pub struct AppState {
    /// Message and user stores.
    pub stores: Stores,

    /// Realtime session coordinator.
    pub hub: Hub,

    /// Bearer token verifier for protected routes.
    pub verifier: TokenVerifier,

    /// Server start time for uptime calculation.
    pub start_time: Instant,
}

impl AppState {
    /// Creates application state from configuration and opened stores.
    #[must_use]
    pub fn new(config: &Config, stores: Stores) -> Self {
        let hub = Hub::new(stores.messages.clone());
        Self::with_hub(config, stores, hub)
    }

    /// Creates application state around an existing hub.
    ///
    /// Useful for tests that need to observe the hub directly.
    #[must_use]
    pub fn with_hub(config: &Config, stores: Stores, hub: Hub) -> Self {
        Self {
            stores,
            hub,
            verifier: TokenVerifier::new(&config.jwt_secret),
            start_time: Instant::now(),
        }
    }
}

impl std::fmt::Debug for AppState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppState")
            .field("stores", &self.stores)
            .field("hub", &self.hub)
            .field("start_time", &self.start_time)
            .finish()
    }
}

// ============================================================================
// Router
// ============================================================================

/// Creates the application router with all routes configured.
///
/// `/user` sits behind the [`authenticate`] middleware. All routes share a
/// request trace layer and a permissive CORS policy (any origin, `GET` and
/// `POST`).
pub fn create_router(state: AppState) -> Router {
    let protected = Router::new()
        .route("/user", get(get_user))
        .route_layer(middleware::from_fn_with_state(
            state.verifier.clone(),
            authenticate,
        ));

    Router::new()
        .merge(protected)
        .route("/ws", get(get_ws))
        .route("/api/v1/messages", get(get_messages))
        .route("/health", get(get_health))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(cors_layer()),
        )
        .with_state(state)
}

fn cors_layer() -> CorsLayer {
    CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE])
}

// ============================================================================
// GET /user - Caller Profile
// ============================================================================

/// GET /user - Returns the profile of the authenticated caller.
///
/// # Responses
///
/// - `200 OK` - The user document
/// - `401 Unauthorized` - No valid bearer token
/// - `404 Not Found` - `{"message": "User not found"}`
/// - `500 Internal Server Error` - `{"message": "<detail>"}` on store failure
async fn get_user(
    State(state): State<AppState>,
    Identity(identity): Identity,
) -> Result<Json<User>, ServerError> {
    let claims = identity.ok_or(AuthError::MissingCredentials)?;

    match state.stores.users.find_by_id(&claims.id).await? {
        Some(user) => {
            trace!(user_id = %user.id, "Profile served");
            Ok(Json(user))
        }
        None => {
            debug!(user_id = %claims.id, "Profile lookup missed");
            Err(ServerError::not_found("User not found"))
        }
    }
}

// ============================================================================
// GET /api/v1/messages - History
// ============================================================================

/// GET /api/v1/messages - Full history sorted by `createdAt` ascending.
async fn get_messages(State(state): State<AppState>) -> Result<Json<Vec<Message>>, ServerError> {
    let messages = state.stores.messages.find_all_sorted().await?;
    Ok(Json(messages))
}

// ============================================================================
// GET /ws - Realtime Chat
// ============================================================================

/// GET /ws - Upgrades to the realtime chat protocol.
///
/// Frames in both directions are JSON text of the form
/// `{"event": "...", "data": ...}`; see [`crate::types`].
async fn get_ws(State(state): State<AppState>, ws: WebSocketUpgrade) -> Response {
    ws.on_upgrade(move |socket| handle_websocket(socket, state.hub))
}

/// Runs one realtime session until the client goes away.
async fn handle_websocket(socket: WebSocket, hub: Hub) {
    let (mut sender, mut receiver) = socket.split();
    let (session, mut events) = hub.connect().await;

    // Forward events addressed to this session
    let session_id = session.id;
    let forward_task = tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            match serde_json::to_string(&event) {
                Ok(json) => {
                    trace!(%session_id, event = event.name(), "Sending event");
                    if let Err(err) = sender.send(WsMessage::Text(json.into())).await {
                        debug!(%session_id, error = %err, "Failed to send event");
                        break;
                    }
                }
                Err(err) => {
                    error!(%session_id, error = %err, "Failed to serialize event");
                }
            }
        }
    });

    while let Some(frame) = receiver.next().await {
        match frame {
            Ok(WsMessage::Text(text)) => match ClientEvent::from_frame(text.as_str()) {
                Ok(event) => hub.dispatch(&session, event).await,
                Err(err) => {
                    debug!(%session_id, error = %err, "Ignoring unparseable frame");
                }
            },
            Ok(WsMessage::Close(_)) => {
                debug!(%session_id, "Client sent close frame");
                break;
            }
            Ok(WsMessage::Ping(data)) => {
                // axum answers pings
                trace!(data_len = data.len(), "Received ping");
            }
            Ok(_) => {}
            Err(err) => {
                debug!(%session_id, error = %err, "WebSocket error");
                break;
            }
        }
    }

    forward_task.abort();
    hub.disconnect(&session);
}

// ============================================================================
// GET /health - Health Check
// ============================================================================

/// Response body for health check endpoint.
#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    /// Always "ok" if responding.
    pub status: String,

    /// Number of connected realtime sessions.
    pub connections: usize,

    /// Server uptime in seconds.
    pub uptime_seconds: u64,
}

/// GET /health - Health check endpoint. No authentication required.
async fn get_health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        connections: state.hub.connections(),
        uptime_seconds: state.start_time.elapsed().as_secs(),
    })
}

// ============================================================================
// Tests
// ============================================================================
