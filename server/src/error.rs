//! Error types for the Chatter server.
//!
//! This module defines the top-level error returned by HTTP handlers.
//! Leaf errors live next to the code that produces them and convert into
//! [`ServerError`] with `?`.
//!
//! # Error Types
//!
//! - [`AuthError`](crate::auth::AuthError) - Bearer credential failures
//! - [`StoreError`](crate::store::StoreError) - Persistence failures
//! - [`ServerError`] - Top-level handler error
//!
//! Startup failures ([`ConfigError`](crate::config::ConfigError), bind, store
//! connect) are reported by `main` directly and never become a response.
//!
//! # HTTP Mapping
//!
//! [`ServerError`] implements [`IntoResponse`]. The body is always
//! `{"message": "..."}`:
//!
//! | Variant | Status |
//! |---------|--------|
//! | `Auth` | 401 |
//! | `NotFound` | 404 |
//! | `Store` | 500 (message carries the error detail) |

use std::error::Error;
use std::fmt;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use tracing::error;

use crate::auth::AuthError;
use crate::store::StoreError;

/// Top-level error type for HTTP handlers.
///
/// # Error Categories
///
/// - **Authentication errors**: Missing, malformed or expired bearer tokens
/// - **Not found**: A looked-up record does not exist
/// - **Store errors**: The persistence backend failed
#[derive(Debug)]
pub enum ServerError {
    /// Authentication failure.
    Auth(AuthError),

    /// The requested record does not exist.
    NotFound(String),

    /// Persistence backend failure.
    Store(StoreError),
}

impl fmt::Display for ServerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Auth(err) => write!(f, "authentication failed: {err}"),
            Self::NotFound(msg) => write!(f, "{msg}"),
            Self::Store(err) => write!(f, "store error: {err}"),
        }
    }
}

impl Error for ServerError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Auth(err) => Some(err),
            Self::Store(err) => Some(err),
            Self::NotFound(_) => None,
        }
    }
}

impl From<AuthError> for ServerError {
    fn from(err: AuthError) -> Self {
        Self::Auth(err)
    }
}

impl From<StoreError> for ServerError {
    fn from(err: StoreError) -> Self {
        Self::Store(err)
    }
}

impl ServerError {
    /// Creates a new not-found error.
    ///
    /// # Example
    ///
    /// ```rust
    /// use chatter_server::error::ServerError;
    ///
    /// let err = ServerError::not_found("User not found");
    /// assert!(matches!(err, ServerError::NotFound(_)));
    /// ```
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound(message.into())
    }

    /// Returns `true` if this error indicates a client-side problem.
    pub fn is_client_error(&self) -> bool {
        matches!(self, Self::Auth(_) | Self::NotFound(_))
    }

    /// Returns `true` if this error indicates a server-side problem.
    pub fn is_server_error(&self) -> bool {
        matches!(self, Self::Store(_))
    }

    /// The HTTP status this error maps to.
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::Auth(_) => StatusCode::UNAUTHORIZED,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

/// JSON error response body.
#[derive(Debug, Serialize)]
struct ErrorResponse {
    message: String,
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let message = match &self {
            // Auth details stay in the logs.
            Self::Auth(_) => "Unauthorized".to_string(),
            other => other.to_string(),
        };

        if self.is_server_error() {
            error!(error = %self, "Request failed");
        }

        (status, Json(ErrorResponse { message })).into_response()
    }
}
