//! Bearer token authentication.
//!
//! Callers of protected HTTP routes send an HS256-signed JWT in the
//! `Authorization` header:
//!
//! ```text
//! Authorization: Bearer <jwt>
//! ```
//!
//! The token carries the caller identity as [`Claims`]: subject `id`, `email`,
//! issued-at and expiry (seconds since the epoch). Tokens are issued by an
//! external auth service that shares the secret; [`TokenVerifier::issue`] is
//! provided for tooling and tests.
//!
//! # Flow
//!
//! 1. [`authenticate`] runs as route middleware
//! 2. No `Authorization` header: the request continues without an identity
//! 3. Malformed header, bad signature or expired token: `401`
//! 4. Valid token: the [`Claims`] are attached to the request extensions
//! 5. Handlers read the identity with the [`Identity`] extractor
//!
//! # Example
//!
//! ```rust
//! use std::time::Duration;
//! use chatter_server::auth::TokenVerifier;
//!
//! let verifier = TokenVerifier::new("shared-secret");
//! let token = verifier.issue("user-1", "user@example.com", Duration::from_secs(60)).unwrap();
//! let claims = verifier.verify(&token).unwrap();
//! assert_eq!(claims.id, "user-1");
//! ```

use std::convert::Infallible;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use axum::extract::{FromRequestParts, Request, State};
use axum::http::header::AUTHORIZATION;
use axum::http::request::Parts;
use axum::middleware::Next;
use axum::response::Response;
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, trace};

use crate::error::ServerError;

/// Errors that can occur while authenticating a request.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AuthError {
    /// No bearer credential was supplied.
    #[error("missing bearer credentials")]
    MissingCredentials,

    /// The `Authorization` header is not of the form `Bearer <token>`.
    #[error("malformed authorization header")]
    MalformedHeader,

    /// The token signature or structure is invalid.
    #[error("invalid token")]
    InvalidToken,

    /// The token is past its expiry.
    #[error("token expired")]
    Expired,

    /// A token could not be issued.
    #[error("failed to issue token: {0}")]
    Issue(String),
}

/// Identity carried by a verified token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    /// Subject id; primary key of the user document.
    pub id: String,
    pub email: String,
    /// Issued at, seconds since the epoch.
    pub iat: u64,
    /// Expiry, seconds since the epoch.
    pub exp: u64,
}

/// Verifies (and for tooling, issues) HS256 bearer tokens.
#[derive(Clone)]
pub struct TokenVerifier {
    decoding_key: DecodingKey,
    encoding_key: EncodingKey,
    validation: Validation,
}

impl TokenVerifier {
    /// Creates a verifier for tokens signed with `secret`.
    pub fn new(secret: &str) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;

        Self {
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
            encoding_key: EncodingKey::from_secret(secret.as_bytes()),
            validation,
        }
    }

    /// Verifies a token and returns its claims.
    ///
    /// # Errors
    ///
    /// - [`AuthError::Expired`] - the `exp` claim is in the past
    /// - [`AuthError::InvalidToken`] - bad signature, wrong algorithm or
    ///   missing claims
    pub fn verify(&self, token: &str) -> Result<Claims, AuthError> {
        decode::<Claims>(token, &self.decoding_key, &self.validation)
            .map(|data| data.claims)
            .map_err(|err| match err.kind() {
                ErrorKind::ExpiredSignature => AuthError::Expired,
                _ => AuthError::InvalidToken,
            })
    }

    /// Issues a token for `id`/`email` valid for `ttl`.
    pub fn issue(&self, id: &str, email: &str, ttl: Duration) -> Result<String, AuthError> {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_err(|e| AuthError::Issue(e.to_string()))?
            .as_secs();

        let claims = Claims {
            id: id.to_string(),
            email: email.to_string(),
            iat: now,
            exp: now + ttl.as_secs(),
        };

        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key)
            .map_err(|e| AuthError::Issue(e.to_string()))
    }

    /// Verifies the raw value of an `Authorization` header.
    pub fn verify_header(&self, header: &str) -> Result<Claims, AuthError> {
        let token = parse_bearer(header)?;
        self.verify(token)
    }
}

impl std::fmt::Debug for TokenVerifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenVerifier")
            .field("algorithm", &Algorithm::HS256)
            .finish_non_exhaustive()
    }
}

/// Extracts the token from a `Bearer <token>` header value.
///
/// The scheme is matched case-insensitively.
fn parse_bearer(header: &str) -> Result<&str, AuthError> {
    let (scheme, token) = header
        .trim()
        .split_once(' ')
        .ok_or(AuthError::MalformedHeader)?;

    if !scheme.eq_ignore_ascii_case("bearer") {
        return Err(AuthError::MalformedHeader);
    }

    let token = token.trim();
    if token.is_empty() {
        return Err(AuthError::MalformedHeader);
    }

    Ok(token)
}

/// Authentication middleware.
///
/// Attaches [`Claims`] to the request when a valid bearer token is present.
/// Requests without an `Authorization` header pass through untouched so the
/// handler decides how to treat anonymous callers.
pub async fn authenticate(
    State(verifier): State<TokenVerifier>,
    mut request: Request,
    next: Next,
) -> Result<Response, ServerError> {
    let Some(header) = request.headers().get(AUTHORIZATION) else {
        trace!("No Authorization header");
        return Ok(next.run(request).await);
    };

    let header = header.to_str().map_err(|_| AuthError::MalformedHeader)?;
    let claims = verifier.verify_header(header).map_err(|err| {
        debug!(error = %err, "Bearer token rejected");
        err
    })?;

    trace!(user_id = %claims.id, "Bearer token accepted");
    request.extensions_mut().insert(claims);

    Ok(next.run(request).await)
}

/// Extractor for the identity attached by [`authenticate`].
///
/// Never rejects; holds `None` when the request is anonymous.
#[derive(Debug, Clone)]
pub struct Identity(pub Option<Claims>);

impl<S> FromRequestParts<S> for Identity
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(Self(parts.extensions.get::<Claims>().cloned()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &str = "test-secret";

    #[test]
    fn issued_token_verifies() {
        let verifier = TokenVerifier::new(SECRET);
        let token = verifier
            .issue("user-1", "user@example.com", Duration::from_secs(60))
            .unwrap();

        let claims = verifier.verify(&token).unwrap();
        assert_eq!(claims.id, "user-1");
        assert_eq!(claims.email, "user@example.com");
        assert_eq!(claims.exp - claims.iat, 60);
    }

    #[test]
    fn token_signed_with_other_secret_is_invalid() {
        let issuer = TokenVerifier::new("other-secret");
        let token = issuer
            .issue("user-1", "user@example.com", Duration::from_secs(60))
            .unwrap();

        let verifier = TokenVerifier::new(SECRET);
        assert_eq!(verifier.verify(&token), Err(AuthError::InvalidToken));
    }

    #[test]
    fn expired_token_is_rejected() {
        let verifier = TokenVerifier::new(SECRET);
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap()
            .as_secs();
        let claims = Claims {
            id: "user-1".to_string(),
            email: "user@example.com".to_string(),
            iat: now - 120,
            exp: now - 60,
        };
        let token = encode(
            &Header::new(Algorithm::HS256),
            &claims,
            &EncodingKey::from_secret(SECRET.as_bytes()),
        )
        .unwrap();

        assert_eq!(verifier.verify(&token), Err(AuthError::Expired));
    }

    #[test]
    fn garbage_token_is_invalid() {
        let verifier = TokenVerifier::new(SECRET);
        assert_eq!(verifier.verify("not.a.jwt"), Err(AuthError::InvalidToken));
    }

    #[test]
    fn parse_bearer_accepts_any_scheme_case() {
        assert_eq!(parse_bearer("Bearer abc"), Ok("abc"));
        assert_eq!(parse_bearer("bearer abc"), Ok("abc"));
        assert_eq!(parse_bearer("  BEARER   abc  "), Ok("abc"));
    }

    #[test]
    fn parse_bearer_rejects_malformed_headers() {
        assert_eq!(parse_bearer("abc"), Err(AuthError::MalformedHeader));
        assert_eq!(parse_bearer("Basic abc"), Err(AuthError::MalformedHeader));
        assert_eq!(parse_bearer("Bearer "), Err(AuthError::MalformedHeader));
    }

    #[test]
    fn verify_header_round_trip() {
        let verifier = TokenVerifier::new(SECRET);
        let token = verifier
            .issue("user-2", "two@example.com", Duration::from_secs(60))
            .unwrap();

        let claims = verifier.verify_header(&format!("Bearer {token}")).unwrap();
        assert_eq!(claims.id, "user-2");
    }

    #[test]
    fn verifier_debug_hides_keys() {
        let debug = format!("{:?}", TokenVerifier::new(SECRET));
        assert!(debug.contains("TokenVerifier"));
        assert!(!debug.contains(SECRET));
    }
}
