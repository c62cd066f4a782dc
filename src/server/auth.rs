//! Bearer-token authorization.
//!
//! Tokens are issued by the `token` CLI command and sent as
//! `Authorization: Bearer <token>`:
//!
//! ```text
//! token     = <subject>.<expiry>.<signature>
//! signature = hex(HMAC-SHA256(secret, "<issuer>\n<subject>\n<expiry>"))
//! ```
//!
//! The middleware never rejects a request. It records whether the request
//! carried a valid token and leaves the decision to the handlers: reads are
//! public, while deletes and uploads answer 403 without authorization.
//!
//! # Example
//!
//! ```rust
//! use media_cache::server::auth::TokenAuth;
//! use std::time::Duration;
//!
//! let auth = TokenAuth::new("my-secret-key", "media-cache");
//! let (token, _expiry) = auth.issue("backoffice", Duration::from_secs(3600));
//! assert_eq!(auth.verify(&token).unwrap(), "backoffice");
//! ```

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use axum::{
    extract::{FromRequestParts, Request, State},
    http::{header::AUTHORIZATION, request::Parts, HeaderMap},
    middleware::Next,
    response::Response,
};
use hmac::{Hmac, Mac};
use sha2::Sha256;
use subtle::ConstantTimeEq;
use tracing::{debug, warn};

/// Default token issuer.
pub const DEFAULT_TOKEN_ISSUER: &str = "media-cache";

/// Default token lifetime in hours.
pub const DEFAULT_TOKEN_DURATION_HOURS: u64 = 72;

type HmacSha256 = Hmac<Sha256>;

// =============================================================================
// Errors
// =============================================================================

/// Reasons a token is not accepted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthError {
    /// Token is not `<subject>.<expiry>.<signature>`
    MalformedToken,

    /// Token lifetime is over
    Expired {
        /// When the token expired
        expired_at: u64,
        /// Current time
        current_time: u64,
    },

    /// Signature does not match
    InvalidSignature,
}

impl std::fmt::Display for AuthError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AuthError::MalformedToken => write!(f, "Malformed token"),
            AuthError::Expired {
                expired_at,
                current_time,
            } => write!(
                f,
                "Token expired at {} (current time: {})",
                expired_at, current_time
            ),
            AuthError::InvalidSignature => write!(f, "Invalid token signature"),
        }
    }
}

impl std::error::Error for AuthError {}

// =============================================================================
// Token Authentication
// =============================================================================

/// Issues and verifies HMAC-SHA256 bearer tokens.
#[derive(Clone)]
pub struct TokenAuth {
    secret_key: Vec<u8>,
    issuer: String,
}

impl TokenAuth {
    /// Create an authenticator. Tokens only verify against the same secret
    /// and issuer they were issued with.
    pub fn new(secret_key: impl AsRef<[u8]>, issuer: impl Into<String>) -> Self {
        Self {
            secret_key: secret_key.as_ref().to_vec(),
            issuer: issuer.into(),
        }
    }

    pub fn issuer(&self) -> &str {
        &self.issuer
    }

    /// Issue a token for `subject` valid for `ttl`.
    ///
    /// Returns the token and its expiry (Unix epoch seconds).
    pub fn issue(&self, subject: &str, ttl: Duration) -> (String, u64) {
        let expiry = now_secs() + ttl.as_secs();
        (self.issue_with_expiry(subject, expiry), expiry)
    }

    /// Issue a token with a fixed expiry timestamp.
    pub fn issue_with_expiry(&self, subject: &str, expiry: u64) -> String {
        format!(
            "{}.{}.{}",
            subject,
            expiry,
            self.compute_signature(subject, expiry)
        )
    }

    /// Verify a token, returning its subject.
    pub fn verify(&self, token: &str) -> Result<String, AuthError> {
        let mut parts = token.rsplitn(3, '.');
        let (Some(signature), Some(expiry), Some(subject)) =
            (parts.next(), parts.next(), parts.next())
        else {
            return Err(AuthError::MalformedToken);
        };
        if subject.is_empty() {
            return Err(AuthError::MalformedToken);
        }
        let expiry: u64 = expiry.parse().map_err(|_| AuthError::MalformedToken)?;

        let current_time = now_secs();
        if current_time > expiry {
            return Err(AuthError::Expired {
                expired_at: expiry,
                current_time,
            });
        }

        let provided = hex::decode(signature).map_err(|_| AuthError::MalformedToken)?;
        let expected = hex::decode(self.compute_signature(subject, expiry))
            .map_err(|_| AuthError::MalformedToken)?;

        if provided.ct_eq(&expected).into() {
            Ok(subject.to_string())
        } else {
            Err(AuthError::InvalidSignature)
        }
    }

    fn compute_signature(&self, subject: &str, expiry: u64) -> String {
        let mut mac =
            HmacSha256::new_from_slice(&self.secret_key).expect("HMAC can take key of any size");
        mac.update(format!("{}\n{}\n{}", self.issuer, subject, expiry).as_bytes());
        hex::encode(mac.finalize().into_bytes())
    }
}

fn now_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

/// Token from an `Authorization: Bearer <token>` header.
pub fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    let value = headers.get(AUTHORIZATION)?.to_str().ok()?;
    let (scheme, token) = value.split_once(' ')?;
    if scheme.eq_ignore_ascii_case("bearer") && !token.trim().is_empty() {
        Some(token.trim())
    } else {
        None
    }
}

// =============================================================================
// Axum Middleware
// =============================================================================

/// Request extension set by [`auth_middleware`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Authorized(pub bool);

/// Mark each request as authorized or not.
///
/// With `None` (authentication disabled) every request is authorized.
pub async fn auth_middleware(
    State(auth): State<Option<TokenAuth>>,
    mut request: Request,
    next: Next,
) -> Response {
    let authorized = match &auth {
        None => true,
        Some(auth) => match bearer_token(request.headers()) {
            None => false,
            Some(token) => match auth.verify(token) {
                Ok(subject) => {
                    debug!(subject = %subject, "Request authorized");
                    true
                }
                Err(e @ AuthError::InvalidSignature) => {
                    warn!(error = %e, "Rejected bearer token");
                    false
                }
                Err(e) => {
                    debug!(error = %e, "Rejected bearer token");
                    false
                }
            },
        },
    };

    request.extensions_mut().insert(Authorized(authorized));
    next.run(request).await
}

/// Axum extractor exposing the middleware's decision.
///
/// Requests that bypassed the middleware are unauthorized.
#[derive(Debug, Clone)]
pub struct OptionalAuth {
    /// Whether the request may mutate images
    pub authorized: bool,
}

impl<S> FromRequestParts<S> for OptionalAuth
where
    S: Send + Sync,
{
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let authorized = parts
            .extensions
            .get::<Authorized>()
            .is_some_and(|a| a.0);
        Ok(OptionalAuth { authorized })
    }
}

// =============================================================================
// Tests
// =============================================================================
