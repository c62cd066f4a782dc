//! Router configuration for the media server.
//!
//! # Route Structure
//!
//! ```text
//! /health                      - Health check
//! GET    {prefix}/{*path}      - Serve original or derivative (public)
//! DELETE {prefix}/{*path}      - Delete original (authorized)
//! POST   {prefix}              - Upload originals (authorized)
//! ```
//!
//! # Example
//!
//! ```ignore
//! use media_cache::engine::{MediaConfig, MediaService};
//! use media_cache::server::routes::{create_router, RouterConfig};
//! use media_cache::store::LocalStore;
//!
//! let config = MediaConfig::default();
//! let store = LocalStore::new("./assets", config.codec());
//! let media = MediaService::new(store, &config);
//!
//! let router = create_router(media, RouterConfig::new("my-secret-key"));
//!
//! let listener = tokio::net::TcpListener::bind("0.0.0.0:3000").await?;
//! axum::serve(listener, router).await?;
//! ```

use std::time::Duration;

use axum::{
    extract::DefaultBodyLimit,
    middleware,
    routing::{get, post},
    Router,
};
use http::header::{AUTHORIZATION, CONTENT_TYPE};
use http::Method;
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use super::auth::{auth_middleware, TokenAuth, DEFAULT_TOKEN_ISSUER};
use super::handlers::{
    delete_handler, health_handler, read_handler, upload_handler, AppState,
};
use crate::engine::MediaService;
use crate::store::ImageStore;

/// Default URL prefix of the media routes.
pub const DEFAULT_URL_PREFIX: &str = "/media/images";

/// Multipart overhead allowed on top of the per-file size limit.
const BODY_LIMIT_FACTOR: u64 = 3;

// =============================================================================
// Router Configuration
// =============================================================================

/// Configuration for the HTTP router.
#[derive(Clone)]
pub struct RouterConfig {
    /// Secret key for bearer token verification
    pub auth_secret: String,

    /// Issuer bound into every token
    pub token_issuer: String,

    /// Whether DELETE and POST require a token
    pub auth_enabled: bool,

    /// Prefix under which images are served
    pub url_prefix: String,

    /// Allowed CORS origins (None = allow any origin)
    pub cors_origins: Option<Vec<String>>,

    /// Cache-Control max-age in seconds
    pub cache_max_age: u32,

    /// Whether to enable request tracing
    pub enable_tracing: bool,
}

impl RouterConfig {
    /// Create a new router configuration with the given auth secret.
    ///
    /// By default:
    /// - Authentication is enabled
    /// - Images live under `/media/images`
    /// - CORS allows any origin
    /// - Cache max-age is 1 hour (3600 seconds)
    /// - Tracing is enabled
    pub fn new(auth_secret: impl Into<String>) -> Self {
        Self {
            auth_secret: auth_secret.into(),
            token_issuer: DEFAULT_TOKEN_ISSUER.to_string(),
            auth_enabled: true,
            url_prefix: DEFAULT_URL_PREFIX.to_string(),
            cors_origins: None,
            cache_max_age: 3600,
            enable_tracing: true,
        }
    }

    /// Create a configuration with authentication disabled.
    ///
    /// **Warning**: This should only be used for development/testing.
    pub fn without_auth() -> Self {
        Self {
            auth_enabled: false,
            ..Self::new(String::new())
        }
    }

    pub fn with_token_issuer(mut self, issuer: impl Into<String>) -> Self {
        self.token_issuer = issuer.into();
        self
    }

    pub fn with_url_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.url_prefix = prefix.into();
        self
    }

    /// Set specific allowed CORS origins.
    ///
    /// Pass an empty vec to disallow all cross-origin requests.
    pub fn with_cors_origins(mut self, origins: Vec<String>) -> Self {
        self.cors_origins = Some(origins);
        self
    }

    pub fn with_cors_any_origin(mut self) -> Self {
        self.cors_origins = None;
        self
    }

    pub fn with_cache_max_age(mut self, seconds: u32) -> Self {
        self.cache_max_age = seconds;
        self
    }

    pub fn with_auth_enabled(mut self, enabled: bool) -> Self {
        self.auth_enabled = enabled;
        self
    }

    pub fn with_tracing(mut self, enabled: bool) -> Self {
        self.enable_tracing = enabled;
        self
    }

    /// Token verifier, or `None` when authentication is disabled.
    pub fn token_auth(&self) -> Option<TokenAuth> {
        self.auth_enabled
            .then(|| TokenAuth::new(&self.auth_secret, self.token_issuer.clone()))
    }
}

// =============================================================================
// Router Builder
// =============================================================================

/// Create the main application router.
///
/// Every media route passes through the auth middleware, which only marks
/// requests; DELETE and POST handlers refuse unauthorized ones.
pub fn create_router<S>(media: MediaService<S>, config: RouterConfig) -> Router
where
    S: ImageStore,
{
    let body_limit = media
        .upload_config()
        .max_upload_bytes()
        .saturating_mul(BODY_LIMIT_FACTOR);
    let body_limit = usize::try_from(body_limit).unwrap_or(usize::MAX);

    let app_state = AppState::with_cache_max_age(media, config.cache_max_age);
    let prefix = normalize_prefix(&config.url_prefix);
    let upload_route = if prefix.is_empty() { "/" } else { prefix.as_str() };

    let media_routes = Router::new()
        .route(
            &format!("{}/{{*path}}", prefix),
            get(read_handler::<S>).delete(delete_handler::<S>),
        )
        .route(upload_route, post(upload_handler::<S>))
        .layer(DefaultBodyLimit::max(body_limit))
        .with_state(app_state)
        .layer(middleware::from_fn_with_state(
            config.token_auth(),
            auth_middleware,
        ));

    let router = Router::new()
        .route("/health", get(health_handler))
        .merge(media_routes)
        .layer(build_cors_layer(&config))
        .layer(CatchPanicLayer::new());

    if config.enable_tracing {
        router.layer(TraceLayer::new_for_http())
    } else {
        router
    }
}

/// Leading slash, no trailing slash; the root prefix becomes empty.
pub fn normalize_prefix(prefix: &str) -> String {
    let trimmed = prefix.trim().trim_matches('/');
    if trimmed.is_empty() {
        String::new()
    } else {
        format!("/{}", trimmed)
    }
}

/// Build the CORS layer based on configuration.
fn build_cors_layer(config: &RouterConfig) -> CorsLayer {
    let cors = CorsLayer::new()
        .allow_methods([
            Method::GET,
            Method::HEAD,
            Method::POST,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([AUTHORIZATION, CONTENT_TYPE])
        .max_age(Duration::from_secs(86400));

    match &config.cors_origins {
        None => cors.allow_origin(Any),
        Some(origins) if origins.is_empty() => cors,
        Some(origins) => {
            let parsed_origins: Vec<_> = origins.iter().filter_map(|o| o.parse().ok()).collect();
            cors.allow_origin(parsed_origins)
        }
    }
}

/// Create a development router with authentication disabled.
///
/// **Warning**: This should only be used for local development and testing.
pub fn create_dev_router<S>(media: MediaService<S>) -> Router
where
    S: ImageStore,
{
    create_router(media, RouterConfig::without_auth())
}

// =============================================================================
// Tests
// =============================================================================
