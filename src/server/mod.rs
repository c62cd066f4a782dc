//! HTTP server layer.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                         HTTP Layer                              │
//! │      GET / DELETE {prefix}/{*path}      POST {prefix}           │
//! │                                                                 │
//! │  ┌─────────────┐  ┌─────────────┐  ┌─────────────────────────┐  │
//! │  │  handlers   │  │    auth     │  │        routes           │  │
//! │  │ (requests)  │  │  (bearer)   │  │  (router config)        │  │
//! │  └─────────────┘  └─────────────┘  └─────────────────────────┘  │
//! └─────────────────────────────────────────────────────────────────┘
//! ```

pub mod auth;
pub mod handlers;
pub mod routes;

pub use auth::{
    auth_middleware, bearer_token, AuthError, Authorized, OptionalAuth, TokenAuth,
    DEFAULT_TOKEN_DURATION_HOURS, DEFAULT_TOKEN_ISSUER,
};
pub use handlers::{
    delete_handler, health_handler, read_handler, upload_handler, AppState, HealthResponse,
    UploadErrorResponse, UploadResponse, IMAGE_SOURCE_HEADER,
};
pub use routes::{
    create_dev_router, create_router, normalize_prefix, RouterConfig, DEFAULT_URL_PREFIX,
};
