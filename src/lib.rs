//! # Media Cache
//!
//! An image server that stores uploaded originals on local disk and serves
//! resized derivatives, generating each one on first request and caching it.
//!
//! ## Features
//!
//! - **Lazy derivatives**: `<W>x<H>/<folder>/<image>` is resized on first
//!   request and served from disk afterwards
//! - **Single-flight generation**: concurrent first requests share one resize
//! - **Origin proxy**: missing artifacts can be fetched from a remote server,
//!   optionally stored locally
//! - **Uploads**: multipart uploads validated, re-encoded and grouped into a
//!   fresh folder
//! - **Authentication**: HMAC-SHA256 bearer tokens guard DELETE and uploads
//!
//! ## Architecture
//!
//! - [`identity`] - Request path parsing
//! - [`store`] - On-disk layout and the storage trait
//! - [`codec`] - Image decoding and encoding
//! - [`origin`] - Remote origin for the proxy fallback
//! - [`engine`] - Read, delete and upload orchestration
//! - [`server`] - Axum-based HTTP server and routes
//! - [`config`] - CLI and configuration types
//!
//! ## Example
//!
//! ```rust,no_run
//! use media_cache::{create_router, LocalStore, MediaConfig, MediaService, RouterConfig};
//!
//! #[tokio::main]
//! async fn main() -> std::io::Result<()> {
//!     let config = MediaConfig::default();
//!     let store = LocalStore::new("./assets", config.codec());
//!     let media = MediaService::new(store, &config);
//!
//!     let router = create_router(media, RouterConfig::new("my-secret-key"));
//!     let listener = tokio::net::TcpListener::bind("0.0.0.0:3000").await?;
//!     axum::serve(listener, router).await
//! }
//! ```

pub mod codec;
pub mod config;
pub mod engine;
pub mod error;
pub mod identity;
pub mod origin;
pub mod server;
pub mod store;

// Re-export commonly used types
pub use codec::{ImageCodec, DEFAULT_JPEG_QUALITY};
pub use config::{CheckConfig, Cli, Command, ServeConfig, TokenConfig, TokenOutputFormat};
pub use engine::{
    DeleteStatus, ImageResponse, ImageSource, MediaConfig, MediaService, UploadConfig,
    UploadedFile,
};
pub use error::{CodecError, OriginError, PathError, ReadError, StoreError, UploadError};
pub use identity::{parse_image_path, ImageIdentity, PathResolver, ResizeSpec};
pub use origin::{HttpOrigin, Origin};
pub use server::{create_router, AppState, RouterConfig, TokenAuth};
pub use store::{ImageStore, LocalStore, StoreLayout};
