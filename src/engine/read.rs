//! Read path: resolve a request to servable bytes.
//!
//! ```text
//!                     ┌───────────────┐
//!   request path ───► │ PathResolver  │ ── invalid ──► NotFound (404)
//!                     └──────┬────────┘
//!             original       │        resized
//!        ┌───────────────────┴───────────────────┐
//!        ▼                                       ▼
//!   original exists? ──yes──► Original     derivative exists? ──yes──► Cached
//!        │ no                                    │ no (single-flight per derivative)
//!        ▼                                       ▼
//!   origin fetch ─────────► Proxy          original exists? ──yes──► resize, save ──► Generated
//!        │ miss                                  │ no
//!        ▼                                       ▼
//!     NotFound                             origin fetch ──► Proxy | NotFound
//! ```

use std::sync::Arc;

use bytes::Bytes;
use tracing::{debug, info, warn};

use super::flight::SingleFlight;
use super::resize::{fill_dimensions, resize_to_spec};
use crate::error::{ReadError, StoreError};
use crate::identity::{ImageIdentity, PathResolver, ResizeSpec};
use crate::origin::Origin;
use crate::store::ImageStore;

// =============================================================================
// Response
// =============================================================================

/// Where the served bytes came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageSource {
    /// Stored original
    Original,
    /// Previously generated derivative
    Cached,
    /// Derivative generated by this request
    Generated,
    /// Fetched from the remote origin
    Proxy,
}

impl ImageSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            ImageSource::Original => "original",
            ImageSource::Cached => "cached",
            ImageSource::Generated => "generated",
            ImageSource::Proxy => "proxy",
        }
    }
}

/// Bytes ready to stream to the client.
#[derive(Debug, Clone)]
pub struct ImageResponse {
    pub data: Bytes,

    /// MIME type implied by the requested extension
    pub content_type: &'static str,

    pub source: ImageSource,
}

impl ImageResponse {
    fn new(identity: &ImageIdentity, data: Bytes, source: ImageSource) -> Self {
        Self {
            data,
            content_type: identity.content_type(),
            source,
        }
    }
}

// =============================================================================
// Read Engine
// =============================================================================

/// Orchestrates GET-style requests.
///
/// Derivatives are generated at most once per path at a time: concurrent
/// first requests for the same derivative share a single generation.
pub struct ReadEngine<S: ImageStore> {
    store: Arc<S>,
    resolver: Arc<PathResolver>,
    origin: Option<Arc<dyn Origin>>,
    write_through: bool,
    flight: SingleFlight<Result<ImageResponse, ReadError>>,
}

impl<S: ImageStore> ReadEngine<S> {
    pub fn new(
        store: Arc<S>,
        resolver: Arc<PathResolver>,
        origin: Option<Arc<dyn Origin>>,
        write_through: bool,
    ) -> Self {
        Self {
            store,
            resolver,
            origin,
            write_through,
            flight: SingleFlight::new(),
        }
    }

    /// Resolve a raw request path (relative to the URL prefix).
    pub async fn read(&self, path: &str) -> Result<ImageResponse, ReadError> {
        let identity = self
            .resolver
            .resolve(path)
            .map_err(|source| ReadError::InvalidPath {
                path: path.to_string(),
                source,
            })?;

        self.read_identity(&identity).await
    }

    /// Resolve an already validated identity.
    pub async fn read_identity(&self, identity: &ImageIdentity) -> Result<ImageResponse, ReadError> {
        match identity.resize() {
            None => self.read_original(identity).await,
            Some(spec) => self.read_derivative(identity, spec).await,
        }
    }

    async fn read_original(&self, identity: &ImageIdentity) -> Result<ImageResponse, ReadError> {
        if self.store.exists(identity, false).await? {
            let data = self.store.read(identity, false).await?;
            return Ok(ImageResponse::new(identity, data, ImageSource::Original));
        }

        self.fetch_from_origin(identity).await
    }

    async fn read_derivative(
        &self,
        identity: &ImageIdentity,
        spec: ResizeSpec,
    ) -> Result<ImageResponse, ReadError> {
        if self.store.exists(identity, true).await? {
            let data = self.store.read(identity, true).await?;
            return Ok(ImageResponse::new(identity, data, ImageSource::Cached));
        }

        let key = self
            .store
            .layout()
            .derivative_file(identity)
            .to_string_lossy()
            .into_owned();

        self.flight
            .run(&key, || self.resolve_derivative(identity, spec))
            .await
    }

    /// Runs once per derivative path at a time. Re-checks the cache so that
    /// callers arriving just after a generation finished reuse it.
    async fn resolve_derivative(
        &self,
        identity: &ImageIdentity,
        spec: ResizeSpec,
    ) -> Result<ImageResponse, ReadError> {
        if self.store.exists(identity, true).await? {
            let data = self.store.read(identity, true).await?;
            return Ok(ImageResponse::new(identity, data, ImageSource::Cached));
        }

        if self.store.exists(identity, false).await? {
            let data = self.generate(identity, spec).await?;
            return Ok(ImageResponse::new(identity, data, ImageSource::Generated));
        }

        self.fetch_from_origin(identity).await
    }

    /// Resize the original. A derived side, or the cover image scaled before
    /// the crop, can exceed the limit even when the requested sides do not;
    /// that is refused before any pixel buffer is allocated.
    async fn generate(&self, identity: &ImageIdentity, spec: ResizeSpec) -> Result<Bytes, ReadError> {
        let original = self.store.open_original(identity).await?;

        let max = self.resolver.max_dimension();
        let (width, height) = fill_dimensions(original.width(), original.height(), spec);
        if width > u64::from(max) || height > u64::from(max) {
            debug!(
                path = %identity.request_path(),
                width,
                height,
                max,
                "Derivative exceeds dimension limit"
            );
            return Err(ReadError::DimensionLimit {
                path: identity.request_path(),
                width,
                height,
                max,
            });
        }

        let resized = tokio::task::spawn_blocking(move || resize_to_spec(&original, spec))
            .await
            .map_err(|e| StoreError::Io {
                op: "resize",
                path: self.store.layout().original_file(identity),
                message: e.to_string(),
            })?;

        let data = self.store.save_derivative(identity, resized).await?;
        info!(
            path = %identity.request_path(),
            bytes = data.len(),
            "Generated derivative"
        );
        Ok(data)
    }

    async fn fetch_from_origin(&self, identity: &ImageIdentity) -> Result<ImageResponse, ReadError> {
        let relative = identity.request_path();
        let Some(origin) = &self.origin else {
            return Err(ReadError::NotFound(relative));
        };

        match origin.fetch(&relative).await {
            Ok(data) => {
                debug!(path = %relative, origin = %origin.describe(), "Served from origin");
                if self.write_through {
                    if let Err(e) = self.store.store_fetched(identity, data.clone()).await {
                        warn!(path = %relative, error = %e, "Failed to store origin response");
                    }
                }
                Ok(ImageResponse::new(identity, data, ImageSource::Proxy))
            }
            Err(e) if e.is_not_found() => {
                debug!(path = %relative, error = %e, "Origin miss");
                Err(ReadError::NotFound(relative))
            }
            Err(e) => Err(ReadError::Origin(e)),
        }
    }

    pub fn proxy_enabled(&self) -> bool {
        self.origin.is_some()
    }
}

// =============================================================================
// Tests
// =============================================================================
