//! Request orchestration.
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                        MediaService                          │
//! │   ┌────────────┐    ┌──────────────┐    ┌───────────────┐    │
//! │   │ ReadEngine │    │ DeleteEngine │    │ UploadService │    │
//! │   └─────┬──────┘    └──────┬───────┘    └───────┬───────┘    │
//! │         │  resize, flight  │                    │            │
//! │         ▼                  ▼                    ▼            │
//! │   ┌──────────────────────────────────────────────────────┐   │
//! │   │                  ImageStore (+ Origin)               │   │
//! │   └──────────────────────────────────────────────────────┘   │
//! └──────────────────────────────────────────────────────────────┘
//! ```

pub mod delete;
pub mod flight;
pub mod read;
pub mod resize;
pub mod upload;

use std::sync::Arc;

pub use delete::{DeleteEngine, DeleteStatus};
pub use flight::SingleFlight;
pub use read::{ImageResponse, ImageSource, ReadEngine};
pub use resize::{bound_upload, resize_to_spec, target_dimensions};
pub use upload::{UploadConfig, UploadService, UploadedFile, DEFAULT_MAX_UPLOAD_MB};

use crate::codec::{ImageCodec, DEFAULT_JPEG_QUALITY};
use crate::error::{ReadError, UploadError};
use crate::identity::{PathResolver, DEFAULT_EXTENSIONS, DEFAULT_MAX_DIMENSION};
use crate::origin::Origin;
use crate::store::ImageStore;

// =============================================================================
// Configuration
// =============================================================================

/// Settings shared by every engine.
#[derive(Debug, Clone)]
pub struct MediaConfig {
    /// Extensions accepted in request paths and uploads
    pub extensions: Vec<String>,

    /// Store origin responses locally before serving them
    pub proxy_write_through: bool,

    pub upload: UploadConfig,

    pub jpeg_quality: u8,

    /// Largest derivative width or height, requested or computed
    pub max_dimension: u32,
}

impl MediaConfig {
    pub fn codec(&self) -> ImageCodec {
        ImageCodec::new(self.jpeg_quality)
    }

    pub fn resolver(&self) -> PathResolver {
        PathResolver::new(self.extensions.iter().cloned()).with_max_dimension(self.max_dimension)
    }
}

impl Default for MediaConfig {
    fn default() -> Self {
        Self {
            extensions: DEFAULT_EXTENSIONS.iter().map(|e| e.to_string()).collect(),
            proxy_write_through: false,
            upload: UploadConfig::default(),
            jpeg_quality: DEFAULT_JPEG_QUALITY,
            max_dimension: DEFAULT_MAX_DIMENSION,
        }
    }
}

// =============================================================================
// Media Service
// =============================================================================

/// Read, delete and upload over one store.
pub struct MediaService<S: ImageStore> {
    store: Arc<S>,
    reader: ReadEngine<S>,
    deleter: DeleteEngine<S>,
    uploader: UploadService<S>,
}

impl<S: ImageStore> MediaService<S> {
    /// Service without a remote origin.
    pub fn new(store: S, config: &MediaConfig) -> Self {
        Self::build(store, config, None)
    }

    /// Service that falls back to `origin` for artifacts missing locally.
    pub fn with_origin(store: S, config: &MediaConfig, origin: Arc<dyn Origin>) -> Self {
        Self::build(store, config, Some(origin))
    }

    fn build(store: S, config: &MediaConfig, origin: Option<Arc<dyn Origin>>) -> Self {
        let store = Arc::new(store);
        let resolver = Arc::new(config.resolver());
        let proxy_enabled = origin.is_some();

        Self {
            reader: ReadEngine::new(
                store.clone(),
                resolver.clone(),
                origin,
                config.proxy_write_through,
            ),
            deleter: DeleteEngine::new(store.clone(), resolver.clone(), proxy_enabled),
            uploader: UploadService::new(
                store.clone(),
                resolver,
                config.codec(),
                config.upload.clone(),
            ),
            store,
        }
    }

    pub async fn read(&self, path: &str) -> Result<ImageResponse, ReadError> {
        self.reader.read(path).await
    }

    pub async fn delete(&self, path: &str) -> DeleteStatus {
        self.deleter.delete(path).await
    }

    pub async fn upload(&self, files: Vec<UploadedFile>) -> Result<Vec<String>, UploadError> {
        self.uploader.upload(files).await
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    pub fn proxy_enabled(&self) -> bool {
        self.reader.proxy_enabled()
    }

    pub fn upload_config(&self) -> &UploadConfig {
        self.uploader.config()
    }
}
