//! Storage of originals and derivatives.
//!
//! [`ImageStore`] is the seam between the engines and the filesystem. The
//! engines only see identities, paths from [`StoreLayout`] and
//! [`StoreError`]; "does not exist" is always reported as
//! `StoreError::NotFound` so callers can branch on it without inspecting
//! platform error codes.

mod layout;
mod local;

use std::path::Path;

use async_trait::async_trait;
use bytes::Bytes;
use image::DynamicImage;
use tokio::io::AsyncWrite;

use crate::error::StoreError;
use crate::identity::ImageIdentity;

pub use layout::{StoreLayout, DERIVATIVE_ROOT};
pub use local::LocalStore;

/// Filesystem projection of image identities.
#[async_trait]
pub trait ImageStore: Send + Sync + 'static {
    /// Writer returned for new originals.
    type Writer: AsyncWrite + Unpin + Send;

    /// Path functions for this store's root.
    fn layout(&self) -> &StoreLayout;

    /// Whether the original (`resized == false`) or the exact derivative
    /// exists as a regular file. Missing paths and directories are `false`.
    async fn exists(&self, identity: &ImageIdentity, resized: bool) -> Result<bool, StoreError>;

    /// Create `<root>/<folder>/<file_name>` exclusively, creating parent
    /// directories as needed.
    async fn create_original_writer(
        &self,
        folder: &str,
        file_name: &str,
    ) -> Result<Self::Writer, StoreError>;

    /// Decode the original into pixels.
    async fn open_original(&self, identity: &ImageIdentity) -> Result<DynamicImage, StoreError>;

    /// Read the stored bytes of the original or derivative.
    async fn read(&self, identity: &ImageIdentity, resized: bool) -> Result<Bytes, StoreError>;

    /// Encode `image` per the identity's extension and persist it at the
    /// derivative path. Returns the persisted bytes.
    async fn save_derivative(
        &self,
        identity: &ImageIdentity,
        image: DynamicImage,
    ) -> Result<Bytes, StoreError>;

    /// Persist bytes fetched from an origin at the original or derivative
    /// path, depending on whether the identity carries a resize spec.
    async fn store_fetched(&self, identity: &ImageIdentity, data: Bytes) -> Result<(), StoreError>;

    /// Whether the directory has no entries.
    async fn is_dir_empty(&self, path: &Path) -> Result<bool, StoreError>;

    async fn remove_file(&self, path: &Path) -> Result<(), StoreError>;

    /// Remove a directory and everything below it.
    async fn remove_tree(&self, path: &Path) -> Result<(), StoreError>;
}
