//! Local-disk image store.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use bytes::Bytes;
use image::DynamicImage;
use tokio::fs;
use tracing::debug;

use super::{ImageStore, StoreLayout};
use crate::codec::ImageCodec;
use crate::error::StoreError;
use crate::identity::ImageIdentity;

static TEMP_COUNTER: AtomicU64 = AtomicU64::new(0);

/// [`ImageStore`] backed by a directory tree on the local filesystem.
///
/// Files are written to a hidden sibling first and renamed into place, so a
/// concurrent reader sees either nothing or the complete artifact.
#[derive(Debug, Clone)]
pub struct LocalStore {
    layout: StoreLayout,
    codec: ImageCodec,
}

impl LocalStore {
    pub fn new(root: impl Into<PathBuf>, codec: ImageCodec) -> Self {
        Self {
            layout: StoreLayout::new(root),
            codec,
        }
    }

    pub fn codec(&self) -> ImageCodec {
        self.codec
    }
}

#[async_trait]
impl ImageStore for LocalStore {
    type Writer = fs::File;

    fn layout(&self) -> &StoreLayout {
        &self.layout
    }

    async fn exists(&self, identity: &ImageIdentity, resized: bool) -> Result<bool, StoreError> {
        let path = self.layout.artifact_file(identity, resized);
        match fs::metadata(&path).await {
            Ok(meta) => Ok(meta.is_file()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(StoreError::from_io("stat", path, e)),
        }
    }

    async fn create_original_writer(
        &self,
        folder: &str,
        file_name: &str,
    ) -> Result<Self::Writer, StoreError> {
        let folder_path = self.layout.folder_path(folder);
        fs::create_dir_all(&folder_path)
            .await
            .map_err(|e| StoreError::io("create_dir", &folder_path, e))?;

        let path = folder_path.join(file_name);
        fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
            .await
            .map_err(|e| StoreError::io("create", path, e))
    }

    async fn open_original(&self, identity: &ImageIdentity) -> Result<DynamicImage, StoreError> {
        let path = self.layout.original_file(identity);
        let data = fs::read(&path)
            .await
            .map_err(|e| StoreError::from_io("read", &path, e))?;

        let codec = self.codec;
        let decode_path = path.clone();
        run_blocking("decode", &path, move || codec.decode(&data))
            .await?
            .map_err(|e| StoreError::Decode {
                path: decode_path,
                message: e.to_string(),
            })
    }

    async fn read(&self, identity: &ImageIdentity, resized: bool) -> Result<Bytes, StoreError> {
        let path = self.layout.artifact_file(identity, resized);
        let data = fs::read(&path)
            .await
            .map_err(|e| StoreError::from_io("read", &path, e))?;
        Ok(Bytes::from(data))
    }

    async fn save_derivative(
        &self,
        identity: &ImageIdentity,
        image: DynamicImage,
    ) -> Result<Bytes, StoreError> {
        let path = self.layout.derivative_file(identity);

        let codec = self.codec;
        let extension = identity.extension().to_string();
        let encoded = run_blocking("encode", &path, move || codec.encode(&image, &extension))
            .await?
            .map_err(|e| StoreError::Encode {
                path: path.clone(),
                message: e.to_string(),
            })?;

        write_atomic(&path, &encoded).await?;
        debug!(path = %path.display(), bytes = encoded.len(), "Saved derivative");
        Ok(encoded)
    }

    async fn store_fetched(&self, identity: &ImageIdentity, data: Bytes) -> Result<(), StoreError> {
        let path = self
            .layout
            .artifact_file(identity, identity.is_resized());
        write_atomic(&path, &data).await?;
        debug!(path = %path.display(), bytes = data.len(), "Stored fetched artifact");
        Ok(())
    }

    async fn is_dir_empty(&self, path: &Path) -> Result<bool, StoreError> {
        let mut entries = fs::read_dir(path)
            .await
            .map_err(|e| StoreError::from_io("read_dir", path, e))?;
        let first = entries
            .next_entry()
            .await
            .map_err(|e| StoreError::from_io("read_dir", path, e))?;
        Ok(first.is_none())
    }

    async fn remove_file(&self, path: &Path) -> Result<(), StoreError> {
        fs::remove_file(path)
            .await
            .map_err(|e| StoreError::from_io("remove_file", path, e))
    }

    async fn remove_tree(&self, path: &Path) -> Result<(), StoreError> {
        fs::remove_dir_all(path)
            .await
            .map_err(|e| StoreError::from_io("remove_dir_all", path, e))
    }
}

/// Run CPU-bound work off the async runtime.
async fn run_blocking<T, F>(op: &'static str, path: &Path, work: F) -> Result<T, StoreError>
where
    T: Send + 'static,
    F: FnOnce() -> T + Send + 'static,
{
    tokio::task::spawn_blocking(work)
        .await
        .map_err(|e| StoreError::Io {
            op,
            path: path.to_path_buf(),
            message: e.to_string(),
        })
}

/// Write through a hidden temporary sibling, then rename into place.
async fn write_atomic(path: &Path, data: &[u8]) -> Result<(), StoreError> {
    let parent = path.parent().unwrap_or_else(|| Path::new("."));
    fs::create_dir_all(parent)
        .await
        .map_err(|e| StoreError::io("create_dir", parent, e))?;

    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let temp = parent.join(format!(
        ".{}.{}-{}.tmp",
        file_name,
        std::process::id(),
        TEMP_COUNTER.fetch_add(1, Ordering::Relaxed)
    ));

    fs::write(&temp, data)
        .await
        .map_err(|e| StoreError::io("write", &temp, e))?;

    if let Err(e) = fs::rename(&temp, path).await {
        let _ = fs::remove_file(&temp).await;
        return Err(StoreError::io("rename", path, e));
    }
    Ok(())
}
