//! Test utilities for integration tests.
//!
//! Mock origins, store wrappers that count derivative writes or inject
//! failures, image builders and request helpers.

use std::collections::HashMap;
use std::io::Cursor;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{header, Request, Response};
use axum::Router;
use bytes::Bytes;
use http_body_util::BodyExt;
use image::{DynamicImage, ImageFormat, Rgb, RgbImage};
use tempfile::TempDir;

use media_cache::error::{OriginError, StoreError};
use media_cache::identity::ImageIdentity;
use media_cache::origin::Origin;
use media_cache::server::{TokenAuth, DEFAULT_TOKEN_ISSUER};
use media_cache::store::{ImageStore, LocalStore, StoreLayout};
use media_cache::{create_router, MediaConfig, MediaService, RouterConfig};

pub const TEST_SECRET: &str = "test-secret-key-for-hmac-signing";

// =============================================================================
// Images
// =============================================================================

/// Gradient image so resizes produce non-trivial output.
pub fn create_test_image(width: u32, height: u32) -> DynamicImage {
    let img = RgbImage::from_fn(width, height, |x, y| {
        Rgb([
            (x * 255 / width.max(1)) as u8,
            (y * 255 / height.max(1)) as u8,
            128,
        ])
    });
    DynamicImage::ImageRgb8(img)
}

pub fn encode_image(image: &DynamicImage, format: ImageFormat) -> Vec<u8> {
    let mut buf = Cursor::new(Vec::new());
    image.write_to(&mut buf, format).unwrap();
    buf.into_inner()
}

pub fn create_test_png(width: u32, height: u32) -> Vec<u8> {
    encode_image(&create_test_image(width, height), ImageFormat::Png)
}

pub fn create_test_jpeg(width: u32, height: u32) -> Vec<u8> {
    encode_image(&create_test_image(width, height), ImageFormat::Jpeg)
}

pub fn dimensions(data: &[u8]) -> (u32, u32) {
    let img = image::load_from_memory(data).unwrap();
    (img.width(), img.height())
}

/// Write `data` at `<root>/<rel>`, creating parents.
pub fn seed_file(root: &Path, rel: &str, data: &[u8]) {
    let path = root.join(rel);
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    std::fs::write(path, data).unwrap();
}

// =============================================================================
// Mock Origin
// =============================================================================

/// Origin serving a fixed set of relative paths.
#[derive(Default)]
pub struct MockOrigin {
    files: HashMap<String, Bytes>,
    unreachable: bool,
    fetches: AtomicUsize,
}

impl MockOrigin {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_file(mut self, path: impl Into<String>, data: Vec<u8>) -> Self {
        self.files.insert(path.into(), Bytes::from(data));
        self
    }

    /// Every fetch fails as a transport error.
    pub fn unreachable() -> Self {
        Self {
            unreachable: true,
            ..Self::default()
        }
    }

    pub fn fetch_count(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Origin for MockOrigin {
    async fn fetch(&self, relative_path: &str) -> Result<Bytes, OriginError> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        let url = format!("mock://origin/{}", relative_path);
        if self.unreachable {
            return Err(OriginError::Transport {
                url,
                message: "connection refused".to_string(),
            });
        }
        self.files
            .get(relative_path)
            .cloned()
            .ok_or(OriginError::Status { url, status: 404 })
    }

    fn describe(&self) -> String {
        "mock://origin".to_string()
    }
}

// =============================================================================
// Counting Store
// =============================================================================

/// LocalStore wrapper that counts `save_derivative` calls and can slow
/// them down to widen race windows.
pub struct CountingStore {
    inner: LocalStore,
    saves: Arc<AtomicUsize>,
    save_delay: Duration,
}

impl CountingStore {
    pub fn new(inner: LocalStore, save_delay: Duration) -> (Self, Arc<AtomicUsize>) {
        let saves = Arc::new(AtomicUsize::new(0));
        (
            Self {
                inner,
                saves: Arc::clone(&saves),
                save_delay,
            },
            saves,
        )
    }
}

#[async_trait]
impl ImageStore for CountingStore {
    type Writer = <LocalStore as ImageStore>::Writer;

    fn layout(&self) -> &StoreLayout {
        self.inner.layout()
    }

    async fn exists(&self, identity: &ImageIdentity, resized: bool) -> Result<bool, StoreError> {
        self.inner.exists(identity, resized).await
    }

    async fn create_original_writer(
        &self,
        folder: &str,
        file_name: &str,
    ) -> Result<Self::Writer, StoreError> {
        self.inner.create_original_writer(folder, file_name).await
    }

    async fn open_original(&self, identity: &ImageIdentity) -> Result<DynamicImage, StoreError> {
        self.inner.open_original(identity).await
    }

    async fn read(&self, identity: &ImageIdentity, resized: bool) -> Result<Bytes, StoreError> {
        self.inner.read(identity, resized).await
    }

    async fn save_derivative(
        &self,
        identity: &ImageIdentity,
        image: DynamicImage,
    ) -> Result<Bytes, StoreError> {
        self.saves.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(self.save_delay).await;
        self.inner.save_derivative(identity, image).await
    }

    async fn store_fetched(&self, identity: &ImageIdentity, data: Bytes) -> Result<(), StoreError> {
        self.inner.store_fetched(identity, data).await
    }

    async fn is_dir_empty(&self, path: &Path) -> Result<bool, StoreError> {
        self.inner.is_dir_empty(path).await
    }

    async fn remove_file(&self, path: &Path) -> Result<(), StoreError> {
        self.inner.remove_file(path).await
    }

    async fn remove_tree(&self, path: &Path) -> Result<(), StoreError> {
        self.inner.remove_tree(path).await
    }
}

// =============================================================================
// Faulty Store
// =============================================================================

/// LocalStore wrapper that fails, or panics, on one operation.
///
/// `op` is one of `exists`, `create`, `is_dir_empty`, `remove_file`,
/// `remove_tree`. With a `target`, only paths ending with it are affected.
pub struct FaultyStore {
    inner: LocalStore,
    op: &'static str,
    target: Option<PathBuf>,
    panic: bool,
}

impl FaultyStore {
    pub fn failing(inner: LocalStore, op: &'static str, target: Option<PathBuf>) -> Self {
        Self {
            inner,
            op,
            target,
            panic: false,
        }
    }

    pub fn panicking(inner: LocalStore, op: &'static str) -> Self {
        Self {
            inner,
            op,
            target: None,
            panic: true,
        }
    }

    fn check(&self, op: &'static str, path: &Path) -> Result<(), StoreError> {
        if op != self.op {
            return Ok(());
        }
        if let Some(target) = &self.target {
            if !path.ends_with(target) {
                return Ok(());
            }
        }
        if self.panic {
            panic!("injected panic in {}", op);
        }
        Err(StoreError::Io {
            op,
            path: path.to_path_buf(),
            message: "injected failure".to_string(),
        })
    }
}

#[async_trait]
impl ImageStore for FaultyStore {
    type Writer = <LocalStore as ImageStore>::Writer;

    fn layout(&self) -> &StoreLayout {
        self.inner.layout()
    }

    async fn exists(&self, identity: &ImageIdentity, resized: bool) -> Result<bool, StoreError> {
        self.check("exists", &self.layout().artifact_file(identity, resized))?;
        self.inner.exists(identity, resized).await
    }

    async fn create_original_writer(
        &self,
        folder: &str,
        file_name: &str,
    ) -> Result<Self::Writer, StoreError> {
        self.check("create", &self.layout().folder_path(folder).join(file_name))?;
        self.inner.create_original_writer(folder, file_name).await
    }

    async fn open_original(&self, identity: &ImageIdentity) -> Result<DynamicImage, StoreError> {
        self.inner.open_original(identity).await
    }

    async fn read(&self, identity: &ImageIdentity, resized: bool) -> Result<Bytes, StoreError> {
        self.inner.read(identity, resized).await
    }

    async fn save_derivative(
        &self,
        identity: &ImageIdentity,
        image: DynamicImage,
    ) -> Result<Bytes, StoreError> {
        self.inner.save_derivative(identity, image).await
    }

    async fn store_fetched(&self, identity: &ImageIdentity, data: Bytes) -> Result<(), StoreError> {
        self.inner.store_fetched(identity, data).await
    }

    async fn is_dir_empty(&self, path: &Path) -> Result<bool, StoreError> {
        self.check("is_dir_empty", path)?;
        self.inner.is_dir_empty(path).await
    }

    async fn remove_file(&self, path: &Path) -> Result<(), StoreError> {
        self.check("remove_file", path)?;
        self.inner.remove_file(path).await
    }

    async fn remove_tree(&self, path: &Path) -> Result<(), StoreError> {
        self.check("remove_tree", path)?;
        self.inner.remove_tree(path).await
    }
}

// =============================================================================
// Routers
// =============================================================================

pub fn local_store(dir: &TempDir, config: &MediaConfig) -> LocalStore {
    LocalStore::new(dir.path(), config.codec())
}

/// Router over `dir` with auth disabled.
pub fn dev_router(dir: &TempDir) -> Router {
    let config = MediaConfig::default();
    let media = MediaService::new(local_store(dir, &config), &config);
    create_router(media, RouterConfig::without_auth().with_tracing(false))
}

/// Router over `dir` with bearer auth enabled.
pub fn auth_router(dir: &TempDir) -> Router {
    let config = MediaConfig::default();
    let media = MediaService::new(local_store(dir, &config), &config);
    create_router(media, RouterConfig::new(TEST_SECRET).with_tracing(false))
}

/// Router over `dir` falling back to `origin`, auth disabled.
pub fn proxy_router(dir: &TempDir, origin: Arc<dyn Origin>, write_through: bool) -> Router {
    let config = MediaConfig {
        proxy_write_through: write_through,
        ..MediaConfig::default()
    };
    let media = MediaService::with_origin(local_store(dir, &config), &config, origin);
    create_router(media, RouterConfig::without_auth().with_tracing(false))
}

/// Router over an arbitrary store, auth disabled. With `origin`, missing
/// artifacts are fetched from it.
pub fn store_router<S: ImageStore>(store: S, origin: Option<Arc<dyn Origin>>) -> Router {
    let config = MediaConfig::default();
    let media = match origin {
        Some(origin) => MediaService::with_origin(store, &config, origin),
        None => MediaService::new(store, &config),
    };
    create_router(media, RouterConfig::without_auth().with_tracing(false))
}

// =============================================================================
// Requests
// =============================================================================

/// Token valid for one hour, signed with [`TEST_SECRET`].
pub fn valid_token() -> String {
    TokenAuth::new(TEST_SECRET, DEFAULT_TOKEN_ISSUER)
        .issue("tests", Duration::from_secs(3600))
        .0
}

pub fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

pub fn delete(uri: &str, token: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder().method("DELETE").uri(uri);
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
    }
    builder.body(Body::empty()).unwrap()
}

/// One multipart part: field name, optional file name, content.
pub struct Part<'a> {
    pub field: &'a str,
    pub file_name: Option<&'a str>,
    pub data: Vec<u8>,
}

impl<'a> Part<'a> {
    pub fn file(file_name: &'a str, data: Vec<u8>) -> Self {
        Self {
            field: "files",
            file_name: Some(file_name),
            data,
        }
    }
}

const BOUNDARY: &str = "media-cache-test-boundary";

pub fn upload(uri: &str, token: Option<&str>, parts: Vec<Part<'_>>) -> Request<Body> {
    let mut body = Vec::new();
    for part in parts {
        body.extend_from_slice(format!("--{}\r\n", BOUNDARY).as_bytes());
        match part.file_name {
            Some(name) => body.extend_from_slice(
                format!(
                    "Content-Disposition: form-data; name=\"{}\"; filename=\"{}\"\r\n",
                    part.field, name
                )
                .as_bytes(),
            ),
            None => body.extend_from_slice(
                format!("Content-Disposition: form-data; name=\"{}\"\r\n", part.field).as_bytes(),
            ),
        }
        body.extend_from_slice(b"Content-Type: application/octet-stream\r\n\r\n");
        body.extend_from_slice(&part.data);
        body.extend_from_slice(b"\r\n");
    }
    body.extend_from_slice(format!("--{}--\r\n", BOUNDARY).as_bytes());

    let mut builder = Request::builder().method("POST").uri(uri).header(
        header::CONTENT_TYPE,
        format!("multipart/form-data; boundary={}", BOUNDARY),
    );
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
    }
    builder.body(Body::from(body)).unwrap()
}

pub async fn body_bytes(response: Response<Body>) -> Bytes {
    response.into_body().collect().await.unwrap().to_bytes()
}

pub async fn body_json(response: Response<Body>) -> serde_json::Value {
    serde_json::from_slice(&body_bytes(response).await).unwrap()
}
