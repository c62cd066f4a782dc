//! Upload path: validate and store new originals.
//!
//! All files of one request land in one freshly allocated folder. Nothing is
//! written until every file has passed validation and been re-encoded, so a
//! rejected request leaves no trace on disk. A storage failure while writing
//! removes the new folder again.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use bytes::Bytes;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};

use super::resize::bound_upload;
use crate::codec::{format_for_extension, sniff_format, ImageCodec};
use crate::error::{StoreError, UploadError};
use crate::identity::{content_type_for, PathResolver};
use crate::store::ImageStore;

/// Default per-file size limit in megabytes.
pub const DEFAULT_MAX_UPLOAD_MB: u64 = 7;

/// Message returned for a request without files.
pub const EMPTY_UPLOAD_MESSAGE: &str = "Should contain at least 1 element";

/// Limits applied to uploaded files.
#[derive(Debug, Clone)]
pub struct UploadConfig {
    pub max_upload_mb: u64,

    /// Portrait and square images wider than this are scaled down (0 = off)
    pub vert_max_image_width: u32,

    /// Landscape images taller than this are scaled down (0 = off)
    pub horiz_max_image_height: u32,
}

impl UploadConfig {
    pub fn max_upload_bytes(&self) -> u64 {
        self.max_upload_mb.saturating_mul(1024 * 1024)
    }
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            max_upload_mb: DEFAULT_MAX_UPLOAD_MB,
            vert_max_image_width: 0,
            horiz_max_image_height: 0,
        }
    }
}

/// One file taken from the request.
#[derive(Debug, Clone)]
pub struct UploadedFile {
    /// Client-supplied name, if any
    pub file_name: Option<String>,
    pub data: Bytes,
}

impl UploadedFile {
    pub fn new(file_name: Option<String>, data: impl Into<Bytes>) -> Self {
        Self {
            file_name,
            data: data.into(),
        }
    }
}

struct PreparedFile {
    stem: String,
    extension: String,
    data: Bytes,
}

enum Encoded {
    Ok(Bytes),
    Undecodable(String),
    Unencodable(String),
}

// =============================================================================
// Upload Service
// =============================================================================

/// Validates, normalizes and persists uploaded originals.
pub struct UploadService<S: ImageStore> {
    store: Arc<S>,
    resolver: Arc<PathResolver>,
    codec: ImageCodec,
    config: UploadConfig,
}

impl<S: ImageStore> UploadService<S> {
    pub fn new(
        store: Arc<S>,
        resolver: Arc<PathResolver>,
        codec: ImageCodec,
        config: UploadConfig,
    ) -> Self {
        Self {
            store,
            resolver,
            codec,
            config,
        }
    }

    pub fn config(&self) -> &UploadConfig {
        &self.config
    }

    /// Store every file and return their `<folder>/<name>.<ext>` paths.
    pub async fn upload(&self, files: Vec<UploadedFile>) -> Result<Vec<String>, UploadError> {
        if files.is_empty() {
            return Err(UploadError::Validation(vec![EMPTY_UPLOAD_MESSAGE.to_string()]));
        }

        let mut messages = Vec::new();
        let mut prepared = Vec::with_capacity(files.len());
        for file in files {
            match self.prepare(file).await {
                Ok(Ok(file)) => prepared.push(file),
                Ok(Err(message)) => messages.push(message),
                Err(e) => return Err(e.into()),
            }
        }
        if !messages.is_empty() {
            debug!(errors = ?messages, "Upload rejected");
            return Err(UploadError::Validation(messages));
        }

        let folder = self.allocate_folder().await?;
        match self.write_files(&folder, prepared).await {
            Ok(stored) => {
                info!(folder = %folder, files = stored.len(), "Stored upload");
                Ok(stored)
            }
            Err(e) => {
                let folder_path = self.store.layout().folder_path(&folder);
                match self.store.remove_tree(&folder_path).await {
                    Ok(()) => {}
                    Err(cleanup) if cleanup.is_not_found() => {}
                    Err(cleanup) => {
                        warn!(error = %cleanup, "Failed to remove partial upload folder")
                    }
                }
                Err(e.into())
            }
        }
    }

    /// Write every prepared file into `folder`, returning `<folder>/<name>`
    /// for each.
    async fn write_files(
        &self,
        folder: &str,
        prepared: Vec<PreparedFile>,
    ) -> Result<Vec<String>, StoreError> {
        let mut used = HashSet::new();
        let mut stored = Vec::with_capacity(prepared.len());

        for file in prepared {
            let name = unique_name(&file.stem, &file.extension, &mut used);
            let path = self.store.layout().folder_path(folder).join(&name);

            let mut writer = self.store.create_original_writer(folder, &name).await?;
            writer
                .write_all(&file.data)
                .await
                .map_err(|e| StoreError::io("write", &path, e))?;
            writer
                .flush()
                .await
                .map_err(|e| StoreError::io("flush", &path, e))?;

            stored.push(format!("{}/{}", folder, name));
        }

        Ok(stored)
    }

    /// Validate and re-encode one file. The inner `Err` is a user-facing
    /// validation message.
    async fn prepare(&self, file: UploadedFile) -> Result<Result<PreparedFile, String>, StoreError> {
        let size = file.data.len() as u64;
        if size > self.config.max_upload_bytes() {
            return Ok(Err(format!(
                "The file is too large ({} bytes). Allowed maximum size is {} Mb",
                size, self.config.max_upload_mb
            )));
        }

        let format = sniff_format(&file.data);
        let sniffed = format.and_then(|f| {
            f.extensions_str()
                .iter()
                .find(|ext| self.resolver.supports(ext) && format_for_extension(ext).is_some())
                .map(|ext| ext.to_string())
        });
        let Some(sniffed) = sniffed else {
            let mime = format.map_or("application/octet-stream", |f| f.to_mime_type());
            return Ok(Err(format!(
                "Not supported image type '{}', supported types are {}",
                mime,
                self.supported_types()
            )));
        };

        let display_name = file.file_name.clone().unwrap_or_default();
        let extension = match file.file_name.as_deref().and_then(file_extension) {
            Some(ext) if self.resolver.supports(ext) && format_for_extension(ext).is_some() => {
                ext.to_string()
            }
            _ => sniffed,
        };
        let stem = sanitize_stem(file.file_name.as_deref());

        let codec = self.codec;
        let (max_width, max_height) = (
            self.config.vert_max_image_width,
            self.config.horiz_max_image_height,
        );
        let target = extension.clone();
        let data = file.data;
        let encoded = tokio::task::spawn_blocking(move || {
            let image = match codec.decode(&data) {
                Ok(image) => image,
                Err(e) => return Encoded::Undecodable(e.to_string()),
            };
            let image = bound_upload(&image, max_width, max_height).unwrap_or(image);
            match codec.encode(&image, &target) {
                Ok(bytes) => Encoded::Ok(bytes),
                Err(e) => Encoded::Unencodable(e.to_string()),
            }
        })
        .await
        .map_err(|e| StoreError::Io {
            op: "encode",
            path: display_name.clone().into(),
            message: e.to_string(),
        })?;

        match encoded {
            Encoded::Ok(data) => Ok(Ok(PreparedFile {
                stem,
                extension,
                data,
            })),
            Encoded::Undecodable(message) => Ok(Err(format!(
                "Could not decode image '{}': {}",
                display_name, message
            ))),
            Encoded::Unencodable(message) => Err(StoreError::Encode {
                path: display_name.into(),
                message,
            }),
        }
    }

    /// MIME types of the configured extensions, deduplicated, `|`-separated.
    fn supported_types(&self) -> String {
        let mut types: Vec<&str> = Vec::new();
        for ext in self.resolver.extensions() {
            let mime = content_type_for(ext);
            if !types.contains(&mime) {
                types.push(mime);
            }
        }
        types.join("|")
    }

    /// Pick a folder token derived from the current time that is not in use.
    async fn allocate_folder(&self) -> Result<String, StoreError> {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default();
        let (mut secs, mut micros) = (now.as_secs(), now.subsec_micros());

        loop {
            let folder = folder_token(secs, micros);
            let path = self.store.layout().folder_path(&folder);
            match self.store.is_dir_empty(&path).await {
                Err(e) if e.is_not_found() => return Ok(folder),
                Err(e) => return Err(e),
                Ok(_) => {
                    micros += 1;
                    if micros >= 1_000_000 {
                        micros = 0;
                        secs += 1;
                    }
                }
            }
        }
    }
}

// =============================================================================
// Naming
// =============================================================================

/// `{secs:08x}{micros:05x}`
pub fn folder_token(secs: u64, micros: u32) -> String {
    format!("{:08x}{:05x}", secs, micros)
}

/// Extension of a client file name, without the dot.
fn file_extension(file_name: &str) -> Option<&str> {
    let base = base_name(file_name);
    match base.rfind('.') {
        Some(i) if i > 0 && i + 1 < base.len() => Some(&base[i + 1..]),
        _ => None,
    }
}

fn base_name(file_name: &str) -> &str {
    file_name
        .rsplit(|c| c == '/' || c == '\\')
        .next()
        .unwrap_or(file_name)
}

/// File stem with every character outside `[A-Za-z0-9_-]` replaced by `_`.
pub fn sanitize_stem(file_name: Option<&str>) -> String {
    let base = base_name(file_name.unwrap_or(""));
    let stem = match base.rfind('.') {
        Some(i) => &base[..i],
        None => base,
    };

    let sanitized: String = stem
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '_' || c == '-' {
                c
            } else {
                '_'
            }
        })
        .collect();

    if sanitized.is_empty() {
        "image".to_string()
    } else {
        sanitized
    }
}

fn unique_name(stem: &str, extension: &str, used: &mut HashSet<String>) -> String {
    let mut name = format!("{}.{}", stem, extension);
    let mut n = 1;
    while !used.insert(name.clone()) {
        name = format!("{}_{}.{}", stem, n, extension);
        n += 1;
    }
    name
}

// =============================================================================
// Tests
// =============================================================================
