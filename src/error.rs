use std::path::PathBuf;

use thiserror::Error;

/// Reasons a request path fails to resolve to an image identity.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PathError {
    /// Path does not have 2 (original) or 3 (derivative) segments
    #[error("Invalid segment count: expected 2 or 3, got {0}")]
    SegmentCount(usize),

    /// Folder segment contains characters outside `[A-Za-z0-9_]`
    #[error("Invalid folder name: {0}")]
    InvalidFolder(String),

    /// File segment is not `<name>.<ext>` with a supported extension
    #[error("Invalid image file name: {0}")]
    InvalidFileName(String),

    /// Size segment is not one of `WxH`, `Wx`, `xH` with a positive dimension
    #[error("Invalid size token: {0}")]
    InvalidSize(String),
}

/// Errors returned by an image store.
///
/// `NotFound` is always reported by the store itself so that callers never
/// need to sniff platform error codes.
#[derive(Debug, Clone, Error)]
pub enum StoreError {
    /// File or directory does not exist
    #[error("Not found: {}", .0.display())]
    NotFound(PathBuf),

    /// Any other filesystem failure (permissions, disk, exclusive-create clash)
    #[error("{op} failed for {}: {message}", path.display())]
    Io {
        op: &'static str,
        path: PathBuf,
        message: String,
    },

    /// Stored bytes could not be decoded as an image
    #[error("Failed to decode {}: {message}", path.display())]
    Decode { path: PathBuf, message: String },

    /// Image could not be encoded into the requested format
    #[error("Failed to encode {}: {message}", path.display())]
    Encode { path: PathBuf, message: String },
}

impl StoreError {
    /// Classify a `std::io::Error` for the given operation and path.
    pub fn from_io(op: &'static str, path: impl Into<PathBuf>, err: std::io::Error) -> Self {
        let path = path.into();
        if err.kind() == std::io::ErrorKind::NotFound {
            StoreError::NotFound(path)
        } else {
            StoreError::Io {
                op,
                path,
                message: err.to_string(),
            }
        }
    }

    /// Wrap a failure of a write-side operation. Never `NotFound`.
    pub fn io(op: &'static str, path: impl Into<PathBuf>, err: std::io::Error) -> Self {
        StoreError::Io {
            op,
            path: path.into(),
            message: err.to_string(),
        }
    }

    /// Whether this error means the path does not exist.
    pub fn is_not_found(&self) -> bool {
        matches!(self, StoreError::NotFound(_))
    }
}

/// Errors from the remote origin consulted in proxy mode.
#[derive(Debug, Clone, Error)]
pub enum OriginError {
    /// Origin answered outside the 2xx range
    #[error("Origin returned status {status} for {url}")]
    Status { url: String, status: u16 },

    /// Request never produced a response (connection, timeout, body read)
    #[error("Origin request to {url} failed: {message}")]
    Transport { url: String, message: String },

    /// Configured base URL cannot be used to build request URLs
    #[error("Invalid origin URL '{url}': {message}")]
    InvalidBase { url: String, message: String },
}

impl OriginError {
    /// Non-2xx answers are folded into NotFound.
    pub fn is_not_found(&self) -> bool {
        matches!(self, OriginError::Status { .. })
    }
}

/// Errors produced while resolving a read request.
#[derive(Debug, Clone, Error)]
pub enum ReadError {
    /// Request path did not parse (served as 404)
    #[error("Invalid image path '{path}': {source}")]
    InvalidPath { path: String, source: PathError },

    /// Nothing local and nothing at the origin
    #[error("Image not found: {0}")]
    NotFound(String),

    /// Resizing would need an image larger than the dimension limit
    #[error("Derivative {path} needs a {width}x{height} image, limit is {max}")]
    DimensionLimit {
        path: String,
        width: u64,
        height: u64,
        max: u32,
    },

    /// Storage, decode or encode failure
    #[error(transparent)]
    Store(#[from] StoreError),

    /// Origin could not be reached
    #[error(transparent)]
    Origin(OriginError),
}

/// Errors from the image codec.
#[derive(Debug, Error)]
pub enum CodecError {
    /// Extension has no encoder in this build
    #[error("Unsupported output format: {0}")]
    UnsupportedFormat(String),

    /// Decoding or encoding failed inside the image library
    #[error(transparent)]
    Image(#[from] image::ImageError),
}

/// Errors produced while storing an uploaded original.
#[derive(Debug, Error)]
pub enum UploadError {
    /// Upload payload failed validation; messages are user facing
    #[error("{}", .0.join("; "))]
    Validation(Vec<String>),

    /// Writing the original failed
    #[error(transparent)]
    Store(#[from] StoreError),
}
