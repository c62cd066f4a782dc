//! Request path parsing.
//!
//! A request path names either an original or a resized derivative:
//!
//! ```text
//! <folder>/<name>.<ext>              original
//! <size>/<folder>/<name>.<ext>       derivative, size ∈ { WxH, Wx, xH }
//! ```
//!
//! Parsing is pure: no I/O, no panics. Every failure is reported as a
//! [`PathError`] and callers fold it into "not found".
//!
//! # Example
//!
//! ```
//! use media_cache::identity::PathResolver;
//!
//! let resolver = PathResolver::default();
//! let identity = resolver.resolve("100x50/abc/def.png").unwrap();
//! assert_eq!(identity.folder(), "abc");
//! assert_eq!(identity.resize().map(|r| (r.width, r.height)), Some((100, 50)));
//! ```

use std::fmt;

use once_cell::sync::Lazy;
use regex::Regex;

use crate::error::PathError;

/// Extensions served when none are configured.
pub const DEFAULT_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "gif"];

/// Largest width or height a derivative may have.
pub const DEFAULT_MAX_DIMENSION: u32 = 8192;

static FOLDER_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[A-Za-z0-9_]+$").unwrap());
static SIZE_BOTH_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^(\d+)x(\d+)$").unwrap());
static SIZE_HEIGHT_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^x(\d+)$").unwrap());
static SIZE_WIDTH_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^(\d+)x$").unwrap());

// =============================================================================
// Identity Types
// =============================================================================

/// Requested output size. A zero dimension is unset and is derived from the
/// source aspect ratio at generation time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ResizeSpec {
    pub width: u32,
    pub height: u32,
}

impl ResizeSpec {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// File stem of the cached derivative, e.g. `100x0`.
    pub fn file_stem(&self) -> String {
        format!("{}x{}", self.width, self.height)
    }
}

/// Renders the size segment as it appears in request paths (`100x50`, `x50`, `100x`).
impl fmt::Display for ResizeSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.width, self.height) {
            (0, h) => write!(f, "x{}", h),
            (w, 0) => write!(f, "{}x", w),
            (w, h) => write!(f, "{}x{}", w, h),
        }
    }
}

/// Validated view of a requested image. Never persisted; it only exists to
/// compute storage locations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageIdentity {
    folder: String,
    base_name: String,
    extension: String,
    resize: Option<ResizeSpec>,
    /// Size segment exactly as requested, forwarded to the origin
    size_segment: Option<String>,
}

impl ImageIdentity {
    /// Upload group token.
    pub fn folder(&self) -> &str {
        &self.folder
    }

    /// File name without extension.
    pub fn base_name(&self) -> &str {
        &self.base_name
    }

    /// Extension without the dot.
    pub fn extension(&self) -> &str {
        &self.extension
    }

    /// `<base_name>.<extension>`
    pub fn file_name(&self) -> String {
        format!("{}.{}", self.base_name, self.extension)
    }

    pub fn resize(&self) -> Option<ResizeSpec> {
        self.resize
    }

    pub fn is_resized(&self) -> bool {
        self.resize.is_some()
    }

    /// Same image without the size segment.
    pub fn original(&self) -> ImageIdentity {
        ImageIdentity {
            resize: None,
            size_segment: None,
            ..self.clone()
        }
    }

    /// Path relative to the URL prefix or the origin base, in request grammar.
    /// The size segment is kept as the client sent it (`0x50`, `007x5`).
    pub fn request_path(&self) -> String {
        match (&self.size_segment, self.resize) {
            (Some(segment), _) => format!("{}/{}/{}", segment, self.folder, self.file_name()),
            (None, Some(spec)) => format!("{}/{}/{}", spec, self.folder, self.file_name()),
            (None, None) => format!("{}/{}", self.folder, self.file_name()),
        }
    }

    /// MIME type implied by the extension.
    pub fn content_type(&self) -> &'static str {
        content_type_for(&self.extension)
    }
}

/// MIME type for a supported image extension.
pub fn content_type_for(extension: &str) -> &'static str {
    match extension.to_ascii_lowercase().as_str() {
        "jpg" | "jpeg" => "image/jpeg",
        "png" => "image/png",
        "gif" => "image/gif",
        _ => "application/octet-stream",
    }
}

// =============================================================================
// Path Resolver
// =============================================================================

/// Parses request paths against a whitelist of extensions and a size limit.
///
/// The file-name pattern is compiled once per resolver, so build one at
/// startup and share it.
#[derive(Debug, Clone)]
pub struct PathResolver {
    file_re: Regex,
    extensions: Vec<String>,
    max_dimension: u32,
}

impl PathResolver {
    /// Create a resolver accepting the given extensions (without dots).
    pub fn new<I, S>(extensions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let extensions: Vec<String> = extensions
            .into_iter()
            .map(Into::into)
            .filter(|e| !e.is_empty())
            .collect();
        let alternation = extensions
            .iter()
            .map(|e| regex::escape(e))
            .collect::<Vec<_>>()
            .join("|");
        let file_re = Regex::new(&format!(r"^([A-Za-z0-9_\-]+)\.({})$", alternation))
            .expect("escaped alternation is a valid pattern");

        Self {
            file_re,
            extensions,
            max_dimension: DEFAULT_MAX_DIMENSION,
        }
    }

    /// Reject size tokens with a dimension above `max_dimension`.
    pub fn with_max_dimension(mut self, max_dimension: u32) -> Self {
        self.max_dimension = max_dimension;
        self
    }

    pub fn max_dimension(&self) -> u32 {
        self.max_dimension
    }

    /// Supported extensions, in configuration order.
    pub fn extensions(&self) -> &[String] {
        &self.extensions
    }

    /// Whether `extension` is on the whitelist.
    pub fn supports(&self, extension: &str) -> bool {
        self.extensions.iter().any(|e| e == extension)
    }

    /// Resolve a slash-delimited request path into an image identity.
    pub fn resolve(&self, path: &str) -> Result<ImageIdentity, PathError> {
        let segments: Vec<&str> = path.trim_matches('/').split('/').collect();

        match segments.as_slice() {
            [folder, file] => {
                let folder = parse_folder(folder)?;
                let (base_name, extension) = self.parse_file_name(file)?;
                Ok(ImageIdentity {
                    folder,
                    base_name,
                    extension,
                    resize: None,
                    size_segment: None,
                })
            }
            [size, folder, file] => {
                let folder = parse_folder(folder)?;
                let (base_name, extension) = self.parse_file_name(file)?;
                let resize = parse_size(size, self.max_dimension)?;
                Ok(ImageIdentity {
                    folder,
                    base_name,
                    extension,
                    resize: Some(resize),
                    size_segment: Some(size.to_string()),
                })
            }
            other => Err(PathError::SegmentCount(other.len())),
        }
    }

    fn parse_file_name(&self, file: &str) -> Result<(String, String), PathError> {
        let captures = self
            .file_re
            .captures(file)
            .ok_or_else(|| PathError::InvalidFileName(file.to_string()))?;

        let name = captures.get(1).map_or("", |m| m.as_str());
        let ext = captures.get(2).map_or("", |m| m.as_str());
        if name.is_empty() || ext.is_empty() {
            return Err(PathError::InvalidFileName(file.to_string()));
        }

        Ok((name.to_string(), ext.to_string()))
    }
}

impl Default for PathResolver {
    fn default() -> Self {
        Self::new(DEFAULT_EXTENSIONS.iter().copied())
    }
}

fn parse_folder(folder: &str) -> Result<String, PathError> {
    if FOLDER_RE.is_match(folder) {
        Ok(folder.to_string())
    } else {
        Err(PathError::InvalidFolder(folder.to_string()))
    }
}

/// Match the size token against `WxH`, `xH`, `Wx` in that order. Each
/// dimension must be at most `max_dimension`.
fn parse_size(token: &str, max_dimension: u32) -> Result<ResizeSpec, PathError> {
    let invalid = || PathError::InvalidSize(token.to_string());
    let number = |s: &str| s.parse::<u32>().map_err(|_| invalid());

    let spec = if let Some(c) = SIZE_BOTH_RE.captures(token) {
        ResizeSpec::new(number(&c[1])?, number(&c[2])?)
    } else if let Some(c) = SIZE_HEIGHT_RE.captures(token) {
        ResizeSpec::new(0, number(&c[1])?)
    } else if let Some(c) = SIZE_WIDTH_RE.captures(token) {
        ResizeSpec::new(number(&c[1])?, 0)
    } else {
        return Err(invalid());
    };

    if spec.width == 0 && spec.height == 0 {
        return Err(invalid());
    }
    if spec.width > max_dimension || spec.height > max_dimension {
        return Err(invalid());
    }
    Ok(spec)
}

/// Resolve a path with the default extension whitelist.
pub fn parse_image_path(path: &str) -> Result<ImageIdentity, PathError> {
    static DEFAULT_RESOLVER: Lazy<PathResolver> = Lazy::new(PathResolver::default);
    DEFAULT_RESOLVER.resolve(path)
}

// =============================================================================
// Tests
// =============================================================================
