//! On-disk layout of originals and derivatives.
//!
//! ```text
//! <root>/<folder>/<name>.<ext>                                  original
//! <root>/cache/resized_image/<folder>/<name>/<W>x<H>.<ext>      derivative
//! ```
//!
//! Every location is a pure function of the identity, so the layout never
//! touches the filesystem.

use std::path::{Path, PathBuf};

use crate::identity::ImageIdentity;

/// Directory (relative to the root) holding every derivative.
pub const DERIVATIVE_ROOT: &str = "cache/resized_image";

/// Computes storage paths under an assets root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreLayout {
    root: PathBuf,
}

impl StoreLayout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// `<root>/cache/resized_image`
    pub fn derivative_root(&self) -> PathBuf {
        self.root.join(DERIVATIVE_ROOT)
    }

    /// `<root>/<folder>`
    pub fn original_folder(&self, identity: &ImageIdentity) -> PathBuf {
        self.folder_path(identity.folder())
    }

    /// `<root>/<folder>` for an upload group that has no identity yet.
    pub fn folder_path(&self, folder: &str) -> PathBuf {
        self.root.join(folder)
    }

    /// `<root>/<folder>/<name>.<ext>`
    pub fn original_file(&self, identity: &ImageIdentity) -> PathBuf {
        self.original_folder(identity).join(identity.file_name())
    }

    /// `<root>/cache/resized_image/<folder>`
    pub fn derivative_parent_folder(&self, identity: &ImageIdentity) -> PathBuf {
        self.derivative_root().join(identity.folder())
    }

    /// `<root>/cache/resized_image/<folder>/<name>`
    pub fn derivative_folder(&self, identity: &ImageIdentity) -> PathBuf {
        self.derivative_parent_folder(identity)
            .join(identity.base_name())
    }

    /// `<root>/cache/resized_image/<folder>/<name>/<W>x<H>.<ext>`
    ///
    /// Unset dimensions render as `0`. An identity without a resize spec maps
    /// to `0x0`, which no valid request can produce.
    pub fn derivative_file(&self, identity: &ImageIdentity) -> PathBuf {
        let stem = identity
            .resize()
            .map(|spec| spec.file_stem())
            .unwrap_or_else(|| "0x0".to_string());
        self.derivative_folder(identity)
            .join(format!("{}.{}", stem, identity.extension()))
    }

    /// Original or derivative file, chosen by `resized`.
    pub fn artifact_file(&self, identity: &ImageIdentity, resized: bool) -> PathBuf {
        if resized {
            self.derivative_file(identity)
        } else {
            self.original_file(identity)
        }
    }
}
