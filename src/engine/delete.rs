//! Delete path: remove an original, its derivatives and any directories the
//! removal left empty.
//!
//! Every step runs regardless of earlier failures; each one may raise the
//! running status and the worst one wins.

use std::path::Path;
use std::sync::Arc;

use http::StatusCode;
use tracing::{debug, error, info, warn};

use crate::error::StoreError;
use crate::identity::{ImageIdentity, PathResolver};
use crate::store::ImageStore;

/// Outcome of a delete, ordered by severity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum DeleteStatus {
    Deleted,
    NotFound,
    Failed,
}

impl DeleteStatus {
    pub fn status_code(&self) -> StatusCode {
        match self {
            DeleteStatus::Deleted => StatusCode::OK,
            DeleteStatus::NotFound => StatusCode::NOT_FOUND,
            DeleteStatus::Failed => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Raise the status to `candidate` if it is more severe.
    fn raise(&mut self, candidate: DeleteStatus) {
        *self = (*self).max(candidate);
    }
}

/// Orchestrates DELETE-style requests.
pub struct DeleteEngine<S: ImageStore> {
    store: Arc<S>,
    resolver: Arc<PathResolver>,
    proxy_enabled: bool,
}

impl<S: ImageStore> DeleteEngine<S> {
    /// With `proxy_enabled`, originals that were never stored locally and
    /// pruning failures are tolerated.
    pub fn new(store: Arc<S>, resolver: Arc<PathResolver>, proxy_enabled: bool) -> Self {
        Self {
            store,
            resolver,
            proxy_enabled,
        }
    }

    /// Delete the original named by `<folder>/<image>`.
    ///
    /// Paths that do not parse, or that name a derivative, are `NotFound`.
    pub async fn delete(&self, path: &str) -> DeleteStatus {
        match self.resolver.resolve(path) {
            Ok(identity) if !identity.is_resized() => self.delete_identity(&identity).await,
            Ok(_) => {
                debug!(path = %path, "Refusing to delete a derivative path");
                DeleteStatus::NotFound
            }
            Err(e) => {
                debug!(path = %path, error = %e, "Invalid delete path");
                DeleteStatus::NotFound
            }
        }
    }

    /// Run the cascade for a resolved original.
    pub async fn delete_identity(&self, identity: &ImageIdentity) -> DeleteStatus {
        let layout = self.store.layout();
        let mut status = DeleteStatus::Deleted;

        let original = layout.original_file(identity);
        match self.store.remove_file(&original).await {
            Ok(()) => debug!(path = %original.display(), "Removed original"),
            Err(e) if e.is_not_found() => {
                if self.proxy_enabled {
                    warn!(path = %original.display(), "Original not stored locally");
                } else {
                    status.raise(DeleteStatus::NotFound);
                }
            }
            Err(e) => {
                error!(error = %e, "Failed to remove original");
                status.raise(DeleteStatus::Failed);
            }
        }

        let derivatives = layout.derivative_folder(identity);
        match self.store.remove_tree(&derivatives).await {
            Ok(()) => debug!(path = %derivatives.display(), "Removed derivatives"),
            Err(e) if e.is_not_found() => {}
            Err(e) => {
                error!(error = %e, "Failed to remove derivatives");
                status.raise(DeleteStatus::Failed);
            }
        }

        status.raise(self.prune(&layout.original_folder(identity)).await);
        status.raise(self.prune(&layout.derivative_parent_folder(identity)).await);

        info!(
            path = %identity.request_path(),
            status = status.status_code().as_u16(),
            "Delete finished"
        );
        status
    }

    /// Remove `dir` if it is empty. A directory that is already gone is
    /// nothing to prune.
    async fn prune(&self, dir: &Path) -> DeleteStatus {
        let result = match self.store.is_dir_empty(dir).await {
            Ok(true) => self.store.remove_tree(dir).await,
            Ok(false) => Ok(()),
            Err(e) => Err(e),
        };

        match result {
            Ok(()) => DeleteStatus::Deleted,
            Err(StoreError::NotFound(_)) => DeleteStatus::Deleted,
            Err(e) if self.proxy_enabled => {
                warn!(error = %e, "Failed to prune directory");
                DeleteStatus::Deleted
            }
            Err(e) => {
                error!(error = %e, "Failed to prune directory");
                DeleteStatus::Failed
            }
        }
    }
}
