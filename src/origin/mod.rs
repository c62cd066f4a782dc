//! Remote origin consulted when a local artifact is missing.
//!
//! An origin is another instance of this service (or anything speaking the
//! same path grammar). Paths handed to [`Origin::fetch`] are relative to the
//! origin's base, e.g. `100x50/abc/def.png`.

mod http;

use async_trait::async_trait;
use bytes::Bytes;

use crate::error::OriginError;

pub use self::http::{HttpOrigin, DEFAULT_PROXY_TIMEOUT_SECS};

/// Source of artifacts that are not stored locally.
#[async_trait]
pub trait Origin: Send + Sync {
    /// Fetch the artifact at `relative_path`.
    ///
    /// Any answer outside 2xx is `OriginError::Status`.
    async fn fetch(&self, relative_path: &str) -> Result<Bytes, OriginError>;

    /// Human-readable base, used in logs.
    fn describe(&self) -> String;
}
