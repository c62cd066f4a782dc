//! HTTP origin backed by reqwest.

use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use tracing::debug;
use url::Url;

use super::Origin;
use crate::error::OriginError;

/// Default connect and request timeout for origin fetches.
pub const DEFAULT_PROXY_TIMEOUT_SECS: u64 = 30;

/// Fetches artifacts with `GET <base>/<relative_path>`.
#[derive(Debug, Clone)]
pub struct HttpOrigin {
    client: reqwest::Client,
    base: Url,
}

impl HttpOrigin {
    /// Create an origin rooted at `base_url`. A trailing slash is implied.
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, OriginError> {
        let invalid = |message: String| OriginError::InvalidBase {
            url: base_url.to_string(),
            message,
        };

        let mut base = Url::parse(base_url).map_err(|e| invalid(e.to_string()))?;
        if !matches!(base.scheme(), "http" | "https") || base.cannot_be_a_base() {
            return Err(invalid("expected an http or https URL".to_string()));
        }
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }

        let client = reqwest::Client::builder()
            .connect_timeout(timeout)
            .timeout(timeout)
            .build()
            .map_err(|e| invalid(e.to_string()))?;

        Ok(Self { client, base })
    }

    pub fn base(&self) -> &Url {
        &self.base
    }

    /// Absolute URL for a path relative to the base.
    pub fn url_for(&self, relative_path: &str) -> Result<Url, OriginError> {
        self.base
            .join(relative_path.trim_start_matches('/'))
            .map_err(|e| OriginError::InvalidBase {
                url: self.base.to_string(),
                message: e.to_string(),
            })
    }
}

#[async_trait]
impl Origin for HttpOrigin {
    async fn fetch(&self, relative_path: &str) -> Result<Bytes, OriginError> {
        let url = self.url_for(relative_path)?;
        let transport = |e: reqwest::Error| OriginError::Transport {
            url: url.to_string(),
            message: e.to_string(),
        };

        let response = self
            .client
            .get(url.clone())
            .send()
            .await
            .map_err(transport)?;

        let status = response.status();
        if !status.is_success() {
            debug!(url = %url, status = status.as_u16(), "Origin miss");
            return Err(OriginError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        response.bytes().await.map_err(transport)
    }

    fn describe(&self) -> String {
        self.base.to_string()
    }
}
