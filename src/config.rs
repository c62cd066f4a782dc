//! Configuration management for the media server.
//!
//! Every option can be given on the command line or through an environment
//! variable with the `MEDIA_` prefix. Running the binary without a subcommand
//! is the same as `serve`.
//!
//! # Environment Variables
//!
//! - `MEDIA_HOST` - Server bind address (default: 0.0.0.0)
//! - `MEDIA_PORT` - Server port (default: 3000)
//! - `MEDIA_ASSETS_PATH` - Storage root (default: ./assets)
//! - `MEDIA_URL_PREFIX` - Route prefix (default: /media/images)
//! - `MEDIA_EXTENSIONS` - Whitelisted extensions (default: jpg,jpeg,png,gif)
//! - `MEDIA_PROXY_URL` - Origin consulted for missing artifacts
//! - `MEDIA_PROXY_WRITE_THROUGH` - Store origin responses locally
//! - `MEDIA_PROXY_TIMEOUT` - Origin request timeout in seconds (default: 30)
//! - `MEDIA_AUTH_ENABLED` - Require tokens for DELETE and POST (default: true)
//! - `MEDIA_AUTH_SECRET` - HMAC secret for bearer tokens
//! - `MEDIA_TOKEN_ISSUER` - Issuer bound into tokens (default: media-cache)
//! - `MEDIA_MAX_UPLOAD_MB` - Per-file upload limit (default: 7)
//! - `MEDIA_VERT_MAX_IMAGE_WIDTH` - Width cap for portrait uploads (default: 0, off)
//! - `MEDIA_HORIZ_MAX_IMAGE_HEIGHT` - Height cap for landscape uploads (default: 0, off)
//! - `MEDIA_JPEG_QUALITY` - JPEG quality (default: 85)
//! - `MEDIA_MAX_DIMENSION` - Largest derivative width or height (default: 8192)
//! - `MEDIA_CACHE_MAX_AGE` - HTTP cache max-age seconds (default: 3600)
//! - `MEDIA_CORS_ORIGINS` - Allowed CORS origins (comma-separated)

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

use crate::codec::{format_for_extension, DEFAULT_JPEG_QUALITY, MAX_JPEG_QUALITY, MIN_JPEG_QUALITY};
use crate::engine::{MediaConfig, UploadConfig, DEFAULT_MAX_UPLOAD_MB};
use crate::identity::{DEFAULT_EXTENSIONS, DEFAULT_MAX_DIMENSION};
use crate::origin::DEFAULT_PROXY_TIMEOUT_SECS;
use crate::server::{DEFAULT_TOKEN_DURATION_HOURS, DEFAULT_TOKEN_ISSUER, DEFAULT_URL_PREFIX};

// =============================================================================
// Default Values
// =============================================================================

/// Default server host.
pub const DEFAULT_HOST: &str = "0.0.0.0";

/// Default server port.
pub const DEFAULT_PORT: u16 = 3000;

/// Default storage root.
pub const DEFAULT_ASSETS_PATH: &str = "./assets";

/// Default HTTP cache max-age in seconds (1 hour).
pub const DEFAULT_CACHE_MAX_AGE: u32 = 3600;

// =============================================================================
// CLI
// =============================================================================

/// Media Cache - stores uploaded images and serves resized derivatives.
#[derive(Parser, Debug, Clone)]
#[command(name = "media-cache")]
#[command(author, version, about, long_about = None)]
#[command(args_conflicts_with_subcommands = true)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Command>,

    #[command(flatten)]
    pub serve: ServeConfig,
}

impl Cli {
    /// The subcommand to run; no subcommand means `serve`.
    pub fn into_command(self) -> Command {
        self.command.unwrap_or(Command::Serve(self.serve))
    }
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Run the HTTP server
    Serve(ServeConfig),

    /// Issue a bearer token for DELETE and upload requests
    Token(TokenConfig),

    /// Check storage and origin configuration
    Check(CheckConfig),
}

// =============================================================================
// Serve
// =============================================================================

#[derive(Args, Debug, Clone)]
pub struct ServeConfig {
    // =========================================================================
    // Server Configuration
    // =========================================================================
    /// Host address to bind the server to.
    #[arg(long, default_value = DEFAULT_HOST, env = "MEDIA_HOST")]
    pub host: String,

    /// Port to listen on.
    #[arg(short, long, default_value_t = DEFAULT_PORT, env = "MEDIA_PORT")]
    pub port: u16,

    /// Root directory holding originals and the derivative cache.
    #[arg(long, default_value = DEFAULT_ASSETS_PATH, env = "MEDIA_ASSETS_PATH")]
    pub assets_path: PathBuf,

    /// URL prefix of the image routes.
    #[arg(long, default_value = DEFAULT_URL_PREFIX, env = "MEDIA_URL_PREFIX")]
    pub url_prefix: String,

    /// Whitelisted image extensions (comma-separated).
    #[arg(long, env = "MEDIA_EXTENSIONS", value_delimiter = ',')]
    pub extensions: Option<Vec<String>>,

    // =========================================================================
    // Origin Proxy
    // =========================================================================
    /// Base URL of an origin consulted for artifacts missing locally.
    #[arg(long, env = "MEDIA_PROXY_URL")]
    pub proxy_url: Option<String>,

    /// Store artifacts fetched from the origin locally.
    #[arg(long, default_value_t = false, env = "MEDIA_PROXY_WRITE_THROUGH")]
    pub proxy_write_through: bool,

    /// Origin request timeout in seconds.
    #[arg(long, default_value_t = DEFAULT_PROXY_TIMEOUT_SECS, env = "MEDIA_PROXY_TIMEOUT")]
    pub proxy_timeout: u64,

    // =========================================================================
    // Authentication
    // =========================================================================
    /// Require a bearer token for DELETE and upload requests.
    ///
    /// WARNING: Only disable authentication in development/testing.
    #[arg(
        long,
        default_value_t = true,
        action = clap::ArgAction::Set,
        env = "MEDIA_AUTH_ENABLED"
    )]
    pub auth_enabled: bool,

    /// Secret key for HMAC-SHA256 bearer tokens.
    #[arg(long, env = "MEDIA_AUTH_SECRET")]
    pub auth_secret: Option<String>,

    /// Issuer bound into every token.
    #[arg(long, default_value = DEFAULT_TOKEN_ISSUER, env = "MEDIA_TOKEN_ISSUER")]
    pub token_issuer: String,

    // =========================================================================
    // Uploads
    // =========================================================================
    /// Maximum size of one uploaded file in megabytes.
    #[arg(long, default_value_t = DEFAULT_MAX_UPLOAD_MB, env = "MEDIA_MAX_UPLOAD_MB")]
    pub max_upload_mb: u64,

    /// Portrait and square uploads wider than this are scaled down (0 = off).
    #[arg(long, default_value_t = 0, env = "MEDIA_VERT_MAX_IMAGE_WIDTH")]
    pub vert_max_image_width: u32,

    /// Landscape uploads taller than this are scaled down (0 = off).
    #[arg(long, default_value_t = 0, env = "MEDIA_HORIZ_MAX_IMAGE_HEIGHT")]
    pub horiz_max_image_height: u32,

    /// JPEG quality for uploads and derivatives (1-100).
    #[arg(long, default_value_t = DEFAULT_JPEG_QUALITY, env = "MEDIA_JPEG_QUALITY")]
    pub jpeg_quality: u8,

    /// Largest derivative width or height; bigger requests are 404.
    #[arg(long, default_value_t = DEFAULT_MAX_DIMENSION, env = "MEDIA_MAX_DIMENSION")]
    pub max_dimension: u32,

    // =========================================================================
    // HTTP
    // =========================================================================
    /// HTTP Cache-Control max-age in seconds.
    #[arg(long, default_value_t = DEFAULT_CACHE_MAX_AGE, env = "MEDIA_CACHE_MAX_AGE")]
    pub cache_max_age: u32,

    /// Allowed CORS origins (comma-separated).
    ///
    /// If not specified, allows any origin.
    #[arg(long, env = "MEDIA_CORS_ORIGINS", value_delimiter = ',')]
    pub cors_origins: Option<Vec<String>>,

    // =========================================================================
    // Logging
    // =========================================================================
    /// Enable verbose logging (debug level).
    #[arg(short, long, default_value_t = false)]
    pub verbose: bool,

    /// Disable request tracing.
    #[arg(long, default_value_t = false)]
    pub no_tracing: bool,
}

impl ServeConfig {
    /// Validate the configuration and return an error message if invalid.
    pub fn validate(&self) -> Result<(), String> {
        if self.auth_enabled && self.auth_secret_or_empty().is_empty() {
            return Err(
                "Authentication is enabled but no secret provided. \
                 Set --auth-secret or MEDIA_AUTH_SECRET, or disable auth with --auth-enabled=false"
                    .to_string(),
            );
        }

        validate_extensions(&self.extensions())?;

        if let Some(ref url) = self.proxy_url {
            validate_proxy_url(url)?;
        }
        if self.proxy_timeout == 0 {
            return Err("proxy_timeout must be greater than 0".to_string());
        }

        if self.max_upload_mb == 0 {
            return Err("max_upload_mb must be greater than 0".to_string());
        }

        if !(MIN_JPEG_QUALITY..=MAX_JPEG_QUALITY).contains(&self.jpeg_quality) {
            return Err("jpeg_quality must be between 1 and 100".to_string());
        }

        if self.max_dimension == 0 {
            return Err("max_dimension must be greater than 0".to_string());
        }

        Ok(())
    }

    /// Get the server bind address as "host:port".
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Get the auth secret, or "" when not set (call validate() first).
    pub fn auth_secret_or_empty(&self) -> &str {
        self.auth_secret.as_deref().unwrap_or("")
    }

    /// Whitelisted extensions, lower-cased, falling back to the defaults.
    pub fn extensions(&self) -> Vec<String> {
        normalize_extensions(self.extensions.as_deref())
    }

    /// Engine settings derived from this configuration.
    pub fn media_config(&self) -> MediaConfig {
        MediaConfig {
            extensions: self.extensions(),
            proxy_write_through: self.proxy_write_through,
            upload: UploadConfig {
                max_upload_mb: self.max_upload_mb,
                vert_max_image_width: self.vert_max_image_width,
                horiz_max_image_height: self.horiz_max_image_height,
            },
            jpeg_quality: self.jpeg_quality,
            max_dimension: self.max_dimension,
        }
    }
}

// =============================================================================
// Token
// =============================================================================

/// Output format for issued tokens.
#[derive(ValueEnum, Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum TokenOutputFormat {
    /// Only the token
    #[default]
    Token,
    /// `Authorization: Bearer <token>`
    Header,
    /// JSON with token, subject and expiry
    Json,
}

#[derive(Args, Debug, Clone)]
pub struct TokenConfig {
    /// Who the token is issued to (e.g. "backoffice").
    #[arg(long, short)]
    pub subject: String,

    /// Secret key shared with the server.
    #[arg(long, env = "MEDIA_AUTH_SECRET")]
    pub secret: String,

    /// Issuer configured on the server.
    #[arg(long, default_value = DEFAULT_TOKEN_ISSUER, env = "MEDIA_TOKEN_ISSUER")]
    pub issuer: String,

    /// Token lifetime in hours.
    #[arg(long, default_value_t = DEFAULT_TOKEN_DURATION_HOURS)]
    pub duration_hours: u64,

    #[arg(long, value_enum, default_value_t = TokenOutputFormat::Token)]
    pub format: TokenOutputFormat,
}

impl TokenConfig {
    pub fn validate(&self) -> Result<(), String> {
        if self.secret.is_empty() {
            return Err("Secret must not be empty".to_string());
        }
        if self.subject.is_empty() || self.subject.chars().any(char::is_whitespace) {
            return Err("Subject must be non-empty and contain no whitespace".to_string());
        }
        if self.duration_hours == 0 {
            return Err("duration_hours must be greater than 0".to_string());
        }
        Ok(())
    }

    pub fn ttl(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.duration_hours.saturating_mul(3600))
    }
}

// =============================================================================
// Check
// =============================================================================

#[derive(Args, Debug, Clone)]
pub struct CheckConfig {
    /// Root directory holding originals and the derivative cache.
    #[arg(long, default_value = DEFAULT_ASSETS_PATH, env = "MEDIA_ASSETS_PATH")]
    pub assets_path: PathBuf,

    /// Whitelisted image extensions (comma-separated).
    #[arg(long, env = "MEDIA_EXTENSIONS", value_delimiter = ',')]
    pub extensions: Option<Vec<String>>,

    /// Origin to test.
    #[arg(long, env = "MEDIA_PROXY_URL")]
    pub proxy_url: Option<String>,

    /// Origin request timeout in seconds.
    #[arg(long, default_value_t = DEFAULT_PROXY_TIMEOUT_SECS, env = "MEDIA_PROXY_TIMEOUT")]
    pub proxy_timeout: u64,

    /// Image path to read through the full pipeline (e.g. "100x100/abc/def.png").
    #[arg(long)]
    pub test_image: Option<String>,

    /// Enable verbose output.
    #[arg(short, long, default_value_t = false)]
    pub verbose: bool,
}

impl CheckConfig {
    pub fn extensions(&self) -> Vec<String> {
        normalize_extensions(self.extensions.as_deref())
    }

    pub fn media_config(&self) -> MediaConfig {
        MediaConfig {
            extensions: self.extensions(),
            ..MediaConfig::default()
        }
    }
}

// =============================================================================
// Helpers
// =============================================================================

fn normalize_extensions(configured: Option<&[String]>) -> Vec<String> {
    match configured {
        Some(list) if !list.is_empty() => list
            .iter()
            .map(|e| e.trim().trim_start_matches('.').to_ascii_lowercase())
            .filter(|e| !e.is_empty())
            .collect(),
        _ => DEFAULT_EXTENSIONS.iter().map(|e| e.to_string()).collect(),
    }
}

fn validate_extensions(extensions: &[String]) -> Result<(), String> {
    if extensions.is_empty() {
        return Err("At least one extension must be configured".to_string());
    }
    for ext in extensions {
        if !ext.chars().all(|c| c.is_ascii_alphanumeric()) {
            return Err(format!("Invalid extension '{}'", ext));
        }
        if format_for_extension(ext).is_none() {
            return Err(format!(
                "Extension '{}' has no codec; supported: jpg, jpeg, png, gif",
                ext
            ));
        }
    }
    Ok(())
}

fn validate_proxy_url(url: &str) -> Result<(), String> {
    let parsed = url::Url::parse(url).map_err(|e| format!("Invalid proxy_url '{}': {}", url, e))?;
    match parsed.scheme() {
        "http" | "https" => Ok(()),
        scheme => Err(format!(
            "proxy_url must use http or https, got '{}'",
            scheme
        )),
    }
}

// =============================================================================
// Tests
// =============================================================================
