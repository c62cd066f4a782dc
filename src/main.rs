//! Media Cache - stores uploaded images and serves resized derivatives.
//!
//! This binary starts the HTTP server and configures all components.

use clap::Parser;
use std::path::Path;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use media_cache::{
    config::{CheckConfig, Cli, Command, ServeConfig, TokenConfig, TokenOutputFormat},
    engine::{MediaConfig, MediaService},
    error::OriginError,
    origin::{HttpOrigin, Origin},
    server::{create_router, RouterConfig, TokenAuth},
    store::LocalStore,
};

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    match cli.into_command() {
        Command::Serve(config) => run_serve(config).await,
        Command::Token(config) => run_token(config),
        Command::Check(config) => run_check(config).await,
    }
}

// =============================================================================
// Serve Command
// =============================================================================

async fn run_serve(config: ServeConfig) -> ExitCode {
    init_logging(config.verbose);

    if let Err(e) = config.validate() {
        error!("Configuration error: {}", e);
        return ExitCode::FAILURE;
    }

    let media_config = config.media_config();

    info!("Media Cache v{}", env!("CARGO_PKG_VERSION"));
    info!("Configuration:");
    info!("  Assets: {}", config.assets_path.display());
    info!("  URL prefix: {}", config.url_prefix);
    info!("  Extensions: {}", media_config.extensions.join(", "));
    info!(
        "  Uploads: {} MB max, JPEG quality {}",
        config.max_upload_mb, config.jpeg_quality
    );
    info!("  Max derivative dimension: {}", config.max_dimension);

    if config.auth_enabled {
        info!("  Auth: enabled (issuer '{}')", config.token_issuer);
    } else {
        warn!("  Auth: DISABLED - anyone can delete and upload images");
        warn!("        Enable for production: --auth-enabled=true --auth-secret=<secret>");
    }

    if let Err(e) = tokio::fs::create_dir_all(&config.assets_path).await {
        error!(
            "Failed to create assets directory {}: {}",
            config.assets_path.display(),
            e
        );
        return ExitCode::FAILURE;
    }

    let store = LocalStore::new(&config.assets_path, media_config.codec());
    let media = match config.proxy_url {
        Some(ref url) => {
            let origin = match HttpOrigin::new(url, Duration::from_secs(config.proxy_timeout)) {
                Ok(origin) => origin,
                Err(e) => {
                    error!("Invalid proxy configuration: {}", e);
                    return ExitCode::FAILURE;
                }
            };
            info!(
                "  Proxy: {} (write-through: {})",
                origin.describe(),
                config.proxy_write_through
            );
            MediaService::with_origin(store, &media_config, Arc::new(origin))
        }
        None => MediaService::new(store, &media_config),
    };

    let router = create_router(media, build_router_config(&config));
    let addr = config.bind_address();

    info!("");
    info!("────────────────────────────────────────────────────────────────");
    info!("  Server listening on: http://{}", addr);
    info!("");
    info!("  Try these endpoints:");
    info!("    curl http://{}/health", addr);
    info!(
        "    curl http://{}{}/<W>x<H>/<folder>/<image>",
        addr, config.url_prefix
    );
    info!("────────────────────────────────────────────────────────────────");
    info!("");

    let listener = match tokio::net::TcpListener::bind(&addr).await {
        Ok(listener) => listener,
        Err(e) => {
            error!("Failed to bind to {}: {}", addr, e);
            return ExitCode::FAILURE;
        }
    };

    if let Err(e) = axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await
    {
        error!("Server error: {}", e);
        return ExitCode::FAILURE;
    }

    info!("Server stopped");
    ExitCode::SUCCESS
}

/// Resolve on Ctrl-C or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for Ctrl-C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    info!("Shutdown signal received, draining connections");
}

/// Initialize the tracing/logging subsystem.
fn init_logging(verbose: bool) {
    let env_filter = if verbose {
        "media_cache=debug,tower_http=debug"
    } else {
        "media_cache=info,tower_http=info"
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| env_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}

/// Build RouterConfig from the application ServeConfig.
fn build_router_config(config: &ServeConfig) -> RouterConfig {
    let mut router_config = if config.auth_enabled {
        RouterConfig::new(config.auth_secret_or_empty())
            .with_token_issuer(config.token_issuer.clone())
    } else {
        RouterConfig::without_auth()
    };

    router_config = router_config
        .with_url_prefix(config.url_prefix.clone())
        .with_cache_max_age(config.cache_max_age)
        .with_tracing(!config.no_tracing);

    if let Some(ref origins) = config.cors_origins {
        router_config = router_config.with_cors_origins(origins.clone());
    }

    router_config
}

// =============================================================================
// Token Command
// =============================================================================

fn run_token(config: TokenConfig) -> ExitCode {
    if let Err(e) = config.validate() {
        eprintln!("Error: {}", e);
        return ExitCode::FAILURE;
    }

    let auth = TokenAuth::new(&config.secret, config.issuer.clone());
    let (token, expiry) = auth.issue(&config.subject, config.ttl());

    match config.format {
        TokenOutputFormat::Token => println!("{}", token),
        TokenOutputFormat::Header => println!("Authorization: Bearer {}", token),
        TokenOutputFormat::Json => {
            let json = serde_json::json!({
                "token": token,
                "subject": config.subject,
                "issuer": config.issuer,
                "expiry": expiry,
            });
            match serde_json::to_string_pretty(&json) {
                Ok(out) => println!("{}", out),
                Err(e) => {
                    eprintln!("Error: {}", e);
                    return ExitCode::FAILURE;
                }
            }
        }
    }

    ExitCode::SUCCESS
}

// =============================================================================
// Check Command
// =============================================================================

async fn run_check(config: CheckConfig) -> ExitCode {
    if config.verbose {
        init_logging(true);
    }

    println!("Media Cache Configuration Check");
    println!("═════════════════════════════════");
    println!();

    let media_config = config.media_config();
    println!("✓ Extensions: {}", media_config.extensions.join(", "));

    match check_assets(&config.assets_path).await {
        Ok(()) => println!("✓ Assets: {} (writable)", config.assets_path.display()),
        Err(e) => {
            println!("✗ Assets: {}", e);
            return ExitCode::FAILURE;
        }
    }

    let mut origin: Option<Arc<dyn Origin>> = None;
    if let Some(ref url) = config.proxy_url {
        print!("Testing origin {}... ", url);
        let http = match HttpOrigin::new(url, Duration::from_secs(config.proxy_timeout)) {
            Ok(http) => http,
            Err(e) => {
                println!("✗ invalid");
                println!("  {}", e);
                return ExitCode::FAILURE;
            }
        };

        // Any HTTP answer means the origin is reachable.
        match http.fetch("").await {
            Ok(_) | Err(OriginError::Status { .. }) => println!("✓ reachable"),
            Err(e) => {
                println!("✗ unreachable");
                println!("  {}", e);
                return ExitCode::FAILURE;
            }
        }
        origin = Some(Arc::new(http));
    }

    if let Some(ref path) = config.test_image {
        println!();
        print!("Reading '{}'... ", path);

        let store = LocalStore::new(&config.assets_path, media_config.codec());
        let media = build_check_service(store, &media_config, origin);
        match media.read(path).await {
            Ok(image) => {
                println!("✓ {}", image.source.as_str());
                println!("  Size: {} bytes", image.data.len());
                println!("  Content-Type: {}", image.content_type);
            }
            Err(e) => {
                println!("✗ failed");
                println!("  {}", e);
                return ExitCode::FAILURE;
            }
        }
    }

    println!();
    println!("═════════════════════════════════");
    println!("✓ All checks passed!");

    ExitCode::SUCCESS
}

fn build_check_service(
    store: LocalStore,
    config: &MediaConfig,
    origin: Option<Arc<dyn Origin>>,
) -> MediaService<LocalStore> {
    match origin {
        Some(origin) => MediaService::with_origin(store, config, origin),
        None => MediaService::new(store, config),
    }
}

/// The assets root must be an existing, writable directory.
async fn check_assets(path: &Path) -> Result<(), String> {
    let metadata = tokio::fs::metadata(path)
        .await
        .map_err(|e| format!("{}: {}", path.display(), e))?;
    if !metadata.is_dir() {
        return Err(format!("{} is not a directory", path.display()));
    }

    let marker = path.join(format!(".media-cache-check-{}", std::process::id()));
    tokio::fs::write(&marker, b"")
        .await
        .map_err(|e| format!("{} is not writable: {}", path.display(), e))?;
    tokio::fs::remove_file(&marker)
        .await
        .map_err(|e| format!("Failed to remove {}: {}", marker.display(), e))
}
