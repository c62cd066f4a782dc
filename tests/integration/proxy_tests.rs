//! Origin fallback and concurrency tests.
//!
//! Tests verify:
//! - Missing artifacts are fetched from the origin, stored only with write-through
//! - Origin misses are 404 and unreachable origins are 500
//! - Delete tolerates originals that only exist at the origin
//! - `HttpOrigin` against a real HTTP server
//! - Concurrent first requests for a derivative resize once

use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use axum::http::StatusCode;
use axum::routing::get as get_route;
use axum::Router;
use tower::ServiceExt;

use media_cache::engine::{MediaConfig, MediaService};
use media_cache::origin::{HttpOrigin, Origin};
use media_cache::store::LocalStore;
use media_cache::{create_router, RouterConfig};

use super::test_utils::{
    body_bytes, create_test_png, delete, dimensions, get, local_store, proxy_router, seed_file,
    CountingStore, MockOrigin,
};

// =============================================================================
// Mock Origin
// =============================================================================

#[tokio::test]
async fn test_origin_serves_missing_derivative() {
    let dir = tempfile::tempdir().unwrap();
    let remote = create_test_png(30, 30);
    let origin = Arc::new(MockOrigin::new().with_file("30x30/abc/def.png", remote.clone()));

    let response = proxy_router(&dir, origin.clone(), false)
        .oneshot(get("/media/images/30x30/abc/def.png"))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()["x-image-source"], "proxy");
    assert_eq!(body_bytes(response).await.as_ref(), remote.as_slice());
    assert_eq!(origin.fetch_count(), 1);
    assert!(!dir
        .path()
        .join("cache/resized_image/abc/def/30x30.png")
        .exists());
}

#[tokio::test]
async fn test_origin_receives_size_segment_as_requested() {
    let dir = tempfile::tempdir().unwrap();
    let remote = create_test_png(5, 50);
    let origin = Arc::new(
        MockOrigin::new()
            .with_file("0x50/abc/def.png", remote.clone())
            .with_file("007x5/abc/def.png", remote.clone()),
    );
    let router = proxy_router(&dir, origin.clone(), false);

    for uri in ["/media/images/0x50/abc/def.png", "/media/images/007x5/abc/def.png"] {
        let response = router.clone().oneshot(get(uri)).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK, "{}", uri);
        assert_eq!(response.headers()["x-image-source"], "proxy");
        assert_eq!(body_bytes(response).await.as_ref(), remote.as_slice());
    }
    assert_eq!(origin.fetch_count(), 2);
}

#[tokio::test]
async fn test_write_through_stores_locally() {
    let dir = tempfile::tempdir().unwrap();
    let original = create_test_png(40, 20);
    let derivative = create_test_png(10, 10);
    let origin = Arc::new(
        MockOrigin::new()
            .with_file("abc/def.png", original.clone())
            .with_file("10x10/abc/def.png", derivative.clone()),
    );
    let router = proxy_router(&dir, origin.clone(), true);

    // Derivative first: once the original is local it would be resized here.
    for uri in ["/media/images/10x10/abc/def.png", "/media/images/abc/def.png"] {
        let response = router.clone().oneshot(get(uri)).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK, "{}", uri);
        assert_eq!(response.headers()["x-image-source"], "proxy");
    }

    assert_eq!(std::fs::read(dir.path().join("abc/def.png")).unwrap(), original);
    assert_eq!(
        std::fs::read(dir.path().join("cache/resized_image/abc/def/10x10.png")).unwrap(),
        derivative
    );

    let response = router
        .oneshot(get("/media/images/10x10/abc/def.png"))
        .await
        .unwrap();
    assert_eq!(response.headers()["x-image-source"], "cached");
    assert_eq!(origin.fetch_count(), 2);
}

#[tokio::test]
async fn test_local_original_wins_over_origin() {
    let dir = tempfile::tempdir().unwrap();
    seed_file(dir.path(), "abc/def.png", &create_test_png(40, 40));
    let origin = Arc::new(MockOrigin::new());

    let response = proxy_router(&dir, origin.clone(), false)
        .oneshot(get("/media/images/20x20/abc/def.png"))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()["x-image-source"], "generated");
    assert_eq!(origin.fetch_count(), 0);
}

#[tokio::test]
async fn test_origin_miss_is_404() {
    let dir = tempfile::tempdir().unwrap();
    let origin = Arc::new(MockOrigin::new());

    let response = proxy_router(&dir, origin.clone(), true)
        .oneshot(get("/media/images/abc/def.png"))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert_eq!(origin.fetch_count(), 1);
    assert!(!dir.path().join("abc").exists());
}

#[tokio::test]
async fn test_unreachable_origin_is_500() {
    let dir = tempfile::tempdir().unwrap();

    let response = proxy_router(&dir, Arc::new(MockOrigin::unreachable()), false)
        .oneshot(get("/media/images/abc/def.png"))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
}

#[tokio::test]
async fn test_invalid_path_never_reaches_origin() {
    let dir = tempfile::tempdir().unwrap();
    let origin = Arc::new(MockOrigin::new());

    let response = proxy_router(&dir, origin.clone(), false)
        .oneshot(get("/media/images/abc/def.tiff"))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert_eq!(origin.fetch_count(), 0);
}

#[tokio::test]
async fn test_delete_tolerates_remote_only_original() {
    let dir = tempfile::tempdir().unwrap();
    seed_file(
        dir.path(),
        "cache/resized_image/abc/def/10x10.png",
        &create_test_png(10, 10),
    );

    let response = proxy_router(&dir, Arc::new(MockOrigin::new()), false)
        .oneshot(delete("/media/images/abc/def.png", None))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert!(!dir.path().join("cache/resized_image/abc").exists());
}

// =============================================================================
// Real HTTP Origin
// =============================================================================

/// Serve `png` at `/origin/abc/def.png` on an ephemeral port.
async fn spawn_origin_server(png: Vec<u8>) -> String {
    let app = Router::new().route(
        "/origin/abc/def.png",
        get_route(move || {
            let png = png.clone();
            async move { ([(axum::http::header::CONTENT_TYPE, "image/png")], png) }
        }),
    );

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    format!("http://{}/origin/", addr)
}

#[tokio::test]
async fn test_http_origin_against_real_server() {
    let png = create_test_png(24, 12);
    let base = spawn_origin_server(png.clone()).await;
    let origin = HttpOrigin::new(&base, Duration::from_secs(5)).unwrap();

    assert_eq!(origin.fetch("abc/def.png").await.unwrap().as_ref(), png.as_slice());

    let miss = origin.fetch("abc/missing.png").await.unwrap_err();
    assert!(miss.is_not_found());

    let dir = tempfile::tempdir().unwrap();
    let response = proxy_router(&dir, Arc::new(origin), true)
        .oneshot(get("/media/images/abc/def.png"))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()["x-image-source"], "proxy");
    assert_eq!(dimensions(&body_bytes(response).await), (24, 12));
    assert!(dir.path().join("abc/def.png").is_file());
}

// =============================================================================
// Single Flight
// =============================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_first_requests_resize_once() {
    let dir = tempfile::tempdir().unwrap();
    seed_file(dir.path(), "abc/def.png", &create_test_png(200, 100));

    let config = MediaConfig::default();
    let inner: LocalStore = local_store(&dir, &config);
    let (store, saves) = CountingStore::new(inner, Duration::from_millis(100));
    let media = MediaService::new(store, &config);
    let router = create_router(media, RouterConfig::without_auth().with_tracing(false));

    let mut handles = Vec::new();
    for _ in 0..8 {
        let router = router.clone();
        handles.push(tokio::spawn(async move {
            let response = router
                .oneshot(get("/media/images/50x25/abc/def.png"))
                .await
                .unwrap();
            let status = response.status();
            (status, body_bytes(response).await)
        }));
    }

    let mut bodies = Vec::new();
    for handle in handles {
        let (status, body) = handle.await.unwrap();
        assert_eq!(status, StatusCode::OK);
        bodies.push(body);
    }

    assert_eq!(saves.load(Ordering::SeqCst), 1);
    assert!(bodies.iter().all(|b| b == &bodies[0]));
    assert_eq!(dimensions(&bodies[0]), (50, 25));
}

#[tokio::test]
async fn test_distinct_sizes_resize_independently() {
    let dir = tempfile::tempdir().unwrap();
    seed_file(dir.path(), "abc/def.png", &create_test_png(64, 64));

    let config = MediaConfig::default();
    let (store, saves) = CountingStore::new(local_store(&dir, &config), Duration::ZERO);
    let router = create_router(
        MediaService::new(store, &config),
        RouterConfig::without_auth().with_tracing(false),
    );

    for uri in [
        "/media/images/8x8/abc/def.png",
        "/media/images/16x16/abc/def.png",
        "/media/images/8x8/abc/def.png",
    ] {
        let response = router.clone().oneshot(get(uri)).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    assert_eq!(saves.load(Ordering::SeqCst), 2);
}
