//! Authentication integration tests.
//!
//! Tests verify:
//! - Reads stay public with auth enabled
//! - DELETE and upload need a valid bearer token
//! - Expired, forged and malformed tokens are refused with 403

use std::time::Duration;

use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use tower::ServiceExt;

use media_cache::server::{TokenAuth, DEFAULT_TOKEN_ISSUER};

use super::test_utils::{
    auth_router, body_bytes, body_json, create_test_png, delete, get, seed_file, upload,
    valid_token, Part, TEST_SECRET,
};

// =============================================================================
// Public Reads
// =============================================================================

#[tokio::test]
async fn test_reads_need_no_token() {
    let dir = tempfile::tempdir().unwrap();
    seed_file(dir.path(), "abc/def.png", &create_test_png(20, 20));
    let router = auth_router(&dir);

    for uri in ["/media/images/abc/def.png", "/media/images/10x10/abc/def.png", "/health"] {
        let response = router.clone().oneshot(get(uri)).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK, "{}", uri);
    }
}

// =============================================================================
// Delete
// =============================================================================

#[tokio::test]
async fn test_delete_without_token_is_forbidden() {
    let dir = tempfile::tempdir().unwrap();
    seed_file(dir.path(), "abc/def.png", &create_test_png(20, 20));

    let response = auth_router(&dir)
        .oneshot(delete("/media/images/abc/def.png", None))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    assert!(body_bytes(response).await.is_empty());
    assert!(dir.path().join("abc/def.png").is_file());
}

#[tokio::test]
async fn test_delete_with_valid_token() {
    let dir = tempfile::tempdir().unwrap();
    seed_file(dir.path(), "abc/def.png", &create_test_png(20, 20));

    let response = auth_router(&dir)
        .oneshot(delete("/media/images/abc/def.png", Some(&valid_token())))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert!(!dir.path().join("abc").exists());
}

#[tokio::test]
async fn test_forbidden_comes_before_not_found() {
    let dir = tempfile::tempdir().unwrap();

    let response = auth_router(&dir)
        .oneshot(delete("/media/images/abc/missing.png", None))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_rejected_tokens() {
    let dir = tempfile::tempdir().unwrap();
    seed_file(dir.path(), "abc/def.png", &create_test_png(20, 20));
    let router = auth_router(&dir);

    let auth = TokenAuth::new(TEST_SECRET, DEFAULT_TOKEN_ISSUER);
    let expired = auth.issue_with_expiry("tests", 1);
    let (wrong_secret, _) =
        TokenAuth::new("another-secret", DEFAULT_TOKEN_ISSUER).issue("tests", Duration::from_secs(60));
    let (wrong_issuer, _) =
        TokenAuth::new(TEST_SECRET, "someone-else").issue("tests", Duration::from_secs(60));

    for token in [
        expired.as_str(),
        wrong_secret.as_str(),
        wrong_issuer.as_str(),
        "garbage",
    ] {
        let response = router
            .clone()
            .oneshot(delete("/media/images/abc/def.png", Some(token)))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::FORBIDDEN, "{}", token);
    }
    assert!(dir.path().join("abc/def.png").is_file());
}

#[tokio::test]
async fn test_non_bearer_scheme_is_forbidden() {
    let dir = tempfile::tempdir().unwrap();
    seed_file(dir.path(), "abc/def.png", &create_test_png(20, 20));

    let request = Request::builder()
        .method("DELETE")
        .uri("/media/images/abc/def.png")
        .header(header::AUTHORIZATION, format!("Basic {}", valid_token()))
        .body(Body::empty())
        .unwrap();
    let response = auth_router(&dir).oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}

// =============================================================================
// Upload
// =============================================================================

#[tokio::test]
async fn test_upload_without_token_is_forbidden() {
    let dir = tempfile::tempdir().unwrap();

    let response = auth_router(&dir)
        .oneshot(upload(
            "/media/images",
            None,
            vec![Part::file("a.png", create_test_png(10, 10))],
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
}

#[tokio::test]
async fn test_upload_with_valid_token() {
    let dir = tempfile::tempdir().unwrap();

    let response = auth_router(&dir)
        .oneshot(upload(
            "/media/images",
            Some(&valid_token()),
            vec![Part::file("a.png", create_test_png(10, 10))],
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["filepathes"].as_array().unwrap().len(), 1);
}
