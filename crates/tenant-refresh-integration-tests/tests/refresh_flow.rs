//! Integration tests for the refresh endpoint
//!
//! Requests go through the full router: caller identity, header extraction,
//! the coordinator and the error mapping.

mod common;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use common::{
    body_json, refresh_body, response_cached, seed_response, seed_tenant, signed_refresh,
    signed_refresh_with, TestApp, CLIENT_IP, NOW, PREVIOUS_SECRET, SECRET,
};
use tenant_refresh_api::ServiceConfig;
use tenant_refresh_core::SigningSecrets;

// ============================================================================
// Cascading invalidation
// ============================================================================

/// A refresh for any hostname of a tenant drops every hostname mapping,
/// the cached configuration and the rendered response of that tenant only.
#[tokio::test]
async fn test_refresh_invalidates_whole_tenant() {
    // Arrange
    let app = TestApp::new();
    seed_tenant(
        &app.store,
        "t-100",
        "shop.example.com",
        &["www.shop.example.com", "shop.example.net"],
    )
    .await;
    seed_tenant(&app.store, "t-200", "other.example.com", &[]).await;
    seed_response(&app.responses, "t-100").await;
    seed_response(&app.responses, "t-200").await;

    // Act
    let response = app
        .send(signed_refresh(&refresh_body("www.shop.example.com"), "evt-1"))
        .await;

    // Assert
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await, serde_json::json!({ "invalidated": true }));

    for key in [
        "tenant:id:shop.example.com",
        "tenant:id:www.shop.example.com",
        "tenant:id:shop.example.net",
        "tenant:config:t-100",
    ] {
        assert!(!app.store.contains_key(key), "{key} should be removed");
    }
    assert!(!response_cached(&app.responses, "t-100"));

    assert!(app.store.contains_key("tenant:id:other.example.com"));
    assert!(app.store.contains_key("tenant:config:t-200"));
    assert!(response_cached(&app.responses, "t-200"));
}

/// An unknown hostname is treated as its own tenant id.
#[tokio::test]
async fn test_refresh_for_unknown_hostname_still_succeeds() {
    let app = TestApp::new();
    seed_response(&app.responses, "fresh.example.com").await;

    let response = app
        .send(signed_refresh(&refresh_body("fresh.example.com"), "evt-1"))
        .await;

    assert_eq!(response.status(), StatusCode::OK);
    assert!(!response_cached(&app.responses, "fresh.example.com"));
    assert!(app.store.contains_key("webhook:processed:evt-1"));
}

/// Secrets rotate without downtime: the previous secret keeps working.
#[tokio::test]
async fn test_previous_secret_is_accepted_during_rotation() {
    let app = TestApp::new();

    let response = app
        .send(signed_refresh_with(
            &refresh_body("shop.example.com"),
            "evt-1",
            PREVIOUS_SECRET,
            NOW,
            CLIENT_IP,
        ))
        .await;

    assert_eq!(response.status(), StatusCode::OK);
}

// ============================================================================
// Idempotency
// ============================================================================

#[tokio::test]
async fn test_redelivery_is_conflict() {
    // Arrange
    let app = TestApp::new();
    seed_tenant(&app.store, "t-100", "shop.example.com", &[]).await;
    let body = refresh_body("shop.example.com");
    let first = app.send(signed_refresh(&body, "evt-1")).await;
    assert_eq!(first.status(), StatusCode::OK);

    // Re-cache between deliveries so a repeated invalidation would be visible
    seed_tenant(&app.store, "t-100", "shop.example.com", &[]).await;

    // Act
    let second = app.send(signed_refresh(&body, "evt-1")).await;

    // Assert
    assert_eq!(second.status(), StatusCode::CONFLICT);
    assert!(app.store.contains_key("tenant:config:t-100"));
    assert_eq!(body_json(second).await["status"], 409);
    assert_eq!(app.metrics.outcome_count("conflict"), 1);
}

#[tokio::test]
async fn test_new_webhook_id_is_processed_again() {
    let app = TestApp::new();
    let body = refresh_body("shop.example.com");

    let first = app.send(signed_refresh(&body, "evt-1")).await;
    let second = app.send(signed_refresh(&body, "evt-2")).await;

    assert_eq!(first.status(), StatusCode::OK);
    assert_eq!(second.status(), StatusCode::OK);
}

// ============================================================================
// Rate limiting
// ============================================================================

#[tokio::test]
async fn test_rate_limit_rejects_with_retry_after() {
    // Arrange
    let mut config = ServiceConfig::default();
    config.webhook.rate_limit.limit = 2;
    let app = TestApp::with_config(config);
    let body = refresh_body("shop.example.com");

    // Act
    let first = app.send(signed_refresh(&body, "evt-1")).await;
    let second = app.send(signed_refresh(&body, "evt-2")).await;
    let third = app.send(signed_refresh(&body, "evt-3")).await;

    // Assert
    assert_eq!(first.status(), StatusCode::OK);
    assert_eq!(second.status(), StatusCode::OK);
    assert_eq!(third.status(), StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(third.headers().get("retry-after").unwrap(), "60");
    assert!(!app.store.contains_key("webhook:processed:evt-3"));
}

/// The limiter runs before authentication, so unsigned floods count too.
#[tokio::test]
async fn test_rate_limit_applies_to_unsigned_requests() {
    let mut config = ServiceConfig::default();
    config.webhook.rate_limit.limit = 1;
    let app = TestApp::with_config(config);
    let unsigned = || {
        Request::builder()
            .method("POST")
            .uri("/api/config/refresh")
            .header("x-forwarded-for", CLIENT_IP)
            .body(Body::from("{}"))
            .unwrap()
    };

    let first = app.send(unsigned()).await;
    let second = app.send(unsigned()).await;

    assert_eq!(first.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(second.status(), StatusCode::TOO_MANY_REQUESTS);
}

#[tokio::test]
async fn test_rate_limit_window_slides() {
    // Arrange
    let mut config = ServiceConfig::default();
    config.webhook.rate_limit.limit = 1;
    let app = TestApp::with_config(config);
    let body = refresh_body("shop.example.com");
    assert_eq!(app.send(signed_refresh(&body, "evt-1")).await.status(), StatusCode::OK);

    // Act
    app.clock.advance(chrono::Duration::seconds(61));
    let later = app
        .send(signed_refresh_with(&body, "evt-2", SECRET, NOW + 61, CLIENT_IP))
        .await;

    // Assert
    assert_eq!(later.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_rate_limit_is_tracked_per_client() {
    let mut config = ServiceConfig::default();
    config.webhook.rate_limit.limit = 1;
    let app = TestApp::with_config(config);
    let body = refresh_body("shop.example.com");

    let first = app
        .send(signed_refresh_with(&body, "evt-1", SECRET, NOW, "192.0.2.1"))
        .await;
    let second = app
        .send(signed_refresh_with(&body, "evt-2", SECRET, NOW, "192.0.2.2"))
        .await;

    assert_eq!(first.status(), StatusCode::OK);
    assert_eq!(second.status(), StatusCode::OK);
}

// ============================================================================
// Rejections
// ============================================================================

#[tokio::test]
async fn test_oversized_payload_is_rejected_before_authentication() {
    let app = TestApp::new();
    let body = format!(
        r#"{{"hostname":"shop.example.com","padding":"{}"}}"#,
        "x".repeat(70_000)
    );

    let response = app
        .send(signed_refresh_with(&body, "evt-1", "wrong-secret", NOW, CLIENT_IP))
        .await;

    assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
}

#[tokio::test]
async fn test_bad_signature_is_unauthorized() {
    let app = TestApp::new();
    seed_tenant(&app.store, "t-100", "shop.example.com", &[]).await;

    let response = app
        .send(signed_refresh_with(
            &refresh_body("shop.example.com"),
            "evt-1",
            "wrong-secret",
            NOW,
            CLIENT_IP,
        ))
        .await;

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(body_json(response).await["error"], "Unauthorized");
    assert!(app.store.contains_key("tenant:config:t-100"));
    assert!(!app.store.contains_key("webhook:processed:evt-1"));
}

#[tokio::test]
async fn test_stale_signature_is_unauthorized() {
    let app = TestApp::new();

    let response = app
        .send(signed_refresh_with(
            &refresh_body("shop.example.com"),
            "evt-1",
            SECRET,
            NOW - 301,
            CLIENT_IP,
        ))
        .await;

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_payload_without_hostname_is_unprocessable() {
    let app = TestApp::new();

    let response = app
        .send(signed_refresh(r#"{"tenant":"t-100"}"#, "evt-1"))
        .await;

    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    assert!(!app.store.contains_key("webhook:processed:evt-1"));
}

#[tokio::test]
async fn test_missing_secrets_is_server_error() {
    let app =
        TestApp::with_config_and_secrets(ServiceConfig::default(), SigningSecrets::default());

    let response = app
        .send(signed_refresh(&refresh_body("shop.example.com"), "evt-1"))
        .await;

    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(app.metrics.outcome_count("misconfigured"), 1);
}
