use actix_web::http::StatusCode;
use serde_json::json;

use super::helpers::{get, post, TestContext};

#[actix_web::test]
async fn health_needs_no_credentials() {
    let ctx = TestContext::new().await;
    let (status, _) = get(&ctx, None, "/health").await;
    assert_eq!(status, StatusCode::OK);
}

#[actix_web::test]
async fn valid_login_token_yields_a_working_access_token() {
    let ctx = TestContext::new().await;
    let (status, body) = post(&ctx, None, "/auth", ctx.login_body(42, Some("alice"))).await;
    assert_eq!(status, StatusCode::OK);
    let token = body["access_token"].as_str().expect("access_token in response").to_string();

    let (status, me) = get(&ctx, Some(&token), "/api/users/me").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(me["id"], 42);
    assert_eq!(me["username"], "alice");
    assert_eq!(me["balance"], 0);
}

#[actix_web::test]
async fn forged_login_tokens_are_rejected() {
    let ctx = TestContext::new().await;
    let mut body = ctx.login_body(42, None);
    body["signature"] = json!("00112233445566778899aabbccddeeff00112233445566778899aabbccddeeff");
    let (status, _) = post(&ctx, None, "/auth", body).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[actix_web::test]
async fn login_signature_binds_the_user_id() {
    let ctx = TestContext::new().await;
    let mut body = ctx.login_body(42, None);
    body["user_id"] = json!(43);
    let (status, _) = post(&ctx, None, "/auth", body).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[actix_web::test]
async fn protected_endpoints_require_a_bearer_token() {
    let ctx = TestContext::new().await;
    let (status, _) = get(&ctx, None, "/api/balance").await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    let (status, _) = get(&ctx, Some("not-a-jwt"), "/api/balance").await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[actix_web::test]
async fn optional_auth_endpoints_work_without_credentials() {
    let ctx = TestContext::new().await;
    let (status, body) = get(&ctx, None, "/api/orders").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["total"], 0);
}
