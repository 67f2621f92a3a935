use actix_web::http::StatusCode;
use serde_json::json;

use super::helpers::{delete, get, post, post_empty, put, TestContext};

fn order_body(contact: &str) -> serde_json::Value {
    json!({
        "category": "plumbing",
        "description": "Kitchen sink leaks badly, need a visit today",
        "city": "Moscow",
        "contact": contact,
    })
}

async fn create_order(ctx: &TestContext, token: &str, contact: &str) -> String {
    let (status, body) = post(ctx, Some(token), "/api/orders", order_body(contact)).await;
    assert_eq!(status, StatusCode::CREATED, "create failed: {body}");
    body["id"].as_str().expect("order id").to_string()
}

#[actix_web::test]
async fn created_orders_show_their_contact_to_the_owner_only() {
    let ctx = TestContext::new().await;
    ctx.seed_user(1, 0).await;
    let token = ctx.token_for(1);
    let id = create_order(&ctx, &token, "@alice").await;

    // Owner sees the contact.
    let (status, body) = get(&ctx, Some(&token), &format!("/api/orders/{id}")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["contact"], "@alice");
    assert_eq!(body["status"], "active");
    assert_eq!(body["city_locked"], true);

    // Anonymous viewers do not.
    let (status, body) = get(&ctx, None, &format!("/api/orders/{id}")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["contact"], serde_json::Value::Null);

    // And the list view redacts it even for the owner.
    let (status, body) = get(&ctx, Some(&token), "/api/orders").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["total"], 1);
    assert_eq!(body["orders"][0]["contact"], serde_json::Value::Null);
}

#[actix_web::test]
async fn order_validation_rejects_bad_input() {
    let ctx = TestContext::new().await;
    ctx.seed_user(1, 0).await;
    let token = ctx.token_for(1);

    let mut short = order_body("@alice");
    short["description"] = json!("too short");
    let (status, _) = post(&ctx, Some(&token), "/api/orders", short).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let mut bad_category = order_body("@alice");
    bad_category["category"] = json!("time_travel");
    let (status, body) = post(&ctx, Some(&token), "/api/orders", bad_category).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().unwrap_or_default().contains("category"));
}

#[actix_web::test]
async fn duplicate_active_contact_conflicts() {
    let ctx = TestContext::new().await;
    ctx.seed_user(1, 0).await;
    ctx.seed_user(2, 0).await;
    let token1 = ctx.token_for(1);
    let token2 = ctx.token_for(2);
    create_order(&ctx, &token1, "+79001234567").await;
    let (status, _) = post(&ctx, Some(&token2), "/api/orders", order_body("+79001234567")).await;
    assert_eq!(status, StatusCode::CONFLICT);
}

#[actix_web::test]
async fn take_flow_charges_and_reveals_contact() {
    let ctx = TestContext::new().await;
    ctx.seed_user(1, 0).await;
    ctx.seed_user(2, 10).await;
    let client = ctx.token_for(1);
    let executor = ctx.token_for(2);
    let id = create_order(&ctx, &client, "@alice").await;

    let (status, body) = post_empty(&ctx, Some(&executor), &format!("/api/orders/{id}/take")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
    assert_eq!(body["contact"], "@alice");
    assert_eq!(body["executor_count"], 1);
    assert_eq!(body["new_balance"], 8);

    // A repeated take is free.
    let (status, body) = post_empty(&ctx, Some(&executor), &format!("/api/orders/{id}/take")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["new_balance"], 8);
    assert_eq!(body["executor_count"], 1);

    // The executor now sees the contact on the detail view too.
    let (_, body) = get(&ctx, Some(&executor), &format!("/api/orders/{id}")).await;
    assert_eq!(body["contact"], "@alice");
    assert_eq!(body["taken_by"].as_array().unwrap().len(), 1);
}

#[actix_web::test]
async fn broke_executors_get_payment_required() {
    let ctx = TestContext::new().await;
    ctx.seed_user(1, 0).await;
    ctx.seed_user(2, 1).await;
    let client = ctx.token_for(1);
    let executor = ctx.token_for(2);
    let id = create_order(&ctx, &client, "@alice").await;
    let (status, _) = post_empty(&ctx, Some(&executor), &format!("/api/orders/{id}/take")).await;
    assert_eq!(status, StatusCode::PAYMENT_REQUIRED);
}

#[actix_web::test]
async fn self_take_is_forbidden() {
    let ctx = TestContext::new().await;
    ctx.seed_user(1, 10).await;
    let token = ctx.token_for(1);
    let id = create_order(&ctx, &token, "@alice").await;
    let (status, _) = post_empty(&ctx, Some(&token), &format!("/api/orders/{id}/take")).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[actix_web::test]
async fn edits_freeze_after_the_first_take() {
    let ctx = TestContext::new().await;
    ctx.seed_user(1, 0).await;
    ctx.seed_user(2, 10).await;
    let client = ctx.token_for(1);
    let executor = ctx.token_for(2);
    let id = create_order(&ctx, &client, "@alice").await;

    let patch = json!({ "description": "Updated: the leak spread to the bathroom floor" });
    let (status, body) = put(&ctx, Some(&client), &format!("/api/orders/{id}"), patch.clone()).await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["description"].as_str().unwrap().starts_with("Updated"));

    post_empty(&ctx, Some(&executor), &format!("/api/orders/{id}/take")).await;
    let (status, _) = put(&ctx, Some(&client), &format!("/api/orders/{id}"), patch).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    let (status, _) = delete(&ctx, Some(&client), &format!("/api/orders/{id}")).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[actix_web::test]
async fn foreign_orders_are_not_found_for_writers() {
    let ctx = TestContext::new().await;
    ctx.seed_user(1, 0).await;
    ctx.seed_user(2, 0).await;
    let client = ctx.token_for(1);
    let other = ctx.token_for(2);
    let id = create_order(&ctx, &client, "@alice").await;
    let (status, _) =
        put(&ctx, Some(&other), &format!("/api/orders/{id}"), json!({ "contact": "@mallory" })).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    let (status, _) = delete(&ctx, Some(&other), &format!("/api/orders/{id}")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[actix_web::test]
async fn respond_close_and_complete_follow_the_lifecycle() {
    let ctx = TestContext::new().await;
    ctx.seed_user(1, 0).await;
    ctx.seed_user(2, 10).await;
    let client = ctx.token_for(1);
    let executor = ctx.token_for(2);
    let id = create_order(&ctx, &client, "@alice").await;

    // Respond before any take is a conflict.
    let (status, _) = post_empty(&ctx, Some(&client), &format!("/api/orders/{id}/respond")).await;
    assert_eq!(status, StatusCode::CONFLICT);

    post_empty(&ctx, Some(&executor), &format!("/api/orders/{id}/take")).await;
    let (status, body) = post_empty(&ctx, Some(&client), &format!("/api/orders/{id}/respond")).await;
    assert_eq!(status, StatusCode::OK);
    assert!(!body["customer_responded_at"].is_null());

    let (status, body) = post_empty(&ctx, Some(&client), &format!("/api/orders/{id}/complete")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "completed");

    // Terminal: further lifecycle calls are gone.
    let (status, _) = post_empty(&ctx, Some(&client), &format!("/api/orders/{id}/close")).await;
    assert_eq!(status, StatusCode::GONE);
}

#[actix_web::test]
async fn mine_filter_lists_own_orders_with_any_status() {
    let ctx = TestContext::new().await;
    ctx.seed_user(1, 0).await;
    let token = ctx.token_for(1);
    let id = create_order(&ctx, &token, "@alice").await;
    let (status, _) = delete(&ctx, Some(&token), &format!("/api/orders/{id}")).await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    // Deleted orders are invisible publicly...
    let (_, body) = get(&ctx, None, "/api/orders?status=deleted").await;
    assert_eq!(body["total"], 0);
    // ...but the owner can list them with `mine`.
    let (_, body) = get(&ctx, Some(&token), "/api/orders?status=deleted&mine=true").await;
    assert_eq!(body["total"], 1);
    assert_eq!(body["orders"][0]["id"], id.as_str());
}

#[actix_web::test]
async fn unknown_orders_are_not_found() {
    let ctx = TestContext::new().await;
    ctx.seed_user(1, 0).await;
    let token = ctx.token_for(1);
    let (status, _) = get(&ctx, Some(&token), "/api/orders/doesnotexist1").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}
