use actix_web::http::StatusCode;
use cryptopay::{CryptoPayApi, CryptoPayConfig};
use pronto_common::{Rubles, Secret};
use pronto_engine::{order_objects::NewInvoice, traits::PaymentsDatabase};
use serde_json::json;

use super::helpers::{get, post, post_raw, TestContext};

#[actix_web::test]
async fn recharge_updates_balance_and_history() {
    let ctx = TestContext::new().await;
    ctx.seed_user(1, 0).await;
    let token = ctx.token_for(1);

    let (status, body) = post(&ctx, Some(&token), "/api/balance/recharge", json!({ "amount": 25 })).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
    assert_eq!(body["new_balance"], 25);

    let (status, body) = get(&ctx, Some(&token), "/api/balance").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["balance"], 25);

    let (status, history) = get(&ctx, Some(&token), "/api/balance/history").await;
    assert_eq!(status, StatusCode::OK);
    let entries = history.as_array().unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0]["type"], "recharge");
    assert_eq!(entries[0]["amount"], 25);
    assert_eq!(entries[0]["balance_after"], 25);
}

#[actix_web::test]
async fn recharge_rejects_non_positive_amounts() {
    let ctx = TestContext::new().await;
    ctx.seed_user(1, 0).await;
    let token = ctx.token_for(1);
    let (status, _) = post(&ctx, Some(&token), "/api/balance/recharge", json!({ "amount": 0 })).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[actix_web::test]
async fn unconfigured_gateway_reports_service_unavailable() {
    let ctx = TestContext::new().await;
    ctx.seed_user(1, 0).await;
    let token = ctx.token_for(1);
    // Rebuild the context's gateway without a token: invoice creation must refuse up front
    // rather than attempt a network call.
    let unconfigured = CryptoPayApi::new(CryptoPayConfig::new("http://127.0.0.1:1", Secret::new(String::new())))
        .expect("gateway");
    let ctx = ctx.with_gateway(unconfigured);
    let (status, _) = post(&ctx, Some(&token), "/api/balance/create-invoice", json!({ "amount": 50 })).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
}

#[actix_web::test]
async fn invoice_amount_must_be_positive() {
    let ctx = TestContext::new().await;
    ctx.seed_user(1, 0).await;
    let token = ctx.token_for(1);
    let (status, _) = post(&ctx, Some(&token), "/api/balance/create-invoice", json!({ "amount": -5 })).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

/// Seeds a pending invoice directly (the gateway call is the provider's side of the flow) and
/// delivers signed webhooks for it.
async fn seed_pending_invoice(ctx: &TestContext, user_id: i64, external_id: &str, amount: i64) -> i64 {
    let invoice = ctx
        .db
        .create_pending_invoice(user_id, NewInvoice {
            external_invoice_id: external_id.to_string(),
            amount: Rubles::from(amount),
            pay_url: Some("https://t.me/pay/test".to_string()),
            mini_app_invoice_url: None,
        })
        .await
        .expect("Could not seed invoice");
    invoice.id
}

fn paid_webhook_body(external_id: &str) -> Vec<u8> {
    serde_json::to_vec(&json!({
        "update_type": "invoice_paid",
        "payload": { "invoice_id": external_id.parse::<i64>().unwrap(), "status": "paid" },
    }))
    .unwrap()
}

#[actix_web::test]
async fn signed_webhook_credits_exactly_once() {
    let ctx = TestContext::new().await;
    ctx.seed_user(1, 0).await;
    let token = ctx.token_for(1);
    let payment_id = seed_pending_invoice(&ctx, 1, "700", 50).await;

    let body = paid_webhook_body("700");
    let signature = ctx.gateway.sign_payload(&body).unwrap();

    let (status, ack) =
        post_raw(&ctx, "/webhook/cryptopay", body.clone(), &[("crypto-pay-api-signature", signature.as_str())]).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(ack["ok"], true);

    let (_, balance) = get(&ctx, Some(&token), "/api/balance").await;
    assert_eq!(balance["balance"], 50);

    // A replayed delivery acknowledges but does not credit again.
    let (status, ack) =
        post_raw(&ctx, "/webhook/cryptopay", body, &[("crypto-pay-api-signature", signature.as_str())]).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(ack["ok"], true);
    let (_, balance) = get(&ctx, Some(&token), "/api/balance").await;
    assert_eq!(balance["balance"], 50);

    // Status polling reports the paid invoice and the settled balance.
    let (status, poll) = get(&ctx, Some(&token), &format!("/api/balance/payment/{payment_id}/status")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(poll["status"], "paid");
    assert_eq!(poll["new_balance"], 50);
}

#[actix_web::test]
async fn unsigned_webhooks_are_rejected_without_side_effects() {
    let ctx = TestContext::new().await;
    ctx.seed_user(1, 0).await;
    let token = ctx.token_for(1);
    seed_pending_invoice(&ctx, 1, "701", 50).await;

    let body = paid_webhook_body("701");
    let (status, ack) =
        post_raw(&ctx, "/webhook/cryptopay", body.clone(), &[("crypto-pay-api-signature", "deadbeef")]).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(ack["ok"], false);

    let (_, balance) = get(&ctx, Some(&token), "/api/balance").await;
    assert_eq!(balance["balance"], 0);
}

#[actix_web::test]
async fn webhooks_for_unknown_invoices_still_acknowledge() {
    let ctx = TestContext::new().await;
    let body = paid_webhook_body("999999");
    let signature = ctx.gateway.sign_payload(&body).unwrap();
    // The provider must never see an error it would retry into a fresh charge.
    let (status, ack) =
        post_raw(&ctx, "/webhook/cryptopay", body, &[("crypto-pay-api-signature", signature.as_str())]).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(ack["ok"], true);
}

#[actix_web::test]
async fn other_update_types_are_ignored() {
    let ctx = TestContext::new().await;
    let body = serde_json::to_vec(&json!({ "update_type": "invoice_expired", "payload": { "invoice_id": 1 } })).unwrap();
    let signature = ctx.gateway.sign_payload(&body).unwrap();
    let (status, ack) =
        post_raw(&ctx, "/webhook/cryptopay", body, &[("crypto-pay-api-signature", signature.as_str())]).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(ack["ok"], true);
}

#[actix_web::test]
async fn payment_status_is_scoped_to_the_owner() {
    let ctx = TestContext::new().await;
    ctx.seed_user(1, 0).await;
    ctx.seed_user(2, 0).await;
    let payment_id = seed_pending_invoice(&ctx, 1, "702", 10).await;
    let other = ctx.token_for(2);
    let (status, _) = get(&ctx, Some(&other), &format!("/api/balance/payment/{payment_id}/status")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}
