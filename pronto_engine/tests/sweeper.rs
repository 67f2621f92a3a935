//! Sweep tests: time-based expiry, the no-response auto-close with refund, and the boundaries
//! between the two.
mod support;

use chrono::{Duration, Utc};
use pronto_common::Rubles;
use pronto_engine::{
    db_types::{Category, NewOrder, OrderStatus, TransactionType},
    traits::{AccountManagement, MarketplaceDatabase, OrderFlowError},
    MarketConfig,
};
use support::{prepare_test_db, seed_user, user};

fn order_for(client_id: i64, contact: &str) -> NewOrder {
    NewOrder::new(client_id, Category::Cleaning, "Full apartment clean before the weekend", "Moscow", contact)
}

#[tokio::test]
async fn sweep_expires_old_orders_without_ledger_activity() {
    let config = MarketConfig { order_lifetime_minutes: 1, ..Default::default() };
    let db = prepare_test_db(config).await;
    seed_user(&db, 1, 0).await;
    let stale = order_for(1, "@alice").with_created_at(Utc::now() - Duration::minutes(2));
    let order = db.create_order(stale).await.unwrap();
    assert_eq!(user(&db, 1).await.active_orders_count, 1);

    let result = db.sweep_expired_orders(Utc::now()).await.unwrap();
    assert_eq!(result.expired_count(), 1);
    assert_eq!(result.closed_count(), 0);
    assert_eq!(result.failures, 0);

    let order = db.fetch_order(&order.id).await.unwrap().unwrap();
    assert_eq!(order.status, OrderStatus::Expired);
    assert_eq!(user(&db, 1).await.active_orders_count, 0);
    // Expiry without engagement moves no money at all.
    assert!(db.fetch_balance_history(1).await.unwrap().is_empty());
}

#[tokio::test]
async fn sweep_leaves_live_orders_alone() {
    let db = prepare_test_db(MarketConfig::default()).await;
    seed_user(&db, 1, 0).await;
    let order = db.create_order(order_for(1, "@alice")).await.unwrap();

    let result = db.sweep_expired_orders(Utc::now()).await.unwrap();
    assert_eq!(result.total_count(), 0);
    let order = db.fetch_order(&order.id).await.unwrap().unwrap();
    assert_eq!(order.status, OrderStatus::Active);
}

#[tokio::test]
async fn no_response_close_refunds_every_taker() {
    let db = prepare_test_db(MarketConfig::default()).await;
    seed_user(&db, 1, 0).await;
    seed_user(&db, 2, 10).await;
    seed_user(&db, 3, 5).await;
    // Order still has half its lifetime left, but the takes are past the no-response window.
    let order = db
        .create_order(order_for(1, "@alice").with_created_at(Utc::now() - Duration::minutes(30)))
        .await
        .unwrap();
    let take_time = Utc::now() - Duration::minutes(20);
    db.take_order(&order.id, 2, take_time).await.unwrap();
    db.take_order(&order.id, 3, take_time).await.unwrap();
    assert_eq!(user(&db, 2).await.balance, Rubles::from(8));
    assert_eq!(user(&db, 3).await.balance, Rubles::from(3));

    let result = db.sweep_expired_orders(Utc::now()).await.unwrap();
    assert_eq!(result.closed_count(), 1);
    assert_eq!(result.expired_count(), 0);

    let order = db.fetch_order(&order.id).await.unwrap().unwrap();
    assert_eq!(order.status, OrderStatus::ClosedNoResponse);
    // Balances restored to their pre-take values.
    assert_eq!(user(&db, 2).await.balance, Rubles::from(10));
    assert_eq!(user(&db, 3).await.balance, Rubles::from(5));
    assert_eq!(user(&db, 2).await.active_orders_count, 0);
    assert_eq!(user(&db, 1).await.active_orders_count, 0);

    for executor in [2, 3] {
        let history = db.fetch_balance_history(executor).await.unwrap();
        let refund = history.iter().find(|t| t.txn_type == TransactionType::Refund).unwrap();
        assert_eq!(refund.amount, Rubles::from(2));
        assert_eq!(refund.order_id.as_ref().unwrap(), &order.id);
    }
}

#[tokio::test]
async fn client_response_stops_the_no_response_clock() {
    let db = prepare_test_db(MarketConfig::default()).await;
    seed_user(&db, 1, 0).await;
    seed_user(&db, 2, 10).await;
    let order = db
        .create_order(order_for(1, "@alice").with_created_at(Utc::now() - Duration::minutes(30)))
        .await
        .unwrap();
    db.take_order(&order.id, 2, Utc::now() - Duration::minutes(20)).await.unwrap();
    db.respond_to_order(&order.id, 1, Utc::now() - Duration::minutes(18)).await.unwrap();

    let result = db.sweep_expired_orders(Utc::now()).await.unwrap();
    assert_eq!(result.total_count(), 0);
    let order = db.fetch_order(&order.id).await.unwrap().unwrap();
    assert_eq!(order.status, OrderStatus::Active);
    // No refund happened either.
    assert_eq!(user(&db, 2).await.balance, Rubles::from(8));
}

#[tokio::test]
async fn takes_inside_the_window_do_not_close() {
    let db = prepare_test_db(MarketConfig::default()).await;
    seed_user(&db, 1, 0).await;
    seed_user(&db, 2, 10).await;
    let order = db.create_order(order_for(1, "@alice")).await.unwrap();
    db.take_order(&order.id, 2, Utc::now() - Duration::minutes(5)).await.unwrap();

    let result = db.sweep_expired_orders(Utc::now()).await.unwrap();
    assert_eq!(result.total_count(), 0);
    assert_eq!(db.fetch_order(&order.id).await.unwrap().unwrap().status, OrderStatus::Active);
}

#[tokio::test]
async fn the_earliest_take_starts_the_clock() {
    let db = prepare_test_db(MarketConfig::default()).await;
    seed_user(&db, 1, 0).await;
    seed_user(&db, 2, 10).await;
    seed_user(&db, 3, 10).await;
    let order = db
        .create_order(order_for(1, "@alice").with_created_at(Utc::now() - Duration::minutes(30)))
        .await
        .unwrap();
    // The first take is past the window; a later one is not. The earliest wins.
    db.take_order(&order.id, 2, Utc::now() - Duration::minutes(20)).await.unwrap();
    db.take_order(&order.id, 3, Utc::now() - Duration::minutes(2)).await.unwrap();

    let result = db.sweep_expired_orders(Utc::now()).await.unwrap();
    assert_eq!(result.closed_count(), 1);
    // Both takers are refunded, not just the early one.
    assert_eq!(user(&db, 2).await.balance, Rubles::from(10));
    assert_eq!(user(&db, 3).await.balance, Rubles::from(10));
}

#[tokio::test]
async fn expiry_of_a_taken_order_does_not_refund() {
    let db = prepare_test_db(MarketConfig::default()).await;
    seed_user(&db, 1, 0).await;
    seed_user(&db, 2, 10).await;
    // Created 90 minutes ago with a 60-minute lifetime; taken while still fresh, and the client
    // responded, so the no-response path stays out of the picture.
    let order = db
        .create_order(order_for(1, "@alice").with_created_at(Utc::now() - Duration::minutes(90)))
        .await
        .unwrap();
    db.take_order(&order.id, 2, Utc::now() - Duration::minutes(80)).await.unwrap();
    db.respond_to_order(&order.id, 1, Utc::now() - Duration::minutes(75)).await.unwrap();

    let result = db.sweep_expired_orders(Utc::now()).await.unwrap();
    assert_eq!(result.expired_count(), 1);

    let order = db.fetch_order(&order.id).await.unwrap().unwrap();
    assert_eq!(order.status, OrderStatus::Expired);
    // Contact access was delivered; expiry does not reverse the charge.
    assert_eq!(user(&db, 2).await.balance, Rubles::from(8));
    assert_eq!(user(&db, 2).await.active_orders_count, 0);
}

#[tokio::test]
async fn sweep_and_live_requests_serialize_on_terminal_states() {
    let config = MarketConfig { order_lifetime_minutes: 1, ..Default::default() };
    let db = prepare_test_db(config).await;
    seed_user(&db, 1, 0).await;
    seed_user(&db, 2, 10).await;
    let order =
        db.create_order(order_for(1, "@alice").with_created_at(Utc::now() - Duration::minutes(5))).await.unwrap();

    // The sweep wins the race; the later take observes the terminal state.
    db.sweep_expired_orders(Utc::now()).await.unwrap();
    let err = db.take_order(&order.id, 2, Utc::now()).await.unwrap_err();
    assert!(matches!(err, OrderFlowError::Gone(_)));

    // And a second sweep pass finds nothing left to do.
    let result = db.sweep_expired_orders(Utc::now()).await.unwrap();
    assert_eq!(result.total_count(), 0);
}
