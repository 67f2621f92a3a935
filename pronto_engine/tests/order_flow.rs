//! State-machine tests for the order lifecycle: creation, the paid take, the client actions,
//! and the transition rules between them.
mod support;

use chrono::{Duration, Utc};
use pronto_common::Rubles;
use pronto_engine::{
    db_types::{Category, NewOrder, OrderStatus, TransactionType},
    order_objects::{OrderQueryFilter, UpdateOrderRequest},
    traits::{AccountManagement, MarketplaceDatabase, OrderFlowError},
    MarketConfig,
};
use support::{prepare_test_db, seed_user, user};

fn plumbing_order(client_id: i64, contact: &str) -> NewOrder {
    NewOrder::new(client_id, Category::Plumbing, "Kitchen sink leaks badly, need help today", "Moscow", contact)
}

#[tokio::test]
async fn create_order_sets_defaults_and_counters() {
    let db = prepare_test_db(MarketConfig::default()).await;
    seed_user(&db, 1, 0).await;
    let order = db.create_order(plumbing_order(1, "@alice")).await.unwrap();
    assert_eq!(order.status, OrderStatus::Active);
    assert!(order.city_locked);
    assert_eq!(order.expires_in_minutes, 60);
    assert_eq!(order.id.as_str().len(), 12);
    assert!(order.customer_responded_at.is_none());
    assert_eq!(user(&db, 1).await.active_orders_count, 1);
}

#[tokio::test]
async fn active_contact_is_unique_until_terminal() {
    let db = prepare_test_db(MarketConfig::default()).await;
    seed_user(&db, 1, 0).await;
    seed_user(&db, 2, 0).await;
    let order = db.create_order(plumbing_order(1, "+79001234567")).await.unwrap();
    // A second active order with the same contact is refused, whoever posts it.
    let err = db.create_order(plumbing_order(2, "+79001234567")).await.unwrap_err();
    assert!(matches!(err, OrderFlowError::Conflict(_)));
    // Once the first order reaches a terminal state the contact is free again.
    db.delete_order(&order.id, 1, Utc::now()).await.unwrap();
    db.create_order(plumbing_order(2, "+79001234567")).await.unwrap();
}

#[tokio::test]
async fn take_charges_once_and_reveals_contact() {
    let db = prepare_test_db(MarketConfig::default()).await;
    seed_user(&db, 1, 0).await;
    seed_user(&db, 2, 10).await;
    let order = db.create_order(plumbing_order(1, "@alice")).await.unwrap();

    let outcome = db.take_order(&order.id, 2, Utc::now()).await.unwrap();
    assert!(outcome.charged);
    assert_eq!(outcome.contact, "@alice");
    assert_eq!(outcome.take_count, 1);
    assert_eq!(outcome.new_balance, Rubles::from(8));
    assert_eq!(user(&db, 2).await.active_orders_count, 1);

    let history = db.fetch_balance_history(2).await.unwrap();
    let take_txn = history.iter().find(|t| t.txn_type == TransactionType::OrderTake).unwrap();
    assert_eq!(take_txn.amount, Rubles::from(-2));
    assert_eq!(take_txn.balance_after, Rubles::from(8));
    assert_eq!(take_txn.order_id.as_ref().unwrap(), &order.id);
}

#[tokio::test]
async fn retake_is_free_and_idempotent() {
    let db = prepare_test_db(MarketConfig::default()).await;
    seed_user(&db, 1, 0).await;
    seed_user(&db, 2, 10).await;
    let order = db.create_order(plumbing_order(1, "@alice")).await.unwrap();

    let first = db.take_order(&order.id, 2, Utc::now()).await.unwrap();
    let second = db.take_order(&order.id, 2, Utc::now()).await.unwrap();
    assert!(first.charged);
    assert!(!second.charged);
    assert_eq!(second.contact, first.contact);
    assert_eq!(second.take_count, 1);
    assert_eq!(second.new_balance, first.new_balance);
    // Exactly one debit in the audit trail.
    let history = db.fetch_balance_history(2).await.unwrap();
    assert_eq!(history.iter().filter(|t| t.txn_type == TransactionType::OrderTake).count(), 1);
}

#[tokio::test]
async fn slot_cap_is_enforced() {
    let config = MarketConfig { max_executors_per_order: 2, ..Default::default() };
    let db = prepare_test_db(config).await;
    seed_user(&db, 1, 0).await;
    for executor in 2..=4 {
        seed_user(&db, executor, 10).await;
    }
    let order = db.create_order(plumbing_order(1, "@alice")).await.unwrap();

    db.take_order(&order.id, 2, Utc::now()).await.unwrap();
    db.take_order(&order.id, 3, Utc::now()).await.unwrap();
    let err = db.take_order(&order.id, 4, Utc::now()).await.unwrap_err();
    assert!(matches!(err, OrderFlowError::Conflict(_)));
    // The cap never admits more than the configured number of takes.
    let (_, takes) = db.fetch_order_with_takes(&order.id).await.unwrap().unwrap();
    assert_eq!(takes.len(), 2);
}

#[tokio::test]
async fn clients_cannot_take_their_own_orders() {
    let db = prepare_test_db(MarketConfig::default()).await;
    seed_user(&db, 1, 10).await;
    let order = db.create_order(plumbing_order(1, "@alice")).await.unwrap();
    let err = db.take_order(&order.id, 1, Utc::now()).await.unwrap_err();
    assert!(matches!(err, OrderFlowError::Forbidden(_)));
}

#[tokio::test]
async fn take_fails_without_funds_and_never_overdraws() {
    let db = prepare_test_db(MarketConfig::default()).await;
    seed_user(&db, 1, 0).await;
    seed_user(&db, 2, 0).await;
    seed_user(&db, 3, 2).await; // exactly one take's worth
    let first = db.create_order(plumbing_order(1, "@alice")).await.unwrap();
    let second = db.create_order(plumbing_order(2, "@bob")).await.unwrap();

    let err = db.take_order(&first.id, 2, Utc::now()).await.unwrap_err();
    assert!(matches!(err, OrderFlowError::InsufficientFunds { .. }));

    // With a balance of exactly one take, only one of two takes can succeed.
    db.take_order(&first.id, 3, Utc::now()).await.unwrap();
    let err = db.take_order(&second.id, 3, Utc::now()).await.unwrap_err();
    assert!(matches!(err, OrderFlowError::InsufficientFunds { .. }));
    assert_eq!(user(&db, 3).await.balance, Rubles::from(0));
}

#[tokio::test]
async fn expired_order_rejects_take_and_transitions_lazily() {
    let db = prepare_test_db(MarketConfig::default()).await;
    seed_user(&db, 1, 0).await;
    seed_user(&db, 2, 10).await;
    let stale = plumbing_order(1, "@alice").with_created_at(Utc::now() - Duration::hours(2));
    let order = db.create_order(stale).await.unwrap();

    let err = db.take_order(&order.id, 2, Utc::now()).await.unwrap_err();
    assert!(matches!(err, OrderFlowError::Gone(_)));
    // The failed read committed the expiry as a side effect.
    let order = db.fetch_order(&order.id).await.unwrap().unwrap();
    assert_eq!(order.status, OrderStatus::Expired);
    assert_eq!(user(&db, 1).await.active_orders_count, 0);
    // And the executor paid nothing.
    assert_eq!(user(&db, 2).await.balance, Rubles::from(10));
}

#[tokio::test]
async fn updates_are_frozen_once_taken() {
    let db = prepare_test_db(MarketConfig::default()).await;
    seed_user(&db, 1, 0).await;
    seed_user(&db, 2, 10).await;
    let order = db.create_order(plumbing_order(1, "@alice")).await.unwrap();

    let patch = UpdateOrderRequest { description: Some("Bathroom tap now leaks as well, urgent".to_string()), ..Default::default() };
    let updated = db.update_order(&order.id, 1, patch.clone(), Utc::now()).await.unwrap();
    assert!(updated.description.starts_with("Bathroom tap"));

    db.take_order(&order.id, 2, Utc::now()).await.unwrap();
    let err = db.update_order(&order.id, 1, patch.clone(), Utc::now()).await.unwrap_err();
    assert!(matches!(err, OrderFlowError::Forbidden(_)));
    let err = db.delete_order(&order.id, 1, Utc::now()).await.unwrap_err();
    assert!(matches!(err, OrderFlowError::Forbidden(_)));
}

#[tokio::test]
async fn foreign_orders_read_as_absent_to_writers() {
    let db = prepare_test_db(MarketConfig::default()).await;
    seed_user(&db, 1, 0).await;
    seed_user(&db, 2, 0).await;
    let order = db.create_order(plumbing_order(1, "@alice")).await.unwrap();
    // Ownership failures and absence are deliberately indistinguishable.
    let err = db.update_order(&order.id, 2, UpdateOrderRequest::default(), Utc::now()).await.unwrap_err();
    assert!(matches!(err, OrderFlowError::OrderNotFound));
    let err = db.delete_order(&order.id, 2, Utc::now()).await.unwrap_err();
    assert!(matches!(err, OrderFlowError::OrderNotFound));
}

#[tokio::test]
async fn update_past_deadline_is_gone() {
    let db = prepare_test_db(MarketConfig::default()).await;
    seed_user(&db, 1, 0).await;
    let stale = plumbing_order(1, "@alice").with_created_at(Utc::now() - Duration::hours(2));
    let order = db.create_order(stale).await.unwrap();
    let patch = UpdateOrderRequest { contact: Some("@alice_new".to_string()), ..Default::default() };
    let err = db.update_order(&order.id, 1, patch, Utc::now()).await.unwrap_err();
    assert!(matches!(err, OrderFlowError::Gone(_)));
}

#[tokio::test]
async fn respond_is_one_shot_and_needs_a_take() {
    let db = prepare_test_db(MarketConfig::default()).await;
    seed_user(&db, 1, 0).await;
    seed_user(&db, 2, 10).await;
    let order = db.create_order(plumbing_order(1, "@alice")).await.unwrap();

    let err = db.respond_to_order(&order.id, 1, Utc::now()).await.unwrap_err();
    assert!(matches!(err, OrderFlowError::Conflict(_)));

    db.take_order(&order.id, 2, Utc::now()).await.unwrap();
    let err = db.respond_to_order(&order.id, 2, Utc::now()).await.unwrap_err();
    assert!(matches!(err, OrderFlowError::Forbidden(_)));

    let order_after = db.respond_to_order(&order.id, 1, Utc::now()).await.unwrap();
    assert!(order_after.customer_responded_at.is_some());

    let err = db.respond_to_order(&order.id, 1, Utc::now()).await.unwrap_err();
    assert!(matches!(err, OrderFlowError::Conflict(_)));
}

#[tokio::test]
async fn close_order_does_not_refund_takers() {
    let db = prepare_test_db(MarketConfig::default()).await;
    seed_user(&db, 1, 0).await;
    seed_user(&db, 2, 10).await;
    let order = db.create_order(plumbing_order(1, "@alice")).await.unwrap();

    let err = db.close_order(&order.id, 1).await.unwrap_err();
    assert!(matches!(err, OrderFlowError::Conflict(_)), "closing an untaken order should be refused");

    db.take_order(&order.id, 2, Utc::now()).await.unwrap();
    db.close_order(&order.id, 1).await.unwrap();

    let order = db.fetch_order(&order.id).await.unwrap().unwrap();
    assert_eq!(order.status, OrderStatus::ClosedNoResponse);
    // The fee bought contact access that was delivered; a manual close keeps the charge.
    assert_eq!(user(&db, 2).await.balance, Rubles::from(8));
    assert_eq!(user(&db, 2).await.active_orders_count, 0);
    assert_eq!(user(&db, 1).await.active_orders_count, 0);
}

#[tokio::test]
async fn complete_order_updates_both_sides() {
    let db = prepare_test_db(MarketConfig::default()).await;
    seed_user(&db, 1, 0).await;
    seed_user(&db, 2, 10).await;
    seed_user(&db, 3, 10).await;
    let order = db.create_order(plumbing_order(1, "@alice")).await.unwrap();
    db.take_order(&order.id, 2, Utc::now()).await.unwrap();
    db.take_order(&order.id, 3, Utc::now()).await.unwrap();

    db.complete_order(&order.id, 1).await.unwrap();

    let order = db.fetch_order(&order.id).await.unwrap().unwrap();
    assert_eq!(order.status, OrderStatus::Completed);
    let client = user(&db, 1).await;
    assert_eq!((client.active_orders_count, client.completed_orders_count), (0, 1));
    for executor in [2, 3] {
        let account = user(&db, executor).await;
        assert_eq!((account.active_orders_count, account.completed_orders_count), (0, 1));
    }
    // Terminal states admit nothing further.
    let err = db.take_order(&order.id, 2, Utc::now()).await.unwrap_err();
    assert!(matches!(err, OrderFlowError::Gone(_)));
    let err = db.complete_order(&order.id, 1).await.unwrap_err();
    assert!(matches!(err, OrderFlowError::Gone(_)));
}

#[tokio::test]
async fn public_listing_hides_private_statuses() {
    let db = prepare_test_db(MarketConfig::default()).await;
    seed_user(&db, 1, 0).await;
    let kept = db.create_order(plumbing_order(1, "@alice")).await.unwrap();
    let removed = db.create_order(plumbing_order(1, "@bob")).await.unwrap();
    db.delete_order(&removed.id, 1, Utc::now()).await.unwrap();

    // Asking for deleted orders without an owner filter falls back to the public set.
    let query = OrderQueryFilter::default().with_status(OrderStatus::Deleted);
    let (orders, total) = db.search_orders(query).await.unwrap();
    assert_eq!(total, 1);
    assert_eq!(orders[0].id, kept.id);

    // The owner sees their own deleted orders.
    let query = OrderQueryFilter::default().with_client_id(1).with_status(OrderStatus::Deleted);
    let (orders, _) = db.search_orders(query).await.unwrap();
    assert_eq!(orders.len(), 1);
    assert_eq!(orders[0].id, removed.id);
}

#[tokio::test]
async fn search_filters_by_category_and_city() {
    let db = prepare_test_db(MarketConfig::default()).await;
    seed_user(&db, 1, 0).await;
    db.create_order(plumbing_order(1, "@alice")).await.unwrap();
    let electrics =
        NewOrder::new(1, Category::Electrical, "Socket in the hall sparks when used", "Kazan", "@bob");
    db.create_order(electrics).await.unwrap();

    let (orders, total) =
        db.search_orders(OrderQueryFilter::default().with_category(Category::Electrical)).await.unwrap();
    assert_eq!(total, 1);
    assert_eq!(orders[0].city, "Kazan");

    let (orders, _) = db.search_orders(OrderQueryFilter::default().with_city("Moscow")).await.unwrap();
    assert_eq!(orders.len(), 1);
    assert_eq!(orders[0].category, Category::Plumbing);
}
