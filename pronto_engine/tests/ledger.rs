//! Ledger invariants and the idempotent invoice-crediting path.
mod support;

use chrono::Utc;
use pronto_common::Rubles;
use pronto_engine::{
    db_types::{Category, InvoiceStatus, NewOrder, TransactionType},
    order_objects::NewInvoice,
    traits::{AccountManagement, MarketplaceDatabase, PaymentsApiError, PaymentsDatabase},
    MarketConfig,
};
use support::{prepare_test_db, seed_user, user};

fn pending_invoice(external_id: &str, amount: i64) -> NewInvoice {
    NewInvoice {
        external_invoice_id: external_id.to_string(),
        amount: Rubles::from(amount),
        pay_url: Some(format!("https://t.me/pay/{external_id}")),
        mini_app_invoice_url: None,
    }
}

#[tokio::test]
async fn balance_always_equals_the_sum_of_transactions() {
    let db = prepare_test_db(MarketConfig::default()).await;
    seed_user(&db, 1, 0).await;
    seed_user(&db, 2, 0).await;
    db.recharge(2, Rubles::from(7), "test").await.unwrap();
    let order = db
        .create_order(NewOrder::new(1, Category::Assembly, "Assemble a wardrobe and two bookshelves", "Moscow", "@alice"))
        .await
        .unwrap();
    db.take_order(&order.id, 2, Utc::now()).await.unwrap();
    db.recharge(2, Rubles::from(3), "test").await.unwrap();

    let account = user(&db, 2).await;
    let history = db.fetch_balance_history(2).await.unwrap();
    let sum: Rubles = history.iter().map(|t| t.amount).sum();
    assert_eq!(account.balance, sum);
    assert_eq!(account.balance, Rubles::from(8));
    // Every transaction carries a consistent running snapshot; the newest one matches the
    // current balance.
    assert_eq!(history.first().unwrap().balance_after, account.balance);
}

#[tokio::test]
async fn recharge_rejects_non_positive_amounts() {
    let db = prepare_test_db(MarketConfig::default()).await;
    seed_user(&db, 1, 0).await;
    let err = db.recharge(1, Rubles::from(0), "test").await.unwrap_err();
    assert!(matches!(err, PaymentsApiError::InvalidAmount(_)));
    let err = db.recharge(1, Rubles::from(-5), "test").await.unwrap_err();
    assert!(matches!(err, PaymentsApiError::InvalidAmount(_)));
}

#[tokio::test]
async fn paid_invoice_credits_exactly_once() {
    let db = prepare_test_db(MarketConfig::default()).await;
    seed_user(&db, 1, 0).await;
    let invoice = db.create_pending_invoice(1, pending_invoice("inv-100", 50)).await.unwrap();
    assert_eq!(invoice.status, InvoiceStatus::Pending);

    let paid = db.process_paid_invoice("inv-100", Utc::now()).await.unwrap().unwrap();
    assert_eq!(paid.new_balance, Rubles::from(50));
    assert_eq!(paid.invoice.status, InvoiceStatus::Paid);
    assert!(paid.invoice.paid_at.is_some());
    assert_eq!(paid.invoice.balance_transaction_id, Some(paid.transaction_id));

    // A replayed webhook is a no-op, not a second credit.
    let replay = db.process_paid_invoice("inv-100", Utc::now()).await.unwrap();
    assert!(replay.is_none());
    assert_eq!(user(&db, 1).await.balance, Rubles::from(50));
    let history = db.fetch_balance_history(1).await.unwrap();
    assert_eq!(history.iter().filter(|t| t.txn_type == TransactionType::Recharge).count(), 1);
    assert_eq!(history[0].external_transaction_id.as_deref(), Some("inv-100"));
}

#[tokio::test]
async fn unknown_invoices_are_ignored() {
    let db = prepare_test_db(MarketConfig::default()).await;
    let result = db.process_paid_invoice("inv-does-not-exist", Utc::now()).await.unwrap();
    assert!(result.is_none());
}

#[tokio::test]
async fn invoices_are_scoped_to_their_owner() {
    let db = prepare_test_db(MarketConfig::default()).await;
    seed_user(&db, 1, 0).await;
    seed_user(&db, 2, 0).await;
    let invoice = db.create_pending_invoice(1, pending_invoice("inv-200", 10)).await.unwrap();
    assert!(db.invoice_for_user(invoice.id, 1).await.unwrap().is_some());
    assert!(db.invoice_for_user(invoice.id, 2).await.unwrap().is_none());
}

#[tokio::test]
async fn invoice_creation_rejects_non_positive_amounts() {
    let db = prepare_test_db(MarketConfig::default()).await;
    seed_user(&db, 1, 0).await;
    let err = db.create_pending_invoice(1, pending_invoice("inv-300", 0)).await.unwrap_err();
    assert!(matches!(err, PaymentsApiError::InvalidAmount(_)));
}

#[tokio::test]
async fn refund_and_take_round_trip_is_neutral() {
    let db = prepare_test_db(MarketConfig::default()).await;
    seed_user(&db, 1, 0).await;
    seed_user(&db, 2, 2).await;
    let order = db
        .create_order(NewOrder::new(
            1,
            Category::Appliances,
            "Washing machine drum stopped spinning",
            "Moscow",
            "@alice",
        ))
        .await
        .unwrap();
    db.take_order(&order.id, 2, Utc::now() - chrono::Duration::minutes(20)).await.unwrap();
    db.sweep_expired_orders(Utc::now()).await.unwrap();

    // Take then refund cancels out, and the audit trail shows both legs.
    let account = user(&db, 2).await;
    assert_eq!(account.balance, Rubles::from(2));
    let history = db.fetch_balance_history(2).await.unwrap();
    let amounts: Vec<i64> = history.iter().map(|t| t.amount.value()).collect();
    assert!(amounts.contains(&-2) && amounts.contains(&2));
    assert_eq!(history.iter().map(|t| t.amount).sum::<Rubles>(), account.balance);
}
