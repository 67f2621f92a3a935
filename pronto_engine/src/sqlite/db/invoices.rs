use chrono::{DateTime, Utc};
use sqlx::SqliteConnection;

use crate::{db_types::PaymentInvoice, order_objects::NewInvoice};

pub async fn insert_invoice(
    user_id: i64,
    invoice: &NewInvoice,
    conn: &mut SqliteConnection,
) -> Result<PaymentInvoice, sqlx::Error> {
    let invoice = sqlx::query_as(
        r#"
        INSERT INTO payment_invoices (user_id, external_invoice_id, amount, status, pay_url, mini_app_invoice_url)
        VALUES ($1, $2, $3, 'pending', $4, $5)
        RETURNING *;
        "#,
    )
    .bind(user_id)
    .bind(&invoice.external_invoice_id)
    .bind(invoice.amount)
    .bind(invoice.pay_url.as_deref())
    .bind(invoice.mini_app_invoice_url.as_deref())
    .fetch_one(conn)
    .await?;
    Ok(invoice)
}

pub async fn fetch_by_external_id(
    external_invoice_id: &str,
    conn: &mut SqliteConnection,
) -> Result<Option<PaymentInvoice>, sqlx::Error> {
    let invoice = sqlx::query_as("SELECT * FROM payment_invoices WHERE external_invoice_id = $1")
        .bind(external_invoice_id)
        .fetch_optional(conn)
        .await?;
    Ok(invoice)
}

/// Fetches an invoice scoped to its owner. Foreign invoices are indistinguishable from absent
/// ones.
pub async fn fetch_for_user(
    invoice_id: i64,
    user_id: i64,
    conn: &mut SqliteConnection,
) -> Result<Option<PaymentInvoice>, sqlx::Error> {
    let invoice = sqlx::query_as("SELECT * FROM payment_invoices WHERE id = $1 AND user_id = $2")
        .bind(invoice_id)
        .bind(user_id)
        .fetch_optional(conn)
        .await?;
    Ok(invoice)
}

pub async fn mark_paid(
    invoice_id: i64,
    balance_transaction_id: i64,
    paid_at: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<PaymentInvoice, sqlx::Error> {
    let invoice = sqlx::query_as(
        r#"
        UPDATE payment_invoices
        SET status = 'paid', balance_transaction_id = $1, paid_at = $2
        WHERE id = $3
        RETURNING *;
        "#,
    )
    .bind(balance_transaction_id)
    .bind(paid_at)
    .bind(invoice_id)
    .fetch_one(conn)
    .await?;
    Ok(invoice)
}
